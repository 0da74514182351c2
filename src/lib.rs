//! HF contactless authentication and secure-messaging stack: APDU framing,
//! TLV/ASN.1 parsing, the crypto primitives the protocol families need,
//! application selection, mutual-authentication engines, the secure-
//! messaging layer, cryptogram decoding, and the session orchestrator that
//! ties them together (spec §2's component table, C1-C10).
//!
//! The binary target (`src/main.rs`) is a thin CLI wrapper over
//! [`orchestrator::Context`]; everything else is usable as a library.

pub mod apdu;
pub mod cryptogram;
pub mod error;
pub mod keystore;
pub mod orchestrator;
pub mod select;
pub mod session;
pub mod tlv;
pub mod transport;

pub mod crypto;
pub mod families;
