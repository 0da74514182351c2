//! Family-specific mutual-authentication protocols (spec §4.C7).
//!
//! `AuthFamily` names the five-step handshake spec §4.C7 describes
//! (`get_challenge` → `compose_auth_message` → `send_auth` →
//! `verify_response` → `derive_session`); DESFire, eMRTD BAC, SEOS, and
//! CIPURSE implement it. VAS and FIDO have no symmetric mutual-auth (spec
//! §4.C7 "VAS/FIDO" variant note) and live in their own modules without
//! implementing this trait: their APDU request/response framing lives here
//! (`vas`, `fido`), while the VAS payload's authenticated decryption (a true
//! cryptogram, needing [`crate::crypto::ecc`]/[`crate::crypto::kdf`]
//! composition) is [`crate::cryptogram::decode_vas`].

pub mod cipurse;
pub mod desfire;
pub mod emrtd;
pub mod fido;
pub mod seos;
pub mod vas;

use crate::error::{Error, Result};
use crate::session::Session;
use crate::transport::Transport;
use std::str::FromStr;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Family {
    Desfire,
    Seos,
    Vas,
    Fido,
    Emrtd,
    Cipurse,
}

impl Family {
    pub fn name(self) -> &'static str {
        match self {
            Family::Desfire => "mifare-desfire",
            Family::Seos => "hid-seos",
            Family::Vas => "apple-hid-vas",
            Family::Fido => "fido-u2f",
            Family::Emrtd => "icao-emrtd-bac",
            Family::Cipurse => "cipurse",
        }
    }
}

impl FromStr for Family {
    type Err = Error;

    /// Parses the `--family` CLI argument into a [`Family`]; accepts the
    /// same lowercase tokens [`Family::name`] prints.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mifare-desfire" | "desfire" => Ok(Family::Desfire),
            "hid-seos" | "seos" => Ok(Family::Seos),
            "apple-hid-vas" | "vas" => Ok(Family::Vas),
            "fido-u2f" | "fido" => Ok(Family::Fido),
            "icao-emrtd-bac" | "emrtd" => Ok(Family::Emrtd),
            "cipurse" => Ok(Family::Cipurse),
            other => Err(Error::InvalidArgument(format!("unknown family {other:?}"))),
        }
    }
}

/// Candidate AIDs tried in order by [`crate::select`] for each family
/// (spec §4.C6: "iterates a compiled-in table of candidate AIDs").
pub fn candidate_aids(family: Family) -> &'static [&'static [u8]] {
    match family {
        Family::Desfire => &[&[0xD2, 0x76, 0x00, 0x00, 0x85, 0x01, 0x00]],
        Family::Seos => &[&[0xA0, 0x00, 0x00, 0x04, 0x40, 0x00, 0x01, 0x01, 0x00, 0x01]],
        Family::Vas => &[&[0x4f, 0x53, 0x45, 0x2e, 0x56, 0x41, 0x53, 0x2e, 0x30, 0x31]],
        Family::Fido => &[&[0xA0, 0x00, 0x00, 0x06, 0x47, 0x2F, 0x00, 0x01], &[0xA0, 0x00, 0x00, 0x06, 0x47, 0x2F, 0x00, 0x01, 0x01]],
        Family::Emrtd => &[&[0xA0, 0x00, 0x00, 0x02, 0x47, 0x10, 0x01]],
        Family::Cipurse => &[&[0xA0, 0x00, 0x00, 0x05, 0x07, 0x01, 0x00]],
    }
}

/// The symmetric mutual-authentication handshake shared by DESFire, eMRTD
/// BAC, SEOS, and CIPURSE (spec §4.C7, steps 1-5: GetChallenge,
/// ComposeAuthMessage, SendAuth, VerifyResponse, DeriveSession).
///
/// Each family's key material and intermediate context differ enough
/// (eMRTD needs only `kenc`/`kmac`; SEOS needs a recovered diversifier;
/// CIPURSE needs independently selectable per-direction levels) that the
/// trait exposes one entry point, `authenticate`, rather than five
/// separately callable steps — implementations still perform the five
/// steps internally, in order, and must fail closed (return `AuthFailed`
/// without retrying) on the first mismatch.
pub trait AuthFamily {
    /// Family-specific inputs beyond the transport: derived keys, a
    /// recovered diversifier, whatever the family's key schedule needs.
    type Context;

    fn authenticate(transport: &mut dyn Transport, ctx: &Self::Context) -> Result<Session>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_accepts_both_canonical_name_and_short_alias() {
        assert_eq!(Family::from_str("icao-emrtd-bac").unwrap(), Family::Emrtd);
        assert_eq!(Family::from_str("emrtd").unwrap(), Family::Emrtd);
        assert_eq!(Family::from_str("vas").unwrap(), Family::Vas);
    }

    #[test]
    fn from_str_rejects_unknown_family() {
        assert!(matches!(Family::from_str("mifare-classic"), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn every_family_has_at_least_one_candidate_aid() {
        for family in [Family::Desfire, Family::Seos, Family::Vas, Family::Fido, Family::Emrtd, Family::Cipurse] {
            assert!(!candidate_aids(family).is_empty());
        }
    }
}
