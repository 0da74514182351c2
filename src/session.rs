//! Session state and secure-messaging layer (spec §4.C7 state machine,
//! §4.C8 wrap/unwrap).
//!
//! Generalizes the existing `enc_apdu` (fixed 3DES, fixed levels, inline
//! SSC) into a stateful `Session` type with independent request/response
//! security levels, following spec §9's "in-band session state" and "mixed
//! plain/MAC/encrypted per call" re-architecture notes. The state-machine
//! and teardown-on-failure discipline follow the SCP03 `Channel` shape in
//! `other_examples/…yubihsm.rs…securechannel/channel.rs` (counter, session
//! keys, fail-closed authentication).

use crate::apdu::Apdu;
use crate::crypto::{aes, tdes, CipherSuite};
use crate::error::{Error, Result};
use crate::families::Family;
use crate::tlv::{self, TlvNode};
use subtle::ConstantTimeEq;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SecurityLevel {
    Plain,
    Mac,
    Encrypted,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SessionState {
    Unselected,
    Selected,
    Live,
    Closed,
}

/// A live secure-messaging session: session keys, the send-sequence
/// counter, and the independent request/response security levels (spec
/// §4.C8's "Ordering" and "Security levels" notes).
pub struct Session {
    pub family: Family,
    session_enc: [u8; 16],
    session_mac: [u8; 16],
    ssc: u64,
    pub req_level: SecurityLevel,
    pub resp_level: SecurityLevel,
    state: SessionState,
    /// Dispatches the wrap/unwrap block cipher and MAC, per spec §9's
    /// "Dynamic dispatch over cipher/hash ids" re-architecture note: eMRTD
    /// BAC and DESFire each fix this at session-creation time; SEOS carries
    /// whatever algorithm id its ADF cryptogram negotiated.
    suite: CipherSuite,
}

impl Session {
    /// Builds a live session using the eMRTD/CIPURSE default cipher suite
    /// for the given `family`. DESFire and SEOS, whose suite is either
    /// always-AES or negotiated at auth time, use [`Session::with_suite`]
    /// instead.
    pub fn new(family: Family, session_enc: [u8; 16], session_mac: [u8; 16], ssc: u64) -> Self {
        let suite = match family {
            Family::Emrtd => CipherSuite::TwoKeyTdesCbc,
            Family::Desfire | Family::Cipurse | Family::Seos => CipherSuite::Aes128Cbc,
            Family::Vas | Family::Fido => CipherSuite::Aes128Cbc,
        };
        Self::with_suite(family, session_enc, session_mac, ssc, suite)
    }

    /// Builds a live session with an explicit cipher suite, for families
    /// (SEOS) whose auth handshake negotiates the algorithm rather than
    /// fixing it per family.
    pub fn with_suite(
        family: Family,
        session_enc: [u8; 16],
        session_mac: [u8; 16],
        ssc: u64,
        suite: CipherSuite,
    ) -> Self {
        Self {
            family,
            session_enc,
            session_mac,
            ssc,
            req_level: SecurityLevel::Encrypted,
            resp_level: SecurityLevel::Encrypted,
            state: SessionState::Live,
            suite,
        }
    }

    fn block_size(&self) -> usize {
        self.suite.block_size()
    }

    fn encrypt_block(&self, data: &mut [u8]) -> Result<()> {
        match self.suite {
            CipherSuite::TwoKeyTdesCbc | CipherSuite::ThreeKeyTdesCbc => {
                tdes::enc_3des(&self.session_enc, data)
            }
            CipherSuite::Aes128Cbc => aes::aes_cbc_encrypt(&self.session_enc, &[0u8; 16], data),
            CipherSuite::Sha1 | CipherSuite::Sha256 | CipherSuite::Sha512 => {
                Err(Error::Crypto("secure messaging requires a block cipher suite".into()))
            }
        }
    }

    fn decrypt_block(&self, data: &mut [u8]) -> Result<()> {
        match self.suite {
            CipherSuite::TwoKeyTdesCbc | CipherSuite::ThreeKeyTdesCbc => {
                tdes::dec_3des(&self.session_enc, data)
            }
            CipherSuite::Aes128Cbc => aes::aes_cbc_decrypt(&self.session_enc, &[0u8; 16], data),
            CipherSuite::Sha1 | CipherSuite::Sha256 | CipherSuite::Sha512 => {
                Err(Error::Crypto("secure messaging requires a block cipher suite".into()))
            }
        }
    }

    /// Computes the 8-byte MAC tag over `data`: ISO/IEC 9797-1 retail-MAC
    /// for the 3DES suites, AES-CMAC truncated to 8 bytes otherwise — both
    /// produce the 8-byte tag the `0x8E` TLV carries (spec §4.C8 step 5).
    fn mac_tag(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.suite {
            CipherSuite::TwoKeyTdesCbc | CipherSuite::ThreeKeyTdesCbc => {
                tdes::mac_retail(&self.session_mac, data).map(|m| m.to_vec())
            }
            CipherSuite::Aes128Cbc => aes::aes_cmac(&self.session_mac, data, 8),
            CipherSuite::Sha1 | CipherSuite::Sha256 | CipherSuite::Sha512 => {
                Err(Error::Crypto("secure messaging requires a block cipher suite".into()))
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.state == SessionState::Live
    }

    /// Forces the session closed; any fatal error (MAC mismatch, RND
    /// mismatch, transport failure) must call this before surfacing the
    /// error, per spec §4.C7's "the engine must not retry silently".
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    pub fn ssc(&self) -> u64 {
        self.ssc
    }

    fn advance_ssc(&mut self) {
        self.ssc = self.ssc.wrapping_add(1);
    }

    /// Wraps a plaintext APDU for transmission according to `self.req_level`
    /// (spec §4.C8 outbound steps 1-6). Returns the protected wire bytes.
    pub fn wrap(&mut self, apdu: &Apdu) -> Result<Vec<u8>> {
        if !self.is_live() {
            return Err(Error::NoSession);
        }
        match self.req_level {
            SecurityLevel::Plain => apdu.encode(),
            SecurityLevel::Mac | SecurityLevel::Encrypted => self.wrap_protected(apdu),
        }
    }

    fn wrap_protected(&mut self, apdu: &Apdu) -> Result<Vec<u8>> {
        self.advance_ssc();

        let mut cla = apdu.cla | 0x0C;
        let header = pad7816_to(&[cla, apdu.ins, apdu.p1, apdu.p2], self.block_size());

        let mut body_tlv = Vec::new();
        if self.req_level == SecurityLevel::Encrypted && !apdu.body.is_empty() {
            let mut padded = pad7816_to(&apdu.body, self.block_size());
            self.encrypt_block(&mut padded)?;
            let mut value = vec![0x01];
            value.extend_from_slice(&padded);
            body_tlv = tlv::encode(&[TlvNode::primitive(0x87, value)]);
        } else if !apdu.body.is_empty() {
            body_tlv = tlv::encode(&[TlvNode::primitive(0x87, apdu.body.clone())]);
        }

        // DO'97' carries the original (plaintext) Le and is only present
        // when the caller actually requested a response; a command with no
        // Le must not introduce one, or the MAC input diverges from what
        // the card computes.
        let trailer_tlv = match apdu.le {
            Some(le) => {
                let wire = if le >= 256 { 0u8 } else { le as u8 };
                tlv::encode(&[TlvNode::primitive(0x97, vec![wire])])
            }
            None => Vec::new(),
        };

        let mut mac_input = self.ssc.to_be_bytes().to_vec();
        mac_input.extend_from_slice(&header);
        mac_input.extend_from_slice(&body_tlv);
        mac_input.extend_from_slice(&trailer_tlv);
        let mac = self.mac_tag(&pad7816_to(&mac_input, self.block_size()))?;
        let mac_tlv = tlv::encode(&[TlvNode::primitive(0x8E, mac)]);

        let mut protected_body = Vec::new();
        protected_body.extend_from_slice(&body_tlv);
        protected_body.extend_from_slice(&mac_tlv);

        cla = apdu.cla | 0x0C;
        let wrapped = Apdu::new(cla, apdu.ins, apdu.p1, apdu.p2, protected_body, apdu.le.or(Some(256)))?;
        wrapped.encode()
    }

    /// Unwraps a card response per `self.resp_level` (spec §4.C8 inbound
    /// steps 1-4). `response_body` is the APDU body with the SW1SW2
    /// trailer already stripped by [`crate::apdu::decode_response`].
    pub fn unwrap(&mut self, response_body: &[u8], sw: u16) -> Result<Vec<u8>> {
        if !self.is_live() {
            return Err(Error::NoSession);
        }
        if self.resp_level == SecurityLevel::Plain {
            return Ok(response_body.to_vec());
        }

        let nodes = tlv::parse(response_body)?;
        self.advance_ssc();

        if self.resp_level == SecurityLevel::Mac || self.resp_level == SecurityLevel::Encrypted {
            let received_mac = tlv::find(&nodes, 0x8E)
                .ok_or_else(|| Error::MacInvalid)?
                .value
                .clone();
            let mut mac_input = self.ssc.to_be_bytes().to_vec();
            for node in &nodes {
                if node.tag == 0x8E {
                    continue;
                }
                mac_input.extend_from_slice(&tlv::encode(std::slice::from_ref(node)));
            }
            mac_input.extend_from_slice(&[0x99, 0x02, (sw >> 8) as u8, (sw & 0xFF) as u8]);
            let expected_mac = self.mac_tag(&pad7816_to(&mac_input, self.block_size()))?;
            if expected_mac.ct_eq(received_mac.as_slice()).unwrap_u8() != 1 {
                self.close();
                return Err(Error::MacInvalid);
            }
        }

        if self.resp_level == SecurityLevel::Encrypted {
            if let Some(enc_node) = tlv::find(&nodes, 0x87).or_else(|| tlv::find(&nodes, 0x85)) {
                let mut ciphertext = enc_node.value.clone();
                if ciphertext.first() == Some(&0x01) {
                    ciphertext.remove(0);
                }
                if ciphertext.len() % self.block_size() != 0 {
                    return Err(Error::TlvMalformed("encrypted body TLV is not block-aligned".into()));
                }
                self.decrypt_block(&mut ciphertext)?;
                return Ok(strip_7816_padding(&ciphertext));
            }
            return Ok(Vec::new());
        }

        Ok(response_body.to_vec())
    }
}

/// ISO/IEC 7816-4 padding: append `0x80` then `0x00` bytes to the next
/// `block_size`-byte boundary (used for the MAC input, not only the
/// encrypted body; `block_size` is 8 for the 3DES suites, 16 for AES).
fn pad7816_to(data: &[u8], block_size: usize) -> Vec<u8> {
    let mut out = data.to_vec();
    out.push(0x80);
    while out.len() % block_size != 0 {
        out.push(0x00);
    }
    out
}

fn strip_7816_padding(data: &[u8]) -> Vec<u8> {
    match data.iter().rposition(|&b| b != 0x00) {
        Some(i) if data[i] == 0x80 => data[..i].to_vec(),
        _ => data.to_vec(),
    }
}
