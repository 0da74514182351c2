//! Session orchestrator (spec §4.C10): the top-level verbs `info`, `select`,
//! `auth`, `read`, `write`, `manage-keys`, `decrypt` the CLI dispatches into.
//!
//! Replaces the source's global mutable `keys[]` array and APDU-log flag
//! (spec §9) with an explicit [`Context`] threaded through every verb; the
//! key store is a field of the context rather than process-wide state. Each
//! verb is atomic per spec §4.C10: on the first failed sub-step it tears
//! down any live session and returns, rather than leaving partial state
//! behind (the `FieldGuard` RAII type in [`crate::transport`] guarantees the
//! RF field itself is dropped on every exit path unless `keep_field` was
//! requested).

use crate::apdu::Apdu;
use crate::crypto::ecc;
use crate::cryptogram;
use crate::error::{Error, Result};
use crate::families::{cipurse, desfire, emrtd, fido, seos, vas, AuthFamily, Family};
use crate::keystore::{KeyField, KeyStore};
use crate::select;
use crate::session::{SecurityLevel, Session};
use crate::transport::{FieldGuard, PollingMode, Transport};

/// Everything a verb needs, explicit rather than global (spec §9's
/// re-architecture note). Owns the transport, the key store, and whatever
/// session the last `auth` verb produced.
pub struct Context {
    pub transport: Box<dyn Transport>,
    pub keystore: KeyStore,
    pub session: Option<Session>,
    /// Per-context setting replacing the source's global APDU-log flag.
    pub log_apdus: bool,
}

impl Context {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport, keystore: KeyStore::new(), session: None, log_apdus: false }
    }

    /// `info`: selects the family's AID and reports its identity and raw FCI.
    pub fn info(&mut self, family: Family, keep_field: bool) -> Result<String> {
        let mut guard = FieldGuard::new(self.transport.as_mut());
        let selected = select::select_aid(guard.transport(), family)?;
        if keep_field {
            guard.disarm();
        }
        Ok(format!("family: {}\naid: {}\nfci: {}", family.name(), hex::encode_upper(selected.aid), hex::encode(&selected.fci)))
    }

    /// `select`: selects the family AID, then optionally an elementary file
    /// by FID under it. Returns the raw bytes of the last successful select.
    pub fn select(&mut self, family: Family, fid: Option<u16>, keep_field: bool) -> Result<Vec<u8>> {
        let mut guard = FieldGuard::new(self.transport.as_mut());
        let selected = select::select_aid(guard.transport(), family)?;
        let out = match fid {
            Some(fid) => select::select_file(guard.transport(), fid)?,
            None => selected.fci,
        };
        self.session = None;
        if keep_field {
            guard.disarm();
        }
        Ok(out)
    }

    /// `auth`: runs the named family's mutual-authentication engine with
    /// the key slot `ki` and installs the resulting [`Session`]. On any
    /// failure the context is left with no session (spec §4.C7: "the
    /// engine must not retry silently").
    pub fn auth(&mut self, request: AuthRequest, keep_field: bool) -> Result<()> {
        self.session = None;
        let slot = match &request {
            AuthRequest::Desfire { ki } | AuthRequest::Cipurse { ki, .. } | AuthRequest::Seos { ki, .. } => Some(*self.keystore.slot(*ki)?),
            _ => None,
        };

        let mut guard = FieldGuard::new(self.transport.as_mut());

        let session = match request {
            AuthRequest::Emrtd { mrz } => {
                select::select_aid(guard.transport(), Family::Emrtd)?;
                let ctx = emrtd::Context::from_mrz(&mrz);
                emrtd::Emrtd::authenticate(guard.transport(), &ctx)?
            }
            AuthRequest::Desfire { ki } => {
                let slot = slot.expect("desfire slot resolved above");
                select::select_aid(guard.transport(), Family::Desfire)?;
                let ctx = desfire::Context { key: slot.read_key, key_number: ki as u8 };
                desfire::Desfire::authenticate(guard.transport(), &ctx)?
            }
            AuthRequest::Cipurse { ki: _, req_level, resp_level } => {
                let slot = slot.expect("cipurse slot resolved above");
                select::select_aid(guard.transport(), Family::Cipurse)?;
                let ctx = cipurse::Context { key: slot.read_key, req_level, resp_level };
                cipurse::Cipurse::authenticate(guard.transport(), &ctx)?
            }
            AuthRequest::Seos { ki, oid } => {
                let slot = slot.expect("seos slot resolved above");
                select::select_aid(guard.transport(), Family::Seos)?;
                let adf_response = select::select_seos_oid(guard.transport(), &oid)?;
                let (algorithm, hash_algorithm, ciphertext) = cryptogram::parse_adf_response(&adf_response)?;
                let adf = cryptogram::decode_seos_adf(&ciphertext, &slot.read_key, algorithm, &oid)?;
                let ctx = seos::Context {
                    read_key: slot.read_key,
                    keyslot: ki as u8,
                    diversifier: adf.diversifier,
                    rnd_icc: adf.rnd_icc,
                    encryption_algorithm: algorithm,
                    hash_algorithm,
                };
                seos::Seos::authenticate(guard.transport(), &ctx)?
            }
            AuthRequest::NoMutualAuth { family } => {
                return Err(Error::InvalidArgument(format!("{} has no symmetric mutual-authentication handshake; use select/decrypt instead", family.name())));
            }
        };

        self.session = Some(session);
        if keep_field {
            guard.disarm();
        }
        Ok(())
    }

    /// `read`: READ BINARY against `fid` at `offset`, wrapped through the
    /// live session's secure-messaging layer if one is installed, plain
    /// otherwise.
    pub fn read(&mut self, fid: Option<u16>, offset: u16, keep_field: bool) -> Result<Vec<u8>> {
        let mut guard = FieldGuard::new(self.transport.as_mut());
        if let Some(fid) = fid {
            select::select_file(guard.transport(), fid)?;
        }
        let p1 = (offset >> 8) as u8;
        let p2 = (offset & 0xFF) as u8;
        let apdu = Apdu::new(0x00, 0xB0, p1, p2, vec![], Some(256))?;
        let result = exchange_secure(guard.transport(), &mut self.session, &apdu);
        if result.is_err() {
            self.session = None;
        }
        let (body, sw) = result?;
        if !crate::apdu::is_success(sw) {
            return Err(Error::FileNotFound(fid.unwrap_or(0)));
        }
        if keep_field {
            guard.disarm();
        }
        Ok(body)
    }

    /// `write`: UPDATE BINARY against `fid` at `offset` with `data`.
    pub fn write(&mut self, fid: Option<u16>, offset: u16, data: &[u8], keep_field: bool) -> Result<()> {
        let mut guard = FieldGuard::new(self.transport.as_mut());
        if let Some(fid) = fid {
            select::select_file(guard.transport(), fid)?;
        }
        let p1 = (offset >> 8) as u8;
        let p2 = (offset & 0xFF) as u8;
        let apdu = Apdu::new(0x00, 0xD6, p1, p2, data.to_vec(), None)?;
        let result = exchange_secure(guard.transport(), &mut self.session, &apdu);
        if result.is_err() {
            self.session = None;
        }
        let (_, sw) = result?;
        if !crate::apdu::is_success(sw) {
            return Err(Error::FileNotFound(fid.unwrap_or(0)));
        }
        if keep_field {
            guard.disarm();
        }
        Ok(())
    }

    /// `manage-keys`: direct access to the key store (spec §4.C5).
    pub fn manage_keys(&mut self, op: KeyStoreOp) -> Result<Option<String>> {
        match op {
            KeyStoreOp::Load { path } => {
                self.keystore = KeyStore::load(path)?;
                Ok(None)
            }
            KeyStoreOp::Save { path } => {
                self.keystore.save(path)?;
                Ok(None)
            }
            KeyStoreOp::Print { verbose } => Ok(Some(self.keystore.print(verbose))),
            KeyStoreOp::Set { slot, field, bytes } => {
                self.keystore.set(slot, field, &bytes)?;
                Ok(None)
            }
        }
    }

    /// `decrypt` (VAS-only): decrypts a captured VAS cryptogram with a
    /// reader private key read from SEC1 DER, given the ASCII Pass Type ID.
    pub fn decrypt_vas(&self, privkey_der: &[u8], pid_ascii: &str, cryptogram_hex: &str) -> Result<cryptogram::VasPayload> {
        let key = p256::SecretKey::from_sec1_der(privkey_der).map_err(|e| Error::Crypto(format!("malformed EC private key: {e}")))?;
        let cryptogram_bytes = hex::decode(cryptogram_hex).map_err(|e| Error::InvalidArgument(format!("malformed cryptogram hex: {e}")))?;
        let pid_hash: [u8; 32] = {
            use sha2::{Digest, Sha256};
            Sha256::digest(pid_ascii.as_bytes()).into()
        };
        cryptogram::decode_vas(&cryptogram_bytes, &key, &pid_hash)
    }

    /// Re-polls the field in `mode`; used before a VAS-only selection so the
    /// scan doesn't wake ordinary 14443 cards (spec §4.C1).
    pub fn poll(&mut self, mode: PollingMode) -> Result<Vec<u8>> {
        self.transport.poll(mode)
    }
}

/// Sends `apdu` through the live session's wrap/unwrap pair when one is
/// installed (spec §9's single entry point replacing per-command
/// plain/MAC/encrypted branching), or plain when none is. Takes the
/// transport and session fields explicitly rather than `&mut self` so
/// callers can hold them through an active [`FieldGuard`] borrow.
fn exchange_secure(transport: &mut dyn Transport, session: &mut Option<Session>, apdu: &Apdu) -> Result<(Vec<u8>, u16)> {
    let wire = match session {
        Some(s) if s.is_live() => s.wrap(apdu)?,
        Some(_) => return Err(Error::NoSession),
        None => apdu.encode()?,
    };
    let raw = transport.exchange(&wire)?;
    let (body, sw) = crate::apdu::decode_response(&raw)?;
    match session {
        Some(s) if s.is_live() => {
            let plain = s.unwrap(&body, sw)?;
            Ok((plain, sw))
        }
        _ => Ok((body, sw)),
    }
}

/// Per-family inputs to [`Context::auth`]; the orchestrator dispatches on
/// this rather than branching on `Family` at every call site.
pub enum AuthRequest {
    Emrtd { mrz: String },
    Desfire { ki: usize },
    Cipurse { ki: usize, req_level: SecurityLevel, resp_level: SecurityLevel },
    Seos { ki: usize, oid: Vec<u8> },
    /// VAS and FIDO: reported as an error, not attempted, per spec §4.C7's
    /// "VAS/FIDO" variant note (no symmetric mutual-auth).
    NoMutualAuth { family: Family },
}

pub enum KeyStoreOp {
    Load { path: String },
    Save { path: String },
    Print { verbose: bool },
    Set { slot: usize, field: KeyField, bytes: Vec<u8> },
}

/// Verifies a FIDO `U2F_REGISTER` response's attestation signature, exposed
/// at the orchestrator boundary so the CLI's `auth` verb can report FIDO
/// attestation status without reaching into `families::fido` directly.
pub fn verify_fido_registration(registration: &fido::Registration, challenge_param: &[u8; 32], application_param: &[u8; 32]) -> Result<ecc::Verdict> {
    fido::verify_registration(registration, challenge_param, application_param)
}

/// Builds a VAS `GET VAS DATA` request APDU for `select`-verb callers that
/// want the full VAS flow (SELECT, then this) rather than the generic
/// `select_aid`; kept here rather than duplicated in the CLI layer.
pub fn build_vas_request(pid_hash: Option<&[u8; 32]>, url: Option<&str>) -> Result<Apdu> {
    vas::build_get_vas_data_request(pid_hash, url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use hex_literal::hex;

    fn ctx_with(responses: Vec<Vec<u8>>) -> Context {
        Context::new(Box::new(MockTransport::new(responses)))
    }

    #[test]
    fn info_selects_aid_and_reports_fci() {
        let mut ctx = ctx_with(vec![hex!("6F108407A0000002471001A5055003454D529000").to_vec()]);
        let report = ctx.info(Family::Emrtd, false).unwrap();
        assert!(report.contains("icao-emrtd-bac"));
        assert!(report.contains("A0000002471001"));
    }

    #[test]
    fn auth_leaves_no_session_on_mismatched_mac() {
        let mut ctx = ctx_with(vec![
            hex!("6F108407A0000002471001A5055003454D529000").to_vec(),
            hex!("AABBCCDDEEFF00119000").to_vec(),
            {
                let mut resp = vec![0u8; 40];
                resp.push(0x90);
                resp.push(0x00);
                resp
            },
        ]);
        let result = ctx.auth(AuthRequest::Emrtd { mrz: "L898902C<369080619406236".into() }, false);
        assert!(result.is_err());
        assert!(ctx.session.is_none());
    }

    #[test]
    fn read_without_a_session_sends_plain_apdu() {
        let mut ctx = ctx_with(vec![vec![0x01, 0x02, 0x03, 0x90, 0x00]]);
        let data = ctx.read(None, 0, false).unwrap();
        assert_eq!(data, vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn read_fails_closed_on_error_status_word() {
        let mut ctx = ctx_with(vec![vec![0x6A, 0x82]]);
        assert!(ctx.read(Some(0x0101), 0, false).is_err());
    }

    #[test]
    fn manage_keys_round_trips_a_field_through_print() {
        let mut ctx = ctx_with(vec![]);
        ctx.manage_keys(KeyStoreOp::Set { slot: 0, field: KeyField::Read, bytes: vec![0x11; 16] }).unwrap();
        let printed = ctx.manage_keys(KeyStoreOp::Print { verbose: true }).unwrap().unwrap();
        assert!(printed.contains("1111111111111111111111111111111"));
    }

    #[test]
    fn vas_and_fido_have_no_mutual_auth_handshake() {
        let mut ctx = ctx_with(vec![]);
        let result = ctx.auth(AuthRequest::NoMutualAuth { family: Family::Vas }, false);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn auth_rejects_unknown_key_slot_before_touching_the_transport() {
        let mut ctx = ctx_with(vec![]);
        let result = ctx.auth(AuthRequest::Desfire { ki: 99 }, false);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}
