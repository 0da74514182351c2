//! Application selection (spec §4.C6).
//!
//! Iterates the compiled-in AID table [`crate::families::candidate_aids`]
//! returns for a family, issuing SELECT-by-name for each until one succeeds.
//! Grounded on the existing `select_dedicated_file`/`select_elementary_file`
//! (`00 A4 04 0C Lc AID` / `00 A4 02 0C 02 FID`): the P1/P2 convention (select
//! by DF name, first-or-only occurrence; select EF under the current DF by
//! file identifier) carries over unchanged. SEOS's second-stage SELECT by
//! ADF-OID is grounded on `original_source/client/src/cmdhfseos.c`'s
//! `seos_pacs_adf_select` (`80 A5 04 00 Lc 06 Loid OID 00`).

use crate::apdu::{self, Apdu};
use crate::error::{Error, Result};
use crate::families::{candidate_aids, Family};
use crate::transport::Transport;

const SELECT_INS: u8 = 0xA4;
const SELECT_BY_NAME_P1: u8 = 0x04;
const SELECT_BY_FID_P1: u8 = 0x02;
const SELECT_FIRST_OCCURRENCE_P2: u8 = 0x0C;

/// `SELECT` with AID `A5` (proprietary, used by SEOS to select an ADF by OID
/// rather than by file identifier or DF name).
const SELECT_BY_OID_CLA: u8 = 0x80;
const SELECT_BY_OID_INS: u8 = 0xA5;
const SELECT_BY_OID_P1: u8 = 0x04;
const SELECT_BY_OID_P2: u8 = 0x00;

/// The AID that matched and the raw FCI body returned alongside SW `9000`.
pub struct Selected {
    pub aid: &'static [u8],
    pub fci: Vec<u8>,
}

/// Tries each of `family`'s candidate AIDs in order (spec §4.C6: "iterates a
/// compiled-in table of candidate AIDs per family"); the first one that
/// answers SW `9000` wins. Fails with [`Error::AidNotPresent`] if none do.
pub fn select_aid(transport: &mut dyn Transport, family: Family) -> Result<Selected> {
    for aid in candidate_aids(family) {
        let apdu = Apdu::new(0x00, SELECT_INS, SELECT_BY_NAME_P1, SELECT_FIRST_OCCURRENCE_P2, aid.to_vec(), Some(256))?;
        let raw = transport.exchange(&apdu.encode()?)?;
        let (fci, sw) = apdu::decode_response(&raw)?;
        if apdu::is_success(sw) {
            return Ok(Selected { aid, fci });
        }
    }
    Err(Error::AidNotPresent)
}

/// Selects an elementary file by its two-byte identifier under the
/// currently selected DF (used to reach individual eMRTD data groups once
/// the eMRTD AID is selected).
pub fn select_file(transport: &mut dyn Transport, fid: u16) -> Result<Vec<u8>> {
    let body = fid.to_be_bytes().to_vec();
    let apdu = Apdu::new(0x00, SELECT_INS, SELECT_BY_FID_P1, SELECT_FIRST_OCCURRENCE_P2, body, Some(256))?;
    let raw = transport.exchange(&apdu.encode()?)?;
    let (data, sw) = apdu::decode_response(&raw)?;
    if !apdu::is_success(sw) {
        return Err(Error::FileNotFound(fid));
    }
    Ok(data)
}

/// Selects the master file (`3F00`), the root of the eMRTD file tree.
pub fn select_master_file(transport: &mut dyn Transport) -> Result<()> {
    let apdu = Apdu::new(0x00, SELECT_INS, 0x00, SELECT_FIRST_OCCURRENCE_P2, vec![0x3F, 0x00], None)?;
    let raw = transport.exchange(&apdu.encode()?)?;
    let (_, sw) = apdu::decode_response(&raw)?;
    if !apdu::is_success(sw) {
        return Err(Error::FileNotFound(0x3F00));
    }
    Ok(())
}

/// SEOS-only: after the SEOS AID is selected, selects the ADF (Access
/// Domain / PACS descriptor) identified by `oid`. The response body is the
/// encrypted 64-byte ADF cryptogram that [`crate::cryptogram::decode_seos_adf`]
/// decrypts.
pub fn select_seos_oid(transport: &mut dyn Transport, oid: &[u8]) -> Result<Vec<u8>> {
    let mut body = vec![0x06, oid.len() as u8];
    body.extend_from_slice(oid);
    let apdu = Apdu::new(SELECT_BY_OID_CLA, SELECT_BY_OID_INS, SELECT_BY_OID_P1, SELECT_BY_OID_P2, body, Some(256))?;
    let raw = transport.exchange(&apdu.encode()?)?;
    let (data, sw) = apdu::decode_response(&raw)?;
    if !apdu::is_success(sw) {
        return Err(Error::FileNotFound(0));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn select_aid_returns_first_matching_candidate() {
        let mut t = MockTransport::new(vec![hex_literal::hex!("6F108407A0000002471001A5055003454D529000").to_vec()]);
        let selected = select_aid(&mut t, Family::Emrtd).unwrap();
        assert_eq!(selected.aid, &[0xA0, 0x00, 0x00, 0x02, 0x47, 0x10, 0x01]);
        assert!(!selected.fci.is_empty());
    }

    #[test]
    fn select_aid_fails_closed_when_no_candidate_matches() {
        let mut t = MockTransport::new(vec![vec![0x6A, 0x82]]);
        assert!(matches!(select_aid(&mut t, Family::Emrtd), Err(Error::AidNotPresent)));
    }

    #[test]
    fn select_file_fails_closed_on_file_not_found() {
        let mut t = MockTransport::new(vec![vec![0x6A, 0x82]]);
        assert!(matches!(select_file(&mut t, 0x0101), Err(Error::FileNotFound(0x0101))));
    }

    #[test]
    fn select_seos_oid_builds_06_tlv_body_and_returns_adf_cryptogram() {
        let mut cryptogram = vec![0xAAu8; 64];
        cryptogram.extend_from_slice(&[0x90, 0x00]);
        let mut t = MockTransport::new(vec![cryptogram]);
        let oid = hex_literal::hex!("2b0601040181e438010102011801010202");
        let data = select_seos_oid(&mut t, &oid).unwrap();
        assert_eq!(data.len(), 64);

        let sent = &t.sent()[0];
        assert_eq!(&sent[0..4], &[0x80, 0xA5, 0x04, 0x00]);
        assert_eq!(sent[4] as usize, 2 + oid.len());
        assert_eq!(sent[5], 0x06);
        assert_eq!(sent[6] as usize, oid.len());
        assert_eq!(&sent[7..7 + oid.len()], &oid[..]);
    }
}
