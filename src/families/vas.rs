//! Apple/HID Value-Added-Services cryptogram request/response framing
//! (spec §4.C7 "VAS" variant note — no symmetric mutual authentication).
//!
//! Grounded on `original_source/client/src/cmdhfvas.c`: `ParseSelectVASResponse`
//! (post-SELECT version/capability check), `CreateGetVASDataCommand` (the
//! proprietary `80 CA 01 P2` GET DATA request TLV), and
//! `ParseGetVASDataResponse` (cryptogram extraction). Decrypting the
//! extracted cryptogram itself is [`crate::cryptogram::decode_vas`]'s job;
//! this module only builds/parses the two APDUs that precede it.

use crate::apdu::Apdu;
use crate::error::{Error, Result};
use crate::tlv;

/// `P2` for a URL-only VAS request (no Pass Type ID hash).
pub const GET_VAS_URL_ONLY_P2: u8 = 0x00;
/// `P2` for a full VAS request (Pass Type ID hash present).
pub const GET_VAS_FULL_REQ_P2: u8 = 0x01;

const GET_VAS_DATA_CLA: u8 = 0x80;
const GET_VAS_DATA_INS: u8 = 0xCA;
const GET_VAS_DATA_P1: u8 = 0x01;

/// Validates the response to `SELECT` by AID "OSE.VAS.01": tag `9F21` must
/// read version `01 00`, and tag `9F23`'s fourth capability byte must have
/// bit 3 set (the bits `cmdhfvas.c`'s `ParseSelectVASResponse` checks).
pub fn parse_select_response(data: &[u8]) -> Result<()> {
    let nodes = tlv::parse(data)?;

    let version = tlv::find(&nodes, 0x9F21).ok_or_else(|| Error::CryptogramInvalid("VAS SELECT response missing 9F21 version".into()))?;
    if version.value != [0x01, 0x00] {
        return Err(Error::CryptogramInvalid(format!("unsupported VAS application version {:02X?}", version.value)));
    }

    let capabilities = tlv::find(&nodes, 0x9F23).ok_or_else(|| Error::CryptogramInvalid("VAS SELECT response missing 9F23 capabilities".into()))?;
    if capabilities.value.len() != 4 || capabilities.value[0..3] != [0x00, 0x00, 0x00] || capabilities.value[3] & 0x08 == 0 {
        return Err(Error::CryptogramInvalid(format!("VAS capabilities {:02X?} do not advertise cryptogram support", capabilities.value)));
    }
    Ok(())
}

/// One GET VAS DATA request: a Pass Type ID hash selects the full protocol
/// (reader identity proven via `9F25`), a bare URL selects the URL-only
/// variant that skips authentication altogether. At least one must be
/// present, matching `CreateGetVASDataCommand`'s `PM3_EINVARG` guard.
pub fn build_get_vas_data_request(pid_hash: Option<&[u8; 32]>, url: Option<&str>) -> Result<Apdu> {
    if pid_hash.is_none() && url.is_none() {
        return Err(Error::InvalidArgument("VAS request needs a Pass Type ID hash, a URL, or both".into()));
    }
    if let Some(url) = url {
        if url.len() > 256 {
            return Err(Error::InvalidArgument("VAS URL must be under 256 bytes".into()));
        }
    }

    let p2 = if pid_hash.is_none() { GET_VAS_URL_ONLY_P2 } else { GET_VAS_FULL_REQ_P2 };

    let mut body = Vec::new();
    body.extend_from_slice(&[0x9F, 0x22, 0x02, 0x01, 0x00]);
    body.extend_from_slice(&[0x9F, 0x28, 0x04, 0x00, 0x00, 0x00, 0x00]);
    body.extend_from_slice(&[0x9F, 0x26, 0x04, 0x00, 0x00, 0x00, 0x02]);
    if let Some(pid_hash) = pid_hash {
        body.extend_from_slice(&[0x9F, 0x25, 0x20]);
        body.extend_from_slice(pid_hash);
    }
    if let Some(url) = url {
        body.extend_from_slice(&[0x9F, 0x29, url.len() as u8]);
        body.extend_from_slice(url.as_bytes());
    }

    Apdu::new(GET_VAS_DATA_CLA, GET_VAS_DATA_INS, GET_VAS_DATA_P1, p2, body, Some(256))
}

/// Extracts the raw cryptogram bytes from tag `9F27` in the GET VAS DATA
/// response.
pub fn parse_get_vas_data_response(data: &[u8]) -> Result<Vec<u8>> {
    let nodes = tlv::parse(data)?;
    let cryptogram = tlv::find(&nodes, 0x9F27).ok_or_else(|| Error::CryptogramInvalid("GET VAS DATA response missing 9F27 cryptogram".into()))?;
    Ok(cryptogram.value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_response_accepts_known_good_tlv() {
        let mut data = vec![0x9F, 0x21, 0x02, 0x01, 0x00];
        data.extend_from_slice(&[0x9F, 0x23, 0x04, 0x00, 0x00, 0x00, 0x08]);
        parse_select_response(&data).unwrap();
    }

    #[test]
    fn select_response_rejects_missing_cryptogram_capability_bit() {
        let mut data = vec![0x9F, 0x21, 0x02, 0x01, 0x00];
        data.extend_from_slice(&[0x9F, 0x23, 0x04, 0x00, 0x00, 0x00, 0x00]);
        assert!(parse_select_response(&data).is_err());
    }

    #[test]
    fn url_only_request_omits_pid_hash_tlv_and_uses_p2_zero() {
        let apdu = build_get_vas_data_request(None, Some("https://example.com/pass")).unwrap();
        assert_eq!(apdu.p2, GET_VAS_URL_ONLY_P2);
        assert!(!apdu.body.windows(2).any(|w| w == [0x9F, 0x25]));
    }

    #[test]
    fn full_request_includes_pid_hash_and_uses_p2_one() {
        let apdu = build_get_vas_data_request(Some(&[0xAB; 32]), None).unwrap();
        assert_eq!(apdu.p2, GET_VAS_FULL_REQ_P2);
        assert!(apdu.body.windows(2).any(|w| w == [0x9F, 0x25]));
    }

    #[test]
    fn request_rejects_when_neither_pid_hash_nor_url_given() {
        assert!(build_get_vas_data_request(None, None).is_err());
    }

    #[test]
    fn get_vas_data_response_extracts_cryptogram_bytes() {
        let mut data = vec![0x9F, 0x27, 0x03, 0xAA, 0xBB, 0xCC];
        let cryptogram = parse_get_vas_data_response(&data).unwrap();
        assert_eq!(cryptogram, vec![0xAA, 0xBB, 0xCC]);
        data.clear();
        assert!(parse_get_vas_data_response(&data).is_err());
    }
}
