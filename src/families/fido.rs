//! FIDO U2F registration and authentication response handling (spec §4.C7
//! "VAS/FIDO" variant note — no symmetric mutual authentication).
//!
//! AID and command layout follow the FIDO Alliance's published "FIDO U2F
//! NFC Protocol" / "FIDO U2F Raw Message Formats" specs, which
//! `original_source/client/src/cmdhffido.c`'s `CmdHFFidoRegister`/
//! `CmdHFFidoAuthenticate` wrap without restating (the wire layout is
//! reconstructed from how `cmdhffido.c` indexes into the raw response —
//! `buf[0]`/`buf[1..66]`/`buf[66]`/`buf[67..]` for registration, `buf[0]`/
//! `buf[1..5]`/`buf[5..]` for authentication — rather than from a retrieved
//! `fidocore.c`, which this pack didn't include).

use crate::apdu::Apdu;
use crate::crypto::ecc::{self, Verdict};
use crate::error::{Error, Result};
use p256::elliptic_curve::sec1::FromEncodedPoint;
use p256::EncodedPoint;
use x509_cert::der::Decode;
use x509_cert::Certificate;

const U2F_CLA: u8 = 0x00;
const U2F_INS_REGISTER: u8 = 0x01;
const U2F_INS_AUTHENTICATE: u8 = 0x02;
/// P1 "enforce-user-presence-and-sign" control byte for U2F_AUTHENTICATE.
const U2F_P1_ENFORCE_USER_PRESENCE_AND_SIGN: u8 = 0x03;
const REGISTRATION_RESERVED_BYTE: u8 = 0x05;

pub fn build_register_request(challenge_param: &[u8; 32], application_param: &[u8; 32]) -> Result<Apdu> {
    let mut body = Vec::with_capacity(64);
    body.extend_from_slice(challenge_param);
    body.extend_from_slice(application_param);
    Apdu::new(U2F_CLA, U2F_INS_REGISTER, 0x00, 0x00, body, Some(256))
}

pub fn build_authenticate_request(challenge_param: &[u8; 32], application_param: &[u8; 32], key_handle: &[u8]) -> Result<Apdu> {
    if key_handle.len() > 255 {
        return Err(Error::InvalidArgument("U2F key handle longer than 255 bytes".into()));
    }
    let mut body = Vec::with_capacity(65 + key_handle.len());
    body.extend_from_slice(challenge_param);
    body.extend_from_slice(application_param);
    body.push(key_handle.len() as u8);
    body.extend_from_slice(key_handle);
    Apdu::new(U2F_CLA, U2F_INS_AUTHENTICATE, U2F_P1_ENFORCE_USER_PRESENCE_AND_SIGN, 0x00, body, Some(256))
}

/// A parsed `U2F_REGISTER` response, before its attestation signature is
/// checked.
pub struct Registration {
    pub user_public_key: [u8; 65],
    pub key_handle: Vec<u8>,
    pub attestation_cert_der: Vec<u8>,
    pub signature_der: Vec<u8>,
}

/// Parses the raw registration response body: reserved byte `0x05`, a
/// 65-byte uncompressed user public key, a length-prefixed key handle, a
/// DER attestation certificate whose length is read from its own ASN.1
/// header, and a trailing DER ECDSA signature.
pub fn parse_registration_response(buf: &[u8]) -> Result<Registration> {
    if buf.is_empty() || buf[0] != REGISTRATION_RESERVED_BYTE {
        return Err(Error::CryptogramInvalid(format!("U2F registration response reserved byte is {:#04x}, expected 0x05", buf.first().copied().unwrap_or(0))));
    }
    if buf.len() < 67 {
        return Err(Error::CryptogramInvalid("U2F registration response shorter than the fixed public-key/key-handle-length prefix".into()));
    }
    let user_public_key: [u8; 65] = buf[1..66].try_into().unwrap();
    let key_handle_len = buf[66] as usize;
    let key_handle_start = 67;
    let key_handle_end = key_handle_start + key_handle_len;
    if buf.len() < key_handle_end + 4 {
        return Err(Error::CryptogramInvalid("U2F registration response truncated before attestation certificate".into()));
    }
    let key_handle = buf[key_handle_start..key_handle_end].to_vec();

    // The attestation certificate is DER; its own length header (a BER
    // SEQUENCE tag `0x30` followed by a two-byte long-form length, per
    // `cmdhffido.c`'s `(buf[derp+2] << 8) + buf[derp+3] + 4`) is read
    // before slicing it out, rather than assumed from the response length.
    let cert_start = key_handle_end;
    let cert_len = ((buf[cert_start + 2] as usize) << 8) + buf[cert_start + 3] as usize + 4;
    if buf.len() < cert_start + cert_len {
        return Err(Error::CryptogramInvalid("U2F registration response truncated inside attestation certificate".into()));
    }
    let attestation_cert_der = buf[cert_start..cert_start + cert_len].to_vec();
    let signature_der = buf[cert_start + cert_len..].to_vec();
    if signature_der.is_empty() {
        return Err(Error::CryptogramInvalid("U2F registration response missing attestation signature".into()));
    }

    Ok(Registration { user_public_key, key_handle, attestation_cert_der, signature_der })
}

/// Verifies a registration's attestation signature, over the message the
/// FIDO U2F raw message format defines: `0x00 ‖ application_param ‖
/// challenge_param ‖ key_handle ‖ user_public_key`, under the public key
/// carried in the attestation certificate.
pub fn verify_registration(registration: &Registration, challenge_param: &[u8; 32], application_param: &[u8; 32]) -> Result<Verdict> {
    let public_key = attestation_public_key(&registration.attestation_cert_der)?;

    let mut message = Vec::with_capacity(1 + 32 + 32 + registration.key_handle.len() + 65);
    message.push(0x00);
    message.extend_from_slice(application_param);
    message.extend_from_slice(challenge_param);
    message.extend_from_slice(&registration.key_handle);
    message.extend_from_slice(&registration.user_public_key);

    ecc::ecdsa_verify(&public_key, &message, &registration.signature_der)
}

fn attestation_public_key(cert_der: &[u8]) -> Result<p256::AffinePoint> {
    let cert = Certificate::from_der(cert_der).map_err(|e| Error::CryptogramInvalid(format!("malformed attestation certificate: {e}")))?;
    let spki = &cert.tbs_certificate.subject_public_key_info;
    let raw = spki
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| Error::CryptogramInvalid("attestation certificate public key is not an octet-aligned bit string".into()))?;
    let point = EncodedPoint::from_bytes(raw).map_err(|e| Error::CryptogramInvalid(format!("attestation certificate key is not a valid EC point: {e}")))?;
    let public_key = p256::PublicKey::from_encoded_point(&point)
        .into_option()
        .ok_or_else(|| Error::CryptogramInvalid("attestation certificate key does not lie on P-256".into()))?;
    Ok(*public_key.as_affine())
}

/// A parsed `U2F_AUTHENTICATE` response, before its signature is checked.
pub struct Authentication {
    pub user_presence_verified: bool,
    pub counter: u32,
    pub signature_der: Vec<u8>,
}

pub fn parse_authenticate_response(buf: &[u8]) -> Result<Authentication> {
    if buf.len() < 6 {
        return Err(Error::CryptogramInvalid("U2F authenticate response shorter than the presence/counter prefix".into()));
    }
    let counter = u32::from_be_bytes(buf[1..5].try_into().unwrap());
    Ok(Authentication {
        user_presence_verified: buf[0] != 0,
        counter,
        signature_der: buf[5..].to_vec(),
    })
}

/// Verifies an authentication signature over `application_param ‖
/// user_presence_byte ‖ counter ‖ challenge_param`, under the public key
/// returned at registration time.
pub fn verify_authentication(authentication: &Authentication, public_key: &p256::AffinePoint, challenge_param: &[u8; 32], application_param: &[u8; 32]) -> Result<Verdict> {
    let mut message = Vec::with_capacity(32 + 1 + 4 + 32);
    message.extend_from_slice(application_param);
    message.push(if authentication.user_presence_verified { 0x01 } else { 0x00 });
    message.extend_from_slice(&authentication.counter.to_be_bytes());
    message.extend_from_slice(challenge_param);
    ecc::ecdsa_verify(public_key, &message, &authentication.signature_der)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_response_rejects_wrong_reserved_byte() {
        let buf = vec![0x04u8; 10];
        assert!(matches!(parse_registration_response(&buf), Err(Error::CryptogramInvalid(_))));
    }

    #[test]
    fn registration_response_rejects_truncated_prefix() {
        let mut buf = vec![0x05u8];
        buf.extend_from_slice(&[0u8; 30]);
        assert!(matches!(parse_registration_response(&buf), Err(Error::CryptogramInvalid(_))));
    }

    #[test]
    fn authenticate_response_parses_presence_and_counter() {
        let mut buf = vec![0x01, 0x00, 0x00, 0x00, 0x2A];
        buf.extend_from_slice(&[0x30, 0x02, 0x01, 0x00]);
        let parsed = parse_authenticate_response(&buf).unwrap();
        assert!(parsed.user_presence_verified);
        assert_eq!(parsed.counter, 42);
    }

    #[test]
    fn authenticate_request_rejects_oversized_key_handle() {
        let challenge = [0u8; 32];
        let application = [0u8; 32];
        let key_handle = vec![0u8; 256];
        assert!(build_authenticate_request(&challenge, &application, &key_handle).is_err());
    }

    #[test]
    fn register_request_lays_out_challenge_then_application() {
        let challenge = [0xAAu8; 32];
        let application = [0xBBu8; 32];
        let apdu = build_register_request(&challenge, &application).unwrap();
        assert_eq!(&apdu.body[..32], &challenge);
        assert_eq!(&apdu.body[32..], &application);
    }
}
