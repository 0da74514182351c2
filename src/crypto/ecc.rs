//! ECDH P-256, ECDSA-P256 verification, and compressed-point decompression
//! (spec §4.C4).
//!
//! Grounded on `mbedtls_ecdh_compute_shared`/`mbedtls_ecp_decompress` in
//! `original_source/client/src/cmdhfvas.c` and the FIDO attestation
//! signature check in `cmdhffido.c`, re-expressed with `p256`'s typed API
//! rather than hand-rolled big-integer modular arithmetic.

use crate::error::{Error, Result};
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::{AffinePoint, EncodedPoint, PublicKey, SecretKey};

#[derive(Debug, Eq, PartialEq)]
pub enum Verdict {
    Valid,
    Invalid,
}

/// Decompresses a 33-byte SEC1-compressed point (leading `0x02`/`0x03` sign
/// byte, matching the form VAS cryptograms carry the mobile ephemeral key
/// in) into an uncompressed public key on the P-256 curve.
pub fn decompress_point(compressed: &[u8; 33]) -> Result<PublicKey> {
    let point = EncodedPoint::from_bytes(compressed)
        .map_err(|e| Error::Crypto(format!("invalid compressed point: {e}")))?;
    PublicKey::from_encoded_point(&point)
        .into_option()
        .ok_or_else(|| Error::Crypto("compressed point does not lie on P-256".into()))
}

/// Builds a P-256 public key from a bare 32-byte x-coordinate, assuming
/// even-y (sign byte `0x02`) — the convention VAS cryptograms use for the
/// mobile ephemeral key.
pub fn public_key_from_x(xcoord: &[u8; 32]) -> Result<PublicKey> {
    let mut compressed = [0u8; 33];
    compressed[0] = 0x02;
    compressed[1..].copy_from_slice(xcoord);
    decompress_point(&compressed)
}

/// ECDH over P-256: returns the 32-byte x-coordinate of the shared point.
pub fn ecdh_shared_secret(local_private: &SecretKey, peer_public: &PublicKey) -> [u8; 32] {
    let shared = p256::ecdh::diffie_hellman(local_private.to_nonzero_scalar(), peer_public.as_affine());
    let mut out = [0u8; 32];
    out.copy_from_slice(shared.raw_secret_bytes().as_slice());
    out
}

/// Verifies an ASN.1 DER-encoded ECDSA-P256 signature over `message`.
pub fn ecdsa_verify(public_key: &AffinePoint, message: &[u8], der_signature: &[u8]) -> Result<Verdict> {
    let verifying_key = VerifyingKey::from_affine(*public_key)
        .map_err(|e| Error::Crypto(format!("invalid verifying key: {e}")))?;
    let signature = Signature::from_der(der_signature)
        .map_err(|e| Error::Crypto(format!("malformed DER signature: {e}")))?;
    match verifying_key.verify(message, &signature) {
        Ok(()) => Ok(Verdict::Valid),
        Err(_) => Ok(Verdict::Invalid),
    }
}

/// Computes the first 4 bytes of SHA-256(Q.X) — the VAS private-key hint.
pub fn key_hint(private_key: &SecretKey) -> [u8; 4] {
    use sha2::{Digest, Sha256};
    let point = private_key.public_key().to_encoded_point(false);
    let xcoord = point.x().expect("uncompressed point always has an x-coordinate");
    let hash = Sha256::digest(xcoord);
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::elliptic_curve::sec1::FromEncodedPoint;

    /// Scenario 3 of spec §8: all-zero Q.X test vector.
    #[test]
    fn key_hint_matches_all_zero_test_vector() {
        use sha2::{Digest, Sha256};
        let xcoord = [0u8; 32];
        let hash = Sha256::digest(xcoord);
        assert_eq!(&hash[..4], &hex_literal::hex!("66687AAD"));
    }

    #[test]
    fn ecdh_is_symmetric_between_two_parties() {
        let alice = SecretKey::random(&mut rand::thread_rng());
        let bob = SecretKey::random(&mut rand::thread_rng());
        let secret_a = ecdh_shared_secret(&alice, &bob.public_key());
        let secret_b = ecdh_shared_secret(&bob, &alice.public_key());
        assert_eq!(secret_a, secret_b);
    }

    #[test]
    fn decompress_point_round_trips_through_compression() {
        let key = SecretKey::random(&mut rand::thread_rng());
        let encoded = key.public_key().to_encoded_point(true);
        let compressed: [u8; 33] = encoded.as_bytes().try_into().unwrap();
        let decompressed = decompress_point(&compressed).unwrap();
        assert_eq!(decompressed, key.public_key());
    }

    #[test]
    fn ecdsa_verify_detects_single_byte_tamper() {
        use p256::ecdsa::{signature::Signer, Signature, SigningKey};
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let verifying_point = *signing_key.verifying_key().as_affine();
        let message = b"00 | AP | CP | KH | PK";
        let signature: Signature = signing_key.sign(message);
        let der = signature.to_der();
        assert_eq!(ecdsa_verify(&verifying_point, message, der.as_bytes()).unwrap(), Verdict::Valid);

        let mut tampered = message.to_vec();
        tampered[0] ^= 0x01;
        assert_eq!(ecdsa_verify(&verifying_point, &tampered, der.as_bytes()).unwrap(), Verdict::Invalid);
    }

    #[test]
    fn public_key_from_x_produces_a_point_on_the_curve() {
        let key = SecretKey::random(&mut rand::thread_rng());
        let encoded = key.public_key().to_encoded_point(false);
        let xcoord: [u8; 32] = encoded.x().unwrap().as_slice().try_into().unwrap();
        assert!(public_key_from_x(&xcoord).is_ok());
    }
}
