//! Cryptogram decoding (spec §4.C9): the SEOS ADF descriptor and the
//! Apple/HID VAS cryptogram both arrive as an opaque encrypted blob that
//! must be decrypted and picked apart before the rest of the stack can use
//! it. FIDO's registration response needs no decryption (only a signature
//! check) and is handled directly in [`crate::families::fido`].

use crate::crypto::{aes, ecc, kdf, tdes};
use crate::error::{Error, Result};
use crate::families::seos::Algorithm;
use crate::tlv;
use p256::SecretKey;

/// Fields recovered from a decrypted SEOS ADF cryptogram, feeding
/// [`crate::families::seos::Context`].
pub struct SeosAdf {
    pub diversifier: [u8; 7],
    pub rnd_icc: [u8; 8],
}

/// Splits the raw response to `SELECT ... by OID` into its three TLVs (spec
/// §4.C9: "`CD` algorithm pair, `85` encrypted blob (64 bytes), `8E` MAC"):
/// the encryption/hash algorithm id pair, the still-encrypted 64-byte ADF
/// blob, and its MAC. The MAC itself is not separately verified here — the
/// OID-equality check inside [`decode_seos_adf`] is the integrity check the
/// data model's cryptogram invariant names; a wrong key or tampered blob
/// decrypts to garbage that fails that check.
pub fn parse_adf_response(data: &[u8]) -> Result<(Algorithm, u8, [u8; 64])> {
    let nodes = tlv::parse(data)?;

    let cd = tlv::find(&nodes, 0xCD).ok_or_else(|| Error::TlvMalformed("ADF response missing CD algorithm pair".into()))?;
    if cd.value.len() != 2 {
        return Err(Error::TlvMalformed(format!("CD algorithm pair is {} bytes, expected 2", cd.value.len())));
    }
    let algorithm = Algorithm::from_cd_byte(cd.value[0])?;
    let hash_algorithm = cd.value[1];

    let blob = tlv::find(&nodes, 0x85).ok_or_else(|| Error::TlvMalformed("ADF response missing 85 encrypted blob".into()))?;
    if blob.value.len() != 64 {
        return Err(Error::TlvMalformed(format!("ADF encrypted blob is {} bytes, expected 64", blob.value.len())));
    }
    let ciphertext: [u8; 64] = blob.value.clone().try_into().unwrap();

    Ok((algorithm, hash_algorithm, ciphertext))
}

/// Decrypts the SEOS ADF cryptogram carried in the `85` TLV of the response
/// to `SELECT ... by OID`, and recovers the diversifier and nonce.
///
/// Grounded on `original_source/client/src/cmdhfseos.c`'s
/// `select_ADF_decrypt`: `decrypt_cryptogram` under the slot's
/// un-diversified read key with a zero IV, then a linear scan for the `06`
/// ADF-OID tag (the function never trusts a fixed offset — the comment
/// block above it documents the CF-tag-at-offset-44 case but the code
/// itself scans), followed immediately by a `CF` diversifier-length tag
/// and, after the diversifier, the ICC nonce.
pub fn decode_seos_adf(adf_ciphertext: &[u8; 64], base_read_key: &[u8; 16], algorithm: Algorithm, selected_oid: &[u8]) -> Result<SeosAdf> {
    let mut plain = adf_ciphertext.to_vec();
    match algorithm {
        Algorithm::Aes128 => aes::aes_cbc_decrypt(base_read_key, &[0u8; 16], &mut plain)?,
        Algorithm::TwoKeyTdes | Algorithm::ThreeKeyTdes => tdes::dec_3des(base_read_key, &mut plain)?,
    }

    let oid_tag_pos = plain.iter().position(|&b| b == 0x06).ok_or_else(|| Error::CryptogramInvalid("ADF cryptogram missing 06 OID tag".into()))?;
    let oid_len = *plain
        .get(oid_tag_pos + 1)
        .ok_or_else(|| Error::CryptogramInvalid("ADF cryptogram truncated at OID length".into()))? as usize;
    let oid_start = oid_tag_pos + 2;
    let oid_end = oid_start + oid_len;
    if plain.len() < oid_end + 2 {
        return Err(Error::CryptogramInvalid("ADF cryptogram truncated after OID value".into()));
    }
    // select_ADF_decrypt compares the two ADF hex strings skipping their
    // first 4 hex chars (the `06 Len` tag/length prefix, already consumed
    // above), so the comparison here is value-only, matching that.
    if &plain[oid_start..oid_end] != selected_oid {
        return Err(Error::CryptogramInvalid("ADF cryptogram OID does not match the OID selected".into()));
    }

    if plain[oid_end] != 0xCF {
        return Err(Error::CryptogramInvalid("ADF cryptogram missing CF diversifier tag".into()));
    }
    let diversifier_len = plain[oid_end + 1] as usize;
    let diversifier_start = oid_end + 2;
    let diversifier_end = diversifier_start + diversifier_len;
    if diversifier_len != 7 {
        return Err(Error::CryptogramInvalid(format!("ADF cryptogram diversifier is {diversifier_len} bytes, expected 7")));
    }
    if plain.len() < diversifier_end + 8 {
        return Err(Error::CryptogramInvalid("ADF cryptogram truncated before the ICC nonce".into()));
    }
    let diversifier: [u8; 7] = plain[diversifier_start..diversifier_end].try_into().unwrap();
    let rnd_icc: [u8; 8] = plain[diversifier_end..diversifier_end + 8].try_into().unwrap();

    Ok(SeosAdf { diversifier, rnd_icc })
}

/// A decrypted VAS cryptogram: the big-endian Apple-epoch timestamp
/// (seconds since 2001-01-01) and the opaque payload that follows it.
pub struct VasPayload {
    pub timestamp: u32,
    pub payload: Vec<u8>,
}

const ANSI_SHARED_INFO_OID_TAG: &[u8] = b"id-aes256-GCM";
const ANSI_SHARED_INFO_CONTEXT: &[u8] = b"ApplePay encrypted VAS data";

/// Decrypts a VAS cryptogram: `key_hint(4) ‖ mobile_ephemeral_x(32) ‖
/// ciphertext‖tag`.
///
/// Grounded on `original_source/client/src/cmdhfvas.c`'s
/// `DecryptVASCryptogram`/`internalVasDecrypt`: the GCM IV is a genuine
/// 16-byte all-zero block (not the conventional 12-byte nonce), and the
/// decrypt is attempted under two distinct (ANSI X9.63 shared-info, GCM
/// AAD) pairs in sequence — legacy mobile software builds a 73-byte shared
/// info (`0x0D ‖ "id-aes256-GCM" ‖ "ApplePay encrypted VAS data" ‖
/// pidHash`) with empty AAD; current software uses the 27-byte context
/// string alone as shared info and moves `pidHash` into the AAD instead.
/// Both must be tried, per spec §9's "VAS dual shared-info retention" open
/// question.
pub fn decode_vas(cryptogram: &[u8], reader_private_key: &SecretKey, pid_hash: &[u8; 32]) -> Result<VasPayload> {
    if cryptogram.len() < 4 + 32 + 16 {
        return Err(Error::CryptogramInvalid("VAS cryptogram shorter than key-hint + ephemeral key + GCM tag".into()));
    }
    let received_hint = &cryptogram[0..4];
    let expected_hint = ecc::key_hint(reader_private_key);
    if received_hint != expected_hint {
        return Err(Error::CryptogramInvalid("VAS cryptogram key hint does not match the reader private key".into()));
    }

    let mobile_x: [u8; 32] = cryptogram[4..36].try_into().unwrap();
    let mobile_public = ecc::public_key_from_x(&mobile_x)?;
    let shared_secret = ecc::ecdh_shared_secret(reader_private_key, &mobile_public);
    let ciphertext = &cryptogram[36..];

    let mut shared_info_legacy = Vec::with_capacity(1 + ANSI_SHARED_INFO_OID_TAG.len() + ANSI_SHARED_INFO_CONTEXT.len() + 32);
    shared_info_legacy.push(ANSI_SHARED_INFO_OID_TAG.len() as u8);
    shared_info_legacy.extend_from_slice(ANSI_SHARED_INFO_OID_TAG);
    shared_info_legacy.extend_from_slice(ANSI_SHARED_INFO_CONTEXT);
    shared_info_legacy.extend_from_slice(pid_hash);

    let key_legacy: [u8; 32] = kdf::x963_kdf_sha256(&shared_secret, &shared_info_legacy, 32).try_into().unwrap();
    if let Ok(plaintext) = aes::aes_gcm_decrypt(&key_legacy, &[], ciphertext) {
        return split_timestamp(plaintext);
    }

    let key_current: [u8; 32] = kdf::x963_kdf_sha256(&shared_secret, ANSI_SHARED_INFO_CONTEXT, 32).try_into().unwrap();
    let plaintext = aes::aes_gcm_decrypt(&key_current, pid_hash, ciphertext)?;
    split_timestamp(plaintext)
}

fn split_timestamp(plaintext: Vec<u8>) -> Result<VasPayload> {
    if plaintext.len() < 4 {
        return Err(Error::CryptogramInvalid("VAS plaintext shorter than the 4-byte timestamp".into()));
    }
    let timestamp = u32::from_be_bytes(plaintext[0..4].try_into().unwrap());
    Ok(VasPayload { timestamp, payload: plaintext[4..].to_vec() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::aes as aes_mod;
    use crate::tlv::TlvNode;

    /// Scenario 2 of spec §8: the ADF response begins `CD 02` followed by
    /// the two-byte algorithm identifier.
    #[test]
    fn parse_adf_response_extracts_algorithm_pair_and_blob() {
        let ciphertext = [0xEEu8; 64];
        let nodes = vec![
            TlvNode::primitive(0xCD, vec![0x09, 0x07]),
            TlvNode::primitive(0x85, ciphertext.to_vec()),
            TlvNode::primitive(0x8E, vec![0u8; 8]),
        ];
        let data = tlv::encode(&nodes);
        let (algorithm, hash_algorithm, blob) = parse_adf_response(&data).unwrap();
        assert_eq!(algorithm, Algorithm::Aes128);
        assert_eq!(hash_algorithm, 0x07);
        assert_eq!(blob, ciphertext);
    }

    #[test]
    fn parse_adf_response_rejects_missing_blob() {
        let data = tlv::encode(&[TlvNode::primitive(0xCD, vec![0x09, 0x07])]);
        assert!(parse_adf_response(&data).is_err());
    }

    fn encrypt_seos_adf(key: &[u8; 16], oid: &[u8], diversifier: &[u8; 7], rnd_icc: &[u8; 8]) -> [u8; 64] {
        let mut plain = vec![0x06, oid.len() as u8];
        plain.extend_from_slice(oid);
        plain.push(0xCF);
        plain.push(7);
        plain.extend_from_slice(diversifier);
        plain.extend_from_slice(rnd_icc);
        while plain.len() < 64 {
            plain.push(0);
        }
        plain.truncate(64);
        aes_mod::aes_cbc_encrypt(key, &[0u8; 16], &mut plain).unwrap();
        plain.try_into().unwrap()
    }

    #[test]
    fn seos_adf_round_trips_and_checks_oid() {
        let key = [0x42u8; 16];
        let oid = hex_literal::hex!("2b0601040181e438010102011801010202");
        let diversifier = [0xAAu8; 7];
        let rnd_icc = [0xBBu8; 8];
        let ciphertext = encrypt_seos_adf(&key, &oid, &diversifier, &rnd_icc);

        let decoded = decode_seos_adf(&ciphertext, &key, Algorithm::Aes128, &oid).unwrap();
        assert_eq!(decoded.diversifier, diversifier);
        assert_eq!(decoded.rnd_icc, rnd_icc);

        let wrong_oid = hex_literal::hex!("2b0601040181e438010102011801010299");
        assert!(decode_seos_adf(&ciphertext, &key, Algorithm::Aes128, &wrong_oid).is_err());
    }

    #[test]
    fn vas_cryptogram_rejects_wrong_key_hint() {
        let reader_key = SecretKey::random(&mut rand::thread_rng());
        let mut cryptogram = vec![0u8; 4 + 32 + 16];
        cryptogram[0..4].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
        let pid_hash = [0u8; 32];
        assert!(decode_vas(&cryptogram, &reader_key, &pid_hash).is_err());
    }

    #[test]
    fn vas_cryptogram_round_trips_through_both_shared_info_forms() {
        use aes_gcm::aead::generic_array::{typenum::U16, GenericArray};
        use aes_gcm::aead::Aead;
        use aes_gcm::{AesGcm, KeyInit};
        use p256::elliptic_curve::sec1::ToEncodedPoint;

        let reader_key = SecretKey::random(&mut rand::thread_rng());
        // VAS always decompresses the mobile ephemeral key with an assumed
        // even-y sign byte, so this fixture loops until it draws a key with
        // that parity instead of special-casing the odd-y half of keyspace.
        let mobile_key = loop {
            let candidate = SecretKey::random(&mut rand::thread_rng());
            if candidate.public_key().to_encoded_point(true).as_bytes()[0] == 0x02 {
                break candidate;
            }
        };
        let shared_secret = ecc::ecdh_shared_secret(&mobile_key, &reader_key.public_key());
        let pid_hash = [0x5Au8; 32];

        // Current-software form: shared_info is the bare context string, pidHash moves to AAD.
        let key: [u8; 32] = kdf::x963_kdf_sha256(&shared_secret, ANSI_SHARED_INFO_CONTEXT, 32).try_into().unwrap();
        let cipher = AesGcm::<aes::Aes256, U16>::new(GenericArray::from_slice(&key));
        let nonce = GenericArray::from_slice(&[0u8; 16]);
        let mut plaintext = vec![0u8, 0u8, 0x01, 0x02];
        plaintext.extend_from_slice(b"hello vas payload");
        let ciphertext = cipher.encrypt(nonce, aes_gcm::aead::Payload { msg: &plaintext, aad: &pid_hash }).unwrap();

        let mobile_point = mobile_key.public_key().to_encoded_point(true);
        let mobile_x = &mobile_point.as_bytes()[1..33];

        let mut cryptogram = ecc::key_hint(&reader_key).to_vec();
        cryptogram.extend_from_slice(mobile_x);
        cryptogram.extend_from_slice(&ciphertext);

        let decoded = decode_vas(&cryptogram, &reader_key, &pid_hash).unwrap();
        assert_eq!(decoded.timestamp, 0x00000102);
        assert_eq!(decoded.payload, b"hello vas payload");
    }
}
