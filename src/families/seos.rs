//! HID SEOS two-phase mutual authentication (spec §4.C7 "SEOS" variant).
//!
//! Grounded on `original_source/client/src/cmdhfseos.c`'s `seos_kdf`
//! (AES-CMAC-based key diversification) and `seos_mutual_auth` (the
//! `GENERAL AUTHENTICATE`/dynamic-authentication-data exchange, ISO 7816-8
//! `7C`/`82` template). The ADF cryptogram that recovers the diversifier and
//! nonce is decoded earlier, by [`crate::cryptogram::decode_seos_adf`]; this
//! module only performs the mutual-auth step that follows it.

use crate::apdu::Apdu;
use crate::crypto::{aes, tdes, CipherSuite};
use crate::error::{Error, Result};
use crate::families::{AuthFamily, Family};
use crate::session::Session;
use crate::tlv::{self, TlvNode};
use crate::transport::Transport;
use rand::RngCore;

/// Fixed OID the KDF input hashes against, independent of the ADF OID the
/// caller selected (`original_source/client/src/cmdhfseos.c:768`).
const KDF_ADF_OID: [u8; 17] = [
    0x2b, 0x06, 0x01, 0x04, 0x01, 0x81, 0xe4, 0x38, 0x01, 0x01, 0x02, 0x01, 0x18, 0x01, 0x01, 0x02, 0x02,
];

const KEY_TYPE_ENCRYPTION: u8 = 0x04;
const KEY_TYPE_MAC: u8 = 0x06;

/// Encryption algorithm id carried in the ADF's `CD` TLV, and its wire
/// value for the KDF input (`cmdhfseos.c`'s `known_algorithm_map`).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Algorithm {
    TwoKeyTdes,
    ThreeKeyTdes,
    Aes128,
}

impl Algorithm {
    pub fn from_cd_byte(value: u8) -> Result<Self> {
        match value {
            0x02 => Ok(Algorithm::TwoKeyTdes),
            0x04 => Ok(Algorithm::ThreeKeyTdes),
            0x09 => Ok(Algorithm::Aes128),
            other => Err(Error::CryptogramInvalid(format!("unknown SEOS encryption algorithm id {other:#04x}"))),
        }
    }

    fn wire_id(self) -> u8 {
        match self {
            Algorithm::TwoKeyTdes => 0x02,
            Algorithm::ThreeKeyTdes => 0x04,
            Algorithm::Aes128 => 0x09,
        }
    }

    /// Maps the ADF-negotiated algorithm onto the secure-messaging cipher
    /// suite `Session` dispatches on (spec §9's tagged-union re-architecture
    /// note), so SEOS's own `read`/`write` exchanges use whatever algorithm
    /// the card's `CD` TLV actually negotiated instead of a fixed default.
    fn cipher_suite(self) -> CipherSuite {
        match self {
            Algorithm::TwoKeyTdes => CipherSuite::TwoKeyTdesCbc,
            Algorithm::ThreeKeyTdes => CipherSuite::ThreeKeyTdesCbc,
            Algorithm::Aes128 => CipherSuite::Aes128Cbc,
        }
    }
}

/// Context assembled from the ADF cryptogram (spec §4.C9) before calling
/// [`Seos::authenticate`].
pub struct Context {
    pub read_key: [u8; 16],
    pub keyslot: u8,
    pub diversifier: [u8; 7],
    pub rnd_icc: [u8; 8],
    pub encryption_algorithm: Algorithm,
    /// Hash algorithm id from the ADF's `CD` TLV, folded into the KDF input.
    pub hash_algorithm: u8,
}

pub struct Seos;

impl AuthFamily for Seos {
    type Context = Context;

    fn authenticate(transport: &mut dyn Transport, ctx: &Context) -> Result<Session> {
        // Step 1: GetChallenge — already satisfied by the ADF cryptogram's
        // recovered nonce; SEOS issues no separate GET CHALLENGE APDU.
        let rnd_icc = ctx.rnd_icc;

        let enc_key = seos_kdf(true, ctx)?;
        let mac_key = seos_kdf(false, ctx)?;

        // Step 2: ComposeAuthMessage.
        let mut rnd_ifd = [0u8; 8];
        let mut k_ifd = [0u8; 16];
        let mut rng = rand::thread_rng();
        rng.fill_bytes(&mut rnd_ifd);
        rng.fill_bytes(&mut k_ifd);

        let mut plain = Vec::with_capacity(32);
        plain.extend_from_slice(&rnd_ifd);
        plain.extend_from_slice(&rnd_icc);
        plain.extend_from_slice(&k_ifd);

        let mut enc = plain.clone();
        encrypt_block32(ctx.encryption_algorithm, &enc_key, &mut enc)?;
        let mac = mac_tag8(ctx.encryption_algorithm, &mac_key, &enc)?;

        let mut message = enc.clone();
        message.extend_from_slice(&mac);

        // Step 3: SendAuth — GENERAL AUTHENTICATE with dynamic-auth-data
        // template 7C, nested challenge-response tag 82.
        let inner = TlvNode::primitive(0x82, message);
        let wrapper = TlvNode { tag: 0x7C, value: Vec::new(), children: vec![inner] };
        let body = tlv::encode(&[wrapper]);
        let apdu = Apdu::new(0x00, 0x87, ctx.keyslot, 0x00, body, Some(256))?;
        let raw = transport.exchange(&apdu.encode()?)?;
        let (data, sw) = crate::apdu::decode_response(&raw)?;
        if !crate::apdu::is_success(sw) {
            return Err(Error::AuthFailed(format!("SEOS mutual auth failed: SW={sw:04X}")));
        }

        let nodes = tlv::parse(&data)?;
        let response_field = tlv::find(&nodes, 0x82).ok_or_else(|| Error::AuthFailed("mutual auth response missing 82 template".into()))?;
        if response_field.value.len() != 40 {
            return Err(Error::AuthFailed(format!("mutual auth response is {} bytes, expected 40", response_field.value.len())));
        }
        let mut response_enc = response_field.value[..32].to_vec();
        let response_mac = &response_field.value[32..40];

        // Step 4: VerifyResponse.
        let expected_mac = mac_tag8(ctx.encryption_algorithm, &mac_key, &response_enc)?;
        if expected_mac.as_slice() != response_mac {
            return Err(Error::AuthFailed("SEOS mutual auth response MAC mismatch".into()));
        }
        decrypt_block32(ctx.encryption_algorithm, &enc_key, &mut response_enc)?;
        if response_enc[0..8] != rnd_icc {
            return Err(Error::AuthFailed("RND.ICC echoed back does not match".into()));
        }
        if response_enc[8..16] != rnd_ifd {
            return Err(Error::AuthFailed("RND.IFD echoed back does not match".into()));
        }

        // Step 5: DeriveSession — SEOS uses the diversified keys directly
        // as session keys (no further hashing), per
        // `generate_command_wrapping`'s direct reuse of the same keys for
        // secure messaging.
        let mut ssc_bytes = Vec::with_capacity(8);
        ssc_bytes.extend_from_slice(&rnd_icc[4..]);
        ssc_bytes.extend_from_slice(&rnd_ifd[4..]);
        let ssc = u64::from_be_bytes(ssc_bytes.try_into().unwrap());

        Ok(Session::with_suite(Family::Seos, enc_key, mac_key, ssc, ctx.encryption_algorithm.cipher_suite()))
    }
}

/// `seos_kdf`: AES-CMAC(masterKey, inputPre ‖ KDF_ADF_OID ‖ diversifier)
/// where `inputPre` is the 19-byte layout `cmdhfseos.c:seos_kdf` builds:
/// 11 zero bytes, a key-type byte (`0x04` encryption / `0x06` MAC), two
/// zero bytes, `0x80 0x01`, the encryption algorithm id, the hash
/// algorithm id, and the keyslot.
fn seos_kdf(encryption: bool, ctx: &Context) -> Result<[u8; 16]> {
    let key_type = if encryption { KEY_TYPE_ENCRYPTION } else { KEY_TYPE_MAC };
    let mut input = Vec::with_capacity(19 + 17 + 7);
    input.extend_from_slice(&[0u8; 11]);
    input.push(key_type);
    input.extend_from_slice(&[0x00, 0x00, 0x80, 0x01]);
    input.push(ctx.encryption_algorithm.wire_id());
    input.push(ctx.hash_algorithm);
    input.push(ctx.keyslot);
    input.extend_from_slice(&KDF_ADF_OID);
    input.extend_from_slice(&ctx.diversifier);

    let tag = aes::aes_cmac(&ctx.read_key, &input, 16)?;
    Ok(tag.try_into().unwrap())
}

fn encrypt_block32(algorithm: Algorithm, key: &[u8; 16], data: &mut [u8]) -> Result<()> {
    match algorithm {
        Algorithm::Aes128 => aes::aes_cbc_encrypt(key, &[0u8; 16], data),
        Algorithm::TwoKeyTdes | Algorithm::ThreeKeyTdes => tdes::enc_3des(key, data),
    }
}

fn decrypt_block32(algorithm: Algorithm, key: &[u8; 16], data: &mut [u8]) -> Result<()> {
    match algorithm {
        Algorithm::Aes128 => aes::aes_cbc_decrypt(key, &[0u8; 16], data),
        Algorithm::TwoKeyTdes | Algorithm::ThreeKeyTdes => tdes::dec_3des(key, data),
    }
}

fn mac_tag8(algorithm: Algorithm, key: &[u8; 16], data: &[u8]) -> Result<Vec<u8>> {
    match algorithm {
        Algorithm::Aes128 => aes::aes_cmac(key, data, 8),
        Algorithm::TwoKeyTdes | Algorithm::ThreeKeyTdes => tdes::mac_retail(key, data).map(|m| m.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn algorithm_from_cd_byte_covers_known_ids() {
        assert_eq!(Algorithm::from_cd_byte(0x09).unwrap(), Algorithm::Aes128);
        assert_eq!(Algorithm::from_cd_byte(0x02).unwrap(), Algorithm::TwoKeyTdes);
        assert!(Algorithm::from_cd_byte(0xFF).is_err());
    }

    #[test]
    fn kdf_is_deterministic_and_key_sensitive() {
        let ctx_a = Context {
            read_key: [0x11; 16],
            keyslot: 1,
            diversifier: [0xAA; 7],
            rnd_icc: [0u8; 8],
            encryption_algorithm: Algorithm::Aes128,
            hash_algorithm: 0x07,
        };
        let ctx_b = Context { read_key: [0x22; 16], ..ctx_a_clone(&ctx_a) };
        let k1 = seos_kdf(true, &ctx_a).unwrap();
        let k2 = seos_kdf(true, &ctx_a).unwrap();
        let k3 = seos_kdf(true, &ctx_b).unwrap();
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
        let mac_key = seos_kdf(false, &ctx_a).unwrap();
        assert_ne!(k1, mac_key);
    }

    fn ctx_a_clone(ctx: &Context) -> Context {
        Context {
            read_key: ctx.read_key,
            keyslot: ctx.keyslot,
            diversifier: ctx.diversifier,
            rnd_icc: ctx.rnd_icc,
            encryption_algorithm: ctx.encryption_algorithm,
            hash_algorithm: ctx.hash_algorithm,
        }
    }

    #[test]
    fn authenticate_rejects_wrong_status_word() {
        let mut transport = MockTransport::new(vec![vec![0x6A, 0x82]]);
        let ctx = Context {
            read_key: [0u8; 16],
            keyslot: 1,
            diversifier: [0u8; 7],
            rnd_icc: [0u8; 8],
            encryption_algorithm: Algorithm::Aes128,
            hash_algorithm: 0x07,
        };
        let result = Seos::authenticate(&mut transport, &ctx);
        assert!(matches!(result, Err(Error::AuthFailed(_))));
    }
}
