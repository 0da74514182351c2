//! AES-CBC, AES-CMAC, and AES-GCM primitives (spec §4.C4).
//!
//! Sibling of [`crate::crypto::tdes`]: the `cbc`/`cmac`/`cipher` dependencies
//! are used here directly (eMRTD BAC itself is 3DES-only); `aes-gcm` is
//! added for VAS, in the same RustCrypto family.

use crate::error::{Error, Result};
use aes::{Aes128, Aes256};
use aes_gcm::aead::generic_array::typenum::U16;
use aes_gcm::{aead::Aead, AesGcm, KeyInit as GcmKeyInit};
use cipher::{generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cmac::{Cmac, Mac};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES-256-GCM with a 16-byte nonce (VAS's literal "16-byte IV of zero",
/// grounded on `mbedtls_gcm_auth_decrypt(&gcmCtx, ..., iv, sizeof(iv), ...)`
/// with `uint8_t iv[16]` in `original_source/client/src/cmdhfvas.c` — mbedtls
/// accepts any IV length and GHASHes it when it isn't 96 bits, unlike the
/// `aes-gcm` crate's default `Aes256Gcm` alias which fixes the nonce at 12
/// bytes; instantiating the generic `AesGcm` with a `U16` nonce size keeps
/// the wire format faithful to the original instead of silently truncating
/// or padding it to 12 bytes).
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// CBC-encrypts `data` in place under `key`/`iv`. `data` must already be
/// block-aligned; padding is the caller's concern.
pub fn aes_cbc_encrypt(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) -> Result<()> {
    if data.len() % 16 != 0 {
        return Err(Error::Crypto("AES-CBC input is not block-aligned".into()));
    }
    let enc = Aes128CbcEnc::new(GenericArray::from_slice(key), GenericArray::from_slice(iv));
    enc.encrypt_padded_mut::<cipher::block_padding::NoPadding>(data, data.len())
        .map_err(|e| Error::Crypto(format!("AES-CBC encrypt failed: {e}")))?;
    Ok(())
}

pub fn aes_cbc_decrypt(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) -> Result<()> {
    if data.len() % 16 != 0 {
        return Err(Error::Crypto("AES-CBC input is not block-aligned".into()));
    }
    let dec = Aes128CbcDec::new(GenericArray::from_slice(key), GenericArray::from_slice(iv));
    dec.decrypt_padded_mut::<cipher::block_padding::NoPadding>(data)
        .map_err(|e| Error::Crypto(format!("AES-CBC decrypt failed: {e}")))?;
    Ok(())
}

/// AES-CMAC (NIST SP 800-38B), truncated to `tag_len` bytes (8 or 16).
pub fn aes_cmac(key: &[u8; 16], data: &[u8], tag_len: usize) -> Result<Vec<u8>> {
    if tag_len != 8 && tag_len != 16 {
        return Err(Error::Crypto("AES-CMAC tag length must be 8 or 16".into()));
    }
    let mut mac = Cmac::<Aes128>::new_from_slice(key).expect("128-bit key is always valid");
    mac.update(data);
    let tag = mac.finalize().into_bytes();
    Ok(tag[..tag_len].to_vec())
}

/// AES-256-GCM authenticated decryption with the 16-byte all-zero IV VAS
/// uses. `ciphertext` must include the trailing 16-byte tag.
pub fn aes_gcm_decrypt(key: &[u8; 32], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm16::new(GenericArray::from_slice(key));
    let nonce = GenericArray::from_slice(&[0u8; 16]);
    cipher
        .decrypt(nonce, aes_gcm::aead::Payload { msg: ciphertext, aad })
        .map_err(|_| Error::Crypto("AES-GCM authentication tag mismatch".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn cbc_round_trips() {
        let key = [0x42u8; 16];
        let iv = [0u8; 16];
        let mut data = hex!("00112233445566778899AABBCCDDEEFF").to_vec();
        data.truncate(16);
        let original = data.clone();
        aes_cbc_encrypt(&key, &iv, &mut data).unwrap();
        assert_ne!(data, original);
        aes_cbc_decrypt(&key, &iv, &mut data).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn cmac_truncation_and_determinism() {
        let key = [0x11u8; 16];
        let data = b"select file 2F00";
        let tag16 = aes_cmac(&key, data, 16).unwrap();
        let tag8 = aes_cmac(&key, data, 8).unwrap();
        assert_eq!(tag16.len(), 16);
        assert_eq!(tag8.len(), 8);
        assert_eq!(&tag16[..8], &tag8[..]);
        assert_eq!(aes_cmac(&key, data, 16).unwrap(), tag16);
    }

    #[test]
    fn gcm_decrypt_fails_on_tampered_ciphertext() {
        let key = [0x55u8; 32];
        let cipher = Aes256Gcm16::new(GenericArray::from_slice(&key));
        let nonce = GenericArray::from_slice(&[0u8; 16]);
        let mut ct = cipher.encrypt(nonce, b"hello vas".as_slice()).unwrap();
        let good = aes_gcm_decrypt(&key, &[], &ct).unwrap();
        assert_eq!(good, b"hello vas");
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        assert!(aes_gcm_decrypt(&key, &[], &ct).is_err());
    }
}
