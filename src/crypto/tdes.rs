//! 2TDES/3TDES CBC and ISO/IEC 9797-1 algorithm 3 retail-MAC (spec §4.C4).
//!
//! Named and shaped after the `enc_3des`/`dec_3des`/`mac_3des`/
//! `set_parity_bits` functions already called for eMRTD BAC, generalized
//! here to accept either a 16-byte (2-key) or 24-byte (3-key) schedule.

use crate::error::{Error, Result};
use cipher::{BlockDecrypt, BlockEncrypt, KeyInit, KeyIvInit};
use cipher::generic_array::GenericArray;
use des::{Des, TdesEde3};

type TdesCbcEnc = cbc::Encryptor<TdesEde3>;
type TdesCbcDec = cbc::Decryptor<TdesEde3>;

/// Expands a 16-byte 2TDES key into the 24-byte K1‖K2‖K1 schedule 3DES
/// crates require.
pub fn expand_2key(key16: &[u8; 16]) -> [u8; 24] {
    let mut out = [0u8; 24];
    out[..16].copy_from_slice(key16);
    out[16..].copy_from_slice(&key16[..8]);
    out
}

fn schedule(key: &[u8]) -> Result<[u8; 24]> {
    match key.len() {
        16 => {
            let k: [u8; 16] = key.try_into().unwrap();
            Ok(expand_2key(&k))
        }
        24 => Ok(key.try_into().unwrap()),
        n => Err(Error::Crypto(format!("3DES key must be 16 or 24 bytes, got {n}"))),
    }
}

/// CBC-encrypts `data` in place with IV zero. `data` must already be a
/// multiple of the 8-byte block size (block padding is the caller's concern
/// per spec §4.C4).
pub fn enc_3des(key: &[u8], data: &mut [u8]) -> Result<()> {
    if data.len() % 8 != 0 {
        return Err(Error::Crypto("3DES input is not block-aligned".into()));
    }
    let schedule = schedule(key)?;
    let enc = TdesCbcEnc::new(GenericArray::from_slice(&schedule), &GenericArray::default());
    enc.encrypt_padded_mut::<cipher::block_padding::NoPadding>(data, data.len())
        .map_err(|e| Error::Crypto(format!("3DES encrypt failed: {e}")))?;
    Ok(())
}

/// CBC-decrypts `data` in place with IV zero.
pub fn dec_3des(key: &[u8], data: &mut [u8]) -> Result<()> {
    if data.len() % 8 != 0 {
        return Err(Error::Crypto("3DES input is not block-aligned".into()));
    }
    let schedule = schedule(key)?;
    let dec = TdesCbcDec::new(GenericArray::from_slice(&schedule), &GenericArray::default());
    dec.decrypt_padded_mut::<cipher::block_padding::NoPadding>(data)
        .map_err(|e| Error::Crypto(format!("3DES decrypt failed: {e}")))?;
    Ok(())
}

/// ISO/IEC 9797-1 algorithm 3 retail-MAC: split the 16-byte key into
/// `(K0, K1)`; single-DES CBC-encrypt every block with `K0` (IV zero); on
/// the final block, DES-decrypt with `K1` then DES-encrypt with `K0`.
/// Output is 8 bytes.
pub fn mac_retail(key: &[u8; 16], data: &[u8]) -> Result<[u8; 8]> {
    if data.len() % 8 != 0 || data.is_empty() {
        return Err(Error::Crypto("retail-MAC input is not block-aligned".into()));
    }
    let (k0, k1) = key.split_at(8);
    let enc0 = Des::new(GenericArray::from_slice(k0));
    let dec1 = Des::new(GenericArray::from_slice(k1));

    let mut chain = [0u8; 8];
    for block in data.chunks(8) {
        let mut buf = [0u8; 8];
        for i in 0..8 {
            buf[i] = block[i] ^ chain[i];
        }
        let mut ga = GenericArray::clone_from_slice(&buf);
        enc0.encrypt_block(&mut ga);
        chain.copy_from_slice(&ga);
    }

    let mut last = GenericArray::clone_from_slice(&chain);
    dec1.decrypt_block(&mut last);
    enc0.encrypt_block(&mut last);
    Ok(last.into())
}

/// Sets odd DES key parity (LSB of each byte) in place, as required by
/// keys derived from an arbitrary hash (ICAO 9303 BAC session keys).
pub fn set_parity_bits(key: &mut [u8]) {
    for byte in key.iter_mut() {
        let ones_without_parity = (*byte >> 1).count_ones();
        if ones_without_parity % 2 == 0 {
            *byte |= 0x01;
        } else {
            *byte &= 0xFE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn enc_dec_round_trip_2key() {
        let key: [u8; 16] = hex!("AB94FDECF2674FDFB9B391F85D7F76F2");
        let mut data = hex!("1234567890ABCDEF1122334455667788").to_vec();
        let original = data.clone();
        enc_3des(&key, &mut data).unwrap();
        assert_ne!(data, original);
        dec_3des(&key, &mut data).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn enc_dec_round_trip_3key() {
        let key = expand_2key(&hex!("0123456789ABCDEFFEDCBA9876543210"));
        let mut data = hex!("0011223344556677").to_vec();
        let original = data.clone();
        enc_3des(&key, &mut data).unwrap();
        dec_3des(&key, &mut data).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn parity_bits_are_odd() {
        let mut key = [0u8; 16];
        set_parity_bits(&mut key);
        for b in key {
            assert_eq!((b.count_ones()) % 2, 1);
        }
    }

    #[test]
    fn retail_mac_rejects_unaligned_input() {
        let key = [0u8; 16];
        assert!(mac_retail(&key, &[0u8; 5]).is_err());
    }

    #[test]
    fn retail_mac_is_deterministic_and_key_sensitive() {
        let key_a = hex!("7962D9ECE03D1ACD4C76089DCE131543");
        let key_b: [u8; 16] = [0u8; 16];
        let data = hex!("4a43be9ff20e7105bc3346cdd98230b6ab4e5864429f9162e523ba6e338ded51");
        let mac_a1 = mac_retail(&key_a, &data).unwrap();
        let mac_a2 = mac_retail(&key_a, &data).unwrap();
        let mac_b = mac_retail(&key_b, &data).unwrap();
        assert_eq!(mac_a1, mac_a2);
        assert_ne!(mac_a1, mac_b);
    }
}
