//! ICAO 9303 Basic Access Control (spec §4.C7 "eMRTD BAC" variant).
//!
//! Generalizes the MRZ-seed → derive_keys → `GET CHALLENGE` →
//! `EXTERNAL AUTHENTICATE` → session-key-derivation flow into an
//! [`AuthFamily`] implementation. `seed_from_mrz`/`derive_keys`/
//! `derive_key` keep the same SHA-1-then-parity construction and the same
//! ICAO 9303-11 D.2 test vectors throughout.

use crate::apdu::Apdu;
use crate::crypto::tdes;
use crate::error::{Error, Result};
use crate::families::{AuthFamily, Family};
use crate::session::Session;
use crate::transport::Transport;
use rand::Rng;
use sha1::{Digest, Sha1};
use std::array;

/// SHA-1 of the MRZ-derived "kmrz" string (documentNumber check digit ‖ dob
/// check digit ‖ expiry check digit, ICAO 9303-11 §4.3.2), truncated to 16
/// bytes.
pub fn seed_from_mrz(mrz: &str) -> [u8; 16] {
    let mut hasher = Sha1::new();
    hasher.update(mrz.as_bytes());
    let hash = hasher.finalize();
    hash[0..16].try_into().unwrap()
}

pub fn derive_keys(seed: &[u8; 16]) -> ([u8; 16], [u8; 16]) {
    (derive_key(seed, 1), derive_key(seed, 2))
}

pub fn derive_key(seed: &[u8; 16], counter: u32) -> [u8; 16] {
    let mut hasher = Sha1::new();
    hasher.update(seed);
    hasher.update(counter.to_be_bytes());
    let mut key: [u8; 16] = hasher.finalize()[0..16].try_into().unwrap();
    tdes::set_parity_bits(&mut key);
    key
}

/// Static BAC keys derived from the MRZ, handed to [`Emrtd::authenticate`].
pub struct Context {
    pub kenc: [u8; 16],
    pub kmac: [u8; 16],
}

impl Context {
    pub fn from_mrz(mrz: &str) -> Self {
        let seed = seed_from_mrz(mrz);
        let (kenc, kmac) = derive_keys(&seed);
        Self { kenc, kmac }
    }
}

pub struct Emrtd;

impl AuthFamily for Emrtd {
    type Context = Context;

    fn authenticate(transport: &mut dyn Transport, ctx: &Context) -> Result<Session> {
        // Step 1: GetChallenge.
        let rnd_icc = get_challenge(transport)?;

        // Step 2: ComposeAuthMessage — RND.IFD ‖ RND.ICC ‖ K.IFD, 3DES-CBC
        // under K_ENC, then retail-MAC under K_MAC.
        let mut rng = rand::thread_rng();
        let rnd_ifd: [u8; 8] = rng.gen();
        let k_ifd: [u8; 16] = rng.gen();

        let mut msg = Vec::with_capacity(32);
        msg.extend_from_slice(&rnd_ifd);
        msg.extend_from_slice(&rnd_icc);
        msg.extend_from_slice(&k_ifd);
        tdes::enc_3des(&ctx.kenc, &mut msg)?;
        let mac = tdes::mac_retail(&ctx.kmac, &msg)?;
        msg.extend_from_slice(&mac);

        // Step 3: SendAuth.
        let mut resp_data = external_authenticate(transport, &msg)?;
        if resp_data.len() != 40 {
            return Err(Error::AuthFailed(format!("EXTERNAL AUTHENTICATE returned {} bytes, expected 40", resp_data.len())));
        }

        // Step 4: VerifyResponse.
        let expected_mac = tdes::mac_retail(&ctx.kmac, &resp_data[..32])?;
        if expected_mac.as_slice() != &resp_data[32..] {
            return Err(Error::AuthFailed("EXTERNAL AUTHENTICATE response MAC mismatch".into()));
        }
        tdes::dec_3des(&ctx.kenc, &mut resp_data[..32])?;
        let plain = &resp_data[..32];
        if &plain[0..8] != rnd_icc.as_slice() {
            return Err(Error::AuthFailed("RND.ICC echoed back does not match".into()));
        }
        if plain[8..16] != rnd_ifd {
            return Err(Error::AuthFailed("RND.IFD echoed back does not match".into()));
        }
        let k_icc: [u8; 16] = plain[16..32].try_into().unwrap();

        // Step 5: DeriveSession — XOR the two session-key contributions,
        // rederive enc/MAC keys the same way as the static BAC keys, and
        // build the SSC from the low halves of RND.ICC ‖ RND.IFD.
        let seed: [u8; 16] = array::from_fn(|i| k_ifd[i] ^ k_icc[i]);
        let (ks_enc, ks_mac) = derive_keys(&seed);

        let mut ssc_bytes = Vec::with_capacity(8);
        ssc_bytes.extend_from_slice(&rnd_icc[4..]);
        ssc_bytes.extend_from_slice(&rnd_ifd[4..]);
        let ssc = u64::from_be_bytes(ssc_bytes.try_into().unwrap());

        Ok(Session::new(Family::Emrtd, ks_enc, ks_mac, ssc))
    }
}

fn get_challenge(transport: &mut dyn Transport) -> Result<Vec<u8>> {
    let apdu = Apdu::new(0x00, 0x84, 0x00, 0x00, vec![], Some(8))?;
    let raw = transport.exchange(&apdu.encode()?)?;
    let (data, sw) = crate::apdu::decode_response(&raw)?;
    if !crate::apdu::is_success(sw) {
        return Err(Error::AuthFailed(format!("GET CHALLENGE failed: SW={sw:04X}")));
    }
    if data.len() != 8 {
        return Err(Error::AuthFailed(format!("GET CHALLENGE returned {} bytes, expected 8", data.len())));
    }
    Ok(data)
}

fn external_authenticate(transport: &mut dyn Transport, message: &[u8]) -> Result<Vec<u8>> {
    let apdu = Apdu::new(0x00, 0x82, 0x00, 0x00, message.to_vec(), Some(256))?;
    let raw = transport.exchange(&apdu.encode()?)?;
    let (data, sw) = crate::apdu::decode_response(&raw)?;
    if !crate::apdu::is_success(sw) {
        return Err(Error::AuthFailed(format!("EXTERNAL AUTHENTICATE failed: SW={sw:04X}")));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use hex_literal::hex;

    /// Known-vector check, matching `test_bac_example` (ICAO 9303-11 D.2).
    #[test]
    fn seed_and_keys_match_icao_example() {
        let mrz = "L898902C<369080619406236";
        let seed = seed_from_mrz(mrz);
        assert_eq!(seed, hex!("239AB9CB282DAF66231DC5A4DF6BFBAE"));

        let (kenc, kmac) = derive_keys(&seed);
        assert_eq!(kenc, hex!("AB94FDECF2674FDFB9B391F85D7F76F2"));
        assert_eq!(kmac, hex!("7962D9ECE03D1ACD4C76089DCE131543"));
    }

    #[test]
    fn derive_keys_matches_second_known_vector() {
        let seed = hex!("0036D272F5C350ACAC50C3F572D23600");
        let (kenc, kmac) = derive_keys(&seed);
        assert_eq!(kenc, hex!("979EC13B1CBFE9DCD01AB0FED307EAE5"));
        assert_eq!(kmac, hex!("F1CB1F1FB5ADF208806B89DC579DC1F8"));
    }

    #[test]
    fn authenticate_rejects_short_challenge() {
        let mut transport = MockTransport::new(vec![hex!("AABBCC9000").to_vec()]);
        let ctx = Context { kenc: [0u8; 16], kmac: [0u8; 16] };
        let result = Emrtd::authenticate(&mut transport, &ctx);
        assert!(matches!(result, Err(Error::AuthFailed(_))));
    }

    #[test]
    fn authenticate_rejects_mac_mismatch_on_response() {
        let mut transport = MockTransport::new(vec![
            hex!("AABBCCDDEEFF00119000").to_vec(),
            {
                let mut resp = vec![0u8; 40];
                resp.push(0x90);
                resp.push(0x00);
                resp
            },
        ]);
        let ctx = Context { kenc: [0u8; 16], kmac: [0u8; 16] };
        let result = Emrtd::authenticate(&mut transport, &ctx);
        assert!(matches!(result, Err(Error::AuthFailed(_))));
    }
}
