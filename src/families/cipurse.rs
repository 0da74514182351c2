//! CIPURSE AES-128/CMAC mutual authentication (spec §4.C7 "CIPURSE"
//! variant).
//!
//! `original_source/client/src/cmdhfcipurse.c` exposes the CLI surface
//! (`sreq`/`sresp` flags accepting `plain|mac|encode` per direction,
//! `CIPURSECSetActChannelSecurityLevels`) but its actual AES/CMAC core is in
//! a library this pack didn't retrieve; the GENERAL AUTHENTICATE exchange
//! below follows the same ISO 7816-8 `7C`/`82`/`81` dynamic-authentication
//! shape used for SEOS, generalized from two-phase 3DES/AES to a single-key
//! AES-128 scheme with CMAC-derived session keys (`0x01`/`0x02` derivation
//! constants prepended before RND.IFD/RND.ICC, the same "derive, don't
//! reuse the master key" principle the SEOS and eMRTD derivations follow).

use crate::apdu::Apdu;
use crate::crypto::aes;
use crate::error::{Error, Result};
use crate::families::{AuthFamily, Family};
use crate::session::{SecurityLevel, Session};
use crate::tlv::{self, TlvNode};
use crate::transport::Transport;
use rand::RngCore;

pub struct Context {
    pub key: [u8; 16],
    pub req_level: SecurityLevel,
    pub resp_level: SecurityLevel,
}

pub struct Cipurse;

impl AuthFamily for Cipurse {
    type Context = Context;

    fn authenticate(transport: &mut dyn Transport, ctx: &Context) -> Result<Session> {
        // Step 1: GetChallenge — GENERAL AUTHENTICATE with an empty dynamic
        // authentication data template requests RND.ICC.
        let challenge_apdu = Apdu::new(0x00, 0x87, 0x00, 0x00, tlv::encode(&[TlvNode { tag: 0x7C, value: Vec::new(), children: Vec::new() }]), Some(256))?;
        let raw = transport.exchange(&challenge_apdu.encode()?)?;
        let (data, sw) = crate::apdu::decode_response(&raw)?;
        if !crate::apdu::is_success(sw) {
            return Err(Error::AuthFailed(format!("CIPURSE GetChallenge failed: SW={sw:04X}")));
        }
        let nodes = tlv::parse(&data)?;
        let rnd_icc_field = tlv::find(&nodes, 0x81).ok_or_else(|| Error::AuthFailed("GetChallenge response missing 81 nonce".into()))?;
        if rnd_icc_field.value.len() != 16 {
            return Err(Error::AuthFailed(format!("RND.ICC is {} bytes, expected 16", rnd_icc_field.value.len())));
        }
        let rnd_icc: [u8; 16] = rnd_icc_field.value.clone().try_into().unwrap();

        // Step 2: ComposeAuthMessage — RND.IFD ‖ RND.ICC, AES-CBC IV zero
        // under the master key, CMAC over the ciphertext.
        let mut rnd_ifd = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut rnd_ifd);

        let mut plain = Vec::with_capacity(32);
        plain.extend_from_slice(&rnd_ifd);
        plain.extend_from_slice(&rnd_icc);
        let mut enc = plain.clone();
        aes::aes_cbc_encrypt(&ctx.key, &[0u8; 16], &mut enc)?;
        let mac = aes::aes_cmac(&ctx.key, &enc, 8)?;

        let mut message = enc.clone();
        message.extend_from_slice(&mac);

        // Step 3: SendAuth.
        let inner = TlvNode::primitive(0x82, message);
        let wrapper = TlvNode { tag: 0x7C, value: Vec::new(), children: vec![inner] };
        let body = tlv::encode(&[wrapper]);
        let apdu = Apdu::new(0x00, 0x87, 0x00, 0x00, body, Some(256))?;
        let raw = transport.exchange(&apdu.encode()?)?;
        let (data, sw) = crate::apdu::decode_response(&raw)?;
        if !crate::apdu::is_success(sw) {
            return Err(Error::AuthFailed(format!("CIPURSE mutual auth failed: SW={sw:04X}")));
        }

        let nodes = tlv::parse(&data)?;
        let response_field = tlv::find(&nodes, 0x82).ok_or_else(|| Error::AuthFailed("mutual auth response missing 82 template".into()))?;
        if response_field.value.len() != 40 {
            return Err(Error::AuthFailed(format!("mutual auth response is {} bytes, expected 40", response_field.value.len())));
        }
        let mut response_enc = response_field.value[..32].to_vec();
        let response_mac = &response_field.value[32..40];

        // Step 4: VerifyResponse.
        let expected_mac = aes::aes_cmac(&ctx.key, &response_enc, 8)?;
        if expected_mac.as_slice() != response_mac {
            return Err(Error::AuthFailed("CIPURSE mutual auth response MAC mismatch".into()));
        }
        aes::aes_cbc_decrypt(&ctx.key, &[0u8; 16], &mut response_enc)?;
        if response_enc[0..16] != rnd_icc {
            return Err(Error::AuthFailed("RND.ICC echoed back does not match".into()));
        }
        if response_enc[16..32] != rnd_ifd {
            return Err(Error::AuthFailed("RND.IFD echoed back does not match".into()));
        }

        // Step 5: DeriveSession — AES-CMAC keyed by direction constant.
        let mut enc_input = vec![0x01u8];
        enc_input.extend_from_slice(&rnd_ifd);
        enc_input.extend_from_slice(&rnd_icc);
        let session_enc: [u8; 16] = aes::aes_cmac(&ctx.key, &enc_input, 16)?.try_into().unwrap();

        let mut mac_input = vec![0x02u8];
        mac_input.extend_from_slice(&rnd_ifd);
        mac_input.extend_from_slice(&rnd_icc);
        let session_mac: [u8; 16] = aes::aes_cmac(&ctx.key, &mac_input, 16)?.try_into().unwrap();

        let mut ssc_bytes = Vec::with_capacity(8);
        ssc_bytes.extend_from_slice(&rnd_icc[12..16]);
        ssc_bytes.extend_from_slice(&rnd_ifd[12..16]);
        let ssc = u64::from_be_bytes(ssc_bytes.try_into().unwrap());

        let mut session = Session::new(Family::Cipurse, session_enc, session_mac, ssc);
        session.req_level = ctx.req_level;
        session.resp_level = ctx.resp_level;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn authenticate_rejects_short_challenge() {
        let mut transport = MockTransport::new(vec![tlv::encode(&[TlvNode::primitive(0x81, vec![0u8; 4])]).into_iter().chain([0x90, 0x00]).collect()]);
        let ctx = Context { key: [0u8; 16], req_level: SecurityLevel::Mac, resp_level: SecurityLevel::Mac };
        let result = Cipurse::authenticate(&mut transport, &ctx);
        assert!(matches!(result, Err(Error::AuthFailed(_))));
    }

    #[test]
    fn per_direction_levels_are_independently_selectable() {
        let ctx = Context { key: [0u8; 16], req_level: SecurityLevel::Plain, resp_level: SecurityLevel::Encrypted };
        assert_eq!(ctx.req_level, SecurityLevel::Plain);
        assert_eq!(ctx.resp_level, SecurityLevel::Encrypted);
    }
}
