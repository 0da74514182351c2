//! Key store (spec §4.C5, §6 key-ring file format).
//!
//! Generalizes a single ad-hoc MRZ-derived `(kenc, kmac)` pair
//! into the addressable, persisted, multi-key slot record the data model
//! (spec §3) specifies: up to 4 slots, 88 bytes each.

use crate::error::{Error, Result};
use std::io::{Read, Write};
use std::path::Path;

pub const SLOTS_PER_KEYSTORE: usize = 4;
pub const SLOT_SIZE: usize = 88;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct KeySlot {
    pub nonce: [u8; 8],
    pub priv_enc_key: [u8; 16],
    pub priv_mac_key: [u8; 16],
    pub read_key: [u8; 16],
    pub write_key: [u8; 16],
    pub admin_key: [u8; 16],
}

impl KeySlot {
    fn is_empty(&self) -> bool {
        *self == KeySlot::default()
    }

    fn from_bytes(bytes: &[u8; SLOT_SIZE]) -> Self {
        Self {
            nonce: bytes[0..8].try_into().unwrap(),
            priv_enc_key: bytes[8..24].try_into().unwrap(),
            priv_mac_key: bytes[24..40].try_into().unwrap(),
            read_key: bytes[40..56].try_into().unwrap(),
            write_key: bytes[56..72].try_into().unwrap(),
            admin_key: bytes[72..88].try_into().unwrap(),
        }
    }

    fn to_bytes(self) -> [u8; SLOT_SIZE] {
        let mut out = [0u8; SLOT_SIZE];
        out[0..8].copy_from_slice(&self.nonce);
        out[8..24].copy_from_slice(&self.priv_enc_key);
        out[24..40].copy_from_slice(&self.priv_mac_key);
        out[40..56].copy_from_slice(&self.read_key);
        out[56..72].copy_from_slice(&self.write_key);
        out[72..88].copy_from_slice(&self.admin_key);
        out
    }
}

/// A key slot field, for `KeyStore::set`.
#[derive(Copy, Clone, Debug)]
pub enum KeyField {
    Nonce,
    PrivEnc,
    PrivMac,
    Read,
    Write,
    Admin,
}

impl KeyField {
    fn expected_len(self) -> usize {
        match self {
            KeyField::Nonce => 8,
            _ => 16,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct KeyStore {
    slots: [KeySlot; SLOTS_PER_KEYSTORE],
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, index: usize) -> Result<&KeySlot> {
        self.slots.get(index).ok_or_else(|| Error::InvalidArgument(format!("key slot {index} out of range")))
    }

    /// Loads a keyring file. Files shorter than `4 * 88` bytes leave the
    /// trailing slots zeroed; files longer than that are rejected.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = std::fs::File::open(path.as_ref())
            .map_err(|e| Error::InvalidArgument(format!("cannot open keyring file: {e}")))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(|e| Error::InvalidArgument(format!("cannot read keyring file: {e}")))?;
        Self::from_bytes(&data)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let max_len = SLOTS_PER_KEYSTORE * SLOT_SIZE;
        if data.len() > max_len {
            return Err(Error::InvalidArgument(format!(
                "keyring file exceeds {max_len} bytes ({} provided)",
                data.len()
            )));
        }
        let mut store = KeyStore::new();
        for (i, chunk) in data.chunks(SLOT_SIZE).enumerate() {
            if chunk.len() != SLOT_SIZE {
                return Err(Error::InvalidArgument("keyring file is not a whole number of 88-byte slots".into()));
            }
            let bytes: [u8; SLOT_SIZE] = chunk.try_into().unwrap();
            store.slots[i] = KeySlot::from_bytes(&bytes);
        }
        Ok(store)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = std::fs::File::create(path.as_ref())
            .map_err(|e| Error::InvalidArgument(format!("cannot create keyring file: {e}")))?;
        for slot in &self.slots {
            file.write_all(&slot.to_bytes()).map_err(|e| Error::InvalidArgument(format!("cannot write keyring file: {e}")))?;
        }
        Ok(())
    }

    pub fn set(&mut self, index: usize, field: KeyField, bytes: &[u8]) -> Result<()> {
        if bytes.len() != field.expected_len() {
            return Err(Error::InvalidArgument(format!(
                "field expects {} bytes, got {}",
                field.expected_len(),
                bytes.len()
            )));
        }
        let slot = self.slots.get_mut(index).ok_or_else(|| Error::InvalidArgument(format!("key slot {index} out of range")))?;
        match field {
            KeyField::Nonce => slot.nonce.copy_from_slice(bytes),
            KeyField::PrivEnc => slot.priv_enc_key.copy_from_slice(bytes),
            KeyField::PrivMac => slot.priv_mac_key.copy_from_slice(bytes),
            KeyField::Read => slot.read_key.copy_from_slice(bytes),
            KeyField::Write => slot.write_key.copy_from_slice(bytes),
            KeyField::Admin => slot.admin_key.copy_from_slice(bytes),
        }
        Ok(())
    }

    /// Dumps slot indices; `verbose` prints every field, otherwise just the
    /// nonce, matching spec §4.C5.
    pub fn print(&self, verbose: bool) -> String {
        let mut out = String::new();
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.is_empty() {
                out.push_str(&format!("slot {i}: empty\n"));
                continue;
            }
            if verbose {
                out.push_str(&format!(
                    "slot {i}: nonce={} priv_enc={} priv_mac={} read={} write={} admin={}\n",
                    hex::encode(slot.nonce),
                    hex::encode(slot.priv_enc_key),
                    hex::encode(slot.priv_mac_key),
                    hex::encode(slot.read_key),
                    hex::encode(slot.write_key),
                    hex::encode(slot.admin_key),
                ));
            } else {
                out.push_str(&format!("slot {i}: nonce={}\n", hex::encode(slot.nonce)));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_file_leaves_trailing_slots_zeroed() {
        let mut data = vec![0u8; SLOT_SIZE];
        data[0] = 0xAA;
        let store = KeyStore::from_bytes(&data).unwrap();
        assert_eq!(store.slot(0).unwrap().nonce[0], 0xAA);
        assert!(store.slot(1).unwrap().is_empty());
        assert!(store.slot(3).unwrap().is_empty());
    }

    #[test]
    fn oversize_file_is_rejected() {
        let data = vec![0u8; SLOT_SIZE * SLOTS_PER_KEYSTORE + 1];
        assert!(KeyStore::from_bytes(&data).is_err());
    }

    #[test]
    fn partial_slot_length_is_rejected() {
        let data = vec![0u8; SLOT_SIZE + 10];
        assert!(KeyStore::from_bytes(&data).is_err());
    }

    #[test]
    fn set_and_round_trip_via_bytes() {
        let mut store = KeyStore::new();
        store.set(0, KeyField::Read, &[0x11; 16]).unwrap();
        let slot = store.slot(0).unwrap();
        assert_eq!(slot.read_key, [0x11; 16]);
        assert_eq!(slot.to_bytes()[40..56], [0x11; 16]);
    }

    #[test]
    fn set_rejects_wrong_length() {
        let mut store = KeyStore::new();
        assert!(store.set(0, KeyField::Nonce, &[0u8; 16]).is_err());
    }
}
