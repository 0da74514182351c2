//! Proxmark3 USB transport (spec §4.C1 hardware backend), feature-gated
//! behind `proxmark3`/`rusb`.
//!
//! VID/PID and the bulk in/out endpoint convention follow
//! `original_source/client/prox.c` (`OUR_VID 0x9ac4`, `OUR_PID 0x4b8f`); the
//! same device was previously driven over a hand-rolled USB HAL, replaced
//! here with `rusb`.

use crate::error::{Error, Result};
use crate::transport::{PollingMode, Transport};
use std::time::Duration;

const PM3_VID: u16 = 0x9ac4;
const PM3_PID: u16 = 0x4b8f;
const ENDPOINT_OUT: u8 = 0x02;
const ENDPOINT_IN: u8 = 0x81;
const USB_TIMEOUT: Duration = Duration::from_millis(2500);

/// Plain ISO 14443-A WUPA, `cmdhfvas.c`'s `WUPA_FRAME` (7 data bits).
const WUPA_FRAME: [u8; 1] = [0x52];

/// The ECP (Enhanced Contactless Polling) frame that restricts the reader
/// field to VAS-capable devices only, `cmdhfvas.c`'s `ECP_VAS_ONLY_FRAME`.
const ECP_VAS_ONLY_FRAME: [u8; 7] = [0x6a, 0x01, 0x00, 0x00, 0x02, 0xe4, 0xd2];

pub struct Proxmark3Transport {
    handle: rusb::DeviceHandle<rusb::GlobalContext>,
}

impl Proxmark3Transport {
    /// Opens the first Proxmark3 device found on the USB bus and claims its
    /// bulk interface.
    pub fn open() -> Result<Self> {
        let handle = rusb::open_device_with_vid_pid(PM3_VID, PM3_PID)
            .ok_or(Error::NoCard)?;
        handle.claim_interface(0).map_err(|e| Error::Transport(format!("cannot claim USB interface: {e}")))?;
        Ok(Self { handle })
    }
}

impl Transport for Proxmark3Transport {
    fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>> {
        self.handle
            .write_bulk(ENDPOINT_OUT, apdu, USB_TIMEOUT)
            .map_err(|e| Error::Transport(format!("USB write failed: {e}")))?;
        let mut buf = vec![0u8; 4096];
        let n = self
            .handle
            .read_bulk(ENDPOINT_IN, &mut buf, USB_TIMEOUT)
            .map_err(|e| match e {
                rusb::Error::Timeout => Error::TransportTimeout,
                other => Error::Transport(format!("USB read failed: {other}")),
            })?;
        buf.truncate(n);
        Ok(buf)
    }

    fn drop_field(&mut self) -> Result<()> {
        self.handle
            .write_bulk(ENDPOINT_OUT, &[0xFF, 0x00], USB_TIMEOUT)
            .map_err(|e| Error::Transport(format!("USB write failed: {e}")))?;
        Ok(())
    }

    fn poll(&mut self, mode: PollingMode) -> Result<Vec<u8>> {
        let frame: &[u8] = match mode {
            PollingMode::Standard => &WUPA_FRAME,
            PollingMode::EcpVasOnly => &ECP_VAS_ONLY_FRAME,
        };
        self.exchange(frame)
    }
}
