//! Reader transport abstraction (spec §4.C1).
//!
//! Generalizes direct Proxmark3 `pm3_device` calls behind a
//! trait so the engine above it (`select`, `session`, `orchestrator`) never
//! references a concrete reader. [`MockTransport`] is the in-process
//! stand-in used by every other module's unit tests; the real hardware
//! backend lives in [`proxmark3`] behind the `proxmark3` feature.

#[cfg(feature = "proxmark3")]
pub mod proxmark3;

use crate::error::{Error, Result};

/// RF field polling behavior (spec §4.C1: "standard 14443 polling" vs.
/// "Apple ECP VAS-only polling frame", needed so VAS selection doesn't
/// wake ordinary 14443 cards during the scan).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PollingMode {
    Standard,
    EcpVasOnly,
}

/// A reader capable of exchanging APDUs with a single card in the field.
/// Every operation is synchronous and blocking; the orchestrator owns
/// retry/timeout policy, not the transport.
pub trait Transport {
    /// Sends a raw APDU and returns the raw response, SW1SW2 included.
    fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>>;

    /// Switches off the RF field, forcing any card to reset on next poll.
    fn drop_field(&mut self) -> Result<()>;

    /// Re-polls the field in the given mode and returns the card's ATQA/UID
    /// or an equivalent identifying answer-to-select; used by `select` to
    /// confirm a card re-entered the field after [`Transport::drop_field`].
    fn poll(&mut self, mode: PollingMode) -> Result<Vec<u8>>;
}

/// RAII guard that calls [`Transport::drop_field`] on drop, so a failing
/// handshake never leaves the reader energizing a half-authenticated card
/// (spec §4.C10: "first failure tears the whole operation down").
pub struct FieldGuard<'a> {
    transport: &'a mut dyn Transport,
    armed: bool,
}

impl<'a> FieldGuard<'a> {
    pub fn new(transport: &'a mut dyn Transport) -> Self {
        Self { transport, armed: true }
    }

    /// Disarms the guard once a call site completes successfully and wants
    /// the field left live (e.g. chaining into a second operation).
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Reborrows the guarded transport. Callers that hold a `FieldGuard`
    /// must reach the transport through this method rather than through
    /// whatever reference the guard was built from — that reference is
    /// tied up for the guard's whole lifetime.
    pub fn transport(&mut self) -> &mut dyn Transport {
        &mut *self.transport
    }
}

impl Drop for FieldGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.transport.drop_field();
        }
    }
}

/// In-memory transport used by every module's unit tests: a fixed queue of
/// canned responses, returned in order regardless of the APDU sent.
pub struct MockTransport {
    responses: std::collections::VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    field_dropped: bool,
}

impl MockTransport {
    pub fn new(responses: Vec<Vec<u8>>) -> Self {
        Self { responses: responses.into(), sent: Vec::new(), field_dropped: false }
    }

    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    pub fn field_was_dropped(&self) -> bool {
        self.field_dropped
    }
}

impl Transport for MockTransport {
    fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>> {
        self.sent.push(apdu.to_vec());
        self.responses.pop_front().ok_or(Error::TransportTimeout)
    }

    fn drop_field(&mut self) -> Result<()> {
        self.field_dropped = true;
        Ok(())
    }

    fn poll(&mut self, _mode: PollingMode) -> Result<Vec<u8>> {
        Ok(vec![0x04, 0x00, 0x00, 0x00])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_transport_returns_queued_responses_in_order() {
        let mut t = MockTransport::new(vec![vec![0x90, 0x00], vec![0x6A, 0x82]]);
        assert_eq!(t.exchange(&[0x00]).unwrap(), vec![0x90, 0x00]);
        assert_eq!(t.exchange(&[0x00]).unwrap(), vec![0x6A, 0x82]);
        assert!(matches!(t.exchange(&[0x00]), Err(Error::TransportTimeout)));
        assert_eq!(t.sent().len(), 3);
    }

    #[test]
    fn field_guard_drops_field_unless_disarmed() {
        let mut t = MockTransport::new(vec![]);
        {
            let _guard = FieldGuard::new(&mut t);
        }
        assert!(t.field_was_dropped());

        let mut t2 = MockTransport::new(vec![]);
        {
            let mut guard = FieldGuard::new(&mut t2);
            guard.disarm();
        }
        assert!(!t2.field_was_dropped());
    }
}
