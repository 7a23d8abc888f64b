//! In-memory representation of a MyTooliT CAN frame.
use crate::error::FrameError;
use crate::protocol::transport::diagnostic::Diagnostic;
use crate::protocol::transport::identifier::Identifier;
use embedded_can::{ExtendedId, Id};

/// Classic CAN frames carry at most eight payload bytes.
pub const MAX_PAYLOAD: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Frame as exchanged with the bus: identifier plus up to eight data bytes.
pub struct Frame {
    /// Packed 29-bit identifier.
    pub id: Identifier,
    /// Payload buffer; bytes past `len` are zero.
    pub data: [u8; MAX_PAYLOAD],
    /// Number of valid payload bytes (Data Length Code, 0 to 8).
    pub len: usize,
}

impl Frame {
    /// Build a frame from an identifier and a payload of at most eight bytes.
    pub fn new(id: Identifier, payload: &[u8]) -> Result<Self, FrameError> {
        let mut frame = Self {
            id,
            data: [0; MAX_PAYLOAD],
            len: 0,
        };
        frame.set_payload(payload)?;
        Ok(frame)
    }

    /// Build a frame from the raw values delivered by a transport.
    pub fn from_raw(raw_id: u32, payload: &[u8]) -> Result<Self, FrameError> {
        let id = Identifier::try_from(raw_id)?;
        Self::new(id, payload)
    }

    /// Valid payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Replace the payload; the reported length follows the new payload.
    pub fn set_payload(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLong { len: payload.len() });
        }
        self.data = [0; MAX_PAYLOAD];
        self.data[..payload.len()].copy_from_slice(payload);
        self.len = payload.len();
        Ok(())
    }

    /// Acknowledgment for this request carrying the same payload.
    pub fn acknowledge(&self, error: bool) -> Frame {
        Frame {
            id: self.id.acknowledge().with_error(error),
            data: self.data,
            len: self.len,
        }
    }

    /// Best-effort human-readable rendering, for logs and tests only.
    pub fn diagnostic(&self) -> Diagnostic<'_> {
        Diagnostic::new(self)
    }

    /// Convert a driver frame. Standard identifiers are not part of the protocol.
    pub fn from_can<F: embedded_can::Frame>(frame: &F) -> Result<Self, FrameError> {
        match frame.id() {
            Id::Standard(_) => Err(FrameError::StandardIdentifier),
            Id::Extended(id) => Self::from_raw(id.as_raw(), frame.data()),
        }
    }

    /// Convert into a driver frame type.
    pub fn to_can<F: embedded_can::Frame>(&self) -> Option<F> {
        let id = ExtendedId::new(self.id.value())?;
        F::new(id, self.payload())
    }
}
