//! Chunked EEPROM access over request/acknowledge exchanges.
//!
//! # Wire format
//!
//! ```text
//! Read request  : [page, offset, length, 0, 0, 0, 0, 0]
//! Read ack      : [page, offset, length, 0, d0, d1, d2, d3]
//! Write request : [page, offset, length, 0, d0, d1, d2, d3]   (zero padded)
//! ```
//!
//! At most [`EEPROM_CHUNK_SIZE`] bytes travel per exchange. A logical access
//! never wraps a page and aborts on the first failing chunk; callers must
//! assume nothing was transferred and re-issue the whole operation.
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::error::{FrameError, StorageError};
use crate::protocol::exchange::{ExchangePolicy, RequestEngine};
use crate::protocol::transport::frame::{Frame, MAX_PAYLOAD};
use crate::protocol::transport::identifier::{command, Block, Identifier};
use crate::protocol::transport::node_address::NodeAddress;
use crate::protocol::transport::traits::bus_timer::BusTimer;
use crate::protocol::transport::EEPROM_CHUNK_SIZE;

pub mod fields;
pub mod location;

pub use fields::{EepromStatus, Version};
pub use location::{Chunk, Chunks, StorageLocation};

/// First data byte in read acknowledgments and write requests.
const DATA_START: usize = 4;

//==================================================================================VALUE_CODECS
fn check_width(width: usize) -> Result<(), StorageError> {
    if (1..=8).contains(&width) {
        Ok(())
    } else {
        Err(StorageError::InvalidWidth { width })
    }
}

/// Little-endian bytes of `value`; fails when it does not fit `width` bytes.
pub fn encode_uint(value: u64, width: usize) -> Result<[u8; 8], StorageError> {
    check_width(width)?;
    if width < 8 && value >> (8 * width) != 0 {
        return Err(StorageError::ValueOutOfRange { width });
    }
    Ok(value.to_le_bytes())
}

/// Two's complement bytes of `value`; fails when it does not fit `width` bytes.
pub fn encode_int(value: i64, width: usize) -> Result<[u8; 8], StorageError> {
    check_width(width)?;
    if width < 8 {
        let bits = 8 * width as u32;
        let min = -(1i64 << (bits - 1));
        let max = (1i64 << (bits - 1)) - 1;
        if value < min || value > max {
            return Err(StorageError::ValueOutOfRange { width });
        }
    }
    Ok(value.to_le_bytes())
}

/// Unsigned value of up to eight little-endian bytes.
pub fn decode_uint(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0u64, |value, byte| (value << 8) | *byte as u64)
}

/// Sign-extended value of up to eight little-endian bytes.
pub fn decode_int(bytes: &[u8]) -> i64 {
    if bytes.is_empty() {
        return 0;
    }
    let shift = 64 - 8 * bytes.len().min(8) as u32;
    ((decode_uint(bytes) << shift) as i64) >> shift
}

//==================================================================================EEPROM
/// EEPROM of one node, accessed through a shared [`RequestEngine`].
pub struct Eeprom<'e, M: RawMutex, T: BusTimer, const SLOTS: usize> {
    engine: &'e RequestEngine<M, T, SLOTS>,
    local: NodeAddress,
    node: NodeAddress,
    policy: ExchangePolicy,
}

impl<'e, M: RawMutex, T: BusTimer, const SLOTS: usize> Eeprom<'e, M, T, SLOTS> {
    /// EEPROM of `node`, using the engine's local address and default policy.
    pub fn new(engine: &'e RequestEngine<M, T, SLOTS>, node: NodeAddress) -> Self {
        let config = engine.config();
        Self {
            engine,
            local: config.local_address,
            node,
            policy: config.policy,
        }
    }

    pub fn with_policy(mut self, policy: ExchangePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn node(&self) -> NodeAddress {
        self.node
    }

    fn request(&self, block_command: u8, payload: &[u8]) -> Result<Frame, StorageError> {
        let id = Identifier::builder(Block::Eeprom, block_command)
            .sender(self.local)
            .receiver(self.node)
            .build()
            .map_err(FrameError::from)?;
        Ok(Frame::new(id, payload)?)
    }

    /// Fill `buffer` from `page` starting at `offset`.
    ///
    /// Each chunk advances by the byte count the acknowledgment reports, which
    /// is clamped to the requested count. An acknowledgment reporting no data,
    /// or missing the data it reports, fails with [`StorageError::InvalidResponse`].
    pub async fn read(&self, page: u8, offset: u8, buffer: &mut [u8]) -> Result<(), StorageError> {
        let location = StorageLocation::new(page, offset, buffer.len())?;
        let mut position = 0;
        while position < location.length() {
            let chunk_offset = (offset as usize + position) as u8;
            let requested = (location.length() - position).min(EEPROM_CHUNK_SIZE);
            let request = self.request(
                command::eeprom::READ,
                &[page, chunk_offset, requested as u8, 0, 0, 0, 0, 0],
            )?;
            let response = self.engine.send_request(&request, self.policy).await?;

            let returned = (response.data[2] as usize).min(requested);
            if returned == 0 || response.len < DATA_START + returned {
                #[cfg(feature = "defmt")]
                defmt::warn!("Malformed EEPROM read response from {}", self.node);
                return Err(StorageError::InvalidResponse);
            }
            buffer[position..position + returned]
                .copy_from_slice(&response.data[DATA_START..DATA_START + returned]);
            position += returned;
        }
        Ok(())
    }

    /// Write `data` to `page` starting at `offset`.
    ///
    /// With `pad_to_length`, `data` is first truncated or zero-filled to that
    /// length. Every request carries four data bytes, the last one zero padded,
    /// while the length byte and the offset advance count logical bytes only.
    pub async fn write(
        &self,
        page: u8,
        offset: u8,
        data: &[u8],
        pad_to_length: Option<usize>,
    ) -> Result<(), StorageError> {
        let length = pad_to_length.unwrap_or(data.len());
        let location = StorageLocation::new(page, offset, length)?;
        for chunk in location.chunks() {
            let mut payload = [0u8; MAX_PAYLOAD];
            payload[..DATA_START].copy_from_slice(&[chunk.page, chunk.offset, chunk.len as u8, 0]);
            for (index, slot) in chunk.range().zip(&mut payload[DATA_START..]) {
                *slot = data.get(index).copied().unwrap_or(0);
            }
            let request = self.request(command::eeprom::WRITE, &payload)?;
            self.engine.send_request(&request, self.policy).await?;
        }
        #[cfg(feature = "defmt")]
        defmt::debug!("Wrote {} bytes to page {} of {}", length, page, self.node);
        Ok(())
    }

    /// Unsigned little-endian integer of `width` (1 to 8) bytes.
    pub async fn read_uint(&self, page: u8, offset: u8, width: usize) -> Result<u64, StorageError> {
        check_width(width)?;
        let mut bytes = [0u8; 8];
        self.read(page, offset, &mut bytes[..width]).await?;
        Ok(decode_uint(&bytes[..width]))
    }

    /// Signed little-endian integer of `width` (1 to 8) bytes, sign extended.
    pub async fn read_int(&self, page: u8, offset: u8, width: usize) -> Result<i64, StorageError> {
        check_width(width)?;
        let mut bytes = [0u8; 8];
        self.read(page, offset, &mut bytes[..width]).await?;
        Ok(decode_int(&bytes[..width]))
    }

    pub async fn write_uint(
        &self,
        page: u8,
        offset: u8,
        value: u64,
        width: usize,
    ) -> Result<(), StorageError> {
        let bytes = encode_uint(value, width)?;
        self.write(page, offset, &bytes[..width], None).await
    }

    pub async fn write_int(
        &self,
        page: u8,
        offset: u8,
        value: i64,
        width: usize,
    ) -> Result<(), StorageError> {
        let bytes = encode_int(value, width)?;
        self.write(page, offset, &bytes[..width], None).await
    }

    /// IEEE-754 single precision, little endian.
    pub async fn read_float(&self, page: u8, offset: u8) -> Result<f32, StorageError> {
        let mut bytes = [0u8; 4];
        self.read(page, offset, &mut bytes).await?;
        Ok(f32::from_le_bytes(bytes))
    }

    pub async fn write_float(&self, page: u8, offset: u8, value: f32) -> Result<(), StorageError> {
        self.write(page, offset, &value.to_le_bytes(), None).await
    }

    /// Read `buffer.len()` bytes and return the ASCII text before the first NUL.
    pub async fn read_text<'b>(
        &self,
        page: u8,
        offset: u8,
        buffer: &'b mut [u8],
    ) -> Result<&'b str, StorageError> {
        self.read(page, offset, buffer).await?;
        let buffer: &'b [u8] = buffer;
        let end = buffer.iter().position(|byte| *byte == 0).unwrap_or(buffer.len());
        let text = &buffer[..end];
        if !text.is_ascii() {
            return Err(StorageError::InvalidText);
        }
        core::str::from_utf8(text).map_err(|_| StorageError::InvalidText)
    }

    /// Write ASCII `text`, truncated or zero-filled to `pad_to_length` when given.
    pub async fn write_text(
        &self,
        page: u8,
        offset: u8,
        text: &str,
        pad_to_length: Option<usize>,
    ) -> Result<(), StorageError> {
        if !text.is_ascii() {
            return Err(StorageError::InvalidText);
        }
        self.write(page, offset, text.as_bytes(), pad_to_length).await
    }

    /// Number of write requests the EEPROM has served.
    pub async fn write_request_counter(&self) -> Result<u32, StorageError> {
        let request = self.request(command::eeprom::WRITE_REQUEST_COUNTER, &[0; MAX_PAYLOAD])?;
        let response = self.engine.send_request(&request, self.policy).await?;
        if response.len < DATA_START + 4 {
            return Err(StorageError::InvalidResponse);
        }
        Ok(decode_uint(&response.data[DATA_START..DATA_START + 4]) as u32)
    }
}
