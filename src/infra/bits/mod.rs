//! Bit cursor over CAN payloads.
//!
//! ICOtronic payloads mix packed bit fields (streaming format byte, node state
//! byte) with little-endian multi-byte values (streaming samples, EEPROM data).
//! Both are read least-significant bit first, so a single LSB-first cursor
//! covers every layout used by the protocol.
use crate::error::{BitReaderError, BitWriterError};

/// Bits between `cursor` and the end of a `len`-byte buffer.
fn bits_left(len: usize, cursor: usize) -> usize {
    len * 8 - cursor
}

/// Mask of the `width` low bits of a byte (`width` in 1..=8).
fn low_mask(width: usize) -> u8 {
    (0xFFu16 >> (8 - width)) as u8
}

//==================================================================================BITREADER
/// Reader extracting bit fields from a payload slice without copying.
pub struct BitReader<'a> {
    payload: &'a [u8],
    /// Bits consumed since the start of `payload`.
    cursor: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self { payload, cursor: 0 }
    }

    /// Bits left between the cursor and the end of the payload.
    pub fn remaining_bits(&self) -> usize {
        bits_left(self.payload.len(), self.cursor)
    }

    /// Read a `width`-bit field (1..=64), LSB first.
    pub fn read_u64(&mut self, width: u8) -> Result<u64, BitReaderError> {
        if width == 0 || width > 64 {
            return Err(BitReaderError::TooLongForType {
                max: 64,
                asked: width,
            });
        }
        let available = self.remaining_bits();
        if width as usize > available {
            return Err(BitReaderError::OutOfBounds {
                asked: width as usize,
                available,
            });
        }

        let mut field = 0u64;
        let mut done = 0usize;
        while done < width as usize {
            let shift = (self.cursor + done) % 8;
            let take = (8 - shift).min(width as usize - done);
            let bits = (self.payload[(self.cursor + done) / 8] >> shift) & low_mask(take);
            field |= (bits as u64) << done;
            done += take;
        }
        self.cursor += width as usize;
        Ok(field)
    }

    pub fn read_u8(&mut self, width: u8) -> Result<u8, BitReaderError> {
        if width > 8 {
            return Err(BitReaderError::TooLongForType {
                max: 8,
                asked: width,
            });
        }
        Ok(self.read_u64(width)? as u8)
    }

    /// Little-endian sample values are at most 24 bits wide on the wire.
    pub fn read_u32(&mut self, width: u8) -> Result<u32, BitReaderError> {
        if width > 32 {
            return Err(BitReaderError::TooLongForType {
                max: 32,
                asked: width,
            });
        }
        Ok(self.read_u64(width)? as u32)
    }

    pub fn read_bool(&mut self) -> Result<bool, BitReaderError> {
        Ok(self.read_u64(1)? == 1)
    }
}

//==================================================================================BITWRITER
/// Writer packing bit fields into a payload buffer, LSB first.
pub struct BitWriter<'a> {
    payload: &'a mut [u8],
    /// Bits written since the start of `payload`.
    cursor: usize,
}

impl<'a> BitWriter<'a> {
    pub fn new(payload: &'a mut [u8]) -> Self {
        Self { payload, cursor: 0 }
    }

    /// Write the `width` (1..=64) low bits of `value`; previous bits are overwritten.
    pub fn write_u64(&mut self, value: u64, width: u8) -> Result<(), BitWriterError> {
        if width == 0 || width > 64 {
            return Err(BitWriterError::TooLongForType {
                max: 64,
                asked: width,
            });
        }
        let available = bits_left(self.payload.len(), self.cursor);
        if width as usize > available {
            return Err(BitWriterError::OutOfBounds {
                asked: width as usize,
                available,
            });
        }

        let mut done = 0usize;
        while done < width as usize {
            let shift = (self.cursor + done) % 8;
            let take = (8 - shift).min(width as usize - done);
            let mask = low_mask(take) << shift;
            let bits = ((value >> done) as u8) << shift;
            let byte = &mut self.payload[(self.cursor + done) / 8];
            *byte = (*byte & !mask) | (bits & mask);
            done += take;
        }
        self.cursor += width as usize;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8, width: u8) -> Result<(), BitWriterError> {
        if width > 8 {
            return Err(BitWriterError::TooLongForType {
                max: 8,
                asked: width,
            });
        }
        self.write_u64(value as u64, width)
    }
}
