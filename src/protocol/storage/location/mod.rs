//! Storage locations and their split into 4-byte chunks.
use crate::error::StorageError;
use crate::protocol::transport::{EEPROM_CHUNK_SIZE, EEPROM_PAGE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Logical access to `length` bytes of one EEPROM page. Never wraps a page.
pub struct StorageLocation {
    pub page: u8,
    pub offset: u8,
    length: usize,
}

impl StorageLocation {
    /// Fails with [`StorageError::OutOfPage`] when `offset + length` exceeds the page.
    pub fn new(page: u8, offset: u8, length: usize) -> Result<Self, StorageError> {
        if offset as usize + length > EEPROM_PAGE_SIZE {
            return Err(StorageError::OutOfPage { offset, length });
        }
        Ok(Self {
            page,
            offset,
            length,
        })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Chunks of at most [`EEPROM_CHUNK_SIZE`] bytes covering the location.
    pub fn chunks(&self) -> Chunks {
        Chunks {
            location: *self,
            position: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// One exchange worth of a logical access.
pub struct Chunk {
    pub page: u8,
    /// Page offset of the first byte of the chunk.
    pub offset: u8,
    /// Index of the first byte within the logical buffer.
    pub start: usize,
    /// Logical bytes in this chunk (1 to 4).
    pub len: usize,
}

impl Chunk {
    /// Range of the chunk within the logical buffer.
    pub fn range(&self) -> core::ops::Range<usize> {
        self.start..self.start + self.len
    }
}

/// Iterator over the chunks of a [`StorageLocation`].
pub struct Chunks {
    location: StorageLocation,
    position: usize,
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.location.length - self.position;
        if remaining == 0 {
            return None;
        }
        let chunk = Chunk {
            page: self.location.page,
            // Below the page size while bytes remain.
            offset: (self.location.offset as usize + self.position) as u8,
            start: self.position,
            len: remaining.min(EEPROM_CHUNK_SIZE),
        };
        self.position += chunk.len;
        Some(chunk)
    }
}
