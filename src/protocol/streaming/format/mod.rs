//! Streaming format byte shared by start/stop/single requests and by every
//! telemetry frame.
//!
//! ```text
//! Bit  7      : Streaming (1) / single request (0)
//! Bit  6      : Value width, 0 = 2 bytes, 1 = 3 bytes
//! Bits 5/4/3  : First / second / third channel enabled
//! Bits 0-2    : Data-set code (0, 1, 3, 6, 10, 15, 20, 30 sets)
//! ```
use crate::error::DecodeError;
use crate::infra::bits::{BitReader, BitWriter};
use core::fmt;

/// Number of data sets for each 3-bit data-set code.
pub const DATA_SET_COUNTS: [u8; 8] = [0, 1, 3, 6, 10, 15, 20, 30];

/// Payload bytes available for values after the format byte and counter.
pub const VALUE_BYTES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Which of the three measurement channels are enabled.
pub struct StreamingConfiguration {
    pub first: bool,
    pub second: bool,
    pub third: bool,
}

impl StreamingConfiguration {
    pub const fn new(first: bool, second: bool, third: bool) -> Self {
        Self {
            first,
            second,
            third,
        }
    }

    /// Number of enabled channels (0 to 3).
    pub fn enabled_channels(&self) -> usize {
        [self.first, self.second, self.third]
            .iter()
            .filter(|enabled| **enabled)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValueWidth {
    TwoBytes,
    ThreeBytes,
}

impl ValueWidth {
    pub const fn bytes(self) -> usize {
        match self {
            ValueWidth::TwoBytes => 2,
            ValueWidth::ThreeBytes => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Decoded streaming format byte.
pub struct StreamingFormat {
    /// Continuous streaming (`true`) or a single request (`false`).
    pub streaming: bool,
    pub width: ValueWidth,
    pub channels: StreamingConfiguration,
    /// Data sets per frame, one of [`DATA_SET_COUNTS`].
    pub sets: u8,
}

impl StreamingFormat {
    /// Format with two-byte values.
    pub const fn new(channels: StreamingConfiguration, sets: u8, streaming: bool) -> Self {
        Self {
            streaming,
            width: ValueWidth::TwoBytes,
            channels,
            sets,
        }
    }

    /// Format byte requesting the end of a stream: streaming set, zero data sets.
    pub const fn stop() -> Self {
        Self::new(StreamingConfiguration::new(false, false, false), 0, true)
    }

    /// Decode a format byte. Every byte has a meaning, so this cannot fail.
    pub fn from_byte(byte: u8) -> Self {
        let bytes = [byte];
        let mut reader = BitReader::new(&bytes);
        // Eight bits are always available in a one-byte buffer.
        let mut field = |bits: u8| reader.read_u8(bits).unwrap_or(0);
        let code = field(3);
        let third = field(1) == 1;
        let second = field(1) == 1;
        let first = field(1) == 1;
        let width = if field(1) == 1 {
            ValueWidth::ThreeBytes
        } else {
            ValueWidth::TwoBytes
        };
        let streaming = field(1) == 1;

        Self {
            streaming,
            width,
            channels: StreamingConfiguration::new(first, second, third),
            sets: DATA_SET_COUNTS[code as usize],
        }
    }

    /// Encode the format byte. Fails when `sets` has no data-set code.
    pub fn to_byte(&self) -> Result<u8, DecodeError> {
        let code = DATA_SET_COUNTS
            .iter()
            .position(|count| *count == self.sets)
            .ok_or(DecodeError::UnsupportedSetCount { sets: self.sets })?;

        let mut byte = [0u8; 1];
        let mut writer = BitWriter::new(&mut byte);
        let fields = [
            (code as u8, 3),
            (self.channels.third as u8, 1),
            (self.channels.second as u8, 1),
            (self.channels.first as u8, 1),
            ((self.width == ValueWidth::ThreeBytes) as u8, 1),
            (self.streaming as u8, 1),
        ];
        for (value, bits) in fields {
            writer
                .write_u8(value, bits)
                .map_err(|_| DecodeError::UnsupportedSetCount { sets: self.sets })?;
        }
        Ok(byte[0])
    }

    /// Values carried by one frame: data sets times enabled channels.
    pub fn value_count(&self) -> usize {
        self.sets as usize * self.channels.enabled_channels()
    }

    /// Width of a single value in bytes.
    pub fn value_bytes(&self) -> usize {
        self.width.bytes()
    }
}

impl fmt::Display for StreamingFormat {
    /// `Streaming, Width: 2 bytes, Channels: [1, 3], Data Sets: 3`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.streaming {
            "Streaming"
        } else {
            "Single Request"
        })?;
        write!(f, ", Width: {} bytes, Channels: [", self.width.bytes())?;
        let mut separator = "";
        for (number, enabled) in [
            (1, self.channels.first),
            (2, self.channels.second),
            (3, self.channels.third),
        ] {
            if enabled {
                write!(f, "{separator}{number}")?;
                separator = ", ";
            }
        }
        write!(f, "], Data Sets: {}", self.sets)
    }
}
