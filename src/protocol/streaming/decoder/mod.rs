//! Telemetry frame decoding with sequence-gap detection.
use crate::error::DecodeError;
use crate::infra::bits::BitReader;
use crate::protocol::streaming::format::{StreamingFormat, VALUE_BYTES};
use crate::protocol::transport::frame::Frame;

/// Upper bound of values carried by a single frame.
pub const MAX_VALUES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Discontinuity between two consecutive sequence counters.
pub struct SequenceGap {
    /// Counter that would have followed the previous frame.
    pub expected: u8,
    pub received: u8,
}

impl SequenceGap {
    /// Frames missing between the previous sample and this one (modulo 256).
    pub fn lost(&self) -> u8 {
        self.received.wrapping_sub(self.expected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// One decoded telemetry frame.
pub struct StreamingSample {
    /// Reception time reported by the bus timer, in microseconds.
    pub timestamp_us: u64,
    pub counter: u8,
    values: [u32; MAX_VALUES],
    len: usize,
    /// Set when the counter did not follow the previous one.
    pub gap: Option<SequenceGap>,
}

impl StreamingSample {
    /// Decoded raw values in payload order.
    pub fn values(&self) -> &[u32] {
        &self.values[..self.len]
    }
}

#[derive(Debug, Default)]
/// Stateful decoder; remembers the last counter to detect gaps.
pub struct StreamingDecoder {
    previous: Option<u8>,
}

impl StreamingDecoder {
    pub const fn new() -> Self {
        Self { previous: None }
    }

    /// Forget the last counter; the next frame never reports a gap.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Decode `frame`: format byte, sequence counter, then
    /// `sets × channels` little-endian values.
    pub fn decode(&mut self, frame: &Frame, timestamp_us: u64) -> Result<StreamingSample, DecodeError> {
        let payload = frame.payload();
        let mut reader = BitReader::new(payload);
        if payload.len() < 2 {
            return Err(DecodeError::ShortPayload {
                needed: 2,
                available: payload.len(),
            });
        }

        let format_byte = reader.read_u8(8)?;
        let format = StreamingFormat::from_byte(format_byte);
        let count = format.value_count();
        let width = format.value_bytes();
        if count == 0 || count > MAX_VALUES || count * width > VALUE_BYTES {
            return Err(DecodeError::UnsupportedFormat {
                format: format_byte,
            });
        }
        let needed = 2 + count * width;
        if payload.len() < needed {
            return Err(DecodeError::ShortPayload {
                needed,
                available: payload.len(),
            });
        }

        let counter = reader.read_u8(8)?;
        let mut values = [0u32; MAX_VALUES];
        for value in values.iter_mut().take(count) {
            *value = reader.read_u32((width * 8) as u8)?;
        }

        let gap = self.previous.and_then(|previous| {
            let expected = previous.wrapping_add(1);
            (counter != expected).then_some(SequenceGap {
                expected,
                received: counter,
            })
        });
        self.previous = Some(counter);

        #[cfg(feature = "defmt")]
        if let Some(gap) = gap {
            defmt::warn!(
                "Sequence gap: expected {}, received {}",
                gap.expected,
                gap.received
            );
        }

        Ok(StreamingSample {
            timestamp_us,
            counter,
            values,
            len: count,
            gap,
        })
    }
}
