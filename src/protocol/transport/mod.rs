//! MyTooliT transport layer: node addresses, 29-bit identifiers, frames,
//! diagnostic rendering and bus abstraction traits.
//!
//! ## Timing and sizing constants
//!
//! Defaults used by [`ExchangePolicy`](crate::protocol::exchange::ExchangePolicy)
//! and [`EngineConfig`](crate::protocol::exchange::EngineConfig). Every value
//! can be overridden per engine or per call.

pub mod diagnostic;
pub mod frame;
pub mod identifier;
pub mod node_address;
pub mod traits;

/// Time to wait for the acknowledgment of a request before re-sending it (ms).
///
/// Sensor nodes answer within a few milliseconds when reachable over the STU
/// radio link; one second covers a congested link with margin.
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u32 = 1000;

/// Additional attempts after the first request when no acknowledgment arrives.
///
/// A request therefore fails with `RequestTimeout` after `retries + 1` attempts.
pub const DEFAULT_RETRIES: u8 = 10;

/// Retries used when stopping a stream that ended with an error.
///
/// A failed stream usually means the node is unreachable; a single attempt keeps
/// the original error visible quickly.
pub const STOP_AFTER_ERROR_RETRIES: u8 = 1;

/// Frames queued for the runner before `send_request` waits for room.
pub const OUTBOUND_CAPACITY: usize = 8;

/// Telemetry frames buffered between the runner and a [`DataStream`](crate::protocol::streaming::DataStream).
///
/// When the consumer falls behind, further frames are dropped and show up as
/// sequence gaps.
pub const STREAM_CAPACITY: usize = 32;

/// Data bytes carried by one EEPROM read or write exchange.
pub const EEPROM_CHUNK_SIZE: usize = 4;

/// Size of one EEPROM page in bytes.
pub const EEPROM_PAGE_SIZE: usize = 256;
