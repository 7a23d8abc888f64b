//! Error definitions shared across library modules.
//! Each type models one failure domain: address and identifier parsing,
//! frame construction, request/acknowledge exchanges, EEPROM access and
//! telemetry streaming.
use thiserror_no_std::Error;

//==================================================================================CODEC_ERRORS
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised while building or parsing a node address.
pub enum AddressError {
    /// Numeric value outside the 5-bit address space, kind/number pair outside
    /// its sub-range, or text that does not follow the address grammar.
    #[error("Invalid node address")]
    InvalidAddress,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised while packing or unpacking a 29-bit identifier.
pub enum IdentifierError {
    /// Raw value does not fit the 29-bit identifier space.
    #[error("Invalid identifier: {value:#x}")]
    InvalidIdentifier { value: u32 },
    /// Message block does not fit its 6-bit field.
    #[error("Invalid message block: {block:#x}")]
    InvalidBlock { block: u8 },
    /// Sender or receiver is not a valid node address.
    #[error(transparent)]
    Address(#[from] AddressError),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised while building a frame.
pub enum FrameError {
    /// Classic CAN frames carry at most eight payload bytes.
    #[error("Payload too long: {len} bytes")]
    PayloadTooLong { len: usize },
    /// The transport delivered a standard (11-bit) identifier.
    #[error("Standard identifiers are not part of the protocol")]
    StandardIdentifier,
    /// Identifier could not be decoded.
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
}

//==================================================================================EXCHANGE_ERRORS
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Outcome of a request/acknowledge exchange that did not produce a response.
pub enum ExchangeError {
    /// No matching acknowledgment arrived within `timeout × attempts`.
    #[error("No response after {attempts} attempts")]
    RequestTimeout { attempts: u8 },
    /// The peer answered with an error-flagged acknowledgment.
    #[error("Error response from peer: {payload:?} ({len} bytes)")]
    RemoteError { payload: [u8; 8], len: usize },
    /// The transport ended while the exchange was pending.
    #[error("Transport closed")]
    TransportClosed,
    /// The engine was closed while the exchange was pending.
    #[error("Exchange cancelled")]
    Cancelled,
    /// Only request frames can open an exchange.
    #[error("Frame is not a request")]
    NotARequest,
}

//==================================================================================STORAGE_ERRORS
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised by chunked EEPROM reads and writes.
pub enum StorageError {
    /// A chunk exchange failed; the whole operation was aborted.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    /// The access would run past the end of the page.
    #[error("Access of {length} bytes at offset {offset} crosses the page boundary")]
    OutOfPage { offset: u8, length: usize },
    /// Integer widths are limited to 1..=8 bytes.
    #[error("Invalid integer width: {width}")]
    InvalidWidth { width: usize },
    /// The value does not fit the requested width.
    #[error("Value does not fit in {width} bytes")]
    ValueOutOfRange { width: usize },
    /// Text is not ASCII.
    #[error("Text is not ASCII")]
    InvalidText,
    /// The acknowledgment does not carry the expected chunk layout.
    #[error("Malformed storage response")]
    InvalidResponse,
    /// The request frame could not be built.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

//==================================================================================STREAM_ERRORS
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised while decoding a telemetry frame.
pub enum DecodeError {
    /// Payload shorter than the format byte announces.
    #[error("Streaming payload too short: need {needed}, got {available}")]
    ShortPayload { needed: usize, available: usize },
    /// Format byte announces no values or more values than a sample holds.
    #[error("Unsupported streaming format {format:#010b}")]
    UnsupportedFormat { format: u8 },
    /// No data-set code exists for this number of sets.
    #[error("No data-set code for {sets} sets")]
    UnsupportedSetCount { sets: u8 },
    /// Bit-level access on the payload failed.
    #[error("BitReader error: {err}")]
    BitReader { err: BitReaderError },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors surfaced by a telemetry stream.
pub enum StreamError {
    /// Start/stop/single request failed, or the stream ended with a transport error.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    /// A received frame could not be decoded; the stream continues.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Another stream is already subscribed on this engine.
    #[error("A data stream is already open")]
    AlreadyStreaming,
    /// No channel enabled in the requested configuration.
    #[error("No measurement channel enabled")]
    NoChannel,
    /// The request frame could not be built.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[derive(Error, Debug)]
/// Fatal errors that stop the engine runner.
pub enum RunError<E: core::fmt::Debug> {
    /// Unable to receive frames from the bus (end of stream).
    #[error("CAN bus receive error: {0:?}")]
    Receive(E),
    /// CAN bus rejected an outbound frame.
    #[error("CAN bus send error: {0:?}")]
    Send(E),
}

//==================================================================================BITREADER_ERRORS
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised during bitwise payload reads.
pub enum BitReaderError {
    /// Attempted to read past the end of the payload.
    #[error("Attempted to read out of bounds -> asked: {asked}, available: {available}")]
    OutOfBounds { asked: usize, available: usize },
    /// Requested more bits than the target type can hold.
    #[error("Cannot read more than {max} bits. Requested: {asked}")]
    TooLongForType { max: u8, asked: u8 },
}

//==================================================================================BITWRITER_ERRORS
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised during bitwise payload writes.
pub enum BitWriterError {
    /// Attempted to write beyond the payload capacity.
    #[error("Attempted to write out of bounds -> asked: {asked}, available: {available}")]
    OutOfBounds { asked: usize, available: usize },
    /// Field is too large for the provided type.
    #[error("Cannot write more than {max} bits. Requested: {asked}")]
    TooLongForType { max: u8, asked: u8 },
}

impl From<BitReaderError> for DecodeError {
    fn from(err: BitReaderError) -> Self {
        DecodeError::BitReader { err }
    }
}
