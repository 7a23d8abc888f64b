//! `icotronic-can` library: client-side protocol core for the MyTooliT /
//! ICOtronic CAN sensor network in a `no_std` environment. The crate exposes
//! the identifier and frame codec, the request/acknowledge engine, chunked
//! EEPROM access and the streaming telemetry decoder.
#![cfg_attr(not(test), no_std)]
//==================================================================================
/// Domain and low-level errors (addresses, identifiers, exchanges, storage,
/// streaming and bit-level access).
pub mod error;
/// Bit-level payload access shared by the protocol layers.
pub mod infra;
/// ICOtronic protocol implementation: CAN transport, request engine,
/// EEPROM storage and streaming.
pub mod protocol;
//==================================================================================
