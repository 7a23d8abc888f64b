//! High-level components of the ICOtronic protocol: frame transport, the
//! request/acknowledge engine, EEPROM storage and telemetry streaming.
pub mod exchange;
pub mod storage;
pub mod streaming;
pub mod transport;
