//! Abstraction traits consumed by the transport layer (CAN bus and timer).
pub mod bus_timer;
pub mod can_bus;
