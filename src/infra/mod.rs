//! Payload-level infrastructure shared by the protocol layers.
pub mod bits;
