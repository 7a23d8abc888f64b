//! Minimal abstraction for an asynchronous CAN bus. Allows the library to plug
//! into various implementations (embedded HAL, SocketCAN, PCAN, mock buses).
use crate::protocol::transport::frame::Frame;
use futures_util::Future;

/// Contract to send and receive MyTooliT frames asynchronously.
///
/// A receive error means the transport ended: the engine resolves every pending
/// exchange with [`ExchangeError::TransportClosed`](crate::error::ExchangeError::TransportClosed)
/// and stops.
pub trait CanBus {
    type Error: core::fmt::Debug;
    /// Emit a frame on the bus. Asynchronous to accommodate non-blocking drivers.
    fn send<'a>(&'a mut self, frame: &'a Frame) -> impl Future<Output = Result<(), Self::Error>> + 'a;
    /// Retrieve the next available frame. Asynchronously waits until data arrives.
    fn recv<'a>(&'a mut self) -> impl Future<Output = Result<Frame, Self::Error>> + 'a;
}
