//! Runner owning the bus: the single reader and writer of an engine.
use core::fmt::Debug;

use embassy_sync::blocking_mutex::raw::RawMutex;
use futures_util::{future::select, future::Either, pin_mut};

use crate::error::{ExchangeError, RunError};
use crate::protocol::exchange::RequestEngine;
use crate::protocol::transport::frame::Frame;
use crate::protocol::transport::traits::bus_timer::BusTimer;
use crate::protocol::transport::traits::can_bus::CanBus;

/// Drives the bus on behalf of a [`RequestEngine`].
pub struct EngineRunner<'e, M, T, C, const SLOTS: usize>
where
    M: RawMutex,
    T: BusTimer,
    C: CanBus,
{
    engine: &'e RequestEngine<M, T, SLOTS>,
    bus: C,
}

enum Event<E> {
    Received(Result<Frame, E>),
    Outbound(Frame),
    Shutdown,
}

impl<'e, M, T, C, const SLOTS: usize> EngineRunner<'e, M, T, C, SLOTS>
where
    M: RawMutex,
    T: BusTimer,
    C: CanBus,
    C::Error: Debug,
{
    pub fn new(engine: &'e RequestEngine<M, T, SLOTS>, bus: C) -> Self {
        Self { engine, bus }
    }

    /// Multiplex bus reception, queued requests and shutdown until the engine
    /// is closed (`Ok`) or the bus fails (`Err`).
    ///
    /// A bus failure resolves every pending exchange and the stream
    /// subscription with [`ExchangeError::TransportClosed`].
    pub async fn run(mut self) -> Result<(), RunError<C::Error>> {
        #[cfg(feature = "defmt")]
        defmt::info!("Engine runner started");

        loop {
            let event = {
                let received = self.bus.recv();
                let outbound = self.engine.outbound.receive();
                let shutdown = self.engine.shutdown.wait();
                pin_mut!(received, outbound, shutdown);

                match select(received, select(outbound, shutdown)).await {
                    Either::Left((result, _)) => Event::Received(result),
                    Either::Right((Either::Left((frame, _)), _)) => Event::Outbound(frame),
                    Either::Right((Either::Right(((), _)), _)) => Event::Shutdown,
                }
            };

            match event {
                Event::Received(Ok(frame)) => self.engine.dispatch(frame),
                Event::Received(Err(err)) => {
                    #[cfg(feature = "defmt")]
                    defmt::error!("CAN receive failed, closing transport");
                    self.engine.terminate(ExchangeError::TransportClosed);
                    return Err(RunError::Receive(err));
                }
                Event::Outbound(frame) => {
                    if let Err(err) = self.bus.send(&frame).await {
                        #[cfg(feature = "defmt")]
                        defmt::error!("CAN send failed for {}", frame.id);
                        self.engine.terminate(ExchangeError::TransportClosed);
                        return Err(RunError::Send(err));
                    }
                }
                Event::Shutdown => {
                    #[cfg(feature = "defmt")]
                    defmt::info!("Engine runner stopped");
                    return Ok(());
                }
            }
        }
    }
}
