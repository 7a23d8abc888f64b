//! Asynchronous timer abstraction providing exchange deadlines and reception
//! timestamps.

/// Timer shared by every exchange of an engine, hence `&self` receivers.
pub trait BusTimer {
    /// Asynchronously wait for `millis` milliseconds.
    fn delay_ms(&self, millis: u32) -> impl core::future::Future<Output = ()> + '_;
    /// Monotonic time in microseconds, used to timestamp telemetry frames.
    fn now_us(&self) -> u64;
}

#[cfg(feature = "embassy-time")]
/// [`BusTimer`] backed by the `embassy-time` driver of the target.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyTimer;

#[cfg(feature = "embassy-time")]
impl BusTimer for EmbassyTimer {
    fn delay_ms(&self, millis: u32) -> impl core::future::Future<Output = ()> + '_ {
        embassy_time::Timer::after_millis(millis as u64)
    }

    fn now_us(&self) -> u64 {
        embassy_time::Instant::now().as_micros()
    }
}
