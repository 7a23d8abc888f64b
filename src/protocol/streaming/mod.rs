//! Streaming telemetry: format byte, frame decoding and the data stream
//! subscription built on the request engine.
//!
//! A node streams acknowledge-class frames of the `Streaming/Data` command
//! once a start request was acknowledged. The runner forwards every such frame
//! that resolves no exchange to the single active [`DataStream`].
use core::pin::Pin;
use core::task::{Context, Poll};

use embassy_sync::blocking_mutex::raw::RawMutex;
use futures_util::Stream;

use crate::error::{FrameError, StreamError};
use crate::protocol::exchange::{ExchangePolicy, RequestEngine};
use crate::protocol::transport::frame::Frame;
use crate::protocol::transport::identifier::{command, Block, Identifier};
use crate::protocol::transport::node_address::NodeAddress;
use crate::protocol::transport::traits::bus_timer::BusTimer;
use crate::protocol::transport::STOP_AFTER_ERROR_RETRIES;

pub mod decoder;
pub mod format;

pub use decoder::{SequenceGap, StreamingDecoder, StreamingSample};
pub use format::{StreamingConfiguration, StreamingFormat, ValueWidth};

/// Streaming request from `sender` to `node` carrying `format`.
fn streaming_request(
    sender: NodeAddress,
    node: NodeAddress,
    format: StreamingFormat,
) -> Result<Frame, StreamError> {
    let id = Identifier::builder(Block::Streaming, command::streaming::DATA)
        .sender(sender)
        .receiver(node)
        .build()
        .map_err(FrameError::from)?;
    let byte = format.to_byte()?;
    Ok(Frame::new(id, &[byte])?)
}

impl<M: RawMutex, T: BusTimer, const SLOTS: usize> RequestEngine<M, T, SLOTS> {
    /// Subscribe to the telemetry of `node` and start streaming `channels`.
    ///
    /// A single enabled channel streams three data sets per frame, more
    /// channels stream one set each.
    ///
    /// # Errors
    ///
    /// - [`StreamError::NoChannel`] when `channels` enables nothing.
    /// - [`StreamError::AlreadyStreaming`] while another stream is open.
    /// - [`StreamError::Exchange`] when the start request fails; the
    ///   subscription is released again.
    pub async fn open_stream(
        &self,
        sender: NodeAddress,
        node: NodeAddress,
        channels: StreamingConfiguration,
    ) -> Result<DataStream<'_, M, T, SLOTS>, StreamError> {
        let enabled = channels.enabled_channels();
        if enabled == 0 {
            return Err(StreamError::NoChannel);
        }
        let sets = if enabled <= 1 { 3 } else { 1 };
        let start = streaming_request(sender, node, StreamingFormat::new(channels, sets, true))?;

        let subscription = self.with_table(|table| match table.closed() {
            Some(reason) => Err(StreamError::Exchange(reason)),
            None => table
                .subscribe(node, start.id)
                .ok_or(StreamError::AlreadyStreaming),
        })?;
        while self.stream_end.try_receive().is_ok() {}
        while self.stream.try_receive().is_ok() {}

        // Dropping the stream on failure releases the subscription.
        let stream = DataStream {
            engine: self,
            subscription,
            sender,
            node,
            decoder: StreamingDecoder::new(),
            finished: false,
        };

        #[cfg(feature = "defmt")]
        defmt::info!("Starting stream of {}", node);
        self.send_request(&start, self.config().policy).await?;
        Ok(stream)
    }

    /// Read one set of values of `channels` without streaming.
    pub async fn request_single_sample(
        &self,
        sender: NodeAddress,
        node: NodeAddress,
        channels: StreamingConfiguration,
        policy: ExchangePolicy,
    ) -> Result<StreamingSample, StreamError> {
        if channels.enabled_channels() == 0 {
            return Err(StreamError::NoChannel);
        }
        let request = streaming_request(sender, node, StreamingFormat::new(channels, 1, false))?;
        let response = self.send_request(&request, policy).await?;
        let sample = StreamingDecoder::new().decode(&response, self.timer().now_us())?;
        Ok(sample)
    }
}

/// Active telemetry subscription; yields one [`StreamingSample`] per frame.
///
/// Decoding errors are yielded and the stream continues. When the transport
/// ends or the engine closes, one terminal error is yielded, then `None`.
/// Dropping the stream releases the subscription without telling the node;
/// [`close`](Self::close) also sends the stop request.
pub struct DataStream<'e, M: RawMutex, T: BusTimer, const SLOTS: usize> {
    engine: &'e RequestEngine<M, T, SLOTS>,
    subscription: u32,
    sender: NodeAddress,
    node: NodeAddress,
    decoder: StreamingDecoder,
    finished: bool,
}

impl<M: RawMutex, T: BusTimer, const SLOTS: usize> DataStream<'_, M, T, SLOTS> {
    pub fn node(&self) -> NodeAddress {
        self.node
    }

    fn release(&self) {
        let subscription = self.subscription;
        self.engine
            .with_table(|table| table.unsubscribe(subscription));
    }

    /// Release the subscription and ask the node to stop streaming, using the
    /// engine's default policy.
    pub async fn close(self) -> Result<(), StreamError> {
        let policy = self.engine.config().policy;
        self.stop(policy).await
    }

    /// Stop after a failure: a single retry, errors ignored.
    pub async fn abort(self) {
        let policy = self
            .engine
            .config()
            .policy
            .with_retries(STOP_AFTER_ERROR_RETRIES);
        let _ = self.stop(policy).await;
    }

    async fn stop(self, policy: ExchangePolicy) -> Result<(), StreamError> {
        self.release();
        #[cfg(feature = "defmt")]
        defmt::info!("Stopping stream of {}", self.node);
        let stop = streaming_request(self.sender, self.node, StreamingFormat::stop())?;
        self.engine.send_request(&stop, policy).await?;
        Ok(())
    }
}

impl<M: RawMutex, T: BusTimer, const SLOTS: usize> Stream for DataStream<'_, M, T, SLOTS> {
    type Item = Result<StreamingSample, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        if let Poll::Ready(item) = this.engine.stream.poll_receive(cx) {
            let sample = this
                .decoder
                .decode(&item.frame, item.timestamp_us)
                .map_err(StreamError::from);
            return Poll::Ready(Some(sample));
        }

        match this.engine.stream_end.poll_receive(cx) {
            Poll::Ready(reason) => {
                this.finished = true;
                this.release();
                Poll::Ready(Some(Err(StreamError::Exchange(reason))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<M: RawMutex, T: BusTimer, const SLOTS: usize> Drop for DataStream<'_, M, T, SLOTS> {
    fn drop(&mut self) {
        self.release();
    }
}
