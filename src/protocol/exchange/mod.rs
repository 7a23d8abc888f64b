//! Request/acknowledge correlation engine.
//!
//! Every higher-level operation (EEPROM access, stream control) is expressed as
//! [`RequestEngine::send_request`]: queue a request, wait for the acknowledgment
//! whose identifier mirrors it, re-send on timeout.
//!
//! The engine owns no bus. A single [`EngineRunner`] future owns the
//! [`CanBus`](crate::protocol::transport::traits::can_bus::CanBus), is the only
//! reader, and dispatches each received frame either to the waiting exchange or
//! to the active telemetry subscription. Callers and the runner share the engine
//! by reference, so many conversations can be interleaved on one bus without
//! threads or allocation.
//!
//! # Conversations
//!
//! A conversation is the `(sender, receiver, block, command)` tuple of a request.
//! At most one exchange per conversation is outstanding: same-conversation
//! callers queue on the slot's async mutex, other conversations resolve
//! independently. The number of concurrently active conversations is bounded by
//! the `SLOTS` parameter; a new conversation waits until a slot frees up.
//!
//! ```rust,ignore
//! let engine = RequestEngine::<CriticalSectionRawMutex, _>::new(timer, EngineConfig::default());
//! let runner = engine.runner(bus);
//! join(runner.run(), async {
//!     let ack = engine.send_request(&request, ExchangePolicy::default()).await?;
//!     engine.close();
//! });
//! ```

use core::cell::RefCell;
use core::future::poll_fn;
use core::task::{Context, Poll};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_sync::waitqueue::MultiWakerRegistration;
use futures_util::{future::select, future::Either, pin_mut};

use crate::error::ExchangeError;
use crate::protocol::transport::frame::Frame;
use crate::protocol::transport::identifier::Identifier;
use crate::protocol::transport::node_address::NodeAddress;
use crate::protocol::transport::traits::bus_timer::BusTimer;
use crate::protocol::transport::traits::can_bus::CanBus;
use crate::protocol::transport::{
    DEFAULT_RESPONSE_TIMEOUT_MS, DEFAULT_RETRIES, OUTBOUND_CAPACITY, STREAM_CAPACITY,
};

pub mod runner;

pub use runner::EngineRunner;

/// Conversation slots of an engine when not specified otherwise.
pub const DEFAULT_SLOTS: usize = 4;

/// Wakers kept for callers queued on a full table; more waiters share wake-ups.
const SLOT_WAITERS: usize = 8;

//==================================================================================CONFIGURATION
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Timeout and retry budget of one exchange.
pub struct ExchangePolicy {
    /// Wait for the acknowledgment of each attempt (ms).
    pub timeout_ms: u32,
    /// Re-sends after the first attempt.
    pub retries: u8,
}

impl ExchangePolicy {
    pub const fn new(timeout_ms: u32, retries: u8) -> Self {
        Self {
            timeout_ms,
            retries,
        }
    }

    pub const fn with_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub const fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }

    /// Total attempts before `RequestTimeout`.
    pub const fn attempts(&self) -> u8 {
        self.retries.saturating_add(1)
    }
}

impl Default for ExchangePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RESPONSE_TIMEOUT_MS, DEFAULT_RETRIES)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Engine-wide defaults used by the storage and streaming helpers.
pub struct EngineConfig {
    /// Address the local controller sends from.
    pub local_address: NodeAddress,
    /// Policy applied by helpers that do not take one explicitly.
    pub policy: ExchangePolicy,
}

impl EngineConfig {
    pub const fn with_local_address(mut self, local_address: NodeAddress) -> Self {
        self.local_address = local_address;
        self
    }

    pub const fn with_policy(mut self, policy: ExchangePolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            local_address: NodeAddress::SPU1,
            policy: ExchangePolicy::default(),
        }
    }
}

//==================================================================================EXCHANGE_TABLE
/// Result delivered to a waiting exchange.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Outcome {
    Response(Frame),
    Remote(Frame),
    Failed(ExchangeError),
}

#[derive(Debug, Default)]
struct Slot {
    /// Request identifier without error flag; `None` when the slot is free.
    conversation: Option<u32>,
    /// Callers holding a ticket on this conversation.
    users: usize,
    /// Acknowledgment the current attempt waits for.
    expected: Option<Identifier>,
}

/// Telemetry routing filter of the active subscription.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Subscription {
    pub(crate) id: u32,
    pub(crate) node: NodeAddress,
    pub(crate) template: Identifier,
}

impl Subscription {
    fn matches(&self, id: Identifier) -> bool {
        id.is_acknowledgment()
            && id.sender() == self.node
            && id.block() == self.template.block()
            && id.block_command() == self.template.block_command()
    }
}

pub(crate) enum Route {
    Exchange(usize, Outcome),
    Stream,
    Discard,
}

pub(crate) struct ExchangeTable<const SLOTS: usize> {
    slots: [Slot; SLOTS],
    pub(crate) subscription: Option<Subscription>,
    next_subscription: u32,
    /// Set once the engine is closed or the transport ended.
    closed: Option<ExchangeError>,
    dropped_frames: u32,
    /// Callers waiting for a free slot.
    slot_waiters: MultiWakerRegistration<SLOT_WAITERS>,
}

impl<const SLOTS: usize> ExchangeTable<SLOTS> {
    fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Slot::default()),
            subscription: None,
            next_subscription: 0,
            closed: None,
            dropped_frames: 0,
            slot_waiters: MultiWakerRegistration::new(),
        }
    }

    /// Slot serving `conversation`; `Ok(None)` when every slot is busy.
    fn join(&mut self, conversation: u32) -> Result<Option<usize>, ExchangeError> {
        if let Some(reason) = self.closed {
            return Err(reason);
        }
        let joined = self
            .slots
            .iter()
            .position(|slot| slot.conversation == Some(conversation))
            .or_else(|| self.slots.iter().position(|slot| slot.conversation.is_none()));
        let Some(index) = joined else {
            return Ok(None);
        };
        let slot = &mut self.slots[index];
        slot.conversation = Some(conversation);
        slot.users += 1;
        Ok(Some(index))
    }

    /// Nothing is reserved until this returns `Ready`.
    fn poll_join(
        &mut self,
        conversation: u32,
        cx: &mut Context<'_>,
    ) -> Poll<Result<usize, ExchangeError>> {
        match self.join(conversation) {
            Ok(Some(index)) => Poll::Ready(Ok(index)),
            Err(reason) => Poll::Ready(Err(reason)),
            Ok(None) => {
                self.slot_waiters.register(cx.waker());
                Poll::Pending
            }
        }
    }

    fn leave(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        slot.users = slot.users.saturating_sub(1);
        // A queued caller re-arms the slot itself.
        if slot.users == 0 {
            slot.conversation = None;
            slot.expected = None;
            self.slot_waiters.wake();
        }
    }

    pub(crate) fn closed(&self) -> Option<ExchangeError> {
        self.closed
    }

    fn arm(&mut self, index: usize, expected: Identifier) -> Result<(), ExchangeError> {
        if let Some(reason) = self.closed {
            return Err(reason);
        }
        self.slots[index].expected = Some(expected);
        Ok(())
    }

    /// Matching ignores the error flag; an exchange resolves at most once per attempt.
    pub(crate) fn route(&mut self, frame: &Frame) -> Route {
        let id = frame.id.with_error(false);
        if let Some(index) = self
            .slots
            .iter()
            .position(|slot| slot.expected == Some(id))
        {
            self.slots[index].expected = None;
            let outcome = if frame.id.is_error() {
                Outcome::Remote(*frame)
            } else {
                Outcome::Response(*frame)
            };
            return Route::Exchange(index, outcome);
        }
        match self.subscription {
            Some(subscription) if subscription.matches(frame.id) => Route::Stream,
            _ => Route::Discard,
        }
    }

    /// Mark the engine closed and collect the armed slots to fail.
    fn shut(&mut self, reason: ExchangeError) -> [bool; SLOTS] {
        if self.closed.is_none() {
            self.closed = Some(reason);
        }
        self.slot_waiters.wake();
        core::array::from_fn(|index| self.slots[index].expected.take().is_some())
    }

    /// Install the telemetry filter; `None` when another subscription is active.
    pub(crate) fn subscribe(&mut self, node: NodeAddress, template: Identifier) -> Option<u32> {
        if self.subscription.is_some() {
            return None;
        }
        self.next_subscription = self.next_subscription.wrapping_add(1);
        self.subscription = Some(Subscription {
            id: self.next_subscription,
            node,
            template,
        });
        Some(self.next_subscription)
    }

    pub(crate) fn unsubscribe(&mut self, id: u32) {
        if matches!(self.subscription, Some(subscription) if subscription.id == id) {
            self.subscription = None;
        }
    }
}

//==================================================================================REQUEST_ENGINE
/// Telemetry frame handed from the runner to the stream subscription.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StreamItem {
    pub(crate) frame: Frame,
    pub(crate) timestamp_us: u64,
}

/// Correlation engine shared by reference between callers and the runner.
pub struct RequestEngine<M: RawMutex, T: BusTimer, const SLOTS: usize = DEFAULT_SLOTS> {
    pub(crate) timer: T,
    config: EngineConfig,
    pub(crate) outbound: Channel<M, Frame, OUTBOUND_CAPACITY>,
    pub(crate) table: BlockingMutex<M, RefCell<ExchangeTable<SLOTS>>>,
    outcomes: [Signal<M, Outcome>; SLOTS],
    turns: [Mutex<M, ()>; SLOTS],
    pub(crate) stream: Channel<M, StreamItem, STREAM_CAPACITY>,
    /// Terminal error of the active stream; holds at most one reason.
    pub(crate) stream_end: Channel<M, ExchangeError, 1>,
    pub(crate) shutdown: Signal<M, ()>,
}

/// Membership of a caller in a conversation slot; leaving is tied to drop so a
/// cancelled `send_request` never leaves a dangling exchange.
struct SlotTicket<'e, M: RawMutex, T: BusTimer, const SLOTS: usize> {
    engine: &'e RequestEngine<M, T, SLOTS>,
    index: usize,
}

impl<M: RawMutex, T: BusTimer, const SLOTS: usize> Drop for SlotTicket<'_, M, T, SLOTS> {
    fn drop(&mut self) {
        let index = self.index;
        self.engine.with_table(|table| table.leave(index));
    }
}

impl<M: RawMutex, T: BusTimer, const SLOTS: usize> RequestEngine<M, T, SLOTS> {
    pub fn new(timer: T, config: EngineConfig) -> Self {
        Self {
            timer,
            config,
            outbound: Channel::new(),
            table: BlockingMutex::new(RefCell::new(ExchangeTable::new())),
            outcomes: core::array::from_fn(|_| Signal::new()),
            turns: core::array::from_fn(|_| Mutex::new(())),
            stream: Channel::new(),
            stream_end: Channel::new(),
            shutdown: Signal::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Runner owning `bus`; it must be polled for any exchange to progress.
    pub fn runner<C: CanBus>(&self, bus: C) -> EngineRunner<'_, M, T, C, SLOTS> {
        EngineRunner::new(self, bus)
    }

    pub(crate) fn with_table<R>(&self, f: impl FnOnce(&mut ExchangeTable<SLOTS>) -> R) -> R {
        self.table.lock(|table| f(&mut table.borrow_mut()))
    }

    /// Conversations currently holding a slot.
    pub fn active_conversations(&self) -> usize {
        self.with_table(|table| {
            table
                .slots
                .iter()
                .filter(|slot| slot.conversation.is_some())
                .count()
        })
    }

    /// Telemetry frames dropped because the subscriber fell behind.
    pub fn dropped_frames(&self) -> u32 {
        self.with_table(|table| table.dropped_frames)
    }

    /// `true` once [`close`](Self::close) ran or the transport ended.
    pub fn is_closed(&self) -> bool {
        self.with_table(|table| table.closed.is_some())
    }

    /// Send `request` and wait for its acknowledgment.
    ///
    /// The identical request is re-sent after each `policy.timeout_ms` without
    /// a matching acknowledgment, `policy.retries` times at most. When every
    /// slot serves another conversation the call waits for one to free up.
    ///
    /// # Errors
    ///
    /// - [`ExchangeError::NotARequest`] when `request` is an acknowledgment.
    /// - [`ExchangeError::RequestTimeout`] after `retries + 1` silent attempts.
    /// - [`ExchangeError::RemoteError`] when the peer answers with the error flag.
    /// - [`ExchangeError::Cancelled`] / [`ExchangeError::TransportClosed`] when the
    ///   engine stops while the exchange is pending.
    pub async fn send_request(
        &self,
        request: &Frame,
        policy: ExchangePolicy,
    ) -> Result<Frame, ExchangeError> {
        if !request.id.is_request() {
            return Err(ExchangeError::NotARequest);
        }

        let conversation = request.id.with_error(false).value();
        let index =
            poll_fn(|cx| self.with_table(|table| table.poll_join(conversation, cx))).await?;
        let ticket = SlotTicket {
            engine: self,
            index,
        };
        let _turn = self.turns[ticket.index].lock().await;

        let expected = request.id.acknowledge().with_error(false);
        for _ in 0..policy.attempts() {
            self.outcomes[ticket.index].reset();
            self.with_table(|table| table.arm(ticket.index, expected))?;

            match self.attempt(ticket.index, request, policy.timeout_ms).await {
                Some(Outcome::Response(response)) => return Ok(response),
                Some(Outcome::Remote(response)) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Error response for {}", request.id);
                    return Err(ExchangeError::RemoteError {
                        payload: response.data,
                        len: response.len,
                    });
                }
                Some(Outcome::Failed(err)) => return Err(err),
                None => {
                    #[cfg(feature = "defmt")]
                    defmt::debug!("No response for {}, re-sending", request.id);
                }
            }
        }

        #[cfg(feature = "defmt")]
        defmt::warn!("Request {} timed out", request.id);
        Err(ExchangeError::RequestTimeout {
            attempts: policy.attempts(),
        })
    }

    /// One attempt: queue the frame, then wait for the outcome or the deadline.
    async fn attempt(&self, index: usize, request: &Frame, timeout_ms: u32) -> Option<Outcome> {
        let send = self.outbound.send(*request);
        let wait = self.outcomes[index].wait();
        pin_mut!(send, wait);

        // The outcome may arrive while the outbound queue is full (engine closed).
        let wait = match select(send, wait).await {
            Either::Left(((), wait)) => wait,
            Either::Right((outcome, _)) => return Some(outcome),
        };

        let deadline = self.timer.delay_ms(timeout_ms);
        pin_mut!(deadline);
        match select(wait, deadline).await {
            Either::Left((outcome, _)) => Some(outcome),
            Either::Right(((), _)) => None,
        }
    }

    /// Deliver a received frame to its exchange or to the stream subscription.
    pub(crate) fn dispatch(&self, frame: Frame) {
        match self.with_table(|table| table.route(&frame)) {
            Route::Exchange(index, outcome) => self.outcomes[index].signal(outcome),
            Route::Stream => {
                let item = StreamItem {
                    frame,
                    timestamp_us: self.timer.now_us(),
                };
                if self.stream.try_send(item).is_err() {
                    self.with_table(|table| {
                        table.dropped_frames = table.dropped_frames.wrapping_add(1)
                    });
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Stream buffer full, dropping {}", frame.id);
                }
            }
            Route::Discard => {
                #[cfg(feature = "defmt")]
                defmt::trace!("Discarding unsolicited {}", frame.id);
            }
        }
    }

    /// Resolve every pending exchange and the stream with `reason`.
    pub(crate) fn terminate(&self, reason: ExchangeError) {
        let (armed, streaming) =
            self.with_table(|table| (table.shut(reason), table.subscription.is_some()));
        for (index, armed) in armed.iter().enumerate() {
            if *armed {
                self.outcomes[index].signal(Outcome::Failed(reason));
            }
        }
        if streaming {
            // A reason already queued ends the stream first.
            let _ = self.stream_end.try_send(reason);
        }
    }

    /// Cancel every pending exchange, end the stream subscription and stop the
    /// runner. Later requests fail with [`ExchangeError::Cancelled`].
    pub fn close(&self) {
        #[cfg(feature = "defmt")]
        defmt::info!("Closing request engine");
        self.terminate(ExchangeError::Cancelled);
        self.shutdown.signal(());
    }
}
