/// Test doubles to simulate the CAN bus, the timer and a sensor node during
/// integration tests.
use icotronic_can::protocol::streaming::StreamingFormat;
use icotronic_can::protocol::transport::{
    frame::Frame,
    identifier::{command, Block},
    node_address::NodeAddress,
    traits::{bus_timer::BusTimer, can_bus::CanBus},
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, Duration, Instant};

#[derive(Clone)]
#[allow(dead_code)]
/// In-memory CAN bus reproducing the `CanBus` trait behavior.
pub struct MockCanBus {
    tx: mpsc::UnboundedSender<Frame>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Frame>>>,
}

#[allow(dead_code)]
impl MockCanBus {
    /// Construct a pair of interconnected buses (SPU ↔ node side).
    pub fn create_pair() -> (Self, Self) {
        let (spu_tx, node_rx) = mpsc::unbounded_channel();
        let (node_tx, spu_rx) = mpsc::unbounded_channel();

        let spu_bus = Self {
            tx: spu_tx,
            rx: Arc::new(Mutex::new(spu_rx)),
        };

        let node_bus = Self {
            tx: node_tx,
            rx: Arc::new(Mutex::new(node_rx)),
        };

        (spu_bus, node_bus)
    }

    /// Frame already waiting on this side, if any.
    pub fn try_recv(&self) -> Option<Frame> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }
}

impl CanBus for MockCanBus {
    type Error = ();

    async fn send<'a>(&'a mut self, frame: &'a Frame) -> Result<(), Self::Error> {
        self.tx.send(*frame).map_err(|_| ())?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Frame, Self::Error> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(())
    }
}

#[allow(dead_code)]
/// Timer based on `tokio::time` so paused-clock tests stay deterministic.
pub struct MockTimer {
    start: Instant,
}

#[allow(dead_code)]
impl MockTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl BusTimer for MockTimer {
    async fn delay_ms(&self, millis: u32) {
        sleep(Duration::from_millis(millis as u64)).await;
    }

    fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

#[allow(dead_code)]
/// Sensor node answering EEPROM and streaming requests addressed to it.
pub struct SimulatedNode {
    bus: MockCanBus,
    address: NodeAddress,
    pages: HashMap<u8, [u8; 256]>,
    write_requests: u32,
    /// Sequence counters emitted after each start request.
    stream_counters: Vec<u8>,
}

#[allow(dead_code)]
impl SimulatedNode {
    pub fn new(bus: MockCanBus, address: NodeAddress) -> Self {
        Self {
            bus,
            address,
            pages: HashMap::new(),
            write_requests: 0,
            stream_counters: Vec::new(),
        }
    }

    pub fn with_stream_counters(mut self, counters: &[u8]) -> Self {
        self.stream_counters = counters.to_vec();
        self
    }

    /// Serve requests until the SPU side of the bus goes away.
    pub async fn run(mut self) {
        while let Ok(request) = self.bus.recv().await {
            if request.id.receiver() != self.address || !request.id.is_request() {
                continue;
            }
            match (request.id.block(), request.id.block_command()) {
                (Block::Eeprom, command::eeprom::READ) => self.read(&request).await,
                (Block::Eeprom, command::eeprom::WRITE) => self.write(&request).await,
                (Block::Eeprom, command::eeprom::WRITE_REQUEST_COUNTER) => {
                    let mut ack = request.acknowledge(false);
                    ack.data[4..8].copy_from_slice(&self.write_requests.to_le_bytes());
                    self.reply(&ack).await;
                }
                (Block::Streaming, command::streaming::DATA) => self.stream(&request).await,
                _ => self.reply(&request.acknowledge(true)).await,
            }
        }
    }

    async fn reply(&mut self, frame: &Frame) {
        let _ = self.bus.send(frame).await;
    }

    async fn read(&mut self, request: &Frame) {
        let (page, offset, len) = (request.data[0], request.data[1] as usize, request.data[2] as usize);
        let memory = self.pages.entry(page).or_insert([0; 256]);
        let mut ack = request.acknowledge(false);
        ack.data[4..4 + len].copy_from_slice(&memory[offset..offset + len]);
        self.reply(&ack).await;
    }

    async fn write(&mut self, request: &Frame) {
        let (page, offset, len) = (request.data[0], request.data[1] as usize, request.data[2] as usize);
        let memory = self.pages.entry(page).or_insert([0; 256]);
        memory[offset..offset + len].copy_from_slice(&request.data[4..4 + len]);
        self.write_requests += 1;
        self.reply(&request.acknowledge(false)).await;
    }

    async fn stream(&mut self, request: &Frame) {
        let format = StreamingFormat::from_byte(request.data[0]);
        let ack = request.acknowledge(false);
        if format.streaming && format.sets == 0 {
            self.reply(&ack).await;
            return;
        }
        if !format.streaming {
            let mut single = ack;
            single.set_payload(&data_payload(request.data[0], 0, 3)).unwrap();
            self.reply(&single).await;
            return;
        }

        self.reply(&ack).await;
        for counter in self.stream_counters.clone() {
            let mut data = ack;
            data.set_payload(&data_payload(request.data[0], counter, format.value_count()))
                .unwrap();
            self.reply(&data).await;
        }
    }
}

#[allow(dead_code)]
/// Telemetry payload whose values are `counter * 10 + index`.
pub fn data_payload(format: u8, counter: u8, values: usize) -> Vec<u8> {
    let mut payload = vec![format, counter];
    for index in 0..values {
        let value = counter as u16 * 10 + index as u16;
        payload.extend_from_slice(&value.to_le_bytes());
    }
    payload
}
