//! Request engine tests: acknowledgment matching, retries, concurrency,
//! cancellation and transport failure.
mod helpers {
    include!("../../helpers/mod.rs");
}

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use helpers::{MockCanBus, MockTimer};
use icotronic_can::error::{ExchangeError, RunError};
use icotronic_can::protocol::exchange::{EngineConfig, ExchangePolicy, RequestEngine};
use icotronic_can::protocol::transport::{
    frame::Frame,
    identifier::{command, Block, Identifier},
    node_address::NodeAddress,
    traits::can_bus::CanBus,
};
use tokio::time::{sleep, Duration, Instant};

type Engine<const SLOTS: usize = 4> = RequestEngine<NoopRawMutex, MockTimer, SLOTS>;

fn request(block: Block, block_command: u8, payload: &[u8]) -> Frame {
    request_to(NodeAddress::STH1, block, block_command, payload)
}

fn request_to(receiver: NodeAddress, block: Block, block_command: u8, payload: &[u8]) -> Frame {
    let id = Identifier::builder(block, block_command)
        .sender(NodeAddress::SPU1)
        .receiver(receiver)
        .build()
        .unwrap();
    Frame::new(id, payload).unwrap()
}

fn reset() -> Frame {
    request(Block::System, command::system::RESET, &[])
}

fn reset_sth(number: u8) -> Frame {
    request_to(
        NodeAddress::new(number).unwrap(),
        Block::System,
        command::system::RESET,
        &[],
    )
}

fn eeprom_read() -> Frame {
    request(Block::Eeprom, command::eeprom::READ, &[0, 0, 4, 0, 0, 0, 0, 0])
}

/// Acknowledgment tagged with the block value of its request.
fn tagged_ack(request: &Frame) -> Frame {
    let mut ack = request.acknowledge(false);
    ack.set_payload(&[request.id.block().value()]).unwrap();
    ack
}

#[tokio::test]
/// The acknowledgment mirroring the request resolves the exchange.
async fn test_request_acknowledged() {
    let (spu_bus, mut node_bus) = MockCanBus::create_pair();
    let engine: Engine = RequestEngine::new(MockTimer::new(), EngineConfig::default());
    let runner = engine.runner(spu_bus);

    let (run, response, ()) = tokio::join!(
        runner.run(),
        async {
            let response = engine.send_request(&reset(), ExchangePolicy::default()).await;
            engine.close();
            response
        },
        async {
            let received = node_bus.recv().await.unwrap();
            assert_eq!(received, reset());
            // Unrelated traffic is discarded.
            node_bus.send(&eeprom_read().acknowledge(false)).await.unwrap();
            node_bus.send(&tagged_ack(&received)).await.unwrap();
        }
    );

    let response = response.unwrap();
    assert_eq!(response.id, reset().id.acknowledge());
    assert_eq!(response.payload(), &[0x00]);
    assert!(run.is_ok());
    assert_eq!(engine.active_conversations(), 0);
}

#[tokio::test(start_paused = true)]
/// Without any acknowledgment the request is sent `retries + 1` times, one
/// timeout apart, then fails.
async fn test_timeout_after_all_attempts() {
    let (spu_bus, node_bus) = MockCanBus::create_pair();
    let engine: Engine = RequestEngine::new(MockTimer::new(), EngineConfig::default());
    let runner = engine.runner(spu_bus);
    let policy = ExchangePolicy::new(100, 2);

    let (_, (result, elapsed)) = tokio::join!(runner.run(), async {
        let start = Instant::now();
        let result = engine.send_request(&reset(), policy).await;
        let elapsed = start.elapsed();
        engine.close();
        (result, elapsed)
    });

    assert_eq!(result, Err(ExchangeError::RequestTimeout { attempts: 3 }));
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_millis(310));

    let mut sent = Vec::new();
    while let Some(frame) = node_bus.try_recv() {
        sent.push(frame);
    }
    assert_eq!(sent, vec![reset(); 3]);
}

#[tokio::test]
/// An error-flagged acknowledgment surfaces the peer payload.
async fn test_remote_error() {
    let (spu_bus, mut node_bus) = MockCanBus::create_pair();
    let engine: Engine = RequestEngine::new(MockTimer::new(), EngineConfig::default());
    let runner = engine.runner(spu_bus);

    let (_, result, ()) = tokio::join!(
        runner.run(),
        async {
            let result = engine.send_request(&eeprom_read(), ExchangePolicy::default()).await;
            engine.close();
            result
        },
        async {
            let received = node_bus.recv().await.unwrap();
            let mut nack = received.acknowledge(true);
            nack.set_payload(&[0xEE, 0x01]).unwrap();
            node_bus.send(&nack).await.unwrap();
        }
    );

    assert_eq!(
        result,
        Err(ExchangeError::RemoteError {
            payload: [0xEE, 0x01, 0, 0, 0, 0, 0, 0],
            len: 2
        })
    );
}

#[tokio::test]
/// Two conversations in flight resolve independently even when acknowledged
/// out of order.
async fn test_concurrent_out_of_order() {
    let (spu_bus, mut node_bus) = MockCanBus::create_pair();
    let engine: Engine = RequestEngine::new(MockTimer::new(), EngineConfig::default());
    let runner = engine.runner(spu_bus);
    let policy = ExchangePolicy::default();
    let reset = reset();
    let read = eeprom_read();

    let (_, (reset_ack, read_ack), ()) = tokio::join!(
        runner.run(),
        async {
            let acks = tokio::join!(
                engine.send_request(&reset, policy),
                engine.send_request(&read, policy)
            );
            engine.close();
            acks
        },
        async {
            let first = node_bus.recv().await.unwrap();
            let second = node_bus.recv().await.unwrap();
            node_bus.send(&tagged_ack(&second)).await.unwrap();
            node_bus.send(&tagged_ack(&first)).await.unwrap();
        }
    );

    assert_eq!(reset_ack.unwrap().payload(), &[Block::System.value()]);
    assert_eq!(read_ack.unwrap().payload(), &[Block::Eeprom.value()]);
}

#[tokio::test(start_paused = true)]
/// Same-conversation callers queue: the second request leaves only after the
/// first one is acknowledged.
async fn test_same_conversation_serialized() {
    let (spu_bus, mut node_bus) = MockCanBus::create_pair();
    let engine: Engine = RequestEngine::new(MockTimer::new(), EngineConfig::default());
    let runner = engine.runner(spu_bus);
    let policy = ExchangePolicy::default();
    let reset = reset();

    let (_, (first, second), ()) = tokio::join!(
        runner.run(),
        async {
            let acks = tokio::join!(
                engine.send_request(&reset, policy),
                engine.send_request(&reset, policy)
            );
            engine.close();
            acks
        },
        async {
            let received = node_bus.recv().await.unwrap();
            sleep(Duration::from_millis(50)).await;
            assert!(node_bus.try_recv().is_none());
            node_bus.send(&received.acknowledge(false)).await.unwrap();

            let received = node_bus.recv().await.unwrap();
            assert_eq!(received, reset);
            node_bus.send(&received.acknowledge(false)).await.unwrap();
        }
    );

    assert!(first.is_ok());
    assert!(second.is_ok());
}

#[tokio::test(start_paused = true)]
/// Closing the engine cancels pending exchanges and refuses new ones.
async fn test_close_cancels_pending() {
    let (spu_bus, _node_bus) = MockCanBus::create_pair();
    let engine: Engine = RequestEngine::new(MockTimer::new(), EngineConfig::default());
    let runner = engine.runner(spu_bus);
    let reset = reset();

    let (run, pending, ()) = tokio::join!(
        runner.run(),
        engine.send_request(&reset, ExchangePolicy::new(10_000, 0)),
        async {
            sleep(Duration::from_millis(50)).await;
            engine.close();
        }
    );

    assert_eq!(pending, Err(ExchangeError::Cancelled));
    assert!(run.is_ok());
    assert!(engine.is_closed());
    assert_eq!(
        engine.send_request(&reset, ExchangePolicy::default()).await,
        Err(ExchangeError::Cancelled)
    );
    assert_eq!(engine.active_conversations(), 0);
}

#[tokio::test(start_paused = true)]
/// Losing the bus fails pending exchanges with `TransportClosed`.
async fn test_transport_closed() {
    let (spu_bus, node_bus) = MockCanBus::create_pair();
    let engine: Engine = RequestEngine::new(MockTimer::new(), EngineConfig::default());
    let runner = engine.runner(spu_bus);
    let reset = reset();

    let (run, pending, ()) = tokio::join!(
        runner.run(),
        engine.send_request(&reset, ExchangePolicy::new(10_000, 0)),
        async move {
            sleep(Duration::from_millis(50)).await;
            drop(node_bus);
        }
    );

    assert_eq!(pending, Err(ExchangeError::TransportClosed));
    assert!(matches!(run, Err(RunError::Receive(()))));
    assert_eq!(
        engine.send_request(&reset, ExchangePolicy::default()).await,
        Err(ExchangeError::TransportClosed)
    );
}

#[tokio::test(start_paused = true)]
/// Dropping a pending `send_request` future releases its conversation slot.
async fn test_dropped_request_releases_slot() {
    let (spu_bus, _node_bus) = MockCanBus::create_pair();
    let engine: Engine = RequestEngine::new(MockTimer::new(), EngineConfig::default());
    let runner = engine.runner(spu_bus);
    let reset = reset();

    let (_, ()) = tokio::join!(runner.run(), async {
        let outcome = tokio::time::timeout(
            Duration::from_millis(10),
            engine.send_request(&reset, ExchangePolicy::default()),
        )
        .await;
        assert!(outcome.is_err());
        assert_eq!(engine.active_conversations(), 0);
        engine.close();
    });
}

#[tokio::test(start_paused = true)]
/// With every slot busy a new conversation waits and is sent once the slot
/// frees up.
async fn test_full_table_queues_new_conversation() {
    let (spu_bus, mut node_bus) = MockCanBus::create_pair();
    let engine: Engine<1> = RequestEngine::new(MockTimer::new(), EngineConfig::default());
    let runner = engine.runner(spu_bus);
    let policy = ExchangePolicy::default();
    let reset = reset();
    let read = eeprom_read();

    let (_, (first, second), ()) = tokio::join!(
        runner.run(),
        async {
            let acks = tokio::join!(
                engine.send_request(&reset, policy),
                engine.send_request(&read, policy)
            );
            engine.close();
            acks
        },
        async {
            let received = node_bus.recv().await.unwrap();
            assert_eq!(received, reset);
            sleep(Duration::from_millis(50)).await;
            assert!(node_bus.try_recv().is_none());
            node_bus.send(&tagged_ack(&received)).await.unwrap();

            let received = node_bus.recv().await.unwrap();
            assert_eq!(received, read);
            node_bus.send(&tagged_ack(&received)).await.unwrap();
        }
    );

    assert_eq!(first.unwrap().payload(), &[Block::System.value()]);
    assert_eq!(second.unwrap().payload(), &[Block::Eeprom.value()]);
    assert_eq!(engine.active_conversations(), 0);
}

#[tokio::test(start_paused = true)]
/// More concurrent conversations than slots all complete.
async fn test_more_conversations_than_slots() {
    let (spu_bus, mut node_bus) = MockCanBus::create_pair();
    let engine: Engine = RequestEngine::new(MockTimer::new(), EngineConfig::default());
    let runner = engine.runner(spu_bus);
    let policy = ExchangePolicy::default();
    let resets: Vec<Frame> = (1..=5).map(reset_sth).collect();

    let (_, results, ()) = tokio::join!(
        runner.run(),
        async {
            let results = tokio::join!(
                engine.send_request(&resets[0], policy),
                engine.send_request(&resets[1], policy),
                engine.send_request(&resets[2], policy),
                engine.send_request(&resets[3], policy),
                engine.send_request(&resets[4], policy)
            );
            engine.close();
            results
        },
        async {
            for _ in 0..resets.len() {
                let received = node_bus.recv().await.unwrap();
                node_bus.send(&received.acknowledge(false)).await.unwrap();
            }
        }
    );

    let (a, b, c, d, e) = results;
    for (result, request) in [a, b, c, d, e].into_iter().zip(&resets) {
        assert_eq!(result.unwrap().id, request.id.acknowledge());
    }
}

#[tokio::test(start_paused = true)]
/// A caller waiting for a slot is cancelled when the engine closes.
async fn test_close_cancels_slot_waiter() {
    let (spu_bus, _node_bus) = MockCanBus::create_pair();
    let engine: Engine<1> = RequestEngine::new(MockTimer::new(), EngineConfig::default());
    let runner = engine.runner(spu_bus);
    let policy = ExchangePolicy::new(10_000, 0);
    let reset = reset();
    let read = eeprom_read();

    let (_, first, second, ()) = tokio::join!(
        runner.run(),
        engine.send_request(&reset, policy),
        engine.send_request(&read, policy),
        async {
            sleep(Duration::from_millis(50)).await;
            assert_eq!(engine.active_conversations(), 1);
            engine.close();
        }
    );

    assert_eq!(first, Err(ExchangeError::Cancelled));
    assert_eq!(second, Err(ExchangeError::Cancelled));
    assert_eq!(engine.active_conversations(), 0);
}

#[tokio::test]
async fn test_not_a_request() {
    let engine: Engine = RequestEngine::new(MockTimer::new(), EngineConfig::default());
    assert_eq!(
        engine
            .send_request(&reset().acknowledge(false), ExchangePolicy::default())
            .await,
        Err(ExchangeError::NotARequest)
    );
}
