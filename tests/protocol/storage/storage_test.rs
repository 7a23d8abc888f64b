//! EEPROM access against a simulated sensor node: chunking, padding and the
//! typed value helpers.
mod helpers {
    include!("../../helpers/mod.rs");
}

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use helpers::{MockCanBus, MockTimer, SimulatedNode};
use icotronic_can::error::{ExchangeError, StorageError};
use icotronic_can::protocol::exchange::{EngineConfig, RequestEngine};
use icotronic_can::protocol::storage::fields::NAME_LENGTH;
use icotronic_can::protocol::storage::{Eeprom, EepromStatus, Version};
use icotronic_can::protocol::transport::node_address::NodeAddress;

type Engine = RequestEngine<NoopRawMutex, MockTimer>;

fn engine() -> Engine {
    RequestEngine::new(MockTimer::new(), EngineConfig::default())
}

#[tokio::test]
/// Accesses of every chunk shape read back what was written.
async fn test_write_then_read_lengths() {
    let (spu_bus, node_bus) = MockCanBus::create_pair();
    let engine = engine();
    let runner = engine.runner(spu_bus);
    let node = SimulatedNode::new(node_bus, NodeAddress::STH1);

    let (run, (), ()) = tokio::join!(runner.run(), node.run(), async {
        let eeprom = Eeprom::new(&engine, NodeAddress::STH1);
        for (offset, length) in [(0u8, 1usize), (8, 4), (16, 5), (1, 255)] {
            let data: Vec<u8> = (0..length).map(|index| (index as u8).wrapping_mul(7) | 1).collect();
            eeprom.write(2, offset, &data, None).await.unwrap();

            let mut buffer = vec![0u8; length];
            eeprom.read(2, offset, &mut buffer).await.unwrap();
            assert_eq!(buffer, data, "offset {offset}, length {length}");
        }
        engine.close();
    });

    assert!(run.is_ok());
    assert_eq!(engine.active_conversations(), 0);
}

#[tokio::test]
/// Text is zero-filled or truncated to the requested length.
async fn test_text_padding() {
    let (spu_bus, node_bus) = MockCanBus::create_pair();
    let engine = engine();
    let runner = engine.runner(spu_bus);
    let node = SimulatedNode::new(node_bus, NodeAddress::STH1);

    let (_, (), ()) = tokio::join!(runner.run(), node.run(), async {
        let eeprom = Eeprom::new(&engine, NodeAddress::STH1);

        // Dirty the area first so zero-fill is observable.
        eeprom.write(0, 0, &[0xAA; 16], None).await.unwrap();
        eeprom.write_text(0, 0, "something", Some(12)).await.unwrap();
        let mut raw = [0u8; 16];
        eeprom.read(0, 0, &mut raw).await.unwrap();
        assert_eq!(&raw[..9], b"something");
        assert_eq!(&raw[9..12], &[0, 0, 0]);
        assert_eq!(&raw[12..], &[0xAA; 4]);

        let mut buffer = [0u8; 12];
        assert_eq!(eeprom.read_text(0, 0, &mut buffer).await, Ok("something"));

        eeprom.write_text(1, 0, "something", Some(4)).await.unwrap();
        let mut buffer = [0u8; 9];
        assert_eq!(eeprom.read_text(1, 0, &mut buffer).await, Ok("some"));

        assert_eq!(
            eeprom.write_text(1, 0, "größe", None).await,
            Err(StorageError::InvalidText)
        );
        engine.close();
    });
}

#[tokio::test]
async fn test_typed_values() {
    let (spu_bus, node_bus) = MockCanBus::create_pair();
    let engine = engine();
    let runner = engine.runner(spu_bus);
    let node = SimulatedNode::new(node_bus, NodeAddress::STH1);

    let (_, (), ()) = tokio::join!(runner.run(), node.run(), async {
        let eeprom = Eeprom::new(&engine, NodeAddress::STH1);

        eeprom.write_uint(4, 0, 0xBEEF, 2).await.unwrap();
        assert_eq!(eeprom.read_uint(4, 0, 2).await, Ok(0xBEEF));

        eeprom.write_int(4, 8, -42, 3).await.unwrap();
        assert_eq!(eeprom.read_int(4, 8, 3).await, Ok(-42));
        assert_eq!(eeprom.read_uint(4, 8, 3).await, Ok(0xFF_FFD6));

        eeprom.write_float(4, 16, 1.5).await.unwrap();
        assert_eq!(eeprom.read_float(4, 16).await, Ok(1.5));

        assert_eq!(
            eeprom.write_uint(4, 0, 256, 1).await,
            Err(StorageError::ValueOutOfRange { width: 1 })
        );
        assert_eq!(
            eeprom.read_int(4, 0, 9).await,
            Err(StorageError::InvalidWidth { width: 9 })
        );
        engine.close();
    });
}

#[tokio::test]
/// Every chunk counts as one write request on the node.
async fn test_write_request_counter() {
    let (spu_bus, node_bus) = MockCanBus::create_pair();
    let engine = engine();
    let runner = engine.runner(spu_bus);
    let node = SimulatedNode::new(node_bus, NodeAddress::STH1);

    let (_, (), ()) = tokio::join!(runner.run(), node.run(), async {
        let eeprom = Eeprom::new(&engine, NodeAddress::STH1);
        assert_eq!(eeprom.write_request_counter().await, Ok(0));

        eeprom.write(0, 0, &[1, 2, 3, 4, 5], None).await.unwrap();
        eeprom.write_float(0, 8, 2.0).await.unwrap();
        assert_eq!(eeprom.write_request_counter().await, Ok(3));
        engine.close();
    });
}

#[tokio::test]
/// Page overflow is rejected before anything is sent.
async fn test_out_of_page_sends_nothing() {
    let (spu_bus, node_bus) = MockCanBus::create_pair();
    let engine = engine();
    let eeprom = Eeprom::new(&engine, NodeAddress::STH1);

    let mut buffer = [0u8; 7];
    assert_eq!(
        eeprom.read(0, 250, &mut buffer).await,
        Err(StorageError::OutOfPage {
            offset: 250,
            length: 7
        })
    );
    assert_eq!(
        eeprom.write_text(0, 200, "x", Some(100)).await,
        Err(StorageError::OutOfPage {
            offset: 200,
            length: 100
        })
    );

    assert!(node_bus.try_recv().is_none());
    assert!(spu_bus.try_recv().is_none());
    assert_eq!(engine.active_conversations(), 0);
}

#[tokio::test]
/// An access to a node that never answers fails once the retries run out.
async fn test_silent_node_times_out() {
    let (spu_bus, node_bus) = MockCanBus::create_pair();
    let engine = engine();
    let runner = engine.runner(spu_bus);
    // The simulated node ignores requests for other addresses.
    let node = SimulatedNode::new(node_bus, NodeAddress::STH1);
    let other = NodeAddress::new(NodeAddress::STH1.value() + 1).unwrap();

    let (_, (), ()) = tokio::join!(runner.run(), node.run(), async {
        let eeprom = Eeprom::new(&engine, NodeAddress::STH1);
        let mut buffer = [0u8; 4];
        assert!(eeprom.read(0, 0, &mut buffer).await.is_ok());

        let silent = Eeprom::new(&engine, other).with_policy(
            engine.config().policy.with_timeout_ms(10).with_retries(1),
        );
        assert_eq!(
            silent.read(0, 0, &mut buffer).await,
            Err(StorageError::Exchange(ExchangeError::RequestTimeout {
                attempts: 2
            }))
        );
        engine.close();
    });
}

#[tokio::test]
/// Product data round trips through its fixed locations.
async fn test_product_fields() {
    let (spu_bus, node_bus) = MockCanBus::create_pair();
    let engine = engine();
    let runner = engine.runner(spu_bus);
    let node = SimulatedNode::new(node_bus, NodeAddress::STH1);

    let (run, (), ()) = tokio::join!(runner.run(), node.run(), async {
        let eeprom = Eeprom::new(&engine, NodeAddress::STH1);

        eeprom.write_status(EepromStatus::INITIALIZED).await.unwrap();
        assert!(eeprom.read_status().await.unwrap().is_initialized());

        eeprom.write_name("Valerie").await.unwrap();
        let mut name = [0u8; NAME_LENGTH];
        assert_eq!(eeprom.read_name(&mut name).await, Ok("Valerie"));
        // The status byte right before the name is untouched.
        assert_eq!(eeprom.read_status().await, Ok(EepromStatus::INITIALIZED));

        eeprom.write_name("Long Sensor Name").await.unwrap();
        assert_eq!(eeprom.read_name(&mut name).await, Ok("Long Sen"));

        eeprom.write_gtin(4_260_541_280_012).await.unwrap();
        assert_eq!(eeprom.read_gtin().await, Ok(4_260_541_280_012));

        eeprom.write_hardware_version(Version::new(1, 3, 2)).await.unwrap();
        eeprom.write_firmware_version(Version::new(2, 1, 10)).await.unwrap();
        assert_eq!(eeprom.read_hardware_version().await, Ok(Version::new(1, 3, 2)));
        assert_eq!(eeprom.read_firmware_version().await, Ok(Version::new(2, 1, 10)));

        let mut raw = [0u8; 6];
        eeprom.read(4, 13, &mut raw[..3]).await.unwrap();
        eeprom.read(4, 21, &mut raw[3..]).await.unwrap();
        assert_eq!(raw, [1, 3, 2, 2, 1, 10]);

        eeprom.write_text(4, 24, "Tanja", Some(NAME_LENGTH)).await.unwrap();
        let mut release = [0u8; NAME_LENGTH];
        assert_eq!(eeprom.read_release_name(&mut release).await, Ok("Tanja"));
        // The release name sits right after the firmware version.
        assert_eq!(eeprom.read_firmware_version().await, Ok(Version::new(2, 1, 10)));

        engine.close();
    });

    assert!(run.is_ok());
}

#[tokio::test]
/// A blank EEPROM reports an unknown status, an empty name and version 0.0.0.
async fn test_blank_product_fields() {
    let (spu_bus, node_bus) = MockCanBus::create_pair();
    let engine = engine();
    let runner = engine.runner(spu_bus);
    let node = SimulatedNode::new(node_bus, NodeAddress::STH1);

    let (_, (), ()) = tokio::join!(runner.run(), node.run(), async {
        let eeprom = Eeprom::new(&engine, NodeAddress::STH1);
        let status = eeprom.read_status().await.unwrap();
        assert!(!status.is_initialized() && !status.is_locked());

        let mut name = [0u8; NAME_LENGTH];
        assert_eq!(eeprom.read_name(&mut name).await, Ok(""));
        assert_eq!(eeprom.read_gtin().await, Ok(0));
        assert_eq!(eeprom.read_hardware_version().await, Ok(Version::default()));
        engine.close();
    });
}
