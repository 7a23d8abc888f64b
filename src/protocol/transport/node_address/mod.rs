//! Logical participant identifiers used as sender/receiver of every frame.
//!
//! # Address space (5 bits)
//!
//! ```text
//! 0       Broadcast with acknowledgment
//! 1-14    Sensor nodes        (STH 1  .. STH 14)
//! 15-16   Local controller    (SPU 1  .. SPU 2)
//! 17-30   Transceiver units   (STU 1  .. STU 14)
//! 31      Broadcast without acknowledgment
//! ```
use crate::error::AddressError;
use core::fmt;
use core::str::FromStr;

/// Highest value representable in the 5-bit address field.
pub const MAX_ADDRESS: u8 = 0x1F;

const BROADCAST_WITH_ACK: u8 = 0;
const BROADCAST_WITHOUT_ACK: u8 = 31;
const SENSOR_RANGE: (u8, u8) = (1, 14);
const CONTROLLER_RANGE: (u8, u8) = (15, 16);
const TRANSCEIVER_RANGE: (u8, u8) = (17, 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Participant category encoded by an address.
pub enum NodeKind {
    /// Battery-powered sensor node (STH).
    Sensor,
    /// Local controller (SPU), i.e. the host side of the bus.
    Controller,
    /// Stationary transceiver unit (STU).
    Transceiver,
}

impl NodeKind {
    /// Short bus name used in textual addresses.
    pub const fn tag(self) -> &'static str {
        match self {
            NodeKind::Sensor => "STH",
            NodeKind::Controller => "SPU",
            NodeKind::Transceiver => "STU",
        }
    }

    /// Inclusive range of raw values owned by this kind.
    const fn range(self) -> (u8, u8) {
        match self {
            NodeKind::Sensor => SENSOR_RANGE,
            NodeKind::Controller => CONTROLLER_RANGE,
            NodeKind::Transceiver => TRANSCEIVER_RANGE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Validated 5-bit node address.
pub struct NodeAddress(u8);

impl NodeAddress {
    /// Broadcast pseudo-address; receivers acknowledge.
    pub const BROADCAST: Self = Self(BROADCAST_WITH_ACK);
    /// Broadcast pseudo-address; receivers stay silent.
    pub const BROADCAST_NO_ACK: Self = Self(BROADCAST_WITHOUT_ACK);
    /// First local controller (`SPU 1`), the usual sender of requests.
    pub const SPU1: Self = Self(CONTROLLER_RANGE.0);
    /// First transceiver (`STU 1`).
    pub const STU1: Self = Self(TRANSCEIVER_RANGE.0);
    /// First sensor node (`STH 1`).
    pub const STH1: Self = Self(SENSOR_RANGE.0);

    /// Wrap a raw 5-bit value.
    pub const fn new(value: u8) -> Result<Self, AddressError> {
        if value > MAX_ADDRESS {
            return Err(AddressError::InvalidAddress);
        }
        Ok(Self(value))
    }

    /// Build the address of the `number`-th node of `kind` (1-based).
    pub fn from_kind(kind: NodeKind, number: u8) -> Result<Self, AddressError> {
        let (first, last) = kind.range();
        let count = last - first + 1;
        if number == 0 || number > count {
            return Err(AddressError::InvalidAddress);
        }
        Ok(Self(first + number - 1))
    }

    /// Raw 5-bit value.
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Participant category, `None` for broadcast pseudo-addresses.
    pub fn kind(self) -> Option<NodeKind> {
        [NodeKind::Sensor, NodeKind::Controller, NodeKind::Transceiver]
            .into_iter()
            .find(|kind| {
                let (first, last) = kind.range();
                (first..=last).contains(&self.0)
            })
    }

    /// 1-based number within the kind (`STH 3` → 3).
    pub fn number(self) -> Option<u8> {
        self.kind().map(|kind| self.0 - kind.range().0 + 1)
    }

    pub fn is_broadcast(self) -> bool {
        self.0 == BROADCAST_WITH_ACK || self.0 == BROADCAST_WITHOUT_ACK
    }

    pub fn is_sensor_node(self) -> bool {
        self.kind() == Some(NodeKind::Sensor)
    }

    pub fn is_controller(self) -> bool {
        self.kind() == Some(NodeKind::Controller)
    }

    pub fn is_transceiver(self) -> bool {
        self.kind() == Some(NodeKind::Transceiver)
    }
}

impl TryFrom<u8> for NodeAddress {
    type Error = AddressError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeAddress> for u8 {
    fn from(address: NodeAddress) -> Self {
        address.0
    }
}

impl FromStr for NodeAddress {
    type Err = AddressError;

    /// Accepts `STH 1`, `STU1`, `SPU 2`, `Broadcast With Acknowledgment` and
    /// `Broadcast Without Acknowledgment`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "Broadcast With Acknowledgment" => return Ok(Self::BROADCAST),
            "Broadcast Without Acknowledgment" => return Ok(Self::BROADCAST_NO_ACK),
            _ => {}
        }

        let kind = [NodeKind::Sensor, NodeKind::Controller, NodeKind::Transceiver]
            .into_iter()
            .find(|kind| text.starts_with(kind.tag()))
            .ok_or(AddressError::InvalidAddress)?;

        let rest = &text[kind.tag().len()..];
        let digits = rest.strip_prefix(' ').unwrap_or(rest);

        // One or two ASCII digits, nothing else.
        if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AddressError::InvalidAddress);
        }
        let number = digits
            .parse::<u8>()
            .map_err(|_| AddressError::InvalidAddress)?;

        Self::from_kind(kind, number)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind(), self.number()) {
            (Some(kind), Some(number)) => write!(f, "{} {}", kind.tag(), number),
            _ if self.0 == BROADCAST_WITH_ACK => f.write_str("Broadcast With Acknowledgment"),
            _ => f.write_str("Broadcast Without Acknowledgment"),
        }
    }
}
