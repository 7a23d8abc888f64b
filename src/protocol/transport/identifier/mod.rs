//! Creation and extraction of the 29-bit extended CAN identifiers used by the
//! MyTooliT protocol.
//!
//! # Bit layout
//!
//! ```text
//! Bit  28     ( 1 bit ) : Reserved (0)
//! Bits 22-27  ( 6 bits) : Message block
//! Bits 14-21  ( 8 bits) : Block command
//! Bit  13     ( 1 bit ) : Request (1) / Acknowledge (0)
//! Bit  12     ( 1 bit ) : Error
//! Bit  11     ( 1 bit ) : Reserved (0)
//! Bits  6-10  ( 5 bits) : Sender address
//! Bit   5     ( 1 bit ) : Reserved (0)
//! Bits  0-4   ( 5 bits) : Receiver address
//! ```
use crate::error::IdentifierError;
use crate::protocol::transport::node_address::NodeAddress;
use core::fmt;

/// Mask of the 29 bits available in an extended CAN identifier.
pub const IDENTIFIER_MASK: u32 = 0x1FFF_FFFF;

const RECEIVER_SHIFT: u32 = 0;
const SENDER_SHIFT: u32 = 6;
const ERROR_SHIFT: u32 = 12;
const REQUEST_SHIFT: u32 = 13;
const COMMAND_SHIFT: u32 = 14;
const BLOCK_SHIFT: u32 = 22;

const ADDRESS_MASK: u32 = 0x1F;
const COMMAND_MASK: u32 = 0xFF;
const BLOCK_MASK: u32 = 0x3F;

//==================================================================================BLOCK
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Message block: first level of the two-level operation classifier.
///
/// Blocks compare by raw value, so `Block::Other(0x04) == Block::Streaming`.
pub enum Block {
    System,
    Streaming,
    StatisticalData,
    Configuration,
    Eeprom,
    ProductData,
    Test,
    /// Any other 6-bit block value.
    Other(u8),
}

impl Block {
    /// Map a raw 6-bit value to its canonical variant.
    pub const fn from_value(value: u8) -> Self {
        match value {
            0x00 => Block::System,
            0x04 => Block::Streaming,
            0x08 => Block::StatisticalData,
            0x28 => Block::Configuration,
            0x3D => Block::Eeprom,
            0x3E => Block::ProductData,
            0x3F => Block::Test,
            other => Block::Other(other),
        }
    }

    /// Raw block value.
    pub const fn value(self) -> u8 {
        match self {
            Block::System => 0x00,
            Block::Streaming => 0x04,
            Block::StatisticalData => 0x08,
            Block::Configuration => 0x28,
            Block::Eeprom => 0x3D,
            Block::ProductData => 0x3E,
            Block::Test => 0x3F,
            Block::Other(value) => value,
        }
    }

    /// Human-readable block name, `None` for unassigned values.
    pub const fn name(self) -> Option<&'static str> {
        match Block::from_value(self.value()) {
            Block::System => Some("System"),
            Block::Streaming => Some("Streaming"),
            Block::StatisticalData => Some("Statistical Data"),
            Block::Configuration => Some("Configuration"),
            Block::Eeprom => Some("EEPROM"),
            Block::ProductData => Some("Product Data"),
            Block::Test => Some("Test"),
            Block::Other(_) => None,
        }
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl Eq for Block {}

impl core::hash::Hash for Block {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.value().hash(state);
    }
}

//==================================================================================BLOCK_COMMANDS
/// Block command values, grouped per message block.
pub mod command {
    /// Commands of [`Block::System`](super::Block::System).
    pub mod system {
        pub const VERBOTEN: u8 = 0x00;
        pub const RESET: u8 = 0x01;
        pub const GET_SET_STATE: u8 = 0x02;
        pub const BLUETOOTH: u8 = 0x11;
    }

    /// Commands of [`Block::Streaming`](super::Block::Streaming).
    pub mod streaming {
        pub const DATA: u8 = 0x00;
        pub const TEMPERATURE: u8 = 0x01;
        pub const VOLTAGE: u8 = 0x20;
        pub const CURRENT: u8 = 0x40;
    }

    /// Commands of [`Block::Eeprom`](super::Block::Eeprom).
    pub mod eeprom {
        pub const READ: u8 = 0x00;
        pub const WRITE: u8 = 0x01;
        pub const WRITE_REQUEST_COUNTER: u8 = 0x20;
    }
}

/// Known `(block, command)` names.
static COMMAND_NAMES: &[(Block, u8, &str)] = &[
    (Block::System, command::system::VERBOTEN, "Verboten"),
    (Block::System, command::system::RESET, "Reset"),
    (Block::System, command::system::GET_SET_STATE, "Get/Set State"),
    (Block::System, command::system::BLUETOOTH, "Bluetooth"),
    (Block::Streaming, command::streaming::DATA, "Data"),
    (Block::Streaming, command::streaming::TEMPERATURE, "Temperature"),
    (Block::Streaming, command::streaming::VOLTAGE, "Voltage"),
    (Block::Streaming, command::streaming::CURRENT, "Current"),
    (Block::Eeprom, command::eeprom::READ, "Read"),
    (Block::Eeprom, command::eeprom::WRITE, "Write"),
    (
        Block::Eeprom,
        command::eeprom::WRITE_REQUEST_COUNTER,
        "Read Write Request Counter",
    ),
];

/// Name of a block command, `None` when the pair is not known.
pub fn command_name(block: Block, command: u8) -> Option<&'static str> {
    COMMAND_NAMES
        .iter()
        .find(|(b, c, _)| *b == block && *c == command)
        .map(|(_, _, name)| *name)
}

//==================================================================================IDENTIFIER
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Packed 29-bit identifier with accessors for every protocol field.
pub struct Identifier(u32);

impl Identifier {
    /// Creates a builder for a `(block, command)` pair. Defaults: request,
    /// no error, broadcast sender and receiver.
    pub fn builder(block: Block, command: u8) -> IdentifierBuilder {
        IdentifierBuilder::new(block, command)
    }

    /// Raw 29-bit value as put on the wire.
    pub const fn value(&self) -> u32 {
        self.0
    }

    pub fn receiver(&self) -> NodeAddress {
        Self::address_at(self.0, RECEIVER_SHIFT)
    }

    pub fn sender(&self) -> NodeAddress {
        Self::address_at(self.0, SENDER_SHIFT)
    }

    pub fn block(&self) -> Block {
        Block::from_value(((self.0 >> BLOCK_SHIFT) & BLOCK_MASK) as u8)
    }

    pub fn block_command(&self) -> u8 {
        ((self.0 >> COMMAND_SHIFT) & COMMAND_MASK) as u8
    }

    /// Name of the block command when the pair is known.
    pub fn command_name(&self) -> Option<&'static str> {
        command_name(self.block(), self.block_command())
    }

    pub fn is_request(&self) -> bool {
        (self.0 >> REQUEST_SHIFT) & 1 == 1
    }

    pub fn is_acknowledgment(&self) -> bool {
        !self.is_request()
    }

    pub fn is_error(&self) -> bool {
        (self.0 >> ERROR_SHIFT) & 1 == 1
    }

    /// Identifier the acknowledgment of this request must carry: sender and
    /// receiver swapped, request flag cleared, block, command and error flag kept.
    pub fn acknowledge(&self) -> Identifier {
        let routing = (ADDRESS_MASK << SENDER_SHIFT) | (ADDRESS_MASK << RECEIVER_SHIFT);
        let swapped = (self.sender().value() as u32) << RECEIVER_SHIFT
            | (self.receiver().value() as u32) << SENDER_SHIFT;
        Identifier((self.0 & !routing & !(1 << REQUEST_SHIFT)) | swapped)
    }

    /// Copy with the error flag set to `error`.
    pub fn with_error(&self, error: bool) -> Identifier {
        let cleared = self.0 & !(1 << ERROR_SHIFT);
        Identifier(cleared | ((error as u32) << ERROR_SHIFT))
    }

    fn address_at(raw: u32, shift: u32) -> NodeAddress {
        // Five masked bits always form a valid address.
        match NodeAddress::new(((raw >> shift) & ADDRESS_MASK) as u8) {
            Ok(address) => address,
            Err(_) => NodeAddress::BROADCAST,
        }
    }
}

impl TryFrom<u32> for Identifier {
    type Error = IdentifierError;

    /// Accept any value of the 29-bit space; wider values are rejected.
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value & !IDENTIFIER_MASK != 0 {
            return Err(IdentifierError::InvalidIdentifier { value });
        }
        Ok(Identifier(value))
    }
}

impl From<Identifier> for u32 {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl fmt::Display for Identifier {
    /// `[SPU 1 → STH 1, Block: System, Command: Reset, Request]`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} → {}, Block: ", self.sender(), self.receiver())?;
        match self.block().name() {
            Some(name) => f.write_str(name)?,
            None => write!(f, "Unknown ({:#04x})", self.block().value())?,
        }
        f.write_str(", Command: ")?;
        match self.command_name() {
            Some(name) => f.write_str(name)?,
            None => write!(f, "Unknown ({:#04x})", self.block_command())?,
        }
        f.write_str(if self.is_request() {
            ", Request"
        } else {
            ", Acknowledge"
        })?;
        if self.is_error() {
            f.write_str(", Error")?;
        }
        f.write_str("]")
    }
}

//==================================================================================IDENTIFIER_BUILDER
#[derive(Debug, Clone, Copy)]
/// Fluent builder packing the identifier fields.
pub struct IdentifierBuilder {
    block: Block,
    command: u8,
    sender: NodeAddress,
    receiver: NodeAddress,
    request: bool,
    error: bool,
}

impl IdentifierBuilder {
    /// Initializes the builder for a `(block, command)` pair.
    pub fn new(block: Block, command: u8) -> Self {
        Self {
            block,
            command,
            sender: NodeAddress::BROADCAST,
            receiver: NodeAddress::BROADCAST,
            request: true,
            error: false,
        }
    }

    pub fn sender(mut self, sender: NodeAddress) -> Self {
        self.sender = sender;
        self
    }

    pub fn receiver(mut self, receiver: NodeAddress) -> Self {
        self.receiver = receiver;
        self
    }

    /// `true` for a request, `false` for an acknowledgment.
    pub fn request(mut self, request: bool) -> Self {
        self.request = request;
        self
    }

    pub fn error(mut self, error: bool) -> Self {
        self.error = error;
        self
    }

    /// Packs the fields. Fails when the block does not fit its 6-bit field.
    pub fn build(self) -> Result<Identifier, IdentifierError> {
        let block = self.block.value();
        if block as u32 > BLOCK_MASK {
            return Err(IdentifierError::InvalidBlock { block });
        }

        let id = ((block as u32) << BLOCK_SHIFT)
            | ((self.command as u32) << COMMAND_SHIFT)
            | ((self.request as u32) << REQUEST_SHIFT)
            | ((self.error as u32) << ERROR_SHIFT)
            | ((self.sender.value() as u32) << SENDER_SHIFT)
            | ((self.receiver.value() as u32) << RECEIVER_SHIFT);
        Ok(Identifier(id))
    }
}
