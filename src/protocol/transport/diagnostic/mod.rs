//! Human-readable rendering of frames for logs and test output.
//!
//! ```text
//! 0b00000000000000010000001001111 1 0x1 # [STH 1 → SPU 1, Block: System, Command: Reset, Acknowledge]
//! ```
//!
//! The payload explanation is looked up in a static table keyed by
//! `(block, command, direction)`. Combinations without an entry, or payloads
//! too short for their entry, explain nothing. The output is best effort and
//! never parsed back.
use crate::infra::bits::BitReader;
use crate::protocol::streaming::format::StreamingFormat;
use crate::protocol::transport::frame::Frame;
use crate::protocol::transport::identifier::{command, Block};
use core::fmt::{self, Write};

/// Capacity of the scratch buffer holding one payload explanation.
const EXPLANATION_CAPACITY: usize = 192;

//==================================================================================TABLE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Acknowledge,
    Any,
}

impl Direction {
    fn matches(self, request: bool) -> bool {
        match self {
            Direction::Acknowledge => !request,
            Direction::Any => true,
        }
    }
}

type Explain = fn(&Frame, &mut dyn Write) -> fmt::Result;

struct Entry {
    block: Block,
    command: u8,
    direction: Direction,
    explain: Explain,
}

static EXPLANATIONS: &[Entry] = &[
    Entry {
        block: Block::System,
        command: command::system::GET_SET_STATE,
        direction: Direction::Any,
        explain: explain_state,
    },
    Entry {
        block: Block::System,
        command: command::system::BLUETOOTH,
        direction: Direction::Any,
        explain: explain_bluetooth,
    },
    Entry {
        block: Block::Streaming,
        command: command::streaming::DATA,
        direction: Direction::Any,
        explain: explain_streaming,
    },
    Entry {
        block: Block::Streaming,
        command: command::streaming::VOLTAGE,
        direction: Direction::Any,
        explain: explain_streaming,
    },
    Entry {
        block: Block::Eeprom,
        command: command::eeprom::READ,
        direction: Direction::Any,
        explain: explain_eeprom_access,
    },
    Entry {
        block: Block::Eeprom,
        command: command::eeprom::WRITE,
        direction: Direction::Any,
        explain: explain_eeprom_access,
    },
    Entry {
        block: Block::Eeprom,
        command: command::eeprom::WRITE_REQUEST_COUNTER,
        direction: Direction::Acknowledge,
        explain: explain_write_counter,
    },
];

/// Write the payload explanation of `frame` into `out`. Writes nothing when
/// the frame has no table entry.
pub fn explain(frame: &Frame, out: &mut dyn Write) -> fmt::Result {
    let id = frame.id;
    match EXPLANATIONS.iter().find(|entry| {
        entry.block == id.block()
            && entry.command == id.block_command()
            && entry.direction.matches(id.is_request())
    }) {
        Some(entry) => (entry.explain)(frame, out),
        None => Ok(()),
    }
}

//==================================================================================DIAGNOSTIC
/// `Display` adapter returned by [`Frame::diagnostic`].
pub struct Diagnostic<'a> {
    frame: &'a Frame,
}

impl<'a> Diagnostic<'a> {
    pub fn new(frame: &'a Frame) -> Self {
        Self { frame }
    }
}

impl fmt::Display for Diagnostic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = self.frame;
        write!(f, "0b{:029b} {}", frame.id.value(), frame.len)?;
        for byte in frame.payload() {
            write!(f, " {byte:#x}")?;
        }
        write!(f, " # {}", frame.id)?;

        let mut text = TextBuffer::new();
        // Truncated explanations are still worth showing.
        let _ = explain(frame, &mut text);
        if !text.as_str().is_empty() {
            write!(f, " ({})", text.as_str())?;
        }
        Ok(())
    }
}

/// Fixed-capacity `fmt::Write` sink; input past the capacity is dropped.
struct TextBuffer {
    buffer: [u8; EXPLANATION_CAPACITY],
    len: usize,
}

impl TextBuffer {
    fn new() -> Self {
        Self {
            buffer: [0; EXPLANATION_CAPACITY],
            len: 0,
        }
    }

    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buffer[..self.len]).unwrap_or("")
    }
}

impl Write for TextBuffer {
    fn write_str(&mut self, text: &str) -> fmt::Result {
        let mut end = text.len().min(EXPLANATION_CAPACITY - self.len);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        self.buffer[self.len..self.len + end].copy_from_slice(&text.as_bytes()[..end]);
        self.len += end;
        Ok(())
    }
}

//==================================================================================SYSTEM
const LOCATIONS: [&str; 4] = ["Unknown", "Bootloader", "Application", "Reserved"];
const STATES: [&str; 8] = [
    "Failure",
    "Error",
    "Turn Off/Standby",
    "Graceful Degradation 2",
    "Graceful Degradation 1",
    "Operating",
    "Startup",
    "No Change",
];

/// State byte: bit 7 set/get, bits 4-5 location, bits 0-2 state.
fn explain_state(frame: &Frame, out: &mut dyn Write) -> fmt::Result {
    let mut reader = BitReader::new(frame.payload());
    let (Ok(state), Ok(_), Ok(location), Ok(_), Ok(set)) = (
        reader.read_u8(3),
        reader.read_bool(),
        reader.read_u8(2),
        reader.read_bool(),
        reader.read_bool(),
    ) else {
        return Ok(());
    };
    write!(
        out,
        "{} State, Location: {}, State: {}",
        if set { "Set" } else { "Get" },
        LOCATIONS[location as usize],
        STATES[state as usize]
    )
}

/// Write bytes as text up to the first NUL, replacing non-ASCII bytes.
fn write_text(out: &mut dyn Write, bytes: &[u8]) -> fmt::Result {
    for byte in bytes.iter().take_while(|byte| **byte != 0) {
        out.write_char(if byte.is_ascii() { *byte as char } else { '?' })?;
    }
    Ok(())
}

fn text_slice(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|byte| *byte == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

/// MAC address stored in bytes 2..8, most significant byte last.
fn write_mac(out: &mut dyn Write, data: &[u8; 8]) -> fmt::Result {
    for (index, byte) in data[2..].iter().rev().enumerate() {
        if index > 0 {
            out.write_char('-')?;
        }
        write!(out, "{byte:02X}")?;
    }
    Ok(())
}

fn explain_bluetooth(frame: &Frame, out: &mut dyn Write) -> fmt::Result {
    let data = frame.payload();
    if data.len() < 2 {
        return Ok(());
    }
    let (subcommand, node) = (data[0], data[1]);
    let ack = frame.id.is_acknowledgment();
    let verb = if ack { "Return" } else { "Get" };
    let confirm = if ack { "Acknowledge" } else { "Request" };
    let connect = if ack {
        "Acknowledge connection request"
    } else {
        "Request connection"
    };

    match subcommand {
        1 => write!(out, "{confirm} Bluetooth activation"),
        2 => {
            write!(out, "{verb} number of available nodes")?;
            if ack {
                let text = text_slice(&data[2..]);
                match core::str::from_utf8(text).ok().and_then(|t| t.parse::<u8>().ok()) {
                    Some(count) => write!(out, ": {count}")?,
                    None => {
                        out.write_str(": Unable to convert text “")?;
                        write_text(out, text)?;
                        out.write_str("” to number")?;
                    }
                }
            }
            Ok(())
        }
        5 | 6 => {
            let part = if subcommand == 5 { "first" } else { "second" };
            write!(out, "{verb} {part} part of name of node with node number “{node}”")?;
            if ack {
                out.write_str(": “")?;
                write_text(out, &data[2..])?;
                out.write_str("”")?;
            }
            Ok(())
        }
        7 => write!(out, "{connect} to node with node number “{node}”"),
        8 => {
            write!(out, "{verb} Bluetooth connection status")?;
            if ack && data.len() >= 3 {
                let status = if data[2] != 0 {
                    "Connected"
                } else {
                    "Not connected"
                };
                write!(out, ": {status}")?;
            }
            Ok(())
        }
        9 => write!(out, "{confirm} Bluetooth deactivation"),
        10 => {
            write!(out, "{verb} Bluetooth send counter")?;
            if ack && data.len() >= 8 {
                let counter = data[2..8]
                    .iter()
                    .fold(0u64, |counter, byte| (counter << 8) | *byte as u64);
                write!(out, ": {counter}")?;
            }
            Ok(())
        }
        12 => {
            write!(out, "{verb} RSSI of node with node number “{node}”")?;
            if ack && data.len() >= 3 {
                write!(out, ": {}", data[2] as i8)?;
            }
            Ok(())
        }
        14 => {
            out.write_str("Write energy mode reduced")?;
            if data.len() >= 8 {
                let to_reduced_ms = u32::from_le_bytes([data[2], data[3], data[4], data[5]]);
                let advertisement_ms = u16::from_le_bytes([data[6], data[7]]) as f32 * 0.625;
                write!(out, ": ⟳ {to_reduced_ms} ms, 📢 {advertisement_ms} ms")?;
            }
            Ok(())
        }
        17 => {
            write!(out, "{verb} MAC address of node with node number “{node}”")?;
            if ack && data.len() >= 8 {
                out.write_str(": ")?;
                write_mac(out, &frame.data)?;
            }
            Ok(())
        }
        18 if data.len() >= 8 => {
            write!(out, "{connect} to node with MAC address “")?;
            write_mac(out, &frame.data)?;
            out.write_str("”")
        }
        _ => Ok(()),
    }
}

//==================================================================================STREAMING
fn explain_streaming(frame: &Frame, out: &mut dyn Write) -> fmt::Result {
    let data = frame.payload();
    let Some(format_byte) = data.first() else {
        return Ok(());
    };
    let format = StreamingFormat::from_byte(*format_byte);
    write!(out, "{format}")?;

    if frame.id.is_acknowledgment() && data.len() >= 2 {
        write!(out, ", Sequence Counter: {}", data[1])?;
        let mut reader = BitReader::new(&data[2..]);
        let bits = (format.value_bytes() * 8) as u8;
        for number in 1..=format.value_count() {
            match reader.read_u32(bits) {
                Ok(value) => write!(out, ", Value {number}: {value}")?,
                Err(_) => break,
            }
        }
    }
    Ok(())
}

//==================================================================================EEPROM
/// Read and write share `[page, offset, length, reserved, d0..d3]`.
fn explain_eeprom_access(frame: &Frame, out: &mut dyn Write) -> fmt::Result {
    let data = frame.payload();
    if data.len() < 8 {
        return Ok(());
    }
    let (page, offset, length) = (data[0], data[1], data[2]);
    let ack = frame.id.is_acknowledgment();
    let read = frame.id.block_command() == command::eeprom::READ;
    write!(
        out,
        "{} to {} {length} bytes at page {page} with offset {offset}",
        if ack { "Acknowledge request" } else { "Request" },
        if read { "read" } else { "write" },
    )?;

    if ack || !read {
        out.write_str(": [")?;
        for (index, byte) in data[4..4 + (length as usize).min(4)].iter().enumerate() {
            if index > 0 {
                out.write_str(", ")?;
            }
            write!(out, "{byte}")?;
        }
        out.write_str("]")?;
    }
    Ok(())
}

/// Counter stored little endian from byte 4.
fn explain_write_counter(frame: &Frame, out: &mut dyn Write) -> fmt::Result {
    let counter = frame
        .payload()
        .iter()
        .skip(4)
        .take(4)
        .rev()
        .fold(0u32, |counter, byte| (counter << 8) | *byte as u32);
    write!(out, "EEPROM Write Requests: {counter}")
}
