//! Host-side driver for the Z-Wave serial API framing protocol.
//!
//! [`frame`] holds the wire model, [`frame_parser`] and [`decoder`] turn a
//! byte stream back into frames, and [`controller`] runs the acknowledgement
//! handshake on top of a [`link`].

pub mod command;
pub mod controller;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod frame_parser;
pub mod link;
pub mod payload;

pub use controller::{Controller, ControllerConfig, Unsolicited};
pub use decoder::Decoder;
pub use error::DecodeError;
pub use frame::Frame;

const START_OF_FRAME: u8 = 0x01;
const ACK: u8 = 0x06;
const NAK: u8 = 0x15;
const CANCEL: u8 = 0x18;

/// Bytes of a data frame counted by the length byte besides the payload:
/// the direction byte and the checksum.
const LENGTH_OVERHEAD: usize = 2;

/// Largest payload whose declared length still fits in the length byte.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - LENGTH_OVERHEAD;

/// XOR of every byte, seeded with 0xFF. Zero bytes are not special.
fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0xff, |acc, b| acc ^ b)
}

/// The first byte of every unit on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameMarker {
    StartOfFrame = 0x01,
    Ack = 0x06,
    Nak = 0x15,
    Cancel = 0x18,
}

impl FrameMarker {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            START_OF_FRAME => Self::StartOfFrame,
            ACK => Self::Ack,
            NAK => Self::Nak,
            CANCEL => Self::Cancel,
            _ => return None,
        })
    }
}

impl std::fmt::Display for FrameMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::StartOfFrame => "SOF",
            Self::Ack => "ACK",
            Self::Nak => "NAK",
            Self::Cancel => "CAN",
        })
    }
}

/// Whether a data frame was issued by the host or is a reply from the module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataDirection {
    Request = 0x00,
    Response = 0x01,
}

impl DataDirection {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => Self::Request,
            0x01 => Self::Response,
            _ => return None,
        })
    }
}

impl std::fmt::Display for DataDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
