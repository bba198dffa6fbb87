use thiserror::Error;

use crate::frame::Frame;

/// Errors produced while turning bytes back into frames.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unrecognized frame marker: 0x{0:02x}")]
    UnrecognizedMarker(u8),

    #[error("declared length 0x{0:02x} is too short for a data frame")]
    InvalidLength(u8),

    #[error("unknown data direction: 0x{byte:02x}; payload: {payload:02x?}")]
    UnknownDirection { byte: u8, payload: Vec<u8> },

    /// The frame was read completely but its checksum byte does not match.
    /// The frame is kept so the caller can decide what to do with it.
    #[error("checksum did not match, stated: 0x{stated:02x}, computed: 0x{computed:02x}; frame: {frame}")]
    ChecksumMismatch {
        stated: u8,
        computed: u8,
        frame: Frame,
    },

    #[error("link read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    /// The structurally complete frame behind a checksum mismatch.
    pub fn frame(&self) -> Option<&Frame> {
        match self {
            Self::ChecksumMismatch { frame, .. } => Some(frame),
            _ => None,
        }
    }

    /// Errors after which the byte stream is unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
