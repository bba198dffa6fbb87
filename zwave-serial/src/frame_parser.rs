use crate::{
    DataDirection, FrameMarker, LENGTH_OVERHEAD,
    error::DecodeError,
    frame::{Frame, data_checksum},
};

/// A resumable parser for the serial API framing.
///
/// Bytes may be fed in any chunking; the partially built frame is carried
/// between calls, and the parser goes back to awaiting a marker after every
/// frame or error.
#[derive(Debug, Default)]
pub struct FrameParser {
    state: State,
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Marker,
    Length,
    Direction {
        length: u8,
    },
    Payload {
        length: u8,
        direction: u8,
        payload: Vec<u8>,
    },
    Checksum {
        length: u8,
        direction: u8,
        payload: Vec<u8>,
    },
}

#[derive(Debug)]
pub enum FrameParserResult {
    /// A whole frame was read; `consumed` bytes of the input belong to it.
    Ready { frame: Frame, consumed: usize },
    /// All input was consumed without completing a frame.
    /// If bytes_needed is Some, it is the amount of bytes left until the end of the frame.
    Incomplete { bytes_needed: Option<usize> },

    Error { err: DecodeError, consumed: usize },
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&mut self, bytes: &[u8]) -> FrameParserResult {
        for (idx, byte) in bytes.iter().enumerate() {
            match self.parse_byte(*byte) {
                Ok(Some(frame)) => {
                    return FrameParserResult::Ready {
                        frame,
                        consumed: idx + 1,
                    };
                }
                Ok(None) => {}
                Err(err) => {
                    return FrameParserResult::Error {
                        err,
                        consumed: idx + 1,
                    };
                }
            }
        }
        FrameParserResult::Incomplete {
            bytes_needed: self.bytes_needed(),
        }
    }

    /// True between frames.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Marker)
    }

    /// Drop any partially read frame.
    pub fn reset(&mut self) {
        self.state = State::Marker;
    }

    fn bytes_needed(&self) -> Option<usize> {
        match &self.state {
            State::Marker | State::Length => None,
            State::Direction { length } => Some(*length as usize),
            State::Payload {
                length, payload, ..
            } => Some(*length as usize - 1 - payload.len()),
            State::Checksum { .. } => Some(1),
        }
    }

    fn parse_byte(&mut self, byte: u8) -> Result<Option<Frame>, DecodeError> {
        // every arm either sets the next state or leaves the parser at Marker
        match std::mem::take(&mut self.state) {
            State::Marker => match FrameMarker::from_byte(byte) {
                Some(FrameMarker::Ack) => return Ok(Some(Frame::Ack)),
                Some(FrameMarker::Nak) => return Ok(Some(Frame::Nak)),
                Some(FrameMarker::Cancel) => return Ok(Some(Frame::Cancel)),
                Some(FrameMarker::StartOfFrame) => self.state = State::Length,
                None => return Err(DecodeError::UnrecognizedMarker(byte)),
            },

            State::Length => {
                if (byte as usize) < LENGTH_OVERHEAD {
                    return Err(DecodeError::InvalidLength(byte));
                }
                self.state = State::Direction { length: byte };
            }

            State::Direction { length } => {
                let payload_len = length as usize - LENGTH_OVERHEAD;
                let payload = Vec::with_capacity(payload_len);
                self.state = if payload_len == 0 {
                    State::Checksum {
                        length,
                        direction: byte,
                        payload,
                    }
                } else {
                    State::Payload {
                        length,
                        direction: byte,
                        payload,
                    }
                };
            }

            State::Payload {
                length,
                direction,
                mut payload,
            } => {
                payload.push(byte);
                self.state = if payload.len() == length as usize - LENGTH_OVERHEAD {
                    State::Checksum {
                        length,
                        direction,
                        payload,
                    }
                } else {
                    State::Payload {
                        length,
                        direction,
                        payload,
                    }
                };
            }

            State::Checksum {
                length,
                direction,
                payload,
            } => return finish(length, direction, payload, byte).map(Some),
        }
        Ok(None)
    }
}

fn finish(length: u8, direction: u8, payload: Vec<u8>, stated: u8) -> Result<Frame, DecodeError> {
    let computed = data_checksum(length, direction, &payload);
    let Some(direction) = DataDirection::from_byte(direction) else {
        return Err(DecodeError::UnknownDirection {
            byte: direction,
            payload,
        });
    };
    let frame = Frame::data(direction, payload);
    if stated != computed {
        return Err(DecodeError::ChecksumMismatch {
            stated,
            computed,
            frame,
        });
    }
    Ok(frame)
}

#[cfg(test)]
mod test {
    use super::*;

    // a GetLibraryVersion reply
    const VERSION_RESPONSE: [u8; 18] = [
        0x01, 0x10, 0x01, 0x15, 0x5a, 0x2d, 0x57, 0x61, 0x76, 0x65, 0x20, 0x36, 0x2e, 0x30, 0x37,
        0x00, 0x01, 0x97,
    ];

    fn version_payload() -> Vec<u8> {
        b"\x15Z-Wave 6.07\x00\x01".to_vec()
    }

    #[test]
    fn library_version_response() {
        let mut parser = FrameParser::new();
        match parser.parse(&VERSION_RESPONSE) {
            FrameParserResult::Ready { frame, consumed } => {
                assert_eq!(consumed, VERSION_RESPONSE.len());
                assert_eq!(frame.direction(), Some(DataDirection::Response));
                assert_eq!(frame.payload(), Some(version_payload().as_slice()));
                assert_eq!(frame.length(), Some(16));
                assert_eq!(frame.checksum(), Some(0x97));
            }
            other => panic!("expected a frame, got {other:?}"),
        }
        assert!(parser.is_idle());
    }

    #[test]
    fn any_chunking_gives_the_same_frame() {
        let expected = Frame::response(version_payload());
        for chunk_size in 1..=VERSION_RESPONSE.len() {
            let mut parser = FrameParser::new();
            let mut frames = Vec::new();
            for chunk in VERSION_RESPONSE.chunks(chunk_size) {
                match parser.parse(chunk) {
                    FrameParserResult::Ready { frame, consumed } => {
                        assert_eq!(consumed, chunk.len());
                        frames.push(frame);
                    }
                    FrameParserResult::Incomplete { .. } => {}
                    FrameParserResult::Error { err, .. } => panic!("chunk size {chunk_size}: {err}"),
                }
            }
            assert_eq!(frames, [expected.clone()], "chunk size {chunk_size}");
        }
    }

    #[test]
    fn control_frames() {
        let mut parser = FrameParser::new();
        let bytes = [0x06, 0x15, 0x18];
        let mut offset = 0;
        let mut frames = Vec::new();
        while offset < bytes.len() {
            match parser.parse(&bytes[offset..]) {
                FrameParserResult::Ready { frame, consumed } => {
                    assert_eq!(consumed, 1);
                    offset += consumed;
                    frames.push(frame);
                }
                other => panic!("expected a frame, got {other:?}"),
            }
        }
        assert_eq!(frames, [Frame::Ack, Frame::Nak, Frame::Cancel]);
    }

    #[test]
    fn unrecognized_marker() {
        let mut parser = FrameParser::new();
        match parser.parse(&[0x09]) {
            FrameParserResult::Error { err, consumed } => {
                assert_eq!(consumed, 1);
                assert!(matches!(err, DecodeError::UnrecognizedMarker(0x09)));
                assert!(err.to_string().contains("unrecognized frame marker"));
            }
            other => panic!("expected an error, got {other:?}"),
        }
    }

    #[test]
    fn checksum_mismatch_keeps_the_frame() {
        let mut bytes = VERSION_RESPONSE;
        bytes[17] = 0x92;
        let mut parser = FrameParser::new();
        match parser.parse(&bytes) {
            FrameParserResult::Error { err, consumed } => {
                assert_eq!(consumed, bytes.len());
                assert_eq!(err.frame(), Some(&Frame::response(version_payload())));
                match err {
                    DecodeError::ChecksumMismatch {
                        stated, computed, ..
                    } => {
                        assert_eq!(stated, 0x92);
                        assert_eq!(computed, 0x97);
                    }
                    other => panic!("expected a checksum mismatch, got {other}"),
                }
            }
            other => panic!("expected an error, got {other:?}"),
        }
        // the next frame parses from a clean state
        assert!(parser.is_idle());
        assert!(matches!(
            parser.parse(&[0x06]),
            FrameParserResult::Ready {
                frame: Frame::Ack,
                ..
            }
        ));
    }

    #[test]
    fn empty_payload_goes_straight_to_checksum() {
        let mut parser = FrameParser::new();
        match parser.parse(&[0x01, 0x02, 0x00, 0xfd]) {
            FrameParserResult::Ready { frame, consumed } => {
                assert_eq!(consumed, 4);
                assert_eq!(frame, Frame::request(Vec::new()));
            }
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    #[test]
    fn bytes_needed() {
        let mut parser = FrameParser::new();
        assert!(matches!(
            parser.parse(&[0x01]),
            FrameParserResult::Incomplete { bytes_needed: None }
        ));
        assert!(matches!(
            parser.parse(&[0x10]),
            FrameParserResult::Incomplete {
                bytes_needed: Some(16)
            }
        ));
        assert!(matches!(
            parser.parse(&[0x01, 0x15, 0x5a]),
            FrameParserResult::Incomplete {
                bytes_needed: Some(13)
            }
        ));
    }

    #[test]
    fn unknown_direction_consumes_the_whole_frame() {
        // direction 0x10, payload 0x15, checksum computed over the raw bytes
        let bytes = [0x01, 0x03, 0x10, 0x15, 0xff ^ 0x03 ^ 0x10 ^ 0x15, 0x06];
        let mut parser = FrameParser::new();
        match parser.parse(&bytes) {
            FrameParserResult::Error { err, consumed } => {
                assert_eq!(consumed, 5);
                assert!(matches!(err, DecodeError::UnknownDirection { byte: 0x10, .. }));
            }
            other => panic!("expected an error, got {other:?}"),
        }
        assert!(matches!(
            parser.parse(&bytes[5..]),
            FrameParserResult::Ready {
                frame: Frame::Ack,
                ..
            }
        ));
    }

    #[test]
    fn invalid_length() {
        let mut parser = FrameParser::new();
        match parser.parse(&[0x01, 0x01]) {
            FrameParserResult::Error { err, consumed } => {
                assert_eq!(consumed, 2);
                assert!(matches!(err, DecodeError::InvalidLength(0x01)));
            }
            other => panic!("expected an error, got {other:?}"),
        }
        assert!(parser.is_idle());
    }

    #[test]
    fn reset_drops_partial_frame() {
        let mut parser = FrameParser::new();
        parser.parse(&VERSION_RESPONSE[..5]);
        assert!(!parser.is_idle());
        parser.reset();
        assert!(matches!(
            parser.parse(&[0x18]),
            FrameParserResult::Ready {
                frame: Frame::Cancel,
                ..
            }
        ));
    }
}
