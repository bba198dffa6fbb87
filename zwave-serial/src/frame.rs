use crate::{DataDirection, FrameMarker, LENGTH_OVERHEAD, checksum};

/// One unit on the wire: a single control byte or a data frame.
///
/// Data frame layout:
/// - START_OF_FRAME
/// - Length - counts every byte after itself: direction, payload and checksum
/// - Direction ([`DataDirection`])
/// - N bytes of payload (the first being the function identifier)
/// - Checksum (0xFF XOR length XOR direction XOR each payload byte)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Ack,
    Nak,
    Cancel,
    Data {
        direction: DataDirection,
        payload: Vec<u8>,
    },
}

impl Frame {
    pub fn request(payload: impl Into<Vec<u8>>) -> Self {
        Self::data(DataDirection::Request, payload)
    }

    pub fn response(payload: impl Into<Vec<u8>>) -> Self {
        Self::data(DataDirection::Response, payload)
    }

    pub fn data(direction: DataDirection, payload: impl Into<Vec<u8>>) -> Self {
        Self::Data {
            direction,
            payload: payload.into(),
        }
    }

    pub fn marker(&self) -> FrameMarker {
        match self {
            Self::Ack => FrameMarker::Ack,
            Self::Nak => FrameMarker::Nak,
            Self::Cancel => FrameMarker::Cancel,
            Self::Data { .. } => FrameMarker::StartOfFrame,
        }
    }

    pub fn direction(&self) -> Option<DataDirection> {
        match self {
            Self::Data { direction, .. } => Some(*direction),
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Self::Data { payload, .. } => Some(payload),
            _ => None,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data { .. })
    }

    /// A data frame the module sent on its own initiative.
    pub fn is_request(&self) -> bool {
        self.direction() == Some(DataDirection::Request)
    }

    pub fn is_response(&self) -> bool {
        self.direction() == Some(DataDirection::Response)
    }

    /// The length byte of a data frame, derived from the current payload.
    /// Single-byte frames have none.
    pub fn length(&self) -> Option<usize> {
        self.payload().map(|payload| payload.len() + LENGTH_OVERHEAD)
    }

    pub fn checksum(&self) -> Option<u8> {
        match self {
            Self::Data { direction, payload } => {
                Some(data_checksum(self.length()? as u8, *direction as u8, payload))
            }
            _ => None,
        }
    }

    /// Serialize the frame to its wire form.
    ///
    /// Payloads longer than [`crate::MAX_PAYLOAD_LEN`] do not fit the length
    /// byte; the controller refuses them before they reach this point.
    pub fn encode(&self) -> Vec<u8> {
        let Self::Data { direction, payload } = self else {
            return vec![self.marker() as u8];
        };
        let length = (payload.len() + LENGTH_OVERHEAD) as u8;
        let mut out = Vec::with_capacity(payload.len() + 4);
        out.push(FrameMarker::StartOfFrame as u8);
        out.push(length);
        out.push(*direction as u8);
        out.extend_from_slice(payload);
        out.push(data_checksum(length, *direction as u8, payload));
        out
    }
}

/// Checksum over the raw header bytes, shared with the parser so that an
/// unrecognised direction byte is still summed as it arrived.
pub(crate) fn data_checksum(length: u8, direction: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(checksum(&[length, direction]), |acc, b| acc ^ b)
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Data { direction, payload } => {
                write!(f, "{direction}{{")?;
                for (idx, byte) in payload.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{byte:02x}")?;
                }
                f.write_str("}")
            }
            _ => write!(f, "{}{{}}", self.marker()),
        }
    }
}
