use std::convert::Infallible;

/// Something that can be sent as the payload of a request frame.
pub trait Encode {
    fn encode(&self) -> Vec<u8>;
}

/// Something that can be read back out of a response frame's payload.
pub trait Decode: Sized {
    type Error: std::error::Error + Send + Sync + 'static;

    fn decode(payload: &[u8]) -> Result<Self, Self::Error>;
}

impl Encode for [u8] {
    fn encode(&self) -> Vec<u8> {
        self.to_vec()
    }
}

impl Encode for Vec<u8> {
    fn encode(&self) -> Vec<u8> {
        self.clone()
    }
}

/// The raw payload, function identifier included.
impl Decode for Vec<u8> {
    type Error = Infallible;

    fn decode(payload: &[u8]) -> Result<Self, Self::Error> {
        Ok(payload.to_vec())
    }
}

/// Host API functions that identify the attached module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    GetCapabilities,
    GetLibraryVersion,
}

impl Command {
    pub const GET_CAPABILITIES: u8 = 0x07;
    pub const GET_LIBRARY_VERSION: u8 = 0x15;

    pub fn function_id(&self) -> u8 {
        match self {
            Self::GetCapabilities => Self::GET_CAPABILITIES,
            Self::GetLibraryVersion => Self::GET_LIBRARY_VERSION,
        }
    }
}

impl Encode for Command {
    fn encode(&self) -> Vec<u8> {
        // neither function takes parameters
        vec![self.function_id()]
    }
}
