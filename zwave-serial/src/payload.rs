use thiserror::Error;

use crate::command::{Command, Decode};

/// The protocol library a module runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LibraryType {
    StaticController = 0x01,
    PortableController = 0x02,
    Enhanced232EndNode = 0x03,
    EndNode = 0x04,
    Installer = 0x05,
    RoutingEndNode = 0x06,
    BridgeController = 0x07,
}

impl LibraryType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x01 => Self::StaticController,
            0x02 => Self::PortableController,
            0x03 => Self::Enhanced232EndNode,
            0x04 => Self::EndNode,
            0x05 => Self::Installer,
            0x06 => Self::RoutingEndNode,
            0x07 => Self::BridgeController,
            _ => return None,
        })
    }
}

impl std::fmt::Display for LibraryType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParsePayloadError {
    #[error("The given payload is empty")]
    Empty,
    #[error("Expected a reply to function 0x{expected:02x}, got 0x{got:02x}")]
    WrongFunction { expected: u8, got: u8 },
    #[error("Unknown library type: 0x{library:02x}")]
    UnknownLibraryType { library: u8 },
    #[error("Payload is too small for a reply to {command:?}: {len} bytes, need {min}")]
    PayloadTooSmall {
        command: Command,
        len: usize,
        min: usize,
    },
}

/// Strip and check the leading function identifier, returning the parameters.
fn parameters(payload: &[u8], command: Command, min: usize) -> Result<&[u8], ParsePayloadError> {
    let (&function, rest) = payload.split_first().ok_or(ParsePayloadError::Empty)?;
    if function != command.function_id() {
        return Err(ParsePayloadError::WrongFunction {
            expected: command.function_id(),
            got: function,
        });
    }
    if rest.len() < min {
        return Err(ParsePayloadError::PayloadTooSmall {
            command,
            len: payload.len(),
            min: min + 1,
        });
    }
    Ok(rest)
}

/// Reply to [`Command::GetLibraryVersion`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LibraryVersionReport {
    /// e.g. "Z-Wave 6.07"
    pub version: String,
    pub library_type: LibraryType,
}

impl LibraryVersionReport {
    const VERSION_LEN: usize = 12;
}

impl Decode for LibraryVersionReport {
    type Error = ParsePayloadError;

    fn decode(payload: &[u8]) -> Result<Self, Self::Error> {
        let params = parameters(payload, Command::GetLibraryVersion, Self::VERSION_LEN + 1)?;
        let version = &params[..Self::VERSION_LEN];
        // the version is NUL terminated within its fixed-size field
        let end = version.iter().position(|b| *b == 0).unwrap_or(version.len());
        let library = params[Self::VERSION_LEN];
        Ok(Self {
            version: String::from_utf8_lossy(&version[..end]).into_owned(),
            library_type: LibraryType::from_byte(library)
                .ok_or(ParsePayloadError::UnknownLibraryType { library })?,
        })
    }
}

/// Reply to [`Command::GetCapabilities`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilitiesReport {
    pub application_version: u8,
    pub application_revision: u8,
    pub manufacturer_id: u16,
    pub product_type: u16,
    pub product_id: u16,
    /// Bit n-1 is set when function n is supported.
    pub supported_functions: Vec<u8>,
}

impl CapabilitiesReport {
    const FIXED_LEN: usize = 8;

    pub fn supports(&self, function_id: u8) -> bool {
        let Some(bit) = (function_id as usize).checked_sub(1) else {
            return false;
        };
        self.supported_functions
            .get(bit / 8)
            .is_some_and(|mask| mask & (1 << (bit % 8)) != 0)
    }
}

impl Decode for CapabilitiesReport {
    type Error = ParsePayloadError;

    fn decode(payload: &[u8]) -> Result<Self, Self::Error> {
        let params = parameters(payload, Command::GetCapabilities, Self::FIXED_LEN)?;
        Ok(Self {
            application_version: params[0],
            application_revision: params[1],
            manufacturer_id: u16::from_be_bytes([params[2], params[3]]),
            product_type: u16::from_be_bytes([params[4], params[5]]),
            product_id: u16::from_be_bytes([params[6], params[7]]),
            supported_functions: params[Self::FIXED_LEN..].to_vec(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn library_version() {
        let report = LibraryVersionReport::decode(b"\x15Z-Wave 6.07\x00\x01").unwrap();
        assert_eq!(report.version, "Z-Wave 6.07");
        assert_eq!(report.library_type, LibraryType::StaticController);
    }

    #[test]
    fn library_version_errors() {
        assert_eq!(LibraryVersionReport::decode(&[]), Err(ParsePayloadError::Empty));
        assert_eq!(
            LibraryVersionReport::decode(b"\x07Z-Wave 6.07\x00\x01"),
            Err(ParsePayloadError::WrongFunction {
                expected: 0x15,
                got: 0x07
            })
        );
        assert_eq!(
            LibraryVersionReport::decode(b"\x15Z-Wave"),
            Err(ParsePayloadError::PayloadTooSmall {
                command: Command::GetLibraryVersion,
                len: 7,
                min: 14,
            })
        );
        assert_eq!(
            LibraryVersionReport::decode(b"\x15Z-Wave 6.07\x00\x09"),
            Err(ParsePayloadError::UnknownLibraryType { library: 0x09 })
        );
    }

    #[test]
    fn capabilities() {
        let mut payload = vec![0x07, 0x01, 0x02, 0x00, 0x86, 0x00, 0x01, 0x00, 0x5a];
        let mut mask = [0u8; 32];
        // GetCapabilities (0x07) and GetLibraryVersion (0x15)
        mask[0] = 1 << 6;
        mask[2] = 1 << 4;
        payload.extend_from_slice(&mask);

        let report = CapabilitiesReport::decode(&payload).unwrap();
        assert_eq!(report.application_version, 1);
        assert_eq!(report.application_revision, 2);
        assert_eq!(report.manufacturer_id, 0x0086);
        assert_eq!(report.product_type, 0x0001);
        assert_eq!(report.product_id, 0x005a);
        assert!(report.supports(Command::GET_CAPABILITIES));
        assert!(report.supports(Command::GET_LIBRARY_VERSION));
        assert!(!report.supports(0x02));
        assert!(!report.supports(0));
        assert!(!report.supports(0xff));
    }

    #[test]
    fn capabilities_without_mask() {
        let report =
            CapabilitiesReport::decode(&[0x07, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00])
                .unwrap();
        assert!(report.supported_functions.is_empty());
        assert!(!report.supports(Command::GET_CAPABILITIES));
    }
}
