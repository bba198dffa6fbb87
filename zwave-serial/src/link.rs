//! Opening the serial device that carries the protocol.

use std::time::Duration;

use log::debug;
use tokio_serial::{
    ClearBuffer, DataBits, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits,
};

pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkConfig {
    pub path: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub read_timeout: Duration,
}

impl LinkConfig {
    /// 115200 baud, 8N1, 10 second read timeout.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Open the device and discard whatever the OS buffered before we got here.
pub fn open(config: &LinkConfig) -> tokio_serial::Result<SerialStream> {
    debug!("opening {} at {} baud", config.path, config.baud_rate);
    let port = tokio_serial::new(&config.path, config.baud_rate)
        .data_bits(config.data_bits)
        .parity(config.parity)
        .stop_bits(config.stop_bits)
        .timeout(config.read_timeout)
        .open_native_async()?;
    port.clear(ClearBuffer::All)?;
    Ok(port)
}

/// Device path prefix a USB serial API stick shows up under, per platform.
fn device_prefix() -> Option<&'static str> {
    if cfg!(target_os = "linux") {
        Some("/dev/ttyACM")
    } else if cfg!(target_os = "macos") {
        Some("/dev/tty.usbmodem")
    } else {
        None
    }
}

/// Candidate device paths, sorted. Errors on platforms without a known
/// naming scheme; pass a path explicitly there.
pub fn discover() -> tokio_serial::Result<Vec<String>> {
    let Some(prefix) = device_prefix() else {
        return Err(tokio_serial::Error::new(
            tokio_serial::ErrorKind::Unknown,
            format!("no autodiscovery on {}; give the port explicitly", std::env::consts::OS),
        ));
    };
    Ok(matching_ports(
        tokio_serial::available_ports()?
            .into_iter()
            .map(|info| info.port_name),
        prefix,
    ))
}

fn matching_ports(names: impl Iterator<Item = String>, prefix: &str) -> Vec<String> {
    let mut ports: Vec<String> = names.filter(|name| name.starts_with(prefix)).collect();
    ports.sort();
    ports
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = LinkConfig::new("/dev/test");
        assert_eq!(config.path, "/dev/test");
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.read_timeout, Duration::from_secs(10));
    }

    #[test]
    fn filters_by_prefix() {
        let names = ["/dev/ttyS0", "/dev/ttyACM1", "/dev/ttyUSB0", "/dev/ttyACM0"]
            .into_iter()
            .map(String::from);
        assert_eq!(
            matching_ports(names, "/dev/ttyACM"),
            ["/dev/ttyACM0", "/dev/ttyACM1"]
        );
    }
}
