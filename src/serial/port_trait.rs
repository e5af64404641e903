//! Trait abstraction for opening serial ports to enable testing

use tokio::io::AsyncRead;

use crate::error::{EcometerError, Result};

/// Opens a fresh serial transport for one read attempt
///
/// The returned port is owned by the caller and released when dropped.
pub trait SerialOpener: Send + Sync {
    /// Port type handed out by this opener
    type Port: AsyncRead + Unpin + Send;

    /// Open the port at `path`
    fn open(&self, path: &str) -> Result<Self::Port>;
}

/// Opens real serial devices through tokio-serial
#[derive(Debug, Clone)]
pub struct TokioSerialOpener {
    baud_rate: u32,
}

impl TokioSerialOpener {
    pub fn new(baud_rate: u32) -> Self {
        Self { baud_rate }
    }
}

impl SerialOpener for TokioSerialOpener {
    type Port = tokio_serial::SerialStream;

    /// Open with 8 data bits, no parity, 1 stop bit, no flow control
    fn open(&self, path: &str) -> Result<Self::Port> {
        use tokio_serial::SerialPortBuilderExt;

        tokio_serial::new(path, self.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| EcometerError::Serial(format!("Failed to open {}: {}", path, e)))
    }
}
