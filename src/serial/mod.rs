//! # Serial Communication Module
//!
//! Handles the serial link to the Ecometer S display.
//!
//! This module handles:
//! - Opening the serial port at 115,200 baud, 8N1
//! - Reading one length-prefixed frame per connection
//! - Bounding every read by the configured timeout
//! - Releasing the port on every exit path

pub mod port_trait;

use bytes::{BufMut, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

use crate::ecometer::protocol::{
    RawFrame, ECOMETER_LENGTH_FIELD_SIZE, ECOMETER_MAGIC, ECOMETER_MAGIC_SIZE,
    ECOMETER_READ_TIMEOUT_MS,
};
use crate::error::{EcometerError, Result};
use port_trait::SerialOpener;

/// Reads complete frames from the display
///
/// The reader itself holds no port; each call to
/// [`FrameReader::open_and_read_one_frame`] opens its own.
#[derive(Debug, Clone)]
pub struct FrameReader {
    read_timeout: Duration,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new(Duration::from_millis(ECOMETER_READ_TIMEOUT_MS))
    }
}

impl FrameReader {
    /// Create a reader that waits at most `read_timeout` per read
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }

    /// Read timeout applied to each read step
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Open the port, read one frame, close the port
    ///
    /// The port lives only for the duration of this call and is dropped on
    /// success, timeout and error alike.
    ///
    /// # Arguments
    ///
    /// * `opener` - Serial port factory
    /// * `path` - Device path (e.g., "/dev/ttyUSB0")
    ///
    /// # Errors
    ///
    /// - `Serial` if the port cannot be opened or fails mid-frame
    /// - `Timeout` / `HeaderMismatch` if no frame is available
    /// - `MalformedFrame` if the length field is impossible
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ecometer_bridge::serial::FrameReader;
    /// use ecometer_bridge::serial::port_trait::TokioSerialOpener;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let reader = FrameReader::default();
    ///     let opener = TokioSerialOpener::new(115_200);
    ///     let frame = reader.open_and_read_one_frame(&opener, "/dev/ttyUSB0").await?;
    ///     println!("Received {} bytes", frame.len());
    ///     Ok(())
    /// }
    /// ```
    pub async fn open_and_read_one_frame<O: SerialOpener>(
        &self,
        opener: &O,
        path: &str,
    ) -> Result<RawFrame> {
        info!("Connecting to device on port {}", path);
        let mut port = opener.open(path)?;
        debug!("Connected to device");

        let result = self.read_frame(&mut port).await;

        drop(port);
        debug!("Connection closed");
        result
    }

    /// Read one frame from an already open port
    pub async fn read_frame<R: AsyncRead + Unpin>(&self, port: &mut R) -> Result<RawFrame> {
        let mut header = [0u8; ECOMETER_MAGIC_SIZE];
        match tokio::time::timeout(self.read_timeout, port.read_exact(&mut header)).await {
            Err(_) => return Err(EcometerError::Timeout),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(EcometerError::Timeout)
            }
            Ok(Err(e)) => {
                return Err(EcometerError::Serial(format!("Failed to read header: {}", e)))
            }
            Ok(Ok(_)) => {}
        }
        debug!("Received data or timeout");

        if header != ECOMETER_MAGIC {
            return Err(EcometerError::HeaderMismatch(header));
        }
        debug!("Received data with correct header");

        let mut length_bytes = [0u8; ECOMETER_LENGTH_FIELD_SIZE];
        self.read_body(port, &mut length_bytes, "length").await?;
        let length = u16::from_be_bytes(length_bytes) as usize;

        let remaining = length
            .checked_sub(ECOMETER_MAGIC_SIZE + ECOMETER_LENGTH_FIELD_SIZE)
            .ok_or_else(|| {
                EcometerError::MalformedFrame(format!("Declared length {} is below 4", length))
            })?;
        debug!("Receiving {} bytes", length);

        let mut body = vec![0u8; remaining];
        self.read_body(port, &mut body, "frame body").await?;
        debug!("Received whole message");

        let mut frame = BytesMut::with_capacity(length);
        frame.put_slice(&header);
        frame.put_slice(&length_bytes);
        frame.put_slice(&body);

        Ok(RawFrame::new(frame.freeze()))
    }

    /// Read inside a frame; any shortfall is a transport failure
    async fn read_body<R: AsyncRead + Unpin>(
        &self,
        port: &mut R,
        buf: &mut [u8],
        what: &str,
    ) -> Result<()> {
        match tokio::time::timeout(self.read_timeout, port.read_exact(buf)).await {
            Err(_) => Err(EcometerError::Serial(format!("Timed out reading {}", what))),
            Ok(Err(e)) => Err(EcometerError::Serial(format!("Failed to read {}: {}", what, e))),
            Ok(Ok(_)) => Ok(()),
        }
    }
}
