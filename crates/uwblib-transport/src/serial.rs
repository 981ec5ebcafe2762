//! Serial port transport for UWB modules.
//!
//! The module firmware exposes a USB CDC port fixed at 8 data bits, no
//! parity, one stop bit and no flow control. Only the baud rate is
//! configurable, since a rebuilt firmware may run faster than the stock
//! 19200.
//!
//! # Example
//!
//! ```no_run
//! use uwblib_transport::SerialTransport;
//! use uwblib_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> uwblib_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyACM0", 19200).await?;
//!
//! // Single-sided ranging with module 2
//! transport.send(b"C05,2,0,0,0\r").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream,
    StopBits,
};
use uwblib_core::error::{Error, Result};
use uwblib_core::transport::Transport;

/// Baud rate of the stock module firmware.
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// Options for opening a module's serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub baud_rate: u32,
    /// Drop bytes already sitting in the OS input buffer when the port is
    /// opened (stale output from before the host attached).
    pub clear_on_open: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            clear_on_open: true,
        }
    }
}

/// Map an IO error to the transport error taxonomy. Broken pipes and
/// vanished devices are fatal; everything else is reported as-is.
fn classify_io_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected | io::ErrorKind::UnexpectedEof => {
            Error::ConnectionLost
        }
        _ => Error::Io(e),
    }
}

/// Outcome of one bounded read. `None` means the wait elapsed.
///
/// A zero-length read into a non-empty buffer means the device went away;
/// a serial port never reports end of stream otherwise.
fn read_outcome(read: Option<io::Result<usize>>, requested: usize) -> Result<usize> {
    match read {
        None => Err(Error::Timeout),
        Some(Ok(0)) if requested > 0 => Err(Error::ConnectionLost),
        Some(Ok(n)) => Ok(n),
        Some(Err(e)) => Err(classify_io_error(e)),
    }
}

/// Serial port transport for a UWB module.
pub struct SerialTransport {
    port: Option<SerialStream>,
    port_name: String,
}

impl SerialTransport {
    /// Open `port` at `baud_rate` and otherwise default settings.
    ///
    /// `port` is a device path such as `/dev/ttyACM0`, or `COM3` on Windows.
    pub async fn open(port: &str, baud_rate: u32) -> Result<Self> {
        let config = SerialConfig {
            baud_rate,
            ..Default::default()
        };
        Self::open_with_config(port, config).await
    }

    pub async fn open_with_config(port: &str, config: SerialConfig) -> Result<Self> {
        tracing::debug!(port = %port, baud_rate = config.baud_rate, "opening module port");

        let stream = tokio_serial::new(port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "failed to open module port");
                Error::Transport(format!("failed to open serial port {port}: {e}"))
            })?;

        if config.clear_on_open {
            if let Err(e) = stream.clear(ClearBuffer::Input) {
                tracing::warn!(port = %port, error = %e, "failed to clear stale input");
            }
        }

        tracing::info!(port = %port, baud_rate = config.baud_rate, "module port open");

        Ok(Self {
            port: Some(stream),
            port_name: port.to_string(),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        tracing::trace!(
            port = %self.port_name,
            frame = ?String::from_utf8_lossy(data),
            "tx"
        );

        let written = match port.write_all(data).await {
            Ok(()) => port.flush().await,
            Err(e) => Err(e),
        };
        written.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "write to module failed");
            classify_io_error(e)
        })
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        let read = tokio::time::timeout(timeout, port.read(buf)).await.ok();
        let outcome = read_outcome(read, buf.len());

        match &outcome {
            Ok(n) => tracing::trace!(
                port = %self.port_name,
                data = ?String::from_utf8_lossy(&buf[..*n]),
                "rx"
            ),
            Err(Error::Timeout) => {}
            Err(e) => tracing::error!(port = %self.port_name, error = %e, "read from module failed"),
        }
        outcome
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.flush().await {
                tracing::warn!(port = %self.port_name, error = %e, "flush before close failed");
            }
            tracing::info!(port = %self.port_name, "module port closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}
