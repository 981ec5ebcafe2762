//! UwbBuilder -- fluent builder for constructing [`UwbModule`] instances.
//!
//! Separates configuration from construction so that callers can set up the
//! serial port, specifier table and timing before the transport is opened.
//!
//! # Example
//!
//! ```no_run
//! use uwblib_io::UwbBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> uwblib_core::Result<()> {
//! let module = UwbBuilder::new()
//!     .serial_port("/dev/ttyACM0")
//!     .command_timeout(Duration::from_millis(500))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use uwblib_core::error::{Error, Result};
use uwblib_core::transport::Transport;
use uwblib_protocol::{SpecifierTable, uwb_module};
use uwblib_transport::serial::DEFAULT_BAUD_RATE;

use crate::config::ModuleConfig;
use crate::module::UwbModule;

/// Fluent builder for [`UwbModule`].
///
/// Defaults: the stock firmware specifier table, 19200 baud, the
/// [`ModuleConfig`] defaults, and loops started on build.
pub struct UwbBuilder {
    serial_port: Option<String>,
    baud_rate: u32,
    specifiers: Option<SpecifierTable>,
    config: ModuleConfig,
    auto_start: bool,
}

impl UwbBuilder {
    pub fn new() -> Self {
        UwbBuilder {
            serial_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            specifiers: None,
            config: ModuleConfig::default(),
            auto_start: true,
        }
    }

    /// Set the serial port path (e.g. `/dev/ttyACM0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Override the default baud rate (19200).
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    /// Use a custom specifier table instead of [`uwb_module()`].
    pub fn specifiers(mut self, table: SpecifierTable) -> Self {
        self.specifiers = Some(table);
        self
    }

    /// Timeout used by the typed command helpers (default: 1s).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Longest single read wait in the reader loop (default: 100ms).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Frame accumulator bound in bytes (default: 8192).
    pub fn max_buffer(mut self, bytes: usize) -> Self {
        self.config.max_buffer = bytes;
        self
    }

    /// Consecutive read errors tolerated before the reader stops (default: 5).
    pub fn max_read_errors(mut self, n: u32) -> Self {
        self.config.max_read_errors = n;
        self
    }

    /// Replace the whole runtime configuration.
    pub fn config(mut self, config: ModuleConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the loops as part of building (default: true).
    pub fn auto_start(mut self, enabled: bool) -> Self {
        self.auto_start = enabled;
        self
    }

    /// Build a [`UwbModule`] with a caller-provided transport.
    ///
    /// This is the entry point for testing (pass a `MockTransport` from
    /// `uwblib-test-harness`) and for transports other than serial.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<UwbModule> {
        if self.config.poll_interval.is_zero() {
            return Err(Error::InvalidParameter(
                "poll_interval must be non-zero".into(),
            ));
        }
        if self.config.max_read_errors == 0 {
            return Err(Error::InvalidParameter(
                "max_read_errors must be at least 1".into(),
            ));
        }

        let table = self.specifiers.unwrap_or_else(uwb_module);
        let module = UwbModule::new(transport, table, self.config);
        if self.auto_start {
            module.start().await?;
        }
        Ok(module)
    }

    /// Build a [`UwbModule`] using a serial transport.
    ///
    /// Requires that [`serial_port()`](Self::serial_port) has been called.
    pub async fn build(self) -> Result<UwbModule> {
        let port = self
            .serial_port
            .as_ref()
            .ok_or_else(|| Error::InvalidParameter("serial_port is required for build()".into()))?;

        let transport = uwblib_transport::SerialTransport::open(port, self.baud_rate).await?;
        self.build_with_transport(Box::new(transport)).await
    }
}

impl Default for UwbBuilder {
    fn default() -> Self {
        Self::new()
    }
}
