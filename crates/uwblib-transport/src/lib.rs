//! Transport implementations for uwblib.
//!
//! This crate provides [`SerialTransport`], the [`Transport`](uwblib_core::Transport)
//! implementation for the USB virtual COM port a UWB module presents.
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
//! // Ask the module for its ID
//! transport.send(b"C01\r").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;

pub use serial::{DEFAULT_BAUD_RATE, SerialConfig, SerialTransport};
