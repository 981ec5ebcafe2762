//! Transport trait for module communication.
//!
//! The [`Transport`] trait abstracts over the byte stream to a UWB module.
//! The serial adapter lives in `uwblib-transport`; a scripted mock for tests
//! lives in `uwblib-test-harness`.
//!
//! The reader loop in `uwblib-io` owns the transport exclusively, so the
//! trait takes `&mut self` for every I/O operation.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a module.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write raw bytes to the module.
    ///
    /// Implementations should not return until all bytes have been handed
    /// to the underlying device.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the module into the provided buffer.
    ///
    /// Waits up to `timeout` for data. Returns the number of bytes read;
    /// on timeout implementations return either `Ok(0)` or
    /// [`Error::Timeout`](crate::error::Error::Timeout). Both are treated
    /// as "no data yet" by the reader loop.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
