//! uwblib-test-harness: test utilities for uwblib.
//!
//! This crate provides [`MockTransport`] for deterministic testing of the
//! reader loop, correlation and dispatch without a UWB module attached.
//! A [`MockHandle`] obtained from the transport keeps working after the
//! transport has been moved into a module, so tests can inject unsolicited
//! frames or pull the plug at any point.

pub mod mock_serial;

pub use mock_serial::{MockHandle, MockTransport};
