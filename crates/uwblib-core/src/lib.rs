//! uwblib-core: error definitions and the transport abstraction for uwblib.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel to a module
//! - [`Error`] / [`Result`] -- error handling shared by every uwblib crate

pub mod error;
pub mod transport;

pub use error::{Error, Result};
pub use transport::Transport;
