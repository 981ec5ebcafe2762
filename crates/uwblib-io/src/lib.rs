//! uwblib-io: the concurrent engine behind a [`UwbModule`].
//!
//! One tokio task (the reader loop) owns the transport. It extracts and
//! decodes frames, records each in the [`CorrelationStore`] and queues it
//! for callback delivery. The dispatcher runs handlers on a blocking-pool
//! thread so a slow handler never holds up reading. [`UwbModule::call`]
//! hands the encoded command to the reader task and waits on the store for
//! the first reply newer than its baseline.
//!
//! # Architecture
//!
//! - [`correlation`] -- latest frame per key with arrival counters
//! - [`dispatch`] -- dispatch queue and dispatcher loop
//! - [`registry`] -- callback registration
//! - `reader` -- the transport-owning reader loop
//! - [`module`] -- lifecycle, `call`, `register` / `deregister`
//! - [`builder`] -- fluent construction
//! - [`commands`] -- typed helpers for the stock firmware

pub mod builder;
pub mod commands;
pub mod config;
pub mod correlation;
pub mod dispatch;
pub mod module;
mod reader;
pub mod registry;
pub mod state;

pub use builder::UwbBuilder;
pub use commands::{CirMeasurement, PassiveMeasurement, RangeMeasurement, TwrOptions};
pub use config::ModuleConfig;
pub use correlation::CorrelationStore;
pub use dispatch::PendingCallback;
pub use module::UwbModule;
pub use registry::{Callback, RegistrationHandle};
pub use state::{LoopState, ModuleState};
