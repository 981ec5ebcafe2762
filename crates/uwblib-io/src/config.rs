//! Runtime tuning for a [`UwbModule`](crate::UwbModule).

use std::time::Duration;

use uwblib_protocol::extractor::DEFAULT_MAX_BUFFER;

/// Configuration shared by the reader loop and the command helpers.
#[derive(Debug, Clone)]
pub struct ModuleConfig {
    /// Longest a single transport read waits before the reader loop
    /// re-checks for shutdown and pending writes.
    pub poll_interval: Duration,
    /// Bytes requested per transport read.
    pub read_chunk_size: usize,
    /// Frame accumulator bound; see [`FrameExtractor`](uwblib_protocol::FrameExtractor).
    pub max_buffer: usize,
    /// Consecutive non-fatal read errors tolerated before the reader stops.
    pub max_read_errors: u32,
    /// Timeout used by the typed command helpers.
    pub command_timeout: Duration,
    /// Capacity of the channel carrying writes to the reader task.
    pub request_queue_depth: usize,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        ModuleConfig {
            poll_interval: Duration::from_millis(100),
            read_chunk_size: 256,
            max_buffer: DEFAULT_MAX_BUFFER,
            max_read_errors: 5,
            command_timeout: Duration::from_secs(1),
            request_queue_depth: 32,
        }
    }
}
