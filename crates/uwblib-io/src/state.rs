//! Lifecycle state of the reader and dispatcher loops.

use std::fmt;

/// State of one background loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    Running,
    /// Shutdown observed; releasing resources.
    Stopping,
    #[default]
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::Running => "running",
            LoopState::Stopping => "stopping",
            LoopState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Combined state of both loops, published through a `watch` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModuleState {
    pub reader: LoopState,
    pub dispatcher: LoopState,
}

impl ModuleState {
    pub const RUNNING: ModuleState = ModuleState {
        reader: LoopState::Running,
        dispatcher: LoopState::Running,
    };

    /// Both loops have fully exited.
    pub fn is_stopped(&self) -> bool {
        self.reader == LoopState::Stopped && self.dispatcher == LoopState::Stopped
    }
}
