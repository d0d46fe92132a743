//! Per-run control state.
//!
//! Each orchestrator invocation owns its own `RunControl` handle; an
//! external caller clones the handle and flips the flag to request a stop or
//! an early finish. The orchestrator polls it once per loop iteration, so
//! cancellation is cooperative and never pre-empts an in-flight render job.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Run lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    /// No run in progress
    Idle,
    /// Run in progress
    Running,
    /// Caller requested a hard stop; in-progress results are discarded
    Stopped,
    /// Caller requested early completion; partial results are kept
    FinishEarly,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Stopped => "stopped",
            RunState::FinishEarly => "finish_early",
        }
    }

    /// Lenient parse from control-request strings.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(RunState::Idle),
            "running" => Some(RunState::Running),
            "stopped" | "stop" => Some(RunState::Stopped),
            "finish_early" => Some(RunState::FinishEarly),
            _ => None,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            RunState::Idle => 0,
            RunState::Running => 1,
            RunState::Stopped => 2,
            RunState::FinishEarly => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => RunState::Running,
            2 => RunState::Stopped,
            3 => RunState::FinishEarly,
            _ => RunState::Idle,
        }
    }
}

/// Cheaply clonable control flag shared between one run and its caller.
///
/// A single scalar with idempotent transitions; atomic read/write is the
/// only synchronization required.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    state: Arc<AtomicU8>,
}

impl RunControl {
    /// Create a new handle in the idle state.
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(RunState::Idle.to_u8())),
        }
    }

    /// Read the current state.
    pub fn get(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Set the state.
    pub fn set(&self, state: RunState) {
        self.state.store(state.to_u8(), Ordering::SeqCst);
    }

    /// Return to idle. Called by the orchestrator at the end of every run
    /// regardless of how the run ended.
    pub fn reset(&self) {
        self.set(RunState::Idle);
    }
}
