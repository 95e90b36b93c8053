//! Shared state between the session owner and its workers

use crate::config::AppConfig;
use crate::fixture::WriteOutcome;
use crate::session::Session;
use crate::vision::PassKind;

/// Central shared state
#[derive(Debug, Default)]
pub struct SharedSessionState {
    /// Application configuration
    pub config: AppConfig,
    /// The live session
    pub session: Session,
    /// Runtime state (not persisted)
    pub runtime: RuntimeState,
}

impl SharedSessionState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            session: Session::new(),
            runtime: RuntimeState::default(),
        }
    }
}

/// Runtime state that is not persisted
#[derive(Debug, Clone, Default)]
pub struct RuntimeState {
    /// Whether detection passes are in flight
    pub is_detecting: bool,
    /// Passes that have reported for the current generation
    pub completed_passes: Vec<PassKind>,
    /// Whether an export is running
    pub is_exporting: bool,
    /// Outcome of the last finished export
    pub last_export: Option<WriteOutcome>,
    /// Last error message (if any)
    pub last_error: Option<String>,
}

impl RuntimeState {
    /// Clear any error state
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Set an error message
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }
}
