//! Shared state and messaging between the session owner and worker threads
//!
//! The detection worker and the export worker never touch the session
//! directly; they report back through these messages.

pub mod messages;
pub mod state;

pub use messages::{ExportEvent, PassEvent};
pub use state::{RuntimeState, SharedSessionState};
