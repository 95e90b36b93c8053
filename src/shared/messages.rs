//! Message types sent from worker threads to the session owner

use crate::fixture::WriteOutcome;
use crate::vision::{PassKind, TextFragment};

/// Messages sent from the detection worker. Every message carries the
/// generation of the image it was produced for.
#[derive(Debug, Clone)]
pub enum PassEvent {
    /// A pass finished with these fragments
    PassCompleted {
        generation: u64,
        pass: PassKind,
        fragments: Vec<TextFragment>,
    },
    /// The detector failed; the pass is treated as empty
    PassFailed {
        generation: u64,
        pass: PassKind,
        error: String,
    },
    /// Every configured pass has reported
    AllPassesCompleted { generation: u64 },
}

impl PassEvent {
    pub fn generation(&self) -> u64 {
        match self {
            PassEvent::PassCompleted { generation, .. }
            | PassEvent::PassFailed { generation, .. }
            | PassEvent::AllPassesCompleted { generation } => *generation,
        }
    }
}

/// Messages sent from the export worker, tagged with the export they report on
#[derive(Debug, Clone)]
pub enum ExportEvent {
    /// Export finished
    Finished { export_id: u64, outcome: WriteOutcome },
    /// Export failed; the previous archive is unchanged
    Failed { export_id: u64, error: String },
}

impl ExportEvent {
    pub fn export_id(&self) -> u64 {
        match self {
            ExportEvent::Finished { export_id, .. } | ExportEvent::Failed { export_id, .. } => {
                *export_id
            }
        }
    }
}
