//! Fixture Layer
//!
//! Turns a reviewed session into a portable fixture entry and persists it into
//! an append-only corpus. A corpus is a directory tree; for sharing, the tree is
//! packed into a single `.tar.gz` archive.

pub mod archive;
pub mod codec;
pub mod corpus;
pub mod table;

pub use archive::{merge_into_archive, open_archive, UnpackedArchive};
pub use codec::{encode, read_rows, write_rows, FixtureRow};
pub use corpus::Corpus;
pub use table::{read_fragments, write_fragments};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::session::Session;
use crate::vision::{CompareError, PassKind, Percentage, TextFragment};

/// Errors surfaced by encoding and corpus I/O
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("image could not be decoded")]
    DecodeFailure(#[source] CompareError),

    #[error("images have different sizes: {expected:?} vs {observed:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        observed: (u32, u32),
    },

    #[error("I/O failure at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corpus archive {path} is corrupt")]
    ArchiveCorrupt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed fixture table")]
    Table(#[from] csv::Error),

    #[error("invalid fixture row for `{attribute}`: {reason}")]
    InvalidRow { attribute: String, reason: String },
}

impl FixtureError {
    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        FixtureError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<CompareError> for FixtureError {
    fn from(err: CompareError) -> Self {
        match err {
            CompareError::DimensionMismatch { expected, observed } => {
                FixtureError::DimensionMismatch { expected, observed }
            }
            other => FixtureError::DecodeFailure(other),
        }
    }
}

/// One full exported session
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureEntry {
    pub image: Vec<u8>,
    pub fragments_by_pass: BTreeMap<PassKind, Vec<TextFragment>>,
    pub rows: Vec<FixtureRow>,
}

impl FixtureEntry {
    /// Snapshot a session. `None` until an image has been picked.
    pub fn from_session(session: &Session) -> Option<Self> {
        let image = session.image()?.to_vec();
        Some(Self {
            image,
            fragments_by_pass: session.fragments_by_pass().clone(),
            rows: encode(
                session.regions(),
                session.observations(),
                &session.expectations,
            ),
        })
    }
}

/// Entry as stored in a corpus
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub id: Uuid,
    pub image_path: PathBuf,
    pub entry: FixtureEntry,
}

/// Result of appending an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { entry_id: Uuid },
    /// The image is already in the corpus; nothing was appended
    Duplicate { existing_entry_id: Uuid },
}

impl WriteOutcome {
    pub fn entry_id(&self) -> Uuid {
        match self {
            WriteOutcome::Written { entry_id } => *entry_id,
            WriteOutcome::Duplicate { existing_entry_id } => *existing_entry_id,
        }
    }
}

/// Export settings
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Tolerance used when looking for an existing copy of the image
    pub tolerance_percent: Percentage,
    pub skip_duplicate_images: bool,
    /// Extension used when the image format cannot be guessed
    pub image_extension_fallback: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            tolerance_percent: 0.0,
            skip_duplicate_images: true,
            image_extension_fallback: "jpg".to_string(),
        }
    }
}
