//! Recorded sessions
//!
//! A JSON capture of everything the external engines produced for one image,
//! plus the review decisions made on top of it. Replaying a record drives the
//! same pipeline a live session does.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::expectation::Expectation;
use super::region::Status;
use super::Session;
use crate::classify::{Attribute, ClassifierOutput, RecordedClassifier};
use crate::vision::{PassKind, RecordedDetector, Rect, Size, TextFragment};

/// Fragment as captured from the detection engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFragment {
    pub id: Uuid,
    pub text: String,
    pub normalized_box: Rect,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Image path, relative to the record file unless absolute
    pub image: PathBuf,
    /// Viewport size; the image's own size when absent
    #[serde(default)]
    pub content_size: Option<Size>,
    #[serde(default)]
    pub fragments: BTreeMap<PassKind, Vec<RecordedFragment>>,
    #[serde(default)]
    pub output: ClassifierOutput,
    /// Observation statuses set during review
    #[serde(default)]
    pub statuses: BTreeMap<Attribute, Status>,
    /// Mark every observation valid before applying `statuses`
    #[serde(default)]
    pub validate_all: bool,
    #[serde(default)]
    pub expectations: Vec<Expectation>,
}

impl SessionRecord {
    /// Load a record and resolve its image path against the record's directory
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session record {}", path.display()))?;
        let mut record: SessionRecord = serde_json::from_str(&content)
            .with_context(|| format!("Invalid session record {}", path.display()))?;

        if record.image.is_relative() {
            if let Some(parent) = path.parent() {
                record.image = parent.join(&record.image);
            }
        }
        Ok(record)
    }

    pub fn read_image(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.image)
            .with_context(|| format!("Failed to read image {}", self.image.display()))
    }

    /// Detector replaying the captured fragments
    pub fn detector(&self) -> RecordedDetector {
        let fragments = self
            .fragments
            .iter()
            .map(|(pass, fragments)| {
                let fragments = fragments
                    .iter()
                    .map(|f| TextFragment {
                        id: f.id,
                        pass: *pass,
                        text: f.text.clone(),
                        normalized_box: f.normalized_box,
                        content_rect: Rect::zero(),
                    })
                    .collect();
                (*pass, fragments)
            })
            .collect();
        RecordedDetector::new(fragments)
    }

    pub fn classifier(&self) -> RecordedClassifier {
        RecordedClassifier::new(self.output.clone())
    }

    /// Apply the recorded review decisions to a classified session
    pub fn apply_review(&self, session: &mut Session) -> Result<()> {
        if self.validate_all {
            session.validate_all();
        }
        for (attribute, status) in &self.statuses {
            if !session.set_observation_status(*attribute, *status) {
                tracing::warn!("No observation for `{}`; recorded status ignored", attribute);
            }
        }
        for expectation in &self.expectations {
            session
                .expectations
                .add(expectation.clone())
                .with_context(|| format!("Invalid expectation for `{}`", expectation.attribute))?;
        }
        Ok(())
    }
}
