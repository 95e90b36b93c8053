//! Text fragments produced by the detection passes

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::geometry::{Rect, Size};

/// One independent run of the text-detection engine over an image.
///
/// Declaration order is the canonical pass order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    /// Language correction enabled
    WithCorrection,
    /// Language correction disabled
    WithoutCorrection,
    /// Fast recognition level
    FastRecognition,
}

impl PassKind {
    /// All passes in canonical order
    pub const ALL: [PassKind; 3] = [
        PassKind::WithCorrection,
        PassKind::WithoutCorrection,
        PassKind::FastRecognition,
    ];

    /// Display name for logs and the CLI
    pub fn display_name(&self) -> &'static str {
        match self {
            PassKind::WithCorrection => "With Correction",
            PassKind::WithoutCorrection => "Without Correction",
            PassKind::FastRecognition => "Fast Recognition",
        }
    }

    /// Folder under `Test Cases/` holding this pass's fragment tables
    pub fn folder_name(&self) -> &'static str {
        self.display_name()
    }
}

/// A single OCR hit. Immutable once produced by a pass, except for
/// re-projection of `content_rect` when the viewport changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    /// Stable id assigned by the detection engine
    pub id: Uuid,
    /// Pass that produced this fragment
    pub pass: PassKind,
    /// Recognized text
    pub text: String,
    /// Bounding box normalized to the image (0..1, top-left origin)
    pub normalized_box: Rect,
    /// Bounding box in viewport coordinates
    pub content_rect: Rect,
}

impl TextFragment {
    /// Create a fragment laid out for the given image and viewport sizes
    pub fn new(
        id: Uuid,
        pass: PassKind,
        text: impl Into<String>,
        normalized_box: Rect,
        image_size: Size,
        content_size: Size,
    ) -> Self {
        Self {
            id,
            pass,
            text: text.into(),
            normalized_box,
            content_rect: normalized_box.projected(image_size, content_size),
        }
    }

    /// Copy of this fragment re-projected for a new viewport
    pub fn laid_out(&self, image_size: Size, content_size: Size) -> Self {
        Self {
            content_rect: self.normalized_box.projected(image_size, content_size),
            ..self.clone()
        }
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}
