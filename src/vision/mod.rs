//! Vision Layer
//!
//! Geometry, text fragments and the boundary to the external text-detection
//! engine. Also hosts the image comparator used for duplicate detection.
//! Detection itself is not implemented here; any engine that can run the
//! three passes plugs in through [`TextDetector`].

pub mod compare;
pub mod fragment;
pub mod geometry;

pub use compare::{compare_image_data, ensure_decodable, CompareError, Percentage};
pub use fragment::{PassKind, TextFragment};
pub use geometry::{Rect, Size};

use anyhow::Result;

/// External text-detection engine.
///
/// Called once per pass; passes are scheduled strictly one after another.
/// An empty result is not an error.
pub trait TextDetector: Send + Sync {
    /// Detect text in the encoded image for the given pass. Returned fragments
    /// carry normalized boxes; `content_rect` is filled in by the caller.
    fn detect(&self, image: &[u8], pass: PassKind) -> Result<Vec<TextFragment>>;
}

/// Detector replaying fragments captured earlier, keyed by pass
#[derive(Debug, Clone, Default)]
pub struct RecordedDetector {
    fragments: std::collections::BTreeMap<PassKind, Vec<TextFragment>>,
}

impl RecordedDetector {
    pub fn new(fragments: std::collections::BTreeMap<PassKind, Vec<TextFragment>>) -> Self {
        Self { fragments }
    }
}

impl TextDetector for RecordedDetector {
    fn detect(&self, _image: &[u8], pass: PassKind) -> Result<Vec<TextFragment>> {
        Ok(self.fragments.get(&pass).cloned().unwrap_or_default())
    }
}

/// Pixel dimensions of an encoded image without decoding the full buffer
pub fn image_size(data: &[u8]) -> Result<Size> {
    let reader = image::ImageReader::new(std::io::Cursor::new(data)).with_guessed_format()?;
    let (width, height) = reader.into_dimensions()?;
    Ok(Size::new(width as f64, height as f64))
}
