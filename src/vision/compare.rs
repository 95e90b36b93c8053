//! Tolerance-based image equality
//!
//! Decodes two encoded images into premultiplied RGBA buffers and compares them
//! pixel by pixel. Used by the fixture corpus to avoid storing the same photo twice.

use image::RgbaImage;
use thiserror::Error;
use tracing::debug;

/// Percentage in the range 0..=100
pub type Percentage = f32;

/// Reasons two images could not be compared
#[derive(Debug, Error)]
pub enum CompareError {
    /// One of the inputs is not a decodable image
    #[error("unable to decode {which} image")]
    DecodeFailure {
        which: &'static str,
        #[source]
        source: image::ImageError,
    },

    /// Pixel buffer could not be set up for the decoded image
    #[error("unable to prepare pixel buffer for {which} image")]
    ContextFailure { which: &'static str },

    /// Images have different dimensions
    #[error("images have different sizes: expected {expected:?}, observed {observed:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        observed: (u32, u32),
    },
}

/// Fail unless `data` decodes as an image
pub fn ensure_decodable(data: &[u8]) -> Result<(), CompareError> {
    image::load_from_memory(data)
        .map(|_| ())
        .map_err(|source| CompareError::DecodeFailure {
            which: "observed",
            source,
        })
}

/// Compare two encoded images.
///
/// With a tolerance of 0 every pixel must match exactly. Otherwise the scan
/// stops as soon as the share of differing pixels exceeds `tolerance` percent.
pub fn compare_image_data(
    tolerance: Percentage,
    expected: &[u8],
    observed: &[u8],
) -> Result<bool, CompareError> {
    let expected_pixels = decode_pixels(expected, "expected")?;
    let observed_pixels = decode_pixels(observed, "observed")?;

    if expected_pixels.dimensions() != observed_pixels.dimensions() {
        return Err(CompareError::DimensionMismatch {
            expected: expected_pixels.dimensions(),
            observed: observed_pixels.dimensions(),
        });
    }

    let is_equal = compare_pixels(tolerance, &expected_pixels, &observed_pixels);
    debug!(
        "Compared {}x{} images at {}% tolerance: {}",
        expected_pixels.width(),
        expected_pixels.height(),
        tolerance,
        if is_equal { "equal" } else { "different" }
    );
    Ok(is_equal)
}

/// Compare two decoded buffers of identical dimensions
pub fn compare_pixels(tolerance: Percentage, expected: &RgbaImage, observed: &RgbaImage) -> bool {
    let tolerance = tolerance.clamp(0.0, 100.0) as f64;
    let expected_raw = expected.as_raw();
    let observed_raw = observed.as_raw();

    if tolerance == 0.0 {
        return expected_raw == observed_raw;
    }

    let number_of_pixels = expected_raw.len() / 4;
    if number_of_pixels == 0 {
        return true;
    }

    let mut diff_pixels = 0usize;
    for (a, b) in expected_raw
        .chunks_exact(4)
        .zip(observed_raw.chunks_exact(4))
    {
        if a == b {
            continue;
        }
        diff_pixels += 1;
        let percentage = 100.0 * diff_pixels as f64 / number_of_pixels as f64;
        if percentage > tolerance {
            return false;
        }
    }
    true
}

/// Decode to a row-major premultiplied RGBA buffer
fn decode_pixels(data: &[u8], which: &'static str) -> Result<RgbaImage, CompareError> {
    let decoded = image::load_from_memory(data)
        .map_err(|source| CompareError::DecodeFailure { which, source })?;
    let mut rgba = decoded.to_rgba8();

    let expected_len = (rgba.width() as usize)
        .checked_mul(rgba.height() as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or(CompareError::ContextFailure { which })?;
    if rgba.as_raw().len() != expected_len {
        return Err(CompareError::ContextFailure { which });
    }

    premultiply(&mut rgba);
    Ok(rgba)
}

/// Premultiply color channels by alpha, so fully transparent pixels compare equal
/// regardless of their stored color
fn premultiply(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        let alpha = pixel.0[3] as u16;
        if alpha == 255 {
            continue;
        }
        for channel in &mut pixel.0[..3] {
            *channel = ((*channel as u16 * alpha + 127) / 255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    fn png_bytes(image: &RgbaImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// 2x2 image with `k` pixels changed from the base color
    fn image_with_diffs(k: usize) -> RgbaImage {
        let mut image = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]));
        for (i, pixel) in image.pixels_mut().enumerate() {
            if i < k {
                *pixel = Rgba([200, 0, 0, 255]);
            }
        }
        image
    }

    #[test]
    fn test_identical_images_at_zero_tolerance() {
        let a = png_bytes(&image_with_diffs(0));
        assert!(compare_image_data(0.0, &a, &a).unwrap());
    }

    #[test]
    fn test_single_pixel_difference_at_zero_tolerance() {
        let a = png_bytes(&image_with_diffs(0));
        let b = png_bytes(&image_with_diffs(1));
        assert!(!compare_image_data(0.0, &a, &b).unwrap());
    }

    #[test]
    fn test_threshold_matches_diff_share() {
        let a = png_bytes(&image_with_diffs(0));
        let b = png_bytes(&image_with_diffs(1)); // 1 of 4 pixels = 25%

        assert!(compare_image_data(25.0, &a, &b).unwrap());
        assert!(compare_image_data(30.0, &a, &b).unwrap());
        assert!(!compare_image_data(24.0, &a, &b).unwrap());

        let c = png_bytes(&image_with_diffs(3)); // 75%
        assert!(!compare_image_data(50.0, &a, &c).unwrap());
        assert!(compare_image_data(75.0, &a, &c).unwrap());
    }

    #[test]
    fn test_comparison_is_symmetric() {
        let a = png_bytes(&image_with_diffs(0));
        let b = png_bytes(&image_with_diffs(2));
        for tolerance in [0.0, 10.0, 49.0, 50.0, 100.0] {
            assert_eq!(
                compare_image_data(tolerance, &a, &b).unwrap(),
                compare_image_data(tolerance, &b, &a).unwrap()
            );
        }
    }

    #[test]
    fn test_ensure_decodable() {
        assert!(ensure_decodable(&png_bytes(&image_with_diffs(0))).is_ok());
        assert!(matches!(
            ensure_decodable(b"raw camera bytes"),
            Err(CompareError::DecodeFailure { .. })
        ));
    }

    #[test]
    fn test_transparent_pixels_compare_equal_after_premultiply() {
        let a = RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 0]));
        let b = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 255, 0]));
        assert!(compare_image_data(0.0, &png_bytes(&a), &png_bytes(&b)).unwrap());
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = png_bytes(&RgbaImage::new(2, 2));
        let b = png_bytes(&RgbaImage::new(3, 2));
        let result = compare_image_data(0.0, &a, &b);
        assert!(matches!(
            result,
            Err(CompareError::DimensionMismatch {
                expected: (2, 2),
                observed: (3, 2)
            })
        ));
    }

    #[test]
    fn test_undecodable_input() {
        let a = png_bytes(&RgbaImage::new(2, 2));
        let result = compare_image_data(0.0, &a, b"not an image");
        assert!(matches!(
            result,
            Err(CompareError::DecodeFailure { which: "observed", .. })
        ));
    }
}
