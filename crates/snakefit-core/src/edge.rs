//! Edge operators: Sobel gradient magnitude and Canny edge maps.
//!
//! Both wrap `imageproc` kernels. [`sobel_magnitude`] returns raw
//! (unnormalized) magnitudes as a [`FloatPlane`] so callers can rescale
//! for their own energy units; [`canny`] returns a binary map where white
//! pixels (255) are edges.

use image::GrayImage;

use crate::field::FloatPlane;

/// Minimum allowed Canny threshold.
///
/// A low threshold of zero marks every pixel with any gradient as a
/// potential edge, which floods the greedy solver's energy map with
/// spurious minima.
pub const MIN_THRESHOLD: f32 = 1.0;
const _: () = assert!(MIN_THRESHOLD > 0.0);

/// Largest raw Sobel response on an 8-bit image: `4 · 255` per axis.
pub const SOBEL_MAX_AXIS: f64 = 1020.0;

/// Detect edges using the Canny algorithm.
///
/// Returns a binary image: 255 for edge pixels, 0 for non-edge.
///
/// Both thresholds are clamped to a minimum of [`MIN_THRESHOLD`] and
/// `low_threshold` is clamped to be at most `high_threshold`.
#[must_use = "returns the binary edge map"]
pub fn canny(image: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    let (low, high) = clamp_thresholds(low_threshold, high_threshold);
    imageproc::edges::canny(image, low, high)
}

/// Apply the Canny threshold policy: both at least [`MIN_THRESHOLD`],
/// low never above high.
#[must_use]
pub fn clamp_thresholds(low_threshold: f32, high_threshold: f32) -> (f32, f32) {
    let high = high_threshold.max(MIN_THRESHOLD);
    let low = low_threshold.max(MIN_THRESHOLD).min(high);
    (low, high)
}

/// Raw Sobel gradient magnitude `sqrt(gx² + gy²)` per pixel.
///
/// Uses the 3x3 Sobel kernels with clamped borders. On an 8-bit image the
/// result lies in `[0, SOBEL_MAX_AXIS · √2]`.
#[must_use = "returns the gradient magnitude plane"]
pub fn sobel_magnitude(image: &GrayImage) -> FloatPlane {
    let gx = imageproc::gradients::horizontal_sobel(image);
    let gy = imageproc::gradients::vertical_sobel(image);
    FloatPlane::from_fn(image.width(), image.height(), |row, col| {
        let x = f64::from(gx.get_pixel(col, row).0[0]);
        let y = f64::from(gy.get_pixel(col, row).0[0]);
        x.hypot(y)
    })
}
