//! Scalar fields: the image-derived quantities the solvers descend on.
//!
//! [`ScalarField`] wraps a decoded raster (grayscale or 3-channel) and
//! derives everything the two snake solvers need from it:
//!
//! - a grayscale reduction ([`ScalarField::grayscale`]),
//! - a summed per-channel edge magnitude ([`ScalarField::edge_magnitude`]),
//! - the weighted line/edge attraction field for the continuous solver
//!   ([`ScalarField::external_field`]),
//! - the negated Sobel-of-Canny energy map for the greedy solver
//!   ([`ScalarField::canny_edge_energy`]).
//!
//! A `ScalarField` is never mutated after construction, so one instance
//! can feed any number of independent solves, including in parallel.

use image::{DynamicImage, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::edge;
use crate::types::{Dimensions, InputError, SnakeError};

/// Scale applied to raw 8-bit Sobel responses so that an image in
/// `[0, 1]` yields `sqrt((h² + v²) / 2)` with kernels normalized by 1/4.
const EDGE_NORMALIZATION: f64 = 4.0 * std::f64::consts::SQRT_2 * 255.0;

/// A dense, row-major plane of `f64` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatPlane {
    width: u32,
    height: u32,
    data: Vec<f64>,
}

impl FloatPlane {
    /// A plane filled with a single value.
    #[must_use]
    pub fn new_fill(width: u32, height: u32, value: f64) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Build a plane by evaluating `f(row, col)` at every pixel.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> f64) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for row in 0..height {
            for col in 0..width {
                data.push(f(row, col));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Width in pixels (number of columns).
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels (number of rows).
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Plane dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// Row-major samples.
    #[must_use]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Sample at `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is out of bounds.
    #[must_use]
    pub fn get(&self, row: u32, col: u32) -> f64 {
        self.data[row as usize * self.width as usize + col as usize]
    }

    /// Apply `f` to every sample.
    #[must_use]
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Element-wise `a·self + b·other`.
    fn weighted_sum(&self, a: f64, other: &Self, b: f64) -> Self {
        Self {
            width: self.width,
            height: self.height,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&x, &y)| a.mul_add(x, b * y))
                .collect(),
        }
    }
}

/// Weights combining raw intensity and edge strength into the field the
/// continuous snake climbs.
///
/// Positive `w_line` attracts the contour toward bright regions, negative
/// toward dark ones. Positive `w_edge` attracts it toward strong edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeWeights {
    /// Attraction to intensity.
    pub w_line: f64,
    /// Attraction to edges.
    pub w_edge: f64,
}

impl Default for EdgeWeights {
    fn default() -> Self {
        Self {
            w_line: 0.0,
            w_edge: 1.0,
        }
    }
}

/// Source raster, kept in its native channel layout.
#[derive(Debug, Clone)]
enum Raster {
    Gray(GrayImage),
    Rgb(RgbImage),
}

/// A read-only image field built once per image.
#[derive(Debug, Clone)]
pub struct ScalarField {
    raster: Raster,
}

impl ScalarField {
    /// Wrap a single-channel raster.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::EmptyImage`] if either side is zero.
    pub fn from_gray(image: GrayImage) -> Result<Self, SnakeError> {
        check_dimensions(image.width(), image.height())?;
        Ok(Self {
            raster: Raster::Gray(image),
        })
    }

    /// Wrap a 3-channel raster.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::EmptyImage`] if either side is zero.
    pub fn from_rgb(image: RgbImage) -> Result<Self, SnakeError> {
        check_dimensions(image.width(), image.height())?;
        Ok(Self {
            raster: Raster::Rgb(image),
        })
    }

    /// Wrap any decoded image.
    ///
    /// Luma images (with or without alpha) stay single-channel; everything
    /// else is converted to 8-bit RGB, dropping alpha.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::EmptyImage`] if either side is zero.
    pub fn from_dynamic(image: &DynamicImage) -> Result<Self, SnakeError> {
        match image {
            DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_) => Self::from_gray(image.to_luma8()),
            _ => Self::from_rgb(image.to_rgb8()),
        }
    }

    /// Raster dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        let (width, height) = match &self.raster {
            Raster::Gray(img) => img.dimensions(),
            Raster::Rgb(img) => img.dimensions(),
        };
        Dimensions { width, height }
    }

    /// Number of intensity channels (1 or 3).
    #[must_use]
    pub const fn channel_count(&self) -> usize {
        match self.raster {
            Raster::Gray(_) => 1,
            Raster::Rgb(_) => 3,
        }
    }

    /// Grayscale reduction of the raster.
    ///
    /// Single-channel rasters are returned as-is. RGB rasters use the
    /// `image` crate's luminance weighting.
    #[must_use = "returns the grayscale image"]
    pub fn grayscale(&self) -> GrayImage {
        match &self.raster {
            Raster::Gray(img) => img.clone(),
            Raster::Rgb(img) => image::imageops::grayscale(img),
        }
    }

    /// Sum of all channels, each scaled to `[0, 1]`.
    #[must_use]
    pub fn intensity(&self) -> FloatPlane {
        let Dimensions { width, height } = self.dimensions();
        match &self.raster {
            Raster::Gray(img) => FloatPlane::from_fn(width, height, |row, col| {
                f64::from(img.get_pixel(col, row).0[0]) / 255.0
            }),
            Raster::Rgb(img) => FloatPlane::from_fn(width, height, |row, col| {
                img.get_pixel(col, row)
                    .0
                    .iter()
                    .map(|&c| f64::from(c) / 255.0)
                    .sum()
            }),
        }
    }

    /// Edge magnitude summed over channels.
    ///
    /// Each channel is treated as an image in `[0, 1]` and filtered with a
    /// normalized Sobel operator, giving `sqrt((h² + v²) / 2)` per pixel.
    #[must_use]
    pub fn edge_magnitude(&self) -> FloatPlane {
        let Dimensions { width, height } = self.dimensions();
        let mut total = FloatPlane::new_fill(width, height, 0.0);
        for channel in self.channels() {
            let mag = edge::sobel_magnitude(&channel);
            total = total.weighted_sum(1.0, &mag, EDGE_NORMALIZATION.recip());
        }
        total
    }

    /// External attraction field for the continuous solver:
    /// `w_line · intensity + w_edge · edge_magnitude`.
    ///
    /// The edge pass is skipped entirely when `w_edge` is zero.
    #[must_use]
    pub fn external_field(&self, weights: EdgeWeights) -> FloatPlane {
        let intensity = self.intensity();
        if weights.w_edge == 0.0 {
            return intensity.map(|v| weights.w_line * v);
        }
        intensity.weighted_sum(weights.w_line, &self.edge_magnitude(), weights.w_edge)
    }

    /// Energy map for the greedy solver.
    ///
    /// Runs Canny on the grayscale reduction, then takes the negated raw
    /// Sobel magnitude of the binary edge map, so pixels flanking detected
    /// edges carry the lowest (most negative) energy.
    #[must_use]
    pub fn canny_edge_energy(&self, low_threshold: f32, high_threshold: f32) -> FloatPlane {
        let edges = edge::canny(&self.grayscale(), low_threshold, high_threshold);
        edge::sobel_magnitude(&edges).map(|v| -v)
    }

    /// Split the raster into single-channel images.
    fn channels(&self) -> Vec<GrayImage> {
        match &self.raster {
            Raster::Gray(img) => vec![img.clone()],
            Raster::Rgb(img) => {
                let (w, h) = img.dimensions();
                (0..3)
                    .map(|c| {
                        GrayImage::from_fn(w, h, |x, y| image::Luma([img.get_pixel(x, y).0[c]]))
                    })
                    .collect()
            }
        }
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<(), SnakeError> {
    if (Dimensions { width, height }).is_empty() {
        return Err(InputError::EmptyImage { width, height }.into());
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn step_image() -> GrayImage {
        GrayImage::from_fn(20, 10, |x, _| image::Luma([if x < 10 { 0 } else { 255 }]))
    }

    #[test]
    fn zero_size_image_is_rejected() {
        let err = ScalarField::from_gray(GrayImage::new(0, 7)).unwrap_err();
        assert_eq!(
            err,
            SnakeError::InvalidInput(InputError::EmptyImage {
                width: 0,
                height: 7
            })
        );
        assert!(ScalarField::from_rgb(RgbImage::new(3, 0)).is_err());
    }

    #[test]
    fn dynamic_luma_stays_single_channel() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(4, 4));
        assert_eq!(ScalarField::from_dynamic(&img).unwrap().channel_count(), 1);

        let img = DynamicImage::ImageRgba8(image::RgbaImage::new(4, 4));
        assert_eq!(ScalarField::from_dynamic(&img).unwrap().channel_count(), 3);
    }

    #[test]
    fn grayscale_of_gray_is_identity() {
        let img = step_image();
        let field = ScalarField::from_gray(img.clone()).unwrap();
        assert_eq!(field.grayscale(), img);
    }

    #[test]
    fn grayscale_weights_green_highest() {
        let rgb = RgbImage::from_fn(3, 1, |x, _| match x {
            0 => image::Rgb([255, 0, 0]),
            1 => image::Rgb([0, 255, 0]),
            _ => image::Rgb([0, 0, 255]),
        });
        let gray = ScalarField::from_rgb(rgb).unwrap().grayscale();
        let (r, g, b) = (
            gray.get_pixel(0, 0).0[0],
            gray.get_pixel(1, 0).0[0],
            gray.get_pixel(2, 0).0[0],
        );
        assert!(g > r && r > b, "expected green > red > blue, got {r} {g} {b}");
    }

    #[test]
    fn intensity_sums_channels() {
        let rgb = RgbImage::from_pixel(2, 2, image::Rgb([255, 255, 0]));
        let plane = ScalarField::from_rgb(rgb).unwrap().intensity();
        assert_abs_diff_eq!(plane.get(1, 1), 2.0);
    }

    #[test]
    fn edge_magnitude_matches_normalized_sobel() {
        let field = ScalarField::from_gray(step_image()).unwrap();
        let edges = field.edge_magnitude();
        // Full unit step: h = 1, v = 0 -> sqrt(1/2).
        assert_abs_diff_eq!(edges.get(5, 9), std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-12);
        assert_abs_diff_eq!(edges.get(5, 2), 0.0);
    }

    #[test]
    fn rgb_edge_magnitude_sums_channels() {
        let gray_step = step_image();
        let rgb = RgbImage::from_fn(20, 10, |x, y| {
            let v = gray_step.get_pixel(x, y).0[0];
            image::Rgb([v, v, v])
        });
        let single = ScalarField::from_gray(gray_step).unwrap().edge_magnitude();
        let triple = ScalarField::from_rgb(rgb).unwrap().edge_magnitude();
        assert_abs_diff_eq!(triple.get(5, 9), 3.0 * single.get(5, 9), epsilon = 1e-12);
    }

    #[test]
    fn external_field_combines_weights() {
        let field = ScalarField::from_gray(step_image()).unwrap();
        let weights = EdgeWeights {
            w_line: 2.0,
            w_edge: 1.0,
        };
        let combined = field.external_field(weights);
        let expected = 2.0f64.mul_add(1.0, std::f64::consts::FRAC_1_SQRT_2);
        assert_abs_diff_eq!(combined.get(5, 10), expected, epsilon = 1e-12);
    }

    #[test]
    fn external_field_without_edges_is_scaled_intensity() {
        let field = ScalarField::from_gray(step_image()).unwrap();
        let plane = field.external_field(EdgeWeights {
            w_line: -1.0,
            w_edge: 0.0,
        });
        assert_abs_diff_eq!(plane.get(3, 15), -1.0);
        assert_abs_diff_eq!(plane.get(3, 9), 0.0);
    }

    #[test]
    fn canny_energy_is_non_positive_and_negative_near_edges() {
        let field = ScalarField::from_gray(step_image()).unwrap();
        let energy = field.canny_edge_energy(100.0, 150.0);
        assert!(energy.data().iter().all(|&v| v <= 0.0));
        let strongest = energy.data().iter().copied().fold(0.0, f64::min);
        assert!(strongest < -100.0, "expected strong edge energy, got {strongest}");
        assert_abs_diff_eq!(energy.get(5, 1), 0.0);
    }

    #[test]
    fn float_plane_indexing_is_row_major() {
        let plane = FloatPlane::from_fn(3, 2, |row, col| f64::from(row * 10 + col));
        assert_eq!(plane.data(), &[0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
        assert_abs_diff_eq!(plane.get(1, 2), 12.0);
    }
}
