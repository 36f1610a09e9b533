//! Shared types for the snakefit active-contour engine.

use serde::{Deserialize, Serialize};

use crate::chain::ContourAnalysis;
use crate::solver::SolveOutcome;

/// Re-export `GrayImage` so downstream crates can hand rasters to the
/// solvers without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` for 3-channel input rasters.
pub use image::RgbImage;

/// A 2D point in image coordinates, stored as `(row, col)`.
///
/// Rows grow downward from the top edge, columns grow rightward from the
/// left edge. Values are real so the continuous solver can place points
/// between pixel centers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Vertical position (pixels from top edge).
    pub row: f64,
    /// Horizontal position (pixels from left edge).
    pub col: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(row: f64, col: f64) -> Self {
        Self { row, col }
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dr = self.row - other.row;
        let dc = self.col - other.col;
        dr.mul_add(dr, dc * dc)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Returns `true` if both coordinates are finite.
    #[must_use]
    pub const fn is_finite(self) -> bool {
        self.row.is_finite() && self.col.is_finite()
    }
}

/// Minimum number of points a closed contour must carry.
pub const MIN_CONTOUR_POINTS: usize = 3;

/// An ordered, implicitly closed sequence of points.
///
/// The last point connects back to the first. The point count is fixed
/// for the duration of a solve: solvers never insert or drop points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour(Vec<Point>);

impl Contour {
    /// Create a contour from a vector of points.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::TooFewPoints`] for fewer than
    /// [`MIN_CONTOUR_POINTS`] points and [`InputError::NonFinitePoint`] if
    /// any coordinate is NaN or infinite.
    pub fn new(points: Vec<Point>) -> Result<Self, SnakeError> {
        check_points(&points)?;
        Ok(Self(points))
    }

    /// Wrap solver output that already satisfies the invariants.
    pub(crate) const fn from_trusted(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Re-check the construction invariants.
    ///
    /// Deserialized contours bypass [`Contour::new`], so solvers call
    /// this before touching the points.
    ///
    /// # Errors
    ///
    /// Same as [`Contour::new`].
    pub fn validate(&self) -> Result<(), SnakeError> {
        check_points(&self.0)
    }

    /// Build a contour from separate row and column arrays.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::AxisLengthMismatch`] if the arrays differ in
    /// length, otherwise the same errors as [`Contour::new`].
    pub fn from_axes(rows: &[f64], cols: &[f64]) -> Result<Self, SnakeError> {
        if rows.len() != cols.len() {
            return Err(InputError::AxisLengthMismatch {
                rows: rows.len(),
                cols: cols.len(),
            }
            .into());
        }
        Self::new(
            rows.iter()
                .zip(cols)
                .map(|(&row, &col)| Point::new(row, col))
                .collect(),
        )
    }

    /// Evenly spaced points on a circle around `center`.
    ///
    /// Point `k` sits at angle `2πk/n`, i.e.
    /// `(center.row + r·cos θ, center.col + r·sin θ)`. The closing point is
    /// not repeated.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::TooFewPoints`] if `n < 3` and
    /// [`InputError::NonFinitePoint`] for a non-finite center or radius.
    pub fn circle(center: Point, radius: f64, n: usize) -> Result<Self, SnakeError> {
        #[allow(clippy::cast_precision_loss)]
        let step = std::f64::consts::TAU / n as f64;
        let points = (0..n)
            .map(|k| {
                #[allow(clippy::cast_precision_loss)]
                let theta = step * k as f64;
                Point::new(
                    radius.mul_add(theta.cos(), center.row),
                    radius.mul_add(theta.sin(), center.col),
                )
            })
            .collect();
        Self::new(points)
    }

    /// Number of points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`: a valid contour has at least three points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Row coordinates in point order.
    #[must_use]
    pub fn rows(&self) -> Vec<f64> {
        self.0.iter().map(|p| p.row).collect()
    }

    /// Column coordinates in point order.
    #[must_use]
    pub fn cols(&self) -> Vec<f64> {
        self.0.iter().map(|p| p.col).collect()
    }

    /// Mean of all points.
    #[must_use]
    pub fn centroid(&self) -> Point {
        #[allow(clippy::cast_precision_loss)]
        let n = self.0.len() as f64;
        let (row, col) = self
            .0
            .iter()
            .fold((0.0, 0.0), |(r, c), p| (r + p.row, c + p.col));
        Point::new(row / n, col / n)
    }

    /// Consumes the contour and returns the underlying vector of points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }
}

fn check_points(points: &[Point]) -> Result<(), SnakeError> {
    if points.len() < MIN_CONTOUR_POINTS {
        return Err(InputError::TooFewPoints(points.len()).into());
    }
    if let Some(index) = points.iter().position(|p| !p.is_finite()) {
        return Err(InputError::NonFinitePoint { index }.into());
    }
    Ok(())
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels (number of columns).
    pub width: u32,
    /// Height in pixels (number of rows).
    pub height: u32,
}

impl Dimensions {
    /// Returns `true` if either side is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Result of [`segment`](crate::segment): the solve plus its analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentResult {
    /// Final contour, termination state and diagnostics.
    pub outcome: SolveOutcome,

    /// Chain code and area/perimeter of the final contour.
    pub analysis: ContourAnalysis,

    /// Dimensions of the source image in pixels.
    pub dimensions: Dimensions,
}

/// Errors raised by every solver entry point.
///
/// Input problems and numerical failures are kept apart so callers can
/// decide what is worth retrying: an [`InputError`] never succeeds on a
/// second attempt, a [`NumericalError`] may succeed with a larger `gamma`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SnakeError {
    /// The image, contour or configuration was rejected before solving.
    #[error(transparent)]
    InvalidInput(#[from] InputError),

    /// The smoothness system could not be inverted.
    #[error(transparent)]
    Numerical(#[from] NumericalError),
}

impl SnakeError {
    /// Returns `true` for [`SnakeError::InvalidInput`].
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    /// Returns `true` for [`SnakeError::Numerical`].
    #[must_use]
    pub const fn is_numerical(&self) -> bool {
        matches!(self, Self::Numerical(_))
    }
}

/// Input rejected before any iteration begins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    /// The raster has no pixels.
    #[error("image has zero size ({width}x{height})")]
    EmptyImage {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },

    /// The contour is too short to be closed.
    #[error("contour has {0} points, at least 3 are required")]
    TooFewPoints(usize),

    /// Row and column arrays differ in length.
    #[error("contour axes differ in length: {rows} rows vs {cols} columns")]
    AxisLengthMismatch {
        /// Number of row coordinates.
        rows: usize,
        /// Number of column coordinates.
        cols: usize,
    },

    /// A contour point carries a NaN or infinite coordinate.
    #[error("contour point {index} is not finite")]
    NonFinitePoint {
        /// Index of the offending point.
        index: usize,
    },

    /// Solver configuration is invalid.
    #[error("invalid solver configuration: {0}")]
    InvalidConfig(String),
}

/// Failure to invert `A + γI`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NumericalError {
    /// LU decomposition hit a zero pivot.
    #[error("system matrix for {n} points is singular (gamma = {gamma})")]
    SingularSystem {
        /// Contour length.
        n: usize,
        /// Regularization used.
        gamma: f64,
    },

    /// The computed inverse does not reproduce the identity.
    #[error(
        "system matrix for {n} points is ill-conditioned (gamma = {gamma}, residual = {residual:e})"
    )]
    IllConditioned {
        /// Contour length.
        n: usize,
        /// Regularization used.
        gamma: f64,
        /// Largest absolute deviation of `(A + γI)·inv` from the identity.
        residual: f64,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    // --- Point tests ---

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_abs_diff_eq!(a.distance_squared(b), 25.0);
        assert_abs_diff_eq!(a.distance(b), 5.0);
    }

    #[test]
    fn point_finiteness() {
        assert!(Point::new(1.0, 2.0).is_finite());
        assert!(!Point::new(f64::NAN, 2.0).is_finite());
        assert!(!Point::new(1.0, f64::INFINITY).is_finite());
    }

    // --- Contour tests ---

    #[test]
    fn contour_requires_three_points() {
        let err = Contour::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]).unwrap_err();
        assert_eq!(err, SnakeError::InvalidInput(InputError::TooFewPoints(2)));
        assert!(err.is_invalid_input());
    }

    #[test]
    fn contour_rejects_non_finite_points() {
        let err = Contour::new(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, f64::NAN),
            Point::new(2.0, 2.0),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            SnakeError::InvalidInput(InputError::NonFinitePoint { index: 1 })
        );
    }

    #[test]
    fn from_axes_rejects_mismatched_lengths() {
        let err = Contour::from_axes(&[0.0, 1.0, 2.0], &[0.0, 1.0]).unwrap_err();
        assert_eq!(
            err,
            SnakeError::InvalidInput(InputError::AxisLengthMismatch { rows: 3, cols: 2 })
        );
    }

    #[test]
    fn from_axes_pairs_rows_with_cols() {
        let c = Contour::from_axes(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]).unwrap();
        assert_eq!(c.points()[1], Point::new(2.0, 5.0));
        assert_eq!(c.rows(), vec![1.0, 2.0, 3.0]);
        assert_eq!(c.cols(), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn circle_points_lie_on_radius() {
        let center = Point::new(25.0, 30.0);
        let c = Contour::circle(center, 10.0, 8).unwrap();
        assert_eq!(c.len(), 8);
        for p in c.points() {
            assert_abs_diff_eq!(p.distance(center), 10.0, epsilon = 1e-12);
        }
        // First point is straight "down" in row direction.
        assert_abs_diff_eq!(c.points()[0].row, 35.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c.points()[0].col, 30.0, epsilon = 1e-12);
    }

    #[test]
    fn circle_centroid_is_center() {
        let center = Point::new(12.5, 7.25);
        let c = Contour::circle(center, 4.0, 16).unwrap();
        let centroid = c.centroid();
        assert_abs_diff_eq!(centroid.row, center.row, epsilon = 1e-12);
        assert_abs_diff_eq!(centroid.col, center.col, epsilon = 1e-12);
    }

    #[test]
    fn validate_catches_deserialized_short_contour() {
        let c: Contour = serde_json::from_str(r#"[{"row":0.0,"col":0.0}]"#).unwrap();
        assert_eq!(
            c.validate(),
            Err(SnakeError::InvalidInput(InputError::TooFewPoints(1)))
        );
    }

    #[test]
    fn circle_with_two_points_is_rejected() {
        assert!(Contour::circle(Point::new(0.0, 0.0), 1.0, 2).is_err());
    }

    // --- Dimensions tests ---

    #[test]
    fn dimensions_empty() {
        assert!(Dimensions { width: 0, height: 5 }.is_empty());
        assert!(Dimensions { width: 5, height: 0 }.is_empty());
        assert!(!Dimensions { width: 1, height: 1 }.is_empty());
    }

    // --- Error tests ---

    #[test]
    fn error_display_is_transparent() {
        let err = SnakeError::from(InputError::EmptyImage {
            width: 0,
            height: 4,
        });
        assert_eq!(err.to_string(), "image has zero size (0x4)");

        let err = SnakeError::from(NumericalError::SingularSystem { n: 3, gamma: 0.0 });
        assert!(err.is_numerical());
        assert_eq!(
            err.to_string(),
            "system matrix for 3 points is singular (gamma = 0)"
        );
    }

    // --- Serde round-trip tests ---

    #[test]
    fn contour_serde_round_trip() {
        let c = Contour::circle(Point::new(5.0, 5.0), 2.0, 5).unwrap();
        let json = serde_json::to_string(&c).unwrap();
        let deserialized: Contour = serde_json::from_str(&json).unwrap();
        assert_eq!(c, deserialized);
    }
}
