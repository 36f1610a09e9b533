//! Greedy (discrete) active contour.
//!
//! Points live on integer pixels. Each pass visits the points in order
//! and moves each one to whichever of its current pixel and the 8
//! surrounding pixels has the lowest energy. A point that has already
//! moved in this pass is seen at its new position by its successors
//! (in-place sequential relaxation, see [`relax_in_place`]). The snake
//! has converged when a whole pass moves nothing.
//!
//! # Energy
//!
//! For point `i` with neighbors `p` (previous) and `q` (next):
//!
//! ```text
//! internal(i) = α·κ² + β·((|i − p| + |q − i|) / 2)²
//! external(i) = −sobel(canny(gray))[i]
//! border(i)   = −border_weight·(α + β)·distance_to_border(i)
//! ```
//!
//! `κ` is the turning angle at `i` wrapped into `(−π, π]`. Moving point
//! `i` changes the internal terms of `i − 1`, `i` and `i + 1`, so a
//! candidate is scored on all three plus its own external and border
//! terms. A move is accepted only if that score strictly drops, which
//! makes the total energy strictly decrease on every accepted move.

use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use web_time::Instant;

use crate::diagnostics::{SolveDiagnostics, SolverMetrics};
use crate::field::{FloatPlane, ScalarField};
use crate::solver::{SolveOutcome, Termination};
use crate::types::{Contour, InputError, MIN_CONTOUR_POINTS, Point, SnakeError};

/// Parameters of the greedy snake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreedyConfig {
    /// Curvature weight.
    pub alpha: f64,
    /// Spacing weight.
    pub beta: f64,
    /// Pass cap.
    pub max_num_iter: usize,
    /// Canny low threshold for the edge map. Clamped like
    /// [`edge::canny`](crate::edge::canny).
    pub canny_low: f32,
    /// Canny high threshold for the edge map.
    pub canny_high: f32,
    /// Strength of the pull away from the image border, relative to
    /// `alpha + beta`.
    pub border_weight: f64,
}

impl Default for GreedyConfig {
    fn default() -> Self {
        Self {
            alpha: 0.01,
            beta: 0.01,
            max_num_iter: 100,
            canny_low: 100.0,
            canny_high: 150.0,
            border_weight: 1.0,
        }
    }
}

impl GreedyConfig {
    /// Check every parameter against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InvalidConfig`] naming the first offending
    /// parameter.
    pub fn validate(&self) -> Result<(), SnakeError> {
        let checks = [
            ("alpha", self.alpha.is_finite() && self.alpha >= 0.0),
            ("beta", self.beta.is_finite() && self.beta >= 0.0),
            ("canny_low", self.canny_low.is_finite()),
            ("canny_high", self.canny_high.is_finite()),
            (
                "border_weight",
                self.border_weight.is_finite() && self.border_weight >= 0.0,
            ),
        ];
        match checks.iter().find(|(_, ok)| !ok) {
            Some((name, _)) => {
                Err(InputError::InvalidConfig(format!("{name} is out of range")).into())
            }
            None => Ok(()),
        }
    }
}

/// A contour point on the pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelPoint {
    /// Pixel row.
    pub row: u32,
    /// Pixel column.
    pub col: u32,
}

impl PixelPoint {
    /// Create a new pixel point.
    #[must_use]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Round a real-valued point to the nearest pixel inside
    /// `width × height`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_point(point: Point, width: u32, height: u32) -> Self {
        let max_row = f64::from(height.saturating_sub(1));
        let max_col = f64::from(width.saturating_sub(1));
        Self {
            row: point.row.round().clamp(0.0, max_row) as u32,
            col: point.col.round().clamp(0.0, max_col) as u32,
        }
    }

    /// Back to real-valued coordinates.
    #[must_use]
    pub fn to_point(self) -> Point {
        Point::new(f64::from(self.row), f64::from(self.col))
    }
}

/// Per-point energy terms for one image and one configuration.
#[derive(Debug, Clone)]
pub struct EnergyModel {
    alpha: f64,
    beta: f64,
    border_weight: f64,
    energy: FloatPlane,
}

impl EnergyModel {
    /// Build the Canny-based energy map for `field`.
    #[must_use]
    pub fn new(field: &ScalarField, config: &GreedyConfig) -> Self {
        Self::from_plane(
            field.canny_edge_energy(config.canny_low, config.canny_high),
            config,
        )
    }

    /// Use a precomputed external energy map.
    #[must_use]
    pub fn from_plane(energy: FloatPlane, config: &GreedyConfig) -> Self {
        Self {
            alpha: config.alpha,
            beta: config.beta,
            border_weight: config.border_weight,
            energy,
        }
    }

    /// The external energy map.
    #[must_use]
    pub const fn energy_map(&self) -> &FloatPlane {
        &self.energy
    }

    /// External energy at a pixel.
    #[must_use]
    pub fn external(&self, p: PixelPoint) -> f64 {
        self.energy.get(p.row, p.col)
    }

    /// Border bias at a pixel: more negative further from the border.
    ///
    /// Distance is counted in whole pixels to the outermost row or column
    /// on each side, so every edge pixel has zero bias.
    #[must_use]
    pub fn border(&self, p: PixelPoint) -> f64 {
        let bottom = self.energy.height() - 1 - p.row;
        let right = self.energy.width() - 1 - p.col;
        let distance = p.row.min(bottom).min(p.col).min(right);
        -self.border_weight * (self.alpha + self.beta) * f64::from(distance)
    }

    /// Internal energy of `cur` between `prev` and `next`.
    #[must_use]
    pub fn internal(&self, prev: PixelPoint, cur: PixelPoint, next: PixelPoint) -> f64 {
        let (in_row, in_col) = delta(prev, cur);
        let (out_row, out_col) = delta(cur, next);
        let turn = wrap_angle(out_row.atan2(out_col) - in_row.atan2(in_col));
        let spacing = (in_row.hypot(in_col) + out_row.hypot(out_col)) / 2.0;
        self.alpha.mul_add(turn * turn, self.beta * spacing * spacing)
    }

    /// Total energy of a closed contour.
    #[must_use]
    pub fn total(&self, points: &[PixelPoint]) -> f64 {
        let n = points.len();
        (0..n)
            .map(|i| {
                let cur = points[i];
                self.internal(points[(i + n - 1) % n], cur, points[(i + 1) % n])
                    + self.external(cur)
                    + self.border(cur)
            })
            .sum()
    }

    /// Every energy term that depends on point `i`, with `candidate`
    /// standing in for it.
    fn local(&self, points: &[PixelPoint], i: usize, candidate: PixelPoint) -> f64 {
        let n = points.len();
        let at = |offset: usize| points[(i + offset) % n];
        let (prev2, prev, next, next2) = (at(n - 2), at(n - 1), at(1), at(2));
        self.internal(prev2, prev, candidate)
            + self.internal(prev, candidate, next)
            + self.internal(candidate, next, next2)
            + self.external(candidate)
            + self.border(candidate)
    }

    /// Offset `p` by one pixel step, clamped to the map.
    fn neighbor(&self, p: PixelPoint, d_row: i32, d_col: i32) -> PixelPoint {
        PixelPoint {
            row: p
                .row
                .saturating_add_signed(d_row)
                .min(self.energy.height() - 1),
            col: p
                .col
                .saturating_add_signed(d_col)
                .min(self.energy.width() - 1),
        }
    }
}

/// One greedy pass over `points`, updating them in place.
///
/// Points are visited in order and each move is visible to the points
/// after it. Ties keep the earlier candidate: the current position
/// first, then neighbors in row-major offset order. Returns the number
/// of points that moved.
///
/// # Panics
///
/// Panics if a point lies outside the model's energy map.
pub fn relax_in_place(points: &mut [PixelPoint], model: &EnergyModel) -> usize {
    let mut moved = 0;
    for i in 0..points.len() {
        let current = points[i];
        let mut best = current;
        let mut best_energy = model.local(points, i, current);
        for d_row in -1..=1 {
            for d_col in -1..=1 {
                let candidate = model.neighbor(current, d_row, d_col);
                if candidate == current {
                    continue;
                }
                let energy = model.local(points, i, candidate);
                if energy < best_energy {
                    best = candidate;
                    best_energy = energy;
                }
            }
        }
        if best != current {
            points[i] = best;
            moved += 1;
        }
    }
    moved
}

/// An in-progress greedy solve.
#[derive(Debug, Clone)]
pub struct GreedySnake {
    model: EnergyModel,
    points: Vec<PixelPoint>,
    max_num_iter: usize,
    passes: usize,
    last_moved: usize,
    initial_energy: f64,
    termination: Option<Termination>,
    started: Instant,
    setup_duration: std::time::Duration,
}

impl GreedySnake {
    /// Round `contour` onto the pixel grid and build the energy map.
    ///
    /// # Errors
    ///
    /// Returns [`SnakeError::InvalidInput`] for a bad contour or config.
    pub fn new(
        field: &ScalarField,
        contour: &Contour,
        config: &GreedyConfig,
    ) -> Result<Self, SnakeError> {
        config.validate()?;
        contour.validate()?;
        let dims = field.dimensions();
        let pixels = contour
            .points()
            .iter()
            .map(|&p| PixelPoint::from_point(p, dims.width, dims.height))
            .collect();
        Self::from_pixels(field, pixels, config)
    }

    /// Start from pixel positions directly. Out-of-range pixels are
    /// clamped into the image.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::TooFewPoints`] for fewer than three points and
    /// [`InputError::InvalidConfig`] for a bad config.
    pub fn from_pixels(
        field: &ScalarField,
        mut pixels: Vec<PixelPoint>,
        config: &GreedyConfig,
    ) -> Result<Self, SnakeError> {
        let started = Instant::now();
        config.validate()?;
        if pixels.len() < MIN_CONTOUR_POINTS {
            return Err(InputError::TooFewPoints(pixels.len()).into());
        }

        let dims = field.dimensions();
        debug!(
            points = pixels.len(),
            width = dims.width,
            height = dims.height,
            "greedy snake initializing"
        );
        for p in &mut pixels {
            p.row = p.row.min(dims.height - 1);
            p.col = p.col.min(dims.width - 1);
        }

        let model = EnergyModel::new(field, config);
        let initial_energy = model.total(&pixels);
        Ok(Self {
            model,
            points: pixels,
            max_num_iter: config.max_num_iter,
            passes: 0,
            last_moved: 0,
            initial_energy,
            termination: None,
            started,
            setup_duration: started.elapsed(),
        })
    }

    /// Current pixel positions.
    #[must_use]
    pub fn points(&self) -> &[PixelPoint] {
        &self.points
    }

    /// The energy model in use.
    #[must_use]
    pub const fn model(&self) -> &EnergyModel {
        &self.model
    }

    /// Total energy of the current positions.
    #[must_use]
    pub fn total_energy(&self) -> f64 {
        self.model.total(&self.points)
    }

    /// Passes performed so far.
    #[must_use]
    pub const fn passes(&self) -> usize {
        self.passes
    }

    /// The terminal state, once reached.
    #[must_use]
    pub const fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Perform one relaxation pass.
    ///
    /// Returns the terminal state once reached; further calls are no-ops.
    pub fn pass(&mut self) -> Option<Termination> {
        if self.termination.is_some() {
            return self.termination;
        }
        if self.passes >= self.max_num_iter {
            return self.finish(Termination::MaxIterationsReached);
        }

        self.last_moved = relax_in_place(&mut self.points, &self.model);
        self.passes += 1;
        trace!(
            pass = self.passes,
            moved = self.last_moved,
            energy = self.total_energy(),
            "greedy pass"
        );

        if self.last_moved == 0 {
            return self.finish(Termination::Converged);
        }
        if self.passes >= self.max_num_iter {
            return self.finish(Termination::MaxIterationsReached);
        }
        None
    }

    /// Relax to a terminal state without giving up the point buffer.
    pub fn relax(&mut self) -> Termination {
        loop {
            if let Some(t) = self.pass() {
                return t;
            }
        }
    }

    /// Hand back the point buffer.
    #[must_use]
    pub fn into_pixels(self) -> Vec<PixelPoint> {
        self.points
    }

    /// Relax to a terminal state and package the result.
    #[must_use]
    pub fn run(mut self) -> SolveOutcome {
        let termination = self.relax();
        let final_energy = self.total_energy();
        SolveOutcome {
            contour: Contour::from_trusted(self.points.iter().map(|p| p.to_point()).collect()),
            termination,
            iterations: self.passes,
            diagnostics: SolveDiagnostics {
                setup_duration: self.setup_duration,
                total_duration: self.started.elapsed(),
                point_count: self.points.len(),
                metrics: SolverMetrics::Greedy {
                    initial_energy: self.initial_energy,
                    final_energy,
                    last_moved: self.last_moved,
                },
            },
        }
    }

    fn finish(&mut self, termination: Termination) -> Option<Termination> {
        debug!(?termination, passes = self.passes, "greedy snake finished");
        self.termination = Some(termination);
        self.termination
    }
}

/// Signed `(Δrow, Δcol)` from `a` to `b`.
fn delta(a: PixelPoint, b: PixelPoint) -> (f64, f64) {
    (
        f64::from(b.row) - f64::from(a.row),
        f64::from(b.col) - f64::from(a.col),
    )
}

/// Wrap an angle difference into `(−π, π]`.
fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_abs_diff_eq;
    use image::GrayImage;

    use super::*;

    fn px(row: u32, col: u32) -> PixelPoint {
        PixelPoint::new(row, col)
    }

    fn flat_model(width: u32, height: u32, config: &GreedyConfig) -> EnergyModel {
        EnergyModel::from_plane(FloatPlane::new_fill(width, height, 0.0), config)
    }

    /// Bright square on black, edges at rows/cols 15 and 45.
    fn square_field() -> ScalarField {
        ScalarField::from_gray(GrayImage::from_fn(60, 60, |x, y| {
            let inside = (15..45).contains(&x) && (15..45).contains(&y);
            image::Luma([if inside { 255 } else { 0 }])
        }))
        .unwrap()
    }

    #[test]
    fn wrap_angle_range() {
        assert_abs_diff_eq!(wrap_angle(0.0), 0.0);
        assert_abs_diff_eq!(wrap_angle(PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle(-PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle(1.5 * PI), -0.5 * PI, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle(-1.5 * PI), 0.5 * PI, epsilon = 1e-12);
    }

    #[test]
    fn straight_line_has_only_spacing_energy() {
        let config = GreedyConfig {
            alpha: 1.0,
            beta: 0.5,
            ..GreedyConfig::default()
        };
        let model = flat_model(10, 10, &config);
        assert_abs_diff_eq!(model.internal(px(2, 1), px(2, 3), px(2, 5)), 0.5 * 4.0);
    }

    #[test]
    fn right_angle_turn_costs_curvature() {
        let config = GreedyConfig {
            alpha: 1.0,
            beta: 0.0,
            ..GreedyConfig::default()
        };
        let model = flat_model(10, 10, &config);
        let turn = model.internal(px(2, 2), px(2, 3), px(3, 3));
        assert_abs_diff_eq!(turn, (PI / 2.0).powi(2), epsilon = 1e-12);
    }

    #[test]
    fn border_bias_grows_inward() {
        let model = flat_model(11, 11, &GreedyConfig::default());
        assert_abs_diff_eq!(model.border(px(0, 5)), 0.0);
        assert_abs_diff_eq!(model.border(px(10, 5)), 0.0);
        assert_abs_diff_eq!(model.border(px(5, 10)), 0.0);
        assert_abs_diff_eq!(model.border(px(5, 5)), -0.02 * 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(model.border(px(1, 5)), model.border(px(9, 5)));
        assert!(model.border(px(3, 3)) > model.border(px(4, 4)));
    }

    #[test]
    fn local_energy_tracks_total_energy_changes() {
        let model = EnergyModel::new(&square_field(), &GreedyConfig::default());
        let points = vec![px(10, 10), px(12, 30), px(10, 50), px(30, 48), px(50, 50), px(30, 12)];
        let before = model.total(&points);
        for i in 0..points.len() {
            let base = model.local(&points, i, points[i]);
            for (dr, dc) in [(-1, 0), (1, 1), (0, -1)] {
                let candidate = model.neighbor(points[i], dr, dc);
                let mut moved = points.clone();
                moved[i] = candidate;
                assert_abs_diff_eq!(
                    model.total(&moved) - before,
                    model.local(&points, i, candidate) - base,
                    epsilon = 1e-9
                );
            }
        }
    }

    #[test]
    fn local_energy_tracks_total_for_three_points() {
        let config = GreedyConfig {
            alpha: 0.3,
            beta: 0.2,
            ..GreedyConfig::default()
        };
        let model = flat_model(20, 20, &config);
        let points = vec![px(5, 5), px(5, 12), px(14, 9)];
        let before = model.total(&points);
        let candidate = px(6, 6);
        let mut moved = points.clone();
        moved[0] = candidate;
        assert_abs_diff_eq!(
            model.total(&moved) - before,
            model.local(&points, 0, candidate) - model.local(&points, 0, points[0]),
            epsilon = 1e-12
        );
    }

    #[test]
    fn neighbor_is_clamped() {
        let model = flat_model(5, 4, &GreedyConfig::default());
        assert_eq!(model.neighbor(px(0, 0), -1, -1), px(0, 0));
        assert_eq!(model.neighbor(px(3, 4), 1, 1), px(3, 4));
        assert_eq!(model.neighbor(px(2, 2), 1, -1), px(3, 1));
    }

    #[test]
    fn relax_in_place_never_raises_energy() {
        let model = EnergyModel::new(&square_field(), &GreedyConfig::default());
        let contour = Contour::circle(Point::new(30.0, 30.0), 24.0, 16).unwrap();
        let mut points: Vec<PixelPoint> = contour
            .points()
            .iter()
            .map(|&p| PixelPoint::from_point(p, 60, 60))
            .collect();
        let mut energy = model.total(&points);
        for _ in 0..30 {
            relax_in_place(&mut points, &model);
            let next = model.total(&points);
            assert!(next <= energy + 1e-9, "{next} > {energy}");
            energy = next;
        }
    }

    #[test]
    fn input_points_are_rounded_and_clamped() {
        let field = ScalarField::from_gray(GrayImage::new(10, 8)).unwrap();
        let contour =
            Contour::from_axes(&[2.6, -3.0, 20.0], &[3.4, 4.5, 9.7]).unwrap();
        let snake = GreedySnake::new(&field, &contour, &GreedyConfig::default()).unwrap();
        assert_eq!(snake.points(), &[px(3, 3), px(0, 5), px(7, 9)]);
    }

    #[test]
    fn from_pixels_rejects_short_buffers() {
        let field = ScalarField::from_gray(GrayImage::new(10, 10)).unwrap();
        let err = GreedySnake::from_pixels(&field, vec![px(1, 1), px(2, 2)], &GreedyConfig::default())
            .unwrap_err();
        assert_eq!(err, SnakeError::InvalidInput(InputError::TooFewPoints(2)));
    }

    #[test]
    fn relax_returns_same_buffer_length() {
        let field = ScalarField::from_gray(GrayImage::new(20, 20)).unwrap();
        let pixels = vec![px(5, 5), px(5, 14), px(14, 14), px(14, 5)];
        let mut snake = GreedySnake::from_pixels(&field, pixels, &GreedyConfig::default()).unwrap();
        let termination = snake.relax();
        assert!(snake.passes() <= 100);
        assert_eq!(snake.termination(), Some(termination));
        assert_eq!(snake.into_pixels().len(), 4);
    }

    #[test]
    fn zero_pass_cap_returns_input() {
        let field = ScalarField::from_gray(GrayImage::new(20, 20)).unwrap();
        let config = GreedyConfig {
            max_num_iter: 0,
            ..GreedyConfig::default()
        };
        let contour = Contour::circle(Point::new(10.0, 10.0), 5.0, 6).unwrap();
        let outcome = GreedySnake::new(&field, &contour, &config).unwrap().run();
        assert_eq!(outcome.termination, Termination::MaxIterationsReached);
        assert_eq!(outcome.iterations, 0);
    }

    #[test]
    fn converged_snake_is_a_fixed_point() {
        let field = square_field();
        let config = GreedyConfig {
            max_num_iter: 500,
            ..GreedyConfig::default()
        };
        let contour = Contour::circle(Point::new(30.0, 30.0), 24.0, 16).unwrap();
        let mut snake = GreedySnake::new(&field, &contour, &config).unwrap();
        if snake.relax() == Termination::Converged {
            let mut points = snake.points().to_vec();
            assert_eq!(relax_in_place(&mut points, snake.model()), 0);
            assert_eq!(points, snake.points());
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = GreedyConfig {
            border_weight: -1.0,
            ..GreedyConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(GreedyConfig::default().validate().is_ok());
    }

    #[test]
    fn greedy_metrics_report_energy_drop() {
        let contour = Contour::circle(Point::new(30.0, 30.0), 24.0, 16).unwrap();
        let outcome = GreedySnake::new(&square_field(), &contour, &GreedyConfig::default())
            .unwrap()
            .run();
        assert!(matches!(
            outcome.diagnostics.metrics,
            SolverMetrics::Greedy {
                initial_energy,
                final_energy,
                ..
            } if final_energy < initial_energy
        ));
    }
}
