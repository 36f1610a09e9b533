//! Continuous (semi-implicit) active contour.
//!
//! Each iteration solves the smoothness system once per axis and moves
//! every point by a `tanh`-limited step:
//!
//! ```text
//! target = (A + γI)⁻¹ · (γ·position + ∇F(position))
//! position += max_px_move · tanh(target − position)
//! ```
//!
//! where `F` is the external field ([`ScalarField::external_field`]) and
//! the gradient comes from its bi-quadratic interpolant. The `tanh` keeps
//! every per-axis step below `max_px_move` however steep the field is.
//!
//! # State machine
//!
//! [`ContinuousSnake::new`] is the initializing phase: it validates input,
//! derives the field, builds and inverts the system and fits the
//! interpolant. Nothing is mutated if any of that fails. Each
//! [`ContinuousSnake::step`] performs one iteration until a terminal
//! [`Termination`] is reached.
//!
//! # Convergence
//!
//! A window of the last `convergence_order` (K) snapshots is kept. Every
//! (K+1)-th iteration the current positions are compared to each snapshot
//! with `max_i(|Δx_i| + |Δy_i|)`; if the minimum over snapshots is below
//! `convergence_threshold` the snake has converged. Comparing against
//! several snapshots also catches small oscillations.
//!
//! [`Termination::Converged`] therefore does not always mean the contour
//! came to rest. When every step is near `max_px_move` the snake can
//! alternate between two positions, and a snapshot from the same phase
//! matches. The returned contour is then one of the two.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use web_time::Instant;

use crate::diagnostics::{SolveDiagnostics, SolverMetrics};
use crate::field::{EdgeWeights, ScalarField};
use crate::interpolate::FieldInterpolator;
use crate::matrix::{InverseSystemMatrix, SmoothnessMatrix};
use crate::solver::{SolveOutcome, Termination};
use crate::types::{Contour, InputError, Point, SnakeError};

/// Parameters of the continuous snake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuousConfig {
    /// Elasticity weight (first-derivative penalty).
    pub alpha: f64,
    /// Rigidity weight (second-derivative penalty).
    pub beta: f64,
    /// Attraction to intensity; negative values prefer dark regions.
    pub w_line: f64,
    /// Attraction to edges.
    pub w_edge: f64,
    /// Step-size regularization. Larger values move points more slowly.
    pub gamma: f64,
    /// Upper bound on per-axis movement per iteration, in pixels.
    pub max_px_move: f64,
    /// Iteration cap.
    pub max_num_iter: usize,
    /// Window distance below which the snake counts as converged.
    pub convergence_threshold: f64,
    /// Number of snapshots kept for the convergence check.
    pub convergence_order: usize,
}

impl Default for ContinuousConfig {
    fn default() -> Self {
        Self {
            alpha: 0.01,
            beta: 0.01,
            w_line: 0.0,
            w_edge: 1.0,
            gamma: 0.001,
            max_px_move: 0.5,
            max_num_iter: 20_000,
            convergence_threshold: 0.1,
            convergence_order: 10,
        }
    }
}

impl ContinuousConfig {
    /// Check every parameter against its allowed range.
    ///
    /// `gamma = 0` is accepted here. Whether the system is then invertible
    /// is decided by [`SmoothnessMatrix::invert`].
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InvalidConfig`] naming the first offending
    /// parameter.
    pub fn validate(&self) -> Result<(), SnakeError> {
        let checks = [
            ("alpha", self.alpha.is_finite() && self.alpha >= 0.0),
            ("beta", self.beta.is_finite() && self.beta >= 0.0),
            ("w_line", self.w_line.is_finite()),
            ("w_edge", self.w_edge.is_finite()),
            ("gamma", self.gamma.is_finite() && self.gamma >= 0.0),
            (
                "max_px_move",
                self.max_px_move.is_finite() && self.max_px_move > 0.0,
            ),
            (
                "convergence_threshold",
                self.convergence_threshold.is_finite() && self.convergence_threshold >= 0.0,
            ),
            ("convergence_order", self.convergence_order >= 1),
        ];
        match checks.iter().find(|(_, ok)| !ok) {
            Some((name, _)) => {
                Err(InputError::InvalidConfig(format!("{name} is out of range")).into())
            }
            None => Ok(()),
        }
    }

    /// Field weights derived from this config.
    #[must_use]
    pub const fn edge_weights(&self) -> EdgeWeights {
        EdgeWeights {
            w_line: self.w_line,
            w_edge: self.w_edge,
        }
    }
}

/// Rolling window of recent positions.
#[derive(Debug, Clone)]
struct ConvergenceWindow {
    order: usize,
    xs: Vec<DVector<f64>>,
    ys: Vec<DVector<f64>>,
}

impl ConvergenceWindow {
    fn new(order: usize, n: usize) -> Self {
        Self {
            order,
            xs: vec![DVector::zeros(n); order],
            ys: vec![DVector::zeros(n); order],
        }
    }

    /// Record the positions after iteration `i`.
    ///
    /// Returns the window distance on every (K+1)-th iteration, `None`
    /// otherwise.
    fn record(&mut self, i: usize, x: &DVector<f64>, y: &DVector<f64>) -> Option<f64> {
        let slot = i % (self.order + 1);
        if slot < self.order {
            self.xs[slot].copy_from(x);
            self.ys[slot].copy_from(y);
            return None;
        }
        self.xs
            .iter()
            .zip(&self.ys)
            .map(|(sx, sy)| {
                x.iter()
                    .zip(y.iter())
                    .zip(sx.iter().zip(sy.iter()))
                    .map(|((&cx, &cy), (&px, &py))| (cx - px).abs() + (cy - py).abs())
                    .fold(0.0, f64::max)
            })
            .reduce(f64::min)
    }
}

/// An in-progress continuous solve.
///
/// Owns its inverse matrix, interpolant and position buffers. The
/// originating [`ScalarField`] is only borrowed during construction.
#[derive(Debug, Clone)]
pub struct ContinuousSnake {
    config: ContinuousConfig,
    inverse: InverseSystemMatrix,
    interpolator: FieldInterpolator,
    max_row: f64,
    max_col: f64,
    /// Column coordinates.
    x: DVector<f64>,
    /// Row coordinates.
    y: DVector<f64>,
    window: ConvergenceWindow,
    iteration: usize,
    last_step: f64,
    window_distance: Option<f64>,
    termination: Option<Termination>,
    started: Instant,
    setup_duration: std::time::Duration,
}

impl ContinuousSnake {
    /// Validate inputs and prepare everything the iterations reuse.
    ///
    /// # Errors
    ///
    /// Returns [`SnakeError::InvalidInput`] for a bad contour or config and
    /// [`SnakeError::Numerical`] if `A + γI` cannot be inverted.
    pub fn new(
        field: &ScalarField,
        contour: &Contour,
        config: &ContinuousConfig,
    ) -> Result<Self, SnakeError> {
        let started = Instant::now();
        config.validate()?;
        contour.validate()?;

        let n = contour.len();
        let dims = field.dimensions();
        debug!(
            points = n,
            width = dims.width,
            height = dims.height,
            "continuous snake initializing"
        );

        let inverse = SmoothnessMatrix::build(n, config.alpha, config.beta)?.invert(config.gamma)?;
        let interpolator = FieldInterpolator::new(&field.external_field(config.edge_weights()));

        let max_row = f64::from(dims.height - 1);
        let max_col = f64::from(dims.width - 1);
        let x = DVector::from_iterator(n, contour.points().iter().map(|p| p.col.clamp(0.0, max_col)));
        let y = DVector::from_iterator(n, contour.points().iter().map(|p| p.row.clamp(0.0, max_row)));

        Ok(Self {
            window: ConvergenceWindow::new(config.convergence_order, n),
            config: config.clone(),
            inverse,
            interpolator,
            max_row,
            max_col,
            x,
            y,
            iteration: 0,
            last_step: 0.0,
            window_distance: None,
            termination: None,
            started,
            setup_duration: started.elapsed(),
        })
    }

    /// Iterations performed so far.
    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.iteration
    }

    /// The terminal state, once reached.
    #[must_use]
    pub const fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Current positions as a contour.
    #[must_use]
    pub fn contour(&self) -> Contour {
        Contour::from_trusted(
            self.y
                .iter()
                .zip(self.x.iter())
                .map(|(&row, &col)| Point::new(row, col))
                .collect(),
        )
    }

    /// Perform one iteration.
    ///
    /// Returns the terminal state once reached; further calls are no-ops
    /// that return the same state.
    pub fn step(&mut self) -> Option<Termination> {
        if self.termination.is_some() {
            return self.termination;
        }
        if self.iteration >= self.config.max_num_iter {
            return self.finish(Termination::MaxIterationsReached);
        }

        let n = self.x.len();
        let mut fx = DVector::zeros(n);
        let mut fy = DVector::zeros(n);
        for i in 0..n {
            fx[i] = self.interpolator.gradient_x(self.y[i], self.x[i]);
            fy[i] = self.interpolator.gradient_y(self.y[i], self.x[i]);
        }

        let gamma = self.inverse.gamma();
        let target_x = self.inverse.apply(&(&self.x * gamma + fx));
        let target_y = self.inverse.apply(&(&self.y * gamma + fy));

        let limit = self.config.max_px_move;
        let dx = (target_x - &self.x).map(|d| limit * d.tanh());
        let dy = (target_y - &self.y).map(|d| limit * d.tanh());

        self.last_step = dx
            .iter()
            .zip(dy.iter())
            .map(|(a, b)| a.abs() + b.abs())
            .fold(0.0, f64::max);
        self.x += dx;
        self.y += dy;
        let (max_row, max_col) = (self.max_row, self.max_col);
        self.x.apply(|v| *v = v.clamp(0.0, max_col));
        self.y.apply(|v| *v = v.clamp(0.0, max_row));

        let i = self.iteration;
        self.iteration += 1;

        if let Some(distance) = self.window.record(i, &self.x, &self.y) {
            trace!(iteration = self.iteration, distance, "convergence check");
            self.window_distance = Some(distance);
            if distance < self.config.convergence_threshold {
                return self.finish(Termination::Converged);
            }
        }
        if self.iteration >= self.config.max_num_iter {
            return self.finish(Termination::MaxIterationsReached);
        }
        None
    }

    /// Iterate to a terminal state and package the result.
    #[must_use]
    pub fn run(mut self) -> SolveOutcome {
        let termination = loop {
            if let Some(t) = self.step() {
                break t;
            }
        };
        SolveOutcome {
            contour: self.contour(),
            termination,
            iterations: self.iteration,
            diagnostics: SolveDiagnostics {
                setup_duration: self.setup_duration,
                total_duration: self.started.elapsed(),
                point_count: self.x.len(),
                metrics: SolverMetrics::Continuous {
                    last_step: self.last_step,
                    window_distance: self.window_distance,
                },
            },
        }
    }

    fn finish(&mut self, termination: Termination) -> Option<Termination> {
        debug!(
            ?termination,
            iterations = self.iteration,
            last_step = self.last_step,
            "continuous snake finished"
        );
        self.termination = Some(termination);
        self.termination
    }
}
