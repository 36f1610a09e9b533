//! Solver selection: the [`ContourSolver`] trait and the [`SolverKind`]
//! enum that dispatches to either snake.
//!
//! # Strategy pattern
//!
//! The continuous and greedy snakes consume the same inputs (an image
//! field and an initial closed contour) and produce the same kind of
//! output, but trade off differently: the continuous solver gives
//! sub-pixel accuracy and is sensitive to `gamma`, the greedy solver is
//! integer-only and robust. Callers pick one at runtime through
//! [`SolverKind`] while both implementations stay behind one trait.

use serde::{Deserialize, Serialize};

use crate::continuous::{ContinuousConfig, ContinuousSnake};
use crate::diagnostics::SolveDiagnostics;
use crate::field::ScalarField;
use crate::greedy::{GreedyConfig, GreedySnake};
use crate::types::{Contour, SnakeError};

/// Why a solve stopped.
///
/// Neither variant is an error: hitting the iteration cap still yields a
/// usable contour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// The convergence criterion was met.
    Converged,
    /// The iteration cap was reached first.
    MaxIterationsReached,
}

impl Termination {
    /// Returns `true` for [`Termination::Converged`].
    #[must_use]
    pub const fn is_converged(self) -> bool {
        matches!(self, Self::Converged)
    }
}

/// The result of a single solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveOutcome {
    /// Final contour, same length and ordering as the input.
    pub contour: Contour,
    /// Why the solver stopped.
    pub termination: Termination,
    /// Iterations (continuous) or passes (greedy) performed.
    pub iterations: usize,
    /// Timing and solver metrics.
    pub diagnostics: SolveDiagnostics,
}

/// Trait for active-contour solvers.
///
/// Input: a read-only image field and an initial closed contour.
/// Output: a refined contour with the same number of points.
pub trait ContourSolver {
    /// Refine `contour` against `field`.
    ///
    /// # Errors
    ///
    /// Returns [`SnakeError::InvalidInput`] for a rejected contour or
    /// configuration and [`SnakeError::Numerical`] if the solver's linear
    /// system cannot be inverted.
    fn solve(&self, field: &ScalarField, contour: &Contour) -> Result<SolveOutcome, SnakeError>;
}

/// Selects which solver to run, carrying its configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SolverKind {
    /// Semi-implicit gradient descent with sub-pixel positions.
    Continuous(ContinuousConfig),
    /// Discrete local search over 8-connected pixel moves.
    Greedy(GreedyConfig),
}

impl Default for SolverKind {
    fn default() -> Self {
        Self::Continuous(ContinuousConfig::default())
    }
}

impl SolverKind {
    /// Short name for logs and reports.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Continuous(_) => "continuous",
            Self::Greedy(_) => "greedy",
        }
    }
}

impl ContourSolver for ContinuousConfig {
    fn solve(&self, field: &ScalarField, contour: &Contour) -> Result<SolveOutcome, SnakeError> {
        Ok(ContinuousSnake::new(field, contour, self)?.run())
    }
}

impl ContourSolver for GreedyConfig {
    fn solve(&self, field: &ScalarField, contour: &Contour) -> Result<SolveOutcome, SnakeError> {
        Ok(GreedySnake::new(field, contour, self)?.run())
    }
}

impl ContourSolver for SolverKind {
    fn solve(&self, field: &ScalarField, contour: &Contour) -> Result<SolveOutcome, SnakeError> {
        let _span = tracing::debug_span!("solve", solver = self.name(), points = contour.len())
            .entered();
        match self {
            Self::Continuous(config) => config.solve(field, contour),
            Self::Greedy(config) => config.solve(field, contour),
        }
    }
}
