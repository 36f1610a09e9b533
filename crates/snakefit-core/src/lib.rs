//! snakefit-core: active-contour ("snake") boundary fitting (sans-IO).
//!
//! Refines an initial closed contour so it settles onto object
//! boundaries in an image, then summarizes the result as a Freeman chain
//! code with a coarse area/perimeter measure:
//!
//! image -> scalar field -> solver (continuous or greedy) -> chain code
//!
//! Two solvers share one [`ContourSolver`] contract:
//!
//! - [`continuous`]: semi-implicit gradient descent on a bi-quadratic
//!   interpolant of the edge field, with sub-pixel positions.
//! - [`greedy`]: integer-pixel local search over 8-connected moves.
//!
//! This crate has **no I/O dependencies** -- it operates on decoded
//! rasters and returns structured data. Nothing here installs a
//! `tracing` subscriber.

pub mod chain;
pub mod continuous;
pub mod diagnostics;
pub mod edge;
pub mod field;
pub mod greedy;
pub mod interpolate;
pub mod matrix;
pub mod solver;
pub mod types;

pub use chain::{AreaPerimeter, ChainCode, ContourAnalysis, Direction, analyze};
pub use continuous::ContinuousConfig;
pub use diagnostics::SolveDiagnostics;
pub use field::{EdgeWeights, ScalarField};
pub use greedy::{GreedyConfig, PixelPoint};
pub use solver::{ContourSolver, SolveOutcome, SolverKind, Termination};
pub use types::{
    Contour, Dimensions, InputError, NumericalError, Point, SegmentResult, SnakeError,
};

/// Fit a contour to a decoded image and analyze the result.
///
/// # Steps
///
/// 1. Build the [`ScalarField`] (grayscale or RGB kept as-is)
/// 2. Run the selected solver
/// 3. Chain-code the final contour and measure it
///
/// # Errors
///
/// Returns [`InputError::EmptyImage`] for a zero-size image, any other
/// [`SnakeError::InvalidInput`] for a rejected contour or configuration,
/// and [`SnakeError::Numerical`] if the continuous solver's system cannot
/// be inverted.
pub fn segment(
    image: &image::DynamicImage,
    contour: &Contour,
    solver: &SolverKind,
) -> Result<SegmentResult, SnakeError> {
    let field = ScalarField::from_dynamic(image)?;
    segment_field(&field, contour, solver)
}

/// Like [`segment`], for a field that is already built.
///
/// Reusing one field across many contours avoids re-deriving it.
///
/// # Errors
///
/// Same as [`segment`], minus the image check.
pub fn segment_field(
    field: &ScalarField,
    contour: &Contour,
    solver: &SolverKind,
) -> Result<SegmentResult, SnakeError> {
    let dimensions = field.dimensions();
    let outcome = solver.solve(field, contour)?;
    let analysis = analyze(&outcome.contour);
    tracing::debug!(
        solver = solver.name(),
        termination = ?outcome.termination,
        iterations = outcome.iterations,
        chain_len = analysis.chain_code.len(),
        "segment complete"
    );
    Ok(SegmentResult {
        outcome,
        analysis,
        dimensions,
    })
}
