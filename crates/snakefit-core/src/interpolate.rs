//! Bi-quadratic spline interpolation of a [`FloatPlane`].
//!
//! The continuous snake samples the external field's gradient at
//! real-valued positions. This module fits a tensor-product quadratic
//! B-spline that passes exactly through every pixel sample (no smoothing)
//! and is continuously differentiable everywhere, so the partial
//! derivatives are well defined between pixel centers.
//!
//! # Construction
//!
//! With the centered quadratic B-spline `B` (`B(0) = 3/4`, `B(±1) = 1/8`)
//! and one coefficient per node, interpolation at node `j` reads
//!
//! ```text
//! f[j] = c[j-1]/8 + 3·c[j]/4 + c[j+1]/8
//! ```
//!
//! Coefficients outside the grid are linearly extrapolated
//! (`c[-1] = 2c[0] − c[1]`), which pins `c[0] = f[0]` and `c[n-1] = f[n-1]`
//! and leaves a strictly diagonally dominant tridiagonal system for the
//! interior. The 2D fit solves that system along every row, then along
//! every column. Linear fields are reproduced exactly.

use crate::field::FloatPlane;

/// A continuously differentiable surface over a [`FloatPlane`].
///
/// Coordinates are `(row, col)` in pixel units. Queries are only
/// meaningful inside `[0, height − 1] × [0, width − 1]`; callers clamp
/// before sampling.
#[derive(Debug, Clone)]
pub struct FieldInterpolator {
    width: usize,
    height: usize,
    /// Row-major spline coefficients.
    coefficients: Vec<f64>,
}

impl FieldInterpolator {
    /// Fit the interpolant to every sample of `plane`.
    #[must_use]
    pub fn new(plane: &FloatPlane) -> Self {
        let width = plane.width() as usize;
        let height = plane.height() as usize;
        let mut coefficients = plane.data().to_vec();

        let mut line = Vec::with_capacity(width.max(height));
        for row in 0..height {
            line.clear();
            line.extend_from_slice(&coefficients[row * width..(row + 1) * width]);
            prefilter(&mut line);
            coefficients[row * width..(row + 1) * width].copy_from_slice(&line);
        }
        for col in 0..width {
            line.clear();
            line.extend((0..height).map(|row| coefficients[row * width + col]));
            prefilter(&mut line);
            for (row, &c) in line.iter().enumerate() {
                coefficients[row * width + col] = c;
            }
        }

        Self {
            width,
            height,
            coefficients,
        }
    }

    /// Width of the fitted grid.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Height of the fitted grid.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Interpolated value at `(row, col)`.
    #[must_use]
    pub fn value(&self, row: f64, col: f64) -> f64 {
        self.evaluate(row, col, basis, basis)
    }

    /// Partial derivative along columns (`∂f/∂col`, the x direction).
    #[must_use]
    pub fn gradient_x(&self, row: f64, col: f64) -> f64 {
        self.evaluate(row, col, basis, basis_derivative)
    }

    /// Partial derivative along rows (`∂f/∂row`, the y direction).
    #[must_use]
    pub fn gradient_y(&self, row: f64, col: f64) -> f64 {
        self.evaluate(row, col, basis_derivative, basis)
    }

    fn evaluate(
        &self,
        row: f64,
        col: f64,
        row_basis: fn(f64) -> f64,
        col_basis: fn(f64) -> f64,
    ) -> f64 {
        let row_taps = taps(row, row_basis);
        let col_taps = taps(col, col_basis);

        let mut acc = 0.0;
        for &(r_node, r_weight) in &row_taps {
            let mut line = 0.0;
            for &(c_node, c_weight) in &col_taps {
                line += c_weight * self.coefficient(r_node, c_node);
            }
            acc += r_weight * line;
        }
        acc
    }

    /// Coefficient at a node that may lie one step outside the grid.
    fn coefficient(&self, row: isize, col: isize) -> f64 {
        let mut acc = 0.0;
        for (r, wr) in extend(row, self.height) {
            for (c, wc) in extend(col, self.width) {
                acc += wr * wc * self.coefficients[r * self.width + c];
            }
        }
        acc
    }
}

/// Centered quadratic B-spline.
fn basis(u: f64) -> f64 {
    let a = u.abs();
    if a <= 0.5 {
        0.75 - a * a
    } else if a < 1.5 {
        let t = a - 1.5;
        0.5 * t * t
    } else {
        0.0
    }
}

/// Derivative of [`basis`].
fn basis_derivative(u: f64) -> f64 {
    let a = u.abs();
    if a <= 0.5 {
        -2.0 * u
    } else if a < 1.5 {
        (a - 1.5) * u.signum()
    } else {
        0.0
    }
}

/// The three nodes whose basis functions overlap `t`, with weights.
#[allow(clippy::cast_possible_truncation)]
fn taps(t: f64, kernel: fn(f64) -> f64) -> [(isize, f64); 3] {
    let center = (t + 0.5).floor() as isize;
    std::array::from_fn(|k| {
        let node = center - 1 + k.cast_signed();
        #[allow(clippy::cast_precision_loss)]
        let weight = kernel(t - node as f64);
        (node, weight)
    })
}

/// Express node `k` (in `-1..=n`) as a combination of in-grid nodes.
///
/// Out-of-range nodes are linearly extrapolated from the two nearest
/// in-grid nodes; a single-node axis is constant.
fn extend(k: isize, n: usize) -> [(usize, f64); 2] {
    let last = n - 1;
    match usize::try_from(k) {
        Err(_) if n >= 2 => [(0, 2.0), (1, -1.0)],
        Err(_) => [(0, 1.0), (0, 0.0)],
        Ok(k) if k <= last => [(k, 1.0), (k, 0.0)],
        Ok(_) if n >= 2 => [(last, 2.0), (last - 1, -1.0)],
        Ok(_) => [(last, 1.0), (last, 0.0)],
    }
}

/// Basis weight of a node on itself.
const DIAG: f64 = 0.75;
/// Basis weight of a node on its immediate neighbors.
const OFF: f64 = 0.125;

/// Replace samples with spline coefficients in place.
///
/// Solves `c[j-1]/8 + 3c[j]/4 + c[j+1]/8 = f[j]` for the interior with
/// `c[0] = f[0]` and `c[n-1] = f[n-1]` using the Thomas algorithm.
fn prefilter(line: &mut [f64]) {
    let n = line.len();
    if n < 3 {
        return;
    }

    let interior = n - 2;
    let mut rhs: Vec<f64> = line[1..n - 1].to_vec();
    rhs[0] -= OFF * line[0];
    rhs[interior - 1] -= OFF * line[n - 1];

    // Forward sweep.
    let mut upper = vec![0.0; interior];
    let mut denom = DIAG;
    upper[0] = OFF / denom;
    rhs[0] /= denom;
    for j in 1..interior {
        denom = OFF.mul_add(-upper[j - 1], DIAG);
        upper[j] = OFF / denom;
        rhs[j] = OFF.mul_add(-rhs[j - 1], rhs[j]) / denom;
    }

    // Back substitution.
    for j in (0..interior - 1).rev() {
        rhs[j] -= upper[j] * rhs[j + 1];
    }

    line[1..n - 1].copy_from_slice(&rhs);
}
