//! Smoothness system for the continuous snake.
//!
//! The internal energy of a closed contour with `n` points is encoded as
//! the circulant matrix
//!
//! ```text
//! A = −α·D₂ + β·D₄
//! ```
//!
//! where `D₂` is the periodic second-difference operator (−2 on the
//! diagonal, 1 on the circular ±1 neighbors) and `D₄` the periodic
//! fourth-difference operator (6, −4 on ±1, 1 on ±2). Neighbors are found
//! by index arithmetic mod `n`, not by physical spacing, so the model
//! assumes roughly uniform point spacing along the contour.
//!
//! [`SmoothnessMatrix::build`] produces `A`; [`SmoothnessMatrix::invert`]
//! produces `(A + γI)⁻¹`. Both depend only on `n`, `α`, `β` and `γ`, so a
//! solve builds them once and reuses them for every iteration.

use nalgebra::{DMatrix, DVector};

use crate::types::{InputError, NumericalError, SnakeError};

/// Largest tolerated deviation of `(A + γI)·inv` from the identity.
pub const INVERSE_RESIDUAL_TOLERANCE: f64 = 1e-6;

/// Diagonal offsets and weights of `D₂`.
const SECOND_DIFFERENCE: [(isize, f64); 3] = [(-1, 1.0), (0, -2.0), (1, 1.0)];

/// Diagonal offsets and weights of `D₄`.
const FOURTH_DIFFERENCE: [(isize, f64); 5] =
    [(-2, 1.0), (-1, -4.0), (0, 6.0), (1, -4.0), (2, 1.0)];

/// The internal-energy matrix `A` for one contour length.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothnessMatrix {
    matrix: DMatrix<f64>,
}

impl SmoothnessMatrix {
    /// Build `A = −α·D₂ + β·D₄` for a closed contour of `n` points.
    ///
    /// Stencil taps that wrap onto the same column (possible for `n < 5`)
    /// accumulate.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::TooFewPoints`] if `n < 3` and
    /// [`InputError::InvalidConfig`] if `alpha` or `beta` is not finite.
    pub fn build(n: usize, alpha: f64, beta: f64) -> Result<Self, SnakeError> {
        if n < crate::types::MIN_CONTOUR_POINTS {
            return Err(InputError::TooFewPoints(n).into());
        }
        if !alpha.is_finite() || !beta.is_finite() {
            return Err(InputError::InvalidConfig(format!(
                "smoothness weights must be finite (alpha = {alpha}, beta = {beta})"
            ))
            .into());
        }

        let mut matrix = DMatrix::<f64>::zeros(n, n);
        for i in 0..n {
            for &(offset, weight) in &SECOND_DIFFERENCE {
                matrix[(i, wrap(i, offset, n))] += -alpha * weight;
            }
            for &(offset, weight) in &FOURTH_DIFFERENCE {
                matrix[(i, wrap(i, offset, n))] += beta * weight;
            }
        }
        Ok(Self { matrix })
    }

    /// Contour length this matrix was built for.
    #[must_use]
    pub fn len(&self) -> usize {
        self.matrix.nrows()
    }

    /// Always `false`: matrices are built for at least three points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }

    /// Entry `A[i][j]`.
    ///
    /// # Panics
    ///
    /// Panics if `i` or `j` is out of range.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.matrix[(i, j)]
    }

    /// Borrow the dense matrix.
    #[must_use]
    pub const fn as_matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Compute `(A + γI)⁻¹`.
    ///
    /// # Errors
    ///
    /// Returns [`NumericalError::SingularSystem`] if LU decomposition finds
    /// a zero pivot, and [`NumericalError::IllConditioned`] if the result
    /// contains non-finite entries or `(A + γI)·inv` deviates from the
    /// identity by more than [`INVERSE_RESIDUAL_TOLERANCE`].
    pub fn invert(&self, gamma: f64) -> Result<InverseSystemMatrix, SnakeError> {
        let n = self.len();
        let system = &self.matrix + DMatrix::<f64>::identity(n, n) * gamma;
        let inverse = system
            .clone()
            .try_inverse()
            .ok_or(NumericalError::SingularSystem { n, gamma })?;

        let residual = if inverse.iter().all(|v| v.is_finite()) {
            (&system * &inverse - DMatrix::<f64>::identity(n, n)).amax()
        } else {
            f64::INFINITY
        };
        if residual > INVERSE_RESIDUAL_TOLERANCE {
            tracing::warn!(n, gamma, residual, "system inverse failed residual check");
            return Err(NumericalError::IllConditioned { n, gamma, residual }.into());
        }

        Ok(InverseSystemMatrix { inverse, gamma })
    }
}

/// `(A + γI)⁻¹`, computed once per solve.
#[derive(Debug, Clone, PartialEq)]
pub struct InverseSystemMatrix {
    inverse: DMatrix<f64>,
    gamma: f64,
}

impl InverseSystemMatrix {
    /// Contour length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inverse.nrows()
    }

    /// Always `false`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inverse.is_empty()
    }

    /// The `γ` this inverse was computed with.
    #[must_use]
    pub const fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Borrow the dense inverse.
    #[must_use]
    pub const fn as_matrix(&self) -> &DMatrix<f64> {
        &self.inverse
    }

    /// Matrix-vector product `inv · v`.
    #[must_use]
    pub fn apply(&self, v: &DVector<f64>) -> DVector<f64> {
        &self.inverse * v
    }
}

/// `(i + offset) mod n` for a possibly negative offset.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
const fn wrap(i: usize, offset: isize, n: usize) -> usize {
    (i as isize + offset).rem_euclid(n as isize) as usize
}
