//! Roughness penalty for the truncated power basis.
//!
//! `A[i][j]` integrates `b_i''(t) b_j''(t)` from a lower bound `L(i, j)` up to
//! the right end of the domain. Two polynomial terms use the full domain; any
//! pair involving a truncated term starts at `knots[max(i, j) - 4]`, the
//! later of the two knots, which is where the untruncated second derivative
//! of that term becomes valid.

use crate::basis::{BasisTerm, NUM_POLYNOMIAL_TERMS, TruncatedPowerBasis};
use crate::quadrature::{CheckedQuadrature, QuadratureError};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PenaltyError {
    #[error("Numerical integration failed for penalty entry ({row}, {col}): {source}")]
    NumericalFailure {
        row: usize,
        col: usize,
        #[source]
        source: QuadratureError,
    },

    #[error("Failed to build quadrature rule: {0}")]
    Quadrature(#[from] QuadratureError),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
}

/// Lower integration bound for entry `(i, j)`.
pub fn lower_bound(basis: &TruncatedPowerBasis, i: usize, j: usize) -> f64 {
    if i < NUM_POLYNOMIAL_TERMS && j < NUM_POLYNOMIAL_TERMS {
        basis.domain().0
    } else {
        basis.knots()[i.max(j) - NUM_POLYNOMIAL_TERMS]
    }
}

fn penalty_entry(
    basis: &TruncatedPowerBasis,
    quadrature: &CheckedQuadrature,
    i: usize,
    j: usize,
) -> Result<f64, PenaltyError> {
    let terms = basis.terms();
    let (a, b): (BasisTerm, BasisTerm) = (terms[i], terms[j]);
    let lower = lower_bound(basis, i, j);
    let width = basis.domain().1 - lower;
    // Integrate over [0, width] in coordinates local to `lower`.
    quadrature
        .integrate(
            |u| a.second_derivative_from(lower, u) * b.second_derivative_from(lower, u),
            0.0,
            width,
        )
        .map_err(|source| PenaltyError::NumericalFailure {
            row: i,
            col: j,
            source,
        })
}

fn penalty_row(
    basis: &TruncatedPowerBasis,
    quadrature: &CheckedQuadrature,
    i: usize,
) -> Result<Vec<f64>, PenaltyError> {
    (i..basis.dim())
        .map(|j| penalty_entry(basis, quadrature, i, j))
        .collect()
}

/// Build the `B x B` roughness matrix.
///
/// Only the upper triangle is integrated; the lower triangle is a copy, so
/// the result is exactly symmetric. With `parallel` set, rows are integrated
/// on the rayon pool.
pub fn build_penalty_matrix(
    basis: &TruncatedPowerBasis,
    quadrature_tol: f64,
    parallel: bool,
) -> Result<Array2<f64>, PenaltyError> {
    let quadrature = CheckedQuadrature::new(quadrature_tol)?;
    let dim = basis.dim();

    let rows: Vec<Vec<f64>> = if parallel {
        (0..dim)
            .into_par_iter()
            .map(|i| penalty_row(basis, &quadrature, i))
            .collect::<Result<_, _>>()?
    } else {
        (0..dim)
            .map(|i| penalty_row(basis, &quadrature, i))
            .collect::<Result<_, _>>()?
    };

    let mut penalty = Array2::<f64>::zeros((dim, dim));
    for (i, row) in rows.iter().enumerate() {
        for (offset, &value) in row.iter().enumerate() {
            let j = i + offset;
            penalty[[i, j]] = value;
            penalty[[j, i]] = value;
        }
    }

    log::debug!(
        "built {}x{} roughness penalty over [{}, {}]",
        dim,
        dim,
        basis.domain().0,
        basis.domain().1
    );
    Ok(penalty)
}

/// `theta' A theta`, the integrated squared second derivative of the curve.
pub fn penalty_quadratic_form(
    penalty: ArrayView2<'_, f64>,
    theta: ArrayView1<'_, f64>,
) -> Result<f64, PenaltyError> {
    let (rows, cols) = penalty.dim();
    if rows != cols || rows != theta.len() {
        return Err(PenaltyError::DimensionMismatch(format!(
            "penalty is {rows}x{cols} but coefficient vector has length {}",
            theta.len()
        )));
    }
    let a_theta: Array1<f64> = penalty.dot(&theta);
    Ok(theta.dot(&a_theta))
}
