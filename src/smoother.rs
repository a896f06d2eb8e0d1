//! Penalized least-squares cubic smoothing spline.
//!
//! Given design points `x`, observations `y` and a weight `alpha`, the fit
//! minimizes `|y - Phi^T theta|^2 + alpha * theta^T A theta`, where `Phi` is
//! the truncated power basis at `x` and `A` the roughness penalty. The normal
//! equations `M theta = Phi y` with `M = Phi Phi^T + alpha A` are solved
//! through the Moore-Penrose pseudo-inverse, since `M` is singular for every
//! knot sequence: the truncated cubic anchored at `x_min` coincides with `x^3`
//! on the domain.
//!
//! The smoother matrix `S = M^+ Phi` is kept, so refitting the same design to
//! new observations only costs one matrix-vector product.

use crate::basis::{BasisError, TruncatedPowerBasis};
use crate::faer_ndarray::{FaerLinalgError, fast_ab, fast_ata, pinv};
use crate::penalty::{PenaltyError, build_penalty_matrix, penalty_quadratic_form};
use crate::types::SplineOptions;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SplineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Basis(#[from] BasisError),

    #[error(transparent)]
    Penalty(#[from] PenaltyError),

    #[error("Pseudo-inverse of the smoother system failed: {0}")]
    Linalg(#[from] FaerLinalgError),
}

impl SplineError {
    /// True for errors caused by the caller's arguments rather than numerics.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, SplineError::InvalidInput(_) | SplineError::Basis(_))
    }
}

/// A fitted smoothing spline. Immutable once constructed.
#[derive(Clone, Debug)]
pub struct SmoothingSpline {
    basis: TruncatedPowerBasis,
    alpha: f64,
    x: Array1<f64>,
    y: Array1<f64>,
    /// `Phi`, `B x N`.
    design: Arc<Array2<f64>>,
    /// `A`, `B x B`.
    penalty: Arc<Array2<f64>>,
    /// `S = M^+ Phi`, `B x N`.
    smoother: Arc<Array2<f64>>,
    theta: Array1<f64>,
    rank: usize,
}

impl SmoothingSpline {
    /// Fit with the given penalty weight and default numerical options.
    pub fn new(
        knots: ArrayView1<'_, f64>,
        x: ArrayView1<'_, f64>,
        y: ArrayView1<'_, f64>,
        alpha: f64,
    ) -> Result<Self, SplineError> {
        Self::with_options(knots, x, y, &SplineOptions::with_alpha(alpha))
    }

    pub fn with_options(
        knots: ArrayView1<'_, f64>,
        x: ArrayView1<'_, f64>,
        y: ArrayView1<'_, f64>,
        options: &SplineOptions,
    ) -> Result<Self, SplineError> {
        validate_options(options)?;
        if x.len() != y.len() {
            return Err(SplineError::InvalidInput(format!(
                "design points and observations must have equal length, got {} and {}",
                x.len(),
                y.len()
            )));
        }
        check_finite(y, "observation")?;

        let basis = TruncatedPowerBasis::new(knots)?;
        let dim = basis.dim();
        let n = x.len();
        if n < dim {
            log::warn!(
                "only {} design points for {} basis functions; the fit is the minimum-norm solution",
                n,
                dim
            );
        }

        let design = basis.basis(x)?;
        let penalty =
            build_penalty_matrix(&basis, options.quadrature_tol, options.parallel_penalty)?;

        // M = Phi Phi^T + alpha A
        let mut system = fast_ata(&design.t());
        system.scaled_add(options.alpha, &penalty);
        symmetrize(&mut system);

        let inverse = pinv(&system, options.pinv_rcond)?;
        if inverse.rank < dim {
            log::debug!(
                "smoother system has numerical rank {} of {} (sigma_max={:.3e}); using minimum-norm solution",
                inverse.rank,
                dim,
                inverse.max_singular_value
            );
        }

        let smoother = fast_ab(&inverse.matrix, &design);
        let theta = smoother.dot(&y);

        log::debug!(
            "fitted smoothing spline: {} knots, {} basis functions, {} observations, alpha={}",
            basis.knots().len(),
            dim,
            n,
            options.alpha
        );

        Ok(Self {
            basis,
            alpha: options.alpha,
            x: x.to_owned(),
            y: y.to_owned(),
            design: Arc::new(design),
            penalty: Arc::new(penalty),
            smoother: Arc::new(smoother),
            theta,
            rank: inverse.rank,
        })
    }

    /// Refit the same design to new observations, reusing the smoother matrix.
    pub fn with_observations(&self, y: ArrayView1<'_, f64>) -> Result<Self, SplineError> {
        if y.len() != self.x.len() {
            return Err(SplineError::InvalidInput(format!(
                "expected {} observations, got {}",
                self.x.len(),
                y.len()
            )));
        }
        check_finite(y, "observation")?;
        Ok(Self {
            basis: self.basis.clone(),
            alpha: self.alpha,
            x: self.x.clone(),
            y: y.to_owned(),
            design: Arc::clone(&self.design),
            penalty: Arc::clone(&self.penalty),
            smoother: Arc::clone(&self.smoother),
            theta: self.smoother.dot(&y),
            rank: self.rank,
        })
    }

    /// Fitted values `Phi(x0)^T theta`.
    pub fn evaluate(&self, x0: ArrayView1<'_, f64>) -> Result<Array1<f64>, SplineError> {
        let phi = self.basis.basis(x0)?;
        Ok(phi.t().dot(&self.theta))
    }

    /// Fitted first derivative `Phi'(x0)^T theta`.
    pub fn derivative(&self, x0: ArrayView1<'_, f64>) -> Result<Array1<f64>, SplineError> {
        let dphi = self.basis.dbasis(x0)?;
        Ok(dphi.t().dot(&self.theta))
    }

    /// Derivative influence `Phi'(x0)^T S`, shape `len(x0) x N`.
    ///
    /// Row `i` maps the observation vector to the fitted derivative at
    /// `x0[i]`, so `influence(x0) . y == derivative(x0)`.
    pub fn influence(&self, x0: ArrayView1<'_, f64>) -> Result<Array2<f64>, SplineError> {
        let dphi = self.basis.dbasis(x0)?;
        Ok(fast_ab(&dphi.t(), &*self.smoother))
    }

    /// Value influence (hat rows) `Phi(x0)^T S`, shape `len(x0) x N`.
    pub fn value_influence(&self, x0: ArrayView1<'_, f64>) -> Result<Array2<f64>, SplineError> {
        let phi = self.basis.basis(x0)?;
        Ok(fast_ab(&phi.t(), &*self.smoother))
    }

    /// Fitted values at the design points.
    pub fn fitted_values(&self) -> Array1<f64> {
        self.design.t().dot(&self.theta)
    }

    /// `trace(Phi^T S)`, the trace of the hat matrix at the design points.
    pub fn effective_degrees_of_freedom(&self) -> f64 {
        let mut trace = 0.0;
        Zip::from(&*self.design)
            .and(&*self.smoother)
            .for_each(|&p, &s| trace += p * s);
        trace
    }

    /// `theta^T A theta`: integral of the squared second derivative of the fit.
    pub fn roughness(&self) -> Result<f64, SplineError> {
        Ok(penalty_quadratic_form(
            self.penalty.view(),
            self.theta.view(),
        )?)
    }

    pub fn knots(&self) -> ArrayView1<'_, f64> {
        self.basis.knots().view()
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn basis_dim(&self) -> usize {
        self.basis.dim()
    }

    /// Numerical rank kept by the pseudo-inverse of `Phi Phi^T + alpha A`.
    pub fn system_rank(&self) -> usize {
        self.rank
    }

    pub fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.theta.view()
    }

    pub fn design_points(&self) -> ArrayView1<'_, f64> {
        self.x.view()
    }

    pub fn observations(&self) -> ArrayView1<'_, f64> {
        self.y.view()
    }

    pub fn design_matrix(&self) -> ArrayView2<'_, f64> {
        self.design.view()
    }

    pub fn penalty_matrix(&self) -> ArrayView2<'_, f64> {
        self.penalty.view()
    }

    pub fn smoother_matrix(&self) -> ArrayView2<'_, f64> {
        self.smoother.view()
    }
}

fn validate_options(options: &SplineOptions) -> Result<(), SplineError> {
    if !options.alpha.is_finite() || options.alpha < 0.0 {
        return Err(SplineError::InvalidInput(format!(
            "alpha must be finite and non-negative, got {}",
            options.alpha
        )));
    }
    if !options.pinv_rcond.is_finite() || options.pinv_rcond < 0.0 {
        return Err(SplineError::InvalidInput(format!(
            "pinv_rcond must be finite and non-negative, got {}",
            options.pinv_rcond
        )));
    }
    if !options.quadrature_tol.is_finite() || options.quadrature_tol <= 0.0 {
        return Err(SplineError::InvalidInput(format!(
            "quadrature_tol must be finite and positive, got {}",
            options.quadrature_tol
        )));
    }
    Ok(())
}

fn check_finite(values: ArrayView1<'_, f64>, what: &str) -> Result<(), SplineError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(idx) => Err(SplineError::InvalidInput(format!(
            "{what} at index {idx} is not finite"
        ))),
        None => Ok(()),
    }
}

// Products computed through GEMM can differ in the last bit across the
// diagonal; average the two triangles.
fn symmetrize(matrix: &mut Array2<f64>) {
    let p = matrix.nrows();
    for i in 0..p {
        for j in (i + 1)..p {
            let avg = 0.5 * (matrix[[i, j]] + matrix[[j, i]]);
            matrix[[i, j]] = avg;
            matrix[[j, i]] = avg;
        }
    }
}
