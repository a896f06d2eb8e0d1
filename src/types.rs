/// Default regularization weight when the caller does not pick one.
pub const DEFAULT_ALPHA: f64 = 1.0;

/// Relative singular-value cutoff for the smoother pseudo-inverse.
pub const DEFAULT_PINV_RCOND: f64 = 1e-15;

/// Relative tolerance between the two quadrature orders used per penalty entry.
pub const DEFAULT_QUADRATURE_TOL: f64 = 1e-10;

/// Construction options for [`crate::SmoothingSpline`].
///
/// Everything except `alpha` is numerical plumbing; the defaults reproduce the
/// reference behaviour and rarely need changing.
#[derive(Debug, Clone)]
pub struct SplineOptions {
    /// Weight of the roughness penalty. Must be finite and non-negative.
    pub alpha: f64,
    /// Singular values at or below `pinv_rcond * sigma_max` are dropped when
    /// inverting the regularized normal equations.
    pub pinv_rcond: f64,
    /// Maximum relative disagreement between the low and high order
    /// quadrature of one penalty entry before it is reported as a failure.
    pub quadrature_tol: f64,
    /// Build penalty rows on the rayon pool.
    pub parallel_penalty: bool,
}

impl Default for SplineOptions {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            pinv_rcond: DEFAULT_PINV_RCOND,
            quadrature_tol: DEFAULT_QUADRATURE_TOL,
            parallel_penalty: true,
        }
    }
}

impl SplineOptions {
    pub fn with_alpha(alpha: f64) -> Self {
        Self {
            alpha,
            ..Self::default()
        }
    }
}
