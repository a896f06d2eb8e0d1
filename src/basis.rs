//! Truncated cubic power basis.
//!
//! For a knot sequence `k_0 < k_1 < ... < k_{K-1}` the basis has `K + 3`
//! functions: the monomials `1, x, x^2, x^3` followed by one truncated cubic
//! `max(0, x - k_j)^3` for each knot except the last. The last knot is the
//! right end of the domain, where its truncated cubic would vanish
//! identically.
//!
//! Every basis index maps to a [`BasisTerm`], computed once per knot
//! sequence, which knows its value and its first and second derivatives in
//! closed form.

use ndarray::{Array1, Array2, ArrayView1, Zip};
use thiserror::Error;

#[cfg(test)]
use approx::assert_abs_diff_eq;

/// Number of global polynomial terms (degrees 0 through 3).
pub const NUM_POLYNOMIAL_TERMS: usize = 4;

#[derive(Error, Debug)]
pub enum BasisError {
    #[error(
        "Invalid input: knot vector is invalid: {0}. It must contain at least 2 finite, strictly increasing values."
    )]
    InvalidKnots(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Which quantity to evaluate for every basis function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BasisEvalKind {
    Basis,
    FirstDerivative,
    SecondDerivative,
}

/// One function of the truncated power basis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BasisTerm {
    Constant,
    Linear,
    Quadratic,
    Cubic,
    /// `max(0, x - knot)^3`
    Truncated { knot: f64 },
}

impl BasisTerm {
    #[inline]
    pub fn value(&self, x: f64) -> f64 {
        match *self {
            BasisTerm::Constant => 1.0,
            BasisTerm::Linear => x,
            BasisTerm::Quadratic => x * x,
            BasisTerm::Cubic => x * x * x,
            BasisTerm::Truncated { knot } => {
                let d = (x - knot).max(0.0);
                d * d * d
            }
        }
    }

    /// One-sided derivative; zero on and left of a truncated term's knot.
    #[inline]
    pub fn first_derivative(&self, x: f64) -> f64 {
        match *self {
            BasisTerm::Constant => 0.0,
            BasisTerm::Linear => 1.0,
            BasisTerm::Quadratic => 2.0 * x,
            BasisTerm::Cubic => 3.0 * x * x,
            BasisTerm::Truncated { knot } => {
                let d = (x - knot).max(0.0);
                3.0 * d * d
            }
        }
    }

    /// Second derivative as used by the roughness penalty.
    ///
    /// The truncated term returns `6 (x - knot)` for every `x`, without the
    /// truncation. Callers only integrate it from the knot rightward.
    #[inline]
    pub fn second_derivative(&self, x: f64) -> f64 {
        match *self {
            BasisTerm::Constant | BasisTerm::Linear => 0.0,
            BasisTerm::Quadratic => 2.0,
            BasisTerm::Cubic => 6.0 * x,
            BasisTerm::Truncated { knot } => 6.0 * (x - knot),
        }
    }

    /// [`Self::second_derivative`] at `origin + u`.
    ///
    /// The truncated term subtracts its knot from `origin` before adding `u`,
    /// so knot sequences far from zero do not lose the offset to rounding.
    #[inline]
    pub fn second_derivative_from(&self, origin: f64, u: f64) -> f64 {
        match *self {
            BasisTerm::Constant | BasisTerm::Linear => 0.0,
            BasisTerm::Quadratic => 2.0,
            BasisTerm::Cubic => 6.0 * (origin + u),
            BasisTerm::Truncated { knot } => 6.0 * ((origin - knot) + u),
        }
    }

    #[inline]
    pub fn eval(&self, x: f64, kind: BasisEvalKind) -> f64 {
        match kind {
            BasisEvalKind::Basis => self.value(x),
            BasisEvalKind::FirstDerivative => self.first_derivative(x),
            BasisEvalKind::SecondDerivative => self.second_derivative(x),
        }
    }

}

/// Validated knot sequence together with its basis term table.
#[derive(Clone, Debug)]
pub struct TruncatedPowerBasis {
    knots: Array1<f64>,
    terms: Vec<BasisTerm>,
}

impl TruncatedPowerBasis {
    pub fn new(knots: ArrayView1<'_, f64>) -> Result<Self, BasisError> {
        validate_knots(knots)?;

        let mut terms = Vec::with_capacity(knots.len() + NUM_POLYNOMIAL_TERMS - 1);
        terms.extend([
            BasisTerm::Constant,
            BasisTerm::Linear,
            BasisTerm::Quadratic,
            BasisTerm::Cubic,
        ]);
        terms.extend(
            knots
                .iter()
                .take(knots.len() - 1)
                .map(|&knot| BasisTerm::Truncated { knot }),
        );

        Ok(Self {
            knots: knots.to_owned(),
            terms,
        })
    }

    /// Number of basis functions, `K + 3`.
    pub fn dim(&self) -> usize {
        self.terms.len()
    }

    pub fn knots(&self) -> &Array1<f64> {
        &self.knots
    }

    pub fn terms(&self) -> &[BasisTerm] {
        &self.terms
    }

    /// `(x_min, x_max)`, the first and last knot.
    pub fn domain(&self) -> (f64, f64) {
        (self.knots[0], self.knots[self.knots.len() - 1])
    }

    /// Evaluate every basis function (or derivative) at `points`.
    ///
    /// Returns a `dim() x points.len()` matrix; column `j` belongs to
    /// `points[j]`. Points outside the domain are extrapolated.
    pub fn evaluate(
        &self,
        points: ArrayView1<'_, f64>,
        kind: BasisEvalKind,
    ) -> Result<Array2<f64>, BasisError> {
        if let Some(idx) = points.iter().position(|v| !v.is_finite()) {
            return Err(BasisError::InvalidInput(format!(
                "evaluation point at index {idx} is not finite"
            )));
        }

        let (lo, hi) = self.domain();
        let outside = points.iter().filter(|&&v| v < lo || v > hi).count();
        if outside > 0 {
            log::debug!(
                "{} of {} evaluation points lie outside [{}, {}] and are extrapolated",
                outside,
                points.len(),
                lo,
                hi
            );
        }

        let mut out = Array2::<f64>::zeros((self.dim(), points.len()));
        for (term, row) in self.terms.iter().zip(out.rows_mut()) {
            Zip::from(row)
                .and(&points)
                .for_each(|o, &x| *o = term.eval(x, kind));
        }
        Ok(out)
    }

    /// Basis values `Phi(x)`.
    pub fn basis(&self, points: ArrayView1<'_, f64>) -> Result<Array2<f64>, BasisError> {
        self.evaluate(points, BasisEvalKind::Basis)
    }

    /// First derivatives `Phi'(x)`.
    pub fn dbasis(&self, points: ArrayView1<'_, f64>) -> Result<Array2<f64>, BasisError> {
        self.evaluate(points, BasisEvalKind::FirstDerivative)
    }
}

fn validate_knots(knots: ArrayView1<'_, f64>) -> Result<(), BasisError> {
    if knots.len() < 2 {
        return Err(BasisError::InvalidKnots(format!(
            "expected at least 2 knots, found {}",
            knots.len()
        )));
    }
    if let Some(idx) = knots.iter().position(|v| !v.is_finite()) {
        return Err(BasisError::InvalidKnots(format!(
            "knot at index {idx} is not finite"
        )));
    }
    for (i, pair) in knots.windows(2).into_iter().enumerate() {
        if pair[1] <= pair[0] {
            return Err(BasisError::InvalidKnots(format!(
                "knots[{}] = {} does not exceed knots[{}] = {}",
                i + 1,
                pair[1],
                i,
                pair[0]
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn quarter_knots() -> TruncatedPowerBasis {
        TruncatedPowerBasis::new(array![0.0, 0.25, 0.5, 0.75, 1.0].view())
            .expect("valid knots")
    }

    #[test]
    fn dimension_is_knot_count_plus_three() {
        let basis = quarter_knots();
        assert_eq!(basis.dim(), 8);
        assert_eq!(basis.terms()[3], BasisTerm::Cubic);
        assert_eq!(basis.terms()[4], BasisTerm::Truncated { knot: 0.0 });
        assert_eq!(basis.terms()[7], BasisTerm::Truncated { knot: 0.75 });

        let two = TruncatedPowerBasis::new(array![-1.0, 2.0].view()).unwrap();
        assert_eq!(two.dim(), 5);
        assert_eq!(two.domain(), (-1.0, 2.0));
    }

    #[test]
    fn basis_rows_follow_monomials_and_truncated_cubics() {
        let basis = quarter_knots();
        let x = array![0.1, 0.6, 1.0];
        let phi = basis.basis(x.view()).unwrap();
        assert_eq!(phi.dim(), (8, 3));
        for (j, &xv) in x.iter().enumerate() {
            assert_abs_diff_eq!(phi[[0, j]], 1.0);
            assert_abs_diff_eq!(phi[[1, j]], xv);
            assert_abs_diff_eq!(phi[[2, j]], xv * xv, epsilon = 1e-15);
            assert_abs_diff_eq!(phi[[3, j]], xv * xv * xv, epsilon = 1e-15);
        }
        // x = 0.1 lies left of 0.25: only the knot-0 truncated cubic is active.
        assert_abs_diff_eq!(phi[[4, 0]], 0.1f64.powi(3), epsilon = 1e-15);
        assert_eq!(phi[[5, 0]], 0.0);
        assert_eq!(phi[[7, 0]], 0.0);
        assert_abs_diff_eq!(phi[[6, 1]], 0.1f64.powi(3), epsilon = 1e-15);
        assert_abs_diff_eq!(phi[[7, 2]], 0.25f64.powi(3), epsilon = 1e-15);
    }

    #[test]
    fn truncated_terms_vanish_at_their_knot() {
        let basis = quarter_knots();
        let x = array![0.25, 0.5, 0.75];
        let phi = basis.basis(x.view()).unwrap();
        let dphi = basis.dbasis(x.view()).unwrap();
        for j in 0..3 {
            assert_eq!(phi[[5 + j, j]], 0.0);
            assert_eq!(dphi[[5 + j, j]], 0.0);
        }
    }

    #[test]
    fn dbasis_matches_forward_differences_away_from_knots() {
        let basis = quarter_knots();
        let eps = 1e-7;
        let x = array![0.05, 0.13, 0.37, 0.61, 0.88, 0.99];
        let x_shift = x.mapv(|v| v + eps);
        let phi = basis.basis(x.view()).unwrap();
        let phi_shift = basis.basis(x_shift.view()).unwrap();
        let dphi = basis.dbasis(x.view()).unwrap();
        let fd = (&phi_shift - &phi) / eps;
        for (a, b) in fd.iter().zip(dphi.iter()) {
            assert!((a - b).abs() < 1e-5, "fd {a} vs analytic {b}");
        }
        assert!(dphi.row(0).iter().all(|&v| v == 0.0));
        assert!(dphi.row(1).iter().all(|&v| v == 1.0));
    }

    #[test]
    fn second_derivative_matches_differences_right_of_knot() {
        let eps = 1e-6;
        for term in [
            BasisTerm::Constant,
            BasisTerm::Linear,
            BasisTerm::Quadratic,
            BasisTerm::Cubic,
            BasisTerm::Truncated { knot: 0.3 },
        ] {
            for x in [0.4, 0.7, 0.95] {
                let fd = (term.first_derivative(x + eps) - term.first_derivative(x)) / eps;
                assert!(
                    (fd - term.second_derivative(x)).abs() < 1e-4,
                    "{term:?} at {x}: fd {fd} vs {}",
                    term.second_derivative(x)
                );
            }
        }
        // Untruncated on the left of the knot.
        assert_abs_diff_eq!(
            BasisTerm::Truncated { knot: 0.3 }.second_derivative(0.1),
            -1.2,
            epsilon = 1e-12
        );
    }

    #[test]
    fn second_derivative_rows_and_local_form_agree() {
        let basis = quarter_knots();
        let x = array![0.1, 0.6];
        let d2 = basis.evaluate(x.view(), BasisEvalKind::SecondDerivative).unwrap();
        assert_eq!(d2.dim(), (8, 2));
        assert_abs_diff_eq!(
            d2.column(0).to_vec().as_slice(),
            [0.0, 0.0, 2.0, 0.6, 0.6, -0.9, -2.4, -3.9].as_slice(),
            epsilon = 1e-12
        );
        for (term, row) in basis.terms().iter().zip(d2.rows()) {
            for (&xv, &v) in x.iter().zip(row.iter()) {
                let local = term.second_derivative_from(0.25, xv - 0.25);
                assert_abs_diff_eq!(local, v, epsilon = 1e-12);
            }
        }
        // Far from zero the offset cancels before u is added.
        let far = BasisTerm::Truncated { knot: 1e8 };
        assert_eq!(far.second_derivative_from(1e8 + 0.25, 0.5), 4.5);
    }

    #[test]
    fn extrapolates_outside_the_domain() {
        let basis = quarter_knots();
        let phi = basis.basis(array![-0.5, 2.0].view()).unwrap();
        assert_eq!(phi[[4, 0]], 0.0);
        assert_abs_diff_eq!(phi[[3, 0]], -0.125);
        assert_abs_diff_eq!(phi[[4, 1]], 8.0);
        assert_abs_diff_eq!(phi[[7, 1]], 1.25f64.powi(3), epsilon = 1e-12);
    }

    #[test]
    fn rejects_degenerate_knots() {
        for knots in [
            array![0.5],
            array![0.0, 0.5, 0.5, 1.0],
            array![0.0, 1.0, 0.5],
            array![0.0, f64::NAN, 1.0],
        ] {
            let err = TruncatedPowerBasis::new(knots.view()).unwrap_err();
            assert!(matches!(err, BasisError::InvalidKnots(_)), "{err}");
            assert!(err.to_string().starts_with("Invalid input"));
        }
    }

    #[test]
    fn rejects_non_finite_evaluation_points() {
        let basis = quarter_knots();
        let err = basis.basis(array![0.2, f64::INFINITY].view()).unwrap_err();
        assert!(matches!(err, BasisError::InvalidInput(_)));
    }

    #[test]
    fn empty_points_give_empty_columns() {
        let basis = quarter_knots();
        let phi = basis.basis(Array1::<f64>::zeros(0).view()).unwrap();
        assert_eq!(phi.dim(), (8, 0));
    }
}
