//! Gauss-Legendre quadrature for the roughness penalty.
//!
//! Penalty integrands are products of two second derivatives that are at most
//! linear, so every integrand is a polynomial of degree two or less. An
//! `n`-point Gauss-Legendre rule is exact up to degree `2n - 1`; we still
//! evaluate each integral with two rules of different order and compare them,
//! so a non-finite or inconsistent value is reported instead of returned.
//!
//! Nodes and weights come from the Golub-Welsch algorithm: the nodes are the
//! eigenvalues of the symmetric tridiagonal Jacobi matrix of the Legendre
//! recurrence, and each weight is `2 v_0^2` where `v_0` is the first component
//! of the matching normalized eigenvector.

use crate::faer_ndarray::{FaerEigh, FaerLinalgError};
use faer::Side;
use ndarray::Array2;
use thiserror::Error;

/// Order of the primary rule (exact through degree 5).
pub const LOW_ORDER: usize = 3;
/// Order of the verification rule (exact through degree 9).
pub const HIGH_ORDER: usize = 5;

#[derive(Debug, Error)]
pub enum QuadratureError {
    #[error("Gauss-Legendre rule needs at least one node")]
    EmptyRule,
    #[error("Golub-Welsch eigendecomposition failed: {0}")]
    Eigen(#[from] FaerLinalgError),
    #[error(
        "integral over [{lower}, {upper}] did not converge: {low_order}-point estimate {low} vs {high_order}-point estimate {high}"
    )]
    NotConverged {
        lower: f64,
        upper: f64,
        low_order: usize,
        high_order: usize,
        low: f64,
        high: f64,
    },
}

/// Gauss-Legendre nodes and weights on `[-1, 1]`.
#[derive(Clone, Debug)]
pub struct GaussLegendreRule {
    nodes: Vec<f64>,
    weights: Vec<f64>,
}

impl GaussLegendreRule {
    pub fn new(n: usize) -> Result<Self, QuadratureError> {
        if n == 0 {
            return Err(QuadratureError::EmptyRule);
        }

        // Jacobi matrix for Legendre polynomials: zero diagonal,
        // off-diagonal b_k = k / sqrt(4k^2 - 1) for k = 1..n-1.
        let mut jacobi = Array2::<f64>::zeros((n, n));
        for k in 1..n {
            let kf = k as f64;
            let b = kf / (4.0 * kf * kf - 1.0).sqrt();
            jacobi[[k - 1, k]] = b;
            jacobi[[k, k - 1]] = b;
        }

        let (values, vectors) = jacobi.eigh(Side::Lower)?;

        let mut pairs: Vec<(f64, f64)> = values
            .iter()
            .enumerate()
            .map(|(i, &node)| {
                let v0 = vectors[[0, i]];
                (node, 2.0 * v0 * v0)
            })
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        // Legendre nodes are symmetric about zero; enforce it exactly.
        for i in 0..n / 2 {
            let j = n - 1 - i;
            let node = 0.5 * (pairs[j].0 - pairs[i].0);
            let weight = 0.5 * (pairs[i].1 + pairs[j].1);
            pairs[i] = (-node, weight);
            pairs[j] = (node, weight);
        }
        if n % 2 == 1 {
            pairs[n / 2].0 = 0.0;
        }

        Ok(Self {
            nodes: pairs.iter().map(|p| p.0).collect(),
            weights: pairs.iter().map(|p| p.1).collect(),
        })
    }

    /// Number of nodes.
    pub fn order(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Integrate `f` over `[a, b]` with an affine change of variables.
    pub fn integrate<F: Fn(f64) -> f64>(&self, f: F, a: f64, b: f64) -> f64 {
        let half = 0.5 * (b - a);
        let mid = 0.5 * (a + b);
        let sum: f64 = self
            .nodes
            .iter()
            .zip(&self.weights)
            .map(|(&t, &w)| w * f(mid + half * t))
            .sum();
        half * sum
    }
}

/// A low/high order rule pair evaluated together for every integral.
#[derive(Clone, Debug)]
pub struct CheckedQuadrature {
    low: GaussLegendreRule,
    high: GaussLegendreRule,
    rel_tol: f64,
}

impl CheckedQuadrature {
    pub fn new(rel_tol: f64) -> Result<Self, QuadratureError> {
        Ok(Self {
            low: GaussLegendreRule::new(LOW_ORDER)?,
            high: GaussLegendreRule::new(HIGH_ORDER)?,
            rel_tol,
        })
    }

    /// Integrate `f` over `[a, b]`, returning the higher-order estimate.
    ///
    /// Fails when either estimate is non-finite or the two disagree by more
    /// than `rel_tol` relative to their magnitude (absolute below 1).
    pub fn integrate<F: Fn(f64) -> f64>(
        &self,
        f: F,
        a: f64,
        b: f64,
    ) -> Result<f64, QuadratureError> {
        let low = self.low.integrate(&f, a, b);
        let high = self.high.integrate(&f, a, b);
        let scale = low.abs().max(high.abs()).max(1.0);
        if !low.is_finite() || !high.is_finite() || (low - high).abs() > self.rel_tol * scale {
            return Err(QuadratureError::NotConverged {
                lower: a,
                upper: b,
                low_order: self.low.order(),
                high_order: self.high.order(),
                low,
                high,
            });
        }
        Ok(high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn three_point_rule_matches_known_constants() {
        let rule = GaussLegendreRule::new(3).unwrap();
        let r = (3.0f64 / 5.0).sqrt();
        assert_abs_diff_eq!(rule.nodes(), [-r, 0.0, r].as_slice(), epsilon = 1e-14);
        assert_abs_diff_eq!(
            rule.weights(),
            [5.0 / 9.0, 8.0 / 9.0, 5.0 / 9.0].as_slice(),
            epsilon = 1e-14
        );
    }

    #[test]
    fn weights_sum_to_interval_length() {
        for n in 1..=8 {
            let rule = GaussLegendreRule::new(n).unwrap();
            assert_eq!(rule.order(), n);
            let total: f64 = rule.weights().iter().sum();
            assert_abs_diff_eq!(total, 2.0, epsilon = 1e-13);
        }
    }

    #[test]
    fn exact_for_polynomials_up_to_degree_two_n_minus_one() {
        let rule = GaussLegendreRule::new(HIGH_ORDER).unwrap();
        for p in 0..(2 * HIGH_ORDER) as i32 {
            let got = rule.integrate(|t| t.powi(p), 0.2, 1.7);
            let exact = (1.7f64.powi(p + 1) - 0.2f64.powi(p + 1)) / (p + 1) as f64;
            assert_abs_diff_eq!(got, exact, epsilon = 1e-12);
        }
    }

    #[test]
    fn checked_quadrature_accepts_quadratics() {
        let q = CheckedQuadrature::new(1e-10).unwrap();
        let got = q.integrate(|t| 36.0 * (t - 0.25) * (t - 0.5), 0.5, 1.0).unwrap();
        // 36 * int_{0.5}^{1} (t^2 - 0.75 t + 0.125) dt
        let exact = 36.0 * ((1.0 - 0.125) / 3.0 - 0.375 * (1.0 - 0.25) + 0.125 * 0.5);
        assert_abs_diff_eq!(got, exact, epsilon = 1e-12);
    }

    #[test]
    fn checked_quadrature_reports_non_finite_integrand() {
        let q = CheckedQuadrature::new(1e-10).unwrap();
        let err = q.integrate(|_| f64::NAN, 0.0, 1.0).unwrap_err();
        assert!(matches!(err, QuadratureError::NotConverged { .. }));
    }

    #[test]
    fn checked_quadrature_reports_disagreeing_orders() {
        let q = CheckedQuadrature::new(1e-10).unwrap();
        // Degree 8 is beyond the 3-point rule but within the 5-point rule.
        let err = q.integrate(|t| 100.0 * t.powi(8), -1.0, 1.0).unwrap_err();
        assert!(matches!(
            err,
            QuadratureError::NotConverged {
                low_order: LOW_ORDER,
                high_order: HIGH_ORDER,
                ..
            }
        ));
    }

    #[test]
    fn zero_point_rule_is_rejected() {
        assert!(matches!(
            GaussLegendreRule::new(0),
            Err(QuadratureError::EmptyRule)
        ));
    }
}
