//! Seeded random Fourier series used as a ground-truth curve.
//!
//! `f(x) = sum_k c_k phi_k(x)` with `phi_{2m}(x) = cos(2 pi m x)` and
//! `phi_{2m+1}(x) = sin(2 pi m x)` for `m = 0 .. n/2`. The first ten
//! coefficients are standard normal; coefficient `k >= 10` is standard normal
//! divided by `(k + 1 - 10)^2`, so high frequencies fade quickly.

use ndarray::{Array1, Array2, ArrayView1};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;
use thiserror::Error;

/// Number of leading coefficients drawn without decay.
pub const UNDAMPED_COEFFICIENTS: usize = 10;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Clone, Debug)]
pub struct FourierSignal {
    coefficients: Array1<f64>,
}

impl FourierSignal {
    /// Draw coefficients for `n` Fourier basis functions from `seed`.
    ///
    /// `n` must be even (cos/sin pairs) and at least 10.
    pub fn new(n: usize, seed: u64) -> Result<Self, SignalError> {
        if n % 2 != 0 || n < UNDAMPED_COEFFICIENTS {
            return Err(SignalError::InvalidInput(format!(
                "number of Fourier basis functions must be even and at least {UNDAMPED_COEFFICIENTS}, got {n}"
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| SignalError::InvalidInput(format!("standard normal: {e}")))?;

        let mut coefficients = Array1::<f64>::zeros(n);
        for (k, c) in coefficients.iter_mut().enumerate() {
            let draw = normal.sample(&mut rng);
            *c = if k < UNDAMPED_COEFFICIENTS {
                draw
            } else {
                let decay = (k + 1 - UNDAMPED_COEFFICIENTS) as f64;
                draw / (decay * decay)
            };
        }

        Ok(Self { coefficients })
    }

    /// Build a signal from explicit coefficients (length must be even).
    pub fn from_coefficients(coefficients: Array1<f64>) -> Result<Self, SignalError> {
        if coefficients.is_empty() || coefficients.len() % 2 != 0 {
            return Err(SignalError::InvalidInput(format!(
                "coefficient vector length must be even and positive, got {}",
                coefficients.len()
            )));
        }
        Ok(Self { coefficients })
    }

    pub fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.coefficients.view()
    }

    /// `f(x)` at every point.
    pub fn values(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        self.fourier_basis(x, false).t().dot(&self.coefficients)
    }

    /// Analytic `f'(x)` at every point.
    pub fn derivative(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        self.fourier_basis(x, true).t().dot(&self.coefficients)
    }

    /// `f(x)` plus independent Gaussian noise with standard deviation `noise_sd`.
    pub fn sample<R: rand::Rng + ?Sized>(
        &self,
        x: ArrayView1<'_, f64>,
        noise_sd: f64,
        rng: &mut R,
    ) -> Result<Array1<f64>, SignalError> {
        if !noise_sd.is_finite() || noise_sd < 0.0 {
            return Err(SignalError::InvalidInput(format!(
                "noise standard deviation must be finite and non-negative, got {noise_sd}"
            )));
        }
        if noise_sd == 0.0 {
            return Ok(self.values(x));
        }
        let noise = Normal::new(0.0, noise_sd).map_err(|e| {
            SignalError::InvalidInput(format!("invalid noise standard deviation {noise_sd}: {e}"))
        })?;
        let mut y = self.values(x);
        for v in y.iter_mut() {
            *v += noise.sample(rng);
        }
        Ok(y)
    }

    fn fourier_basis(&self, x: ArrayView1<'_, f64>, derivative: bool) -> Array2<f64> {
        let n = self.coefficients.len();
        let mut out = Array2::<f64>::zeros((n, x.len()));
        for m in 0..n / 2 {
            let freq = 2.0 * PI * m as f64;
            for (j, &xv) in x.iter().enumerate() {
                let (s, c) = (freq * xv).sin_cos();
                if derivative {
                    out[[2 * m, j]] = -freq * s;
                    out[[2 * m + 1, j]] = freq * c;
                } else {
                    out[[2 * m, j]] = c;
                    out[[2 * m + 1, j]] = s;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn same_seed_gives_same_signal() {
        let a = FourierSignal::new(20, 20).unwrap();
        let b = FourierSignal::new(20, 20).unwrap();
        let c = FourierSignal::new(20, 21).unwrap();
        assert_eq!(a.coefficients(), b.coefficients());
        assert_ne!(a.coefficients(), c.coefficients());
    }

    #[test]
    fn output_length_matches_input() {
        let f = FourierSignal::new(12, 3).unwrap();
        let x = Array1::linspace(0.0, 1.0, 17);
        assert_eq!(f.values(x.view()).len(), 17);
        assert_eq!(f.derivative(x.view()).len(), 17);
        assert_eq!(f.values(Array1::<f64>::zeros(0).view()).len(), 0);
    }

    #[test]
    fn derivative_matches_central_differences() {
        let f = FourierSignal::new(30, 7).unwrap();
        let h = 1e-6;
        let x = array![0.03, 0.31, 0.5, 0.77, 0.98];
        let fd = (f.values(x.mapv(|v| v + h).view()) - f.values(x.mapv(|v| v - h).view()))
            / (2.0 * h);
        let analytic = f.derivative(x.view());
        for (a, b) in fd.iter().zip(analytic.iter()) {
            assert!((a - b).abs() < 1e-4 * b.abs().max(1.0), "fd {a} vs {b}");
        }
    }

    #[test]
    fn explicit_coefficients_follow_cos_sin_layout() {
        // c = [0.5, *, 0, 2]: f(x) = 0.5 + 2 sin(2 pi x); the sin(0) slot is inert.
        let f = FourierSignal::from_coefficients(array![0.5, 9.0, 0.0, 2.0]).unwrap();
        let x = array![0.0, 0.25, 0.75];
        assert_abs_diff_eq!(
            f.values(x.view()).as_slice().unwrap(),
            [0.5, 2.5, -1.5].as_slice(),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(f.derivative(x.view())[0], 4.0 * PI, epsilon = 1e-12);
    }

    #[test]
    fn high_frequency_coefficients_decay() {
        let f = FourierSignal::new(200, 11).unwrap();
        let tail = f.coefficients().slice(ndarray::s![100..]).to_owned();
        // |N(0,1)| / (k - 9)^2 with k >= 100 stays far below 1e-2.
        assert!(tail.iter().all(|c| c.abs() < 1e-2), "{tail:?}");
    }

    #[test]
    fn sample_adds_noise_around_values() {
        let f = FourierSignal::new(10, 1).unwrap();
        let x = Array1::linspace(0.0, 1.0, 2000);
        let mut rng = StdRng::seed_from_u64(99);
        let y = f.sample(x.view(), 0.1, &mut rng).unwrap();
        let resid = &y - &f.values(x.view());
        let mean = resid.mean().unwrap();
        let sd = resid.std(0.0);
        assert!(mean.abs() < 0.01, "mean {mean}");
        assert!((sd - 0.1).abs() < 0.01, "sd {sd}");
    }

    #[test]
    fn sample_rejects_negative_or_non_finite_noise() {
        let f = FourierSignal::new(10, 1).unwrap();
        let x = Array1::linspace(0.0, 1.0, 5);
        let mut rng = StdRng::seed_from_u64(5);
        for sd in [-1.0, -1e-12, f64::NAN, f64::INFINITY] {
            assert!(
                matches!(
                    f.sample(x.view(), sd, &mut rng),
                    Err(SignalError::InvalidInput(_))
                ),
                "noise sd {sd} should be rejected"
            );
        }
        // Zero noise is the noiseless signal.
        let y = f.sample(x.view(), 0.0, &mut rng).unwrap();
        assert_eq!(y, f.values(x.view()));
    }

    #[test]
    fn rejects_odd_or_short_bases() {
        assert!(FourierSignal::new(11, 0).is_err());
        assert!(FourierSignal::new(8, 0).is_err());
        assert!(FourierSignal::from_coefficients(array![1.0, 2.0, 3.0]).is_err());
    }
}
