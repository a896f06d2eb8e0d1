#![deny(dead_code)]
#![deny(unused_imports)]

pub mod basis;
pub mod faer_ndarray;
pub mod penalty;
pub mod quadrature;
pub mod signal;
pub mod smoother;
pub mod types;

pub use basis::{BasisError, BasisEvalKind, BasisTerm, TruncatedPowerBasis};
pub use penalty::{PenaltyError, build_penalty_matrix, penalty_quadratic_form};
pub use signal::{FourierSignal, SignalError};
pub use smoother::{SmoothingSpline, SplineError};
pub use types::SplineOptions;
