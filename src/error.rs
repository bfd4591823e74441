//! Error type shared by the tuner, the surrogate model and the comparison harness.
//!
//! Conditions the samplers treat as ordinary algorithm behaviour (non-finite
//! acceptance ratios, near-singular proposal covariances, timed-out pilot runs)
//! never show up here.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The surrogate covariance matrix could not be factorized for any
    /// hyperparameter candidate, even with the nugget on its diagonal.
    #[error("surrogate fit failed: covariance over {n_points} design points is not positive-definite")]
    SurrogateFit {
        /// Number of design points the fit was attempted on.
        n_points: usize,
    },

    /// A surrogate was requested before any objective value was observed.
    #[error("surrogate fit requires at least one design point")]
    EmptyDesign,

    /// The step-size search domain must be finite with `0 < lower < upper`.
    #[error("invalid step-size domain [{lower}, {upper}]: need 0 < lower < upper")]
    InvalidDomain { lower: f64, upper: f64 },

    /// A state vector did not match the dimension of the run.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[cfg(feature = "csv")]
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "csv")]
    #[error(transparent)]
    Csv(#[from] csv::Error),
}
