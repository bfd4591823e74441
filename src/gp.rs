//! Gaussian-process surrogate over a scalar tuning input.
//!
//! The surrogate models `step size -> pilot objective` from a [`DesignSet`] of
//! observed pairs. Fitting proceeds in four steps:
//!
//! 1. **Standardize** the outputs (zero mean, unit variance). The GP mean function is
//!    the constant sample mean of the observations.
//! 2. **Kernel**: squared-exponential correlation `r(x, x') = exp(-(x - x')² / (2 ℓ²))`
//!    plus a nugget `g` on the diagonal of the training matrix. The nugget never
//!    drops below [`GpConfig::nugget`].
//! 3. **Hyperparameters**: lengthscale `ℓ` and nugget `g` maximize the log marginal
//!    likelihood over log-spaced grids; the signal variance has a closed-form
//!    profile estimate `σ² = zᵀ R⁻¹ z / n`.
//! 4. **Cholesky** of `R + g I` gives `α = (R + g I)⁻¹ z` for prediction.
//!
//! A fit fails only if no grid candidate yields a finite likelihood from a
//! successful Cholesky factorization.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use std::f64::consts::PI;

use crate::error::{Error, Result};

/// Observed `(input, objective)` pairs. Append-only.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DesignSet {
    points: Vec<DesignPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DesignPoint {
    pub input: f64,
    pub value: f64,
}

impl DesignSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, input: f64, value: f64) {
        self.points.push(DesignPoint { input, value });
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DesignPoint> + '_ {
        self.points.iter()
    }

    pub fn inputs(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.input).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// The point with the lowest objective; the earliest one wins ties.
    pub fn best(&self) -> Option<DesignPoint> {
        self.points.iter().copied().fold(None, |best, p| match best {
            Some(b) if b.value <= p.value => Some(b),
            _ => Some(p),
        })
    }

    /// Running minimum of the objective after each evaluation.
    pub fn best_so_far(&self) -> Vec<f64> {
        self.points
            .iter()
            .scan(f64::INFINITY, |best, p| {
                *best = best.min(p.value);
                Some(*best)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpConfig {
    /// Nugget floor added to the diagonal of every training matrix.
    pub nugget: f64,
    /// Extra nugget candidates tried during fitting; values below the floor are ignored.
    pub nugget_candidates: Vec<f64>,
    /// Number of log-spaced lengthscale candidates.
    pub n_lengthscales: usize,
    /// Smallest and largest lengthscale candidate, as fractions of the input span.
    pub lengthscale_range: (f64, f64),
}

impl Default for GpConfig {
    fn default() -> Self {
        Self {
            nugget: 1e-6,
            nugget_candidates: vec![1e-4, 1e-3, 1e-2, 1e-1],
            n_lengthscales: 30,
            lengthscale_range: (0.02, 2.0),
        }
    }
}

impl GpConfig {
    pub fn nugget(mut self, nugget: f64) -> Self {
        self.nugget = nugget;
        self
    }

    pub fn nugget_candidates(mut self, candidates: Vec<f64>) -> Self {
        self.nugget_candidates = candidates;
        self
    }

    pub fn n_lengthscales(mut self, n: usize) -> Self {
        self.n_lengthscales = n;
        self
    }

    fn nugget_grid(&self) -> Vec<f64> {
        std::iter::once(self.nugget)
            .chain(
                self.nugget_candidates
                    .iter()
                    .copied()
                    .filter(|&g| g > self.nugget),
            )
            .collect()
    }

    fn lengthscale_grid(&self, span: f64) -> Vec<f64> {
        let (lo, hi) = self.lengthscale_range;
        let n = self.n_lengthscales.max(1);
        if n == 1 {
            return vec![span * (lo * hi).sqrt()];
        }
        let (log_lo, log_hi) = (lo.ln(), hi.ln());
        (0..n)
            .map(|i| span * (log_lo + (log_hi - log_lo) * i as f64 / (n - 1) as f64).exp())
            .collect()
    }
}

/// Posterior mean and variance of the latent objective at one input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub mean: f64,
    pub variance: f64,
}

impl Prediction {
    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }
}

/// A fitted GP model ready for predictions.
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    x_train: Vec<f64>,
    /// Cholesky factor of R + g I.
    cholesky: Cholesky<f64, Dyn>,
    /// α = (R + g I)⁻¹ z.
    alpha: DVector<f64>,
    y_mean: f64,
    y_std: f64,
    signal_var: f64,
    lengthscale: f64,
    nugget: f64,
    log_likelihood: f64,
}

/// Squared-exponential correlation.
fn squared_exponential(a: f64, b: f64, lengthscale: f64) -> f64 {
    let r = (a - b) / lengthscale;
    (-0.5 * r * r).exp()
}

fn correlation_matrix(x: &[f64], lengthscale: f64, nugget: f64) -> DMatrix<f64> {
    let n = x.len();
    DMatrix::from_fn(n, n, |i, j| {
        let k = squared_exponential(x[i], x[j], lengthscale);
        if i == j {
            k + nugget
        } else {
            k
        }
    })
}

struct Candidate {
    cholesky: Cholesky<f64, Dyn>,
    alpha: DVector<f64>,
    signal_var: f64,
    lengthscale: f64,
    nugget: f64,
    log_likelihood: f64,
}

fn try_candidate(x: &[f64], z: &DVector<f64>, lengthscale: f64, nugget: f64) -> Option<Candidate> {
    let n = x.len() as f64;
    let cholesky = Cholesky::new(correlation_matrix(x, lengthscale, nugget))?;
    let alpha = cholesky.solve(z);
    let signal_var = (z.dot(&alpha) / n).max(1e-12);
    let log_det: f64 = cholesky.l_dirty().diagonal().iter().map(|d| d.ln()).sum();
    // Profile log-likelihood with σ² at its MLE; log|σ² R| = n log σ² + 2 log|L|.
    let log_likelihood = -0.5 * n * signal_var.ln() - log_det - 0.5 * n * (1.0 + (2.0 * PI).ln());
    if !log_likelihood.is_finite() || alpha.iter().any(|a| !a.is_finite()) {
        return None;
    }
    Some(Candidate {
        cholesky,
        alpha,
        signal_var,
        lengthscale,
        nugget,
        log_likelihood,
    })
}

impl GaussianProcess {
    /// Fits the surrogate to every point of `design`.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyDesign`] for an empty design and [`Error::SurrogateFit`] when no
    /// hyperparameter candidate gives a positive-definite training matrix.
    pub fn fit(design: &DesignSet, config: &GpConfig) -> Result<Self> {
        if design.is_empty() {
            return Err(Error::EmptyDesign);
        }
        let x_train = design.inputs();
        let y = design.values();
        let n = y.len();

        let y_mean = y.iter().sum::<f64>() / n as f64;
        let y_var = if n > 1 {
            y.iter().map(|&v| (v - y_mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            1.0
        };
        let y_std = y_var.sqrt().max(1e-10);
        let z = DVector::from_iterator(n, y.iter().map(|&v| (v - y_mean) / y_std));

        let (lo, hi) = x_train
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let span = if hi - lo > 1e-12 { hi - lo } else { 1.0 };

        let mut best: Option<Candidate> = None;
        for &nugget in &config.nugget_grid() {
            for &lengthscale in &config.lengthscale_grid(span) {
                let Some(candidate) = try_candidate(&x_train, &z, lengthscale, nugget) else {
                    continue;
                };
                if best
                    .as_ref()
                    .map_or(true, |b| candidate.log_likelihood > b.log_likelihood)
                {
                    best = Some(candidate);
                }
            }
        }
        let best = best.ok_or(Error::SurrogateFit { n_points: n })?;
        log::debug!(
            "surrogate fit on {n} points: lengthscale {:.4}, nugget {:.1e}, log-lik {:.3}",
            best.lengthscale,
            best.nugget,
            best.log_likelihood
        );

        Ok(Self {
            x_train,
            cholesky: best.cholesky,
            alpha: best.alpha,
            y_mean,
            y_std,
            signal_var: best.signal_var,
            lengthscale: best.lengthscale,
            nugget: best.nugget,
            log_likelihood: best.log_likelihood,
        })
    }

    /// Posterior mean and variance of the latent objective at `x`, in the original units.
    pub fn predict(&self, x: f64) -> Prediction {
        let r = DVector::from_iterator(
            self.x_train.len(),
            self.x_train
                .iter()
                .map(|&xi| squared_exponential(x, xi, self.lengthscale)),
        );
        let mean_z = r.dot(&self.alpha);
        let v = self.cholesky.solve(&r);
        let var_z = (self.signal_var * (1.0 - r.dot(&v))).max(0.0);
        Prediction {
            mean: self.y_mean + self.y_std * mean_z,
            variance: var_z * self.y_std * self.y_std,
        }
    }

    pub fn lengthscale(&self) -> f64 {
        self.lengthscale
    }

    pub fn nugget(&self) -> f64 {
        self.nugget
    }

    /// Signal variance in the original output units.
    pub fn signal_variance(&self) -> f64 {
        self.signal_var * self.y_std * self.y_std
    }

    pub fn log_marginal_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    pub fn n_points(&self) -> usize {
        self.x_train.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn design_from(f: impl Fn(f64) -> f64, xs: &[f64]) -> DesignSet {
        let mut design = DesignSet::new();
        xs.iter().for_each(|&x| design.push(x, f(x)));
        design
    }

    #[test]
    fn design_best_and_running_minimum() {
        let mut design = DesignSet::new();
        assert!(design.best().is_none());
        for (x, y) in [(1.0, 3.0), (2.0, 1.0), (3.0, 2.0), (4.0, 1.0)] {
            design.push(x, y);
        }
        assert_eq!(design.len(), 4);
        assert_eq!(design.best().unwrap().input, 2.0);
        assert_eq!(design.best_so_far(), vec![3.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn interpolates_smooth_function() {
        let xs: Vec<f64> = (0..8).map(|i| 0.1 + i as f64 * 0.7).collect();
        let design = design_from(f64::sin, &xs);
        let gp = GaussianProcess::fit(&design, &GpConfig::default()).unwrap();
        assert_eq!(gp.n_points(), 8);
        for &x in &xs {
            let p = gp.predict(x);
            assert_abs_diff_eq!(p.mean, x.sin(), epsilon = 0.05);
        }
        // Between training points the smooth fit still tracks the function.
        let p = gp.predict(2.0);
        assert_abs_diff_eq!(p.mean, 2.0f64.sin(), epsilon = 0.15);
    }

    #[test]
    fn variance_grows_away_from_data() {
        let design = design_from(|x| (x - 2.0).powi(2), &[1.0, 1.5, 2.0, 2.5, 3.0]);
        let gp = GaussianProcess::fit(&design, &GpConfig::default()).unwrap();
        let near = gp.predict(2.0).variance;
        let far = gp.predict(6.0).variance;
        assert!(far > near, "far {far} near {near}");
        assert!(near >= 0.0);
    }

    #[test]
    fn single_point_design() {
        let design = design_from(|_| -42.0, &[1.0]);
        let gp = GaussianProcess::fit(&design, &GpConfig::default()).unwrap();
        assert_abs_diff_eq!(gp.predict(1.0).mean, -42.0, epsilon = 1e-6);
        assert!(gp.predict(3.0).variance.is_finite());
    }

    #[test]
    fn duplicate_inputs_are_handled_by_nugget() {
        let design = design_from(|x| x * x, &[1.0, 1.0, 1.0, 2.0]);
        let gp = GaussianProcess::fit(&design, &GpConfig::default()).unwrap();
        assert!(gp.nugget() >= 1e-6);
        assert!(gp.predict(1.5).mean.is_finite());
    }

    #[test]
    fn constant_observations() {
        let design = design_from(|_| 0.0, &[0.5, 1.0, 2.0, 4.0]);
        let gp = GaussianProcess::fit(&design, &GpConfig::default()).unwrap();
        let p = gp.predict(3.0);
        assert_abs_diff_eq!(p.mean, 0.0, epsilon = 1e-9);
        assert!(p.variance.is_finite());
    }

    #[test]
    fn nugget_floor_is_respected() {
        let config = GpConfig::default().nugget(1e-2).nugget_candidates(vec![1e-8, 1e-3]);
        assert_eq!(config.nugget_grid(), vec![1e-2]);
    }

    #[test]
    fn empty_design_is_an_error() {
        let err = GaussianProcess::fit(&DesignSet::new(), &GpConfig::default()).unwrap_err();
        assert!(matches!(err, Error::EmptyDesign));
    }

    #[test]
    fn non_finite_inputs_fail_the_fit() {
        let mut design = DesignSet::new();
        design.push(1.0, 0.0);
        design.push(f64::NAN, 1.0);
        let err = GaussianProcess::fit(&design, &GpConfig::default()).unwrap_err();
        assert!(matches!(err, Error::SurrogateFit { n_points: 2 }));
    }
}
