/*!
# Adaptive Metropolis Sampler

A random-walk Metropolis chain whose Gaussian proposal covariance is learned from
the chain's own history (Haario et al., 2001).

For the `i`-th state of the chain (1-based, state 1 is the initial state):

- while `i <= burn_in`, the proposal covariance is `initial_variance · I`;
- afterwards it is `s_d · (C_{i-1} + epsilon · I)`, where `C_{i-1}` is the unbiased
  empirical covariance of states `1..i-1` and `s_d = 2.38² / d`.

The empirical covariance is refreshed on every iteration past burn-in. The running
mean and co-moment matrix are accumulated with Welford's update
([`CovarianceTracker`]), so the refresh costs `O(d²)` instead of a pass over the
whole history. `epsilon · I` keeps the matrix positive-definite even when the
history is constant or rank-deficient. If round-off still breaks the Cholesky
factorization, the regularizer is inflated tenfold up to [`MAX_JITTER_TRIES`] times
before falling back to the burn-in covariance.

```rust
use tuned_mcmc::adaptive::{adaptive_metropolis, AdaptiveConfig};
use tuned_mcmc::distributions::Banana;

let target = Banana::default();
let run = adaptive_metropolis(&target, &[0.0, 0.0], 2_000, &AdaptiveConfig::default(), 1);
assert_eq!(run.n_iter(), 2_000);
```
*/

use nalgebra::{Cholesky, DMatrix, DVector};
use rand::prelude::*;
use rand_distr::StandardNormal;

use crate::core::{metropolis_accept, run_chain, ChainRun, MarkovChain};
use crate::distributions::Target;

/// Number of times the covariance regularizer is inflated before giving up.
pub const MAX_JITTER_TRIES: usize = 6;

/// Asymptotically optimal random-walk scaling for Gaussian targets.
const OPTIMAL_SCALE: f64 = 2.38 * 2.38;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdaptiveConfig {
    /// States up to and including this index use the fixed initial covariance.
    pub burn_in: usize,
    /// Diagonal of the fixed covariance used during burn-in.
    pub initial_variance: f64,
    /// Diagonal regularizer added to the empirical covariance.
    pub epsilon: f64,
    /// Overrides `2.38² / d` when set.
    pub scale: Option<f64>,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            burn_in: 100,
            initial_variance: 0.1,
            epsilon: 1e-6,
            scale: None,
        }
    }
}

impl AdaptiveConfig {
    pub fn burn_in(mut self, burn_in: usize) -> Self {
        self.burn_in = burn_in;
        self
    }

    pub fn initial_variance(mut self, variance: f64) -> Self {
        self.initial_variance = variance;
        self
    }

    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    /// The covariance multiplier for a `dim`-dimensional target.
    pub fn scale_for(&self, dim: usize) -> f64 {
        self.scale.unwrap_or(OPTIMAL_SCALE / dim.max(1) as f64)
    }
}

/// Online mean and covariance of a stream of vectors (Welford's algorithm).
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceTracker {
    n: usize,
    mean: DVector<f64>,
    /// Σ (x - μ)(x - μ)ᵀ over all observed vectors.
    m2: DMatrix<f64>,
}

impl CovarianceTracker {
    pub fn new(dim: usize) -> Self {
        Self {
            n: 0,
            mean: DVector::zeros(dim),
            m2: DMatrix::zeros(dim, dim),
        }
    }

    pub fn update(&mut self, x: &[f64]) {
        self.n += 1;
        let x = DVector::from_column_slice(x);
        let delta = &x - &self.mean;
        self.mean += &delta / self.n as f64;
        let delta2 = x - &self.mean;
        self.m2 += delta * delta2.transpose();
    }

    pub fn count(&self) -> usize {
        self.n
    }

    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    /// Unbiased sample covariance; zero when fewer than two vectors were seen.
    pub fn covariance(&self) -> DMatrix<f64> {
        let dim = self.mean.len();
        if self.n < 2 {
            return DMatrix::zeros(dim, dim);
        }
        // Welford's outer products are only symmetric up to round-off.
        let cov = &self.m2 / (self.n - 1) as f64;
        (&cov + cov.transpose()) * 0.5
    }
}

/// A single adaptive Metropolis chain.
#[derive(Debug, Clone)]
pub struct AdaptiveMetropolis<'a, D: ?Sized> {
    /// The target distribution we want to sample from.
    pub target: &'a D,
    pub config: AdaptiveConfig,
    /// The current state of the chain.
    pub current_state: Vec<f64>,
    /// Random seed.
    pub seed: u64,
    /// Random number generator.
    pub rng: SmallRng,
    current_lp: f64,
    tracker: CovarianceTracker,
    /// 1-based index of the current state.
    index: usize,
    proposal_cov: DMatrix<f64>,
    last_proposal: Option<Vec<f64>>,
    n_accepted: usize,
}

impl<'a, D> AdaptiveMetropolis<'a, D>
where
    D: Target + ?Sized,
{
    pub fn new(target: &'a D, initial_state: &[f64], config: AdaptiveConfig) -> Self {
        let dim = initial_state.len();
        let seed = thread_rng().gen::<u64>();
        let mut tracker = CovarianceTracker::new(dim);
        tracker.update(initial_state);
        let proposal_cov = DMatrix::identity(dim, dim) * config.initial_variance;
        Self {
            target,
            current_state: initial_state.to_vec(),
            seed,
            rng: SmallRng::seed_from_u64(seed),
            current_lp: target.log_density(initial_state),
            tracker,
            index: 1,
            proposal_cov,
            last_proposal: None,
            n_accepted: 0,
            config,
        }
    }

    /// Reseeds the chain's random number generator.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// The proposal covariance used by the most recent step.
    pub fn proposal_covariance(&self) -> &DMatrix<f64> {
        &self.proposal_cov
    }

    /// The candidate evaluated by the most recent step, if any.
    pub fn last_proposal(&self) -> Option<&[f64]> {
        self.last_proposal.as_deref()
    }

    fn burn_in_factor(&self) -> (DMatrix<f64>, DMatrix<f64>) {
        let dim = self.current_state.len();
        let cov = DMatrix::identity(dim, dim) * self.config.initial_variance;
        let chol = DMatrix::identity(dim, dim) * self.config.initial_variance.sqrt();
        (cov, chol)
    }

    /// Covariance and lower Cholesky factor for producing state `index`.
    fn proposal_factor(&self, index: usize) -> (DMatrix<f64>, DMatrix<f64>) {
        if index <= self.config.burn_in {
            return self.burn_in_factor();
        }
        let dim = self.current_state.len();
        let scale = self.config.scale_for(dim);
        let empirical = self.tracker.covariance();
        let mut epsilon = self.config.epsilon;
        for _ in 0..=MAX_JITTER_TRIES {
            let cov = (&empirical + DMatrix::identity(dim, dim) * epsilon) * scale;
            if let Some(chol) = Cholesky::new(cov.clone()) {
                return (cov, chol.l());
            }
            epsilon *= 10.0;
        }
        log::warn!(
            "adaptive covariance not positive-definite at state {index}; using burn-in covariance"
        );
        self.burn_in_factor()
    }
}

impl<D> MarkovChain for AdaptiveMetropolis<'_, D>
where
    D: Target + ?Sized,
{
    /// Performs one update with a multivariate normal proposal `current + L z`,
    /// where `L Lᵀ` is the current proposal covariance and `z ~ N(0, I)`.
    fn step(&mut self) -> &[f64] {
        let next_index = self.index + 1;
        let (cov, chol) = self.proposal_factor(next_index);
        let dim = self.current_state.len();
        let rng = &mut self.rng;
        let z = DVector::from_fn(dim, |_, _| rng.sample::<f64, _>(StandardNormal));
        let proposed = DVector::from_column_slice(&self.current_state) + chol * z;
        let proposed: Vec<f64> = proposed.iter().copied().collect();

        let proposed_lp = self.target.log_density(&proposed);
        if metropolis_accept(&mut self.rng, proposed_lp - self.current_lp) {
            self.current_state.copy_from_slice(&proposed);
            self.current_lp = proposed_lp;
            self.n_accepted += 1;
        }
        self.tracker.update(&self.current_state);
        self.index = next_index;
        self.proposal_cov = cov;
        self.last_proposal = Some(proposed);
        &self.current_state
    }

    fn current_state(&self) -> &[f64] {
        &self.current_state
    }

    fn n_accepted(&self) -> usize {
        self.n_accepted
    }
}

/// Runs a seeded adaptive Metropolis chain of `n_iter` rows from `initial_state`.
pub fn adaptive_metropolis<D>(
    target: &D,
    initial_state: &[f64],
    n_iter: usize,
    config: &AdaptiveConfig,
    seed: u64,
) -> ChainRun
where
    D: Target + ?Sized,
{
    let mut chain = AdaptiveMetropolis::new(target, initial_state, config.clone()).set_seed(seed);
    run_chain(&mut chain, n_iter)
}
