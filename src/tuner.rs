/*!
Bayesian-optimization tuning of the random-walk step size.

The tuner minimizes

```text
objective(σ) = +∞                                   if σ ≤ 0
             = -mean ESS(pilot RWMH chain with σ)   otherwise
```

over a domain `[lower, upper]`. It evaluates a handful of evenly spaced step sizes,
then spends a fixed budget of rounds, each one refitting the [`GaussianProcess`]
surrogate on every observation so far and evaluating the true objective where the
Expected Improvement is largest. The best observed step size then drives a
full-length RWMH chain.

Every pilot run uses the same seed, so the surrogate compares step sizes under
common random numbers. A pilot that runs past its time budget scores
[`TIMEOUT_PENALTY`], and a shared cancellation flag stops the search between
rounds.

# Examples

```rust
use tuned_mcmc::distributions::IsotropicGaussian;
use tuned_mcmc::tuner::{BayesianTuner, TunerConfig};

let target = IsotropicGaussian::new(1.0);
let config = TunerConfig::default().budget(3).pilot_iter(200).n_iter(500);
let outcome = BayesianTuner::new(&target, 2, config).run().unwrap();

assert!((0.1..=5.0).contains(&outcome.sigma));
assert_eq!(outcome.chain.n_iter(), 500);
```
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::acquisition::{next_candidate, AcquisitionConfig};
use crate::core::{run_chain, run_chain_until, ChainRun};
use crate::distributions::Target;
use crate::error::{Error, Result};
use crate::gp::{DesignSet, GaussianProcess, GpConfig};
use crate::metropolis_hastings::{rwmh, RandomWalkMetropolis};
use crate::stats::EssSummary;

/// Objective assigned to a pilot run that exceeded its time budget.
///
/// Every real objective is at most `-MIN_ESS = -1`, so a timed-out step size never
/// beats one that finished. `+∞` is not used because the surrogate fit needs finite
/// observations.
pub const TIMEOUT_PENALTY: f64 = 0.0;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TunerConfig {
    /// Smallest step size the search may evaluate.
    pub lower: f64,
    /// Largest step size the search may evaluate.
    pub upper: f64,
    /// Evenly spaced evaluations before the first surrogate fit.
    pub n_initial: usize,
    /// Surrogate-guided rounds after the initial design.
    pub budget: usize,
    /// Rows per pilot chain.
    pub pilot_iter: usize,
    /// Wall-time budget per pilot chain; `None` never times out.
    pub pilot_timeout: Option<Duration>,
    /// Rows of the final chain run with the selected step size.
    pub n_iter: usize,
    /// Seed of the final chain. Pilot chains use `seed + 1`.
    pub seed: u64,
    /// Starting point of every chain; `None` is the zero vector.
    pub initial_state: Option<Vec<f64>>,
    pub gp: GpConfig,
    pub acquisition: AcquisitionConfig,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            lower: 0.1,
            upper: 5.0,
            n_initial: 5,
            budget: 30,
            pilot_iter: 1_000,
            pilot_timeout: Some(Duration::from_secs(30)),
            n_iter: 10_000,
            seed: 42,
            initial_state: None,
            gp: GpConfig::default(),
            acquisition: AcquisitionConfig::default(),
        }
    }
}

impl TunerConfig {
    pub fn domain(mut self, lower: f64, upper: f64) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    pub fn n_initial(mut self, n_initial: usize) -> Self {
        self.n_initial = n_initial;
        self
    }

    pub fn budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    pub fn pilot_iter(mut self, pilot_iter: usize) -> Self {
        self.pilot_iter = pilot_iter;
        self
    }

    pub fn pilot_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pilot_timeout = timeout;
        self
    }

    pub fn n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn initial_state(mut self, initial_state: Option<Vec<f64>>) -> Self {
        self.initial_state = initial_state;
        self
    }

    pub fn gp(mut self, gp: GpConfig) -> Self {
        self.gp = gp;
        self
    }

    pub fn acquisition(mut self, acquisition: AcquisitionConfig) -> Self {
        self.acquisition = acquisition;
        self
    }

    /// Checks the search domain and design sizes.
    pub fn validate_search(&self) -> Result<()> {
        if !(self.lower.is_finite() && self.upper.is_finite() && 0.0 < self.lower)
            || self.lower >= self.upper
        {
            return Err(Error::InvalidDomain {
                lower: self.lower,
                upper: self.upper,
            });
        }
        if self.n_initial == 0 {
            return Err(Error::InvalidConfig(
                "the initial design needs at least one point".into(),
            ));
        }
        Ok(())
    }

    /// Checks everything a tuning run on a `dim`-dimensional target relies on.
    pub fn validate(&self, dim: usize) -> Result<()> {
        self.validate_search()?;
        if dim == 0 {
            return Err(Error::InvalidConfig("target dimension must be positive".into()));
        }
        if self.pilot_iter < 2 || self.n_iter < 2 {
            return Err(Error::InvalidConfig(format!(
                "chains need at least 2 rows (pilot_iter = {}, n_iter = {})",
                self.pilot_iter, self.n_iter
            )));
        }
        if let Some(state) = &self.initial_state {
            if state.len() != dim {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    found: state.len(),
                });
            }
        }
        Ok(())
    }

    /// Evenly spaced initial step sizes, both endpoints included.
    ///
    /// A single initial point sits at the middle of the domain.
    pub fn initial_points(&self) -> Vec<f64> {
        match self.n_initial {
            0 => Vec::new(),
            1 => vec![0.5 * (self.lower + self.upper)],
            n => {
                let step = (self.upper - self.lower) / (n - 1) as f64;
                (0..n)
                    .map(|i| {
                        if i == n - 1 {
                            self.upper
                        } else {
                            self.lower + step * i as f64
                        }
                    })
                    .collect()
            }
        }
    }
}

/// Observations gathered by a search, in evaluation order.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchTrace {
    pub design: DesignSet,
    /// Surrogate-guided rounds that ran to completion.
    pub rounds_completed: usize,
    /// Whether the cancellation flag stopped the search early.
    pub cancelled: bool,
}

/// Minimizes a scalar objective over `[config.lower, config.upper]`.
///
/// The initial design is always evaluated in full. Afterwards `cancel` is checked
/// once before every round; evaluations themselves are never interrupted. Every
/// input handed to `objective` lies inside the domain.
pub fn minimize<F>(
    mut objective: F,
    config: &TunerConfig,
    cancel: Option<&AtomicBool>,
) -> Result<SearchTrace>
where
    F: FnMut(f64) -> f64,
{
    config.validate_search()?;

    let mut design = DesignSet::new();
    for sigma in config.initial_points() {
        let value = objective(sigma);
        log::debug!("initial design: objective({sigma:.4}) = {value:.4}");
        design.push(sigma, value);
    }

    let mut rounds_completed = 0;
    let mut cancelled = false;
    for round in 0..config.budget {
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            log::info!("search cancelled after {round} of {} rounds", config.budget);
            cancelled = true;
            break;
        }
        let gp = GaussianProcess::fit(&design, &config.gp)?;
        let best = design.best().ok_or(Error::EmptyDesign)?.value;
        let sigma = next_candidate(&gp, best, config.lower, config.upper, &config.acquisition);
        let value = objective(sigma);
        log::debug!(
            "round {}/{}: objective({sigma:.4}) = {value:.4}, best so far {:.4}",
            round + 1,
            config.budget,
            best.min(value)
        );
        design.push(sigma, value);
        rounds_completed += 1;
    }

    Ok(SearchTrace {
        design,
        rounds_completed,
        cancelled,
    })
}

/// Result of a complete tuning run.
#[derive(Debug, Clone, PartialEq)]
pub struct TuningOutcome {
    /// Step size with the lowest observed objective.
    pub sigma: f64,
    pub best_objective: f64,
    pub design: DesignSet,
    /// Full-length RWMH chain run with `sigma`.
    pub chain: ChainRun,
    pub rounds_completed: usize,
    pub cancelled: bool,
}

impl TuningOutcome {
    pub fn acceptance_rate(&self) -> f64 {
        self.chain.acceptance_rate()
    }
}

pub struct BayesianTuner<'a, D: ?Sized> {
    target: &'a D,
    dim: usize,
    config: TunerConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a, D> BayesianTuner<'a, D>
where
    D: Target + ?Sized,
{
    pub fn new(target: &'a D, dim: usize, config: TunerConfig) -> Self {
        Self {
            target,
            dim,
            config,
            cancel: None,
        }
    }

    /// Stops the search at the next round boundary once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    fn initial_state(&self) -> Vec<f64> {
        self.config
            .initial_state
            .clone()
            .unwrap_or_else(|| vec![0.0; self.dim])
    }

    /// Negative mean ESS of a pilot chain with step size `sigma`.
    pub fn objective(&self, sigma: f64) -> f64 {
        if sigma.is_nan() || sigma <= 0.0 {
            return f64::INFINITY;
        }
        let initial_state = self.initial_state();
        let mut chain = RandomWalkMetropolis::new(self.target, &initial_state, sigma)
            .set_seed(self.config.seed.wrapping_add(1));
        let deadline = self
            .config
            .pilot_timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));
        let pilot = match deadline {
            Some(deadline) => match run_chain_until(&mut chain, self.config.pilot_iter, deadline) {
                Some(pilot) => pilot,
                None => {
                    log::warn!(
                        "pilot run with sigma = {sigma:.4} exceeded {:?}; penalizing",
                        self.config.pilot_timeout.unwrap_or_default()
                    );
                    return TIMEOUT_PENALTY;
                }
            },
            None => run_chain(&mut chain, self.config.pilot_iter),
        };
        -EssSummary::from_ess(&pilot.ess()).mean
    }

    /// Runs the search without the final chain.
    pub fn search(&self) -> Result<SearchTrace> {
        self.config.validate(self.dim)?;
        minimize(
            |sigma| self.objective(sigma),
            &self.config,
            self.cancel.as_deref(),
        )
    }

    /// Searches for the best step size, then runs the full chain with it.
    pub fn run(&self) -> Result<TuningOutcome> {
        let trace = self.search()?;
        let best = trace.design.best().ok_or(Error::EmptyDesign)?;
        log::info!(
            "selected sigma = {:.4} (objective {:.2}) from {} evaluations",
            best.input,
            best.value,
            trace.design.len()
        );
        let chain = rwmh(
            self.target,
            &self.initial_state(),
            self.config.n_iter,
            best.input,
            self.config.seed,
        );
        Ok(TuningOutcome {
            sigma: best.input,
            best_objective: best.value,
            design: trace.design,
            chain,
            rounds_completed: trace.rounds_completed,
            cancelled: trace.cancelled,
        })
    }
}
