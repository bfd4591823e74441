//! Side-by-side comparison of the three sampling strategies on one target.
//!
//! A [`ComparisonHarness`] runs fixed-step RWMH, the adaptive Metropolis sampler and
//! the BO-tuned RWMH from the same initial state with the same number of rows, then
//! reduces every chain to a [`ComparisonResult`]. Each method owns its seed
//! (`seed + k` for the `k`-th method), so the three runs are independent units of
//! work and [`ComparisonHarness::run_parallel`] returns exactly what
//! [`ComparisonHarness::run`] does.
//!
//! ESS per second divides the mean ESS by the wall time spent producing the chain.
//! For the tuned method that includes the whole search. The time spent estimating
//! ESS is kept apart in [`MethodRun::ess_elapsed`].

use std::fmt;
use std::time::{Duration, Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use ndarray::Array1;
use rayon::prelude::*;

use crate::adaptive::{adaptive_metropolis, AdaptiveConfig};
use crate::core::ChainRun;
use crate::distributions::Target;
use crate::error::{Error, Result};
use crate::metropolis_hastings::rwmh;
use crate::stats::EssSummary;
use crate::tuner::{BayesianTuner, TunerConfig};

/// Floor on the sampling time used for ESS per second.
const MIN_ELAPSED_SECS: f64 = 1e-9;

/// The closed set of strategies a harness can run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Method {
    RandomWalk { sigma: f64 },
    Adaptive(AdaptiveConfig),
    Tuned(TunerConfig),
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Method::RandomWalk { .. } => "RWMH",
            Method::Adaptive(_) => "Adaptive",
            Method::Tuned(_) => "BO-tuned RWMH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComparisonConfig {
    /// Rows per chain, shared by all methods.
    pub n_iter: usize,
    /// Step size of the untuned RWMH baseline.
    pub rwmh_sigma: f64,
    pub adaptive: AdaptiveConfig,
    /// Search settings of the tuned method. Its `n_iter`, `seed` and
    /// `initial_state` are overridden by the harness.
    pub tuner: TunerConfig,
    /// Base seed; method `k` uses `seed + k`.
    pub seed: u64,
    /// Shared starting point; `None` is the zero vector.
    pub initial_state: Option<Vec<f64>>,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            n_iter: 10_000,
            rwmh_sigma: 1.0,
            adaptive: AdaptiveConfig::default(),
            tuner: TunerConfig::default(),
            seed: 42,
            initial_state: None,
        }
    }
}

impl ComparisonConfig {
    pub fn n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    pub fn rwmh_sigma(mut self, sigma: f64) -> Self {
        self.rwmh_sigma = sigma;
        self
    }

    pub fn adaptive(mut self, adaptive: AdaptiveConfig) -> Self {
        self.adaptive = adaptive;
        self
    }

    pub fn tuner(mut self, tuner: TunerConfig) -> Self {
        self.tuner = tuner;
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

    /// The three methods in run order.
    pub fn methods(&self) -> [Method; 3] {
        [
            Method::RandomWalk {
                sigma: self.rwmh_sigma,
            },
            Method::Adaptive(self.adaptive.clone()),
            Method::Tuned(self.tuner.clone()),
        ]
    }
}

/// One method's chain together with its timings.
#[derive(Debug, Clone)]
pub struct MethodRun {
    pub method: Method,
    pub chain: ChainRun,
    /// Per-coordinate ESS of `chain`.
    pub ess: Array1<f64>,
    /// Wall time spent producing the chain, tuning included.
    pub elapsed: Duration,
    /// Wall time spent estimating ESS.
    pub ess_elapsed: Duration,
    /// Step size chosen by the tuner, for the tuned method.
    pub tuned_sigma: Option<f64>,
}

impl MethodRun {
    pub fn ess_summary(&self) -> EssSummary {
        EssSummary::from_ess(&self.ess)
    }

    pub fn ess_seconds(&self) -> f64 {
        self.ess_elapsed.as_secs_f64()
    }

    pub fn result(&self, target: &str) -> ComparisonResult {
        let summary = self.ess_summary();
        ComparisonResult {
            method: self.method.name().to_string(),
            target: target.to_string(),
            acceptance_rate: self.chain.acceptance_rate(),
            min_ess: summary.min,
            mean_ess: summary.mean,
            ess_per_sec: summary.mean / self.elapsed.as_secs_f64().max(MIN_ELAPSED_SECS),
        }
    }
}

/// One row of the comparison table.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComparisonResult {
    pub method: String,
    pub target: String,
    pub acceptance_rate: f64,
    pub min_ess: f64,
    pub mean_ess: f64,
    pub ess_per_sec: f64,
}

impl fmt::Display for ComparisonResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<14} {:<16} {:>10.3} {:>10.1} {:>10.1} {:>12.1}",
            self.method,
            self.target,
            self.acceptance_rate,
            self.min_ess,
            self.mean_ess,
            self.ess_per_sec
        )
    }
}

/// Renders results as a fixed-width table with a header row.
pub fn format_table(results: &[ComparisonResult]) -> String {
    let mut out = format!(
        "{:<14} {:<16} {:>10} {:>10} {:>10} {:>12}\n",
        "method", "target", "accept", "min ESS", "mean ESS", "ESS/sec"
    );
    for result in results {
        out.push_str(&result.to_string());
        out.push('\n');
    }
    out
}

/// Everything produced by one harness invocation.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub target: String,
    /// Method runs in [`ComparisonConfig::methods`] order.
    pub runs: Vec<MethodRun>,
    pub results: Vec<ComparisonResult>,
}

impl Comparison {
    fn from_runs(target: &str, runs: Vec<MethodRun>) -> Self {
        let results = runs.iter().map(|run| run.result(target)).collect();
        Self {
            target: target.to_string(),
            runs,
            results,
        }
    }
}

pub struct ComparisonHarness<'a, D: ?Sized> {
    target: &'a D,
    name: String,
    dim: usize,
    config: ComparisonConfig,
}

impl<'a, D> ComparisonHarness<'a, D>
where
    D: Target + ?Sized,
{
    pub fn new(
        target: &'a D,
        name: impl Into<String>,
        dim: usize,
        config: ComparisonConfig,
    ) -> Self {
        Self {
            target,
            name: name.into(),
            dim,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ComparisonConfig {
        &self.config
    }

    pub fn validate(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(Error::InvalidConfig("target dimension must be positive".into()));
        }
        if self.config.n_iter < 2 {
            return Err(Error::InvalidConfig(format!(
                "chains need at least 2 rows, got {}",
                self.config.n_iter
            )));
        }
        if let Some(state) = &self.config.initial_state {
            if state.len() != self.dim {
                return Err(Error::DimensionMismatch {
                    expected: self.dim,
                    found: state.len(),
                });
            }
        }
        Ok(())
    }

    fn initial_state(&self) -> Vec<f64> {
        self.config
            .initial_state
            .clone()
            .unwrap_or_else(|| vec![0.0; self.dim])
    }

    /// Runs a single method with the given seed and times it.
    pub fn run_method(&self, method: &Method, seed: u64) -> Result<MethodRun> {
        self.validate()?;
        let initial_state = self.initial_state();
        let n_iter = self.config.n_iter;

        let start = Instant::now();
        let (chain, tuned_sigma) = match method {
            Method::RandomWalk { sigma } => {
                (rwmh(self.target, &initial_state, n_iter, *sigma, seed), None)
            }
            Method::Adaptive(config) => (
                adaptive_metropolis(self.target, &initial_state, n_iter, config, seed),
                None,
            ),
            Method::Tuned(config) => {
                let config = config
                    .clone()
                    .n_iter(n_iter)
                    .set_seed(seed)
                    .initial_state(Some(initial_state));
                let outcome = BayesianTuner::new(self.target, self.dim, config).run()?;
                (outcome.chain, Some(outcome.sigma))
            }
        };
        let elapsed = start.elapsed();

        let ess_start = Instant::now();
        let ess = chain.ess();
        let ess_elapsed = ess_start.elapsed();

        let run = MethodRun {
            method: method.clone(),
            chain,
            ess,
            elapsed,
            ess_elapsed,
            tuned_sigma,
        };
        log::info!(
            "{} on {}: acceptance {:.3}, {}, {:.2?}",
            method,
            self.name,
            run.chain.acceptance_rate(),
            run.ess_summary(),
            elapsed
        );
        Ok(run)
    }

    /// Runs the three methods one after another.
    pub fn run(&self) -> Result<Comparison> {
        self.run_observed(|_| {})
    }

    fn run_observed<F>(&self, on_done: F) -> Result<Comparison>
    where
        F: Fn(&Method),
    {
        self.validate()?;
        let runs = self
            .config
            .methods()
            .iter()
            .enumerate()
            .map(|(k, method)| {
                let run = self.run_method(method, self.config.seed.wrapping_add(k as u64));
                on_done(method);
                run
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Comparison::from_runs(&self.name, runs))
    }

    /// Runs the three methods on the rayon pool. Same output as [`Self::run`].
    pub fn run_parallel(&self) -> Result<Comparison> {
        self.validate()?;
        let runs = self
            .config
            .methods()
            .par_iter()
            .enumerate()
            .map(|(k, method)| self.run_method(method, self.config.seed.wrapping_add(k as u64)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Comparison::from_runs(&self.name, runs))
    }
}

/// Compares all methods on many `(name, target, dim)` triples in parallel.
///
/// Each target gets its own progress bar ticking once per finished method. Results
/// come back in input order.
pub fn compare_targets(
    targets: &[(&str, &dyn Target, usize)],
    config: &ComparisonConfig,
) -> Result<Vec<Comparison>> {
    let multi = MultiProgress::new();
    let pb_style = ProgressStyle::default_bar()
        .template("{prefix:<14} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

    targets
        .par_iter()
        .map(|&(name, target, dim)| {
            let harness = ComparisonHarness::new(target, name, dim, config.clone());
            let pb = multi.add(ProgressBar::new(3));
            pb.set_prefix(name.to_string());
            pb.set_style(pb_style.clone());

            let comparison = harness.run_observed(|method| {
                pb.set_message(method.name());
                pb.inc(1);
            });
            pb.finish_with_message("Done!");
            comparison
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::{Banana, IsotropicGaussian};

    fn quick_config() -> ComparisonConfig {
        ComparisonConfig::default()
            .n_iter(1_000)
            .tuner(TunerConfig::default().budget(3).pilot_iter(300))
    }

    #[test]
    fn methods_in_fixed_order() {
        let names: Vec<_> = ComparisonConfig::default()
            .methods()
            .iter()
            .map(Method::name)
            .collect();
        assert_eq!(names, vec!["RWMH", "Adaptive", "BO-tuned RWMH"]);
    }

    #[test]
    fn random_walk_method_reproduces_rwmh() {
        let target = Banana::default();
        let harness = ComparisonHarness::new(&target, "banana", 2, quick_config());
        let run = harness
            .run_method(&Method::RandomWalk { sigma: 0.7 }, 9)
            .unwrap();
        let direct = rwmh(&target, &[0.0, 0.0], 1_000, 0.7, 9);
        assert_eq!(run.chain, direct);
        assert_eq!(run.tuned_sigma, None);
        assert_eq!(run.ess.len(), 2);
    }

    #[test]
    fn results_are_well_formed() {
        let target = IsotropicGaussian::new(1.0);
        let comparison = ComparisonHarness::new(&target, "gauss", 3, quick_config())
            .run()
            .unwrap();
        assert_eq!(comparison.target, "gauss");
        assert_eq!(comparison.runs.len(), 3);
        assert_eq!(comparison.results.len(), 3);
        for (run, result) in comparison.runs.iter().zip(&comparison.results) {
            assert_eq!(result.method, run.method.name());
            assert_eq!(result.target, "gauss");
            assert_eq!(run.chain.n_iter(), 1_000);
            assert_eq!(run.chain.samples.row(0).to_vec(), vec![0.0; 3]);
            assert!((0.0..=1.0).contains(&result.acceptance_rate));
            assert!(result.min_ess >= 1.0 && result.min_ess <= result.mean_ess);
            assert!(result.mean_ess <= 1_000.0);
            assert!(result.ess_per_sec > 0.0);
        }
        let tuned = comparison.runs[2].tuned_sigma.unwrap();
        assert!((0.1..=5.0).contains(&tuned));
    }

    #[test]
    fn mismatched_initial_state_is_an_error() {
        let target = IsotropicGaussian::new(1.0);
        let config = quick_config().initial_state(Some(vec![1.0]));
        let harness = ComparisonHarness::new(&target, "gauss", 2, config);
        assert!(matches!(
            harness.run(),
            Err(Error::DimensionMismatch {
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn table_lists_every_row() {
        let row = ComparisonResult {
            method: "RWMH".into(),
            target: "banana".into(),
            acceptance_rate: 0.25,
            min_ess: 120.0,
            mean_ess: 150.5,
            ess_per_sec: 3000.0,
        };
        let table = format_table(&[row.clone(), row]);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("ESS/sec"));
        assert!(lines[1].starts_with("RWMH"));
        assert!(lines[1].contains("banana"));
        assert!(lines[1].contains("0.250"));
        assert!(lines[1].contains("150.5"));
    }
}
