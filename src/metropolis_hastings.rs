/*!
# Random-Walk Metropolis Sampler

This module implements the fixed-step random-walk Metropolis sampler (RWMH). Each
iteration perturbs the current state with independent Gaussian noise of standard
deviation `sigma` in every coordinate and accepts the candidate with the usual
Metropolis rule. The proposal is symmetric, so no proposal-density correction
enters the acceptance ratio.

## Overview

- **Target (`D`)**: provides the log-density via the [`Target`] trait.
- **Chain**: [`RandomWalkMetropolis`] owns its current state and a seeded [`SmallRng`],
  so runs are reproducible and independent chains never share a random stream.
- **Runner**: [`rwmh`] runs a chain from a given initial state and returns the
  [`ChainRun`] with its acceptance count.

## Example Usage

```rust
use tuned_mcmc::distributions::IsotropicGaussian;
use tuned_mcmc::metropolis_hastings::rwmh;

let target = IsotropicGaussian::new(1.0);
let run = rwmh(&target, &[0.0, 0.0], 1_000, 1.0, 42);

assert_eq!(run.n_iter(), 1_000);
assert!(run.acceptance_rate() > 0.0 && run.acceptance_rate() < 1.0);
```
*/

use rand::prelude::*;
use rand_distr::StandardNormal;

use crate::core::{metropolis_accept, run_chain, ChainRun, MarkovChain};
use crate::distributions::Target;

/// A single random-walk Metropolis chain.
///
/// The chain caches the log-density of its current state, so each step costs one
/// target evaluation.
#[derive(Debug, Clone)]
pub struct RandomWalkMetropolis<'a, D: ?Sized> {
    /// The target distribution we want to sample from.
    pub target: &'a D,
    /// Standard deviation of the isotropic proposal.
    pub sigma: f64,
    /// The current state of the chain.
    pub current_state: Vec<f64>,
    /// Random seed.
    pub seed: u64,
    /// Random number generator.
    pub rng: SmallRng,
    current_lp: f64,
    last_proposal: Option<Vec<f64>>,
    n_accepted: usize,
}

impl<'a, D> RandomWalkMetropolis<'a, D>
where
    D: Target + ?Sized,
{
    /**
    Creates a new chain at `initial_state`.

    `sigma` must be positive; it is not validated here.

    # Examples

    ```rust
    use tuned_mcmc::distributions::Banana;
    use tuned_mcmc::metropolis_hastings::RandomWalkMetropolis;

    let target = Banana::default();
    let chain = RandomWalkMetropolis::new(&target, &[0.0, 0.0], 0.5).set_seed(7);
    assert_eq!(chain.current_state, vec![0.0, 0.0]);
    assert_eq!(chain.seed, 7);
    ```
    */
    pub fn new(target: &'a D, initial_state: &[f64], sigma: f64) -> Self {
        let seed = thread_rng().gen::<u64>();
        Self {
            target,
            sigma,
            current_state: initial_state.to_vec(),
            seed,
            rng: SmallRng::seed_from_u64(seed),
            current_lp: target.log_density(initial_state),
            last_proposal: None,
            n_accepted: 0,
        }
    }

    /// Reseeds the chain's random number generator.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// The candidate evaluated by the most recent step, if any.
    pub fn last_proposal(&self) -> Option<&[f64]> {
        self.last_proposal.as_deref()
    }
}

impl<D> MarkovChain for RandomWalkMetropolis<'_, D>
where
    D: Target + ?Sized,
{
    /**
    Performs one random-walk Metropolis update.

    The candidate is `current + sigma * eps` with `eps ~ N(0, I)`, and

    \[
    \Delta = \log p(\text{proposed}) - \log p(\text{current}).
    \]

    The candidate is accepted iff `Δ` is finite and `log(U) < Δ` for `U ~ Uniform(0, 1)`;
    otherwise the current state is retained.
    */
    fn step(&mut self) -> &[f64] {
        let sigma = self.sigma;
        let rng = &mut self.rng;
        let proposed: Vec<f64> = self
            .current_state
            .iter()
            .map(|x| x + sigma * rng.sample::<f64, _>(StandardNormal))
            .collect();
        let proposed_lp = self.target.log_density(&proposed);
        let log_accept_ratio = proposed_lp - self.current_lp;
        if metropolis_accept(&mut self.rng, log_accept_ratio) {
            self.current_state.copy_from_slice(&proposed);
            self.current_lp = proposed_lp;
            self.n_accepted += 1;
        }
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

/// Runs a seeded random-walk Metropolis chain of `n_iter` rows from `initial_state`.
pub fn rwmh<D>(target: &D, initial_state: &[f64], n_iter: usize, sigma: f64, seed: u64) -> ChainRun
where
    D: Target + ?Sized,
{
    let mut chain = RandomWalkMetropolis::new(target, initial_state, sigma).set_seed(seed);
    run_chain(&mut chain, n_iter)
}
