//! Chain-running primitives shared by every sampler.
//!
//! A sampler implements [`MarkovChain`]; the functions in this module drive it for a
//! fixed number of iterations and collect the visited states into a [`ChainRun`].
//! Row 0 of every run is the chain's initial state, so a run of `n_iter` rows
//! performs `n_iter - 1` Metropolis updates.

use std::time::Instant;

use indicatif::ProgressBar;
use ndarray::{Array1, Array2};
use rand::Rng;

use crate::stats;

pub trait MarkovChain {
    /// Does one iteration of the chain, returning the new current state.
    fn step(&mut self) -> &[f64];

    /// Returns the current state without stepping.
    fn current_state(&self) -> &[f64];

    /// Number of proposals accepted since the chain was created.
    fn n_accepted(&self) -> usize;
}

/// The rows visited by one chain together with its acceptance count.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainRun {
    /// `n_iter × d` matrix of states; row 0 is the initial state.
    pub samples: Array2<f64>,
    /// Accepted proposals during this run (at most `n_iter - 1`).
    pub n_accepted: usize,
}

impl ChainRun {
    pub fn n_iter(&self) -> usize {
        self.samples.nrows()
    }

    pub fn dim(&self) -> usize {
        self.samples.ncols()
    }

    /// Accepted proposals divided by the number of rows in the run.
    pub fn acceptance_rate(&self) -> f64 {
        if self.n_iter() == 0 {
            return 0.0;
        }
        self.n_accepted as f64 / self.n_iter() as f64
    }

    /// Per-coordinate effective sample size of the run.
    pub fn ess(&self) -> Array1<f64> {
        stats::ess(self.samples.view())
    }
}

/// Metropolis acceptance test on a log ratio.
///
/// The uniform variate is always drawn so the random stream advances by the same
/// amount whether or not the ratio is finite. Non-finite ratios always reject.
pub(crate) fn metropolis_accept<R: Rng>(rng: &mut R, log_ratio: f64) -> bool {
    let u: f64 = rng.gen();
    if !log_ratio.is_finite() {
        return false;
    }
    u.ln() < log_ratio
}

pub fn run_chain<M>(chain: &mut M, n_iter: usize) -> ChainRun
where
    M: MarkovChain + ?Sized,
{
    run_chain_inner(chain, n_iter, None, None)
        .unwrap_or_else(|| unreachable!("chain run without a deadline cannot time out"))
}

pub fn run_chain_with_progress<M>(chain: &mut M, n_iter: usize, pb: &ProgressBar) -> ChainRun
where
    M: MarkovChain + ?Sized,
{
    pb.set_length(n_iter as u64);
    run_chain_inner(chain, n_iter, None, Some(pb))
        .unwrap_or_else(|| unreachable!("chain run without a deadline cannot time out"))
}

/// Runs the chain like [`run_chain`] but gives up once `deadline` has passed.
///
/// The deadline is only checked between iterations. Returns `None` on timeout; the
/// chain keeps whatever state it had reached.
pub fn run_chain_until<M>(chain: &mut M, n_iter: usize, deadline: Instant) -> Option<ChainRun>
where
    M: MarkovChain + ?Sized,
{
    run_chain_inner(chain, n_iter, Some(deadline), None)
}

fn run_chain_inner<M>(
    chain: &mut M,
    n_iter: usize,
    deadline: Option<Instant>,
    pb: Option<&ProgressBar>,
) -> Option<ChainRun>
where
    M: MarkovChain + ?Sized,
{
    let dim = chain.current_state().len();
    let mut out = Array2::<f64>::zeros((n_iter, dim));
    if n_iter == 0 {
        return Some(ChainRun {
            samples: out,
            n_accepted: 0,
        });
    }

    let accepted_before = chain.n_accepted();
    out.row_mut(0)
        .iter_mut()
        .zip(chain.current_state())
        .for_each(|(o, &x)| *o = x);

    for i in 1..n_iter {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return None;
            }
        }
        let state = chain.step();
        out.row_mut(i)
            .iter_mut()
            .zip(state)
            .for_each(|(o, &x)| *o = x);
        if let Some(pb) = pb {
            pb.inc(1);
        }
    }

    Some(ChainRun {
        samples: out,
        n_accepted: chain.n_accepted() - accepted_before,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::time::Duration;

    /// Deterministic chain that alternates between accepting a +1 move and rejecting.
    struct Counter {
        state: Vec<f64>,
        steps: usize,
        accepted: usize,
    }

    impl MarkovChain for Counter {
        fn step(&mut self) -> &[f64] {
            self.steps += 1;
            if self.steps % 2 == 1 {
                self.state[0] += 1.0;
                self.accepted += 1;
            }
            &self.state
        }

        fn current_state(&self) -> &[f64] {
            &self.state
        }

        fn n_accepted(&self) -> usize {
            self.accepted
        }
    }

    fn counter() -> Counter {
        Counter {
            state: vec![0.0, 5.0],
            steps: 0,
            accepted: 0,
        }
    }

    #[test]
    fn first_row_is_initial_state() {
        let run = run_chain(&mut counter(), 5);
        assert_eq!(run.n_iter(), 5);
        assert_eq!(run.dim(), 2);
        assert_eq!(run.samples.row(0).to_vec(), vec![0.0, 5.0]);
        assert_eq!(run.samples.column(0).to_vec(), vec![0.0, 1.0, 1.0, 2.0, 2.0]);
        assert_eq!(run.n_accepted, 2);
        assert!((run.acceptance_rate() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn acceptance_counts_are_per_run() {
        let mut chain = counter();
        let _ = run_chain(&mut chain, 4);
        let second = run_chain(&mut chain, 4);
        // The second run starts where the first stopped.
        assert_eq!(second.samples[[0, 0]], 2.0);
        assert_eq!(second.n_accepted, 1);
    }

    #[test]
    fn empty_run() {
        let run = run_chain(&mut counter(), 0);
        assert_eq!(run.n_iter(), 0);
        assert_eq!(run.acceptance_rate(), 0.0);
    }

    #[test]
    fn expired_deadline_times_out() {
        let deadline = Instant::now();
        assert!(run_chain_until(&mut counter(), 10, deadline).is_none());
    }

    #[test]
    fn generous_deadline_completes() {
        let deadline = Instant::now() + Duration::from_secs(60);
        let run = run_chain_until(&mut counter(), 10, deadline).unwrap();
        assert_eq!(run, run_chain(&mut counter(), 10));
    }

    #[test]
    fn progress_bar_tracks_iterations() {
        let pb = ProgressBar::hidden();
        let run = run_chain_with_progress(&mut counter(), 7, &pb);
        assert_eq!(run.n_iter(), 7);
        assert_eq!(pb.position(), 6);
    }

    #[test]
    fn non_finite_ratios_reject() {
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..100 {
            assert!(!metropolis_accept(&mut rng, f64::NAN));
            assert!(!metropolis_accept(&mut rng, f64::INFINITY));
            assert!(!metropolis_accept(&mut rng, f64::NEG_INFINITY));
        }
    }

    #[test]
    fn positive_ratio_always_accepts() {
        let mut rng = SmallRng::seed_from_u64(2);
        assert!((0..100).all(|_| metropolis_accept(&mut rng, 0.5)));
    }
}
