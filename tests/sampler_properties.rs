//! Chain-level properties shared by the fixed-step and adaptive samplers.

use tuned_mcmc::adaptive::{adaptive_metropolis, AdaptiveConfig, AdaptiveMetropolis};
use tuned_mcmc::core::{run_chain, MarkovChain};
use tuned_mcmc::distributions::{
    Banana, GaussianMixture, IsotropicGaussian, SkewNormal, Target, Unsupported,
};
use tuned_mcmc::metropolis_hastings::{rwmh, RandomWalkMetropolis};

#[test]
fn banana_rwmh_acceptance_is_plausible_and_reproducible() {
    let target = Banana::default();
    let first = rwmh(&target, &[0.0, 0.0], 10_000, 1.0, 42);
    let second = rwmh(&target, &[0.0, 0.0], 10_000, 1.0, 42);
    assert_eq!(first.n_accepted, second.n_accepted);
    assert_eq!(first.samples, second.samples);

    let rate = first.acceptance_rate();
    assert!(rate > 0.15 && rate < 0.5, "acceptance rate {rate}");
}

#[test]
fn different_seeds_give_different_chains() {
    let target = Banana::default();
    let a = rwmh(&target, &[0.0, 0.0], 500, 1.0, 1);
    let b = rwmh(&target, &[0.0, 0.0], 500, 1.0, 2);
    assert_ne!(a.samples, b.samples);
}

#[test]
fn acceptance_rate_is_a_fraction_for_every_target() {
    let targets: [&dyn Target; 4] = [
        &Banana::default(),
        &GaussianMixture::default(),
        &SkewNormal::default(),
        &IsotropicGaussian::new(0.5),
    ];
    for (k, target) in targets.iter().enumerate() {
        let seed = 7 + k as u64;
        for sigma in [0.05, 1.0, 20.0] {
            let rate = rwmh(*target, &[0.0, 0.0], 2_000, sigma, seed).acceptance_rate();
            assert!((0.0..=1.0).contains(&rate));
        }
        let adaptive =
            adaptive_metropolis(*target, &[0.0, 0.0], 2_000, &AdaptiveConfig::default(), seed);
        assert!((0.0..=1.0).contains(&adaptive.acceptance_rate()));
    }
}

#[test]
fn point_mass_rejects_every_proposal() {
    let point_mass = Unsupported::origin(3);
    let rw = rwmh(&point_mass, &[0.0, 0.0, 0.0], 1_000, 0.5, 3);
    assert_eq!(rw.n_accepted, 0);
    assert!(rw.samples.iter().all(|&v| v == 0.0));

    let adaptive =
        adaptive_metropolis(&point_mass, &[0.0, 0.0, 0.0], 1_000, &AdaptiveConfig::default(), 3);
    assert_eq!(adaptive.n_accepted, 0);
    assert!(adaptive.samples.iter().all(|&v| v == 0.0));
    assert!(adaptive.ess().iter().all(|&e| e == 1.0));
}

#[test]
fn chains_never_leave_the_support() {
    // Half-plane target: every visited state keeps x0 >= 0.
    let half_plane = |x: &[f64]| {
        if x[0] < 0.0 {
            f64::NEG_INFINITY
        } else {
            -0.5 * x.iter().map(|v| v * v).sum::<f64>()
        }
    };
    let rw = rwmh(&half_plane, &[0.5, 0.0], 3_000, 1.0, 11);
    assert!(rw.samples.column(0).iter().all(|&v| v >= 0.0));
    let adaptive =
        adaptive_metropolis(&half_plane, &[0.5, 0.0], 3_000, &AdaptiveConfig::default(), 11);
    assert!(adaptive.samples.column(0).iter().all(|&v| v >= 0.0));
}

#[test]
fn states_only_change_on_acceptance() {
    let target = GaussianMixture::default();
    let mut rw = RandomWalkMetropolis::new(&target, &[0.0, 0.0], 2.0).set_seed(5);
    let mut am =
        AdaptiveMetropolis::new(&target, &[0.0, 0.0], AdaptiveConfig::default()).set_seed(5);
    let chains: [&mut dyn MarkovChain; 2] = [&mut rw, &mut am];
    for chain in chains {
        let mut previous = chain.current_state().to_vec();
        let mut accepted = chain.n_accepted();
        for _ in 0..1_000 {
            let state = chain.step().to_vec();
            if chain.n_accepted() == accepted {
                assert_eq!(state, previous);
            } else {
                assert_eq!(chain.n_accepted(), accepted + 1);
            }
            accepted = chain.n_accepted();
            previous = state;
        }
    }
}

#[test]
fn run_chain_starts_from_configured_state() {
    let target = SkewNormal::default();
    let mut chain = RandomWalkMetropolis::new(&target, &[1.5, -0.5], 0.8).set_seed(9);
    let run = run_chain(&mut chain, 100);
    assert_eq!(run.samples.row(0).to_vec(), vec![1.5, -0.5]);
    assert_eq!(run.n_iter(), 100);
}
