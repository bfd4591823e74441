//! Runs fixed-step RWMH, adaptive Metropolis and BO-tuned RWMH on the banana,
//! two-mode mixture and skew-normal targets, then prints the comparison table.

use std::error::Error;

use tuned_mcmc::compare::{compare_targets, format_table, ComparisonConfig};
use tuned_mcmc::distributions::{Banana, GaussianMixture, SkewNormal, Target};

fn main() -> Result<(), Box<dyn Error>> {
    const DIM: usize = 2;
    const N_ITER: usize = 10_000;
    const SEED: u64 = 42;

    let banana = Banana::default();
    let mixture = GaussianMixture::default();
    let skew = SkewNormal::default();
    let targets: [(&str, &dyn Target, usize); 3] = [
        ("banana", &banana, DIM),
        ("mixture", &mixture, DIM),
        ("skew-normal", &skew, DIM),
    ];

    let config = ComparisonConfig::default().n_iter(N_ITER).set_seed(SEED);
    let comparisons = compare_targets(&targets, &config)?;

    let results: Vec<_> = comparisons
        .iter()
        .flat_map(|c| c.results.iter().cloned())
        .collect();
    println!("{}", format_table(&results));

    for comparison in &comparisons {
        for run in comparison.runs.iter().filter(|r| r.tuned_sigma.is_some()) {
            println!(
                "{}: tuned sigma = {:.3}, ESS estimation took {:.3}s",
                comparison.target,
                run.tuned_sigma.unwrap_or_default(),
                run.ess_seconds()
            );
        }
    }

    #[cfg(feature = "csv")]
    {
        tuned_mcmc::io::csv::save_comparison_csv(&results, "comparison.csv")?;
        println!("Saved comparison table to comparison.csv");
    }

    Ok(())
}
