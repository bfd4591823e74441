//! Expected Improvement and its bounded one-dimensional maximization.
//!
//! The objective is minimized, so improvement means going below the best value
//! observed so far:
//!
//! ```text
//! EI(x) = (f_best - μ(x)) Φ(z) + s(x) φ(z),   z = (f_best - μ(x)) / s(x)
//! ```
//!
//! EI is maximized over `[lower, upper]` by a dense grid followed by golden-section
//! refinement inside the bracket around the best grid point. Candidates are always
//! clamped into the domain. If EI is zero everywhere on the grid, the point of
//! largest posterior variance is chosen instead.

use statrs::distribution::{Continuous, ContinuousCDF, Normal};

use crate::gp::{GaussianProcess, Prediction};

/// Below this standard deviation EI degenerates to the plain improvement.
const MIN_STD: f64 = 1e-12;

const INV_GOLDEN: f64 = 0.618_033_988_749_895;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AcquisitionConfig {
    /// Evenly spaced grid points, endpoints included.
    pub grid_points: usize,
    /// Golden-section iterations inside the best grid bracket.
    pub refine_iters: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            grid_points: 200,
            refine_iters: 40,
        }
    }
}

/// Expected Improvement below `best` for a Gaussian posterior.
pub fn expected_improvement(prediction: &Prediction, best: f64) -> f64 {
    let std = prediction.std_dev();
    let improvement = best - prediction.mean;
    if !std.is_finite() || std < MIN_STD {
        return improvement.max(0.0);
    }
    let z = improvement / std;
    // Unit normal; the parameters are constants.
    let normal = Normal::new(0.0, 1.0).expect("standard normal");
    (improvement * normal.cdf(z) + std * normal.pdf(z)).max(0.0)
}

/// Maximizes `f` over `[lower, upper]`, returning `(argmax, max)`.
///
/// Ties on the grid go to the smallest input. The returned argmax always lies in
/// the closed interval.
pub fn maximize_in_bounds<F>(
    f: F,
    lower: f64,
    upper: f64,
    config: &AcquisitionConfig,
) -> (f64, f64)
where
    F: Fn(f64) -> f64,
{
    let n = config.grid_points.max(2);
    let step = (upper - lower) / (n - 1) as f64;
    let grid_x = |i: usize| if i == n - 1 { upper } else { lower + step * i as f64 };

    let (mut best_i, mut best_val) = (0, f64::NEG_INFINITY);
    for i in 0..n {
        let val = f(grid_x(i));
        if val > best_val {
            best_i = i;
            best_val = val;
        }
    }
    let mut best_x = grid_x(best_i);

    let mut a = grid_x(best_i.saturating_sub(1));
    let mut b = grid_x((best_i + 1).min(n - 1));
    let mut c = b - INV_GOLDEN * (b - a);
    let mut d = a + INV_GOLDEN * (b - a);
    let (mut fc, mut fd) = (f(c), f(d));
    for _ in 0..config.refine_iters {
        if fc > fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INV_GOLDEN * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INV_GOLDEN * (b - a);
            fd = f(d);
        }
    }
    for (x, val) in [(c, fc), (d, fd)] {
        if val > best_val {
            best_x = x;
            best_val = val;
        }
    }
    (best_x.clamp(lower, upper), best_val)
}

/// The next input to evaluate: the EI maximizer over `[lower, upper]`.
pub fn next_candidate(
    gp: &GaussianProcess,
    best: f64,
    lower: f64,
    upper: f64,
    config: &AcquisitionConfig,
) -> f64 {
    let (x, ei) = maximize_in_bounds(
        |x| expected_improvement(&gp.predict(x), best),
        lower,
        upper,
        config,
    );
    if ei > 0.0 {
        return x;
    }
    log::debug!("expected improvement vanished on [{lower}, {upper}]; maximizing variance");
    maximize_in_bounds(|x| gp.predict(x).variance, lower, upper, config).0
}
