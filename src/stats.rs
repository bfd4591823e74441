//! Effective sample size of a single chain.
//!
//! Each coordinate of an `n × d` chain is treated as its own scalar time series.
//! Autocorrelations come from the FFT of the zero-padded, centered series (brute
//! force for short series), and the integrated autocorrelation time is summed with
//! Geyer's initial monotone sequence estimator:
//!
//! ```text
//! P_k = ρ_{2k} + ρ_{2k+1},   summed while P_k > 0 and clipped to be non-increasing
//! τ   = -1 + 2 Σ_k P_k
//! ESS = n / τ
//! ```
//!
//! The estimate is clamped to `[MIN_ESS, n]`. A coordinate whose series is constant
//! (the chain never moved) has ESS [`MIN_ESS`].

use std::fmt;

use ndarray::prelude::*;
use ndarray_stats::QuantileExt;
use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

/// ESS reported for a coordinate that carries no information beyond one draw.
pub const MIN_ESS: f64 = 1.0;

/// Series up to this length use the brute-force autocovariance.
const BRUTE_FORCE_MAX_LEN: usize = 100;

/// Per-coordinate effective sample size of an `n × d` chain.
///
/// # Examples
///
/// ```rust
/// use ndarray::Array2;
/// use tuned_mcmc::stats::{ess, MIN_ESS};
///
/// // A chain that never moved.
/// let stuck = Array2::<f64>::zeros((500, 2));
/// assert_eq!(ess(stuck.view()).to_vec(), vec![MIN_ESS, MIN_ESS]);
/// ```
pub fn ess(chain: ArrayView2<f64>) -> Array1<f64> {
    let n = chain.nrows();
    if n == 0 {
        return Array1::zeros(chain.ncols());
    }
    if n == 1 {
        return Array1::from_elem(chain.ncols(), MIN_ESS);
    }
    let degenerate: Vec<bool> = chain
        .axis_iter(Axis(1))
        .map(|col| col.iter().all(|&v| v == col[0]))
        .collect();
    let acov = autocov(chain);
    let out: Vec<f64> = acov
        .axis_iter(Axis(1))
        .into_par_iter()
        .zip(degenerate.into_par_iter())
        .map(|(gamma, degenerate)| {
            if degenerate {
                MIN_ESS
            } else {
                ess_from_autocov(gamma, n)
            }
        })
        .collect();
    Array1::from_vec(out)
}

/// ESS of one scalar series.
pub fn ess_1d(series: ArrayView1<f64>) -> f64 {
    ess(series.insert_axis(Axis(1)))[0]
}

/// Integrated autocorrelation time to ESS, given autocovariances `gamma[0..n]`.
fn ess_from_autocov(gamma: ArrayView1<f64>, n: usize) -> f64 {
    let n_f = n as f64;
    let var = gamma[0];
    if !var.is_finite() || var <= 0.0 {
        return MIN_ESS;
    }

    let mut min = f64::INFINITY;
    let mut sum = 0.0;
    for pair in gamma.windows_with_stride(2, 2) {
        let mut p_t = (pair[0] + pair[1]) / var;
        if p_t <= 0.0 {
            break;
        }
        if p_t > min {
            p_t = min;
        }
        min = p_t;
        sum += p_t;
    }
    let tau = -1.0 + 2.0 * sum;
    if !tau.is_finite() || tau <= 0.0 {
        return n_f;
    }
    (n_f / tau).clamp(MIN_ESS, n_f)
}

fn autocov(sample: ArrayView2<f64>) -> Array2<f64> {
    if sample.nrows() <= BRUTE_FORCE_MAX_LEN {
        autocov_bf(sample)
    } else {
        autocov_fft(sample)
    }
}

/// Autocovariance of every column of an `(n, d)` array via FFT.
///
/// Columns are centered and zero-padded to the next power of two at or above
/// `2n - 1`, so the circular correlation equals the linear one. Lag `k` is
/// normalized by `n` (the biased estimator), and `rustfft` leaves the inverse
/// transform unnormalized, hence the extra `1 / n_padded`.
fn autocov_fft(sample: ArrayView2<f64>) -> Array2<f64> {
    let (n, d) = sample.dim();
    let mut planner = FftPlanner::new();

    let mut n_padded = 1;
    while n_padded < 2 * n - 1 {
        n_padded <<= 1;
    }
    let fft = planner.plan_fft_forward(n_padded);
    let ffti = planner.plan_fft_inverse(n_padded);
    let out: Vec<f64> = sample
        .axis_iter(Axis(1))
        .into_par_iter()
        .map(|traj| {
            let traj_mean = traj.sum() / n as f64;
            let mut x: Vec<Complex<f64>> = traj
                .iter()
                .map(|xi| Complex::new(xi - traj_mean, 0.0))
                .chain(std::iter::repeat(Complex::new(0.0, 0.0)).take(n_padded - n))
                .collect();
            fft.process(&mut x);
            x.iter_mut().for_each(|xi| *xi *= xi.conj());
            ffti.process(&mut x);
            x.iter()
                .take(n)
                .map(|xi| xi.re / n_padded as f64 / n as f64)
                .collect::<Vec<f64>>()
        })
        .flatten_iter()
        .collect();
    let out = Array2::from_shape_vec((d, n), out).expect("d × n autocovariances");
    out.t().to_owned()
}

/// Brute-force autocovariance, `out[lag, col] = Σ_t x̃[t] x̃[t + lag] / n` on centered columns.
fn autocov_bf(data: ArrayView2<f64>) -> Array2<f64> {
    let (n, d) = data.dim();
    let mut out = Array2::<f64>::zeros((n, d));

    out.axis_iter_mut(Axis(1))
        .into_par_iter()
        .enumerate()
        .for_each(|(col_idx, mut out_col)| {
            let col = data.column(col_idx);
            let mean = col.sum() / n as f64;
            let centered = col.mapv(|v| v - mean);
            for lag in 0..n {
                let sum_lag: f64 = (0..n - lag).map(|t| centered[t] * centered[t + lag]).sum();
                out_col[lag] = sum_lag / n as f64;
            }
        });
    out
}

/// Minimum and mean of a per-coordinate ESS vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EssSummary {
    pub min: f64,
    pub mean: f64,
}

impl EssSummary {
    pub fn from_ess(ess: &Array1<f64>) -> Self {
        let min = ess.min().copied().unwrap_or(0.0);
        let mean = ess.mean().unwrap_or(0.0);
        Self { min, mean }
    }
}

impl fmt::Display for EssSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ESS min {:.1}, mean {:.1}", self.min, self.mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;

    fn iid(n: usize, d: usize, seed: u64) -> Array2<f64> {
        let mut rng = SmallRng::seed_from_u64(seed);
        Array2::from_shape_fn((n, d), |_| rng.sample(StandardNormal))
    }

    /// AR(1) series with coefficient `phi`; its ESS is about `n (1 - phi) / (1 + phi)`.
    fn ar1(n: usize, phi: f64, seed: u64) -> Array1<f64> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut x = 0.0;
        Array1::from_shape_fn(n, |_| {
            x = phi * x + rng.sample::<f64, _>(StandardNormal);
            x
        })
    }

    #[test]
    fn fft_matches_brute_force() {
        let data = iid(300, 3, 1);
        let fft = autocov_fft(data.view());
        let bf = autocov_bf(data.view());
        assert_eq!(fft.dim(), bf.dim());
        for (a, b) in fft.iter().zip(bf.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn iid_chain_has_ess_near_n() {
        let data = iid(4_000, 2, 7);
        for value in ess(data.view()) {
            assert!(value > 2_500.0 && value <= 4_000.0, "ESS {value}");
        }
    }

    #[test]
    fn ar1_matches_theory() {
        let phi = 0.9;
        let n = 20_000;
        let value = ess_1d(ar1(n, phi, 3).view());
        let expected = n as f64 * (1.0 - phi) / (1.0 + phi);
        assert!(
            (value - expected).abs() < 0.35 * expected,
            "ESS {value}, expected about {expected}"
        );
    }

    #[test]
    fn correlation_lowers_ess() {
        let slow = ess_1d(ar1(5_000, 0.95, 11).view());
        let fast = ess_1d(ar1(5_000, 0.2, 11).view());
        assert!(slow < fast);
    }

    #[test]
    fn constant_columns_get_minimal_ess() {
        let mut data = iid(200, 2, 5);
        data.column_mut(1).fill(3.5);
        let values = ess(data.view());
        assert_eq!(values[1], MIN_ESS);
        assert!(values[0] > MIN_ESS);
    }

    #[test]
    fn ess_never_exceeds_length() {
        // Alternating series are anti-correlated; the raw estimate would exceed n.
        let alternating = Array1::from_shape_fn(50, |i| if i % 2 == 0 { 1.0 } else { -1.0 });
        let value = ess_1d(alternating.view());
        assert!(value <= 50.0 && value >= MIN_ESS);
        let short = iid(30, 4, 2);
        assert!(ess(short.view()).iter().all(|&v| v <= 30.0 && v > 0.0));
    }

    #[test]
    fn tiny_chains() {
        assert_eq!(ess(Array2::<f64>::zeros((0, 3)).view()).len(), 3);
        assert_eq!(ess(Array2::<f64>::ones((1, 2)).view()).to_vec(), vec![MIN_ESS; 2]);
    }

    #[test]
    fn summary() {
        let summary = EssSummary::from_ess(&array![10.0, 30.0, 20.0]);
        assert_eq!(summary.min, 10.0);
        assert_eq!(summary.mean, 20.0);
    }
}
