/*!
Target densities for the samplers.

Every sampler in this crate only needs one capability from the distribution it
samples: the (unnormalized) log-density at a point. That capability is the
[`Target`] trait. Any `Fn(&[f64]) -> f64 + Send + Sync` closure is a target, so
ad-hoc densities need no wrapper type.

Log-densities may return `f64::NEG_INFINITY` outside the support; the samplers
reject such proposals.

The concrete targets in this module are the reference densities the comparison
binary and the tests run against:

- [`Banana`]: a curved two-dimensional ridge, extended with standard normal coordinates.
- [`GaussianMixture`]: two isotropic Gaussian modes at `±offset` in every coordinate.
- [`SkewNormal`]: independent skew-normal coordinates.
- [`IsotropicGaussian`]: a centered Gaussian with shared standard deviation.
- [`Unsupported`]: zero mass everywhere except one point, so every move is rejected.

# Examples

```rust
use tuned_mcmc::distributions::{Banana, Target};

let banana = Banana::default();
let lp = banana.log_density(&[0.0, 0.0]);
assert!(lp.is_finite());

// Closures are targets too.
let half_line = |x: &[f64]| if x[0] < 0.0 { f64::NEG_INFINITY } else { -x[0] };
assert_eq!(half_line.log_density(&[-1.0]), f64::NEG_INFINITY);
```
*/

use statrs::function::erf::erfc;
use std::f64::consts::{LN_2, PI, SQRT_2};

/// A target distribution we want to sample from.
///
/// Implementations must be pure: the same input always gives the same output, and
/// no finite input may panic.
pub trait Target: Send + Sync {
    /// Returns the unnormalized log-density at `x`.
    fn log_density(&self, x: &[f64]) -> f64;
}

impl<F> Target for F
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn log_density(&self, x: &[f64]) -> f64 {
        self(x)
    }
}

/**
A banana-shaped density obtained by bending a Gaussian along a parabola.

For `x = (x0, x1, x2, ...)`:

```text
log p(x) = -x0² / (2 a²) - (x1 - b x0²)² / 2 - Σ_{k≥2} x_k² / 2
```

One-dimensional inputs fall back to the `x0` term alone.
*/
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Banana {
    /// Standard deviation along the ridge.
    pub a: f64,
    /// Curvature of the ridge.
    pub b: f64,
}

impl Default for Banana {
    fn default() -> Self {
        Self { a: 1.0, b: 1.0 }
    }
}

impl Target for Banana {
    fn log_density(&self, x: &[f64]) -> f64 {
        let Some((&x0, rest)) = x.split_first() else {
            return 0.0;
        };
        let mut lp = -0.5 * (x0 / self.a).powi(2);
        if let Some((&x1, tail)) = rest.split_first() {
            lp -= 0.5 * (x1 - self.b * x0 * x0).powi(2);
            lp -= 0.5 * tail.iter().map(|v| v * v).sum::<f64>();
        }
        lp
    }
}

/**
Equal-weight mixture of two isotropic Gaussians centered at `-offset·1` and `+offset·1`.

With the default `offset = 3` the origin sits in the low-density valley between
the modes.
*/
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GaussianMixture {
    pub offset: f64,
    pub std: f64,
}

impl Default for GaussianMixture {
    fn default() -> Self {
        Self {
            offset: 3.0,
            std: 1.0,
        }
    }
}

impl Target for GaussianMixture {
    fn log_density(&self, x: &[f64]) -> f64 {
        let var = self.std * self.std;
        let (mut left, mut right) = (0.0, 0.0);
        for &v in x {
            left -= (v + self.offset).powi(2) / (2.0 * var);
            right -= (v - self.offset).powi(2) / (2.0 * var);
        }
        // log(0.5 e^left + 0.5 e^right), shifted by the larger term.
        let m = left.max(right);
        if m == f64::NEG_INFINITY {
            return m;
        }
        m + ((left - m).exp() + (right - m).exp()).ln() - LN_2
    }
}

/**
Product of independent skew-normal coordinates with location 0, scale `scale` and
shape `alpha`:

```text
log p(x) = Σ_k [ log 2 - log scale + log φ(z_k) + log Φ(alpha z_k) ],   z_k = x_k / scale
```
*/
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SkewNormal {
    pub alpha: f64,
    pub scale: f64,
}

impl Default for SkewNormal {
    fn default() -> Self {
        Self {
            alpha: 4.0,
            scale: 1.0,
        }
    }
}

impl Target for SkewNormal {
    fn log_density(&self, x: &[f64]) -> f64 {
        let log_norm = LN_2 - self.scale.ln() - 0.5 * (2.0 * PI).ln();
        x.iter()
            .map(|&v| {
                let z = v / self.scale;
                // Φ(t) = erfc(-t / √2) / 2; ln(0) = -inf deep in the short tail.
                let log_cdf = (0.5 * erfc(-self.alpha * z / SQRT_2)).ln();
                log_norm - 0.5 * z * z + log_cdf
            })
            .sum()
    }
}

/// A centered isotropic Gaussian with standard deviation `std` in every coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IsotropicGaussian {
    pub std: f64,
}

impl IsotropicGaussian {
    pub fn new(std: f64) -> Self {
        Self { std }
    }
}

impl Target for IsotropicGaussian {
    fn log_density(&self, x: &[f64]) -> f64 {
        let sum: f64 = x.iter().map(|v| v * v).sum();
        -0.5 * sum / (self.std * self.std)
    }
}

/// Log-density `0` at `at` and `-∞` everywhere else.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Unsupported {
    pub at: Vec<f64>,
}

impl Unsupported {
    /// The point mass at the origin of `dim`-dimensional space.
    pub fn origin(dim: usize) -> Self {
        Self { at: vec![0.0; dim] }
    }
}

impl Target for Unsupported {
    fn log_density(&self, x: &[f64]) -> f64 {
        if x == self.at.as_slice() {
            0.0
        } else {
            f64::NEG_INFINITY
        }
    }
}
