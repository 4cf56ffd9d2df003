//! Multivariate normal probabilities `P(X_1 <= b_1, ..., X_k <= b_k)` for
//! `X ~ N(0, R)` with `R` a correlation matrix.
//!
//! The integral is mapped to the unit cube with Genz's separation of
//! variables and evaluated with a randomized Richtmyer lattice rule. Each
//! round averages `MVN_SHIFTS` independently shifted copies of the lattice,
//! which gives an unbiased estimate together with a standard error; rounds
//! double the lattice size until the error target or the point budget is
//! reached, and are combined by inverse-variance weighting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_MVN_ABS_EPS, DEFAULT_MVN_MAX_POINTS, DEFAULT_MVN_REL_EPS, DEFAULT_MVN_SEED,
    MVN_ERROR_SIGMAS, MVN_INITIAL_BATCH, MVN_SHIFTS, SINGULAR_PIVOT,
};
use crate::error::{Result, TrialSimError};
use crate::utilities::matrix::{cholesky_psd, is_symmetric};
use crate::utilities::statistical::{normal_cdf, normal_quantile};
use crate::utilities::validation::{validate_length, validate_no_nan, validate_parameter, ValidationError};

/// Shared flag for aborting a running integration from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl PartialEq for CancelToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MvnIntegration {
    pub max_points: usize,
    pub abs_eps: f64,
    pub rel_eps: f64,
    pub timeout: Option<Duration>,
    pub seed: u64,
    #[serde(skip)]
    pub cancel: Option<CancelToken>,
}

impl Default for MvnIntegration {
    fn default() -> Self {
        Self {
            max_points: DEFAULT_MVN_MAX_POINTS,
            abs_eps: DEFAULT_MVN_ABS_EPS,
            rel_eps: DEFAULT_MVN_REL_EPS,
            timeout: None,
            seed: DEFAULT_MVN_SEED,
            cancel: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MvnProbability {
    pub value: f64,
    /// Three standard errors of `value`.
    pub error: f64,
    pub points: usize,
    pub converged: bool,
}

impl MvnProbability {
    fn exact(value: f64) -> Self {
        Self {
            value,
            error: 0.0,
            points: 0,
            converged: true,
        }
    }
}

struct Estimate {
    value: f64,
    variance: f64,
    points: usize,
}

impl Estimate {
    fn error(&self) -> f64 {
        MVN_ERROR_SIGMAS * self.variance.sqrt()
    }

    fn absorb(&mut self, value: f64, variance: f64, points: usize) {
        if self.points == 0 {
            self.value = value;
            self.variance = variance;
        } else if self.variance + variance > 0.0 {
            let total = self.variance + variance;
            self.value = (self.value * variance + value * self.variance) / total;
            self.variance = self.variance * variance / total;
        } else {
            self.value = 0.5 * (self.value + value);
        }
        self.points += points;
    }
}

impl MvnIntegration {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        validate_parameter(self.abs_eps, "abs_eps")?;
        validate_parameter(self.rel_eps, "rel_eps")?;
        if self.max_points < MVN_SHIFTS {
            return Err(ValidationError::InvalidValue {
                field: "max_points",
                message: format!("must be at least {MVN_SHIFTS}, got {}", self.max_points),
            });
        }
        Ok(())
    }

    /// `P(X <= upper)` for `X ~ N(0, correlation)`.
    ///
    /// A correlation matrix that is not positive semi-definite is a
    /// [`TrialSimError::DegenerateStatistic`]. Exceeding the point budget
    /// returns the estimate with `converged == false`; timeout or
    /// cancellation returns [`TrialSimError::IntegrationAborted`].
    pub fn cdf(&self, upper: &[f64], correlation: &Array2<f64>) -> Result<MvnProbability> {
        self.validate()?;
        let k = upper.len();
        validate_length(k, correlation.nrows(), "correlation")?;
        validate_length(k, correlation.ncols(), "correlation")?;
        validate_no_nan(upper, "upper")?;
        if k == 0 {
            return Ok(MvnProbability::exact(1.0));
        }
        if !is_symmetric(correlation, 1e-12) {
            return Err(TrialSimError::degenerate("correlation matrix is not symmetric"));
        }
        let factor = cholesky_psd(correlation).map_err(|row| {
            TrialSimError::degenerate(format!(
                "correlation matrix is not positive semi-definite (pivot {row})"
            ))
        })?;

        if upper.iter().any(|&b| b == f64::NEG_INFINITY) {
            return Ok(MvnProbability::exact(0.0));
        }
        if k == 1 {
            return Ok(MvnProbability::exact(bound_probability(upper[0], factor[[0, 0]])));
        }
        self.integrate(upper, &factor)
    }

    fn integrate(&self, upper: &[f64], factor: &Array2<f64>) -> Result<MvnProbability> {
        let dims = upper.len() - 1;
        let generators: Vec<f64> = first_primes(dims)
            .into_iter()
            .map(|p| (p as f64).sqrt().fract())
            .collect();
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut shift = vec![0.0; dims];
        let mut point = vec![0.0; dims];
        let mut scratch = vec![0.0; dims];
        let mut estimate = Estimate {
            value: 0.0,
            variance: 0.0,
            points: 0,
        };
        let mut batch = MVN_INITIAL_BATCH.min(self.max_points / MVN_SHIFTS).max(1);

        loop {
            let mut sum = 0.0;
            let mut sum_sq = 0.0;
            for _ in 0..MVN_SHIFTS {
                self.check_abort(deadline, &estimate)?;
                for s in shift.iter_mut() {
                    *s = rng.random::<f64>();
                }
                let mut acc = 0.0;
                for j in 1..=batch {
                    for d in 0..dims {
                        let x = (j as f64 * generators[d] + shift[d]).fract();
                        point[d] = (2.0 * x - 1.0).abs();
                    }
                    acc += genz_integrand(upper, factor, &point, &mut scratch);
                }
                let mean = acc / batch as f64;
                sum += mean;
                sum_sq += mean * mean;
            }
            let shifts = MVN_SHIFTS as f64;
            let round_mean = sum / shifts;
            let round_variance =
                ((sum_sq - shifts * round_mean * round_mean) / (shifts - 1.0)).max(0.0) / shifts;
            estimate.absorb(round_mean, round_variance, batch * MVN_SHIFTS);

            let target = self.abs_eps.max(self.rel_eps * estimate.value.abs());
            if estimate.error() <= target {
                debug!(
                    "mvn integral {:.6} +/- {:.2e} after {} points",
                    estimate.value,
                    estimate.error(),
                    estimate.points
                );
                return Ok(self.finish(&estimate, true));
            }
            let remaining = self.max_points.saturating_sub(estimate.points);
            if remaining < MVN_SHIFTS {
                warn!(
                    "mvn integral did not reach {:.2e} within {} points (error {:.2e})",
                    target,
                    estimate.points,
                    estimate.error()
                );
                return Ok(self.finish(&estimate, false));
            }
            batch = (2 * batch).min(remaining / MVN_SHIFTS);
        }
    }

    fn finish(&self, estimate: &Estimate, converged: bool) -> MvnProbability {
        MvnProbability {
            value: estimate.value.clamp(0.0, 1.0),
            error: estimate.error(),
            points: estimate.points,
            converged,
        }
    }

    fn check_abort(&self, deadline: Option<Instant>, estimate: &Estimate) -> Result<()> {
        let reason = if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            "cancelled"
        } else if deadline.is_some_and(|d| Instant::now() >= d) {
            "timeout"
        } else {
            return Ok(());
        };
        Err(TrialSimError::IntegrationAborted {
            reason: reason.to_string(),
            estimate: estimate.value,
            error: if estimate.points == 0 {
                f64::INFINITY
            } else {
                estimate.error()
            },
            points: estimate.points,
        })
    }
}

#[inline]
fn bound_probability(bound: f64, pivot: f64) -> f64 {
    if pivot > SINGULAR_PIVOT {
        normal_cdf(bound / pivot)
    } else if bound >= 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Genz's transformed integrand at `point` in `[0, 1]^(k-1)`.
fn genz_integrand(upper: &[f64], factor: &Array2<f64>, point: &[f64], y: &mut [f64]) -> f64 {
    let k = upper.len();
    let mut product = 1.0;
    for i in 0..k {
        let offset: f64 = (0..i).map(|j| factor[[i, j]] * y[j]).sum();
        let e = bound_probability(upper[i] - offset, factor[[i, i]]);
        product *= e;
        if product <= 0.0 {
            return 0.0;
        }
        if i + 1 < k {
            let u = (point[i] * e).clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON);
            y[i] = normal_quantile(u);
        }
    }
    product
}

fn first_primes(count: usize) -> Vec<u64> {
    let mut primes: Vec<u64> = Vec::with_capacity(count);
    let mut candidate = 2u64;
    while primes.len() < count {
        if primes
            .iter()
            .take_while(|&&p| p * p <= candidate)
            .all(|&p| candidate % p != 0)
        {
            primes.push(candidate);
        }
        candidate += 1;
    }
    primes
}
