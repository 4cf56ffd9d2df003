//! Piecewise-exponential variate generation.
//!
//! Both generators draw unit-exponential values on the cumulative-hazard
//! scale and map them back to calendar time through
//! [`PiecewiseRate::invert_cumulative_hazard`]. Failure times use one
//! independent draw per variate; enrollment uses cumulative sums of the draws,
//! i.e. the arrival times of a nonhomogeneous Poisson process.

use rand::Rng;
use rand_distr::{Distribution, Exp1};

use super::rate_table::PiecewiseRate;

/// `n` independent times with hazard following `rate`.
pub fn rpwexp<R: Rng + ?Sized>(n: usize, rate: &PiecewiseRate, rng: &mut R) -> Vec<f64> {
    (0..n).map(|_| rpwexp_one(rate, rng)).collect()
}

#[inline]
pub fn rpwexp_one<R: Rng + ?Sized>(rate: &PiecewiseRate, rng: &mut R) -> f64 {
    let h: f64 = Exp1.sample(rng);
    rate.invert_cumulative_hazard(h)
}

/// Arrival times of the first `n` subjects of a piecewise-constant
/// enrollment process. The returned times are non-decreasing.
pub fn rpwexp_enroll<R: Rng + ?Sized>(n: usize, rate: &PiecewiseRate, rng: &mut R) -> Vec<f64> {
    let mut cumulative = 0.0;
    (0..n)
        .map(|_| {
            let spacing: f64 = Exp1.sample(rng);
            cumulative += spacing;
            rate.invert_cumulative_hazard(cumulative)
        })
        .collect()
}
