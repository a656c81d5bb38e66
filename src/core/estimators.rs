//! This module contains everything related to estimators.
use num_traits::{Float, FromPrimitive};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Basic estimators, like the mean, variance, and the standard deviation.
pub trait BasicEstimators<T: Float> {
    /// Returns the mean value.
    fn mean(&self) -> T;

    /// Returns the variance, $V$, of the sampled values.
    fn var(&self) -> T;

    /// Returns the standard deviation, $\sigma = \sqrt{V}$.
    fn std(&self) -> T {
        self.var().sqrt()
    }
}

/// Everything that needs to be updated.
pub trait Updateable<T> {
    /// Update this estimator with `value`.
    fn update(&mut self, value: T);
}

/// More estimators.
pub trait Estimators<T: Float>: BasicEstimators<T> {
    /// Returns the number of draws, $N$.
    fn calls(&self) -> usize;

    /// Returns the number of draws, $N_\mathrm{nf}$, whose value was non-finite.
    fn non_finite_calls(&self) -> usize;

    /// Returns the number of draws, $N_\mathrm{nz}$, whose value was non-zero.
    fn non_zero_calls(&self) -> usize;
}

/// Running sums over the final DM or RM values of the Monte Carlo draws of one redshift bin.
///
/// Non-finite values are counted but do not enter the sums, so that a single pathological draw
/// cannot destroy the estimate of a whole bin.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DrawEstimators<T> {
    sum: T,
    sumsq: T,
    calls: usize,
    non_finite_calls: usize,
    non_zero_calls: usize,
}

impl<T: Float> Default for DrawEstimators<T> {
    fn default() -> Self {
        Self {
            sum: T::zero(),
            sumsq: T::zero(),
            calls: 0,
            non_finite_calls: 0,
            non_zero_calls: 0,
        }
    }
}

impl<T> DrawEstimators<T>
where
    T: Float + FromPrimitive,
{
    /// Number of draws that entered the sums.
    pub fn finite_calls(&self) -> usize {
        self.calls - self.non_finite_calls
    }

    /// Standard error of the mean, $\sqrt{V / N}$.
    pub fn std_error(&self) -> T {
        (self.var() / self.count(self.finite_calls())).sqrt()
    }

    fn count(&self, n: usize) -> T {
        T::from_usize(n).unwrap_or_else(T::nan)
    }
}

impl<T> BasicEstimators<T> for DrawEstimators<T>
where
    T: Float + FromPrimitive,
{
    /// Arithmetic mean of the finite draws; `NaN` if there are none.
    fn mean(&self) -> T {
        self.sum / self.count(self.finite_calls())
    }

    /// Unbiased sample variance of the finite draws; zero for fewer than two draws.
    fn var(&self) -> T {
        let n = self.finite_calls();

        if n < 2 {
            return T::zero();
        }

        let calls = self.count(n);
        let var = (self.sumsq - self.sum * self.sum / calls) / (calls - T::one());
        // cancellation may leave a tiny negative number for identical draws
        var.max(T::zero())
    }
}

impl<T> Estimators<T> for DrawEstimators<T>
where
    T: Float + FromPrimitive,
{
    fn calls(&self) -> usize {
        self.calls
    }

    fn non_finite_calls(&self) -> usize {
        self.non_finite_calls
    }

    fn non_zero_calls(&self) -> usize {
        self.non_zero_calls
    }
}

impl<T> Updateable<T> for DrawEstimators<T>
where
    T: AddAssign + Float,
{
    fn update(&mut self, value: T) {
        self.calls += 1;

        if value != T::zero() {
            if value.is_finite() {
                self.sum += value;
                self.sumsq += value * value;
            } else {
                self.non_finite_calls += 1;
            }

            self.non_zero_calls += 1;
        }
    }
}
