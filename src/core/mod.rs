//! Types shared by the sightline generator, the Monte Carlo driver and the callbacks.
pub mod estimators;

use crate::core::estimators::DrawEstimators;
use crate::error::SightlineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The observables integrated along a sightline.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum Measure {
    /// Dispersion measure, in pc cm^-3.
    #[serde(rename = "DM")]
    Dm,
    /// Rotation measure, in rad m^-2.
    #[serde(rename = "RM")]
    Rm,
}

impl Measure {
    /// Both measures, in the order they are computed.
    pub const ALL: [Self; 2] = [Self::Dm, Self::Rm];

    /// Unit of the measure.
    pub fn unit(self) -> &'static str {
        match self {
            Self::Dm => "pc cm^-3",
            Self::Rm => "rad m^-2",
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dm => write!(f, "DM"),
            Self::Rm => write!(f, "RM"),
        }
    }
}

impl FromStr for Measure {
    type Err = SightlineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DM" => Ok(Self::Dm),
            "RM" => Ok(Self::Rm),
            _ => Err(SightlineError::configuration(format!(
                "unknown measure `{}`, expected DM or RM",
                s
            ))),
        }
    }
}

/// A checkpoint saves the state of the generator after the draws for one redshift bin.
///
/// Checkpoints are self-contained: the draws of a bin can be replayed from `rng_before`, and the
/// run can be resumed at the next bin from `rng_after`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Checkpoint<R> {
    redshift: f64,
    grid_points: usize,
    rng_before: R,
    rng_after: R,
    dm: DrawEstimators<f64>,
    rm: DrawEstimators<f64>,
}

impl<R> Checkpoint<R> {
    /// Create a new checkpoint
    pub(crate) fn new(
        redshift: f64,
        grid_points: usize,
        rng_before: R,
        rng_after: R,
        dm: DrawEstimators<f64>,
        rm: DrawEstimators<f64>,
    ) -> Self {
        Self {
            redshift,
            grid_points,
            rng_before,
            rng_after,
            dm,
            rm,
        }
    }

    /// Returns the target redshift of this bin.
    pub fn redshift(&self) -> f64 {
        self.redshift
    }

    /// Returns the number of points of the redshift grid the draws were integrated over.
    pub fn grid_points(&self) -> usize {
        self.grid_points
    }

    /// Returns the random number generator before the draws of this bin.
    pub fn rng_before(&self) -> &R {
        &self.rng_before
    }

    /// Returns the random number generator after the draws of this bin.
    pub fn rng_after(&self) -> &R {
        &self.rng_after
    }

    /// Returns the estimators of the dispersion measure.
    pub fn dm(&self) -> &DrawEstimators<f64> {
        &self.dm
    }

    /// Returns the estimators of the rotation measure.
    pub fn rm(&self) -> &DrawEstimators<f64> {
        &self.rm
    }

    /// Returns the estimators of `measure`.
    pub fn estimators(&self, measure: Measure) -> &DrawEstimators<f64> {
        match measure {
            Measure::Dm => &self.dm,
            Measure::Rm => &self.rm,
        }
    }
}

/// Compute the number of draws on a given core, given the total number of cores
/// `n_cores`, the index `core` (zero-based) of the current thread as well as the
/// total number of draws `total_calls` to perform combined on all cores.
pub(crate) fn compute_calls_for_core(core: usize, n_cores: usize, total_calls: usize) -> usize {
    debug_assert!(core < n_cores);
    let calls_per_core = (total_calls + n_cores - 1) / n_cores;

    // the last cores may be left with fewer (or no) draws
    total_calls
        .saturating_sub(core * calls_per_core)
        .min(calls_per_core)
}
