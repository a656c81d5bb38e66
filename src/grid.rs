//! Irregular redshift grids whose spacing follows the Jeans length.
//!
//! Neighbouring cells of a sightline are only statistically independent if they are at least a
//! coherence length apart. The grid therefore advances in steps of the Jeans length
//!
//! $$ L(z) = L_\mathrm{ref} (1+z)^{-3/2} , $$
//!
//! a proper distance in Mpc, which is converted into a redshift increment with the lookback
//! distance of the background cosmology.

use crate::cosmology::Cosmology;
use crate::error::{Result, SightlineError};
use log::info;

/// Upper bound on the number of points reserved up front.
const MAX_RESERVED_POINTS: usize = 1 << 22;

/// Jeans length in Mpc at redshift `z` for a reference length `jeans_length` at `z = 0`.
pub fn jeans_length(jeans_length: f64, z: f64) -> f64 {
    jeans_length * (1.0 + z).powf(-1.5)
}

/// Strictly increasing redshifts starting at zero, together with their lookback distances.
#[derive(Clone, Debug, PartialEq)]
pub struct RedshiftGrid {
    redshifts: Vec<f64>,
    distances: Vec<f64>,
}

impl RedshiftGrid {
    /// Assembles a grid from redshifts and matching lookback distances (Mpc).
    ///
    /// The redshifts must start at a non-negative value and increase strictly; the distances must
    /// be finite and must not decrease.
    pub fn from_parts(redshifts: Vec<f64>, distances: Vec<f64>) -> Result<Self> {
        if redshifts.len() != distances.len() {
            return Err(SightlineError::LengthMismatch {
                context: "lookback distances",
                expected: redshifts.len(),
                got: distances.len(),
            });
        }

        if redshifts.iter().chain(&distances).any(|v| !v.is_finite()) {
            return Err(SightlineError::configuration(
                "redshift grid contains non-finite values",
            ));
        }

        if redshifts.first().map_or(false, |&z| z < 0.0) {
            return Err(SightlineError::configuration(
                "redshift grid must not start at a negative redshift",
            ));
        }

        if redshifts.windows(2).any(|w| w[1] <= w[0]) {
            return Err(SightlineError::configuration(
                "redshift grid must be strictly increasing",
            ));
        }

        if distances.windows(2).any(|w| w[1] < w[0]) {
            return Err(SightlineError::configuration(
                "lookback distances must not decrease along the grid",
            ));
        }

        Ok(Self {
            redshifts,
            distances,
        })
    }

    /// Number of grid points.
    pub fn len(&self) -> usize {
        self.redshifts.len()
    }

    /// Returns `true` if the grid has no points.
    pub fn is_empty(&self) -> bool {
        self.redshifts.is_empty()
    }

    /// Redshifts of the grid points.
    pub fn redshifts(&self) -> &[f64] {
        &self.redshifts
    }

    /// Lookback distances of the grid points in Mpc.
    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    /// Redshift of the last grid point.
    pub fn z_max(&self) -> Option<f64> {
        self.redshifts.last().copied()
    }

    /// Returns the shortest prefix of the grid that reaches `target`, i.e. every point up to and
    /// including the first one with a redshift of at least `target`. If the grid does not reach
    /// `target` the whole grid is returned.
    pub fn truncated(&self, target: f64) -> Self {
        let end = self
            .redshifts
            .iter()
            .position(|&z| z >= target)
            .map_or(self.len(), |i| i + 1);

        Self {
            redshifts: self.redshifts[..end].to_vec(),
            distances: self.distances[..end].to_vec(),
        }
    }

    /// Fails with [`SightlineError::InsufficientGrid`] unless the grid can be integrated over.
    pub(crate) fn check_integrable(&self) -> Result<()> {
        if self.len() < 2 {
            Err(SightlineError::InsufficientGrid { points: self.len() })
        } else {
            Ok(())
        }
    }
}

/// Builds [`RedshiftGrid`]s for a fixed cosmology and Jeans length.
pub struct RedshiftGridBuilder<'a, C: ?Sized> {
    cosmology: &'a C,
    jeans_length: f64,
}

impl<'a, C: Cosmology + ?Sized> RedshiftGridBuilder<'a, C> {
    /// Creates a builder stepping by the Jeans length with reference value `jeans_length` (Mpc).
    pub fn new(cosmology: &'a C, jeans_length: f64) -> Result<Self> {
        if !(jeans_length.is_finite() && jeans_length > 0.0) {
            return Err(SightlineError::configuration(
                "the Jeans length must be finite and greater than zero",
            ));
        }

        Ok(Self {
            cosmology,
            jeans_length,
        })
    }

    /// Builds the grid from `z = 0` until the last point reaches or exceeds `z_max`.
    pub fn build(&self, z_max: f64) -> Result<RedshiftGrid> {
        if !(z_max.is_finite() && z_max > 0.0) {
            return Err(SightlineError::configuration(format!(
                "z_max must be finite and greater than zero, got {}",
                z_max
            )));
        }

        // the step only shrinks with redshift, so D(z_max) / L(z_max) bounds the point count
        let estimate = self.cosmology.lookback_distance(z_max) / jeans_length(self.jeans_length, z_max);
        let capacity = (estimate.ceil() as usize).saturating_add(2).min(MAX_RESERVED_POINTS);

        let mut redshifts = Vec::with_capacity(capacity);
        let mut distances = Vec::with_capacity(capacity);
        redshifts.push(0.0);
        distances.push(0.0);

        let mut z = 0.0;
        let mut distance = 0.0;

        while z < z_max {
            let step = jeans_length(self.jeans_length, z);
            let next = self.cosmology.redshift_after_distance(z, step)?;

            if next <= z {
                return Err(SightlineError::computation(format!(
                    "redshift grid stalled at z = {} with a step of {} Mpc",
                    z, step
                )));
            }

            z = next;
            distance += step;
            redshifts.push(z);
            distances.push(distance);
        }

        info!(
            "built redshift grid with {} points up to z = {:.4} (requested {})",
            redshifts.len(),
            z,
            z_max
        );

        Ok(RedshiftGrid {
            redshifts,
            distances,
        })
    }
}
