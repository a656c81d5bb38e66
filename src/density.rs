//! Log-normal electron densities along a redshift grid.
//!
//! At every grid point the density is drawn from a log-normal distribution whose scatter
//! $\sigma(z)$ is a polynomial fit in $1/(1+z)$ to cosmological simulations, and whose location
//! $\mu(z) = -\sigma^2 / 2$ keeps the mean at the reference density. The draw is then scaled by the
//! fraction of baryons in the ionized IGM and converted from comoving to proper density.

use crate::error::{Result, SightlineError};
use crate::grid::RedshiftGrid;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Log-normal scatter of the density at redshift `z`.
pub fn sigma(z: f64) -> f64 {
    let a = (1.0 + z).recip();
    0.08 + 5.37 * a - 4.21 * a * a + 1.44 * a * a * a
}

/// Location parameter of the log-normal at redshift `z`, chosen such that its mean is one.
pub fn mu(z: f64) -> f64 {
    -0.5 * sigma(z).powi(2)
}

/// Piecewise-linear fraction of baryons residing in the diffuse ionized IGM.
///
/// Rises (or falls) linearly from `f0` at $z = 0$ to `f1` at `z_const` and stays constant beyond.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct IonizedFraction {
    /// Fraction at $z = 0$.
    pub f0: f64,
    /// Plateau value reached at `z_const`.
    pub f1: f64,
    /// Redshift at which the plateau begins.
    pub z_const: f64,
}

impl Default for IonizedFraction {
    fn default() -> Self {
        Self {
            f0: 0.8,
            f1: 0.9,
            z_const: 1.5,
        }
    }
}

impl IonizedFraction {
    /// Evaluates the fraction at redshift `z`.
    pub fn at(&self, z: f64) -> f64 {
        let x = z / self.z_const;

        if x >= 1.0 {
            self.f1
        } else {
            self.f0 + (self.f1 - self.f0) * x
        }
    }

    /// Checks the parameters.
    pub fn validate(&self) -> Result<()> {
        if !(self.z_const.is_finite() && self.z_const > 0.0) {
            return Err(SightlineError::configuration(
                "z_const must be finite and greater than zero",
            ));
        }

        for &(name, f) in &[("f0", self.f0), ("f1", self.f1)] {
            if !(0.0..=1.0).contains(&f) {
                return Err(SightlineError::configuration(format!(
                    "{} must lie in [0, 1], got {}",
                    name, f
                )));
            }
        }

        Ok(())
    }
}

/// How densities are assigned to the grid points.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DensityModel {
    /// Independent log-normal draws at every grid point.
    LogNormal,
    /// The mean density everywhere; no random numbers are consumed.
    Uniform,
}

impl Default for DensityModel {
    fn default() -> Self {
        Self::LogNormal
    }
}

/// Proper electron number densities in cm^-3, one per point of a [`RedshiftGrid`].
#[derive(Clone, Debug, PartialEq)]
pub struct DensityProfile {
    values: Vec<f64>,
}

impl DensityProfile {
    /// Wraps precomputed densities.
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// The densities.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fails unless the profile is aligned with `grid`.
    pub(crate) fn check_aligned(&self, grid: &RedshiftGrid) -> Result<()> {
        if self.len() == grid.len() {
            Ok(())
        } else {
            Err(SightlineError::LengthMismatch {
                context: "density profile",
                expected: grid.len(),
                got: self.len(),
            })
        }
    }
}

/// Draws [`DensityProfile`]s for a reference density and ionized fraction.
#[derive(Clone, Debug)]
pub struct DensitySampler {
    ionized_fraction: IonizedFraction,
    reference_density: f64,
    model: DensityModel,
}

impl DensitySampler {
    /// Creates a sampler. `reference_density` is the mean comoving density in cm^-3 today.
    pub fn new(
        ionized_fraction: IonizedFraction,
        reference_density: f64,
        model: DensityModel,
    ) -> Result<Self> {
        ionized_fraction.validate()?;

        if !(reference_density.is_finite() && reference_density > 0.0) {
            return Err(SightlineError::configuration(
                "the reference density must be finite and greater than zero",
            ));
        }

        Ok(Self {
            ionized_fraction,
            reference_density,
            model,
        })
    }

    /// The reference density in cm^-3.
    pub fn reference_density(&self) -> f64 {
        self.reference_density
    }

    /// Mean proper density at redshift `z`, before log-normal scatter.
    pub fn mean_density(&self, z: f64) -> f64 {
        self.reference_density * self.ionized_fraction.at(z) * (1.0 + z).powi(3)
    }

    /// Draws one density per grid point. Every call yields a new, independent profile.
    pub fn sample<R: Rng + ?Sized>(&self, grid: &RedshiftGrid, rng: &mut R) -> DensityProfile {
        let values = grid
            .redshifts()
            .iter()
            .map(|&z| match self.model {
                DensityModel::LogNormal => {
                    let draw: f64 = rng.sample(StandardNormal);
                    self.mean_density(z) * (draw * sigma(z) + mu(z)).exp()
                }
                DensityModel::Uniform => self.mean_density(z),
            })
            .collect();

        DensityProfile { values }
    }
}
