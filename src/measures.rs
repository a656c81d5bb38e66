//! Cumulative dispersion and rotation measures along a sampled sightline.
//!
//! Given densities $n_j$ on a grid with redshifts $z_j$ and lookback distances $D_j$ (Mpc), the
//! dispersion measure accumulated from the observer out to cell $i$ is
//!
//! $$ \mathrm{DM}_i = 10^6 \sum_{j \le i} \frac{n_j (D_{j+1} - D_j)}{1 + z_j} , $$
//!
//! and the rotation measure is accumulated from the far end of the sightline towards the observer,
//!
//! $$ \mathrm{RM} = 0.812 \cdot 10^6 \sum_j \frac{n_j B_j (D_{j+1} - D_j)}{(1 + z_j)^2} , $$
//!
//! with the line-of-sight field $B_j$ of a [`MagneticFieldProfile`].

use crate::core::Measure;
use crate::density::DensityProfile;
use crate::error::{Result, SightlineError};
use crate::grid::RedshiftGrid;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Converts Mpc to pc.
const DM_FACTOR: f64 = 1.0e6;

/// Converts cm^-3 µG Mpc to rad m^-2.
const RM_FACTOR: f64 = 812_000.0;

/// Ratio of the magnetic coherence domain to the coherence length at $z = 0$.
const DOMAIN_SCALE: f64 = 2.3;

/// Partial sums of a measure along a sightline.
///
/// There is one entry per grid cell, i.e. one less than grid points. The last entry is the value
/// of the measure for the whole sightline.
#[derive(Clone, Debug, PartialEq)]
pub struct CumulativeMeasure {
    measure: Measure,
    values: Vec<f64>,
}

impl CumulativeMeasure {
    /// Which measure the sums belong to.
    pub fn measure(&self) -> Measure {
        self.measure
    }

    /// The partial sums.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value of the measure for the whole sightline.
    pub fn total(&self) -> f64 {
        self.values.last().copied().unwrap_or(0.0)
    }
}

/// Signed line-of-sight field strength in µG, one sample per grid point.
#[derive(Clone, Debug, PartialEq)]
pub struct MagneticFieldProfile {
    field: Vec<f64>,
    flip_indices: Vec<usize>,
}

impl MagneticFieldProfile {
    /// Field samples.
    pub fn values(&self) -> &[f64] {
        &self.field
    }

    /// Coherence domain of every grid point. Points sharing an index share one orientation.
    pub fn flip_indices(&self) -> &[usize] {
        &self.flip_indices
    }
}

/// Parameters of the magnetic field along a sightline.
///
/// The field strength follows the density as $B = B_0 (n / n_\mathrm{ref})^\alpha$; its
/// orientation is random but constant within coherence domains of proper size
/// $2.3\, l_0 (1+z)^{-3/2}$.
#[derive(Clone, Debug)]
pub struct MagneticFieldModel {
    b0: f64,
    coherence_length: f64,
    reference_density: f64,
    exponent: f64,
}

impl MagneticFieldModel {
    /// Creates a model with field strength `b0` (µG) at `reference_density` (cm^-3), coherence
    /// length `coherence_length` (Mpc) and density exponent `exponent`.
    pub fn new(b0: f64, coherence_length: f64, reference_density: f64, exponent: f64) -> Result<Self> {
        if !(b0.is_finite() && b0 >= 0.0) {
            return Err(SightlineError::configuration(
                "B0 must be finite and non-negative",
            ));
        }

        if !(coherence_length.is_finite() && coherence_length > 0.0) {
            return Err(SightlineError::configuration(
                "the coherence length must be finite and greater than zero",
            ));
        }

        if !(reference_density.is_finite() && reference_density > 0.0) {
            return Err(SightlineError::configuration(
                "the reference density must be finite and greater than zero",
            ));
        }

        // a negative exponent turns empty cells into infinite fields
        if !(exponent.is_finite() && exponent >= 0.0) {
            return Err(SightlineError::configuration(
                "the field exponent must be finite and non-negative",
            ));
        }

        Ok(Self {
            b0,
            coherence_length,
            reference_density,
            exponent,
        })
    }

    /// Flux freezing, $B \propto n^{2/3}$.
    pub fn flux_frozen(b0: f64, coherence_length: f64, reference_density: f64) -> Result<Self> {
        Self::new(b0, coherence_length, reference_density, 2.0 / 3.0)
    }

    /// Size of the coherence domain in Mpc at redshift `z`.
    pub fn domain_size(&self, z: f64) -> f64 {
        self.coherence_length * DOMAIN_SCALE * (1.0 + z).powf(-1.5)
    }

    /// Draws the line-of-sight field for `density` on `grid`.
    ///
    /// One orientation $\cos\theta$, $\theta \sim U(0, 2\pi)$, is drawn for every coherence domain
    /// from zero up to the last one touched by the grid.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        density: &DensityProfile,
        grid: &RedshiftGrid,
        rng: &mut R,
    ) -> Result<MagneticFieldProfile> {
        density.check_aligned(grid)?;

        let flip_indices: Vec<usize> = grid
            .redshifts()
            .iter()
            .zip(grid.distances())
            .map(|(&z, &d)| (d / self.domain_size(z)).floor() as usize)
            .collect();

        let domains = flip_indices.iter().max().map_or(0, |&max| max + 1);
        let orientations: Vec<f64> = (0..domains)
            .map(|_| rng.gen_range(0.0..2.0 * PI).cos())
            .collect();

        let field = density
            .values()
            .iter()
            .zip(&flip_indices)
            .map(|(&n, &flip)| {
                self.b0 * (n / self.reference_density).powf(self.exponent) * orientations[flip]
            })
            .collect();

        Ok(MagneticFieldProfile {
            field,
            flip_indices,
        })
    }

    /// Samples a field for `density` and integrates the rotation measure over it.
    pub fn rotation_measure<R: Rng + ?Sized>(
        &self,
        density: &DensityProfile,
        grid: &RedshiftGrid,
        rng: &mut R,
    ) -> Result<CumulativeMeasure> {
        grid.check_integrable()?;
        let field = self.sample(density, grid, rng)?;
        rotation_measure(density, &field, grid)
    }
}

/// Cumulative dispersion measure in pc cm^-3, accumulated outwards from the observer.
pub fn dispersion_measure(density: &DensityProfile, grid: &RedshiftGrid) -> Result<CumulativeMeasure> {
    grid.check_integrable()?;
    density.check_aligned(grid)?;

    let z = grid.redshifts();
    let d = grid.distances();
    let n = density.values();

    let values = (0..grid.len() - 1)
        .scan(0.0, |acc, j| {
            *acc += n[j] * (d[j + 1] - d[j]) / (1.0 + z[j]);
            Some(DM_FACTOR * *acc)
        })
        .collect();

    Ok(CumulativeMeasure {
        measure: Measure::Dm,
        values,
    })
}

/// Cumulative rotation measure in rad m^-2.
///
/// The sum runs backwards, from the last grid cell towards the observer: entry $k$ holds the
/// contribution of the $k + 1$ outermost cells, so the last entry is the rotation measure seen at
/// $z = 0$.
pub fn rotation_measure(
    density: &DensityProfile,
    field: &MagneticFieldProfile,
    grid: &RedshiftGrid,
) -> Result<CumulativeMeasure> {
    grid.check_integrable()?;
    density.check_aligned(grid)?;

    if field.values().len() != grid.len() {
        return Err(SightlineError::LengthMismatch {
            context: "magnetic field profile",
            expected: grid.len(),
            got: field.values().len(),
        });
    }

    let z = grid.redshifts();
    let d = grid.distances();
    let n = density.values();
    let b = field.values();

    let cells = grid.len() - 1;
    let mut values = Vec::with_capacity(cells);
    let mut acc = 0.0;

    for j in (0..cells).rev() {
        acc += n[j] * b[j] * (d[j + 1] - d[j]) / (1.0 + z[j]).powi(2);
        values.push(RM_FACTOR * acc);
    }

    Ok(CumulativeMeasure {
        measure: Measure::Rm,
        values,
    })
}

/// Final values of both measures for one sightline.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct SightlineTotals {
    /// Dispersion measure to the end of the grid.
    pub dm: f64,
    /// Rotation measure to the end of the grid.
    pub rm: f64,
}
