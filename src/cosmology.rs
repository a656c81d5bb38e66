//! Background cosmology consumed by the sightline generator.
//!
//! The generator only needs three things from the expanding background: how far light travels
//! between two redshifts (the *lookback distance*), the inverse of that relation, and the critical
//! density. These are collected in the [`Cosmology`] trait, so that the core algorithms do not
//! depend on a particular parametrization. [`LambdaCdm`] implements it for a
//! $\Lambda$CDM universe by integrating the Friedmann equation,
//!
//! $$ D(z) = \frac{c}{H_0} \int_0^z \frac{\mathrm{d} z'}{(1+z') E(z')}, \quad
//! E(z) = \sqrt{\Omega_m (1+z)^3 + \Omega_k (1+z)^2 + \Omega_\Lambda} . $$

use crate::error::{Result, SightlineError};
use serde::{Deserialize, Serialize};

/// Speed of light in km/s.
pub const SPEED_OF_LIGHT: f64 = 299_792.458;

/// Proton mass in g.
pub const PROTON_MASS: f64 = 1.672_621_923_69e-24;

/// Newton's constant in cm^3 g^-1 s^-2.
const GRAVITATIONAL_CONSTANT: f64 = 6.674_30e-8;

/// One megaparsec in cm.
const MPC_IN_CM: f64 = 3.085_677_581_491_367e24;

/// One gigayear in s.
const GYR_IN_S: f64 = 3.155_76e16;

/// Redshifts beyond this are treated as "no solution" by the inversions.
const MAX_REDSHIFT: f64 = 1.0e4;

/// Relative tolerance of the redshift inversions.
const TOLERANCE: f64 = 1.0e-10;

const MAX_ITERATIONS: usize = 100;

/// Simpson intervals per unit of integrated redshift.
const INTERVALS_PER_UNIT: f64 = 128.0;

/// Distances, densities and their inverses for a fixed background cosmology.
///
/// Implementors must be shareable between the threads that process the draws of a bin.
pub trait Cosmology: Send + Sync {
    /// Proper distance in Mpc travelled by light emitted at redshift `z` until it reaches the
    /// observer at `z = 0`.
    fn lookback_distance(&self, z: f64) -> f64;

    /// Critical density in g/cm^3 at redshift `z`.
    fn critical_density(&self, z: f64) -> f64;

    /// Inverse of [`Cosmology::lookback_distance`]: the redshift at which the lookback distance
    /// equals `distance` (Mpc). Fails with [`SightlineError::Computation`] if the inversion does
    /// not converge, for example because `distance` lies beyond the horizon.
    fn redshift_at_lookback_distance(&self, distance: f64) -> Result<f64>;

    /// Returns `z'` such that `lookback_distance(z') = lookback_distance(z) + distance`.
    fn redshift_after_distance(&self, z: f64, distance: f64) -> Result<f64> {
        self.redshift_at_lookback_distance(self.lookback_distance(z) + distance)
    }
}

/// Parameters of a $\Lambda$CDM background. Curvature is fixed by
/// $\Omega_k = 1 - \Omega_m - \Omega_\Lambda$.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CosmologyParameters {
    /// Dimensionless Hubble constant, $h = H_0 / (100\,\mathrm{km\,s^{-1}\,Mpc^{-1}})$.
    pub hubble: f64,
    /// Total matter density parameter.
    pub omega_matter: f64,
    /// Dark energy density parameter.
    pub omega_lambda: f64,
    /// Baryon density parameter, used to derive the reference electron density.
    pub omega_baryon: f64,
}

impl Default for CosmologyParameters {
    fn default() -> Self {
        Self {
            hubble: 0.71,
            omega_matter: 0.27,
            omega_lambda: 0.73,
            omega_baryon: 0.04,
        }
    }
}

impl CosmologyParameters {
    /// Curvature density parameter.
    pub fn omega_curvature(&self) -> f64 {
        1.0 - self.omega_matter - self.omega_lambda
    }

    /// Checks that the parameters describe a universe the integrators can handle.
    pub fn validate(&self) -> Result<()> {
        if !(self.hubble.is_finite() && self.hubble > 0.0) {
            return Err(SightlineError::configuration(
                "hubble must be finite and greater than zero",
            ));
        }

        if !(self.omega_matter.is_finite() && self.omega_matter > 0.0) {
            return Err(SightlineError::configuration(
                "omega_matter must be finite and greater than zero",
            ));
        }

        if !(self.omega_lambda.is_finite() && self.omega_lambda >= 0.0) {
            return Err(SightlineError::configuration(
                "omega_lambda must be finite and non-negative",
            ));
        }

        if !(self.omega_baryon >= 0.0 && self.omega_baryon <= self.omega_matter) {
            return Err(SightlineError::configuration(
                "omega_baryon must lie between zero and omega_matter",
            ));
        }

        // strongly closed models with a bounce have no real E(z) along the sightline
        if self.omega_curvature() < 0.0 && self.omega_lambda > 0.0 {
            let turnaround = (0..=1000)
                .map(|i| f64::from(i) * 0.01)
                .any(|z| self.e_squared(z) <= 0.0);
            if turnaround {
                return Err(SightlineError::configuration(
                    "cosmological parameters yield a non-positive expansion rate",
                ));
            }
        }

        Ok(())
    }

    fn e_squared(&self, z: f64) -> f64 {
        let zp1 = 1.0 + z;
        self.omega_matter * zp1.powi(3) + self.omega_curvature() * zp1.powi(2) + self.omega_lambda
    }
}

/// A $\Lambda$CDM background evaluated by direct quadrature of the Friedmann equation.
#[derive(Clone, Debug)]
pub struct LambdaCdm {
    parameters: CosmologyParameters,
}

impl LambdaCdm {
    /// Creates the background after validating `parameters`.
    pub fn new(parameters: CosmologyParameters) -> Result<Self> {
        parameters.validate()?;
        Ok(Self { parameters })
    }

    /// Returns the parameters of this background.
    pub fn parameters(&self) -> &CosmologyParameters {
        &self.parameters
    }

    /// Hubble distance $c / H_0$ in Mpc.
    pub fn hubble_distance(&self) -> f64 {
        SPEED_OF_LIGHT / (100.0 * self.parameters.hubble)
    }

    /// Hubble time $1 / H_0$ in Gyr.
    pub fn hubble_time(&self) -> f64 {
        1.0 / self.hubble_rate(0.0) / GYR_IN_S
    }

    /// Hubble rate $H(z)$ in s^-1.
    pub fn hubble_rate(&self, z: f64) -> f64 {
        100.0 * self.parameters.hubble * 1.0e5 / MPC_IN_CM * self.expansion(z)
    }

    /// Dimensionless expansion rate $E(z) = H(z) / H_0$.
    pub fn expansion(&self, z: f64) -> f64 {
        self.parameters.e_squared(z).sqrt()
    }

    /// Time in Gyr light needs to reach the observer from redshift `z`.
    pub fn lookback_time(&self, z: f64) -> f64 {
        self.lookback_distance(z) / self.hubble_distance() * self.hubble_time()
    }

    /// Age of the universe in Gyr at redshift `z`.
    pub fn age(&self, z: f64) -> f64 {
        // substituting a = s^2 removes the square-root behaviour of the integrand at a = 0
        let p = &self.parameters;
        let s_max = (1.0 + z).recip().sqrt();
        let integrand = |s: f64| {
            let s2 = s * s;
            2.0 * s2 / (p.omega_matter + p.omega_curvature() * s2 + p.omega_lambda * s2 * s2 * s2).sqrt()
        };
        self.hubble_time() * simpson(integrand, 0.0, s_max, 1024)
    }

    /// Redshift at which the universe had the age `t` (Gyr). Only the past is accepted: `t` must
    /// not exceed today's age.
    pub fn redshift_at_age(&self, t: f64) -> Result<f64> {
        let today = self.age(0.0);

        if !(t > 0.0 && t <= today) {
            return Err(SightlineError::computation(format!(
                "age {} Gyr is outside of (0, {}] Gyr",
                t, today
            )));
        }

        // age grows monotonically with the scale factor
        let mut lo = (1.0 + MAX_REDSHIFT).recip();
        let mut hi = 1.0;

        if self.age(1.0 / lo - 1.0) > t {
            return Err(SightlineError::computation(format!(
                "age {} Gyr corresponds to a redshift beyond {}",
                t, MAX_REDSHIFT
            )));
        }

        for _ in 0..4 * MAX_ITERATIONS {
            let mid = 0.5 * (lo + hi);
            if self.age(1.0 / mid - 1.0) < t {
                lo = mid;
            } else {
                hi = mid;
            }

            if hi - lo <= TOLERANCE * hi {
                return Ok(1.0 / (0.5 * (lo + hi)) - 1.0);
            }
        }

        Err(SightlineError::computation(format!(
            "redshift at age {} Gyr did not converge",
            t
        )))
    }

    /// Mean baryon number density today in cm^-3, $\Omega_b \rho_c(0) / m_p$. This counts
    /// baryons, not free electrons.
    pub fn mean_baryon_number_density(&self) -> f64 {
        self.parameters.omega_baryon * self.critical_density(0.0) / PROTON_MASS
    }

    /// $\mathrm{d}D / \mathrm{d}z$ in Mpc.
    fn distance_integrand(&self, z: f64) -> f64 {
        self.hubble_distance() / ((1.0 + z) * self.expansion(z))
    }

    /// Lookback distance between `z_from` and `z_to`.
    fn segment_distance(&self, z_from: f64, z_to: f64) -> f64 {
        let intervals = intervals_for(z_to - z_from);
        simpson(|z| self.distance_integrand(z), z_from, z_to, intervals)
    }

    /// Solves `segment_distance(z_start, z) = distance` for `z` with a safeguarded Newton method.
    fn solve_segment(&self, z_start: f64, distance: f64) -> Result<f64> {
        if !(distance.is_finite() && distance >= 0.0) {
            return Err(SightlineError::computation(format!(
                "cannot invert a lookback distance of {} Mpc",
                distance
            )));
        }

        if distance == 0.0 {
            return Ok(z_start);
        }

        let mut lo = z_start;
        let mut hi = f64::INFINITY;
        // the integrand decreases with z, so the linear guess never overshoots
        let mut z = z_start + distance / self.distance_integrand(z_start);

        for _ in 0..MAX_ITERATIONS {
            if !z.is_finite() || z > MAX_REDSHIFT {
                return Err(SightlineError::computation(format!(
                    "lookback distance of {} Mpc beyond z = {} lies outside the horizon",
                    distance, z_start
                )));
            }

            let residual = self.segment_distance(z_start, z) - distance;

            if residual < 0.0 {
                lo = z;
            } else {
                hi = z;
            }

            let newton = z - residual / self.distance_integrand(z);
            let next = if newton > lo && newton < hi {
                newton
            } else if hi.is_finite() {
                0.5 * (lo + hi)
            } else {
                2.0 * lo - z_start
            };

            if (next - z).abs() <= TOLERANCE * (1.0 + next) {
                return Ok(next);
            }

            z = next;
        }

        Err(SightlineError::computation(format!(
            "inversion of lookback distance {} Mpc did not converge after {} iterations",
            distance, MAX_ITERATIONS
        )))
    }
}

impl Cosmology for LambdaCdm {
    fn lookback_distance(&self, z: f64) -> f64 {
        self.segment_distance(0.0, z)
    }

    fn critical_density(&self, z: f64) -> f64 {
        let h = self.hubble_rate(z);
        3.0 * h * h / (8.0 * std::f64::consts::PI * GRAVITATIONAL_CONSTANT)
    }

    fn redshift_at_lookback_distance(&self, distance: f64) -> Result<f64> {
        self.solve_segment(0.0, distance)
    }

    fn redshift_after_distance(&self, z: f64, distance: f64) -> Result<f64> {
        self.solve_segment(z, distance)
    }
}

/// Even number of Simpson intervals for a redshift span.
fn intervals_for(span: f64) -> usize {
    let n = (INTERVALS_PER_UNIT * span.abs()).ceil() as usize;
    (n.max(8) + 1) & !1
}

/// Composite Simpson rule of `f` over `[a, b]` using `intervals` (even) sub-intervals.
fn simpson<F: Fn(f64) -> f64>(f: F, a: f64, b: f64, intervals: usize) -> f64 {
    debug_assert!(intervals % 2 == 0);
    let h = (b - a) / intervals as f64;
    let inner: f64 = (1..intervals)
        .map(|i| {
            let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
            weight * f(a + i as f64 * h)
        })
        .sum();

    (f(a) + inner + f(b)) * h / 3.0
}
