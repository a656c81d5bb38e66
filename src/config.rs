//! Run configuration, loadable from JSON. Every field has a default, so a configuration file only
//! needs to list what differs from it.
use crate::cosmology::CosmologyParameters;
use crate::density::{DensityModel, DensitySampler, IonizedFraction};
use crate::error::{Result, SightlineError};
use crate::measures::MagneticFieldModel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default number of Monte Carlo draws per redshift bin.
pub const DEFAULT_DRAWS: usize = 1000;

/// Default mean comoving electron density today in cm^-3, at which `b0` is given.
pub const DEFAULT_REFERENCE_DENSITY: f64 = 1.8e-7;

/// Physical model of the intergalactic medium along a sightline.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SightlineModel {
    /// Name under which results are stored.
    pub name: String,
    /// Field strength in µG at the reference density.
    pub b0: f64,
    /// Magnetic coherence length $l_0$ in Mpc.
    pub coherence_length: f64,
    /// Jeans length at $z = 0$ in Mpc; sets the spacing of the redshift grid.
    pub jeans_length: f64,
    /// Exponent $\alpha$ of the relation $B \propto n^\alpha$.
    pub field_exponent: f64,
    /// Fraction of baryons in the diffuse ionized IGM.
    pub ionized_fraction: IonizedFraction,
    /// Log-normal or uniform densities.
    pub density: DensityModel,
    /// Mean comoving electron density today in cm^-3, at which the field strength is `b0`.
    pub reference_density: f64,
}

impl Default for SightlineModel {
    fn default() -> Self {
        Self {
            name: "primordial".to_string(),
            b0: 1.0e-3,
            coherence_length: 1.0,
            jeans_length: 2.3,
            field_exponent: 2.0 / 3.0,
            ionized_fraction: IonizedFraction::default(),
            density: DensityModel::LogNormal,
            reference_density: DEFAULT_REFERENCE_DENSITY,
        }
    }
}

impl SightlineModel {
    /// Returns the named model. `primordial` is the flux-frozen default; `alpha<N>-3rd` for
    /// `N` in `1..=9` uses the field exponent `N / 3`.
    pub fn preset(name: &str) -> Result<Self> {
        if name == "primordial" {
            return Ok(Self::default());
        }

        let exponent = name
            .strip_prefix("alpha")
            .and_then(|rest| rest.strip_suffix("-3rd"))
            .and_then(|n| n.parse::<u8>().ok())
            .filter(|n| (1..=9).contains(n))
            .ok_or_else(|| {
                SightlineError::configuration(format!("unknown model preset `{}`", name))
            })?;

        Ok(Self {
            name: name.to_string(),
            field_exponent: f64::from(exponent) / 3.0,
            ..Self::default()
        })
    }

    /// Names of all presets.
    pub fn preset_names() -> Vec<String> {
        std::iter::once("primordial".to_string())
            .chain((1..=9).map(|n| format!("alpha{}-3rd", n)))
            .collect()
    }

    /// Checks every parameter of the model.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(SightlineError::configuration("model name must not be empty"));
        }

        if !(self.b0.is_finite() && self.b0 >= 0.0) {
            return Err(SightlineError::configuration(
                "b0 must be finite and non-negative",
            ));
        }

        if !(self.coherence_length.is_finite() && self.coherence_length > 0.0) {
            return Err(SightlineError::configuration(
                "coherence_length must be finite and greater than zero",
            ));
        }

        if !(self.jeans_length.is_finite() && self.jeans_length > 0.0) {
            return Err(SightlineError::configuration(
                "jeans_length must be finite and greater than zero",
            ));
        }

        if !(self.field_exponent.is_finite() && self.field_exponent >= 0.0) {
            return Err(SightlineError::configuration(
                "field_exponent must be finite and non-negative",
            ));
        }

        if !(self.reference_density.is_finite() && self.reference_density > 0.0) {
            return Err(SightlineError::configuration(
                "reference_density must be finite and greater than zero",
            ));
        }

        self.ionized_fraction.validate()
    }

    /// Density sampler for this model.
    pub fn density_sampler(&self) -> Result<DensitySampler> {
        DensitySampler::new(
            self.ionized_fraction.clone(),
            self.reference_density,
            self.density,
        )
    }

    /// Magnetic field model for this model.
    pub fn field_model(&self) -> Result<MagneticFieldModel> {
        MagneticFieldModel::new(
            self.b0,
            self.coherence_length,
            self.reference_density,
            self.field_exponent,
        )
    }
}

/// Extent and resolution of a Monte Carlo run.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RunSettings {
    /// Independent sightlines per redshift bin.
    pub n_draws: usize,
    /// Smallest target redshift.
    pub z_min: f64,
    /// Largest target redshift.
    pub z_max: f64,
    /// Number of log-spaced target redshifts.
    pub n_bins: usize,
    /// Seed of the master random number stream.
    pub seed: u64,
    /// Threads the draws of a bin are distributed across.
    pub n_cores: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            n_draws: DEFAULT_DRAWS,
            z_min: 0.1,
            z_max: 6.0,
            n_bins: 20,
            seed: 0xcafef00dd15ea5e5,
            n_cores: 1,
        }
    }
}

impl RunSettings {
    /// Checks the settings.
    pub fn validate(&self) -> Result<()> {
        if self.n_draws == 0 {
            return Err(SightlineError::configuration(
                "n_draws must be greater than zero",
            ));
        }

        if self.n_bins == 0 {
            return Err(SightlineError::configuration(
                "n_bins must be greater than zero",
            ));
        }

        if self.n_cores == 0 {
            return Err(SightlineError::configuration(
                "n_cores must be greater than zero",
            ));
        }

        if !(self.z_min.is_finite() && self.z_min > 0.0) {
            return Err(SightlineError::configuration(
                "z_min must be finite and greater than zero for logarithmic binning",
            ));
        }

        if !(self.z_max.is_finite() && self.z_max > 0.0) {
            return Err(SightlineError::configuration(
                "z_max must be finite and greater than zero",
            ));
        }

        if self.z_max < self.z_min {
            return Err(SightlineError::configuration(
                "z_max must be greater than or equal to z_min",
            ));
        }

        Ok(())
    }

    /// `n_bins` logarithmically spaced redshifts from `z_min` to `z_max`, both included.
    pub fn redshift_bins(&self) -> Vec<f64> {
        if self.n_bins == 1 {
            return vec![self.z_min];
        }

        let lo = self.z_min.ln();
        let span = self.z_max.ln() - lo;
        let denom = (self.n_bins - 1) as f64;

        (0..self.n_bins)
            .map(|idx| {
                if idx + 1 == self.n_bins {
                    self.z_max
                } else {
                    (lo + span * idx as f64 / denom).exp()
                }
            })
            .collect()
    }
}

/// Complete configuration of a run.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Background cosmology.
    pub cosmology: CosmologyParameters,
    /// Model of the intergalactic medium.
    pub model: SightlineModel,
    /// Monte Carlo settings.
    pub run: RunSettings,
}

impl SimulationConfig {
    /// Reads a configuration from a JSON file and validates it.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let config: Self = serde_json::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks all parts of the configuration.
    pub fn validate(&self) -> Result<()> {
        self.cosmology.validate()?;
        self.model.validate()?;
        self.run.validate()
    }
}
