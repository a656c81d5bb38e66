//! Mean DM and RM curves as flat tables, keyed by model and measure.
use crate::core::estimators::BasicEstimators;
use crate::core::{Checkpoint, Measure};
use crate::error::{Result, SightlineError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Mean (and standard deviation) of a measure over the draws of every redshift bin.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregatedCurve {
    model: String,
    measure: Measure,
    redshifts: Vec<f64>,
    means: Vec<f64>,
    stddevs: Vec<f64>,
}

#[derive(Debug, Deserialize, Serialize)]
struct CurveRow {
    redshift: f64,
    mean: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stddev: Option<f64>,
}

impl AggregatedCurve {
    /// Collects the curve of `measure` from the checkpoints of a run of `model`.
    pub fn from_checkpoints<R>(model: &str, measure: Measure, checkpoints: &[Checkpoint<R>]) -> Self {
        let estimators = checkpoints.iter().map(|c| c.estimators(measure));

        Self {
            model: model.to_string(),
            measure,
            redshifts: checkpoints.iter().map(Checkpoint::redshift).collect(),
            means: estimators.clone().map(|e| e.mean()).collect(),
            stddevs: estimators.map(|e| e.std()).collect(),
        }
    }

    /// Name of the model.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The measure.
    pub fn measure(&self) -> Measure {
        self.measure
    }

    /// Target redshifts of the bins.
    pub fn redshifts(&self) -> &[f64] {
        &self.redshifts
    }

    /// Mean per bin.
    pub fn means(&self) -> &[f64] {
        &self.means
    }

    /// Standard deviation of the draws per bin. Empty if the curve was read from a table written
    /// without them.
    pub fn stddevs(&self) -> &[f64] {
        &self.stddevs
    }

    /// Path of the table for `model` and `measure` inside `dir`.
    pub fn path_in(dir: &Path, model: &str, measure: Measure) -> PathBuf {
        dir.join(format!("{}_{}.csv", model, measure))
    }

    /// Writes the table to [`AggregatedCurve::path_in`]`(dir, ..)`, creating `dir` if necessary,
    /// and returns the path written. The standard deviation is included if `with_stddev` is set.
    pub fn write_csv(&self, dir: &Path, with_stddev: bool) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = Self::path_in(dir, &self.model, self.measure);
        let mut writer = csv::Writer::from_path(&path)?;

        for (idx, (&redshift, &mean)) in self.redshifts.iter().zip(&self.means).enumerate() {
            writer.serialize(CurveRow {
                redshift,
                mean,
                stddev: if with_stddev {
                    self.stddevs.get(idx).copied()
                } else {
                    None
                },
            })?;
        }

        writer.flush()?;
        Ok(path)
    }

    /// Reads the table of `model` and `measure` back from `dir`.
    pub fn read_csv(dir: &Path, model: &str, measure: Measure) -> Result<Self> {
        let path = Self::path_in(dir, model, measure);
        let mut reader = csv::Reader::from_path(&path)?;

        let rows = reader
            .deserialize()
            .collect::<std::result::Result<Vec<CurveRow>, _>>()?;

        let with_stddev = rows.iter().all(|row| row.stddev.is_some());
        if !with_stddev && rows.iter().any(|row| row.stddev.is_some()) {
            return Err(SightlineError::configuration(format!(
                "{} has a stddev column with missing entries",
                path.display()
            )));
        }

        Ok(Self {
            model: model.to_string(),
            measure,
            redshifts: rows.iter().map(|row| row.redshift).collect(),
            means: rows.iter().map(|row| row.mean).collect(),
            stddevs: rows.iter().filter_map(|row| row.stddev).collect(),
        })
    }
}
