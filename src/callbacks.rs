//! Implementation of different callback functions.
//!
//! Callbacks observe a run; they never change its results. A callback that fails (for example
//! because the disk is full) logs the failure and the run continues.
use crate::core::estimators::{BasicEstimators, Estimators};
use crate::core::Checkpoint;
use crate::error::Result;
use log::{error, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Trait for implementing callbacks for the Monte Carlo driver.
pub trait Callback<R> {
    /// This method is called after the draws of each redshift bin have finished, with the
    /// checkpoints of all bins finished so far.
    fn print(&self, chkpts: &[Checkpoint<R>]);
}

/// A callback function that does nothing
pub struct SinkCallback {}

impl<R> Callback<R> for SinkCallback {
    fn print(&self, _: &[Checkpoint<R>]) {}
}

/// A callback function that logs the result of each individual bin
pub struct SimpleCallback {}

impl<R> Callback<R> for SimpleCallback {
    fn print(&self, chkpts: &[Checkpoint<R>]) {
        if let Some(chkpt) = chkpts.last() {
            let dm = chkpt.dm();
            let rm = chkpt.rm();
            info!(
                "bin {} (z = {:.4}, {} grid points) finished: N={} DM={:.4} \u{b1} {:.4} RM={:.6} \u{b1} {:.6} ({} non-zero)",
                chkpts.len() - 1,
                chkpt.redshift(),
                chkpt.grid_points(),
                dm.calls(),
                dm.mean(),
                dm.std_error(),
                rm.mean(),
                rm.std_error(),
                rm.non_zero_calls()
            );
        }
    }
}

/// Writes all checkpoints as JSON to a file after every bin, replacing earlier contents. An
/// interrupted run thus leaves the results of all completed bins behind.
///
/// The new contents go to a sibling file with the extension `.tmp` appended, which is then
/// renamed over the target, so the file always holds a complete set of checkpoints.
pub struct FileWriterCallback {
    path: PathBuf,
}

impl FileWriterCallback {
    /// Creates a callback writing to `path`.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Reads the checkpoints written to `path` back.
    pub fn read<R: DeserializeOwned>(path: &Path) -> Result<Vec<Checkpoint<R>>> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    fn temporary_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }

    fn write<R: Serialize>(&self, chkpts: &[Checkpoint<R>]) -> Result<()> {
        let tmp = self.temporary_path();

        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer(&mut writer, chkpts)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);

        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl<R: Serialize> Callback<R> for FileWriterCallback {
    fn print(&self, chkpts: &[Checkpoint<R>]) {
        if let Err(err) = self.write(chkpts) {
            error!(
                "could not write checkpoints to {}: {}",
                self.path.display(),
                err
            );
        }
    }
}

/// Forwards to two callbacks in turn.
pub struct ChainedCallback<A, B>(pub A, pub B);

impl<R, A: Callback<R>, B: Callback<R>> Callback<R> for ChainedCallback<A, B> {
    fn print(&self, chkpts: &[Checkpoint<R>]) {
        self.0.print(chkpts);
        self.1.print(chkpts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::estimators::{DrawEstimators, Updateable};
    use rand::SeedableRng;
    use rand_pcg::Pcg64;
    use tempfile::tempdir;

    fn checkpoints(bins: usize) -> Vec<Checkpoint<Pcg64>> {
        (0..bins)
            .map(|bin| {
                let mut dm = DrawEstimators::default();
                dm.update(100.0 * (bin + 1) as f64);
                Checkpoint::new(
                    0.1 * (bin + 1) as f64,
                    10 * (bin + 1),
                    Pcg64::seed_from_u64(bin as u64),
                    Pcg64::seed_from_u64(bin as u64 + 1),
                    dm,
                    DrawEstimators::default(),
                )
            })
            .collect()
    }

    #[test]
    fn file_writer_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoints.json");
        let callback = FileWriterCallback::new(&path);

        callback.print(&checkpoints(1));
        callback.print(&checkpoints(3));

        let read: Vec<Checkpoint<Pcg64>> = FileWriterCallback::read(&path).unwrap();
        assert_eq!(read.len(), 3);
        assert_eq!(read[2].grid_points(), 30);
        assert_eq!(read[2].dm().calls(), 1);
        assert!(!callback.temporary_path().exists());
    }

    #[test]
    fn failed_write_keeps_previous_checkpoints() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoints.json");
        let callback = FileWriterCallback::new(&path);

        callback.print(&checkpoints(2));

        // a directory in place of the temporary file makes the next write fail
        fs::create_dir(callback.temporary_path()).unwrap();
        callback.print(&checkpoints(3));

        let read: Vec<Checkpoint<Pcg64>> = FileWriterCallback::read(&path).unwrap();
        assert_eq!(read.len(), 2);
    }

    #[test]
    fn reading_a_missing_file_fails() {
        let dir = tempdir().unwrap();
        let read = FileWriterCallback::read::<Pcg64>(&dir.path().join("missing.json"));

        assert!(read.is_err());
    }
}
