//! Per-epoch learning-rate ledger
//!
//! **Append-Only Write Pattern**:
//! - One `"<epoch>: <lr>"` line per completed epoch, newline-terminated
//! - Written by the training engine, read back once at resume time
//! - Never rewritten or compacted; a resumed run keeps appending, so a file
//!   may hold several lines for one epoch and the last one is authoritative
//!
//! Reads require an exact epoch match. A missing entry for the resumed epoch
//! is fatal rather than defaulted: a silently wrong learning rate would
//! corrupt the schedule without any visible symptom.

use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Error, Result};

/// File name of the ledger inside a run directory.
pub const LEDGER_FILE: &str = "lrs.txt";

/// Append-only learning-rate record of one run.
#[derive(Debug, Clone)]
pub struct LearningRateLedger {
    path: PathBuf,
}

impl LearningRateLedger {
    /// Ledger handle for the given run directory.
    #[must_use]
    pub fn for_run(run_path: &Path) -> Self {
        Self {
            path: run_path.join(LEDGER_FILE),
        }
    }

    /// Path of the underlying `lrs.txt` file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one epoch's learning rate.
    ///
    /// Called once per completed epoch by the training engine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the line cannot be written.
    pub fn append(&self, epoch: u32, learning_rate: f64) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{epoch}: {learning_rate}")?;
        Ok(())
    }

    /// Read back the learning rate recorded for exactly `epoch`.
    ///
    /// Scans every line so that the last entry for the epoch wins, matching
    /// the append order of a run that was resumed and re-ran the epoch.
    /// Malformed lines (an interrupted final write) are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LearningRateNotFound`] if no line has `epoch` as its
    /// first field, or [`Error::Io`] if the file cannot be read.
    pub fn read(&self, epoch: u32) -> Result<f64> {
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::LearningRateNotFound {
                    ledger: self.path.clone(),
                    epoch,
                }
            } else {
                Error::Io(e)
            }
        })?;

        let mut found = None;
        for line in contents.lines() {
            let Some((epoch_field, lr_field)) = line.split_once(": ") else {
                continue;
            };
            let Ok(line_epoch) = epoch_field.trim().parse::<u32>() else {
                continue;
            };
            if line_epoch == epoch {
                if let Ok(lr) = lr_field.trim().parse::<f64>() {
                    found = Some(lr);
                }
            }
        }

        match found {
            Some(lr) => {
                debug!(epoch, learning_rate = lr, "restored learning rate");
                Ok(lr)
            }
            None => Err(Error::LearningRateNotFound {
                ledger: self.path.clone(),
                epoch,
            }),
        }
    }

    /// All well-formed `(epoch, learning_rate)` entries in file order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read.
    pub fn entries(&self) -> Result<Vec<(u32, f64)>> {
        let contents = fs::read_to_string(&self.path)?;
        Ok(contents
            .lines()
            .filter_map(|line| {
                let (epoch, lr) = line.split_once(": ")?;
                Some((epoch.trim().parse().ok()?, lr.trim().parse().ok()?))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LearningRateLedger::for_run(dir.path());

        ledger.append(0, 0.1).unwrap();
        ledger.append(1, 0.05).unwrap();

        assert!((ledger.read(0).unwrap() - 0.1).abs() < f64::EPSILON);
        assert!((ledger.read(1).unwrap() - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_read_missing_epoch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LearningRateLedger::for_run(dir.path());
        ledger.append(0, 0.1).unwrap();

        let err = ledger.read(4).unwrap_err();
        assert!(matches!(
            err,
            Error::LearningRateNotFound { epoch: 4, .. }
        ));
    }

    #[test]
    fn test_read_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LearningRateLedger::for_run(dir.path());
        assert!(matches!(
            ledger.read(0),
            Err(Error::LearningRateNotFound { epoch: 0, .. })
        ));
    }

    #[test]
    fn test_last_entry_for_epoch_wins() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LearningRateLedger::for_run(dir.path());

        // A resumed run re-records the epoch it restarted from
        ledger.append(3, 0.01).unwrap();
        ledger.append(3, 0.002).unwrap();

        assert!((ledger.read(3).unwrap() - 0.002).abs() < f64::EPSILON);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LearningRateLedger::for_run(dir.path());
        fs::write(ledger.path(), "0: 0.1\ngarbage\n1: 0.05").unwrap();

        assert!((ledger.read(1).unwrap() - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_entries_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LearningRateLedger::for_run(dir.path());
        for (epoch, lr) in [(0, 0.1), (1, 0.05), (2, 0.025)] {
            ledger.append(epoch, lr).unwrap();
        }

        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].0, 0);
        assert_eq!(entries[2].0, 2);
    }
}
