//! Per-run text log and CSV metrics file.
//!
//! Created only when file logging is enabled. Both files share a stem of the
//! form `training_<YYYY-mm-dd_HH-MM-SS>`; they are opened create-new, and a
//! `_1`, `_2`, ... suffix is added to the stem when either name is taken.

use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::debug;

use crate::utils::error::Result;

/// Timestamp layout used in run file names
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Give up after this many taken suffixes
const MAX_SUFFIX: usize = 1000;

#[derive(Debug)]
pub struct RunLog {
    log: LineWriter<File>,
    csv: LineWriter<File>,
    log_path: PathBuf,
    csv_path: PathBuf,
}

impl RunLog {
    /// Open a fresh pair of run files in `dir`, stamped with the local time.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let stamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        Self::create_with_timestamp(dir, &stamp)
    }

    /// Open a fresh pair of run files for a given timestamp string.
    pub fn create_with_timestamp(dir: impl AsRef<Path>, stamp: &str) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let base = format!("training_{stamp}");
        for attempt in 0..MAX_SUFFIX {
            let stem = if attempt == 0 {
                base.clone()
            } else {
                format!("{base}_{attempt}")
            };
            let log_path = dir.join(format!("{stem}.log"));
            let csv_path = dir.join(format!("{stem}.csv"));
            if log_path.exists() || csv_path.exists() {
                continue;
            }

            let log = match create_new(&log_path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };
            let csv = match create_new(&csv_path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    drop(log);
                    std::fs::remove_file(&log_path)?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            debug!("Run log: {}", log_path.display());
            return Ok(Self {
                log: LineWriter::new(log),
                csv: LineWriter::new(csv),
                log_path,
                csv_path,
            });
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free run log name for '{base}' in {}", dir.display()),
        )
        .into())
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    /// `[<epoch> | <batch>] Loss: <loss>`
    pub fn batch_loss(&mut self, epoch: usize, batch: usize, loss: f64) -> Result<()> {
        writeln!(self.log, "[{epoch} | {batch}] Loss: {loss:.6}")?;
        Ok(())
    }

    pub fn train_summary(&mut self, epoch: usize, loss: f64) -> Result<()> {
        writeln!(self.log, "Train - Epoch {epoch}, Loss: {loss:.6}")?;
        Ok(())
    }

    pub fn test_summary(&mut self, loss: f64, accuracy: f64, fidelity: f64) -> Result<()> {
        writeln!(
            self.log,
            "Test Avg. Loss: {loss:.6}, Acc_correct: {accuracy:.6}, Acc_equal: {fidelity:.6}"
        )?;
        Ok(())
    }

    pub fn best(&mut self, best_fidelity: f64) -> Result<()> {
        writeln!(self.log, "Best Accuracy: {best_fidelity:.6}")?;
        Ok(())
    }

    /// One CSV row per epoch, no header:
    /// `training_loss,testing_loss,testing_accuracy,testing_fidelity`
    pub fn csv_row(
        &mut self,
        train_loss: f64,
        test_loss: f64,
        accuracy: f64,
        fidelity: f64,
    ) -> Result<()> {
        writeln!(
            self.csv,
            "{train_loss:.6},{test_loss:.6},{accuracy:.6},{fidelity:.6}"
        )?;
        Ok(())
    }
}

fn create_new(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_names_use_timestamp() {
        let dir = TempDir::new().unwrap();
        let log = RunLog::create_with_timestamp(dir.path(), "2024-01-02_03-04-05").unwrap();
        assert_eq!(
            log.log_path().file_name().unwrap(),
            "training_2024-01-02_03-04-05.log"
        );
        assert_eq!(
            log.csv_path().file_name().unwrap(),
            "training_2024-01-02_03-04-05.csv"
        );
    }

    #[test]
    fn test_same_second_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let stamp = "2024-01-02_03-04-05";

        let mut first = RunLog::create_with_timestamp(dir.path(), stamp).unwrap();
        first.best(0.5).unwrap();
        let second = RunLog::create_with_timestamp(dir.path(), stamp).unwrap();

        assert_ne!(first.log_path(), second.log_path());
        assert!(second
            .log_path()
            .to_string_lossy()
            .ends_with("training_2024-01-02_03-04-05_1.log"));

        let first_contents = std::fs::read_to_string(first.log_path()).unwrap();
        assert_eq!(first_contents, "Best Accuracy: 0.500000\n");
    }

    #[test]
    fn test_stray_csv_blocks_stem() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("training_x.csv"), "").unwrap();
        let log = RunLog::create_with_timestamp(dir.path(), "x").unwrap();
        assert!(log.csv_path().ends_with("training_x_1.csv"));
    }

    #[test]
    fn test_line_formats() {
        let dir = TempDir::new().unwrap();
        let mut log = RunLog::create_with_timestamp(dir.path(), "fmt").unwrap();

        log.batch_loss(3, 30, 1.25).unwrap();
        log.train_summary(3, 0.5).unwrap();
        log.test_summary(0.75, 0.9, 0.95).unwrap();
        log.csv_row(0.5, 0.75, 0.9, 0.95).unwrap();

        let text = std::fs::read_to_string(log.log_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "[3 | 30] Loss: 1.250000");
        assert_eq!(lines[1], "Train - Epoch 3, Loss: 0.500000");
        assert_eq!(
            lines[2],
            "Test Avg. Loss: 0.750000, Acc_correct: 0.900000, Acc_equal: 0.950000"
        );

        let csv = std::fs::read_to_string(log.csv_path()).unwrap();
        assert_eq!(csv, "0.500000,0.750000,0.900000,0.950000\n");
    }
}
