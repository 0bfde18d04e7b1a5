// Training-history sink.
//
// One JSON object per line, appended after every epoch, so an interrupted
// run keeps everything recorded so far. The driver uses it to report which
// epoch held the best validation loss; nothing in the core reads it back.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Losses for one training epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub validation_loss: f64,
}

/// Append-only JSON-lines history file.
pub struct HistorySink {
    path: PathBuf,
}

impl HistorySink {
    pub fn new(path: PathBuf) -> Self {
        HistorySink { path }
    }

    /// Append one record, creating the file on first use.
    pub fn append(&self, record: &EpochRecord) -> Result<(), Box<dyn std::error::Error>> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let json = serde_json::to_string(record)?;
        writeln!(file, "{json}")?;
        Ok(())
    }

    /// Read every record back, skipping blank lines.
    pub fn read_all(path: &Path) -> Result<Vec<EpochRecord>, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        data.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| Ok(serde_json::from_str(line)?))
            .collect()
    }
}
