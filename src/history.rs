//! Generation history. Every run appends one entry to a JSON log, newest
//! first, capped so the file never grows without bound.

use crate::error::RingdocError;
use crate::error::ResultMessage;
use chrono::Local;
use serde::Deserialize;
use serde::Serialize;
use std::fs;
use std::path::Path;
use uuid::Uuid;

const HISTORY_LIMIT: usize = 50;

/// One recorded generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct HistoryEntry {
    pub(crate) id: String,
    pub(crate) timestamp: String,
    pub(crate) scope: String,
    pub(crate) excel_file: String,
    pub(crate) doc_count: usize,
    pub(crate) zip_file: String,
    pub(crate) status: String,
}

impl HistoryEntry {
    pub(crate) fn new(scope: &str, excel_file: &str, doc_count: usize, zip_file: &str, status: &str) -> HistoryEntry {
        let id = Uuid::new_v4().simple().to_string()[..8].to_owned();
        HistoryEntry {
            id,
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            scope: scope.to_owned(),
            excel_file: excel_file.to_owned(),
            doc_count,
            zip_file: zip_file.to_owned(),
            status: status.to_owned(),
        }
    }
}

/// The history log as stored on disk.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct History {
    #[serde(default)]
    pub(crate) history: Vec<HistoryEntry>,
}

impl History {
    /// Loads the log; a missing file yields an empty log.
    pub(crate) fn load(path: &Path) -> Result<History, RingdocError> {
        if !path.exists() {
            return Ok(History::default());
        }
        let prefix = format!("Cannot read history '{}'", path.display());
        let text = fs::read_to_string(path).map_err(RingdocError::IoError).with_prefix(&prefix)?;
        let history = serde_json::from_str(&text).map_err(RingdocError::JsonError).with_prefix(&prefix)?;
        Ok(history)
    }

    pub(crate) fn save(&self, path: &Path) -> Result<(), RingdocError> {
        let prefix = format!("Cannot write history '{}'", path.display());
        let text = serde_json::to_string_pretty(self).map_err(RingdocError::JsonError).with_prefix(&prefix)?;
        fs::write(path, text).map_err(RingdocError::IoError).with_prefix(&prefix)?;
        Ok(())
    }

    /// Puts an entry at the front and trims the log to its size limit.
    pub(crate) fn push(&mut self, entry: HistoryEntry) {
        self.history.insert(0, entry);
        self.history.truncate(HISTORY_LIMIT);
    }
}

/// Records one run in the log file.
pub(crate) fn append(path: &Path, entry: HistoryEntry) -> Result<(), RingdocError> {
    let mut history = History::load(path)?;
    history.push(entry);
    history.save(path)
}
