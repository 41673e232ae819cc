//! Durable resume state for the feed poller.
//!
//! A single JSON document holding the three `ResumeState` fields. The poller is
//! the only writer; this module never keeps a live reference to its state.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{domain::Validator, errors::Error, feed::ResumeState, Result};

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    validator: Option<String>,
    watermark: DateTime<Utc>,
    interval_secs: u64,
}

impl From<&ResumeState> for CheckpointFile {
    fn from(st: &ResumeState) -> Self {
        Self {
            validator: st.validator.as_ref().map(|v| v.0.clone()),
            watermark: st.watermark,
            // Rounded up so a positive interval never stores as 0.
            interval_secs: st
                .interval
                .as_secs()
                .saturating_add(u64::from(st.interval.subsec_nanos() > 0)),
        }
    }
}

/// Load a checkpoint.
///
/// `Ok(None)` means there is no checkpoint yet (first run); the caller falls back
/// to `ResumeState::default()`. Anything unreadable or undecodable is an
/// `Error::Checkpoint`, which callers treat as a warning.
pub fn load(path: &Path) -> Result<Option<ResumeState>> {
    let txt = match fs::read_to_string(path) {
        Ok(txt) => txt,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(checkpoint_err(path, e)),
    };

    let file: CheckpointFile =
        serde_json::from_str(&txt).map_err(|e| checkpoint_err(path, e))?;
    if file.interval_secs == 0 {
        return Err(checkpoint_err(path, "interval must be positive"));
    }

    Ok(Some(ResumeState {
        validator: file.validator.map(Validator),
        watermark: file.watermark,
        interval: Duration::from_secs(file.interval_secs),
    }))
}

/// Persist a checkpoint.
///
/// Writes a sibling `*.tmp` file and renames it over `path`, so an interrupted
/// save leaves the previous checkpoint intact.
pub fn save(path: &Path, state: &ResumeState) -> Result<()> {
    let txt = serde_json::to_string_pretty(&CheckpointFile::from(state))?;
    let tmp = tmp_path(path)?;

    let write = || -> io::Result<()> {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(txt.as_bytes())?;
        f.sync_all()?;
        fs::rename(&tmp, path)
    };

    write().map_err(|e| {
        let _ = fs::remove_file(&tmp);
        checkpoint_err(path, e)
    })
}

fn tmp_path(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| checkpoint_err(path, "checkpoint path has no file name"))?;
    let mut tmp = name.to_os_string();
    tmp.push(".tmp");
    Ok(path.with_file_name(tmp))
}

fn checkpoint_err(path: &Path, reason: impl ToString) -> Error {
    Error::Checkpoint {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
