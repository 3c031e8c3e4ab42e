//! Message history and quarantine stores.
//!
//! Both stores are directories of one JSON file per message. History
//! files are named `{direction}_{message_id}.json`, so re-saving the
//! same message is an overwrite, never a duplicate.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::fs::write_atomic;
use crate::Result;

/// Which way a stored message travelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// We sent it.
    Sent,
    /// We received it.
    Received,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Direction::Sent => "sent",
            Direction::Received => "received",
        })
    }
}

/// One stored history entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Message id.
    pub message_id: String,
    /// Sent or received.
    pub direction: Direction,
    /// When the entry was written.
    pub stored_at: DateTime<Utc>,
    /// The full wire message.
    pub message: Value,
}

/// One quarantined entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuarantineRecord {
    /// Message id.
    pub message_id: String,
    /// Why it was held back, e.g. `unknown_sender`.
    pub reason: String,
    /// When it was quarantined.
    pub quarantined_at: DateTime<Utc>,
    /// The full wire message.
    pub message: Value,
}

pub(crate) fn history_path(dir: &Path, direction: Direction, message_id: &str) -> PathBuf {
    dir.join(format!("{direction}_{message_id}.json"))
}

pub(crate) fn quarantine_path(dir: &Path, message_id: &str) -> PathBuf {
    dir.join(format!("{message_id}.json"))
}

pub(crate) fn save_json<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    write_atomic(path, &serde_json::to_vec_pretty(record)?)
}

/// Load every record in `dir`, newest first, up to `limit`.
///
/// Unreadable entries are skipped with a warning rather than failing
/// the listing.
pub(crate) fn list_records<T, K>(dir: &Path, limit: usize, sort_key: K) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    K: Fn(&T) -> DateTime<Utc>,
{
    let mut records = Vec::new();
    if !dir.exists() {
        return Ok(records);
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let bytes = std::fs::read(&path)?;
        match serde_json::from_slice::<T>(&bytes) {
            Ok(record) => records.push(record),
            Err(error) => warn!(path = %path.display(), %error, "skipping unreadable record"),
        }
    }
    records.sort_by_key(|r| std::cmp::Reverse(sort_key(r)));
    records.truncate(limit);
    Ok(records)
}
