use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EngineState {
    Idle,
    Scanning,
    Downloading,
    Sleeping,
    Stopped,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SyncFailureKind {
    Auth,
    Network,
    Filesystem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub kind: SyncFailureKind,
    /// `None` when the failure happened before any album was resolved.
    pub album: Option<String>,
    pub filename: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CycleStatus {
    /// Every selected album was visited (individual items may have failed).
    Completed,
    /// auto_sync is off, or the folder or credential is missing.
    NotReady,
    /// The credential was rejected; remaining albums were not attempted.
    AuthRejected,
    /// A stop or restart arrived mid-cycle.
    Superseded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub status: CycleStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub albums_scanned: usize,
    /// Selected titles with no matching remote album this cycle.
    pub albums_missing: Vec<String>,
    pub items_downloaded: u64,
    pub items_present: u64,
    pub items_unavailable: u64,
    pub bytes_downloaded: u64,
    pub failures: Vec<SyncFailure>,
}

impl CycleReport {
    pub fn new() -> Self {
        Self {
            status: CycleStatus::Completed,
            started_at: Utc::now(),
            finished_at: None,
            albums_scanned: 0,
            albums_missing: Vec::new(),
            items_downloaded: 0,
            items_present: 0,
            items_unavailable: 0,
            bytes_downloaded: 0,
            failures: Vec::new(),
        }
    }

    pub(crate) fn finish(mut self, status: CycleStatus) -> Self {
        self.status = status;
        self.finished_at = Some(Utc::now());
        self
    }

    /// Some items landed and some didn't. Not an error; nothing is rolled back.
    pub fn is_partial_failure(&self) -> bool {
        self.items_downloaded > 0 && !self.failures.is_empty()
    }
}

impl Default for CycleReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress callback payload for one-shot runs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub state: EngineState,
    pub album: Option<String>,
    pub current_file: Option<String>,
    pub processed_items: u64,
    pub total_items: u64,
}

/// Snapshot served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub state: EngineState,
    pub generation: u64,
    pub client: &'static str,
    pub cycles_completed: u64,
    pub last_report: Option<CycleReport>,
}

/// What a cycle would do for one selected album, without downloading.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumPlan {
    pub title: String,
    pub folder: PathBuf,
    pub found: bool,
    pub present: usize,
    pub missing: Vec<String>,
}
