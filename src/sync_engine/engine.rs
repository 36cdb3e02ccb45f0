use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ConfigStore, Configuration};
use crate::logging::ActivityLog;
use crate::path_validation::{album_folder, validate_item_filename};
use crate::remote::{resolve_album, Album, RemoteAlbumClient, RemoteError};
use crate::sync_engine::inventory::{self, LocalInventory, WriteOutcome};
use crate::sync_engine::types::{
    AlbumPlan, CycleReport, CycleStatus, EngineState, EngineStatus, SyncFailure,
    SyncFailureKind, SyncProgress,
};

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(10);

/// Identity of one worker run.
///
/// A worker is superseded once its token is cancelled or the shared counter
/// has moved past its generation. Every side effect is gated on that check.
pub struct WorkerContext {
    generation: u64,
    current: Arc<AtomicU64>,
    cancel: CancellationToken,
    wake: Arc<Notify>,
}

impl WorkerContext {
    pub fn new(
        generation: u64,
        current: Arc<AtomicU64>,
        cancel: CancellationToken,
        wake: Arc<Notify>,
    ) -> Self {
        Self {
            generation,
            current,
            cancel,
            wake,
        }
    }

    /// Context for a one-off run nobody else can supersede except through
    /// the returned token.
    pub fn standalone() -> Self {
        Self::new(
            1,
            Arc::new(AtomicU64::new(1)),
            CancellationToken::new(),
            Arc::new(Notify::new()),
        )
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_superseded(&self) -> bool {
        self.cancel.is_cancelled() || self.current.load(Ordering::SeqCst) != self.generation
    }

    /// Wait out the sync interval. Returns false if the worker should exit.
    ///
    /// Wakes early on cancellation or on a sync-now request.
    pub async fn sleep(&self, interval: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = self.wake.notified() => !self.is_superseded(),
            _ = tokio::time::sleep(interval) => !self.is_superseded(),
        }
    }
}

/// Why an album pass stopped the whole cycle.
enum CycleAbort {
    Auth(RemoteError),
    Superseded,
}

type ProgressFn<'a> = &'a (dyn Fn(SyncProgress) + Send + Sync);

pub struct ReconciliationEngine {
    store: Arc<ConfigStore>,
    client: Arc<dyn RemoteAlbumClient>,
    activity: Arc<ActivityLog>,
    interval: Duration,
    status: Mutex<EngineStatus>,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<ConfigStore>,
        client: Arc<dyn RemoteAlbumClient>,
        activity: Arc<ActivityLog>,
        interval: Duration,
    ) -> Self {
        let status = EngineStatus {
            state: EngineState::Stopped,
            generation: 0,
            client: client.name(),
            cycles_completed: 0,
            last_report: None,
        };
        Self {
            store,
            client,
            activity,
            interval,
            status: Mutex::new(status),
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn client(&self) -> &Arc<dyn RemoteAlbumClient> {
        &self.client
    }

    pub fn activity(&self) -> &Arc<ActivityLog> {
        &self.activity
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn status(&self) -> EngineStatus {
        self.lock_status().clone()
    }

    fn lock_status(&self) -> std::sync::MutexGuard<'_, EngineStatus> {
        self.status.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Older generations never overwrite what a newer one reported.
    fn set_state(&self, ctx: &WorkerContext, state: EngineState) {
        let mut status = self.lock_status();
        if ctx.generation() >= status.generation {
            status.generation = ctx.generation();
            status.state = state;
        }
    }

    fn record_report(&self, ctx: &WorkerContext, report: &CycleReport) {
        let mut status = self.lock_status();
        if ctx.generation() < status.generation {
            return;
        }
        if matches!(report.status, CycleStatus::Completed | CycleStatus::AuthRejected) {
            status.cycles_completed += 1;
        }
        status.last_report = Some(report.clone());
    }

    /// Worker loop: cycle, sleep, repeat until superseded.
    pub async fn run(&self, ctx: &WorkerContext) {
        info!(generation = ctx.generation(), client = self.client.name(), "sync worker started");
        self.set_state(ctx, EngineState::Idle);

        let no_progress = |_: SyncProgress| {};
        while !ctx.is_superseded() {
            // A cancelled cycle is dropped mid-flight; its temp file goes with it.
            let report = tokio::select! {
                report = self.run_cycle(ctx, &no_progress) => report,
                _ = ctx.cancel.cancelled() => break,
            };
            if report.status == CycleStatus::Superseded || ctx.is_superseded() {
                break;
            }
            self.record_report(ctx, &report);

            self.set_state(ctx, EngineState::Sleeping);
            if !ctx.sleep(self.interval).await {
                break;
            }
        }

        self.set_state(ctx, EngineState::Stopped);
        info!(generation = ctx.generation(), "sync worker stopped");
    }

    /// One reconciliation pass over the selected albums.
    ///
    /// Reads a single configuration snapshot at the start; changes made while
    /// the pass runs apply from the next cycle.
    pub async fn run_cycle(&self, ctx: &WorkerContext, progress: ProgressFn<'_>) -> CycleReport {
        let config = self.store.get();
        let mut report = CycleReport::new();

        let credential = match config.credential() {
            Some(c) if config.is_sync_ready() => c,
            _ => {
                debug!("sync not ready (auto_sync off, or folder/credential missing)");
                return report.finish(CycleStatus::NotReady);
            }
        };

        if config.selected_albums.is_empty() {
            info!("no albums selected for sync");
            return report.finish(CycleStatus::Completed);
        }

        if ctx.is_superseded() {
            return report.finish(CycleStatus::Superseded);
        }
        self.set_state(ctx, EngineState::Scanning);

        let albums = match self.client.list_albums(credential).await {
            Ok(albums) => albums,
            Err(e) if e.is_auth() => {
                return self.auth_rejected(report, None, e);
            }
            Err(e) => {
                warn!("failed to list albums: {e}");
                self.activity.error(format!("Failed to list albums: {e}"), None);
                report.failures.push(SyncFailure {
                    kind: SyncFailureKind::Network,
                    album: None,
                    filename: None,
                    message: e.to_string(),
                });
                return report.finish(CycleStatus::Completed);
            }
        };

        for title in &config.selected_albums {
            if ctx.is_superseded() {
                return report.finish(CycleStatus::Superseded);
            }

            let Some(album) = resolve_album(&albums, title) else {
                debug!(album = %title, "selected album not found remotely, skipping");
                report.albums_missing.push(title.clone());
                continue;
            };

            match self
                .sync_album(ctx, &config, credential, album, &mut report, progress)
                .await
            {
                Ok(()) => {}
                Err(CycleAbort::Auth(e)) => return self.auth_rejected(report, Some(title.as_str()), e),
                Err(CycleAbort::Superseded) => return report.finish(CycleStatus::Superseded),
            }
        }

        let report = report.finish(CycleStatus::Completed);
        if report.items_downloaded > 0 || !report.failures.is_empty() {
            info!(
                downloaded = report.items_downloaded,
                failed = report.failures.len(),
                unavailable = report.items_unavailable,
                "sync cycle finished"
            );
            self.activity.info(
                format!(
                    "Sync finished: {} downloaded, {} failed",
                    report.items_downloaded,
                    report.failures.len()
                ),
                None,
            );
        } else {
            debug!("sync cycle finished, nothing to do");
        }
        report
    }

    fn auth_rejected(&self, mut report: CycleReport, album: Option<&str>, e: RemoteError) -> CycleReport {
        warn!("credential rejected, aborting cycle: {e}");
        self.activity
            .error(format!("Credential rejected: {e}"), album);
        report.failures.push(SyncFailure {
            kind: SyncFailureKind::Auth,
            album: album.map(str::to_string),
            filename: None,
            message: e.to_string(),
        });
        report.finish(CycleStatus::AuthRejected)
    }

    async fn sync_album(
        &self,
        ctx: &WorkerContext,
        config: &Configuration,
        credential: &str,
        album: &Album,
        report: &mut CycleReport,
        progress: ProgressFn<'_>,
    ) -> Result<(), CycleAbort> {
        report.albums_scanned += 1;
        let title = album.title.as_str();

        let items = match self.client.list_items(&album.id, credential).await {
            Ok(items) => items,
            Err(e) if e.is_auth() => return Err(CycleAbort::Auth(e)),
            Err(e) => {
                warn!(album = %title, "failed to list items: {e}");
                self.activity
                    .error(format!("Failed to list items: {e}"), Some(title));
                report.failures.push(SyncFailure {
                    kind: SyncFailureKind::Network,
                    album: Some(title.to_string()),
                    filename: None,
                    message: e.to_string(),
                });
                return Ok(());
            }
        };

        let folder = album_folder(&config.local_folder, title);
        let mut local = LocalInventory::scan(&folder);

        let missing: Vec<_> = items
            .iter()
            .filter(|item| !local.is_present(&item.filename))
            .collect();
        report.items_present += (items.len() - missing.len()) as u64;
        if missing.is_empty() {
            return Ok(());
        }

        if ctx.is_superseded() {
            return Err(CycleAbort::Superseded);
        }
        self.set_state(ctx, EngineState::Downloading);

        if let Err(e) = inventory::ensure_folder(&folder) {
            warn!(album = %title, "{e}");
            self.activity.error(e.to_string(), Some(title));
            report.failures.push(SyncFailure {
                kind: e.failure_kind(),
                album: Some(title.to_string()),
                filename: None,
                message: e.to_string(),
            });
            return Ok(());
        }

        let total = missing.len() as u64;
        for (index, item) in missing.into_iter().enumerate() {
            if ctx.is_superseded() {
                return Err(CycleAbort::Superseded);
            }
            // Listings may repeat a filename; the first copy wins.
            if local.is_present(&item.filename) {
                report.items_present += 1;
                continue;
            }

            progress(SyncProgress {
                state: EngineState::Downloading,
                album: Some(title.to_string()),
                current_file: Some(item.filename.clone()),
                processed_items: index as u64,
                total_items: total,
            });

            if let Err(reason) = validate_item_filename(&item.filename) {
                warn!(album = %title, filename = %item.filename, "skipping item: {reason}");
                report.failures.push(SyncFailure {
                    kind: SyncFailureKind::Filesystem,
                    album: Some(title.to_string()),
                    filename: Some(item.filename.clone()),
                    message: reason,
                });
                continue;
            }

            let content = match self.client.fetch_content(item, credential).await {
                Ok(Some(content)) => content,
                Ok(None) => {
                    debug!(album = %title, filename = %item.filename, "content unavailable, skipping");
                    self.activity.warning(
                        format!("Skipped {}: content unavailable", item.filename),
                        Some(title),
                    );
                    report.items_unavailable += 1;
                    continue;
                }
                Err(e) if e.is_auth() => return Err(CycleAbort::Auth(e)),
                Err(e) => {
                    self.item_failed(report, title, &item.filename, SyncFailureKind::Network, e.to_string());
                    continue;
                }
            };

            match local
                .write_item(&folder, &item.filename, content, item.created_at, || {
                    !ctx.is_superseded()
                })
                .await
            {
                Ok(WriteOutcome::Written(bytes)) => {
                    debug!(album = %title, filename = %item.filename, bytes, "downloaded");
                    self.activity
                        .info(format!("Downloaded {}", item.filename), Some(title));
                    report.items_downloaded += 1;
                    report.bytes_downloaded += bytes;
                }
                Ok(WriteOutcome::Abandoned) => return Err(CycleAbort::Superseded),
                Err(e) => {
                    self.item_failed(report, title, &item.filename, e.failure_kind(), e.to_string());
                }
            }
        }

        progress(SyncProgress {
            state: EngineState::Downloading,
            album: Some(title.to_string()),
            current_file: None,
            processed_items: total,
            total_items: total,
        });
        Ok(())
    }

    fn item_failed(
        &self,
        report: &mut CycleReport,
        album: &str,
        filename: &str,
        kind: SyncFailureKind,
        message: String,
    ) {
        warn!(album = %album, filename = %filename, "download failed: {message}");
        self.activity
            .error(format!("Failed to download {filename}: {message}"), Some(album));
        report.failures.push(SyncFailure {
            kind,
            album: Some(album.to_string()),
            filename: Some(filename.to_string()),
            message,
        });
    }

    /// What the next cycle would download, without touching the disk.
    pub async fn plan(&self) -> Result<Vec<AlbumPlan>, RemoteError> {
        let config = self.store.get();
        let credential = config
            .credential()
            .ok_or_else(|| RemoteError::Auth("no credential configured".to_string()))?;

        let albums = self.client.list_albums(credential).await?;
        let mut plans = Vec::with_capacity(config.selected_albums.len());

        for title in &config.selected_albums {
            let folder = album_folder(&config.local_folder, title);
            let Some(album) = resolve_album(&albums, title) else {
                plans.push(AlbumPlan {
                    title: title.clone(),
                    folder,
                    found: false,
                    present: 0,
                    missing: Vec::new(),
                });
                continue;
            };

            let items = self.client.list_items(&album.id, credential).await?;
            let local = LocalInventory::scan(&folder);
            let (present, missing): (Vec<_>, Vec<_>) =
                items.iter().partition(|item| local.is_present(&item.filename));

            plans.push(AlbumPlan {
                title: title.clone(),
                folder,
                found: true,
                present: present.len(),
                missing: missing.into_iter().map(|item| item.filename.clone()).collect(),
            });
        }

        Ok(plans)
    }
}
