//! In-memory album client that records every call it receives.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::remote::{Album, ContentStream, MediaItem, RemoteAlbumClient, RemoteError};

#[derive(Default)]
pub(crate) struct RecordingClient {
    albums: Mutex<Vec<Album>>,
    items: Mutex<HashMap<String, Vec<MediaItem>>>,
    unavailable: HashSet<String>,
    broken: HashSet<String>,
    rejected_item_listings: HashSet<String>,
    listing_rejections: AtomicUsize,
    fetch_delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn album(self, id: &str, title: &str, filenames: &[&str]) -> Self {
        let items: Vec<MediaItem> = filenames.iter().map(|name| item(id, name)).collect();
        self.albums.lock().unwrap().push(Album {
            id: id.to_string(),
            title: title.to_string(),
            item_count: items.len() as u64,
        });
        self.items.lock().unwrap().insert(id.to_string(), items);
        self
    }

    /// `fetch_content` returns `Ok(None)` for this file.
    pub fn unavailable(mut self, filename: &str) -> Self {
        self.unavailable.insert(filename.to_string());
        self
    }

    /// `fetch_content` fails with a network error for this file.
    pub fn broken(mut self, filename: &str) -> Self {
        self.broken.insert(filename.to_string());
        self
    }

    /// Reject the next `n` album listings as unauthorized.
    pub fn reject_listing(self, n: usize) -> Self {
        self.listing_rejections.store(n, Ordering::SeqCst);
        self
    }

    pub fn reject_items(mut self, album_id: &str) -> Self {
        self.rejected_item_listings.insert(album_id.to_string());
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn add_item(&self, album_id: &str, filename: &str) {
        self.items
            .lock()
            .unwrap()
            .entry(album_id.to_string())
            .or_default()
            .push(item(album_id, filename));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.calls().into_iter().filter(|c| c.starts_with(prefix)).collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls_with_prefix(prefix).len()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn item(album_id: &str, filename: &str) -> MediaItem {
    MediaItem {
        filename: filename.to_string(),
        content_url: format!("mem://{album_id}/{filename}"),
        created_at: None,
    }
}

#[async_trait]
impl RemoteAlbumClient for RecordingClient {
    async fn list_albums(&self, _credential: &str) -> Result<Vec<Album>, RemoteError> {
        self.record("list_albums".to_string());
        let rejected = self
            .listing_rejections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(RemoteError::Auth("401 Unauthorized".to_string()));
        }
        Ok(self.albums.lock().unwrap().clone())
    }

    async fn list_items(&self, album_id: &str, _credential: &str) -> Result<Vec<MediaItem>, RemoteError> {
        self.record(format!("list_items:{album_id}"));
        if self.rejected_item_listings.contains(album_id) {
            return Err(RemoteError::Auth("401 Unauthorized".to_string()));
        }
        Ok(self
            .items
            .lock()
            .unwrap()
            .get(album_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_content(
        &self,
        item: &MediaItem,
        _credential: &str,
    ) -> Result<Option<ContentStream>, RemoteError> {
        self.record(format!("fetch:{}", item.filename));
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.contains(&item.filename) {
            return Ok(None);
        }
        if self.broken.contains(&item.filename) {
            return Err(RemoteError::Network("connection reset".to_string()));
        }
        let body = Bytes::from(item.filename.clone().into_bytes());
        Ok(Some(Box::pin(futures::stream::once(async move { Ok(body) }))))
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
