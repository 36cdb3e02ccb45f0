//! Remote album library access.
//!
//! The reconciliation engine only sees [`RemoteAlbumClient`]; which
//! implementation backs it is decided once at startup from [`ClientMode`].

pub mod live;
pub mod simulated;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

pub use live::LiveAlbumClient;
pub use simulated::SimulatedAlbumClient;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub title: String,
    pub item_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Local dedup key: the file is stored under exactly this name.
    pub filename: String,
    /// Opaque locator the client knows how to fetch.
    pub content_url: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("credential rejected: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("remote returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// An auth failure can't succeed for any album, so it ends the cycle.
    pub fn is_auth(&self) -> bool {
        matches!(self, RemoteError::Auth(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RemoteError::Decode(e.to_string())
        } else {
            RemoteError::Network(e.to_string())
        }
    }
}

/// Item content, delivered in chunks.
pub type ContentStream = Pin<Box<dyn Stream<Item = Result<Bytes, RemoteError>> + Send>>;

#[async_trait]
pub trait RemoteAlbumClient: Send + Sync {
    async fn list_albums(&self, credential: &str) -> Result<Vec<Album>, RemoteError>;

    async fn list_items(&self, album_id: &str, credential: &str) -> Result<Vec<MediaItem>, RemoteError>;

    /// `Ok(None)` means the item can't be fetched right now (expired or
    /// missing content); the caller skips it without failing the cycle.
    async fn fetch_content(
        &self,
        item: &MediaItem,
        credential: &str,
    ) -> Result<Option<ContentStream>, RemoteError>;

    /// Short label for logs and the status endpoint.
    fn name(&self) -> &'static str;
}

/// Find the album selected under `title`. Titles aren't unique remotely; the
/// first match wins.
pub fn resolve_album<'a>(albums: &'a [Album], title: &str) -> Option<&'a Album> {
    albums.iter().find(|album| album.title == title)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMode {
    Simulated,
    Live { base_url: String },
}

impl ClientMode {
    pub fn build(&self) -> Result<Arc<dyn RemoteAlbumClient>, RemoteError> {
        Ok(match self {
            ClientMode::Simulated => Arc::new(SimulatedAlbumClient::new()),
            ClientMode::Live { base_url } => Arc::new(LiveAlbumClient::new(base_url.clone())?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn album(id: &str, title: &str) -> Album {
        Album {
            id: id.to_string(),
            title: title.to_string(),
            item_count: 0,
        }
    }

    #[test]
    fn test_resolve_album_takes_first_match() {
        let albums = vec![album("alb1", "Trip"), album("alb2", "Pets"), album("alb3", "Trip")];

        assert_eq!(resolve_album(&albums, "Trip").map(|a| a.id.as_str()), Some("alb1"));
        assert_eq!(resolve_album(&albums, "Pets").map(|a| a.id.as_str()), Some("alb2"));
        assert!(resolve_album(&albums, "trip").is_none());
        assert!(resolve_album(&[], "Trip").is_none());
    }

    #[test]
    fn test_auth_classification() {
        assert!(RemoteError::Auth("401".into()).is_auth());
        assert!(!RemoteError::Network("reset".into()).is_auth());
        assert!(!RemoteError::Status { status: 500, message: String::new() }.is_auth());
    }

    #[test]
    fn test_client_mode_builds_simulated() {
        let client = ClientMode::Simulated.build().unwrap();
        assert_eq!(client.name(), "simulated");
    }
}
