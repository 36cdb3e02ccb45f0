//! REST client for the remote photo library API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{Album, ContentStream, MediaItem, RemoteAlbumClient, RemoteError};

/// Production API base URL
pub const DEFAULT_API_BASE: &str = "https://photoslibrary.googleapis.com/v1";

/// Albums per page (API maximum)
const ALBUM_PAGE_SIZE: u32 = 50;

/// Media items per search page (API maximum)
const ITEM_PAGE_SIZE: u32 = 100;

/// Suffix appended to a base URL to request the original-quality bytes
const DOWNLOAD_ORIGINAL: &str = "=d";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlbumsPage {
    #[serde(default)]
    albums: Vec<ApiAlbum>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAlbum {
    id: String,
    #[serde(default)]
    title: String,
    /// Sent as a decimal string by the API.
    #[serde(default)]
    media_items_count: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    album_id: &'a str,
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    #[serde(default)]
    media_items: Vec<ApiMediaItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMediaItem {
    filename: String,
    base_url: String,
    #[serde(default)]
    media_metadata: Option<ApiMediaMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMediaMetadata {
    #[serde(default)]
    creation_time: Option<DateTime<Utc>>,
}

fn parse_count(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        _ => 0,
    }
}

impl From<ApiAlbum> for Album {
    fn from(api: ApiAlbum) -> Self {
        Album {
            item_count: parse_count(api.media_items_count.as_ref()),
            id: api.id,
            title: api.title,
        }
    }
}

impl From<ApiMediaItem> for MediaItem {
    fn from(api: ApiMediaItem) -> Self {
        MediaItem {
            filename: api.filename,
            content_url: api.base_url,
            created_at: api.media_metadata.and_then(|m| m.creation_time),
        }
    }
}

pub struct LiveAlbumClient {
    http: reqwest::Client,
    base_url: String,
}

impl LiveAlbumClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .user_agent(concat!("photosync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Map rejections to `Auth` and other failures to `Status`.
    async fn check(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RemoteError::Auth(format!("status {}", status.as_u16())));
        }

        Err(RemoteError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl RemoteAlbumClient for LiveAlbumClient {
    #[instrument(skip(self, credential))]
    async fn list_albums(&self, credential: &str) -> Result<Vec<Album>, RemoteError> {
        let url = format!("{}/albums", self.base_url);
        let mut albums = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(credential)
                .query(&[("pageSize", ALBUM_PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let page: AlbumsPage = Self::check(request.send().await?).await?.json().await?;
            albums.extend(page.albums.into_iter().map(Album::from));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("listed {} albums", albums.len());
        Ok(albums)
    }

    #[instrument(skip(self, credential))]
    async fn list_items(&self, album_id: &str, credential: &str) -> Result<Vec<MediaItem>, RemoteError> {
        let url = format!("{}/mediaItems:search", self.base_url);
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let body = SearchRequest {
                album_id,
                page_size: ITEM_PAGE_SIZE,
                page_token: page_token.as_deref(),
            };
            let response = self
                .http
                .post(&url)
                .bearer_auth(credential)
                .json(&body)
                .send()
                .await?;

            let page: SearchPage = Self::check(response).await?.json().await?;
            items.extend(page.media_items.into_iter().map(MediaItem::from));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("album {album_id} has {} items", items.len());
        Ok(items)
    }

    async fn fetch_content(
        &self,
        item: &MediaItem,
        credential: &str,
    ) -> Result<Option<ContentStream>, RemoteError> {
        let url = format!("{}{DOWNLOAD_ORIGINAL}", item.content_url);
        let response = self.http.get(&url).bearer_auth(credential).send().await?;

        if !response.status().is_success() {
            warn!(
                "content for {} unavailable: status {}",
                item.filename,
                response.status().as_u16()
            );
            return Ok(None);
        }

        let stream = response.bytes_stream().map_err(RemoteError::from);
        Ok(Some(Box::pin(stream)))
    }

    fn name(&self) -> &'static str {
        "live"
    }
}
