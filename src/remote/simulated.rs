//! Offline album library used for demos and for running without a network.
//!
//! The catalog is fixed and item names are derived from the album, so repeated
//! cycles see the same remote state and never re-download.

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageFormat, Rgb, RgbImage};
use std::hash::Hasher;
use std::io::Cursor;
use twox_hash::XxHash64;

use super::{Album, ContentStream, MediaItem, RemoteAlbumClient, RemoteError};

/// Edge length of the generated placeholder images
const PLACEHOLDER_SIZE: u32 = 64;

const CATALOG: &[(&str, &str, u64)] = &[
    ("alb1", "Vacation 2023", 15),
    ("alb2", "Pets", 8),
    ("alb3", "Family Reunion", 24),
    ("alb4", "Food Blog", 6),
    ("alb5", "Nature Hikes", 12),
];

pub struct SimulatedAlbumClient {
    albums: Vec<Album>,
}

impl Default for SimulatedAlbumClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedAlbumClient {
    pub fn new() -> Self {
        let albums = CATALOG
            .iter()
            .map(|(id, title, count)| Album {
                id: id.to_string(),
                title: title.to_string(),
                item_count: *count,
            })
            .collect();
        Self { albums }
    }

    fn check_credential(credential: &str) -> Result<(), RemoteError> {
        if credential.trim().is_empty() {
            return Err(RemoteError::Auth("empty credential".to_string()));
        }
        Ok(())
    }

    fn items_for(album: &Album) -> Vec<MediaItem> {
        let stem = album.title.replace(['/', '\\'], "_").replace(' ', "_");
        (1..=album.item_count)
            .map(|i| MediaItem {
                filename: format!("{stem}_{i:04}.jpg"),
                content_url: format!("sim://{}/{i}", album.id),
                created_at: None,
            })
            .collect()
    }
}

/// Solid-colour JPEG whose colour is derived from the filename.
fn render_placeholder(filename: &str) -> Result<Bytes, RemoteError> {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(filename.as_bytes());
    let seed = hasher.finish();

    let color = Rgb([(seed >> 16) as u8, (seed >> 8) as u8, seed as u8]);
    let img = RgbImage::from_pixel(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE, color);

    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Jpeg)
        .map_err(|e| RemoteError::Network(format!("failed to render {filename}: {e}")))?;
    Ok(Bytes::from(buf.into_inner()))
}

#[async_trait]
impl RemoteAlbumClient for SimulatedAlbumClient {
    async fn list_albums(&self, credential: &str) -> Result<Vec<Album>, RemoteError> {
        Self::check_credential(credential)?;
        Ok(self.albums.clone())
    }

    async fn list_items(&self, album_id: &str, credential: &str) -> Result<Vec<MediaItem>, RemoteError> {
        Self::check_credential(credential)?;
        let album = self
            .albums
            .iter()
            .find(|a| a.id == album_id)
            .ok_or_else(|| RemoteError::Status {
                status: 404,
                message: format!("album {album_id} not found"),
            })?;
        Ok(Self::items_for(album))
    }

    async fn fetch_content(
        &self,
        item: &MediaItem,
        credential: &str,
    ) -> Result<Option<ContentStream>, RemoteError> {
        Self::check_credential(credential)?;
        if !item.content_url.starts_with("sim://") {
            return Ok(None);
        }

        let bytes = render_placeholder(&item.filename)?;
        Ok(Some(Box::pin(futures::stream::once(async move { Ok(bytes) }))))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
