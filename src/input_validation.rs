//! Validation of configuration values arriving from the control plane and
//! the settings dialog.
//!
//! Values are checked before they reach the configuration store so the worker
//! never reads a document it can't act on (an API key that can't be sent as a
//! header, a folder path with embedded NULs, ...).

use anyhow::{bail, Result};
use std::path::Path;

/// Validate the album titles chosen for synchronization.
pub fn validate_album_titles(titles: &[String]) -> Result<()> {
    const MAX_TITLES: usize = 500;
    const MAX_TITLE_LENGTH: usize = 500;

    if titles.len() > MAX_TITLES {
        bail!(
            "Too many selected albums: {} (max: {})",
            titles.len(),
            MAX_TITLES
        );
    }

    for title in titles {
        if title.trim().is_empty() {
            bail!("Album title cannot be empty");
        }

        if title.chars().count() > MAX_TITLE_LENGTH {
            bail!(
                "Album title too long: '{}...' ({} chars, max: {})",
                title.chars().take(20).collect::<String>(),
                title.chars().count(),
                MAX_TITLE_LENGTH
            );
        }

        if title.chars().any(char::is_control) {
            bail!("Album title contains control characters");
        }
    }

    Ok(())
}

/// Validate an API credential.
///
/// The key is opaque. An empty key is allowed and means "no credential"; a
/// non-empty key is sent as a bearer token, so only values that can't be a
/// header value are rejected.
pub fn validate_api_key(key: &str) -> Result<()> {
    const MAX_KEY_LENGTH: usize = 4096;

    if key.len() > MAX_KEY_LENGTH {
        bail!("API key too long: {} bytes (max: {})", key.len(), MAX_KEY_LENGTH);
    }

    if key.chars().any(char::is_control) {
        bail!("API key contains control characters");
    }

    Ok(())
}

/// Validate the local download folder.
pub fn validate_local_folder(path: &Path) -> Result<()> {
    let Some(path_str) = path.to_str() else {
        bail!("Folder path contains non-UTF-8 characters");
    };

    if path_str.len() > 4096 {
        bail!("Folder path too long: {} bytes (max: 4096)", path_str.len());
    }

    if path_str.contains('\0') {
        bail!("Folder path contains null byte");
    }

    if !path.is_absolute() {
        bail!("Folder path must be absolute: {}", path_str);
    }

    Ok(())
}
