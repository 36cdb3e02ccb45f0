use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

/// Default maximum number of activity entries to keep in memory
pub const DEFAULT_MAX_LOG_LINES: usize = 10000;

/// Install the global tracing subscriber.
///
/// Honours `RUST_LOG`, defaults to `info`. Safe to call more than once; later
/// calls are ignored.
pub fn init() {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_line_number(true)
        .with_target(false)
        .with_file(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityLevel::Info => f.write_str("info"),
            ActivityLevel::Warning => f.write_str("warning"),
            ActivityLevel::Error => f.write_str("error"),
        }
    }
}

/// One user-visible sync event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: u64,
    pub timestamp: String,
    pub level: ActivityLevel,
    pub message: String,
    pub album: Option<String>,
}

struct ActivityBuffer {
    entries: VecDeque<ActivityEntry>,
    next_id: u64,
}

/// Bounded in-memory feed of sync activity, readable from the control plane.
pub struct ActivityLog {
    buffer: Mutex<ActivityBuffer>,
    max_lines: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOG_LINES)
    }
}

impl ActivityLog {
    pub fn new(max_lines: usize) -> Self {
        Self {
            buffer: Mutex::new(ActivityBuffer {
                entries: VecDeque::with_capacity(max_lines.min(1024)),
                next_id: 1,
            }),
            max_lines,
        }
    }

    pub fn record(&self, level: ActivityLevel, message: impl Into<String>, album: Option<&str>) {
        let mut buffer = self.buffer.lock().unwrap_or_else(|p| p.into_inner());
        let id = buffer.next_id;
        buffer.next_id += 1;

        buffer.entries.push_back(ActivityEntry {
            id,
            timestamp: chrono::Utc::now().to_rfc3339(),
            level,
            message: message.into(),
            album: album.map(str::to_string),
        });

        // Remove from front if full
        while buffer.entries.len() > self.max_lines {
            buffer.entries.pop_front();
        }
    }

    pub fn info(&self, message: impl Into<String>, album: Option<&str>) {
        self.record(ActivityLevel::Info, message, album);
    }

    pub fn warning(&self, message: impl Into<String>, album: Option<&str>) {
        self.record(ActivityLevel::Warning, message, album);
    }

    pub fn error(&self, message: impl Into<String>, album: Option<&str>) {
        self.record(ActivityLevel::Error, message, album);
    }

    /// Page through the feed, oldest first.
    pub fn entries_paginated(&self, album: Option<&str>, offset: usize, limit: usize) -> Vec<ActivityEntry> {
        let buffer = self.buffer.lock().unwrap_or_else(|p| p.into_inner());
        buffer
            .entries
            .iter()
            .filter(|e| album.is_none() || e.album.as_deref() == album)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buffer
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
