//! Catalog entities: containers (media directories) and their contents.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the per-container directory holding generated previews.
pub const PREVIEW_DIRECTORY: &str = "container_previews";

/// A logical grouping of content items, backed by a directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    /// Directory name.
    pub name: String,
    /// Parent directory of the container.
    pub path: String,
    pub description: String,
    pub preview_url: String,
    pub total: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Container {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            path: path.into(),
            description: String::new(),
            preview_url: String::new(),
            total: 0,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fully qualified directory of this container.
    pub fn fq_path(&self) -> PathBuf {
        PathBuf::from(&self.path).join(&self.name)
    }

    /// Directory previews for this container are written to.
    pub fn preview_dir(&self) -> PathBuf {
        self.fq_path().join(PREVIEW_DIRECTORY)
    }
}

/// A single cataloged media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub id: String,
    pub container_id: String,
    /// File name inside the container directory.
    pub src: String,
    /// MIME type, e.g. `video/mp4`.
    pub content_type: String,
    /// Preview path relative to the container directory; empty if none.
    pub preview: String,
    pub size_bytes: i64,
    pub corrupt: bool,
    /// Position inside the container.
    pub idx: i64,
    /// Detected codec, filled in by probing.
    pub encoding: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Content {
    pub fn new(
        container_id: impl Into<String>,
        src: impl Into<String>,
        content_type: impl Into<String>,
        size_bytes: i64,
        idx: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            container_id: container_id.into(),
            src: src.into(),
            content_type: content_type.into(),
            preview: String::new(),
            size_bytes,
            corrupt: false,
            idx,
            encoding: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    pub fn is_video(&self) -> bool {
        self.content_type.starts_with("video/")
    }

    /// Whether the preview engine knows how to render this content.
    pub fn is_previewable(&self) -> bool {
        self.is_image() || self.is_video()
    }
}

/// One seek screen captured from a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screen {
    pub id: String,
    pub content_id: String,
    /// File name inside `path`.
    pub src: String,
    /// Directory holding the screen file.
    pub path: String,
    /// Position of the screen in its sequence, starting at 1.
    pub idx: i64,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Screen {
    pub fn new(
        content_id: impl Into<String>,
        src: impl Into<String>,
        path: impl Into<String>,
        idx: i64,
        size_bytes: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content_id: content_id.into(),
            src: src.into(),
            path: path.into(),
            idx,
            size_bytes,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn fq_path(&self) -> PathBuf {
        PathBuf::from(&self.path).join(&self.src)
    }
}
