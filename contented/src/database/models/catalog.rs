//! Container and content database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::domain::{Container, Content, Screen};

/// Row of the `containers` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ContainerDbModel {
    pub id: String,
    pub name: String,
    pub path: String,
    pub description: String,
    pub preview_url: String,
    pub total: i64,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&Container> for ContainerDbModel {
    fn from(c: &Container) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
            path: c.path.clone(),
            description: c.description.clone(),
            preview_url: c.preview_url.clone(),
            total: c.total,
            active: c.active,
            created_at: datetime_to_ms(c.created_at),
            updated_at: datetime_to_ms(c.updated_at),
        }
    }
}

impl From<ContainerDbModel> for Container {
    fn from(row: ContainerDbModel) -> Self {
        Self {
            id: row.id,
            name: row.name,
            path: row.path,
            description: row.description,
            preview_url: row.preview_url,
            total: row.total,
            active: row.active,
            created_at: ms_to_datetime(row.created_at),
            updated_at: ms_to_datetime(row.updated_at),
        }
    }
}

/// Row of the `contents` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ContentDbModel {
    pub id: String,
    pub container_id: String,
    pub src: String,
    pub content_type: String,
    pub preview: String,
    pub size_bytes: i64,
    pub corrupt: bool,
    pub idx: i64,
    pub encoding: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&Content> for ContentDbModel {
    fn from(c: &Content) -> Self {
        Self {
            id: c.id.clone(),
            container_id: c.container_id.clone(),
            src: c.src.clone(),
            content_type: c.content_type.clone(),
            preview: c.preview.clone(),
            size_bytes: c.size_bytes,
            corrupt: c.corrupt,
            idx: c.idx,
            encoding: c.encoding.clone(),
            created_at: datetime_to_ms(c.created_at),
            updated_at: datetime_to_ms(c.updated_at),
        }
    }
}

impl From<ContentDbModel> for Content {
    fn from(row: ContentDbModel) -> Self {
        Self {
            id: row.id,
            container_id: row.container_id,
            src: row.src,
            content_type: row.content_type,
            preview: row.preview,
            size_bytes: row.size_bytes,
            corrupt: row.corrupt,
            idx: row.idx,
            encoding: row.encoding,
            created_at: ms_to_datetime(row.created_at),
            updated_at: ms_to_datetime(row.updated_at),
        }
    }
}

/// Row of the `screens` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ScreenDbModel {
    pub id: String,
    pub content_id: String,
    pub src: String,
    pub path: String,
    pub idx: i64,
    pub size_bytes: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&Screen> for ScreenDbModel {
    fn from(s: &Screen) -> Self {
        Self {
            id: s.id.clone(),
            content_id: s.content_id.clone(),
            src: s.src.clone(),
            path: s.path.clone(),
            idx: s.idx,
            size_bytes: s.size_bytes,
            created_at: datetime_to_ms(s.created_at),
            updated_at: datetime_to_ms(s.updated_at),
        }
    }
}

impl From<ScreenDbModel> for Screen {
    fn from(row: ScreenDbModel) -> Self {
        Self {
            id: row.id,
            content_id: row.content_id,
            src: row.src,
            path: row.path,
            idx: row.idx,
            size_bytes: row.size_bytes,
            created_at: ms_to_datetime(row.created_at),
            updated_at: ms_to_datetime(row.updated_at),
        }
    }
}
