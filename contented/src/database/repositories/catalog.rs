//! Content catalog repository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use crate::database::models::{ContainerDbModel, ContentDbModel, ScreenDbModel};
use crate::domain::{Container, Content, Screen};
use crate::{Error, Result};

/// Capability interface over containers and their contents.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn list_containers(&self) -> Result<Vec<Container>>;
    async fn get_container(&self, id: &str) -> Result<Container>;
    async fn find_container(&self, path: &str, name: &str) -> Result<Option<Container>>;
    async fn create_container(&self, container: &Container) -> Result<()>;
    async fn update_container(&self, container: &Container) -> Result<()>;
    /// Deletes the container and its contents.
    async fn delete_container(&self, id: &str) -> Result<()>;

    /// Contents of a container ordered by `idx`.
    async fn list_contents(&self, container_id: &str) -> Result<Vec<Content>>;
    async fn get_content(&self, id: &str) -> Result<Content>;
    async fn create_content(&self, content: &Content) -> Result<()>;
    async fn update_content(&self, content: &Content) -> Result<()>;
    async fn delete_content(&self, id: &str) -> Result<()>;

    /// Screens of a content item ordered by `idx`.
    async fn list_screens(&self, content_id: &str) -> Result<Vec<Screen>>;
    async fn create_screen(&self, screen: &Screen) -> Result<()>;
    /// Replace every screen of a content item with `screens` in one step.
    async fn replace_screens(&self, content_id: &str, screens: &[Screen]) -> Result<()>;
}

/// SQLx implementation of CatalogRepository.
pub struct SqlxCatalogRepository {
    pool: SqlitePool,
}

impl SqlxCatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for SqlxCatalogRepository {
    async fn list_containers(&self) -> Result<Vec<Container>> {
        let rows = sqlx::query_as::<_, ContainerDbModel>(
            "SELECT * FROM containers ORDER BY path, name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Container::from).collect())
    }

    async fn get_container(&self, id: &str) -> Result<Container> {
        sqlx::query_as::<_, ContainerDbModel>("SELECT * FROM containers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Container::from)
            .ok_or_else(|| Error::not_found("Container", id))
    }

    async fn find_container(&self, path: &str, name: &str) -> Result<Option<Container>> {
        let row = sqlx::query_as::<_, ContainerDbModel>(
            "SELECT * FROM containers WHERE path = ? AND name = ?",
        )
        .bind(path)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Container::from))
    }

    async fn create_container(&self, container: &Container) -> Result<()> {
        let row = ContainerDbModel::from(container);
        sqlx::query(
            r#"
            INSERT INTO containers (id, name, path, description, preview_url, total, active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.name)
        .bind(&row.path)
        .bind(&row.description)
        .bind(&row.preview_url)
        .bind(row.total)
        .bind(row.active)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_container(&self, container: &Container) -> Result<()> {
        let mut row = ContainerDbModel::from(container);
        row.updated_at = Utc::now().timestamp_millis();
        let result = sqlx::query(
            r#"
            UPDATE containers SET
                name = ?, path = ?, description = ?, preview_url = ?, total = ?, active = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&row.name)
        .bind(&row.path)
        .bind(&row.description)
        .bind(&row.preview_url)
        .bind(row.total)
        .bind(row.active)
        .bind(row.updated_at)
        .bind(&row.id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Container", &container.id));
        }
        Ok(())
    }

    async fn delete_container(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM containers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Container", id));
        }
        Ok(())
    }

    async fn list_contents(&self, container_id: &str) -> Result<Vec<Content>> {
        let rows = sqlx::query_as::<_, ContentDbModel>(
            "SELECT * FROM contents WHERE container_id = ? ORDER BY idx, src",
        )
        .bind(container_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Content::from).collect())
    }

    async fn get_content(&self, id: &str) -> Result<Content> {
        sqlx::query_as::<_, ContentDbModel>("SELECT * FROM contents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Content::from)
            .ok_or_else(|| Error::not_found("Content", id))
    }

    async fn create_content(&self, content: &Content) -> Result<()> {
        let row = ContentDbModel::from(content);
        sqlx::query(
            r#"
            INSERT INTO contents (
                id, container_id, src, content_type, preview, size_bytes, corrupt, idx, encoding,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.container_id)
        .bind(&row.src)
        .bind(&row.content_type)
        .bind(&row.preview)
        .bind(row.size_bytes)
        .bind(row.corrupt)
        .bind(row.idx)
        .bind(&row.encoding)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_content(&self, content: &Content) -> Result<()> {
        let mut row = ContentDbModel::from(content);
        row.updated_at = Utc::now().timestamp_millis();
        let result = sqlx::query(
            r#"
            UPDATE contents SET
                src = ?, content_type = ?, preview = ?, size_bytes = ?, corrupt = ?, idx = ?,
                encoding = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&row.src)
        .bind(&row.content_type)
        .bind(&row.preview)
        .bind(row.size_bytes)
        .bind(row.corrupt)
        .bind(row.idx)
        .bind(&row.encoding)
        .bind(row.updated_at)
        .bind(&row.id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Content", &content.id));
        }
        Ok(())
    }

    async fn delete_content(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM contents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Content", id));
        }
        Ok(())
    }

    async fn list_screens(&self, content_id: &str) -> Result<Vec<Screen>> {
        let rows = sqlx::query_as::<_, ScreenDbModel>(
            "SELECT * FROM screens WHERE content_id = ? ORDER BY idx",
        )
        .bind(content_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Screen::from).collect())
    }

    async fn create_screen(&self, screen: &Screen) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        insert_screen(&mut conn, screen).await
    }

    async fn replace_screens(&self, content_id: &str, screens: &[Screen]) -> Result<()> {
        if let Some(other) = screens.iter().find(|s| s.content_id != content_id) {
            return Err(Error::validation(format!(
                "screen {} belongs to content {}, not {}",
                other.id, other.content_id, content_id
            )));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM screens WHERE content_id = ?")
            .bind(content_id)
            .execute(&mut *tx)
            .await?;
        for screen in screens {
            insert_screen(&mut tx, screen).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

async fn insert_screen(conn: &mut SqliteConnection, screen: &Screen) -> Result<()> {
    let row = ScreenDbModel::from(screen);
    sqlx::query(
        r#"
        INSERT INTO screens (id, content_id, src, path, idx, size_bytes, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&row.id)
    .bind(&row.content_id)
    .bind(&row.src)
    .bind(&row.path)
    .bind(row.idx)
    .bind(row.size_bytes)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}
