//! Still previews for single items and whole containers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use image::ImageFormat;
use image::imageops::FilterType;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::tool::MediaTool;
use crate::config::MediaConfig;
use crate::database::repositories::CatalogRepository;
use crate::domain::{Container, Content, PREVIEW_DIRECTORY};
use crate::error::{PreviewBatchError, PreviewFailure};
use crate::utils::fs;
use crate::{Error, Result};

/// Whether `path` is worth a preview: a regular file larger than
/// `min_size_bytes`. A minimum of 0 accepts every regular file.
pub async fn should_create_preview(path: &Path, min_size_bytes: u64) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => min_size_bytes == 0 || meta.len() > min_size_bytes,
        Ok(_) => false,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Cannot stat preview source");
            false
        }
    }
}

/// File name of the still preview for `src`.
pub fn preview_file_name(src: &str) -> String {
    format!("{}.jpg", src)
}

/// Path of a preview artifact relative to its container directory.
pub fn preview_relative_path(file_name: &str) -> String {
    format!("{}/{}", PREVIEW_DIRECTORY, file_name)
}

/// What happened to one item of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum PreviewOutcome {
    /// Relative path of the written preview.
    Generated(String),
    /// Not previewable or below the size threshold.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewItem {
    pub content_id: String,
    pub src: String,
    pub outcome: PreviewOutcome,
}

/// Per-item results of a successful container batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreviewBatchReport {
    pub container_id: String,
    pub items: Vec<PreviewItem>,
}

impl PreviewBatchReport {
    pub fn generated(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, PreviewOutcome::Generated(_)))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.items.len() - self.generated()
    }
}

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Exclusive hold on one container's preview directory.
///
/// Dropping the guard releases the lock and forgets the container's entry
/// once nobody else holds or waits for it.
pub struct ContainerGuard {
    guard: Option<OwnedMutexGuard<()>>,
    container_id: String,
    locks: Arc<LockMap>,
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.container_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Produces preview artifacts and records them in the catalog.
pub struct PreviewEngine {
    pub(super) catalog: Arc<dyn CatalogRepository>,
    pub(super) tool: Arc<dyn MediaTool>,
    pub(super) config: MediaConfig,
    locks: Arc<LockMap>,
}

impl PreviewEngine {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        tool: Arc<dyn MediaTool>,
        config: MediaConfig,
    ) -> Self {
        Self {
            catalog,
            tool,
            config,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogRepository> {
        &self.catalog
    }

    /// Exclusive access to a container's preview directory.
    ///
    /// Clearing and generating against the same container must hold this
    /// guard; different containers do not contend.
    pub async fn lock_container(&self, container_id: &str) -> ContainerGuard {
        let lock = self
            .locks
            .entry(container_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        ContainerGuard {
            guard: Some(lock.lock_owned().await),
            container_id: container_id.to_string(),
            locks: self.locks.clone(),
        }
    }

    pub(super) fn source_path(container: &Container, content: &Content) -> PathBuf {
        container.fq_path().join(&content.src)
    }

    /// Produce the still preview for one content item.
    ///
    /// Returns the preview path relative to the container directory, or an
    /// empty string when the item does not qualify. Does not touch the
    /// catalog.
    pub async fn create_media_preview(
        &self,
        container: &Container,
        content: &Content,
        min_size_bytes: u64,
    ) -> Result<String> {
        if !content.is_previewable() {
            return Ok(String::new());
        }
        let src = Self::source_path(container, content);
        if !should_create_preview(&src, min_size_bytes).await {
            return Ok(String::new());
        }

        let dir = container.preview_dir();
        fs::ensure_dir_all_with_op("creating preview directory", &dir).await?;
        let file_name = preview_file_name(&content.src);
        let dest = dir.join(&file_name);

        if content.is_image() {
            scale_image(src, dest.clone(), self.config.preview_width).await?;
        } else {
            self.extract_video_frame(&src, &dest).await?;
        }

        if !fs::is_file(&dest).await {
            return Err(Error::tool(
                self.tool.name(),
                format!("no preview was written for {}", content.src),
            ));
        }
        debug!(src = %content.src, preview = %file_name, "Preview created");
        Ok(preview_relative_path(&file_name))
    }

    async fn extract_video_frame(&self, src: &Path, dest: &Path) -> Result<()> {
        let offset = self.config.preview_frame_offset_secs;
        let width = self.config.preview_width;
        self.tool.extract_frame(src, offset, width, dest).await?;

        // Clips shorter than the offset produce no frame; fall back to the start.
        if offset > 0.0 && !fs::is_file(dest).await {
            debug!(src = %src.display(), "No frame at {:.2}s, retrying at 0s", offset);
            self.tool.extract_frame(src, 0.0, width, dest).await?;
        }
        Ok(())
    }

    /// Generate previews for every item of a container.
    ///
    /// Items are processed one at a time and a failing item does not stop
    /// the batch. Successful previews are written back to the content,
    /// failed items are marked corrupt. Returns `Error::PreviewBatch` listing
    /// every failure if at least one item failed.
    pub async fn create_container_previews(
        &self,
        container: &Container,
        min_size_bytes: u64,
    ) -> Result<PreviewBatchReport> {
        let contents = self.catalog.list_contents(&container.id).await?;
        fs::ensure_dir_all_with_op("creating preview directory", &container.preview_dir())
            .await?;

        let mut report = PreviewBatchReport {
            container_id: container.id.clone(),
            items: Vec::with_capacity(contents.len()),
        };
        let mut failures = Vec::new();
        let mut first_preview: Option<String> = None;

        for mut content in contents {
            match self
                .create_media_preview(container, &content, min_size_bytes)
                .await
            {
                Ok(path) if path.is_empty() => report.items.push(PreviewItem {
                    content_id: content.id.clone(),
                    src: content.src.clone(),
                    outcome: PreviewOutcome::Skipped,
                }),
                Ok(path) => {
                    content.preview = path.clone();
                    content.corrupt = false;
                    if let Err(e) = self.catalog.update_content(&content).await {
                        failures.push(failure(container, &content, &e));
                        continue;
                    }
                    first_preview.get_or_insert_with(|| content.id.clone());
                    if let Err(e) = self.attach_existing_screens(container, &content).await {
                        warn!(src = %content.src, error = %e, "Failed to attach existing screens");
                    }
                    report.items.push(PreviewItem {
                        content_id: content.id.clone(),
                        src: content.src.clone(),
                        outcome: PreviewOutcome::Generated(path),
                    });
                }
                Err(e) => {
                    warn!(src = %content.src, error = %e, "Preview generation failed");
                    failures.push(failure(container, &content, &e));
                    content.corrupt = true;
                    if let Err(e) = self.catalog.update_content(&content).await {
                        warn!(src = %content.src, error = %e, "Failed to mark content corrupt");
                    }
                }
            }
        }

        if let Some(first) = first_preview {
            let mut container = container.clone();
            container.preview_url = format!("/preview/{}", first);
            self.catalog.update_container(&container).await?;
        }

        info!(
            container = %container.name,
            generated = report.generated(),
            skipped = report.skipped(),
            failed = failures.len(),
            "Container previews processed"
        );

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(Error::PreviewBatch(PreviewBatchError {
                attempted: report.generated() + failures.len(),
                generated: report.generated(),
                failures,
                reports: vec![report],
            }))
        }
    }

    /// Generate previews for every container, holding each container's lock
    /// while it is processed.
    ///
    /// All containers are attempted; failures are merged into one
    /// `Error::PreviewBatch` that still carries the reports of every
    /// container.
    pub async fn create_all_previews(&self, min_size_bytes: u64) -> Result<Vec<PreviewBatchReport>> {
        let containers = self.catalog.list_containers().await?;
        let mut aggregate = PreviewBatchError::default();

        for container in &containers {
            let _guard = self.lock_container(&container.id).await;
            match self.create_container_previews(container, min_size_bytes).await {
                Ok(report) => aggregate.record(report),
                Err(Error::PreviewBatch(batch)) => aggregate.merge(batch),
                Err(e) => {
                    warn!(container = %container.name, error = %e, "Container preview batch failed");
                    aggregate.attempted += 1;
                    aggregate.failures.push(PreviewFailure {
                        container_id: container.id.clone(),
                        content_id: String::new(),
                        src: container.name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if aggregate.failures.is_empty() {
            Ok(aggregate.reports)
        } else {
            Err(Error::PreviewBatch(aggregate))
        }
    }

    /// Delete the container's preview directory and recreate it empty.
    pub async fn clear_container_previews(&self, container: &Container) -> Result<()> {
        let dir = container.preview_dir();
        if dir.file_name().and_then(|n| n.to_str()) != Some(PREVIEW_DIRECTORY) {
            return Err(Error::validation(format!(
                "refusing to clear {}: not a preview directory",
                dir.display()
            )));
        }
        fs::remove_dir_all_if_exists("clearing preview directory", &dir).await?;
        fs::ensure_dir_all_with_op("creating preview directory", &dir).await?;
        info!(container = %container.name, "Cleared container previews");
        Ok(())
    }
}

fn failure(container: &Container, content: &Content, e: &Error) -> PreviewFailure {
    PreviewFailure {
        container_id: container.id.clone(),
        content_id: content.id.clone(),
        src: content.src.clone(),
        message: e.to_string(),
    }
}

/// Scale an image down to `max_width` (never up) and save it as JPEG.
async fn scale_image(src: PathBuf, dest: PathBuf, max_width: u32) -> Result<()> {
    tokio::task::spawn_blocking(move || -> Result<()> {
        let img = image::open(&src)?;
        let img = if img.width() > max_width {
            img.resize(max_width, u32::MAX, FilterType::Lanczos3)
        } else {
            img
        };
        img.to_rgb8().save_with_format(&dest, ImageFormat::Jpeg)?;
        Ok(())
    })
    .await
    .map_err(|e| Error::Other(format!("image task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::tool::MediaInfo;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};

    /// Writes a small JPEG instead of running ffmpeg.
    struct StubTool;

    #[async_trait]
    impl MediaTool for StubTool {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn extract_frame(&self, src: &Path, _at: f64, width: u32, dest: &Path) -> Result<()> {
            if src.to_string_lossy().contains("broken") {
                return Err(Error::tool("stub", "cannot decode"));
            }
            RgbImage::from_pixel(width, 4, Rgb([1, 2, 3]))
                .save_with_format(dest, ImageFormat::Jpeg)?;
            Ok(())
        }

        async fn media_info(&self, _src: &Path) -> Result<MediaInfo> {
            Ok(MediaInfo::default())
        }

        async fn encode(&self, _: &Path, _: &Path, _: &str, _: i32, _: i32) -> Result<()> {
            Ok(())
        }

        async fn webp_from_screens(&self, _: &Path, _: &Path, _: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn write_png(path: &Path, width: u32, height: u32) {
        RgbImage::from_pixel(width, height, Rgb([200, 10, 10]))
            .save(path)
            .unwrap();
    }

    fn setup(files: &[(&str, &str)]) -> (tempfile::TempDir, Arc<MemoryStore>, Container, PreviewEngine) {
        let dir = tempfile::tempdir().unwrap();
        let container = Container::new("box", dir.path().to_string_lossy());
        std::fs::create_dir_all(container.fq_path()).unwrap();

        let mut contents = Vec::new();
        for (idx, (name, mime)) in files.iter().enumerate() {
            let path = container.fq_path().join(name);
            if mime.starts_with("image/") {
                write_png(&path, 1000, 500);
            } else {
                std::fs::write(&path, b"data").unwrap();
            }
            contents.push(Content::new(&container.id, *name, *mime, 4, idx as i64));
        }

        let store = Arc::new(MemoryStore::new());
        store.initialize(vec![container.clone()], contents);
        let engine = PreviewEngine::new(store.clone(), Arc::new(StubTool), MediaConfig::default());
        (dir, store, container, engine)
    }

    #[tokio::test]
    async fn test_should_create_preview_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.bin");
        std::fs::write(&file, vec![0u8; 100]).unwrap();

        assert!(should_create_preview(&file, 0).await);
        assert!(should_create_preview(&file, 99).await);
        assert!(!should_create_preview(&file, 100).await);
        assert!(!should_create_preview(&file, 1000).await);
        assert!(!should_create_preview(dir.path(), 0).await);
        assert!(!should_create_preview(&dir.path().join("missing"), 0).await);
    }

    #[tokio::test]
    async fn test_image_preview_is_scaled() {
        let (_dir, _store, container, engine) = setup(&[("big.png", "image/png")]);
        let content = engine.catalog.list_contents(&container.id).await.unwrap().remove(0);

        let path = engine.create_media_preview(&container, &content, 0).await.unwrap();
        assert_eq!(path, "container_previews/big.png.jpg");

        let preview = image::open(container.fq_path().join(&path)).unwrap();
        assert_eq!(preview.width(), 640);
        assert_eq!(preview.height(), 320);
    }

    #[tokio::test]
    async fn test_non_previewable_returns_empty() {
        let (_dir, _store, container, engine) = setup(&[("notes.txt", "text/plain")]);
        let content = engine.catalog.list_contents(&container.id).await.unwrap().remove(0);
        let path = engine.create_media_preview(&container, &content, 0).await.unwrap();
        assert!(path.is_empty());
    }

    #[tokio::test]
    async fn test_batch_reports_every_failure() {
        let (_dir, store, container, engine) = setup(&[
            ("a.mp4", "video/mp4"),
            ("broken.mp4", "video/mp4"),
            ("c.png", "image/png"),
            ("d.txt", "text/plain"),
        ]);

        let err = engine
            .create_container_previews(&container, 0)
            .await
            .unwrap_err();
        let Error::PreviewBatch(batch) = err else {
            panic!("expected a batch error, got {err:?}");
        };
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].src, "broken.mp4");
        assert_eq!(batch.generated, 2);
        assert_eq!(batch.attempted, 3);

        let contents = store.list_contents(&container.id).await.unwrap();
        assert_eq!(contents[0].preview, "container_previews/a.mp4.jpg");
        assert!(contents[1].corrupt);
        assert_eq!(contents[2].preview, "container_previews/c.png.jpg");
        assert!(contents[3].preview.is_empty());

        let stored = store.get_container(&container.id).await.unwrap();
        assert_eq!(stored.preview_url, format!("/preview/{}", contents[0].id));
    }

    #[tokio::test]
    async fn test_clear_empties_directory() {
        let (_dir, _store, container, engine) = setup(&[("a.png", "image/png")]);
        engine.create_container_previews(&container, 0).await.unwrap();
        assert_eq!(std::fs::read_dir(container.preview_dir()).unwrap().count(), 1);

        engine.clear_container_previews(&container).await.unwrap();
        assert!(container.preview_dir().is_dir());
        assert_eq!(std::fs::read_dir(container.preview_dir()).unwrap().count(), 0);

        // Idempotent.
        engine.clear_container_previews(&container).await.unwrap();
    }

    #[tokio::test]
    async fn test_container_lock_is_exclusive() {
        let (_dir, _store, container, engine) = setup(&[]);
        let guard = engine.lock_container(&container.id).await;
        let second = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            engine.lock_container(&container.id),
        )
        .await;
        assert!(second.is_err());
        drop(guard);

        let _other = engine.lock_container("another").await;
        let _again = engine.lock_container(&container.id).await;
    }

    #[tokio::test]
    async fn test_released_locks_are_forgotten() {
        let (_dir, _store, container, engine) = setup(&[]);
        let engine = Arc::new(engine);

        let guard = engine.lock_container(&container.id).await;
        let waiter = {
            let engine = engine.clone();
            let id = container.id.clone();
            tokio::spawn(async move {
                let _guard = engine.lock_container(&id).await;
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drop(guard);
        waiter.await.unwrap();
        assert!(engine.locks.is_empty());

        for id in ["a", "b", "c"] {
            drop(engine.lock_container(id).await);
        }
        assert!(engine.locks.is_empty());
    }
}
