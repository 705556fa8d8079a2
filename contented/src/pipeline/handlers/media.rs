//! Handlers backed by the preview engine.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::traits::{HandlerOutput, TaskHandler};
use crate::Result;
use crate::domain::{Container, Content, Task, TaskOperation};
use crate::pipeline::registry::HandlerRegistry;
use crate::preview::{EncodeOutcome, PreviewEngine, screens_pattern};

async fn load_content(engine: &PreviewEngine, task: &Task) -> Result<(Container, Content)> {
    let id = task.target_id()?;
    let content = engine.catalog().get_content(id).await?;
    let container = engine.catalog().get_container(&content.container_id).await?;
    Ok((container, content))
}

/// Captures evenly spaced seek screens of a video.
pub struct ScreenCaptureHandler {
    engine: Arc<PreviewEngine>,
}

impl ScreenCaptureHandler {
    pub fn new(engine: Arc<PreviewEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for ScreenCaptureHandler {
    fn name(&self) -> &'static str {
        "screen_capture"
    }

    async fn handle(&self, task: &Task) -> Result<HandlerOutput> {
        let (container, content) = load_content(&self.engine, task).await?;
        let _guard = self.engine.lock_container(&container.id).await;
        let screens = self
            .engine
            .create_screens(&container, &content, &task.params)
            .await?;
        Ok(HandlerOutput::message(format!(
            "created {} screens: {}",
            screens.len(),
            screens_pattern(&content.src)
        )))
    }
}

/// Builds an animated webp preview from previously captured screens.
pub struct WebpHandler {
    engine: Arc<PreviewEngine>,
}

impl WebpHandler {
    pub fn new(engine: Arc<PreviewEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for WebpHandler {
    fn name(&self) -> &'static str {
        "webp_from_screens"
    }

    async fn handle(&self, task: &Task) -> Result<HandlerOutput> {
        let (container, content) = load_content(&self.engine, task).await?;
        let _guard = self.engine.lock_container(&container.id).await;
        let preview = self
            .engine
            .create_webp_from_screens(&container, &content)
            .await?;
        Ok(HandlerOutput::message(format!("created {}", preview)))
    }
}

/// Re-encodes a video into the configured codec.
pub struct EncodingHandler {
    engine: Arc<PreviewEngine>,
}

impl EncodingHandler {
    pub fn new(engine: Arc<PreviewEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for EncodingHandler {
    fn name(&self) -> &'static str {
        "video_encoding"
    }

    async fn handle(&self, task: &Task) -> Result<HandlerOutput> {
        let (container, content) = load_content(&self.engine, task).await?;
        match self
            .engine
            .encode_content(&container, &content, &task.params)
            .await?
        {
            EncodeOutcome::Skipped(reason) => {
                debug!(task_id = %task.id, %reason, "Encoding skipped");
                Ok(HandlerOutput::message(format!("skipped: {}", reason)))
            }
            EncodeOutcome::Encoded(created) => {
                Ok(HandlerOutput::message(format!("encoded to {}", created.src))
                    .with_created_id(created.id))
            }
        }
    }
}

/// Generates the still preview of one content item.
pub struct ContentPreviewHandler {
    engine: Arc<PreviewEngine>,
}

impl ContentPreviewHandler {
    pub fn new(engine: Arc<PreviewEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for ContentPreviewHandler {
    fn name(&self) -> &'static str {
        "content_preview"
    }

    async fn handle(&self, task: &Task) -> Result<HandlerOutput> {
        let (container, mut content) = load_content(&self.engine, task).await?;
        let _guard = self.engine.lock_container(&container.id).await;
        let preview = self
            .engine
            .create_media_preview(&container, &content, 0)
            .await?;
        if preview.is_empty() {
            return Ok(HandlerOutput::message(format!(
                "{} does not need a preview",
                content.src
            )));
        }

        content.preview = preview.clone();
        content.corrupt = false;
        self.engine.catalog().update_content(&content).await?;
        Ok(HandlerOutput::message(format!("created {}", preview)))
    }
}

/// Clears and regenerates every preview of a container.
pub struct ContainerPreviewsHandler {
    engine: Arc<PreviewEngine>,
}

impl ContainerPreviewsHandler {
    pub fn new(engine: Arc<PreviewEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for ContainerPreviewsHandler {
    fn name(&self) -> &'static str {
        "container_previews"
    }

    async fn handle(&self, task: &Task) -> Result<HandlerOutput> {
        let id = task.target_id()?;
        let container = self.engine.catalog().get_container(id).await?;

        let _guard = self.engine.lock_container(&container.id).await;
        self.engine.clear_container_previews(&container).await?;
        let report = self.engine.create_container_previews(&container, 0).await?;
        Ok(HandlerOutput::message(format!(
            "generated {} previews, skipped {}",
            report.generated(),
            report.skipped()
        )))
    }
}

/// Reports source videos made redundant by an encoded copy.
pub struct DetectDuplicatesHandler {
    engine: Arc<PreviewEngine>,
}

impl DetectDuplicatesHandler {
    pub fn new(engine: Arc<PreviewEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for DetectDuplicatesHandler {
    fn name(&self) -> &'static str {
        "detect_duplicates"
    }

    async fn handle(&self, task: &Task) -> Result<HandlerOutput> {
        let id = task.target_id()?;
        let container = self.engine.catalog().get_container(id).await?;
        let duplicates = self.engine.find_duplicate_contents(&container).await?;
        if duplicates.is_empty() {
            return Ok(HandlerOutput::message("found 0 duplicates"));
        }
        let pairs: Vec<String> = duplicates
            .iter()
            .map(|d| format!("{} => {}", d.src, d.encoded_src))
            .collect();
        Ok(HandlerOutput::message(format!(
            "found {} duplicates: {}",
            duplicates.len(),
            pairs.join(", ")
        )))
    }
}

/// Register a handler for every operation the preview engine supports.
pub fn register_default_handlers(registry: &HandlerRegistry, engine: Arc<PreviewEngine>) {
    registry.register(
        TaskOperation::ScreenCapture,
        Arc::new(ScreenCaptureHandler::new(engine.clone())),
    );
    registry.register(
        TaskOperation::WebpFromScreens,
        Arc::new(WebpHandler::new(engine.clone())),
    );
    registry.register(
        TaskOperation::Encoding,
        Arc::new(EncodingHandler::new(engine.clone())),
    );
    registry.register(
        TaskOperation::ContentPreview,
        Arc::new(ContentPreviewHandler::new(engine.clone())),
    );
    registry.register(
        TaskOperation::ContainerPreviews,
        Arc::new(ContainerPreviewsHandler::new(engine.clone())),
    );
    registry.register(
        TaskOperation::DetectDuplicates,
        Arc::new(DetectDuplicatesHandler::new(engine)),
    );
}
