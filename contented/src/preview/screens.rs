//! Seek screens and the animated webp built from them.

use std::path::PathBuf;

use tracing::{debug, info};

use super::engine::{PreviewEngine, preview_relative_path};
use crate::domain::{Container, Content, Screen, TaskParams};
use crate::utils::fs;
use crate::{Error, Result};

/// File name of screen `idx` for `src`.
pub fn screen_file_name(src: &str, idx: u32) -> String {
    format!("{}.screens.{:03}.jpg", src, idx)
}

/// ffmpeg image-sequence pattern matching every screen of `src`.
pub fn screens_pattern(src: &str) -> String {
    format!("{}.screens.%03d.jpg", src)
}

pub fn webp_file_name(src: &str) -> String {
    format!("{}.webp", src)
}

fn screen_prefix(src: &str) -> String {
    format!("{}.screens.", src)
}

/// Sequence number of a screen file named with [`screen_file_name`].
fn screen_index(name: &str, prefix: &str) -> Option<u32> {
    name.strip_prefix(prefix)?.strip_suffix(".jpg")?.parse().ok()
}

impl PreviewEngine {
    async fn existing_screens(&self, container: &Container, content: &Content) -> Result<Vec<PathBuf>> {
        let dir = container.preview_dir();
        let prefix = screen_prefix(&content.src);
        let mut screens = Vec::new();

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(screens),
            Err(e) => return Err(fs::io_error("reading preview directory", &dir, e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| fs::io_error("reading preview directory", &dir, e))?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&prefix) && name.ends_with(".jpg") {
                screens.push(entry.path());
            }
        }
        screens.sort();
        Ok(screens)
    }

    /// Capture `number_of_screens` evenly spaced frames of a video.
    ///
    /// Screens left by an earlier run are removed first, on disk and in the
    /// catalog. Returns the screens recorded for the content.
    pub async fn create_screens(
        &self,
        container: &Container,
        content: &Content,
        params: &TaskParams,
    ) -> Result<Vec<Screen>> {
        if !content.is_video() {
            return Err(Error::validation(format!(
                "{} is not a video ({})",
                content.src, content.content_type
            )));
        }
        params.validate_screens()?;

        let src = Self::source_path(container, content);
        let info = self.tool.media_info(&src).await?;
        let start = f64::from(params.start_time_seconds);
        if info.duration_secs <= start {
            return Err(Error::tool(
                self.tool.name(),
                format!(
                    "{} is {:.2}s long, cannot start screens at {:.2}s",
                    content.src, info.duration_secs, start
                ),
            ));
        }

        let dir = container.preview_dir();
        fs::ensure_dir_all_with_op("creating preview directory", &dir).await?;
        for old in self.existing_screens(container, content).await? {
            tokio::fs::remove_file(&old)
                .await
                .map_err(|e| fs::io_error("removing old screen", &old, e))?;
        }

        let count = params.number_of_screens;
        let step = (info.duration_secs - start) / f64::from(count);
        let dir_str = dir.to_string_lossy().into_owned();
        let mut screens = Vec::new();
        for idx in 1..=count {
            let at = start + step * f64::from(idx - 1);
            let name = screen_file_name(&content.src, idx);
            let dest = dir.join(&name);
            self.tool
                .extract_frame(&src, at, self.config.preview_width, &dest)
                .await?;
            match tokio::fs::metadata(&dest).await {
                Ok(meta) if meta.is_file() => screens.push(Screen::new(
                    &content.id,
                    name,
                    &dir_str,
                    i64::from(idx),
                    i64::try_from(meta.len()).unwrap_or(i64::MAX),
                )),
                _ => debug!(src = %content.src, at, "No frame written"),
            }
        }

        if screens.is_empty() {
            return Err(Error::tool(
                self.tool.name(),
                format!("no screens were written for {}", content.src),
            ));
        }
        self.catalog.replace_screens(&content.id, &screens).await?;
        info!(src = %content.src, screens = screens.len(), "Screens created");
        Ok(screens)
    }

    /// Record screen files already on disk for a video that has none in the
    /// catalog. Returns how many were attached.
    pub(super) async fn attach_existing_screens(
        &self,
        container: &Container,
        content: &Content,
    ) -> Result<usize> {
        if !content.is_video() || !self.catalog.list_screens(&content.id).await?.is_empty() {
            return Ok(0);
        }

        let prefix = screen_prefix(&content.src);
        let mut screens = Vec::new();
        for path in self.existing_screens(container, content).await? {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let Some(idx) = screen_index(&name, &prefix) else {
                continue;
            };
            let size = tokio::fs::metadata(&path).await.map_or(0, |m| m.len());
            let dir = path
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            screens.push(Screen::new(
                &content.id,
                name,
                dir,
                i64::from(idx),
                i64::try_from(size).unwrap_or(i64::MAX),
            ));
        }

        if !screens.is_empty() {
            self.catalog.replace_screens(&content.id, &screens).await?;
            debug!(src = %content.src, screens = screens.len(), "Attached existing screens");
        }
        Ok(screens.len())
    }

    /// Combine the existing screens of a video into an animated webp and
    /// record it as the content's preview.
    pub async fn create_webp_from_screens(
        &self,
        container: &Container,
        content: &Content,
    ) -> Result<String> {
        if self.existing_screens(container, content).await?.is_empty() {
            return Err(Error::tool(
                self.tool.name(),
                format!("no screens exist for {}", content.src),
            ));
        }

        let dir = container.preview_dir();
        let pattern = dir.join(screens_pattern(&content.src));
        let palette = dir.join(format!("{}.palette.png", content.src));
        let name = webp_file_name(&content.src);
        let dest = dir.join(&name);

        let result = self.tool.webp_from_screens(&pattern, &palette, &dest).await;
        let _ = tokio::fs::remove_file(&palette).await;
        result?;

        if !fs::is_file(&dest).await {
            return Err(Error::tool(
                self.tool.name(),
                format!("no webp was written for {}", content.src),
            ));
        }

        let mut content = content.clone();
        content.preview = preview_relative_path(&name);
        self.catalog.update_content(&content).await?;
        Ok(content.preview)
    }
}
