//! Re-encoding videos into the configured target codec.

use std::path::Path;

use tracing::info;

use super::engine::PreviewEngine;
use crate::domain::{Container, Content, TaskParams};
use crate::utils::fs;
use crate::{Error, Result};

/// Result of an encoding request.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeOutcome {
    /// Nothing to do; the reason is reported as the task message.
    Skipped(String),
    /// The newly registered content for the encoded file.
    Encoded(Content),
}

/// Destination file name for an encoded copy of `src`.
pub(super) fn encoded_file_name(src: &str, modifier: &str) -> String {
    let stem = Path::new(src)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| src.to_string());
    format!("{}{}.mp4", stem, modifier)
}

impl PreviewEngine {
    /// Transcode a video into the codec named in `params`.
    ///
    /// The detected codec is stored on the source content. Content that is
    /// already in the target codec, excluded by the codec filters, or whose
    /// destination already exists is skipped.
    pub async fn encode_content(
        &self,
        container: &Container,
        content: &Content,
        params: &TaskParams,
    ) -> Result<EncodeOutcome> {
        if !content.is_video() {
            return Ok(EncodeOutcome::Skipped(format!(
                "{} is not a video",
                content.src
            )));
        }

        let src = Self::source_path(container, content);
        let info = self.tool.media_info(&src).await?;
        let codec = info.video_codec.unwrap_or_default();
        if codec.is_empty() {
            return Err(Error::tool(
                self.tool.name(),
                format!("no video stream found in {}", content.src),
            ));
        }

        if content.encoding != codec {
            let mut stamped = content.clone();
            stamped.encoding = codec.clone();
            self.catalog.update_content(&stamped).await?;
        }

        let config = &self.config;
        if codec == config.codec_for_conversion_name {
            return Ok(EncodeOutcome::Skipped(format!(
                "{} is already {}",
                content.src, codec
            )));
        }
        if !config.codecs_to_convert.is_match(&codec) {
            return Ok(EncodeOutcome::Skipped(format!(
                "codec {} is not selected for conversion",
                codec
            )));
        }
        if config.codecs_to_ignore.is_match(&codec) {
            return Ok(EncodeOutcome::Skipped(format!("codec {} is ignored", codec)));
        }

        let name = encoded_file_name(&content.src, &config.encoding_filename_modifier);
        let dest = container.fq_path().join(&name);
        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            return Ok(EncodeOutcome::Skipped(format!("{} already exists", name)));
        }

        self.tool
            .encode(&src, &dest, &params.codec, params.width, params.height)
            .await?;
        if !fs::is_file(&dest).await {
            return Err(Error::tool(
                self.tool.name(),
                format!("no output was written for {}", content.src),
            ));
        }

        let size = tokio::fs::metadata(&dest)
            .await
            .map_err(|e| fs::io_error("reading encoded file", &dest, e))?
            .len();
        let siblings = self.catalog.list_contents(&container.id).await?;
        let idx = siblings.iter().map(|c| c.idx).max().map_or(0, |m| m + 1);

        let mut encoded = Content::new(
            &container.id,
            name,
            "video/mp4",
            i64::try_from(size).unwrap_or(i64::MAX),
            idx,
        );
        encoded.encoding = config.codec_for_conversion_name.clone();
        self.catalog.create_content(&encoded).await?;

        let mut updated = self.catalog.get_container(&container.id).await?;
        updated.total += 1;
        self.catalog.update_container(&updated).await?;

        info!(src = %content.src, dest = %encoded.src, "Encoded video");
        Ok(EncodeOutcome::Encoded(encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_file_name() {
        assert_eq!(encoded_file_name("clip.avi", "_h265"), "clip_h265.mp4");
        assert_eq!(encoded_file_name("a.b.mkv", "_x"), "a.b_x.mp4");
        assert_eq!(encoded_file_name("noext", "_h265"), "noext_h265.mp4");
    }
}
