//! Finding source videos that already have an encoded copy.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::encoding::encoded_file_name;
use super::engine::PreviewEngine;
use crate::domain::{Container, Content};
use crate::{Error, Result};

/// A source video made redundant by its encoded copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Duplicate {
    pub content_id: String,
    pub src: String,
    pub encoded_id: String,
    pub encoded_src: String,
    pub duration_secs: f64,
}

impl PreviewEngine {
    /// Pair every encoded video in the container with the source it was
    /// made from and keep the pairs that match.
    ///
    /// A pair matches when the encoded file is in the conversion codec and
    /// both files run the same whole number of seconds. Pairs that cannot be
    /// inspected are logged and left out.
    pub async fn find_duplicate_contents(&self, container: &Container) -> Result<Vec<Duplicate>> {
        let contents = self.catalog.list_contents(&container.id).await?;
        let modifier = &self.config.encoding_filename_modifier;

        let by_src: HashMap<&str, &Content> =
            contents.iter().map(|c| (c.src.as_str(), c)).collect();
        let mut duplicates = Vec::new();

        for source in contents.iter().filter(|c| c.is_video()) {
            let encoded_name = encoded_file_name(&source.src, modifier);
            if encoded_name == source.src {
                continue;
            }
            let Some(encoded) = by_src.get(encoded_name.as_str()) else {
                continue;
            };

            match self.is_duplicate_video(container, encoded, source).await {
                Ok(Some(duration_secs)) => {
                    debug!(src = %source.src, encoded = %encoded.src, "Found duplicate");
                    duplicates.push(Duplicate {
                        content_id: source.id.clone(),
                        src: source.src.clone(),
                        encoded_id: encoded.id.clone(),
                        encoded_src: encoded.src.clone(),
                        duration_secs,
                    });
                }
                Ok(None) => {}
                Err(e) => warn!(
                    src = %source.src,
                    encoded = %encoded.src,
                    error = %e,
                    "Cannot compare videos"
                ),
            }
        }

        info!(
            container = %container.name,
            duplicates = duplicates.len(),
            "Duplicate detection finished"
        );
        Ok(duplicates)
    }

    /// The shared duration when `source` is a duplicate of `encoded`.
    async fn is_duplicate_video(
        &self,
        container: &Container,
        encoded: &Content,
        source: &Content,
    ) -> Result<Option<f64>> {
        let encoded_info = self.tool.media_info(&Self::source_path(container, encoded)).await?;
        let codec = encoded_info.video_codec.as_deref().unwrap_or_default();
        if codec != self.config.codec_for_conversion_name {
            return Err(Error::tool(
                self.tool.name(),
                format!(
                    "{} is {}, expected {}",
                    encoded.src, codec, self.config.codec_for_conversion_name
                ),
            ));
        }

        let source_info = self.tool.media_info(&Self::source_path(container, source)).await?;
        if source_info.video_codec.is_none() {
            return Err(Error::tool(
                self.tool.name(),
                format!("no video stream found in {}", source.src),
            ));
        }

        if same_whole_seconds(encoded_info.duration_secs, source_info.duration_secs) {
            Ok(Some(source_info.duration_secs))
        } else {
            debug!(
                encoded = %encoded.src,
                encoded_secs = encoded_info.duration_secs,
                source_secs = source_info.duration_secs,
                "Durations differ"
            );
            Ok(None)
        }
    }
}

fn same_whole_seconds(a: f64, b: f64) -> bool {
    a.trunc() == b.trunc()
}
