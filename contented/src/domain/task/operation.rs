//! Task operations.

use serde::{Deserialize, Serialize};

/// Which reference of a task an operation acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationScope {
    Content,
    Container,
}

/// The kind of work a task performs.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum TaskOperation {
    /// Evenly spaced still frames from a video.
    #[strum(serialize = "screen_capture")]
    #[serde(rename = "screen_capture")]
    ScreenCapture,
    /// Transcode a video into the configured codec.
    #[strum(serialize = "video_encoding")]
    #[serde(rename = "video_encoding")]
    Encoding,
    /// Animated webp assembled from previously captured screens.
    #[strum(serialize = "webp_from_screens")]
    #[serde(rename = "webp_from_screens")]
    WebpFromScreens,
    /// Single still preview for one content item.
    #[strum(serialize = "content_preview")]
    #[serde(rename = "content_preview")]
    ContentPreview,
    /// Clear and regenerate every preview in a container.
    #[strum(serialize = "container_previews")]
    #[serde(rename = "container_previews")]
    ContainerPreviews,
    /// Find source videos in a container that already have an encoded copy.
    #[strum(serialize = "detect_duplicates")]
    #[serde(rename = "detect_duplicates")]
    DetectDuplicates,
}

impl TaskOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScreenCapture => "screen_capture",
            Self::Encoding => "video_encoding",
            Self::WebpFromScreens => "webp_from_screens",
            Self::ContentPreview => "content_preview",
            Self::ContainerPreviews => "container_previews",
            Self::DetectDuplicates => "detect_duplicates",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "screen_capture" => Some(Self::ScreenCapture),
            "video_encoding" => Some(Self::Encoding),
            "webp_from_screens" => Some(Self::WebpFromScreens),
            "content_preview" => Some(Self::ContentPreview),
            "container_previews" => Some(Self::ContainerPreviews),
            "detect_duplicates" => Some(Self::DetectDuplicates),
            _ => None,
        }
    }

    pub fn scope(&self) -> OperationScope {
        match self {
            Self::ScreenCapture | Self::Encoding | Self::WebpFromScreens | Self::ContentPreview => {
                OperationScope::Content
            }
            Self::ContainerPreviews | Self::DetectDuplicates => OperationScope::Container,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_wire_names_agree() {
        for op in TaskOperation::iter() {
            assert_eq!(op.to_string(), op.as_str());
            assert_eq!(TaskOperation::from_str(op.as_str()).unwrap(), op);
            assert_eq!(TaskOperation::parse(op.as_str()), Some(op));
            let json = serde_json::to_string(&op).unwrap();
            assert_eq!(json, format!("\"{}\"", op.as_str()));
        }
    }

    #[test]
    fn test_unknown_operation() {
        assert_eq!(TaskOperation::parse("tag_content"), None);
        assert!(TaskOperation::from_str("encoding").is_err());
    }

    #[test]
    fn test_scope() {
        assert_eq!(TaskOperation::Encoding.scope(), OperationScope::Content);
        assert_eq!(
            TaskOperation::ContainerPreviews.scope(),
            OperationScope::Container
        );
        assert_eq!(
            TaskOperation::DetectDuplicates.scope(),
            OperationScope::Container
        );
    }
}
