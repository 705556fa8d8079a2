//! Preview generation engine.
//!
//! Decides whether a content item needs a preview, produces it (scaled copy
//! for images, extracted frame for videos) under the container's preview
//! directory and writes the result back to the catalog.

mod duplicates;
mod encoding;
mod engine;
mod screens;
pub mod tool;

pub use duplicates::Duplicate;
pub use encoding::EncodeOutcome;
pub use engine::{
    ContainerGuard, PreviewBatchReport, PreviewEngine, PreviewItem, PreviewOutcome, preview_file_name,
    preview_relative_path, should_create_preview,
};
pub use screens::{screen_file_name, screens_pattern, webp_file_name};
pub use tool::{FfmpegTool, MediaInfo, MediaTool};
