//! Application configuration loaded from the environment.
//!
//! Values are read once at startup (after `.env` is applied through
//! `dotenvy`) and passed by reference into the components that need them.

use std::path::PathBuf;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Which storage strategy backs the catalog and the task store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Database,
    Memory,
}

/// Settings for the preview and encoding tools.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Files at or below this size are skipped by batch preview generation.
    pub preview_over_size: u64,
    pub preview_width: u32,
    pub preview_frame_offset_secs: f64,
    pub preview_number_of_screens: u32,
    /// ffmpeg encoder used for conversions, e.g. `libx265`.
    pub codec_for_conversion: String,
    /// Codec name as reported by ffprobe for already-converted files.
    pub codec_for_conversion_name: String,
    pub codecs_to_convert: Regex,
    pub codecs_to_ignore: Regex,
    pub encoding_filename_modifier: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            preview_over_size: 1_024_000,
            preview_width: 640,
            preview_frame_offset_secs: 5.0,
            preview_number_of_screens: 12,
            codec_for_conversion: "libx265".to_string(),
            codec_for_conversion_name: "hevc".to_string(),
            codecs_to_convert: Regex::new(".*").unwrap(),
            codecs_to_ignore: Regex::new("hevc").unwrap(),
            encoding_filename_modifier: "_h265".to_string(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub content_dir: PathBuf,
    pub storage: StorageKind,
    pub database_url: String,
    pub log_dir: PathBuf,
    /// Capacity of the queue buffer before `enqueue_task` waits.
    pub task_buffer_size: usize,
    pub max_concurrent_tasks: usize,
    /// Directory depth scanned below `content_dir` for containers.
    pub max_search_depth: usize,
    pub media: MediaConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("."),
            storage: StorageKind::Database,
            database_url: "sqlite:contented.db?mode=rwc".to_string(),
            log_dir: PathBuf::from("logs"),
            task_buffer_size: 100,
            max_concurrent_tasks: 4,
            max_search_depth: 1,
            media: MediaConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from the process environment, applying `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let media_defaults = defaults.media;
        let media = MediaConfig {
            ffmpeg_path: get("FFMPEG_PATH").unwrap_or(media_defaults.ffmpeg_path),
            ffprobe_path: get("FFPROBE_PATH").unwrap_or(media_defaults.ffprobe_path),
            preview_over_size: parse_or(&get, "PREVIEW_OVER_SIZE", media_defaults.preview_over_size)?,
            preview_width: parse_or(&get, "PREVIEW_WIDTH", media_defaults.preview_width)?,
            preview_frame_offset_secs: parse_or(
                &get,
                "PREVIEW_FRAME_OFFSET_SECS",
                media_defaults.preview_frame_offset_secs,
            )?,
            preview_number_of_screens: parse_or(
                &get,
                "PREVIEW_NUMBER_OF_SCREENS",
                media_defaults.preview_number_of_screens,
            )?,
            codec_for_conversion: get("CODEC_FOR_CONVERSION")
                .unwrap_or(media_defaults.codec_for_conversion),
            codec_for_conversion_name: get("CODEC_FOR_CONVERSION_NAME")
                .unwrap_or(media_defaults.codec_for_conversion_name),
            codecs_to_convert: regex_or(&get, "CODECS_TO_CONVERT", media_defaults.codecs_to_convert)?,
            codecs_to_ignore: regex_or(&get, "CODECS_TO_IGNORE", media_defaults.codecs_to_ignore)?,
            encoding_filename_modifier: get("ENCODING_FILENAME_MODIFIER")
                .unwrap_or(media_defaults.encoding_filename_modifier),
        };

        let storage = match get("STORAGE") {
            Some(value) => StorageKind::from_str(value.trim())
                .map_err(|_| Error::config(format!("STORAGE must be database or memory, got {value}")))?,
            None => defaults.storage,
        };

        let config = Self {
            content_dir: get("CONTENT_DIR").map(PathBuf::from).unwrap_or(defaults.content_dir),
            storage,
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            log_dir: get("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
            task_buffer_size: parse_or(&get, "TASK_BUFFER_SIZE", defaults.task_buffer_size)?,
            max_concurrent_tasks: parse_or(&get, "MAX_CONCURRENT_TASKS", defaults.max_concurrent_tasks)?,
            max_search_depth: parse_or(&get, "MAX_SEARCH_DEPTH", defaults.max_search_depth)?,
            media,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.task_buffer_size == 0 {
            return Err(Error::config("TASK_BUFFER_SIZE must be at least 1"));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(Error::config("MAX_CONCURRENT_TASKS must be at least 1"));
        }
        if self.media.preview_width == 0 {
            return Err(Error::config("PREVIEW_WIDTH must be at least 1"));
        }
        if self.media.preview_frame_offset_secs < 0.0 {
            return Err(Error::config("PREVIEW_FRAME_OFFSET_SECS must not be negative"));
        }
        Ok(())
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("{key}={raw}: {e}"))),
        None => Ok(default),
    }
}

fn regex_or<G>(get: &G, key: &str, default: Regex) -> Result<Regex>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => Regex::new(&raw).map_err(|e| Error::config(format!("{key}: {e}"))),
        None => Ok(default),
    }
}
