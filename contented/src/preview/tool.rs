//! External media tooling (ffmpeg / ffprobe).

use std::path::Path;

use async_trait::async_trait;
use process_utils::{display_command, tool_command};
use serde::Deserialize;
use tracing::{debug, error};

use crate::config::MediaConfig;
use crate::{Error, Result};

/// Stream facts reported by ffprobe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub duration_secs: f64,
    pub video_codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Out-of-process frame extraction and transcoding.
///
/// Every operation writes to `dest` and reports an error if the tool exits
/// unsuccessfully. A zero exit status does not guarantee `dest` exists;
/// callers check.
#[async_trait]
pub trait MediaTool: Send + Sync {
    fn name(&self) -> &'static str;

    /// Write one JPEG frame taken at `at_secs`, scaled to `width`.
    async fn extract_frame(
        &self,
        src: &Path,
        at_secs: f64,
        width: u32,
        dest: &Path,
    ) -> Result<()>;

    async fn media_info(&self, src: &Path) -> Result<MediaInfo>;

    /// Transcode `src` into `dest`. A dimension of -1 keeps the source value.
    async fn encode(
        &self,
        src: &Path,
        dest: &Path,
        codec: &str,
        width: i32,
        height: i32,
    ) -> Result<()>;

    /// Build an animated webp from numbered screens matching `pattern`
    /// (an ffmpeg `%03d` image sequence), using `palette` as scratch space.
    async fn webp_from_screens(&self, pattern: &Path, palette: &Path, dest: &Path) -> Result<()>;
}

/// [`MediaTool`] backed by the ffmpeg and ffprobe binaries.
pub struct FfmpegTool {
    ffmpeg_path: String,
    ffprobe_path: String,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

impl FfmpegTool {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(&config.ffmpeg_path, &config.ffprobe_path)
    }

    async fn run(&self, tool: &'static str, program: &str, args: Vec<String>) -> Result<Vec<u8>> {
        debug!("Running {}", display_command(program, &args));

        let output = tool_command(program)
            .args(&args)
            .output()
            .await
            .map_err(|e| Error::tool(tool, format!("failed to run {}: {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("{} failed: {}", tool, stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(3).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(Error::tool(
                tool,
                format!(
                    "exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    tail.join(" | ")
                ),
            ));
        }

        Ok(output.stdout)
    }

    fn path_arg(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }
}

/// Parse ffprobe's JSON output.
fn parse_ffprobe(stdout: &[u8]) -> Result<MediaInfo> {
    let parsed: FfprobeOutput = serde_json::from_slice(stdout)?;
    let stream = parsed.streams.into_iter().next();
    let duration_secs = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(MediaInfo {
        duration_secs,
        video_codec: stream.as_ref().and_then(|s| s.codec_name.clone()),
        width: stream.as_ref().and_then(|s| s.width),
        height: stream.as_ref().and_then(|s| s.height),
    })
}

fn scale_filter(width: i32, height: i32) -> Option<String> {
    if width == -1 && height == -1 {
        None
    } else {
        Some(format!("scale={}:{}", width, height))
    }
}

#[async_trait]
impl MediaTool for FfmpegTool {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn extract_frame(
        &self,
        src: &Path,
        at_secs: f64,
        width: u32,
        dest: &Path,
    ) -> Result<()> {
        let args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-ss".to_string(),
            format!("{:.2}", at_secs),
            "-i".to_string(),
            Self::path_arg(src),
            "-vframes".to_string(),
            "1".to_string(),
            "-vf".to_string(),
            format!("scale={}:-1", width),
            "-q:v".to_string(),
            "2".to_string(),
            Self::path_arg(dest),
        ];
        self.run("ffmpeg", &self.ffmpeg_path, args).await.map(|_| ())
    }

    async fn media_info(&self, src: &Path) -> Result<MediaInfo> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-select_streams".to_string(),
            "v:0".to_string(),
            "-show_entries".to_string(),
            "stream=codec_name,width,height:format=duration".to_string(),
            "-of".to_string(),
            "json".to_string(),
            Self::path_arg(src),
        ];
        let stdout = self.run("ffprobe", &self.ffprobe_path, args).await?;
        parse_ffprobe(&stdout)
    }

    async fn encode(
        &self,
        src: &Path,
        dest: &Path,
        codec: &str,
        width: i32,
        height: i32,
    ) -> Result<()> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-i".to_string(),
            Self::path_arg(src),
            "-c:v".to_string(),
            codec.to_string(),
        ];
        if let Some(filter) = scale_filter(width, height) {
            args.push("-vf".to_string());
            args.push(filter);
        }
        args.extend([
            "-c:a".to_string(),
            "aac".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            Self::path_arg(dest),
        ]);
        self.run("ffmpeg", &self.ffmpeg_path, args).await.map(|_| ())
    }

    async fn webp_from_screens(&self, pattern: &Path, palette: &Path, dest: &Path) -> Result<()> {
        let palette_args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-i".to_string(),
            Self::path_arg(pattern),
            "-vf".to_string(),
            "palettegen".to_string(),
            Self::path_arg(palette),
        ];
        self.run("ffmpeg", &self.ffmpeg_path, palette_args).await?;

        let webp_args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-i".to_string(),
            Self::path_arg(pattern),
            "-i".to_string(),
            Self::path_arg(palette),
            "-lavfi".to_string(),
            "paletteuse,setpts=6*PTS,scale=iw*.5:ih*.5".to_string(),
            "-loop".to_string(),
            "0".to_string(),
            Self::path_arg(dest),
        ];
        self.run("ffmpeg", &self.ffmpeg_path, webp_args).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ffprobe() {
        let json = br#"{
            "programs": [],
            "streams": [{"codec_name": "h264", "width": 1920, "height": 1080}],
            "format": {"duration": "63.480000"}
        }"#;
        let info = parse_ffprobe(json).unwrap();
        assert_eq!(info.video_codec.as_deref(), Some("h264"));
        assert_eq!(info.width, Some(1920));
        assert!((info.duration_secs - 63.48).abs() < 1e-6);
    }

    #[test]
    fn test_parse_ffprobe_audio_only() {
        let info = parse_ffprobe(br#"{"streams": [], "format": {}}"#).unwrap();
        assert_eq!(info, MediaInfo::default());
    }

    #[test]
    fn test_parse_ffprobe_garbage() {
        assert!(matches!(parse_ffprobe(b"not json"), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_scale_filter() {
        assert_eq!(scale_filter(-1, -1), None);
        assert_eq!(scale_filter(1280, -1).as_deref(), Some("scale=1280:-1"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_error() {
        let tool = FfmpegTool::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        let err = tool.media_info(Path::new("a.mp4")).await.unwrap_err();
        assert!(matches!(err, Error::Tool { .. }));
    }
}
