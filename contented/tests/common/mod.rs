//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};

use contented::database::repositories::TaskRepository;
use contented::domain::{Container, Content, Task};
use contented::preview::{MediaInfo, MediaTool};
use contented::{Error, Result};

/// Media tool that writes small JPEGs instead of running ffmpeg.
///
/// Sources named `broken*` cannot be decoded. Probing reports one second per
/// 32 bytes of file, and hevc for files named with the `_h265` modifier.
#[derive(Default)]
pub struct FakeMediaTool {
    pub frames: AtomicUsize,
}

#[async_trait]
impl MediaTool for FakeMediaTool {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn extract_frame(&self, src: &Path, _at_secs: f64, width: u32, dest: &Path) -> Result<()> {
        if !src.is_file() {
            return Err(Error::tool("fake", format!("{} not found", src.display())));
        }
        if file_stem(src).starts_with("broken") {
            return Err(Error::tool("fake", format!("cannot decode {}", src.display())));
        }
        self.frames.fetch_add(1, Ordering::SeqCst);
        RgbImage::from_pixel(width, 8, Rgb([10, 20, 30])).save_with_format(dest, ImageFormat::Jpeg)?;
        Ok(())
    }

    async fn media_info(&self, src: &Path) -> Result<MediaInfo> {
        let size = tokio::fs::metadata(src)
            .await
            .map_err(|e| Error::tool("fake", format!("{}: {e}", src.display())))?
            .len();
        let codec = if file_stem(src).ends_with("_h265") {
            "hevc"
        } else {
            "h264"
        };
        Ok(MediaInfo {
            duration_secs: size as f64 / 32.0,
            video_codec: Some(codec.to_string()),
            width: Some(1280),
            height: Some(720),
        })
    }

    async fn encode(&self, src: &Path, dest: &Path, _codec: &str, _w: i32, _h: i32) -> Result<()> {
        tokio::fs::copy(src, dest).await?;
        Ok(())
    }

    async fn webp_from_screens(&self, _pattern: &Path, _palette: &Path, dest: &Path) -> Result<()> {
        tokio::fs::write(dest, b"RIFF").await?;
        Ok(())
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Write a PNG of the given size.
pub fn write_png(path: &Path, width: u32, height: u32) {
    RgbImage::from_pixel(width, height, Rgb([120, 30, 200]))
        .save(path)
        .unwrap();
}

/// A container directory under `root` holding the named files. Names ending
/// in `.png` get a real image; everything else gets placeholder bytes.
pub fn media_container(root: &Path, name: &str, files: &[&str]) -> (Container, Vec<Content>) {
    let container = Container::new(name, root.to_string_lossy());
    let dir: PathBuf = container.fq_path();
    std::fs::create_dir_all(&dir).unwrap();

    let contents = files
        .iter()
        .enumerate()
        .map(|(idx, file)| {
            let path = dir.join(file);
            let content_type = mime_guess::from_path(&path)
                .first_or_octet_stream()
                .essence_str()
                .to_string();
            if file.ends_with(".png") {
                write_png(&path, 800, 600);
            } else {
                std::fs::write(&path, vec![7u8; 2048]).unwrap();
            }
            let size = std::fs::metadata(&path).unwrap().len() as i64;
            Content::new(&container.id, *file, content_type, size, idx as i64)
        })
        .collect();
    (container, contents)
}

/// Poll until the task reaches a terminal status.
pub async fn wait_for_terminal(store: &dyn TaskRepository, id: &str) -> Task {
    for _ in 0..1000 {
        let task = store.get_task(id).await.unwrap();
        if task.is_terminal() {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {id} never reached a terminal status");
}

pub fn fake_tool() -> Arc<FakeMediaTool> {
    Arc::new(FakeMediaTool::default())
}
