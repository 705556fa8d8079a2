//! Populate the catalog from a directory tree.
//!
//! Directories below the content root become containers, the regular files
//! directly inside them become contents.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::database::repositories::CatalogRepository;
use crate::domain::{Container, Content, PREVIEW_DIRECTORY};
use crate::{Error, Result};

/// Outcome of a scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub containers_added: usize,
    pub contents_added: usize,
}

#[derive(Debug)]
struct ScannedFile {
    name: String,
    size: u64,
    content_type: String,
}

#[derive(Debug)]
struct ScannedDir {
    parent: String,
    name: String,
    files: Vec<ScannedFile>,
}

fn is_excluded(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == PREVIEW_DIRECTORY
}

fn walk_error(root: &Path, e: walkdir::Error) -> Error {
    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
    match e.into_io_error() {
        Some(source) => Error::io_path("scanning", &path, source),
        None => Error::Other(format!("filesystem loop below {}", path.display())),
    }
}

fn scan_files(dir: &Path) -> Result<Vec<ScannedFile>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded(e));

    for entry in walker {
        let entry = entry.map_err(|e| walk_error(dir, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let size = entry
            .metadata()
            .map_err(|e| walk_error(dir, e))?
            .len();
        files.push(ScannedFile {
            name: entry.file_name().to_string_lossy().into_owned(),
            size,
            content_type: mime_guess::from_path(entry.path())
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        });
    }
    Ok(files)
}

fn scan_dirs(root: &Path, max_depth: usize) -> Result<Vec<ScannedDir>> {
    let mut dirs = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth.max(1))
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded(e));

    for entry in walker {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let parent = entry
            .path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        dirs.push(ScannedDir {
            parent: parent.to_string_lossy().into_owned(),
            name: entry.file_name().to_string_lossy().into_owned(),
            files: scan_files(entry.path())?,
        });
    }
    Ok(dirs)
}

/// Scan `root` and add unknown containers and contents to the catalog.
///
/// Existing records are left alone, so rescanning is idempotent.
pub async fn scan_content_dir(
    root: &Path,
    max_depth: usize,
    catalog: &dyn CatalogRepository,
) -> Result<ScanSummary> {
    let root_buf = root.to_path_buf();
    let dirs = tokio::task::spawn_blocking(move || scan_dirs(&root_buf, max_depth))
        .await
        .map_err(|e| Error::Other(format!("scan task failed: {e}")))??;

    let mut summary = ScanSummary::default();
    for dir in dirs {
        let mut container = match catalog.find_container(&dir.parent, &dir.name).await? {
            Some(existing) => existing,
            None => {
                let container = Container::new(&dir.name, &dir.parent);
                catalog.create_container(&container).await?;
                summary.containers_added += 1;
                debug!(name = %dir.name, "Added container");
                container
            }
        };

        let existing = catalog.list_contents(&container.id).await?;
        let mut next_idx = existing.iter().map(|c| c.idx + 1).max().unwrap_or(0);
        for file in dir.files {
            if existing.iter().any(|c| c.src == file.name) {
                continue;
            }
            let size = i64::try_from(file.size).unwrap_or(i64::MAX);
            let content = Content::new(&container.id, &file.name, file.content_type, size, next_idx);
            if let Err(e) = catalog.create_content(&content).await {
                warn!(src = %file.name, error = %e, "Failed to add content");
                continue;
            }
            next_idx += 1;
            summary.contents_added += 1;
        }

        let total = next_idx;
        if container.total != total {
            container.total = total;
            catalog.update_container(&container).await?;
        }
    }

    info!(
        containers = summary.containers_added,
        contents = summary.contents_added,
        root = %root.display(),
        "Content scan complete"
    );
    Ok(summary)
}
