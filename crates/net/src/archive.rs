//! Workspace packing for upload

use bytes::Bytes;
use pgb_errors::{BuildError, Error};
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tokio::task;
use walkdir::{DirEntry, WalkDir};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Directory names never uploaded
const SKIPPED_DIRS: &[&str] = &[".git", ".hg", ".svn"];

/// A zipped workspace ready for upload
#[derive(Debug, Clone)]
pub struct PackedWorkspace {
    pub bytes: Bytes,
    pub files: usize,
}

impl PackedWorkspace {
    #[must_use]
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files == 0
    }
}

/// Zip `workspace`, leaving out VCS metadata and `exclude`
///
/// Runs on the blocking pool; the archive is kept in memory.
///
/// # Errors
///
/// Returns `BuildError::ArchiveFailed` if the workspace is not a directory or
/// a file cannot be read.
pub async fn pack_workspace(workspace: &Path, exclude: &Path) -> Result<PackedWorkspace, Error> {
    let workspace = workspace.to_path_buf();
    let exclude = exclude.to_path_buf();

    task::spawn_blocking(move || pack_blocking(&workspace, &exclude))
        .await
        .map_err(|e| BuildError::ArchiveFailed {
            message: format!("Task join error: {e}"),
        })?
}

fn pack_blocking(workspace: &Path, exclude: &Path) -> Result<PackedWorkspace, Error> {
    if !workspace.is_dir() {
        return Err(BuildError::ArchiveFailed {
            message: format!("workspace {} is not a directory", workspace.display()),
        }
        .into());
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut files = 0;

    let walker = WalkDir::new(workspace)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped(entry, exclude));

    for entry in walker {
        let entry = entry.map_err(|e| BuildError::ArchiveFailed {
            message: format!("Failed to walk workspace: {e}"),
        })?;
        let Some(name) = entry_name(workspace, entry.path()) else {
            continue;
        };

        if entry.file_type().is_dir() {
            writer
                .add_directory(name, options)
                .map_err(|e| archive_error(&e))?;
        } else if entry.file_type().is_file() {
            writer
                .start_file(name, options)
                .map_err(|e| archive_error(&e))?;
            let mut source = File::open(entry.path()).map_err(|e| BuildError::ArchiveFailed {
                message: format!("Failed to read {}: {e}", entry.path().display()),
            })?;
            std::io::copy(&mut source, &mut writer).map_err(|e| BuildError::ArchiveFailed {
                message: format!("Failed to add {}: {e}", entry.path().display()),
            })?;
            files += 1;
        }
    }

    let cursor = writer.finish().map_err(|e| archive_error(&e))?;
    Ok(PackedWorkspace {
        bytes: Bytes::from(cursor.into_inner()),
        files,
    })
}

/// Minimal archive used when registering a new app
///
/// The service rejects an app record without source, so creation uploads a
/// single `index.html` that the first real build replaces.
///
/// # Errors
///
/// Returns `BuildError::ArchiveFailed` if the archive cannot be written.
pub fn placeholder() -> Result<Bytes, Error> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("index.html", SimpleFileOptions::default())
        .map_err(|e| archive_error(&e))?;
    writer
        .write_all(b"<!DOCTYPE html>\n<html><body></body></html>\n")
        .map_err(|e| BuildError::ArchiveFailed {
            message: e.to_string(),
        })?;
    let cursor = writer.finish().map_err(|e| archive_error(&e))?;
    Ok(Bytes::from(cursor.into_inner()))
}

fn is_skipped(entry: &DirEntry, exclude: &Path) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    if entry.path() == exclude {
        return true;
    }
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

/// Archive entry name with `/` separators; `None` for the root itself
fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let relative: PathBuf = path.strip_prefix(root).ok()?.to_path_buf();
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

fn archive_error(e: &zip::result::ZipError) -> BuildError {
    BuildError::ArchiveFailed {
        message: e.to_string(),
    }
}
