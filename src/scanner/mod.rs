pub mod metadata;

use crate::{STAGING_DIR, SUPPORTED_EXTENSIONS};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use thiserror::Error;
use walkdir::WalkDir;

/// Paths buffered between the walker and the ingesting consumer.
const WALK_BUFFER: usize = 3;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("No directory given")]
    EmptyDir,
    #[error("Not a directory: {0}")]
    NotADirectory(String),
    #[error("Failed to start walker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// True if the path has one of the supported audio extensions (any case).
pub fn is_music_file(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

/// Uploads still being materialized live here; never walk into it.
fn is_staging_dir(entry: &walkdir::DirEntry) -> bool {
    entry.depth() == 1 && entry.file_type().is_dir() && entry.file_name() == STAGING_DIR
}

/// Lazily yields audio files found under a directory.
///
/// Backed by a walker thread writing into a small bounded channel, so the
/// walk never runs far ahead of the consumer. Dropping it stops the walk.
pub struct MusicFiles {
    rx: Receiver<PathBuf>,
}

impl Iterator for MusicFiles {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        self.rx.recv().ok()
    }
}

/// Start walking `dir` for audio files. Fails up front if `dir` is not an
/// existing directory; errors during the walk are logged and end it.
pub fn enum_music_files(dir: &Path) -> Result<MusicFiles, ScanError> {
    if dir.as_os_str().is_empty() {
        return Err(ScanError::EmptyDir);
    }
    if !dir.is_dir() {
        return Err(ScanError::NotADirectory(dir.display().to_string()));
    }

    let (tx, rx) = mpsc::sync_channel(WALK_BUFFER);
    let root = dir.to_path_buf();

    thread::Builder::new()
        .name("music-walker".into())
        .spawn(move || {
            let walker = WalkDir::new(&root)
                .follow_links(true)
                .into_iter()
                .filter_entry(|e| !is_staging_dir(e));
            for entry in walker {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        log::error!("Walk of {} aborted: {}", root.display(), e);
                        break;
                    }
                };
                if !entry.file_type().is_file() || !is_music_file(entry.path()) {
                    continue;
                }
                if tx.send(entry.into_path()).is_err() {
                    log::debug!("Consumer gone, stopping walk of {}", root.display());
                    break;
                }
            }
        })?;

    Ok(MusicFiles { rx })
}
