//! Ingest audio that arrives over HTTP, either as uploaded bytes or as a
//! remote URL to fetch.
//!
//! The audio is first written to a private slot under `{root}/.tmp/`, then
//! handed to [`AudioFileStore::add_track`]. The slot is removed afterwards
//! whatever the outcome.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{AudioFileStore, IngestError, TrackOverride};
use crate::db::Catalog;
use crate::db::models::Track;
use crate::{DEFAULT_UPLOAD_EXTENSION, STAGING_DIR};

#[derive(Debug, Clone)]
pub enum UploadSource {
    /// Bytes sent by the client under their original file name
    File { filename: String, data: Vec<u8> },
    /// A URL the server downloads from
    Url(String),
}

#[derive(Debug, Clone)]
pub struct TrackUpload {
    pub overrides: TrackOverride,
    pub source: UploadSource,
}

fn unix_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// Reduce a client-supplied name to a safe base name with an extension.
///
/// Directory parts and trailing dots are dropped. An empty name becomes
/// `{unix_nanos}.mp3`, and a name without an extension gets `.mp3` appended.
pub fn guard_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim()
        .trim_end_matches('.');
    if base.is_empty() {
        return format!("{}.{}", unix_nanos(), DEFAULT_UPLOAD_EXTENSION);
    }
    if Path::new(base).extension().is_none() {
        return format!("{base}.{DEFAULT_UPLOAD_EXTENSION}");
    }
    base.to_string()
}

/// Last path segment of a URL, without query or fragment.
pub fn filename_from_url(url: &str) -> String {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let path = &url[..end];
    // "http://host" has no path: don't mistake the host for a file name
    let path = path.split_once("://").map_or(path, |(_, rest)| {
        rest.split_once('/').map_or("", |(_, p)| p)
    });
    path.rsplit('/').next().unwrap_or("").to_string()
}

impl AudioFileStore {
    /// Staging area for uploads. Created on demand.
    pub fn tmp_dir(&self) -> io::Result<PathBuf> {
        let dir = self.file_dir.join(STAGING_DIR);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Fresh per-upload directory, so concurrent uploads with the same file
    /// name never collide and the name survives for metadata fallback.
    fn staging_slot(&self) -> io::Result<PathBuf> {
        let tmp = self.tmp_dir()?;
        let mut nanos = unix_nanos();
        loop {
            let slot = tmp.join(format!("{nanos:x}"));
            match fs::create_dir(&slot) {
                Ok(()) => return Ok(slot),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => nanos += 1,
                Err(e) => return Err(e),
            }
        }
    }

    /// Write the upload's audio into `slot`, returning the file path.
    fn save_upload(&self, slot: &Path, source: &UploadSource) -> Result<PathBuf, IngestError> {
        match source {
            UploadSource::File { filename, data } => {
                let path = slot.join(guard_filename(filename));
                fs::write(&path, data)?;
                log::debug!("Saved upload {} ({} bytes)", path.display(), data.len());
                Ok(path)
            }
            UploadSource::Url(url) => {
                let path = slot.join(guard_filename(&filename_from_url(url)));
                log::info!("[{}] Downloading {url}", self.name);
                let response = ureq::get(url).call().map_err(|source| IngestError::Download {
                    url: url.clone(),
                    source,
                })?;
                let mut reader = response.into_body().into_reader();
                let mut file = fs::File::create(&path)?;
                let bytes = io::copy(&mut reader, &mut file)?;
                log::debug!("Downloaded {url} to {} ({bytes} bytes)", path.display());
                Ok(path)
            }
        }
    }

    /// Materialize an upload under the staging area and ingest it.
    pub fn add_uploaded_track(
        &self,
        catalog: &dyn Catalog,
        upload: &TrackUpload,
    ) -> Result<Track, IngestError> {
        let slot = self.staging_slot()?;

        let result = self
            .save_upload(&slot, &upload.source)
            .and_then(|path| self.add_track(catalog, &path, std::slice::from_ref(&upload.overrides)));

        if let Err(e) = fs::remove_dir_all(&slot) {
            log::warn!("Could not clean up {}: {}", slot.display(), e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::test_support::{self, wav_bytes};

    fn setup() -> (tempfile::TempDir, AudioFileStore, Database) {
        let root = tempfile::tempdir().unwrap();
        let store = AudioFileStore::new("music", root.path(), "http://localhost:8080");
        (root, store, Database::open_in_memory().unwrap())
    }

    fn staged_entries(store: &AudioFileStore) -> usize {
        fs::read_dir(store.tmp_dir().unwrap()).unwrap().count()
    }

    #[test]
    fn test_guard_filename() {
        assert_eq!(guard_filename("song.wav"), "song.wav");
        assert_eq!(guard_filename("../../etc/passwd.mp3"), "passwd.mp3");
        assert_eq!(guard_filename(r"C:\Users\me\track.flac"), "track.flac");
        assert_eq!(guard_filename("noext"), "noext.mp3");
        assert_eq!(guard_filename("song."), "song.mp3");
        assert_eq!(guard_filename("live.set..."), "live.set");

        for empty in ["", "dir/", "..", "  ", "..."] {
            let generated = guard_filename(empty);
            assert!(generated.ends_with(".mp3"), "{empty:?} -> {generated}");
            assert!(generated.trim_end_matches(".mp3").parse::<i64>().is_ok());
        }
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(filename_from_url("http://h/a/b/song.mp3"), "song.mp3");
        assert_eq!(filename_from_url("http://h/a/song.mp3?sig=1#t=3"), "song.mp3");
        assert_eq!(filename_from_url("http://h/a/"), "");
        assert_eq!(filename_from_url("http://h"), "");
        assert_eq!(filename_from_url("https://h?x=y/z.mp3"), "");
    }

    #[test]
    fn test_file_upload_is_ingested_and_staging_cleaned() {
        let (root, store, db) = setup();
        let upload = TrackUpload {
            overrides: TrackOverride {
                artist: Some("Uploader".into()),
                ..Default::default()
            },
            source: UploadSource::File {
                filename: "My Upload.wav".into(),
                data: wav_bytes(4),
            },
        };

        let track = store.add_uploaded_track(&db, &upload).unwrap();

        assert_eq!(track.name, "My Upload");
        assert_eq!(track.artist, "Uploader");
        let placed = root.path().join("My_Upload-Uploader-.wav");
        assert_eq!(fs::read(placed).unwrap(), wav_bytes(4));
        assert_eq!(staged_entries(&store), 0);
    }

    #[test]
    fn test_failed_upload_leaves_no_staging_files() {
        let (_root, store, db) = setup();
        let upload = TrackUpload {
            overrides: TrackOverride::default(),
            source: UploadSource::File {
                filename: "noise.bin".into(),
                data: b"not audio at all".to_vec(),
            },
        };

        let err = store.add_uploaded_track(&db, &upload).unwrap_err();
        assert!(matches!(err, IngestError::Extract(_)));
        assert_eq!(staged_entries(&store), 0);
        assert_eq!(db.stats().unwrap().total_tracks, 0);
    }

    #[test]
    fn test_duplicate_upload_rejected() {
        let (_root, store, db) = setup();
        let upload = TrackUpload {
            overrides: TrackOverride::default(),
            source: UploadSource::File {
                filename: "same.wav".into(),
                data: wav_bytes(1),
            },
        };
        store.add_uploaded_track(&db, &upload).unwrap();

        let err = store.add_uploaded_track(&db, &upload).unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(staged_entries(&store), 0);
    }

    #[test]
    fn test_url_upload_downloads_audio() {
        let (root, store, db) = setup();
        let (server, handle) = test_support::serve_once("200 OK", "audio/wav", wav_bytes(7));
        let upload = TrackUpload {
            overrides: TrackOverride::default(),
            source: UploadSource::Url(format!("{server}files/remote_song.wav?token=abc")),
        };

        let track = store.add_uploaded_track(&db, &upload).unwrap();

        assert_eq!(track.name, "remote_song");
        assert_eq!(
            fs::read(root.path().join("remote_song--.wav")).unwrap(),
            wav_bytes(7)
        );
        let request = handle.join().unwrap();
        assert!(request.starts_with("GET /files/remote_song.wav?token=abc"), "{request}");
    }

    #[test]
    fn test_url_upload_http_error_is_download_error() {
        let (_root, store, db) = setup();
        let (server, handle) = test_support::serve_once("404 Not Found", "text/plain", b"nope".to_vec());
        let upload = TrackUpload {
            overrides: TrackOverride::default(),
            source: UploadSource::Url(format!("{server}missing.mp3")),
        };

        let err = store.add_uploaded_track(&db, &upload).unwrap_err();
        assert!(matches!(err, IngestError::Download { .. }), "{err:?}");
        assert!(!err.is_client_error());
        assert_eq!(staged_entries(&store), 0);
        handle.join().unwrap();
    }
}
