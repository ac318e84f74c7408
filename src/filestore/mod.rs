//! Audio file stores: a named root directory whose files are served under a
//! public base URL and recorded in the catalog.
//!
//! Adding a track hard-links the source into the root under a canonical
//! name, derives its public URL, optionally scores its emotion, and
//! persists it. A failure after placement removes the placed file, so a
//! failed ingestion never leaves a half-registered track behind.

pub mod placement;
pub mod upload;

use indicatif::ProgressBar;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::config::StoreConfig;
use crate::db::models::Track;
use crate::db::{Catalog, DbError};
use crate::emotion::{EmotionAnalyzer, EmotionClient, EmotionError};
use crate::scanner::metadata::{self, MetadataError};
use crate::scanner::{self, ScanError};
use placement::PlacementError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Metadata extraction failed: {0}")]
    Extract(#[from] MetadataError),
    #[error("Invalid track: {0}")]
    Validation(String),
    #[error("Track already exists: {name} by {artist:?}")]
    Duplicate { name: String, artist: String },
    #[error("Placing audio file failed: {0}")]
    Placement(#[source] PlacementError),
    #[error("Deriving audio URL failed: {0}")]
    Url(#[source] PlacementError),
    #[error("Emotion analysis failed: {0}")]
    Analysis(#[from] EmotionError),
    #[error("Saving track failed: {0}")]
    Persist(#[source] DbError),
    #[error("Download of {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: ureq::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// The caller sent something unusable (as opposed to a server-side failure).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Duplicate { .. })
    }
}

/// Caller-supplied metadata that wins over what the tags say.
/// Missing or empty fields leave the extracted value alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackOverride {
    pub name: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub cover_image_url: Option<String>,
}

impl TrackOverride {
    pub fn apply(&self, track: &mut Track) {
        if let Some(v) = non_empty(&self.name) {
            track.name = v.to_string();
        }
        if let Some(v) = non_empty(&self.artist) {
            track.artist = v.to_string();
        }
        if let Some(v) = non_empty(&self.album) {
            track.album = v.to_string();
        }
        if let Some(v) = non_empty(&self.cover_image_url) {
            track.cover_image_url = Some(v.to_string());
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Outcome of a bulk import.
#[derive(Debug, Default)]
pub struct ImportResult {
    pub scanned: u64,
    pub added: u64,
    /// Already-placed files whose URL is in the catalog
    pub skipped: u64,
    pub duplicates: u64,
    pub failed: u64,
}

pub struct AudioFileStore {
    name: String,
    file_dir: PathBuf,
    base_url: String,
    analyzer: Option<Arc<dyn EmotionAnalyzer>>,
    /// Serializes ingestion so duplicate check and insert can't interleave.
    ingest_lock: Mutex<()>,
}

impl AudioFileStore {
    pub fn new(name: &str, file_dir: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            name: name.to_string(),
            file_dir: file_dir.into(),
            base_url: base_url.to_string(),
            analyzer: None,
            ingest_lock: Mutex::new(()),
        }
    }

    /// Build a store from its config section, creating the root if needed.
    pub fn from_config(cfg: &StoreConfig, emotion_server: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(&cfg.file_dir)?;
        let store = Self::new(&cfg.name, &cfg.file_dir, &cfg.base_url);
        if cfg.enable_emotion {
            log::info!("[{}] Emotion analysis via {}", cfg.name, emotion_server);
            return Ok(store.with_emotion_analyzer(Arc::new(EmotionClient::new(emotion_server))));
        }
        Ok(store)
    }

    /// Score every new track's emotion before it is saved.
    pub fn with_emotion_analyzer(mut self, analyzer: Arc<dyn EmotionAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file_dir(&self) -> &Path {
        &self.file_dir
    }

    pub fn emotion_enabled(&self) -> bool {
        self.analyzer.is_some()
    }

    /// URL path the root directory is served under: `/{name}/audio`
    pub fn audio_static_path(&self) -> String {
        format!("/{}/audio", self.name)
    }

    /// Public URL for a file inside the root.
    pub fn audio_url(&self, path: &Path) -> Result<String, PlacementError> {
        placement::audio_url(&self.base_url, &self.audio_static_path(), &self.file_dir, path)
    }

    /// Ingest the audio file at `path`, applying `overrides` in order.
    ///
    /// The file is hard-linked into the root as
    /// `{name}-{artist}-{album}.{ext}`; if `path` was already inside the
    /// root the original is removed afterwards.
    pub fn add_track(
        &self,
        catalog: &dyn Catalog,
        path: &Path,
        overrides: &[TrackOverride],
    ) -> Result<Track, IngestError> {
        let _guard = self.ingest_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut track = metadata::track_from_audio_file(path)?;
        for o in overrides {
            o.apply(&mut track);
        }
        if track.name.trim().is_empty() {
            return Err(IngestError::Validation("track name is empty".into()));
        }

        // Cheapest rejection first: nothing touched yet
        let existing = catalog
            .count_by_name_artist(&track.name, &track.artist)
            .map_err(IngestError::Persist)?;
        if existing > 0 {
            return Err(IngestError::Duplicate {
                name: track.name,
                artist: track.artist,
            });
        }

        let source_in_root = placement::is_inside(&self.file_dir, path);

        // A file already sitting at its canonical name is adopted as is
        let adopted = source_in_root
            && placement::is_same_file(&placement::canonical_path(&self.file_dir, &track, path), path);
        let placed = if adopted {
            log::debug!("{} is already at its canonical path", path.display());
            path.to_path_buf()
        } else {
            placement::place(&self.file_dir, &track, path).map_err(IngestError::Placement)?
        };
        let rollback = |placed: &Path| {
            if !adopted {
                remove_placed(placed);
            }
        };

        track.audio_file_url = match self.audio_url(&placed) {
            Ok(url) => url,
            Err(e) => {
                rollback(&placed);
                return Err(IngestError::Url(e));
            }
        };

        if let Some(analyzer) = &self.analyzer {
            match analyzer.analyze_uri(&track.audio_file_url) {
                Ok(emotion) => track.emotion = Some(emotion),
                Err(e) => {
                    rollback(&placed);
                    return Err(IngestError::Analysis(e));
                }
            }
        }

        if let Err(e) = catalog.create_if_absent(&mut track) {
            rollback(&placed);
            return Err(match e {
                DbError::AlreadyExists { name, artist } => IngestError::Duplicate { name, artist },
                other => IngestError::Persist(other),
            });
        }

        log::info!(
            "[{}] Added track {} {:?} at {}",
            self.name,
            track.id,
            track.name,
            track.audio_file_url
        );

        // Already in the root: this was effectively a rename
        if source_in_root && !adopted {
            if let Err(e) = std::fs::remove_file(path) {
                log::warn!("Could not remove original {}: {}", path.display(), e);
            }
        }

        Ok(track)
    }

    /// Ingest every supported audio file under the root.
    ///
    /// Files are walked on a background thread and ingested one at a time.
    /// Per-file failures are logged and counted, never fatal.
    pub fn add_tracks_from_dir(
        &self,
        catalog: &dyn Catalog,
        pb: &ProgressBar,
    ) -> Result<ImportResult, ScanError> {
        log::info!("[{}] Importing from {}", self.name, self.file_dir.display());

        let files = scanner::enum_music_files(&self.file_dir)?;
        let mut result = ImportResult::default();

        for path in files {
            result.scanned += 1;
            pb.set_message(
                path.file_name()
                    .map(|f| f.to_string_lossy().to_string())
                    .unwrap_or_default(),
            );

            if self.already_placed(catalog, &path) {
                log::debug!("Already in catalog: {}", path.display());
                result.skipped += 1;
                pb.inc(1);
                continue;
            }

            match self.add_track(catalog, &path, &[]) {
                Ok(_) => result.added += 1,
                Err(IngestError::Duplicate { name, artist }) => {
                    log::info!("Skipping {}: {name:?} by {artist:?} exists", path.display());
                    result.duplicates += 1;
                }
                Err(e) => {
                    log::warn!("Error importing {}: {}", path.display(), e);
                    result.failed += 1;
                }
            }
            pb.inc(1);
        }

        pb.finish_with_message(format!(
            "Done: {} added, {} skipped, {} duplicates, {} errors",
            result.added, result.skipped, result.duplicates, result.failed
        ));
        log::info!(
            "[{}] Import finished: {} scanned, {} added, {} skipped, {} duplicates, {} errors",
            self.name,
            result.scanned,
            result.added,
            result.skipped,
            result.duplicates,
            result.failed
        );

        Ok(result)
    }

    /// A file in the root that some track already points at.
    fn already_placed(&self, catalog: &dyn Catalog, path: &Path) -> bool {
        let Ok(url) = self.audio_url(path) else {
            return false;
        };
        match catalog.has_audio_url(&url) {
            Ok(found) => found,
            Err(e) => {
                log::warn!("Catalog lookup for {url} failed: {e}");
                false
            }
        }
    }
}

/// Rollback helper: failures are logged, the original error wins.
fn remove_placed(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        log::warn!("Rollback: could not remove {}: {}", path.display(), e);
    }
}
