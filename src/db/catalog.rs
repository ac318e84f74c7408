use std::sync::Mutex;

use super::models::Track;
use super::{Database, DbError, Result};

/// The narrow slice of the track store the ingestion pipeline depends on.
///
/// `(name, artist)` comparisons are exact and case-sensitive.
pub trait Catalog {
    fn count_by_name_artist(&self, name: &str, artist: &str) -> Result<i64>;

    /// Whether some track already points at this audio URL.
    fn has_audio_url(&self, url: &str) -> Result<bool>;

    /// Insert `track` unless a track with the same (name, artist) exists,
    /// assigning `track.id` on success.
    fn create_if_absent(&self, track: &mut Track) -> Result<()>;

    fn update(&self, track: &Track) -> Result<()>;

    fn delete(&self, track: &Track) -> Result<()>;
}

impl Catalog for Database {
    fn count_by_name_artist(&self, name: &str, artist: &str) -> Result<i64> {
        Database::count_by_name_artist(self, name, artist)
    }

    fn has_audio_url(&self, url: &str) -> Result<bool> {
        Database::has_audio_url(self, url)
    }

    fn create_if_absent(&self, track: &mut Track) -> Result<()> {
        self.create_track_if_absent(track)
    }

    fn update(&self, track: &Track) -> Result<()> {
        self.update_track(track)
    }

    fn delete(&self, track: &Track) -> Result<()> {
        self.delete_track(track.id)
    }
}

/// Shared handle used by the HTTP server: each call holds the lock only for
/// the duration of a single statement.
impl Catalog for Mutex<Database> {
    fn count_by_name_artist(&self, name: &str, artist: &str) -> Result<i64> {
        self.lock()
            .map_err(|_| DbError::Poisoned)?
            .count_by_name_artist(name, artist)
    }

    fn has_audio_url(&self, url: &str) -> Result<bool> {
        self.lock().map_err(|_| DbError::Poisoned)?.has_audio_url(url)
    }

    fn create_if_absent(&self, track: &mut Track) -> Result<()> {
        self.lock()
            .map_err(|_| DbError::Poisoned)?
            .create_track_if_absent(track)
    }

    fn update(&self, track: &Track) -> Result<()> {
        self.lock()
            .map_err(|_| DbError::Poisoned)?
            .update_track(track)
    }

    fn delete(&self, track: &Track) -> Result<()> {
        self.lock()
            .map_err(|_| DbError::Poisoned)?
            .delete_track(track.id)
    }
}
