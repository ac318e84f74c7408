use super::models::{CatalogStats, Emotion, Track};
use super::{Database, DbError, Result};
use rusqlite::{OptionalExtension, Row, params};

const TRACK_COLUMNS: &str =
    "id, name, artist, album, cover_image_url, audio_file_url, valence, arousal";

fn track_from_row(row: &Row<'_>) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get(0)?,
        name: row.get(1)?,
        artist: row.get(2)?,
        album: row.get(3)?,
        cover_image_url: row.get(4)?,
        audio_file_url: row.get(5)?,
        emotion: Emotion::from_columns(row.get(6)?, row.get(7)?),
    })
}

impl Database {
    /// Number of tracks with exactly this (name, artist) pair. Case-sensitive.
    pub fn count_by_name_artist(&self, name: &str, artist: &str) -> Result<i64> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM tracks WHERE name = ?1 AND artist = ?2",
            params![name, artist],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    pub fn has_audio_url(&self, url: &str) -> Result<bool> {
        let found = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tracks WHERE audio_file_url = ?1)",
            params![url],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// Insert the track unless its (name, artist) pair is taken.
    /// On success `track.id` is set to the new row id.
    pub fn create_track_if_absent(&self, track: &mut Track) -> Result<()> {
        let (valence, arousal) = emotion_columns(track.emotion);
        let inserted = self.conn.execute(
            "INSERT INTO tracks (
                name, artist, album, cover_image_url, audio_file_url, valence, arousal
            )
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7
            WHERE NOT EXISTS (
                SELECT 1 FROM tracks WHERE name = ?1 AND artist = ?2
            )",
            params![
                track.name, track.artist, track.album, track.cover_image_url,
                track.audio_file_url, valence, arousal,
            ],
        )?;

        if inserted == 0 {
            return Err(DbError::AlreadyExists {
                name: track.name.clone(),
                artist: track.artist.clone(),
            });
        }
        track.id = self.conn.last_insert_rowid();
        Ok(())
    }

    /// Overwrite every mutable column of an existing track.
    pub fn update_track(&self, track: &Track) -> Result<()> {
        let (valence, arousal) = emotion_columns(track.emotion);
        let updated = self.conn.execute(
            "UPDATE tracks SET
                name = ?2,
                artist = ?3,
                album = ?4,
                cover_image_url = ?5,
                audio_file_url = ?6,
                valence = ?7,
                arousal = ?8,
                updated_at = datetime('now')
            WHERE id = ?1",
            params![
                track.id, track.name, track.artist, track.album, track.cover_image_url,
                track.audio_file_url, valence, arousal,
            ],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound(track.id));
        }
        Ok(())
    }

    pub fn delete_track(&self, id: i64) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM tracks WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DbError::NotFound(id));
        }
        Ok(())
    }

    pub fn get_track(&self, id: i64) -> Result<Option<Track>> {
        let track = self
            .conn
            .query_row(
                &format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ?1"),
                params![id],
                track_from_row,
            )
            .optional()?;
        Ok(track)
    }

    /// Page through the catalog in id order.
    pub fn list_tracks(&self, limit: i64, offset: i64) -> Result<Vec<Track>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TRACK_COLUMNS} FROM tracks ORDER BY id LIMIT ?1 OFFSET ?2"
        ))?;
        let tracks = stmt
            .query_map(params![limit, offset], track_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    /// Tracks whose emotion lies strictly inside a square window of half-width
    /// `window` around `target`, nearest first (Euclidean), ties broken by id.
    pub fn tracks_near_emotion(
        &self,
        target: Emotion,
        window: f64,
        limit: i64,
    ) -> Result<Vec<Track>> {
        // Squared distance orders the same as the distance itself.
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TRACK_COLUMNS} FROM tracks
             WHERE valence IS NOT NULL AND arousal IS NOT NULL
               AND ABS(valence - ?1) < ?3
               AND ABS(arousal - ?2) < ?3
             ORDER BY
               (valence - ?1) * (valence - ?1) + (arousal - ?2) * (arousal - ?2),
               id
             LIMIT ?4"
        ))?;
        let tracks = stmt
            .query_map(
                params![target.valence, target.arousal, window, limit],
                track_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    pub fn stats(&self) -> Result<CatalogStats> {
        let (total_tracks, with_emotion, artists) = self.conn.query_row(
            "SELECT
                COUNT(*),
                COUNT(valence),
                COUNT(DISTINCT NULLIF(artist, ''))
             FROM tracks",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(CatalogStats {
            total_tracks,
            with_emotion,
            artists,
        })
    }
}

fn emotion_columns(emotion: Option<Emotion>) -> (Option<f64>, Option<f64>) {
    match emotion {
        Some(e) => (Some(e.valence), Some(e.arousal)),
        None => (None, None),
    }
}
