use lofty::file::TaggedFileExt;
use lofty::prelude::*;
use std::path::Path;
use thiserror::Error;

use crate::db::models::Track;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Could not read tags from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: lofty::error::LoftyError,
    },
}

/// Build a draft track from an audio file's tags.
///
/// Only name, artist and album are filled. Without a title tag the name falls
/// back to the file name minus its extension. Fails if the file can't be
/// opened or parsed.
pub fn track_from_audio_file(path: &Path) -> Result<Track, MetadataError> {
    let tagged_file = lofty::read_from_path(path).map_err(|source| MetadataError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let mut track = Track::default();

    // Try primary tag, then fall back
    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        track.name = tag.title().map(|s| s.to_string()).unwrap_or_default();
        track.artist = tag.artist().map(|s| s.to_string()).unwrap_or_default();
        track.album = tag.album().map(|s| s.to_string()).unwrap_or_default();
    } else {
        log::debug!("No tags in {}", path.display());
    }

    if track.name.is_empty() {
        track.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
    }

    Ok(track)
}
