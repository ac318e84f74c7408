use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

use crate::db::models::Track;

#[derive(Error, Debug)]
pub enum PlacementError {
    #[error("File already exists: {0}")]
    AlreadyExists(String),
    #[error("Hard link {src} -> {dst} failed: {source}")]
    Link {
        src: String,
        dst: String,
        #[source]
        source: io::Error,
    },
    #[error("Could not resolve {path}: {source}")]
    Resolve {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{path} is outside store root {root}")]
    OutsideRoot { path: String, root: String },
}

/// Everything but RFC 3986 unreserved characters is escaped in URL segments.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Whitespace runs and path separators collapse to a single underscore.
static UNSAFE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s/\\]+").unwrap());

/// "a string with  spaces" -> "a_string_with_spaces"
pub fn snake(s: &str) -> String {
    UNSAFE_RUN_RE.replace_all(s.trim(), "_").into_owned()
}

/// `{name}-{artist}-{album}.{ext}`, each part snake-cased. Lossy and
/// human-readable: two tracks can map to the same name, which placement
/// reports as a collision.
pub fn canonical_filename(track: &Track, ext: Option<&str>) -> String {
    let mut filename = format!(
        "{}-{}-{}",
        snake(&track.name),
        snake(&track.artist),
        snake(&track.album)
    );
    if let Some(ext) = ext.filter(|e| !e.is_empty()) {
        filename.push('.');
        filename.push_str(ext);
    }
    filename
}

/// Where `src` would be placed for `track` under `root`.
pub fn canonical_path(root: &Path, track: &Track, src: &Path) -> PathBuf {
    let ext = src.extension().and_then(|e| e.to_str());
    root.join(canonical_filename(track, ext))
}

/// Hard-link `src` to its canonical path under `root` and return that path.
/// Never overwrites: an existing destination is an error. A symlinked
/// source is resolved first, so the placed file is always a regular file.
pub fn place(root: &Path, track: &Track, src: &Path) -> Result<PathBuf, PlacementError> {
    let dst = canonical_path(root, track, src);

    // symlink_metadata so a dangling link at the destination also counts
    if dst.symlink_metadata().is_ok() {
        return Err(PlacementError::AlreadyExists(dst.display().to_string()));
    }

    // hard_link does not follow symlinks on Linux
    let target = src.canonicalize().unwrap_or_else(|_| src.to_path_buf());

    match std::fs::hard_link(&target, &dst) {
        Ok(()) => Ok(dst),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(PlacementError::AlreadyExists(dst.display().to_string()))
        }
        Err(source) => Err(PlacementError::Link {
            src: src.display().to_string(),
            dst: dst.display().to_string(),
            source,
        }),
    }
}

fn resolve(path: &Path) -> Result<PathBuf, PlacementError> {
    path.canonicalize().map_err(|source| PlacementError::Resolve {
        path: path.display().to_string(),
        source,
    })
}

/// Path of an existing file relative to `root`, both resolved first.
pub fn relative_path(root: &Path, path: &Path) -> Result<PathBuf, PlacementError> {
    let root_abs = resolve(root)?;
    let path_abs = resolve(path)?;
    path_abs
        .strip_prefix(&root_abs)
        .map(Path::to_path_buf)
        .map_err(|_| PlacementError::OutsideRoot {
            path: path_abs.display().to_string(),
            root: root_abs.display().to_string(),
        })
}

/// Both paths resolve to the same location.
pub fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// True if `path` resolves to somewhere under `root`. Unresolvable paths
/// are never inside.
pub fn is_inside(root: &Path, path: &Path) -> bool {
    relative_path(root, path).is_ok()
}

/// Public URL of a placed file: `{base_url}/{static_path}/{relative path}`.
pub fn audio_url(
    base_url: &str,
    static_path: &str,
    root: &Path,
    placed: &Path,
) -> Result<String, PlacementError> {
    let relative = relative_path(root, placed)?;

    let mut url = base_url.trim_end_matches('/').to_string();
    for segment in static_path.split('/').filter(|s| !s.is_empty()) {
        url.push('/');
        url.push_str(&utf8_percent_encode(segment, PATH_SEGMENT).to_string());
    }
    for component in relative.components() {
        if let Component::Normal(part) = component {
            url.push('/');
            url.push_str(&utf8_percent_encode(&part.to_string_lossy(), PATH_SEGMENT).to_string());
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn track(name: &str, artist: &str, album: &str) -> Track {
        Track {
            name: name.into(),
            artist: artist.into(),
            album: album.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_snake() {
        assert_eq!(snake("a string with spaces"), "a_string_with_spaces");
        assert_eq!(snake("  tabs\tand   runs "), "tabs_and_runs");
        assert_eq!(snake("AC/DC"), "AC_DC");
        assert_eq!(snake(r"back\slash"), "back_slash");
        assert_eq!(snake(""), "");
    }

    #[test]
    fn test_canonical_filename_is_deterministic() {
        let t = track("Fire on the Mountain", "Grateful Dead", "Shakedown Street");
        let a = canonical_filename(&t, Some("mp3"));
        let b = canonical_filename(&t.clone(), Some("mp3"));
        assert_eq!(a, b);
        assert_eq!(a, "Fire_on_the_Mountain-Grateful_Dead-Shakedown_Street.mp3");

        assert_eq!(canonical_filename(&track("x", "", ""), None), "x--");
        assert_eq!(
            canonical_path(Path::new("/lib"), &t, Path::new("/in/song.MP3")),
            PathBuf::from("/lib/Fire_on_the_Mountain-Grateful_Dead-Shakedown_Street.MP3")
        );
    }

    #[test]
    fn test_place_hard_links_and_keeps_source() {
        let root = tempfile::tempdir().unwrap();
        let incoming = tempfile::tempdir().unwrap();
        let src = incoming.path().join("in.mp3");
        fs::write(&src, b"audio bytes").unwrap();

        let placed = place(root.path(), &track("Song", "Band", "LP"), &src).unwrap();
        assert_eq!(placed, root.path().join("Song-Band-LP.mp3"));
        assert_eq!(fs::read(&placed).unwrap(), b"audio bytes");
        assert!(src.exists());
    }

    #[test]
    fn test_place_never_overwrites() {
        let root = tempfile::tempdir().unwrap();
        let src = root.path().join("src.mp3");
        fs::write(&src, b"new").unwrap();
        let existing = root.path().join("Song-Band-LP.mp3");
        fs::write(&existing, b"old").unwrap();

        let err = place(root.path(), &track("Song", "Band", "LP"), &src).unwrap_err();
        assert!(matches!(err, PlacementError::AlreadyExists(_)));
        assert_eq!(fs::read(&existing).unwrap(), b"old");
    }

    #[test]
    fn test_place_missing_source() {
        let root = tempfile::tempdir().unwrap();
        let err = place(root.path(), &track("a", "b", "c"), &root.path().join("gone.mp3"))
            .unwrap_err();
        assert!(matches!(err, PlacementError::Link { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_place_resolves_symlinked_source() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let real = outside.path().join("real.mp3");
        fs::write(&real, b"linked audio").unwrap();
        let link = root.path().join("linked.mp3");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let placed = place(root.path(), &track("Song", "Band", "LP"), &link).unwrap();
        assert!(placed.symlink_metadata().unwrap().file_type().is_file());
        assert_eq!(fs::read(&placed).unwrap(), b"linked audio");
        assert!(is_inside(root.path(), &placed));
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
    }

    #[test]
    fn test_audio_url() {
        let root = tempfile::tempdir().unwrap();
        let placed = root.path().join("Über Song-Band-LP.mp3");
        fs::write(&placed, b"x").unwrap();

        let url = audio_url("http://host:8080/", "/music/audio", root.path(), &placed).unwrap();
        assert_eq!(url, "http://host:8080/music/audio/%C3%9Cber%20Song-Band-LP.mp3");

        let placed = root.path().join("a&b (live)~v1.mp3");
        fs::write(&placed, b"x").unwrap();
        let url = audio_url("http://h", "s/audio", root.path(), &placed).unwrap();
        assert_eq!(url, "http://h/s/audio/a%26b%20%28live%29~v1.mp3");
    }

    #[test]
    fn test_audio_url_outside_root_fails() {
        let root = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let stray = other.path().join("stray.mp3");
        fs::write(&stray, b"x").unwrap();

        let err = audio_url("http://h", "/s/audio", root.path(), &stray).unwrap_err();
        assert!(matches!(err, PlacementError::OutsideRoot { .. }));
        assert!(!is_inside(root.path(), &stray));
    }

    #[test]
    fn test_is_inside_follows_nested_dirs() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join(".tmp")).unwrap();
        let tmp = root.path().join(".tmp/upload.mp3");
        fs::write(&tmp, b"x").unwrap();

        assert!(is_inside(root.path(), &tmp));
        assert!(!is_inside(root.path(), &root.path().join("missing.mp3")));
    }
}
