pub mod config;
pub mod db;
pub mod emotion;
pub mod filestore;
pub mod recommend;
pub mod scanner;
pub mod server;

#[cfg(test)]
mod test_support;

/// Audio file extensions picked up by bulk import (compared lowercase)
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "flac", "ogg"];

/// Extension forced onto uploads that arrive without one
pub const DEFAULT_UPLOAD_EXTENSION: &str = "mp3";

/// Application name for XDG paths
pub const APP_NAME: &str = "musicstore";

/// Per-store staging directory for uploads not yet placed
pub const STAGING_DIR: &str = ".tmp";
