//! Client for the emotion prediction service.
//!
//! The service exposes two endpoints returning `{"valence": f, "arousal": f}`:
//! - `POST {server}/predictmp3` with a multipart `file` part
//! - `GET {server}/predicturi?mp3={url}` where the service fetches the audio itself

use std::path::Path;

use thiserror::Error;

use crate::db::models::Emotion;

/// Default service address when the config doesn't name one.
pub const DEFAULT_SERVER: &str = "http://localhost:8000/";

#[derive(Error, Debug)]
pub enum EmotionError {
    #[error("Emotion service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Emotion service request failed: {0}")]
    Transport(#[from] ureq::Error),
    #[error("Invalid emotion response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Emotion out of range: valence={valence}, arousal={arousal}")]
    OutOfRange { valence: f64, arousal: f64 },
    #[error("Could not read {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Something that can score a track's emotion.
pub trait EmotionAnalyzer: Send + Sync {
    /// Upload the file's bytes for analysis.
    fn analyze_file(&self, path: &Path) -> Result<Emotion, EmotionError>;

    /// Ask the service to fetch and analyze a publicly reachable URL.
    fn analyze_uri(&self, uri: &str) -> Result<Emotion, EmotionError>;
}

/// Blocking HTTP client for the emotion service. No retries.
pub struct EmotionClient {
    server: String,
    agent: ureq::Agent,
}

impl EmotionClient {
    pub fn new(server: &str) -> Self {
        // Non-2xx bodies carry the service's error message, so read them
        // ourselves instead of letting ureq turn them into bare status errors.
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            server: server.trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.server, name)
    }
}

impl EmotionAnalyzer for EmotionClient {
    fn analyze_file(&self, path: &Path) -> Result<Emotion, EmotionError> {
        let data = std::fs::read(path).map_err(|source| EmotionError::File {
            path: path.display().to_string(),
            source,
        })?;
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());

        let boundary = multipart_boundary();
        let body = multipart_file_body(&boundary, "file", &filename, &data);
        let url = self.endpoint("predictmp3");
        log::debug!("POST {url} ({} bytes)", body.len());

        let response = self
            .agent
            .post(&url)
            .header(
                "Content-Type",
                &format!("multipart/form-data; boundary={boundary}"),
            )
            .send(&body[..])?;
        read_emotion(response)
    }

    fn analyze_uri(&self, uri: &str) -> Result<Emotion, EmotionError> {
        let url = self.endpoint("predicturi");
        log::debug!("GET {url}?mp3={uri}");

        let response = self.agent.get(&url).query("mp3", uri).call()?;
        read_emotion(response)
    }
}

fn read_emotion(mut response: ureq::http::Response<ureq::Body>) -> Result<Emotion, EmotionError> {
    let status = response.status().as_u16();
    let body = response.body_mut().read_to_string()?;
    if status != 200 {
        return Err(EmotionError::Status { status, body });
    }
    parse_emotion(&body)
}

/// Parse the service's JSON. Both fields are required; no zero defaults.
pub fn parse_emotion(body: &str) -> Result<Emotion, EmotionError> {
    let emotion: Emotion = serde_json::from_str(body)?;
    if !emotion.is_valid() {
        return Err(EmotionError::OutOfRange {
            valence: emotion.valence,
            arousal: emotion.arousal,
        });
    }
    Ok(emotion)
}

fn multipart_boundary() -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("musicstore-{nanos:x}")
}

/// Single-part `multipart/form-data` body carrying one file.
fn multipart_file_body(boundary: &str, field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let filename = filename.replace(['"', '\r', '\n'], "_");
    let mut body = Vec::with_capacity(data.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}
