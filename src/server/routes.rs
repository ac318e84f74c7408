// REST handlers. Errors are returned as `{"error": "..."}` with a status
// derived from the failing step.

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::AppState;
use crate::db::{Catalog, DbError};
use crate::db::models::Track;
use crate::filestore::upload::{TrackUpload, UploadSource};
use crate::filestore::{IngestError, TrackOverride};
use crate::recommend::{self, RecommendError, RecommendRequest};

const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 500;

// ---- Errors ----

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unprocessable(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            Self::BadRequest(m) | Self::NotFound(m) | Self::Unprocessable(m) | Self::Internal(m) => m,
        };
        if status.is_server_error() {
            log::error!("{}: {}", status, error);
        }
        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(_) => Self::NotFound(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        if e.is_client_error() {
            Self::BadRequest(e.to_string())
        } else {
            Self::Unprocessable(e.to_string())
        }
    }
}

impl From<RecommendError> for ApiError {
    fn from(e: RecommendError) -> Self {
        match e {
            RecommendError::Db(db) => db.into(),
            invalid => Self::Unprocessable(invalid.to_string()),
        }
    }
}

// ---- Request/Response types ----

#[derive(Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PaginationParams {
    fn resolve(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE).clamp(0, MAX_PAGE);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

/// Query of `GET /murecom`. Capitalized names are accepted too.
#[derive(Deserialize)]
pub struct MurecomParams {
    #[serde(alias = "Valence")]
    pub valence: Option<f64>,
    #[serde(alias = "Arousal")]
    pub arousal: Option<f64>,
    #[serde(alias = "Limit")]
    pub limit: Option<i64>,
}

impl MurecomParams {
    fn into_request(self) -> Result<RecommendRequest, RecommendError> {
        match (self.valence, self.arousal) {
            (Some(valence), Some(arousal)) => Ok(RecommendRequest {
                valence,
                arousal,
                limit: self.limit.unwrap_or(0),
            }),
            _ => Err(RecommendError::MissingEmotion),
        }
    }
}

#[derive(Serialize)]
pub struct TracksResponse {
    pub tracks: Vec<Track>,
}

#[derive(Serialize)]
pub struct TrackResponse {
    pub track: Track,
}

/// Fields collected from a `POST /{store}/new` form.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub overrides: TrackOverride,
    pub file: Option<(String, Vec<u8>)>,
    pub audio_file_url: Option<String>,
}

impl UploadForm {
    /// Exactly one audio source must be present.
    pub fn into_upload(self) -> Result<TrackUpload, ApiError> {
        let url = self.audio_file_url.filter(|u| !u.trim().is_empty());
        let source = match (self.file, url) {
            (Some((filename, data)), None) => UploadSource::File { filename, data },
            (None, Some(url)) => UploadSource::Url(url),
            (None, None) => {
                return Err(ApiError::BadRequest(
                    "Neither file nor audio_file_url provided".into(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(ApiError::BadRequest(
                    "Provide either file or audio_file_url, not both".into(),
                ));
            }
        };
        Ok(TrackUpload {
            overrides: self.overrides,
            source,
        })
    }
}

// ---- Route registration ----

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tracks", get(list_tracks))
        .route(
            "/tracks/{id}",
            get(get_track).put(update_track).delete(delete_track),
        )
        .route("/murecom", get(murecom))
        .route("/{store}/new", post(upload_track))
}

// ---- Handlers ----

fn lock_db(state: &AppState) -> Result<std::sync::MutexGuard<'_, crate::db::Database>, ApiError> {
    state
        .db
        .lock()
        .map_err(|_| ApiError::Internal(DbError::Poisoned.to_string()))
}

async fn list_tracks(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<TracksResponse>, ApiError> {
    let (limit, offset) = params.resolve();
    let tracks = lock_db(&state)?.list_tracks(limit, offset)?;
    Ok(Json(TracksResponse { tracks }))
}

async fn get_track(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<TrackResponse>, ApiError> {
    let track = lock_db(&state)?
        .get_track(id)?
        .ok_or(DbError::NotFound(id))?;
    Ok(Json(TrackResponse { track }))
}

/// Edit a track's metadata. The audio URL and emotion are left alone, and
/// the (name, artist) pair must stay unique.
async fn update_track(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(changes): Json<TrackOverride>,
) -> Result<Json<TrackResponse>, ApiError> {
    let db = lock_db(&state)?;
    let mut track = db.get_track(id)?.ok_or(DbError::NotFound(id))?;
    let before = track.clone();
    changes.apply(&mut track);

    if (track.name != before.name || track.artist != before.artist)
        && db.count_by_name_artist(&track.name, &track.artist)? > 0
    {
        return Err(IngestError::Duplicate {
            name: track.name,
            artist: track.artist,
        }
        .into());
    }

    Catalog::update(&*db, &track)?;
    log::info!("Updated track {}: {} / {}", id, track.name, track.artist);
    Ok(Json(TrackResponse { track }))
}

async fn delete_track(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    lock_db(&state)?.delete_track(id)?;
    log::info!("Deleted track {}", id);
    Ok(StatusCode::NO_CONTENT)
}

async fn murecom(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MurecomParams>,
) -> Result<Json<TracksResponse>, ApiError> {
    let req = params.into_request()?;
    let tracks = recommend::recommend(&*lock_db(&state)?, &req)?;
    Ok(Json(TracksResponse { tracks }))
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let bad = |e: axum::extract::multipart::MultipartError| ApiError::BadRequest(e.body_text());
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().unwrap_or_default().to_lowercase();
        if name == "file" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await.map_err(bad)?;
            form.file = Some((filename, data.to_vec()));
            continue;
        }

        let value = field.text().await.map_err(bad)?;
        match name.as_str() {
            "name" => form.overrides.name = Some(value),
            "artist" => form.overrides.artist = Some(value),
            "album" => form.overrides.album = Some(value),
            "cover_image_url" => form.overrides.cover_image_url = Some(value),
            "audio_file_url" => form.audio_file_url = Some(value),
            other => log::debug!("Ignoring form field {:?}", other),
        }
    }
    Ok(form)
}

async fn upload_track(
    State(state): State<Arc<AppState>>,
    Path(store_name): Path<String>,
    multipart: Multipart,
) -> Result<Json<TrackResponse>, ApiError> {
    let store = state
        .stores
        .get(&store_name)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("No store named {store_name:?}")))?;
    let upload = read_form(multipart).await?.into_upload()?;

    let db = Arc::clone(&state.db);
    let track = tokio::task::spawn_blocking(move || store.add_uploaded_track(&*db, &upload))
        .await
        .map_err(|e| ApiError::Internal(format!("Ingestion task failed: {e}")))??;
    Ok(Json(TrackResponse { track }))
}
