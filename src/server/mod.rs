// HTTP surface: track CRUD, emotion recommendation, uploads and static
// audio for every configured store.

pub mod routes;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use indicatif::ProgressBar;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::config::AppConfig;
use crate::db::Database;
use crate::filestore::AudioFileStore;

/// Shared state for the handlers.
pub struct AppState {
    /// One connection for the whole process; also the ingestion catalog.
    pub db: Arc<Mutex<Database>>,
    /// Stores by name, as they appear in `/{store}/...`
    pub stores: HashMap<String, Arc<AudioFileStore>>,
}

impl AppState {
    pub fn new(db: Database, stores: Vec<AudioFileStore>) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            stores: stores
                .into_iter()
                .map(|s| (s.name().to_string(), Arc::new(s)))
                .collect(),
        }
    }
}

/// Assemble the application router.
pub fn router(state: Arc<AppState>, max_upload_mb: usize, cors: bool) -> Router {
    let mut app = routes::api_routes();

    for store in state.stores.values() {
        log::info!(
            "[{}] Serving {} at {}",
            store.name(),
            store.file_dir().display(),
            store.audio_static_path()
        );
        app = app.nest_service(&store.audio_static_path(), ServeDir::new(store.file_dir()));
    }

    let app = app
        .layer(DefaultBodyLimit::max(max_upload_mb * 1024 * 1024))
        .with_state(state);

    if cors {
        log::info!("CORS is enabled");
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Import every store marked `load_from_dir`, one blocking task per store.
///
/// Runs after the listener is up: with emotion analysis enabled the
/// service fetches each file back through our own static routes.
fn spawn_directory_loads(state: &Arc<AppState>, config: &AppConfig) {
    for cfg in config.stores.iter().filter(|s| s.load_from_dir) {
        let Some(store) = state.stores.get(&cfg.name).cloned() else {
            continue;
        };
        let db = Arc::clone(&state.db);
        tokio::task::spawn_blocking(move || {
            match store.add_tracks_from_dir(&*db, &ProgressBar::hidden()) {
                Ok(r) => log::info!(
                    "[{}] Loaded from dir: {} added, {} failed",
                    store.name(),
                    r.added,
                    r.failed
                ),
                Err(e) => log::error!("[{}] Load from dir failed: {}", store.name(), e),
            }
        });
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received, draining connections...");
}

/// Run the server until Ctrl-C.
pub async fn serve(config: &AppConfig, db: Database, cors: bool) -> Result<()> {
    let mut stores = Vec::with_capacity(config.stores.len());
    for cfg in &config.stores {
        let store = AudioFileStore::from_config(cfg, &config.emotion.server)
            .with_context(|| format!("Failed to open store {:?}", cfg.name))?;
        stores.push(store);
    }

    let state = Arc::new(AppState::new(db, stores));
    let app = router(Arc::clone(&state), config.max_upload_mb, cors);

    let listener = tokio::net::TcpListener::bind(&config.http_listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.http_listen_addr))?;
    log::info!("Listening on {}", listener.local_addr()?);

    spawn_directory_loads(&state, config);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    log::info!("Server stopped");
    Ok(())
}
