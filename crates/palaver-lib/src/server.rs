//! HTTP API for the palaver chat server.
//!
//! Endpoints:
//! - GET  /               landing page (embedded chat client)
//! - POST /api/chat       reply to a message, optionally with image and speech
//! - POST /api/speak      speak text via the cloud or offline engine
//! - GET  /api/status     history size and offline speech state
//! - GET  /static/{*}     generated images and audio
//!
//! Runs on port 5000 by default. CORS-permissive.

use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use palaver_core::assets::STATIC_URL_PREFIX;
use palaver_core::history::ChatHistory;
use palaver_core::text_prep::normalize_for_speech;
use palaver_core::types::{
    ChatRequest, ChatResponse, ChatTurn, OfflineSpeechStatus, ServerConfig, ServerStatus,
    SpeakRequest, SpeakResponse,
};

use crate::chat::{ChatBackend, OllamaClient, generate_response};
use crate::cloud_tts::CloudTts;
use crate::error::{ApiError, Result};
use crate::offline_tts::OfflineSpeaker;
use crate::render::{FontFace, ImageRenderer};
use crate::speech::SpeechSynthesizer;
use crate::store::AssetStore;

const INDEX_HTML: &str = include_str!("../web/index.html");

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Shared state for all handlers.
pub struct AppState {
    chat: Arc<dyn ChatBackend>,
    images: Arc<ImageRenderer>,
    speech: SpeechSynthesizer,
    assets: AssetStore,
    history: Mutex<ChatHistory>,
}

impl AppState {
    pub fn new(
        chat: Arc<dyn ChatBackend>,
        images: ImageRenderer,
        speech: SpeechSynthesizer,
        assets: AssetStore,
        history_capacity: usize,
    ) -> Self {
        Self {
            chat,
            images: Arc::new(images),
            speech,
            assets,
            history: Mutex::new(ChatHistory::with_capacity(history_capacity)),
        }
    }

    /// Build every collaborator from `config`. Must be called inside a tokio
    /// runtime (the offline speech worker is spawned here).
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let chat = OllamaClient::new(&config.chat)?;
        let images = ImageRenderer::new(FontFace::load(config.font_path.as_deref()));
        let speech = SpeechSynthesizer::new(
            CloudTts::new(&config.cloud_tts)?,
            OfflineSpeaker::kokoro(&config.offline_tts)?,
        );
        Ok(Self::new(
            Arc::new(chat),
            images,
            speech,
            AssetStore::new(&config.static_dir),
            config.history_capacity,
        ))
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    /// Copy of the logged turns, oldest first.
    pub fn history_turns(&self) -> Vec<ChatTurn> {
        self.history().iter().cloned().collect()
    }

    pub fn status(&self) -> ServerStatus {
        let (history_len, history_capacity) = {
            let history = self.history();
            (history.len(), history.capacity())
        };
        ServerStatus {
            history_len,
            history_capacity,
            offline_speech: self.speech.offline().status(),
        }
    }

    fn record(&self, turn: ChatTurn) {
        if let Some(evicted) = self.history().push(turn) {
            debug!("history: evicted turn from {}", evicted.timestamp);
        }
    }

    fn history(&self) -> std::sync::MutexGuard<'_, ChatHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Build the axum router around shared [`AppState`].
pub fn router(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(state.assets.root());
    Router::new()
        .route("/", get(index))
        .route("/api/chat", post(chat))
        .route("/api/speak", post(speak))
        .route("/api/status", get(status))
        .nest_service(STATIC_URL_PREFIX, static_files)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Create the asset layout, bind, and serve until Ctrl+C.
pub async fn serve(config: ServerConfig) -> Result<()> {
    let state = Arc::new(AppState::from_config(&config)?);
    state.assets.ensure_layout().await?;
    tokio::spawn(log_speech_status(state.speech.offline().subscribe_status()));

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("palaver listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Log offline speech state transitions until the worker goes away.
async fn log_speech_status(mut rx: watch::Receiver<OfflineSpeechStatus>) {
    let mut last = rx.borrow_and_update().state;
    while rx.changed().await.is_ok() {
        let status = rx.borrow_and_update().clone();
        if status.state != last {
            info!(
                voice = %status.voice,
                queued = status.queue_length,
                "offline speech: {:?}",
                status.state
            );
            last = status.state;
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

// ─── Handlers ──────────────────────────────────────────────────────────────

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn chat(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> std::result::Result<Json<ChatResponse>, ApiError> {
    let Json(req) = payload?;
    debug!(
        image = req.image_mode,
        audio = req.audio_mode,
        offline = req.offline_tts,
        "chat: {} chars",
        req.message.len()
    );

    let text = generate_response(state.chat.as_ref(), &req.message).await?;

    let image_url = if req.image_mode {
        Some(state.images.generate(&state.assets, &req.message).await?)
    } else {
        None
    };

    // A blank reply has nothing to speak; the turn is still recorded.
    let audio_url = if req.audio_mode && !normalize_for_speech(&text).is_empty() {
        state
            .speech
            .synthesize(&state.assets, &text, req.speech_strategy())
            .await?
    } else {
        None
    };

    state.record(ChatTurn {
        user_message: req.message,
        bot_response: text.clone(),
        timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
        image_url: image_url.clone(),
        audio_url: audio_url.clone(),
    });

    Ok(Json(ChatResponse {
        text,
        image_url,
        audio_url,
    }))
}

async fn speak(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<SpeakRequest>, JsonRejection>,
) -> std::result::Result<Json<SpeakResponse>, ApiError> {
    let Json(req) = payload?;
    let audio_url = state
        .speech
        .synthesize(&state.assets, &req.text, req.speech_strategy())
        .await?;

    Ok(Json(match audio_url {
        Some(audio_url) => SpeakResponse::Saved { audio_url },
        None => SpeakResponse::played(),
    }))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<ServerStatus> {
    Json(state.status())
}
