//! HTTP API tests.
//!
//! The full router is driven with `oneshot`. The chat model is a local fake,
//! cloud TTS is a wiremock server, and the offline engine records what it
//! was asked to say, so no network or audio device is needed.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use palaver_lib::chat::{ChatBackend, ChatMessage};
use palaver_lib::cloud_tts::CloudTts;
use palaver_lib::error::{PalaverError, Result};
use palaver_lib::offline_tts::{OfflineSpeaker, SpeechEngine};
use palaver_lib::palaver_core::assets::AssetKind;
use palaver_lib::palaver_core::types::CloudTtsConfig;
use palaver_lib::render::{FontFace, ImageRenderer};
use palaver_lib::server::{AppState, router};
use palaver_lib::speech::SpeechSynthesizer;
use palaver_lib::store::AssetStore;

const FAKE_MP3: &[u8] = b"ID3\x03\x00fake-frame";

struct EchoChat {
    fail: bool,
}

#[async_trait]
impl ChatBackend for EchoChat {
    async fn complete(&self, history: &[ChatMessage]) -> Result<String> {
        if self.fail {
            return Err(PalaverError::Chat("model offline".into()));
        }
        let last = history.last().map(|m| m.content.as_str()).unwrap_or("");
        Ok(format!("echo: {last}"))
    }
}

/// Model that answers with whitespace only.
struct BlankChat;

#[async_trait]
impl ChatBackend for BlankChat {
    async fn complete(&self, _history: &[ChatMessage]) -> Result<String> {
        Ok("  \n ".into())
    }
}

#[derive(Clone, Default)]
struct RecordingEngine {
    queued: Vec<String>,
    spoken: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl SpeechEngine for RecordingEngine {
    fn say(&mut self, text: &str) {
        self.queued.push(text.to_owned());
    }

    async fn run_and_wait(&mut self) -> Result<()> {
        self.spoken.lock().unwrap().append(&mut self.queued);
        Ok(())
    }
}

struct Harness {
    _tmp: TempDir,
    _tts: MockServer,
    state: Arc<AppState>,
    spoken: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    fn app(&self) -> Router {
        router(self.state.clone())
    }

    fn audio_files(&self) -> Vec<String> {
        std::fs::read_dir(self.state.assets().dir(AssetKind::Audio))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }
}

async fn harness() -> Harness {
    harness_with(EchoChat { fail: false }).await
}

async fn harness_with(chat: impl ChatBackend + 'static) -> Harness {
    let tts = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/translate_tts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(FAKE_MP3))
        .mount(&tts)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let assets = AssetStore::new(tmp.path().join("static"));
    assets.ensure_layout().await.unwrap();

    let engine = RecordingEngine::default();
    let spoken = engine.spoken.clone();
    let cloud = CloudTts::new(&CloudTtsConfig {
        base_url: tts.uri(),
        timeout_secs: 5,
        ..Default::default()
    })
    .unwrap();
    let speech = SpeechSynthesizer::new(cloud, OfflineSpeaker::spawn(engine, "af_heart"));

    let state = Arc::new(AppState::new(
        Arc::new(chat),
        ImageRenderer::new(FontFace::Bitmap),
        speech,
        assets,
        1000,
    ));

    Harness {
        _tmp: tmp,
        _tts: tts,
        state,
        spoken,
    }
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get_bytes(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

// ─── /api/chat ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_without_media_returns_null_urls() {
    let h = harness().await;
    let (status, body) = post_json(
        h.app(),
        "/api/chat",
        json!({ "message": "hello", "isImageMode": false, "isAudioMode": false }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "echo: hello");
    assert!(body["image_url"].is_null());
    assert!(body["audio_url"].is_null());
}

#[tokio::test]
async fn chat_missing_fields_use_defaults() {
    let h = harness().await;
    let (status, body) = post_json(h.app(), "/api/chat", json!({})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "echo: ");
    assert!(body["image_url"].is_null());
    assert!(body["audio_url"].is_null());
}

#[tokio::test]
async fn chat_image_mode_serves_512_png() {
    let h = harness().await;
    let (status, body) = post_json(
        h.app(),
        "/api/chat",
        json!({ "message": "draw me", "isImageMode": true }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let url = body["image_url"].as_str().unwrap();
    assert!(url.starts_with("/static/images/image_") && url.ends_with(".png"));

    let (status, bytes) = get_bytes(h.app(), url).await;
    assert_eq!(status, StatusCode::OK);
    let img = image::load_from_memory(&bytes).unwrap().to_rgb8();
    assert_eq!(img.dimensions(), (512, 512));

    let white = image::Rgb([255, 255, 255]);
    let text_pixels = (10..26)
        .flat_map(|y| (10..26).map(move |x| (x, y)))
        .filter(|&(x, y)| *img.get_pixel(x, y) == white)
        .count();
    assert!(text_pixels > 0, "expected prompt text at the origin");
}

#[tokio::test]
async fn chat_audio_mode_cloud_returns_served_mp3() {
    let h = harness().await;
    let (status, body) = post_json(
        h.app(),
        "/api/chat",
        json!({ "message": "talk", "isAudioMode": true }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let url = body["audio_url"].as_str().unwrap();
    let (status, bytes) = get_bytes(h.app(), url).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, FAKE_MP3);
    assert!(h.spoken.lock().unwrap().is_empty());
}

#[tokio::test]
async fn chat_audio_mode_offline_speaks_reply() {
    let h = harness().await;
    let (status, body) = post_json(
        h.app(),
        "/api/chat",
        json!({ "message": "talk", "isAudioMode": true, "usePyttsx3": true }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["audio_url"].is_null());
    assert_eq!(*h.spoken.lock().unwrap(), vec!["echo: talk"]);
    assert!(h.audio_files().is_empty());
}

#[tokio::test]
async fn chat_backend_failure_is_500() {
    let h = harness_with(EchoChat { fail: true }).await;
    let (status, body) = post_json(h.app(), "/api/chat", json!({ "message": "hi" })).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
    assert!(h.state.history_turns().is_empty());
}

#[tokio::test]
async fn chat_blank_reply_skips_speech_and_is_recorded() {
    let h = harness_with(BlankChat).await;
    let (status, body) = post_json(
        h.app(),
        "/api/chat",
        json!({ "message": "say nothing", "isImageMode": true, "isAudioMode": true }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "  \n ");
    assert!(body["audio_url"].is_null());
    assert!(body["image_url"].is_string());
    assert!(h.audio_files().is_empty());

    let turns = h.state.history_turns();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].image_url.as_deref(), body["image_url"].as_str());
    assert!(turns[0].audio_url.is_none());
}

#[tokio::test]
async fn chat_blank_reply_offline_speaks_nothing() {
    let h = harness_with(BlankChat).await;
    let (status, body) = post_json(
        h.app(),
        "/api/chat",
        json!({ "message": "hush", "isAudioMode": true, "usePyttsx3": true }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["audio_url"].is_null());
    assert!(h.spoken.lock().unwrap().is_empty());
    assert_eq!(h.state.history_turns().len(), 1);
}

#[tokio::test]
async fn chat_malformed_json_is_400() {
    let h = harness().await;
    let req = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = h.app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_wrong_field_type_is_400() {
    let h = harness().await;
    let (status, body) = post_json(h.app(), "/api/chat", json!({ "isImageMode": "yes" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

// ─── History ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn history_records_each_chat_in_order() {
    let h = harness().await;
    for n in 0..3 {
        let (status, _) = post_json(
            h.app(),
            "/api/chat",
            json!({ "message": format!("message {n}") }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let turns = h.state.history_turns();
    assert_eq!(turns.len(), 3);
    for (n, turn) in turns.iter().enumerate() {
        assert_eq!(turn.user_message, format!("message {n}"));
        assert_eq!(turn.bot_response, format!("echo: message {n}"));
        assert_eq!(turn.timestamp.len(), "2024-01-01 00:00:00".len());
        assert!(turn.image_url.is_none() && turn.audio_url.is_none());
    }
}

#[tokio::test]
async fn history_starts_empty_on_new_state() {
    let first = harness().await;
    post_json(first.app(), "/api/chat", json!({ "message": "hi" })).await;
    assert_eq!(first.state.history_turns().len(), 1);

    let restarted = harness().await;
    assert!(restarted.state.history_turns().is_empty());
}

#[tokio::test]
async fn history_keeps_media_urls() {
    let h = harness().await;
    let (_, body) = post_json(
        h.app(),
        "/api/chat",
        json!({ "message": "both", "isImageMode": true, "isAudioMode": true }),
    )
    .await;

    let turn = h.state.history_turns().pop().unwrap();
    assert_eq!(turn.image_url.as_deref(), body["image_url"].as_str());
    assert_eq!(turn.audio_url.as_deref(), body["audio_url"].as_str());
}

// ─── /api/speak ────────────────────────────────────────────────────────────

#[tokio::test]
async fn speak_cloud_returns_audio_url() {
    let h = harness().await;
    let (status, body) = post_json(h.app(), "/api/speak", json!({ "text": "read this" })).await;

    assert_eq!(status, StatusCode::OK);
    let url = body["audio_url"].as_str().unwrap();
    assert!(url.starts_with("/static/audio/speech_") && url.ends_with(".mp3"));
    assert!(body.get("status").is_none());

    let (status, bytes) = get_bytes(h.app(), url).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, FAKE_MP3);
}

#[tokio::test]
async fn speak_offline_reports_success_without_file() {
    let h = harness().await;
    let (status, body) = post_json(
        h.app(),
        "/api/speak",
        json!({ "text": "read this", "usePyttsx3": true }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert!(body["message"].is_string());
    assert!(body.get("audio_url").is_none());
    assert!(h.audio_files().is_empty());
    assert_eq!(*h.spoken.lock().unwrap(), vec!["read this"]);
}

#[tokio::test]
async fn speak_same_text_twice_gets_unique_files() {
    let h = harness().await;
    let (_, a) = post_json(h.app(), "/api/speak", json!({ "text": "same" })).await;
    let (_, b) = post_json(h.app(), "/api/speak", json!({ "text": "same" })).await;

    assert_ne!(a["audio_url"], b["audio_url"]);
    assert_eq!(h.audio_files().len(), 2);
}

#[tokio::test]
async fn speak_empty_cloud_text_is_400() {
    let h = harness().await;
    let (status, body) = post_json(h.app(), "/api/speak", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

// ─── Misc routes ───────────────────────────────────────────────────────────

#[tokio::test]
async fn landing_page_is_html() {
    let h = harness().await;
    let (status, bytes) = get_bytes(h.app(), "/").await;
    assert_eq!(status, StatusCode::OK);
    let page = String::from_utf8(bytes).unwrap();
    assert!(page.contains("/api/chat"));
}

#[tokio::test]
async fn status_reports_history_and_speech() {
    let h = harness().await;
    post_json(h.app(), "/api/chat", json!({ "message": "one" })).await;

    let (status, bytes) = get_bytes(h.app(), "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["history_len"], 1);
    assert_eq!(body["history_capacity"], 1000);
    assert_eq!(body["offline_speech"]["state"], "idle");
    assert_eq!(body["offline_speech"]["voice"], "af_heart");
}

#[tokio::test]
async fn missing_static_file_is_404() {
    let h = harness().await;
    let (status, _) = get_bytes(h.app(), "/static/images/nope.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
