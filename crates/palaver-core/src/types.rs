//! Shared types for the palaver chat server.
//!
//! Wire DTOs for the HTTP API, the chat turn record, and collaborator
//! configuration. Kept here so the CLI and downstream clients can depend on
//! the types without pulling in tokio, axum, or rodio.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::history::DEFAULT_HISTORY_CAPACITY;

// ─── Chat types ────────────────────────────────────────────────────────────

/// One completed chat exchange as recorded in the history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub user_message: String,
    pub bot_response: String,
    /// Local time, `%Y-%m-%d %H:%M:%S`.
    pub timestamp: String,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
}

/// Body of `POST /api/chat`. Every field may be omitted on the wire.
///
/// Defaults: empty message, no image, no audio, cloud speech.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatRequest {
    pub message: String,
    /// Render a placeholder image of the prompt.
    #[serde(rename = "isImageMode")]
    pub image_mode: bool,
    /// Synthesize speech from the reply.
    #[serde(rename = "isAudioMode")]
    pub audio_mode: bool,
    /// Play through the local engine instead of saving an MP3.
    #[serde(rename = "usePyttsx3", alias = "useOfflineTts")]
    pub offline_tts: bool,
}

impl ChatRequest {
    pub fn speech_strategy(&self) -> SpeechStrategy {
        SpeechStrategy::from_offline_flag(self.offline_tts)
    }
}

/// Body returned by `POST /api/chat`. Missing media serialize as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
}

/// Body of `POST /api/speak`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakRequest {
    pub text: String,
    #[serde(rename = "usePyttsx3", alias = "useOfflineTts")]
    pub offline_tts: bool,
}

impl SpeakRequest {
    pub fn speech_strategy(&self) -> SpeechStrategy {
        SpeechStrategy::from_offline_flag(self.offline_tts)
    }
}

/// Body returned by `POST /api/speak`; the shape depends on the strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpeakResponse {
    /// Offline engine finished playing; nothing was saved.
    Played { status: String, message: String },
    /// Cloud engine produced a file.
    Saved { audio_url: String },
}

impl SpeakResponse {
    pub fn played() -> Self {
        SpeakResponse::Played {
            status: "success".into(),
            message: "Speech played using the offline engine".into(),
        }
    }
}

/// Which speech backend handles a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechStrategy {
    /// Remote TTS, MP3 written under the static root.
    Cloud,
    /// Local engine, played on the server's audio device.
    Offline,
}

impl SpeechStrategy {
    pub fn from_offline_flag(offline: bool) -> Self {
        if offline {
            SpeechStrategy::Offline
        } else {
            SpeechStrategy::Cloud
        }
    }
}

// ─── Status types ──────────────────────────────────────────────────────────

/// Observable state of the offline speech worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechState {
    Idle,
    Speaking,
}

/// Offline speech worker snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineSpeechStatus {
    pub state: SpeechState,
    pub queue_length: usize,
    pub voice: String,
}

/// Body returned by `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub history_len: usize,
    pub history_capacity: usize,
    pub offline_speech: OfflineSpeechStatus,
}

// ─── Configuration ─────────────────────────────────────────────────────────

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Chat collaborator (Ollama) configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub ollama_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".into(),
            model: "llama3.2".into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Cloud TTS (Google Translate endpoint) configuration.
#[derive(Debug, Clone)]
pub struct CloudTtsConfig {
    pub base_url: String,
    /// Language tag passed as `tl`.
    pub lang: String,
    pub timeout_secs: u64,
}

impl Default for CloudTtsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://translate.google.com".into(),
            lang: "en".into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Words per minute the offline engine speaks at unless configured.
pub const DEFAULT_SPEECH_RATE_WPM: u32 = 150;

/// Words per minute that corresponds to engine speed 1.0.
pub const ENGINE_BASE_RATE_WPM: u32 = 200;

/// Offline engine (local Kokoro server + audio device) configuration.
#[derive(Debug, Clone)]
pub struct OfflineTtsConfig {
    pub kokoro_url: String,
    pub voice: String,
    pub rate_wpm: u32,
}

impl OfflineTtsConfig {
    /// Engine speed multiplier for the configured rate.
    pub fn speed(&self) -> f32 {
        self.rate_wpm as f32 / ENGINE_BASE_RATE_WPM as f32
    }
}

impl Default for OfflineTtsConfig {
    fn default() -> Self {
        Self {
            kokoro_url: "http://localhost:3001".into(),
            voice: "af_heart".into(),
            rate_wpm: DEFAULT_SPEECH_RATE_WPM,
        }
    }
}

/// Everything `palaver serve` needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Root of the static asset tree served under `/static`.
    pub static_dir: PathBuf,
    pub history_capacity: usize,
    /// TrueType font for image text. Common system locations are searched
    /// when unset.
    pub font_path: Option<PathBuf>,
    pub chat: ChatConfig,
    pub cloud_tts: CloudTtsConfig,
    pub offline_tts: OfflineTtsConfig,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            static_dir: PathBuf::from("static"),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            font_path: None,
            chat: ChatConfig::default(),
            cloud_tts: CloudTtsConfig::default(),
            offline_tts: OfflineTtsConfig::default(),
        }
    }
}
