//! Offline speech: a dedicated worker that owns the local engine.
//!
//! Pipeline:
//!
//! ```text
//! speak("text") → [job_tx] → speech worker: engine.say(text); engine.run_and_wait()
//!     KokoroEngine: POST Kokoro, stream PCM → [play_tx] → playback thread → done
//!     ← [done] ← worker replies once playback has finished
//! ```
//!
//! The engine lives inside the worker task and nothing else can reach it, so
//! concurrent requests queue up and play one after another. A caller's
//! `speak()` future resolves when its own text has finished playing.
//!
//! The rodio `OutputStream` is `!Send`, so playback gets its own OS thread;
//! PCM fetching stays on the async runtime.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info};

use palaver_core::types::{OfflineSpeechStatus, OfflineTtsConfig, SpeechState};

use crate::error::{PalaverError, Result};

/// Kokoro PCM streaming format: 24 kHz mono 16-bit signed LE.
const PCM_SAMPLE_RATE: u32 = 24_000;
const PCM_CHANNELS: u16 = 1;

/// A local speech engine: queue text, then speak it all.
///
/// Implementations are driven by exactly one worker and never shared.
#[async_trait]
pub trait SpeechEngine: Send {
    /// Queue text for the next run.
    fn say(&mut self, text: &str);

    /// Speak everything queued and return once playback is over.
    async fn run_and_wait(&mut self) -> Result<()>;
}

/// Cloneable handle to the offline speech worker.
#[derive(Clone)]
pub struct OfflineSpeaker {
    job_tx: mpsc::UnboundedSender<SpeechJob>,
    status_tx: watch::Sender<OfflineSpeechStatus>,
    status_rx: watch::Receiver<OfflineSpeechStatus>,
}

struct SpeechJob {
    text: String,
    done: oneshot::Sender<Result<()>>,
}

impl OfflineSpeaker {
    /// Spawn the worker around `engine`. Must be called inside a tokio runtime.
    pub fn spawn(engine: impl SpeechEngine + 'static, voice: impl Into<String>) -> Self {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(OfflineSpeechStatus {
            state: SpeechState::Idle,
            queue_length: 0,
            voice: voice.into(),
        });

        let worker_status = status_tx.clone();
        tokio::spawn(async move {
            speech_worker(engine, job_rx, worker_status).await;
        });

        Self {
            job_tx,
            status_tx,
            status_rx,
        }
    }

    /// Spawn the worker around a [`KokoroEngine`] built from `config`.
    pub fn kokoro(config: &OfflineTtsConfig) -> Result<Self> {
        let engine = KokoroEngine::new(config)?;
        info!(
            voice = %config.voice,
            rate_wpm = config.rate_wpm,
            "offline tts: engine ready"
        );
        Ok(Self::spawn(engine, config.voice.clone()))
    }

    /// Speak `text` and wait until it has finished playing.
    pub async fn speak(&self, text: &str) -> Result<()> {
        let (done, done_rx) = oneshot::channel();
        update_status(&self.status_tx, |s| s.queue_length += 1);

        let job = SpeechJob {
            text: text.to_owned(),
            done,
        };
        if self.job_tx.send(job).is_err() {
            update_status(&self.status_tx, |s| {
                s.queue_length = s.queue_length.saturating_sub(1)
            });
            return Err(PalaverError::EngineUnavailable(
                "speech worker has stopped".into(),
            ));
        }

        done_rx.await.map_err(|_| {
            PalaverError::EngineUnavailable("speech worker dropped the request".into())
        })?
    }

    pub fn status(&self) -> OfflineSpeechStatus {
        self.status_rx.borrow().clone()
    }

    /// Subscribe to status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<OfflineSpeechStatus> {
        self.status_rx.clone()
    }
}

// ─── Worker ────────────────────────────────────────────────────────────────

async fn speech_worker(
    mut engine: impl SpeechEngine,
    mut job_rx: mpsc::UnboundedReceiver<SpeechJob>,
    status_tx: watch::Sender<OfflineSpeechStatus>,
) {
    while let Some(job) = job_rx.recv().await {
        update_status(&status_tx, |s| s.state = SpeechState::Speaking);
        debug!("speech worker: speaking {} chars", job.text.len());

        engine.say(&job.text);
        let result = engine.run_and_wait().await;
        if let Err(e) = &result {
            error!("speech worker: {e}");
        }

        update_status(&status_tx, |s| {
            s.queue_length = s.queue_length.saturating_sub(1);
            if s.queue_length == 0 {
                s.state = SpeechState::Idle;
            }
        });
        let _ = job.done.send(result);
    }
    debug!("speech worker: channel closed");
}

fn update_status(tx: &watch::Sender<OfflineSpeechStatus>, f: impl FnOnce(&mut OfflineSpeechStatus)) {
    tx.send_modify(f);
}

// ─── Kokoro engine ─────────────────────────────────────────────────────────

/// [`SpeechEngine`] that synthesizes through a local Kokoro server and plays
/// on the default audio device.
pub struct KokoroEngine {
    client: reqwest::Client,
    url: String,
    voice: String,
    speed: f32,
    pending: Vec<String>,
    play_tx: std::sync::mpsc::Sender<PlayJob>,
}

struct PlayJob {
    samples: Vec<i16>,
    done: oneshot::Sender<()>,
}

impl KokoroEngine {
    /// Build the engine and start its playback thread. The speaking rate is
    /// fixed here for the engine's lifetime.
    pub fn new(config: &OfflineTtsConfig) -> Result<Self> {
        let (play_tx, play_rx) = std::sync::mpsc::channel::<PlayJob>();
        std::thread::Builder::new()
            .name("palaver-playback".into())
            .spawn(move || playback_thread(play_rx))?;

        Ok(Self {
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(5))
                .build()?,
            url: format!("{}/v1/audio/speech", config.kokoro_url.trim_end_matches('/')),
            voice: config.voice.clone(),
            speed: config.speed(),
            pending: Vec::new(),
            play_tx,
        })
    }
}

#[async_trait]
impl SpeechEngine for KokoroEngine {
    fn say(&mut self, text: &str) {
        if !text.trim().is_empty() {
            self.pending.push(text.to_owned());
        }
    }

    async fn run_and_wait(&mut self) -> Result<()> {
        for text in std::mem::take(&mut self.pending) {
            let samples = fetch_pcm(&self.client, &self.url, &self.voice, self.speed, &text).await?;
            if samples.is_empty() {
                continue;
            }

            let (done, done_rx) = oneshot::channel();
            self.play_tx
                .send(PlayJob { samples, done })
                .map_err(|_| PalaverError::EngineUnavailable("audio output is not open".into()))?;
            done_rx
                .await
                .map_err(|_| PalaverError::EngineUnavailable("playback failed".into()))?;
        }
        Ok(())
    }
}

/// POST `text` to Kokoro and collect the streamed PCM samples.
async fn fetch_pcm(
    client: &reqwest::Client,
    url: &str,
    voice: &str,
    speed: f32,
    text: &str,
) -> Result<Vec<i16>> {
    let body = serde_json::json!({
        "input": text,
        "voice": voice,
        "model": "kokoro",
        "response_format": "pcm",
        "stream": true,
        "speed": speed,
    });

    debug!("kokoro: POST {} chars", text.len());

    let resp = client.post(url).json(&body).send().await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(PalaverError::Speech(format!("Kokoro error {status}: {text}")));
    }

    let mut stream = resp.bytes_stream();
    let mut samples = Vec::new();
    let mut decoder = PcmDecoder::default();
    while let Some(chunk) = stream.next().await {
        decoder.decode(&chunk?, &mut samples);
    }
    if decoder.pending.is_some() {
        debug!("kokoro: stream ended mid-sample, dropping last byte");
    }
    Ok(samples)
}

/// Little-endian 16-bit PCM decoder that survives samples split across
/// network chunks.
#[derive(Debug, Default)]
struct PcmDecoder {
    /// Low byte of a sample whose high byte has not arrived yet.
    pending: Option<u8>,
}

impl PcmDecoder {
    fn decode(&mut self, chunk: &[u8], out: &mut Vec<i16>) {
        let mut rest = chunk;
        if let Some(low) = self.pending.take() {
            let Some((&high, tail)) = rest.split_first() else {
                self.pending = Some(low);
                return;
            };
            out.push(i16::from_le_bytes([low, high]));
            rest = tail;
        }

        let pairs = rest.chunks_exact(2);
        self.pending = pairs.remainder().first().copied();
        out.extend(pairs.map(|pair| i16::from_le_bytes([pair[0], pair[1]])));
    }
}

// ─── Playback OS thread ────────────────────────────────────────────────────

fn playback_thread(play_rx: std::sync::mpsc::Receiver<PlayJob>) {
    let (_stream, stream_handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            error!("playback: failed to open audio output: {e}");
            return;
        }
    };

    while let Ok(job) = play_rx.recv() {
        let sink = match Sink::try_new(&stream_handle) {
            Ok(sink) => sink,
            Err(e) => {
                error!("playback: failed to create sink: {e}");
                continue;
            }
        };
        debug!("playback: {} samples", job.samples.len());
        sink.append(SamplesBuffer::new(PCM_CHANNELS, PCM_SAMPLE_RATE, job.samples));
        sink.sleep_until_end();
        let _ = job.done.send(());
    }
}
