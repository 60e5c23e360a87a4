//! Cloud TTS: Google Translate speech endpoint, saved as MP3.
//!
//! Pipeline:
//!
//! ```text
//! text → normalize → split into ≤100-byte chunks
//!      → GET {base}/translate_tts?q=<chunk>&tl=<lang>… (one per chunk, in order)
//!      → stream MP3 bytes into speech_<uuid>.mp3.partial → rename
//! ```
//!
//! MP3 frames concatenate cleanly, so the chunks are appended into a single
//! file. The `.partial` file is removed if any request fails, so only
//! complete files ever appear under the static root.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use palaver_core::assets::AssetKind;
use palaver_core::text_prep::{CLOUD_TTS_MAX_CHUNK_LEN, normalize_for_speech, split_text};
use palaver_core::types::CloudTtsConfig;

use crate::error::{PalaverError, Result};
use crate::store::AssetStore;

/// Normal speaking speed; the endpoint also accepts slower values.
const TTS_SPEED: &str = "1";

pub struct CloudTts {
    client: Client,
    url: String,
    lang: String,
}

impl CloudTts {
    pub fn new(config: &CloudTtsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("palaver/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/translate_tts", config.base_url.trim_end_matches('/')),
            lang: config.lang.clone(),
        })
    }

    /// Synthesize `text` into a new MP3 under `store` and return its URL.
    pub async fn synthesize(&self, store: &AssetStore, text: &str) -> Result<String> {
        let chunks = split_text(&normalize_for_speech(text), CLOUD_TTS_MAX_CHUNK_LEN);
        if chunks.is_empty() {
            return Err(PalaverError::EmptySpeech);
        }

        let file_name = AssetKind::Audio.new_file_name();
        let dest = store.path_for(AssetKind::Audio, &file_name);
        let partial = dest.with_extension("mp3.partial");

        if let Err(e) = self.write_chunks(&chunks, &partial).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
        tokio::fs::rename(&partial, &dest).await?;

        info!(file = %file_name, chunks = chunks.len(), "cloud tts: saved");
        Ok(AssetKind::Audio.url_for(&file_name))
    }

    async fn write_chunks(&self, chunks: &[String], partial: &Path) -> Result<()> {
        let mut file = tokio::fs::File::create(partial).await?;

        for (i, chunk) in chunks.iter().enumerate() {
            debug!(
                "cloud tts: chunk {}/{} ({} chars)",
                i + 1,
                chunks.len(),
                chunk.len()
            );

            let resp = self
                .client
                .get(&self.url)
                .query(&[
                    ("ie", "UTF-8"),
                    ("q", chunk.as_str()),
                    ("tl", self.lang.as_str()),
                    ("client", "tw-ob"),
                    ("ttsspeed", TTS_SPEED),
                ])
                .send()
                .await?;

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                return Err(PalaverError::Speech(format!(
                    "TTS service error {status}: {text}"
                )));
            }

            let mut stream = resp.bytes_stream();
            while let Some(bytes) = stream.next().await {
                file.write_all(&bytes?).await?;
            }
        }

        file.flush().await?;
        Ok(())
    }
}
