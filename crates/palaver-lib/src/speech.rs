//! Speech synthesizer: picks the cloud or offline strategy per request.

use palaver_core::types::SpeechStrategy;

use crate::cloud_tts::CloudTts;
use crate::error::Result;
use crate::offline_tts::OfflineSpeaker;
use crate::store::AssetStore;

pub struct SpeechSynthesizer {
    cloud: CloudTts,
    offline: OfflineSpeaker,
}

impl SpeechSynthesizer {
    pub fn new(cloud: CloudTts, offline: OfflineSpeaker) -> Self {
        Self { cloud, offline }
    }

    /// Speak `text` with `strategy`. Returns the audio URL for the cloud
    /// strategy and `None` once offline playback has finished.
    pub async fn synthesize(
        &self,
        store: &AssetStore,
        text: &str,
        strategy: SpeechStrategy,
    ) -> Result<Option<String>> {
        match strategy {
            SpeechStrategy::Cloud => self.cloud.synthesize(store, text).await.map(Some),
            SpeechStrategy::Offline => {
                self.offline.speak(text).await?;
                Ok(None)
            }
        }
    }

    pub fn offline(&self) -> &OfflineSpeaker {
        &self.offline
    }
}
