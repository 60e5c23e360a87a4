//! On-disk static asset tree.
//!
//! ```text
//! {root}/images/image_<uuid>.png
//! {root}/audio/speech_<uuid>.mp3
//! ```
//!
//! Files are written once and never cleaned up.

use std::path::{Path, PathBuf};

use palaver_core::assets::AssetKind;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, kind: AssetKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn path_for(&self, kind: AssetKind, file_name: &str) -> PathBuf {
        self.dir(kind).join(file_name)
    }

    /// Create the per-kind directories if they are missing.
    pub async fn ensure_layout(&self) -> Result<()> {
        for kind in AssetKind::ALL {
            tokio::fs::create_dir_all(self.dir(kind)).await?;
        }
        Ok(())
    }
}
