//! Naming and URL layout for generated files under the static root.

use uuid::Uuid;

/// URL prefix the static root is mounted at.
pub const STATIC_URL_PREFIX: &str = "/static";

/// Kind of file the server generates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Audio,
}

impl AssetKind {
    pub const ALL: [AssetKind; 2] = [AssetKind::Image, AssetKind::Audio];

    /// Subdirectory of the static root.
    pub fn dir_name(self) -> &'static str {
        match self {
            AssetKind::Image => "images",
            AssetKind::Audio => "audio",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Audio => "speech",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            AssetKind::Image => "png",
            AssetKind::Audio => "mp3",
        }
    }

    /// Fresh random file name, e.g. `image_<uuid>.png`. Independent of content.
    pub fn new_file_name(self) -> String {
        format!("{}_{}.{}", self.prefix(), Uuid::new_v4(), self.extension())
    }

    /// URL path that resolves to `file_name` through the static route.
    pub fn url_for(self, file_name: &str) -> String {
        format!("{STATIC_URL_PREFIX}/{}/{file_name}", self.dir_name())
    }
}
