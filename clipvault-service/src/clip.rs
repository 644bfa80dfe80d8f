//! Clip record types

use serde::{Deserialize, Serialize};

/// Variant tag of a clip record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipKind {
    Text,
    Image,
}

impl ClipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipKind::Text => "text",
            ClipKind::Image => "image",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(ClipKind::Text),
            "image" => Some(ClipKind::Image),
            _ => None,
        }
    }
}

/// Content of a clip. Exactly one payload exists and it always matches `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ClipContent {
    Text {
        text: String,
    },
    Image {
        /// PNG bytes, base64 on the wire
        #[serde(rename = "imageData", with = "base64_png")]
        image_data: Vec<u8>,
    },
}

impl ClipContent {
    pub fn kind(&self) -> ClipKind {
        match self {
            ClipContent::Text { .. } => ClipKind::Text,
            ClipContent::Image { .. } => ClipKind::Image,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ClipContent::Text { text } => Some(text),
            ClipContent::Image { .. } => None,
        }
    }

    pub fn image_data(&self) -> Option<&[u8]> {
        match self {
            ClipContent::Text { .. } => None,
            ClipContent::Image { image_data } => Some(image_data),
        }
    }
}

/// A single history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipItem {
    pub id: String,
    #[serde(flatten)]
    pub content: ClipContent,
    /// Epoch milliseconds, set once at creation
    pub created_at: i64,
    pub pinned: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ClipItem {
    /// Build a fresh, unpinned, untagged record stamped with the current time
    pub fn new(content: ClipContent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content,
            created_at: chrono::Utc::now().timestamp_millis(),
            pinned: false,
            tags: Vec::new(),
        }
    }

    pub fn kind(&self) -> ClipKind {
        self.content.kind()
    }

    pub fn text(&self) -> Option<&str> {
        self.content.text()
    }

    pub fn image_data(&self) -> Option<&[u8]> {
        self.content.image_data()
    }
}

/// Base64 (de)serialization for PNG payloads.
/// Accepts a bare base64 string or a `data:image/...;base64,` URL.
mod base64_png {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let payload = match encoded.split_once(";base64,") {
            Some((scheme, data)) if scheme.starts_with("data:") => data,
            _ => encoded.as_str(),
        };
        STANDARD
            .decode(payload.trim())
            .map_err(serde::de::Error::custom)
    }
}
