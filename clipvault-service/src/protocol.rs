//! Request/response types exchanged with the presentation shell

use crate::clip::{ClipContent, ClipItem};
use crate::settings::{Settings, Theme};
use serde::{Deserialize, Serialize};

/// Request received from a client, one JSON object per line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    GetHistory {
        #[serde(default)]
        query: String,
    },
    SetClipboard {
        content: ClipContent,
    },
    DeleteClip {
        id: String,
    },
    ClearAll,
    TogglePin {
        id: String,
    },
    SetTags {
        id: String,
        #[serde(default)]
        tags: Vec<String>,
    },
    GetSettings,
    SetPopupShortcut {
        #[serde(default)]
        accelerator: String,
    },
    GetTheme,
    SetTheme {
        #[serde(default)]
        theme: Theme,
    },
    /// Stream `history_updated` pushes on this connection
    Subscribe,
}

/// Response sent back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    History { items: Vec<ClipItem> },
    HistoryUpdated { items: Vec<ClipItem> },
    Ack(Ack),
    Settings(Settings),
    Theme(Theme),
    Error { message: String },
}

impl Response {
    pub fn error(message: &str) -> Self {
        Response::Error {
            message: message.to_string(),
        }
    }
}

/// Success flag plus an optional failure reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
        }
    }
}
