//! Persisted user settings: popup shortcut and color theme

use crate::storage::{Storage, StorageError};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const POPUP_SHORTCUT_KEY: &str = "popupShortcut";
pub const THEME_KEY: &str = "theme";
pub const DEFAULT_POPUP_SHORTCUT: &str = "CommandOrControl+Shift+V";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub popup_shortcut: String,
}

/// Color palette for the popup. Missing fields take the default palette.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    pub bg: String,
    pub panel: String,
    pub border: String,
    pub text: String,
    pub muted: String,
    pub danger: String,
    pub accent: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            bg: "#0f1115".to_string(),
            panel: "#151922".to_string(),
            border: "rgba(255, 255, 255, 0.12)".to_string(),
            text: "rgba(235, 242, 251, 0.95)".to_string(),
            muted: "rgba(160, 175, 195, 0.9)".to_string(),
            danger: "#ff5a5a".to_string(),
            accent: "#5aa0ff".to_string(),
        }
    }
}

impl Theme {
    /// Parse a stored palette, falling back to defaults on bad JSON
    pub fn from_json(json: &str) -> Self {
        match serde_json::from_str(json) {
            Ok(theme) => theme,
            Err(e) => {
                warn!("Stored theme is not valid JSON ({}), using defaults", e);
                Self::default()
            }
        }
    }
}

pub fn load_settings(storage: &Storage) -> Result<Settings, StorageError> {
    let popup_shortcut = storage
        .get_setting(POPUP_SHORTCUT_KEY)?
        .unwrap_or_else(|| DEFAULT_POPUP_SHORTCUT.to_string());
    Ok(Settings { popup_shortcut })
}

pub fn load_theme(storage: &Storage) -> Result<Theme, StorageError> {
    Ok(storage
        .get_setting(THEME_KEY)?
        .map(|json| Theme::from_json(&json))
        .unwrap_or_default())
}

/// Persist a palette and return it. Partial palettes are already merged over
/// the defaults by deserialization.
pub fn save_theme(storage: &Storage, theme: Theme) -> Result<Theme, StorageError> {
    storage.put_setting(THEME_KEY, &serde_json::to_string(&theme)?)?;
    Ok(theme)
}
