//! Popup shortcut accelerators and their registration

use crate::protocol::Ack;
use crate::settings::{DEFAULT_POPUP_SHORTCUT, POPUP_SHORTCUT_KEY};
use crate::storage::{Storage, StorageError};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

lazy_static! {
    static ref FUNCTION_KEY: Regex = Regex::new(r"^F([1-9]|1[0-9]|2[0-4])$").expect("function key pattern");
}

const NAMED_KEYS: &[&str] = &[
    "Plus", "Space", "Tab", "Backspace", "Delete", "Insert", "Return", "Enter", "Up", "Down",
    "Left", "Right", "Home", "End", "PageUp", "PageDown", "Escape", "Esc", "PrintScreen",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShortcutError {
    #[error("Invalid shortcut: {0}")]
    Invalid(String),
    #[error("Shortcut already in use: {0}")]
    InUse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Modifier {
    CommandOrControl,
    Command,
    Control,
    Alt,
    AltGr,
    Shift,
    Super,
}

impl Modifier {
    fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "commandorcontrol" | "cmdorctrl" => Some(Modifier::CommandOrControl),
            "command" | "cmd" => Some(Modifier::Command),
            "control" | "ctrl" => Some(Modifier::Control),
            "alt" | "option" => Some(Modifier::Alt),
            "altgr" => Some(Modifier::AltGr),
            "shift" => Some(Modifier::Shift),
            "super" | "meta" => Some(Modifier::Super),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Modifier::CommandOrControl => "CommandOrControl",
            Modifier::Command => "Command",
            Modifier::Control => "Control",
            Modifier::Alt => "Alt",
            Modifier::AltGr => "AltGr",
            Modifier::Shift => "Shift",
            Modifier::Super => "Super",
        }
    }
}

/// A parsed `Modifier+...+Key` shortcut. Equality ignores modifier order and case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Accelerator {
    modifiers: BTreeSet<Modifier>,
    key: String,
}

impl Accelerator {
    pub fn modifiers(&self) -> impl Iterator<Item = &Modifier> {
        self.modifiers.iter()
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl FromStr for Accelerator {
    type Err = ShortcutError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ShortcutError::Invalid(raw.trim().to_string());

        let tokens: Vec<&str> = raw.split('+').map(str::trim).collect();
        let (key_token, modifier_tokens) = tokens.split_last().ok_or_else(invalid)?;

        let mut modifiers = BTreeSet::new();
        for token in modifier_tokens {
            let modifier = Modifier::parse(token).ok_or_else(invalid)?;
            if !modifiers.insert(modifier) {
                return Err(invalid());
            }
        }

        let key = normalize_key(key_token).ok_or_else(invalid)?;
        Ok(Self { modifiers, key })
    }
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in &self.modifiers {
            write!(f, "{}+", modifier.as_str())?;
        }
        write!(f, "{}", self.key)
    }
}

fn normalize_key(token: &str) -> Option<String> {
    let mut chars = token.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return (!c.is_whitespace() && !c.is_control()).then(|| c.to_uppercase().to_string());
    }

    let upper = token.to_ascii_uppercase();
    if FUNCTION_KEY.is_match(&upper) {
        return Some(upper);
    }

    NAMED_KEYS
        .iter()
        .find(|name| name.eq_ignore_ascii_case(token))
        .map(|name| name.to_string())
}

/// Binds the popup action to a global shortcut. Registration itself happens
/// outside this crate; implementations report conflicts.
pub trait ShortcutRegistrar: Send {
    /// Replace the active binding. On error the previous binding stays active.
    fn register(&mut self, accelerator: &Accelerator) -> Result<(), ShortcutError>;

    fn unregister_all(&mut self);

    fn active(&self) -> Option<&Accelerator>;
}

/// Registrar that rejects a configured set of reserved accelerators
#[derive(Debug, Default)]
pub struct ReservedShortcuts {
    reserved: Vec<Accelerator>,
    active: Option<Accelerator>,
}

impl ReservedShortcuts {
    /// Unparseable entries are skipped with a warning
    pub fn new<S: AsRef<str>>(reserved: &[S]) -> Self {
        let reserved = reserved
            .iter()
            .filter_map(|raw| match raw.as_ref().parse::<Accelerator>() {
                Ok(accelerator) => Some(accelerator),
                Err(e) => {
                    warn!("Ignoring reserved shortcut: {}", e);
                    None
                }
            })
            .collect();
        Self {
            reserved,
            active: None,
        }
    }
}

impl ShortcutRegistrar for ReservedShortcuts {
    fn register(&mut self, accelerator: &Accelerator) -> Result<(), ShortcutError> {
        if self.reserved.contains(accelerator) {
            return Err(ShortcutError::InUse(accelerator.to_string()));
        }
        self.active = Some(accelerator.clone());
        Ok(())
    }

    fn unregister_all(&mut self) {
        self.active = None;
    }

    fn active(&self) -> Option<&Accelerator> {
        self.active.as_ref()
    }
}

/// Validate, register and persist a new popup shortcut
pub fn set_popup_shortcut(
    storage: &Storage,
    registrar: &mut dyn ShortcutRegistrar,
    raw: &str,
) -> Result<Ack, StorageError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Ack::failed("Empty shortcut"));
    }

    let registered = raw
        .parse::<Accelerator>()
        .and_then(|accelerator| registrar.register(&accelerator));
    if let Err(e) = registered {
        warn!("Rejected popup shortcut: {}", e);
        return Ok(Ack::failed(e.to_string()));
    }

    storage.put_setting(POPUP_SHORTCUT_KEY, raw)?;
    info!("Popup shortcut set to {}", raw);
    Ok(Ack::ok())
}

/// Register the stored shortcut at startup, falling back to the default
pub fn restore_popup_shortcut(
    storage: &Storage,
    registrar: &mut dyn ShortcutRegistrar,
) -> Result<(), StorageError> {
    let stored = storage
        .get_setting(POPUP_SHORTCUT_KEY)?
        .unwrap_or_else(|| DEFAULT_POPUP_SHORTCUT.to_string());

    let registered = stored
        .parse::<Accelerator>()
        .and_then(|accelerator| registrar.register(&accelerator));
    match registered {
        Ok(()) => info!("Registered popup shortcut {}", stored),
        Err(e) => {
            warn!("Stored shortcut unusable ({}), falling back to default", e);
            let fallback = DEFAULT_POPUP_SHORTCUT
                .parse::<Accelerator>()
                .and_then(|accelerator| registrar.register(&accelerator));
            if let Err(e) = fallback {
                warn!("Default popup shortcut unusable: {}", e);
            }
        }
    }
    Ok(())
}
