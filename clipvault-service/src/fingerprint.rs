//! Clipboard fingerprints and image dedup signatures
//!
//! Fingerprints are deliberately cheap: text is compared whole, images by the
//! hex of their leading PNG bytes plus total length. Two distinct images of
//! identical size sharing the same leading bytes alias each other; that is
//! accepted.

use std::fmt;

/// PNG payloads smaller than this produce no fingerprint (icons, placeholders)
pub const DEFAULT_MIN_PNG_BYTES: usize = 2048;
/// Leading PNG bytes hashed into an image fingerprint
pub const DEFAULT_HEAD_BYTES: usize = 64;

/// Thresholds used when sampling the clipboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintRules {
    pub min_png_bytes: usize,
    pub head_bytes: usize,
}

impl Default for FingerprintRules {
    fn default() -> Self {
        Self {
            min_png_bytes: DEFAULT_MIN_PNG_BYTES,
            head_bytes: DEFAULT_HEAD_BYTES,
        }
    }
}

/// Summary of the current clipboard content
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    /// Trimmed, non-empty text
    Text(String),
    /// Hex of the leading PNG bytes plus the PNG length
    Image { head: String, len: usize },
}

impl Fingerprint {
    /// Fingerprint clipboard text. Blank text is no signal.
    pub fn of_text(raw: &str) -> Option<Self> {
        let text = raw.trim();
        if text.is_empty() {
            None
        } else {
            Some(Fingerprint::Text(text.to_string()))
        }
    }

    /// Fingerprint an encoded PNG. Payloads under the size floor are no signal.
    pub fn of_png(png: &[u8], rules: &FingerprintRules) -> Option<Self> {
        if png.len() < rules.min_png_bytes {
            return None;
        }
        let head = &png[..png.len().min(rules.head_bytes)];
        Some(Fingerprint::Image {
            head: hex::encode(head),
            len: png.len(),
        })
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Fingerprint::Text(_))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fingerprint::Text(text) => write!(f, "t:{}", text),
            Fingerprint::Image { head, len } => write!(f, "i:{}:{}", head, len),
        }
    }
}

/// Remembers the last recorded fingerprint across polling ticks
#[derive(Debug, Default)]
pub struct FingerprintTracker {
    last: Option<Fingerprint>,
}

impl FingerprintTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `fingerprint` as last seen. Returns false if it was already current.
    pub fn observe(&mut self, fingerprint: &Fingerprint) -> bool {
        if self.last.as_ref() == Some(fingerprint) {
            return false;
        }
        self.last = Some(fingerprint.clone());
        true
    }

    pub fn last(&self) -> Option<&Fingerprint> {
        self.last.as_ref()
    }
}

/// Prefix+length signature used to spot re-copies of a recent image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSignature<'a> {
    head: &'a [u8],
    len: usize,
}

impl<'a> ImageSignature<'a> {
    pub fn of(data: &'a [u8], head_bytes: usize) -> Self {
        Self {
            head: &data[..data.len().min(head_bytes)],
            len: data.len(),
        }
    }
}
