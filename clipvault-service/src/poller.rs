//! Clipboard polling
//!
//! Each tick samples the clipboard, compares the fingerprint with the last one
//! recorded, and records changed content through the history service.

use crate::clip::ClipItem;
use crate::clipboard::ClipboardSource;
use crate::fingerprint::{Fingerprint, FingerprintRules, FingerprintTracker};
use crate::history::{HistoryService, InsertOutcome};
use tracing::{debug, error, trace, warn};

/// What a single polling tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Clipboard empty, blank, unreadable, or holding only a tiny image
    NoSignal,
    /// Same content as the last recorded tick
    Unchanged,
    Recorded(ClipItem),
    /// Fingerprint changed but the history service rejected the content
    Skipped(&'static str),
    /// Storage failed; the tick is abandoned
    Failed,
}

pub struct ClipboardPoller {
    source: Box<dyn ClipboardSource>,
    tracker: FingerprintTracker,
    rules: FingerprintRules,
}

impl ClipboardPoller {
    pub fn new(source: Box<dyn ClipboardSource>, rules: FingerprintRules) -> Self {
        Self {
            source,
            tracker: FingerprintTracker::new(),
            rules,
        }
    }

    /// Writes to the clipboard go through the same source the poller reads
    pub fn source_mut(&mut self) -> &mut dyn ClipboardSource {
        self.source.as_mut()
    }

    pub fn last_fingerprint(&self) -> Option<&Fingerprint> {
        self.tracker.last()
    }

    /// Fingerprint the current clipboard content. Text wins over images.
    pub fn sample(&mut self) -> Option<Fingerprint> {
        match self.source.read_text() {
            Ok(Some(text)) => {
                if let Some(fp) = Fingerprint::of_text(&text) {
                    return Some(fp);
                }
            }
            Ok(None) => {}
            Err(e) => trace!("Clipboard text unreadable: {}", e),
        }

        match self.source.read_png() {
            Ok(Some(png)) => Fingerprint::of_png(&png, &self.rules),
            Ok(None) => None,
            Err(e) => {
                trace!("Clipboard image unreadable: {}", e);
                None
            }
        }
    }

    /// Sample once and record changed content
    pub fn tick(&mut self, history: &mut HistoryService) -> TickOutcome {
        let Some(fingerprint) = self.sample() else {
            return TickOutcome::NoSignal;
        };
        if !self.tracker.observe(&fingerprint) {
            return TickOutcome::Unchanged;
        }

        let inserted = match &fingerprint {
            Fingerprint::Text(text) => history.insert_text(text),
            // The re-read is held to the sampling floor only; the stricter
            // insert floor is enforced by `insert_image`.
            Fingerprint::Image { .. } => match self.source.read_png() {
                Ok(Some(png)) if png.len() >= self.rules.min_png_bytes => {
                    history.insert_image(png)
                }
                Ok(_) => {
                    debug!("Clipboard image vanished before it could be recorded");
                    return TickOutcome::NoSignal;
                }
                Err(e) => {
                    warn!("Failed to re-read clipboard image: {}", e);
                    return TickOutcome::NoSignal;
                }
            },
        };

        match inserted {
            Ok(InsertOutcome::Created(item)) | Ok(InsertOutcome::Bumped { item, .. }) => {
                debug!("Recorded clipboard change {}", item.id);
                TickOutcome::Recorded(item)
            }
            Ok(InsertOutcome::Skipped(reason)) => {
                debug!("Clipboard change not recorded: {}", reason);
                TickOutcome::Skipped(reason)
            }
            Err(e) => {
                error!("Failed to record clipboard change: {}", e);
                TickOutcome::Failed
            }
        }
    }
}
