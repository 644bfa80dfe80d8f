//! History service: the single writer over clip storage
//!
//! Enforces insert-time rules (trimming, text bump, image size floor and
//! recent-image dedup), answers history queries, and pushes the refreshed
//! history to observers after every mutation.

use crate::clip::{ClipContent, ClipItem, ClipKind};
use crate::fingerprint::ImageSignature;
use crate::storage::{Storage, StorageError, StorageStats};
use image::ImageFormat;
use tracing::{debug, error, info};

/// Receives the unfiltered history after each successful mutation
pub trait HistoryObserver: Send {
    fn history_updated(&self, items: &[ClipItem]);
}

/// Query and insert limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    /// Most recent records considered by a query
    pub query_limit: usize,
    /// Recent image records scanned for a duplicate
    pub image_dedup_window: usize,
    /// Smallest PNG accepted by `insert_image`
    pub min_image_bytes: usize,
    /// Leading bytes compared by the image dedup signature
    pub image_signature_head_bytes: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            query_limit: 300,
            image_dedup_window: 40,
            min_image_bytes: 3000,
            image_signature_head_bytes: 72,
        }
    }
}

/// Result of an insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New content, nothing replaced
    Created(ClipItem),
    /// Duplicate content: the older record was removed and a fresh one inserted
    Bumped { item: ClipItem, replaced: String },
    /// Input rejected
    Skipped(&'static str),
}

impl InsertOutcome {
    pub fn item(&self) -> Option<&ClipItem> {
        match self {
            InsertOutcome::Created(item) | InsertOutcome::Bumped { item, .. } => Some(item),
            InsertOutcome::Skipped(_) => None,
        }
    }
}

pub struct HistoryService {
    storage: Storage,
    limits: HistoryLimits,
    observers: Vec<Box<dyn HistoryObserver>>,
}

impl HistoryService {
    pub fn new(storage: Storage, limits: HistoryLimits) -> Self {
        Self {
            storage,
            limits,
            observers: Vec::new(),
        }
    }

    pub fn with_defaults(storage: Storage) -> Self {
        Self::new(storage, HistoryLimits::default())
    }

    pub fn subscribe(&mut self, observer: Box<dyn HistoryObserver>) {
        self.observers.push(observer);
    }

    /// Settings share the same database file
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn limits(&self) -> &HistoryLimits {
        &self.limits
    }

    /// Record text. Identical text already in history is bumped to the top.
    pub fn insert_text(&mut self, text: &str) -> Result<InsertOutcome, StorageError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(InsertOutcome::Skipped("Empty text"));
        }

        let stale = self.storage.find_text_clip(text)?;
        let item = ClipItem::new(ClipContent::Text {
            text: text.to_string(),
        });
        self.storage.replace_clip(stale.as_deref(), &item)?;

        debug!("Recorded text clip {} ({} chars)", item.id, text.chars().count());
        let outcome = match stale {
            Some(replaced) => InsertOutcome::Bumped { item, replaced },
            None => InsertOutcome::Created(item),
        };
        self.notify();
        Ok(outcome)
    }

    /// Record a PNG image. Small or non-PNG payloads are rejected; a matching
    /// image among the recent ones is replaced.
    pub fn insert_image(&mut self, png: Vec<u8>) -> Result<InsertOutcome, StorageError> {
        if !matches!(image::guess_format(&png), Ok(ImageFormat::Png)) {
            return Ok(InsertOutcome::Skipped("Not a PNG image"));
        }
        if png.len() < self.limits.min_image_bytes {
            return Ok(InsertOutcome::Skipped("Image too small"));
        }

        let head_bytes = self.limits.image_signature_head_bytes;
        let signature = ImageSignature::of(&png, head_bytes);
        let stale = self
            .storage
            .recent_images(self.limits.image_dedup_window)?
            .into_iter()
            .find(|stored| ImageSignature::of(&stored.data, head_bytes) == signature)
            .map(|stored| stored.id);

        let size = png.len();
        let item = ClipItem::new(ClipContent::Image { image_data: png });
        self.storage.replace_clip(stale.as_deref(), &item)?;

        debug!("Recorded image clip {} ({} bytes)", item.id, size);
        let outcome = match stale {
            Some(replaced) => InsertOutcome::Bumped { item, replaced },
            None => InsertOutcome::Created(item),
        };
        self.notify();
        Ok(outcome)
    }

    /// Up to `query_limit` most recent records, pinned first then newest first.
    /// A non-empty search keeps records whose text or comma-joined tags contain
    /// it (case-insensitive); the search `image` also keeps every image.
    pub fn query(&self, search: &str) -> Result<Vec<ClipItem>, StorageError> {
        let items = self.storage.list_clips(self.limits.query_limit)?;

        let needle = search.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(items);
        }

        Ok(items
            .into_iter()
            .filter(|item| matches_search(item, &needle))
            .collect())
    }

    pub fn delete(&mut self, id: &str) -> Result<bool, StorageError> {
        let removed = self.storage.delete_clip(id)?;
        self.notify();
        Ok(removed)
    }

    pub fn clear_all(&mut self) -> Result<usize, StorageError> {
        let removed = self.storage.clear_clips()?;
        info!("Cleared {} clips", removed);
        self.notify();
        Ok(removed)
    }

    /// Returns the new pinned state, or None for an unknown id
    pub fn toggle_pin(&mut self, id: &str) -> Result<Option<bool>, StorageError> {
        let pinned = self.storage.toggle_pin(id)?;
        self.notify();
        Ok(pinned)
    }

    pub fn set_tags(&mut self, id: &str, tags: &[String]) -> Result<bool, StorageError> {
        let updated = self.storage.set_tags(id, tags)?;
        self.notify();
        Ok(updated)
    }

    pub fn stats(&self) -> Result<StorageStats, StorageError> {
        self.storage.stats()
    }

    fn notify(&self) {
        if self.observers.is_empty() {
            return;
        }
        match self.query("") {
            Ok(items) => {
                for observer in &self.observers {
                    observer.history_updated(&items);
                }
            }
            Err(e) => error!("Failed to refresh history for observers: {}", e),
        }
    }
}

fn matches_search(item: &ClipItem, needle: &str) -> bool {
    if item.kind() == ClipKind::Image && needle == "image" {
        return true;
    }
    let text_hit = item
        .text()
        .map(|text| text.to_lowercase().contains(needle))
        .unwrap_or(false);
    text_hit || item.tags.join(",").to_lowercase().contains(needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};

    /// PNG magic followed by `seed` filler, so distinct seeds give distinct prefixes
    fn fake_png(len: usize, seed: u8) -> Vec<u8> {
        let mut data = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
        data.resize(len, seed);
        data
    }

    fn service() -> HistoryService {
        HistoryService::with_defaults(Storage::open_in_memory().unwrap())
    }

    #[derive(Clone, Default)]
    struct Recorder {
        pushes: Arc<Mutex<Vec<usize>>>,
    }

    impl HistoryObserver for Recorder {
        fn history_updated(&self, items: &[ClipItem]) {
            self.pushes.lock().unwrap().push(items.len());
        }
    }

    #[test]
    fn test_insert_text_trims_and_skips_empty() {
        let mut history = service();

        assert_eq!(
            history.insert_text("   ").unwrap(),
            InsertOutcome::Skipped("Empty text")
        );

        let outcome = history.insert_text("  hello  ").unwrap();
        assert!(matches!(outcome, InsertOutcome::Created(_)));
        assert_eq!(outcome.item().unwrap().text(), Some("hello"));
    }

    #[test]
    fn test_duplicate_text_is_bumped() {
        let mut history = service();

        let first = history.insert_text("hello").unwrap();
        history.insert_text("other").unwrap();
        let second = history.insert_text("hello").unwrap();

        let first_id = first.item().unwrap().id.clone();
        match &second {
            InsertOutcome::Bumped { replaced, .. } => assert_eq!(replaced, &first_id),
            other => panic!("expected bump, got {:?}", other),
        }

        let items = history.query("").unwrap();
        let hellos: Vec<_> = items
            .iter()
            .filter(|c| c.text() == Some("hello"))
            .collect();
        assert_eq!(hellos.len(), 1);
        assert_eq!(hellos[0], second.item().unwrap());
        assert_eq!(items[0].text(), Some("hello"));
        assert!(hellos[0].created_at >= first.item().unwrap().created_at);
    }

    #[test]
    fn test_image_below_floor_is_rejected() {
        let mut history = service();

        assert_eq!(
            history.insert_image(fake_png(2999, 1)).unwrap(),
            InsertOutcome::Skipped("Image too small")
        );
        assert!(matches!(
            history.insert_image(fake_png(3000, 1)).unwrap(),
            InsertOutcome::Created(_)
        ));
    }

    #[test]
    fn test_non_png_is_rejected() {
        let mut history = service();
        let jpeg_ish = vec![0xff; 4000];

        assert_eq!(
            history.insert_image(jpeg_ish).unwrap(),
            InsertOutcome::Skipped("Not a PNG image")
        );
        assert!(history.query("").unwrap().is_empty());
    }

    #[test]
    fn test_recent_duplicate_image_is_replaced() {
        let mut history = service();

        let first = history.insert_image(fake_png(3500, 7)).unwrap();
        history.insert_image(fake_png(3500, 8)).unwrap();
        let again = history.insert_image(fake_png(3500, 7)).unwrap();

        assert_eq!(
            again,
            InsertOutcome::Bumped {
                item: again.item().unwrap().clone(),
                replaced: first.item().unwrap().id.clone(),
            }
        );
        assert_eq!(history.query("").unwrap().len(), 2);
    }

    #[test]
    fn test_image_dedup_only_scans_window() {
        let storage = Storage::open_in_memory().unwrap();
        let limits = HistoryLimits {
            image_dedup_window: 1,
            ..HistoryLimits::default()
        };
        let mut history = HistoryService::new(storage, limits);

        history.insert_image(fake_png(3500, 1)).unwrap();
        history.insert_image(fake_png(3500, 2)).unwrap();
        let outcome = history.insert_image(fake_png(3500, 1)).unwrap();

        assert!(matches!(outcome, InsertOutcome::Created(_)));
        assert_eq!(history.query("").unwrap().len(), 3);
    }

    #[test]
    fn test_text_image_text_scenario() {
        let mut history = service();

        history.insert_text("foo").unwrap();
        let image = history.insert_image(fake_png(3500, 42)).unwrap();
        let foo = history.insert_text("foo").unwrap();

        let items = history.query("").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(&items[0], foo.item().unwrap());
        assert_eq!(&items[1], image.item().unwrap());
    }

    #[test]
    fn test_search_by_text_and_tags() {
        let mut history = service();
        history.insert_text("Hello World").unwrap();
        let tagged = history.insert_text("unrelated").unwrap();
        let tagged_id = tagged.item().unwrap().id.clone();
        history
            .set_tags(&tagged_id, &["Work".to_string(), "urgent".to_string()])
            .unwrap();

        let hits = history.query("world").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text(), Some("Hello World"));

        let hits = history.query("WORK").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, tagged_id);

        // joined tags match across the separator
        assert_eq!(history.query("work,urg").unwrap().len(), 1);
        assert!(history.query("nothing").unwrap().is_empty());
    }

    #[test]
    fn test_search_image_returns_only_images() {
        let mut history = service();
        history.insert_text("text mentioning nothing").unwrap();
        history.insert_text("another").unwrap();
        history.insert_image(fake_png(3500, 1)).unwrap();
        history.insert_image(fake_png(3600, 2)).unwrap();

        let hits = history.query("image").unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|c| c.kind() == ClipKind::Image));
    }

    #[test]
    fn test_tags_round_trip_in_order() {
        let mut history = service();
        let outcome = history.insert_text("hello").unwrap();
        let id = outcome.item().unwrap().id.clone();

        assert!(history
            .set_tags(&id, &["a".to_string(), "b".to_string()])
            .unwrap());

        let items = history.query("").unwrap();
        assert_eq!(items[0].tags, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_pin_moves_to_front() {
        let mut history = service();
        let old = history.insert_text("old").unwrap();
        history.insert_text("new").unwrap();

        let old_id = old.item().unwrap().id.clone();
        assert_eq!(history.toggle_pin(&old_id).unwrap(), Some(true));

        let items = history.query("").unwrap();
        assert_eq!(items[0].id, old_id);
        assert!(items[0].pinned);
    }

    #[test]
    fn test_observers_receive_every_mutation() {
        let mut history = service();
        let recorder = Recorder::default();
        history.subscribe(Box::new(recorder.clone()));

        let a = history.insert_text("a").unwrap();
        history.insert_text("b").unwrap();
        history.insert_text("   ").unwrap();
        let id = a.item().unwrap().id.clone();
        history.toggle_pin(&id).unwrap();
        history.set_tags(&id, &["x".to_string()]).unwrap();
        history.delete(&id).unwrap();
        history.clear_all().unwrap();

        // the skipped insert does not notify
        assert_eq!(*recorder.pushes.lock().unwrap(), vec![1, 2, 2, 2, 1, 0]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Pinned records come first; within each group newer records come first.
        #[test]
        fn property_history_ordering(pins in proptest::collection::vec(any::<bool>(), 1..30)) {
            let storage = Storage::open_in_memory().unwrap();
            for (i, pinned) in pins.iter().enumerate() {
                storage.insert_clip(&ClipItem {
                    id: format!("clip-{}", i),
                    content: ClipContent::Text { text: format!("text {}", i) },
                    created_at: 1_000 + i as i64,
                    pinned: *pinned,
                    tags: Vec::new(),
                }).unwrap();
            }
            let history = HistoryService::with_defaults(storage);

            let items = history.query("").unwrap();
            prop_assert_eq!(items.len(), pins.len());
            for pair in items.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                prop_assert!(a.pinned >= b.pinned);
                if a.pinned == b.pinned {
                    prop_assert!(a.created_at > b.created_at);
                }
            }
        }

        /// A search returns exactly the records whose text contains the needle.
        #[test]
        fn property_search_results_match(words in proptest::collection::vec("[a-c]{1,3}", 1..12), needle in "[a-c]{1,2}") {
            let mut history = service();
            for word in &words {
                history.insert_text(word).unwrap();
            }

            let hits = history.query(&needle).unwrap();
            for item in &hits {
                let text = item.text().unwrap_or_default().to_lowercase();
                prop_assert!(text.contains(&needle));
            }

            // re-copied words are bumped, so each distinct word is stored once
            let distinct: std::collections::BTreeSet<&str> = words.iter().map(String::as_str).collect();
            let expected = distinct.iter().filter(|word| word.contains(needle.as_str())).count();
            prop_assert_eq!(hits.len(), expected);
        }
    }
}
