//! SQLite storage for clips and settings

use crate::clip::{ClipContent, ClipItem, ClipKind};
use crate::settings::{Theme, DEFAULT_POPUP_SHORTCUT, POPUP_SHORTCUT_KEY, THEME_KEY};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

const CLIP_COLUMNS: &str = "id, kind, text, image_data, created_at, pinned, tags_json";

/// An image row as seen by the dedup scan
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub id: String,
    pub data: Vec<u8>,
}

/// SQLite storage manager
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create the database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let storage = Self { conn };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Open an in-memory database (for testing and headless runs)
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let storage = Self { conn };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Initialize database schema and first-run settings
    fn init_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS clips (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL CHECK (kind IN ('text', 'image')),
                text TEXT,
                image_data BLOB,
                created_at INTEGER NOT NULL,
                pinned INTEGER NOT NULL DEFAULT 0,
                tags_json TEXT NOT NULL DEFAULT '[]'
            );

            CREATE INDEX IF NOT EXISTS idx_clips_order ON clips(pinned DESC, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_clips_kind_created ON clips(kind, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_clips_text ON clips(text) WHERE kind = 'text';

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;

        let default_theme = serde_json::to_string(&Theme::default())?;
        self.conn.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2), (?3, ?4)",
            params![
                POPUP_SHORTCUT_KEY,
                DEFAULT_POPUP_SHORTCUT,
                THEME_KEY,
                default_theme
            ],
        )?;
        Ok(())
    }

    /// Insert a clip record as-is
    pub fn insert_clip(&self, item: &ClipItem) -> Result<(), StorageError> {
        insert_clip_row(&self.conn, item)
    }

    /// Delete `stale_id` (if any) and insert `item` in one transaction
    pub fn replace_clip(
        &mut self,
        stale_id: Option<&str>,
        item: &ClipItem,
    ) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        if let Some(stale_id) = stale_id {
            tx.execute("DELETE FROM clips WHERE id = ?1", params![stale_id])?;
        }
        insert_clip_row(&tx, item)?;
        tx.commit()?;
        Ok(())
    }

    /// Find the id of a text clip with exactly this text
    pub fn find_text_clip(&self, text: &str) -> Result<Option<String>, StorageError> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM clips WHERE kind = 'text' AND text = ?1 LIMIT 1",
                params![text],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Most recent image rows, newest first
    pub fn recent_images(&self, limit: usize) -> Result<Vec<StoredImage>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, image_data FROM clips
             WHERE kind = 'image'
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(StoredImage {
                id: row.get(0)?,
                data: row.get(1)?,
            })
        })?;

        let mut images = Vec::new();
        for row in rows {
            images.push(row?);
        }
        Ok(images)
    }

    /// Most recent clips, pinned first, then newest first
    pub fn list_clips(&self, limit: usize) -> Result<Vec<ClipItem>, StorageError> {
        let sql = format!(
            "SELECT {} FROM clips
             ORDER BY pinned DESC, created_at DESC, rowid DESC
             LIMIT ?1",
            CLIP_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], row_to_clip)?;

        let mut clips = Vec::new();
        for row in rows {
            clips.push(row?);
        }
        Ok(clips)
    }

    pub fn get_clip(&self, id: &str) -> Result<Option<ClipItem>, StorageError> {
        let sql = format!("SELECT {} FROM clips WHERE id = ?1", CLIP_COLUMNS);
        let clip = self
            .conn
            .query_row(&sql, params![id], row_to_clip)
            .optional()?;
        Ok(clip)
    }

    /// Returns whether a row was removed
    pub fn delete_clip(&self, id: &str) -> Result<bool, StorageError> {
        let removed = self
            .conn
            .execute("DELETE FROM clips WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// Returns the number of rows removed
    pub fn clear_clips(&self) -> Result<usize, StorageError> {
        Ok(self.conn.execute("DELETE FROM clips", [])?)
    }

    /// Flip the pinned flag. Returns the new state, or None if the id is unknown.
    pub fn toggle_pin(&self, id: &str) -> Result<Option<bool>, StorageError> {
        let pinned: Option<bool> = self
            .conn
            .query_row(
                "UPDATE clips SET pinned = 1 - pinned WHERE id = ?1 RETURNING pinned",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(pinned)
    }

    /// Replace the tag list. Returns whether the id exists.
    pub fn set_tags(&self, id: &str, tags: &[String]) -> Result<bool, StorageError> {
        let tags_json = serde_json::to_string(tags)?;
        let updated = self.conn.execute(
            "UPDATE clips SET tags_json = ?1 WHERE id = ?2",
            params![tags_json, id],
        )?;
        Ok(updated > 0)
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn put_setting(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Get storage statistics
    pub fn stats(&self) -> Result<StorageStats, StorageError> {
        let (clip_count, pinned_count, image_count): (i64, i64, i64) = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(pinned), 0),
                    COALESCE(SUM(kind = 'image'), 0)
             FROM clips",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(StorageStats {
            clip_count: clip_count as usize,
            pinned_count: pinned_count as usize,
            image_count: image_count as usize,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    pub clip_count: usize,
    pub pinned_count: usize,
    pub image_count: usize,
}

fn insert_clip_row(conn: &Connection, item: &ClipItem) -> Result<(), StorageError> {
    let tags_json = serde_json::to_string(&item.tags)?;
    conn.execute(
        "INSERT INTO clips (id, kind, text, image_data, created_at, pinned, tags_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            item.id,
            item.kind().as_str(),
            item.text(),
            item.image_data(),
            item.created_at,
            item.pinned,
            tags_json
        ],
    )?;
    Ok(())
}

fn row_to_clip(row: &Row<'_>) -> rusqlite::Result<ClipItem> {
    let kind: String = row.get(1)?;
    let content = match ClipKind::parse(&kind) {
        Some(ClipKind::Text) => ClipContent::Text { text: row.get(2)? },
        Some(ClipKind::Image) => ClipContent::Image {
            image_data: row.get(3)?,
        },
        None => return Err(rusqlite::Error::InvalidColumnType(1, kind, Type::Text)),
    };

    // Unreadable tag JSON reads back as no tags
    let tags_json: String = row.get(6)?;
    let tags = serde_json::from_str(&tags_json).unwrap_or_default();

    Ok(ClipItem {
        id: row.get(0)?,
        content,
        created_at: row.get(4)?,
        pinned: row.get(5)?,
        tags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text_clip(text: &str, created_at: i64) -> ClipItem {
        ClipItem {
            id: format!("id-{}", text),
            content: ClipContent::Text {
                text: text.to_string(),
            },
            created_at,
            pinned: false,
            tags: Vec::new(),
        }
    }

    fn image_clip(id: &str, data: Vec<u8>, created_at: i64) -> ClipItem {
        ClipItem {
            id: id.to_string(),
            content: ClipContent::Image { image_data: data },
            created_at,
            pinned: false,
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let storage = Storage::open_in_memory().unwrap();
        let item = text_clip("hello", 1_000);
        storage.insert_clip(&item).unwrap();

        let found = storage.get_clip(&item.id).unwrap();
        assert_eq!(found, Some(item));
        assert_eq!(storage.get_clip("missing").unwrap(), None);
    }

    #[test]
    fn test_image_blob_round_trips() {
        let storage = Storage::open_in_memory().unwrap();
        let item = image_clip("img", vec![0x89, b'P', b'N', b'G', 0, 255], 5);
        storage.insert_clip(&item).unwrap();

        let found = storage.get_clip("img").unwrap().unwrap();
        assert_eq!(found.image_data(), item.image_data());
        assert!(found.text().is_none());
    }

    #[test]
    fn test_list_orders_pinned_then_newest() {
        let storage = Storage::open_in_memory().unwrap();
        storage.insert_clip(&text_clip("old", 1)).unwrap();
        storage.insert_clip(&text_clip("mid", 2)).unwrap();
        storage.insert_clip(&text_clip("new", 3)).unwrap();
        storage.toggle_pin("id-old").unwrap();

        let order: Vec<_> = storage
            .list_clips(300)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(order, vec!["id-old", "id-new", "id-mid"]);
    }

    #[test]
    fn test_list_respects_limit() {
        let storage = Storage::open_in_memory().unwrap();
        for i in 0..5 {
            storage.insert_clip(&text_clip(&format!("t{}", i), i)).unwrap();
        }

        let clips = storage.list_clips(3).unwrap();
        assert_eq!(clips.len(), 3);
        assert_eq!(clips[0].text(), Some("t4"));
    }

    #[test]
    fn test_same_millisecond_breaks_ties_by_insertion() {
        let storage = Storage::open_in_memory().unwrap();
        storage.insert_clip(&text_clip("first", 7)).unwrap();
        storage.insert_clip(&text_clip("second", 7)).unwrap();

        let clips = storage.list_clips(10).unwrap();
        assert_eq!(clips[0].text(), Some("second"));
    }

    #[test]
    fn test_find_text_clip() {
        let storage = Storage::open_in_memory().unwrap();
        storage.insert_clip(&text_clip("hello", 1)).unwrap();

        assert_eq!(
            storage.find_text_clip("hello").unwrap(),
            Some("id-hello".to_string())
        );
        assert_eq!(storage.find_text_clip("Hello").unwrap(), None);
    }

    #[test]
    fn test_replace_clip_is_atomic_swap() {
        let mut storage = Storage::open_in_memory().unwrap();
        storage.insert_clip(&text_clip("hello", 1)).unwrap();

        let mut fresh = text_clip("hello", 2);
        fresh.id = "fresh".to_string();
        storage.replace_clip(Some("id-hello"), &fresh).unwrap();

        let clips = storage.list_clips(10).unwrap();
        assert_eq!(clips, vec![fresh]);
    }

    #[test]
    fn test_recent_images_newest_first() {
        let storage = Storage::open_in_memory().unwrap();
        storage.insert_clip(&image_clip("a", vec![1], 1)).unwrap();
        storage.insert_clip(&text_clip("noise", 2)).unwrap();
        storage.insert_clip(&image_clip("b", vec![2], 3)).unwrap();
        storage.insert_clip(&image_clip("c", vec![3], 4)).unwrap();

        let ids: Vec<_> = storage
            .recent_images(2)
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn test_toggle_pin() {
        let storage = Storage::open_in_memory().unwrap();
        storage.insert_clip(&text_clip("hello", 1)).unwrap();

        assert_eq!(storage.toggle_pin("id-hello").unwrap(), Some(true));
        assert_eq!(storage.toggle_pin("id-hello").unwrap(), Some(false));
        assert_eq!(storage.toggle_pin("missing").unwrap(), None);
    }

    #[test]
    fn test_set_tags_preserves_order() {
        let storage = Storage::open_in_memory().unwrap();
        storage.insert_clip(&text_clip("hello", 1)).unwrap();

        let tags = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        assert!(storage.set_tags("id-hello", &tags).unwrap());
        assert!(!storage.set_tags("missing", &tags).unwrap());

        let found = storage.get_clip("id-hello").unwrap().unwrap();
        assert_eq!(found.tags, tags);
    }

    #[test]
    fn test_corrupt_tags_read_as_empty() {
        let storage = Storage::open_in_memory().unwrap();
        storage.insert_clip(&text_clip("hello", 1)).unwrap();
        storage
            .conn
            .execute("UPDATE clips SET tags_json = 'nope' WHERE id = 'id-hello'", [])
            .unwrap();

        let found = storage.get_clip("id-hello").unwrap().unwrap();
        assert!(found.tags.is_empty());
    }

    #[test]
    fn test_delete_and_clear() {
        let storage = Storage::open_in_memory().unwrap();
        storage.insert_clip(&text_clip("a", 1)).unwrap();
        storage.insert_clip(&text_clip("b", 2)).unwrap();
        storage.insert_clip(&text_clip("c", 3)).unwrap();

        assert!(storage.delete_clip("id-a").unwrap());
        assert!(!storage.delete_clip("id-a").unwrap());
        assert_eq!(storage.clear_clips().unwrap(), 2);
        assert!(storage.list_clips(10).unwrap().is_empty());
    }

    #[test]
    fn test_settings_upsert() {
        let storage = Storage::open_in_memory().unwrap();
        assert_eq!(
            storage.get_setting(POPUP_SHORTCUT_KEY).unwrap().as_deref(),
            Some(DEFAULT_POPUP_SHORTCUT)
        );

        storage.put_setting(POPUP_SHORTCUT_KEY, "Alt+Space").unwrap();
        assert_eq!(
            storage.get_setting(POPUP_SHORTCUT_KEY).unwrap().as_deref(),
            Some("Alt+Space")
        );
        assert_eq!(storage.get_setting("missing").unwrap(), None);
    }

    #[test]
    fn test_stats() {
        let storage = Storage::open_in_memory().unwrap();
        storage.insert_clip(&text_clip("a", 1)).unwrap();
        storage.insert_clip(&image_clip("img", vec![1, 2], 2)).unwrap();
        storage.toggle_pin("img").unwrap();

        assert_eq!(
            storage.stats().unwrap(),
            StorageStats {
                clip_count: 2,
                pinned_count: 1,
                image_count: 1,
            }
        );
    }

    #[test]
    fn test_reopen_keeps_data_and_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("clipvault.sqlite");

        {
            let storage = Storage::open(&path).unwrap();
            storage.insert_clip(&text_clip("persisted", 1)).unwrap();
            storage.put_setting(POPUP_SHORTCUT_KEY, "Alt+V").unwrap();
        }

        let storage = Storage::open(&path).unwrap();
        assert_eq!(storage.list_clips(10).unwrap().len(), 1);
        assert_eq!(
            storage.get_setting(POPUP_SHORTCUT_KEY).unwrap().as_deref(),
            Some("Alt+V")
        );
    }
}
