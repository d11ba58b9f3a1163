use std::path::PathBuf;

use rusqlite::{params, Connection};

use crate::config::Config;
use crate::parser::SearchResult;

/// Saved results, keyed by URI, in the order they were favorited.
pub struct FavoritesStore {
    path: PathBuf,
}

impl FavoritesStore {
    pub fn open_default() -> anyhow::Result<Self> {
        Self::open(Config::get_config_dir().join("favorites.sqlite"))
    }

    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let store = FavoritesStore { path };
        store.connect()?.execute(
            "CREATE TABLE IF NOT EXISTS favorites (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                uri TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                thumbnail_url TEXT,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(store)
    }

    fn connect(&self) -> anyhow::Result<Connection> {
        Ok(Connection::open(&self.path)?)
    }

    pub fn list(&self) -> anyhow::Result<Vec<SearchResult>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT uri, title, thumbnail_url
             FROM favorites
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SearchResult {
                uri: row.get(0)?,
                title: row.get(1)?,
                thumbnail_url: row.get(2)?,
            })
        })?;

        let mut favorites = Vec::new();
        for r in rows {
            favorites.push(r?);
        }
        Ok(favorites)
    }

    pub fn contains(&self, uri: &str) -> anyhow::Result<bool> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT 1 FROM favorites WHERE uri = ?1")?;
        Ok(stmt.exists([uri])?)
    }

    pub fn add(&self, result: &SearchResult) -> anyhow::Result<()> {
        let conn = self.connect()?;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        conn.execute(
            "INSERT OR IGNORE INTO favorites (uri, title, thumbnail_url, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![result.uri, result.title, result.thumbnail_url, now],
        )?;
        Ok(())
    }

    pub fn remove(&self, uri: &str) -> anyhow::Result<()> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM favorites WHERE uri = ?1", params![uri])?;
        Ok(())
    }

    /// Adds `result` unless its URI is already saved, in which case it is
    /// removed. Returns whether it is now a favorite.
    pub fn toggle(&self, result: &SearchResult) -> anyhow::Result<bool> {
        if self.contains(&result.uri)? {
            self.remove(&result.uri)?;
            Ok(false)
        } else {
            self.add(result)?;
            Ok(true)
        }
    }
}
