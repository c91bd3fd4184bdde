// SPDX-License-Identifier: MPL-2.0

//! Item tooltip markup and realm stylesheet caches.
//!
//! Both live in SQLite. An item's tooltip never changes once the armory
//! renders it. Stylesheet URLs are picked up from the first item page loaded
//! for a realm and reused until an operator clears them, so tooltips served
//! from the cache after a restart still get their styling.

use crate::cache::{CacheDb, CacheError};
use rusqlite::{OptionalExtension, params};

/// Cache operations for tooltip markup
pub struct TooltipCache<'a> {
    db: &'a CacheDb,
}

impl<'a> TooltipCache<'a> {
    pub fn new(db: &'a CacheDb) -> Self {
        Self { db }
    }

    pub fn get(&self, item_entry: u32, realm_id: u32) -> Result<Option<String>, CacheError> {
        let conn = self.db.conn();
        let markup = conn
            .query_row(
                "SELECT markup FROM tooltips WHERE item_entry = ? AND realm_id = ?",
                params![item_entry, realm_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(markup)
    }

    /// Upsert; concurrent identical writes are harmless
    pub fn store(&self, item_entry: u32, realm_id: u32, markup: &str) -> Result<(), CacheError> {
        let conn = self.db.conn();
        conn.execute(
            r#"
            INSERT INTO tooltips (item_entry, realm_id, markup, fetched_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(item_entry, realm_id) DO UPDATE SET
                markup = excluded.markup,
                fetched_at = excluded.fetched_at
            "#,
            params![item_entry, realm_id, markup, CacheDb::now()],
        )?;
        Ok(())
    }

    /// Operator reset; `None` clears every realm
    pub fn clear(&self, realm_id: Option<u32>) -> Result<usize, CacheError> {
        let conn = self.db.conn();
        let removed = match realm_id {
            Some(realm) => conn.execute("DELETE FROM tooltips WHERE realm_id = ?", [realm])?,
            None => conn.execute("DELETE FROM tooltips", [])?,
        };
        Ok(removed)
    }

    #[cfg(test)]
    pub fn count(&self) -> Result<usize, CacheError> {
        let conn = self.db.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM tooltips", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Stylesheet URLs per realm, first writer wins
pub struct StyleCache<'a> {
    db: &'a CacheDb,
}

impl<'a> StyleCache<'a> {
    pub fn new(db: &'a CacheDb) -> Self {
        Self { db }
    }

    pub fn get(&self, realm_id: u32) -> Result<Option<Vec<String>>, CacheError> {
        let conn = self.db.conn();
        let urls_json: Option<String> = conn
            .query_row(
                "SELECT urls_json FROM stylesheets WHERE realm_id = ?",
                [realm_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(urls_json
            .map(|json| serde_json::from_str(&json))
            .transpose()?)
    }

    /// Remember a realm's stylesheets unless we already know them.
    /// Empty lists are ignored so a half-loaded page can't pin an empty entry.
    pub fn remember(&self, realm_id: u32, stylesheets: &[String]) -> Result<bool, CacheError> {
        if stylesheets.is_empty() {
            return Ok(false);
        }
        let urls_json = serde_json::to_string(&dedup_in_order(stylesheets))?;

        let conn = self.db.conn();
        let inserted = conn.execute(
            r#"
            INSERT INTO stylesheets (realm_id, urls_json, fetched_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(realm_id) DO NOTHING
            "#,
            params![realm_id, urls_json, CacheDb::now()],
        )?;
        Ok(inserted > 0)
    }

    /// Operator reset; `None` clears every realm
    pub fn clear(&self, realm_id: Option<u32>) -> Result<usize, CacheError> {
        let conn = self.db.conn();
        let removed = match realm_id {
            Some(realm) => conn.execute("DELETE FROM stylesheets WHERE realm_id = ?", [realm])?,
            None => conn.execute("DELETE FROM stylesheets", [])?,
        };
        Ok(removed)
    }
}

fn dedup_in_order(urls: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(urls.len());
    for url in urls {
        if !seen.contains(url) {
            seen.push(url.clone());
        }
    }
    seen
}
