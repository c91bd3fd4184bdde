// SPDX-License-Identifier: MPL-2.0

use crate::cache::{CacheDb, CacheError};
use rusqlite::params;
use std::collections::HashSet;

/// Per-guild sets of boss kills that were already delivered
pub struct RecordStore<'a> {
    db: &'a CacheDb,
}

impl<'a> RecordStore<'a> {
    pub fn new(db: &'a CacheDb) -> Self {
        Self { db }
    }

    #[cfg(test)]
    pub fn has_processed(&self, guild_id: &str, record_id: &str) -> Result<bool, CacheError> {
        let conn = self.db.conn();
        let mut stmt =
            conn.prepare("SELECT 1 FROM processed_records WHERE guild_id = ? AND record_id = ?")?;
        Ok(stmt.exists(params![guild_id, record_id])?)
    }

    /// Everything delivered for a guild so far
    pub fn processed_ids(&self, guild_id: &str) -> Result<HashSet<String>, CacheError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare("SELECT record_id FROM processed_records WHERE guild_id = ?")?;
        let ids = stmt
            .query_map([guild_id], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    /// Idempotent: marking a known id again is a no-op
    #[cfg(test)]
    pub fn mark_processed(&self, guild_id: &str, record_id: &str) -> Result<(), CacheError> {
        let conn = self.db.conn();
        conn.execute(
            r#"
            INSERT INTO processed_records (guild_id, record_id, processed_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(guild_id, record_id) DO NOTHING
            "#,
            params![guild_id, record_id, CacheDb::now()],
        )?;
        Ok(())
    }

    /// Commit a whole tick's deliveries in one transaction
    pub fn mark_batch(&self, entries: &[(String, String)]) -> Result<usize, CacheError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut conn = self.db.conn();
        let tx = conn.transaction()?;
        let now = CacheDb::now();
        let mut inserted = 0;

        for (guild_id, record_id) in entries {
            inserted += tx.execute(
                r#"
                INSERT INTO processed_records (guild_id, record_id, processed_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(guild_id, record_id) DO NOTHING
                "#,
                params![guild_id, record_id, now],
            )?;
        }

        tx.commit()?;
        Ok(inserted)
    }

    /// Start a guild's set, seeding it with kills that must never be announced
    /// (typically the backlog visible when the guild subscribes).
    pub fn init_guild(&self, guild_id: &str, backlog: &[String]) -> Result<(), CacheError> {
        let entries: Vec<(String, String)> = backlog
            .iter()
            .map(|id| (guild_id.to_string(), id.clone()))
            .collect();
        self.mark_batch(&entries)?;
        Ok(())
    }

    pub fn drop_guild(&self, guild_id: &str) -> Result<usize, CacheError> {
        let conn = self.db.conn();
        Ok(conn.execute("DELETE FROM processed_records WHERE guild_id = ?", [guild_id])?)
    }
}
