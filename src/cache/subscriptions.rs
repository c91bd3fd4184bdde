// SPDX-License-Identifier: MPL-2.0

use crate::cache::{CacheDb, CacheError};
use crate::filter::EncounterFilter;
use rusqlite::{OptionalExtension, params};

/// A guild's notification binding and encounter filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub guild_id: String,
    /// Cleared when the channel stops accepting our messages
    pub channel_id: Option<String>,
    pub realm_id: u32,
    pub external_guild_id: String,
    pub filter: Option<EncounterFilter>,
}

/// Cache operations for subscriptions
pub struct SubscriptionStore<'a> {
    db: &'a CacheDb,
}

impl<'a> SubscriptionStore<'a> {
    pub fn new(db: &'a CacheDb) -> Self {
        Self { db }
    }

    pub fn find(&self, guild_id: &str) -> Result<Option<Subscription>, CacheError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT guild_id, channel_id, realm_id, external_guild_id, filter_json
            FROM subscriptions
            WHERE guild_id = ?
            "#,
        )?;

        let row = stmt.query_row([guild_id], Self::read_row).optional()?;
        row.map(Self::into_subscription).transpose()
    }

    pub fn list(&self) -> Result<Vec<Subscription>, CacheError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT guild_id, channel_id, realm_id, external_guild_id, filter_json
            FROM subscriptions
            ORDER BY guild_id
            "#,
        )?;

        let mut rows = stmt.query([])?;
        let mut subscriptions = Vec::new();
        while let Some(row) = rows.next()? {
            subscriptions.push(Self::into_subscription(Self::read_row(row)?)?);
        }
        Ok(subscriptions)
    }

    /// Insert or replace a subscription (upserts)
    pub fn upsert(&self, subscription: &Subscription) -> Result<(), CacheError> {
        let conn = self.db.conn();
        let filter_json = subscription
            .filter
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            r#"
            INSERT INTO subscriptions (
                guild_id, channel_id, realm_id, external_guild_id, filter_json, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(guild_id) DO UPDATE SET
                channel_id = excluded.channel_id,
                realm_id = excluded.realm_id,
                external_guild_id = excluded.external_guild_id,
                filter_json = excluded.filter_json,
                updated_at = excluded.updated_at
            "#,
            params![
                subscription.guild_id,
                subscription.channel_id,
                subscription.realm_id,
                subscription.external_guild_id,
                filter_json,
                CacheDb::now(),
            ],
        )?;

        Ok(())
    }

    pub fn delete(&self, guild_id: &str) -> Result<bool, CacheError> {
        let conn = self.db.conn();
        let removed = conn.execute("DELETE FROM subscriptions WHERE guild_id = ?", [guild_id])?;
        Ok(removed > 0)
    }

    /// Unbind the channel, but only if it is still the one that failed
    pub fn clear_channel(&self, guild_id: &str, channel_id: &str) -> Result<bool, CacheError> {
        let conn = self.db.conn();
        let updated = conn.execute(
            r#"
            UPDATE subscriptions
            SET channel_id = NULL, updated_at = ?1
            WHERE guild_id = ?2 AND channel_id = ?3
            "#,
            params![CacheDb::now(), guild_id, channel_id],
        )?;
        Ok(updated > 0)
    }

    /// The guild's filter; `NotFound` when the guild has no subscription
    pub fn filter(&self, guild_id: &str) -> Result<EncounterFilter, CacheError> {
        let subscription = self.find(guild_id)?.ok_or(CacheError::NotFound)?;
        Ok(subscription.filter.unwrap_or_default())
    }

    /// Store a filter, collapsing an empty one to "no filter"
    pub fn set_filter(&self, guild_id: &str, filter: &EncounterFilter) -> Result<(), CacheError> {
        let filter_json = if filter.is_empty() {
            None
        } else {
            Some(serde_json::to_string(filter)?)
        };

        let conn = self.db.conn();
        let updated = conn.execute(
            "UPDATE subscriptions SET filter_json = ?1, updated_at = ?2 WHERE guild_id = ?3",
            params![filter_json, CacheDb::now(), guild_id],
        )?;

        if updated == 0 {
            return Err(CacheError::NotFound);
        }
        Ok(())
    }

    fn read_row(row: &rusqlite::Row) -> Result<RawSubscription, rusqlite::Error> {
        Ok(RawSubscription {
            guild_id: row.get(0)?,
            channel_id: row.get(1)?,
            realm_id: row.get(2)?,
            external_guild_id: row.get(3)?,
            filter_json: row.get(4)?,
        })
    }

    fn into_subscription(raw: RawSubscription) -> Result<Subscription, CacheError> {
        let filter = raw
            .filter_json
            .as_deref()
            .map(serde_json::from_str::<EncounterFilter>)
            .transpose()?
            .filter(|f| !f.is_empty());

        Ok(Subscription {
            guild_id: raw.guild_id,
            channel_id: raw.channel_id,
            realm_id: raw.realm_id,
            external_guild_id: raw.external_guild_id,
            filter,
        })
    }
}

struct RawSubscription {
    guild_id: String,
    channel_id: Option<String>,
    realm_id: u32,
    external_guild_id: String,
    filter_json: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(guild_id: &str) -> Subscription {
        Subscription {
            guild_id: guild_id.to_string(),
            channel_id: Some("chan-1".to_string()),
            realm_id: 7,
            external_guild_id: "Knights".to_string(),
            filter: None,
        }
    }

    #[test]
    fn test_upsert_then_find() {
        let db = CacheDb::open_in_memory().unwrap();
        let store = SubscriptionStore::new(&db);

        store.upsert(&subscription("g1")).unwrap();
        let mut changed = subscription("g1");
        changed.realm_id = 9;
        store.upsert(&changed).unwrap();

        assert_eq!(store.find("g1").unwrap(), Some(changed));
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_filter_of_unknown_guild_is_not_found() {
        let db = CacheDb::open_in_memory().unwrap();
        let store = SubscriptionStore::new(&db);

        assert!(matches!(store.filter("nope"), Err(CacheError::NotFound)));
        assert!(matches!(
            store.set_filter("nope", &EncounterFilter::new()),
            Err(CacheError::NotFound)
        ));
    }

    #[test]
    fn test_set_filter_roundtrip_and_empty_collapses() {
        let db = CacheDb::open_in_memory().unwrap();
        let store = SubscriptionStore::new(&db);
        store.upsert(&subscription("g1")).unwrap();

        let mut filter = EncounterFilter::new();
        filter.set_for_map(603, []);
        store.set_filter("g1", &filter).unwrap();
        assert_eq!(store.find("g1").unwrap().unwrap().filter, Some(filter));

        store.set_filter("g1", &EncounterFilter::new()).unwrap();
        assert_eq!(store.find("g1").unwrap().unwrap().filter, None);
    }

    #[test]
    fn test_clear_channel_only_matches_current_binding() {
        let db = CacheDb::open_in_memory().unwrap();
        let store = SubscriptionStore::new(&db);
        store.upsert(&subscription("g1")).unwrap();

        assert!(!store.clear_channel("g1", "other-chan").unwrap());
        assert!(store.clear_channel("g1", "chan-1").unwrap());
        assert_eq!(store.find("g1").unwrap().unwrap().channel_id, None);
    }

    #[test]
    fn test_delete() {
        let db = CacheDb::open_in_memory().unwrap();
        let store = SubscriptionStore::new(&db);
        store.upsert(&subscription("g1")).unwrap();

        assert!(store.delete("g1").unwrap());
        assert!(!store.delete("g1").unwrap());
        assert_eq!(store.find("g1").unwrap(), None);
    }
}
