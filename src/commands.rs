// SPDX-License-Identifier: MPL-2.0

//! Operator commands against the local store.

use crate::armory::BossKillSource;
use crate::cache::{
    CacheDb, CacheError, RecordStore, StyleCache, Subscription, SubscriptionStore, TooltipCache,
};
use crate::filter::EncounterFilter;
use anyhow::Context;
use tracing::info;

/// Bind a guild to a channel. An existing filter is kept.
pub fn subscribe(
    db: &CacheDb,
    guild_id: &str,
    channel_id: &str,
    realm_id: u32,
    external_guild_id: &str,
) -> Result<Subscription, CacheError> {
    let store = SubscriptionStore::new(db);
    let filter = store.find(guild_id)?.and_then(|s| s.filter);

    let subscription = Subscription {
        guild_id: guild_id.to_string(),
        channel_id: Some(channel_id.to_string()),
        realm_id,
        external_guild_id: external_guild_id.to_string(),
        filter,
    };
    store.upsert(&subscription)?;
    info!(guild_id, channel_id, realm_id, external_guild_id, "subscription saved");
    Ok(subscription)
}

/// Mark everything currently in the guild's feed as already announced.
pub async fn skip_backlog(
    db: &CacheDb,
    source: &dyn BossKillSource,
    subscription: &Subscription,
) -> anyhow::Result<usize> {
    let backlog: Vec<String> = source
        .latest_boss_kills(subscription.realm_id, &subscription.external_guild_id)
        .await
        .context("failed to fetch the current kill feed")?
        .into_iter()
        .map(|record| record.id)
        .collect();

    let count = backlog.len();
    let guild_id = subscription.guild_id.clone();
    crate::cache::blocking(db, move |db| RecordStore::new(db).init_guild(&guild_id, &backlog))
        .await?;
    Ok(count)
}

/// Remove the subscription and forget what was delivered for it.
pub fn unsubscribe(db: &CacheDb, guild_id: &str) -> Result<bool, CacheError> {
    let removed = SubscriptionStore::new(db).delete(guild_id)?;
    let forgotten = RecordStore::new(db).drop_guild(guild_id)?;
    info!(guild_id, removed, forgotten, "subscription removed");
    Ok(removed)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterEdit {
    Toggle { dungeon_id: u32, encounter_id: u32 },
    Set { dungeon_id: u32, encounters: Vec<u32> },
    Clear { dungeon_id: Option<u32> },
}

/// Apply one edit to a guild's stored filter and return the result.
pub fn edit_filter(
    db: &CacheDb,
    guild_id: &str,
    edit: FilterEdit,
) -> Result<EncounterFilter, CacheError> {
    let store = SubscriptionStore::new(db);
    let mut filter = store.filter(guild_id)?;

    match edit {
        FilterEdit::Toggle {
            dungeon_id,
            encounter_id,
        } => {
            let listed = filter.toggle(dungeon_id, encounter_id);
            info!(guild_id, dungeon_id, encounter_id, listed, "encounter toggled");
        }
        FilterEdit::Set {
            dungeon_id,
            encounters,
        } => filter.set_for_map(dungeon_id, encounters),
        FilterEdit::Clear { dungeon_id } => filter.clear(dungeon_id),
    }

    store.set_filter(guild_id, &filter)?;
    Ok(filter)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Cleared {
    pub tooltips: usize,
    pub stylesheets: usize,
}

/// Forget cached tooltips and stylesheets for one realm or all of them.
/// The running poller reads both from the store, so it sees this immediately.
pub fn clear_cache(db: &CacheDb, realm_id: Option<u32>) -> Result<Cleared, CacheError> {
    let cleared = Cleared {
        tooltips: TooltipCache::new(db).clear(realm_id)?,
        stylesheets: StyleCache::new(db).clear(realm_id)?,
    };
    info!(
        ?realm_id,
        tooltips = cleared.tooltips,
        stylesheets = cleared.stylesheets,
        "tooltip cache cleared"
    );
    Ok(cleared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::armory::{BossKillRecord, ClientError};
    use async_trait::async_trait;

    struct Backlog(Vec<&'static str>);

    #[async_trait]
    impl BossKillSource for Backlog {
        async fn latest_boss_kills(
            &self,
            _realm_id: u32,
            _guild: &str,
        ) -> Result<Vec<BossKillRecord>, ClientError> {
            Ok(self
                .0
                .iter()
                .map(|id| BossKillRecord {
                    id: id.to_string(),
                    guild: "Knights".to_string(),
                    boss_name: "Ignis".to_string(),
                    dungeon_id: 603,
                    encounter_id: 1,
                    attempts: 1,
                    killed_at: 0,
                    fight_length: 0,
                    players: Vec::new(),
                    loot: Vec::new(),
                })
                .collect())
        }

        async fn boss_kill_detail(
            &self,
            _realm_id: u32,
            _record_id: &str,
        ) -> Result<BossKillRecord, ClientError> {
            unreachable!("backlog never asks for details")
        }
    }

    #[test]
    fn test_resubscribe_keeps_filter() {
        let db = CacheDb::open_in_memory().unwrap();
        subscribe(&db, "g1", "c1", 7, "Knights").unwrap();
        edit_filter(
            &db,
            "g1",
            FilterEdit::Set {
                dungeon_id: 603,
                encounters: vec![2],
            },
        )
        .unwrap();

        let moved = subscribe(&db, "g1", "c2", 7, "Knights").unwrap();

        assert_eq!(moved.channel_id.as_deref(), Some("c2"));
        assert_eq!(moved.filter.unwrap().encounters(603), Some(vec![2]));
    }

    #[test]
    fn test_filter_edits_on_unknown_guild() {
        let db = CacheDb::open_in_memory().unwrap();
        let result = edit_filter(&db, "nobody", FilterEdit::Clear { dungeon_id: None });
        assert!(matches!(result, Err(CacheError::NotFound)));
    }

    #[test]
    fn test_toggle_then_clear() {
        let db = CacheDb::open_in_memory().unwrap();
        subscribe(&db, "g1", "c1", 7, "Knights").unwrap();

        let filter = edit_filter(
            &db,
            "g1",
            FilterEdit::Toggle {
                dungeon_id: 603,
                encounter_id: 2,
            },
        )
        .unwrap();
        assert!(filter.passes(603, 2));
        assert!(!filter.passes(603, 3));

        let filter = edit_filter(
            &db,
            "g1",
            FilterEdit::Clear {
                dungeon_id: Some(603),
            },
        )
        .unwrap();
        assert!(filter.is_empty());
        let stored = SubscriptionStore::new(&db).find("g1").unwrap().unwrap();
        assert_eq!(stored.filter, None);
    }

    #[test]
    fn test_unsubscribe_forgets_records() {
        let db = CacheDb::open_in_memory().unwrap();
        subscribe(&db, "g1", "c1", 7, "Knights").unwrap();
        RecordStore::new(&db).mark_processed("g1", "A101").unwrap();

        assert!(unsubscribe(&db, "g1").unwrap());
        assert!(!unsubscribe(&db, "g1").unwrap());
        assert!(!RecordStore::new(&db).has_processed("g1", "A101").unwrap());
    }

    #[test]
    fn test_clear_cache_drops_tooltips_and_stylesheets() {
        let db = CacheDb::open_in_memory().unwrap();
        TooltipCache::new(&db).store(40395, 7, "<div>Torch</div>").unwrap();
        TooltipCache::new(&db).store(40395, 8, "<div>Torch</div>").unwrap();
        StyleCache::new(&db).remember(7, &["a.css".to_string()]).unwrap();

        let cleared = clear_cache(&db, Some(7)).unwrap();

        assert_eq!(
            cleared,
            Cleared {
                tooltips: 1,
                stylesheets: 1
            }
        );
        assert_eq!(StyleCache::new(&db).get(7).unwrap(), None);
        assert!(TooltipCache::new(&db).get(40395, 8).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_skip_backlog_marks_current_feed() {
        let db = CacheDb::open_in_memory().unwrap();
        let subscription = subscribe(&db, "g1", "c1", 7, "Knights").unwrap();

        let skipped = skip_backlog(&db, &Backlog(vec!["A101", "A102"]), &subscription)
            .await
            .unwrap();

        assert_eq!(skipped, 2);
        let ids = RecordStore::new(&db).processed_ids("g1").unwrap();
        assert!(ids.contains("A101") && ids.contains("A102"));
    }
}
