// SPDX-License-Identifier: MPL-2.0

//! The poll loop.
//!
//! Each tick reads the subscriptions and their delivered-record sets, pulls
//! the latest kills for every tracked guild, and runs every subscription
//! concurrently: filter, dedup, detail fetch, leaderboards, loot image,
//! delivery. Record ids are committed in one batch after the fan-out and only
//! for deliveries that succeeded, so anything that failed is simply picked up
//! again next tick.

use crate::armory::{BossKillRecord, BossKillSource, ClientError};
use crate::cache::{CacheDb, CacheError, RecordStore, Subscription, SubscriptionStore, blocking};
use crate::filter;
use crate::leaderboard::{self, Role};
use crate::notify::{Delivery, DeliveryError, DeliveryOutcome, assemble};
use crate::render::RenderQueue;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
enum PipelineError {
    #[error("detail fetch failed: {0}")]
    Detail(#[from] ClientError),
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}

type FeedKey = (u32, String);

/// Counters for one tick, mostly for logging
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub subscriptions: usize,
    pub feed_errors: usize,
    pub delivered: usize,
    pub failed: usize,
    pub unbound: usize,
}

#[derive(Default)]
struct SubscriptionOutcome {
    delivered: Vec<String>,
    failed: usize,
    unbound: bool,
}

pub struct Poller {
    source: Arc<dyn BossKillSource>,
    delivery: Arc<dyn Delivery>,
    renders: RenderQueue,
    db: CacheDb,
}

impl Poller {
    pub fn new(
        source: Arc<dyn BossKillSource>,
        delivery: Arc<dyn Delivery>,
        renders: RenderQueue,
        db: CacheDb,
    ) -> Self {
        Self {
            source,
            delivery,
            renders,
            db,
        }
    }

    /// Tick every `interval` until `shutdown` resolves. The first tick is immediate.
    pub async fn run(&self, interval: Duration, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(interval_secs = interval.as_secs(), "poller started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => match self.tick().await {
                    Ok(report) => info!(
                        subscriptions = report.subscriptions,
                        delivered = report.delivered,
                        failed = report.failed,
                        unbound = report.unbound,
                        feed_errors = report.feed_errors,
                        "tick finished"
                    ),
                    Err(e) => error!(error = %e, "tick aborted"),
                },
            }
        }
        info!("poller stopped");
    }

    /// One poll cycle. Errors only come from the store; upstream and delivery
    /// problems are logged and counted.
    pub async fn tick(&self) -> Result<TickReport, CacheError> {
        let subscriptions: Vec<Subscription> =
            blocking(&self.db, |db| SubscriptionStore::new(db).list())
                .await?
                .into_iter()
                .filter(|s| s.channel_id.is_some())
                .collect();

        let mut report = TickReport {
            subscriptions: subscriptions.len(),
            ..TickReport::default()
        };
        if subscriptions.is_empty() {
            return Ok(report);
        }

        let guild_ids: Vec<String> = subscriptions.iter().map(|s| s.guild_id.clone()).collect();
        let processed: HashMap<String, HashSet<String>> = blocking(&self.db, move |db| {
            let store = RecordStore::new(db);
            guild_ids
                .into_iter()
                .map(|guild| store.processed_ids(&guild).map(|ids| (guild, ids)))
                .collect()
        })
        .await?;

        let feeds = self.fetch_feeds(&subscriptions).await;
        let wanted: HashSet<FeedKey> = subscriptions.iter().map(feed_key).collect();
        report.feed_errors = wanted.len() - feeds.len();

        let outcomes = join_all(subscriptions.iter().map(|subscription| {
            let feed = feeds.get(&feed_key(subscription));
            let done = processed.get(&subscription.guild_id);
            self.process_subscription(subscription, feed, done)
        }))
        .await;

        let mut entries = Vec::new();
        for (subscription, outcome) in subscriptions.iter().zip(outcomes) {
            report.delivered += outcome.delivered.len();
            report.failed += outcome.failed;
            report.unbound += usize::from(outcome.unbound);
            entries.extend(
                outcome
                    .delivered
                    .into_iter()
                    .map(|id| (subscription.guild_id.clone(), id)),
            );
        }

        // The one write of the tick
        let committed = blocking(&self.db, move |db| RecordStore::new(db).mark_batch(&entries))
            .await
            .inspect_err(|e| {
                error!(error = %e, "failed to commit delivered records, they will repeat")
            })?;
        debug!(committed, "processed records committed");

        Ok(report)
    }

    /// Latest kills per (realm, guild), fetched once even if several
    /// subscriptions track the same guild. Failed feeds are left out.
    async fn fetch_feeds(
        &self,
        subscriptions: &[Subscription],
    ) -> HashMap<FeedKey, Vec<BossKillRecord>> {
        let keys: HashSet<FeedKey> = subscriptions.iter().map(feed_key).collect();

        let fetched = join_all(keys.into_iter().map(|(realm_id, guild)| async move {
            let feed = self.source.latest_boss_kills(realm_id, &guild).await;
            ((realm_id, guild), feed)
        }))
        .await;

        fetched
            .into_iter()
            .filter_map(|((realm_id, guild), feed)| match feed {
                Ok(records) => Some(((realm_id, guild), records)),
                Err(e) => {
                    warn!(realm_id, guild = %guild, error = %e, "feed fetch failed, skipping guild this tick");
                    None
                }
            })
            .collect()
    }

    async fn process_subscription(
        &self,
        subscription: &Subscription,
        feed: Option<&Vec<BossKillRecord>>,
        processed: Option<&HashSet<String>>,
    ) -> SubscriptionOutcome {
        let mut outcome = SubscriptionOutcome::default();
        let (Some(channel_id), Some(feed)) = (subscription.channel_id.as_deref(), feed) else {
            return outcome;
        };

        let mut seen = HashSet::new();
        // Feed is newest first; announce in the order the kills happened
        for record in feed.iter().rev() {
            if !seen.insert(record.id.as_str()) {
                continue;
            }
            if !filter::passes(
                subscription.filter.as_ref(),
                record.dungeon_id,
                record.encounter_id,
            ) {
                continue;
            }
            if processed.is_some_and(|ids| ids.contains(&record.id)) {
                continue;
            }

            match self.deliver_record(subscription, channel_id, record).await {
                Ok(DeliveryOutcome::Delivered) => {
                    info!(
                        guild_id = %subscription.guild_id,
                        record_id = %record.id,
                        boss = %record.boss_name,
                        "boss kill announced"
                    );
                    outcome.delivered.push(record.id.clone());
                }
                Ok(refused) => {
                    warn!(
                        guild_id = %subscription.guild_id,
                        channel_id,
                        reason = ?refused,
                        "channel no longer accepts notifications, unbinding"
                    );
                    self.unbind(subscription, channel_id).await;
                    outcome.unbound = true;
                    break;
                }
                Err(e) => {
                    warn!(
                        guild_id = %subscription.guild_id,
                        record_id = %record.id,
                        error = %e,
                        "boss kill not delivered, retrying next tick"
                    );
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }

    async fn deliver_record(
        &self,
        subscription: &Subscription,
        channel_id: &str,
        record: &BossKillRecord,
    ) -> Result<DeliveryOutcome, PipelineError> {
        let detail = self
            .source
            .boss_kill_detail(subscription.realm_id, &record.id)
            .await?;

        let damage = leaderboard::parse(&detail.players, Role::Damage);
        let healing = leaderboard::parse(&detail.players, Role::Healing);
        let image = self
            .renders
            .render(detail.loot.clone(), subscription.realm_id)
            .await;

        let message = assemble(&detail, &damage, &healing, image);
        Ok(self.delivery.send(channel_id, &message).await?)
    }

    async fn unbind(&self, subscription: &Subscription, channel_id: &str) {
        let guild_id = subscription.guild_id.clone();
        let channel_id = channel_id.to_string();
        let result = blocking(&self.db, move |db| {
            SubscriptionStore::new(db).clear_channel(&guild_id, &channel_id)
        })
        .await;

        if let Err(e) = result {
            error!(guild_id = %subscription.guild_id, error = %e, "failed to unbind channel");
        }
    }
}

fn feed_key(subscription: &Subscription) -> FeedKey {
    (subscription.realm_id, subscription.external_guild_id.clone())
}
