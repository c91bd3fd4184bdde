// SPDX-License-Identifier: MPL-2.0

/// SQL schema for the bosswatch database
pub const SCHEMA: &str = r#"
PRAGMA user_version = 1;

-- subscriptions: one notification binding per guild
CREATE TABLE IF NOT EXISTS subscriptions (
    guild_id TEXT PRIMARY KEY,
    channel_id TEXT,
    realm_id INTEGER NOT NULL,
    external_guild_id TEXT NOT NULL,
    filter_json TEXT,
    updated_at INTEGER NOT NULL
);

-- processed_records: kills already delivered, per guild
CREATE TABLE IF NOT EXISTS processed_records (
    guild_id TEXT NOT NULL,
    record_id TEXT NOT NULL,
    processed_at INTEGER NOT NULL,
    PRIMARY KEY (guild_id, record_id)
);

-- tooltips: item markup is immutable once the armory renders it
CREATE TABLE IF NOT EXISTS tooltips (
    item_entry INTEGER NOT NULL,
    realm_id INTEGER NOT NULL,
    markup TEXT NOT NULL,
    fetched_at INTEGER NOT NULL,
    PRIMARY KEY (item_entry, realm_id)
);

-- stylesheets: links found on a realm's item pages, first writer wins
CREATE TABLE IF NOT EXISTS stylesheets (
    realm_id INTEGER PRIMARY KEY,
    urls_json TEXT NOT NULL,
    fetched_at INTEGER NOT NULL
);
"#;
