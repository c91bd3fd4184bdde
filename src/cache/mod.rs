// SPDX-License-Identifier: MPL-2.0

mod db;
mod records;
mod schema;
mod subscriptions;
mod tooltips;

pub use db::{CacheDb, blocking};
pub use records::RecordStore;
pub use subscriptions::{Subscription, SubscriptionStore};
pub use tooltips::{StyleCache, TooltipCache};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found")]
    NotFound,
    #[error("database path error: {0}")]
    Path(String),
    #[error("store task failed: {0}")]
    Task(String),
}
