// SPDX-License-Identifier: MPL-2.0

mod client;
mod types;

pub use client::{ArmoryClient, BossKillSource, ClientError, item_page_url};
pub use types::{BossKillRecord, LootItem, Player, TooltipFragment, numeric};
