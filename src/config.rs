// SPDX-License-Identifier: MPL-2.0

pub const APP_ID: &str = "bosswatch";
pub const APP_NAME: &str = "Bosswatch";

pub const DEFAULT_API_BASE: &str = "https://armory.example.org/api/";
pub const DEFAULT_ITEM_PAGE: &str = "https://armory.example.org/item/{entry}/{realm}";
pub const DEFAULT_DISCORD_API: &str = "https://discord.com/api/v10/";
pub const DEFAULT_TOOLTIP_SELECTOR: &str = ".item-tooltip";

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_TOOLTIP_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_TOOLTIP_ATTEMPTS: u32 = 2;
pub const DEFAULT_TOOLTIP_BACKOFF_MS: u64 = 750;
pub const DEFAULT_GRID_COLUMNS: usize = 3;
pub const DEFAULT_VIEWPORT_MARGIN: u32 = 16;

pub const DISCORD_TOKEN_ENV: &str = "BOSSWATCH_DISCORD_TOKEN";
pub const CHROME_BIN_ENV: &str = "CHROME_BIN";
