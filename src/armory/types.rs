// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

/// One boss kill as reported by the armory.
///
/// The latest-kills feed only fills the identity fields; `players` and
/// `loot` arrive with the detail payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BossKillRecord {
    pub id: String,
    #[serde(default)]
    pub guild: String,
    pub boss_name: String,
    pub dungeon_id: u32,
    pub encounter_id: u32,
    #[serde(default)]
    pub attempts: u32,
    /// Unix seconds
    pub killed_at: i64,
    /// Fight length in seconds
    #[serde(default)]
    pub fight_length: u64,
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub loot: Vec<LootItem>,
}

/// A raid member's performance in one kill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub class: u8,
    /// Talent tree index (0..=2) the player was specced into
    #[serde(default)]
    pub spec: u8,
    /// Damage per second. Kept raw: the armory sometimes sends strings or null.
    #[serde(default)]
    pub dps: serde_json::Value,
    #[serde(default)]
    pub hps: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LootItem {
    pub entry: u32,
    pub name: String,
}

/// Tooltip markup lifted off an item page, plus the stylesheets that page used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TooltipFragment {
    pub markup: String,
    pub stylesheets: Vec<String>,
}

/// Read a loosely typed armory number, treating anything non-numeric as zero.
pub fn numeric(value: &serde_json::Value) -> f64 {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}
