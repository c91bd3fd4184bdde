// SPDX-License-Identifier: MPL-2.0

use crate::armory::BossKillRecord;
use crate::leaderboard::{Leaderboard, Role};
use chrono::{DateTime, Utc};

/// Rows shown per leaderboard before the rest is summarised
const MAX_BOARD_ROWS: usize = 15;

/// Longest name kept in a leaderboard column
const NAME_WIDTH: usize = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Channel-ready boss kill announcement
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub fields: Vec<Field>,
    /// PNG of the loot tooltips, attached when rendering succeeded
    pub image: Option<Vec<u8>>,
}

/// Combine a kill, its two leaderboards and an optional loot image.
pub fn assemble(
    record: &BossKillRecord,
    damage: &Leaderboard,
    healing: &Leaderboard,
    image: Option<Vec<u8>>,
) -> Notification {
    let timestamp = DateTime::from_timestamp(record.killed_at, 0);

    let mut fields = vec![
        Field {
            name: "Attempts".to_string(),
            value: record.attempts.max(1).to_string(),
            inline: true,
        },
        Field {
            name: "Killed".to_string(),
            value: timestamp
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            inline: true,
        },
        Field {
            name: "Duration".to_string(),
            value: format_duration(record.fight_length),
            inline: true,
        },
    ];

    for (role, board) in [(Role::Damage, damage), (Role::Healing, healing)] {
        if board.is_empty() {
            continue;
        }
        fields.push(Field {
            name: format!("{} ({} total)", role.label(), format_compact(board.total)),
            value: board_block(board),
            inline: false,
        });
    }

    if !record.loot.is_empty() {
        let names: Vec<&str> = record.loot.iter().map(|i| i.name.as_str()).collect();
        fields.push(Field {
            name: "Loot".to_string(),
            value: names.join("\n"),
            inline: false,
        });
    }

    Notification {
        title: record.boss_name.clone(),
        timestamp,
        fields,
        image,
    }
}

/// Place / name / value columns in a code block
fn board_block(board: &Leaderboard) -> String {
    let mut lines = Vec::with_capacity(board.rows.len().min(MAX_BOARD_ROWS) + 3);
    lines.push("```".to_string());
    for row in board.rows.iter().take(MAX_BOARD_ROWS) {
        let name: String = row.name.chars().take(NAME_WIDTH).collect();
        lines.push(format!(
            "{:>2}. {:<width$} {:>7} {:>6.2}%",
            row.place,
            name,
            format_compact(row.value),
            row.percent,
            width = NAME_WIDTH
        ));
    }
    if board.rows.len() > MAX_BOARD_ROWS {
        lines.push(format!("    +{} more", board.rows.len() - MAX_BOARD_ROWS));
    }
    lines.push("```".to_string());
    lines.join("\n")
}

/// 950 -> "950", 12345 -> "12.3k", 2500000 -> "2.5M"
pub fn format_compact(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1_000_000.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("{:.1}k", value / 1_000.0)
    } else {
        format!("{:.0}", value)
    }
}

/// 272 -> "4m 32s"
pub fn format_duration(secs: u64) -> String {
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else {
        format!("{minutes}m {seconds}s")
    }
}
