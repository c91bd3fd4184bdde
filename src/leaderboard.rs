// SPDX-License-Identifier: MPL-2.0

//! Damage and healing rankings for a boss kill.
//!
//! The armory does not say who healed; the role comes from the class and the
//! talent tree the player was in. Tank trees count toward damage.

use crate::armory::{Player, numeric};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Damage,
    Healing,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Damage => "Damage",
            Role::Healing => "Healing",
        }
    }

    fn intensity(self, player: &Player) -> f64 {
        match self {
            Role::Damage => numeric(&player.dps),
            Role::Healing => numeric(&player.hps),
        }
    }
}

/// Role of a class id and talent tree index, `None` for unknown pairs.
pub fn role_of(class: u8, spec: u8) -> Option<Role> {
    use Role::{Damage, Healing};

    let trees: [Role; 3] = match class {
        1 => [Damage, Damage, Damage],   // Warrior: Arms, Fury, Protection
        2 => [Healing, Damage, Damage],  // Paladin: Holy, Protection, Retribution
        3 => [Damage, Damage, Damage],   // Hunter
        4 => [Damage, Damage, Damage],   // Rogue
        5 => [Healing, Healing, Damage], // Priest: Discipline, Holy, Shadow
        6 => [Damage, Damage, Damage],   // Death Knight
        7 => [Damage, Damage, Healing],  // Shaman: Elemental, Enhancement, Restoration
        8 => [Damage, Damage, Damage],   // Mage
        9 => [Damage, Damage, Damage],   // Warlock
        11 => [Damage, Damage, Healing], // Druid: Balance, Feral, Restoration
        _ => return None,
    };
    trees.get(usize::from(spec)).copied()
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardRow {
    /// 1-based
    pub place: usize,
    pub name: String,
    pub value: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Leaderboard {
    pub rows: Vec<LeaderboardRow>,
    pub total: f64,
}

impl Leaderboard {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Rank the players that fill `role`, highest output first.
///
/// Missing or malformed values rank as zero. Percentages are of the board's
/// total, rounded to two decimals, and all zero when the total is zero.
pub fn parse(players: &[Player], role: Role) -> Leaderboard {
    let mut ranked: Vec<(&Player, f64)> = players
        .iter()
        .filter(|p| role_of(p.class, p.spec) == Some(role))
        .map(|p| (p, role.intensity(p)))
        .collect();

    // Stable sort: equal values keep armory order
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let total: f64 = ranked.iter().map(|(_, value)| value).sum();

    let rows = ranked
        .into_iter()
        .enumerate()
        .map(|(i, (player, value))| LeaderboardRow {
            place: i + 1,
            name: player.name.clone(),
            value,
            percent: if total > 0.0 {
                round2(value / total * 100.0)
            } else {
                0.0
            },
        })
        .collect();

    Leaderboard { rows, total }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
