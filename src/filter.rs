// SPDX-License-Identifier: MPL-2.0

//! Per-guild allow-list of dungeons and encounters.
//!
//! A filter maps a dungeon (map) id to the encounters that should be
//! announced. An empty encounter set admits every encounter in that
//! dungeon; once any dungeon is listed, unlisted dungeons are rejected.
//! A filter with no dungeons at all behaves like no filter.
//!
//! Toggling an encounter into a whole-dungeon entry narrows it to that
//! encounter. The dungeon is remembered as narrowed so that toggling the
//! last encounter back out restores "every encounter" instead of dropping
//! the dungeon.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterFilter {
    // BTreeSet keeps every list deduplicated and ascending
    maps: BTreeMap<u32, BTreeSet<u32>>,
    /// Whole-dungeon entries a toggle narrowed; always a subset of `maps` keys
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    narrowed: BTreeSet<u32>,
}

impl EncounterFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    #[cfg(test)]
    pub fn contains_map(&self, dungeon_id: u32) -> bool {
        self.maps.contains_key(&dungeon_id)
    }

    pub fn encounters(&self, dungeon_id: u32) -> Option<Vec<u32>> {
        self.maps
            .get(&dungeon_id)
            .map(|set| set.iter().copied().collect())
    }

    pub fn passes(&self, dungeon_id: u32, encounter_id: u32) -> bool {
        if self.maps.is_empty() {
            return true;
        }
        match self.maps.get(&dungeon_id) {
            None => false,
            Some(encounters) => encounters.is_empty() || encounters.contains(&encounter_id),
        }
    }

    /// Flip one encounter in or out of a dungeon's list.
    ///
    /// Toggling the same id twice leaves the filter as it was: a dungeon
    /// that was absent is dropped again, one that admitted every encounter
    /// goes back to that. Returns whether the encounter is listed afterwards.
    pub fn toggle(&mut self, dungeon_id: u32, encounter_id: u32) -> bool {
        match self.maps.get_mut(&dungeon_id) {
            None => {
                self.maps.insert(dungeon_id, BTreeSet::from([encounter_id]));
                true
            }
            Some(encounters) if encounters.is_empty() => {
                encounters.insert(encounter_id);
                self.narrowed.insert(dungeon_id);
                true
            }
            Some(encounters) => {
                if encounters.insert(encounter_id) {
                    return true;
                }
                encounters.remove(&encounter_id);
                if encounters.is_empty() && !self.narrowed.remove(&dungeon_id) {
                    self.maps.remove(&dungeon_id);
                }
                false
            }
        }
    }

    /// Replace a dungeon's list. An empty list admits the whole dungeon.
    pub fn set_for_map<I>(&mut self, dungeon_id: u32, encounters: I)
    where
        I: IntoIterator<Item = u32>,
    {
        self.narrowed.remove(&dungeon_id);
        self.maps
            .insert(dungeon_id, encounters.into_iter().collect());
    }

    /// Remove one dungeon, or everything when `dungeon_id` is `None`.
    pub fn clear(&mut self, dungeon_id: Option<u32>) {
        match dungeon_id {
            Some(id) => {
                self.maps.remove(&id);
                self.narrowed.remove(&id);
            }
            None => {
                self.maps.clear();
                self.narrowed.clear();
            }
        }
    }
}

/// Evaluate an optional filter; guilds without one accept every kill.
pub fn passes(filter: Option<&EncounterFilter>, dungeon_id: u32, encounter_id: u32) -> bool {
    filter.is_none_or(|f| f.passes(dungeon_id, encounter_id))
}

impl fmt::Display for EncounterFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.maps.is_empty() {
            return f.write_str("all dungeons");
        }
        let mut first = true;
        for (dungeon, encounters) in &self.maps {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            if encounters.is_empty() {
                write!(f, "{dungeon}: all")?;
            } else {
                let ids: Vec<String> = encounters.iter().map(u32::to_string).collect();
                write!(f, "{dungeon}: {}", ids.join(", "))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_filter_accepts_everything() {
        assert!(passes(None, 603, 2));
        assert!(passes(Some(&EncounterFilter::new()), 603, 2));
    }

    #[test]
    fn test_unlisted_dungeon_rejected() {
        let mut filter = EncounterFilter::new();
        filter.set_for_map(533, []);
        assert!(!filter.passes(603, 2));
    }

    #[test]
    fn test_empty_encounter_set_admits_whole_dungeon() {
        let mut filter = EncounterFilter::new();
        filter.set_for_map(603, []);
        assert!(filter.passes(603, 99));
    }

    #[test]
    fn test_listed_encounters_only() {
        let mut filter = EncounterFilter::new();
        filter.set_for_map(603, [2]);
        assert!(filter.passes(603, 2));
        assert!(!filter.passes(603, 99));
    }

    #[test]
    fn test_toggle_twice_restores_absent_dungeon() {
        let mut filter = EncounterFilter::new();
        filter.set_for_map(603, []);
        let before = filter.clone();

        assert!(filter.toggle(533, 5));
        assert_eq!(filter.encounters(533), Some(vec![5]));
        assert!(!filter.toggle(533, 5));

        assert!(!filter.contains_map(533));
        assert_eq!(filter, before);
    }

    #[test]
    fn test_toggle_twice_keeps_pass_result() {
        let mut filter = EncounterFilter::new();
        filter.set_for_map(603, [1, 2]);
        for encounter in [1, 2, 3] {
            let before = filter.passes(603, encounter);
            filter.toggle(603, encounter);
            filter.toggle(603, encounter);
            assert_eq!(filter.passes(603, encounter), before);
        }
    }

    #[test]
    fn test_toggle_twice_restores_whole_dungeon() {
        let mut filter = EncounterFilter::new();
        filter.set_for_map(603, []);
        filter.set_for_map(533, [2]);
        let before = filter.clone();

        assert!(filter.toggle(603, 5));
        assert_eq!(filter.encounters(603), Some(vec![5]));
        assert!(!filter.passes(603, 99));
        assert!(!filter.toggle(603, 5));

        assert_eq!(filter, before);
        assert!(filter.passes(603, 99));
    }

    #[test]
    fn test_narrowed_dungeon_survives_storage() {
        let mut filter = EncounterFilter::new();
        filter.set_for_map(603, []);
        filter.toggle(603, 5);
        filter.toggle(603, 6);

        let json = serde_json::to_string(&filter).unwrap();
        let mut back: EncounterFilter = serde_json::from_str(&json).unwrap();
        back.toggle(603, 5);
        back.toggle(603, 6);

        assert_eq!(back.encounters(603), Some(Vec::new()));
        assert!(back.passes(603, 99));
    }

    #[test]
    fn test_set_for_map_forgets_narrowing() {
        let mut filter = EncounterFilter::new();
        filter.set_for_map(603, []);
        filter.toggle(603, 5);
        filter.set_for_map(603, [5]);

        filter.toggle(603, 5);
        assert!(!filter.contains_map(603));
    }

    #[test]
    fn test_lists_are_sorted_and_deduplicated() {
        let mut filter = EncounterFilter::new();
        filter.set_for_map(603, [7, 2, 7, 4]);
        filter.toggle(603, 1);
        assert_eq!(filter.encounters(603), Some(vec![1, 2, 4, 7]));
    }

    #[test]
    fn test_clear() {
        let mut filter = EncounterFilter::new();
        filter.set_for_map(603, [2]);
        filter.set_for_map(533, []);

        filter.clear(Some(603));
        assert!(!filter.contains_map(603));
        assert!(filter.contains_map(533));

        filter.clear(None);
        assert!(filter.is_empty());
    }

    #[test]
    fn test_json_shape() {
        let mut filter = EncounterFilter::new();
        filter.set_for_map(603, [4, 2]);
        filter.set_for_map(533, []);

        let json = serde_json::to_string(&filter).unwrap();
        assert_eq!(json, r#"{"maps":{"533":[],"603":[2,4]}}"#);

        let back: EncounterFilter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, filter);
    }

    #[test]
    fn test_display() {
        let mut filter = EncounterFilter::new();
        filter.set_for_map(603, [2, 5]);
        filter.set_for_map(533, []);
        assert_eq!(filter.to_string(), "533: all; 603: 2, 5");
    }
}
