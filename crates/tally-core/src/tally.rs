use crate::{ConfigError, Source};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// A configured indicator bound to a source name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Tally {
    pub name: String,
    #[serde(rename = "pin")]
    pub indicator_id: u32,
    #[serde(default, rename = "low_active")]
    pub polarity_inverted: bool,
}

impl Tally {
    pub fn new(name: impl Into<String>, indicator_id: u32) -> Self {
        Self {
            name: name.into(),
            indicator_id,
            polarity_inverted: false,
        }
    }

    pub fn inverted(mut self) -> Self {
        self.polarity_inverted = true;
        self
    }

    /// Electrical level that represents `active` for this tally.
    pub fn level_for(&self, active: bool) -> bool {
        active != self.polarity_inverted
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyEntry {
    pub tally: Tally,
    pub active: bool,
}

/// Target state for every configured tally, in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TallyState {
    entries: Vec<TallyEntry>,
}

impl TallyState {
    /// Every tally switched off.
    pub fn all_off(tallies: &[Tally]) -> Self {
        Self {
            entries: tallies
                .iter()
                .map(|tally| TallyEntry {
                    tally: tally.clone(),
                    active: false,
                })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[TallyEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<bool> {
        self.entries
            .iter()
            .find(|entry| entry.tally.name == name)
            .map(|entry| entry.active)
    }

    pub fn active_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.active)
            .map(|entry| entry.tally.name.as_str())
            .collect()
    }
}

/// Mark each tally active iff a visible source carries its name.
/// Source kind plays no part in the match.
pub fn map_state(tallies: &[Tally], visible: &BTreeSet<Source>) -> TallyState {
    let names: HashSet<&str> = visible.iter().map(|source| source.name.as_str()).collect();
    TallyState {
        entries: tallies
            .iter()
            .map(|tally| TallyEntry {
                tally: tally.clone(),
                active: names.contains(tally.name.as_str()),
            })
            .collect(),
    }
}

/// Tally names are identities: they must be present and unique. Each
/// indicator is driven by exactly one tally.
pub fn validate_tallies(tallies: &[Tally]) -> Result<(), ConfigError> {
    if tallies.is_empty() {
        return Err(ConfigError::NoTallies);
    }
    let mut seen = HashSet::new();
    let mut indicators = HashSet::new();
    for (index, tally) in tallies.iter().enumerate() {
        if tally.name.trim().is_empty() {
            return Err(ConfigError::EmptyTallyName { index });
        }
        if !seen.insert(tally.name.as_str()) {
            return Err(ConfigError::DuplicateTally {
                name: tally.name.clone(),
            });
        }
        if !indicators.insert(tally.indicator_id) {
            return Err(ConfigError::DuplicateIndicator {
                id: tally.indicator_id,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceKind;

    #[test]
    fn every_tally_gets_an_entry_matched_by_name() {
        let tallies = vec![Tally::new("Cam1", 17), Tally::new("Cam3", 27)];
        let visible: BTreeSet<_> = [Source::new("Cam1", SourceKind::Input)].into_iter().collect();
        let state = map_state(&tallies, &visible);
        assert_eq!(state.len(), 2);
        assert_eq!(state.get("Cam1"), Some(true));
        assert_eq!(state.get("Cam3"), Some(false));
        assert_eq!(state.active_names(), vec!["Cam1"]);
    }

    #[test]
    fn kind_is_ignored_when_matching() {
        let tallies = vec![Tally::new("Studio", 5)];
        let visible: BTreeSet<_> = [Source::new("Studio", SourceKind::Scene)].into_iter().collect();
        assert_eq!(map_state(&tallies, &visible).get("Studio"), Some(true));
    }

    #[test]
    fn empty_visible_set_turns_everything_off() {
        let tallies = vec![Tally::new("Cam1", 17), Tally::new("Cam2", 18)];
        let state = map_state(&tallies, &BTreeSet::new());
        assert_eq!(state, TallyState::all_off(&tallies));
    }

    #[test]
    fn inverted_polarity_flips_the_level() {
        let plain = Tally::new("Cam1", 17);
        let inverted = Tally::new("Cam2", 18).inverted();
        assert!(plain.level_for(true));
        assert!(!plain.level_for(false));
        assert!(!inverted.level_for(true));
        assert!(inverted.level_for(false));
    }

    #[test]
    fn tally_deserializes_from_pin_and_low_active() {
        let tally: Tally =
            serde_json::from_str(r#"{"name": "Cam1", "pin": 17, "low_active": true}"#).unwrap();
        assert_eq!(tally, Tally::new("Cam1", 17).inverted());

        let tally: Tally = serde_json::from_str(r#"{"name": "Cam2", "pin": 4}"#).unwrap();
        assert!(!tally.polarity_inverted);
    }

    #[test]
    fn validation_rejects_empty_and_duplicate_names() {
        assert_eq!(validate_tallies(&[]), Err(ConfigError::NoTallies));
        assert_eq!(
            validate_tallies(&[Tally::new("Cam1", 1), Tally::new(" ", 2)]),
            Err(ConfigError::EmptyTallyName { index: 1 })
        );
        assert_eq!(
            validate_tallies(&[Tally::new("Cam1", 1), Tally::new("Cam1", 2)]),
            Err(ConfigError::DuplicateTally {
                name: "Cam1".to_string()
            })
        );
        assert!(validate_tallies(&[Tally::new("Cam1", 1), Tally::new("Cam2", 2)]).is_ok());
    }

    #[test]
    fn validation_rejects_a_shared_indicator() {
        assert_eq!(
            validate_tallies(&[Tally::new("Cam1", 17), Tally::new("Cam2", 17).inverted()]),
            Err(ConfigError::DuplicateIndicator { id: 17 })
        );
    }
}
