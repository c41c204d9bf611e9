use std::convert::TryFrom;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::{Action, State};
use crate::solver::{greedy_action, ActionValues};

pub const MIN_TOTAL: u32 = 4;
pub const MAX_TOTAL: u32 = 21;
pub const MIN_UP_CARD: u32 = 1;
pub const MAX_UP_CARD: u32 = 10;

const TOTALS: usize = (MAX_TOTAL - MIN_TOTAL + 1) as usize;
const UP_CARDS: usize = (MAX_UP_CARD - MIN_UP_CARD + 1) as usize;
const ACE_STATES: usize = 2;
const STATE_COUNT: usize = TOTALS * UP_CARDS * ACE_STATES;

/// Number of (state, action) entries in a complete table.
pub const ENTRY_COUNT: usize = STATE_COUNT * 3;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    #[error("player total {0} is out of range")]
    TotalOutOfRange(u32),
    #[error("dealer up-card {0} is out of range")]
    UpCardOutOfRange(u32),
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy file {path:?} not found")]
    NotFound { path: PathBuf },
    #[error("failed to access policy file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("policy file {path:?} is not a valid policy")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("policy file {path:?} has unsupported version {version}")]
    UnsupportedVersion { path: PathBuf, version: u32 },
    #[error("policy file {path:?} holds an invalid state")]
    InvalidEntry {
        path: PathBuf,
        #[source]
        source: StateError,
    },
    #[error("policy file {path:?} holds {found} distinct entries, expected {expected}")]
    Incomplete {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
}

/// Key of the value table: the player's total, the dealer's up-card (1 is an ace) and whether
/// the player holds a usable ace. Only in-range keys can be built.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct StateKey {
    player_total: u32,
    dealer_up_card: u32,
    usable_ace: bool,
}

impl StateKey {
    pub fn new(
        player_total: u32,
        dealer_up_card: u32,
        usable_ace: bool,
    ) -> Result<StateKey, StateError> {
        if !(MIN_TOTAL..=MAX_TOTAL).contains(&player_total) {
            return Err(StateError::TotalOutOfRange(player_total));
        }
        if !(MIN_UP_CARD..=MAX_UP_CARD).contains(&dealer_up_card) {
            return Err(StateError::UpCardOutOfRange(dealer_up_card));
        }
        Ok(StateKey {
            player_total,
            dealer_up_card,
            usable_ace,
        })
    }

    pub fn player_total(&self) -> u32 {
        self.player_total
    }

    pub fn dealer_up_card(&self) -> u32 {
        self.dealer_up_card
    }

    pub fn usable_ace(&self) -> bool {
        self.usable_ace
    }

    fn index(&self) -> usize {
        let total = (self.player_total - MIN_TOTAL) as usize;
        let up_card = (self.dealer_up_card - MIN_UP_CARD) as usize;
        (total * UP_CARDS + up_card) * ACE_STATES + self.usable_ace as usize
    }

    // Every valid key, in table order.
    pub fn all() -> impl Iterator<Item = StateKey> {
        (MIN_TOTAL..=MAX_TOTAL).flat_map(|player_total| {
            (MIN_UP_CARD..=MAX_UP_CARD).flat_map(move |dealer_up_card| {
                IntoIterator::into_iter([false, true]).map(move |usable_ace| StateKey {
                    player_total,
                    dealer_up_card,
                    usable_ace,
                })
            })
        })
    }
}

impl TryFrom<&State> for StateKey {
    type Error = StateError;

    fn try_from(state: &State) -> Result<StateKey, StateError> {
        StateKey::new(
            state.player.value(),
            state.dealer.rank(),
            state.player.usable_ace(),
        )
    }
}

/// Learned action values for every player state.
#[derive(Clone, Debug, PartialEq)]
pub struct QTable {
    // Indexed by state, then action.
    values: Vec<[f64; 3]>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PolicyFile {
    version: u32,
    entries: Vec<PolicyEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PolicyEntry {
    player_total: u32,
    dealer_up_card: u32,
    usable_ace: bool,
    action: Action,
    value: f64,
}

impl Default for QTable {
    fn default() -> Self {
        QTable::new()
    }
}

impl QTable {
    // All values start at 0, except standing on 21 which starts at 1.
    pub fn new() -> QTable {
        let mut table = QTable {
            values: vec![[0.0; 3]; STATE_COUNT],
        };
        for key in StateKey::all().filter(|key| key.player_total == MAX_TOTAL) {
            table.set(&key, Action::Stand, 1.0);
        }
        table
    }

    pub fn get(&self, key: &StateKey, action: Action) -> f64 {
        self.values[key.index()][action.index()]
    }

    pub fn set(&mut self, key: &StateKey, action: Action, value: f64) {
        self.values[key.index()][action.index()] = value;
    }

    pub fn best_action(&self, key: &StateKey) -> Action {
        greedy_action(self, key, &Action::ALL)
    }

    pub fn entries(&self) -> impl Iterator<Item = (StateKey, Action, f64)> + '_ {
        StateKey::all().flat_map(move |key| {
            IntoIterator::into_iter(Action::ALL)
                .map(move |action| (key, action, self.get(&key, action)))
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), PolicyError> {
        let io_error = |source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        };

        let policy = PolicyFile {
            version: FORMAT_VERSION,
            entries: self
                .entries()
                .map(|(key, action, value)| PolicyEntry {
                    player_total: key.player_total(),
                    dealer_up_card: key.dealer_up_card(),
                    usable_ace: key.usable_ace(),
                    action,
                    value,
                })
                .collect(),
        };

        // Written next to the target and renamed over it, so a failed save keeps the old policy.
        let temp_path = temp_path_for(path);
        let written = File::create(&temp_path)
            .map_err(io_error)
            .and_then(|file| {
                let mut writer = BufWriter::new(file);
                serde_json::to_writer(&mut writer, &policy).map_err(|source| {
                    PolicyError::Format {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                writer.flush().map_err(io_error)
            })
            .and_then(|_| fs::rename(&temp_path, path).map_err(io_error));
        if written.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        written?;
        debug!(path = %path.display(), entries = policy.entries.len(), "policy written");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<QTable, PolicyError> {
        let file = File::open(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => PolicyError::NotFound {
                path: path.to_path_buf(),
            },
            _ => PolicyError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;
        let policy: PolicyFile =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| {
                PolicyError::Format {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        if policy.version != FORMAT_VERSION {
            return Err(PolicyError::UnsupportedVersion {
                path: path.to_path_buf(),
                version: policy.version,
            });
        }

        let mut table = QTable::new();
        let mut seen = vec![false; ENTRY_COUNT];
        for entry in policy.entries.iter() {
            let key = StateKey::new(entry.player_total, entry.dealer_up_card, entry.usable_ace)
                .map_err(|source| PolicyError::InvalidEntry {
                    path: path.to_path_buf(),
                    source,
                })?;
            seen[key.index() * 3 + entry.action.index()] = true;
            table.set(&key, entry.action, entry.value);
        }

        let found = seen.iter().filter(|s| **s).count();
        if found != ENTRY_COUNT {
            return Err(PolicyError::Incomplete {
                path: path.to_path_buf(),
                expected: ENTRY_COUNT,
                found,
            });
        }
        debug!(path = %path.display(), "policy loaded");
        Ok(table)
    }

    // Loads the policy at `path`, or starts a fresh table if there is none yet.
    pub fn load_or_default(path: &Path) -> Result<QTable, PolicyError> {
        match QTable::load(path) {
            Err(PolicyError::NotFound { path }) => {
                warn!(path = %path.display(), "no saved policy, starting from a fresh table");
                Ok(QTable::new())
            }
            result => result,
        }
    }
}

impl ActionValues<StateKey, Action> for QTable {
    fn value(&self, state: &StateKey, action: &Action) -> f64 {
        self.get(state, *action)
    }

    fn set_value(&mut self, state: &StateKey, action: &Action, value: f64) {
        self.set(state, *action, value)
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackjack::{Card, Hand};
    use tempfile::tempdir;

    #[test]
    fn initial_values_test() {
        let table = QTable::new();
        assert_eq!(table.entries().count(), 1080);
        for (key, action, value) in table.entries() {
            if key.player_total() == 21 && action == Action::Stand {
                assert_eq!(value, 1.0);
            } else {
                assert_eq!(value, 0.0);
            }
        }
    }

    #[test]
    fn key_range_test() {
        assert!(StateKey::new(4, 1, false).is_ok());
        assert!(StateKey::new(21, 10, true).is_ok());
        assert_eq!(
            StateKey::new(3, 5, false),
            Err(StateError::TotalOutOfRange(3))
        );
        assert_eq!(
            StateKey::new(22, 5, false),
            Err(StateError::TotalOutOfRange(22))
        );
        assert_eq!(
            StateKey::new(12, 0, false),
            Err(StateError::UpCardOutOfRange(0))
        );
        assert_eq!(
            StateKey::new(12, 11, true),
            Err(StateError::UpCardOutOfRange(11))
        );
    }

    #[test]
    fn keys_are_distinct_test() {
        let mut indices: Vec<usize> = StateKey::all().map(|key| key.index()).collect();
        assert_eq!(indices.len(), STATE_COUNT);
        indices.sort();
        indices.dedup();
        assert_eq!(indices.len(), STATE_COUNT);
        assert_eq!(indices[STATE_COUNT - 1], STATE_COUNT - 1);
    }

    #[test]
    fn key_from_state_test() {
        let state = State {
            dealer: Card::Ace,
            player: Hand::new(17, true),
        };
        let key = StateKey::try_from(&state).unwrap();
        assert_eq!(key, StateKey::new(17, 1, true).unwrap());
    }

    #[test]
    fn best_action_test() {
        let mut table = QTable::new();
        let key = StateKey::new(16, 10, false).unwrap();
        assert_eq!(table.best_action(&key), Action::Stand);

        table.set(&key, Action::Hit, 0.2);
        table.set(&key, Action::Double, 0.1);
        assert_eq!(table.best_action(&key), Action::Hit);

        // Equal values go to the earlier action.
        table.set(&key, Action::Double, 0.2);
        assert_eq!(table.best_action(&key), Action::Hit);

        let key = StateKey::new(21, 4, true).unwrap();
        assert_eq!(table.best_action(&key), Action::Stand);
    }

    #[test]
    fn save_and_load_test() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policy");

        let mut table = QTable::new();
        table.set(&StateKey::new(12, 3, false).unwrap(), Action::Hit, -0.123);
        table.set(&StateKey::new(20, 10, true).unwrap(), Action::Stand, 0.457);
        table.set(&StateKey::new(4, 1, false).unwrap(), Action::Double, 0.001);
        table.save(&path).unwrap();

        let loaded = QTable::load(&path).unwrap();
        assert_eq!(loaded, table);
        assert_eq!(
            loaded.get(&StateKey::new(12, 3, false).unwrap(), Action::Hit),
            -0.123
        );
    }

    #[test]
    fn save_replaces_existing_policy_test() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policy");
        QTable::new().save(&path).unwrap();

        let mut table = QTable::new();
        table.set(&StateKey::new(15, 7, false).unwrap(), Action::Hit, 0.25);
        table.save(&path).unwrap();

        assert_eq!(QTable::load(&path).unwrap(), table);
        assert!(!dir.path().join("policy.tmp").exists());
    }

    #[test]
    fn failed_save_keeps_existing_policy_test() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policy");
        let mut saved = QTable::new();
        saved.set(&StateKey::new(13, 2, true).unwrap(), Action::Double, -0.5);
        saved.save(&path).unwrap();

        // A directory where the temporary file would go makes the write fail.
        std::fs::create_dir(dir.path().join("policy.tmp")).unwrap();
        match QTable::new().save(&path) {
            Err(PolicyError::Io { .. }) => {}
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(QTable::load(&path).unwrap(), saved);
    }

    #[test]
    fn load_missing_policy_test() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing");
        match QTable::load(&path) {
            Err(PolicyError::NotFound { .. }) => {}
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(QTable::load_or_default(&path).unwrap(), QTable::new());
    }

    #[test]
    fn load_rejects_garbage_test() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policy");
        std::fs::write(&path, "not json").unwrap();
        match QTable::load(&path) {
            Err(PolicyError::Format { .. }) => {}
            other => panic!("unexpected result {:?}", other),
        }
        // Only a missing file falls back to a fresh table.
        assert!(QTable::load_or_default(&path).is_err());
    }

    #[test]
    fn load_rejects_invalid_state_test() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policy");
        std::fs::write(
            &path,
            r#"{"version":1,"entries":[{"player_total":25,"dealer_up_card":3,"usable_ace":false,"action":"hit","value":0.5}]}"#,
        )
        .unwrap();
        match QTable::load(&path) {
            Err(PolicyError::InvalidEntry { source, .. }) => {
                assert_eq!(source, StateError::TotalOutOfRange(25))
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn load_rejects_incomplete_table_test() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policy");
        std::fs::write(
            &path,
            r#"{"version":1,"entries":[{"player_total":12,"dealer_up_card":3,"usable_ace":false,"action":"hit","value":0.5}]}"#,
        )
        .unwrap();
        match QTable::load(&path) {
            Err(PolicyError::Incomplete {
                expected, found, ..
            }) => {
                assert_eq!(expected, 1080);
                assert_eq!(found, 1);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn load_rejects_unknown_version_test() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policy");
        std::fs::write(&path, r#"{"version":7,"entries":[]}"#).unwrap();
        match QTable::load(&path) {
            Err(PolicyError::UnsupportedVersion { version, .. }) => assert_eq!(version, 7),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
