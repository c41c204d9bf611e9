use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;

const DEFAULT_POLICY_PATH: &str = "policy";
const DEFAULT_ROUNDS: u64 = 10_000_000;
// Evaluation plays this fraction of the training rounds unless configured.
const EVALUATION_SHARE: u64 = 100;

/// Run configuration, usually loaded from YAML. Every field has a default.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub seed: Option<u64>,
    pub policy_path: String,
    pub shoe: ShoeConfig,
    pub training: TrainingConfig,
    pub evaluation: EvaluationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ShoeConfig {
    pub decks: u32,
    // The shoe is replaced once less than this fraction of it remains.
    pub reshuffle_fraction: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
    pub rounds: u64,
    pub learning_rate: f64,
    pub initial_exploration: f64,
    pub exploration_decay: f64,
    pub log_interval: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EvaluationConfig {
    // Defaults to the training rounds divided by 100.
    pub rounds: Option<u64>,
    pub count_reset_threshold: usize,
    pub report_interval: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            seed: None,
            policy_path: DEFAULT_POLICY_PATH.to_string(),
            shoe: ShoeConfig::default(),
            training: TrainingConfig::default(),
            evaluation: EvaluationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ShoeConfig {
    fn default() -> Self {
        ShoeConfig {
            decks: 4,
            reshuffle_fraction: 0.3,
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            rounds: DEFAULT_ROUNDS,
            learning_rate: 0.001,
            initial_exploration: 0.4,
            exploration_decay: 5.0,
            log_interval: 1_000_000,
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        EvaluationConfig {
            rounds: None,
            count_reset_threshold: 70,
            report_interval: 100_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn level(&self) -> Option<Level> {
        self.level.parse().ok()
    }
}

impl Config {
    /// Load configuration from a YAML file on disk. The result is not validated, so that
    /// command-line overrides can still replace out-of-range values.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_buf = path.to_path_buf();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            source,
            path: path_buf.clone(),
        })?;
        let reader = BufReader::new(file);
        serde_yaml::from_reader(reader).map_err(|source| ConfigError::Parse {
            source,
            path: path_buf,
        })
    }

    /// Validate the configuration without performing I/O.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.shoe.decks == 0 {
            return Err(invalid("shoe.decks", "at least one deck is required"));
        }
        if !(self.shoe.reshuffle_fraction > 0.0 && self.shoe.reshuffle_fraction < 1.0) {
            return Err(invalid(
                "shoe.reshuffle_fraction",
                "must be strictly between 0 and 1",
            ));
        }
        if self.training.rounds == 0 {
            return Err(invalid(
                "training.rounds",
                "number of rounds must be greater than zero",
            ));
        }
        if !(self.training.learning_rate > 0.0 && self.training.learning_rate <= 1.0) {
            return Err(invalid("training.learning_rate", "must be in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.training.initial_exploration) {
            return Err(invalid("training.initial_exploration", "must be in [0, 1]"));
        }
        if !(self.training.exploration_decay >= 0.0) {
            return Err(invalid(
                "training.exploration_decay",
                "must not be negative",
            ));
        }
        if self.training.log_interval == 0 {
            return Err(invalid("training.log_interval", "must be at least 1"));
        }
        if self.evaluation.rounds == Some(0) {
            return Err(invalid(
                "evaluation.rounds",
                "number of rounds must be greater than zero",
            ));
        }
        if self.evaluation.report_interval == 0 {
            return Err(invalid("evaluation.report_interval", "must be at least 1"));
        }
        if self.logging.level().is_none() {
            return Err(invalid(
                "logging.level",
                "expected one of trace, debug, info, warn, error",
            ));
        }
        Ok(())
    }

    pub fn evaluation_rounds(&self) -> u64 {
        self.evaluation
            .rounds
            .unwrap_or_else(|| (self.training.rounds / EVALUATION_SHARE).max(1))
    }
}

fn invalid(field: &str, message: &str) -> ValidationError {
    ValidationError::InvalidField {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Errors surfaced when loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
        path: PathBuf,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn field_of(err: ValidationError) -> String {
        match err {
            ValidationError::InvalidField { field, .. } => field,
        }
    }

    #[test]
    fn defaults_are_valid_test() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.policy_path, "policy");
        assert_eq!(config.evaluation_rounds(), 100_000);
        assert_eq!(config.logging.level(), Some(Level::INFO));
    }

    #[test]
    fn partial_yaml_fills_defaults_test() {
        let yaml = r#"
seed: 42
training:
  rounds: 5000
shoe:
  decks: 6
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.training.rounds, 5000);
        assert_eq!(config.training.learning_rate, 0.001);
        assert_eq!(config.shoe.decks, 6);
        assert_eq!(config.shoe.reshuffle_fraction, 0.3);
        assert_eq!(config.evaluation_rounds(), 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn explicit_evaluation_rounds_test() {
        let mut config = Config::default();
        config.evaluation.rounds = Some(7);
        assert_eq!(config.evaluation_rounds(), 7);

        config.evaluation.rounds = None;
        config.training.rounds = 10;
        assert_eq!(config.evaluation_rounds(), 1);
    }

    #[test]
    fn validation_errors_test() {
        let mut config = Config::default();
        config.shoe.decks = 0;
        assert_eq!(field_of(config.validate().unwrap_err()), "shoe.decks");

        let mut config = Config::default();
        config.shoe.reshuffle_fraction = 1.0;
        assert_eq!(
            field_of(config.validate().unwrap_err()),
            "shoe.reshuffle_fraction"
        );

        let mut config = Config::default();
        config.training.learning_rate = 0.0;
        assert_eq!(
            field_of(config.validate().unwrap_err()),
            "training.learning_rate"
        );

        let mut config = Config::default();
        config.training.initial_exploration = 1.5;
        assert_eq!(
            field_of(config.validate().unwrap_err()),
            "training.initial_exploration"
        );

        let mut config = Config::default();
        config.training.rounds = 0;
        assert_eq!(field_of(config.validate().unwrap_err()), "training.rounds");

        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert_eq!(field_of(config.validate().unwrap_err()), "logging.level");
    }

    #[test]
    fn from_path_test() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        std::fs::write(&path, "policy_path: trained\ntraining:\n  rounds: 200\n").unwrap();
        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.policy_path, "trained");
        assert_eq!(config.training.rounds, 200);

        std::fs::write(&path, "training: [1, 2]\n").unwrap();
        match Config::from_path(&path) {
            Err(ConfigError::Parse { .. }) => {}
            other => panic!("unexpected result {:?}", other),
        }

        match Config::from_path(dir.path().join("missing.yaml")) {
            Err(ConfigError::Read { .. }) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn override_replaces_invalid_file_value_test() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        std::fs::write(&path, "training:\n  rounds: 0\n").unwrap();

        let mut config = Config::from_path(&path).unwrap();
        assert_eq!(config.training.rounds, 0);
        assert_eq!(field_of(config.validate().unwrap_err()), "training.rounds");

        // As with `--rounds 100` on the command line.
        config.training.rounds = 100;
        assert!(config.validate().is_ok());
    }
}
