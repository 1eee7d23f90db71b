use crate::database::{self, MAX_INSERT_BATCH_SIZE};
use reward_attribution::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::PathBuf;

pub const LOG_LEVEL: &str = "info";
pub const EFFECTIVE_BALANCE_CACHE: &str = "tmp/effective_balances.json";

fn log_level() -> String {
    LOG_LEVEL.to_string()
}

fn effective_balance_cache() -> PathBuf {
    PathBuf::from(EFFECTIVE_BALANCE_CACHE)
}

const fn insert_batch_size() -> usize {
    reward_attribution::DEFAULT_INSERT_BATCH_SIZE
}

const fn progress_interval() -> u64 {
    reward_attribution::DEFAULT_PROGRESS_INTERVAL
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: database::Config,
    #[serde(default = "log_level")]
    pub log_level: String,
    /// Where the effective balance series of impaired validators are cached between runs.
    #[serde(default = "effective_balance_cache")]
    pub effective_balance_cache: PathBuf,
    /// Rows per INSERT statement.
    #[serde(default = "insert_batch_size")]
    pub insert_batch_size: usize,
    /// Epochs between progress log lines.
    #[serde(default = "progress_interval")]
    pub progress_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: database::Config::default(),
            log_level: log_level(),
            effective_balance_cache: effective_balance_cache(),
            insert_batch_size: insert_batch_size(),
            progress_interval: progress_interval(),
        }
    }
}

impl Config {
    pub fn load_from_file(path_to_file: String) -> Result<Config, String> {
        let file = File::open(&path_to_file)
            .map_err(|e| format!("Error reading config file {}: {:?}", path_to_file, e))?;
        let config: Config = serde_yaml::from_reader(file)
            .map_err(|e| format!("Error parsing config file {}: {:?}", path_to_file, e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.insert_batch_size == 0 || self.insert_batch_size > MAX_INSERT_BATCH_SIZE {
            return Err(format!(
                "insert_batch_size must be between 1 and {}, got {}",
                MAX_INSERT_BATCH_SIZE, self.insert_batch_size
            ));
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            insert_batch_size: self.insert_batch_size,
            progress_interval: self.progress_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn load(file: &NamedTempFile) -> Result<Config, String> {
        Config::load_from_file(file.path().to_string_lossy().into_owned())
    }

    #[test]
    fn partial_file_uses_defaults() {
        let file = write_config("database:\n  host: db.local\n  port: 6543\nlog_level: debug\n");
        let config = load(&file).unwrap();

        assert_eq!(config.database.host, "db.local");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.database.user, "chain");
        assert_eq!(config.database.password, "medalla");
        assert_eq!(config.log_level, "debug");
        assert_eq!(
            config.effective_balance_cache,
            PathBuf::from("tmp/effective_balances.json")
        );
        assert_eq!(config.insert_batch_size, 1_000);
        assert_eq!(config.progress_interval, 100);
    }

    #[test]
    fn default_file_matches_defaults() {
        let config = Config::load_from_file(
            concat!(env!("CARGO_MANIFEST_DIR"), "/config.yaml.default").to_string(),
        )
        .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn engine_settings() {
        let file = write_config("insert_batch_size: 250\nprogress_interval: 10\n");
        let engine_config = load(&file).unwrap().engine_config();

        assert_eq!(engine_config.insert_batch_size, 250);
        assert_eq!(engine_config.progress_interval, 10);
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let file = write_config(&format!("insert_batch_size: {}\n", MAX_INSERT_BATCH_SIZE + 1));
        assert!(load(&file).is_err());

        let file = write_config("insert_batch_size: 0\n");
        assert!(load(&file).is_err());
    }

    #[test]
    fn missing_file() {
        assert!(Config::load_from_file("/nonexistent/validator_extras.yaml".to_string()).is_err());
    }

    #[test]
    fn malformed_file() {
        let file = write_config("database: [1, 2\n");
        assert!(load(&file).is_err());
    }
}
