use std::path::PathBuf;

use sha2::{Digest, Sha256};
use thiserror::Error;

pub const ENV_DB: &str = "NEEDFUL_DB";
pub const ENV_DATA_DIR: &str = "NEEDFUL_DATA_DIR";
pub const ENV_LOG: &str = "NEEDFUL_LOG";
pub const DEFAULT_LOG_FILTER: &str = "needful=info,sqlx=warn";
const APP_DIR: &str = "needful";
const DB_FILE: &str = "needful.sqlite3";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no data directory available; pass --data-dir or set NEEDFUL_DATA_DIR")]
    NoDataDir,
    #[error("{0} is set but empty")]
    Empty(&'static str),
}

/// Values given on the command line. They win over the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub db: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub log: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub log_filter: String,
}

impl Config {
    pub fn resolve(overrides: Overrides) -> Result<Self, ConfigError> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok(), dirs::data_dir)
    }

    pub fn resolve_with<E, D>(
        overrides: Overrides,
        env: E,
        default_base: D,
    ) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
        D: FnOnce() -> Option<PathBuf>,
    {
        let env_path = |key: &'static str| -> Result<Option<PathBuf>, ConfigError> {
            match env(key) {
                Some(value) if value.trim().is_empty() => Err(ConfigError::Empty(key)),
                Some(value) => Ok(Some(PathBuf::from(value))),
                None => Ok(None),
            }
        };

        let data_dir = match overrides.data_dir {
            Some(dir) => dir,
            None => match env_path(ENV_DATA_DIR)? {
                Some(dir) => dir,
                None => default_base()
                    .map(|base| base.join(APP_DIR))
                    .ok_or(ConfigError::NoDataDir)?,
            },
        };

        let db_path = match overrides.db {
            Some(path) => path,
            None => env_path(ENV_DB)?.unwrap_or_else(|| data_dir.join(DB_FILE)),
        };

        let log_filter = overrides
            .log
            .or_else(|| env(ENV_LOG))
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            data_dir,
            db_path,
            log_filter,
        })
    }

    pub fn session_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    /// Session file for a user. The name is a digest so any user id is a safe file name.
    pub fn session_file(&self, user_id: &str) -> PathBuf {
        let digest = Sha256::digest(user_id.as_bytes());
        let name: String = digest.iter().take(12).map(|b| format!("{b:02x}")).collect();
        self.session_dir().join(format!("{name}.json"))
    }
}
