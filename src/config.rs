// ⚙️ Configuration - environment files and database location

use std::path::PathBuf;

use crate::error::{IngestError, Result};

/// Environment variable holding the database path
pub const DB_ENV_VAR: &str = "DIRECTORY_DB";

/// Loaded in order; earlier files win because dotenvy never overrides a set variable
pub const ENV_FILES: [&str; 2] = [".env.local", ".env"];

/// Load `.env.local` then `.env` if present. Call before parsing the CLI so
/// `env = "DIRECTORY_DB"` sees values from the files.
pub fn load_env_files() {
    for file in ENV_FILES {
        match dotenvy::from_filename(file) {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded env file"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(file, error = %e, "could not read env file"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
}

impl Config {
    /// `db` is the `--db` flag (already merged with DIRECTORY_DB by clap)
    pub fn resolve(db: Option<PathBuf>) -> Result<Self> {
        let db_path = db
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| {
                IngestError::Configuration(format!(
                    "database path missing: pass --db <path> or set {}",
                    DB_ENV_VAR
                ))
            })?;

        Ok(Self { db_path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_db_path_is_configuration_error() {
        let err = Config::resolve(None).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains(DB_ENV_VAR));

        assert!(Config::resolve(Some(PathBuf::new())).is_err());
    }

    #[test]
    fn test_db_path_passthrough() {
        let config = Config::resolve(Some(PathBuf::from("directory.db"))).unwrap();
        assert_eq!(config.db_path, PathBuf::from("directory.db"));
    }
}
