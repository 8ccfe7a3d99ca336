use crate::error::{ExtractorError, Result};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_OUTPUT_DIR: &str = "./output";

#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub user: String,
    pub password: String,
    pub connect_string: String,
    pub pool_min: u32,
    pub pool_max: u32,
    pub pool_increment: u32,
}

// Keep the password out of logs.
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("user", &self.user)
            .field("password", &"***")
            .field("connect_string", &self.connect_string)
            .field("pool_min", &self.pool_min)
            .field("pool_max", &self.pool_max)
            .field("pool_increment", &self.pool_increment)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub pdf_output_dir: PathBuf,
}

impl AppConfig {
    /// Reads the process environment. Callers load `.env` beforehand.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// `DB_USER`, `DB_PASSWORD` and `DB_CONNECT_STRING` are required and must not be
    /// blank. Pool sizes default to 1/10/1 and the output directory to `./output`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    ExtractorError::Config(format!("missing required setting {key}"))
                })
        };
        let pool_size = |key: &str, default: u32| -> Result<u32> {
            match lookup(key).filter(|v| !v.trim().is_empty()) {
                None => Ok(default),
                Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
                    ExtractorError::Config(format!("{key} must be a non-negative integer, got {raw:?}"))
                }),
            }
        };

        let database = DatabaseConfig {
            user: required("DB_USER")?,
            password: required("DB_PASSWORD")?,
            connect_string: required("DB_CONNECT_STRING")?,
            pool_min: pool_size("DB_POOL_MIN", 1)?,
            pool_max: pool_size("DB_POOL_MAX", 10)?,
            pool_increment: pool_size("DB_POOL_INCREMENT", 1)?,
        };

        if database.pool_max == 0 || database.pool_min > database.pool_max {
            return Err(ExtractorError::Config(format!(
                "pool sizes are inconsistent: min {} max {}",
                database.pool_min, database.pool_max
            )));
        }

        let pdf_output_dir = lookup("PDF_OUTPUT_DIR")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string());

        Ok(Self {
            database,
            pdf_output_dir: PathBuf::from(pdf_output_dir),
        })
    }
}
