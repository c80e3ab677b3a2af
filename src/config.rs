/// Service configuration.
///
/// Loaded from a TOML file (default `snowobs.toml`); every table and key is
/// optional. After the file is read, `.env` is loaded and two environment
/// variables take precedence:
///
/// - `DATABASE_URL` replaces the `[database]` table entirely
/// - `SNOWOBS_CACHE_DIR` replaces `[cache].dir`
///
/// ```toml
/// [database]
/// host = "localhost"
/// dbname = "web_data"
/// connect_timeout_secs = 10
/// statement_timeout_secs = 300
///
/// [cache]
/// dir = "/var/cache/snowobs"
///
/// [output]
/// no_data_value = -99999.0
/// ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::DEFAULT_NO_DATA_VALUE;

pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const CACHE_DIR_VAR: &str = "SNOWOBS_CACHE_DIR";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Connection string taken from the environment, if any.
    #[serde(skip)]
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_dbname")]
    pub dbname: String,
    pub user: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Zero disables the server-side limit.
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dbname: default_dbname(),
            user: None,
            password: None,
            connect_timeout_secs: default_connect_timeout(),
            statement_timeout_secs: default_statement_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default = "default_no_data_value")]
    pub no_data_value: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            no_data_value: default_no_data_value(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    5432
}
fn default_dbname() -> String {
    "web_data".to_string()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_statement_timeout() -> u64 {
    300
}
fn default_no_data_value() -> f64 {
    DEFAULT_NO_DATA_VALUE
}

impl ServiceConfig {
    /// Parses a TOML document. Environment overrides are not applied.
    pub fn from_toml(text: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    /// Reads `path` if it exists (defaults otherwise), then applies `.env`
    /// and environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            Self::from_toml(&text, &path.display().to_string())?
        } else {
            Self::default()
        };

        dotenv::dotenv().ok();
        config.apply_overrides(env::var(DATABASE_URL_VAR).ok(), env::var(CACHE_DIR_VAR).ok());
        Ok(config)
    }

    fn apply_overrides(&mut self, database_url: Option<String>, cache_dir: Option<String>) {
        if let Some(url) = database_url.filter(|u| !u.trim().is_empty()) {
            self.database_url = Some(url);
        }
        if let Some(dir) = cache_dir.filter(|d| !d.trim().is_empty()) {
            self.cache.dir = Some(PathBuf::from(dir));
        }
    }

    /// Connection settings for `postgres`. A `DATABASE_URL` wins over the
    /// `[database]` table; timeouts from the table apply either way unless
    /// the URL sets its own connect timeout.
    pub fn postgres_config(&self) -> Result<postgres::Config, ConfigError> {
        let mut pg = match &self.database_url {
            Some(url) => url.parse::<postgres::Config>().map_err(ConfigError::Database)?,
            None => {
                let db = &self.database;
                let mut pg = postgres::Config::new();
                pg.host(&db.host).port(db.port).dbname(&db.dbname);
                if let Some(user) = &db.user {
                    pg.user(user);
                }
                if let Some(password) = &db.password {
                    pg.password(password);
                }
                pg
            }
        };
        if pg.get_connect_timeout().is_none() && self.database.connect_timeout_secs > 0 {
            pg.connect_timeout(Duration::from_secs(self.database.connect_timeout_secs));
        }
        Ok(pg)
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        match self.database.statement_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
