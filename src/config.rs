use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use directories::BaseDirs;
use serde::Deserialize;
use sqlx::postgres::PgSslMode;
use tracing::{debug, warn};

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_NAME: &str = "crtsh-subdomains";

pub const DEFAULT_DB_HOST: &str = "crt.sh";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_USER: &str = "guest";
pub const DEFAULT_DB_NAME: &str = "certwatch";
pub const DEFAULT_DB_SSL_MODE: &str = "disable";
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 2;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    /// File the settings were read from, if any
    pub config_path: Option<PathBuf>,
    pub database: DatabaseSettings,
    pub query_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub name: String,
    pub ssl_mode: PgSslMode,
    pub connect_timeout: Duration,
}

/// Values given on the command line; they win over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub db_host: Option<String>,
    pub db_port: Option<u16>,
    pub query_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ConfigFile {
    query_timeout_secs: u64,
    connect_timeout_secs: u64,
    database: DatabaseFile,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            database: DatabaseFile::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DatabaseFile {
    host: String,
    port: u16,
    user: String,
    name: String,
    sslmode: String,
}

impl Default for DatabaseFile {
    fn default() -> Self {
        Self {
            host: DEFAULT_DB_HOST.to_string(),
            port: DEFAULT_DB_PORT,
            user: DEFAULT_DB_USER.to_string(),
            name: DEFAULT_DB_NAME.to_string(),
            sslmode: DEFAULT_DB_SSL_MODE.to_string(),
        }
    }
}

fn config_root() -> Result<PathBuf> {
    let base = BaseDirs::new().context("unable to determine base directories")?;
    Ok(base.config_dir().join(APP_NAME))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_root()?.join(CONFIG_FILE_NAME))
}

/// Load settings from the config file (explicit or default location) and
/// apply command-line overrides on top.
///
/// A missing default config file is not an error; a missing explicit one is.
pub fn load(overrides: &Overrides) -> Result<Config> {
    let (path, required) = match &overrides.config {
        Some(path) => (path.clone(), true),
        None => (config_path()?, false),
    };

    let (file, source) = if path.exists() {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read configuration file at {}", path.display()))?;
        debug!(path = %path.display(), "loaded configuration file");
        (parse(&raw, &path)?, Some(path))
    } else if required {
        bail!("configuration file not found at {}", path.display());
    } else {
        (ConfigFile::default(), None)
    };

    resolve(file, source, overrides)
}

fn parse(raw: &str, path: &Path) -> Result<ConfigFile> {
    let value: toml::Value = toml::from_str(raw)
        .with_context(|| format!("failed to parse {} as TOML", path.display()))?;

    warn_unknown_keys(&value);

    value
        .try_into()
        .with_context(|| format!("failed to deserialize config from {}", path.display()))
}

fn resolve(file: ConfigFile, config_path: Option<PathBuf>, overrides: &Overrides) -> Result<Config> {
    let query_timeout_secs = overrides
        .query_timeout_secs
        .unwrap_or(file.query_timeout_secs);
    if query_timeout_secs == 0 {
        bail!("query timeout must be at least one second");
    }
    if file.connect_timeout_secs == 0 {
        bail!("`connect_timeout_secs` must be at least one second");
    }

    let host = overrides
        .db_host
        .clone()
        .unwrap_or(file.database.host)
        .trim()
        .to_string();
    if host.is_empty() {
        bail!("database host must not be empty");
    }

    let ssl_mode = PgSslMode::from_str(file.database.sslmode.trim())
        .with_context(|| format!("invalid `database.sslmode`: {}", file.database.sslmode))?;

    Ok(Config {
        config_path,
        database: DatabaseSettings {
            host,
            port: overrides.db_port.unwrap_or(file.database.port),
            user: file.database.user,
            name: file.database.name,
            ssl_mode,
            connect_timeout: Duration::from_secs(file.connect_timeout_secs),
        },
        query_timeout: Duration::from_secs(query_timeout_secs),
    })
}

fn warn_unknown_keys(value: &toml::Value) {
    let Some(table) = value.as_table() else {
        return;
    };

    let known = HashSet::from(["query_timeout_secs", "connect_timeout_secs", "database"]);
    for key in table.keys() {
        if !known.contains(key.as_str()) {
            warn!("unknown configuration key `{}`", key);
        }
    }

    if let Some(database) = table.get("database").and_then(|v| v.as_table()) {
        let known = HashSet::from(["host", "port", "user", "name", "sslmode"]);
        for key in database.keys() {
            if !known.contains(key.as_str()) {
                warn!("unknown database.* entry `{}`", key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(raw: &str) -> Result<ConfigFile> {
        parse(raw, Path::new("test.toml"))
    }

    #[test]
    fn test_defaults() {
        let config = resolve(ConfigFile::default(), None, &Overrides::default()).unwrap();
        assert_eq!(config.database.host, "crt.sh");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.user, "guest");
        assert_eq!(config.database.name, "certwatch");
        assert!(matches!(config.database.ssl_mode, PgSslMode::Disable));
        assert_eq!(config.query_timeout, Duration::from_secs(2));
        assert_eq!(config.database.connect_timeout, Duration::from_secs(10));
        assert!(config.config_path.is_none());
    }

    #[test]
    fn test_parse_partial_file() {
        let file = parse_str(
            r#"
            query_timeout_secs = 5

            [database]
            host = "db.internal"
            "#,
        )
        .unwrap();
        let config = resolve(file, None, &Overrides::default()).unwrap();
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.user, "guest");
        assert_eq!(config.query_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_overrides_win() {
        let file = parse_str(
            r#"
            query_timeout_secs = 5

            [database]
            host = "db.internal"
            port = 6543
            "#,
        )
        .unwrap();
        let overrides = Overrides {
            db_host: Some("127.0.0.1".to_string()),
            db_port: Some(15432),
            query_timeout_secs: Some(1),
            ..Default::default()
        };
        let config = resolve(file, None, &overrides).unwrap();
        assert_eq!(config.database.host, "127.0.0.1");
        assert_eq!(config.database.port, 15432);
        assert_eq!(config.query_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_sslmode_parsed() {
        let file = parse_str(
            r#"
            [database]
            sslmode = "require"
            "#,
        )
        .unwrap();
        let config = resolve(file, None, &Overrides::default()).unwrap();
        assert!(matches!(config.database.ssl_mode, PgSslMode::Require));
    }

    #[test]
    fn test_invalid_sslmode_rejected() {
        let file = parse_str(
            r#"
            [database]
            sslmode = "sometimes"
            "#,
        )
        .unwrap();
        assert!(resolve(file, None, &Overrides::default()).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let overrides = Overrides {
            query_timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(resolve(ConfigFile::default(), None, &overrides).is_err());

        let file = parse_str("connect_timeout_secs = 0").unwrap();
        assert!(resolve(file, None, &Overrides::default()).is_err());
    }

    #[test]
    fn test_empty_host_rejected() {
        let overrides = Overrides {
            db_host: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(resolve(ConfigFile::default(), None, &overrides).is_err());
    }

    #[test]
    fn test_unknown_keys_are_not_fatal() {
        let file = parse_str(
            r#"
            colour = "blue"

            [database]
            password = "nope"
            "#,
        )
        .unwrap();
        assert!(resolve(file, None, &Overrides::default()).is_ok());
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(parse_str("query_timeout_secs = ").is_err());
        assert!(parse_str("query_timeout_secs = \"soon\"").is_err());
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let overrides = Overrides {
            config: Some(dir.path().join("missing.toml")),
            ..Default::default()
        };
        assert!(load(&overrides).is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[database]\nport = 6000\n").unwrap();
        let overrides = Overrides {
            config: Some(path.clone()),
            ..Default::default()
        };
        let config = load(&overrides).unwrap();
        assert_eq!(config.database.port, 6000);
        assert_eq!(config.config_path, Some(path));
    }
}
