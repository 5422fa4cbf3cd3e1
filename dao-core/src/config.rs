use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::tls::TlsError;

/// Config location relative to the base directory handed to [`DatabaseConfig::load`]
pub const CONFIG_RELATIVE_PATH: &str = "configs/dao.toml";

/// Environment variable that overrides `dataSource` at runtime
pub const DATASOURCE_ENV: &str = "DAO_DATASOURCE";

/// Database driver named by the `type` key.
///
/// Anything that is not `mysql` or `postgres` (including the literal
/// `undefined`) is kept verbatim so bootstrap can report it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DriverType {
    MySql,
    Postgres,
    Unsupported(String),
}

impl DriverType {
    pub fn as_str(&self) -> &str {
        match self {
            DriverType::MySql => "mysql",
            DriverType::Postgres => "postgres",
            DriverType::Unsupported(other) => other,
        }
    }
}

impl From<String> for DriverType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "mysql" => DriverType::MySql,
            "postgres" => DriverType::Postgres,
            _ => DriverType::Unsupported(value),
        }
    }
}

impl From<&str> for DriverType {
    fn from(value: &str) -> Self {
        DriverType::from(value.to_string())
    }
}

impl From<DriverType> for String {
    fn from(value: DriverType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for DriverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database connection settings stored in `configs/dao.toml`.
///
/// Keys are camelCase. The PascalCase keys of older files (`Type`,
/// `DataSource`, `[TLS]`, ...) are accepted on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseConfig {
    #[serde(rename = "type", alias = "Type")]
    pub driver: DriverType,
    #[serde(alias = "DataSource")]
    pub data_source: String,
    #[serde(alias = "MaxIdle")]
    pub max_idle: u32,
    #[serde(alias = "MaxOpen")]
    pub max_open: u32,
    /// Log every SQL statement at debug level
    #[serde(rename = "isLoger", alias = "IsLoger")]
    pub is_logger: bool,
    #[serde(alias = "TLS")]
    pub tls: TlsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TlsConfig {
    #[serde(alias = "Enabled")]
    pub enabled: bool,
    #[serde(alias = "CertFile")]
    pub cert_file: String,
    #[serde(alias = "KeyFile")]
    pub key_file: String,
    #[serde(alias = "CaCert")]
    pub ca_cert: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DriverType::MySql,
            data_source: default_data_source(),
            max_idle: 30,
            max_open: 30,
            is_logger: true,
            tls: TlsConfig::default(),
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cert_file: "db_client.pem".to_string(),
            key_file: "db_client.key".to_string(),
            ca_cert: "db_ca.pem".to_string(),
        }
    }
}

fn default_data_source() -> String {
    "root:Zsba@mysql2018*@tcp(127.0.0.1:3306)/switch?charset=utf8&parseTime=true".to_string()
}

impl DatabaseConfig {
    /// Resolve `<dir>/configs/dao.toml` to an absolute path
    pub fn config_path(dir: impl AsRef<Path>) -> Result<PathBuf> {
        let path = dir.as_ref().join(CONFIG_RELATIVE_PATH);
        if path.is_absolute() {
            return Ok(path);
        }
        let cwd = env::current_dir().map_err(|e| Error::config_io(&path, e))?;
        Ok(cwd.join(path))
    }

    /// Load the config below `dir`.
    ///
    /// On first run the file does not exist yet: the built-in defaults are
    /// written to it and returned.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let path = Self::config_path(dir)?;

        if path.exists() {
            let config = Self::from_file(&path)?;
            debug!("Loaded database config from {}", path.display());
            Ok(config)
        } else {
            let config = Self::default();
            config.save(&path)?;
            info!("Wrote default database config to {}", path.display());
            Ok(config)
        }
    }

    /// Parse a config file without the create-on-missing behaviour of [`load`](Self::load)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::config_io(path, e))?;
        toml::from_str(&content).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the config, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::config_io(parent, e))?;
        }

        let toml_str = self.to_toml()?;
        fs::write(path, toml_str).map_err(|e| Error::config_io(path, e))
    }

    /// Apply `DAO_DATASOURCE` from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| env::var(key).ok())
    }

    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(data_source) = lookup(DATASOURCE_ENV).filter(|v| !v.trim().is_empty()) {
            debug!("dataSource overridden by {}", DATASOURCE_ENV);
            self.data_source = data_source;
        }
        self
    }

    /// Check the invariants bootstrap relies on
    pub fn validate(&self) -> Result<()> {
        if self.data_source.trim().is_empty() {
            return Err(Error::invalid_config("dataSource must not be empty"));
        }
        if self.max_open == 0 {
            return Err(Error::invalid_config("maxOpen must be at least 1"));
        }
        self.tls.validate()?;
        Ok(())
    }
}

impl TlsConfig {
    pub fn validate(&self) -> std::result::Result<(), TlsError> {
        if !self.enabled {
            return Ok(());
        }
        if self.ca_cert.trim().is_empty() {
            return Err(TlsError::MissingRootCa);
        }
        match (self.cert_file.trim().is_empty(), self.key_file.trim().is_empty()) {
            (false, true) => Err(TlsError::MissingPrivateKey(PathBuf::from(&self.cert_file))),
            (true, false) => Err(TlsError::Config(
                "keyFile is set but certFile is empty".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Client certificate path, if one is configured
    pub fn client_cert(&self) -> Option<&Path> {
        non_empty_path(&self.cert_file)
    }

    pub fn client_key(&self) -> Option<&Path> {
        non_empty_path(&self.key_file)
    }
}

fn non_empty_path(value: &str) -> Option<&Path> {
    if value.trim().is_empty() {
        None
    } else {
        Some(Path::new(value))
    }
}

/// Load `.env` from the current directory, if present.
///
/// Variables already set in the environment win.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!("Loaded .env from {}", path.display()),
        Err(e) if e.not_found() => debug!("No .env file found"),
        Err(e) => debug!("Failed to load .env: {}", e),
    }
}
