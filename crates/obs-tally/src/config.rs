use serde::{Deserialize, Serialize};
use std::path::Path;
use tally_core::{validate_tallies, ConfigError, Tally};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObsConnection {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub password: String,
}

impl ObsConnection {
    pub fn url(&self) -> Result<Url, ConfigError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(ConfigError::Connection("empty host".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Connection("port must be non-zero".to_string()));
        }
        Url::parse(&format!("ws://{host}:{}", self.port))
            .map_err(|err| ConfigError::Connection(format!("{host}:{}: {err}", self.port)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub obs: ObsConnection,
    pub tallies: Vec<Tally>,
    /// Light tallies for hidden sources too.
    #[serde(default)]
    pub include_invisible: bool,
}

impl Config {
    /// Read and validate a config file; `.toml` files are parsed as TOML,
    /// everything else as JSON.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let config = if is_toml {
            Self::from_toml_str(&text)?
        } else {
            Self::from_json_str(&text)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_tallies(&self.tallies)?;
        self.obs.url()?;
        Ok(())
    }
}
