//! Configuration file loading

use super::schema::ConfigSchema;
use crate::error::{Error, Result, ResultExt};
use std::path::{Path, PathBuf};

/// Environment variable that overrides `database.url`
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Configuration wrapper
#[derive(Debug, Clone)]
pub struct Config {
    /// Parsed settings
    pub schema: ConfigSchema,
    /// File the settings came from, if any
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file path or the standard locations
    ///
    /// An explicit path that does not exist is an error; when no path is
    /// given and no file is found, defaults are used.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => {
                let expanded = PathBuf::from(shellexpand::tilde(p).as_ref());
                if !expanded.exists() {
                    return Err(Error::config_not_found(&expanded));
                }
                Some(expanded)
            }
            None => find_config_file(),
        };

        let mut schema = if let Some(ref p) = config_path {
            load_config_file(p)?
        } else {
            ConfigSchema::default()
        };

        apply_env_overrides(&mut schema, |key| std::env::var(key).ok());

        Ok(Self {
            schema,
            path: config_path,
        })
    }

    /// Serialize the effective settings back to TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(&self.schema)?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema: ConfigSchema::default(),
            path: None,
        }
    }
}

/// Apply environment overrides using the given lookup
pub fn apply_env_overrides<F>(schema: &mut ConfigSchema, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(DATABASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
        schema.database.url = Some(url);
    }
}

/// Find configuration file in standard locations
fn find_config_file() -> Option<PathBuf> {
    let local = [".proximity.toml", "proximity.toml", ".config/proximity.toml"]
        .into_iter()
        .map(PathBuf::from);

    let user = dirs::config_dir().map(|dir| dir.join("proximity").join("config.toml"));

    local.chain(user).find(|candidate| candidate.exists())
}

/// Load and parse a TOML configuration file
fn load_config_file(path: &Path) -> Result<ConfigSchema> {
    let content = std::fs::read_to_string(path)
        .map_err(Error::from)
        .context(format!("Failed to read config file {}", path.display()))?;

    toml::from_str(&content)
        .map_err(Error::from)
        .context(format!("Failed to parse config file {}", path.display()))
}
