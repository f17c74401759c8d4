use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;

use crate::cache::DEFAULT_AVERAGE_FIELD;
use crate::data_path::{DATA_PATH_ENV, DataPath};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub stats: StatsConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StoreConfig {
    /// Backing JSON file. Overridden by the CATALOG_DATA_PATH environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StatsConfig {
    /// Numeric field averaged by `stats`
    pub average_field: String,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            average_field: DEFAULT_AVERAGE_FIELD.to_string(),
        }
    }
}

thread_local! {
    static TEST_CONFIG_PATH: RefCell<Option<PathBuf>> = const { RefCell::new(None) };
}

#[cfg(test)]
pub fn set_test_config_path(path: PathBuf) {
    TEST_CONFIG_PATH.with(|p| *p.borrow_mut() = Some(path));
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        #[cfg(test)]
        {
            if let Some(path) = TEST_CONFIG_PATH.with(|p| p.borrow().clone()) {
                return Ok(path);
            }
        }

        Ok(dirs::home_dir()
            .context("Could not find home directory")?
            .join(".catalog.toml"))
    }

    pub fn load() -> Result<Option<Config>> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        Ok(Some(config))
    }

    pub fn save(&self, silent: bool) -> Result<()> {
        let config_path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, content).context("Failed to write config file")?;

        if !silent {
            println!("Configuration saved to: {}", config_path.display());
        }

        Ok(())
    }

    pub fn set_data_path(&mut self, path: String) {
        self.store.data_path = if path.trim().is_empty() {
            None
        } else {
            Some(path)
        };
    }

    pub fn set_average_field(&mut self, field: String) {
        self.stats.average_field = field;
    }
}

// CLI helper functions
pub fn create_default_config(overwrite: bool) -> Result<()> {
    let config = Config::default();
    if !std::fs::exists(Config::config_path()?)? || overwrite {
        config.save(true)?;

        println!("Created default configuration file.");
        println!("Point it at your items file with:");
        println!("   catalog config set data-path /path/to/items.json");
        println!("or edit");
        println!("   {}", Config::config_path()?.display());
    } else {
        println!("Configuration already exists.  Pass `--overwrite` to overwrite.");
    }

    Ok(())
}

pub fn show_config() -> Result<()> {
    match Config::load()? {
        Some(config) => {
            println!("Current configuration:");
            println!(
                "   Data Path: {}",
                config.store.data_path.as_deref().unwrap_or("(default)")
            );
            println!(
                "   Resolved:  {}",
                DataPath::from_config(config.store.data_path.as_deref())
                    .resolve()
                    .display()
            );
            if std::env::var_os(DATA_PATH_ENV).is_some() {
                println!("   ({DATA_PATH_ENV} is set and takes precedence)");
            }
            println!("   Average Field: {}", config.stats.average_field);
        }
        None => {
            println!("No configuration file found.");
            println!("   Run 'catalog config init' to create one.");
        }
    }
    Ok(())
}

pub fn set_config_value(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load()?.unwrap_or_default();

    match key {
        "data-path" => config.set_data_path(value.to_string()),
        "average-field" => {
            if value.trim().is_empty() {
                anyhow::bail!("average-field cannot be empty");
            }
            config.set_average_field(value.to_string());
        }
        _ => anyhow::bail!("Unknown config key: {}", key),
    }

    config.save(false)?;
    Ok(())
}
