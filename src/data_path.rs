use std::path::{Path, PathBuf};

/// Environment variable that overrides every other data path setting.
pub const DATA_PATH_ENV: &str = "CATALOG_DATA_PATH";

/// Used when neither the environment nor the config names a file.
pub const DEFAULT_DATA_PATH: &str = "data/items.json";

/// Decides which file backs the catalog.
///
/// Resolution happens on every cache operation, so pointing the environment
/// variable at a different file takes effect on the next call.
#[derive(Debug, Clone)]
pub enum DataPath {
    Fixed(PathBuf),
    Resolved { configured: Option<PathBuf> },
}

impl DataPath {
    pub fn from_config(configured: Option<&str>) -> Self {
        Self::Resolved {
            configured: configured
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn resolve(&self) -> PathBuf {
        match self {
            Self::Fixed(path) => absolutize(path),
            Self::Resolved { configured } => {
                let from_env = std::env::var_os(DATA_PATH_ENV)
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from);
                let chosen = from_env
                    .or_else(|| configured.clone())
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH));
                absolutize(&chosen)
            }
        }
    }
}

fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_path_is_returned_absolute() {
        let path = DataPath::Fixed(PathBuf::from("/srv/catalog/items.json"));
        assert_eq!(path.resolve(), PathBuf::from("/srv/catalog/items.json"));

        let relative = DataPath::Fixed(PathBuf::from("items.json")).resolve();
        assert!(relative.is_absolute());
        assert!(relative.ends_with("items.json"));
    }

    #[test]
    fn blank_configured_path_is_ignored() {
        match DataPath::from_config(Some("  ")) {
            DataPath::Resolved { configured } => assert!(configured.is_none()),
            DataPath::Fixed(_) => panic!("expected resolved path"),
        }
    }

    #[test]
    fn configured_path_used_without_env_override() {
        // Only meaningful when the override is not set in the test environment.
        if std::env::var_os(DATA_PATH_ENV).is_some() {
            return;
        }
        let resolved = DataPath::from_config(Some("/var/lib/catalog/items.json")).resolve();
        assert_eq!(resolved, PathBuf::from("/var/lib/catalog/items.json"));

        let fallback = DataPath::from_config(None).resolve();
        assert!(fallback.is_absolute());
        assert!(fallback.ends_with(DEFAULT_DATA_PATH));
    }
}
