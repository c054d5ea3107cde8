use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::{ResolveError, Result};

/// Where a configuration value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Built-in default
    Default,
    /// From a config file
    File(PathBuf),
    /// From an environment variable
    Environment(String),
    /// Set programmatically
    Command,
}

impl ConfigSource {
    pub fn as_str(&self) -> &str {
        match self {
            ConfigSource::Default => "default",
            ConfigSource::File(_) => "file",
            ConfigSource::Environment(var) => var,
            ConfigSource::Command => "command",
        }
    }
}

/// Config file contents before they are merged into a
/// [`ResolverConfig`](super::ResolverConfig).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawConfig {
    pub values: IndexMap<String, serde_json::Value>,
}

/// Loads configuration files and environment overrides
#[derive(Debug)]
pub struct ConfigLoader {
    use_environment: bool,
}

impl ConfigLoader {
    pub fn new(use_environment: bool) -> Self {
        Self { use_environment }
    }

    /// Non-empty `RPMSOLVE_*` variable, if the environment is enabled
    pub fn get_env(&self, var: &str) -> Option<String> {
        if !self.use_environment {
            return None;
        }

        env::var(var).ok().filter(|s| !s.is_empty())
    }

    /// The configuration directory
    pub fn get_config_dir(&self) -> PathBuf {
        if let Some(dir) = self.get_env("RPMSOLVE_CONFIG_DIR") {
            return PathBuf::from(dir);
        }

        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "rpmsolve") {
            proj_dirs.config_dir().to_path_buf()
        } else if let Some(home_dir) = directories::BaseDirs::new() {
            home_dir.home_dir().join(".rpmsolve")
        } else {
            PathBuf::from(".rpmsolve")
        }
    }

    /// Default config file location
    pub fn default_config_file(&self) -> PathBuf {
        self.get_config_dir().join("rpmsolve.json")
    }

    /// Load a JSON config file; a missing file yields an empty config
    pub fn load_config_file<P: AsRef<Path>>(&self, path: P) -> Result<RawConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(RawConfig::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ResolveError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let config: RawConfig = serde_json::from_str(&contents)
            .map_err(|e| ResolveError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        Ok(config)
    }

    /// Environment variable name for a config key.
    /// Converts "allow-erasing" to "RPMSOLVE_ALLOW_ERASING"
    pub fn env_var_name(key: &str) -> String {
        format!("RPMSOLVE_{}", key.replace('-', "_").to_uppercase())
    }

    pub fn get_env_config(&self, key: &str) -> Option<String> {
        self.get_env(&Self::env_var_name(key))
    }

    pub fn get_env_bool(&self, key: &str) -> Option<bool> {
        self.get_env_config(key).map(|val| {
            !matches!(val.to_lowercase().as_str(), "false" | "0" | "no" | "off")
        })
    }

    pub fn get_env_u64(&self, key: &str) -> Option<u64> {
        self.get_env_config(key).and_then(|val| val.parse().ok())
    }

    /// Comma or whitespace separated list
    pub fn get_env_list(&self, key: &str) -> Option<Vec<String>> {
        self.get_env_config(key).map(|val| {
            val.split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_source_as_str() {
        assert_eq!(ConfigSource::Default.as_str(), "default");
        assert_eq!(ConfigSource::File(PathBuf::from("x")).as_str(), "file");
        assert_eq!(ConfigSource::Command.as_str(), "command");
        assert_eq!(
            ConfigSource::Environment("RPMSOLVE_BEST".to_string()).as_str(),
            "RPMSOLVE_BEST"
        );
    }

    #[test]
    fn test_env_var_name() {
        assert_eq!(ConfigLoader::env_var_name("allow-erasing"), "RPMSOLVE_ALLOW_ERASING");
        assert_eq!(ConfigLoader::env_var_name("best"), "RPMSOLVE_BEST");
    }

    #[test]
    fn test_env_disabled() {
        let loader = ConfigLoader::new(false);
        assert_eq!(loader.get_env("PATH"), None);
        assert_eq!(loader.get_env_bool("best"), None);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let loader = ConfigLoader::new(false);
        let raw = loader.load_config_file(dir.path().join("nope.json")).unwrap();
        assert!(raw.values.is_empty());
    }

    #[test]
    fn test_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rpmsolve.json");
        fs::write(&path, "{ not json").unwrap();

        let loader = ConfigLoader::new(false);
        assert!(matches!(
            loader.load_config_file(&path),
            Err(ResolveError::Config(_))
        ));
    }

    #[test]
    fn test_directories() {
        let loader = ConfigLoader::new(false);
        assert!(loader.default_config_file().ends_with("rpmsolve.json"));
        assert!(loader.default_config_file().starts_with(loader.get_config_dir()));
    }
}
