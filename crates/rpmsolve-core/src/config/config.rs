use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::source::{ConfigLoader, ConfigSource, RawConfig};
use crate::demands::CacheOnly;
use crate::error::{ResolveError, Result};

/// Persistent resolver settings. Per-call [`Demands`](crate::Demands) are
/// seeded from these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ResolverConfig {
    /// Only accept the best candidate for every job
    pub best: bool,

    /// Let the solver erase installed packages to resolve conflicts
    pub allow_erasing: bool,

    /// Remove dependencies left unneeded by an erase
    pub clean_requirements_on_remove: bool,

    /// Let upgrade and distro-sync jobs pick older builds
    pub allow_downgrade: bool,

    pub cache_only: CacheOnly,

    /// Packages (or provides) that may be installed in several versions
    pub installonly_pkgs: Vec<String>,

    /// Packages that must never be erased
    pub protected_packages: Vec<String>,

    /// Name globs hidden from every query
    pub excludes: Vec<String>,

    /// Native architecture; `None` accepts every arch equally
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,

    /// Search budget of the built-in solver
    pub max_solver_steps: u64,

    #[serde(skip)]
    sources: HashMap<String, ConfigSource>,
}

fn default_installonly_pkgs() -> Vec<String> {
    vec![
        "kernel".to_string(),
        "kernel-core".to_string(),
        "installonlypkg(kernel)".to_string(),
    ]
}

fn default_max_solver_steps() -> u64 {
    100_000
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            best: false,
            allow_erasing: false,
            clean_requirements_on_remove: true,
            allow_downgrade: false,
            cache_only: CacheOnly::default(),
            installonly_pkgs: default_installonly_pkgs(),
            protected_packages: Vec::new(),
            excludes: Vec::new(),
            arch: None,
            max_solver_steps: default_max_solver_steps(),
            sources: HashMap::new(),
        }
    }
}

const KEYS: &[&str] = &[
    "best",
    "allow-erasing",
    "clean-requirements-on-remove",
    "allow-downgrade",
    "cache-only",
    "installonly-pkgs",
    "protected-packages",
    "excludes",
    "arch",
    "max-solver-steps",
];

impl ResolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from defaults, the config file (explicit path or the default
    /// location) and, if enabled, `RPMSOLVE_*` variables.
    pub fn build<P: AsRef<Path>>(config_file: Option<P>, use_environment: bool) -> Result<Self> {
        let loader = ConfigLoader::new(use_environment);
        let mut config = Self::default();

        for key in KEYS {
            config.sources.insert(key.to_string(), ConfigSource::Default);
        }

        let path = match config_file {
            Some(p) => p.as_ref().to_path_buf(),
            None => loader.default_config_file(),
        };
        let raw = loader.load_config_file(&path)?;
        config.merge_raw_config(raw, ConfigSource::File(path))?;

        if use_environment {
            config.apply_env_overrides(&loader);
        }

        Ok(config)
    }

    /// Where the current value of `key` came from
    pub fn get_source(&self, key: &str) -> Option<&ConfigSource> {
        self.sources.get(key)
    }

    /// Set a value programmatically, using the config file syntax.
    pub fn set(&mut self, key: &str, value: serde_json::Value) -> Result<()> {
        self.merge_config_value(key, value, ConfigSource::Command)
    }

    fn merge_raw_config(&mut self, raw: RawConfig, source: ConfigSource) -> Result<()> {
        for (key, value) in raw.values {
            self.merge_config_value(&key, value, source.clone())?;
        }
        Ok(())
    }

    fn merge_config_value(
        &mut self,
        key: &str,
        value: serde_json::Value,
        source: ConfigSource,
    ) -> Result<()> {
        let invalid = || ResolveError::Config(format!("Invalid value for \"{}\": {}", key, value));

        match key {
            "best" => self.best = value.as_bool().ok_or_else(invalid)?,
            "allow-erasing" => self.allow_erasing = value.as_bool().ok_or_else(invalid)?,
            "clean-requirements-on-remove" => {
                self.clean_requirements_on_remove = value.as_bool().ok_or_else(invalid)?
            }
            "allow-downgrade" => self.allow_downgrade = value.as_bool().ok_or_else(invalid)?,
            "cache-only" => {
                self.cache_only = match &value {
                    serde_json::Value::Bool(true) => CacheOnly::All,
                    serde_json::Value::Bool(false) => CacheOnly::Disabled,
                    serde_json::Value::String(s) => CacheOnly::from_str(s).ok_or_else(invalid)?,
                    _ => return Err(invalid()),
                }
            }
            "installonly-pkgs" => self.installonly_pkgs = string_list(&value).ok_or_else(invalid)?,
            "protected-packages" => {
                self.protected_packages = string_list(&value).ok_or_else(invalid)?
            }
            "excludes" => self.excludes = string_list(&value).ok_or_else(invalid)?,
            "arch" => {
                self.arch = match &value {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) => Some(s.clone()),
                    _ => return Err(invalid()),
                }
            }
            "max-solver-steps" => self.max_solver_steps = value.as_u64().ok_or_else(invalid)?,
            _ => {
                return Err(ResolveError::Config(format!("Unknown config key \"{}\"", key)));
            }
        }

        self.sources.insert(key.to_string(), source);
        Ok(())
    }

    fn apply_env_overrides(&mut self, loader: &ConfigLoader) {
        let mark = |sources: &mut HashMap<String, ConfigSource>, key: &str| {
            sources.insert(
                key.to_string(),
                ConfigSource::Environment(ConfigLoader::env_var_name(key)),
            );
        };

        for (key, slot) in [
            ("best", &mut self.best),
            ("allow-erasing", &mut self.allow_erasing),
            ("clean-requirements-on-remove", &mut self.clean_requirements_on_remove),
            ("allow-downgrade", &mut self.allow_downgrade),
        ] {
            if let Some(b) = loader.get_env_bool(key) {
                *slot = b;
                mark(&mut self.sources, key);
            }
        }

        if let Some(level) = loader
            .get_env_config("cache-only")
            .and_then(|v| CacheOnly::from_str(&v))
        {
            self.cache_only = level;
            mark(&mut self.sources, "cache-only");
        }

        for (key, slot) in [
            ("installonly-pkgs", &mut self.installonly_pkgs),
            ("protected-packages", &mut self.protected_packages),
            ("excludes", &mut self.excludes),
        ] {
            if let Some(list) = loader.get_env_list(key) {
                *slot = list;
                mark(&mut self.sources, key);
            }
        }

        if let Some(arch) = loader.get_env_config("arch") {
            self.arch = Some(arch);
            mark(&mut self.sources, "arch");
        }

        if let Some(steps) = loader.get_env_u64("max-solver-steps") {
            self.max_solver_steps = steps;
            mark(&mut self.sources, "max-solver-steps");
        }
    }
}

fn string_list(value: &serde_json::Value) -> Option<Vec<String>> {
    match value {
        serde_json::Value::String(s) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        ),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(String::from))
            .collect(),
        _ => None,
    }
}
