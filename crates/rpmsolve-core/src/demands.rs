use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ResolverConfig;

/// How far a load may rely on cached metadata instead of fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOnly {
    /// Always refresh.
    #[default]
    Disabled,
    /// Metadata may come from cache; packages are still fetched.
    Metadata,
    /// Never touch the network; missing cache entries count as empty.
    All,
}

impl CacheOnly {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "disabled" | "false" | "0" => Some(CacheOnly::Disabled),
            "metadata" => Some(CacheOnly::Metadata),
            "all" | "true" | "1" => Some(CacheOnly::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOnly::Disabled => "disabled",
            CacheOnly::Metadata => "metadata",
            CacheOnly::All => "all",
        }
    }
}

impl fmt::Display for CacheOnly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-call resolution options. Copied into every job; never shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Demands {
    /// Erase installed packages when that is the only way to satisfy a job.
    pub allow_erasing: bool,
    /// Only the best candidate of each job is acceptable.
    pub best: bool,
    pub cache_only: CacheOnly,
    /// Allow an upgrade or distro-sync job to move to an older build.
    pub allow_downgrade: bool,
    /// Remove dependencies that are no longer needed after an erase.
    pub clean_deps: bool,
}

impl Demands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_erasing(mut self, allow: bool) -> Self {
        self.allow_erasing = allow;
        self
    }

    pub fn best(mut self, best: bool) -> Self {
        self.best = best;
        self
    }

    pub fn cache_only(mut self, level: CacheOnly) -> Self {
        self.cache_only = level;
        self
    }

    pub fn allow_downgrade(mut self, allow: bool) -> Self {
        self.allow_downgrade = allow;
        self
    }

    pub fn clean_deps(mut self, clean: bool) -> Self {
        self.clean_deps = clean;
        self
    }
}

impl From<&ResolverConfig> for Demands {
    fn from(config: &ResolverConfig) -> Self {
        Self {
            allow_erasing: config.allow_erasing,
            best: config.best,
            cache_only: config.cache_only,
            allow_downgrade: config.allow_downgrade,
            clean_deps: config.clean_requirements_on_remove,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_is_value_type() {
        let base = Demands::new();
        let relaxed = base.allow_erasing(true).best(true);
        assert!(!base.allow_erasing);
        assert!(relaxed.allow_erasing);
        assert!(relaxed.best);
    }

    #[test]
    fn test_cache_only_from_str() {
        assert_eq!(CacheOnly::from_str("metadata"), Some(CacheOnly::Metadata));
        assert_eq!(CacheOnly::from_str("ALL"), Some(CacheOnly::All));
        assert_eq!(CacheOnly::from_str("sometimes"), None);
    }

    #[test]
    fn test_from_config() {
        let mut config = ResolverConfig::default();
        config.best = true;
        config.clean_requirements_on_remove = true;
        let demands = Demands::from(&config);
        assert!(demands.best);
        assert!(demands.clean_deps);
        assert!(!demands.allow_erasing);
    }
}
