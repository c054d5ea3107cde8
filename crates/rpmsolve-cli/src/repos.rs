//! Repository and configuration arguments shared by every command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use rpmsolve_core::{JsonRepo, LogSink, RepoSource, Resolver, ResolverConfig};

#[derive(Args, Debug, Clone)]
pub struct RepoArgs {
    /// Installed packages, a JSON array of records
    #[arg(long, value_name = "FILE")]
    pub system: Option<PathBuf>,

    /// Available repository as ID=FILE or ID:PRIORITY=FILE (repeatable)
    #[arg(long = "repo", value_name = "ID=FILE", value_parser = parse_repo)]
    pub repos: Vec<RepoSpec>,

    /// Config file (default: rpmsolve.json in the config dir)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Ignore RPMSOLVE_* environment variables
    #[arg(long)]
    pub no_env: bool,

    /// Hide available packages whose name matches GLOB (repeatable)
    #[arg(long = "exclude", value_name = "GLOB")]
    pub excludes: Vec<String>,

    /// Native architecture
    #[arg(long)]
    pub arch: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepoSpec {
    pub id: String,
    pub priority: Option<i32>,
    pub path: PathBuf,
}

fn parse_repo(s: &str) -> std::result::Result<RepoSpec, String> {
    let (head, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ID=FILE, got \"{}\"", s))?;

    let (id, priority) = match head.split_once(':') {
        Some((id, prio)) => {
            let prio = prio
                .parse::<i32>()
                .map_err(|_| format!("invalid priority \"{}\"", prio))?;
            (id, Some(prio))
        }
        None => (head, None),
    };

    if id.is_empty() || path.is_empty() {
        return Err(format!("expected ID=FILE, got \"{}\"", s));
    }

    Ok(RepoSpec {
        id: id.to_string(),
        priority,
        path: PathBuf::from(path),
    })
}

impl RepoArgs {
    fn sources(&self) -> Vec<JsonRepo> {
        let mut sources = Vec::new();
        if let Some(path) = &self.system {
            sources.push(JsonRepo::system(path));
        }
        for spec in &self.repos {
            let repo = JsonRepo::new(&spec.id, &spec.path);
            sources.push(match spec.priority {
                Some(prio) => repo.with_priority(prio),
                None => repo,
            });
        }
        sources
    }

    fn config(&self) -> Result<ResolverConfig> {
        let mut config = ResolverConfig::build(self.config.as_ref(), !self.no_env)
            .context("Failed to load configuration")?;
        config.excludes.extend(self.excludes.iter().cloned());
        if self.arch.is_some() {
            config.arch = self.arch.clone();
        }
        Ok(config)
    }

    /// Run the cycle up to SACK_READY.
    pub fn load(&self) -> Result<Resolver> {
        let sources = self.sources();
        let refs: Vec<&dyn RepoSource> = sources.iter().map(|s| s as &dyn RepoSource).collect();

        let mut resolver = Resolver::new()
            .with_config(self.config()?)
            .with_diagnostics(Arc::new(LogSink));
        resolver.load_config()?;
        resolver
            .download_metadata(&refs)
            .context("Failed to load repository metadata")?;
        resolver.load_sack()?;
        Ok(resolver)
    }

    /// Run the cycle up to BUILD_TRANSACTION.
    pub fn open(&self) -> Result<Resolver> {
        let mut resolver = self.load()?;
        resolver.build_transaction()?;
        Ok(resolver)
    }
}
