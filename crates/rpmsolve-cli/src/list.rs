//! List command - query the loaded universe.

use anyhow::{Context, Result};
use clap::Args;
use console::style;

use rpmsolve_core::Query;
use rpmsolve_evr::Reldep;

use crate::repos::RepoArgs;

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub repos: RepoArgs,

    /// Name glob, e.g. "python3-*"
    #[arg(value_name = "PATTERN")]
    pub pattern: Option<String>,

    /// Only installed packages
    #[arg(long, conflicts_with_all = ["available", "upgrades"])]
    pub installed: bool,

    /// Only available packages
    #[arg(long)]
    pub available: bool,

    /// Only available upgrades of installed packages
    #[arg(long)]
    pub upgrades: bool,

    /// Only the newest version of each name and arch
    #[arg(long)]
    pub latest: bool,

    /// Only packages providing a dependency, e.g. "libz.so.1" or "bash >= 5"
    #[arg(long, value_name = "DEP")]
    pub whatprovides: Option<String>,
}

pub fn execute(args: ListArgs) -> Result<u8> {
    let resolver = args.repos.load()?;
    let universe = resolver.universe().context("No package universe was loaded")?;

    let mut query = Query::new(universe);
    if let Some(pattern) = &args.pattern {
        query = query.name_glob(pattern);
    }
    if let Some(dep) = &args.whatprovides {
        let dep = Reldep::parse(dep).with_context(|| format!("Invalid dependency \"{}\"", dep))?;
        query = query.provides(dep);
    }
    if args.installed {
        query = query.installed();
    }
    if args.available {
        query = query.available();
    }
    if args.upgrades {
        query = query.upgrades();
    }
    if args.latest {
        query = query.latest();
    }

    let ids = query.sorted();
    if ids.is_empty() {
        eprintln!("{}", style("No matching packages").yellow());
        return Ok(1);
    }

    let width = ids
        .iter()
        .map(|&id| universe[id].nevra().len())
        .max()
        .unwrap_or(0);
    for id in ids {
        let pkg = &universe[id];
        println!("{:<width$}  {}", pkg.nevra(), style(&pkg.repo).dim(), width = width);
    }
    Ok(0)
}
