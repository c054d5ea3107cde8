//! Resolve command - build a goal from the arguments and print the plan.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use std::sync::Arc;

use rpmsolve_core::{
    Demands, Goal, OperationKind, Reason, ResolveError, Selector, TransactionPlan, Universe,
};

use crate::repos::RepoArgs;

#[derive(Args, Debug)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub repos: RepoArgs,

    /// Packages to install (repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub install: Vec<String>,

    /// Packages to install when possible; no match or a broken package is not an error (repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub install_optional: Vec<String>,

    /// Packages to erase (repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub erase: Vec<String>,

    /// Packages to upgrade (repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub upgrade: Vec<String>,

    /// Upgrade every installed package
    #[arg(long)]
    pub upgrade_all: bool,

    /// Packages to move to the best available version (repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub distro_sync: Vec<String>,

    /// Packages to downgrade (repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub downgrade: Vec<String>,

    /// Record installed packages as user-installed (repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub mark_user: Vec<String>,

    /// Allow erasing installed packages to resolve conflicts
    #[arg(long)]
    pub allow_erasing: bool,

    /// Only accept the best candidate for every request
    #[arg(long)]
    pub best: bool,

    /// Allow upgrades to pick older builds
    #[arg(long)]
    pub allow_downgrade: bool,

    /// Keep dependencies that an erase leaves unneeded
    #[arg(long)]
    pub no_clean_deps: bool,
}

impl ResolveArgs {
    fn demands(&self, base: Demands) -> Demands {
        let mut demands = base;
        if self.allow_erasing {
            demands = demands.allow_erasing(true);
        }
        if self.best {
            demands = demands.best(true);
        }
        if self.allow_downgrade {
            demands = demands.allow_downgrade(true);
        }
        if self.no_clean_deps {
            demands = demands.clean_deps(false);
        }
        demands
    }

    fn fill(&self, goal: &mut Goal, demands: Demands) -> Result<()> {
        let selectors = |patterns: &[String]| -> Result<Vec<Selector>> {
            patterns
                .iter()
                .map(|p| Selector::parse(p).with_context(|| format!("Invalid package pattern \"{}\"", p)))
                .collect()
        };

        for sel in selectors(&self.install)? {
            goal.add_install(&sel, demands)?;
        }
        for sel in selectors(&self.install_optional)? {
            goal.add_install_optional(&sel, demands)?;
        }
        for sel in selectors(&self.erase)? {
            goal.add_erase(&sel, demands)?;
        }
        for sel in selectors(&self.upgrade)? {
            goal.add_upgrade(Some(&sel), demands)?;
        }
        if self.upgrade_all {
            goal.add_upgrade(None, demands)?;
        }
        for sel in selectors(&self.distro_sync)? {
            goal.add_distro_sync(Some(&sel), demands)?;
        }
        for sel in selectors(&self.downgrade)? {
            goal.add_downgrade(&sel, demands)?;
        }
        for sel in selectors(&self.mark_user)? {
            goal.add_reason_change(&sel, Reason::User, demands)?;
        }
        Ok(())
    }
}

pub fn execute(args: ResolveArgs) -> Result<u8> {
    let mut resolver = args.repos.open()?;
    let universe = Arc::clone(resolver.universe().context("No package universe was loaded")?);
    let demands = args.demands(resolver.demands());

    args.fill(resolver.goal_mut()?, demands)?;
    log::info!("{} job(s) queued", resolver.goal().map_or(0, Goal::len));

    match resolver.resolve(demands) {
        Ok(plan) => {
            print_plan(&universe, plan);
            Ok(0)
        }
        Err(ResolveError::Unsatisfiable(problems)) => {
            eprintln!("{} {}", style("Error:").red().bold(), problems);
            eprintln!("{}", problems.describe());
            Ok(1)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_plan(universe: &Universe, plan: &TransactionPlan) {
    if plan.is_empty() {
        println!("{}", style("Nothing to do.").green());
        return;
    }

    println!("{}", style("Transaction:").bold());
    for op in plan.operations() {
        let label = format!("{:<14}", op.kind.as_str());
        let label = match op.kind {
            OperationKind::Install | OperationKind::Upgrade => style(label).green(),
            OperationKind::Erase | OperationKind::Obsolete => style(label).red(),
            OperationKind::Downgrade | OperationKind::Reinstall => style(label).yellow(),
            OperationKind::ReasonChange => style(label).cyan(),
        };

        let pkg = &universe[op.package];
        let detail = match (op.kind, op.replaced) {
            (OperationKind::Obsolete, Some(by)) => format!(" (obsoleted by {})", universe[by]),
            (OperationKind::ReasonChange, _) => format!(" ({} -> {})", pkg.reason, op.reason),
            (_, Some(old)) => format!(" (replacing {})", universe[old].evr),
            (_, None) => String::new(),
        };

        println!("  {} {} {}{}", label, pkg, style(&pkg.repo).dim(), detail);
    }
    println!();
    println!("{}", plan.summary());
}
