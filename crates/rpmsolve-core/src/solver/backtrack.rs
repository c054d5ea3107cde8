use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use rpmsolve_evr::Reldep;

use super::policy::Policy;
use super::problem::{Problem, ProblemKind};
use super::{RawDecisions, Solver};
use crate::config::ResolverConfig;
use crate::demands::Demands;
use crate::diagnostics::{null_sink, Diagnostics, Level};
use crate::goal::{Job, JobKind, JobTarget};
use crate::package::{Package, PackageId, Reason};
use crate::query::same_arch_family;
use crate::universe::Universe;

const TARGET: &str = "rpmsolve::solver";

/// Deterministic depth-first solver.
///
/// Jobs are applied one after another to a working copy of the installed
/// system. Every job either commits or is reported as its own problem, so a
/// failing request does not hide the others. Within a job the search walks
/// candidates in [`Policy`] order and backtracks on the first violated
/// requirement or conflict, bounded by a step budget.
pub struct BacktrackSolver {
    installonly: Vec<String>,
    protected: Vec<String>,
    max_steps: u64,
    native_arch: Option<String>,
    diagnostics: Diagnostics,
}

impl fmt::Debug for BacktrackSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BacktrackSolver")
            .field("installonly", &self.installonly)
            .field("protected", &self.protected)
            .field("max_steps", &self.max_steps)
            .field("native_arch", &self.native_arch)
            .finish()
    }
}

impl Default for BacktrackSolver {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}

impl BacktrackSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            installonly: config.installonly_pkgs.clone(),
            protected: config.protected_packages.clone(),
            max_steps: config.max_solver_steps,
            native_arch: config.arch.clone(),
            diagnostics: null_sink(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_installonly(mut self, names: Vec<String>) -> Self {
        self.installonly = names;
        self
    }

    pub fn with_protected(mut self, names: Vec<String>) -> Self {
        self.protected = names;
        self
    }

    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.max_steps = steps;
        self
    }

    pub fn max_steps(&self) -> u64 {
        self.max_steps
    }

    /// Whether several versions of `pkg` may be installed side by side.
    pub fn is_installonly(&self, pkg: &Package) -> bool {
        self.installonly
            .iter()
            .any(|n| *n == pkg.name || pkg.provides.iter().any(|p| p.name == *n))
    }

    fn debug(&self, message: &str) {
        self.diagnostics.emit(Level::Debug, TARGET, message);
    }
}

impl Solver for BacktrackSolver {
    fn configure(&mut self, config: &ResolverConfig, diagnostics: &Diagnostics) {
        *self = Self::from_config(config).with_diagnostics(diagnostics.clone());
    }

    fn solve(
        &self,
        universe: &Universe,
        jobs: &[Job],
        demands: Demands,
    ) -> std::result::Result<RawDecisions, Vec<Problem>> {
        let mut search = Search::new(self, universe, jobs);
        let mut problems = Vec::new();
        let skipped = search.check_jobs(jobs, &mut problems);

        let mut trial = Trial::new(search.original.clone());
        for (index, job) in jobs.iter().enumerate() {
            if job.kind == JobKind::Protect || skipped.contains(&index) {
                continue;
            }

            let rules = Rules::new(job, demands);
            let mut next = trial.clone();
            search.steps = 0;
            match search.run_job(&mut next, job, rules) {
                Ok(()) => {
                    self.debug(&format!("job {}: done in {} step(s)", job, search.steps));
                    trial = next;
                }
                Err(failure) if job.optional && failure != Failure::StepLimit => {
                    let problem = failure.into_problem(universe, job, self.max_steps);
                    self.debug(&format!("job {}: skipped, {}", job, problem));
                }
                Err(failure) => {
                    let problem = failure.into_problem(universe, job, self.max_steps);
                    self.debug(&format!("job {}: {}", job, problem));
                    problems.push(problem);
                }
            }
        }

        if !problems.is_empty() {
            return Err(problems);
        }
        Ok(search.decisions(&trial))
    }
}

/// Job-level switches after merging job and call demands.
#[derive(Debug, Clone, Copy, Default)]
struct Rules {
    allow_erasing: bool,
    /// Dependents of erased packages go too
    erase_dependents: bool,
    allow_downgrade: bool,
    best: bool,
    clean_deps: bool,
}

impl Rules {
    fn new(job: &Job, demands: Demands) -> Self {
        let own = job.demands;
        Self {
            allow_erasing: own.allow_erasing || demands.allow_erasing,
            erase_dependents: false,
            allow_downgrade: own.allow_downgrade
                || demands.allow_downgrade
                || matches!(
                    job.kind,
                    JobKind::Downgrade | JobKind::DistroSync | JobKind::DistroSyncAll
                ),
            best: own.best || demands.best,
            clean_deps: own.clean_deps || demands.clean_deps,
        }
    }
}

/// Working copy of the system, cloned at every branch point.
#[derive(Debug, Clone)]
struct Trial {
    present: BTreeSet<PackageId>,
    /// Chosen by a job; may not be replaced or removed afterwards
    pinned: BTreeSet<PackageId>,
    /// Taken off by a job; may not come back
    forbidden: BTreeSet<PackageId>,
    obsoleted: Vec<(PackageId, PackageId)>,
    reasons: BTreeMap<PackageId, Reason>,
}

impl Trial {
    fn new(present: BTreeSet<PackageId>) -> Self {
        Self {
            present,
            pinned: BTreeSet::new(),
            forbidden: BTreeSet::new(),
            obsoleted: Vec::new(),
            reasons: BTreeMap::new(),
        }
    }
}

enum Violation {
    Missing { package: PackageId, dep: Reldep },
    Conflict { package: PackageId, other: PackageId },
}

/// One way of repairing a violation.
#[derive(Debug, Clone, Copy)]
enum Repair {
    /// Take an installed package off; its own failure is not reported
    Remove(PackageId),
    /// Bring in a provider
    Add(PackageId),
}

/// What a violation reports once every repair failed.
enum Exhausted {
    Missing {
        package: PackageId,
        dep: Reldep,
        had_providers: bool,
        protected: bool,
    },
    Conflict {
        package: PackageId,
        other: PackageId,
        protected: Option<PackageId>,
    },
}

impl Exhausted {
    fn failure(&self, deeper: Option<Failure>) -> Failure {
        match *self {
            Exhausted::Missing {
                package,
                protected: true,
                ..
            } => Failure::Protected(package),
            Exhausted::Missing {
                package,
                ref dep,
                had_providers,
                ..
            } => match deeper {
                Some(failure @ (Failure::Missing { .. } | Failure::Conflict { .. } | Failure::Protected(_))) => {
                    failure
                }
                _ => Failure::Missing {
                    package,
                    dep: dep.clone(),
                    had_providers,
                },
            },
            Exhausted::Conflict {
                protected: Some(id),
                ..
            } => Failure::Protected(id),
            Exhausted::Conflict { package, other, .. } => Failure::Conflict { package, other },
        }
    }
}

/// A violation on the search stack with the repairs not tried yet.
struct ChoicePoint {
    /// Trial as it was when the violation was found; absent when there is
    /// nothing to fall back to
    snapshot: Option<Trial>,
    repairs: VecDeque<Repair>,
    current: Option<Repair>,
    /// First failure among the providers tried
    deeper: Option<Failure>,
    exhausted: Exhausted,
}

#[derive(Debug, Clone, PartialEq)]
enum Failure {
    Missing {
        package: PackageId,
        dep: Reldep,
        had_providers: bool,
    },
    Conflict {
        package: PackageId,
        other: PackageId,
    },
    Protected(PackageId),
    Pinned(PackageId),
    Forbidden(PackageId),
    NotApplicable(String),
    StepLimit,
}

impl Failure {
    fn into_problem(self, universe: &Universe, job: &Job, max_steps: u64) -> Problem {
        let context = format!("cannot {} {}", job.kind, job.spec);
        match self {
            Failure::Missing {
                package,
                dep,
                had_providers,
            } => {
                let pkg = &universe[package];
                let message = if had_providers {
                    format!(
                        "{}: {} requires {}, but none of the providers can be installed",
                        context, pkg, dep
                    )
                } else {
                    format!("{}: nothing provides {} needed by {}", context, dep, pkg)
                };
                Problem::new(ProblemKind::Unresolvable, message)
                    .with_packages([package])
                    .with_dependency(dep.to_string())
            }
            Failure::Conflict { package, other } => Problem::new(
                ProblemKind::Conflict,
                format!(
                    "{}: {} conflicts with {}",
                    context, universe[package], universe[other]
                ),
            )
            .with_packages([package, other]),
            Failure::Protected(id) => Problem::new(
                ProblemKind::Protected,
                format!(
                    "{}: the operation would result in removing the protected package {}",
                    context, universe[id]
                ),
            )
            .with_packages([id]),
            Failure::Pinned(id) => Problem::new(
                ProblemKind::JobConflict,
                format!(
                    "{}: {} is required by another request and cannot be replaced",
                    context, universe[id]
                ),
            )
            .with_packages([id]),
            Failure::Forbidden(id) => Problem::new(
                ProblemKind::JobConflict,
                format!(
                    "{}: {} is removed by another request",
                    context, universe[id]
                ),
            )
            .with_packages([id]),
            Failure::NotApplicable(message) => Problem::new(ProblemKind::NotApplicable, message),
            Failure::StepLimit => Problem::new(
                ProblemKind::StepLimit,
                format!("{}: dependency search gave up after {} steps", context, max_steps),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    Allowed,
    Protected,
    Denied,
}

struct Search<'a> {
    solver: &'a BacktrackSolver,
    universe: &'a Universe,
    policy: Policy,
    original: BTreeSet<PackageId>,
    protected: BTreeSet<PackageId>,
    /// Installed packages already broken before any job; left alone
    tolerated: BTreeSet<PackageId>,
    /// Available packages carrying obsoletes
    obsoleters: Vec<PackageId>,
    steps: u64,
}

impl<'a> Search<'a> {
    fn new(solver: &'a BacktrackSolver, universe: &'a Universe, jobs: &[Job]) -> Self {
        let original: BTreeSet<PackageId> = universe.installed().iter().collect();

        let mut protected: BTreeSet<PackageId> = original
            .iter()
            .copied()
            .filter(|&id| solver.protected.iter().any(|n| *n == universe[id].name))
            .collect();
        for job in jobs.iter().filter(|j| j.kind == JobKind::Protect) {
            if let JobTarget::Packages(ref set) = job.target {
                protected.extend(set.iter().filter(|id| original.contains(id)));
            }
        }

        let obsoleters = universe
            .considered()
            .iter()
            .filter(|&id| !universe[id].installed && !universe[id].obsoletes.is_empty())
            .collect();

        let native = solver
            .native_arch
            .clone()
            .or_else(|| universe.native_arch().map(String::from));

        let mut search = Self {
            solver,
            universe,
            policy: Policy::new().native_arch(native),
            original,
            protected,
            tolerated: BTreeSet::new(),
            obsoleters,
            steps: 0,
        };

        let start = Trial::new(search.original.clone());
        search.tolerated = search
            .original
            .iter()
            .copied()
            .filter(|&id| search.violation_of(&start, id).is_some())
            .collect();
        search
    }

    /// Packages a job is about, restricted to the considered set.
    fn job_candidates(&self, job: &Job) -> Vec<PackageId> {
        let considered = self.universe.considered();
        match job.target {
            JobTarget::Packages(ref set) => set.iter().filter(|&id| considered.contains(id)).collect(),
            JobTarget::Dependency(ref dep) => self
                .universe
                .what_provides(dep)
                .into_iter()
                .filter(|&id| considered.contains(id))
                .collect(),
            JobTarget::All => self.original.iter().copied().collect(),
        }
    }

    fn job_names(&self, job: &Job) -> BTreeSet<String> {
        self.job_candidates(job)
            .into_iter()
            .map(|id| self.universe[id].name.clone())
            .collect()
    }

    /// Problems visible before any search: empty matches, install and erase
    /// of one family, erasing protected packages. Returns the jobs to skip;
    /// optional jobs are skipped without a problem.
    fn check_jobs(&self, jobs: &[Job], problems: &mut Vec<Problem>) -> BTreeSet<usize> {
        let mut skipped = BTreeSet::new();

        for (index, job) in jobs.iter().enumerate() {
            if job.kind == JobKind::Protect || job.target == JobTarget::All {
                continue;
            }
            if self.job_candidates(job).is_empty() {
                skipped.insert(index);
                if job.optional {
                    self.solver.debug(&format!("job {}: skipped, no match", job));
                    continue;
                }
                problems.push(Problem::new(
                    ProblemKind::NoMatch,
                    format!("No match for argument: {}", job.spec),
                ));
            }
        }

        for (i, wanted) in jobs.iter().enumerate() {
            if !wanted.kind.is_install_like() || skipped.contains(&i) {
                continue;
            }
            let names = self.job_names(wanted);
            for (j, erase) in jobs.iter().enumerate() {
                if erase.kind != JobKind::Erase || skipped.contains(&j) {
                    continue;
                }
                let erased = self.job_names(erase);
                let overlap: Vec<&str> = names
                    .intersection(&erased)
                    .map(String::as_str)
                    .collect();
                if overlap.is_empty() {
                    continue;
                }
                if wanted.optional {
                    self.solver.debug(&format!(
                        "job {}: skipped, {} is erased by \"{}\"",
                        wanted,
                        overlap.join(", "),
                        erase
                    ));
                    skipped.insert(i);
                    break;
                }
                let packages: Vec<PackageId> = self
                    .job_candidates(erase)
                    .into_iter()
                    .filter(|&id| overlap.contains(&self.universe[id].name.as_str()))
                    .collect();
                problems.push(
                    Problem::new(
                        ProblemKind::JobConflict,
                        format!(
                            "conflicting requests: \"{}\" and \"{}\" both involve {}",
                            wanted,
                            erase,
                            overlap.join(", ")
                        ),
                    )
                    .with_packages(packages),
                );
                skipped.insert(i);
                skipped.insert(j);
            }
        }

        for (index, job) in jobs.iter().enumerate() {
            if job.kind != JobKind::Erase || skipped.contains(&index) {
                continue;
            }
            let hit: Vec<PackageId> = self
                .job_candidates(job)
                .into_iter()
                .filter(|id| self.protected.contains(id))
                .collect();
            if hit.is_empty() {
                continue;
            }
            let names: Vec<String> = hit.iter().map(|&id| self.universe[id].nevra()).collect();
            problems.push(
                Problem::new(
                    ProblemKind::Protected,
                    format!(
                        "cannot {}: the operation would result in removing the protected package(s) {}",
                        job,
                        names.join(", ")
                    ),
                )
                .with_packages(hit),
            );
            skipped.insert(index);
        }

        skipped
    }

    fn run_job(&mut self, trial: &mut Trial, job: &Job, rules: Rules) -> Result<(), Failure> {
        match job.kind {
            JobKind::Install => self.install(trial, job, rules),
            JobKind::Erase => self.erase(trial, job, rules),
            JobKind::Upgrade | JobKind::UpgradeAll => self.upgrade(trial, job, rules),
            JobKind::DistroSync | JobKind::DistroSyncAll => self.distro_sync(trial, job, rules),
            JobKind::Downgrade => self.downgrade(trial, job, rules),
            JobKind::ReasonChange => self.reason_change(trial, job),
            JobKind::Protect => Ok(()),
        }
    }

    fn install(&mut self, trial: &mut Trial, job: &Job, rules: Rules) -> Result<(), Failure> {
        let candidates = self.job_candidates(job);
        if let Some(&id) = candidates.iter().find(|id| trial.present.contains(id)) {
            trial.pinned.insert(id);
            return Ok(());
        }

        let mut choices: Vec<PackageId> = candidates
            .into_iter()
            .filter(|id| !trial.forbidden.contains(id))
            .collect();
        if rules.best {
            choices = self.newest_only(&choices);
        }
        let order = match job.target {
            JobTarget::Dependency(ref dep) => {
                self.policy.select_preferred_for(self.universe, &dep.name, &choices)
            }
            _ => self.policy.select_preferred(self.universe, &choices),
        };
        if order.is_empty() {
            return Err(Failure::NotApplicable(format!(
                "cannot install {}: every match is removed by another request",
                job.spec
            )));
        }

        self.try_candidates(trial, &order, rules, Some(Reason::User))
    }

    fn erase(&mut self, trial: &mut Trial, job: &Job, rules: Rules) -> Result<(), Failure> {
        let targets: Vec<PackageId> = self
            .job_candidates(job)
            .into_iter()
            .filter(|id| self.original.contains(id) && trial.present.contains(id))
            .collect();
        if targets.is_empty() {
            return Err(Failure::NotApplicable(format!(
                "cannot erase {}: no matching package is installed",
                job.spec
            )));
        }

        let before = trial.present.clone();
        for &id in &targets {
            if trial.pinned.contains(&id) {
                return Err(Failure::Pinned(id));
            }
            trial.present.remove(&id);
            trial.forbidden.insert(id);
        }

        let rules = Rules {
            erase_dependents: true,
            ..rules
        };
        self.settle(trial, rules)?;

        if rules.clean_deps {
            let removed: Vec<PackageId> = before.difference(&trial.present).copied().collect();
            self.clean_deps(trial, &removed);
        }
        Ok(())
    }

    fn upgrade(&mut self, trial: &mut Trial, job: &Job, rules: Rules) -> Result<(), Failure> {
        let u = self.universe;
        let pool = self.sync_pool(job);
        let installed = self.installed_targets(trial, job, &pool)?;

        for id in installed {
            if !trial.present.contains(&id) {
                continue;
            }
            let pkg = &u[id];
            let mut newer: Vec<PackageId> = pool
                .iter()
                .copied()
                .filter(|&c| self.replaces(trial, id, c) && u[c].evr > pkg.evr)
                .collect();
            if newer.is_empty() {
                newer = self
                    .obsoleters
                    .iter()
                    .copied()
                    .filter(|&c| !trial.forbidden.contains(&c) && u[c].obsoletes_pkg(pkg))
                    .collect();
            }
            if newer.is_empty() {
                continue;
            }

            let mut order = self.policy.select_preferred_for(u, &pkg.name, &newer);
            if rules.best {
                order.truncate(1);
            }
            self.commit_or_skip(trial, &order, rules, pkg)?;
        }
        Ok(())
    }

    fn distro_sync(&mut self, trial: &mut Trial, job: &Job, rules: Rules) -> Result<(), Failure> {
        let u = self.universe;
        let pool = self.sync_pool(job);
        let installed = self.installed_targets(trial, job, &pool)?;

        for id in installed {
            if !trial.present.contains(&id) {
                continue;
            }
            let pkg = &u[id];
            let available: Vec<PackageId> = pool
                .iter()
                .copied()
                .filter(|&c| self.replaces(trial, id, c))
                .collect();
            let preferred = self.policy.select_preferred(u, &available);
            match preferred.first() {
                None => continue,
                Some(&top) if u[top].evr == pkg.evr => continue,
                Some(_) => {}
            }

            let mut order: Vec<PackageId> = preferred
                .into_iter()
                .filter(|&c| u[c].evr != pkg.evr)
                .collect();
            if rules.best {
                order.truncate(1);
            }
            self.commit_or_skip(trial, &order, rules, pkg)?;
        }
        Ok(())
    }

    fn downgrade(&mut self, trial: &mut Trial, job: &Job, rules: Rules) -> Result<(), Failure> {
        let u = self.universe;
        let pool = self.sync_pool(job);
        let installed = self.installed_targets(trial, job, &pool)?;

        let mut found = false;
        for id in installed {
            if !trial.present.contains(&id) {
                continue;
            }
            let pkg = &u[id];
            let older: Vec<PackageId> = pool
                .iter()
                .copied()
                .filter(|&c| self.replaces(trial, id, c) && u[c].evr < pkg.evr)
                .collect();
            if older.is_empty() {
                continue;
            }
            found = true;
            // highest of the older builds is the closest step down
            let order = self.policy.select_preferred(u, &older);
            self.try_candidates(trial, &order, rules, None)?;
        }

        if !found {
            return Err(Failure::NotApplicable(format!(
                "cannot downgrade {}: the lowest available version is already installed",
                job.spec
            )));
        }
        Ok(())
    }

    fn reason_change(&mut self, trial: &mut Trial, job: &Job) -> Result<(), Failure> {
        let reason = job.reason.unwrap_or_default();
        let targets: Vec<PackageId> = self
            .job_candidates(job)
            .into_iter()
            .filter(|id| trial.present.contains(id))
            .collect();
        if targets.is_empty() {
            return Err(Failure::NotApplicable(format!(
                "cannot change reason of {}: no matching package is installed",
                job.spec
            )));
        }
        for id in targets {
            trial.reasons.insert(id, reason);
        }
        Ok(())
    }

    /// Available packages an upgrade-like job may choose from.
    fn sync_pool(&self, job: &Job) -> Vec<PackageId> {
        let u = self.universe;
        match job.target {
            JobTarget::All => u
                .considered()
                .iter()
                .filter(|&id| !u[id].installed)
                .collect(),
            _ => self
                .job_candidates(job)
                .into_iter()
                .filter(|&id| !u[id].installed)
                .collect(),
        }
    }

    /// Installed packages an upgrade-like job acts on.
    fn installed_targets(
        &self,
        trial: &Trial,
        job: &Job,
        pool: &[PackageId],
    ) -> Result<Vec<PackageId>, Failure> {
        let u = self.universe;
        if job.target == JobTarget::All {
            return Ok(trial
                .present
                .iter()
                .copied()
                .filter(|id| self.original.contains(id))
                .collect());
        }

        let mut names: BTreeSet<&str> = pool.iter().map(|&id| u[id].name.as_str()).collect();
        for id in self.job_candidates(job) {
            names.insert(u[id].name.as_str());
        }
        let installed: Vec<PackageId> = trial
            .present
            .iter()
            .copied()
            .filter(|id| self.original.contains(id) && names.contains(u[*id].name.as_str()))
            .collect();
        if installed.is_empty() {
            return Err(Failure::NotApplicable(format!(
                "cannot {} {}: package is available, but not installed",
                job.kind, job.spec
            )));
        }
        Ok(installed)
    }

    /// Whether available `candidate` can take the place of installed `id`.
    fn replaces(&self, trial: &Trial, id: PackageId, candidate: PackageId) -> bool {
        let u = self.universe;
        candidate != id
            && !trial.forbidden.contains(&candidate)
            && u[candidate].name == u[id].name
            && same_arch_family(&u[id], &u[candidate])
    }

    /// Try `order`; a failure only counts when `best` is set.
    fn commit_or_skip(
        &mut self,
        trial: &mut Trial,
        order: &[PackageId],
        rules: Rules,
        installed: &Package,
    ) -> Result<(), Failure> {
        match self.try_candidates(trial, order, rules, None) {
            Ok(()) => Ok(()),
            Err(Failure::StepLimit) => Err(Failure::StepLimit),
            Err(failure) if rules.best => Err(failure),
            Err(_) => {
                self.solver.debug(&format!(
                    "keeping {}: no replacement is installable",
                    installed
                ));
                Ok(())
            }
        }
    }

    fn newest_only(&self, ids: &[PackageId]) -> Vec<PackageId> {
        let u = self.universe;
        ids.iter()
            .copied()
            .filter(|&id| {
                !ids
                    .iter()
                    .any(|&other| u[other].name == u[id].name && u[other].evr > u[id].evr)
            })
            .collect()
    }

    /// Commit the first candidate whose closure settles.
    fn try_candidates(
        &mut self,
        trial: &mut Trial,
        order: &[PackageId],
        rules: Rules,
        reason: Option<Reason>,
    ) -> Result<(), Failure> {
        let mut first = None;
        for &id in order {
            let mut next = trial.clone();
            next.pinned.insert(id);
            if let Some(reason) = reason {
                next.reasons.insert(id, reason);
            }
            match self.add(&mut next, id).and_then(|()| self.settle(&mut next, rules)) {
                Ok(()) => {
                    *trial = next;
                    return Ok(());
                }
                Err(Failure::StepLimit) => return Err(Failure::StepLimit),
                Err(failure) => {
                    first.get_or_insert(failure);
                }
            }
        }
        Err(first.unwrap_or_else(|| Failure::NotApplicable("no candidate to try".to_string())))
    }

    /// Put `id` on the system, displacing older builds of the same family
    /// and everything it obsoletes.
    fn add(&mut self, trial: &mut Trial, id: PackageId) -> Result<(), Failure> {
        if trial.present.contains(&id) {
            return Ok(());
        }
        if trial.forbidden.contains(&id) {
            return Err(Failure::Forbidden(id));
        }

        let u = self.universe;
        let pkg = &u[id];
        let mut displaced: Vec<(PackageId, bool)> = Vec::new();

        if !self.solver.is_installonly(pkg) {
            for &other in u.by_name(&pkg.name) {
                if other != id && trial.present.contains(&other) && same_arch_family(pkg, &u[other]) {
                    displaced.push((other, false));
                }
            }
        }
        for obsolete in &pkg.obsoletes {
            if obsolete.name == pkg.name {
                continue;
            }
            for &other in u.by_name(&obsolete.name) {
                if trial.present.contains(&other) && obsolete.matches_evr(&u[other].evr) {
                    displaced.push((other, true));
                }
            }
        }

        for (other, obsoleted) in displaced {
            if trial.pinned.contains(&other) {
                return Err(Failure::Pinned(other));
            }
            if obsoleted && self.protected.contains(&other) {
                return Err(Failure::Protected(other));
            }
            trial.present.remove(&other);
            if obsoleted {
                trial.obsoleted.push((id, other));
            }
        }

        trial.present.insert(id);
        Ok(())
    }

    /// Repair violations until the trial is consistent.
    ///
    /// Runs as a loop over an explicit stack of choice points, so the depth
    /// of native recursion does not grow with the number of packages a job
    /// pulls in. A repair that later fails resumes its choice point with the
    /// next alternative.
    fn settle(&mut self, trial: &mut Trial, rules: Rules) -> Result<(), Failure> {
        let mut stack: Vec<ChoicePoint> = Vec::new();
        loop {
            self.steps += 1;
            if self.steps > self.solver.max_steps {
                return Err(Failure::StepLimit);
            }

            let Some(violation) = self.first_violation(trial) else {
                return Ok(());
            };
            stack.push(self.choice_point(trial, violation, rules));
            self.advance(&mut stack, trial)?;
        }
    }

    /// Apply the next untried repair, unwinding exhausted choice points.
    fn advance(&mut self, stack: &mut Vec<ChoicePoint>, trial: &mut Trial) -> Result<(), Failure> {
        while let Some(point) = stack.last_mut() {
            while let Some(repair) = point.repairs.pop_front() {
                point.current = Some(repair);
                let base = if point.repairs.is_empty() {
                    point.snapshot.take()
                } else {
                    point.snapshot.clone()
                };
                if let Some(base) = base {
                    *trial = base;
                }

                match repair {
                    Repair::Remove(id) => {
                        trial.present.remove(&id);
                        trial.forbidden.insert(id);
                        return Ok(());
                    }
                    Repair::Add(id) => match self.add(trial, id) {
                        Ok(()) => return Ok(()),
                        Err(failure) => {
                            point.deeper.get_or_insert(failure);
                        }
                    },
                }
            }

            let failure = point.exhausted.failure(point.deeper.take());
            stack.pop();
            match stack.last_mut() {
                Some(parent) => {
                    // a failed removal falls through silently
                    if let Some(Repair::Add(_)) = parent.current {
                        parent.deeper.get_or_insert(failure);
                    }
                }
                None => return Err(failure),
            }
        }
        Ok(())
    }

    fn choice_point(&self, trial: &Trial, violation: Violation, rules: Rules) -> ChoicePoint {
        let mut repairs = VecDeque::new();
        let exhausted = match violation {
            Violation::Missing { package, dep } => {
                let removal = self.removal(trial, package, rules);
                let providers = self.providers(trial, &dep, rules);

                // erase jobs drop dependents before looking for replacements
                if rules.erase_dependents && removal == Removal::Allowed {
                    repairs.push_back(Repair::Remove(package));
                }
                repairs.extend(providers.iter().map(|&id| Repair::Add(id)));
                if !rules.erase_dependents && removal == Removal::Allowed {
                    repairs.push_back(Repair::Remove(package));
                }

                Exhausted::Missing {
                    package,
                    dep,
                    had_providers: !providers.is_empty(),
                    protected: removal == Removal::Protected,
                }
            }
            Violation::Conflict { package, other } => {
                // what was installed before goes first
                let mut order = [other, package];
                order.sort_by_key(|id| !self.original.contains(id));

                let mut protected = None;
                for id in order {
                    match self.removal(trial, id, rules) {
                        Removal::Allowed => repairs.push_back(Repair::Remove(id)),
                        Removal::Protected => {
                            protected.get_or_insert(id);
                        }
                        Removal::Denied => {}
                    }
                }
                Exhausted::Conflict {
                    package,
                    other,
                    protected,
                }
            }
        };

        ChoicePoint {
            snapshot: (repairs.len() > 1).then(|| trial.clone()),
            repairs,
            current: None,
            deeper: None,
            exhausted,
        }
    }

    fn first_violation(&self, trial: &Trial) -> Option<Violation> {
        trial
            .present
            .iter()
            .filter(|id| !self.tolerated.contains(id))
            .find_map(|&id| self.violation_of(trial, id))
    }

    fn violation_of(&self, trial: &Trial, id: PackageId) -> Option<Violation> {
        let u = self.universe;
        let pkg = &u[id];
        for dep in &pkg.requires {
            if !u.what_provides(dep).iter().any(|p| trial.present.contains(p)) {
                return Some(Violation::Missing {
                    package: id,
                    dep: dep.clone(),
                });
            }
        }
        for dep in &pkg.conflicts {
            if let Some(other) = u
                .what_provides(dep)
                .into_iter()
                .find(|p| *p != id && trial.present.contains(p))
            {
                return Some(Violation::Conflict { package: id, other });
            }
        }
        None
    }

    fn removal(&self, trial: &Trial, id: PackageId, rules: Rules) -> Removal {
        if !(rules.allow_erasing || rules.erase_dependents)
            || !self.original.contains(&id)
            || trial.pinned.contains(&id)
        {
            return Removal::Denied;
        }
        if self.protected.contains(&id) {
            return Removal::Protected;
        }
        Removal::Allowed
    }

    fn providers(&self, trial: &Trial, dep: &Reldep, rules: Rules) -> Vec<PackageId> {
        let u = self.universe;
        let found: Vec<PackageId> = u
            .what_provides(dep)
            .into_iter()
            .filter(|&id| u.considered().contains(id) && !trial.forbidden.contains(&id))
            .filter(|&id| rules.allow_downgrade || !self.is_downgrade(trial, id))
            .collect();
        self.policy.select_preferred_for(u, &dep.name, &found)
    }

    /// Whether adding `id` would replace a newer build already present.
    fn is_downgrade(&self, trial: &Trial, id: PackageId) -> bool {
        let u = self.universe;
        let pkg = &u[id];
        !self.solver.is_installonly(pkg)
            && u.by_name(&pkg.name).iter().any(|&other| {
                trial.present.contains(&other)
                    && same_arch_family(pkg, &u[other])
                    && u[other].evr > pkg.evr
            })
    }

    /// Drop dependencies of `removed` that nothing present needs anymore.
    fn clean_deps(&self, trial: &mut Trial, removed: &[PackageId]) {
        let mut queue: BTreeSet<PackageId> = removed
            .iter()
            .flat_map(|&id| self.present_providers(trial, &self.universe[id].requires))
            .collect();

        while let Some(id) = queue.pop_first() {
            if !self.is_unneeded(trial, id) {
                continue;
            }
            trial.present.remove(&id);
            self.solver
                .debug(&format!("removing unneeded dependency {}", self.universe[id]));
            queue.extend(self.present_providers(trial, &self.universe[id].requires));
        }
    }

    fn present_providers(&self, trial: &Trial, deps: &[Reldep]) -> Vec<PackageId> {
        deps.iter()
            .flat_map(|dep| self.universe.what_provides(dep))
            .filter(|id| trial.present.contains(id))
            .collect()
    }

    fn is_unneeded(&self, trial: &Trial, id: PackageId) -> bool {
        let u = self.universe;
        if !trial.present.contains(&id)
            || !self.original.contains(&id)
            || trial.pinned.contains(&id)
            || self.protected.contains(&id)
        {
            return false;
        }
        let reason = trial.reasons.get(&id).copied().unwrap_or(u[id].reason);
        if !matches!(reason, Reason::Dependency | Reason::WeakDependency) {
            return false;
        }
        let pkg = &u[id];
        !trial
            .present
            .iter()
            .any(|&other| other != id && u[other].requires.iter().any(|dep| pkg.provides_dep(dep)))
    }

    fn decisions(&self, trial: &Trial) -> RawDecisions {
        let u = self.universe;
        let install: Vec<PackageId> = trial.present.difference(&self.original).copied().collect();
        let erase: Vec<PackageId> = self.original.difference(&trial.present).copied().collect();

        let mut obsoletes: Vec<(PackageId, PackageId)> = trial
            .obsoleted
            .iter()
            .copied()
            .filter(|(new, old)| install.binary_search(new).is_ok() && erase.binary_search(old).is_ok())
            .collect();
        obsoletes.sort();
        obsoletes.dedup();

        let mut order = Vec::new();
        for &dependent in &install {
            for dep in &u[dependent].requires {
                for dependency in u.what_provides(dep) {
                    if dependency != dependent && install.binary_search(&dependency).is_ok() {
                        order.push((dependency, dependent));
                    }
                }
            }
        }
        order.sort();
        order.dedup();

        let mut reasons = BTreeMap::new();
        for &id in &install {
            let reason = trial.reasons.get(&id).copied().unwrap_or_else(|| {
                // a new build keeps the reason of the one it follows
                self.original
                    .iter()
                    .find(|&&old| u[old].name == u[id].name && same_arch_family(&u[old], &u[id]))
                    .map(|&old| trial.reasons.get(&old).copied().unwrap_or(u[old].reason))
                    .unwrap_or(Reason::Dependency)
            });
            reasons.insert(id, reason);
        }
        for (&id, &reason) in &trial.reasons {
            if self.original.contains(&id) && trial.present.contains(&id) {
                reasons.insert(id, reason);
            }
        }

        RawDecisions {
            install,
            erase,
            obsoletes,
            order,
            reasons,
        }
    }
}
