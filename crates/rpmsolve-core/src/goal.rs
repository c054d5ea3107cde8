//! Accumulating resolution jobs for one cycle.

use std::fmt;
use std::sync::Arc;

use rpmsolve_evr::Reldep;

use crate::demands::Demands;
use crate::diagnostics::{null_sink, Diagnostics, Level};
use crate::error::{ResolveError, Result};
use crate::package::Reason;
use crate::package_set::PackageSet;
use crate::plan::TransactionPlan;
use crate::selector::Selector;
use crate::solver::{ProblemSet, Solver};
use crate::universe::Universe;

/// What a job asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Install,
    Erase,
    Upgrade,
    UpgradeAll,
    DistroSync,
    DistroSyncAll,
    Downgrade,
    ReasonChange,
    /// Never erase the target packages
    Protect,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Install => "install",
            JobKind::Erase => "erase",
            JobKind::Upgrade => "upgrade",
            JobKind::UpgradeAll => "upgrade-all",
            JobKind::DistroSync => "distro-sync",
            JobKind::DistroSyncAll => "distro-sync-all",
            JobKind::Downgrade => "downgrade",
            JobKind::ReasonChange => "reason-change",
            JobKind::Protect => "protect",
        }
    }

    /// Kinds that bring packages onto the system.
    pub fn is_install_like(&self) -> bool {
        matches!(
            self,
            JobKind::Install | JobKind::Upgrade | JobKind::DistroSync | JobKind::Downgrade
        )
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The packages a job is about.
#[derive(Debug, Clone, PartialEq)]
pub enum JobTarget {
    /// Resolved when the job was added
    Packages(PackageSet),
    /// Whatever provides the dependency at solve time
    Dependency(Reldep),
    /// Every installed package
    All,
}

/// One resolution request. Immutable once appended to a [`Goal`].
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub kind: JobKind,
    /// User-facing description of what was asked for
    pub spec: String,
    pub target: JobTarget,
    /// New reason for [`JobKind::ReasonChange`]
    pub reason: Option<Reason>,
    pub demands: Demands,
    /// An empty match or an uninstallable target is skipped, not reported
    pub optional: bool,
}

impl Job {
    /// Whether the selector matched nothing.
    pub fn is_empty_match(&self) -> bool {
        matches!(&self.target, JobTarget::Packages(set) if set.is_empty())
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.spec)?;
        if self.optional {
            write!(f, " (optional)")?;
        }
        Ok(())
    }
}

/// Ordered list of jobs against one universe.
///
/// Jobs are kept in insertion order and never merged; contradicting
/// requests are reported by the solver.
pub struct Goal {
    universe: Arc<Universe>,
    jobs: Vec<Job>,
    frozen: bool,
    diagnostics: Diagnostics,
}

impl fmt::Debug for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Goal")
            .field("generation", &self.universe.generation())
            .field("jobs", &self.jobs)
            .field("frozen", &self.frozen)
            .finish()
    }
}

impl Goal {
    pub fn new(universe: Arc<Universe>) -> Self {
        Self {
            universe,
            jobs: Vec::new(),
            frozen: false,
            diagnostics: null_sink(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn universe(&self) -> &Arc<Universe> {
        &self.universe
    }

    pub fn add_install(&mut self, selector: &Selector, demands: Demands) -> Result<()> {
        self.push_selector(JobKind::Install, selector, None, demands)
    }

    /// Install the selected packages if possible. A selector matching
    /// nothing, or targets that cannot be installed, leave the goal
    /// satisfiable.
    pub fn add_install_optional(&mut self, selector: &Selector, demands: Demands) -> Result<()> {
        let target = selector.resolve(&self.universe);
        self.push(Job {
            kind: JobKind::Install,
            spec: selector.to_string(),
            target: JobTarget::Packages(target),
            reason: None,
            demands,
            optional: true,
        })
    }

    /// Install whatever provides `dep`; providers are looked up at solve time.
    pub fn add_install_dependency(&mut self, dep: Reldep, demands: Demands) -> Result<()> {
        self.push(Job {
            kind: JobKind::Install,
            spec: dep.to_string(),
            target: JobTarget::Dependency(dep),
            reason: None,
            demands,
            optional: false,
        })
    }

    pub fn add_erase(&mut self, selector: &Selector, demands: Demands) -> Result<()> {
        self.push_selector(JobKind::Erase, selector, None, demands)
    }

    /// Upgrade the selected packages, or everything when `selector` is `None`.
    pub fn add_upgrade(&mut self, selector: Option<&Selector>, demands: Demands) -> Result<()> {
        match selector {
            Some(sel) => self.push_selector(JobKind::Upgrade, sel, None, demands),
            None => self.push_all(JobKind::UpgradeAll, demands),
        }
    }

    /// Move the selected packages (or everything) to the best available
    /// version, whichever direction that is.
    pub fn add_distro_sync(&mut self, selector: Option<&Selector>, demands: Demands) -> Result<()> {
        match selector {
            Some(sel) => self.push_selector(JobKind::DistroSync, sel, None, demands),
            None => self.push_all(JobKind::DistroSyncAll, demands),
        }
    }

    pub fn add_downgrade(&mut self, selector: &Selector, demands: Demands) -> Result<()> {
        self.push_selector(JobKind::Downgrade, selector, None, demands)
    }

    pub fn add_reason_change(
        &mut self,
        selector: &Selector,
        reason: Reason,
        demands: Demands,
    ) -> Result<()> {
        self.push_selector(JobKind::ReasonChange, selector, Some(reason), demands)
    }

    /// Packages matched by `selector` may not be erased by this goal.
    pub fn add_protected(&mut self, selector: &Selector) -> Result<()> {
        self.push_selector(JobKind::Protect, selector, None, Demands::default())
    }

    pub fn has_action(&self, kind: JobKind) -> bool {
        self.jobs.iter().any(|j| j.kind == kind)
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Drop every job and accept mutations again.
    pub fn reset(&mut self) {
        self.jobs.clear();
        self.frozen = false;
    }

    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }

    pub(crate) fn thaw(&mut self) {
        self.frozen = false;
    }

    /// Freeze the goal and run `solver` over every job once.
    ///
    /// A job-level demand applies when it is set either on the job or in
    /// `demands`.
    pub fn resolve<S: Solver + ?Sized>(&mut self, solver: &S, demands: Demands) -> Result<TransactionPlan> {
        self.freeze();
        self.diagnostics.emit(
            Level::Debug,
            "rpmsolve::goal",
            &format!("resolving {} job(s)", self.jobs.len()),
        );

        match solver.solve(&self.universe, &self.jobs, demands) {
            Ok(decisions) => Ok(TransactionPlan::materialize(&self.universe, &decisions)),
            Err(problems) => {
                let problems = ProblemSet::from(problems);
                self.diagnostics.emit(
                    Level::Info,
                    "rpmsolve::goal",
                    &problems.describe(),
                );
                Err(ResolveError::Unsatisfiable(problems))
            }
        }
    }

    fn push_selector(
        &mut self,
        kind: JobKind,
        selector: &Selector,
        reason: Option<Reason>,
        demands: Demands,
    ) -> Result<()> {
        let target = selector.resolve(&self.universe);
        self.push(Job {
            kind,
            spec: selector.to_string(),
            target: JobTarget::Packages(target),
            reason,
            demands,
            optional: false,
        })
    }

    fn push_all(&mut self, kind: JobKind, demands: Demands) -> Result<()> {
        self.push(Job {
            kind,
            spec: "*".to_string(),
            target: JobTarget::All,
            reason: None,
            demands,
            optional: false,
        })
    }

    fn push(&mut self, job: Job) -> Result<()> {
        if self.frozen {
            return Err(ResolveError::GoalFrozen);
        }
        self.diagnostics.emit(
            Level::Debug,
            "rpmsolve::goal",
            &format!("added job {}", job),
        );
        self.jobs.push(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MemorySink;
    use crate::repository::{record, RepoMetadata, SYSTEM_REPO};

    fn universe() -> Arc<Universe> {
        let pkg = |name: &str, version: &str| {
            record([("name", name), ("version", version), ("release", "1"), ("arch", "x86_64")])
        };
        Arc::new(
            Universe::builder()
                .repo(RepoMetadata {
                    id: SYSTEM_REPO.to_string(),
                    priority: 99,
                    system: true,
                    records: vec![pkg("bash", "5.0")],
                })
                .repo(RepoMetadata {
                    id: "fedora".to_string(),
                    priority: 99,
                    system: false,
                    records: vec![pkg("bash", "5.1")],
                })
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_jobs_keep_insertion_order() {
        let mut goal = Goal::new(universe());
        let bash = Selector::parse("bash").unwrap();
        goal.add_install(&bash, Demands::default()).unwrap();
        goal.add_erase(&bash, Demands::default()).unwrap();
        goal.add_upgrade(None, Demands::default()).unwrap();

        let kinds: Vec<_> = goal.jobs().iter().map(|j| j.kind).collect();
        assert_eq!(kinds, vec![JobKind::Install, JobKind::Erase, JobKind::UpgradeAll]);
        assert!(goal.has_action(JobKind::Erase));
        assert!(!goal.has_action(JobKind::Downgrade));
        assert_eq!(goal.len(), 3);
    }

    #[test]
    fn test_empty_match_is_recorded() {
        let mut goal = Goal::new(universe());
        goal.add_install(&Selector::parse("zlib-devel").unwrap(), Demands::default())
            .unwrap();
        assert!(goal.jobs()[0].is_empty_match());
        assert_eq!(goal.jobs()[0].to_string(), "install zlib-devel");
    }

    #[test]
    fn test_frozen_goal_rejects_jobs() {
        let mut goal = Goal::new(universe());
        goal.freeze();
        let err = goal.add_install(&Selector::parse("bash").unwrap(), Demands::default());
        assert!(matches!(err, Err(ResolveError::GoalFrozen)));

        goal.reset();
        assert!(!goal.is_frozen());
        assert!(goal.add_protected(&Selector::parse("bash").unwrap()).is_ok());
    }

    #[test]
    fn test_optional_install_job() {
        let mut goal = Goal::new(universe());
        goal.add_install_optional(&Selector::parse("zsh").unwrap(), Demands::default())
            .unwrap();
        goal.add_install(&Selector::parse("bash").unwrap(), Demands::default())
            .unwrap();

        let jobs = goal.jobs();
        assert!(jobs[0].optional && jobs[0].is_empty_match());
        assert_eq!(jobs[0].to_string(), "install zsh (optional)");
        assert!(!jobs[1].optional);
    }

    #[test]
    fn test_reason_change_job() {
        let mut goal = Goal::new(universe());
        goal.add_reason_change(&Selector::parse("bash").unwrap(), Reason::User, Demands::default())
            .unwrap();
        assert_eq!(goal.jobs()[0].reason, Some(Reason::User));
    }

    #[test]
    fn test_diagnostics_are_routed_to_sink() {
        let sink = Arc::new(MemorySink::new());
        let mut goal = Goal::new(universe()).with_diagnostics(sink.clone());
        goal.add_downgrade(&Selector::parse("bash").unwrap(), Demands::default())
            .unwrap();
        assert!(sink.contains(Level::Debug, "added job downgrade bash"));
    }
}
