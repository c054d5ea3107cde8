//! The resolution cycle as an explicit state machine.
//!
//! ```text
//! INIT -> LOAD_CONFIG -> DOWNLOAD_METADATA -> LOAD_SACK -> SACK_READY
//!      -> BUILD_TRANSACTION -> RESOLVE_TRANSACTION -> DOWNLOAD_PACKAGES
//!      -> TEST_TRANSACTION -> TRANSACTION
//! ```
//!
//! Every method enters its state and then does that state's work. The only
//! way back is from an unsatisfiable `RESOLVE_TRANSACTION` to
//! `BUILD_TRANSACTION`. Any error other than an unsatisfiable goal moves
//! the cycle to `FAILED`, from which only [`Resolver::reset`] leads out.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ResolverConfig;
use crate::demands::Demands;
use crate::diagnostics::{null_sink, Diagnostics, Level};
use crate::error::{ResolveError, Result};
use crate::goal::Goal;
use crate::plan::TransactionPlan;
use crate::repository::{RepoMetadata, RepoSource};
use crate::solver::{BacktrackSolver, ProblemSet, Solver};
use crate::state::State;
use crate::universe::Universe;

const TARGET: &str = "rpmsolve::resolver";

/// The collaborators behind the last three states.
///
/// They see the finished plan but cannot change it.
pub trait PlanExecutor {
    /// Fetch the files of every inbound package.
    fn download(&self, _universe: &Universe, _plan: &TransactionPlan) -> Result<()> {
        Ok(())
    }

    /// Dry run; must leave the system untouched.
    fn test(&self, _universe: &Universe, _plan: &TransactionPlan) -> Result<()> {
        Ok(())
    }

    fn execute(&self, universe: &Universe, plan: &TransactionPlan) -> Result<()>;
}

/// Drives one resolution cycle from configuration to transaction.
pub struct Resolver<S: Solver = BacktrackSolver> {
    state: State,
    history: Vec<State>,
    solver: S,
    diagnostics: Diagnostics,
    config_file: Option<PathBuf>,
    use_environment: bool,
    preset: Option<ResolverConfig>,
    config: ResolverConfig,
    metadata: Vec<RepoMetadata>,
    universe: Option<Arc<Universe>>,
    goal: Option<Goal>,
    plan: Option<TransactionPlan>,
    problems: ProblemSet,
    executed: bool,
}

impl<S: Solver> fmt::Debug for Resolver<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("state", &self.state)
            .field("history", &self.history)
            .field("goal", &self.goal)
            .field("plan", &self.plan)
            .finish()
    }
}

impl Default for Resolver<BacktrackSolver> {
    fn default() -> Self {
        Self::with_solver(BacktrackSolver::new())
    }
}

impl Resolver<BacktrackSolver> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: Solver> Resolver<S> {
    pub fn with_solver(solver: S) -> Self {
        Self {
            state: State::Init,
            history: vec![State::Init],
            solver,
            diagnostics: null_sink(),
            config_file: None,
            use_environment: false,
            preset: None,
            config: ResolverConfig::default(),
            metadata: Vec::new(),
            universe: None,
            goal: None,
            plan: None,
            problems: ProblemSet::new(),
            executed: false,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Read configuration from `path` instead of the default location.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Let `RPMSOLVE_*` variables override file values.
    pub fn with_environment(mut self, enabled: bool) -> Self {
        self.use_environment = enabled;
        self
    }

    /// Use `config` as is; no file or environment is read.
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.preset = Some(config);
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// States visited in this cycle, starting with `INIT`.
    pub fn history(&self) -> &[State] {
        &self.history
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Demands seeded from the loaded configuration.
    pub fn demands(&self) -> Demands {
        Demands::from(&self.config)
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// The frozen universe, from `SACK_READY` on.
    pub fn universe(&self) -> Option<&Arc<Universe>> {
        self.universe.as_ref()
    }

    pub fn goal(&self) -> Option<&Goal> {
        self.goal.as_ref()
    }

    /// The goal of this cycle.
    ///
    /// Once resolution has started the goal is frozen and every mutation
    /// through this handle fails with `GoalFrozen`.
    pub fn goal_mut(&mut self) -> Result<&mut Goal> {
        let state = self.state;
        self.goal.as_mut().ok_or(ResolveError::InvalidTransition {
            from: state,
            to: State::BuildTransaction,
        })
    }

    /// The plan of the last resolution. After an unsatisfiable goal this is
    /// an empty plan carrying the problems.
    pub fn plan(&self) -> Option<&TransactionPlan> {
        self.plan.as_ref()
    }

    /// Problems of the last unsatisfiable resolution.
    pub fn problems(&self) -> &ProblemSet {
        &self.problems
    }

    pub fn load_config(&mut self) -> Result<()> {
        self.enter(State::LoadConfig)?;

        let loaded = match self.preset.clone() {
            Some(config) => Ok(config),
            None => ResolverConfig::build(self.config_file.as_ref(), self.use_environment),
        };
        match loaded {
            Ok(config) => {
                self.solver.configure(&config, &self.diagnostics);
                self.config = config;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Fetch every source. All of them must succeed before the universe
    /// is built.
    pub fn download_metadata(&mut self, sources: &[&dyn RepoSource]) -> Result<()> {
        self.enter(State::DownloadMetadata)?;

        let mut metadata = Vec::with_capacity(sources.len());
        for source in sources {
            match RepoMetadata::fetch(*source, self.config.cache_only) {
                Ok(repo) => {
                    self.emit(
                        Level::Info,
                        &format!("repository {}: {} record(s)", repo.id, repo.records.len()),
                    );
                    metadata.push(repo);
                }
                Err(e) => return Err(self.fail(e)),
            }
        }

        self.metadata = metadata;
        Ok(())
    }

    /// Build the universe from the downloaded metadata and freeze it.
    pub fn load_sack(&mut self) -> Result<()> {
        self.enter(State::LoadSack)?;

        let mut builder = Universe::builder();
        if let Some(arch) = &self.config.arch {
            builder = builder.arch(arch.as_str());
        }
        for pattern in &self.config.excludes {
            builder = builder.exclude(pattern);
        }
        for repo in std::mem::take(&mut self.metadata) {
            builder.add_repo(repo);
        }

        match builder.build() {
            Ok(universe) => {
                self.emit(
                    Level::Info,
                    &format!(
                        "universe generation {}: {} package(s), {} installed",
                        universe.generation(),
                        universe.len(),
                        universe.installed().len()
                    ),
                );
                self.universe = Some(Arc::new(universe));
                self.enter(State::SackReady)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Open the goal for jobs.
    ///
    /// After an unsatisfiable resolution this reopens the same goal so the
    /// caller can adjust it and resolve again.
    pub fn build_transaction(&mut self) -> Result<()> {
        self.enter(State::BuildTransaction)?;

        if let Some(goal) = self.goal.as_mut() {
            goal.thaw();
            self.plan = None;
            return Ok(());
        }

        let universe = match &self.universe {
            Some(universe) => Arc::clone(universe),
            None => {
                return Err(self.fail(ResolveError::InvalidTransition {
                    from: State::LoadSack,
                    to: State::SackReady,
                }))
            }
        };
        self.goal = Some(Goal::new(universe).with_diagnostics(Arc::clone(&self.diagnostics)));
        Ok(())
    }

    /// Run the solver once over the whole goal.
    ///
    /// An unsatisfiable goal keeps the cycle in `RESOLVE_TRANSACTION`,
    /// stores a failed plan and returns every problem found; nothing is
    /// retried automatically.
    pub fn resolve(&mut self, demands: Demands) -> Result<&TransactionPlan> {
        self.enter(State::ResolveTransaction)?;

        let outcome = match self.goal.as_mut() {
            Some(goal) => goal.resolve(&self.solver, demands),
            None => Err(ResolveError::InvalidTransition {
                from: State::SackReady,
                to: State::BuildTransaction,
            }),
        };

        match outcome {
            Ok(plan) => {
                self.emit(Level::Info, &format!("resolved: {}", plan.summary()));
                self.problems = ProblemSet::new();
                Ok(&*self.plan.insert(plan))
            }
            Err(ResolveError::Unsatisfiable(problems)) => {
                self.emit(Level::Warn, &problems.to_string());
                self.problems = problems.clone();
                self.plan = Some(TransactionPlan::failed(problems.clone()));
                Err(ResolveError::Unsatisfiable(problems))
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    pub fn download_packages(&mut self, executor: &dyn PlanExecutor) -> Result<()> {
        self.enter(State::DownloadPackages)?;
        self.run_executor(|universe, plan| executor.download(universe, plan))
    }

    /// Dry run of the plan. The plan is not modified.
    pub fn test_transaction(&mut self, executor: &dyn PlanExecutor) -> Result<()> {
        self.enter(State::TestTransaction)?;
        self.run_executor(|universe, plan| executor.test(universe, plan))
    }

    pub fn run_transaction(&mut self, executor: &dyn PlanExecutor) -> Result<()> {
        self.enter(State::Transaction)?;
        self.run_executor(|universe, plan| executor.execute(universe, plan))?;
        self.executed = true;
        self.emit(Level::Info, "transaction complete");
        Ok(())
    }

    /// Hand over the executed plan, e.g. to a history recorder.
    pub fn take_plan(&mut self) -> Option<TransactionPlan> {
        if self.state == State::Transaction && self.executed {
            self.plan.take()
        } else {
            None
        }
    }

    /// Give up the current cycle between states and start over at `INIT`.
    pub fn abandon(&mut self) {
        self.emit(Level::Info, &format!("abandoning cycle in {}", self.state));
        self.reset();
    }

    /// Start a fresh cycle at `INIT`. This is the only way out of `FAILED`.
    pub fn reset(&mut self) {
        self.state = State::Init;
        self.history = vec![State::Init];
        self.metadata.clear();
        self.universe = None;
        self.goal = None;
        self.plan = None;
        self.problems = ProblemSet::new();
        self.executed = false;
    }

    fn can_enter(&self, to: State) -> bool {
        if self.state.next() == Some(to) {
            return match to {
                State::DownloadPackages => self.plan.as_ref().is_some_and(TransactionPlan::is_success),
                _ => true,
            };
        }
        self.state == State::ResolveTransaction
            && to == State::BuildTransaction
            && !self.plan.as_ref().is_some_and(TransactionPlan::is_success)
    }

    fn enter(&mut self, to: State) -> Result<()> {
        if !self.can_enter(to) {
            return Err(ResolveError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.emit(Level::Debug, &format!("{} -> {}", self.state, to));
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    fn fail(&mut self, error: ResolveError) -> ResolveError {
        self.emit(Level::Error, &format!("{} failed: {}", self.state, error));
        self.state = State::Failed;
        self.history.push(State::Failed);
        self.metadata.clear();
        self.universe = None;
        self.goal = None;
        self.plan = None;
        error
    }

    fn run_executor<F>(&mut self, step: F) -> Result<()>
    where
        F: FnOnce(&Universe, &TransactionPlan) -> Result<()>,
    {
        let result = match (&self.universe, &self.plan) {
            (Some(universe), Some(plan)) => step(universe, plan),
            _ => Ok(()),
        };
        result.map_err(|e| self.fail(e))
    }

    fn emit(&self, level: Level, message: &str) {
        self.diagnostics.emit(level, TARGET, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MemorySink;
    use crate::repository::{record, MemoryRepo};
    use crate::selector::Selector;
    use std::cell::RefCell;

    fn system() -> MemoryRepo {
        MemoryRepo::system().with_record(record([
            ("name", "bash"),
            ("version", "5.0"),
            ("release", "1"),
            ("arch", "x86_64"),
        ]))
    }

    fn fedora() -> MemoryRepo {
        MemoryRepo::new("fedora").with_record(record([
            ("name", "bash"),
            ("version", "5.1"),
            ("release", "1"),
            ("arch", "x86_64"),
        ]))
    }

    fn ready() -> Resolver {
        let mut resolver = Resolver::new().with_config(ResolverConfig::default());
        resolver.load_config().unwrap();
        resolver.download_metadata(&[&system(), &fedora()]).unwrap();
        resolver.load_sack().unwrap();
        resolver.build_transaction().unwrap();
        resolver
    }

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<&'static str>>,
    }

    impl PlanExecutor for Recorder {
        fn download(&self, _universe: &Universe, _plan: &TransactionPlan) -> Result<()> {
            self.calls.borrow_mut().push("download");
            Ok(())
        }

        fn test(&self, _universe: &Universe, _plan: &TransactionPlan) -> Result<()> {
            self.calls.borrow_mut().push("test");
            Ok(())
        }

        fn execute(&self, _universe: &Universe, _plan: &TransactionPlan) -> Result<()> {
            self.calls.borrow_mut().push("execute");
            Ok(())
        }
    }

    #[test]
    fn test_states_cannot_be_skipped() {
        let mut resolver = Resolver::new();
        let err = resolver.load_sack().unwrap_err();
        assert!(matches!(
            err,
            ResolveError::InvalidTransition {
                from: State::Init,
                to: State::LoadSack
            }
        ));
        assert_eq!(resolver.state(), State::Init);
    }

    #[test]
    fn test_goal_requires_build_transaction() {
        let mut resolver = Resolver::new();
        assert!(resolver.goal_mut().is_err());
    }

    #[test]
    fn test_full_cycle() {
        let mut resolver = ready();
        let bash = Selector::parse("bash").unwrap();
        resolver
            .goal_mut()
            .unwrap()
            .add_upgrade(Some(&bash), Demands::default())
            .unwrap();

        let plan = resolver.resolve(Demands::default()).unwrap();
        assert_eq!(plan.len(), 1);

        let executor = Recorder::default();
        resolver.download_packages(&executor).unwrap();
        resolver.test_transaction(&executor).unwrap();
        resolver.run_transaction(&executor).unwrap();
        assert_eq!(*executor.calls.borrow(), vec!["download", "test", "execute"]);

        assert_eq!(resolver.history().len(), 10);
        assert!(resolver.take_plan().is_some());
        assert!(resolver.take_plan().is_none());
    }

    #[test]
    fn test_goal_frozen_after_resolve() {
        let mut resolver = ready();
        resolver.resolve(Demands::default()).unwrap();

        let bash = Selector::parse("bash").unwrap();
        let err = resolver
            .goal_mut()
            .unwrap()
            .add_install(&bash, Demands::default())
            .unwrap_err();
        assert!(matches!(err, ResolveError::GoalFrozen));
    }

    #[test]
    fn test_unsatisfiable_returns_to_build() {
        let mut resolver = ready();
        let missing = Selector::parse("zsh").unwrap();
        resolver
            .goal_mut()
            .unwrap()
            .add_install(&missing, Demands::default())
            .unwrap();

        let err = resolver.resolve(Demands::default()).unwrap_err();
        assert!(matches!(err, ResolveError::Unsatisfiable(_)));
        assert_eq!(resolver.state(), State::ResolveTransaction);
        assert_eq!(resolver.problems().len(), 1);

        let failed = resolver.plan().unwrap();
        assert!(!failed.is_success());
        assert!(failed.is_empty());
        assert_eq!(failed.problems().len(), 1);

        // failed plan, so no download
        assert!(resolver.download_packages(&Recorder::default()).is_err());

        resolver.build_transaction().unwrap();
        assert!(resolver.plan().is_none());
        resolver.goal_mut().unwrap().reset();
        assert!(resolver.resolve(Demands::default()).unwrap().is_empty());
        assert!(resolver.problems().is_empty());
    }

    #[test]
    fn test_executor_failure_fails_cycle() {
        struct Broken;

        impl PlanExecutor for Broken {
            fn execute(&self, _universe: &Universe, _plan: &TransactionPlan) -> Result<()> {
                Ok(())
            }

            fn test(&self, _universe: &Universe, _plan: &TransactionPlan) -> Result<()> {
                Err(ResolveError::Config("rpm test failed".to_string()))
            }
        }

        let mut resolver = ready();
        resolver.resolve(Demands::default()).unwrap();
        resolver.download_packages(&Broken).unwrap();
        assert!(resolver.test_transaction(&Broken).is_err());
        assert_eq!(resolver.state(), State::Failed);
        assert!(resolver.universe().is_none());

        assert!(resolver.load_config().is_err());
        resolver.reset();
        assert_eq!(resolver.state(), State::Init);
        assert_eq!(resolver.history(), &[State::Init]);
    }

    #[test]
    fn test_passed_sink_reaches_every_component() {
        let sink = Arc::new(MemorySink::new());
        let mut resolver = Resolver::new()
            .with_config(ResolverConfig::default())
            .with_diagnostics(sink.clone());
        resolver.load_config().unwrap();
        resolver.download_metadata(&[&system(), &fedora()]).unwrap();
        resolver.load_sack().unwrap();
        resolver.build_transaction().unwrap();
        resolver
            .goal_mut()
            .unwrap()
            .add_upgrade(None, Demands::default())
            .unwrap();
        resolver.resolve(Demands::default()).unwrap();

        let targets: Vec<String> = sink.records().into_iter().map(|r| r.target).collect();
        for target in ["rpmsolve::resolver", "rpmsolve::goal", "rpmsolve::solver"] {
            assert!(targets.iter().any(|t| t == target), "nothing from {}", target);
        }
    }

    #[test]
    fn test_abandon() {
        let mut resolver = ready();
        resolver.abandon();
        assert_eq!(resolver.state(), State::Init);
        assert!(resolver.goal().is_none());
        assert!(resolver.universe().is_none());
    }
}
