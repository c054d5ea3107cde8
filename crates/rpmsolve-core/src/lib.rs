//! Resolution core for RPM-style package sets.
//!
//! Load repository records into a [`Universe`], narrow it down with
//! [`Query`] and [`Selector`], collect requests in a [`Goal`] and turn them
//! into an ordered [`TransactionPlan`]. [`Resolver`] walks the whole cycle
//! as a state machine.

pub mod config;
pub mod demands;
pub mod diagnostics;
pub mod error;
pub mod goal;
pub mod package;
pub mod package_set;
pub mod plan;
pub mod query;
pub mod repository;
pub mod resolver;
pub mod selector;
pub mod solver;
pub mod state;
pub mod universe;

pub use config::ResolverConfig;
pub use demands::{CacheOnly, Demands};
pub use diagnostics::{DiagnosticSink, Diagnostics, Level, LogSink, MemorySink, NullSink};
pub use error::{ResolveError, Result};
pub use goal::{Goal, Job, JobKind, JobTarget};
pub use package::{Package, PackageId, Reason};
pub use package_set::PackageSet;
pub use plan::{Operation, OperationKind, TransactionPlan, TransactionSummary};
pub use query::{Filter, IdSet, NameMatch, Query};
pub use repository::{JsonRepo, MemoryRepo, RawRecord, RepoMetadata, RepoSource, SYSTEM_REPO};
pub use resolver::{PlanExecutor, Resolver};
pub use selector::Selector;
pub use solver::{BacktrackSolver, Policy, Problem, ProblemKind, ProblemSet, RawDecisions, Severity, Solver};
pub use state::State;
pub use universe::{Universe, UniverseBuilder};
