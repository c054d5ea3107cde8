//! Dependency resolution.
//!
//! A [`Solver`] turns the jobs of a [`Goal`](crate::Goal) into raw
//! install/erase decisions. [`BacktrackSolver`] is the built-in backend; any
//! other backend can be plugged into the
//! [`Resolver`](crate::Resolver) through the same trait.

mod backtrack;
mod policy;
mod problem;


use std::collections::BTreeMap;

pub use backtrack::BacktrackSolver;
pub use policy::Policy;
pub use problem::{Problem, ProblemKind, ProblemSet, Severity};

use crate::config::ResolverConfig;
use crate::demands::Demands;
use crate::diagnostics::Diagnostics;
use crate::goal::Job;
use crate::package::{PackageId, Reason};
use crate::universe::Universe;

/// What a solver decided, before it is classified into a
/// [`TransactionPlan`](crate::TransactionPlan).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDecisions {
    /// Packages to put on the system, ascending
    pub install: Vec<PackageId>,
    /// Installed packages to take off the system, ascending
    pub erase: Vec<PackageId>,
    /// `(new, old)`: `old` leaves because `new` obsoletes it
    pub obsoletes: Vec<(PackageId, PackageId)>,
    /// `(dependency, dependent)`: install `dependency` first
    pub order: Vec<(PackageId, PackageId)>,
    /// Reason to record for new packages and for reason changes
    pub reasons: BTreeMap<PackageId, Reason>,
}

impl RawDecisions {
    pub fn is_empty(&self) -> bool {
        self.install.is_empty() && self.erase.is_empty() && self.reasons.is_empty()
    }
}

/// A dependency solver backend.
///
/// Implementations must be deterministic: the same universe generation,
/// job list and demands always give the same answer.
pub trait Solver {
    /// Called by the [`Resolver`](crate::Resolver) once configuration is
    /// loaded.
    fn configure(&mut self, _config: &ResolverConfig, _diagnostics: &Diagnostics) {}

    fn solve(
        &self,
        universe: &Universe,
        jobs: &[Job],
        demands: Demands,
    ) -> std::result::Result<RawDecisions, Vec<Problem>>;
}
