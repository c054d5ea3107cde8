use std::fmt;

use crate::package::PackageId;

/// How serious a problem is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

/// Category of a resolution problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProblemKind {
    /// A selector matched no package
    NoMatch,
    /// Two jobs ask for opposite things on one family
    JobConflict,
    /// A requirement has no installable provider
    Unresolvable,
    /// Two packages that would end up installed conflict
    Conflict,
    /// The job would erase a protected package
    Protected,
    /// A job cannot be carried out as asked, e.g. nothing newer to upgrade to
    NotApplicable,
    /// The search budget ran out
    StepLimit,
}

/// One reason why resolution failed.
///
/// Read-only once produced by a solver.
#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    pub severity: Severity,
    pub kind: ProblemKind,
    /// Human-readable explanation
    pub message: String,
    /// Packages involved
    pub packages: Vec<PackageId>,
    /// Offending dependency expression, if any
    pub dependency: Option<String>,
}

impl Problem {
    pub fn new(kind: ProblemKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            message: message.into(),
            packages: Vec::new(),
            dependency: None,
        }
    }

    pub fn with_packages(mut self, packages: impl IntoIterator<Item = PackageId>) -> Self {
        self.packages.extend(packages);
        self
    }

    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependency = Some(dependency.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Every independent problem found by one solve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProblemSet {
    problems: Vec<Problem>,
}

impl ProblemSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, problem: Problem) {
        self.problems.push(problem);
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn iter(&self) -> impl Iterator<Item = &Problem> {
        self.problems.iter()
    }

    /// Numbered listing of every problem.
    pub fn describe(&self) -> String {
        let mut lines = vec![self.to_string()];
        for (i, problem) in self.problems.iter().enumerate() {
            lines.push(format!("  Problem {}: {}", i + 1, problem.message));
        }
        lines.join("\n")
    }
}

impl From<Vec<Problem>> for ProblemSet {
    fn from(problems: Vec<Problem>) -> Self {
        Self { problems }
    }
}

impl fmt::Display for ProblemSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} problem(s) found", self.problems.len())
    }
}

impl<'a> IntoIterator for &'a ProblemSet {
    type Item = &'a Problem;
    type IntoIter = std::slice::Iter<'a, Problem>;

    fn into_iter(self) -> Self::IntoIter {
        self.problems.iter()
    }
}
