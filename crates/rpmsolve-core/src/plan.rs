//! Turning raw solver decisions into an ordered, typed transaction plan.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::package::{PackageId, Reason};
use crate::query::same_arch_family;
use crate::solver::{ProblemSet, RawDecisions};
use crate::universe::Universe;

/// What happens to one package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Install,
    Upgrade,
    Downgrade,
    Reinstall,
    Erase,
    /// Erased because a new package obsoletes it
    Obsolete,
    /// Stays installed with a different recorded reason
    ReasonChange,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Install => "install",
            OperationKind::Upgrade => "upgrade",
            OperationKind::Downgrade => "downgrade",
            OperationKind::Reinstall => "reinstall",
            OperationKind::Erase => "erase",
            OperationKind::Obsolete => "obsolete",
            OperationKind::ReasonChange => "reason-change",
        }
    }

    /// Whether the operation puts a package file on the system.
    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            OperationKind::Install
                | OperationKind::Upgrade
                | OperationKind::Downgrade
                | OperationKind::Reinstall
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single step of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub kind: OperationKind,
    pub package: PackageId,
    /// The other side of a replacement: the old build for upgrade,
    /// downgrade and reinstall, the obsoleting package for obsolete.
    pub replaced: Option<PackageId>,
    /// Reason recorded for `package`
    pub reason: Reason,
}

impl Operation {
    fn new(kind: OperationKind, package: PackageId, replaced: Option<PackageId>, reason: Reason) -> Self {
        Self {
            kind,
            package,
            replaced,
            reason,
        }
    }

    /// One-line description, e.g. `upgrade bash-5.1-1.x86_64 (replacing bash-5.0-1.x86_64)`.
    pub fn describe(&self, universe: &Universe) -> String {
        let pkg = &universe[self.package];
        match (self.kind, self.replaced) {
            (OperationKind::Obsolete, Some(by)) => {
                format!("obsolete {} (by {})", pkg, universe[by])
            }
            (OperationKind::ReasonChange, _) => format!("reason-change {} ({})", pkg, self.reason),
            (kind, Some(old)) => format!("{} {} (replacing {})", kind, pkg, universe[old]),
            (kind, None) => format!("{} {}", kind, pkg),
        }
    }
}

/// Ordered outcome of one resolution.
///
/// Either carries operations (the solver succeeded) or problems (it did
/// not), never both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPlan {
    operations: Vec<Operation>,
    problems: ProblemSet,
}

impl TransactionPlan {
    /// An empty, successful plan
    pub fn new() -> Self {
        Self::default()
    }

    /// A plan that failed with `problems`.
    pub fn failed(problems: ProblemSet) -> Self {
        Self {
            operations: Vec::new(),
            problems,
        }
    }

    /// Classify and order the decisions of a solver.
    ///
    /// Installs of packages already on the system are dropped. Standalone
    /// erases come first; installs follow in dependency order, each
    /// preceded by the erases of the packages it obsoletes; reason changes
    /// come last. Ties are broken by package name.
    pub fn materialize(universe: &Universe, decisions: &RawDecisions) -> Self {
        let installs: BTreeSet<PackageId> = decisions
            .install
            .iter()
            .copied()
            .filter(|&id| !universe[id].installed)
            .collect();
        let mut erases: BTreeSet<PackageId> = decisions
            .erase
            .iter()
            .copied()
            .filter(|&id| universe[id].installed)
            .collect();

        let reason_of = |id: PackageId, fallback: Reason| {
            decisions.reasons.get(&id).copied().unwrap_or(fallback)
        };

        let mut inbound: Vec<Operation> = Vec::new();
        for &id in &installs {
            let pkg = &universe[id];
            let old = erases
                .iter()
                .copied()
                .filter(|&old| universe[old].name == pkg.name && same_arch_family(&universe[old], pkg))
                .max_by(|&a, &b| universe[a].evr.cmp(&universe[b].evr));

            let op = match old {
                Some(old) => {
                    erases.remove(&old);
                    let kind = match pkg.evr.cmp(&universe[old].evr) {
                        Ordering::Greater => OperationKind::Upgrade,
                        Ordering::Less => OperationKind::Downgrade,
                        Ordering::Equal => OperationKind::Reinstall,
                    };
                    Operation::new(kind, id, Some(old), reason_of(id, universe.reason(old)))
                }
                None => Operation::new(OperationKind::Install, id, None, reason_of(id, Reason::Dependency)),
            };
            inbound.push(op);
        }

        // old -> obsoleting package
        let mut obsoleted: BTreeMap<PackageId, PackageId> = BTreeMap::new();
        for &(new, old) in &decisions.obsoletes {
            if installs.contains(&new) && erases.remove(&old) {
                obsoleted.insert(old, new);
            }
        }
        for old in erases.clone() {
            if let Some(&new) = installs
                .iter()
                .find(|&&new| universe[new].obsoletes_pkg(&universe[old]))
            {
                erases.remove(&old);
                obsoleted.insert(old, new);
            }
        }

        let mut operations = Vec::new();

        let mut standalone: Vec<PackageId> = erases.into_iter().collect();
        standalone.sort_by(|&a, &b| by_name(universe, a, b));
        for id in standalone {
            operations.push(Operation::new(OperationKind::Erase, id, None, universe.reason(id)));
        }

        for op in topological_sort(universe, inbound, &decisions.order) {
            let mut before: Vec<PackageId> = obsoleted
                .iter()
                .filter(|(_, &new)| new == op.package)
                .map(|(&old, _)| old)
                .collect();
            before.sort_by(|&a, &b| by_name(universe, a, b));
            for old in before {
                operations.push(Operation::new(
                    OperationKind::Obsolete,
                    old,
                    Some(op.package),
                    universe.reason(old),
                ));
            }
            operations.push(op);
        }

        let mut changes: Vec<(PackageId, Reason)> = decisions
            .reasons
            .iter()
            .map(|(&id, &reason)| (id, reason))
            .filter(|&(id, reason)| {
                let pkg = &universe[id];
                pkg.installed && !decisions.erase.contains(&id) && pkg.reason != reason
            })
            .collect();
        changes.sort_by(|a, b| by_name(universe, a.0, b.0));
        for (id, reason) in changes {
            operations.push(Operation::new(OperationKind::ReasonChange, id, None, reason));
        }

        Self {
            operations,
            problems: ProblemSet::new(),
        }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn problems(&self) -> &ProblemSet {
        &self.problems
    }

    pub fn is_success(&self) -> bool {
        self.problems.is_empty()
    }

    /// No operations (successful or not)
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    fn of_kind(&self, kind: OperationKind) -> impl Iterator<Item = &Operation> {
        self.operations.iter().filter(move |op| op.kind == kind)
    }

    /// New packages only (not upgrades)
    pub fn installs(&self) -> impl Iterator<Item = &Operation> {
        self.of_kind(OperationKind::Install)
    }

    /// Erases without a replacement
    pub fn erasures(&self) -> impl Iterator<Item = &Operation> {
        self.of_kind(OperationKind::Erase)
    }

    pub fn upgrades(&self) -> impl Iterator<Item = &Operation> {
        self.of_kind(OperationKind::Upgrade)
    }

    pub fn downgrades(&self) -> impl Iterator<Item = &Operation> {
        self.of_kind(OperationKind::Downgrade)
    }

    pub fn reinstalls(&self) -> impl Iterator<Item = &Operation> {
        self.of_kind(OperationKind::Reinstall)
    }

    pub fn obsoleted(&self) -> impl Iterator<Item = &Operation> {
        self.of_kind(OperationKind::Obsolete)
    }

    pub fn reason_changes(&self) -> impl Iterator<Item = &Operation> {
        self.of_kind(OperationKind::ReasonChange)
    }

    /// Packages that `id` obsoletes in this plan.
    pub fn obsoleted_by(&self, id: PackageId) -> Vec<PackageId> {
        self.obsoleted()
            .filter(|op| op.replaced == Some(id))
            .map(|op| op.package)
            .collect()
    }

    /// Packages whose files have to be fetched, in plan order.
    pub fn inbound_packages(&self) -> Vec<PackageId> {
        self.operations
            .iter()
            .filter(|op| op.kind.is_inbound())
            .map(|op| op.package)
            .collect()
    }

    pub fn summary(&self) -> TransactionSummary {
        let mut summary = TransactionSummary::default();

        for op in &self.operations {
            match op.kind {
                OperationKind::Install => summary.installs += 1,
                OperationKind::Upgrade => summary.upgrades += 1,
                OperationKind::Downgrade => summary.downgrades += 1,
                OperationKind::Reinstall => summary.reinstalls += 1,
                OperationKind::Erase => summary.erasures += 1,
                OperationKind::Obsolete => summary.obsoletes += 1,
                OperationKind::ReasonChange => summary.reason_changes += 1,
            }
        }

        summary
    }
}

/// Operation counts of a plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionSummary {
    pub installs: usize,
    pub upgrades: usize,
    pub downgrades: usize,
    pub reinstalls: usize,
    pub erasures: usize,
    pub obsoletes: usize,
    pub reason_changes: usize,
}

impl fmt::Display for TransactionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        for (count, label) in [
            (self.installs, "install"),
            (self.upgrades, "upgrade"),
            (self.downgrades, "downgrade"),
            (self.reinstalls, "reinstall"),
            (self.erasures, "removal"),
            (self.obsoletes, "obsolete"),
            (self.reason_changes, "reason change"),
        ] {
            if count > 0 {
                parts.push(format!("{} {}(s)", count, label));
            }
        }

        if parts.is_empty() {
            write!(f, "Nothing to do")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

fn by_name(universe: &Universe, a: PackageId, b: PackageId) -> Ordering {
    universe[a].name.cmp(&universe[b].name).then_with(|| a.cmp(&b))
}

/// Kahn's algorithm over the solver's `(dependency, dependent)` pairs.
/// Ready operations are taken in name order; members of a cycle are
/// appended by name.
fn topological_sort(
    universe: &Universe,
    operations: Vec<Operation>,
    order: &[(PackageId, PackageId)],
) -> Vec<Operation> {
    if operations.is_empty() {
        return operations;
    }

    let index: HashMap<PackageId, usize> = operations
        .iter()
        .enumerate()
        .map(|(idx, op)| (op.package, idx))
        .collect();

    let mut in_degree = vec![0usize; operations.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); operations.len()];
    for (dependency, dependent) in order {
        if let (Some(&from), Some(&to)) = (index.get(dependency), index.get(dependent)) {
            if from != to && !dependents[from].contains(&to) {
                dependents[from].push(to);
                in_degree[to] += 1;
            }
        }
    }

    let key = |idx: usize| (universe[operations[idx].package].name.clone(), operations[idx].package);

    let mut ready: BTreeSet<(String, PackageId)> = BTreeSet::new();
    for (idx, &degree) in in_degree.iter().enumerate() {
        if degree == 0 {
            ready.insert(key(idx));
        }
    }

    let mut result: Vec<usize> = Vec::with_capacity(operations.len());
    while let Some((_, id)) = ready.pop_first() {
        let idx = index[&id];
        result.push(idx);
        for &dependent in &dependents[idx] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(key(dependent));
            }
        }
    }

    if result.len() != operations.len() {
        let mut rest: Vec<usize> = (0..operations.len())
            .filter(|idx| !result.contains(idx))
            .collect();
        rest.sort_by(|&a, &b| key(a).cmp(&key(b)));
        result.extend(rest);
    }

    result.into_iter().map(|idx| operations[idx].clone()).collect()
}
