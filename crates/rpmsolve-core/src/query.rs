//! Declarative narrowing of a package set.
//!
//! A [`Query`] starts from the universe's considered packages and applies
//! [`Filter`]s with AND semantics; [`Query::filter_any`] unions a group of
//! filters first. Nothing here fails: an empty result is a valid answer.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use glob::Pattern;

use rpmsolve_evr::{Comparison, Evr, Nevra, Reldep};

use crate::error::Result;
use crate::package::{Package, PackageId};
use crate::package_set::PackageSet;
use crate::universe::{compile_glob, Universe};

/// How a name is matched.
#[derive(Debug, Clone, PartialEq)]
pub enum NameMatch {
    Exact(String),
    Glob(Pattern),
}

impl NameMatch {
    /// Exact match unless `pattern` contains glob metacharacters.
    pub fn from_pattern(pattern: &str) -> Self {
        if is_glob(pattern) {
            NameMatch::Glob(compile_glob(pattern))
        } else {
            NameMatch::Exact(pattern.to_string())
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            NameMatch::Exact(n) => n == name,
            NameMatch::Glob(p) => p.matches(name),
        }
    }
}

pub(crate) fn is_glob(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Package ids accepted by [`Filter::Ids`].
///
/// Only [`Query::ids`] builds one, after checking the set against the
/// queried universe, so a set from another generation never reaches a
/// filter:
///
/// ```compile_fail
/// use rpmsolve_core::{Filter, IdSet, PackageSet};
///
/// let _ = Filter::Ids(IdSet(PackageSet::from_ids(0, 0, [])));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct IdSet(PackageSet);

impl IdSet {
    pub fn set(&self) -> &PackageSet {
        &self.0
    }
}

/// One query predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Name(NameMatch),
    /// Exact `name-[epoch:]version-release.arch`
    Nevra(String),
    /// Component-wise match; absent parts match anything
    NevraParts(Nevra),
    Epoch(u32),
    Version(String),
    Release(String),
    Evr(Comparison, Evr),
    Arch(Vec<String>),
    Repo(Vec<String>),
    Installed(bool),
    Provides(Reldep),
    Requires(Reldep),
    Conflicts(Reldep),
    Obsoletes(Reldep),
    Ids(IdSet),
    /// Available packages newer than every installed one of the same name and arch
    Upgrades,
    /// Available packages older than every installed one of the same name and arch
    Downgrades,
    /// Per name and arch, only the highest EVR (ties kept)
    Latest,
    /// Per name and arch, only available packages from the best-priority repository
    Priority,
}

#[derive(Debug, Clone)]
pub struct Query<'u> {
    universe: &'u Universe,
    result: PackageSet,
    filters: Vec<Filter>,
}

impl<'u> Query<'u> {
    /// Query over every considered (non-excluded) package.
    pub fn new(universe: &'u Universe) -> Self {
        Self {
            universe,
            result: universe.considered().clone(),
            filters: Vec::new(),
        }
    }

    /// Query over every package, excluded ones included.
    pub fn all(universe: &'u Universe) -> Self {
        Self {
            universe,
            result: universe.full_set(),
            filters: Vec::new(),
        }
    }

    /// Query starting from `set`, which must belong to `universe`.
    pub fn from_set(universe: &'u Universe, set: PackageSet) -> Result<Self> {
        universe.full_set().check_generation(&set)?;
        Ok(Self {
            universe,
            result: set,
            filters: Vec::new(),
        })
    }

    pub fn universe(&self) -> &'u Universe {
        self.universe
    }

    /// Intersect the result with everything `filter` accepts.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.result = self.apply(&filter, &self.result);
        self.filters.push(filter);
        self
    }

    /// Intersect the result with the union of what each filter accepts.
    pub fn filter_any(mut self, filters: Vec<Filter>) -> Self {
        let accepted: Vec<PackageSet> = filters
            .iter()
            .map(|filter| self.apply(filter, &self.result))
            .collect();
        let mut union = self.result.clone();
        for id in &self.result {
            if !accepted.iter().any(|set| set.contains(id)) {
                union.remove(id);
            }
        }
        self.result = union;
        self.filters.extend(filters);
        self
    }

    pub fn name(self, name: &str) -> Self {
        self.filter(Filter::Name(NameMatch::Exact(name.to_string())))
    }

    pub fn name_glob(self, pattern: &str) -> Self {
        self.filter(Filter::Name(NameMatch::Glob(compile_glob(pattern))))
    }

    pub fn nevra(self, nevra: &str) -> Self {
        self.filter(Filter::Nevra(nevra.to_string()))
    }

    pub fn epoch(self, epoch: u32) -> Self {
        self.filter(Filter::Epoch(epoch))
    }

    pub fn version(self, version: &str) -> Self {
        self.filter(Filter::Version(version.to_string()))
    }

    pub fn release(self, release: &str) -> Self {
        self.filter(Filter::Release(release.to_string()))
    }

    pub fn evr(self, cmp: Comparison, evr: Evr) -> Self {
        self.filter(Filter::Evr(cmp, evr))
    }

    pub fn arch(self, arches: &[&str]) -> Self {
        self.filter(Filter::Arch(arches.iter().map(|a| a.to_string()).collect()))
    }

    pub fn repo(self, repos: &[&str]) -> Self {
        self.filter(Filter::Repo(repos.iter().map(|r| r.to_string()).collect()))
    }

    pub fn installed(self) -> Self {
        self.filter(Filter::Installed(true))
    }

    pub fn available(self) -> Self {
        self.filter(Filter::Installed(false))
    }

    pub fn provides(self, dep: Reldep) -> Self {
        self.filter(Filter::Provides(dep))
    }

    pub fn requires(self, dep: Reldep) -> Self {
        self.filter(Filter::Requires(dep))
    }

    pub fn conflicts(self, dep: Reldep) -> Self {
        self.filter(Filter::Conflicts(dep))
    }

    pub fn obsoletes(self, dep: Reldep) -> Self {
        self.filter(Filter::Obsoletes(dep))
    }

    /// Restrict to `ids`, which must come from the same universe.
    pub fn ids(self, ids: &PackageSet) -> Result<Self> {
        self.result.check_generation(ids)?;
        Ok(self.filter(Filter::Ids(IdSet(ids.clone()))))
    }

    /// Empty the result.
    pub(crate) fn nothing(self) -> Self {
        let empty = self.universe.empty_set();
        self.filter(Filter::Ids(IdSet(empty)))
    }

    pub fn upgrades(self) -> Self {
        self.filter(Filter::Upgrades)
    }

    pub fn downgrades(self) -> Self {
        self.filter(Filter::Downgrades)
    }

    pub fn latest(self) -> Self {
        self.filter(Filter::Latest)
    }

    pub fn priority(self) -> Self {
        self.filter(Filter::Priority)
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn result(&self) -> &PackageSet {
        &self.result
    }

    pub fn into_set(self) -> PackageSet {
        self.result
    }

    pub fn len(&self) -> usize {
        self.result.len()
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }

    /// Result ids in the deterministic package order.
    pub fn sorted(&self) -> Vec<PackageId> {
        let mut ids = self.result.to_vec();
        ids.sort_by(|&a, &b| compare_packages(self.universe, a, b));
        ids
    }

    pub fn packages(&self) -> Vec<&'u Package> {
        let universe = self.universe;
        self.sorted().into_iter().map(|id| &universe[id]).collect()
    }

    fn apply(&self, filter: &Filter, base: &PackageSet) -> PackageSet {
        match filter {
            Filter::Latest => self.keep_per_family(base, |a, b| a.evr.cmp(&b.evr)),
            Filter::Priority => self.keep_best_priority(base),
            _ => {
                let mut out = base.clone();
                for id in base {
                    if !self.matches(filter, &self.universe[id]) {
                        out.remove(id);
                    }
                }
                out
            }
        }
    }

    fn matches(&self, filter: &Filter, pkg: &Package) -> bool {
        match filter {
            Filter::Name(m) => m.matches(&pkg.name),
            Filter::Nevra(s) => {
                *s == pkg.nevra()
                    || *s == format!("{}-{}:{}-{}.{}", pkg.name, pkg.epoch(), pkg.version(), pkg.release(), pkg.arch)
            }
            Filter::NevraParts(n) => nevra_matches(n, pkg),
            Filter::Epoch(e) => pkg.epoch() == *e,
            Filter::Version(v) => pkg.version() == v,
            Filter::Release(r) => pkg.release() == r,
            Filter::Evr(cmp, evr) => cmp.accepts(pkg.evr.compare_for_match(evr)),
            Filter::Arch(arches) => arches.iter().any(|a| *a == pkg.arch),
            Filter::Repo(repos) => repos.iter().any(|r| *r == pkg.repo),
            Filter::Installed(flag) => pkg.installed == *flag,
            Filter::Provides(dep) => pkg.provides_dep(dep),
            Filter::Requires(dep) => pkg.requires.iter().any(|r| r.overlaps(dep)),
            Filter::Conflicts(dep) => pkg.conflicts.iter().any(|c| c.overlaps(dep)),
            Filter::Obsoletes(dep) => pkg.obsoletes.iter().any(|o| o.overlaps(dep)),
            Filter::Upgrades => self.relative_to_installed(pkg, Ordering::Greater),
            Filter::Downgrades => self.relative_to_installed(pkg, Ordering::Less),
            Filter::Ids(ids) => ids.0.contains(pkg.id),
            Filter::Latest | Filter::Priority => true,
        }
    }

    /// Whether `pkg` is available and compares as `wanted` against every
    /// installed package of its family.
    fn relative_to_installed(&self, pkg: &Package, wanted: Ordering) -> bool {
        if pkg.installed {
            return false;
        }
        let mut installed = self
            .universe
            .installed_by_name(&pkg.name)
            .into_iter()
            .map(|id| &self.universe[id])
            .filter(|i| same_arch_family(i, pkg))
            .peekable();
        installed.peek().is_some() && installed.all(|i| pkg.evr.cmp(&i.evr) == wanted)
    }

    fn keep_per_family(&self, base: &PackageSet, cmp: impl Fn(&Package, &Package) -> Ordering) -> PackageSet {
        let mut best: BTreeMap<(&str, &str), Vec<&Package>> = BTreeMap::new();
        for id in base {
            let pkg = &self.universe[id];
            let entry = best.entry((pkg.name.as_str(), pkg.arch.as_str())).or_default();
            match entry.first().map(|current| cmp(pkg, current)) {
                None | Some(Ordering::Equal) => entry.push(pkg),
                Some(Ordering::Greater) => *entry = vec![pkg],
                Some(Ordering::Less) => {}
            }
        }
        PackageSet::from_ids(
            base.generation(),
            base.capacity(),
            best.values().flatten().map(|p| p.id),
        )
    }

    fn keep_best_priority(&self, base: &PackageSet) -> PackageSet {
        let mut out = base.clone();
        let mut best: BTreeMap<(&str, &str), i32> = BTreeMap::new();
        for id in base {
            let pkg = &self.universe[id];
            if pkg.installed {
                continue;
            }
            let prio = self.universe.repo_priority(&pkg.repo);
            let entry = best.entry((pkg.name.as_str(), pkg.arch.as_str())).or_insert(prio);
            *entry = (*entry).min(prio);
        }
        for id in base {
            let pkg = &self.universe[id];
            if pkg.installed {
                continue;
            }
            let key = (pkg.name.as_str(), pkg.arch.as_str());
            if best.get(&key).is_some_and(|&p| self.universe.repo_priority(&pkg.repo) > p) {
                out.remove(id);
            }
        }
        out
    }
}

fn nevra_matches(n: &Nevra, pkg: &Package) -> bool {
    NameMatch::from_pattern(&n.name).matches(&pkg.name)
        && n.epoch.map_or(true, |e| e == pkg.epoch())
        && n.version.as_deref().map_or(true, |v| glob_or_eq(v, pkg.version()))
        && n.release.as_deref().map_or(true, |r| glob_or_eq(r, pkg.release()))
        && n.arch.as_deref().map_or(true, |a| glob_or_eq(a, &pkg.arch))
}

fn glob_or_eq(pattern: &str, value: &str) -> bool {
    if is_glob(pattern) {
        compile_glob(pattern).matches(value)
    } else {
        pattern == value
    }
}

/// Packages of one name whose arches can replace each other.
pub(crate) fn same_arch_family(a: &Package, b: &Package) -> bool {
    a.arch == b.arch || a.is_noarch() || b.is_noarch()
}

/// Name, EVR, arch, repository priority, id.
pub(crate) fn compare_packages(universe: &Universe, a: PackageId, b: PackageId) -> Ordering {
    let pa = &universe[a];
    let pb = &universe[b];
    pa.name
        .cmp(&pb.name)
        .then_with(|| pa.evr.cmp(&pb.evr))
        .then_with(|| pa.arch.cmp(&pb.arch))
        .then_with(|| {
            universe
                .repo_priority(&pa.repo)
                .cmp(&universe.repo_priority(&pb.repo))
        })
        .then_with(|| a.cmp(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use crate::repository::{record, RawRecord, RepoMetadata, SYSTEM_REPO};

    fn pkg(name: &str, evr: &str, arch: &str) -> RawRecord {
        let evr = Evr::parse(evr).unwrap();
        let epoch = evr.epoch.to_string();
        let mut r = record([
            ("name", name),
            ("version", evr.version.as_str()),
            ("release", evr.release.as_str()),
            ("arch", arch),
        ]);
        r.insert("epoch".to_string(), epoch);
        r
    }

    fn repo(id: &str, priority: i32, records: Vec<RawRecord>) -> RepoMetadata {
        RepoMetadata {
            id: id.to_string(),
            priority,
            system: id == SYSTEM_REPO,
            records,
        }
    }

    fn universe() -> Universe {
        let mut zlib = pkg("zlib", "1.2.13-3", "x86_64");
        zlib.insert("provides".to_string(), "libz.so.1()(64bit)".to_string());
        let mut curl = pkg("curl", "8.0-1", "x86_64");
        curl.insert("requires".to_string(), "libz.so.1()(64bit), openssl >= 3".to_string());

        Universe::builder()
            .repo(repo(SYSTEM_REPO, 99, vec![pkg("bash", "5.0-1", "x86_64"), zlib]))
            .repo(repo(
                "fedora",
                99,
                vec![
                    pkg("bash", "5.1-1", "x86_64"),
                    pkg("bash", "5.1-1", "i686"),
                    pkg("bash", "4.4-1", "x86_64"),
                    curl,
                ],
            ))
            .repo(repo("updates", 10, vec![pkg("bash", "5.1-1", "x86_64")]))
            .build()
            .unwrap()
    }

    fn nevras(q: &Query) -> Vec<String> {
        q.packages().iter().map(|p| format!("{}@{}", p.nevra(), p.repo)).collect()
    }

    #[test]
    fn test_name_and_arch() {
        let u = universe();
        let q = Query::new(&u).name("bash").arch(&["x86_64"]).available();
        assert_eq!(q.len(), 3);
        assert_eq!(q.filters().len(), 3);
    }

    #[test]
    fn test_sort_order() {
        let u = universe();
        let q = Query::new(&u).name("bash");
        assert_eq!(
            nevras(&q),
            vec![
                "bash-4.4-1.x86_64@fedora",
                "bash-5.0-1.x86_64@@System",
                "bash-5.1-1.i686@fedora",
                "bash-5.1-1.x86_64@updates",
                "bash-5.1-1.x86_64@fedora",
            ]
        );
        assert_eq!(q.sorted(), q.sorted());
    }

    #[test]
    fn test_latest_keeps_ties_and_is_idempotent() {
        let u = universe();
        let once = Query::new(&u).name("bash").latest();
        assert_eq!(
            nevras(&once),
            vec![
                "bash-5.1-1.i686@fedora",
                "bash-5.1-1.x86_64@updates",
                "bash-5.1-1.x86_64@fedora",
            ]
        );
        let twice = once.clone().latest();
        assert_eq!(once.result(), twice.result());
    }

    #[test]
    fn test_priority_filter_breaks_ties() {
        let u = universe();
        let q = Query::new(&u).name("bash").latest().priority();
        assert_eq!(
            nevras(&q),
            vec!["bash-5.1-1.i686@fedora", "bash-5.1-1.x86_64@updates"]
        );
    }

    #[test]
    fn test_upgrades_and_downgrades() {
        let u = universe();
        let up = Query::new(&u).upgrades();
        assert_eq!(
            nevras(&up),
            vec!["bash-5.1-1.x86_64@updates", "bash-5.1-1.x86_64@fedora"]
        );
        let down = Query::new(&u).downgrades();
        assert_eq!(nevras(&down), vec!["bash-4.4-1.x86_64@fedora"]);
    }

    #[test]
    fn test_evr_comparison() {
        let u = universe();
        let q = Query::new(&u)
            .name("bash")
            .evr(Comparison::Ge, Evr::parse("5.0").unwrap());
        assert_eq!(q.len(), 4);
        let q = Query::new(&u).name("bash").version("4.4");
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_or_group() {
        let u = universe();
        let q = Query::new(&u).installed().filter_any(vec![
            Filter::Name(NameMatch::Exact("zlib".to_string())),
            Filter::Name(NameMatch::Exact("bash".to_string())),
        ]);
        assert_eq!(q.len(), 2);
        assert_eq!(q.filters().len(), 3);
    }

    #[test]
    fn test_dependency_predicates() {
        let u = universe();
        let providers = Query::new(&u).provides(Reldep::parse("libz.so.1()(64bit)").unwrap());
        assert_eq!(nevras(&providers), vec!["zlib-1.2.13-3.x86_64@@System"]);

        let dependents = Query::new(&u).requires(Reldep::parse("openssl = 3.1").unwrap());
        assert_eq!(dependents.len(), 1);
        assert!(Query::new(&u)
            .requires(Reldep::parse("openssl < 2").unwrap())
            .is_empty());
    }

    #[test]
    fn test_invalid_glob_matches_literally() {
        let u = universe();
        assert!(Query::new(&u).name_glob("bash[").is_empty());
        assert_eq!(Query::new(&u).name_glob("ba*").len(), 5);
    }

    #[test]
    fn test_nevra_exact() {
        let u = universe();
        assert_eq!(Query::new(&u).nevra("bash-5.1-1.i686").len(), 1);
        assert_eq!(Query::new(&u).nevra("bash-0:5.1-1.i686").len(), 1);
    }

    #[test]
    fn test_ids_rejects_foreign_set() {
        let u = universe();
        let other = universe();
        assert!(Query::new(&u).ids(&other.full_set()).is_err());
        let only = PackageSet::from_ids(u.generation(), u.len(), [PackageId(0)]);
        assert_eq!(Query::new(&u).ids(&only).unwrap().len(), 1);
    }

    #[test]
    fn test_id_filter_only_holds_checked_sets() {
        let u = universe();
        let other = universe();

        // a foreign set is refused before it becomes a filter
        let err = Query::new(&u).installed().ids(&other.full_set()).unwrap_err();
        assert!(matches!(err, ResolveError::UniverseMismatch { .. }));

        let only = PackageSet::from_ids(u.generation(), u.len(), [PackageId(1), PackageId(3)]);
        let q = Query::new(&u).ids(&only).unwrap();
        match q.filters() {
            [Filter::Ids(ids)] => assert_eq!(ids.set().generation(), u.generation()),
            other => panic!("unexpected filters {:?}", other),
        }

        // the recorded filter can be replayed in a union
        let replay = q.filters().to_vec();
        let q = Query::new(&u).filter_any(replay);
        assert_eq!(q.result().to_vec(), vec![PackageId(1), PackageId(3)]);
    }
}
