//! The package universe ("sack"): every installed and available package of
//! one resolution cycle, addressed by [`PackageId`].

use std::collections::{BTreeSet, HashMap};
use std::ops::Index;
use std::sync::atomic::{AtomicU64, Ordering};

use glob::Pattern;
use indexmap::IndexMap;

use rpmsolve_evr::{Evr, Reldep};

use crate::error::{ResolveError, Result};
use crate::package::{Package, PackageId, Reason};
use crate::package_set::PackageSet;
use crate::repository::{RawRecord, RepoMetadata};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Immutable index of all packages known to one resolution cycle.
#[derive(Debug)]
pub struct Universe {
    generation: u64,
    packages: Vec<Package>,
    by_name: HashMap<String, Vec<PackageId>>,
    by_provide: HashMap<String, Vec<PackageId>>,
    repo_priorities: IndexMap<String, i32>,
    installed: PackageSet,
    considered: PackageSet,
    native_arch: Option<String>,
}

impl Universe {
    pub fn builder() -> UniverseBuilder {
        UniverseBuilder::new()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn package(&self, id: PackageId) -> Option<&Package> {
        self.packages.get(id.index())
    }

    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.iter()
    }

    pub fn empty_set(&self) -> PackageSet {
        PackageSet::empty(self.generation, self.packages.len())
    }

    pub fn full_set(&self) -> PackageSet {
        PackageSet::full(self.generation, self.packages.len())
    }

    /// Packages not hidden by an exclude. The default base of every query.
    pub fn considered(&self) -> &PackageSet {
        &self.considered
    }

    pub fn installed(&self) -> &PackageSet {
        &self.installed
    }

    pub fn available(&self) -> PackageSet {
        self.installed.complement()
    }

    /// Ids of every package called `name`, ascending.
    pub fn by_name(&self, name: &str) -> &[PackageId] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Installed packages called `name`.
    pub fn installed_by_name(&self, name: &str) -> Vec<PackageId> {
        self.by_name(name)
            .iter()
            .copied()
            .filter(|&id| self[id].installed)
            .collect()
    }

    /// Every package with a provide overlapping `dep`, ascending.
    pub fn what_provides(&self, dep: &Reldep) -> Vec<PackageId> {
        self.by_provide
            .get(&dep.name)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|&id| self[id].provides_dep(dep))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether any package is named, or provides, `name`.
    pub fn knows(&self, name: &str) -> bool {
        self.by_name.contains_key(name) || self.by_provide.contains_key(name)
    }

    pub fn list_arches(&self) -> Vec<String> {
        self.packages
            .iter()
            .map(|p| p.arch.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Configured priority of a repository; unknown repositories get the
    /// default priority.
    pub fn repo_priority(&self, repo: &str) -> i32 {
        self.repo_priorities
            .get(repo)
            .copied()
            .unwrap_or(crate::repository::DEFAULT_PRIORITY)
    }

    /// Repository ids in identifier-assignment order.
    pub fn repos(&self) -> impl Iterator<Item = &str> {
        self.repo_priorities.keys().map(String::as_str)
    }

    pub fn reason(&self, id: PackageId) -> Reason {
        self.package(id).map(|p| p.reason).unwrap_or_default()
    }

    pub fn native_arch(&self) -> Option<&str> {
        self.native_arch.as_deref()
    }
}

impl Index<PackageId> for Universe {
    type Output = Package;

    fn index(&self, id: PackageId) -> &Package {
        &self.packages[id.index()]
    }
}

/// Collects repository metadata and builds a [`Universe`] in one step.
///
/// Identifiers are assigned to installed packages first, then to each
/// repository in priority order (ties keep insertion order), then record
/// order within a repository.
#[derive(Debug, Default)]
pub struct UniverseBuilder {
    repos: Vec<RepoMetadata>,
    excludes: Vec<Pattern>,
    arch: Option<String>,
}

impl UniverseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repo(mut self, repo: RepoMetadata) -> Self {
        self.repos.push(repo);
        self
    }

    pub fn add_repo(&mut self, repo: RepoMetadata) {
        self.repos.push(repo);
    }

    /// Hide available packages whose name matches `pattern` from queries.
    pub fn exclude(mut self, pattern: &str) -> Self {
        self.excludes.push(compile_glob(pattern));
        self
    }

    pub fn arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = Some(arch.into());
        self
    }

    /// Build the universe. Any malformed record fails the whole build.
    pub fn build(self) -> Result<Universe> {
        let mut repos = self.repos;
        repos.sort_by_key(|r| (!r.system, r.priority));

        let mut packages = Vec::new();
        let mut repo_priorities = IndexMap::new();
        for repo in &repos {
            repo_priorities.insert(repo.id.clone(), repo.priority);
            for (index, record) in repo.records.iter().enumerate() {
                let id = PackageId(packages.len() as u32);
                packages.push(parse_record(id, repo, index, record)?);
            }
        }

        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        let len = packages.len();

        let mut by_name: HashMap<String, Vec<PackageId>> = HashMap::new();
        let mut by_provide: HashMap<String, Vec<PackageId>> = HashMap::new();
        let mut installed = PackageSet::empty(generation, len);
        let mut considered = PackageSet::full(generation, len);

        for pkg in &packages {
            by_name.entry(pkg.name.clone()).or_default().push(pkg.id);
            for provide in &pkg.provides {
                let ids = by_provide.entry(provide.name.clone()).or_default();
                if ids.last() != Some(&pkg.id) {
                    ids.push(pkg.id);
                }
            }
            if pkg.installed {
                installed.insert(pkg.id);
            } else if self.excludes.iter().any(|p| p.matches(&pkg.name)) {
                considered.remove(pkg.id);
            }
        }

        Ok(Universe {
            generation,
            packages,
            by_name,
            by_provide,
            repo_priorities,
            installed,
            considered,
            native_arch: self.arch,
        })
    }
}

/// Compile a glob, matching the text literally if it is not a valid pattern.
pub(crate) fn compile_glob(pattern: &str) -> Pattern {
    Pattern::new(pattern).unwrap_or_else(|_| {
        Pattern::new(&Pattern::escape(pattern)).unwrap_or_default()
    })
}

fn parse_record(id: PackageId, repo: &RepoMetadata, index: usize, record: &RawRecord) -> Result<Package> {
    let field = |key: &str| -> Result<String> {
        match record.get(key).map(|v| v.trim()) {
            Some(v) if !v.is_empty() => Ok(v.to_string()),
            _ => Err(ResolveError::load(
                &repo.id,
                format!("record {} is missing required field \"{}\"", index, key),
            )),
        }
    };

    let name = field("name")?;
    let version = field("version")?;
    let release = field("release")?;
    let arch = field("arch")?;

    let epoch = match record.get("epoch").map(|e| e.trim()) {
        None | Some("") => 0,
        Some(e) => e.parse::<u32>().map_err(|_| {
            ResolveError::load(&repo.id, format!("{}: invalid epoch \"{}\"", name, e))
        })?,
    };

    let deps = |key: &str| -> Result<Vec<Reldep>> {
        let Some(list) = record.get(key) else {
            return Ok(Vec::new());
        };
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                Reldep::parse(s).map_err(|e| {
                    ResolveError::load(&repo.id, format!("{}: bad {} entry: {}", name, key, e))
                })
            })
            .collect()
    };

    let reason = match record.get("reason") {
        None => Reason::Unknown,
        Some(r) => Reason::from_str(r).ok_or_else(|| {
            ResolveError::load(&repo.id, format!("{}: unknown reason \"{}\"", name, r))
        })?,
    };

    let evr = Evr::new(epoch, version, release);
    let mut provides = vec![Reldep::versioned(
        name.clone(),
        rpmsolve_evr::Comparison::Eq,
        evr.clone(),
    )];
    provides.extend(deps("provides")?);
    let requires = deps("requires")?;
    let conflicts = deps("conflicts")?;
    let obsoletes = deps("obsoletes")?;

    Ok(Package {
        id,
        name,
        evr,
        arch,
        repo: repo.id.clone(),
        installed: repo.system,
        provides,
        requires,
        conflicts,
        obsoletes,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{record, SYSTEM_REPO};

    fn repo(id: &str, priority: i32, records: Vec<RawRecord>) -> RepoMetadata {
        RepoMetadata {
            id: id.to_string(),
            priority,
            system: id == SYSTEM_REPO,
            records,
        }
    }

    fn pkg(name: &str, version: &str) -> RawRecord {
        record([("name", name), ("version", version), ("release", "1"), ("arch", "x86_64")])
    }

    #[test]
    fn test_ids_installed_first_then_priority() {
        let universe = Universe::builder()
            .repo(repo("updates", 50, vec![pkg("bash", "5.2")]))
            .repo(repo("fedora", 99, vec![pkg("bash", "5.1")]))
            .repo(repo(SYSTEM_REPO, 99, vec![pkg("bash", "5.0")]))
            .repo(repo("extras", 50, vec![pkg("zsh", "5.9")]))
            .build()
            .unwrap();

        let order: Vec<_> = universe.packages().map(|p| p.nevra()).collect();
        assert_eq!(
            order,
            vec![
                "bash-5.0-1.x86_64",
                "bash-5.2-1.x86_64",
                "zsh-5.9-1.x86_64",
                "bash-5.1-1.x86_64"
            ]
        );
        assert!(universe[PackageId(0)].installed);
        assert_eq!(universe.installed().to_vec(), vec![PackageId(0)]);
        assert_eq!(universe.repo_priority("updates"), 50);
    }

    #[test]
    fn test_generations_differ_ids_do_not() {
        let build = || {
            Universe::builder()
                .repo(repo("fedora", 99, vec![pkg("a", "1"), pkg("b", "1")]))
                .build()
                .unwrap()
        };
        let u1 = build();
        let u2 = build();
        assert_ne!(u1.generation(), u2.generation());
        assert_eq!(u1.by_name("b"), u2.by_name("b"));
    }

    #[test]
    fn test_missing_field_fails_whole_load() {
        let broken = record([("name", "bash"), ("version", "5.1"), ("arch", "x86_64")]);
        let err = Universe::builder()
            .repo(repo("fedora", 99, vec![pkg("zsh", "5.9"), broken]))
            .build()
            .unwrap_err();
        match err {
            ResolveError::Load { repo, message } => {
                assert_eq!(repo, "fedora");
                assert!(message.contains("release"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_bad_dependency_is_load_error() {
        let mut r = pkg("bash", "5.1");
        r.insert("requires".to_string(), "glibc !! 2".to_string());
        let err = Universe::builder()
            .repo(repo("fedora", 99, vec![r]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ResolveError::Load { .. }));
    }

    #[test]
    fn test_truncated_dependency_is_load_error() {
        let mut r = pkg("bash", "5.1");
        r.insert("requires".to_string(), "glibc >=".to_string());
        let err = Universe::builder()
            .repo(repo("fedora", 99, vec![r]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ResolveError::Load { .. }));
    }

    #[test]
    fn test_what_provides() {
        let mut z = pkg("zlib", "1.2.13");
        z.insert("provides".to_string(), "libz.so.1()(64bit)".to_string());
        let universe = Universe::builder()
            .repo(repo("fedora", 99, vec![z, pkg("bash", "5.1")]))
            .build()
            .unwrap();

        let dep = Reldep::parse("libz.so.1()(64bit)").unwrap();
        assert_eq!(universe.what_provides(&dep), vec![PackageId(0)]);
        assert_eq!(
            universe.what_provides(&Reldep::parse("zlib >= 1.2").unwrap()),
            vec![PackageId(0)]
        );
        assert!(universe.what_provides(&Reldep::parse("zlib > 2").unwrap()).is_empty());
        assert!(universe.knows("libz.so.1()(64bit)"));
        assert!(!universe.knows("zlib-devel"));
    }

    #[test]
    fn test_exclude_hides_available_only() {
        let universe = Universe::builder()
            .repo(repo(SYSTEM_REPO, 99, vec![pkg("kernel", "6.1")]))
            .repo(repo("fedora", 99, vec![pkg("kernel", "6.2"), pkg("bash", "5.1")]))
            .exclude("kern*")
            .build()
            .unwrap();

        assert!(universe.considered().contains(PackageId(0)));
        assert!(!universe.considered().contains(PackageId(1)));
        assert!(universe.considered().contains(PackageId(2)));
    }

    #[test]
    fn test_reason_and_arches() {
        let mut installed = pkg("bash", "5.0");
        installed.insert("reason".to_string(), "user".to_string());
        let mut noarch = pkg("tzdata", "2024a");
        noarch.insert("arch".to_string(), "noarch".to_string());

        let universe = Universe::builder()
            .repo(repo(SYSTEM_REPO, 99, vec![installed]))
            .repo(repo("fedora", 99, vec![noarch]))
            .build()
            .unwrap();

        assert_eq!(universe.reason(PackageId(0)), Reason::User);
        assert_eq!(universe.list_arches(), vec!["noarch", "x86_64"]);
    }
}
