//! Matching one package family from a user pattern.

use std::fmt;

use rpmsolve_evr::{Comparison, Evr, Nevra, Reldep};

use crate::error::{ResolveError, Result};
use crate::package_set::PackageSet;
use crate::query::{is_glob, Filter, NameMatch, Query};
use crate::universe::Universe;

/// Resolves to the packages one demand is about.
///
/// Built either from a textual pattern with [`Selector::parse`] or through
/// the `with_*` builder. An empty result means "no such package" and is not
/// an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    /// NEVRA-like pattern, split most-specific form first
    pattern: Option<String>,
    name: Option<NameMatch>,
    name_text: Option<String>,
    provides: Option<Reldep>,
    evr: Option<(Comparison, Evr)>,
    arch: Option<String>,
    repo: Option<String>,
    /// Provide tried when the name match comes back empty
    fallback: Option<Reldep>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `name`, `name.arch`, `name-[e:]v[-r][.arch]` or
    /// `name <op> [e:]v[-r]`.
    pub fn parse(pattern: &str) -> Result<Self> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(ResolveError::invalid_selector(pattern, "empty pattern"));
        }

        let has_operator = trimmed.contains(['<', '>', '=', '!']);
        if has_operator || trimmed.contains(char::is_whitespace) {
            let dep = Reldep::parse(trimmed)
                .map_err(|e| ResolveError::invalid_selector(pattern, e.to_string()))?;
            return Ok(Self {
                name: Some(NameMatch::from_pattern(&dep.name)),
                name_text: Some(dep.name.clone()),
                evr: dep.constraint.clone(),
                fallback: (!is_glob(&dep.name)).then(|| dep.clone()),
                ..Self::default()
            });
        }

        Ok(Self {
            pattern: Some(trimmed.to_string()),
            fallback: if is_glob(trimmed) {
                None
            } else {
                Some(Reldep::new(trimmed))
            },
            ..Self::default()
        })
    }

    pub fn with_name(mut self, name: &str) -> Result<Self> {
        self.check_name_slot(name)?;
        self.name = Some(NameMatch::Exact(name.to_string()));
        self.name_text = Some(name.to_string());
        Ok(self)
    }

    pub fn with_name_glob(mut self, pattern: &str) -> Result<Self> {
        self.check_name_slot(pattern)?;
        self.name = Some(NameMatch::from_pattern(pattern));
        self.name_text = Some(pattern.to_string());
        Ok(self)
    }

    pub fn with_provides(mut self, dep: Reldep) -> Result<Self> {
        if self.name.is_some() || self.pattern.is_some() {
            return Err(ResolveError::invalid_selector(
                dep.to_string(),
                "a selector matches either by name or by provides",
            ));
        }
        self.provides = Some(dep);
        Ok(self)
    }

    pub fn with_evr(mut self, cmp: Comparison, evr: Evr) -> Self {
        self.evr = Some((cmp, evr));
        self
    }

    pub fn with_arch(mut self, arch: &str) -> Self {
        self.arch = Some(arch.to_string());
        self
    }

    pub fn with_repo(mut self, repo: &str) -> Self {
        self.repo = Some(repo.to_string());
        self
    }

    fn check_name_slot(&self, what: &str) -> Result<()> {
        if self.provides.is_some() {
            return Err(ResolveError::invalid_selector(
                what,
                "a selector matches either by name or by provides",
            ));
        }
        if self.pattern.is_some() {
            return Err(ResolveError::invalid_selector(what, "selector already has a pattern"));
        }
        Ok(())
    }

    /// Whether anything can be matched at all.
    pub fn is_set(&self) -> bool {
        self.pattern.is_some() || self.name.is_some() || self.provides.is_some()
    }

    /// Name part of the selector, for diagnostics.
    pub fn name_hint(&self) -> Option<&str> {
        self.pattern
            .as_deref()
            .or(self.name_text.as_deref())
            .or(self.provides.as_ref().map(|p| p.name.as_str()))
    }

    /// Resolve against `universe`.
    pub fn resolve(&self, universe: &Universe) -> PackageSet {
        self.query(universe).into_set()
    }

    /// The query this selector resolves to.
    pub fn query<'u>(&self, universe: &'u Universe) -> Query<'u> {
        let mut base = Query::new(universe);
        if let Some(ref arch) = self.arch {
            base = base.arch(&[arch.as_str()]);
        }
        if let Some(ref repo) = self.repo {
            base = base.repo(&[repo.as_str()]);
        }
        if let Some((cmp, ref evr)) = self.evr {
            base = base.evr(cmp, evr.clone());
        }

        if let Some(ref pattern) = self.pattern {
            for (_, nevra) in Nevra::possibilities(pattern) {
                let q = base.clone().filter(Filter::NevraParts(nevra));
                if !q.is_empty() {
                    return q;
                }
            }
        } else if let Some(ref name) = self.name {
            let q = base.clone().filter(Filter::Name(name.clone()));
            if !q.is_empty() {
                return q;
            }
        } else if let Some(ref dep) = self.provides {
            return base.provides(dep.clone());
        } else {
            return base.nothing();
        }

        match self.fallback {
            Some(ref dep) => base.provides(dep.clone()),
            None => base.nothing(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.name_hint(), &self.evr) {
            (Some(name), Some((cmp, evr))) => write!(f, "{} {} {}", name, cmp, evr)?,
            (Some(name), None) => write!(f, "{}", name)?,
            (None, _) => write!(f, "<empty selector>")?,
        }
        if let Some(ref arch) = self.arch {
            write!(f, " (arch {})", arch)?;
        }
        if let Some(ref repo) = self.repo {
            write!(f, " (repo {})", repo)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageId;
    use crate::repository::{record, RawRecord, RepoMetadata, SYSTEM_REPO};

    fn pkg(name: &str, version: &str, release: &str, arch: &str) -> RawRecord {
        record([("name", name), ("version", version), ("release", release), ("arch", arch)])
    }

    fn universe() -> Universe {
        let mut zlib = pkg("zlib", "1.2.13", "3.fc39", "x86_64");
        zlib.insert("provides".to_string(), "libz.so.1".to_string());
        let mut fof = pkg("four-of-fish", "3.6.9", "11.fc100", "x86_64");
        fof.insert("epoch".to_string(), "8".to_string());

        Universe::builder()
            .repo(RepoMetadata {
                id: SYSTEM_REPO.to_string(),
                priority: 99,
                system: true,
                records: vec![zlib],
            })
            .repo(RepoMetadata {
                id: "fedora".to_string(),
                priority: 99,
                system: false,
                records: vec![
                    fof,
                    pkg("four-of-fish-3.6.9", "1.0", "1", "i686"),
                    pkg("bash", "5.1", "1", "x86_64"),
                    pkg("bash", "5.0", "1", "x86_64"),
                ],
            })
            .build()
            .unwrap()
    }

    fn ids(set: &PackageSet) -> Vec<u32> {
        set.iter().map(|id| id.0).collect()
    }

    #[test]
    fn test_name_form() {
        let u = universe();
        assert_eq!(ids(&Selector::parse("bash").unwrap().resolve(&u)), vec![3, 4]);
    }

    #[test]
    fn test_full_nevra_form() {
        let u = universe();
        let sel = Selector::parse("four-of-fish-8:3.6.9-11.fc100.x86_64").unwrap();
        assert_eq!(ids(&sel.resolve(&u)), vec![1]);
    }

    #[test]
    fn test_most_specific_split_wins() {
        let u = universe();
        let sel = Selector::parse("four-of-fish-3.6.9").unwrap();
        // NEV split (four-of-fish, 3.6.9) matches before the NAME form would
        assert_eq!(ids(&sel.resolve(&u)), vec![1]);

        let sel = Selector::parse("four-of-fish-3.6.9.i686").unwrap();
        assert_eq!(ids(&sel.resolve(&u)), vec![2]);
    }

    #[test]
    fn test_comparator_pattern() {
        let u = universe();
        let sel = Selector::parse("bash > 5.0").unwrap();
        assert_eq!(ids(&sel.resolve(&u)), vec![3]);
        assert_eq!(sel.to_string(), "bash > 5.0");
    }

    #[test]
    fn test_invalid_comparator() {
        assert!(matches!(
            Selector::parse("bash => => 5"),
            Err(ResolveError::InvalidSelector { .. })
        ));
        assert!(matches!(
            Selector::parse("bash !~ 5"),
            Err(ResolveError::InvalidSelector { .. })
        ));
        assert!(matches!(
            Selector::parse("   "),
            Err(ResolveError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn test_comparator_without_version() {
        for pattern in ["bash >=", "bash <", "bash = "] {
            match Selector::parse(pattern) {
                Err(ResolveError::InvalidSelector { pattern: p, .. }) => assert_eq!(p, pattern),
                other => panic!("{:?} parsed as {:?}", pattern, other),
            }
        }
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        let u = universe();
        let sel = Selector::parse("zlib-devel").unwrap();
        assert!(sel.resolve(&u).is_empty());
        assert_eq!(sel.name_hint(), Some("zlib-devel"));
    }

    #[test]
    fn test_provides_fallback() {
        let u = universe();
        assert_eq!(ids(&Selector::parse("libz.so.1").unwrap().resolve(&u)), vec![0]);
    }

    #[test]
    fn test_builder() {
        let u = universe();
        let sel = Selector::new()
            .with_name("bash")
            .unwrap()
            .with_evr(Comparison::Lt, Evr::parse("5.1").unwrap())
            .with_repo("fedora");
        assert_eq!(sel.resolve(&u).to_vec(), vec![PackageId(4)]);

        let sel = Selector::new()
            .with_provides(Reldep::parse("libz.so.1").unwrap())
            .unwrap();
        assert_eq!(ids(&sel.resolve(&u)), vec![0]);

        let glob = Selector::new().with_name_glob("four-*").unwrap().with_arch("i686");
        assert_eq!(ids(&glob.resolve(&u)), vec![2]);
    }

    #[test]
    fn test_name_and_provides_are_exclusive() {
        let err = Selector::new()
            .with_name("bash")
            .unwrap()
            .with_provides(Reldep::new("sh"));
        assert!(matches!(err, Err(ResolveError::InvalidSelector { .. })));

        let err = Selector::new()
            .with_provides(Reldep::new("sh"))
            .unwrap()
            .with_name("bash");
        assert!(matches!(err, Err(ResolveError::InvalidSelector { .. })));
    }

    #[test]
    fn test_empty_selector_matches_nothing() {
        let u = universe();
        assert!(!Selector::new().is_set());
        assert!(Selector::new().resolve(&u).is_empty());
    }
}
