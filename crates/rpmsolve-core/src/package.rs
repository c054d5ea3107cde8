use std::fmt;

use serde::{Deserialize, Serialize};

use rpmsolve_evr::{Evr, Reldep};

/// Index of a package inside one loaded [`Universe`](crate::Universe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageId(pub u32);

impl PackageId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a package is (or will be) on the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reason {
    #[default]
    Unknown,
    Dependency,
    User,
    Clean,
    WeakDependency,
    Group,
}

impl Reason {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "unknown" => Some(Reason::Unknown),
            "dependency" | "dep" => Some(Reason::Dependency),
            "user" => Some(Reason::User),
            "clean" => Some(Reason::Clean),
            "weak-dependency" | "weak" => Some(Reason::WeakDependency),
            "group" => Some(Reason::Group),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Unknown => "unknown",
            Reason::Dependency => "dependency",
            Reason::User => "user",
            Reason::Clean => "clean",
            Reason::WeakDependency => "weak-dependency",
            Reason::Group => "group",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One package record, owned by the universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub id: PackageId,
    pub name: String,
    pub evr: Evr,
    pub arch: String,
    pub repo: String,
    pub installed: bool,
    pub provides: Vec<Reldep>,
    pub requires: Vec<Reldep>,
    pub conflicts: Vec<Reldep>,
    pub obsoletes: Vec<Reldep>,
    /// Recorded install reason; only meaningful for installed packages.
    pub reason: Reason,
}

impl Package {
    pub fn epoch(&self) -> u32 {
        self.evr.epoch
    }

    pub fn version(&self) -> &str {
        &self.evr.version
    }

    pub fn release(&self) -> &str {
        &self.evr.release
    }

    pub fn is_noarch(&self) -> bool {
        self.arch == "noarch"
    }

    /// Full `name-[epoch:]version-release.arch` string.
    pub fn nevra(&self) -> String {
        format!("{}-{}.{}", self.name, self.evr, self.arch)
    }

    /// Identity ignoring the repository; two builds with the same NEVRA are
    /// interchangeable for no-op detection.
    pub fn same_nevra(&self, other: &Package) -> bool {
        self.name == other.name && self.arch == other.arch && self.evr == other.evr
    }

    /// The implicit `name = epoch:version-release` self-provide.
    pub fn self_provide(&self) -> Reldep {
        Reldep::versioned(
            self.name.clone(),
            rpmsolve_evr::Comparison::Eq,
            self.evr.clone(),
        )
    }

    /// Whether any provide of this package satisfies `dep`.
    pub fn provides_dep(&self, dep: &Reldep) -> bool {
        self.provides.iter().any(|p| dep.overlaps(p))
    }

    /// Whether this package obsoletes `other`.
    pub fn obsoletes_pkg(&self, other: &Package) -> bool {
        self.obsoletes
            .iter()
            .any(|o| o.name == other.name && o.matches_evr(&other.evr))
    }

    /// Whether this package declares a conflict that `other` provides.
    pub fn conflicts_with(&self, other: &Package) -> bool {
        self.conflicts.iter().any(|c| other.provides_dep(c))
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.nevra())
    }
}
