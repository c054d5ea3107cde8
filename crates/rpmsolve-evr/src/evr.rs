use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::{EvrError, Result};
use crate::vercmp::{hash_version, rpmvercmp};

/// An `epoch:version-release` triple.
///
/// Ordering is total: epoch first, then version and release with
/// [`rpmvercmp`]. A missing release sorts below any present release.
/// Equality follows the same order, so `1.0` equals `1.00`.
#[derive(Debug, Clone, Default)]
pub struct Evr {
    pub epoch: u32,
    pub version: String,
    pub release: String,
}

impl Evr {
    pub fn new(epoch: u32, version: impl Into<String>, release: impl Into<String>) -> Self {
        Self {
            epoch,
            version: version.into(),
            release: release.into(),
        }
    }

    /// Parse `[epoch:]version[-release]`.
    ///
    /// The release is everything after the last `-`; an empty epoch
    /// (`":1.0"`) counts as epoch 0.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (epoch, rest) = match s.split_once(':') {
            Some((e, rest)) => {
                let epoch = if e.is_empty() {
                    0
                } else {
                    e.parse::<u32>()
                        .map_err(|_| EvrError::InvalidEpoch(s.to_string()))?
                };
                (epoch, rest)
            }
            None => (0, s),
        };

        let (version, release) = match rest.rsplit_once('-') {
            Some((v, r)) => (v, r),
            None => (rest, ""),
        };

        if version.is_empty() {
            return Err(EvrError::EmptyVersion(s.to_string()));
        }

        Ok(Self::new(epoch, version, release))
    }

    pub fn has_release(&self) -> bool {
        !self.release.is_empty()
    }

    /// Comparison used for dependency matching: the release only takes part
    /// when both sides carry one, so `foo >= 1.0` is satisfied by `1.0-3`.
    pub fn compare_for_match(&self, other: &Evr) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| {
                if self.has_release() && other.has_release() {
                    rpmvercmp(&self.release, &other.release)
                } else {
                    Ordering::Equal
                }
            })
    }
}

impl Ord for Evr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| match (self.has_release(), other.has_release()) {
                (true, true) => rpmvercmp(&self.release, &other.release),
                (false, true) => Ordering::Less,
                (true, false) => Ordering::Greater,
                (false, false) => Ordering::Equal,
            })
    }
}

impl PartialEq for Evr {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Evr {}

impl Hash for Evr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        hash_version(&self.version, state);
        self.has_release().hash(state);
        hash_version(&self.release, state);
    }
}

impl PartialOrd for Evr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Evr {
    type Err = EvrError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if self.has_release() {
            write!(f, "-{}", self.release)?;
        }
        Ok(())
    }
}
