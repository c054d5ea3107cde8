//! Dependency expressions such as `libc.so.6`, `bash >= 5.0` or `foo = 1:2.0-3`

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{EvrError, Result};
use crate::evr::Evr;

lazy_static! {
    static ref RELDEP_RE: Regex =
        Regex::new(r"^\s*([^\s<>=!]+)\s*(?:([<>=!~^]+)\s*([^\s<>=!~^]\S*))?\s*$").unwrap();
}

/// Relational operator of a versioned dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    /// Equal (=)
    Eq,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,
}

impl Comparison {
    /// Parse an operator; `==` is accepted as a synonym for `=`.
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "=" | "==" => Ok(Comparison::Eq),
            "<" => Ok(Comparison::Lt),
            "<=" | "=<" => Ok(Comparison::Le),
            ">" => Ok(Comparison::Gt),
            ">=" | "=>" => Ok(Comparison::Ge),
            _ => Err(EvrError::InvalidComparator(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }

    fn has_less(self) -> bool {
        matches!(self, Comparison::Lt | Comparison::Le)
    }

    fn has_greater(self) -> bool {
        matches!(self, Comparison::Gt | Comparison::Ge)
    }

    fn has_equal(self) -> bool {
        matches!(self, Comparison::Eq | Comparison::Le | Comparison::Ge)
    }

    /// Whether an EVR that compares as `ord` against the bound satisfies it.
    pub fn accepts(self, ord: Ordering) -> bool {
        match ord {
            Ordering::Less => self.has_less(),
            Ordering::Equal => self.has_equal(),
            Ordering::Greater => self.has_greater(),
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A capability name with an optional version constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reldep {
    pub name: String,
    pub constraint: Option<(Comparison, Evr)>,
}

impl Reldep {
    /// An unversioned dependency on `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: None,
        }
    }

    pub fn versioned(name: impl Into<String>, cmp: Comparison, evr: Evr) -> Self {
        Self {
            name: name.into(),
            constraint: Some((cmp, evr)),
        }
    }

    /// Parse `name [op evr]`.
    pub fn parse(expression: &str) -> Result<Self> {
        if expression.trim().is_empty() {
            return Err(EvrError::EmptyName(expression.to_string()));
        }

        let caps = RELDEP_RE
            .captures(expression)
            .ok_or_else(|| EvrError::InvalidReldep {
                expression: expression.to_string(),
                reason: "expected \"name [op version]\"".to_string(),
            })?;

        let name = caps[1].to_string();
        let constraint = match (caps.get(2), caps.get(3)) {
            (Some(op), Some(evr)) => {
                let cmp = Comparison::from_str(op.as_str())?;
                Some((cmp, Evr::parse(evr.as_str())?))
            }
            _ => None,
        };

        Ok(Self { name, constraint })
    }

    pub fn is_versioned(&self) -> bool {
        self.constraint.is_some()
    }

    /// Whether `evr` falls inside this dependency's range.
    pub fn matches_evr(&self, evr: &Evr) -> bool {
        match &self.constraint {
            None => true,
            Some((cmp, bound)) => cmp.accepts(evr.compare_for_match(bound)),
        }
    }

    /// Whether the two dependency ranges overlap, i.e. `other` (typically a
    /// provide) can satisfy `self` (typically a requirement).
    ///
    /// Names must be equal. An unversioned side overlaps anything.
    pub fn overlaps(&self, other: &Reldep) -> bool {
        if self.name != other.name {
            return false;
        }

        let ((a_cmp, a_evr), (b_cmp, b_evr)) = match (&self.constraint, &other.constraint) {
            (Some(a), Some(b)) => (a, b),
            _ => return true,
        };

        match a_evr.compare_for_match(b_evr) {
            Ordering::Less => a_cmp.has_greater() || b_cmp.has_less(),
            Ordering::Greater => a_cmp.has_less() || b_cmp.has_greater(),
            Ordering::Equal => {
                (a_cmp.has_equal() && b_cmp.has_equal())
                    || (a_cmp.has_less() && b_cmp.has_less())
                    || (a_cmp.has_greater() && b_cmp.has_greater())
            }
        }
    }
}

impl FromStr for Reldep {
    type Err = EvrError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Reldep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            Some((cmp, evr)) => write!(f, "{} {} {}", self.name, cmp, evr),
            None => write!(f, "{}", self.name),
        }
    }
}
