use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use crate::evr::Evr;

lazy_static! {
    static ref NEVRA_RE: Regex =
        Regex::new(r"^([^:]+)-(?:([0-9]+):)?([^-:]+)-(.+)\.([^.]+)$").unwrap();
    static ref NEVR_RE: Regex = Regex::new(r"^([^:]+)-(?:([0-9]+):)?([^-:]+)-(.+)$").unwrap();
    static ref NEV_RE: Regex = Regex::new(r"^([^:]+)-(?:([0-9]+):)?([^-:]+)$").unwrap();
    static ref NA_RE: Regex = Regex::new(r"^([^:]+)\.([^.]+)$").unwrap();
    static ref NAME_RE: Regex = Regex::new(r"^([^:]+)$").unwrap();
}

/// The ways a user-supplied package pattern can be split into NEVRA parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NevraForm {
    /// `name-[epoch:]version-release.arch`
    Nevra,
    /// `name-[epoch:]version-release`
    Nevr,
    /// `name-[epoch:]version`
    Nev,
    /// `name.arch`
    Na,
    /// `name`
    Name,
}

impl NevraForm {
    /// Forms ordered from most to least specific.
    pub const MOST_SPECIFIC: [NevraForm; 5] = [
        NevraForm::Nevra,
        NevraForm::Nevr,
        NevraForm::Nev,
        NevraForm::Na,
        NevraForm::Name,
    ];

    fn regex(self) -> &'static Regex {
        match self {
            NevraForm::Nevra => &NEVRA_RE,
            NevraForm::Nevr => &NEVR_RE,
            NevraForm::Nev => &NEV_RE,
            NevraForm::Na => &NA_RE,
            NevraForm::Name => &NAME_RE,
        }
    }
}

/// A possibly partial package identity. Absent parts match anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Nevra {
    pub name: String,
    pub epoch: Option<u32>,
    pub version: Option<String>,
    pub release: Option<String>,
    pub arch: Option<String>,
}

impl Nevra {
    /// Split `pattern` according to `form`, or `None` if it does not fit.
    pub fn parse_form(pattern: &str, form: NevraForm) -> Option<Nevra> {
        let caps = form.regex().captures(pattern)?;
        let text = |i: usize| caps.get(i).map(|m| m.as_str().to_string());

        let nevra = match form {
            NevraForm::Nevra | NevraForm::Nevr | NevraForm::Nev => Nevra {
                name: text(1)?,
                epoch: match caps.get(2) {
                    Some(m) => Some(m.as_str().parse().ok()?),
                    None => None,
                },
                version: text(3),
                release: if form == NevraForm::Nev { None } else { text(4) },
                arch: if form == NevraForm::Nevra { text(5) } else { None },
            },
            NevraForm::Na => Nevra {
                name: text(1)?,
                arch: text(2),
                ..Default::default()
            },
            NevraForm::Name => Nevra {
                name: text(1)?,
                ..Default::default()
            },
        };
        Some(nevra)
    }

    /// Every form `pattern` fits, most specific first.
    pub fn possibilities(pattern: &str) -> Vec<(NevraForm, Nevra)> {
        NevraForm::MOST_SPECIFIC
            .iter()
            .filter_map(|&form| Nevra::parse_form(pattern, form).map(|n| (form, n)))
            .collect()
    }

    /// The EVR described by this pattern, when it names a version.
    pub fn evr(&self) -> Option<Evr> {
        self.version.as_ref().map(|v| {
            Evr::new(
                self.epoch.unwrap_or(0),
                v.clone(),
                self.release.clone().unwrap_or_default(),
            )
        })
    }
}

impl fmt::Display for Nevra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(ref version) = self.version {
            write!(f, "-")?;
            if let Some(epoch) = self.epoch {
                write!(f, "{}:", epoch)?;
            }
            write!(f, "{}", version)?;
        }
        if let Some(ref release) = self.release {
            write!(f, "-{}", release)?;
        }
        if let Some(ref arch) = self.arch {
            write!(f, ".{}", arch)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOF: &str = "four-of-fish-8:3.6.9-11.fc100.x86_64";

    #[test]
    fn test_nevra_form() {
        let n = Nevra::parse_form(FOF, NevraForm::Nevra).unwrap();
        assert_eq!(n.name, "four-of-fish");
        assert_eq!(n.epoch, Some(8));
        assert_eq!(n.version.as_deref(), Some("3.6.9"));
        assert_eq!(n.release.as_deref(), Some("11.fc100"));
        assert_eq!(n.arch.as_deref(), Some("x86_64"));
    }

    #[test]
    fn test_nevra_form_without_epoch() {
        let n = Nevra::parse_form("four-of-fish-3.6.9-11.fc100.x86_64", NevraForm::Nevra).unwrap();
        assert_eq!(n.name, "four-of-fish");
        assert_eq!(n.epoch, None);
        assert_eq!(n.release.as_deref(), Some("11.fc100"));
    }

    #[test]
    fn test_nevr_form_keeps_arch_in_release() {
        let n = Nevra::parse_form(FOF, NevraForm::Nevr).unwrap();
        assert_eq!(n.release.as_deref(), Some("11.fc100.x86_64"));
        assert_eq!(n.arch, None);

        assert!(Nevra::parse_form("four-of", NevraForm::Nevr).is_none());
    }

    #[test]
    fn test_nev_form() {
        let n = Nevra::parse_form("four-of-fish-8:3.6.9", NevraForm::Nev).unwrap();
        assert_eq!(n.name, "four-of-fish");
        assert_eq!(n.epoch, Some(8));
        assert_eq!(n.version.as_deref(), Some("3.6.9"));
        assert_eq!(n.release, None);
    }

    #[test]
    fn test_na_form() {
        let n = Nevra::parse_form("four-of-fish-3.6.9.i686", NevraForm::Na).unwrap();
        assert_eq!(n.name, "four-of-fish-3.6.9");
        assert_eq!(n.arch.as_deref(), Some("i686"));
        assert_eq!(n.version, None);
    }

    #[test]
    fn test_possibilities_order() {
        let forms: Vec<_> = Nevra::possibilities("zlib-devel")
            .into_iter()
            .map(|(f, _)| f)
            .collect();
        assert_eq!(forms, vec![NevraForm::Nev, NevraForm::Name]);
    }

    #[test]
    fn test_evr_and_display() {
        let n = Nevra::parse_form(FOF, NevraForm::Nevra).unwrap();
        assert_eq!(n.evr().unwrap().to_string(), "8:3.6.9-11.fc100");
        assert_eq!(n.to_string(), FOF);
    }
}
