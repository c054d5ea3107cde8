//! RPM-style version algebra.
//!
//! This crate provides the comparison and parsing primitives the resolver
//! core is built on: `rpmvercmp` segment comparison, epoch:version-release
//! values, NEVRA pattern forms and dependency expressions ("reldeps") with
//! rpm range-overlap matching.

mod error;
mod evr;
mod nevra;
mod reldep;
mod vercmp;

pub use error::{EvrError, Result};
pub use evr::Evr;
pub use nevra::{Nevra, NevraForm};
pub use reldep::{Comparison, Reldep};
pub use vercmp::rpmvercmp;
