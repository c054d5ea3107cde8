//! Sources of raw package records.
//!
//! A source only yields string maps; turning them into packages (and
//! rejecting malformed ones) is the universe builder's job.

mod json;
mod memory;

use indexmap::IndexMap;

use crate::demands::CacheOnly;
use crate::error::Result;

pub use json::JsonRepo;
pub use memory::MemoryRepo;

/// Repository id of the installed system.
pub const SYSTEM_REPO: &str = "@System";

/// Default priority; lower numbers are preferred.
pub const DEFAULT_PRIORITY: i32 = 99;

/// One package record as field name -> value.
pub type RawRecord = IndexMap<String, String>;

/// Repository metadata source
pub trait RepoSource: Send + Sync {
    /// Unique repository id
    fn id(&self) -> &str;

    /// Priority, lower is preferred
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    /// Whether the records describe installed packages
    fn is_system(&self) -> bool {
        self.id() == SYSTEM_REPO
    }

    /// Produce every record of this repository
    fn load(&self, cache_only: CacheOnly) -> Result<Vec<RawRecord>>;
}

/// Build a record from `(field, value)` pairs.
pub fn record<'a>(fields: impl IntoIterator<Item = (&'a str, &'a str)>) -> RawRecord {
    fields
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Records fetched from one source, ready for the universe builder.
#[derive(Debug, Clone)]
pub struct RepoMetadata {
    pub id: String,
    pub priority: i32,
    pub system: bool,
    pub records: Vec<RawRecord>,
}

impl RepoMetadata {
    /// Load every record of `source`.
    pub fn fetch(source: &dyn RepoSource, cache_only: CacheOnly) -> Result<Self> {
        let records = source.load(cache_only)?;
        Ok(Self {
            id: source.id().to_string(),
            priority: source.priority(),
            system: source.is_system(),
            records,
        })
    }
}
