use crate::demands::CacheOnly;
use crate::error::Result;

use super::{RawRecord, RepoSource, DEFAULT_PRIORITY, SYSTEM_REPO};

/// Records held in memory.
#[derive(Debug, Clone)]
pub struct MemoryRepo {
    id: String,
    priority: i32,
    records: Vec<RawRecord>,
}

impl MemoryRepo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            priority: DEFAULT_PRIORITY,
            records: Vec::new(),
        }
    }

    /// The installed-system source.
    pub fn system() -> Self {
        Self::new(SYSTEM_REPO)
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_record(mut self, record: RawRecord) -> Self {
        self.records.push(record);
        self
    }

    pub fn add_record(&mut self, record: RawRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RepoSource for MemoryRepo {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn load(&self, _cache_only: CacheOnly) -> Result<Vec<RawRecord>> {
        Ok(self.records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::record;

    #[test]
    fn test_memory_repo() {
        let repo = MemoryRepo::new("updates")
            .with_priority(10)
            .with_record(record([("name", "bash"), ("version", "5.1")]));

        assert_eq!(repo.id(), "updates");
        assert_eq!(repo.priority(), 10);
        assert!(!repo.is_system());
        assert_eq!(repo.load(CacheOnly::Disabled).unwrap().len(), 1);
    }

    #[test]
    fn test_system_repo() {
        let repo = MemoryRepo::system();
        assert!(repo.is_system());
        assert_eq!(repo.priority(), DEFAULT_PRIORITY);
        assert!(repo.is_empty());
    }
}
