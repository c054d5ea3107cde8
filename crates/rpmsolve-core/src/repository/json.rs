use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::demands::CacheOnly;
use crate::error::{ResolveError, Result};

use super::{RawRecord, RepoSource, DEFAULT_PRIORITY, SYSTEM_REPO};

/// Records read from a JSON file holding an array of objects.
///
/// String values are taken as-is, numbers are stringified and arrays of
/// strings are joined with `, ` so dependency lists may be written either
/// way.
#[derive(Debug, Clone)]
pub struct JsonRepo {
    id: String,
    priority: i32,
    path: PathBuf,
}

impl JsonRepo {
    pub fn new(id: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            id: id.into(),
            priority: DEFAULT_PRIORITY,
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The installed-system source read from `path`.
    pub fn system(path: impl AsRef<Path>) -> Self {
        Self::new(SYSTEM_REPO, path)
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(&self, contents: &str) -> Result<Vec<RawRecord>> {
        let value: Value = serde_json::from_str(contents)
            .map_err(|e| ResolveError::load(&self.id, format!("{}: {}", self.path.display(), e)))?;

        let entries = value.as_array().ok_or_else(|| {
            ResolveError::load(&self.id, format!("{}: expected a JSON array", self.path.display()))
        })?;

        entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let obj = entry.as_object().ok_or_else(|| {
                    ResolveError::load(&self.id, format!("record {} is not an object", i))
                })?;
                let mut record = RawRecord::new();
                for (key, value) in obj {
                    record.insert(key.clone(), field_value(&self.id, i, key, value)?);
                }
                Ok(record)
            })
            .collect()
    }
}

fn field_value(repo: &str, index: usize, key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Array(items) => {
            let parts: Option<Vec<&str>> = items.iter().map(|v| v.as_str()).collect();
            parts.map(|p| p.join(", ")).ok_or_else(|| {
                ResolveError::load(repo, format!("record {}: field {} must hold strings", index, key))
            })
        }
        _ => Err(ResolveError::load(
            repo,
            format!("record {}: unsupported value for field {}", index, key),
        )),
    }
}

impl RepoSource for JsonRepo {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn load(&self, cache_only: CacheOnly) -> Result<Vec<RawRecord>> {
        if !self.path.exists() && cache_only == CacheOnly::All {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path)
            .map_err(|e| ResolveError::load(&self.id, format!("{}: {}", self.path.display(), e)))?;
        self.parse(&contents)
    }
}
