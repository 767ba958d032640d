//! `started.json` / `finished.json` decoding.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{UpdateError, UpdateResult};

/// The build's start marker. Required; a build without one is skipped.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Started {
    /// Epoch seconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, rename = "repo-version")]
    pub repo_version: String,
    #[serde(default)]
    pub node: String,
    #[serde(default)]
    pub pull: String,
    /// Repo to branch-or-pull.
    #[serde(default)]
    pub repos: BTreeMap<String, String>,
}

impl Started {
    pub fn from_slice(buf: &[u8], path: &str) -> UpdateResult<Self> {
        serde_json::from_slice(buf).map_err(|e| UpdateError::CorruptMetadata {
            path: path.to_string(),
            detail: e.to_string(),
        })
    }
}

/// The build's completion marker. Absent while the build runs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Finished {
    /// Epoch seconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub passed: bool,
    #[serde(default, rename = "job-version")]
    pub job_version: String,
    /// Free-form; leaf values may be any JSON type.
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
    /// Sentinel: `finished.json` does not exist yet.
    #[serde(skip)]
    pub running: bool,
}

impl Finished {
    pub fn from_slice(buf: &[u8], path: &str) -> UpdateResult<Self> {
        serde_json::from_slice(buf).map_err(|e| UpdateError::CorruptMetadata {
            path: path.to_string(),
            detail: e.to_string(),
        })
    }

    /// The sentinel for a build that has not finished.
    pub fn still_running() -> Self {
        Self {
            running: true,
            ..Self::default()
        }
    }

    /// Project top-level string values into column metadata.
    pub fn column_metadata(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for (key, value) in &self.metadata {
            if let Value::String(s) = value {
                out.insert(key.clone(), s.clone());
            }
            // TODO: flatten nested metadata objects once the viewer can
            // render them.
        }
        out
    }
}
