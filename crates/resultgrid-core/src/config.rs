//! Test-group configuration.
//!
//! The configuration document is JSON at the path given on the command
//! line, one entry per test group. Alert thresholds are carried but
//! never interpreted here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{UpdateError, UpdateResult};
use crate::model::TESTS_NAME_KEY;

/// The whole configuration document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default)]
    pub test_groups: Vec<TestGroup>,
}

impl Configuration {
    pub fn from_json(buf: &[u8]) -> UpdateResult<Self> {
        serde_json::from_slice(buf).map_err(|e| UpdateError::Config {
            message: format!("could not parse configuration: {e}"),
        })
    }

    /// Look up a group by name.
    pub fn group(&self, name: &str) -> Option<&TestGroup> {
        self.test_groups.iter().find(|g| g.name == name)
    }
}

/// One named sequence of builds under a common object prefix.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestGroup {
    pub name: String,
    /// Object prefix the group's builds live under (`gs://…`).
    pub gcs_prefix: String,
    #[serde(default)]
    pub test_name_config: Option<TestNameConfig>,
    #[serde(default)]
    pub column_header: Vec<ColumnHeader>,
    #[serde(default)]
    pub alert_stale_results_hours: u32,
    #[serde(default)]
    pub num_failures_to_alert: u32,
    #[serde(default)]
    pub num_passes_to_disable_alert: u32,
}

impl TestGroup {
    /// The configured header values, in display order.
    pub fn headers(&self) -> Vec<String> {
        self.column_header
            .iter()
            .map(|h| h.configuration_value.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnHeader {
    pub configuration_value: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestNameConfig {
    pub name_format: String,
    #[serde(default)]
    pub name_elements: Vec<NameElement>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NameElement {
    pub target_config: String,
}

/// Compiled display-name template: a format string with `%s` slots and
/// the metadata keys that fill them.
#[derive(Debug, Clone)]
pub struct NameConfig {
    format: String,
    parts: Vec<String>,
}

impl NameConfig {
    /// Build from a group's optional template; the default renders the
    /// canonical test name verbatim.
    pub fn from_group(tnc: Option<&TestNameConfig>) -> Self {
        match tnc {
            None => Self {
                format: "%s".to_string(),
                parts: vec![TESTS_NAME_KEY.to_string()],
            },
            Some(tnc) => Self {
                format: tnc.name_format.clone(),
                parts: tnc
                    .name_elements
                    .iter()
                    .map(|e| e.target_config.clone())
                    .collect(),
            },
        }
    }

    /// Substitute each `%s` with the next key's value: the row's
    /// metadata wins, the column's is the fallback, absent keys render
    /// empty.
    pub fn render(
        &self,
        row_meta: &BTreeMap<String, String>,
        column_meta: &BTreeMap<String, String>,
    ) -> String {
        let mut out = String::with_capacity(self.format.len());
        let mut parts = self.parts.iter();
        let mut rest = self.format.as_str();
        while let Some(pos) = rest.find("%s") {
            out.push_str(&rest[..pos]);
            if let Some(key) = parts.next() {
                if let Some(value) = row_meta.get(key).or_else(|| column_meta.get(key)) {
                    out.push_str(value);
                }
            }
            rest = &rest[pos + 2..];
        }
        out.push_str(rest);
        out
    }
}
