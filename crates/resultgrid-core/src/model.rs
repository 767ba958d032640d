//! In-flight build data, before grid assembly.

use std::collections::BTreeMap;

use resultgrid_store::GcsPath;

use crate::state::RowResult;

/// Metric key for wall-clock test duration.
pub const ELAPSED_KEY: &str = "seconds-elapsed";

/// Name of the synthesized per-build summary row.
pub const OVERALL_ROW: &str = "Overall";

/// Metadata key holding a record's canonical test name.
pub const TESTS_NAME_KEY: &str = "Tests name";

/// One build, addressed by its directory prefix.
#[derive(Debug, Clone)]
pub struct Build {
    pub prefix: GcsPath,
}

impl Build {
    pub fn new(prefix: GcsPath) -> Self {
        Self { prefix }
    }

    /// Directory basename; becomes the column id.
    pub fn id(&self) -> &str {
        self.prefix.basename()
    }
}

/// One test case's outcome within a single build.
#[derive(Debug, Clone, Default)]
pub struct Row {
    pub result: RowResult,
    pub metrics: BTreeMap<String, f64>,
    pub metadata: BTreeMap<String, String>,
    pub message: String,
    pub icon: String,
}

/// One build's contribution to the grid.
#[derive(Debug, Clone, Default)]
pub struct Column {
    /// Build directory basename.
    pub id: String,
    /// Epoch seconds.
    pub started: i64,
    /// Epoch seconds; 0 while the build is running.
    pub finished: i64,
    pub passed: bool,
    /// String entries of the finished metadata.
    pub metadata: BTreeMap<String, String>,
    /// Canonical name to the records sharing it, in artifact order.
    pub rows: BTreeMap<String, Vec<Row>>,
}

impl Column {
    /// True once `finished.json` has been observed.
    pub fn is_finished(&self) -> bool {
        self.finished > 0
    }
}
