//! Grid assembly: merging ordered columns into the sparse RLE grid.
//!
//! Columns arrive newest first. Every existing row gets exactly one
//! cell per column: a real result (with cell id, message, and icon,
//! any of which may be empty) when the build produced one, a bare
//! `NO_RESULT` otherwise. New rows are back-padded so all rows stay
//! aligned to the column count.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::config::NameConfig;
use crate::model::Column;
use crate::natural;
use crate::state;
use crate::state::RowResult;

/// Header whose value is rewritten to the repo commit.
const COMMIT_HEADER: &str = "Commit";
const COMMIT_KEY: &str = "repo-commit";
const COMMIT_LEN: usize = 9;
const JOB_VERSION_KEY: &str = "job-version";
const MISSING_VALUE: &str = "missing";

/// Accumulates columns into a grid.
pub struct GridAssembler {
    headers: Vec<String>,
    name_config: NameConfig,
    grid: state::Grid,
    /// Disambiguated display name to row position.
    index: HashMap<String, usize>,
}

impl GridAssembler {
    pub fn new(headers: Vec<String>, name_config: NameConfig) -> Self {
        Self {
            headers,
            name_config,
            grid: state::Grid::default(),
            index: HashMap::new(),
        }
    }

    /// Number of columns appended so far.
    pub fn columns(&self) -> usize {
        self.grid.columns.len()
    }

    /// Append one build's column, newest-to-oldest order assumed.
    pub fn append_column(&mut self, build: &Column) {
        let extra = self
            .headers
            .iter()
            .map(|header| {
                if !build.is_finished() {
                    String::new()
                } else {
                    header_value(header, build)
                }
            })
            .collect();
        self.grid.columns.push(state::Column {
            build: build.id.clone(),
            started: (build.started * 1000) as f64,
            extra,
        });

        // Every row known before this column; whatever stays in here
        // gets a NO_RESULT cell at the end.
        let mut missing: BTreeSet<String> = self.index.keys().cloned().collect();
        let mut found: HashSet<String> = HashSet::new();

        for (target, records) in &build.rows {
            for record in records {
                let base = self.name_config.render(&record.metadata, &build.metadata);
                let mut name = base.clone();
                let mut k = 1;
                while found.contains(&name) {
                    name = format!("{base} [{k}]");
                    k += 1;
                }
                found.insert(name.clone());
                missing.remove(&name);

                let row_idx = match self.index.get(&name).copied() {
                    Some(idx) => idx,
                    None => {
                        let mut row = state::Row {
                            name: name.clone(),
                            id: target.clone(),
                            ..Default::default()
                        };
                        // Align with the columns this row missed; the
                        // current column is already pushed, so pad one
                        // less than the column count.
                        append_result(&mut row, RowResult::NoResult, self.grid.columns.len() - 1);
                        let idx = self.grid.rows.len();
                        self.index.insert(name, idx);
                        self.grid.rows.push(row);
                        idx
                    }
                };

                let row = &mut self.grid.rows[row_idx];
                append_result(row, record.result, 1);
                row.cell_ids.push(build.id.clone());
                row.messages.push(record.message.clone());
                row.icons.push(record.icon.clone());

                let cell = row.messages.len() as i32;
                for (metric_name, value) in &record.metrics {
                    let metric = find_or_insert_metric(row, metric_name);
                    append_metric(metric, cell, *value);
                }
            }
        }

        for name in &missing {
            let idx = self.index[name];
            append_result(&mut self.grid.rows[idx], RowResult::NoResult, 1);
        }
    }

    /// Finish the grid: stable natural-order sort of the rows.
    pub fn finish(mut self) -> state::Grid {
        self.grid
            .rows
            .sort_by(|a, b| natural::compare(&a.name, &b.name));
        self.grid
    }
}

/// Resolve one configured header against the column metadata.
fn header_value(header: &str, build: &Column) -> String {
    if header == COMMIT_HEADER {
        if let Some(commit) = build.metadata.get(COMMIT_KEY) {
            return commit.chars().take(COMMIT_LEN).collect();
        }
        if let Some(version) = build.metadata.get(JOB_VERSION_KEY) {
            if let Some((_, suffix)) = version.rsplit_once('+') {
                return suffix.to_string();
            }
        }
        debug!(build = %build.id, header, "column metadata missing commit");
        return MISSING_VALUE.to_string();
    }
    match build.metadata.get(header) {
        Some(value) => value.clone(),
        None => {
            debug!(build = %build.id, header, "column metadata missing header");
            MISSING_VALUE.to_string()
        }
    }
}

/// RLE append: extend the trailing group when the value repeats,
/// otherwise start a new one. Count zero is a no-op.
pub(crate) fn append_result(row: &mut state::Row, result: RowResult, count: usize) {
    if count == 0 {
        return;
    }
    let value = result as i32;
    let n = row.results.len();
    if n == 0 || row.results[n - 2] != value {
        row.results.extend([value, count as i32]);
    } else {
        row.results[n - 1] += count as i32;
    }
}

fn find_or_insert_metric<'a>(row: &'a mut state::Row, name: &str) -> &'a mut state::Metric {
    if let Some(pos) = row.metrics.iter().position(|m| m.name == name) {
        return &mut row.metrics[pos];
    }
    row.metrics.push(state::Metric {
        name: name.to_string(),
        ..Default::default()
    });
    row.metrics.last_mut().expect("just pushed")
}

/// Append a value at `index`: grow the trailing span when contiguous,
/// else open a new `[start, 1]` span.
pub(crate) fn append_metric(metric: &mut state::Metric, index: i32, value: f64) {
    let n = metric.indices.len();
    if n == 0 || metric.indices[n - 2] + metric.indices[n - 1] != index {
        metric.indices.extend([index, 1]);
    } else {
        metric.indices[n - 1] += 1;
    }
    metric.values.push(value);
}
