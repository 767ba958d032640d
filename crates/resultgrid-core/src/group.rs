//! Driving one test group: list builds, read them concurrently, feed
//! the assembler.
//!
//! Builds dispatch to a bounded worker pool. Two things halt dispatch
//! early: a column older than the time window (the stop hint; in-flight
//! builds still complete) and any non-recoverable worker error (which
//! aborts the whole group). A slot vector keyed by dispatch index keeps
//! the feed order independent of completion order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resultgrid_store::{GcsPath, ObjectClient};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::build::read_build;
use crate::config::{NameConfig, TestGroup};
use crate::error::{UpdateError, UpdateResult};
use crate::grid::GridAssembler;
use crate::model::{Build, Column};
use crate::natural;
use crate::state::Grid;

/// Tuning for one group update.
#[derive(Debug, Clone)]
pub struct GroupOptions {
    /// Stop reading once a build predates `now - window`. Zero
    /// disables the early stop.
    pub window: Duration,
    /// Keep at most this many newest builds. Zero means unlimited.
    pub max_columns: usize,
    /// Concurrent builds per group. Zero picks the default.
    pub group_concurrency: usize,
    /// Concurrent artifact reads per build. Zero picks the default.
    pub build_concurrency: usize,
}

impl Default for GroupOptions {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(5 * 24 * 60 * 60),
            max_columns: 1000,
            group_concurrency: 0,
            build_concurrency: 0,
        }
    }
}

/// Default fan-out at both the group and the artifact level.
pub fn default_workers() -> usize {
    4 * std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// Rebuild one group's grid from the store.
pub async fn update_group(
    client: &Arc<ObjectClient>,
    group: &TestGroup,
    opts: &GroupOptions,
) -> UpdateResult<Grid> {
    let prefix = GcsPath::parse(&group.gcs_prefix)?;
    let mut builds = list_builds(client, &prefix).await?;
    if opts.max_columns > 0 && builds.len() > opts.max_columns {
        debug!(group = %group.name, ceiling = opts.max_columns, "hit column ceiling");
        builds.truncate(opts.max_columns);
    }
    info!(group = %group.name, builds = builds.len(), prefix = %prefix, "reading builds");

    let now = chrono::Utc::now().timestamp();
    let cutoff = if opts.window.is_zero() {
        i64::MIN
    } else {
        now - opts.window.as_secs() as i64
    };
    let workers = match opts.group_concurrency {
        0 => default_workers(),
        n => n,
    };
    let build_workers = match opts.build_concurrency {
        0 => default_workers(),
        n => n,
    };

    let slots = read_columns(client, &builds, workers, build_workers, cutoff, now).await?;

    let mut assembler = GridAssembler::new(
        group.headers(),
        NameConfig::from_group(group.test_name_config.as_ref()),
    );
    for column in slots.into_iter().flatten() {
        let started = column.started;
        debug!(
            build = %column.id,
            started,
            finished = column.finished,
            passed = column.passed,
            rows = column.rows.len(),
            "appending column"
        );
        assembler.append_column(&column);
        if started < cutoff {
            info!(build = %column.id, "latest result predates the window");
            break;
        }
    }
    let grid = assembler.finish();
    info!(
        group = %group.name,
        columns = grid.columns.len(),
        rows = grid.rows.len(),
        "assembled grid"
    );
    Ok(grid)
}

/// All build prefixes for the group, newest first.
async fn list_builds(client: &Arc<ObjectClient>, prefix: &GcsPath) -> UpdateResult<Vec<Build>> {
    let mut prefixes = client.list_prefixes(prefix).await.map_err(UpdateError::from)?;
    // Build numbers grow monotonically, so natural ascending order then
    // a reversal puts the most recent build first.
    prefixes.sort_by(|a, b| natural::compare(a.object(), b.object()));
    prefixes.reverse();
    Ok(prefixes.into_iter().map(Build::new).collect())
}

/// Read builds through the worker pool into a slot per dispatch index.
/// `BuildNotStarted` leaves its slot empty; any other error aborts.
async fn read_columns(
    client: &Arc<ObjectClient>,
    builds: &[Build],
    workers: usize,
    build_workers: usize,
    cutoff: i64,
    now: i64,
) -> UpdateResult<Vec<Option<Column>>> {
    let stop = Arc::new(AtomicBool::new(false));
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks: JoinSet<(usize, UpdateResult<Column>)> = JoinSet::new();

    for (index, build) in builds.iter().enumerate() {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| UpdateError::Cancelled {
                detail: e.to_string(),
            })?;
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let client = client.clone();
        let build = build.clone();
        let stop = stop.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let result = read_build(&client, &build, build_workers, now).await;
            match &result {
                Ok(column) if column.started < cutoff => stop.store(true, Ordering::SeqCst),
                Err(err) if !err.is_build_not_started() => stop.store(true, Ordering::SeqCst),
                _ => {}
            }
            (index, result)
        });
    }

    let mut slots: Vec<Option<Column>> = builds.iter().map(|_| None).collect();
    let mut first_error: Option<UpdateError> = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, Ok(column))) => slots[index] = Some(column),
            Ok((index, Err(err))) if err.is_build_not_started() => {
                warn!(prefix = %builds[index].prefix, "build has not started, skipping");
            }
            Ok((index, Err(err))) => {
                warn!(prefix = %builds[index].prefix, error = %err, "failed to read build");
                if first_error.is_none() {
                    first_error = Some(err);
                    tasks.abort_all();
                }
            }
            Err(join_err) => {
                if !join_err.is_cancelled() && first_error.is_none() {
                    first_error = Some(UpdateError::Cancelled {
                        detail: join_err.to_string(),
                    });
                }
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(slots),
    }
}
