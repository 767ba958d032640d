//! Reading one build into a column.
//!
//! Four activities run concurrently under a single 30-second deadline:
//! the `started.json` fetch, the `finished.json` fetch (absence means
//! the build is still running), the artifact listing, and one task per
//! JUnit artifact. The first error tears the others down; a torn-down
//! build contributes nothing to the grid.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use resultgrid_store::{GcsPath, ObjectClient, StoreError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{UpdateError, UpdateResult};
use crate::junit;
use crate::metadata::{Finished, Started};
use crate::model::{Build, Column, Row, ELAPSED_KEY, OVERALL_ROW, TESTS_NAME_KEY};
use crate::state::RowResult;

/// Wall-clock deadline for reading one build.
pub const BUILD_DEADLINE: Duration = Duration::from_secs(30);

/// Artifacts declaring more than this many bytes fail the build.
pub const MAX_ARTIFACT_BYTES: u64 = 50_000_000;

/// Builds started longer ago than this without finishing are failed.
const STALE_BUILD_SECS: i64 = 24 * 60 * 60;

/// Read a build into its column. `artifact_workers` bounds the
/// per-artifact fan-out; `now` is the wall clock in epoch seconds.
pub async fn read_build(
    client: &Arc<ObjectClient>,
    build: &Build,
    artifact_workers: usize,
    now: i64,
) -> UpdateResult<Column> {
    let work = async {
        let (started, finished, rows) = tokio::try_join!(
            fetch_started(client, &build.prefix),
            fetch_finished(client, &build.prefix),
            read_artifacts(client, &build.prefix, artifact_workers),
        )?;
        Ok::<_, UpdateError>(assemble(build, started, finished, rows, now))
    };
    match timeout(BUILD_DEADLINE, work).await {
        Ok(result) => result,
        Err(_) => Err(UpdateError::Timeout {
            prefix: build.prefix.to_string(),
        }),
    }
}

async fn fetch_started(client: &ObjectClient, prefix: &GcsPath) -> UpdateResult<Started> {
    let path = prefix.child("started.json");
    match client.get(&path, None).await {
        Ok(buf) => Started::from_slice(&buf, &path.to_string()),
        Err(err) if err.is_not_found() => Err(UpdateError::BuildNotStarted {
            prefix: prefix.to_string(),
        }),
        Err(err) => Err(err.into()),
    }
}

async fn fetch_finished(client: &ObjectClient, prefix: &GcsPath) -> UpdateResult<Finished> {
    let path = prefix.child("finished.json");
    match client.get(&path, None).await {
        Ok(buf) => Finished::from_slice(&buf, &path.to_string()),
        Err(err) if err.is_not_found() => Ok(Finished::still_running()),
        Err(err) => Err(err.into()),
    }
}

/// List `<prefix>artifacts/` and parse every JUnit artifact, each in
/// its own task. Results are merged in listing order so the column is
/// a pure function of the store contents.
async fn read_artifacts(
    client: &Arc<ObjectClient>,
    prefix: &GcsPath,
    workers: usize,
) -> UpdateResult<BTreeMap<String, Vec<Row>>> {
    let dir = prefix.child("artifacts/");
    let names = client.list(&dir).await.map_err(UpdateError::from)?;

    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks: JoinSet<UpdateResult<(usize, Vec<(String, Row)>)>> = JoinSet::new();
    let mut parsed: Vec<(usize, Vec<(String, Row)>)> = Vec::new();
    let mut spawned = 0usize;
    for name in names {
        let Some(artifact_meta) = junit::parse_artifact_name(&name) else {
            continue;
        };
        let index = spawned;
        spawned += 1;
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| UpdateError::Cancelled {
                detail: e.to_string(),
            })?;
        // Surface failures from already-finished tasks before
        // dispatching more work.
        while let Some(joined) = tasks.try_join_next() {
            parsed.push(unwrap_artifact(joined)?);
        }
        let client = client.clone();
        let path = GcsPath::from_parts(prefix.bucket(), &name);
        tasks.spawn(async move {
            let _permit = permit;
            let buf = match client.get(&path, Some(MAX_ARTIFACT_BYTES)).await {
                Ok(buf) => buf,
                Err(StoreError::TooLarge { path, size, limit }) => {
                    return Err(UpdateError::ArtifactTooLarge { path, size, limit })
                }
                Err(err) => return Err(err.into()),
            };
            let rows = junit::extract_rows(&buf, &path.to_string(), &artifact_meta)?;
            Ok((index, rows))
        });
    }
    debug!(prefix = %prefix, artifacts = spawned, "reading test artifacts");

    while let Some(joined) = tasks.join_next().await {
        parsed.push(unwrap_artifact(joined)?);
    }

    // Merge in listing order, not completion order, so the column is
    // reproducible.
    parsed.sort_by_key(|(index, _)| *index);
    let mut out: BTreeMap<String, Vec<Row>> = BTreeMap::new();
    for (_, rows) in parsed {
        for (name, row) in rows {
            out.entry(name).or_default().push(row);
        }
    }
    Ok(out)
}

type ArtifactJoin = Result<UpdateResult<(usize, Vec<(String, Row)>)>, tokio::task::JoinError>;

fn unwrap_artifact(joined: ArtifactJoin) -> UpdateResult<(usize, Vec<(String, Row)>)> {
    joined.map_err(|e| UpdateError::Cancelled {
        detail: e.to_string(),
    })?
}

fn assemble(
    build: &Build,
    started: Started,
    finished: Finished,
    rows: BTreeMap<String, Vec<Row>>,
    now: i64,
) -> Column {
    let mut column = Column {
        id: build.id().to_string(),
        started: started.timestamp,
        rows,
        ..Default::default()
    };
    if !finished.running {
        column.finished = finished.timestamp;
        column.passed = finished.passed;
        column.metadata = finished.column_metadata();
        if !finished.job_version.is_empty() {
            column
                .metadata
                .entry("job-version".to_string())
                .or_insert(finished.job_version);
        }
    }
    let overall = overall_row(&column, now);
    column.rows.insert(OVERALL_ROW.to_string(), vec![overall]);
    column
}

/// Synthesize the per-build summary row.
fn overall_row(column: &Column, now: i64) -> Row {
    let mut row = Row {
        metadata: BTreeMap::from([(TESTS_NAME_KEY.to_string(), OVERALL_ROW.to_string())]),
        ..Default::default()
    };
    if column.is_finished() {
        row.result = if column.passed {
            RowResult::Pass
        } else {
            RowResult::Fail
        };
        row.metrics.insert(
            ELAPSED_KEY.to_string(),
            (column.finished - column.started) as f64,
        );
        // A failed build with no failing test needs an explanation.
        if !column.passed && !has_failing_row(column) {
            row.icon = "F".to_string();
            row.message = "Build failed outside of test results".to_string();
        }
    } else if column.started < now - STALE_BUILD_SECS {
        row.result = RowResult::Fail;
        row.message = "Testing did not complete within 24 hours".to_string();
        row.icon = "T".to_string();
    } else {
        row.result = RowResult::Running;
        row.message = "Still running; has not finished...".to_string();
        row.icon = "R".to_string();
    }
    row
}

fn has_failing_row(column: &Column) -> bool {
    column
        .rows
        .values()
        .flatten()
        .any(|row| row.result == RowResult::Fail)
}
