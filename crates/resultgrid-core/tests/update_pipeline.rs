//! End-to-end pipeline tests over the in-memory store: seed a group's
//! builds, rebuild the grid, check the emitted structure and the
//! universal grid invariants.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use resultgrid_core::config::ColumnHeader;
use resultgrid_core::state::{Grid, RowResult};
use resultgrid_core::{decode, encode, natural, update_group, GroupOptions, TestGroup};
use resultgrid_store::{Bytes, GcsPath, ObjectClient};

const PREFIX: &str = "gs://ci-bucket/logs/some-job";

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_secs() as i64
}

fn group() -> TestGroup {
    TestGroup {
        name: "some-job".to_string(),
        gcs_prefix: PREFIX.to_string(),
        ..TestGroup::default()
    }
}

fn opts() -> GroupOptions {
    GroupOptions {
        group_concurrency: 4,
        build_concurrency: 4,
        ..GroupOptions::default()
    }
}

async fn seed(client: &ObjectClient, path: String, body: impl Into<Bytes>) {
    client
        .put(&GcsPath::parse(&path).unwrap(), body.into())
        .await
        .unwrap();
}

async fn seed_build(client: &ObjectClient, id: &str, started: i64, finished: Option<(i64, bool)>) {
    seed(
        client,
        format!("{PREFIX}/{id}/started.json"),
        format!(r#"{{"timestamp": {started}}}"#),
    )
    .await;
    if let Some((timestamp, passed)) = finished {
        seed(
            client,
            format!("{PREFIX}/{id}/finished.json"),
            format!(r#"{{"timestamp": {timestamp}, "passed": {passed}}}"#),
        )
        .await;
    }
}

async fn seed_artifact(client: &ObjectClient, id: &str, name: &str, xml: &str) {
    seed(
        client,
        format!("{PREFIX}/{id}/artifacts/{name}"),
        xml.to_string(),
    )
    .await;
}

fn row<'a>(grid: &'a Grid, name: &str) -> &'a resultgrid_core::state::Row {
    grid.rows
        .iter()
        .find(|r| r.name == name)
        .unwrap_or_else(|| panic!("row {name} missing"))
}

/// The universal invariants from the grid's contract.
fn check_invariants(grid: &Grid) {
    let columns = grid.columns.len();
    for pair in grid.columns.windows(2) {
        assert_eq!(
            natural::compare(&pair[0].build, &pair[1].build),
            std::cmp::Ordering::Greater,
            "columns must be newest first: {} then {}",
            pair[0].build,
            pair[1].build
        );
    }

    let mut seen = HashSet::new();
    for row in &grid.rows {
        assert!(seen.insert(&row.name), "duplicate row name {}", row.name);

        let total: i32 = row.results.chunks(2).map(|pair| pair[1]).sum();
        assert_eq!(total as usize, columns, "row {} cell count", row.name);

        for pair in row.results.windows(4).step_by(2) {
            assert_ne!(pair[0], pair[2], "row {} has mergeable RLE groups", row.name);
        }

        let occupied: i32 = row
            .results
            .chunks(2)
            .filter(|pair| pair[0] != RowResult::NoResult as i32)
            .map(|pair| pair[1])
            .sum();
        assert_eq!(occupied as usize, row.messages.len(), "row {}", row.name);
        assert_eq!(row.messages.len(), row.icons.len(), "row {}", row.name);
        assert_eq!(row.messages.len(), row.cell_ids.len(), "row {}", row.name);

        for metric in &row.metrics {
            let declared: i32 = metric.indices.chunks(2).map(|pair| pair[1]).sum();
            assert_eq!(declared as usize, metric.values.len(), "metric {}", metric.name);
            let mut last_end = i32::MIN;
            for span in metric.indices.chunks(2) {
                assert!(span[0] >= last_end, "metric {} spans overlap", metric.name);
                assert!(span[1] > 0, "metric {} empty span", metric.name);
                last_end = span[0] + span[1];
            }
        }
    }

    let mut sorted: Vec<&str> = grid.rows.iter().map(|r| r.name.as_str()).collect();
    sorted.sort_by(|a, b| natural::compare(a, b));
    let actual: Vec<&str> = grid.rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(actual, sorted, "rows must be naturally sorted");
}

#[tokio::test]
async fn two_builds_one_row() {
    let client = Arc::new(ObjectClient::memory());
    let now = now();
    seed_build(&client, "1", now - 7200, Some((now - 7000, false))).await;
    seed_artifact(
        &client,
        "1",
        "junit_01.xml",
        r#"<testsuite><testcase name="T"><failure>broke</failure></testcase></testsuite>"#,
    )
    .await;
    seed_build(&client, "2", now - 3600, Some((now - 3500, true))).await;
    seed_artifact(
        &client,
        "2",
        "junit_01.xml",
        r#"<testsuite><testcase name="T"/></testsuite>"#,
    )
    .await;

    let grid = update_group(&client, &group(), &opts()).await.unwrap();
    check_invariants(&grid);

    assert_eq!(grid.columns.len(), 2);
    assert_eq!(grid.columns[0].build, "2");
    assert_eq!(grid.columns[1].build, "1");
    assert_eq!(grid.columns[0].started, ((now - 3600) * 1000) as f64);
    assert_eq!(grid.rows.len(), 2);

    let t = row(&grid, "T");
    assert_eq!(
        t.results,
        vec![RowResult::Pass as i32, 1, RowResult::Fail as i32, 1]
    );
    assert_eq!(t.messages, vec!["", "broke"]);
    assert_eq!(t.icons, vec!["", "F"]);
    assert_eq!(t.cell_ids, vec!["2", "1"]);

    let overall = row(&grid, "Overall");
    assert_eq!(
        overall.results,
        vec![RowResult::Pass as i32, 1, RowResult::Fail as i32, 1]
    );
}

#[tokio::test]
async fn missing_finished_on_newest_build() {
    let client = Arc::new(ObjectClient::memory());
    let now = now();
    seed_build(&client, "1", now - 7200, Some((now - 7000, true))).await;
    seed_artifact(
        &client,
        "1",
        "junit_01.xml",
        r#"<testsuite><testcase name="T"/></testsuite>"#,
    )
    .await;
    seed_build(&client, "2", now - 600, None).await;

    let mut group = group();
    group.column_header = vec![
        ColumnHeader {
            configuration_value: "Commit".to_string(),
        },
        ColumnHeader {
            configuration_value: "infra-commit".to_string(),
        },
    ];

    let grid = update_group(&client, &group, &opts()).await.unwrap();
    check_invariants(&grid);

    assert_eq!(grid.columns.len(), 2);
    assert_eq!(grid.columns[0].build, "2");
    assert_eq!(grid.columns[0].extra, vec!["", ""]);

    let overall = row(&grid, "Overall");
    assert_eq!(
        overall.results,
        vec![RowResult::Running as i32, 1, RowResult::Pass as i32, 1]
    );
    assert_eq!(overall.icons[0], "R");
    assert_eq!(overall.messages[0], "Still running; has not finished...");

    // T exists only in the older build: one NO_RESULT hole, one cell,
    // and nothing appended for the hole.
    let t = row(&grid, "T");
    assert_eq!(
        t.results,
        vec![RowResult::NoResult as i32, 1, RowResult::Pass as i32, 1]
    );
    assert_eq!(t.messages.len(), 1);
    assert_eq!(t.cell_ids, vec!["1"]);
}

#[tokio::test]
async fn early_stop_truncates_at_the_window() {
    let client = Arc::new(ObjectClient::memory());
    let now = now();
    // b1..b10, stepping one hour back from the newest; offset half an
    // hour so nothing sits exactly on the cutoff.
    for i in 1..=10i64 {
        let started = now - (11 - i) * 3600 + 1800;
        seed_build(&client, &i.to_string(), started, Some((started + 60, true))).await;
    }

    let mut opts = opts();
    opts.window = Duration::from_secs(3 * 3600);
    opts.group_concurrency = 2;

    let grid = update_group(&client, &group(), &opts).await.unwrap();
    check_invariants(&grid);

    let builds: Vec<&str> = grid.columns.iter().map(|c| c.build.as_str()).collect();
    assert_eq!(builds, ["10", "9", "8", "7"]);
}

#[tokio::test]
async fn duplicate_names_in_one_artifact() {
    let client = Arc::new(ObjectClient::memory());
    let now = now();
    seed_build(&client, "1", now - 3600, Some((now - 3500, true))).await;
    seed_artifact(
        &client,
        "1",
        "junit_01.xml",
        r#"<testsuite>
             <testcase name="T"/>
             <testcase name="T"/>
             <testcase name="T"/>
           </testsuite>"#,
    )
    .await;

    let grid = update_group(&client, &group(), &opts()).await.unwrap();
    check_invariants(&grid);

    let names: Vec<&str> = grid.rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["Overall", "T", "T [1]", "T [2]"]);
    for name in ["T", "T [1]", "T [2]"] {
        assert_eq!(row(&grid, name).results, vec![RowResult::Pass as i32, 1]);
    }
}

#[tokio::test]
async fn failure_without_test_results() {
    let client = Arc::new(ObjectClient::memory());
    let now = now();
    seed_build(&client, "1", now - 3600, Some((now - 3500, false))).await;

    let grid = update_group(&client, &group(), &opts()).await.unwrap();
    check_invariants(&grid);

    assert_eq!(grid.rows.len(), 1);
    let overall = row(&grid, "Overall");
    assert_eq!(overall.results, vec![RowResult::Fail as i32, 1]);
    assert_eq!(overall.icons, vec!["F"]);
    assert_eq!(overall.messages, vec!["Build failed outside of test results"]);
}

#[tokio::test]
async fn oversized_artifact_aborts_the_group() {
    let client = Arc::new(ObjectClient::memory());
    let now = now();
    seed_build(&client, "1", now - 3600, Some((now - 3500, true))).await;
    seed(
        &client,
        format!("{PREFIX}/1/artifacts/junit_huge.xml"),
        Bytes::from(vec![b'x'; 60_000_000]),
    )
    .await;

    let err = update_group(&client, &group(), &opts()).await.unwrap_err();
    assert!(
        matches!(err, resultgrid_core::UpdateError::ArtifactTooLarge { .. }),
        "{err}"
    );
}

#[tokio::test]
async fn builds_without_started_are_skipped() {
    let client = Arc::new(ObjectClient::memory());
    let now = now();
    seed_build(&client, "1", now - 7200, Some((now - 7000, true))).await;
    // Build 2 has artifacts but never wrote started.json.
    seed(
        &client,
        format!("{PREFIX}/2/finished.json"),
        format!(r#"{{"timestamp": {}, "passed": true}}"#, now - 300),
    )
    .await;

    let grid = update_group(&client, &group(), &opts()).await.unwrap();
    check_invariants(&grid);
    let builds: Vec<&str> = grid.columns.iter().map(|c| c.build.as_str()).collect();
    assert_eq!(builds, ["1"]);
}

#[tokio::test]
async fn metrics_land_on_the_right_cells() {
    let client = Arc::new(ObjectClient::memory());
    let now = now();
    seed_build(&client, "1", now - 7200, Some((now - 7000, true))).await;
    seed_artifact(
        &client,
        "1",
        "junit_01.xml",
        r#"<testsuite><testcase name="T" time="2.25"/></testsuite>"#,
    )
    .await;
    seed_build(&client, "2", now - 3600, Some((now - 3500, true))).await;
    seed_artifact(
        &client,
        "2",
        "junit_01.xml",
        r#"<testsuite><testcase name="T" time="1.75"/></testsuite>"#,
    )
    .await;

    let grid = update_group(&client, &group(), &opts()).await.unwrap();
    check_invariants(&grid);

    let t = row(&grid, "T");
    let elapsed = t
        .metrics
        .iter()
        .find(|m| m.name == "seconds-elapsed")
        .unwrap();
    assert_eq!(elapsed.values, vec![1.75, 2.25]);
    assert_eq!(elapsed.indices, vec![1, 2]);
}

#[tokio::test]
async fn reruns_are_byte_identical() {
    let client = Arc::new(ObjectClient::memory());
    let now = now();
    for id in ["1", "2", "3"] {
        let offset: i64 = id.parse::<i64>().unwrap() * 3600;
        seed_build(&client, id, now - 10 * 3600 + offset, Some((now - 10 * 3600 + offset + 60, id != "2"))).await;
        seed_artifact(
            &client,
            id,
            "junit_runner.xml",
            r#"<testsuites>
                 <testsuite name="s">
                   <testcase name="a" time="0.5"/>
                   <testcase name="b"><failure>nope</failure></testcase>
                 </testsuite>
               </testsuites>"#,
        )
        .await;
    }

    let first = update_group(&client, &group(), &opts()).await.unwrap();
    let second = update_group(&client, &group(), &opts()).await.unwrap();
    assert_eq!(first, second);

    let a = encode(&first).unwrap();
    let b = encode(&second).unwrap();
    assert_eq!(a.bytes, b.bytes, "compressed output must be byte-identical");
    assert_eq!(a.crc32c, b.crc32c);

    // And the payload survives the round trip.
    assert_eq!(decode(&a.bytes).unwrap(), first);
}
