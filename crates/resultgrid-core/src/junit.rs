//! JUnit artifact parsing.
//!
//! Reports arrive in two shapes: `<testsuites>` wrapping one or more
//! `<testsuite>` elements, or a bare `<testsuite>` root. The plural
//! shape is attempted first; if both fail the error carries both parse
//! messages. Only UTF-8 documents are accepted.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use quick_xml::events::Event;
use regex::Regex;
use serde::Deserialize;

use crate::error::{UpdateError, UpdateResult};
use crate::model::{Row, ELAPSED_KEY, TESTS_NAME_KEY};
use crate::state::RowResult;

/// Messages longer than this are cut to `head(70) + "..." + tail(69)`.
const MAX_MESSAGE_CHARS: usize = 140;

/// Matches `junit_CONTEXT_TIMESTAMP_THREAD.xml` object names.
static ARTIFACT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r".+/junit(_[^_]+)?(_\d+-\d+)?(_\d+)?\.xml$").expect("artifact regex"));

/// Parse a JUnit artifact object name into its metadata, or `None` if
/// the name is not a test artifact. Captured `_` prefixes are stripped.
pub fn parse_artifact_name(name: &str) -> Option<BTreeMap<String, String>> {
    let caps = ARTIFACT_NAME.captures(name)?;
    let strip = |i: usize| {
        caps.get(i)
            .map(|m| m.as_str()[1..].to_string())
            .unwrap_or_default()
    };
    Some(BTreeMap::from([
        ("Context".to_string(), strip(1)),
        ("Timestamp".to_string(), strip(2)),
        ("Thread".to_string(), strip(3)),
    ]))
}

#[derive(Debug, Default, Deserialize)]
struct JunitSuites {
    #[serde(rename = "testsuite", default)]
    suites: Vec<JunitSuite>,
}

#[derive(Debug, Default, Deserialize)]
struct JunitSuite {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "testcase", default)]
    testcases: Vec<JunitCase>,
}

#[derive(Debug, Default, Deserialize)]
struct JunitCase {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@time", default)]
    time: f64,
    #[serde(default)]
    failure: Option<TagBody>,
    #[serde(rename = "system-out", default)]
    output: Option<TagBody>,
    #[serde(default)]
    skipped: Option<TagBody>,
}

/// An element whose text body is all we care about; attributes such as
/// `message=` are ignored.
#[derive(Debug, Default, Deserialize)]
struct TagBody {
    #[serde(rename = "$text", default)]
    text: String,
}

/// Extract `(canonical_name, row)` records from one artifact, in
/// document order. `artifact_meta` comes from [`parse_artifact_name`]
/// and is merged into every record's metadata.
pub fn extract_rows(
    buf: &[u8],
    path: &str,
    artifact_meta: &BTreeMap<String, String>,
) -> UpdateResult<Vec<(String, Row)>> {
    let bad = |detail: String| UpdateError::BadArtifact {
        path: path.to_string(),
        detail,
    };

    let text = std::str::from_utf8(buf).map_err(|e| bad(format!("not valid UTF-8: {e}")))?;
    if let Some(encoding) = declared_encoding(text) {
        if !matches!(encoding.to_ascii_lowercase().as_str(), "utf-8" | "utf8") {
            return Err(bad(format!("unsupported charset {encoding:?}")));
        }
    }
    let suites = parse_suites(text).map_err(bad)?;

    let mut out = Vec::new();
    for suite in &suites.suites {
        for case in &suite.testcases {
            if matches!(&case.skipped, Some(s) if s.text.is_empty()) {
                continue;
            }

            let name = if suite.name.is_empty() {
                case.name.clone()
            } else {
                format!("{}.{}", suite.name, case.name)
            };

            let (result, message) = match (&case.failure, &case.skipped, &case.output) {
                (Some(failure), _, _) => (RowResult::Fail, failure.text.clone()),
                (None, Some(skipped), _) => (RowResult::PassWithSkips, skipped.text.clone()),
                (None, None, Some(output)) => (RowResult::Pass, output.text.clone()),
                (None, None, None) => (RowResult::Pass, String::new()),
            };
            let message = truncate_message(message);
            let icon = match result {
                RowResult::Fail if !message.is_empty() => "F",
                RowResult::PassWithSkips if !message.is_empty() => "S",
                _ => "",
            }
            .to_string();

            let mut metadata = artifact_meta.clone();
            metadata.insert(TESTS_NAME_KEY.to_string(), name.clone());

            let mut metrics = BTreeMap::new();
            if case.time > 0.0 {
                metrics.insert(ELAPSED_KEY.to_string(), case.time);
            }

            out.push((
                name,
                Row {
                    result,
                    metrics,
                    metadata,
                    message,
                    icon,
                },
            ));
        }
    }
    Ok(out)
}

/// Try the plural shape, then the bare suite; report both failures.
fn parse_suites(text: &str) -> Result<JunitSuites, String> {
    let plural = parse_root::<JunitSuites>(text, "testsuites");
    match plural {
        Ok(suites) => Ok(suites),
        Err(outer) => match parse_root::<JunitSuite>(text, "testsuite") {
            Ok(suite) => Ok(JunitSuites {
                suites: vec![suite],
            }),
            Err(inner) => Err(format!(
                "not a valid testsuites document: {outer}; nor a testsuite: {inner}"
            )),
        },
    }
}

/// Deserialize the document only when its root element is `want`. The
/// serde layer does not check root names, so a bare `<testsuite>` would
/// otherwise "succeed" as an empty `<testsuites>`.
fn parse_root<T: serde::de::DeserializeOwned>(text: &str, want: &str) -> Result<T, String> {
    match root_name(text) {
        Some(root) if root == want => quick_xml::de::from_str(text).map_err(|e| e.to_string()),
        Some(root) => Err(format!("unexpected root element <{root}>")),
        None => Err("no root element".to_string()),
    }
}

fn root_name(text: &str) -> Option<String> {
    let mut reader = quick_xml::Reader::from_str(text);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.name().as_ref()).into_owned())
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

/// The encoding declared in the XML prolog, if any.
fn declared_encoding(text: &str) -> Option<String> {
    let mut reader = quick_xml::Reader::from_str(text);
    loop {
        match reader.read_event() {
            Ok(Event::Decl(decl)) => {
                return decl
                    .encoding()
                    .and_then(|enc| enc.ok())
                    .map(|enc| String::from_utf8_lossy(&enc).into_owned())
            }
            Ok(Event::Start(_)) | Ok(Event::Empty(_)) | Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

fn truncate_message(message: String) -> String {
    let len = message.chars().count();
    if len <= MAX_MESSAGE_CHARS {
        return message;
    }
    let head: String = message.chars().take(70).collect();
    let tail: String = message.chars().skip(len - 69).collect();
    format!("{head}...{tail}")
}
