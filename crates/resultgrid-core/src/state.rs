//! The serialized grid: column-major, sparse, run-length-encoded.
//!
//! These messages are the wire shape the viewer consumes (protobuf
//! encoding, tags declared inline). `Row.results` alternates
//! `[result, count, ...]` pairs; each metric's `indices` alternates
//! `[start, length, ...]` spans over the row's occupied cells.

/// One build's header entry in the grid.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Column {
    /// Build directory basename.
    #[prost(string, tag = "1")]
    pub build: String,
    /// Build start time in epoch milliseconds.
    #[prost(double, tag = "2")]
    pub started: f64,
    /// One value per configured column header.
    #[prost(string, repeated, tag = "3")]
    pub extra: Vec<String>,
}

/// One test's history across every column.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Row {
    /// Unique display name.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Canonical (pre-disambiguation) test name.
    #[prost(string, tag = "2")]
    pub id: String,
    /// RLE pairs: `[result, count, result, count, ...]`.
    #[prost(int32, repeated, tag = "3")]
    pub results: Vec<i32>,
    /// Per occupied cell: the originating build id.
    #[prost(string, repeated, tag = "4")]
    pub cell_ids: Vec<String>,
    /// Per occupied cell, possibly empty.
    #[prost(string, repeated, tag = "5")]
    pub messages: Vec<String>,
    /// Per occupied cell, single character or empty.
    #[prost(string, repeated, tag = "6")]
    pub icons: Vec<String>,
    #[prost(message, repeated, tag = "7")]
    pub metrics: Vec<Metric>,
}

/// Sparse numeric values attached to a row's cells.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Metric {
    #[prost(string, tag = "1")]
    pub name: String,
    /// RLE spans: `[start, length, start, length, ...]`.
    #[prost(int32, repeated, tag = "2")]
    pub indices: Vec<i32>,
    /// One value per filled index, in span order.
    #[prost(double, repeated, tag = "3")]
    pub values: Vec<f64>,
}

/// The aggregate for one test group.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Grid {
    /// Newest build first.
    #[prost(message, repeated, tag = "1")]
    pub columns: Vec<Column>,
    /// Sorted by natural order of name.
    #[prost(message, repeated, tag = "2")]
    pub rows: Vec<Row>,
}

/// Cell outcomes, numbered as the viewer expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum RowResult {
    NoResult = 0,
    Pass = 1,
    PassWithErrors = 2,
    PassWithSkips = 3,
    Running = 4,
    Fail = 12,
    Flaky = 13,
}

