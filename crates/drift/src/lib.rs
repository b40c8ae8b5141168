//! Compare two Postgres schemas and generate remediation SQL.
//!
//! This crate provides:
//! - Schema introspection from `information_schema.columns`
//! - A deterministic diff between two snapshots (missing tables, missing
//!   columns, mismatched column definitions)
//! - Three SQL reports with `-- ISSUE:` / `-- SOLUTION:` annotations
//!
//! A run reads both databases, compares them, and writes the reports:
//!
//! ```ignore
//! let outputs = OutputPaths::default();
//! outputs.clear()?;
//!
//! let left = drift::read_schema(left_url, &SchemaFilter::all()).await?;
//! let right = drift::read_schema(right_url, &SchemaFilter::all()).await?;
//!
//! let mut progress = WriteProgress(std::io::stdout());
//! let diff = drift::compare_schemas(&left, &right, &Labels::default(), &outputs, &mut progress)?;
//! println!("{}", diff.summary());
//! ```
//!
//! Generated SQL is never executed. Mismatched columns are always harmonized
//! toward the left snapshot.

mod diff;
mod error;
mod introspect;
pub mod report;
pub mod traced;

pub use diff::{Drift, DriftSummary, Labels, ReportKind, SchemaDiff, Side};
pub use error::Error;
pub use introspect::{
    CATALOG_QUERY, CatalogRow, SchemaFilter, introspect, mask_password, read_schema,
    snapshot_from_rows,
};
pub use report::{OutputPaths, Progress, Reports, WriteProgress};
pub use traced::{Connection, ConnectionExt, TracedConn};

pub use drift_schema::{
    CHARACTER_TYPES, ColumnDescriptor, ParseSqlTypeError, SchemaSnapshot, SqlType, TableSchema,
};

/// Result type for drift operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Compare two snapshots, echo each issue to `progress`, and write the three
/// reports to `outputs`.
///
/// The reports are written even when there is no drift, so a clean run leaves
/// three empty files.
pub fn compare_schemas(
    left: &SchemaSnapshot,
    right: &SchemaSnapshot,
    labels: &Labels,
    outputs: &OutputPaths,
    progress: &mut dyn Progress,
) -> Result<SchemaDiff> {
    let diff = SchemaDiff::compare(left, right);

    for drift in diff.iter() {
        tracing::debug!(%drift, "drift");
        progress.issue(drift, drift.issue(labels).trim_end());
    }

    diff.render(labels).write(outputs)?;

    let summary = diff.summary();
    tracing::info!(
        missing_tables = summary.missing_tables,
        missing_columns = summary.missing_columns,
        column_mismatches = summary.column_mismatches,
        "comparison complete"
    );

    Ok(diff)
}
