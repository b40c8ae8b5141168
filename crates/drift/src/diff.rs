//! Schema diffing - compare two database snapshots.
//!
//! [`SchemaDiff::compare`] walks the union of both snapshots' tables in
//! lexicographic order and records three kinds of [`Drift`]:
//!
//! - a table that exists on one side only,
//! - a column that exists on one side only (for tables present on both),
//! - a column present on both sides whose type, nullability or length differ.
//!
//! Every drift renders as an `-- ISSUE:` comment, a `-- SOLUTION:` comment and
//! one SQL statement. Missing tables and columns are recreated from the side
//! that has them. Mismatched columns are always harmonized toward the left
//! snapshot's definition, whichever side is actually newer:
//!
//! ```sql
//! -- ISSUE: Difference in orders.amount : prod={name=amount, type=numeric, nullable=YES, max_length=NULL} vs staging={name=amount, type=numeric, nullable=NO, max_length=NULL}
//! -- SOLUTION: Harmonize staging.orders.amount to match prod
//! ALTER TABLE orders ALTER COLUMN amount NUMERIC NULL;
//! ```

use crate::report::Reports;
use drift_schema::{ColumnDescriptor, SchemaSnapshot};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One of the two databases being compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The first snapshot, whose definitions win on mismatch
    Left,
    /// The second snapshot
    Right,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// Display names for the two databases, used in issue and solution comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    pub left: String,
    pub right: String,
}

impl Labels {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn get(&self, side: Side) -> &str {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

impl Default for Labels {
    fn default() -> Self {
        Self::new("DB1", "DB2")
    }
}

/// The report a drift is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReportKind {
    /// Missing tables (`CREATE TABLE`)
    Tables,
    /// Missing columns (`ALTER TABLE ... ADD`)
    Columns,
    /// Mismatched columns (`ALTER TABLE ... ALTER COLUMN`)
    Diff,
}

impl ReportKind {
    pub const ALL: [ReportKind; 3] = [ReportKind::Tables, ReportKind::Columns, ReportKind::Diff];
}

/// A single structural disagreement between the two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum Drift {
    /// A table exists on one side only.
    MissingTable {
        table: String,
        missing_from: Side,
        /// Columns of the side that has the table, in stored order
        columns: Vec<ColumnDescriptor>,
    },
    /// A column exists on one side only.
    MissingColumn {
        table: String,
        column: ColumnDescriptor,
        missing_from: Side,
    },
    /// A column exists on both sides with different definitions.
    ColumnMismatch {
        table: String,
        left: ColumnDescriptor,
        right: ColumnDescriptor,
    },
}

impl Drift {
    pub fn table(&self) -> &str {
        match self {
            Drift::MissingTable { table, .. }
            | Drift::MissingColumn { table, .. }
            | Drift::ColumnMismatch { table, .. } => table,
        }
    }

    pub fn kind(&self) -> ReportKind {
        match self {
            Drift::MissingTable { .. } => ReportKind::Tables,
            Drift::MissingColumn { .. } => ReportKind::Columns,
            Drift::ColumnMismatch { .. } => ReportKind::Diff,
        }
    }

    /// The `-- ISSUE:` comment line, without a trailing newline.
    pub fn issue(&self, labels: &Labels) -> String {
        match self {
            Drift::MissingTable {
                table,
                missing_from,
                ..
            } => format!(
                "-- ISSUE: Table {} exists in {} but is missing in {}",
                table,
                labels.get(missing_from.other()),
                labels.get(*missing_from)
            ),
            Drift::MissingColumn {
                table,
                column,
                missing_from,
            } => format!(
                "-- ISSUE: Column {} in {}.{} is missing in {}",
                column.name,
                labels.get(missing_from.other()),
                table,
                labels.get(*missing_from)
            ),
            Drift::ColumnMismatch { table, left, right } => format!(
                "-- ISSUE: Difference in {}.{} : {}={} vs {}={}",
                table, left.name, labels.left, left, labels.right, right
            ),
        }
    }

    /// The `-- SOLUTION:` comment line, without a trailing newline.
    pub fn solution(&self, labels: &Labels) -> String {
        match self {
            Drift::MissingTable {
                table,
                missing_from,
                ..
            } => format!(
                "-- SOLUTION: Create table {} in {}",
                table,
                labels.get(*missing_from)
            ),
            Drift::MissingColumn { missing_from, .. } => {
                format!("-- SOLUTION: Add the column in {}", labels.get(*missing_from))
            }
            Drift::ColumnMismatch { table, left, .. } => format!(
                "-- SOLUTION: Harmonize {}.{}.{} to match {}",
                labels.right, table, left.name, labels.left
            ),
        }
    }

    /// The remediation statement.
    pub fn to_sql(&self) -> String {
        match self {
            Drift::MissingTable { table, columns, .. } => {
                let defs: Vec<String> = columns.iter().map(|c| c.sql_definition()).collect();
                format!("CREATE TABLE {} (\n    {}\n);", table, defs.join(",\n    "))
            }
            Drift::MissingColumn { table, column, .. } => {
                format!("ALTER TABLE {} ADD {};", table, column.sql_definition())
            }
            Drift::ColumnMismatch { table, left, .. } => {
                format!("ALTER TABLE {} ALTER COLUMN {};", table, left.sql_definition())
            }
        }
    }

    /// Issue, solution and statement, followed by a blank line.
    pub fn render(&self, labels: &Labels) -> String {
        format!(
            "{}\n{}\n{}\n\n",
            self.issue(labels),
            self.solution(labels),
            self.to_sql()
        )
    }
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Drift::MissingTable {
                table,
                missing_from,
                columns,
            } => write!(
                f,
                "- table {} ({} columns, missing on {})",
                table,
                columns.len(),
                missing_from
            ),
            Drift::MissingColumn {
                table,
                column,
                missing_from,
            } => write!(
                f,
                "- {}.{}: {} (missing on {})",
                table,
                column.name,
                column.sql_type(),
                missing_from
            ),
            Drift::ColumnMismatch { table, left, right } => write!(
                f,
                "~ {}.{}: {} {} -> {} {}",
                table,
                left.name,
                right.sql_type(),
                right.null_constraint(),
                left.sql_type(),
                left.null_constraint()
            ),
        }
    }
}

/// Per-report drift counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriftSummary {
    pub missing_tables: usize,
    pub missing_columns: usize,
    pub column_mismatches: usize,
}

impl DriftSummary {
    pub fn total(&self) -> usize {
        self.missing_tables + self.missing_columns + self.column_mismatches
    }
}

impl fmt::Display for DriftSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} missing tables, {} missing columns, {} column differences",
            self.missing_tables, self.missing_columns, self.column_mismatches
        )
    }
}

/// The drift between two snapshots, in emission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDiff {
    pub drifts: Vec<Drift>,
}

impl SchemaDiff {
    /// Compare two snapshots.
    ///
    /// This is a pure function of its inputs: the same snapshots always give
    /// the same drifts in the same order.
    pub fn compare(left: &SchemaSnapshot, right: &SchemaSnapshot) -> SchemaDiff {
        let mut drifts = Vec::new();

        let all_tables: BTreeSet<&str> = left.table_names().chain(right.table_names()).collect();

        for table in all_tables {
            match (left.table(table), right.table(table)) {
                (None, Some(columns)) => drifts.push(Drift::MissingTable {
                    table: table.to_string(),
                    missing_from: Side::Left,
                    columns: columns.to_vec(),
                }),
                (Some(columns), None) => drifts.push(Drift::MissingTable {
                    table: table.to_string(),
                    missing_from: Side::Right,
                    columns: columns.to_vec(),
                }),
                (Some(left_cols), Some(right_cols)) => {
                    diff_columns(table, left_cols, right_cols, &mut drifts)
                }
                (None, None) => {}
            }
        }

        SchemaDiff { drifts }
    }

    /// Returns true if there are no differences.
    pub fn is_empty(&self) -> bool {
        self.drifts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.drifts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Drift> {
        self.drifts.iter()
    }

    /// Drifts that belong to one report.
    pub fn of_kind(&self, kind: ReportKind) -> impl Iterator<Item = &Drift> {
        self.drifts.iter().filter(move |d| d.kind() == kind)
    }

    pub fn summary(&self) -> DriftSummary {
        let mut summary = DriftSummary::default();
        for drift in &self.drifts {
            match drift.kind() {
                ReportKind::Tables => summary.missing_tables += 1,
                ReportKind::Columns => summary.missing_columns += 1,
                ReportKind::Diff => summary.column_mismatches += 1,
            }
        }
        summary
    }

    /// Render the three reports.
    pub fn render(&self, labels: &Labels) -> Reports {
        let mut reports = Reports::default();
        for drift in &self.drifts {
            reports.push(drift.kind(), &drift.render(labels));
        }
        reports
    }
}

/// Diff the columns of a table present on both sides.
fn diff_columns(
    table: &str,
    left: &[ColumnDescriptor],
    right: &[ColumnDescriptor],
    drifts: &mut Vec<Drift>,
) {
    // Keyed by name; a duplicate name keeps its last definition.
    let left_cols: BTreeMap<&str, &ColumnDescriptor> =
        left.iter().map(|c| (c.name.as_str(), c)).collect();
    let right_cols: BTreeMap<&str, &ColumnDescriptor> =
        right.iter().map(|c| (c.name.as_str(), c)).collect();

    for (name, column) in &left_cols {
        if !right_cols.contains_key(name) {
            drifts.push(Drift::MissingColumn {
                table: table.to_string(),
                column: (*column).clone(),
                missing_from: Side::Right,
            });
        }
    }

    for (name, column) in &right_cols {
        if !left_cols.contains_key(name) {
            drifts.push(Drift::MissingColumn {
                table: table.to_string(),
                column: (*column).clone(),
                missing_from: Side::Left,
            });
        }
    }

    for (name, left_col) in &left_cols {
        if let Some(right_col) = right_cols.get(name) {
            if !left_col.same_definition(right_col) {
                drifts.push(Drift::ColumnMismatch {
                    table: table.to_string(),
                    left: (*left_col).clone(),
                    right: (*right_col).clone(),
                });
            }
        }
    }
}
