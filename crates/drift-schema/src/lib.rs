//! Column metadata types for drift.
//!
//! This crate contains the data model shared by the schema reader and the
//! differ in `drift`, plus the rules that turn a column into SQL text.
//!
//! A [`SchemaSnapshot`] maps table names to the ordered list of columns read
//! from one database. Column order is whatever the catalog query returned; the
//! differ looks columns up by name and never relies on it.
//!
//! ```
//! use drift_schema::{ColumnDescriptor, SchemaSnapshot};
//!
//! let mut snapshot = SchemaSnapshot::new();
//! snapshot.push_column("users", ColumnDescriptor::new("id", "int4", false));
//! snapshot.push_column(
//!     "users",
//!     ColumnDescriptor::new("email", "varchar", true).with_max_length(255),
//! );
//!
//! let email = &snapshot.table("users").unwrap()[1];
//! assert_eq!(email.sql_definition(), "email VARCHAR(255) NULL");
//! ```

use indexmap::IndexMap;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Base types whose declared maximum length is part of the rendered SQL type.
pub const CHARACTER_TYPES: &[&str] = &["CHAR", "VARCHAR", "NVARCHAR"];

/// Columns of one table, in the order the catalog returned them.
pub type TableSchema = Vec<ColumnDescriptor>;

/// Metadata for a single column, as read from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Column name, unique within its table
    pub name: String,
    /// Base type name as reported by the catalog (e.g. `varchar`, `int4`)
    pub data_type: String,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Declared maximum length, only present for character types
    pub max_length: Option<i32>,
}

impl ColumnDescriptor {
    /// Create a column without a maximum length.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            max_length: None,
        }
    }

    /// Set the declared maximum length.
    pub fn with_max_length(mut self, max_length: i32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// The canonical SQL type of this column.
    pub fn sql_type(&self) -> SqlType {
        SqlType::of(self)
    }

    /// `NULL` or `NOT NULL`.
    pub fn null_constraint(&self) -> &'static str {
        if self.nullable { "NULL" } else { "NOT NULL" }
    }

    /// Render `name TYPE NULL|NOT NULL`.
    ///
    /// Every generated statement that spells out a column goes through this.
    pub fn sql_definition(&self) -> String {
        format!(
            "{} {} {}",
            self.name,
            self.sql_type(),
            self.null_constraint()
        )
    }

    /// Returns true if both columns declare the same type, nullability and
    /// length. Names are not compared.
    pub fn same_definition(&self, other: &ColumnDescriptor) -> bool {
        self.data_type == other.data_type
            && self.nullable == other.nullable
            && self.max_length == other.max_length
    }
}

/// The full raw definition, as shown in issue comments.
///
/// `{name=amount, type=numeric, nullable=YES, max_length=NULL}`
impl fmt::Display for ColumnDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{name={}, type={}, nullable={}, max_length=",
            self.name,
            self.data_type,
            is_nullable_text(self.nullable)
        )?;
        match self.max_length {
            Some(len) => write!(f, "{}}}", len),
            None => write!(f, "NULL}}"),
        }
    }
}

/// Parse the catalog's `IS_NULLABLE` text.
///
/// Returns `None` for anything other than `YES` or `NO`.
pub fn parse_is_nullable(value: &str) -> Option<bool> {
    match value {
        "YES" => Some(true),
        "NO" => Some(false),
        _ => None,
    }
}

/// The catalog spelling of a nullability flag.
pub fn is_nullable_text(nullable: bool) -> &'static str {
    if nullable { "YES" } else { "NO" }
}

/// A column type as it appears in generated SQL.
///
/// Displaying a `SqlType` uppercases the base name. The length is appended
/// only for [`CHARACTER_TYPES`], and only when one is present: `VARCHAR(50)`,
/// `CHAR`, `INT4`. Parsing accepts `TYPE` and `TYPE(<n>)` and keeps whatever
/// it finds, so `"int4(3)".parse()` yields a length that display then drops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlType {
    /// Base type name
    pub base: String,
    /// Declared length, if any
    pub length: Option<i32>,
}

impl SqlType {
    pub fn new(base: impl Into<String>, length: Option<i32>) -> Self {
        Self {
            base: base.into(),
            length,
        }
    }

    pub fn of(column: &ColumnDescriptor) -> Self {
        Self::new(column.data_type.clone(), column.max_length)
    }

    /// Returns true if the base type belongs to the character family.
    pub fn is_character(&self) -> bool {
        let upper = self.base.to_uppercase();
        CHARACTER_TYPES.contains(&upper.as_str())
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let upper = self.base.to_uppercase();
        match self.length {
            Some(len) if self.is_character() => write!(f, "{}({})", upper, len),
            _ => f.write_str(&upper),
        }
    }
}

/// Errors from parsing a rendered SQL type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseSqlTypeError {
    #[error("empty type name")]
    Empty,

    #[error("unbalanced parenthesis in type `{0}`")]
    UnbalancedParenthesis(String),

    #[error("invalid length in type `{input}`: {source}")]
    InvalidLength {
        input: String,
        #[source]
        source: ParseIntError,
    },
}

impl FromStr for SqlType {
    type Err = ParseSqlTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseSqlTypeError::Empty);
        }

        let Some((base, rest)) = s.split_once('(') else {
            if s.contains(')') {
                return Err(ParseSqlTypeError::UnbalancedParenthesis(s.to_string()));
            }
            return Ok(SqlType::new(s, None));
        };

        let base = base.trim();
        if base.is_empty() {
            return Err(ParseSqlTypeError::Empty);
        }

        let length = rest
            .strip_suffix(')')
            .filter(|inner| !inner.contains(['(', ')']))
            .ok_or_else(|| ParseSqlTypeError::UnbalancedParenthesis(s.to_string()))?;

        let length = length
            .trim()
            .parse::<i32>()
            .map_err(|source| ParseSqlTypeError::InvalidLength {
                input: s.to_string(),
                source,
            })?;

        Ok(SqlType::new(base, Some(length)))
    }
}

/// Table metadata captured from one database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    /// Columns per table, in insertion order
    pub tables: IndexMap<String, TableSchema>,
}

impl SchemaSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column to a table, creating the table on first use.
    pub fn push_column(&mut self, table: impl Into<String>, column: ColumnDescriptor) {
        self.tables.entry(table.into()).or_default().push(column);
    }

    /// Get the columns of a table.
    pub fn table(&self, name: &str) -> Option<&[ColumnDescriptor]> {
        self.tables.get(name).map(Vec::as_slice)
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Table names in insertion order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Number of columns across all tables.
    pub fn column_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }
}

impl FromIterator<(String, ColumnDescriptor)> for SchemaSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, ColumnDescriptor)>>(iter: I) -> Self {
        let mut snapshot = SchemaSnapshot::new();
        snapshot.extend(iter);
        snapshot
    }
}

impl Extend<(String, ColumnDescriptor)> for SchemaSnapshot {
    fn extend<I: IntoIterator<Item = (String, ColumnDescriptor)>>(&mut self, iter: I) {
        for (table, column) in iter {
            self.push_column(table, column);
        }
    }
}
