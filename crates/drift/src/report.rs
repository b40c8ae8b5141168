//! Report artifacts and the progress channel.
//!
//! A run produces three SQL files, one per [`ReportKind`]. Prior copies are
//! removed with [`OutputPaths::clear`] before any database is read, so a
//! failed run never leaves stale reports behind.

use crate::diff::{Drift, ReportKind};
use crate::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::File;
use std::io::{BufWriter, Write};
use tracing::info;

pub const TABLES_FILE: &str = "missing_tables.sql";
pub const COLUMNS_FILE: &str = "missing_columns.sql";
pub const DIFF_FILE: &str = "columns_diff.sql";

/// The rendered text of the three reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reports {
    /// `CREATE TABLE` statements for missing tables
    pub tables: String,
    /// `ALTER TABLE ... ADD` statements for missing columns
    pub columns: String,
    /// `ALTER TABLE ... ALTER COLUMN` statements for mismatched columns
    pub diff: String,
}

impl Reports {
    pub fn get(&self, kind: ReportKind) -> &str {
        match kind {
            ReportKind::Tables => &self.tables,
            ReportKind::Columns => &self.columns,
            ReportKind::Diff => &self.diff,
        }
    }

    /// Append a rendered block to one report.
    pub fn push(&mut self, kind: ReportKind, block: &str) {
        let report = match kind {
            ReportKind::Tables => &mut self.tables,
            ReportKind::Columns => &mut self.columns,
            ReportKind::Diff => &mut self.diff,
        };
        report.push_str(block);
    }

    /// Write all three reports.
    ///
    /// Each report goes to a sibling `.tmp` file first. Only once all three
    /// are written and closed are they renamed into place, so a failed write
    /// leaves no partial set behind.
    pub fn write(&self, paths: &OutputPaths) -> Result<()> {
        let mut staged: Vec<(Utf8PathBuf, &Utf8Path)> = Vec::with_capacity(ReportKind::ALL.len());
        for (kind, path) in paths.iter() {
            let tmp = staging_path(path);
            if let Err(e) = write_file(&tmp, path, self.get(kind)) {
                let _ = std::fs::remove_file(&tmp);
                for (tmp, _) in &staged {
                    let _ = std::fs::remove_file(tmp);
                }
                return Err(e);
            }
            staged.push((tmp, path));
        }

        for (tmp, path) in &staged {
            std::fs::rename(tmp, path).map_err(|source| io_error(path, source))?;
            info!(path = %path, "wrote report");
        }

        Ok(())
    }
}

fn staging_path(path: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{}.tmp", path))
}

/// Write `contents` to `tmp`; errors name the final report `path`.
fn write_file(tmp: &Utf8Path, path: &Utf8Path, contents: &str) -> Result<()> {
    let file = File::create(tmp).map_err(|source| io_error(path, source))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(contents.as_bytes())
        .and_then(|()| writer.flush())
        .map_err(|source| io_error(path, source))
}

/// Where the three reports go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub tables: Utf8PathBuf,
    pub columns: Utf8PathBuf,
    pub diff: Utf8PathBuf,
}

impl Default for OutputPaths {
    /// The default file names, relative to the working directory.
    fn default() -> Self {
        Self {
            tables: TABLES_FILE.into(),
            columns: COLUMNS_FILE.into(),
            diff: DIFF_FILE.into(),
        }
    }
}

impl OutputPaths {
    /// The default file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Utf8Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            tables: dir.join(TABLES_FILE),
            columns: dir.join(COLUMNS_FILE),
            diff: dir.join(DIFF_FILE),
        }
    }

    pub fn get(&self, kind: ReportKind) -> &Utf8Path {
        match kind {
            ReportKind::Tables => &self.tables,
            ReportKind::Columns => &self.columns,
            ReportKind::Diff => &self.diff,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ReportKind, &Utf8Path)> {
        ReportKind::ALL
            .into_iter()
            .map(move |kind| (kind, self.get(kind)))
    }

    /// Remove prior copies of the reports.
    ///
    /// Missing files are skipped. Returns the paths that were removed.
    pub fn clear(&self) -> Result<Vec<Utf8PathBuf>> {
        let mut removed = Vec::new();
        for (_, path) in self.iter() {
            match std::fs::remove_file(path) {
                Ok(()) => {
                    info!(path = %path, "old file removed");
                    removed.push(path.to_owned());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(io_error(path, source)),
            }
        }
        Ok(removed)
    }
}

fn io_error(path: &Utf8Path, source: std::io::Error) -> Error {
    Error::Io {
        path: path.to_owned(),
        source,
    }
}

/// Live, operator-facing echo of every issue found.
pub trait Progress {
    /// Called once per drift with its issue line, trailing whitespace stripped.
    fn issue(&mut self, drift: &Drift, line: &str);
}

/// Discard progress.
impl Progress for () {
    fn issue(&mut self, _drift: &Drift, _line: &str) {}
}

/// Collect issue lines.
impl Progress for Vec<String> {
    fn issue(&mut self, _drift: &Drift, line: &str) {
        self.push(line.to_string());
    }
}

/// Write one issue per line to any writer.
pub struct WriteProgress<W: Write>(pub W);

impl<W: Write> Progress for WriteProgress<W> {
    fn issue(&mut self, _drift: &Drift, line: &str) {
        if let Err(e) = writeln!(self.0, "{}", line) {
            tracing::warn!(error = %e, "could not write progress");
        }
    }
}
