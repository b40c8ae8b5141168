use camino::Utf8PathBuf;
use clap::Parser;
use drift::{Drift, DriftSummary, Labels, OutputPaths, Progress, ReportKind, SchemaFilter, Side};
use owo_colors::OwoColorize;
use std::fmt;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{Config, ConfigError};

/// Compare two Postgres schemas and write remediation SQL.
///
/// Writes missing_tables.sql, missing_columns.sql and columns_diff.sql.
/// Columns that differ are always harmonized toward the left database.
#[derive(Parser, Debug)]
#[command(name = "drift", version)]
struct Cli {
    /// Connection string for the first database
    #[arg(long, value_name = "URL", env = "DRIFT_LEFT_URL", hide_env_values = true)]
    left: Option<String>,

    /// Connection string for the second database
    #[arg(long, value_name = "URL", env = "DRIFT_RIGHT_URL", hide_env_values = true)]
    right: Option<String>,

    /// Name of the first database in report comments [default: DB1]
    #[arg(long, value_name = "NAME")]
    left_label: Option<String>,

    /// Name of the second database in report comments [default: DB2]
    #[arg(long, value_name = "NAME")]
    right_label: Option<String>,

    /// Only read tables in this schema (repeatable)
    #[arg(long = "schema", value_name = "NAME")]
    schemas: Vec<String>,

    /// Directory for the report files [default: .]
    #[arg(long, value_name = "DIR")]
    out_dir: Option<String>,

    /// Config file [default: .config/drift.toml in this or a parent directory]
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(
        "no connection string for the {side} database (pass --{side}, set {env}, or add [{side}] url to .config/drift.toml)"
    )]
    MissingDescriptor { side: Side, env: &'static str },

    #[error(transparent)]
    Drift(#[from] drift::Error),
}

/// Everything a run needs, after flags, environment and config file are merged.
#[derive(Debug)]
struct Settings {
    left_url: String,
    right_url: String,
    labels: Labels,
    filter: SchemaFilter,
    outputs: OutputPaths,
}

impl Settings {
    fn resolve(cli: Cli, config: Config) -> Result<Self, CliError> {
        let left_url = cli
            .left
            .or(config.left.url)
            .ok_or(CliError::MissingDescriptor {
                side: Side::Left,
                env: "DRIFT_LEFT_URL",
            })?;
        let right_url = cli
            .right
            .or(config.right.url)
            .ok_or(CliError::MissingDescriptor {
                side: Side::Right,
                env: "DRIFT_RIGHT_URL",
            })?;

        let defaults = Labels::default();
        let labels = Labels::new(
            cli.left_label.or(config.left.label).unwrap_or(defaults.left),
            cli.right_label
                .or(config.right.label)
                .unwrap_or(defaults.right),
        );

        let schemas = if cli.schemas.is_empty() {
            config.schemas
        } else {
            cli.schemas
        };

        let outputs = cli
            .out_dir
            .or(config.output.dir)
            .map(|dir| OutputPaths::in_dir(Utf8PathBuf::from(dir)))
            .unwrap_or_default();

        Ok(Self {
            left_url,
            right_url,
            labels,
            filter: SchemaFilter::only(schemas),
            outputs,
        })
    }
}

/// Prints each issue as it is found, colored by report.
///
/// Output errors (a closed pipe, a full disk) are logged once and the run
/// carries on, so the reports still get written.
struct ConsolePrinter<W: Write> {
    out: W,
    color: bool,
    failed: bool,
}

impl<W: Write> ConsolePrinter<W> {
    fn new(out: W, color: bool) -> Self {
        Self {
            out,
            color,
            failed: false,
        }
    }

    fn line(&mut self, text: impl fmt::Display) {
        if self.failed {
            return;
        }
        if let Err(e) = writeln!(self.out, "{}", text) {
            warn!(error = %e, "could not write to stdout");
            self.failed = true;
        }
    }
}

impl<W: Write> Progress for ConsolePrinter<W> {
    fn issue(&mut self, drift: &Drift, line: &str) {
        if !self.color {
            self.line(line);
            return;
        }
        match drift.kind() {
            ReportKind::Tables => self.line(line.red()),
            ReportKind::Columns => self.line(line.yellow()),
            ReportKind::Diff => self.line(line.cyan()),
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn,drift=info,drift_cli=info",
        1 => "warn,drift=debug,drift_cli=debug",
        _ => "debug,drift=trace,drift_cli=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

async fn run(cli: Cli) -> Result<DriftSummary, CliError> {
    let (config, config_path) = config::load(cli.config.as_deref())?;
    if let Some(path) = &config_path {
        debug!(path = %path.display(), "loaded config");
    }

    let settings = Settings::resolve(cli, config)?;
    debug!(
        left = %drift::mask_password(&settings.left_url),
        right = %drift::mask_password(&settings.right_url),
        schemas = ?settings.filter.schemas(),
        "resolved settings"
    );

    // Stale reports go first, so a failed read leaves nothing behind.
    settings.outputs.clear()?;

    let left = drift::read_schema(&settings.left_url, &settings.filter).await?;
    let right = drift::read_schema(&settings.right_url, &settings.filter).await?;

    let stdout = std::io::stdout();
    let color = stdout.is_terminal();
    let mut printer = ConsolePrinter::new(stdout.lock(), color);
    let diff = drift::compare_schemas(
        &left,
        &right,
        &settings.labels,
        &settings.outputs,
        &mut printer,
    )?;

    let summary = diff.summary();
    if diff.is_empty() {
        let message = "No drift detected.";
        if color {
            printer.line(message.green());
        } else {
            printer.line(message);
        }
    } else {
        printer.line("");
        printer.line(summary);
    }
    for (_, path) in settings.outputs.iter() {
        printer.line(format_args!("  wrote {}", path));
    }

    Ok(summary)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use config::DatabaseConfig;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("drift").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_win_over_config() {
        let cli = parse(&[
            "--left",
            "postgres://a@one/db",
            "--right",
            "postgres://a@two/db",
            "--left-label",
            "prod",
            "--schema",
            "public",
            "--out-dir",
            "reports",
        ]);
        let config = Config {
            left: DatabaseConfig {
                url: Some("postgres://ignored/db".to_string()),
                label: Some("ignored".to_string()),
            },
            right: DatabaseConfig {
                url: None,
                label: Some("staging".to_string()),
            },
            schemas: vec!["billing".to_string()],
            ..Config::default()
        };

        let settings = Settings::resolve(cli, config).unwrap();
        assert_eq!(settings.left_url, "postgres://a@one/db");
        assert_eq!(settings.right_url, "postgres://a@two/db");
        assert_eq!(settings.labels, Labels::new("prod", "staging"));
        assert_eq!(settings.filter, SchemaFilter::only(["public"]));
        assert_eq!(settings.outputs, OutputPaths::in_dir("reports"));
    }

    #[test]
    fn test_config_fills_gaps_and_defaults_apply() {
        let cli = parse(&["--left", "postgres://a@one/db"]);
        let config = Config {
            right: DatabaseConfig {
                url: Some("postgres://a@two/db".to_string()),
                label: None,
            },
            ..Config::default()
        };

        let settings = Settings::resolve(cli, config).unwrap();
        assert_eq!(settings.right_url, "postgres://a@two/db");
        assert_eq!(settings.labels, Labels::default());
        assert_eq!(settings.filter, SchemaFilter::all());
        assert_eq!(settings.outputs, OutputPaths::default());
    }

    #[test]
    fn test_missing_descriptor() {
        let cli = parse(&["--left", "postgres://a@one/db"]);
        let err = Settings::resolve(cli, Config::default()).unwrap_err();
        assert!(matches!(
            err,
            CliError::MissingDescriptor {
                side: Side::Right,
                ..
            }
        ));
        assert!(err.to_string().contains("--right"));
        assert!(err.to_string().contains("DRIFT_RIGHT_URL"));
    }

    /// A writer whose reader has gone away.
    struct ClosedPipe {
        attempts: usize,
    }

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            self.attempts += 1;
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn missing_table() -> Drift {
        Drift::MissingTable {
            table: "users".to_string(),
            missing_from: Side::Right,
            columns: vec![],
        }
    }

    #[test]
    fn test_console_printer_survives_closed_pipe() {
        let mut printer = ConsolePrinter::new(ClosedPipe { attempts: 0 }, false);
        let drift = missing_table();
        for _ in 0..1000 {
            printer.issue(&drift, "-- ISSUE: Table users exists in DB1 but is missing in DB2");
        }
        printer.line("done");

        assert!(printer.failed);
        assert_eq!(printer.out.attempts, 1, "stops writing after the first failure");
    }

    #[test]
    fn test_console_printer_plain_output() {
        let mut printer = ConsolePrinter::new(Vec::new(), false);
        printer.issue(&missing_table(), "-- ISSUE: one");
        printer.line(format_args!("  wrote {}", "missing_tables.sql"));

        assert_eq!(
            String::from_utf8(printer.out).unwrap(),
            "-- ISSUE: one\n  wrote missing_tables.sql\n"
        );
    }

    #[test]
    fn test_repeated_schema_flag() {
        let cli = parse(&["--schema", "public", "--schema", "billing", "-vv"]);
        assert_eq!(cli.schemas, vec!["public", "billing"]);
        assert_eq!(cli.verbose, 2);
    }
}
