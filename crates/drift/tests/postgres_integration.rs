//! Integration tests against real PostgreSQL.
//!
//! These tests verify that:
//! 1. The catalog query reads user tables with the expected type names
//! 2. The connection is released and errors surface as `Error::Connection`
//! 3. A full run over two databases produces the expected reports
//!
//! Run with: cargo nextest run -p drift --test postgres_integration --run-ignored all
//!
//! Note: Tests marked `#[ignore]` require Docker to be running.

use drift::{
    ColumnDescriptor, Error, Labels, OutputPaths, SchemaFilter, compare_schemas, introspect,
    read_schema,
};
use std::time::Duration;
use testcontainers_modules::postgres::Postgres;
use testcontainers_modules::testcontainers::ContainerAsync;
use testcontainers_modules::testcontainers::runners::AsyncRunner;
use tokio_postgres::{Client, NoTls};

/// Start a PostgreSQL container and return it with a base connection string.
async fn setup_postgres() -> (ContainerAsync<Postgres>, String) {
    let container = Postgres::default()
        .start()
        .await
        .expect("failed to start postgres container");
    let host = container.get_host().await.expect("no container host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("postgres port not available");

    let base = format!("host={} port={} user=postgres password=postgres", host, port);
    (container, base)
}

/// Connect with retries (postgres may not be fully ready even after the port is open).
async fn connect(base: &str, dbname: &str) -> Client {
    let conn_str = format!("{} dbname={}", base, dbname);

    let mut attempts = 0;
    let max_attempts = 10;
    let (client, connection) = loop {
        attempts += 1;
        match tokio_postgres::connect(&conn_str, NoTls).await {
            Ok(result) => break result,
            Err(e) if attempts < max_attempts => {
                eprintln!("connection attempt {} failed: {}, retrying...", attempts, e);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Err(e) => panic!(
                "failed to connect to postgres after {} attempts: {}",
                attempts, e
            ),
        }
    };

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("connection error: {}", e);
        }
    });

    client
}

async fn create_database(base: &str, name: &str, ddl: &str) {
    let admin = connect(base, "postgres").await;
    admin
        .batch_execute(&format!("CREATE DATABASE {}", name))
        .await
        .expect("failed to create database");

    let client = connect(base, name).await;
    client.batch_execute(ddl).await.expect("failed to run ddl");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_introspect_reads_user_tables() {
    let (_container, base) = setup_postgres().await;
    let client = connect(&base, "postgres").await;

    client
        .batch_execute(
            r#"
            CREATE TABLE product (
                id BIGSERIAL PRIMARY KEY,
                handle VARCHAR(50) NOT NULL,
                country CHAR(2),
                price NUMERIC(10, 2) NOT NULL,
                description TEXT
            );
            "#,
        )
        .await
        .expect("failed to create tables");

    let snapshot = introspect(&client, &SchemaFilter::all())
        .await
        .expect("introspection failed");

    assert_eq!(snapshot.table_names().collect::<Vec<_>>(), vec!["product"]);

    // Rows come back sorted by column name.
    let columns = snapshot.table("product").unwrap();
    assert_eq!(
        columns,
        &[
            ColumnDescriptor::new("country", "char", true).with_max_length(2),
            ColumnDescriptor::new("description", "text", true),
            ColumnDescriptor::new("handle", "varchar", false).with_max_length(50),
            ColumnDescriptor::new("id", "int8", false),
            ColumnDescriptor::new("price", "numeric", false),
        ]
    );
    assert_eq!(
        columns[0].sql_definition(),
        "country CHAR(2) NULL",
        "bpchar should render as a sized CHAR"
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_schema_filter_limits_namespaces() {
    let (_container, base) = setup_postgres().await;
    let client = connect(&base, "postgres").await;

    client
        .batch_execute(
            r#"
            CREATE TABLE account (id INTEGER NOT NULL);
            CREATE SCHEMA billing;
            CREATE TABLE billing.invoice (id INTEGER NOT NULL, total NUMERIC);
            "#,
        )
        .await
        .expect("failed to create tables");

    let all = introspect(&client, &SchemaFilter::all()).await.unwrap();
    assert!(all.contains_table("account"));
    assert!(all.contains_table("invoice"));

    let billing = introspect(&client, &SchemaFilter::only(["billing"]))
        .await
        .unwrap();
    assert_eq!(billing.table_names().collect::<Vec<_>>(), vec!["invoice"]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_same_table_name_in_two_schemas_reads_stably() {
    let (_container, base) = setup_postgres().await;
    let client = connect(&base, "postgres").await;

    client
        .batch_execute(
            r#"
            CREATE TABLE users (id INTEGER NOT NULL, email VARCHAR(50));
            CREATE SCHEMA audit;
            CREATE TABLE audit.users (id BIGINT, email VARCHAR(200) NOT NULL);
            "#,
        )
        .await
        .expect("failed to create tables");

    let first = introspect(&client, &SchemaFilter::all()).await.unwrap();
    let second = introspect(&client, &SchemaFilter::all()).await.unwrap();
    assert_eq!(first, second);

    // Rows for the same column are ordered by schema name: audit before public.
    assert_eq!(
        first.table("users").unwrap(),
        &[
            ColumnDescriptor::new("email", "varchar", false).with_max_length(200),
            ColumnDescriptor::new("email", "varchar", true).with_max_length(50),
            ColumnDescriptor::new("id", "int8", true),
            ColumnDescriptor::new("id", "int4", false),
        ]
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_full_run_over_two_databases() {
    let (_container, base) = setup_postgres().await;

    create_database(
        &base,
        "left_db",
        r#"
        CREATE TABLE users (
            id INTEGER NOT NULL,
            email VARCHAR(50) NOT NULL,
            bio TEXT
        );
        CREATE TABLE audit_log (id BIGINT NOT NULL);
        "#,
    )
    .await;

    create_database(
        &base,
        "right_db",
        r#"
        CREATE TABLE users (
            id INTEGER NOT NULL,
            email VARCHAR(100) NOT NULL,
            nickname VARCHAR(20)
        );
        "#,
    )
    .await;

    let left = read_schema(&format!("{} dbname=left_db", base), &SchemaFilter::all())
        .await
        .expect("failed to read left schema");
    let right = read_schema(&format!("{} dbname=right_db", base), &SchemaFilter::all())
        .await
        .expect("failed to read right schema");

    let dir = std::env::temp_dir().join(format!("drift-integration-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let dir = camino::Utf8PathBuf::from_path_buf(dir).unwrap();
    let outputs = OutputPaths::in_dir(&dir);

    let mut progress: Vec<String> = Vec::new();
    let diff = compare_schemas(
        &left,
        &right,
        &Labels::new("left_db", "right_db"),
        &outputs,
        &mut progress,
    )
    .expect("comparison failed");

    assert_eq!(diff.summary().missing_tables, 1);
    assert_eq!(diff.summary().missing_columns, 2);
    assert_eq!(diff.summary().column_mismatches, 1);
    assert_eq!(progress.len(), 4);

    let tables = std::fs::read_to_string(&outputs.tables).unwrap();
    assert!(tables.contains("CREATE TABLE audit_log (\n    id INT8 NOT NULL\n);"));

    let columns = std::fs::read_to_string(&outputs.columns).unwrap();
    assert!(columns.contains("ALTER TABLE users ADD bio TEXT NULL;"));
    assert!(columns.contains("ALTER TABLE users ADD nickname VARCHAR(20) NULL;"));

    let diff_sql = std::fs::read_to_string(&outputs.diff).unwrap();
    assert!(diff_sql.contains("ALTER TABLE users ALTER COLUMN email VARCHAR(50) NOT NULL;"));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_unreachable_server_is_a_connection_error() {
    let result = read_schema(
        "host=127.0.0.1 port=1 user=nobody password=secret connect_timeout=2",
        &SchemaFilter::all(),
    )
    .await;

    match result {
        Err(Error::Connection { target, .. }) => {
            assert!(target.contains("password=***"), "{target}");
            assert!(!target.contains("secret"));
        }
        other => panic!("expected a connection error, got {:?}", other.map(|s| s.len())),
    }
}
