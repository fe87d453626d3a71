//! Integration tests for query strings running on the bundled DuckDB.
//!
//! These tests cover the flow from template to executed result.

use pretty_assertions::assert_eq;
use qstrings::prelude::*;
use tempfile::TempDir;

fn registry() -> EngineRegistry {
    EngineRegistry::with_defaults(&Settings::default())
}

#[test]
fn test_no_placeholders_never_missing() {
    for sql in ["SELECT 42", "SELE 42", "", "SELECT '{{}}'"] {
        let q = QueryString::builder(sql).quiet(true).env(Vec::<(String, String)>::new()).build();
        assert!(q.is_ok(), "{sql}: {:?}", q.err());
    }
}

#[test]
fn test_process_environment_fills_and_explicit_wins() {
    let Ok(path) = std::env::var("PATH") else {
        return;
    };

    let q = QueryString::new("SELECT {PATH!r} AS p").unwrap();
    assert_eq!(q.references().get("PATH"), Some(&path));
    let frame = q.df(&registry(), None).unwrap();
    assert_eq!(frame.rows, vec![vec![Cell::Text(path)]]);

    let q = QueryString::builder("SELECT {PATH!r} AS p").var("PATH", "explicit").build().unwrap();
    assert_eq!(q.as_str(), "SELECT 'explicit' AS p");
    assert_eq!(q.references().get("PATH").map(String::as_str), Some("explicit"));
}

#[test]
fn test_missing_value_names_key() {
    let err = QueryString::builder("SELECT * FROM {qstrings_it_surely_unset_table}")
        .build()
        .unwrap_err();
    match err {
        Error::MissingKeys(keys) => assert_eq!(keys, vec!["qstrings_it_surely_unset_table"]),
        other => panic!("expected MissingKeys, got {:?}", other),
    }
}

#[test]
fn test_template_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("report.sql");
    std::fs::write(&path, "SELECT {n} AS n").unwrap();

    let q = QueryString::builder("SELECT 'ignored'")
        .file(&path)
        .var("n", 7)
        .build()
        .unwrap();
    assert_eq!(q.as_str(), "SELECT 7 AS n");
    assert_eq!(q.source_file(), Some(path.as_path()));
    assert_eq!(q.as_mapping()["file"], path.display().to_string());
}

#[test]
fn test_limit_executes() {
    let q = QueryString::new("SELECT unnest(generate_series(1, 20)) AS i").unwrap();
    let frame = q.limit(DEFAULT_LIMIT).unwrap().df(&registry(), None).unwrap();
    assert_eq!(frame.columns, vec!["i".to_string()]);
    assert_eq!(frame.rows.len(), 5);

    let frame = QueryString::new("SELECT 42").unwrap().limit(3).unwrap().df(&registry(), None).unwrap();
    assert_eq!(frame.columns, vec!["42".to_string()]);
    assert_eq!(frame.rows, vec![vec![Cell::Int(42)]]);
}

#[test]
fn test_count_executes() {
    let q = QueryString::new("SELECT unnest(generate_series(1, 20)) AS i").unwrap();
    let frame = q.count().unwrap().df(&registry(), None).unwrap();
    assert_eq!(frame.columns, vec!["row_count".to_string()]);
    assert_eq!(frame.rows, vec![vec![Cell::Int(20)]]);
}

#[test]
fn test_bad_sql_on_duckdb_is_reported() {
    let rows = QueryString::new("SELE 42").unwrap().list(&registry(), Some("duckdb"), false).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], Cell::from("SELE 42"));
    assert!(matches!(&rows[0][1], Cell::Text(msg) if !msg.is_empty()));
}

#[test]
fn test_run_records_execution() {
    let mut q = QueryString::builder("SELECT 1 AS a, 2 AS b").quiet(true).build().unwrap();
    assert!(q.execution().is_none());

    let output = q.run(&registry(), None).unwrap();
    assert_eq!(output.shape(), (1, 2));

    let record = q.execution().unwrap();
    assert_eq!(record.engine, "duckdb");
    assert_eq!(record.shape, (1, 2));

    let mapping = q.as_mapping();
    assert_eq!(mapping["shape"], "1x2");
    assert_eq!(mapping["engine"], "duckdb");
    assert!(mapping.contains_key("duration"));
    assert_eq!(q.as_str(), "SELECT 1 AS a, 2 AS b");
}

#[test]
fn test_unknown_engine() {
    let mut q = QueryString::builder("SELECT 1").quiet(true).build().unwrap();
    assert!(matches!(q.run(&registry(), Some("oracle")), Err(Error::UnknownEngine(_))));
    assert!(q.execution().is_none());
}

#[test]
fn test_mock_ai_engine_accepts_prompts() {
    let mut q = QueryString::builder("write me a query that returns 42").quiet(true).build().unwrap();
    assert!(!q.is_valid());
    let output = q.run(&registry(), Some("mockai")).unwrap();
    assert_eq!(output, Output::Text("SELECT\n42 AS select".to_string()));
}

#[test]
fn test_rejected_run_is_recorded_without_shape() {
    let mut q = QueryString::builder("SELE 42").quiet(true).build().unwrap();
    let output = q.run(&registry(), None).unwrap();
    assert!(output.error().is_some());
    assert_eq!(output.into_frame(q.as_str()).shape(), (1, 2));

    let mapping = q.as_mapping();
    assert_eq!(mapping["engine"], "duckdb");
    assert_eq!(mapping["shape"], "0x0");
}

#[test]
fn test_file_database() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("orders.duckdb");

    let mut registry = registry();
    registry.register(DuckDbEngine::open(&path));

    QueryString::new("CREATE TABLE orders AS SELECT * FROM range(3) t(id)")
        .unwrap()
        .df(&registry, None)
        .unwrap();
    let frame = QueryString::new("SELECT count(*) AS n FROM orders")
        .unwrap()
        .df(&registry, None)
        .unwrap();
    assert_eq!(frame.rows, vec![vec![Cell::Int(3)]]);

    registry.register(DuckDbEngine::open(&path).read_only(true));
    let rows = QueryString::new("SELECT id FROM orders ORDER BY id")
        .unwrap()
        .list(&registry, None, false)
        .unwrap();
    assert_eq!(rows, vec![vec![Cell::Int(0)], vec![Cell::Int(1)], vec![Cell::Int(2)]]);
}
