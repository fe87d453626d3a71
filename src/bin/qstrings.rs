//! qstrings command-line interface
//!
//! Builds one query string and runs it.
//!
//! # Usage
//!
//! ```bash
//! # Run against in-memory DuckDB
//! qstrings "SELECT 42"
//!
//! # Fill placeholders and print CSV
//! qstrings "SELECT * FROM {table}" --var table=orders -o csv
//!
//! # Load a template file and preview the first rows
//! qstrings -f report.sql --limit 10
//!
//! # Show T-SQL instead of running
//! qstrings 'SELECT "id" FROM "orders"' --transpile tsql
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;

use qstrings::engine::DuckDbEngine;
use qstrings::output::{format_frame, OutputFormat};
use qstrings::{logging, Dialect, EngineRegistry, QueryBuilder, Settings, DEFAULT_ENGINE};

/// Run a templated SQL query string
#[derive(Parser, Debug)]
#[command(name = "qstrings", version, about = "Run a templated SQL query string")]
struct Args {
    /// Query string; `{name}` placeholders are filled from --var and the environment
    query: Option<String>,

    /// Read the query template from a file (wins over QUERY)
    #[arg(short = 'f', long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "table")]
    output: OutputFormatArg,

    /// Engine to run the query on
    #[arg(short = 'e', long, env = "QSTRINGS_ENGINE")]
    engine: Option<String>,

    /// Placeholder value as KEY=VALUE (repeatable)
    #[arg(short = 'v', long = "var", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    vars: Vec<(String, String)>,

    /// Dialect used to parse the query
    #[arg(short = 'd', long)]
    dialect: Option<String>,

    /// Fail when the query does not parse
    #[arg(long)]
    validate: bool,

    /// Suppress informational logging
    #[arg(short = 'q', long)]
    quiet: bool,

    /// DuckDB database file to run against
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Run against the history database
    #[arg(long, conflicts_with = "db")]
    history: bool,

    /// Open the database read-only
    #[arg(long)]
    read_only: bool,

    /// Wrap the query to return at most N rows
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Wrap the query to return its row count
    #[arg(long)]
    count: bool,

    /// Print the query in another dialect instead of running it (read with --dialect)
    #[arg(long, value_name = "DIALECT")]
    transpile: Option<String>,

    /// Print the query's attributes instead of running it
    #[arg(long)]
    show: bool,

    /// Settings file
    #[arg(long, value_name = "FILE", env = "QSTRINGS_CONFIG")]
    config: Option<PathBuf>,
}

/// Output format argument
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormatArg {
    /// Aligned text table
    Table,
    /// Comma-separated values
    Csv,
    /// JSON array of row objects
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Table => OutputFormat::Table,
            OutputFormatArg::Csv => OutputFormat::Csv,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    logging::init(if args.quiet { "warn" } else { "info" });

    let settings = match &args.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    };
    let quiet = args.quiet || settings.quiet;

    let dialect = match &args.dialect {
        Some(name) => name.parse::<Dialect>()?,
        None => settings.dialect,
    };

    let mut builder = QueryBuilder::new(args.query.clone().unwrap_or_default())
        .vars(args.vars.iter().cloned())
        .validate(args.validate)
        .quiet(quiet)
        .dialect(dialect);
    if let Some(file) = &args.file {
        builder = builder.file(file);
    }
    let mut query = builder.build().context("failed to build query")?;

    if let Some(n) = args.limit {
        query = query.limit(n)?;
    }
    if args.count {
        query = query.count()?;
    }

    if let Some(target) = &args.transpile {
        let target: Dialect = target.parse()?;
        println!("{}", query.transpile_to(target)?);
        return Ok(());
    }

    if args.show {
        for (key, value) in query.as_mapping() {
            println!("{}: {}", key.cyan(), value);
        }
        return Ok(());
    }

    let mut registry = EngineRegistry::with_defaults(&settings);
    let database = if args.history {
        Some(settings.history_path(None))
    } else {
        args.db.clone()
    };
    if let Some(db) = database {
        if let Some(parent) = db.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        registry.register(DuckDbEngine::open(db).read_only(args.read_only));
    }

    let engine = args
        .engine
        .clone()
        .or_else(|| settings.engine.clone())
        .unwrap_or_else(|| DEFAULT_ENGINE.to_string());

    let output = query.run(&registry, Some(&engine))?;
    let frame = output.into_frame(query.as_str());
    let rendered = format_frame(&frame, args.output.into());
    if rendered.ends_with('\n') {
        print!("{rendered}");
    } else {
        println!("{rendered}");
    }

    Ok(())
}
