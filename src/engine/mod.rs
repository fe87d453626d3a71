//! Pluggable query engines.
//!
//! An [`Engine`] turns a [`QueryString`] into results. Engines are looked up
//! by name in an [`EngineRegistry`] that callers build explicitly.
//!
//! Submodules:
//! - `duckdb`: embedded database engine, never fails on bad SQL
//! - `llm`: language-model engines that treat the query as a prompt
//! - `timing`: timed execution wrapper used by [`QueryString::run`]

pub mod duckdb;
pub mod llm;
pub mod timing;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::query::QueryString;

pub use self::duckdb::{DuckDbEngine, Relation};
pub use llm::{HfEngine, MockAiEngine};
pub use timing::ExecutionRecord;

/// Engine used when the caller names none.
pub const DEFAULT_ENGINE: &str = "duckdb";

/// A single result value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("NULL"),
            Cell::Bool(b) => write!(f, "{b}"),
            Cell::Int(i) => write!(f, "{i}"),
            Cell::Float(x) => write!(f, "{x}"),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

pub type Row = Vec<Cell>;

/// Tabular in-memory result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Frame {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Frame {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    /// Rows as a list, optionally led by a row of column names.
    pub fn into_rows(self, header: bool) -> Vec<Row> {
        let mut out = Vec::with_capacity(self.rows.len() + 1);
        if header {
            out.push(self.columns.iter().map(|c| Cell::Text(c.clone())).collect());
        }
        out.extend(self.rows);
        out
    }

    /// Two-column frame pairing a query with what came back for it.
    pub fn exchange(query: &str, response: impl Into<String>) -> Self {
        Self {
            columns: vec!["q".to_string(), "r".to_string()],
            rows: vec![vec![Cell::from(query), Cell::Text(response.into())]],
        }
    }
}

/// What an engine's `run` produces.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Frame(Frame),
    /// Free text, e.g. a model completion.
    Text(String),
    /// The engine reported an error in-band; `frame` is what it returned instead.
    Rejected { frame: Frame, error: String },
}

impl Output {
    /// `(rows, columns)`; text and rejected output have no shape.
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Output::Frame(frame) => frame.shape(),
            Output::Text(_) | Output::Rejected { .. } => (0, 0),
        }
    }

    /// The in-band error, if the engine rejected the query.
    pub fn error(&self) -> Option<&str> {
        match self {
            Output::Rejected { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Tabular view. Text becomes a single `q`/`r` row.
    pub fn into_frame(self, query: &str) -> Frame {
        match self {
            Output::Frame(frame) | Output::Rejected { frame, .. } => frame,
            Output::Text(text) => Frame::exchange(query, text),
        }
    }
}

/// Something that can execute a query string.
pub trait Engine {
    /// Registry key and log label.
    fn name(&self) -> &str;

    /// Execute and return the engine-native result.
    fn run(&self, query: &QueryString) -> Result<Output>;

    /// Execute and return rows, led by column names when `header` is set.
    fn list(&self, query: &QueryString, header: bool) -> Result<Vec<Row>> {
        Ok(self.run(query)?.into_frame(query.as_str()).into_rows(header))
    }

    /// Execute and return a tabular result.
    fn df(&self, query: &QueryString) -> Result<Frame> {
        Ok(self.run(query)?.into_frame(query.as_str()))
    }
}

/// Engines by name. Keys are case-insensitive.
#[derive(Default)]
pub struct EngineRegistry {
    engines: BTreeMap<String, Box<dyn Engine>>,
}

impl EngineRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `duckdb`, `mockai` and `hf`.
    pub fn with_defaults(settings: &Settings) -> Self {
        let mut registry = Self::new();
        registry.register(DuckDbEngine::in_memory());
        registry.register(MockAiEngine);
        registry.register(HfEngine::from_settings(settings));
        registry
    }

    /// Add an engine under its own name, replacing any previous holder.
    pub fn register<E: Engine + 'static>(&mut self, engine: E) -> Option<Box<dyn Engine>> {
        let key = engine.name().to_lowercase();
        self.engines.insert(key, Box::new(engine))
    }

    pub fn get(&self, key: &str) -> Result<&dyn Engine> {
        self.engines
            .get(&key.to_lowercase())
            .map(|e| e.as_ref())
            .ok_or_else(|| Error::UnknownEngine(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.engines.contains_key(&key.to_lowercase())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.engines.keys()).finish()
    }
}
