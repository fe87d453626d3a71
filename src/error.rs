//! Error types for query strings and engines.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while building, transforming or executing a query string.
#[derive(Debug, Error)]
pub enum Error {
    /// The template file does not exist.
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The template file exists but could not be read.
    #[error("Failed to read template: {0}")]
    Io(#[from] std::io::Error),

    /// The template has malformed placeholder syntax.
    #[error("Invalid template at byte {offset}: {message}")]
    Template { offset: usize, message: String },

    /// Placeholders with no value in the explicit values or the environment.
    #[error("Values missing for keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),

    /// The SQL text did not parse and validation was requested.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A derived operation was requested on a query without a syntax tree.
    #[error("{0}")]
    InvalidQuery(&'static str),

    /// No engine is registered under the key.
    #[error("No such engine: {0}")]
    UnknownEngine(String),

    /// The dialect name is not recognised.
    #[error("Unknown SQL dialect: {0}")]
    UnknownDialect(String),

    /// The embedded database could not be opened.
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    /// Transport failure talking to a hosted engine.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A hosted engine answered, but not with something usable.
    #[error("API error: {0}")]
    Api(String),

    /// The settings file is unreadable or malformed.
    #[error("Config error: {0}")]
    Config(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
