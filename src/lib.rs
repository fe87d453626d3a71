//! # qstrings
//!
//! Query strings that know they are SQL.
//!
//! A [`QueryString`] is built from a `{placeholder}` template. Placeholders
//! are filled from explicit values first and the process environment second,
//! the result is parsed with `sqlparser`, and the parse outcome travels with
//! the text. Query strings can derive new queries (`limit`, `count`,
//! `transpile`) and run on pluggable engines.
//!
//! ```
//! use qstrings::prelude::*;
//!
//! let q = QueryString::builder("SELECT {n} AS answer").var("n", 42).build().unwrap();
//! let registry = EngineRegistry::with_defaults(&Settings::default());
//! let rows = q.list(&registry, None, true).unwrap();
//! assert_eq!(rows[1], vec![Cell::Int(42)]);
//! ```

pub mod config;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod logging;
pub mod output;
pub mod query;
pub mod template;

pub use config::Settings;
pub use dialect::Dialect;
pub use engine::{Cell, Engine, EngineRegistry, Frame, Output, Row, DEFAULT_ENGINE};
pub use error::{Error, Result};
pub use query::{render_as_templated_string, QueryBuilder, QueryString, DEFAULT_LIMIT};

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::Settings;
    pub use crate::dialect::Dialect;
    pub use crate::engine::{
        Cell, DuckDbEngine, Engine, EngineRegistry, Frame, HfEngine, MockAiEngine, Output, Row,
        DEFAULT_ENGINE,
    };
    pub use crate::error::{Error, Result};
    pub use crate::query::{render_as_templated_string, QueryBuilder, QueryString, DEFAULT_LIMIT};
}
