//! Query strings: SQL text that remembers how it was made.
//!
//! A [`QueryString`] is built from a template plus substitution values. On
//! construction the placeholders are resolved, the resulting text is parsed
//! and the parse outcome is kept next to the text. A failed parse is recorded
//! rather than raised unless validation was requested.
//!
//! # Example
//! ```
//! use qstrings::QueryString;
//!
//! let q = QueryString::builder("SELECT * FROM {table}")
//!     .var("table", "orders")
//!     .build()
//!     .unwrap();
//! assert_eq!(q.as_str(), "SELECT * FROM orders");
//! assert!(q.is_valid());
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sqlparser::ast::Statement;
use sqlparser::parser::Parser;
use tracing::{debug, warn};

use crate::dialect::{requote, Dialect};
use crate::engine::{timing, EngineRegistry, ExecutionRecord, Frame, Output, Row, DEFAULT_ENGINE};
use crate::error::{Error, Result};
use crate::template::Template;

/// Row cap used by [`QueryString::limit`] when callers have no preference.
pub const DEFAULT_LIMIT: usize = 5;

/// Default source dialect for [`QueryString::transpile_default`].
pub const DEFAULT_READ_DIALECT: Dialect = Dialect::DuckDb;

/// Default target dialect for [`QueryString::transpile_default`].
pub const DEFAULT_WRITE_DIALECT: Dialect = Dialect::Tsql;

const TRANSFORM_INVALID: &str = "cannot transform invalid query";
const TRANSPILE_INVALID: &str = "cannot transpile invalid query";

/// Identifier from the local clock, `yymmddHHMMSSffffff`.
pub fn timestamp_id() -> u64 {
    chrono::Local::now()
        .format("%y%m%d%H%M%S%6f")
        .to_string()
        .parse()
        .unwrap_or_default()
}

/// Parse `sql` as exactly one statement.
pub fn parse_statement(sql: &str, dialect: Dialect) -> std::result::Result<Statement, String> {
    let parser_dialect = dialect.parser_dialect();
    let mut statements = Parser::parse_sql(parser_dialect.as_ref(), sql).map_err(|e| e.to_string())?;
    match statements.len() {
        1 => Ok(statements.remove(0)),
        n => Err(format!("expected a single SQL statement, found {n}")),
    }
}

/// SQL text with its template provenance and parse result.
#[derive(Debug, Clone)]
pub struct QueryString {
    id: u64,
    text: String,
    template_keys: BTreeSet<String>,
    references: BTreeMap<String, String>,
    syntax_tree: Option<Statement>,
    parse_error: Option<String>,
    source_file: Option<PathBuf>,
    dialect: Dialect,
    quiet: bool,
    execution: Option<ExecutionRecord>,
}

impl QueryString {
    /// Build from a literal template with default options.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        QueryBuilder::new(template).build()
    }

    /// Start a builder for a literal template.
    pub fn builder(template: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(template)
    }

    /// Build from a template file with default options.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        QueryBuilder::from_file(path).build()
    }

    /// Wrap already-final SQL. No placeholder scanning takes place.
    pub fn from_sql(sql: impl Into<String>, dialect: Dialect) -> Self {
        Self::assemble(sql.into(), dialect, false)
    }

    fn assemble(sql: String, dialect: Dialect, quiet: bool) -> Self {
        let (text, syntax_tree, parse_error) = match parse_statement(&sql, dialect) {
            Ok(stmt) => (stmt.to_string(), Some(stmt), None),
            Err(e) => (sql, None, Some(e)),
        };
        Self {
            id: timestamp_id(),
            text,
            template_keys: BTreeSet::new(),
            references: BTreeMap::new(),
            syntax_tree,
            parse_error,
            source_file: None,
            dialect,
            quiet,
            execution: None,
        }
    }

    fn derive(&self, sql: String, dialect: Dialect) -> Self {
        Self::assemble(sql, dialect, self.quiet)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Placeholder names found in the template.
    pub fn template_keys(&self) -> &BTreeSet<String> {
        &self.template_keys
    }

    /// Values substituted into the template, keyed by placeholder.
    pub fn references(&self) -> &BTreeMap<String, String> {
        &self.references
    }

    pub fn syntax_tree(&self) -> Option<&Statement> {
        self.syntax_tree.as_ref()
    }

    pub fn parse_error(&self) -> Option<&str> {
        self.parse_error.as_deref()
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// True when the text parsed into a syntax tree.
    pub fn is_valid(&self) -> bool {
        self.syntax_tree.is_some()
    }

    /// Metadata of the last timed [`run`](Self::run), if any.
    pub fn execution(&self) -> Option<&ExecutionRecord> {
        self.execution.as_ref()
    }

    fn tree_or(&self, message: &'static str) -> Result<&Statement> {
        self.syntax_tree.as_ref().ok_or(Error::InvalidQuery(message))
    }

    /// Select every column of this query, capped at `n` rows.
    pub fn limit(&self, n: usize) -> Result<Self> {
        let tree = self.tree_or(TRANSFORM_INVALID)?;
        Ok(self.derive(format!("SELECT * FROM ({tree}) LIMIT {n}"), self.dialect))
    }

    /// Count the rows this query returns, as a single `row_count` column.
    pub fn count(&self) -> Result<Self> {
        let tree = self.tree_or(TRANSFORM_INVALID)?;
        Ok(self.derive(
            format!("SELECT COUNT(*) AS row_count FROM ({tree})"),
            self.dialect,
        ))
    }

    /// Render this query for another dialect.
    pub fn transpile(&self, read: Dialect, write: Dialect) -> Result<Self> {
        let tree = self.tree_or(TRANSPILE_INVALID)?;
        let sql = requote(&tree.to_string(), read, write)?;
        Ok(self.derive(sql, write))
    }

    /// [`transpile`](Self::transpile) from the dialect this query was parsed with.
    pub fn transpile_to(&self, write: Dialect) -> Result<Self> {
        self.transpile(self.dialect, write)
    }

    /// [`transpile`](Self::transpile) from DuckDB to T-SQL.
    pub fn transpile_default(&self) -> Result<Self> {
        self.transpile(DEFAULT_READ_DIALECT, DEFAULT_WRITE_DIALECT)
    }

    /// Public attributes rendered as strings, for display and debugging.
    pub fn as_mapping(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("id".to_string(), self.id.to_string());
        map.insert("text".to_string(), self.text.clone());
        map.insert("dialect".to_string(), self.dialect.to_string());
        map.insert(
            "file".to_string(),
            self.source_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        );
        map.insert(
            "template_keys".to_string(),
            serde_json::to_string(&self.template_keys).unwrap_or_default(),
        );
        map.insert(
            "references".to_string(),
            serde_json::to_string(&self.references).unwrap_or_default(),
        );
        map.insert(
            "syntax_tree".to_string(),
            self.syntax_tree
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_default(),
        );
        map.insert(
            "parse_error".to_string(),
            self.parse_error.clone().unwrap_or_default(),
        );
        if let Some(exec) = &self.execution {
            map.insert("exec_id".to_string(), exec.exec_id.to_string());
            map.insert("engine".to_string(), exec.engine.clone());
            map.insert(
                "duration".to_string(),
                format!("{:.4}", exec.duration.as_secs_f64()),
            );
            map.insert(
                "shape".to_string(),
                format!("{}x{}", exec.shape.0, exec.shape.1),
            );
        }
        map
    }

    /// Execute through `registry`, timing the call and recording the outcome.
    ///
    /// `engine` defaults to [`DEFAULT_ENGINE`].
    pub fn run(&mut self, registry: &EngineRegistry, engine: Option<&str>) -> Result<Output> {
        let key = engine.unwrap_or(DEFAULT_ENGINE);
        let (output, record) = timing::run_timed(registry, key, self)?;
        self.execution = Some(record);
        Ok(output)
    }

    /// Execute and return rows, optionally led by a header row.
    pub fn list(&self, registry: &EngineRegistry, engine: Option<&str>, header: bool) -> Result<Vec<Row>> {
        registry.get(engine.unwrap_or(DEFAULT_ENGINE))?.list(self, header)
    }

    /// Execute and return a tabular result.
    pub fn df(&self, registry: &EngineRegistry, engine: Option<&str>) -> Result<Frame> {
        registry.get(engine.unwrap_or(DEFAULT_ENGINE))?.df(self)
    }
}

/// Render a syntax tree as a new query string.
pub fn render_as_templated_string(tree: &Statement) -> QueryString {
    QueryString::from_sql(tree.to_string(), Dialect::Generic)
}

impl fmt::Display for QueryString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Deref for QueryString {
    type Target = str;

    fn deref(&self) -> &str {
        &self.text
    }
}

impl AsRef<str> for QueryString {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl FromStr for QueryString {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl From<QueryString> for String {
    fn from(q: QueryString) -> Self {
        q.text
    }
}

/// Options for building a [`QueryString`].
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    template: String,
    file: Option<PathBuf>,
    values: HashMap<String, String>,
    env: Option<HashMap<String, String>>,
    validate: bool,
    quiet: bool,
    dialect: Dialect,
}

impl QueryBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            ..Self::default()
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Self {
        Self::default().file(path)
    }

    /// Read the template from `path`. Takes precedence over a literal template.
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Bind a placeholder value. Explicit values win over the environment.
    pub fn var(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.values.insert(key.into(), value.to_string());
        self
    }

    pub fn vars<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        for (k, v) in vars {
            self.values.insert(k.into(), v.to_string());
        }
        self
    }

    /// Use `env` as the fallback pool instead of the process environment.
    pub fn env<K, V>(mut self, env: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env = Some(env.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Fail construction when the SQL does not parse.
    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Suppress informational logging for this query.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    fn pool(&self) -> HashMap<String, String> {
        let mut pool = self.values.clone();
        match &self.env {
            Some(env) => {
                for (k, v) in env {
                    pool.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
            None => {
                for (k, v) in std::env::vars_os() {
                    if let (Ok(k), Ok(v)) = (k.into_string(), v.into_string()) {
                        pool.entry(k).or_insert(v);
                    }
                }
            }
        }
        pool
    }

    pub fn build(self) -> Result<QueryString> {
        let source = match &self.file {
            Some(path) => read_template(path)?,
            None => {
                if self.template.is_empty() && !self.quiet {
                    warn!("Empty query string");
                }
                self.template.clone()
            }
        };

        let template = Template::parse(&source)?;
        let references = template.resolve(&self.pool())?;
        let text = template.render(&references)?;

        let (syntax_tree, parse_error) = match parse_statement(&text, self.dialect) {
            Ok(stmt) => (Some(stmt), None),
            Err(e) if self.validate => return Err(Error::Parse(e)),
            Err(e) => {
                debug!(error = %e, "query did not parse");
                (None, Some(e))
            }
        };

        Ok(QueryString {
            id: timestamp_id(),
            text,
            template_keys: template.keys(),
            references,
            syntax_tree,
            parse_error,
            source_file: self.file,
            dialect: self.dialect,
            quiet: self.quiet,
            execution: None,
        })
    }
}

fn read_template(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    Ok(std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::capture;
    use pretty_assertions::assert_eq;

    fn no_env() -> Vec<(String, String)> {
        Vec::new()
    }

    #[test]
    fn test_parse_select_42() {
        let q = QueryString::new("SELECT 42").unwrap();
        assert!(q.is_valid());
        assert_eq!(q.parse_error(), None);
        assert_eq!(q.syntax_tree().unwrap().to_string(), "SELECT 42");
    }

    #[test]
    fn test_parse_error_recorded() {
        let q = QueryString::new("SELE 42").unwrap();
        assert!(q.syntax_tree().is_none());
        assert!(!q.parse_error().unwrap().is_empty());
        assert_eq!(q.as_str(), "SELE 42");
    }

    #[test]
    fn test_parse_error_with_validate() {
        let err = QueryString::builder("SELE 42").validate(true).build().unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_empty_and_multi_statement_are_invalid() {
        let q = QueryString::builder("").quiet(true).build().unwrap();
        assert_eq!(q.parse_error(), Some("expected a single SQL statement, found 0"));

        let q = QueryString::new("SELECT 1; SELECT 2").unwrap();
        assert_eq!(q.parse_error(), Some("expected a single SQL statement, found 2"));
    }

    #[test]
    fn test_substitution_and_references() {
        let q = QueryString::builder("SELECT * FROM {table}")
            .var("table", "orders")
            .var("unused", 1)
            .env(no_env())
            .build()
            .unwrap();
        assert_eq!(q.as_str(), "SELECT * FROM orders");
        assert_eq!(q.template_keys().iter().collect::<Vec<_>>(), vec!["table"]);
        assert_eq!(q.references().get("table").map(String::as_str), Some("orders"));
        assert_eq!(q.references().len(), 1);
    }

    #[test]
    fn test_missing_key() {
        let err = QueryString::builder("SELECT * FROM {table}")
            .env(no_env())
            .build()
            .unwrap_err();
        match err {
            Error::MissingKeys(keys) => assert_eq!(keys, vec!["table".to_string()]),
            other => panic!("expected MissingKeys, got {:?}", other),
        }
    }

    #[test]
    fn test_env_fallback_and_precedence() {
        let env = vec![("table", "from_env"), ("schema", "main")];
        let q = QueryString::builder("SELECT * FROM {schema}.{table}")
            .var("table", "explicit")
            .env(env)
            .build()
            .unwrap();
        assert_eq!(q.as_str(), "SELECT * FROM main.explicit");
        assert_eq!(q.references().get("schema").map(String::as_str), Some("main"));
    }

    #[test]
    fn test_limit() {
        let q = QueryString::new("SELECT 42").unwrap();
        assert_eq!(q.limit(DEFAULT_LIMIT).unwrap().as_str(), "SELECT * FROM (SELECT 42) LIMIT 5");
        assert_eq!(q.limit(10).unwrap().as_str(), "SELECT * FROM (SELECT 42) LIMIT 10");
    }

    #[test]
    fn test_count() {
        let q = QueryString::new("SELECT 42").unwrap();
        let c = q.count().unwrap();
        assert!(c.is_valid());
        assert_eq!(c.as_str(), "SELECT COUNT(*) AS row_count FROM (SELECT 42)");
    }

    #[test]
    fn test_derived_ops_on_invalid_query() {
        let q = QueryString::new("SELE 42").unwrap();
        assert!(matches!(q.limit(5), Err(Error::InvalidQuery(TRANSFORM_INVALID))));
        assert!(matches!(q.count(), Err(Error::InvalidQuery(TRANSFORM_INVALID))));
        assert!(matches!(q.transpile_default(), Err(Error::InvalidQuery(TRANSPILE_INVALID))));
    }

    #[test]
    fn test_transpile_quotes_identifiers() {
        let q = QueryString::builder(r#"SELECT "id" FROM "orders""#)
            .dialect(Dialect::DuckDb)
            .build()
            .unwrap();
        let t = q.transpile_default().unwrap();
        assert_eq!(t.as_str(), "SELECT [id] FROM [orders]");
        assert_eq!(t.dialect(), Dialect::Tsql);
        assert!(t.is_valid());
    }

    #[test]
    fn test_transpile_to_reads_with_query_dialect() {
        let q = QueryString::builder("SELECT `id` FROM `orders`")
            .dialect(Dialect::MySql)
            .env(no_env())
            .build()
            .unwrap();
        let t = q.limit(3).unwrap().transpile_to(Dialect::Postgres).unwrap();
        assert_eq!(t.as_str(), r#"SELECT * FROM (SELECT "id" FROM "orders") LIMIT 3"#);
        assert_eq!(t.dialect(), Dialect::Postgres);
    }

    #[test]
    fn test_empty_template_warns_unless_quiet() {
        let logs = capture(|| {
            QueryString::builder("").env(no_env()).build().unwrap();
        });
        assert!(logs.contains("|WARN|"), "{logs}");
        assert!(logs.contains("Empty query string"), "{logs}");

        let logs = capture(|| {
            QueryString::builder("").quiet(true).env(no_env()).build().unwrap();
        });
        assert_eq!(logs, "");
    }

    #[test]
    fn test_quiet_does_not_change_parse_handling() {
        let q = QueryString::builder("SELE 42").quiet(true).build().unwrap();
        assert!(q.parse_error().is_some());

        let err = QueryString::builder("SELE 42")
            .quiet(true)
            .validate(true)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_derived_query_keeps_literal_braces() {
        let q = QueryString::new("SELECT '{{\"a\": 1}}' AS j").unwrap();
        assert_eq!(q.as_str(), "SELECT '{\"a\": 1}' AS j");
        let l = q.limit(1).unwrap();
        assert!(l.is_valid());
        assert!(l.as_str().contains("'{\"a\": 1}'"));
    }

    #[test]
    fn test_render_round_trip() {
        let q = QueryString::new("select a, b from t where a > 1").unwrap();
        let rendered = render_as_templated_string(q.syntax_tree().unwrap());
        let again = render_as_templated_string(rendered.syntax_tree().unwrap());
        assert_eq!(rendered.syntax_tree(), again.syntax_tree());
        assert_eq!(rendered.as_str(), again.as_str());
    }

    #[test]
    fn test_as_mapping() {
        let q = QueryString::builder("SELECT {n}")
            .var("n", 42)
            .env(no_env())
            .build()
            .unwrap();
        let m = q.as_mapping();
        assert_eq!(m["text"], "SELECT 42");
        assert_eq!(m["template_keys"], r#"["n"]"#);
        assert_eq!(m["references"], r#"{"n":"42"}"#);
        assert_eq!(m["parse_error"], "");
        assert_eq!(m["file"], "");
        assert!(!m.contains_key("duration"));
    }

    #[test]
    fn test_file_not_found() {
        let err = QueryString::from_file("does/not/exist.sql").unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn test_timestamp_id_shape() {
        assert_eq!(timestamp_id().to_string().len(), 18);
    }

    #[test]
    fn test_deref_and_display() {
        let q: QueryString = "SELECT 42".parse().unwrap();
        assert!(q.starts_with("SELECT"));
        assert_eq!(format!("{q}"), "SELECT 42");
    }
}
