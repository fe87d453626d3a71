//! SQL dialects known to query strings.
//!
//! Each dialect maps onto a `sqlparser` dialect for parsing and carries the
//! identifier quoting used when transpiling into it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlparser::dialect::{
    BigQueryDialect, DuckDbDialect, GenericDialect, MsSqlDialect, MySqlDialect,
    PostgreSqlDialect, SQLiteDialect, SnowflakeDialect,
};
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::error::{Error, Result};

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Dialect {
    #[default]
    Generic,
    DuckDb,
    Postgres,
    MySql,
    /// T-SQL (SQL Server).
    Tsql,
    Sqlite,
    BigQuery,
    Snowflake,
}

impl Dialect {
    pub const ALL: [Dialect; 8] = [
        Dialect::Generic,
        Dialect::DuckDb,
        Dialect::Postgres,
        Dialect::MySql,
        Dialect::Tsql,
        Dialect::Sqlite,
        Dialect::BigQuery,
        Dialect::Snowflake,
    ];

    /// Canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Generic => "generic",
            Dialect::DuckDb => "duckdb",
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::Tsql => "tsql",
            Dialect::Sqlite => "sqlite",
            Dialect::BigQuery => "bigquery",
            Dialect::Snowflake => "snowflake",
        }
    }

    /// The parser dialect used to read SQL in this dialect.
    pub fn parser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        match self {
            Dialect::Generic => Box::new(GenericDialect {}),
            Dialect::DuckDb => Box::new(DuckDbDialect {}),
            Dialect::Postgres => Box::new(PostgreSqlDialect {}),
            Dialect::MySql => Box::new(MySqlDialect {}),
            Dialect::Tsql => Box::new(MsSqlDialect {}),
            Dialect::Sqlite => Box::new(SQLiteDialect {}),
            Dialect::BigQuery => Box::new(BigQueryDialect {}),
            Dialect::Snowflake => Box::new(SnowflakeDialect {}),
        }
    }

    /// Opening and closing quote for delimited identifiers.
    pub fn identifier_quotes(&self) -> (char, char) {
        match self {
            Dialect::MySql | Dialect::BigQuery => ('`', '`'),
            Dialect::Tsql => ('[', ']'),
            _ => ('"', '"'),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "generic" | "ansi" => Ok(Dialect::Generic),
            "duckdb" => Ok(Dialect::DuckDb),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::MySql),
            "tsql" | "mssql" | "sqlserver" => Ok(Dialect::Tsql),
            "sqlite" => Ok(Dialect::Sqlite),
            "bigquery" => Ok(Dialect::BigQuery),
            "snowflake" => Ok(Dialect::Snowflake),
            other => Err(Error::UnknownDialect(other.to_string())),
        }
    }
}

impl TryFrom<String> for Dialect {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Dialect> for String {
    fn from(d: Dialect) -> Self {
        d.name().to_string()
    }
}

/// Byte offset of the start of each line in `sql`.
fn line_starts(sql: &str) -> Vec<usize> {
    let mut starts = vec![0usize];
    for (i, b) in sql.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

/// Convert a 1-based tokenizer `(line, column)` into a byte offset.
///
/// Columns count characters, not bytes.
fn byte_offset(sql: &str, starts: &[usize], line: u64, column: u64) -> usize {
    let line_idx = usize::try_from(line).unwrap_or(1).saturating_sub(1);
    let line_start = starts.get(line_idx).copied().unwrap_or(0);
    let col = usize::try_from(column).unwrap_or(1).saturating_sub(1);

    sql[line_start..]
        .char_indices()
        .nth(col)
        .map_or(sql.len(), |(off, _)| line_start + off)
}

/// Rewrite every delimited identifier in `sql` with the quoting of `write`.
///
/// `sql` is tokenized with the `read` dialect. Everything that is not a
/// quoted identifier is copied through byte for byte.
pub fn requote(sql: &str, read: Dialect, write: Dialect) -> Result<String> {
    let parser_dialect = read.parser_dialect();
    let tokens = Tokenizer::new(parser_dialect.as_ref(), sql)
        .tokenize_with_location()
        .map_err(|e| Error::Parse(e.to_string()))?;

    let (open, close) = write.identifier_quotes();
    let starts = line_starts(sql);
    let mut out = String::with_capacity(sql.len());
    let mut cursor = 0;

    for tws in &tokens {
        let Token::Word(word) = &tws.token else {
            continue;
        };
        if word.quote_style.is_none() {
            continue;
        }
        let start = byte_offset(sql, &starts, tws.span.start.line, tws.span.start.column);
        let end = byte_offset(sql, &starts, tws.span.end.line, tws.span.end.column);
        if start < cursor || end < start {
            continue;
        }
        out.push_str(&sql[cursor..start]);
        out.push(open);
        out.push_str(&word.value.replace(close, &format!("{close}{close}")));
        out.push(close);
        cursor = end;
    }
    out.push_str(&sql[cursor..]);

    Ok(out)
}
