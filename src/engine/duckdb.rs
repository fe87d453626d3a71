//! Embedded DuckDB engine.
//!
//! SQL errors are never raised: a failing query produces a one-row frame
//! holding the query text (`q`) and the database error (`r`). Only failing to
//! open the database is reported as an error.

use std::path::PathBuf;

use ::duckdb::types::{TimeUnit, Value};
use ::duckdb::{AccessMode, Config, Connection};
use chrono::{DateTime, NaiveDate, NaiveTime};
use tracing::debug;

use super::{Cell, Engine, Frame, Output};
use crate::error::Result;
use crate::query::QueryString;

/// Runs queries against DuckDB, in memory unless given a database.
#[derive(Debug, Clone, Default)]
pub struct DuckDbEngine {
    database: Option<PathBuf>,
    read_only: bool,
}

impl DuckDbEngine {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Use the database at `path` (a file, or any DuckDB connection string).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            database: Some(path.into()),
            read_only: false,
        }
    }

    /// Open the database read-only. Has no effect in memory.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn database(&self) -> Option<&PathBuf> {
        self.database.as_ref()
    }

    fn connect(&self) -> Result<Connection> {
        let conn = match &self.database {
            None => Connection::open_in_memory()?,
            Some(path) => {
                let mode = if self.read_only {
                    AccessMode::ReadOnly
                } else {
                    AccessMode::ReadWrite
                };
                Connection::open_with_flags(path, Config::default().access_mode(mode)?)?
            }
        };
        Ok(conn)
    }

    /// Run `query` on a fresh connection and keep the connection with the result.
    pub fn relation(&self, query: &QueryString) -> Result<Relation> {
        let connection = self.connect()?;
        let (frame, error) = match fetch(&connection, query.as_str()) {
            Ok(frame) => (frame, None),
            Err(e) => {
                let message = e.to_string();
                debug!(error = %message, "duckdb rejected query");
                (Frame::exchange(query.as_str(), message.clone()), Some(message))
            }
        };
        Ok(Relation {
            connection,
            frame,
            error,
        })
    }
}

impl Engine for DuckDbEngine {
    fn name(&self) -> &str {
        "duckdb"
    }

    fn run(&self, query: &QueryString) -> Result<Output> {
        let Relation { frame, error, .. } = self.relation(query)?;
        Ok(match error {
            Some(error) => Output::Rejected { frame, error },
            None => Output::Frame(frame),
        })
    }
}

/// A result together with the live connection that produced it.
pub struct Relation {
    connection: Connection,
    frame: Frame,
    error: Option<String>,
}

impl Relation {
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// The database error, when the frame is the synthetic `q`/`r` row.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }
}

fn fetch(conn: &Connection, sql: &str) -> ::duckdb::Result<Frame> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let columns = rows.as_ref().map(|s| s.column_names()).unwrap_or_default();

    let mut data = Vec::new();
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            let value: Value = row.get(i)?;
            cells.push(Cell::from(value));
        }
        data.push(cells);
    }

    Ok(Frame::new(columns, data))
}

impl From<Value> for Cell {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::Boolean(b) => Cell::Bool(b),
            Value::TinyInt(i) => Cell::Int(i.into()),
            Value::SmallInt(i) => Cell::Int(i.into()),
            Value::Int(i) => Cell::Int(i.into()),
            Value::BigInt(i) => Cell::Int(i),
            Value::HugeInt(i) => i64::try_from(i).map_or_else(|_| Cell::Text(i.to_string()), Cell::Int),
            Value::UTinyInt(i) => Cell::Int(i.into()),
            Value::USmallInt(i) => Cell::Int(i.into()),
            Value::UInt(i) => Cell::Int(i.into()),
            Value::UBigInt(i) => i64::try_from(i).map_or_else(|_| Cell::Text(i.to_string()), Cell::Int),
            Value::Float(f) => Cell::Float(f.into()),
            Value::Double(f) => Cell::Float(f),
            Value::Decimal(d) => Cell::Text(d.to_string()),
            Value::Text(s) | Value::Enum(s) => Cell::Text(s),
            Value::Date32(days) => NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
                .map_or_else(|| Cell::Int(days.into()), |d| Cell::Text(d.to_string())),
            Value::Timestamp(unit, v) => DateTime::from_timestamp_micros(to_micros(unit, v))
                .map_or_else(|| Cell::Int(v), |ts| Cell::Text(ts.naive_utc().to_string())),
            Value::Time64(unit, v) => time_of_day(to_micros(unit, v))
                .map_or_else(|| Cell::Int(v), |t| Cell::Text(t.to_string())),
            other => Cell::Text(format!("{other:?}")),
        }
    }
}

/// Days from 0001-01-01 to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

fn time_of_day(micros: i64) -> Option<NaiveTime> {
    let secs = u32::try_from(micros.div_euclid(1_000_000)).ok()?;
    let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000).ok()?;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
}
