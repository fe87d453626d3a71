//! Timed execution.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info};

use super::{EngineRegistry, Output};
use crate::error::Result;
use crate::query::{timestamp_id, QueryString};

/// What happened the last time a query string was run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRecord {
    pub exec_id: u64,
    pub engine: String,
    pub duration: Duration,
    /// `(rows, columns)` of the output.
    pub shape: (usize, usize),
}

/// Look up `key`, run `query` on it and time the call.
///
/// Logs a one-line summary on success and the error on failure, both
/// suppressed when the query is quiet. Errors are returned unchanged. A query
/// the engine rejected in-band is recorded with shape `(0, 0)`.
pub fn run_timed(
    registry: &EngineRegistry,
    key: &str,
    query: &QueryString,
) -> Result<(Output, ExecutionRecord)> {
    let quiet = query.is_quiet();
    let exec_id = timestamp_id();
    let start = Instant::now();

    let result = registry
        .get(key)
        .and_then(|engine| Ok((engine.name().to_string(), engine.run(query)?)));
    let duration = start.elapsed();

    match result {
        Ok((engine, output)) => {
            let (rows, cols) = output.shape();
            if !quiet {
                match output.error() {
                    Some(message) => error!("{engine}: {message}"),
                    None => info!(
                        "{}: {} rows x {} cols in {:.4} sec",
                        engine,
                        rows,
                        cols,
                        duration.as_secs_f64()
                    ),
                }
            }
            let record = ExecutionRecord {
                exec_id,
                engine,
                duration,
                shape: (rows, cols),
            };
            Ok((output, record))
        }
        Err(e) => {
            if !quiet {
                error!("Error: {e}");
            }
            Err(e)
        }
    }
}
