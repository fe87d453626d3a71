//! Log setup.
//!
//! Every line is framed as a SQL block comment so that logs interleaved with
//! query text still read as SQL:
//!
//! ```text
//! /* 261017@09:15:02|INFO|qstrings[0.3.0]::engine::timing:47|duckdb: 1 rows x 1 cols in 0.0021 sec */
//! ```

use std::fmt;

use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a log filter directive.
pub const LOG_ENV: &str = "QSTRINGS_LOG";

/// Event format `/* time|LEVEL|crate[version]::module:line|message */`.
#[derive(Debug, Clone)]
pub struct SqlCommentFormat {
    version: &'static str,
}

impl Default for SqlCommentFormat {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

impl<S, N> FormatEvent<S, N> for SqlCommentFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let now = chrono::Local::now().format("%y%m%d@%H:%M:%S");

        let target = meta.target();
        let (head, tail) = match target.split_once("::") {
            Some((head, tail)) => (head, Some(tail)),
            None => (target, None),
        };

        write!(writer, "/* {}|{}|{}[{}]", now, meta.level(), head, self.version)?;
        if let Some(tail) = tail {
            write!(writer, "::{tail}")?;
        }
        if let Some(line) = meta.line() {
            write!(writer, ":{line}")?;
        }
        write!(writer, "|")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer, " */")
    }
}

/// Install the global subscriber, writing to stderr.
///
/// `QSTRINGS_LOG` overrides `default_level` when set. Calling this twice is
/// harmless.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(format!("qstrings={default_level}")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .event_format(SqlCommentFormat::default())
        .try_init();
}

/// Run `f` with a subscriber that writes formatted events into a buffer,
/// and return what was written.
#[cfg(test)]
pub(crate) fn capture(f: impl FnOnce()) -> String {
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let buffer = Buffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .event_format(SqlCommentFormat::default())
        .with_writer(move || writer.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, f);

    let bytes = buffer.0.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}
