use std::io::IsTerminal;
use std::path::Path;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE_PREFIX: &str = "sheets_relay.log";
const DEFAULT_DIRECTIVES: &str = "sheets_relay=info,tower_http=info";

/// Installs the global subscriber: compact console output plus JSON lines in
/// `log_dir`, rotated daily.
///
/// The returned guard flushes the file writer when dropped; hold it for the
/// lifetime of the process.
pub fn init_logging(log_dir: &Path) -> WorkerGuard {
    // RUST_LOG wins when set
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    let (subscriber, guard) = build_subscriber(log_dir, filter);
    subscriber.init();
    guard
}

fn build_subscriber(log_dir: &Path, filter: EnvFilter) -> (impl Subscriber + Send + Sync + 'static, WorkerGuard) {
    let _ = std::fs::create_dir_all(log_dir);

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX));

    let file_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_writer(file_writer);

    // request spans from TraceLayer report their duration on close
    let console_layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal())
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stdout);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer);

    (subscriber, guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_events_are_written_as_json_lines() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("logs");

        let (subscriber, guard) = build_subscriber(&dir, EnvFilter::new("info"));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(sheet_id = "test-sheet", values = 3, "Row appended");
            tracing::debug!("filtered out");
        });
        drop(guard);

        let contents: String = fs::read_dir(&dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map_or(false, |name| name.starts_with(LOG_FILE_PREFIX))
            })
            .map(|path| fs::read_to_string(path).unwrap())
            .collect();

        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["level"], "INFO");
        assert_eq!(lines[0]["fields"]["message"], "Row appended");
        assert_eq!(lines[0]["fields"]["sheet_id"], "test-sheet");
    }
}
