//! Tracing subscriber setup with optional daily-rotated file output.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over `level`.
///
/// With `to_file`, logs go to `<log_dir>/keymeter.log.<date>` through a
/// non-blocking writer; the returned guard must live until shutdown so
/// buffered lines are flushed.
pub fn init_logging(level: &str, to_file: bool, log_dir: Option<&str>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if !to_file {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(log_dir.unwrap_or("./logs"), "keymeter.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}
