use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

/// Installs the global tracing subscriber: env-filtered (default `info`),
/// writing to a daily-rolling log file. The returned guard must be held for
/// the life of the process or buffered log lines are lost.
pub fn init_tracing(log_dir: &Path) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, "sparkbook.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    guard
}
