//! Logging initialisation for uggcli.
//!
//! The terminal surface owns stdout for the whole run, so structured logs
//! are written to `uggcli.log` in the working directory instead. The level
//! comes from the `--loglevel` flag; `RUST_LOG` overrides it when set.
//!
//! Returns a guard that must be kept alive for the duration of the process
//! so that buffered log lines are flushed on exit.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE: &str = "uggcli.log";

pub struct LogGuard {
    _file_guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Initialise the global tracing subscriber.
///
/// Call once from `main`, store the returned `LogGuard` in a local variable
/// for the duration of the process. `loglevel` is `"info"` or `"debug"`.
pub fn init(loglevel: &str) -> LogGuard {
    let default_filter = match loglevel {
        "debug" => "debug",
        _ => "info",
    };

    let file_appender = tracing_appender::rolling::never(".", LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with(file_layer)
        .init();

    LogGuard { _file_guard: guard }
}
