//! Logging initialization.
//!
//! Thin wrapper over the observability crate so binaries only need one call.
//! Logs go to `~/.heimdall/logs/session.jsonl` (or the given path) and,
//! optionally, to stderr.

use observability::{LogConfig, LogFormat};
use std::path::PathBuf;

/// Initialize logging for the default `heimdall` service with stderr output.
///
/// The file format is read from `HEIMDALL_LOG_FORMAT` (`json` or `pretty`).
pub fn init_logging(level: &str) -> std::io::Result<()> {
    init_logging_for_service("heimdall", level, None)
}

/// Initialize logging with a custom service name and optional log file path.
pub fn init_logging_for_service(
    service_name: &str,
    level: &str,
    log_path: Option<PathBuf>,
) -> std::io::Result<()> {
    let format = std::env::var("HEIMDALL_LOG_FORMAT")
        .map(|name| LogFormat::from_name(&name))
        .unwrap_or_default();

    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        log_path,
        also_stderr: true,
        format,
    })
}
