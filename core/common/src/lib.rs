use crate::error::CommonError;
use std::path::Path;
use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::time::ChronoUtc;
pub mod error;

/// Parse the max log level from the configuration text, e.g. `INFO` or `debug`.
pub fn parse_log_level(max_log_level: &str) -> Result<Level, CommonError> {
    Ok(Level::from_str(max_log_level.trim())?)
}

/// Init the logger.
///
/// When a log folder is given the log goes to a daily rolling file under it,
/// otherwise it goes to stdout. The returned guard must be kept alive for the
/// whole process, dropping it stops the background writer.
pub fn init_logger(
    // The folder to store the log file, stdout when absent
    log_folder: Option<&Path>,
    // The log name prefix
    log_name_prefix: &str,
    // The max log level
    max_log_level: &str,
) -> Result<WorkerGuard, CommonError> {
    let max_log_level = parse_log_level(max_log_level)?;
    let (trace_writer, trace_appender_guard): (NonBlocking, WorkerGuard) = match log_folder {
        Some(log_folder) => tracing_appender::non_blocking(tracing_appender::rolling::daily(
            log_folder,
            log_name_prefix,
        )),
        None => tracing_appender::non_blocking(std::io::stdout()),
    };
    tracing_subscriber::fmt()
        .with_max_level(max_log_level)
        .with_writer(trace_writer)
        .with_line_number(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_ansi(false)
        .try_init()
        .map_err(|e| CommonError::InstallLogger(e.to_string()))?;
    Ok(trace_appender_guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitive_levels() {
        assert_eq!(parse_log_level("INFO").unwrap(), Level::INFO);
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level(" warn ").unwrap(), Level::WARN);
    }

    #[test]
    fn rejects_unknown_level() {
        assert!(matches!(
            parse_log_level("chatty"),
            Err(CommonError::ParseLogLevel(_))
        ));
    }

    #[test]
    fn file_logger_writes_into_folder() {
        let log_folder = tempfile::tempdir().unwrap();
        let guard = init_logger(Some(log_folder.path()), "gateway-test.log", "INFO").unwrap();
        tracing::info!("logger initialized");
        drop(guard);
        let entries = std::fs::read_dir(log_folder.path()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
