use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directive for the chosen verbosity
fn filter_directive(debug: bool, quiet: bool) -> &'static str {
    if debug {
        "sitegraph=debug"
    } else if quiet {
        "sitegraph=error"
    } else {
        "sitegraph=info"
    }
}

/// Initialize logging based on output mode and debug flag.
///
/// When a log file is given, the returned guard must be held until exit so
/// buffered lines are flushed.
pub fn init_logging(
    debug: bool,
    quiet: bool,
    log_file: Option<PathBuf>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::new(filter_directive(debug, quiet));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(debug)
        .with_file(debug)
        .with_writer(std::io::stderr);

    if let Some(log_path) = log_file {
        let (dir, name) = split_log_path(&log_path)?;
        std::fs::create_dir_all(&dir)?;

        let appender = tracing_appender::rolling::never(&dir, name);
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .with_target(true)
            .with_line_number(true)
            .with_file(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(file_layer)
            .init();

        Ok(Some(guard))
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();

        Ok(None)
    }
}

fn split_log_path(path: &Path) -> anyhow::Result<(PathBuf, String)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("log file path has no file name: {}", path.display()))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((dir, name.to_string()))
}

/// Get default log file path for a command run
pub fn default_log_path(command: &str) -> anyhow::Result<PathBuf> {
    let log_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("sitegraph")
        .join("logs");

    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let filename = format!("{}-{}.log", command, timestamp);

    Ok(log_dir.join(filename))
}
