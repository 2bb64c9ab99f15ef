use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ProjectPaths;

const MAX_LOG_SIZE: u64 = 1024 * 1024; // 1MB

/// Default filter directive for a `-d` count: info, debug, then trace.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

fn env_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)))
}

/// Initialize logging for the bot.
///
/// - `file_logging`: also write to `<data dir>/afkbot/logs/afkbot.log`
/// - `verbosity`: number of `-d` flags; `RUST_LOG` wins when set
///
/// Returns a guard that must be kept alive for the duration of the program.
pub fn init_logging(file_logging: bool, verbosity: u8) -> io::Result<Option<WorkerGuard>> {
    if !file_logging {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter(verbosity))
            .init();
        return Ok(None);
    }

    let log_dir = log_directory()?;
    fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join("afkbot.log");
    truncate_if_needed(&log_path)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    let (non_blocking_file, guard) = tracing_appender::non_blocking(BufWriter::new(file));

    tracing_subscriber::registry()
        .with(env_filter(verbosity))
        .with(fmt::layer().with_writer(io::stdout).with_ansi(true))
        .with(
            fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    tracing::info!("Logging to file: {}", log_path.display());

    Ok(Some(guard))
}

fn log_directory() -> io::Result<PathBuf> {
    ProjectPaths::new("afkbot")
        .map(|paths| paths.log_dir())
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Failed to find home directory"))
}

/// Truncate the log file if it exceeds MAX_LOG_SIZE.
fn truncate_if_needed(log_path: &Path) -> io::Result<()> {
    if log_path.exists() && fs::metadata(log_path)?.len() > MAX_LOG_SIZE {
        File::create(log_path)?.set_len(0)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_verbosity_directives() {
        assert_eq!(default_directive(0), "info");
        assert_eq!(default_directive(1), "debug");
        assert_eq!(default_directive(5), "trace");
    }

    #[test]
    fn test_large_log_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("afkbot.log");

        let mut file = File::create(&path).unwrap();
        file.write_all(&vec![b'x'; MAX_LOG_SIZE as usize + 1]).unwrap();
        drop(file);

        truncate_if_needed(&path).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_small_log_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("afkbot.log");
        fs::write(&path, b"keep me").unwrap();

        truncate_if_needed(&path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"keep me");
    }
}
