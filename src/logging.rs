use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::Registry,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::error::{MediaSharingError, Result};

const LOG_FILE_PREFIX: &str = "media-sharing.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_dir: Option<PathBuf>,
    pub console_enabled: bool,
    pub file_enabled: bool,
    pub json_format: bool,
    pub max_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            console_enabled: true,
            file_enabled: false,
            json_format: false,
            max_files: 5,
        }
    }
}

impl LogConfig {
    pub fn development() -> Self {
        Self {
            console_enabled: true,
            file_enabled: false,
            json_format: false,
            ..Default::default()
        }
    }

    pub fn production(log_dir: PathBuf) -> Self {
        Self {
            log_dir: Some(log_dir),
            console_enabled: false,
            file_enabled: true,
            json_format: true,
            max_files: 5,
        }
    }
}

fn get_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "media_sharing=debug,\
             media_sharing::db=info,\
             media_sharing::p2p=debug,\
             media_sharing::services=debug,\
             media_sharing_demo=info",
        )
    })
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: LogConfig) -> Result<()> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if config.console_enabled {
        layers.push(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE)
                .with_filter(get_env_filter())
                .boxed(),
        );
    }

    if let Some(log_dir) = config.log_dir.as_ref().filter(|_| config.file_enabled) {
        std::fs::create_dir_all(log_dir)?;
        cleanup_old_logs(log_dir, config.max_files)?;

        let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX);
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        let file_layer = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(get_env_filter())
                .boxed()
        } else {
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_filter(get_env_filter())
                .boxed()
        };
        layers.push(file_layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| MediaSharingError::Internal(format!("Logging already initialised: {}", e)))?;

    if let Some(guard) = guard {
        LOG_GUARD.set(guard).ok();
    }
    Ok(())
}

fn is_log_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with(LOG_FILE_PREFIX))
        .unwrap_or(false)
}

/// Keep the `max_files` most recently modified log files
pub fn cleanup_old_logs(log_dir: &Path, max_files: usize) -> Result<()> {
    if !log_dir.exists() {
        return Ok(());
    }

    let mut entries: Vec<_> = std::fs::read_dir(log_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| is_log_file(&e.path()))
        .collect();

    entries.sort_by_key(|e| {
        e.metadata()
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
    });

    if entries.len() > max_files {
        let to_remove = entries.len() - max_files;
        for entry in entries.into_iter().take(to_remove) {
            std::fs::remove_file(entry.path())?;
        }
    }

    Ok(())
}
