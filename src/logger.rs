use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const LOG_FILE: &str = "agentbox.log";

/// Filter directives, e.g. `debug` or `agentbox=trace`. Wins over `RUST_LOG`.
const FILTER_ENV: &str = "AGENTBOX_LOG";
/// Full path of the log file, replacing the XDG state location.
const FILE_ENV: &str = "AGENTBOX_LOG_FILE";
const DEFAULT_FILTER: &str = "info";

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Route `tracing` output to the agentbox log file. Safe to call more than once.
pub fn init() -> Result<()> {
    if LOG_PATH.get().is_some() {
        return Ok(());
    }

    let log_path = resolve_log_path(
        non_empty_var(FILE_ENV),
        non_empty_var("XDG_STATE_HOME"),
        home::home_dir(),
    )?;
    install(&log_path)?;
    let _ = LOG_PATH.set(log_path);
    Ok(())
}

fn install(log_path: &Path) -> Result<()> {
    let (directory, file_name) = split_path(log_path)?;
    create_log_dir(&directory)
        .with_context(|| format!("Failed to create log directory at {}", directory.display()))?;

    let file_appender = rolling::never(&directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = GUARD.set(guard);

    let directives = filter_directives(non_empty_var(FILTER_ENV), non_empty_var("RUST_LOG"));
    let env_filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("Invalid log filter '{directives}'"))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .with_thread_names(true),
        )
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn filter_directives(agentbox_log: Option<String>, rust_log: Option<String>) -> String {
    agentbox_log
        .or(rust_log)
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Explicit file, then `$XDG_STATE_HOME/agentbox/`, then `~/.local/state/agentbox/`.
fn resolve_log_path(
    explicit: Option<String>,
    state_home: Option<String>,
    home_dir: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(PathBuf::from(path));
    }
    let state_dir = match (state_home, home_dir) {
        (Some(state_home), _) => PathBuf::from(state_home),
        (None, Some(home_dir)) => home_dir.join(".local").join("state"),
        (None, None) => return Ok(env::current_dir()?.join(LOG_FILE)),
    };
    Ok(state_dir.join("agentbox").join(LOG_FILE))
}

/// Owner-only, like the session store directory.
fn create_log_dir(dir: &Path) -> std::io::Result<()> {
    if dir.exists() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}

fn split_path(path: &Path) -> Result<(PathBuf, &str)> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid log file name: {}", path.display()))?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok((dir, file_name))
}
