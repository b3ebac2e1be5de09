pub mod create;
pub mod destroy;
pub mod list;
pub mod prune;
pub mod status;

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::Config;
use crate::provider::LimaProvider;
use crate::session::SessionStore;

/// Upper bound for a single command run inside a guest (setup scripts included).
const EXEC_TIMEOUT: Duration = Duration::from_secs(15 * 60);

pub(crate) fn open_store(config: &Config) -> SessionStore {
    let store = SessionStore::open(config.store_path());
    debug!(path = %store.path().display(), "command:session store");
    store
}

pub(crate) fn lima_provider(config: &Config) -> LimaProvider {
    LimaProvider::new(config.boot_timeout(), EXEC_TIMEOUT)
}

/// Ask a yes/no question on stdin. Anything but y/yes is a no.
pub(crate) fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("Failed to read input")?;

    let answer = input.trim().to_ascii_lowercase();
    Ok(matches!(answer.as_str(), "y" | "yes"))
}

/// Compact duration for tables: 45s, 12m, 3h, 2d.
pub(crate) fn format_duration(secs: u64) -> String {
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}
