use anyhow::{Result, bail};
use console::style;
use tracing::warn;

use crate::config::Config;
use crate::session::{Session, Status, now_secs};
use crate::spinner::with_spinner;
use crate::workflow::TeardownHandler;

/// Active sessions past their deadline, then ended (failed or stopped) ones.
fn select(expired: Vec<Session>, all: Vec<Session>) -> Vec<(Session, &'static str)> {
    let ended = all.into_iter().filter_map(|s| match s.status {
        Status::Failed => Some((s, "failed")),
        Status::Stopped => Some((s, "stopped")),
        _ => None,
    });
    expired
        .into_iter()
        .map(|s| (s, "expired"))
        .chain(ended)
        .collect()
}

pub fn run(yes: bool) -> Result<()> {
    let config = Config::load()?;
    let store = super::open_store(&config);
    let provider = super::lima_provider(&config);

    let candidates = select(store.list_expired(now_secs())?, store.list()?);
    if candidates.is_empty() {
        println!("Nothing to prune");
        return Ok(());
    }

    println!("The following sessions will be destroyed:");
    for (session, reason) in &candidates {
        println!("  - {} ({})", style(&session.id).bold(), reason);
    }

    if !yes && !super::confirm(&format!("\nPrune {} session(s)?", candidates.len()))? {
        println!("Aborted.");
        return Ok(());
    }

    let handler = TeardownHandler::new(&store, &provider);
    let mut failed = 0usize;
    for (session, _) in &candidates {
        let result = with_spinner(&format!("Destroying {}", session.id), || {
            Ok(handler.destroy(&session.id, true)?)
        });
        match result {
            Ok(outcome) => super::destroy::report(&outcome),
            Err(e) => {
                warn!(session = %session.id, error = %e, "prune:destroy failed");
                eprintln!("  {} {}: {:#}", style("✘").red(), session.id, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} session(s) could not be pruned", failed, candidates.len());
    }
    Ok(())
}
