use anyhow::{Context, Result};
use console::style;

use crate::config::Config;
use crate::error::{ErrorKind, SessionError};
use crate::spinner::with_spinner;
use crate::workflow::{DestroyOutcome, RemoteOutcome, TeardownHandler};

pub fn run(id: &str, yes: bool) -> Result<()> {
    let config = Config::load()?;
    let store = super::open_store(&config);
    let provider = super::lima_provider(&config);
    let handler = TeardownHandler::new(&store, &provider);

    let outcome = match handler.destroy(id, yes) {
        Err(SessionError::ConfirmationRequired { id }) => {
            if !super::confirm(&format!("Destroy session '{id}' and its VM?"))? {
                println!("Aborted.");
                return Ok(());
            }
            with_spinner(&format!("Destroying {id}"), || Ok(handler.destroy(&id, true)?))
        }
        Err(e) if e.is(ErrorKind::NotFound) => {
            return Err(e).with_context(|| format!("No session named '{id}'"));
        }
        other => other.map_err(anyhow::Error::from),
    }
    .with_context(|| format!("Failed to destroy session '{id}'"))?;

    report(&outcome);
    Ok(())
}

pub(crate) fn report(outcome: &DestroyOutcome) {
    let remote = match outcome.remote {
        RemoteOutcome::Deleted => "VM deleted",
        RemoteOutcome::AlreadyAbsent => "VM was already gone",
        RemoteOutcome::Skipped => "legacy record, no VM",
    };
    println!("✓ Destroyed {} ({})", style(&outcome.session.id).bold(), remote);
    if !outcome.local_removed {
        println!(
            "  {}",
            style("Warning: the session record could not be removed; see the log for details")
                .yellow()
        );
    }
}
