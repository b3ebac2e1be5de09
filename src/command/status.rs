use anyhow::{Context, Result};
use console::style;
use tracing::debug;

use crate::config::Config;
use crate::provider::{LimaProvider, Provider};
use crate::session::{Backend, now_secs};

pub fn run(id: &str) -> Result<()> {
    let config = Config::load()?;
    let store = super::open_store(&config);
    let session = store
        .get(id)
        .with_context(|| format!("No session named '{id}'"))?;
    let now = now_secs();

    println!("{}", style(&session.id).bold());
    println!("  Status:   {}", session.status);
    println!(
        "  Age:      {}",
        super::format_duration(now.saturating_sub(session.created_at()))
    );
    match session.expires_at() {
        Some(_) if session.is_expired(now) => println!("  Expires:  {}", style("expired").red()),
        Some(at) => println!("  Expires:  in {}", super::format_duration(at - now)),
        None => {}
    }

    let binding = match &session.backend {
        Backend::Legacy => {
            println!("  Provider: {}", style("(legacy record, no remote resource)").dim());
            return Ok(());
        }
        Backend::Provider(binding) => binding,
    };
    println!("  Provider: {}", binding.provider);
    println!("  VM:       {}", binding.provider_id.as_deref().unwrap_or("-"));
    println!("  Address:  {}", binding.address.as_deref().unwrap_or("-"));

    let provider = super::lima_provider(&config);
    if binding.provider != provider.name() || LimaProvider::ensure_available().is_err() {
        return Ok(());
    }
    let target = binding
        .provider_id
        .clone()
        .unwrap_or_else(|| provider.resource_id(&session.id));
    match provider.get(&target) {
        Ok(instance) => {
            let state = if instance.running { "running" } else { "stopped" };
            println!("  Remote:   {} ({})", instance.name, state);
        }
        Err(e) => {
            debug!(session = %session.id, error = %e, "status:remote lookup failed");
            println!("  Remote:   {}", style(e.to_string()).yellow());
        }
    }
    Ok(())
}
