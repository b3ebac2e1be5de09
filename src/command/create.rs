use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ErrorKind;
use crate::provider::LimaProvider;
use crate::spinner::StepSpinner;
use crate::workflow::{CancelToken, ProvisioningWorkflow, ReadinessPoller, standard_steps};

pub fn run(name: Option<&str>, timeout_secs: Option<u64>, skip_setup: bool) -> Result<()> {
    let config = Config::load()?;
    LimaProvider::ensure_available()?;

    let store = super::open_store(&config);
    let provider = super::lima_provider(&config);
    let settings = config.step_settings(skip_setup);
    let timeout = match timeout_secs {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => config.session_timeout(),
    };

    let cancel = CancelToken::new();
    cancel.cancel_on_interrupt()?;
    let poller = ReadinessPoller::new(config.poll_interval(), cancel);

    let workflow =
        ProvisioningWorkflow::new(&store, &provider, poller).with_observer(StepSpinner::new());
    let session = workflow
        .begin(name, timeout)
        .context("Failed to register session")?;
    info!(session = %session.id, skip_setup, "create:provisioning");
    println!("Provisioning session {}", style(&session.id).bold());

    let running = match workflow.run(&session, standard_steps(&provider, &settings)) {
        Ok(running) => running,
        Err(err) => {
            warn!(
                session = %session.id,
                step = err.failed_step().unwrap_or("-"),
                "create:provisioning failed"
            );
            let hint = match err.root_cause().kind() {
                ErrorKind::ReadinessTimeout => Some(format!(
                    "The VM did not become ready within {}s. Raise boot_timeout in ~/.config/agentbox/config.yaml.",
                    config.boot_timeout().as_secs()
                )),
                ErrorKind::Cancelled => Some("Interrupted; the VM has been cleaned up.".to_string()),
                _ => None,
            };
            if let Some(hint) = hint {
                eprintln!("{}", style(hint).yellow());
            }
            return Err(err).with_context(|| format!("Failed to provision session '{}'", session.id));
        }
    };

    println!();
    println!("✓ Session {} is running", style(&running.id).bold().green());
    if let Some(address) = running.address() {
        println!("  Address: {}", address);
    }
    if let Some(vm) = running.provider_id() {
        println!("  Shell:   {}", style(format!("limactl shell {vm}")).dim());
    }
    if let Some(expires_at) = running.expires_at() {
        let remaining = expires_at.saturating_sub(running.created_at());
        println!("  Expires: in {}", super::format_duration(remaining));
    }
    Ok(())
}
