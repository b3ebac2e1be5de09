//! The step list used to provision a sandbox VM.

use std::time::Duration;

use tracing::debug;

use crate::error::SessionError;
use crate::provider::{CreateOptions, Provider, ProviderError};

use super::{Step, StepContext};

/// Inputs for [`standard_steps`].
#[derive(Debug, Clone)]
pub struct StepSettings {
    /// Resource template; the name is filled in per session.
    pub create: CreateOptions,
    pub boot_timeout: Duration,
    /// Guest path whose existence marks the end of first boot.
    pub boot_marker: Option<String>,
    /// Shell scripts run in the guest, in order, after boot.
    pub setup: Vec<String>,
}

fn require_provider_id(ctx: &StepContext) -> Result<String, SessionError> {
    ctx.provider_id
        .clone()
        .ok_or_else(|| SessionError::Validation("no remote resource has been created".to_string()))
}

/// Build the ordered provisioning steps:
/// `create`, `wait-ready`, `wait-boot-marker`, `setup:<n>`, `resolve-address`.
pub fn standard_steps<'a>(provider: &'a dyn Provider, settings: &'a StepSettings) -> Vec<Step<'a>> {
    let mut steps = Vec::new();

    steps.push(Step::new("create", move |ctx: &mut StepContext| {
        let opts = CreateOptions {
            name: ctx.session_id.clone(),
            ..settings.create.clone()
        };
        let instance = provider.create(&opts)?;
        debug!(provider_id = %instance.id, "steps:created");
        ctx.provider_id = Some(instance.id);
        ctx.address = instance.address;
        Ok(())
    }));

    steps.push(Step::new("wait-ready", move |ctx: &mut StepContext| {
        let id = require_provider_id(ctx)?;
        provider.wait_ready(&id, settings.boot_timeout, &ctx.poller)
    }));

    if let Some(marker) = settings.boot_marker.as_deref() {
        steps.push(Step::new("wait-boot-marker", move |ctx: &mut StepContext| {
            let id = require_provider_id(ctx)?;
            let probe = format!("test -f '{}'", marker.replace('\'', "'\\''"));
            ctx.poller.wait_until_ready(
                || match provider.exec(&id, &probe) {
                    Ok(_) => Ok(true),
                    // Non-zero exit or a slow guest: not there yet.
                    Err(ProviderError::Command(_)) | Err(ProviderError::Timeout { .. }) => {
                        Ok(false)
                    }
                    Err(e) => Err(e.into()),
                },
                settings.boot_timeout,
            )
        }));
    }

    for (idx, script) in settings.setup.iter().enumerate() {
        steps.push(Step::new(format!("setup:{}", idx + 1), move |ctx: &mut StepContext| {
            let id = require_provider_id(ctx)?;
            let output = provider.exec(&id, script)?;
            debug!(step = idx + 1, bytes = output.len(), "steps:setup finished");
            Ok(())
        }));
    }

    steps.push(Step::new("resolve-address", move |ctx: &mut StepContext| {
        let id = require_provider_id(ctx)?;
        let instance = provider.get(&id)?;
        if instance.address.is_some() {
            ctx.address = instance.address;
        }
        Ok(())
    }));

    steps
}
