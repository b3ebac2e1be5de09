//! Lima VM backend.
//!
//! Each session gets its own VM named `ab-<session id>`.

mod config;
mod limactl;

use std::io::Write;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info};

use super::{CreateOptions, Instance, Provider, ProviderError};
use config::generate_lima_config;
use limactl::{
    LimaInstanceInfo, check_instance_output, check_output, parse_lima_instances, run_limactl,
};

/// Prefix for all agentbox-managed Lima VM names.
pub const VM_PREFIX: &str = "ab-";

const LIST_TIMEOUT: Duration = Duration::from_secs(10);
const ADDRESS_TIMEOUT: Duration = Duration::from_secs(15);
const DELETE_TIMEOUT: Duration = Duration::from_secs(120);

pub struct LimaProvider {
    start_timeout: Duration,
    exec_timeout: Duration,
}

impl LimaProvider {
    pub fn new(start_timeout: Duration, exec_timeout: Duration) -> Self {
        Self {
            start_timeout,
            exec_timeout,
        }
    }

    /// Fail unless limactl is on PATH.
    pub fn ensure_available() -> Result<(), ProviderError> {
        match which::which("limactl") {
            Ok(path) => {
                debug!(path = %path.display(), "lima:limactl found");
                Ok(())
            }
            Err(_) => Err(ProviderError::Unavailable(
                "limactl not found on PATH. Install Lima: https://lima-vm.io/docs/installation/"
                    .to_string(),
            )),
        }
    }

    fn list(&self) -> Result<Vec<LimaInstanceInfo>, ProviderError> {
        let output = check_output(run_limactl(&["list", "--json"], LIST_TIMEOUT)?)?;
        Ok(parse_lima_instances(&output.stdout).context("failed to list Lima instances")?)
    }

    /// First address reported by the guest, if it answers.
    fn guest_address(&self, id: &str) -> Option<String> {
        let output = run_limactl(&["shell", id, "--", "hostname", "-I"], ADDRESS_TIMEOUT)
            .and_then(check_output)
            .ok()?;
        String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .next()
            .map(str::to_string)
    }
}

impl Provider for LimaProvider {
    fn name(&self) -> &str {
        "lima"
    }

    fn resource_id(&self, session_id: &str) -> String {
        format!("{}{}", VM_PREFIX, session_id)
    }

    fn create(&self, opts: &CreateOptions) -> Result<Instance, ProviderError> {
        let id = self.resource_id(&opts.name);
        let yaml = generate_lima_config(opts)?;

        let mut file = tempfile::Builder::new()
            .prefix("agentbox-lima-")
            .suffix(".yaml")
            .tempfile()
            .context("Failed to create Lima config file")?;
        file.write_all(yaml.as_bytes())
            .context("Failed to write Lima config")?;
        let config_path = file.path().to_string_lossy().to_string();

        info!(vm = %id, cpus = opts.cpus, memory = %opts.memory, "lima:creating VM");
        let output = run_limactl(
            &["start", "--name", &id, "--tty=false", &config_path],
            self.start_timeout,
        )?;
        check_output(output)?;

        self.get(&id)
    }

    fn get(&self, id: &str) -> Result<Instance, ProviderError> {
        let info = self
            .list()?
            .into_iter()
            .find(|i| i.name == id)
            .ok_or_else(|| ProviderError::NotFound { id: id.to_string() })?;

        let running = info.is_running();
        let address = if running { self.guest_address(id) } else { None };
        Ok(Instance {
            id: info.name.clone(),
            name: info
                .name
                .strip_prefix(VM_PREFIX)
                .unwrap_or(&info.name)
                .to_string(),
            address,
            running,
        })
    }

    fn delete(&self, id: &str) -> Result<(), ProviderError> {
        info!(vm = %id, "lima:deleting VM");
        let output = run_limactl(&["delete", "--force", id], DELETE_TIMEOUT)?;
        check_instance_output(output, id)?;
        Ok(())
    }

    fn exec(&self, id: &str, command: &str) -> Result<String, ProviderError> {
        let output = run_limactl(&["shell", id, "--", "sh", "-c", command], self.exec_timeout)?;
        // Guest command failures are never a missing instance.
        let output = check_output(output)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_is_prefixed() {
        let provider = LimaProvider::new(Duration::from_secs(1), Duration::from_secs(1));
        assert_eq!(provider.resource_id("alice"), "ab-alice");
        assert_eq!(provider.name(), "lima");
    }
}
