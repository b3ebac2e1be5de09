use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::provider::CreateOptions;
use crate::workflow::{DEFAULT_POLL_INTERVAL, StepSettings};

/// Environment variable that overrides `store_path`.
pub const STORE_ENV: &str = "AGENTBOX_STORE";

const DEFAULT_BOOT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_BOOT_MARKER: &str = "/var/lib/cloud/instance/boot-finished";

const SYSTEM_SETUP_SCRIPT: &str = "\
sudo DEBIAN_FRONTEND=noninteractive apt-get update -q
sudo DEBIAN_FRONTEND=noninteractive apt-get install -y --no-install-recommends curl ca-certificates git";

const AGENT_SETUP_SCRIPT: &str = "curl -fsSL https://claude.ai/install.sh | bash";

/// Resources for sandbox VMs.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct ProviderConfig {
    /// Number of CPUs. Default: 4
    #[serde(default)]
    pub cpus: Option<u32>,

    /// Memory (e.g. "4GiB", "8GiB"). Default: "4GiB"
    #[serde(default)]
    pub memory: Option<String>,

    /// Disk size (e.g. "100GiB"). Default: "50GiB"
    #[serde(default)]
    pub disk: Option<String>,

    /// Image location. Default: Debian 12 genericcloud for the host architecture
    #[serde(default)]
    pub image: Option<String>,
}

impl ProviderConfig {
    pub fn cpus(&self) -> u32 {
        self.cpus.unwrap_or(4)
    }

    pub fn memory(&self) -> &str {
        self.memory.as_deref().unwrap_or("4GiB")
    }

    pub fn disk(&self) -> &str {
        self.disk.as_deref().unwrap_or("50GiB")
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// Configuration for agentbox, read from ~/.config/agentbox/config.yaml
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// Session registry file. Default: ~/.local/share/agentbox/sessions.json
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    /// Lifetime of new sessions in seconds. Default: none
    #[serde(default)]
    pub session_timeout: Option<u64>,

    /// Seconds to wait for a VM to boot. Default: 300
    #[serde(default)]
    pub boot_timeout: Option<u64>,

    /// Seconds between readiness checks. Default: 2
    #[serde(default)]
    pub poll_interval: Option<u64>,

    #[serde(default)]
    pub provider: ProviderConfig,

    /// Scripts run in the guest after boot, in order.
    /// Default installs curl, git and the agent CLI. An empty list disables setup.
    #[serde(default)]
    pub setup: Option<Vec<String>>,

    /// Guest path that appears once first boot has finished.
    /// Default: /var/lib/cloud/instance/boot-finished. Empty disables the check.
    #[serde(default)]
    pub boot_marker: Option<String>,
}

impl Config {
    /// Load the global configuration, falling back to defaults when absent.
    pub fn load() -> anyhow::Result<Self> {
        let config = Self::load_global()?.unwrap_or_default();
        debug!(
            store = %config.store_path().display(),
            boot_timeout = config.boot_timeout().as_secs(),
            "config:loaded"
        );
        Ok(config)
    }

    fn load_from_path(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        debug!(path = %path.display(), "config:reading file");
        let contents = fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Ok(Some(Self::default()));
        }
        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse config at {}: {}", path.display(), e))?;
        Ok(Some(config))
    }

    fn load_global() -> anyhow::Result<Option<Self>> {
        if let Some(home_dir) = home::home_dir() {
            let yaml = home_dir.join(".config/agentbox/config.yaml");
            if yaml.exists() {
                return Self::load_from_path(&yaml);
            }
            let yml = home_dir.join(".config/agentbox/config.yml");
            if yml.exists() {
                return Self::load_from_path(&yml);
            }
        }
        Ok(None)
    }

    /// Session registry path. `AGENTBOX_STORE` wins over the config file.
    pub fn store_path(&self) -> PathBuf {
        if let Ok(path) = env::var(STORE_ENV)
            && !path.is_empty()
        {
            return PathBuf::from(path);
        }
        if let Some(path) = &self.store_path {
            return path.clone();
        }
        default_store_path()
    }

    pub fn session_timeout(&self) -> Option<Duration> {
        self.session_timeout
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }

    pub fn boot_timeout(&self) -> Duration {
        Duration::from_secs(self.boot_timeout.unwrap_or(DEFAULT_BOOT_TIMEOUT_SECS))
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    pub fn setup_scripts(&self) -> Vec<String> {
        match &self.setup {
            Some(scripts) => scripts
                .iter()
                .filter(|s| !s.trim().is_empty())
                .cloned()
                .collect(),
            None => vec![
                SYSTEM_SETUP_SCRIPT.to_string(),
                AGENT_SETUP_SCRIPT.to_string(),
            ],
        }
    }

    pub fn boot_marker(&self) -> Option<&str> {
        match self.boot_marker.as_deref() {
            Some(marker) if marker.trim().is_empty() => None,
            Some(marker) => Some(marker),
            None => Some(DEFAULT_BOOT_MARKER),
        }
    }

    /// Settings for the standard provisioning steps.
    pub fn step_settings(&self, skip_setup: bool) -> StepSettings {
        StepSettings {
            create: CreateOptions {
                name: String::new(),
                cpus: self.provider.cpus(),
                memory: self.provider.memory().to_string(),
                disk: self.provider.disk().to_string(),
                image: self.provider.image().map(str::to_string),
            },
            boot_timeout: self.boot_timeout(),
            boot_marker: self.boot_marker().map(str::to_string),
            setup: if skip_setup {
                Vec::new()
            } else {
                self.setup_scripts()
            },
        }
    }
}

fn default_store_path() -> PathBuf {
    if let Ok(data_home) = env::var("XDG_DATA_HOME")
        && !data_home.is_empty()
    {
        return PathBuf::from(data_home)
            .join("agentbox")
            .join("sessions.json");
    }
    match home::home_dir() {
        Some(home_dir) => home_dir
            .join(".local")
            .join("share")
            .join("agentbox")
            .join("sessions.json"),
        None => PathBuf::from("agentbox-sessions.json"),
    }
}
