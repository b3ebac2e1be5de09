//! Remote compute backends that host sandbox sessions.

#[cfg(test)]
pub mod fake;
pub mod lima;

use std::time::Duration;

use crate::error::SessionError;
use crate::workflow::ReadinessPoller;

pub use lima::LimaProvider;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Remote resource not found: {id}")]
    NotFound { id: String },

    #[error("{operation} timed out after {}s", timeout.as_secs())]
    Timeout { operation: String, timeout: Duration },

    #[error("{0}")]
    Unavailable(String),

    #[error(transparent)]
    Command(#[from] anyhow::Error),
}

/// Parameters for creating a remote instance.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Session id the instance is created for.
    pub name: String,
    pub cpus: u32,
    pub memory: String,
    pub disk: String,
    /// Image location; the backend picks one when unset.
    pub image: Option<String>,
}

/// A remote instance as reported by its provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub address: Option<String>,
    pub running: bool,
}

impl Instance {
    /// Reachable: running with a known address.
    pub fn is_ready(&self) -> bool {
        self.running && self.address.as_deref().is_some_and(|a| !a.is_empty())
    }
}

/// A backend that creates, inspects and deletes remote sandboxes.
///
/// Calls are synchronous and bounded by the backend's own timeouts. Nothing
/// here retries; callers poll through [`ReadinessPoller`].
pub trait Provider {
    /// Name recorded on sessions owned by this backend.
    fn name(&self) -> &str;

    /// Identifier the backend uses for a session's resource before one has
    /// been reported back by `create`.
    fn resource_id(&self, session_id: &str) -> String {
        session_id.to_string()
    }

    fn create(&self, opts: &CreateOptions) -> Result<Instance, ProviderError>;

    fn get(&self, id: &str) -> Result<Instance, ProviderError>;

    /// Delete the resource. A missing resource yields [`ProviderError::NotFound`].
    fn delete(&self, id: &str) -> Result<(), ProviderError>;

    /// Run a shell command inside the instance and return its stdout.
    fn exec(&self, id: &str, command: &str) -> Result<String, ProviderError>;

    /// Block until the instance is running and has an address.
    fn wait_ready(
        &self,
        id: &str,
        timeout: Duration,
        poller: &ReadinessPoller,
    ) -> Result<(), SessionError> {
        poller.wait_until_ready(
            || {
                let instance = self.get(id)?;
                Ok(instance.is_ready())
            },
            timeout,
        )
    }
}
