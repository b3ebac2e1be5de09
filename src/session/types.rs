use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

use super::{normalize_id, now_secs};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Provisioning,
    Running,
    Stopped,
    Failed,
}

impl Status {
    /// Whether `next` is reachable from `self` in one step.
    /// Stopped and Failed are terminal.
    pub fn can_transition_to(self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Provisioning, Status::Running)
                | (Status::Provisioning, Status::Failed)
                | (Status::Running, Status::Stopped)
                | (Status::Running, Status::Failed)
        )
    }

    pub fn is_active(self) -> bool {
        matches!(self, Status::Provisioning | Status::Running)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Provisioning => write!(f, "provisioning"),
            Status::Running => write!(f, "running"),
            Status::Stopped => write!(f, "stopped"),
            Status::Failed => write!(f, "failed"),
        }
    }
}

/// Remote resource owned by a provider-backed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderBinding {
    pub provider: String,
    pub provider_id: Option<String>,
    pub address: Option<String>,
}

/// Which schema a session record follows.
///
/// Records written before provider tracking existed carry no provider and are
/// only eligible for local removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Legacy,
    Provider(ProviderBinding),
}

/// A tracked sandbox session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SessionRecord", into = "SessionRecord")]
pub struct Session {
    pub id: String,
    pub status: Status,
    pub(super) created_at: u64,
    pub timeout: Option<Duration>,
    pub backend: Backend,
}

impl Session {
    /// A new provider-backed session in the Provisioning state.
    pub fn new(id: &str, provider: &str, timeout: Option<Duration>) -> Self {
        Self {
            id: normalize_id(id),
            status: Status::Provisioning,
            created_at: now_secs(),
            timeout,
            backend: Backend::Provider(ProviderBinding {
                provider: provider.to_string(),
                provider_id: None,
                address: None,
            }),
        }
    }

    /// Seconds since the Unix epoch at which the session was created.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self.backend, Backend::Legacy)
    }

    pub fn binding(&self) -> Option<&ProviderBinding> {
        match &self.backend {
            Backend::Provider(binding) => Some(binding),
            Backend::Legacy => None,
        }
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.binding().map(|b| b.provider.as_str())
    }

    pub fn provider_id(&self) -> Option<&str> {
        self.binding().and_then(|b| b.provider_id.as_deref())
    }

    pub fn address(&self) -> Option<&str> {
        self.binding().and_then(|b| b.address.as_deref())
    }

    /// Record provider-assigned identifiers. Empty values are ignored.
    pub fn record_provider(
        &mut self,
        provider_id: Option<String>,
        address: Option<String>,
    ) -> Result<(), SessionError> {
        let Backend::Provider(binding) = &mut self.backend else {
            return Err(SessionError::LegacySession {
                id: self.id.clone(),
            });
        };
        if let Some(pid) = provider_id.filter(|s| !s.is_empty()) {
            binding.provider_id = Some(pid);
        }
        if let Some(addr) = address.filter(|s| !s.is_empty()) {
            binding.address = Some(addr);
        }
        Ok(())
    }

    /// Move to `next`, enforcing the lifecycle graph.
    ///
    /// Legacy sessions reject every transition. Entering Running requires a
    /// provider id and network address.
    pub fn transition(&mut self, next: Status) -> Result<(), SessionError> {
        if self.is_legacy() {
            return Err(SessionError::LegacySession {
                id: self.id.clone(),
            });
        }
        if !self.status.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        let previous = self.status;
        self.status = next;
        if let Err(e) = self.validate() {
            self.status = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Check the record-level invariants required before persisting.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.id.trim().is_empty() {
            return Err(SessionError::Validation("session id is required".to_string()));
        }
        if let Backend::Provider(binding) = &self.backend {
            if binding.provider.is_empty() {
                return Err(SessionError::Validation(format!(
                    "session '{}' has no provider",
                    self.id
                )));
            }
            if self.status == Status::Running {
                let has_id = binding.provider_id.as_deref().is_some_and(|s| !s.is_empty());
                let has_addr = binding.address.as_deref().is_some_and(|s| !s.is_empty());
                if !has_id || !has_addr {
                    return Err(SessionError::Validation(format!(
                        "running session '{}' needs a provider id and network address",
                        self.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Auto-expiry deadline in seconds since the epoch, if a timeout is set.
    pub fn expires_at(&self) -> Option<u64> {
        self.timeout
            .map(|t| self.created_at.saturating_add(t.as_secs()))
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at().is_some_and(|deadline| now >= deadline)
    }
}

/// On-disk shape of a session. Unknown fields are ignored on read.
#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    #[serde(default)]
    id: String,
    status: Status,
    #[serde(default)]
    created_at: u64,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout: Option<u64>,
    #[serde(default)]
    provider: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    provider_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    ip_address: String,
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

impl From<SessionRecord> for Session {
    fn from(record: SessionRecord) -> Self {
        let backend = if record.provider.is_empty() {
            Backend::Legacy
        } else {
            Backend::Provider(ProviderBinding {
                provider: record.provider,
                provider_id: non_empty(record.provider_id),
                address: non_empty(record.ip_address),
            })
        };
        Self {
            id: normalize_id(&record.id),
            status: record.status,
            created_at: record.created_at,
            timeout: record.timeout.map(Duration::from_secs),
            backend,
        }
    }
}

impl From<Session> for SessionRecord {
    fn from(session: Session) -> Self {
        let (provider, provider_id, ip_address) = match session.backend {
            Backend::Legacy => (String::new(), String::new(), String::new()),
            Backend::Provider(b) => (
                b.provider,
                b.provider_id.unwrap_or_default(),
                b.address.unwrap_or_default(),
            ),
        };
        Self {
            id: session.id,
            status: session.status,
            created_at: session.created_at,
            timeout: session.timeout.map(|t| t.as_secs()),
            provider,
            provider_id,
            ip_address,
        }
    }
}
