//! Reverse provisioning: delete the remote resource and drop the local record.

use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::provider::{Provider, ProviderError};
use crate::session::{Backend, Session, SessionStore};

/// What happened to the remote resource during a destroy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    Deleted,
    AlreadyAbsent,
    /// Legacy session; nothing remote is tracked.
    Skipped,
}

#[derive(Debug)]
pub struct DestroyOutcome {
    pub session: Session,
    pub remote: RemoteOutcome,
    /// False when the remote resource is gone but the record could not be removed.
    pub local_removed: bool,
}

pub struct TeardownHandler<'a> {
    store: &'a SessionStore,
    provider: &'a dyn Provider,
}

impl<'a> TeardownHandler<'a> {
    pub fn new(store: &'a SessionStore, provider: &'a dyn Provider) -> Self {
        Self { store, provider }
    }

    /// Destroy a session's remote resource and remove its record.
    ///
    /// `confirmed` is the caller's confirmation gate. A missing remote resource
    /// counts as deleted. If the delete call itself fails, the resource is
    /// fetched once more and treated as deleted only if the provider reports
    /// it gone. Failing to remove the local record after the remote side is
    /// gone is logged, not returned.
    pub fn destroy(&self, id: &str, confirmed: bool) -> Result<DestroyOutcome, SessionError> {
        let session = self.store.get(id)?;
        if !confirmed {
            return Err(SessionError::ConfirmationRequired {
                id: session.id.clone(),
            });
        }

        let remote = match &session.backend {
            Backend::Legacy => {
                debug!(session = %session.id, "teardown:legacy session, local removal only");
                RemoteOutcome::Skipped
            }
            Backend::Provider(binding) => {
                if binding.provider != self.provider.name() {
                    return Err(SessionError::Validation(format!(
                        "session '{}' belongs to provider '{}', not '{}'",
                        session.id,
                        binding.provider,
                        self.provider.name()
                    )));
                }
                let target = session
                    .provider_id()
                    .map(str::to_string)
                    .unwrap_or_else(|| self.provider.resource_id(&session.id));
                self.delete_remote(&target)?
            }
        };

        let local_removed = match self.store.remove(&session.id) {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    session = %session.id,
                    error = %e,
                    "teardown:remote resource gone but local record could not be removed"
                );
                false
            }
        };

        info!(session = %session.id, ?remote, local_removed, "teardown:destroyed");
        Ok(DestroyOutcome {
            session,
            remote,
            local_removed,
        })
    }

    /// Best-effort delete after a failed provisioning run. Errors are logged.
    pub fn rollback(&self, session_id: &str, provider_id: &str) {
        info!(session = session_id, provider_id, "teardown:rollback");
        match self.provider.delete(provider_id) {
            Ok(()) => info!(session = session_id, provider_id, "teardown:rollback deleted"),
            Err(ProviderError::NotFound { .. }) => {
                debug!(session = session_id, provider_id, "teardown:rollback nothing to delete")
            }
            Err(e) => warn!(
                session = session_id,
                provider_id,
                error = %e,
                "teardown:rollback delete failed"
            ),
        }
    }

    fn delete_remote(&self, target: &str) -> Result<RemoteOutcome, SessionError> {
        debug!(provider_id = target, "teardown:remote delete");
        match self.provider.delete(target) {
            Ok(()) => Ok(RemoteOutcome::Deleted),
            Err(ProviderError::NotFound { .. }) => Ok(RemoteOutcome::AlreadyAbsent),
            Err(delete_err) => {
                warn!(provider_id = target, error = %delete_err, "teardown:delete failed, re-checking");
                match self.provider.get(target) {
                    Err(ProviderError::NotFound { .. }) => Ok(RemoteOutcome::AlreadyAbsent),
                    _ => Err(delete_err.into()),
                }
            }
        }
    }
}
