//! Error taxonomy for the session registry and provisioning lifecycle.
//!
//! Callers branch on [`ErrorKind`] via [`SessionError::kind`] or [`SessionError::is`]
//! rather than matching concrete variants. Provisioning failures wrap the failing
//! step's error; [`SessionError::root_cause`] peels those wrappers off.

use std::path::PathBuf;
use std::time::Duration;

use crate::provider::ProviderError;
use crate::session::Status;

/// Closed set of error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    DuplicateId,
    Validation,
    Provisioning,
    ReadinessTimeout,
    Cancelled,
    LegacySession,
    InvalidTransition,
    PoolExhausted,
    ConfirmationRequired,
    StoreIo,
    Provider,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found: {id}")]
    NotFound { id: String },

    #[error("Session '{id}' already exists")]
    DuplicateId { id: String },

    #[error("Invalid session: {0}")]
    Validation(String),

    #[error("Provisioning step '{step}' failed: {source}")]
    Provisioning {
        step: String,
        #[source]
        source: Box<SessionError>,
    },

    #[error("Timed out after {}s waiting for the sandbox to become ready", waited.as_secs())]
    ReadinessTimeout { waited: Duration },

    #[error("Interrupted")]
    Cancelled,

    #[error("Session '{id}' predates provider tracking and can only be removed locally")]
    LegacySession { id: String },

    #[error("Session '{id}' cannot move from {from} to {to}")]
    InvalidTransition { id: String, from: Status, to: Status },

    #[error("All session names are in use")]
    PoolExhausted,

    #[error("Destroying session '{id}' requires confirmation")]
    ConfirmationRequired { id: String },

    #[error("Failed to access session store at {}: {source}", path.display())]
    StoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode session store at {}: {source}", path.display())]
    StoreDecode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl SessionError {
    pub fn not_found(id: impl Into<String>) -> Self {
        SessionError::NotFound { id: id.into() }
    }

    /// Wrap an error with the label of the step that produced it.
    pub fn in_step(step: impl Into<String>, source: SessionError) -> Self {
        SessionError::Provisioning {
            step: step.into(),
            source: Box::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NotFound { .. } => ErrorKind::NotFound,
            SessionError::DuplicateId { .. } => ErrorKind::DuplicateId,
            SessionError::Validation(_) => ErrorKind::Validation,
            SessionError::Provisioning { .. } => ErrorKind::Provisioning,
            SessionError::ReadinessTimeout { .. } => ErrorKind::ReadinessTimeout,
            SessionError::Cancelled => ErrorKind::Cancelled,
            SessionError::LegacySession { .. } => ErrorKind::LegacySession,
            SessionError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            SessionError::PoolExhausted => ErrorKind::PoolExhausted,
            SessionError::ConfirmationRequired { .. } => ErrorKind::ConfirmationRequired,
            SessionError::StoreIo { .. } | SessionError::StoreDecode { .. } => ErrorKind::StoreIo,
            SessionError::Provider(_) => ErrorKind::Provider,
        }
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }

    /// The innermost error beneath any provisioning step wrappers.
    pub fn root_cause(&self) -> &SessionError {
        let mut current = self;
        while let SessionError::Provisioning { source, .. } = current {
            current = source;
        }
        current
    }

    /// Label of the step that failed, if this is a provisioning failure.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            SessionError::Provisioning { step, .. } => Some(step),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cause_unwraps_step_wrappers() {
        let err = SessionError::in_step(
            "wait-ready",
            SessionError::ReadinessTimeout {
                waited: Duration::from_secs(5),
            },
        );
        assert!(err.is(ErrorKind::Provisioning));
        assert!(err.root_cause().is(ErrorKind::ReadinessTimeout));
        assert_eq!(err.failed_step(), Some("wait-ready"));
    }

    #[test]
    fn root_cause_of_plain_error_is_itself() {
        let err = SessionError::not_found("alice");
        assert!(err.root_cause().is(ErrorKind::NotFound));
        assert_eq!(err.failed_step(), None);
    }

    #[test]
    fn provider_not_found_keeps_provider_kind() {
        let err: SessionError = ProviderError::NotFound {
            id: "ab-alice".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Provider);
    }

    #[test]
    fn store_decode_and_io_share_kind() {
        let io = SessionError::StoreIo {
            path: PathBuf::from("/tmp/x"),
            source: std::io::Error::other("boom"),
        };
        let decode = SessionError::StoreDecode {
            path: PathBuf::from("/tmp/x"),
            source: serde_json::from_str::<u32>("nope").unwrap_err(),
        };
        assert_eq!(io.kind(), decode.kind());
    }

    #[test]
    fn provisioning_message_names_step() {
        let err = SessionError::in_step("create", SessionError::Cancelled);
        assert_eq!(err.to_string(), "Provisioning step 'create' failed: Interrupted");
    }
}
