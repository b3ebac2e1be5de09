//! Bring a session from Provisioning to Running, rolling back on failure.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::SessionError;
use crate::provider::Provider;
use crate::session::{NameGenerator, Session, SessionStore, Status, normalize_id};

use super::{ReadinessPoller, TeardownHandler};

/// State threaded through the steps of one provisioning run.
pub struct StepContext {
    pub session_id: String,
    /// Provider handle, once a step has created the resource.
    pub provider_id: Option<String>,
    pub address: Option<String>,
    pub poller: ReadinessPoller,
}

/// Label reported when recording the finished session fails.
const FINALIZE_STEP: &str = "finalize";

type StepAction<'a> = Box<dyn FnOnce(&mut StepContext) -> Result<(), SessionError> + 'a>;

/// A labeled unit of provisioning work.
pub struct Step<'a> {
    label: String,
    action: StepAction<'a>,
}

impl<'a> Step<'a> {
    pub fn new(
        label: impl Into<String>,
        action: impl FnOnce(&mut StepContext) -> Result<(), SessionError> + 'a,
    ) -> Self {
        Self {
            label: label.into(),
            action: Box::new(action),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn run(self, ctx: &mut StepContext) -> Result<(), SessionError> {
        (self.action)(ctx)
    }
}

/// Progress callbacks for a provisioning run.
pub trait StepObserver {
    fn step_started(&self, label: &str, index: usize, total: usize);
    fn step_finished(&self, label: &str, error: Option<&SessionError>);
}

struct Silent;

impl StepObserver for Silent {
    fn step_started(&self, _label: &str, _index: usize, _total: usize) {}
    fn step_finished(&self, _label: &str, _error: Option<&SessionError>) {}
}

pub struct ProvisioningWorkflow<'a> {
    store: &'a SessionStore,
    provider: &'a dyn Provider,
    poller: ReadinessPoller,
    names: NameGenerator,
    observer: Box<dyn StepObserver + 'a>,
}

impl<'a> ProvisioningWorkflow<'a> {
    pub fn new(store: &'a SessionStore, provider: &'a dyn Provider, poller: ReadinessPoller) -> Self {
        Self {
            store,
            provider,
            poller,
            names: NameGenerator::new(),
            observer: Box::new(Silent),
        }
    }

    pub fn with_observer(mut self, observer: impl StepObserver + 'a) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Reserve an id and record the session as Provisioning.
    ///
    /// Without a requested name one is drawn from the name pool, avoiding every
    /// id already in the store.
    pub fn begin(
        &self,
        requested: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Session, SessionError> {
        let id = match requested {
            Some(name) => normalize_id(name),
            None => self.names.generate(&self.store.used_names()?)?,
        };
        let session = Session::new(&id, self.provider.name(), timeout);
        self.store.add(session.clone())?;
        info!(session = %session.id, provider = self.provider.name(), "workflow:session recorded");
        Ok(session)
    }

    /// Run `steps` in order for `session`.
    ///
    /// On success the stored record becomes Running with the provider id and
    /// address gathered by the steps. On the first failure no further steps
    /// run, the remote resource is deleted on a best-effort basis and the
    /// record is marked Failed. The step error, wrapped with its label, is
    /// returned; cleanup errors are only logged.
    pub fn run(&self, session: &Session, steps: Vec<Step<'_>>) -> Result<Session, SessionError> {
        if session.is_legacy() {
            return Err(SessionError::LegacySession {
                id: session.id.clone(),
            });
        }
        if session.status != Status::Provisioning {
            return Err(SessionError::InvalidTransition {
                id: session.id.clone(),
                from: session.status,
                to: Status::Running,
            });
        }

        let mut ctx = StepContext {
            session_id: session.id.clone(),
            provider_id: None,
            address: None,
            poller: self.poller.clone(),
        };

        let result = self
            .run_steps(steps, &mut ctx)
            .and_then(|()| {
                self.finish(&ctx)
                    .map_err(|e| SessionError::in_step(FINALIZE_STEP, e))
            });

        match result {
            Ok(running) => {
                info!(
                    session = %running.id,
                    provider_id = running.provider_id().unwrap_or_default(),
                    address = running.address().unwrap_or_default(),
                    "workflow:session running"
                );
                Ok(running)
            }
            Err(err) => {
                error!(session = %session.id, error = %err, "workflow:provisioning failed");
                self.roll_back(&ctx);
                Err(err)
            }
        }
    }

    fn run_steps(&self, steps: Vec<Step<'_>>, ctx: &mut StepContext) -> Result<(), SessionError> {
        let total = steps.len();
        for (idx, step) in steps.into_iter().enumerate() {
            let label = step.label().to_string();
            info!(session = %ctx.session_id, step = %label, index = idx + 1, total, "workflow:step start");
            self.observer.step_started(&label, idx + 1, total);

            let outcome = if ctx.poller.cancel_token().is_cancelled() {
                Err(SessionError::Cancelled)
            } else {
                step.run(ctx)
            };

            self.observer.step_finished(&label, outcome.as_ref().err());
            outcome.map_err(|e| SessionError::in_step(label, e))?;
        }
        Ok(())
    }

    fn finish(&self, ctx: &StepContext) -> Result<Session, SessionError> {
        let mut session = self.store.get(&ctx.session_id)?;
        session.record_provider(ctx.provider_id.clone(), ctx.address.clone())?;
        session.transition(Status::Running)?;
        self.store.update_session(session)
    }

    fn roll_back(&self, ctx: &StepContext) {
        let target = ctx
            .provider_id
            .clone()
            .unwrap_or_else(|| self.provider.resource_id(&ctx.session_id));
        TeardownHandler::new(self.store, self.provider).rollback(&ctx.session_id, &target);

        let marked = self.store.get(&ctx.session_id).and_then(|mut session| {
            session.record_provider(ctx.provider_id.clone(), ctx.address.clone())?;
            session.transition(Status::Failed)?;
            self.store.update_session(session)
        });
        match marked {
            Ok(_) => info!(session = %ctx.session_id, "workflow:session marked failed"),
            Err(e) => warn!(
                session = %ctx.session_id,
                error = %e,
                "workflow:failed to mark session failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::provider::fake::FakeProvider;
    use crate::provider::{CreateOptions, Provider};
    use crate::workflow::CancelToken;
    use std::cell::RefCell;
    use tempfile::TempDir;

    fn fast_poller() -> ReadinessPoller {
        ReadinessPoller::new(Duration::from_millis(5), CancelToken::new())
    }

    fn create_step<'a>(provider: &'a FakeProvider) -> Step<'a> {
        Step::new("create", move |ctx: &mut StepContext| {
            let instance = provider.create(&CreateOptions {
                name: ctx.session_id.clone(),
                ..Default::default()
            })?;
            ctx.provider_id = Some(instance.id);
            Ok(())
        })
    }

    fn wait_step<'a>(provider: &'a FakeProvider, timeout: Duration) -> Step<'a> {
        Step::new("wait-ready", move |ctx: &mut StepContext| {
            let id = ctx.provider_id.clone().unwrap_or_default();
            provider.wait_ready(&id, timeout, &ctx.poller)?;
            ctx.address = provider.get(&id)?.address;
            Ok(())
        })
    }

    #[test]
    fn begin_generates_unused_name() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(dir.path().join("sessions.json"));
        let provider = FakeProvider::new();
        let workflow = ProvisioningWorkflow::new(&store, &provider, fast_poller());

        let first = workflow.begin(None, None).unwrap();
        let second = workflow.begin(None, None).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(first.status, Status::Provisioning);
        assert_eq!(first.provider_name(), Some("fake"));
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn begin_with_taken_name_is_duplicate() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(dir.path().join("sessions.json"));
        let provider = FakeProvider::new();
        let workflow = ProvisioningWorkflow::new(&store, &provider, fast_poller());

        workflow.begin(Some("alice"), None).unwrap();
        let err = workflow.begin(Some("ALICE"), None).unwrap_err();
        assert!(err.is(ErrorKind::DuplicateId));
    }

    #[test]
    fn all_steps_succeed_session_running() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(dir.path().join("sessions.json"));
        let provider = FakeProvider {
            boot_polls: 2,
            ..Default::default()
        };
        let workflow = ProvisioningWorkflow::new(&store, &provider, fast_poller());
        let session = workflow.begin(Some("alice"), None).unwrap();

        let steps = vec![
            create_step(&provider),
            wait_step(&provider, Duration::from_secs(5)),
        ];
        let running = workflow.run(&session, steps).unwrap();

        assert_eq!(running.status, Status::Running);
        assert_eq!(running.provider_id(), Some("fk-alice"));
        assert!(running.address().is_some_and(|a| !a.is_empty()));
        assert_eq!(store.get("alice").unwrap(), running);
        assert!(provider.deletes().is_empty());
    }

    #[test]
    fn readiness_timeout_rolls_back_and_marks_failed() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(dir.path().join("sessions.json"));
        let provider = FakeProvider {
            never_ready: true,
            ..Default::default()
        };
        let workflow = ProvisioningWorkflow::new(&store, &provider, fast_poller());
        let session = workflow.begin(Some("alice"), None).unwrap();

        let steps = vec![
            create_step(&provider),
            wait_step(&provider, Duration::from_millis(40)),
        ];
        let err = workflow.run(&session, steps).unwrap_err();

        assert!(err.is(ErrorKind::Provisioning));
        assert_eq!(err.failed_step(), Some("wait-ready"));
        assert!(err.root_cause().is(ErrorKind::ReadinessTimeout));
        assert_eq!(provider.deletes(), vec!["fk-alice"]);

        let stored = store.get("alice").unwrap();
        assert_eq!(stored.status, Status::Failed);
        assert_eq!(stored.provider_id(), Some("fk-alice"));
    }

    #[test]
    fn failure_stops_later_steps() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(dir.path().join("sessions.json"));
        let provider = FakeProvider::new();
        let workflow = ProvisioningWorkflow::new(&store, &provider, fast_poller());
        let session = workflow.begin(Some("alice"), None).unwrap();

        let ran = RefCell::new(Vec::new());
        let steps = vec![
            create_step(&provider),
            Step::new("install", |_ctx: &mut StepContext| {
                ran.borrow_mut().push("install");
                Err(SessionError::Validation("apt failed".to_string()))
            }),
            Step::new("never", |_ctx: &mut StepContext| {
                ran.borrow_mut().push("never");
                Ok(())
            }),
        ];
        let err = workflow.run(&session, steps).unwrap_err();

        assert_eq!(err.failed_step(), Some("install"));
        assert_eq!(*ran.borrow(), vec!["install"]);
        assert_eq!(provider.deletes().len(), 1);
        assert_eq!(store.get("alice").unwrap().status, Status::Failed);
    }

    #[test]
    fn failed_create_still_attempts_one_delete() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(dir.path().join("sessions.json"));
        let provider = FakeProvider {
            fail_create: Some("quota exceeded".to_string()),
            ..Default::default()
        };
        let workflow = ProvisioningWorkflow::new(&store, &provider, fast_poller());
        let session = workflow.begin(Some("alice"), None).unwrap();

        let err = workflow
            .run(&session, vec![create_step(&provider)])
            .unwrap_err();

        assert_eq!(err.failed_step(), Some("create"));
        assert!(err.root_cause().is(ErrorKind::Provider));
        // Nothing was created, so the delete reports not-found and is swallowed.
        assert_eq!(provider.deletes(), vec!["fk-alice"]);
        assert_eq!(store.get("alice").unwrap().status, Status::Failed);
    }

    #[test]
    fn cleanup_error_does_not_mask_step_error() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(dir.path().join("sessions.json"));
        let provider = FakeProvider {
            never_ready: true,
            fail_delete: true,
            ..Default::default()
        };
        let workflow = ProvisioningWorkflow::new(&store, &provider, fast_poller());
        let session = workflow.begin(Some("alice"), None).unwrap();

        let err = workflow
            .run(
                &session,
                vec![
                    create_step(&provider),
                    wait_step(&provider, Duration::from_millis(20)),
                ],
            )
            .unwrap_err();

        assert!(err.root_cause().is(ErrorKind::ReadinessTimeout));
        assert_eq!(provider.deletes().len(), 1);
        assert_eq!(store.get("alice").unwrap().status, Status::Failed);
    }

    #[test]
    fn missing_address_fails_finalization() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(dir.path().join("sessions.json"));
        let provider = FakeProvider::new();
        let workflow = ProvisioningWorkflow::new(&store, &provider, fast_poller());
        let session = workflow.begin(Some("alice"), None).unwrap();

        let err = workflow
            .run(&session, vec![create_step(&provider)])
            .unwrap_err();

        assert!(err.is(ErrorKind::Provisioning));
        assert_eq!(err.failed_step(), Some(FINALIZE_STEP));
        assert!(err.root_cause().is(ErrorKind::Validation));
        assert_eq!(provider.deletes(), vec!["fk-alice"]);
        assert_eq!(store.get("alice").unwrap().status, Status::Failed);
    }

    #[test]
    fn cancelled_before_step_fails_with_label() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(dir.path().join("sessions.json"));
        let provider = FakeProvider::new();
        let token = CancelToken::new();
        let poller = ReadinessPoller::new(Duration::from_millis(5), token.clone());
        let workflow = ProvisioningWorkflow::new(&store, &provider, poller);
        let session = workflow.begin(Some("alice"), None).unwrap();
        token.cancel();

        let err = workflow
            .run(&session, vec![create_step(&provider)])
            .unwrap_err();

        assert_eq!(err.failed_step(), Some("create"));
        assert!(err.root_cause().is(ErrorKind::Cancelled));
        assert!(provider.creates().is_empty());
        assert_eq!(store.get("alice").unwrap().status, Status::Failed);
    }

    #[test]
    fn run_rejects_non_provisioning_session() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(dir.path().join("sessions.json"));
        let provider = FakeProvider::new();
        let workflow = ProvisioningWorkflow::new(&store, &provider, fast_poller());
        workflow.begin(Some("alice"), None).unwrap();
        let failed = store.update_status("alice", Status::Failed).unwrap();

        let err = workflow.run(&failed, Vec::new()).unwrap_err();
        assert!(err.is(ErrorKind::InvalidTransition));
        assert!(provider.deletes().is_empty());
    }

    #[test]
    fn run_rejects_legacy_session() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(dir.path().join("sessions.json"));
        let provider = FakeProvider::new();
        let workflow = ProvisioningWorkflow::new(&store, &provider, fast_poller());
        let legacy: Session =
            serde_json::from_str(r#"{"id":"relic","status":"provisioning"}"#).unwrap();

        let err = workflow.run(&legacy, Vec::new()).unwrap_err();
        assert!(err.is(ErrorKind::LegacySession));
        assert!(provider.deletes().is_empty());
    }

    #[test]
    fn observer_sees_each_step() {
        struct Recorder<'r>(&'r RefCell<Vec<String>>);
        impl StepObserver for Recorder<'_> {
            fn step_started(&self, label: &str, index: usize, total: usize) {
                self.0.borrow_mut().push(format!("start {label} {index}/{total}"));
            }
            fn step_finished(&self, label: &str, error: Option<&SessionError>) {
                let outcome = if error.is_some() { "err" } else { "ok" };
                self.0.borrow_mut().push(format!("end {label} {outcome}"));
            }
        }

        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(dir.path().join("sessions.json"));
        let provider = FakeProvider::new();
        let events = RefCell::new(Vec::new());
        let workflow = ProvisioningWorkflow::new(&store, &provider, fast_poller())
            .with_observer(Recorder(&events));
        let session = workflow.begin(Some("alice"), None).unwrap();

        let steps = vec![
            create_step(&provider),
            wait_step(&provider, Duration::from_secs(5)),
        ];
        workflow.run(&session, steps).unwrap();

        assert_eq!(
            *events.borrow(),
            vec![
                "start create 1/2",
                "end create ok",
                "start wait-ready 2/2",
                "end wait-ready ok",
            ]
        );
    }
}
