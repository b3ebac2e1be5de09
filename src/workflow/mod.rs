//! Session lifecycle: provisioning, readiness polling and teardown.

mod cancel;
mod provision;
mod readiness;
mod steps;
mod teardown;

pub use cancel::CancelToken;
pub use provision::{ProvisioningWorkflow, Step, StepContext, StepObserver};
pub use readiness::{DEFAULT_POLL_INTERVAL, ReadinessPoller};
pub use steps::{StepSettings, standard_steps};
pub use teardown::{DestroyOutcome, RemoteOutcome, TeardownHandler};
