use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::RefCell;
use std::time::Duration;

use crate::error::SessionError;
use crate::workflow::StepObserver;

/// Create a spinner with consistent styling.
fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(120));
    let style = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(msg.to_string());
    pb
}

/// Run an operation with a spinner, showing success/failure.
pub fn with_spinner<T, F>(msg: &str, op: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let pb = create_spinner(msg);
    let result = op();
    match &result {
        Ok(_) => pb.finish_with_message(format!("✔ {}", msg)),
        Err(_) => pb.finish_with_message(format!("✘ {}", msg)),
    }
    result
}

/// Shows one spinner line per provisioning step.
#[derive(Default)]
pub struct StepSpinner {
    current: RefCell<Option<(ProgressBar, String)>>,
}

impl StepSpinner {
    pub fn new() -> Self {
        Self::default()
    }
}

fn describe(label: &str) -> String {
    match label {
        "create" => "Creating VM".to_string(),
        "wait-ready" => "Waiting for VM to boot".to_string(),
        "wait-boot-marker" => "Waiting for first-boot setup".to_string(),
        "resolve-address" => "Resolving address".to_string(),
        other => match other.strip_prefix("setup:") {
            Some(n) => format!("Running setup script {n}"),
            None => other.to_string(),
        },
    }
}

impl StepObserver for StepSpinner {
    fn step_started(&self, label: &str, index: usize, total: usize) {
        let msg = format!("[{index}/{total}] {}", describe(label));
        let pb = create_spinner(&msg);
        // A step that never reported back leaves its spinner running.
        if let Some((stale, stale_msg)) = self.current.replace(Some((pb, msg))) {
            stale.finish_with_message(format!("✘ {}", stale_msg));
        }
    }

    fn step_finished(&self, _label: &str, error: Option<&SessionError>) {
        if let Some((pb, msg)) = self.current.take() {
            match error {
                None => pb.finish_with_message(format!("✔ {}", msg)),
                Some(_) => pb.finish_with_message(format!("✘ {}", msg)),
            }
        }
    }
}
