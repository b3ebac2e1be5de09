//! In-memory provider that records calls, for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;

use super::{CreateOptions, Instance, Provider, ProviderError};

#[derive(Default)]
pub(crate) struct State {
    instances: HashMap<String, Instance>,
    creates: Vec<String>,
    deletes: Vec<String>,
    execs: Vec<(String, String)>,
    gets: usize,
}

#[derive(Default)]
pub struct FakeProvider {
    pub(crate) state: Mutex<State>,
    /// Fail `create` with this message.
    pub fail_create: Option<String>,
    /// Fail `delete` with a command error (not a not-found).
    pub fail_delete: bool,
    /// Number of `get` calls that report the instance as still booting.
    pub boot_polls: usize,
    /// Never report the instance as running.
    pub never_ready: bool,
    /// Commands containing this substring exit non-zero.
    pub failing_command: Option<String>,
    /// `get` reports the instance as gone even when `delete` failed.
    pub vanish_on_failed_delete: bool,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn creates(&self) -> Vec<String> {
        self.state().creates.clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.state().deletes.clone()
    }

    pub fn execs(&self) -> Vec<(String, String)> {
        self.state().execs.clone()
    }

    pub fn exists(&self, id: &str) -> bool {
        self.state().instances.contains_key(id)
    }

    /// Register an instance as already running.
    pub fn insert_running(&self, id: &str, address: &str) {
        self.state().instances.insert(
            id.to_string(),
            Instance {
                id: id.to_string(),
                name: id.to_string(),
                address: Some(address.to_string()),
                running: true,
            },
        );
    }
}

impl Provider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn resource_id(&self, session_id: &str) -> String {
        format!("fk-{session_id}")
    }

    fn create(&self, opts: &CreateOptions) -> Result<Instance, ProviderError> {
        let id = self.resource_id(&opts.name);
        let mut state = self.state();
        state.creates.push(opts.name.clone());
        if let Some(msg) = &self.fail_create {
            return Err(ProviderError::Command(anyhow!("{msg}")));
        }
        let instance = Instance {
            id: id.clone(),
            name: opts.name.clone(),
            address: None,
            running: false,
        };
        state.instances.insert(id, instance.clone());
        Ok(instance)
    }

    fn get(&self, id: &str) -> Result<Instance, ProviderError> {
        let mut state = self.state();
        state.gets += 1;
        let gets = state.gets;
        let booted = !self.never_ready && gets > self.boot_polls;
        let instance = state
            .instances
            .get_mut(id)
            .ok_or_else(|| ProviderError::NotFound { id: id.to_string() })?;
        if booted && !instance.running {
            instance.running = true;
            instance.address = Some("192.168.5.15".to_string());
        }
        Ok(instance.clone())
    }

    fn delete(&self, id: &str) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.deletes.push(id.to_string());
        if self.fail_delete {
            if self.vanish_on_failed_delete {
                state.instances.remove(id);
            }
            return Err(ProviderError::Command(anyhow!("delete failed for {id}")));
        }
        match state.instances.remove(id) {
            Some(_) => Ok(()),
            None => Err(ProviderError::NotFound { id: id.to_string() }),
        }
    }

    fn exec(&self, id: &str, command: &str) -> Result<String, ProviderError> {
        let mut state = self.state();
        state.execs.push((id.to_string(), command.to_string()));
        if !state.instances.contains_key(id) {
            return Err(ProviderError::NotFound { id: id.to_string() });
        }
        if let Some(fragment) = &self.failing_command
            && command.contains(fragment.as_str())
        {
            return Err(ProviderError::Command(anyhow!("command failed: {command}")));
        }
        Ok(String::new())
    }
}
