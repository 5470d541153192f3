#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use svcm::manager::{
    Result, Scope, ServiceAction, ServiceBackend, ServiceDetails, ServiceError, ServiceManager,
    ServiceUnit,
};

pub fn unit(name: &str, active: &str, sub: &str) -> ServiceUnit {
    ServiceUnit {
        name: name.to_string(),
        description: format!("{name} description"),
        load_state: "loaded".to_string(),
        active_state: active.to_string(),
        sub_state: sub.to_string(),
    }
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub units: Vec<ServiceUnit>,
    /// Every backend call, as "<op> <name>".
    pub calls: Vec<String>,
    pub fail_list: bool,
    pub reject_actions: bool,
    pub logs: String,
    pub closed: usize,
}

/// In-memory backend; the handle stays with the test after boxing.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn with_units(units: Vec<ServiceUnit>) -> Self {
        let backend = Self::default();
        backend.state().units = units;
        backend
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn manager(&self) -> ServiceManager {
        ServiceManager::with_backend(Box::new(self.clone()), Scope::User)
    }

    fn set_state(&self, op: &str, name: &str, active: &str, sub: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("{op} {name}"));
        if state.reject_actions {
            return Err(ServiceError::BackendRejected {
                action: match op {
                    "start" => ServiceAction::Start,
                    "stop" => ServiceAction::Stop,
                    _ => ServiceAction::Restart,
                },
                unit: name.to_string(),
                verdict: "failed".to_string(),
            });
        }
        let unit = state
            .units
            .iter_mut()
            .find(|u| u.name == name)
            .ok_or_else(|| ServiceError::NotFound(name.to_string()))?;
        unit.active_state = active.to_string();
        unit.sub_state = sub.to_string();
        Ok(())
    }
}

impl ServiceBackend for FakeBackend {
    fn unit_suffix(&self) -> &str {
        ".service"
    }

    fn list_services(&self) -> Result<Vec<ServiceUnit>> {
        let mut state = self.state();
        state.calls.push("list".to_string());
        if state.fail_list {
            return Err(ServiceError::QueryFailed("bus timeout".to_string()));
        }
        Ok(state.units.clone())
    }

    fn start_service(&self, name: &str) -> Result<()> {
        self.set_state("start", name, "active", "running")
    }

    fn stop_service(&self, name: &str) -> Result<()> {
        self.set_state("stop", name, "inactive", "dead")
    }

    fn restart_service(&self, name: &str) -> Result<()> {
        self.set_state("restart", name, "active", "running")
    }

    fn service_details(&self, name: &str) -> Result<ServiceDetails> {
        let mut state = self.state();
        state.calls.push(format!("details {name}"));
        let unit = state
            .units
            .iter()
            .find(|u| u.name == name)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(name.to_string()))?;
        Ok(ServiceDetails {
            unit,
            main_pid: 42,
            fragment_path: format!("/etc/systemd/system/{name}"),
            active_enter_timestamp: 0,
            inactive_enter_timestamp: 0,
        })
    }

    fn logs(&self, name: &str, max_lines: usize) -> Result<String> {
        let mut state = self.state();
        state.calls.push(format!("logs {name} {max_lines}"));
        Ok(state.logs.clone())
    }

    fn close(&self) {
        self.state().closed += 1;
    }
}
