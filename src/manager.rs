// Platform-independent access to the OS service manager. Front ends only
// ever hold a ServiceManager, which owns one session with a platform backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

pub mod error;
pub mod job;
pub mod logs;
pub mod model;

#[cfg(target_os = "linux")]
pub mod systemd;
pub mod unsupported;
#[cfg(target_os = "windows")]
pub mod scm;

pub use error::{Result, ServiceError};
pub use model::{Scope, ServiceAction, ServiceDetails, ServiceUnit, StateClass};

/// systemd's own default for how long a start job may take.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(90);

/// Capability set every platform backend implements.
///
/// Names handed to these methods are already normalized. Mutating calls
/// return only once the backend has settled the outcome.
pub trait ServiceBackend: Send + Sync {
    /// Canonical suffix appended to bare unit names (may be empty).
    fn unit_suffix(&self) -> &str;

    fn list_services(&self) -> Result<Vec<ServiceUnit>>;
    fn start_service(&self, name: &str) -> Result<()>;
    fn stop_service(&self, name: &str) -> Result<()>;
    fn restart_service(&self, name: &str) -> Result<()>;
    fn service_details(&self, name: &str) -> Result<ServiceDetails>;
    fn logs(&self, name: &str, max_lines: usize) -> Result<String>;

    /// Releases the session. Called at most once, by [`ServiceManager`].
    fn close(&self);
}

#[derive(Debug, Clone, Copy)]
pub struct ManagerOptions {
    pub scope: Scope,
    /// Upper bound on job completion waits; `None` waits forever.
    pub job_timeout: Option<Duration>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            scope: Scope::User,
            job_timeout: Some(DEFAULT_JOB_TIMEOUT),
        }
    }
}

pub struct ServiceManager {
    backend: Box<dyn ServiceBackend>,
    scope: Scope,
    closed: AtomicBool,
}

impl ServiceManager {
    /// Opens a session with the manager for the current OS.
    pub fn new(privileged: bool) -> Result<Self> {
        Self::with_options(ManagerOptions {
            scope: Scope::from_privileged(privileged),
            ..ManagerOptions::default()
        })
    }

    pub fn with_options(options: ManagerOptions) -> Result<Self> {
        let backend = open_platform_backend(&options)?;
        log::info!("opened {} service manager session", options.scope);
        Ok(Self::with_backend(backend, options.scope))
    }

    /// Wraps an already opened backend.
    pub fn with_backend(backend: Box<dyn ServiceBackend>, scope: Scope) -> Self {
        Self {
            backend,
            scope,
            closed: AtomicBool::new(false),
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn normalize(&self, name: &str) -> String {
        model::normalize_unit_name(name, self.backend.unit_suffix())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ServiceError::ConnectionLost("session is closed".into()));
        }
        Ok(())
    }

    pub fn list_services(&self) -> Result<Vec<ServiceUnit>> {
        self.ensure_open()?;
        self.backend.list_services()
    }

    pub fn start_service(&self, name: &str) -> Result<()> {
        self.control(ServiceAction::Start, name)
    }

    pub fn stop_service(&self, name: &str) -> Result<()> {
        self.control(ServiceAction::Stop, name)
    }

    pub fn restart_service(&self, name: &str) -> Result<()> {
        self.control(ServiceAction::Restart, name)
    }

    pub fn control(&self, action: ServiceAction, name: &str) -> Result<()> {
        self.ensure_open()?;
        let name = self.normalize(name);
        log::info!("{} {}", action, name);
        let result = match action {
            ServiceAction::Start => self.backend.start_service(&name),
            ServiceAction::Stop => self.backend.stop_service(&name),
            ServiceAction::Restart => self.backend.restart_service(&name),
        };
        if let Err(e) = &result {
            log::warn!("{} {} failed: {}", action, name, e);
        }
        result
    }

    pub fn service_details(&self, name: &str) -> Result<ServiceDetails> {
        self.ensure_open()?;
        self.backend.service_details(&self.normalize(name))
    }

    pub fn logs(&self, name: &str, max_lines: usize) -> Result<String> {
        self.ensure_open()?;
        self.backend.logs(&self.normalize(name), max_lines)
    }

    /// Releases the session. Later calls are no-ops.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            log::debug!("closing {} service manager session", self.scope);
            self.backend.close();
        }
    }
}

impl Drop for ServiceManager {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(target_os = "linux")]
fn open_platform_backend(options: &ManagerOptions) -> Result<Box<dyn ServiceBackend>> {
    let backend = systemd::SystemdBackend::connect(options.scope, options.job_timeout)?;
    Ok(Box::new(backend))
}

#[cfg(target_os = "windows")]
fn open_platform_backend(options: &ManagerOptions) -> Result<Box<dyn ServiceBackend>> {
    let backend = scm::ScmBackend::connect(options.scope, options.job_timeout)?;
    Ok(Box::new(backend))
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
fn open_platform_backend(_options: &ManagerOptions) -> Result<Box<dyn ServiceBackend>> {
    Ok(Box::new(unsupported::UnsupportedBackend::new(
        std::env::consts::OS,
    )))
}

/// Restart for backends without an atomic restart: stop, then start.
///
/// A failed stop is returned as is and the start leg never runs.
pub fn stop_then_start<S, T>(stop: S, start: T) -> Result<()>
where
    S: FnOnce() -> Result<()>,
    T: FnOnce() -> Result<()>,
{
    stop()?;
    start()
}

/// Calls `settled` every `interval` until it reports true.
///
/// Returns `Ok(false)` once `timeout` has elapsed; `None` polls without bound.
pub fn poll_until<F>(mut settled: F, timeout: Option<Duration>, interval: Duration) -> Result<bool>
where
    F: FnMut() -> Result<bool>,
{
    let deadline = timeout.map(|limit| Instant::now() + limit);
    loop {
        if settled()? {
            return Ok(true);
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Ok(false);
        }
        thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn restart_skips_start_when_stop_fails() {
        let started = Cell::new(false);
        let result = stop_then_start(
            || Err(ServiceError::NotFound("foo".into())),
            || {
                started.set(true);
                Ok(())
            },
        );
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
        assert!(!started.get());
    }

    #[test]
    fn restart_runs_both_legs_in_order() {
        let order = Cell::new(0);
        let result = stop_then_start(
            || {
                assert_eq!(order.replace(1), 0);
                Ok(())
            },
            || {
                assert_eq!(order.replace(2), 1);
                Ok(())
            },
        );
        assert!(result.is_ok());
        assert_eq!(order.get(), 2);
    }

    #[test]
    fn start_failure_fails_the_restart() {
        let result = stop_then_start(
            || Ok(()),
            || Err(ServiceError::QueryFailed("start refused".into())),
        );
        assert!(result.is_err());
    }

    #[test]
    fn poll_until_waits_for_the_state_to_settle() {
        let mut checks = 0;
        let settled = poll_until(
            || {
                checks += 1;
                Ok(checks == 3)
            },
            Some(Duration::from_secs(5)),
            Duration::from_millis(1),
        );
        assert!(settled.unwrap());
        assert_eq!(checks, 3);
    }

    #[test]
    fn poll_until_gives_up_at_the_deadline() {
        let settled = poll_until(
            || Ok(false),
            Some(Duration::from_millis(20)),
            Duration::from_millis(5),
        );
        assert!(!settled.unwrap());
    }

    #[test]
    fn poll_until_stops_on_query_errors() {
        let result = poll_until(
            || Err(ServiceError::QueryFailed("gone".into())),
            None,
            Duration::from_millis(1),
        );
        assert!(matches!(result, Err(ServiceError::QueryFailed(_))));
    }
}
