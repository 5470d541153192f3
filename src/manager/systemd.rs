// Talks to systemd over D-Bus (org.freedesktop.systemd1).

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use zbus::blocking::Connection;
use zbus::proxy;
use zbus::proxy::CacheProperties;
use zbus::zvariant::{ObjectPath, OwnedObjectPath, Type};

use super::ServiceBackend;
use super::error::{Result, ServiceError};
use super::job::JobTable;
use super::logs::{journalctl_args, run_log_query};
use super::model::{SERVICE_SUFFIX, Scope, ServiceAction, ServiceDetails, ServiceUnit};

const NO_SUCH_UNIT: &str = "org.freedesktop.systemd1.NoSuchUnit";
const JOB_MODE: &str = "replace";
/// LoadState of a unit systemd has no definition for.
const LOAD_NOT_FOUND: &str = "not-found";

#[proxy(
    interface = "org.freedesktop.systemd1.Manager",
    default_service = "org.freedesktop.systemd1",
    default_path = "/org/freedesktop/systemd1",
    gen_async = false,
    blocking_name = "ManagerProxy"
)]
trait Manager {
    fn subscribe(&self) -> zbus::Result<()>;

    fn list_units_by_patterns(
        &self,
        states: &[&str],
        patterns: &[&str],
    ) -> zbus::Result<Vec<UnitStatus>>;

    fn start_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;
    fn stop_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;
    fn restart_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;
    fn load_unit(&self, name: &str) -> zbus::Result<OwnedObjectPath>;

    #[zbus(signal)]
    fn job_removed(&self, id: u32, job: ObjectPath<'_>, unit: &str, result: &str)
    -> zbus::Result<()>;
}

#[proxy(
    interface = "org.freedesktop.systemd1.Unit",
    default_service = "org.freedesktop.systemd1",
    gen_async = false,
    blocking_name = "UnitProxy"
)]
trait Unit {
    #[zbus(property)]
    fn id(&self) -> zbus::Result<String>;
    #[zbus(property)]
    fn description(&self) -> zbus::Result<String>;
    #[zbus(property)]
    fn load_state(&self) -> zbus::Result<String>;
    #[zbus(property)]
    fn active_state(&self) -> zbus::Result<String>;
    #[zbus(property)]
    fn sub_state(&self) -> zbus::Result<String>;
    #[zbus(property)]
    fn fragment_path(&self) -> zbus::Result<String>;
    #[zbus(property)]
    fn active_enter_timestamp(&self) -> zbus::Result<u64>;
    #[zbus(property)]
    fn inactive_enter_timestamp(&self) -> zbus::Result<u64>;
}

#[proxy(
    interface = "org.freedesktop.systemd1.Service",
    default_service = "org.freedesktop.systemd1",
    gen_async = false,
    blocking_name = "ServiceProxy"
)]
trait Service {
    #[zbus(property, name = "MainPID")]
    fn main_pid(&self) -> zbus::Result<u32>;
}

/// One entry of `ListUnits*`, signature `(ssssssouso)`.
#[allow(dead_code)]
#[derive(Debug, Deserialize, Type)]
pub struct UnitStatus {
    name: String,
    description: String,
    load_state: String,
    active_state: String,
    sub_state: String,
    followed: String,
    path: OwnedObjectPath,
    job_id: u32,
    job_type: String,
    job_path: OwnedObjectPath,
}

impl From<UnitStatus> for ServiceUnit {
    fn from(status: UnitStatus) -> Self {
        ServiceUnit {
            name: status.name,
            description: status.description,
            load_state: status.load_state,
            active_state: status.active_state,
            sub_state: status.sub_state,
        }
    }
}

pub struct SystemdBackend {
    connection: Connection,
    manager: ManagerProxy<'static>,
    jobs: Arc<JobTable>,
    scope: Scope,
    job_timeout: Option<Duration>,
}

impl SystemdBackend {
    pub fn connect(scope: Scope, job_timeout: Option<Duration>) -> Result<Self> {
        let failed = |e: zbus::Error| ServiceError::ConnectionFailed {
            scope,
            reason: e.to_string(),
        };

        let connection = match scope {
            Scope::User => Connection::session(),
            Scope::Privileged => Connection::system(),
        }
        .map_err(failed)?;

        let manager = ManagerProxy::new(&connection).map_err(failed)?;
        // Without a subscription systemd does not broadcast JobRemoved.
        manager.subscribe().map_err(failed)?;
        let signals = manager.receive_job_removed().map_err(failed)?;

        let jobs = JobTable::new();
        let table = Arc::clone(&jobs);
        thread::Builder::new()
            .name("svcm-jobs".into())
            .spawn(move || {
                for signal in signals {
                    match signal.args() {
                        Ok(args) => {
                            if !table.resolve(args.job().as_str(), args.result()) {
                                log::trace!("ignoring foreign job {}", args.job().as_str());
                            }
                        }
                        Err(e) => log::debug!("malformed JobRemoved signal: {}", e),
                    }
                }
                log::debug!("JobRemoved stream ended");
                table.clear();
            })
            .map_err(|e| ServiceError::ConnectionFailed {
                scope,
                reason: format!("failed to spawn job listener: {e}"),
            })?;

        Ok(Self {
            connection,
            manager,
            jobs,
            scope,
            job_timeout,
        })
    }

    fn run_job(&self, action: ServiceAction, name: &str) -> Result<()> {
        let waiter = self.jobs.enqueue(action, name, || {
            let job = match action {
                ServiceAction::Start => self.manager.start_unit(name, JOB_MODE),
                ServiceAction::Stop => self.manager.stop_unit(name, JOB_MODE),
                ServiceAction::Restart => self.manager.restart_unit(name, JOB_MODE),
            }
            .map_err(|e| control_error(e, action, name))?;
            Ok(job.as_str().to_string())
        })?;
        waiter.finish(self.job_timeout)
    }

    fn unit_proxy<'p>(&self, path: &'p OwnedObjectPath) -> zbus::Result<UnitProxy<'p>> {
        UnitProxy::builder(&self.connection)
            .path(path.as_str())?
            .cache_properties(CacheProperties::No)
            .build()
    }

    fn main_pid(&self, path: &OwnedObjectPath) -> zbus::Result<u32> {
        ServiceProxy::builder(&self.connection)
            .path(path.as_str())?
            .cache_properties(CacheProperties::No)
            .build()?
            .main_pid()
    }

    fn read_details(&self, path: &OwnedObjectPath) -> zbus::Result<ServiceDetails> {
        let unit = self.unit_proxy(path)?;
        Ok(ServiceDetails {
            unit: ServiceUnit {
                name: unit.id()?,
                description: unit.description()?,
                load_state: unit.load_state()?,
                active_state: unit.active_state()?,
                sub_state: unit.sub_state()?,
            },
            // Units that never ran have no Service properties worth failing over.
            main_pid: self.main_pid(path).unwrap_or(0),
            fragment_path: unit.fragment_path()?,
            active_enter_timestamp: unit.active_enter_timestamp()?,
            inactive_enter_timestamp: unit.inactive_enter_timestamp()?,
        })
    }
}

impl ServiceBackend for SystemdBackend {
    fn unit_suffix(&self) -> &str {
        SERVICE_SUFFIX
    }

    fn list_services(&self) -> Result<Vec<ServiceUnit>> {
        let units = self
            .manager
            .list_units_by_patterns(&[], &["*.service"])
            .map_err(|e| match e {
                zbus::Error::InputOutput(_) => ServiceError::ConnectionLost(e.to_string()),
                other => ServiceError::QueryFailed(format!("failed to list units: {other}")),
            })?;
        Ok(units.into_iter().map(ServiceUnit::from).collect())
    }

    fn start_service(&self, name: &str) -> Result<()> {
        self.run_job(ServiceAction::Start, name)
    }

    fn stop_service(&self, name: &str) -> Result<()> {
        self.run_job(ServiceAction::Stop, name)
    }

    fn restart_service(&self, name: &str) -> Result<()> {
        self.run_job(ServiceAction::Restart, name)
    }

    fn service_details(&self, name: &str) -> Result<ServiceDetails> {
        // LoadUnit also covers installed units that are not in memory yet.
        let path = self.manager.load_unit(name).map_err(|e| {
            if is_no_such_unit(&e) {
                ServiceError::NotFound(name.to_string())
            } else {
                ServiceError::QueryFailed(format!("failed to look up {name}: {e}"))
            }
        })?;
        let details = self.read_details(&path).map_err(|e| {
            ServiceError::QueryFailed(format!("failed to get properties for {name}: {e}"))
        })?;
        require_definition(details, name)
    }

    fn logs(&self, name: &str, max_lines: usize) -> Result<String> {
        run_log_query("journalctl", &journalctl_args(self.scope, name, max_lines))
    }

    fn close(&self) {
        self.jobs.clear();
        if let Err(e) = self.connection.clone().close() {
            log::warn!("failed to close D-Bus connection: {}", e);
        }
    }
}

/// Loading an unknown name yields a placeholder unit rather than an error.
fn require_definition(details: ServiceDetails, name: &str) -> Result<ServiceDetails> {
    if details.unit.load_state == LOAD_NOT_FOUND {
        return Err(ServiceError::NotFound(name.to_string()));
    }
    Ok(details)
}

fn is_no_such_unit(err: &zbus::Error) -> bool {
    matches!(err, zbus::Error::MethodError(name, _, _) if name.as_str() == NO_SUCH_UNIT)
}

fn control_error(err: zbus::Error, action: ServiceAction, name: &str) -> ServiceError {
    if is_no_such_unit(&err) {
        return ServiceError::NotFound(name.to_string());
    }
    match err {
        zbus::Error::InputOutput(_) => ServiceError::ConnectionLost(err.to_string()),
        other => ServiceError::BackendRejected {
            action,
            unit: name.to_string(),
            verdict: other.to_string(),
        },
    }
}
