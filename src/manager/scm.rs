// Windows Service Control Manager backend. StartServiceW and ControlService
// return once the request is handed to the service; only restart waits for
// the stop to settle before starting again.

use std::time::Duration;

use windows::Win32::Foundation::{
    ERROR_MORE_DATA, ERROR_SERVICE_DOES_NOT_EXIST, ERROR_SERVICE_NOT_ACTIVE,
};
use windows::Win32::System::Services::{
    CloseServiceHandle, ControlService, ENUM_SERVICE_STATUS_PROCESSW, EnumServicesStatusExW,
    OpenSCManagerW, OpenServiceW, QUERY_SERVICE_CONFIGW, QueryServiceConfigW,
    QueryServiceStatusEx, SC_ENUM_PROCESS_INFO, SC_HANDLE, SC_MANAGER_CONNECT,
    SC_MANAGER_ENUMERATE_SERVICE, SC_STATUS_PROCESS_INFO, SERVICE_CONTINUE_PENDING,
    SERVICE_CONTROL_STOP, SERVICE_PAUSE_PENDING, SERVICE_PAUSED, SERVICE_QUERY_CONFIG,
    SERVICE_QUERY_STATUS, SERVICE_RUNNING, SERVICE_START, SERVICE_START_PENDING,
    SERVICE_STATE_ALL, SERVICE_STATUS, SERVICE_STATUS_CURRENT_STATE, SERVICE_STATUS_PROCESS,
    SERVICE_STOP, SERVICE_STOP_PENDING, SERVICE_STOPPED, SERVICE_WIN32, StartServiceW,
};
use windows::core::{HSTRING, PCWSTR, PWSTR};

use super::error::{Result, ServiceError};
use super::logs::{event_log_args, run_log_query};
use super::model::{Scope, ServiceAction, ServiceDetails, ServiceUnit};
use super::{ServiceBackend, poll_until, stop_then_start};

const STOP_POLL: Duration = Duration::from_millis(250);

/// Owned SCM handle, closed on drop.
struct ScHandle(SC_HANDLE);

// SCM handles may be used from any thread.
unsafe impl Send for ScHandle {}
unsafe impl Sync for ScHandle {}

impl Drop for ScHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseServiceHandle(self.0);
        }
    }
}

pub struct ScmBackend {
    manager: ScHandle,
    scope: Scope,
    job_timeout: Option<Duration>,
}

impl ScmBackend {
    pub fn connect(scope: Scope, job_timeout: Option<Duration>) -> Result<Self> {
        let handle = unsafe {
            OpenSCManagerW(
                PCWSTR::null(),
                PCWSTR::null(),
                SC_MANAGER_CONNECT | SC_MANAGER_ENUMERATE_SERVICE,
            )
        }
        .map_err(|e| ServiceError::ConnectionFailed {
            scope,
            reason: e.message(),
        })?;

        Ok(Self {
            manager: ScHandle(handle),
            scope,
            job_timeout,
        })
    }

    fn open_service(&self, name: &str, access: u32) -> Result<ScHandle> {
        let wide = HSTRING::from(name);
        unsafe { OpenServiceW(self.manager.0, &wide, access) }
            .map(ScHandle)
            .map_err(|e| {
                if e.code() == ERROR_SERVICE_DOES_NOT_EXIST.to_hresult() {
                    ServiceError::NotFound(name.to_string())
                } else {
                    ServiceError::QueryFailed(format!("failed to open {name}: {}", e.message()))
                }
            })
    }

    fn control(&self, action: ServiceAction, name: &str) -> Result<()> {
        let rejected = |e: windows::core::Error| ServiceError::BackendRejected {
            action,
            unit: name.to_string(),
            verdict: e.message(),
        };

        match action {
            ServiceAction::Start => {
                let service = self.open_service(name, SERVICE_START)?;
                unsafe { StartServiceW(service.0, None) }.map_err(rejected)
            }
            ServiceAction::Stop => {
                let service = self.open_service(name, SERVICE_STOP)?;
                let mut status = SERVICE_STATUS::default();
                unsafe { ControlService(service.0, SERVICE_CONTROL_STOP, &mut status) }
                    .map_err(rejected)
            }
            ServiceAction::Restart => stop_then_start(
                || self.stop_and_settle(name),
                || self.control(ServiceAction::Start, name),
            ),
        }
    }

    /// Stop leg of a restart: returns once the service reports STOPPED.
    ///
    /// A service that is not running counts as stopped.
    fn stop_and_settle(&self, name: &str) -> Result<()> {
        let service = self.open_service(name, SERVICE_STOP | SERVICE_QUERY_STATUS)?;
        let mut status = SERVICE_STATUS::default();
        if let Err(e) = unsafe { ControlService(service.0, SERVICE_CONTROL_STOP, &mut status) } {
            if e.code() != ERROR_SERVICE_NOT_ACTIVE.to_hresult() {
                return Err(ServiceError::BackendRejected {
                    action: ServiceAction::Restart,
                    unit: name.to_string(),
                    verdict: e.message(),
                });
            }
        }

        let stopped = poll_until(
            || Ok(self.query_status(&service, name)?.dwCurrentState == SERVICE_STOPPED),
            self.job_timeout,
            STOP_POLL,
        )?;
        if stopped {
            Ok(())
        } else {
            Err(ServiceError::Timeout {
                action: ServiceAction::Restart,
                unit: name.to_string(),
                timeout: self.job_timeout.unwrap_or_default(),
            })
        }
    }

    fn query_status(&self, service: &ScHandle, name: &str) -> Result<SERVICE_STATUS_PROCESS> {
        let mut buffer = aligned_buffer(std::mem::size_of::<SERVICE_STATUS_PROCESS>());
        let mut needed = 0u32;
        unsafe {
            QueryServiceStatusEx(
                service.0,
                SC_STATUS_PROCESS_INFO,
                Some(as_bytes(&mut buffer)),
                &mut needed,
            )
        }
        .map_err(|e| ServiceError::QueryFailed(format!("{name}: {}", e.message())))?;
        Ok(unsafe { *(buffer.as_ptr() as *const SERVICE_STATUS_PROCESS) })
    }

    fn query_binary_path(&self, service: &ScHandle) -> String {
        let mut needed = 0u32;
        // The first call only reports the required size.
        let _ = unsafe { QueryServiceConfigW(service.0, None, 0, &mut needed) };
        if needed == 0 {
            return String::new();
        }

        let mut buffer = aligned_buffer(needed as usize);
        let config = buffer.as_mut_ptr() as *mut QUERY_SERVICE_CONFIGW;
        match unsafe { QueryServiceConfigW(service.0, Some(config), needed, &mut needed) } {
            Ok(()) => unsafe { wide_to_string((*config).lpBinaryPathName) },
            Err(e) => {
                log::debug!("QueryServiceConfigW failed: {}", e.message());
                String::new()
            }
        }
    }
}

impl ServiceBackend for ScmBackend {
    fn unit_suffix(&self) -> &str {
        ""
    }

    fn list_services(&self) -> Result<Vec<ServiceUnit>> {
        let mut services = Vec::new();
        let mut resume = 0u32;
        let mut buffer = aligned_buffer(64 * 1024);

        loop {
            let mut needed = 0u32;
            let mut returned = 0u32;
            let result = unsafe {
                EnumServicesStatusExW(
                    self.manager.0,
                    SC_ENUM_PROCESS_INFO,
                    SERVICE_WIN32,
                    SERVICE_STATE_ALL,
                    Some(as_bytes(&mut buffer)),
                    &mut needed,
                    &mut returned,
                    Some(&mut resume),
                    PCWSTR::null(),
                )
            };

            let more = match result {
                Ok(()) => false,
                Err(e) if e.code() == ERROR_MORE_DATA.to_hresult() => true,
                Err(e) => {
                    return Err(ServiceError::QueryFailed(format!(
                        "failed to enumerate services: {}",
                        e.message()
                    )));
                }
            };

            let entries = unsafe {
                std::slice::from_raw_parts(
                    buffer.as_ptr() as *const ENUM_SERVICE_STATUS_PROCESSW,
                    returned as usize,
                )
            };
            for entry in entries {
                let (active, sub) = map_state(entry.ServiceStatusProcess.dwCurrentState);
                services.push(ServiceUnit {
                    name: unsafe { wide_to_string(entry.lpServiceName) },
                    description: unsafe { wide_to_string(entry.lpDisplayName) },
                    load_state: "loaded".to_string(),
                    active_state: active.to_string(),
                    sub_state: sub.to_string(),
                });
            }

            if !more {
                break;
            }
            if returned == 0 && needed as usize > buffer.len() * 8 {
                buffer = aligned_buffer(needed as usize);
            }
        }

        Ok(services)
    }

    fn start_service(&self, name: &str) -> Result<()> {
        self.control(ServiceAction::Start, name)
    }

    fn stop_service(&self, name: &str) -> Result<()> {
        self.control(ServiceAction::Stop, name)
    }

    fn restart_service(&self, name: &str) -> Result<()> {
        self.control(ServiceAction::Restart, name)
    }

    fn service_details(&self, name: &str) -> Result<ServiceDetails> {
        let service = self.open_service(name, SERVICE_QUERY_STATUS | SERVICE_QUERY_CONFIG)?;
        let status = self.query_status(&service, name)?;
        let (active, sub) = map_state(status.dwCurrentState);

        Ok(ServiceDetails {
            unit: ServiceUnit {
                name: name.to_string(),
                description: String::new(),
                load_state: "loaded".to_string(),
                active_state: active.to_string(),
                sub_state: sub.to_string(),
            },
            main_pid: status.dwProcessId,
            fragment_path: self.query_binary_path(&service),
            active_enter_timestamp: 0,
            inactive_enter_timestamp: 0,
        })
    }

    fn logs(&self, name: &str, max_lines: usize) -> Result<String> {
        log::debug!("reading event log for {} ({} scope)", name, self.scope);
        run_log_query("powershell", &event_log_args(name, max_lines))
    }

    fn close(&self) {
        // The SCM handle is released when the backend is dropped.
    }
}

/// Maps an SCM state onto (active state, sub state).
fn map_state(state: SERVICE_STATUS_CURRENT_STATE) -> (&'static str, &'static str) {
    match state {
        SERVICE_RUNNING => ("active", "running"),
        SERVICE_STOPPED => ("inactive", "dead"),
        SERVICE_START_PENDING => ("activating", "start-pending"),
        SERVICE_STOP_PENDING => ("deactivating", "stop-pending"),
        SERVICE_CONTINUE_PENDING => ("activating", "continue-pending"),
        SERVICE_PAUSE_PENDING => ("deactivating", "pause-pending"),
        SERVICE_PAUSED => ("inactive", "paused"),
        _ => ("inactive", "unknown"),
    }
}

/// Byte buffer with 8-byte alignment for SCM structures.
fn aligned_buffer(bytes: usize) -> Vec<u64> {
    vec![0u64; bytes.div_ceil(8).max(1)]
}

fn as_bytes(buffer: &mut [u64]) -> &mut [u8] {
    unsafe { std::slice::from_raw_parts_mut(buffer.as_mut_ptr() as *mut u8, buffer.len() * 8) }
}

unsafe fn wide_to_string(text: PWSTR) -> String {
    if text.is_null() {
        return String::new();
    }
    unsafe { text.to_string() }.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scm_states_map_onto_lifecycle_states() {
        assert_eq!(map_state(SERVICE_RUNNING).0, "active");
        assert_eq!(map_state(SERVICE_STOPPED).0, "inactive");
        assert_eq!(map_state(SERVICE_START_PENDING).0, "activating");
        assert_eq!(map_state(SERVICE_STOP_PENDING).0, "deactivating");
    }

    #[test]
    fn buffers_round_up_to_whole_words() {
        assert_eq!(aligned_buffer(1).len(), 1);
        assert_eq!(aligned_buffer(17).len(), 3);
        assert_eq!(aligned_buffer(0).len(), 1);
    }
}
