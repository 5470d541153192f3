// Stand-in backend for platforms without a supported service manager.

use super::ServiceBackend;
use super::error::{Result, ServiceError};
use super::model::{ServiceDetails, ServiceUnit};

pub struct UnsupportedBackend {
    platform: String,
}

impl UnsupportedBackend {
    pub fn new(platform: &str) -> Self {
        Self {
            platform: platform.to_string(),
        }
    }

    fn unavailable<T>(&self) -> Result<T> {
        Err(ServiceError::BackendUnavailable(format!(
            "{} support not implemented yet",
            self.platform
        )))
    }
}

impl ServiceBackend for UnsupportedBackend {
    fn unit_suffix(&self) -> &str {
        ""
    }

    fn list_services(&self) -> Result<Vec<ServiceUnit>> {
        self.unavailable()
    }

    fn start_service(&self, _name: &str) -> Result<()> {
        self.unavailable()
    }

    fn stop_service(&self, _name: &str) -> Result<()> {
        self.unavailable()
    }

    fn restart_service(&self, _name: &str) -> Result<()> {
        self.unavailable()
    }

    fn service_details(&self, _name: &str) -> Result<ServiceDetails> {
        self.unavailable()
    }

    fn logs(&self, _name: &str, _max_lines: usize) -> Result<String> {
        self.unavailable()
    }

    fn close(&self) {}
}
