// Background work for the dashboard.
//
// Every task runs on its own thread and reports back through one channel that
// only the UI loop drains, so view state is only ever touched by that loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::manager::{self, ServiceAction, ServiceManager, ServiceUnit, poll_until};

/// Completion messages posted by background tasks.
#[derive(Debug)]
pub enum AppEvent {
    Refreshed(manager::Result<Vec<ServiceUnit>>),
    ActionFinished {
        action: ServiceAction,
        unit: String,
        result: manager::Result<()>,
    },
    LogsFetched {
        unit: String,
        result: manager::Result<String>,
    },
}

pub struct Worker {
    manager: Arc<ServiceManager>,
    tx: Sender<AppEvent>,
    polling: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
}

impl Worker {
    pub fn new(manager: Arc<ServiceManager>, tx: Sender<AppEvent>) -> Self {
        Self {
            manager,
            tx,
            polling: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Timer-driven refresh. Skipped while the previous poll is outstanding.
    pub fn poll(&self) {
        if self.polling.swap(true, Ordering::AcqRel) {
            log::trace!("previous poll still running, skipping tick");
            return;
        }
        let polling = Arc::clone(&self.polling);
        let spawned = self.spawn("poll", move |manager| {
            let result = manager.list_services();
            polling.store(false, Ordering::Release);
            AppEvent::Refreshed(result)
        });
        if !spawned {
            self.polling.store(false, Ordering::Release);
        }
    }

    /// Refresh requested by an action or a filter edit.
    pub fn refresh(&self) {
        self.spawn("refresh", |manager| {
            AppEvent::Refreshed(manager.list_services())
        });
    }

    pub fn run_action(&self, action: ServiceAction, unit: String) {
        self.spawn(action.as_str(), move |manager| {
            let result = manager.control(action, &unit);
            AppEvent::ActionFinished {
                action,
                unit,
                result,
            }
        });
    }

    pub fn fetch_logs(&self, unit: String, max_lines: usize) {
        self.spawn("logs", move |manager| {
            let result = manager.logs(&unit, max_lines);
            AppEvent::LogsFetched { unit, result }
        });
    }

    /// Number of tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Waits up to `grace` for outstanding tasks. Returns true once idle.
    pub fn wait_idle(&self, grace: Duration) -> bool {
        matches!(
            poll_until(
                || Ok(self.in_flight() == 0),
                Some(grace),
                Duration::from_millis(10),
            ),
            Ok(true)
        )
    }

    fn spawn<F>(&self, name: &str, task: F) -> bool
    where
        F: FnOnce(&ServiceManager) -> AppEvent + Send + 'static,
    {
        let manager = Arc::clone(&self.manager);
        let tx = self.tx.clone();
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::AcqRel);
        let spawned = thread::Builder::new()
            .name(format!("svcm-{name}"))
            .spawn(move || {
                let event = task(&manager);
                // The receiver is gone once the dashboard has quit.
                let _ = tx.send(event);
                in_flight.fetch_sub(1, Ordering::AcqRel);
            });
        match spawned {
            Ok(_) => true,
            Err(e) => {
                self.in_flight.fetch_sub(1, Ordering::AcqRel);
                log::error!("failed to spawn {} task: {}", name, e);
                false
            }
        }
    }
}
