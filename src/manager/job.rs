// Routes systemd's JobRemoved verdicts to the callers waiting on each job.
//
// StartUnit/StopUnit/RestartUnit answer with a job object path. systemd may
// merge a request into a job that is already queued and hand back the same
// path, so one path can have several waiters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use super::error::{Result, ServiceError};
use super::model::ServiceAction;

/// Verdict systemd reports for a job that completed successfully.
pub const JOB_DONE: &str = "done";

#[derive(Default)]
struct Pending {
    next_ticket: u64,
    jobs: HashMap<String, Vec<(u64, Sender<String>)>>,
}

#[derive(Default)]
pub struct JobTable {
    pending: Mutex<Pending>,
}

impl JobTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        // A poisoned table still holds valid senders.
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Issues a job and registers its waiter.
    ///
    /// The table stays locked while `issue` runs, so a completion signal for
    /// the new job cannot be routed before the waiter exists.
    pub fn enqueue<F>(
        self: &Arc<Self>,
        action: ServiceAction,
        unit: &str,
        issue: F,
    ) -> Result<JobWaiter>
    where
        F: FnOnce() -> Result<String>,
    {
        let mut pending = self.lock();
        let job = issue()?;
        let (tx, rx) = bounded(1);
        let ticket = pending.next_ticket;
        pending.next_ticket += 1;
        let waiters = pending.jobs.entry(job.clone()).or_default();
        waiters.push((ticket, tx));
        log::debug!(
            "{} job {} queued for {} ({} waiting)",
            action,
            job,
            unit,
            waiters.len()
        );

        Ok(JobWaiter {
            job,
            ticket,
            action,
            unit: unit.to_string(),
            rx,
            table: Arc::clone(self),
        })
    }

    /// Delivers a terminal verdict to every waiter of `job`.
    ///
    /// Returns false for jobs nobody waits on.
    pub fn resolve(&self, job: &str, verdict: &str) -> bool {
        match self.lock().jobs.remove(job) {
            Some(waiters) => {
                for (_, tx) in waiters {
                    let _ = tx.send(verdict.to_string());
                }
                true
            }
            None => false,
        }
    }

    fn abandon(&self, job: &str, ticket: u64) {
        let mut pending = self.lock();
        if let Some(waiters) = pending.jobs.get_mut(job) {
            waiters.retain(|(t, _)| *t != ticket);
            if waiters.is_empty() {
                pending.jobs.remove(job);
            }
        }
    }

    /// Drops every pending sender; blocked waiters see a lost connection.
    pub fn clear(&self) {
        self.lock().jobs.clear();
    }

    /// Number of distinct jobs with at least one waiter.
    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Waits for the terminal verdict of one job.
pub struct JobWaiter {
    job: String,
    ticket: u64,
    action: ServiceAction,
    unit: String,
    rx: Receiver<String>,
    table: Arc<JobTable>,
}

impl JobWaiter {
    /// Blocks until the job finishes. `None` waits without bound.
    pub fn wait(self, timeout: Option<Duration>) -> Result<String> {
        let received = match timeout {
            Some(limit) => self.rx.recv_timeout(limit),
            None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(verdict) => Ok(verdict),
            Err(RecvTimeoutError::Timeout) => {
                self.table.abandon(&self.job, self.ticket);
                Err(ServiceError::Timeout {
                    action: self.action,
                    unit: self.unit,
                    timeout: timeout.unwrap_or_default(),
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(ServiceError::ConnectionLost(format!(
                "session closed while waiting for job {}",
                self.job
            ))),
        }
    }

    /// Waits and converts the verdict into a success/failure decision.
    pub fn finish(self, timeout: Option<Duration>) -> Result<()> {
        let action = self.action;
        let unit = self.unit.clone();
        let verdict = self.wait(timeout)?;
        job_outcome(action, &unit, verdict)
    }
}

pub fn job_outcome(action: ServiceAction, unit: &str, verdict: String) -> Result<()> {
    if verdict == JOB_DONE {
        Ok(())
    } else {
        Err(ServiceError::BackendRejected {
            action,
            unit: unit.to_string(),
            verdict,
        })
    }
}
