use crate::{
    api::GenerationService,
    error::GenerationError,
    types::{JobStatus, StatusResponse},
};
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` keeps polling through failures forever.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_consecutive_failures: Some(DEFAULT_MAX_CONSECUTIVE_FAILURES),
        }
    }
}

#[derive(Debug)]
pub enum PollStep {
    /// A non-terminal status was observed.
    Progress(StatusResponse),
    /// A terminal status was observed; no further queries are issued.
    Finished(StatusResponse),
    Cancelled,
    Abandoned { failures: u32, last_error: GenerationError },
}

/// Timer-driven status loop for a single job.
///
/// Each call to [`StatusPoller::tick`] waits one interval, queries the service
/// and reports what it saw. Once a terminal status, a cancellation or the
/// failure ceiling is reached, `tick` returns `None` without touching the
/// service again.
pub struct StatusPoller {
    service: Arc<dyn GenerationService>,
    job_id: String,
    policy: PollPolicy,
    cancel: CancellationToken,
    failures: u32,
    queries: u32,
    stopped: bool,
}

impl StatusPoller {
    pub fn new(
        service: Arc<dyn GenerationService>,
        job_id: String,
        initial: JobStatus,
        policy: PollPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            job_id,
            policy,
            cancel,
            failures: 0,
            queries: 0,
            stopped: initial.is_terminal(),
        }
    }

    pub fn queries(&self) -> u32 {
        self.queries
    }

    fn stop(&mut self, step: PollStep) -> Option<PollStep> {
        self.stopped = true;
        Some(step)
    }

    pub async fn tick(&mut self) -> Option<PollStep> {
        if self.stopped {
            return None;
        }
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.stop(PollStep::Cancelled),
                _ = sleep(self.policy.interval) => {}
            }

            self.queries += 1;
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.stop(PollStep::Cancelled),
                result = self.service.job_status(&self.job_id) => result,
            };

            match result {
                Ok(status) => {
                    self.failures = 0;
                    if let Some(reported) = status.job_id.as_deref() {
                        if reported != self.job_id {
                            debug!(job_id = %self.job_id, reported, "ignoring status for another job");
                            continue;
                        }
                    }
                    if status.is_terminal() {
                        return self.stop(PollStep::Finished(status));
                    }
                    return Some(PollStep::Progress(status));
                }
                Err(err) => {
                    self.failures += 1;
                    let failure = GenerationError::PollTransient {
                        job_id: self.job_id.clone(),
                        source: err,
                    };
                    warn!(failures = self.failures, "{failure}");
                    if let Some(max) = self.policy.max_consecutive_failures {
                        if self.failures >= max {
                            let failures = self.failures;
                            return self.stop(PollStep::Abandoned { failures, last_error: failure });
                        }
                    }
                }
            }
        }
    }
}
