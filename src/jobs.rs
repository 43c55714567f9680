use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::{BackendClient, JobStatus, ScheduleStatus};

pub enum JobsUpdate {
    Status(JobStatus),
    Schedule(ScheduleStatus),
    Error(String),
}

/// State behind the job-status panel.
///
/// Created when the panel opens; the background poller lives exactly as long
/// as the panel does and is aborted on `stop` or drop.
pub struct JobsPanel {
    pub status: JobStatus,
    pub schedule: ScheduleStatus,
    pub last_error: Option<String>,
    pub updated_at: Option<NaiveDateTime>,
    poller: Option<JoinHandle<()>>,
}

impl JobsPanel {
    pub fn new() -> Self {
        Self {
            status: JobStatus::default(),
            schedule: ScheduleStatus::default(),
            last_error: None,
            updated_at: None,
            poller: None,
        }
    }

    /// Poll job and schedule status every `interval` until stopped.
    ///
    /// `deliver` returns `false` once nobody is listening, which ends the loop.
    pub fn start<F>(&mut self, client: BackendClient, interval: Duration, deliver: F)
    where
        F: Fn(JobsUpdate) -> bool + Send + 'static,
    {
        self.stop();

        let interval = interval.max(Duration::from_secs(1));
        self.poller = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let update = match client.job_status().await {
                    Ok(status) => JobsUpdate::Status(status),
                    Err(e) => JobsUpdate::Error(e.to_string()),
                };
                if !deliver(update) {
                    break;
                }

                let update = match client.schedule_status().await {
                    Ok(schedule) => JobsUpdate::Schedule(schedule),
                    Err(e) => JobsUpdate::Error(e.to_string()),
                };
                if !deliver(update) {
                    break;
                }
            }
            debug!("Job poller finished");
        }));
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.poller.take() {
            handle.abort();
            debug!("Job poller stopped");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn apply(&mut self, update: JobsUpdate) {
        match update {
            JobsUpdate::Status(status) => {
                self.status = status;
                self.last_error = None;
                self.updated_at = Some(Local::now().naive_local());
            }
            JobsUpdate::Schedule(schedule) => {
                self.schedule = schedule;
            }
            JobsUpdate::Error(e) => {
                warn!(error = %e, "Job status poll failed");
                self.last_error = Some(e);
            }
        }
    }
}

impl Default for JobsPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for JobsPanel {
    fn drop(&mut self) {
        self.stop();
    }
}
