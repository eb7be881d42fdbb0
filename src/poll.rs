// ABOUTME: Poll loop that follows one job until it succeeds, fails or a client-side bound trips
// ABOUTME: Runs as a cancellable tokio task and reports through a StatusView

use anyhow::{Context, Result};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::BuilderError;
use crate::remote::client::BuilderClient;
use crate::remote::models::JobState;
use crate::view::{render_status_line, StatusView, QUEUED_TEXT};

/// Timing and stop rules for a poll loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay before the first status fetch, and between fetches when `multiplier` is 1.
    pub interval: Duration,
    /// Growth factor applied to the delay after every fetch.
    pub multiplier: f64,
    pub max_interval: Duration,
    /// Fraction of the delay randomly added or removed, in `[0, 1]`.
    pub jitter: f64,
    pub max_attempts: Option<u32>,
    pub max_duration: Option<Duration>,
    /// Failed fetches in a row before the job is reported unreachable.
    pub max_consecutive_errors: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            multiplier: 1.0,
            max_interval: Duration::from_secs(30),
            jitter: 0.0,
            max_attempts: None,
            max_duration: Some(Duration::from_secs(30 * 60)),
            max_consecutive_errors: Some(10),
        }
    }
}

impl PollPolicy {
    pub fn validate(&self) -> Result<(), BuilderError> {
        if self.interval.is_zero() {
            return Err(BuilderError::Config("poll interval must be positive".to_string()));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(BuilderError::Config(format!(
                "poll multiplier must be at least 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(BuilderError::Config(format!(
                "poll jitter must be between 0 and 1, got {}",
                self.jitter
            )));
        }
        if self.max_interval < self.interval {
            return Err(BuilderError::Config(
                "max poll interval must not be below the poll interval".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay before fetch number `tick` (0-based), before jitter.
    pub fn base_delay(&self, tick: u32) -> Duration {
        let exp = tick.min(64) as i32;
        let secs = self.interval.as_secs_f64() * self.multiplier.powi(exp);
        let capped = secs.min(self.max_interval.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(capped)
    }

    pub fn delay<R: Rng>(&self, tick: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(tick);
        // Clamped here too since policies can skip validate().
        let jitter = if self.jitter.is_finite() {
            self.jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if jitter == 0.0 {
            return base;
        }
        let factor = (1.0 + rng.gen_range(-jitter..=jitter)).max(0.0);
        Duration::from_secs_f64(base.as_secs_f64() * factor)
    }
}

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Succeeded { download_url: String },
    Failed { message: String },
    TimedOut { attempts: u32, elapsed: Duration },
    Unreachable { consecutive_errors: u32, last_error: String },
    Cancelled,
}

impl PollOutcome {
    /// The download URL on success, otherwise the matching error.
    pub fn into_result(self) -> Result<String, BuilderError> {
        match self {
            PollOutcome::Succeeded { download_url } => Ok(download_url),
            PollOutcome::Failed { message } => Err(BuilderError::JobFailed(message)),
            PollOutcome::TimedOut { attempts, elapsed } => {
                Err(BuilderError::TimedOut { attempts, elapsed })
            }
            PollOutcome::Unreachable {
                consecutive_errors,
                last_error,
            } => Err(BuilderError::Unreachable {
                consecutive_errors,
                last_error,
            }),
            PollOutcome::Cancelled => Err(BuilderError::Cancelled),
        }
    }
}

/// Follows `job_id` until a terminal status, a policy bound, or cancellation.
///
/// Only `GET /api/jobs/{job_id}` is requested. Fetch failures are skipped
/// until `max_consecutive_errors` of them happen in a row.
pub async fn poll_job(
    client: &BuilderClient,
    job_id: &str,
    policy: &PollPolicy,
    view: &dyn StatusView,
    cancel: &mut watch::Receiver<bool>,
) -> PollOutcome {
    view.set_status(QUEUED_TEXT);
    view.hide_download();

    let started = Instant::now();
    let mut attempts = 0u32;
    let mut consecutive_errors = 0u32;

    loop {
        let delay = policy.delay(attempts, &mut rand::thread_rng());
        tokio::select! {
            biased;
            _ = cancelled(cancel) => return PollOutcome::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }

        let fetched = tokio::select! {
            biased;
            _ = cancelled(cancel) => return PollOutcome::Cancelled,
            r = client.get_job_status(job_id) => r,
        };
        attempts += 1;

        match fetched {
            Ok(snapshot) => {
                consecutive_errors = 0;
                view.set_progress(snapshot.percent());
                view.set_status(&render_status_line(&snapshot));

                match snapshot.state() {
                    JobState::Succeeded => {
                        let download_url = client.download_url(job_id);
                        view.reveal_download(&download_url);
                        tracing::info!(job_id, attempts, "job succeeded");
                        return PollOutcome::Succeeded { download_url };
                    }
                    JobState::Failed => {
                        let message = snapshot.message().to_string();
                        view.alert(&BuilderError::JobFailed(message.clone()).to_string());
                        tracing::warn!(job_id, %message, "job failed");
                        return PollOutcome::Failed { message };
                    }
                    JobState::Pending(label) => {
                        tracing::debug!(job_id, status = %label, progress = snapshot.progress(), "job in progress");
                    }
                }
            }
            Err(e) => {
                consecutive_errors += 1;
                tracing::debug!(job_id, consecutive_errors, error = %format!("{:#}", e), "status fetch failed, retrying");

                if let Some(max) = policy.max_consecutive_errors {
                    if consecutive_errors >= max {
                        let err = BuilderError::Unreachable {
                            consecutive_errors,
                            last_error: format!("{:#}", e),
                        };
                        view.alert(&err.to_string());
                        tracing::warn!(job_id, "{}", err);
                        return PollOutcome::Unreachable {
                            consecutive_errors,
                            last_error: format!("{:#}", e),
                        };
                    }
                }
            }
        }

        let elapsed = started.elapsed();
        let out_of_attempts = policy.max_attempts.is_some_and(|max| attempts >= max);
        let out_of_time = policy.max_duration.is_some_and(|max| elapsed >= max);
        if out_of_attempts || out_of_time {
            let err = BuilderError::TimedOut { attempts, elapsed };
            view.alert(&err.to_string());
            tracing::warn!(job_id, "{}", err);
            return PollOutcome::TimedOut { attempts, elapsed };
        }
    }
}

/// Resolves once cancellation is requested. Never resolves if the handle was dropped.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// A running poll loop. Dropping the handle detaches the loop; it keeps running.
pub struct PollHandle {
    job_id: String,
    cancel: watch::Sender<bool>,
    task: JoinHandle<PollOutcome>,
}

impl PollHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Asks the loop to stop at its next wait or fetch.
    pub fn cancel(&self) {
        // Fails only when the loop already ended.
        let _ = self.cancel.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the loop to end. Safe to call again after being interrupted.
    pub async fn wait(&mut self) -> Result<PollOutcome> {
        (&mut self.task)
            .await
            .with_context(|| format!("Poll task for job {} panicked", self.job_id))
    }
}

/// Starts `poll_job` on the runtime and returns a handle to it.
pub fn spawn_poll(
    client: BuilderClient,
    job_id: String,
    policy: PollPolicy,
    view: Arc<dyn StatusView>,
) -> PollHandle {
    let (cancel, mut rx) = watch::channel(false);
    let id = job_id.clone();
    let task = tokio::spawn(async move {
        poll_job(&client, &id, &policy, view.as_ref(), &mut rx).await
    });

    PollHandle {
        job_id,
        cancel,
        task,
    }
}
