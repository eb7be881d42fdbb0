// ABOUTME: Submission handler: posts the build form and starts following the new job
// ABOUTME: Keeps at most one active poll loop, replacing it on each successful submission

use anyhow::Result;
use std::sync::Arc;

use crate::poll::{spawn_poll, PollHandle, PollOutcome, PollPolicy};
use crate::remote::client::BuilderClient;
use crate::remote::models::JobForm;
use crate::view::StatusView;

/// Alert text for a rejected submission. Details go to the log only.
pub const QUEUE_FAILED_ALERT: &str = "Failed to queue job";

pub struct Session {
    client: BuilderClient,
    policy: PollPolicy,
    view: Arc<dyn StatusView>,
    active: Option<PollHandle>,
}

impl Session {
    pub fn new(client: BuilderClient, policy: PollPolicy, view: Arc<dyn StatusView>) -> Self {
        Self {
            client,
            policy,
            view,
            active: None,
        }
    }

    /// Submits `form` and starts polling the job it creates.
    ///
    /// On failure the user gets one alert and any earlier poll is left as it
    /// was. On success an earlier poll is cancelled before the new one starts.
    pub async fn submit(&mut self, form: &JobForm) -> Result<String> {
        let created = match self.client.submit_job(form).await {
            Ok(created) => created,
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "job submission failed");
                self.view.alert(QUEUE_FAILED_ALERT);
                return Err(e);
            }
        };

        if let Some(mut prev) = self.active.take() {
            tracing::info!(job_id = prev.job_id(), "superseding previous job observer");
            prev.cancel();
            // Joined so the old loop cannot write to the view after the new one starts.
            if let Err(e) = prev.wait().await {
                tracing::warn!(error = %format!("{:#}", e), "previous poll ended abnormally");
            }
        }

        let handle = spawn_poll(
            self.client.clone(),
            created.job_id.clone(),
            self.policy.clone(),
            Arc::clone(&self.view),
        );
        self.active = Some(handle);
        Ok(created.job_id)
    }

    /// Starts following a job that was created elsewhere.
    pub fn watch(&mut self, job_id: &str) {
        self.cancel();
        self.active = Some(spawn_poll(
            self.client.clone(),
            job_id.to_string(),
            self.policy.clone(),
            Arc::clone(&self.view),
        ));
    }

    pub fn active_job(&self) -> Option<&str> {
        self.active
            .as_ref()
            .filter(|h| !h.is_finished())
            .map(|h| h.job_id())
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.cancel();
        }
    }

    /// Waits for the active poll to end. `None` if nothing was being polled.
    pub async fn wait(&mut self) -> Result<Option<PollOutcome>> {
        match self.active.take() {
            Some(mut handle) => Ok(Some(handle.wait().await?)),
            None => Ok(None),
        }
    }

    /// Hands the active poll to the caller; the session stops tracking it.
    pub fn take_active(&mut self) -> Option<PollHandle> {
        self.active.take()
    }

    pub fn client(&self) -> &BuilderClient {
        &self.client
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel();
    }
}
