use crate::{
    api::GenerationService,
    app::{AppCommand, AppEvent},
    artifact::{ArtifactRetriever, SavedArtifact},
    config::AppConfig,
    error::GenerationError,
    history::HistoryReconciler,
    poller::{PollPolicy, PollStep, StatusPoller},
    request::GenerationForm,
    types::{GenerationJob, HistoryEntry, JobStatus, MoodSnapshot, StatusResponse},
};
use chrono::Utc;
use std::{path::PathBuf, sync::Arc};
use tokio::{
    sync::{
        mpsc::{UnboundedReceiver, UnboundedSender},
        Mutex,
    },
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub poll: PollPolicy,
    pub history_limit: usize,
    pub download_dir: PathBuf,
}

impl ControllerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            poll: config.poll_policy(),
            history_limit: config.history_limit(),
            download_dir: config.download_dir().clone(),
        }
    }
}

struct ActiveJob {
    job: GenerationJob,
    cancel: CancellationToken,
}

/// Owns the generation lifecycle for one view: at most one tracked job, its
/// poll task, the history list and downloads. Dropping the controller stops
/// any polling it started.
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    service: Arc<dyn GenerationService>,
    event_tx: UnboundedSender<AppEvent>,
    settings: ControllerSettings,
    mood: Mutex<Option<MoodSnapshot>>,
    active: Mutex<Option<ActiveJob>>,
    history: HistoryReconciler,
    artifacts: ArtifactRetriever,
    shutdown: CancellationToken,
}

impl Controller {
    pub fn new(
        service: Arc<dyn GenerationService>,
        event_tx: UnboundedSender<AppEvent>,
        settings: ControllerSettings,
    ) -> Self {
        let inner = ControllerInner {
            history: HistoryReconciler::new(service.clone()),
            artifacts: ArtifactRetriever::new(service.clone(), settings.download_dir.clone()),
            service,
            event_tx,
            settings,
            mood: Mutex::new(None),
            active: Mutex::new(None),
            shutdown: CancellationToken::new(),
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn spawn(&self, mut command_rx: UnboundedReceiver<AppCommand>) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                let command = tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    command = command_rx.recv() => match command {
                        Some(command) => command,
                        None => break,
                    },
                };
                if let Err(err) = inner.handle_command(command).await {
                    error!("command error: {err}");
                }
            }
        })
    }

    pub async fn load_current_mood(&self) -> Option<MoodSnapshot> {
        self.inner.load_current_mood().await
    }

    pub async fn refresh_history(&self) -> Result<Vec<HistoryEntry>, GenerationError> {
        self.inner.refresh_history().await
    }

    pub async fn download(&self, job_id: &str) -> Result<SavedArtifact, GenerationError> {
        self.inner.download(job_id).await
    }

    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl ControllerInner {
    fn emit(&self, event: AppEvent) {
        let _ = self.event_tx.send(event);
    }

    async fn handle_command(self: &Arc<Self>, command: AppCommand) -> Result<(), GenerationError> {
        match command {
            AppCommand::Submit(form) => {
                self.submit(&form).await?;
            }
            AppCommand::Download { job_id } => {
                self.download(&job_id).await?;
            }
            AppCommand::CancelActive => self.cancel_active().await,
        }
        Ok(())
    }

    async fn load_current_mood(&self) -> Option<MoodSnapshot> {
        match self.service.current_mood().await {
            Ok(mood) => {
                *self.mood.lock().await = mood.clone();
                self.emit(AppEvent::MoodLoaded(mood.clone()));
                mood
            }
            Err(err) => {
                info!("no current mood available: {err}");
                self.mood.lock().await.clone()
            }
        }
    }

    async fn submit(self: &Arc<Self>, form: &GenerationForm) -> Result<GenerationJob, GenerationError> {
        let mood = self.mood.lock().await.clone();
        let params = match form.build(mood.as_ref()) {
            Ok(params) => params,
            Err(err) => {
                self.emit(AppEvent::SubmissionFailed(err.to_string()));
                return Err(err.into());
            }
        };

        self.cancel_active().await;
        self.emit(AppEvent::Submitting);

        let response = match self.service.submit_generation(&params).await {
            Ok(response) => response,
            Err(err) => {
                let err = GenerationError::submission(err);
                warn!("generation request rejected: {err}");
                self.emit(AppEvent::SubmissionFailed(err.to_string()));
                return Err(err);
            }
        };

        let job = GenerationJob::new(response.job_id, response.status, params, Utc::now());
        info!(job_id = %job.job_id, status = %job.status, "generation job submitted");

        let cancel = self.shutdown.child_token();
        {
            let mut active = self.active.lock().await;
            if let Some(previous) = active.take() {
                previous.cancel.cancel();
            }
            *active = Some(ActiveJob { job: job.clone(), cancel: cancel.clone() });
        }
        self.emit(AppEvent::JobQueued { job: job.clone() });

        if job.is_terminal() {
            self.on_terminal(&job).await;
        } else {
            let inner = Arc::clone(self);
            let job_id = job.job_id.clone();
            let initial = job.status;
            tokio::spawn(async move { inner.run_poll(job_id, initial, cancel).await });
        }
        Ok(job)
    }

    async fn run_poll(self: Arc<Self>, job_id: String, initial: JobStatus, cancel: CancellationToken) {
        let mut poller = StatusPoller::new(
            self.service.clone(),
            job_id.clone(),
            initial,
            self.settings.poll,
            cancel.clone(),
        );
        while let Some(step) = poller.tick().await {
            match step {
                PollStep::Progress(status) | PollStep::Finished(status) => {
                    let Some(job) = self.apply_status(&job_id, &cancel, status).await else {
                        break;
                    };
                    if job.is_terminal() {
                        self.on_terminal(&job).await;
                    }
                }
                PollStep::Cancelled => debug!(%job_id, "polling cancelled"),
                PollStep::Abandoned { failures, last_error } => {
                    let err = GenerationError::PollAbandoned {
                        job_id: job_id.clone(),
                        failures,
                        last_error: Box::new(last_error),
                    };
                    error!("{err}");
                    if !cancel.is_cancelled() {
                        self.emit(AppEvent::PollingStopped {
                            job_id: job_id.clone(),
                            message: err.to_string(),
                        });
                    }
                }
            }
        }
        debug!(%job_id, queries = poller.queries(), "poll task finished");
    }

    /// Writes an observed status into the active job. Returns `None` when the
    /// job was superseded or cancelled in the meantime.
    async fn apply_status(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
        status: StatusResponse,
    ) -> Option<GenerationJob> {
        let mut active = self.active.lock().await;
        let Some(entry) = active
            .as_mut()
            .filter(|entry| entry.job.job_id == job_id && !cancel.is_cancelled())
        else {
            debug!(%job_id, "discarding status for superseded job");
            return None;
        };
        if !entry.job.apply_status(status.status, status.error_message) {
            return None;
        }
        let job = entry.job.clone();
        drop(active);

        if !job.is_terminal() {
            self.emit(AppEvent::JobUpdated { job: job.clone() });
        }
        Some(job)
    }

    async fn on_terminal(&self, job: &GenerationJob) {
        self.emit(AppEvent::JobFinished { job: job.clone() });
        match job.status {
            JobStatus::Completed => {
                info!(job_id = %job.job_id, "generation completed");
                let _ = self.refresh_history().await;
            }
            _ => warn!(
                job_id = %job.job_id,
                reason = job.error_message.as_deref().unwrap_or("unknown"),
                "generation failed"
            ),
        }
    }

    async fn refresh_history(&self) -> Result<Vec<HistoryEntry>, GenerationError> {
        match self.history.refresh(self.settings.history_limit).await {
            Ok(entries) => {
                self.emit(AppEvent::HistoryRefreshed(entries.clone()));
                Ok(entries)
            }
            Err(err) => {
                self.emit(AppEvent::HistoryFailed(err.to_string()));
                Err(err)
            }
        }
    }

    async fn known_status(&self, job_id: &str) -> Option<JobStatus> {
        let active = self
            .active
            .lock()
            .await
            .as_ref()
            .filter(|active| active.job.job_id == job_id)
            .map(|active| active.job.status);
        match active {
            Some(status) => Some(status),
            None => self.history.status_of(job_id).await,
        }
    }

    async fn download(&self, job_id: &str) -> Result<SavedArtifact, GenerationError> {
        let known = self.known_status(job_id).await;
        match self.artifacts.download(job_id, known).await {
            Ok(saved) => {
                self.emit(AppEvent::ArtifactSaved(saved.clone()));
                Ok(saved)
            }
            Err(err) => {
                warn!(%job_id, "download failed: {err}");
                self.emit(AppEvent::DownloadFailed {
                    job_id: job_id.to_string(),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn cancel_active(&self) {
        let Some(active) = self.active.lock().await.take() else {
            return;
        };
        active.cancel.cancel();
        if !active.job.is_terminal() {
            info!(job_id = %active.job.job_id, "stopped tracking generation job");
            self.emit(AppEvent::JobCancelled { job_id: active.job.job_id });
        }
    }
}
