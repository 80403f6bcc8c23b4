use crate::{
    artifact::SavedArtifact,
    mood::{self, describe_mood},
    request::GenerationForm,
    types::{GenerationJob, HistoryEntry, JobStatus, MoodSnapshot},
};

const MAX_STATUS_LINES: usize = 8;

#[derive(Debug, Default)]
pub struct AppState {
    pub mood: Option<MoodSnapshot>,
    pub generating: bool,
    pub active_job: Option<GenerationJob>,
    pub history: Vec<HistoryEntry>,
    pub history_notice: Option<String>,
    pub last_error: Option<String>,
    pub saved: Vec<SavedArtifact>,
    pub status_lines: Vec<String>,
    notices: Vec<String>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Info(message) => self.push_status_line(message),
            AppEvent::MoodLoaded(mood) => {
                let line = match &mood {
                    Some(snapshot) => format!(
                        "Current mood: {} ({})",
                        snapshot.emotion,
                        describe_mood(snapshot.valence, snapshot.arousal)
                    ),
                    None => "No mood detected".to_string(),
                };
                self.mood = mood;
                self.push_status_line(line);
            }
            AppEvent::Submitting => {
                self.generating = true;
                self.active_job = None;
                self.last_error = None;
            }
            AppEvent::SubmissionFailed(message) => {
                self.generating = false;
                self.push_status_line(format!("Error: {message}"));
                self.last_error = Some(message);
            }
            AppEvent::JobQueued { job } => {
                self.generating = !job.is_terminal();
                self.push_status_line(format!("Job {} {}", job.job_id, job.status));
                self.active_job = Some(job);
            }
            AppEvent::JobUpdated { job } => {
                let changed = self
                    .active_job
                    .as_ref()
                    .filter(|active| active.job_id == job.job_id)
                    .map(|active| active.status != job.status);
                if let Some(changed) = changed {
                    if changed {
                        self.push_status_line(format!("Job {} {}", job.job_id, job.status));
                    }
                    self.active_job = Some(job);
                }
            }
            AppEvent::JobFinished { job } => {
                if !self.is_active(&job.job_id) {
                    return;
                }
                self.generating = false;
                let line = match (job.status, job.error_message.as_deref()) {
                    (JobStatus::Failed, Some(reason)) => {
                        format!("Job {} failed: {reason}", job.job_id)
                    }
                    (JobStatus::Failed, None) => format!("Job {} failed", job.job_id),
                    _ => format!("Job {} completed ({})", job.job_id, job.parameters.summary()),
                };
                self.push_status_line(line);
                self.active_job = Some(job);
            }
            AppEvent::JobCancelled { job_id } => {
                if self.is_active(&job_id) {
                    self.generating = false;
                    self.active_job = None;
                }
                self.push_status_line(format!("Stopped tracking job {job_id}"));
            }
            AppEvent::PollingStopped { job_id, message } => {
                if self.is_active(&job_id) {
                    self.generating = false;
                }
                self.push_status_line(format!("Error: {message}"));
                self.last_error = Some(message);
            }
            AppEvent::HistoryRefreshed(entries) => {
                self.push_status_line(format!("History: {} generations", entries.len()));
                self.history = entries;
                self.history_notice = None;
            }
            AppEvent::HistoryFailed(message) => {
                self.push_status_line(format!("History unavailable: {message}"));
                self.history_notice = Some(message);
            }
            AppEvent::ArtifactSaved(artifact) => {
                self.push_status_line(format!(
                    "Saved {} to {}",
                    artifact.file_name,
                    artifact.path.display()
                ));
                self.saved.push(artifact);
            }
            AppEvent::DownloadFailed { job_id, message } => {
                self.push_status_line(format!("Download of {job_id} failed: {message}"));
                self.last_error = Some(message);
            }
        }
    }

    pub fn push_status_line(&mut self, line: String) {
        self.notices.push(line.clone());
        self.status_lines.push(line);
        if self.status_lines.len() > MAX_STATUS_LINES {
            let overflow = self.status_lines.len() - MAX_STATUS_LINES;
            self.status_lines.drain(0..overflow);
        }
    }

    /// Lines added since the last call, oldest first.
    pub fn drain_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    pub fn can_generate(&self, use_current_mood: bool) -> bool {
        !self.generating && mood::can_submit(self.mood.as_ref(), use_current_mood)
    }

    fn is_active(&self, job_id: &str) -> bool {
        self.active_job.as_ref().is_some_and(|job| job.job_id == job_id)
    }
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    Info(String),
    MoodLoaded(Option<MoodSnapshot>),
    Submitting,
    SubmissionFailed(String),
    JobQueued { job: GenerationJob },
    JobUpdated { job: GenerationJob },
    JobFinished { job: GenerationJob },
    JobCancelled { job_id: String },
    PollingStopped { job_id: String, message: String },
    HistoryRefreshed(Vec<HistoryEntry>),
    HistoryFailed(String),
    ArtifactSaved(SavedArtifact),
    DownloadFailed { job_id: String, message: String },
}

#[derive(Debug, Clone)]
pub enum AppCommand {
    Submit(GenerationForm),
    Download { job_id: String },
    CancelActive,
}
