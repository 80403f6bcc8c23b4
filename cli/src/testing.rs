//! In-memory stand-in for the generation service used by the unit tests.

use crate::{
    api::GenerationService,
    error::ApiError,
    types::{
        GenerationParameters, HistoryEntry, JobStatus, MoodSnapshot, StatusResponse,
        SubmitResponse,
    },
};
use async_trait::async_trait;
use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

#[derive(Debug, Clone)]
pub enum Scripted {
    Status(JobStatus),
    /// Answers with a different `job_id` than the one asked for.
    Reported(String, JobStatus),
    Fail,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CurrentMood,
    Submit(GenerationParameters),
    Status(String),
    Download(String),
    History(usize),
}

#[derive(Default)]
pub struct FakeService {
    mood: Mutex<Option<MoodSnapshot>>,
    reject_submit: Mutex<Option<(u16, Option<String>)>>,
    next_job: Mutex<u32>,
    statuses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    status_delays: Mutex<HashMap<String, Duration>>,
    history: Mutex<Vec<HistoryEntry>>,
    history_fails: Mutex<bool>,
    artifacts: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mood(&self, mood: Option<MoodSnapshot>) {
        *self.mood.lock().unwrap() = mood;
    }

    pub fn reject_submissions(&self, status: u16, message: Option<&str>) {
        *self.reject_submit.lock().unwrap() = Some((status, message.map(str::to_string)));
    }

    /// Responses are consumed in order; the last one repeats forever.
    pub fn script_status<I: IntoIterator<Item = Scripted>>(&self, job_id: &str, script: I) {
        self.statuses.lock().unwrap().insert(job_id.to_string(), script.into_iter().collect());
    }

    /// Status answers for `job_id` arrive `delay` after the query is recorded.
    pub fn delay_status(&self, job_id: &str, delay: Duration) {
        self.status_delays.lock().unwrap().insert(job_id.to_string(), delay);
    }

    pub fn set_history(&self, entries: Vec<HistoryEntry>) {
        *self.history.lock().unwrap() = entries;
    }

    pub fn fail_history(&self, fail: bool) {
        *self.history_fails.lock().unwrap() = fail;
    }

    pub fn set_artifact(&self, job_id: &str, bytes: &[u8]) {
        self.artifacts.lock().unwrap().insert(job_id.to_string(), bytes.to_vec());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn status_calls(&self, job_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| matches!(call, Call::Status(id) if id == job_id))
            .count()
    }

    pub fn submit_calls(&self) -> usize {
        self.calls.lock().unwrap().iter().filter(|call| matches!(call, Call::Submit(_))).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn unavailable() -> ApiError {
        ApiError::Status { status: 503, message: Some("service unavailable".into()) }
    }
}

#[async_trait]
impl GenerationService for FakeService {
    async fn current_mood(&self) -> Result<Option<MoodSnapshot>, ApiError> {
        self.record(Call::CurrentMood);
        Ok(self.mood.lock().unwrap().clone())
    }

    async fn submit_generation(
        &self,
        params: &GenerationParameters,
    ) -> Result<SubmitResponse, ApiError> {
        self.record(Call::Submit(params.clone()));
        if let Some((status, message)) = self.reject_submit.lock().unwrap().clone() {
            return Err(ApiError::Status { status, message });
        }
        let mut next = self.next_job.lock().unwrap();
        *next += 1;
        Ok(SubmitResponse {
            job_id: format!("job-{}", *next),
            status: JobStatus::Queued,
            message: Some("Music generation started".into()),
        })
    }

    async fn job_status(&self, job_id: &str) -> Result<StatusResponse, ApiError> {
        self.record(Call::Status(job_id.to_string()));
        let delay = self.status_delays.lock().unwrap().get(job_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut statuses = self.statuses.lock().unwrap();
        let script = statuses.get_mut(job_id).ok_or(ApiError::Status {
            status: 404,
            message: Some("Job not found".into()),
        })?;
        let step = if script.len() > 1 { script.pop_front() } else { script.front().cloned() };
        match step {
            Some(Scripted::Status(status)) => Ok(StatusResponse {
                job_id: Some(job_id.to_string()),
                status,
                error_message: (status == JobStatus::Failed).then(|| "render failed".to_string()),
                download_url: None,
            }),
            Some(Scripted::Reported(reported, status)) => Ok(StatusResponse {
                job_id: Some(reported),
                status,
                error_message: None,
                download_url: None,
            }),
            Some(Scripted::Fail) | None => Err(Self::unavailable()),
        }
    }

    async fn download_generation(&self, job_id: &str) -> Result<Vec<u8>, ApiError> {
        self.record(Call::Download(job_id.to_string()));
        self.artifacts.lock().unwrap().get(job_id).cloned().ok_or(ApiError::Status {
            status: 404,
            message: Some("Generated file not found".into()),
        })
    }

    async fn generation_history(&self, limit: usize) -> Result<Vec<HistoryEntry>, ApiError> {
        self.record(Call::History(limit));
        if *self.history_fails.lock().unwrap() {
            return Err(Self::unavailable());
        }
        Ok(self.history.lock().unwrap().iter().take(limit).cloned().collect())
    }
}
