use crate::{
    error::ApiError,
    types::{
        CurrentMoodResponse, ErrorBody, GenerationParameters, HistoryEntry, HistoryResponse,
        MoodSnapshot, StatusResponse, SubmitResponse,
    },
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:5000/api/v1/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The remote operations the job controller depends on.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn current_mood(&self) -> Result<Option<MoodSnapshot>, ApiError>;

    async fn submit_generation(
        &self,
        params: &GenerationParameters,
    ) -> Result<SubmitResponse, ApiError>;

    async fn job_status(&self, job_id: &str) -> Result<StatusResponse, ApiError>;

    async fn download_generation(&self, job_id: &str) -> Result<Vec<u8>, ApiError>;

    async fn generation_history(&self, limit: usize) -> Result<Vec<HistoryEntry>, ApiError>;
}

#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl Client {
    pub fn new(base_url: Option<&str>, token: Option<String>) -> Result<Self> {
        let mut url = base_url
            .map(Url::parse)
            .unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL))
            .context("invalid service base URL")?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        let token = token.filter(|value| !value.trim().is_empty());
        Ok(Self { http, base_url: url, token })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The health route sits beside the versioned API: `/api/v1/` checks
    /// `/api/health`.
    pub async fn health(&self) -> Result<Value, ApiError> {
        let url = self.health_url()?;
        let response = self.authorize(self.http.get(url)).send().await?;
        decode(check(response).await?).await
    }

    fn health_url(&self) -> Result<Url, ApiError> {
        self.base_url.join("../health").map_err(|err| ApiError::Url(err.to_string()))
    }

    // Segments are percent-encoded, so job ids may contain any character.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Url(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn get(&self, segments: &[&str]) -> Result<reqwest::RequestBuilder, ApiError> {
        Ok(self.authorize(self.http.get(self.endpoint(segments)?)))
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|body| body.error)
        .filter(|message| !message.trim().is_empty());
    Err(ApiError::Status { status: status.as_u16(), message })
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|err| ApiError::Decode(err.to_string()))
}

#[async_trait]
impl GenerationService for Client {
    async fn current_mood(&self) -> Result<Option<MoodSnapshot>, ApiError> {
        let response = self.get(&["emotion", "current"])?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: CurrentMoodResponse = decode(check(response).await?).await?;
        Ok(body.mood)
    }

    async fn submit_generation(
        &self,
        params: &GenerationParameters,
    ) -> Result<SubmitResponse, ApiError> {
        let url = self.endpoint(&["generate"])?;
        let response = self.authorize(self.http.post(url)).json(params).send().await?;
        decode(check(response).await?).await
    }

    async fn job_status(&self, job_id: &str) -> Result<StatusResponse, ApiError> {
        let response = self.get(&["generate", job_id])?.send().await?;
        decode(check(response).await?).await
    }

    async fn download_generation(&self, job_id: &str) -> Result<Vec<u8>, ApiError> {
        let response = self.get(&["generate", job_id, "download"])?.send().await?;
        let bytes = check(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn generation_history(&self, limit: usize) -> Result<Vec<HistoryEntry>, ApiError> {
        let response =
            self.get(&["generate", "history"])?.query(&[("limit", limit)]).send().await?;
        let body: HistoryResponse = decode(check(response).await?).await?;
        Ok(body.history)
    }
}
