use crate::{api::GenerationService, error::GenerationError, types::JobStatus};
use std::{path::PathBuf, sync::Arc};
use tracing::info;

pub fn artifact_file_name(job_id: &str) -> String {
    format!("generated_music_{job_id}.wav")
}

// Separators would escape the download directory.
fn disk_file_name(job_id: &str) -> String {
    artifact_file_name(&job_id.replace(|c: char| c == '/' || c == '\\', "_"))
}

#[derive(Debug, Clone)]
pub struct DownloadedArtifact {
    pub job_id: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedArtifact {
    pub job_id: String,
    pub file_name: String,
    pub path: PathBuf,
    pub size: usize,
}

pub struct ArtifactRetriever {
    service: Arc<dyn GenerationService>,
    download_dir: PathBuf,
}

impl ArtifactRetriever {
    pub fn new(service: Arc<dyn GenerationService>, download_dir: PathBuf) -> Self {
        Self { service, download_dir }
    }

    /// `known_status` is whatever the caller last saw for the job. Jobs known
    /// to be unfinished are refused without asking the service.
    pub async fn fetch(
        &self,
        job_id: &str,
        known_status: Option<JobStatus>,
    ) -> Result<DownloadedArtifact, GenerationError> {
        if let Some(status) = known_status {
            if status != JobStatus::Completed {
                return Err(GenerationError::NotCompleted { job_id: job_id.to_string(), status });
            }
        }
        let bytes = self
            .service
            .download_generation(job_id)
            .await
            .map_err(|err| GenerationError::download(job_id, err))?;
        if bytes.is_empty() {
            return Err(GenerationError::Download {
                job_id: job_id.to_string(),
                message: "Downloaded file is empty".to_string(),
                source: None,
            });
        }
        Ok(DownloadedArtifact {
            job_id: job_id.to_string(),
            file_name: artifact_file_name(job_id),
            bytes,
        })
    }

    pub async fn save(&self, artifact: &DownloadedArtifact) -> Result<SavedArtifact, GenerationError> {
        tokio::fs::create_dir_all(&self.download_dir).await.map_err(|source| {
            GenerationError::Io { path: self.download_dir.clone(), source }
        })?;
        let path = self.download_dir.join(disk_file_name(&artifact.job_id));
        tokio::fs::write(&path, &artifact.bytes)
            .await
            .map_err(|source| GenerationError::Io { path: path.clone(), source })?;
        info!(job_id = %artifact.job_id, path = %path.display(), "saved generated track");
        Ok(SavedArtifact {
            job_id: artifact.job_id.clone(),
            file_name: artifact.file_name.clone(),
            path,
            size: artifact.bytes.len(),
        })
    }

    pub async fn download(
        &self,
        job_id: &str,
        known_status: Option<JobStatus>,
    ) -> Result<SavedArtifact, GenerationError> {
        let artifact = self.fetch(job_id, known_status).await?;
        self.save(&artifact).await
    }
}
