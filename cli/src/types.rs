use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[serde(alias = "pending")]
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MusicStyle {
    #[default]
    Auto,
    Ambient,
    Melodic,
    Rhythmic,
}

impl MusicStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Ambient => "ambient",
            Self::Melodic => "melodic",
            Self::Rhythmic => "rhythmic",
        }
    }
}

impl fmt::Display for MusicStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MusicStyle {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "ambient" => Ok(Self::Ambient),
            "melodic" => Ok(Self::Melodic),
            "rhythmic" => Ok(Self::Rhythmic),
            other => Err(format!(
                "unknown style `{other}` (expected auto, ambient, melodic or rhythmic)"
            )),
        }
    }
}

/// Latest mood reported by the mood-detection side of the service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoodSnapshot {
    pub emotion: String,
    pub valence: f64,
    pub arousal: f64,
    #[serde(default, deserialize_with = "lenient_utc_opt")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Outgoing body of `POST generate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationParameters {
    pub use_current_mood: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arousal: Option<f64>,
    pub duration: u32,
    pub tempo: u32,
    pub style: MusicStyle,
}

impl GenerationParameters {
    pub fn summary(&self) -> String {
        format!("{}s • {} BPM • {}", self.duration, self.tempo, self.style)
    }
}

/// Parameters as the service recorded them. The service resolves the mood
/// server-side and may leave `tempo` empty when it derives it from arousal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobParameters {
    #[serde(default)]
    pub valence: Option<f64>,
    #[serde(default)]
    pub arousal: Option<f64>,
    pub duration: u32,
    #[serde(default)]
    pub tempo: Option<u32>,
    #[serde(default)]
    pub style: MusicStyle,
}

impl JobParameters {
    pub fn tempo_label(&self) -> String {
        self.tempo.map(|bpm| bpm.to_string()).unwrap_or_else(|| "Auto".to_string())
    }

    pub fn summary(&self) -> String {
        format!("{}s • {} BPM • {}", self.duration, self.tempo_label(), self.style)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationJob {
    pub job_id: String,
    pub status: JobStatus,
    pub parameters: GenerationParameters,
    pub created_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl GenerationJob {
    pub fn new(
        job_id: String,
        status: JobStatus,
        parameters: GenerationParameters,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self { job_id, status, parameters, created_at, error_message: None }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns false when the job already reached a terminal state; those
    /// records never change again.
    pub fn apply_status(&mut self, status: JobStatus, error_message: Option<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = status;
        if status == JobStatus::Failed {
            self.error_message = error_message;
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub job_id: String,
    pub status: JobStatus,
    pub parameters: JobParameters,
    #[serde(deserialize_with = "lenient_utc")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub job_id: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
}

impl StatusResponse {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentMoodResponse {
    #[serde(default)]
    pub mood: Option<MoodSnapshot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

// The service emits naive ISO-8601 timestamps (no offset) that are UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn lenient_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp `{raw}`")))
}

fn lenient_utc_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}
