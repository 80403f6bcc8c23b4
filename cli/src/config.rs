use crate::{
    history::{clamp_limit, DEFAULT_HISTORY_LIMIT},
    poller::{PollPolicy, DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_POLL_INTERVAL},
};
use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_API_URL: &str = "http://localhost:5000/api/v1/";
const ENV_CONFIG_PATH: &str = "MOODWAVE_CONFIG_PATH";
const ENV_API_URL: &str = "MOODWAVE_API_URL";
const ENV_TOKEN: &str = "MOODWAVE_TOKEN";
const ENV_POLL_INTERVAL_MS: &str = "MOODWAVE_POLL_INTERVAL_MS";
const ENV_MAX_POLL_FAILURES: &str = "MOODWAVE_MAX_POLL_FAILURES";
const ENV_HISTORY_LIMIT: &str = "MOODWAVE_HISTORY_LIMIT";
const ENV_DOWNLOAD_DIR: &str = "MOODWAVE_DOWNLOAD_DIR";

#[derive(Debug, Clone)]
pub struct AppConfig {
    api_url: String,
    auth_token: Option<String>,
    poll_interval_ms: u64,
    max_poll_failures: u32,
    history_limit: usize,
    download_dir: PathBuf,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = Self::default_config_path() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create config directory {}", parent.display())
                })?;
            }
        }

        let path = match config_file_override() {
            Some(path) => path,
            None => Self::default_config_path()?,
        };
        if path.exists() {
            let partial = read_partial(&path)?;
            config.apply_partial(partial);
        }

        config.apply_env_with(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn set_api_url(&mut self, url: impl Into<String>) {
        self.api_url = url.into();
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    /// A failure ceiling of zero means polling never gives up.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            max_consecutive_failures: (self.max_poll_failures > 0)
                .then_some(self.max_poll_failures),
        }
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    pub fn download_dir(&self) -> &PathBuf {
        &self.download_dir
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "Moodwave", "Moodwave")
            .ok_or_else(|| anyhow!("unable to determine config directory"))?;
        Ok(dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    fn apply_partial(&mut self, partial: PartialConfig) {
        if let Some(url) = partial.api_url {
            self.api_url = url;
        }
        if let Some(token) = partial.auth_token {
            self.auth_token = Some(token).filter(|token| !token.trim().is_empty());
        }
        if let Some(interval) = partial.poll_interval_ms {
            self.poll_interval_ms = interval;
        }
        if let Some(failures) = partial.max_poll_failures {
            self.max_poll_failures = failures;
        }
        if let Some(limit) = partial.history_limit {
            self.history_limit = clamp_limit(limit);
        }
        if let Some(dir) = partial.download_dir {
            self.download_dir = dir;
        }
    }

    fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = var(ENV_API_URL) {
            self.api_url = value;
        }
        if let Some(value) = lookup(ENV_TOKEN) {
            self.auth_token = Some(value).filter(|token| !token.trim().is_empty());
        }
        if let Some(value) = var(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = value
                .trim()
                .parse()
                .context("MOODWAVE_POLL_INTERVAL_MS must be a positive integer")?;
        }
        if let Some(value) = var(ENV_MAX_POLL_FAILURES) {
            self.max_poll_failures = value
                .trim()
                .parse()
                .context("MOODWAVE_MAX_POLL_FAILURES must be a non-negative integer")?;
        }
        if let Some(value) = var(ENV_HISTORY_LIMIT) {
            let parsed: usize = value
                .trim()
                .parse()
                .context("MOODWAVE_HISTORY_LIMIT must be an integer between 1-100")?;
            self.history_limit = clamp_limit(parsed);
        }
        if let Some(value) = var(ENV_DOWNLOAD_DIR) {
            self.download_dir = PathBuf::from(value);
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            auth_token: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            max_poll_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            history_limit: DEFAULT_HISTORY_LIMIT,
            download_dir: default_download_dir(),
        }
    }
}

fn config_file_override() -> Option<PathBuf> {
    let value = env::var_os(ENV_CONFIG_PATH)?;
    if value.is_empty() {
        return None;
    }
    let path = PathBuf::from(value);
    if path.is_dir() && !path.ends_with(CONFIG_FILE_NAME) {
        return Some(path.join(CONFIG_FILE_NAME));
    }
    Some(path)
}

fn read_partial(path: &Path) -> Result<PartialConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let partial: PartialConfig =
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(partial)
}

fn default_download_dir() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join("Music").join("Moodwave"))
        .unwrap_or_else(|| PathBuf::from("./downloads"))
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct PartialConfig {
    api_url: Option<String>,
    auth_token: Option<String>,
    poll_interval_ms: Option<u64>,
    max_poll_failures: Option<u32>,
    history_limit: Option<usize>,
    download_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_service_contract() {
        let config = AppConfig::default();
        assert_eq!(config.api_url(), "http://localhost:5000/api/v1/");
        assert_eq!(config.auth_token(), None);
        assert_eq!(config.history_limit(), 10);
        let policy = config.poll_policy();
        assert_eq!(policy.interval, Duration::from_secs(2));
        assert_eq!(policy.max_consecutive_failures, Some(30));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            r#"
api_url = "https://moods.example.com/api/v1"
poll_interval_ms = 500
max_poll_failures = 0
history_limit = 250
download_dir = "/tmp/tracks"
"#,
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.apply_partial(read_partial(&path).unwrap());
        assert_eq!(config.api_url(), "https://moods.example.com/api/v1");
        assert_eq!(config.history_limit(), 100);
        assert_eq!(config.download_dir(), &PathBuf::from("/tmp/tracks"));
        let policy = config.poll_policy();
        assert_eq!(policy.interval, Duration::from_millis(500));
        assert_eq!(policy.max_consecutive_failures, None);
    }

    #[test]
    fn env_overrides_file_and_ignores_blanks() {
        let mut config = AppConfig::default();
        config
            .apply_env_with(lookup(&[
                (ENV_API_URL, "  "),
                (ENV_TOKEN, "secret"),
                (ENV_POLL_INTERVAL_MS, "250"),
                (ENV_HISTORY_LIMIT, "0"),
                (ENV_DOWNLOAD_DIR, "/srv/music"),
            ]))
            .unwrap();
        assert_eq!(config.api_url(), DEFAULT_API_URL);
        assert_eq!(config.auth_token(), Some("secret"));
        assert_eq!(config.poll_policy().interval, Duration::from_millis(250));
        assert_eq!(config.history_limit(), 1);
        assert_eq!(config.download_dir(), &PathBuf::from("/srv/music"));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let mut config = AppConfig::default();
        let err = config.apply_env_with(lookup(&[(ENV_MAX_POLL_FAILURES, "lots")])).unwrap_err();
        assert!(err.to_string().contains("MOODWAVE_MAX_POLL_FAILURES"));
    }

    #[test]
    fn malformed_file_reports_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "history_limit = \"ten\"").unwrap();
        let err = read_partial(&path).unwrap_err();
        assert!(err.to_string().contains(&path.display().to_string()));
    }
}
