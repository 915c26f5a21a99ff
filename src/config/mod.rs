use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::collector::store::DEFAULT_ROTATION_THRESHOLD;
use crate::models::ServiceSpec;
use crate::utils::{normalize_url_scheme, sanitize_name};

/// Prefix for environment overrides, e.g. `RECORDS_WEB__PORT=9090`.
pub const ENV_PREFIX: &str = "RECORDS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub web: WebConfig,
    pub sink: SinkConfig,
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    /// When set, `/api/v1` requires this key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    pub enabled: bool,
    pub url: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub rotation_threshold: usize,
    /// Rotated records are written here as JSON when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub worker_timeout_secs: u64,
    pub health_report_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default)]
    pub cpu: Vec<CpuWorkerConfig>,
    #[serde(default)]
    pub http: Vec<HttpWorkerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuWorkerConfig {
    pub name: String,
    pub index: String,
    #[serde(default = "default_cpu_sample_secs")]
    pub sample_secs: u64,
    #[serde(default = "default_stat_path")]
    pub stat_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpWorkerConfig {
    pub name: String,
    pub index: String,
    pub urls: Vec<String>,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_cpu_sample_secs() -> u64 {
    2
}

fn default_stat_path() -> PathBuf {
    PathBuf::from(crate::sources::cpu::DEFAULT_STAT_PATH)
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            web: WebConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                api_key: None,
            },
            sink: SinkConfig {
                enabled: false,
                url: "http://127.0.0.1:4080/api/_bulkv2".to_string(),
                username: "admin".to_string(),
                password: None,
                timeout_secs: 10,
            },
            storage: StorageConfig {
                rotation_threshold: DEFAULT_ROTATION_THRESHOLD,
                archive_dir: None,
            },
            scheduler: SchedulerConfig {
                worker_timeout_secs: 30,
                health_report_secs: 1800,
            },
            workers: WorkersConfig {
                cpu: vec![CpuWorkerConfig {
                    name: "cpu_monitor".to_string(),
                    index: "cpuMon".to_string(),
                    sample_secs: default_cpu_sample_secs(),
                    stat_path: default_stat_path(),
                }],
                http: Vec::new(),
            },
            services: vec![ServiceSpec::new("cpu_monitor", "cpuMon", 3600, 60).with_rerun(true)],
        }
    }
}

impl Config {
    /// Load configuration from `path`, layered with `RECORDS_*` environment
    /// overrides. A missing file is created from the defaults first.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            let contents = toml::to_string_pretty(&Self::default())?;
            std::fs::write(path, contents)?;
        }

        Self::load_from(path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail later at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.sink.enabled {
            let url = url::Url::parse(&normalize_url_scheme(&self.sink.url))
                .map_err(|e| anyhow!("invalid sink url '{}': {}", self.sink.url, e))?;
            if url.host_str().is_none() {
                bail!("sink url '{}' has no host", self.sink.url);
            }
        }

        if self.storage.rotation_threshold == 0 {
            bail!("storage.rotation_threshold must be at least 1");
        }
        if self.scheduler.worker_timeout_secs == 0 {
            bail!("scheduler.worker_timeout_secs must be at least 1");
        }

        for http in &self.workers.http {
            if http.urls.is_empty() {
                bail!("worker '{}' has no urls", http.name);
            }
            for target in &http.urls {
                url::Url::parse(target).map_err(|e| {
                    anyhow!("invalid url '{}' for worker '{}': {}", target, http.name, e)
                })?;
            }
        }

        Ok(())
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Configured spec for a service, matched by sanitized name.
    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        let key = sanitize_name(name);
        self.services.iter().find(|spec| spec.sanitized_name() == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[web]
host = "127.0.0.1"
port = 9000

[sink]
enabled = true
url = "http://127.0.0.1:4080/api/_bulkv2"
username = "admin"
timeout_secs = 5

[storage]
rotation_threshold = 30

[scheduler]
worker_timeout_secs = 20
health_report_secs = 600

[[workers.http]]
name = "weather monitor"
index = "weather"
urls = ["http://api.weather.local/current.json?q=houston"]

[[services]]
name = "weather monitor"
index = "weather"
runtime = 3600
refresh = 300
rerun = true
scheduled = true
start_at = { time = "06:00", timezone = "America/Chicago" }
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.web.port, 9000);
        assert!(config.web.api_key.is_none());
        assert_eq!(config.storage.rotation_threshold, 30);
        assert_eq!(config.workers.http.len(), 1);
        assert_eq!(config.workers.http[0].timeout_secs, 30);
        assert!(config.workers.cpu.is_empty());

        let spec = config.service("weather_monitor").unwrap();
        assert_eq!(spec.refresh_secs, 300);
        assert!(spec.validate().unwrap().is_some());
    }

    #[test]
    fn test_default_round_trips_through_toml() {
        let contents = toml::to_string_pretty(&Config::default()).unwrap();
        let config = Config::from_toml_str(&contents).unwrap();
        assert_eq!(config.services.len(), 1);
        assert!(config.service("cpu monitor").is_some());
    }

    #[test]
    fn test_load_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.web.port, Config::default().web.port);
        assert_eq!(config.services.len(), 1);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.web.host, "127.0.0.1");
        assert_eq!(config.scheduler.worker_timeout_secs, 20);
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        tokio_test::assert_ok!(config.validate());

        config.sink.enabled = true;
        config.sink.url = "127.0.0.1:4080/api/_bulkv2".to_string();
        tokio_test::assert_ok!(config.validate());

        config.storage.rotation_threshold = 0;
        tokio_test::assert_err!(config.validate());

        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        config.workers.http[0].urls.push("not a url".to_string());
        tokio_test::assert_err!(config.validate());
    }

    #[test]
    fn test_validate_rejects_worker_without_urls() {
        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        tokio_test::assert_ok!(config.validate());

        config.workers.http[0].urls.clear();
        let error = tokio_test::assert_err!(config.validate());
        assert!(error.to_string().contains("has no urls"));
    }
}
