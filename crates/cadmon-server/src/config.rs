use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Age in days after which bucket logs and transition history are
    /// deleted. Alarm states are kept indefinitely.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default)]
    pub series: Vec<SeriesConfig>,
    #[serde(default)]
    pub alarms: Vec<AlarmConfig>,
    #[serde(default)]
    pub composites: Vec<CompositeConfig>,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesConfig {
    pub name: String,
    /// Bucket width in seconds.
    pub period_secs: u64,
    #[serde(default = "default_retain_buckets")]
    pub retain_buckets: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmConfig {
    pub name: String,
    /// Threshold expression in textual form,
    /// e.g. `IF(FILL(m, 0) == 1, 0, 1) + e`.
    pub expression: String,
    /// One of `gt`, `lt`, `ge`, `le` (or the long forms).
    pub operator: String,
    pub threshold: f64,
    /// N: most-recent derived buckets considered.
    #[serde(default = "default_evaluation_window")]
    pub evaluation_window: usize,
    /// M: breaching buckets among N required for ALARM.
    #[serde(default = "default_breach_count")]
    pub breach_count: usize,
    /// One of `breaching`, `not_breaching`, `ignore`, `as_missing`.
    #[serde(default = "default_missing_data")]
    pub missing_data: String,
    /// Width of one derived bucket in seconds.
    pub period_secs: u64,
    #[serde(default = "default_severity")]
    pub severity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeConfig {
    pub name: String,
    /// Boolean rule over alarm names, e.g. `under_invoked OR over_invoked`.
    pub rule: String,
    #[serde(default = "default_severity")]
    pub severity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel plugin type (`log`, `webhook`).
    #[serde(rename = "type")]
    pub channel_type: String,
    #[serde(default = "default_min_severity")]
    pub min_severity: String,
    /// Plugin-specific settings, validated by the plugin.
    #[serde(default)]
    pub config: Option<toml::Value>,
}

fn default_http_port() -> u16 {
    8080
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_retention_days() -> u32 {
    14
}

fn default_retain_buckets() -> usize {
    168
}

fn default_evaluation_window() -> usize {
    1
}

fn default_breach_count() -> usize {
    1
}

fn default_missing_data() -> String {
    "as_missing".to_string()
}

fn default_severity() -> String {
    "warning".to_string()
}

fn default_min_severity() -> String {
    "info".to_string()
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
