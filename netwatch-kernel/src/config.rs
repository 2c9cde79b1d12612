use crate::gate::GatePolicy;
use crate::retry::RetrySettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    pub listen: ListenConf,
    pub devices_file: PathBuf,
    pub probe_interval_secs: u64,
    pub config_poll_interval_secs: u64,
    pub concurrency: usize,
    pub probe: ProbeConf,
    pub notifications: NotificationConf,
    pub alerts: AlertsConf,
    pub history: HistoryConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ListenConf {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProbeConf {
    pub packets: u32,
    pub timeout_ms: u64,
    pub retries: u32,
    pub backoff_factor: f64,
    pub packet_size: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct NotificationConf {
    pub offline_threshold_secs: u64,
    pub initial_scan_delay_secs: u64,
    pub retry_failed_alerts: bool,
    pub startup_message: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertTransport {
    #[default]
    Log,
    Mqtt,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct AlertsConf {
    pub transport: AlertTransport,
    pub mqtt: MqttAlertConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MqttAlertConf {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub destination: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HistoryConf {
    pub dir: PathBuf,
    pub max_bytes: u64,
    pub max_backups: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen: ListenConf::default(),
            devices_file: PathBuf::from("config/devices.json"),
            probe_interval_secs: 5,
            config_poll_interval_secs: 10,
            concurrency: 10,
            probe: ProbeConf::default(),
            notifications: NotificationConf::default(),
            alerts: AlertsConf::default(),
            history: HistoryConf::default(),
        }
    }
}

impl Default for ListenConf {
    fn default() -> Self {
        Self { host: "0.0.0.0".into(), port: 8080 }
    }
}

impl Default for ProbeConf {
    fn default() -> Self {
        Self {
            packets: 3,
            timeout_ms: 1000,
            retries: 3,
            backoff_factor: 1.5,
            packet_size: default_packet_size(),
        }
    }
}

impl Default for NotificationConf {
    fn default() -> Self {
        Self {
            offline_threshold_secs: 15,
            initial_scan_delay_secs: 60,
            retry_failed_alerts: false,
            startup_message: true,
        }
    }
}

impl Default for MqttAlertConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "netwatch-kernel".into(),
            topic: "netwatch/alerts@v1".into(),
            destination: None,
        }
    }
}

impl Default for HistoryConf {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            max_bytes: 2 * 1024 * 1024,
            max_backups: 3,
        }
    }
}

// 64 octets de données + en-tête ICMP sur les cibles 64 bits
fn default_packet_size() -> u32 {
    if cfg!(target_pointer_width = "64") {
        68
    } else {
        56
    }
}

impl KernelConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn retry_settings(&self) -> RetrySettings {
        RetrySettings {
            base_timeout: Duration::from_millis(self.probe.timeout_ms),
            retries: self.probe.retries,
            backoff_factor: self.probe.backoff_factor,
        }
    }

    pub fn gate_policy(&self) -> GatePolicy {
        GatePolicy {
            offline_threshold: Duration::from_secs(self.notifications.offline_threshold_secs),
            initial_scan_delay: Duration::from_secs(self.notifications.initial_scan_delay_secs),
            retry_failed_alerts: self.notifications.retry_failed_alerts,
        }
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }

    pub fn config_poll_interval(&self) -> Duration {
        Duration::from_secs(self.config_poll_interval_secs.max(1))
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen.host, self.listen.port)
    }
}

pub async fn read_config(path: &Path) -> Result<KernelConfig, ConfigError> {
    let txt = fs::read_to_string(path).await?;
    KernelConfig::from_yaml(&txt)
}

/// Charge la config depuis `NETWATCH_CONFIG` (défaut `netwatch.yaml`), défauts si absente ou invalide
pub async fn load_config() -> KernelConfig {
    let path = std::env::var("NETWATCH_CONFIG").unwrap_or_else(|_| "netwatch.yaml".into());
    if !Path::new(&path).exists() {
        tracing::warn!("[kernel] no {} found, using default config", path);
        return KernelConfig::default();
    }
    match read_config(Path::new(&path)).await {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("[kernel] invalid config {}: {}", path, e);
            KernelConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() {
        let cfg = KernelConfig::from_yaml("").unwrap();
        assert_eq!(cfg, KernelConfig::default());
        assert_eq!(cfg.listen_addr(), "0.0.0.0:8080");
        assert_eq!(cfg.concurrency, 10);
        assert_eq!(cfg.alerts.transport, AlertTransport::Log);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let cfg = KernelConfig::from_yaml(
            "probe:\n  retries: 1\nnotifications:\n  retry_failed_alerts: true\nalerts:\n  transport: mqtt\n  mqtt:\n    destination: ops\n",
        )
        .unwrap();
        assert_eq!(cfg.probe.retries, 1);
        assert_eq!(cfg.probe.timeout_ms, 1000);
        assert!(cfg.gate_policy().retry_failed_alerts);
        assert_eq!(cfg.gate_policy().offline_threshold, Duration::from_secs(15));
        assert_eq!(cfg.alerts.transport, AlertTransport::Mqtt);
        assert_eq!(cfg.alerts.mqtt.topic, "netwatch/alerts@v1");
        assert_eq!(cfg.alerts.mqtt.destination.as_deref(), Some("ops"));
    }

    #[test]
    fn retry_settings_follow_probe_section() {
        let cfg = KernelConfig::from_yaml("probe:\n  timeout_ms: 500\n  backoff_factor: 2.0\n").unwrap();
        let retry = cfg.retry_settings();
        assert_eq!(retry.timeout_for(3), Duration::from_millis(2000));
        assert_eq!(retry.max_attempts(), 4);
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(matches!(KernelConfig::from_yaml("concurrency: [nope"), Err(ConfigError::Yaml(_))));
    }
}
