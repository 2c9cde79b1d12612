use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub devices_tracked: u32,
    pub subscribers_connected: u32,
    pub alert_channel: String,
    pub alert_channel_ready: bool,
    pub memory_usage_mb: f32,
    pub mqtt_status: String,
    pub mqtt_reconnects: u32,
}

/// Compteurs que l'orchestrateur fournit au moment du snapshot
#[derive(Debug, Clone, Default)]
pub struct HealthInputs {
    pub devices_tracked: usize,
    pub subscribers_connected: usize,
    pub alert_channel: String,
    pub alert_channel_ready: bool,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    mqtt_reconnects: Arc<AtomicU32>,
    mqtt_status: Arc<parking_lot::Mutex<String>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            mqtt_status: Arc::new(parking_lot::Mutex::new("disabled".to_string())),
        }
    }

    pub fn mark_mqtt_connecting(&self) {
        *self.mqtt_status.lock() = "connecting".to_string();
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected".to_string();
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = "reconnecting".to_string();
    }

    pub fn mqtt_reconnects(&self) -> u32 {
        self.mqtt_reconnects.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, inputs: HealthInputs) -> KernelHealth {
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            devices_tracked: inputs.devices_tracked as u32,
            subscribers_connected: inputs.subscribers_connected as u32,
            alert_channel: inputs.alert_channel,
            alert_channel_ready: inputs.alert_channel_ready,
            memory_usage_mb: get_memory_usage_mb(),
            mqtt_status: self.mqtt_status.lock().clone(),
            mqtt_reconnects: self.mqtt_reconnects(),
        }
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        let pid = std::process::id();
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            let rss_kb = status
                .lines()
                .find(|l| l.starts_with("VmRSS:"))
                .and_then(|l| l.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return kb as f32 / 1024.0;
            }
        }
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnects_are_counted() {
        let tracker = HealthTracker::new();
        tracker.mark_mqtt_connecting();
        tracker.increment_reconnects();
        tracker.increment_reconnects();
        let health = tracker.snapshot(HealthInputs::default());
        assert_eq!(health.mqtt_reconnects, 2);
        assert_eq!(health.mqtt_status, "reconnecting");
        tracker.mark_mqtt_connected();
        assert_eq!(tracker.snapshot(HealthInputs::default()).mqtt_status, "connected");
    }

    #[test]
    fn snapshot_carries_inputs() {
        let health = HealthTracker::new().snapshot(HealthInputs {
            devices_tracked: 4,
            subscribers_connected: 2,
            alert_channel: "log".into(),
            alert_channel_ready: true,
        });
        assert_eq!(health.devices_tracked, 4);
        assert_eq!(health.subscribers_connected, 2);
        assert!(health.alert_channel_ready);
        assert_eq!(health.mqtt_status, "disabled");
    }
}
