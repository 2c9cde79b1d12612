/**
 * ALERT CHANNELS - Transport des alertes opérateur
 *
 * RÔLE :
 * Abstraction "envoyer un message texte" derrière laquelle le kernel pousse
 * les alertes de panne / rétablissement. Best effort, pas de renvoi automatique.
 *
 * IMPLÉMENTATIONS :
 * - LogAlertChannel  : écrit l'alerte dans les logs (défaut, toujours prêt)
 * - MqttAlertChannel : publie `{destination, text, timestamp}` sur un topic MQTT
 */

use crate::config::MqttAlertConf;
use crate::gate::{AlertDecision, AlertKind};
use crate::health::HealthTracker;
use crate::models::DeviceConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("alert channel not ready")]
    NotReady,
    #[error("MQTT publish failed: {0}")]
    Mqtt(#[from] rumqttc::ClientError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    Transport(String),
}

/// Contrat minimal du transport d'alertes
#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &str;
    fn is_ready(&self) -> bool;
    async fn send(&self, text: &str) -> Result<(), AlertError>;
}

pub type SharedAlertChannel = Arc<dyn AlertChannel>;

/// Canal par défaut : l'alerte finit dans les logs
#[derive(Debug, Default, Clone)]
pub struct LogAlertChannel;

#[async_trait]
impl AlertChannel for LogAlertChannel {
    fn name(&self) -> &str {
        "log"
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn send(&self, text: &str) -> Result<(), AlertError> {
        tracing::warn!("[alert] {}", text.replace('\n', " | "));
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct AlertPayload<'a> {
    destination: Option<&'a str>,
    text: &'a str,
    timestamp: DateTime<Utc>,
}

/// Publication des alertes sur un broker MQTT
pub struct MqttAlertChannel {
    client: AsyncClient,
    topic: String,
    destination: Option<String>,
    ready: Arc<AtomicBool>,
}

impl MqttAlertChannel {
    /// Crée le client et démarre la boucle d'événements MQTT en tâche de fond
    pub fn connect(conf: &MqttAlertConf, health: HealthTracker) -> Self {
        let mut opts = MqttOptions::new(&conf.client_id, &conf.host, conf.port);
        opts.set_keep_alive(Duration::from_secs(15));
        let (client, mut eventloop) = AsyncClient::new(opts, 10);
        let ready = Arc::new(AtomicBool::new(false));
        health.mark_mqtt_connecting();

        let ready_flag = ready.clone();
        task::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        tracing::info!("[alerts] MQTT connected");
                        ready_flag.store(true, Ordering::Relaxed);
                        health.mark_mqtt_connected();
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("[alerts] MQTT error: {:?}", e);
                        ready_flag.store(false, Ordering::Relaxed);
                        health.increment_reconnects();
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });

        Self {
            client,
            topic: conf.topic.clone(),
            destination: conf.destination.clone(),
            ready,
        }
    }
}

#[async_trait]
impl AlertChannel for MqttAlertChannel {
    fn name(&self) -> &str {
        "mqtt"
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    async fn send(&self, text: &str) -> Result<(), AlertError> {
        if !self.is_ready() {
            return Err(AlertError::NotReady);
        }
        let payload = serde_json::to_vec(&AlertPayload {
            destination: self.destination.as_deref(),
            text,
            timestamp: Utc::now(),
        })?;
        self.client
            .publish(self.topic.as_str(), QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }
}

/// Texte de l'alerte pour une décision du gate
pub fn format_alert(decision: &AlertDecision, device: &DeviceConfig) -> String {
    let description = if device.description.trim().is_empty() {
        "No description"
    } else {
        device.description.as_str()
    };
    let timestamp = decision.decided_at.format("%Y-%m-%d %H:%M:%S UTC");
    match decision.kind {
        AlertKind::Outage => format!(
            "⚠️ DEVICE OFFLINE ⚠️\n\nName: {}\nAddress: {}\nDescription: {}\nTimestamp: {}",
            device.name, device.address, description, timestamp
        ),
        AlertKind::Recovery => format!(
            "✅ DEVICE ONLINE ✅\n\nName: {}\nAddress: {}\nDescription: {}\nTimestamp: {}\nOffline for: {}",
            device.name,
            device.address,
            description,
            timestamp,
            format_duration(decision.outage_duration())
        ),
    }
}

pub fn startup_message(now: DateTime<Utc>, devices: usize) -> String {
    format!(
        "🖥️ netwatch 🖥️\n\nMonitoring active for {} device(s).\nOffline devices will be reported here.\n\nTimestamp: {}",
        devices,
        now.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Durée exprimée dans sa plus grande unité entière
pub fn format_duration(d: Duration) -> String {
    let seconds = d.as_secs();
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;
    if days > 0 {
        format!("{} day(s)", days)
    } else if hours > 0 {
        format!("{} hour(s)", hours)
    } else if minutes > 0 {
        format!("{} minute(s)", minutes)
    } else {
        format!("{} second(s)", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(kind: AlertKind, offline_secs: i64) -> AlertDecision {
        let now = Utc::now();
        AlertDecision {
            kind,
            device: "Router1".into(),
            first_offline_time: now - chrono::TimeDelta::seconds(offline_secs),
            decided_at: now,
        }
    }

    #[test]
    fn duration_uses_largest_unit() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42 second(s)");
        assert_eq!(format_duration(Duration::from_secs(150)), "2 minute(s)");
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 5)), "3 hour(s)");
        assert_eq!(format_duration(Duration::from_secs(49 * 3600)), "2 day(s)");
    }

    #[test]
    fn outage_text_names_device() {
        let device = DeviceConfig::always_on("Router1", "10.0.0.1");
        let text = format_alert(&decision(AlertKind::Outage, 20), &device);
        assert!(text.contains("DEVICE OFFLINE"));
        assert!(text.contains("Router1"));
        assert!(text.contains("10.0.0.1"));
        assert!(text.contains("No description"));
    }

    #[test]
    fn recovery_text_carries_duration() {
        let device = DeviceConfig::always_on("Router1", "10.0.0.1");
        let text = format_alert(&decision(AlertKind::Recovery, 125), &device);
        assert!(text.contains("DEVICE ONLINE"));
        assert!(text.contains("Offline for: 2 minute(s)"));
    }

    #[tokio::test]
    async fn log_channel_is_always_ready() {
        let channel = LogAlertChannel;
        assert!(channel.is_ready());
        assert!(channel.send("hello").await.is_ok());
    }
}
