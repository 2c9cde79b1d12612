/**
 * NOTIFICATION GATE - Déduplication des alertes panne / rétablissement
 *
 * RÔLE :
 * Décide, équipement par équipement, si une alerte doit partir. Évite les
 * tempêtes d'alertes : une seule alerte de panne par épisode, une seule
 * alerte de rétablissement, rien du tout pour un équipement qui "clignote".
 *
 * ÉTATS (par équipement) :
 * - NoIncident       : aucun état stocké
 * - SuspectedOffline : offline détecté, seuil pas encore atteint ou alerte bloquée
 * - ConfirmedOffline : alerte de panne tentée (`notification_sent = true`)
 *
 * CONDITIONS D'ALERTE DE PANNE :
 * - offline depuis au moins `offline_threshold`
 * - kernel démarré depuis au moins `initial_scan_delay`
 * - canal d'alerte prêt
 * - aucune alerte déjà tentée pour cet épisode
 *
 * Le gate ne fait aucun I/O : il rend des décisions, l'orchestrateur envoie.
 */

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct GatePolicy {
    pub offline_threshold: Duration,
    pub initial_scan_delay: Duration,
    /// false : un envoi raté compte comme tenté pour l'épisode
    pub retry_failed_alerts: bool,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            offline_threshold: Duration::from_secs(15),
            initial_scan_delay: Duration::from_secs(60),
            retry_failed_alerts: false,
        }
    }
}

/// État de notification d'un épisode de panne en cours
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationState {
    pub notification_sent: bool,
    pub first_offline_time: DateTime<Utc>,
    pub last_offline_check: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IncidentPhase {
    NoIncident,
    SuspectedOffline,
    ConfirmedOffline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Outage,
    Recovery,
}

/// Décision d'alerte rendue par le gate
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDecision {
    pub kind: AlertKind,
    pub device: String,
    pub first_offline_time: DateTime<Utc>,
    pub decided_at: DateTime<Utc>,
}

impl AlertDecision {
    pub fn outage_duration(&self) -> Duration {
        (self.decided_at - self.first_offline_time).to_std().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct NotificationGate {
    policy: GatePolicy,
    started_at: DateTime<Utc>,
    episodes: HashMap<String, NotificationState>,
}

impl NotificationGate {
    pub fn new(policy: GatePolicy, started_at: DateTime<Utc>) -> Self {
        Self {
            policy,
            started_at,
            episodes: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    pub fn in_quiet_period(&self, now: DateTime<Utc>) -> bool {
        elapsed(self.started_at, now) < self.policy.initial_scan_delay
    }

    /// Verdict Offline pour `device`
    pub fn on_offline(&mut self, device: &str, now: DateTime<Utc>, channel_ready: bool) -> Option<AlertDecision> {
        let quiet = self.in_quiet_period(now);
        let threshold = self.policy.offline_threshold;

        let episode = self.episodes.entry(device.to_string()).or_insert_with(|| {
            tracing::info!("[gate] {} went offline, episode opened", device);
            NotificationState {
                notification_sent: false,
                first_offline_time: now,
                last_offline_check: now,
            }
        });
        episode.last_offline_check = now;

        let offline_for = elapsed(episode.first_offline_time, now);
        if offline_for < threshold {
            tracing::debug!("[gate] {} offline for {:?}, below threshold {:?}", device, offline_for, threshold);
            return None;
        }
        if episode.notification_sent {
            return None;
        }
        if quiet {
            tracing::debug!("[gate] {} alert held: initial scan period", device);
            return None;
        }
        if !channel_ready {
            tracing::info!("[gate] {} alert held: alert channel not ready", device);
            return None;
        }

        // marqué avant l'envoi : un échec ne relance pas d'alerte sur cet épisode
        episode.notification_sent = true;
        Some(AlertDecision {
            kind: AlertKind::Outage,
            device: device.to_string(),
            first_offline_time: episode.first_offline_time,
            decided_at: now,
        })
    }

    /// Verdict Online pour `device` : ferme l'épisode éventuel
    pub fn on_online(&mut self, device: &str, now: DateTime<Utc>, channel_ready: bool) -> Option<AlertDecision> {
        let episode = self.episodes.remove(device)?;
        if !episode.notification_sent {
            tracing::info!("[gate] {} back online before any alert, episode dropped", device);
            return None;
        }
        if !channel_ready {
            tracing::warn!("[gate] {} recovered but alert channel not ready, recovery alert skipped", device);
            return None;
        }
        Some(AlertDecision {
            kind: AlertKind::Recovery,
            device: device.to_string(),
            first_offline_time: episode.first_offline_time,
            decided_at: now,
        })
    }

    /// Appelé après un échec d'envoi d'alerte de panne
    pub fn record_delivery_failure(&mut self, device: &str) {
        if !self.policy.retry_failed_alerts {
            return;
        }
        if let Some(episode) = self.episodes.get_mut(device) {
            episode.notification_sent = false;
            tracing::info!("[gate] {} re-armed after failed delivery", device);
        }
    }

    pub fn phase(&self, device: &str) -> IncidentPhase {
        match self.episodes.get(device) {
            None => IncidentPhase::NoIncident,
            Some(e) if e.notification_sent => IncidentPhase::ConfirmedOffline,
            Some(_) => IncidentPhase::SuspectedOffline,
        }
    }

    pub fn episode(&self, device: &str) -> Option<&NotificationState> {
        self.episodes.get(device)
    }

    /// Conserve uniquement les épisodes des équipements encore présents
    pub fn retain_devices<F: Fn(&str) -> bool>(&mut self, keep: F) {
        self.episodes.retain(|name, _| {
            let kept = keep(name);
            if !kept {
                tracing::info!("[gate] dropping notification state for removed device {}", name);
            }
            kept
        });
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }
}

fn elapsed(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    (to - from).to_std().unwrap_or_default()
}
