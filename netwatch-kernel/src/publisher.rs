/**
 * PUBLISHER - Diffusion temps réel vers les dashboards abonnés
 *
 * RÔLE :
 * Tient la liste des abonnés connectés (un canal mpsc par connexion) et pousse
 * les messages sérialisés à chacun. Parse aussi les commandes entrantes.
 *
 * FONCTIONNEMENT :
 * - broadcast : sérialise une fois, envoie le même texte à tous les abonnés
 * - abonné fermé : ignoré, pas de renvoi ; le retrait est fait par le transport
 *   à la déconnexion (`unsubscribe`)
 * - send_to : réponse ciblée (snapshot initial, config_data, error)
 *
 * PROTOCOLE :
 * Sortant  : status_update, device_update, state_change, stats_update,
 *            config_updated, config_data, error
 * Entrant  : manual_check, check_device, get_config, update_interval (refusé)
 */

use crate::models::{DeviceState, DeviceStatus, Stats};
use crate::registry::RegistryFile;
use crate::store::Groups;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;

pub type SubscriberId = String;
pub type SubscriberSender = mpsc::UnboundedSender<String>;
pub type SubscriberReceiver = mpsc::UnboundedReceiver<String>;

/// Messages poussés vers les abonnés
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    StatusUpdate {
        groups: Groups,
        stats: Stats,
        timestamp: DateTime<Utc>,
    },
    DeviceUpdate {
        device: DeviceState,
    },
    StateChange {
        device: DeviceState,
        previous: DeviceStatus,
        current: DeviceStatus,
        timestamp: DateTime<Utc>,
    },
    StatsUpdate {
        stats: Stats,
        timestamp: DateTime<Utc>,
    },
    ConfigUpdated {
        message: String,
    },
    ConfigData {
        config: RegistryFile,
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error { message: message.into() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientMessageError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("message has no type")]
    MissingType,
    #[error("check_device requires a device name")]
    MissingDevice,
    #[error("{0}")]
    Rejected(String),
}

/// Commande reçue d'un abonné
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    ManualCheck,
    CheckDevice(String),
    GetConfig,
    /// Type inconnu : loggé et ignoré
    Unknown(String),
}

pub fn parse_client_message(text: &str) -> Result<ClientCommand, ClientMessageError> {
    let value: Value = serde_json::from_str(text)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ClientMessageError::MissingType)?;

    match kind {
        "manual_check" => Ok(ClientCommand::ManualCheck),
        "check_device" => value
            .get("device")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(|name| ClientCommand::CheckDevice(name.to_string()))
            .ok_or(ClientMessageError::MissingDevice),
        "get_config" => Ok(ClientCommand::GetConfig),
        "update_interval" => Err(ClientMessageError::Rejected(
            "the check interval is set by the server".into(),
        )),
        other => Ok(ClientCommand::Unknown(other.to_string())),
    }
}

#[derive(Debug, Default)]
pub struct Publisher {
    subscribers: Mutex<HashMap<SubscriberId, SubscriberSender>>,
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enregistre un abonné et rend l'extrémité réception de son canal
    pub fn subscribe(&self) -> (SubscriberId, SubscriberReceiver) {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().insert(id.clone(), tx);
        tracing::info!("[publisher] subscriber {} registered", id);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: &str) {
        if self.subscribers.lock().remove(id).is_some() {
            tracing::info!("[publisher] subscriber {} removed", id);
        }
    }

    /// Pousse le message à tous les abonnés ouverts ; rend le nombre de livraisons
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        let Some(text) = encode(message) else { return 0 };
        let subscribers = self.subscribers.lock();
        let mut delivered = 0;
        for (id, tx) in subscribers.iter() {
            if tx.is_closed() {
                continue;
            }
            match tx.send(text.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::debug!("[publisher] subscriber {} closed, skipped", id),
            }
        }
        delivered
    }

    pub fn send_to(&self, id: &str, message: &ServerMessage) -> bool {
        let Some(text) = encode(message) else { return false };
        match self.subscribers.lock().get(id) {
            Some(tx) => tx.send(text).is_ok(),
            None => false,
        }
    }

    pub fn count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

fn encode(message: &ServerMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::error!("[publisher] failed to serialize message: {}", e);
            None
        }
    }
}
