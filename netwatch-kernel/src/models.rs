use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_CATEGORY: &str = "Other";
pub const DEFAULT_ICON: &str = "device";

/// Plage horaire [start, end) en heures locales 0..=23
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourRange {
    pub start: u8,
    pub end: u8,
}

impl HourRange {
    pub const WEEKDAY_DEFAULT: HourRange = HourRange { start: 7, end: 18 };
    pub const WEEKEND_DEFAULT: HourRange = HourRange { start: 9, end: 16 };

    pub fn contains(&self, hour: u32) -> bool {
        hour >= self.start as u32 && hour < self.end as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    AlwaysOn,
    /// Une règle absente = pas de surveillance ce type de jour
    WorkingHours {
        weekday: Option<HourRange>,
        weekend: Option<HourRange>,
    },
}

/// Configuration immuable d'un équipement, telle que chargée depuis le registre
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    pub name: String,
    pub address: String,
    pub category: String,
    pub description: String,
    pub icon: String,
    pub schedule: Schedule,
}

impl DeviceConfig {
    pub fn always_on(name: &str, address: &str) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            description: String::new(),
            icon: DEFAULT_ICON.to_string(),
            schedule: Schedule::AlwaysOn,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceStatus {
    Online,
    Offline,
    OutOfSchedule,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceStatus::Online => "Online",
            DeviceStatus::Offline => "Offline",
            DeviceStatus::OutOfSchedule => "OutOfSchedule",
        };
        f.write_str(s)
    }
}

/// Verdict d'un passage de monitoring pour un équipement (consommé une fois)
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeVerdict {
    pub success: bool,
    pub latency_ms: Option<u32>,
    pub packet_loss: u8,
    pub attempts: u32,
    /// Au moins une tentative a échoué côté exécution (binaire absent, permission...)
    pub execution_failed: bool,
    pub timestamp: DateTime<Utc>,
}

/// Ce que le scheduler rapporte au store pour un équipement
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    OutOfSchedule { at: DateTime<Utc> },
    Probed(ProbeVerdict),
}

impl Observation {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Observation::OutOfSchedule { at } => *at,
            Observation::Probed(v) => v.timestamp,
        }
    }
}

/// État courant d'un équipement, tel qu'exposé aux dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    pub name: String,
    pub address: String,
    pub category: String,
    pub description: String,
    pub icon: String,
    pub status: DeviceStatus,
    pub latency_ms: Option<u32>,
    pub packet_loss: Option<u8>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub out_of_schedule: usize,
}

impl Stats {
    pub fn from_states<'a>(states: impl IntoIterator<Item = &'a DeviceState>) -> Self {
        let mut stats = Stats::default();
        for s in states {
            stats.total += 1;
            match s.status {
                DeviceStatus::Online => stats.online += 1,
                DeviceStatus::Offline => stats.offline += 1,
                DeviceStatus::OutOfSchedule => stats.out_of_schedule += 1,
            }
        }
        stats
    }
}

/// Une ligne du journal d'historique (une par transition de statut)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub timestamp: DateTime<Utc>,
    pub device: String,
    pub status: DeviceStatus,
}
