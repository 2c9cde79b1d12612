//! Store autoritaire de l'état courant des équipements.
//!
//! Les états sont rangés par catégorie (ordre d'insertion des catégories, puis
//! des équipements dans chaque catégorie). Le tri de présentation est l'affaire
//! du dashboard.

use crate::models::{DeviceConfig, DeviceState, DeviceStatus, Observation, Stats};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

#[derive(Debug, Clone)]
struct CategoryBucket {
    category: String,
    devices: Vec<DeviceState>,
}

/// Résultat de `apply` : ce qui a changé et l'état précédent
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    pub status_changed: bool,
    pub latency_changed: bool,
    pub previous: Option<DeviceState>,
    pub current: DeviceState,
}

impl ApplyOutcome {
    pub fn changed(&self) -> bool {
        self.status_changed || self.latency_changed
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeviceStateStore {
    buckets: Vec<CategoryBucket>,
}

impl DeviceStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applique l'observation d'un équipement et remplace son état dans sa catégorie
    pub fn apply(&mut self, device: &DeviceConfig, observation: &Observation) -> ApplyOutcome {
        let (status, latency_ms, packet_loss) = match observation {
            Observation::OutOfSchedule { .. } => (DeviceStatus::OutOfSchedule, None, None),
            Observation::Probed(v) if v.success => (DeviceStatus::Online, v.latency_ms, Some(v.packet_loss)),
            Observation::Probed(v) => (DeviceStatus::Offline, None, Some(v.packet_loss)),
        };
        let current = DeviceState {
            name: device.name.clone(),
            address: device.address.clone(),
            category: device.category.clone(),
            description: device.description.clone(),
            icon: device.icon.clone(),
            status,
            latency_ms,
            packet_loss,
            last_updated: observation.timestamp(),
        };

        let bucket = self.bucket_mut(&device.category);
        let previous = match bucket.devices.iter_mut().find(|d| d.name == device.name) {
            Some(slot) => Some(std::mem::replace(slot, current.clone())),
            None => {
                bucket.devices.push(current.clone());
                None
            }
        };

        let (status_changed, latency_changed) = match &previous {
            Some(prev) => (prev.status != current.status, prev.latency_ms != current.latency_ms),
            None => (true, true),
        };

        ApplyOutcome {
            status_changed,
            latency_changed,
            previous,
            current,
        }
    }

    fn bucket_mut(&mut self, category: &str) -> &mut CategoryBucket {
        let idx = match self.buckets.iter().position(|b| b.category == category) {
            Some(idx) => idx,
            None => {
                self.buckets.push(CategoryBucket {
                    category: category.to_string(),
                    devices: Vec::new(),
                });
                self.buckets.len() - 1
            }
        };
        &mut self.buckets[idx]
    }

    /// Recherche dans le bucket de la catégorie, pas d'index global
    pub fn get(&self, category: &str, name: &str) -> Option<&DeviceState> {
        self.buckets
            .iter()
            .find(|b| b.category == category)
            .and_then(|b| b.devices.iter().find(|d| d.name == name))
    }

    pub fn find(&self, name: &str) -> Option<&DeviceState> {
        self.iter().find(|d| d.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceState> {
        self.buckets.iter().flat_map(|b| b.devices.iter())
    }

    pub fn get_all(&self) -> Vec<DeviceState> {
        self.iter().cloned().collect()
    }

    pub fn stats(&self) -> Stats {
        Stats::from_states(self.iter())
    }

    pub fn groups(&self) -> Groups {
        Groups(
            self.buckets
                .iter()
                .map(|b| (b.category.clone(), b.devices.clone()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.devices.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

/// Vue `catégorie -> [DeviceState]` sérialisée en objet JSON ordonné
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Groups(pub Vec<(String, Vec<DeviceState>)>);

impl Serialize for Groups {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (category, devices) in &self.0 {
            map.serialize_entry(category, devices)?;
        }
        map.end()
    }
}
