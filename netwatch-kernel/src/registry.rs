/**
 * DEVICE REGISTRY - Catalogue des équipements surveillés
 *
 * RÔLE :
 * Charge le fichier JSON `nom -> {ip, category, description, icon, 24h, workingHours}`
 * et le convertit en `DeviceConfig` immuables, dans l'ordre du fichier.
 *
 * FONCTIONNEMENT :
 * - Entrée invalide (adresse vide, heure hors 0..=23) => ignorée avec warning
 * - Fichier absent / JSON invalide => registre vide, le kernel continue
 * - Les entrées brutes sont conservées pour la réponse `get_config`
 */

use crate::models::{DeviceConfig, HourRange, Schedule, DEFAULT_CATEGORY, DEFAULT_ICON};
use crate::probe::validate_address;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid device {name}: {reason}")]
    InvalidDevice { name: String, reason: String },
}

/// Plage horaire telle qu'écrite dans le fichier (bornes optionnelles)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawHourRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawWorkingHours {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekday: Option<RawHourRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekend: Option<RawHourRange>,
}

/// Entrée brute du registre, format fichier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    #[serde(alias = "address")]
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(rename = "24h", default)]
    pub always_on: bool,
    #[serde(rename = "workingHours", default, skip_serializing_if = "Option::is_none")]
    pub working_hours: Option<RawWorkingHours>,
}

impl DeviceEntry {
    pub fn to_config(&self, name: &str) -> Result<DeviceConfig, RegistryError> {
        let invalid = |reason: String| RegistryError::InvalidDevice {
            name: name.to_string(),
            reason,
        };
        validate_address(&self.ip).map_err(|e| invalid(e.to_string()))?;

        let schedule = match (&self.working_hours, self.always_on) {
            (_, true) | (None, false) => Schedule::AlwaysOn,
            (Some(hours), false) => Schedule::WorkingHours {
                weekday: resolve_range(hours.weekday.as_ref(), HourRange::WEEKDAY_DEFAULT)
                    .map_err(invalid)?,
                weekend: resolve_range(hours.weekend.as_ref(), HourRange::WEEKEND_DEFAULT)
                    .map_err(invalid)?,
            },
        };

        Ok(DeviceConfig {
            name: name.to_string(),
            address: self.ip.trim().to_string(),
            category: non_empty(&self.category).unwrap_or(DEFAULT_CATEGORY).to_string(),
            description: self.description.clone().unwrap_or_default(),
            icon: non_empty(&self.icon).unwrap_or(DEFAULT_ICON).to_string(),
            schedule,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn resolve_range(raw: Option<&RawHourRange>, default: HourRange) -> Result<Option<HourRange>, String> {
    let Some(raw) = raw else { return Ok(None) };
    let range = HourRange {
        start: raw.start.unwrap_or(default.start),
        end: raw.end.unwrap_or(default.end),
    };
    if range.start > 23 || range.end > 23 {
        return Err(format!("working hours out of range: {}-{}", range.start, range.end));
    }
    Ok(Some(range))
}

/// Contenu du fichier registre, ordre des clés conservé
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryFile(pub Vec<(String, DeviceEntry)>);

impl<'de> Deserialize<'de> for RegistryFile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = RegistryFile;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of device name to device entry")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((name, entry)) = map.next_entry::<String, DeviceEntry>()? {
                    entries.push((name, entry));
                }
                Ok(RegistryFile(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

impl Serialize for RegistryFile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, entry) in &self.0 {
            map.serialize_entry(name, entry)?;
        }
        map.end()
    }
}

/// Snapshot du registre : configs validées + fichier brut
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<DeviceConfig>,
    raw: RegistryFile,
}

impl DeviceRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self, RegistryError> {
        if text.trim().is_empty() {
            return Ok(Self::empty());
        }
        let raw: RegistryFile = serde_json::from_str(text)?;
        Ok(Self::from_file(raw))
    }

    pub fn from_file(raw: RegistryFile) -> Self {
        let mut devices: Vec<DeviceConfig> = Vec::with_capacity(raw.0.len());
        let mut kept = Vec::with_capacity(raw.0.len());
        for (name, entry) in &raw.0 {
            if devices.iter().any(|d| &d.name == name) {
                tracing::warn!("[registry] duplicate device {} ignored", name);
                continue;
            }
            match entry.to_config(name) {
                Ok(config) => {
                    devices.push(config);
                    kept.push((name.clone(), entry.clone()));
                }
                Err(e) => tracing::warn!("[registry] skipping entry: {}", e),
            }
        }
        Self {
            devices,
            raw: RegistryFile(kept),
        }
    }

    pub fn from_devices(devices: Vec<DeviceConfig>) -> Self {
        Self {
            devices,
            raw: RegistryFile::default(),
        }
    }

    /// Lecture du fichier. Les erreurs remontent à l'appelant, qui décide du repli.
    pub async fn load(path: &Path) -> Result<Self, RegistryError> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_json(&text)
    }

    /// Comme `load`, mais replie sur un registre vide en loggant l'erreur
    pub async fn load_or_empty(path: &Path) -> Self {
        match Self::load(path).await {
            Ok(registry) => {
                tracing::info!("[registry] loaded {} devices from {:?}", registry.len(), path);
                registry
            }
            Err(RegistryError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("[registry] {:?} not found, monitoring no devices", path);
                Self::empty()
            }
            Err(e) => {
                tracing::error!("[registry] failed to load {:?}: {}", path, e);
                Self::empty()
            }
        }
    }

    pub fn devices(&self) -> &[DeviceConfig] {
        &self.devices
    }

    pub fn get(&self, name: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(|d| d.name.as_str())
    }

    pub fn raw(&self) -> &RegistryFile {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Switch-Core": {"ip": "10.0.0.2", "category": "Network", "24h": true},
        "Router1": {"ip": "10.0.0.1"},
        "Printer": {
            "address": "10.0.0.50",
            "description": "2nd floor",
            "icon": "printer",
            "workingHours": {"weekday": {"start": 8}, "weekend": {"start": 10, "end": 12}}
        }
    }"#;

    #[test]
    fn keeps_file_order_and_defaults() {
        let reg = DeviceRegistry::from_json(SAMPLE).unwrap();
        let names: Vec<&str> = reg.names().collect();
        assert_eq!(names, vec!["Switch-Core", "Router1", "Printer"]);

        let router = reg.get("Router1").unwrap();
        assert_eq!(router.category, DEFAULT_CATEGORY);
        assert_eq!(router.icon, DEFAULT_ICON);
        assert_eq!(router.schedule, Schedule::AlwaysOn);
    }

    #[test]
    fn working_hours_fill_missing_bounds() {
        let reg = DeviceRegistry::from_json(SAMPLE).unwrap();
        let printer = reg.get("Printer").unwrap();
        assert_eq!(printer.address, "10.0.0.50");
        assert_eq!(
            printer.schedule,
            Schedule::WorkingHours {
                weekday: Some(HourRange { start: 8, end: 18 }),
                weekend: Some(HourRange { start: 10, end: 12 }),
            }
        );
    }

    #[test]
    fn always_on_flag_wins_over_working_hours() {
        let reg = DeviceRegistry::from_json(
            r#"{"Cam": {"ip": "10.0.0.9", "24h": true, "workingHours": {"weekday": {}}}}"#,
        )
        .unwrap();
        assert_eq!(reg.get("Cam").unwrap().schedule, Schedule::AlwaysOn);
    }

    #[test]
    fn invalid_entries_are_skipped() {
        let reg = DeviceRegistry::from_json(
            r#"{
                "Bad": {"ip": "-f"},
                "Late": {"ip": "10.0.0.3", "workingHours": {"weekday": {"start": 7, "end": 25}}},
                "Good": {"ip": "10.0.0.4"}
            }"#,
        )
        .unwrap();
        assert_eq!(reg.names().collect::<Vec<_>>(), vec!["Good"]);
        assert_eq!(reg.raw().0.len(), 1);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(DeviceRegistry::from_json("{not json"), Err(RegistryError::Json(_))));
        assert!(DeviceRegistry::from_json("   ").unwrap().is_empty());
    }

    #[test]
    fn raw_file_serializes_in_order() {
        let reg = DeviceRegistry::from_json(SAMPLE).unwrap();
        let text = serde_json::to_string(reg.raw()).unwrap();
        let switch = text.find("Switch-Core").unwrap();
        let printer = text.find("Printer").unwrap();
        assert!(switch < printer);
        assert!(text.contains(r#""24h":true"#));
    }

    #[tokio::test]
    async fn missing_file_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reg = DeviceRegistry::load_or_empty(&dir.path().join("devices.json")).await;
        assert!(reg.is_empty());
    }
}
