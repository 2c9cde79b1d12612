/**
 * PROBE SCHEDULER - Cycles de vérification des équipements
 *
 * RÔLE :
 * Parcourt le registre par lots de `concurrency` équipements. Dans un lot, chaque
 * vérification tourne dans sa propre tâche tokio ; le lot suivant attend la fin
 * complète du précédent.
 *
 * RÈGLES :
 * - Une seule vérification suivie par équipement (map équipement -> jeton)
 * - Vérification non prioritaire déjà en cours => ignorée
 * - Vérification prioritaire (manuelle) => lancée quand même, sans annuler l'autre
 * - Équipement hors plage horaire => observation OutOfSchedule, pas de ping
 * - Échec / panic d'une vérification => loggé, le cycle continue
 * - Chaque vérification porte la génération du registre qu'elle a lu ;
 *   `clear_in_flight` passe à la génération suivante, les vérifications plus
 *   anciennes ne sont plus lancées et leurs résultats sont périmés
 */

use crate::models::{DeviceConfig, Observation};
use crate::retry::RetryPolicy;
use crate::schedule::is_in_scope;
use crate::state::{new_state, Shared, SharedClock};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Destinataire des observations produites par le scheduler
#[async_trait]
pub trait ObservationSink: Send + Sync {
    /// `generation` : génération sous laquelle l'équipement a été lu
    async fn record(&self, device: &DeviceConfig, observation: Observation, generation: u64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Completed,
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub checked: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct ProbeScheduler {
    retry: RetryPolicy,
    concurrency: usize,
    clock: SharedClock,
    in_flight: Shared<HashMap<String, u64>>,
    next_token: Arc<AtomicU64>,
    generation: Arc<AtomicU64>,
}

/// Retire l'entrée en vol à la fin de la vérification, même sur panic
struct InFlightGuard {
    in_flight: Shared<HashMap<String, u64>>,
    device: String,
    token: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut map = self.in_flight.lock();
        if map.get(&self.device) == Some(&self.token) {
            map.remove(&self.device);
        }
    }
}

impl ProbeScheduler {
    pub fn new(retry: RetryPolicy, concurrency: usize, clock: SharedClock) -> Self {
        Self {
            retry,
            concurrency: concurrency.max(1),
            clock,
            in_flight: new_state(HashMap::new()),
            next_token: Arc::new(AtomicU64::new(1)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Un cycle complet sur le snapshot `devices`
    pub async fn run_cycle(
        &self,
        devices: Vec<DeviceConfig>,
        generation: u64,
        sink: Arc<dyn ObservationSink>,
    ) -> CycleReport {
        let mut report = CycleReport::default();
        tracing::debug!("[scheduler] cycle start: {} devices, batches of {}", devices.len(), self.concurrency);

        for batch in devices.chunks(self.concurrency) {
            let handles: Vec<_> = batch
                .iter()
                .cloned()
                .map(|device| {
                    let scheduler = self.clone();
                    let sink = sink.clone();
                    let name = device.name.clone();
                    let check = async move { scheduler.check_device(&device, false, generation, sink).await };
                    (name, tokio::spawn(check))
                })
                .collect();

            for (name, handle) in handles {
                match handle.await {
                    Ok(CheckOutcome::Completed) => report.checked += 1,
                    Ok(CheckOutcome::Skipped) => report.skipped += 1,
                    Err(e) => {
                        tracing::error!("[scheduler] check of {} aborted: {}", name, e);
                        report.failed += 1;
                    }
                }
            }
        }

        tracing::debug!(
            "[scheduler] cycle done: {} checked, {} skipped, {} failed",
            report.checked, report.skipped, report.failed
        );
        report
    }

    /// Vérifie un équipement ; `priority` contourne la règle "déjà en cours"
    pub async fn check_device(
        &self,
        device: &DeviceConfig,
        priority: bool,
        generation: u64,
        sink: Arc<dyn ObservationSink>,
    ) -> CheckOutcome {
        if !self.is_current(generation) {
            tracing::debug!("[scheduler] {} read before a registry reload, skipped", device.name);
            return CheckOutcome::Skipped;
        }
        let Some(_guard) = self.begin(&device.name, priority) else {
            tracing::debug!("[scheduler] {} already being checked, skipped", device.name);
            return CheckOutcome::Skipped;
        };

        let now = self.clock.now();
        let observation = if is_in_scope(&device.schedule, &now.with_timezone(&chrono::Local)) {
            Observation::Probed(self.retry.check(&device.address).await)
        } else {
            Observation::OutOfSchedule { at: now }
        };

        sink.record(device, observation, generation).await;
        CheckOutcome::Completed
    }

    fn begin(&self, device: &str, priority: bool) -> Option<InFlightGuard> {
        let mut map = self.in_flight.lock();
        if !priority && map.contains_key(device) {
            return None;
        }
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        map.insert(device.to_string(), token);
        Some(InFlightGuard {
            in_flight: self.in_flight.clone(),
            device: device.to_string(),
            token,
        })
    }

    pub fn is_in_flight(&self, device: &str) -> bool {
        self.in_flight.lock().contains_key(device)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Oublie les vérifications en cours et ouvre une nouvelle génération
    pub fn clear_in_flight(&self) {
        let mut map = self.in_flight.lock();
        map.clear();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("[scheduler] in-flight tracking cleared, generation {}", generation);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// false pour un résultat issu d'une vérification lancée avant le dernier `clear_in_flight`
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }
}
