/**
 * MONITOR - Orchestrateur du moteur de surveillance
 *
 * RÔLE :
 * Possède l'état partagé (registre, store, gate, publisher) et branche les
 * composants entre eux : le scheduler produit des observations, le monitor les
 * applique au store, diffuse les changements, consulte le gate et envoie les
 * alertes, puis journalise les transitions.
 *
 * ORDRE DES VERROUS :
 * store -> registry -> gate -> publisher. Aucun verrou n'est tenu pendant un
 * `.await`. L'écriture dans le store et la diffusion qui en découle se font
 * sous le verrou du store : les abonnés voient les transitions dans l'ordre.
 *
 * GÉNÉRATIONS :
 * Le registre est lu avec la génération du scheduler sous le verrou du store ;
 * un rechargement change de génération sous ce même verrou. Un résultat dont
 * la génération est dépassée est ignoré.
 *
 * TÂCHES DE FOND :
 * - cycle de ping (défaut 5s)
 * - poll du fichier registre (défaut 10s), cycle immédiat après rechargement
 */

use crate::alerts::{format_alert, startup_message, SharedAlertChannel};
use crate::config::KernelConfig;
use crate::gate::{AlertDecision, AlertKind, IncidentPhase, NotificationGate, NotificationState};
use crate::health::{HealthInputs, HealthTracker, KernelHealth};
use crate::history::HistoryLog;
use crate::models::{DeviceConfig, DeviceState, DeviceStatus, HistoryEvent, Observation};
use crate::probe::Prober;
use crate::publisher::{
    parse_client_message, ClientCommand, ClientMessageError, Publisher, ServerMessage, SubscriberId,
    SubscriberReceiver,
};
use crate::registry::DeviceRegistry;
use crate::retry::RetryPolicy;
use crate::scheduler::{CycleReport, ObservationSink, ProbeScheduler};
use crate::state::{new_state, Shared, SharedClock};
use crate::store::DeviceStateStore;
use crate::watcher::{ConfigWatcher, WatchOutcome};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Collaborateurs injectés (réels en prod, doubles en test)
pub struct MonitorDeps {
    pub prober: Arc<dyn Prober>,
    pub alerts: SharedAlertChannel,
    pub clock: SharedClock,
    pub health: HealthTracker,
}

pub struct Monitor {
    registry: Shared<DeviceRegistry>,
    store: Shared<DeviceStateStore>,
    gate: Shared<NotificationGate>,
    publisher: Publisher,
    scheduler: ProbeScheduler,
    alerts: SharedAlertChannel,
    history: HistoryLog,
    health: HealthTracker,
    clock: SharedClock,
    watcher: tokio::sync::Mutex<ConfigWatcher>,
    startup_message: bool,
    startup_announced: AtomicBool,
}

impl Monitor {
    pub fn new(
        config: &KernelConfig,
        watcher: ConfigWatcher,
        registry: DeviceRegistry,
        deps: MonitorDeps,
    ) -> Arc<Self> {
        let retry = RetryPolicy::new(deps.prober, config.retry_settings(), deps.clock.clone());
        let scheduler = ProbeScheduler::new(retry, config.concurrency, deps.clock.clone());
        let gate = NotificationGate::new(config.gate_policy(), deps.clock.now());

        Arc::new(Self {
            registry: new_state(registry),
            store: new_state(DeviceStateStore::new()),
            gate: new_state(gate),
            publisher: Publisher::new(),
            scheduler,
            alerts: deps.alerts,
            history: HistoryLog::new(
                config.history.dir.clone(),
                config.history.max_bytes,
                config.history.max_backups,
            ),
            health: deps.health,
            clock: deps.clock,
            watcher: tokio::sync::Mutex::new(watcher),
            startup_message: config.notifications.startup_message,
            startup_announced: AtomicBool::new(false),
        })
    }

    // ----- abonnés -----

    /// Enregistre un abonné et lui envoie le snapshot complet, sous le verrou du store
    pub fn connect_subscriber(&self) -> (SubscriberId, SubscriberReceiver) {
        let store = self.store.lock();
        let (id, rx) = self.publisher.subscribe();
        self.publisher.send_to(&id, &self.snapshot_of(&store));
        (id, rx)
    }

    pub fn disconnect_subscriber(&self, id: &str) {
        self.publisher.unsubscribe(id);
    }

    /// Traite un message texte reçu d'un abonné
    pub fn handle_client_text(self: &Arc<Self>, subscriber: &str, text: &str) {
        match parse_client_message(text) {
            Ok(ClientCommand::ManualCheck) => {
                tracing::info!("[monitor] manual check requested by {}", subscriber);
                let monitor = self.clone();
                tokio::spawn(async move {
                    monitor.run_cycle().await;
                });
            }
            Ok(ClientCommand::CheckDevice(name)) => {
                if self.trigger_check(&name) {
                    tracing::info!("[monitor] check of {} requested by {}", name, subscriber);
                } else {
                    self.publisher
                        .send_to(subscriber, &ServerMessage::error(format!("unknown device: {}", name)));
                }
            }
            Ok(ClientCommand::GetConfig) => {
                let config = self.registry.lock().raw().clone();
                self.publisher.send_to(
                    subscriber,
                    &ServerMessage::ConfigData {
                        config,
                        timestamp: self.clock.now(),
                    },
                );
            }
            Ok(ClientCommand::Unknown(kind)) => {
                tracing::info!("[monitor] ignoring message of unknown type {:?}", kind);
            }
            Err(ClientMessageError::Rejected(reason)) => {
                tracing::info!("[monitor] rejected command from {}: {}", subscriber, reason);
                self.publisher.send_to(subscriber, &ServerMessage::error(reason));
            }
            Err(e) => {
                tracing::warn!("[monitor] bad message from {}: {}", subscriber, e);
                self.publisher
                    .send_to(subscriber, &ServerMessage::error(format!("could not process request: {}", e)));
            }
        }
    }

    // ----- cycles -----

    pub async fn run_cycle(self: &Arc<Self>) -> CycleReport {
        self.announce_startup().await;
        let (devices, generation) = {
            let _store = self.store.lock();
            (self.registry.lock().devices().to_vec(), self.scheduler.generation())
        };
        self.scheduler.run_cycle(devices, generation, self.clone()).await
    }

    /// Vérification prioritaire d'un équipement, attendue jusqu'au bout
    pub async fn check_now(self: &Arc<Self>, name: &str) -> bool {
        let (device, generation) = {
            let _store = self.store.lock();
            (self.registry.lock().get(name).cloned(), self.scheduler.generation())
        };
        let Some(device) = device else {
            return false;
        };
        self.scheduler.check_device(&device, true, generation, self.clone()).await;
        true
    }

    /// Comme `check_now`, en tâche de fond ; false si l'équipement est inconnu
    pub fn trigger_check(self: &Arc<Self>, name: &str) -> bool {
        if !self.registry.lock().contains(name) {
            return false;
        }
        let monitor = self.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            monitor.check_now(&name).await;
        });
        true
    }

    /// Poll du fichier registre ; après un rechargement, un cycle complet est
    /// lancé sans attendre le prochain tick. true si un rechargement a eu lieu
    pub async fn poll_config(self: &Arc<Self>) -> bool {
        if !self.reload_if_changed().await {
            return false;
        }
        self.run_cycle().await;
        true
    }

    pub async fn reload_if_changed(&self) -> bool {
        let outcome = self.watcher.lock().await.poll().await;
        match outcome {
            WatchOutcome::Unchanged => false,
            WatchOutcome::Missing => {
                tracing::warn!("[monitor] registry file missing, keeping current devices");
                false
            }
            WatchOutcome::Changed(registry) => {
                self.apply_registry(registry);
                true
            }
        }
    }

    /// Remplace le registre : store et suivi en vol remis à zéro, épisodes
    /// conservés pour les noms encore présents
    pub fn apply_registry(&self, registry: DeviceRegistry) {
        let count = registry.len();
        let mut store = self.store.lock();
        {
            let mut current = self.registry.lock();
            *current = registry;
            self.gate.lock().retain_devices(|name| current.contains(name));
        }
        store.clear();
        self.scheduler.clear_in_flight();

        self.publisher.broadcast(&ServerMessage::ConfigUpdated {
            message: format!("Device configuration reloaded ({} devices)", count),
        });
        self.publisher.broadcast(&self.snapshot_of(&store));
        tracing::info!("[monitor] registry reloaded: {} devices", count);
    }

    pub fn spawn_background_tasks(
        self: &Arc<Self>,
        probe_interval: Duration,
        poll_interval: Duration,
    ) -> Vec<JoinHandle<()>> {
        let probe_loop = {
            let monitor = self.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(probe_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    monitor.run_cycle().await;
                }
            })
        };
        let poll_loop = {
            let monitor = self.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(poll_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    monitor.poll_config().await;
                }
            })
        };
        vec![probe_loop, poll_loop]
    }

    async fn announce_startup(&self) {
        if !self.startup_message || self.startup_announced.load(Ordering::Relaxed) || !self.alerts.is_ready() {
            return;
        }
        if self.startup_announced.swap(true, Ordering::Relaxed) {
            return;
        }
        let text = startup_message(self.clock.now(), self.registry.lock().len());
        match self.alerts.send(&text).await {
            Ok(()) => tracing::info!("[monitor] startup announcement sent via {}", self.alerts.name()),
            Err(e) => tracing::warn!("[monitor] startup announcement failed: {}", e),
        }
    }

    async fn deliver(&self, decision: AlertDecision, device: &DeviceConfig) {
        let text = format_alert(&decision, device);
        match self.alerts.send(&text).await {
            Ok(()) => tracing::info!("[monitor] {:?} alert sent for {}", decision.kind, device.name),
            Err(e) => {
                tracing::error!("[monitor] {:?} alert for {} not delivered: {}", decision.kind, device.name, e);
                if decision.kind == AlertKind::Outage {
                    self.gate.lock().record_delivery_failure(&device.name);
                }
            }
        }
    }

    // ----- lectures -----

    pub fn snapshot(&self) -> ServerMessage {
        self.snapshot_of(&self.store.lock())
    }

    fn snapshot_of(&self, store: &DeviceStateStore) -> ServerMessage {
        ServerMessage::StatusUpdate {
            groups: store.groups(),
            stats: store.stats(),
            timestamp: self.clock.now(),
        }
    }

    pub fn device(&self, name: &str) -> Option<DeviceState> {
        self.store.lock().find(name).cloned()
    }

    pub fn devices(&self) -> Vec<DeviceState> {
        self.store.lock().get_all()
    }

    pub fn registry(&self) -> DeviceRegistry {
        self.registry.lock().clone()
    }

    pub fn gate_phase(&self, name: &str) -> IncidentPhase {
        self.gate.lock().phase(name)
    }

    pub fn episode(&self, name: &str) -> Option<NotificationState> {
        self.gate.lock().episode(name).cloned()
    }

    pub fn scheduler(&self) -> &ProbeScheduler {
        &self.scheduler
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn subscriber_count(&self) -> usize {
        self.publisher.count()
    }

    pub fn health(&self) -> KernelHealth {
        self.health.snapshot(HealthInputs {
            devices_tracked: self.registry.lock().len(),
            subscribers_connected: self.publisher.count(),
            alert_channel: self.alerts.name().to_string(),
            alert_channel_ready: self.alerts.is_ready(),
        })
    }
}

#[async_trait]
impl ObservationSink for Monitor {
    async fn record(&self, device: &DeviceConfig, observation: Observation, generation: u64) {
        if let Observation::Probed(verdict) = &observation {
            if verdict.execution_failed && !verdict.success {
                tracing::warn!("[monitor] {} marked offline after probe execution failures", device.name);
            }
        }

        // même verrou qu'`apply_registry` : un résultat d'avant rechargement n'atteint ni store ni gate
        let (outcome, decision) = {
            let mut store = self.store.lock();
            if !self.scheduler.is_current(generation) {
                tracing::debug!("[monitor] dropping result for {}, registry reloaded since check start", device.name);
                return;
            }
            let outcome = store.apply(device, &observation);
            if outcome.changed() {
                self.publisher.broadcast(&ServerMessage::DeviceUpdate {
                    device: outcome.current.clone(),
                });
            }
            if outcome.status_changed {
                if let Some(previous) = &outcome.previous {
                    tracing::info!(
                        "[monitor] {} changed {} -> {}",
                        device.name, previous.status, outcome.current.status
                    );
                    self.publisher.broadcast(&ServerMessage::StateChange {
                        device: outcome.current.clone(),
                        previous: previous.status,
                        current: outcome.current.status,
                        timestamp: outcome.current.last_updated,
                    });
                }
                self.publisher.broadcast(&ServerMessage::StatsUpdate {
                    stats: store.stats(),
                    timestamp: self.clock.now(),
                });
            }

            let now = self.clock.now();
            let ready = self.alerts.is_ready();
            let decision = match outcome.current.status {
                DeviceStatus::Offline => self.gate.lock().on_offline(&device.name, now, ready),
                DeviceStatus::Online => self.gate.lock().on_online(&device.name, now, ready),
                DeviceStatus::OutOfSchedule => None,
            };
            (outcome, decision)
        };

        if let Some(decision) = decision {
            self.deliver(decision, device).await;
        }

        if outcome.status_changed {
            let event = HistoryEvent {
                timestamp: outcome.current.last_updated,
                device: device.name.clone(),
                status: outcome.current.status,
            };
            if let Err(e) = self.history.append(&event).await {
                tracing::error!("[monitor] failed to record history for {}: {}", device.name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::LogAlertChannel;
    use crate::probe::{ProbeError, ProbeOutcome};
    use crate::state::SystemClock;

    struct AlwaysUp;

    #[async_trait]
    impl Prober for AlwaysUp {
        async fn probe(&self, _address: &str, _timeout: Duration) -> Result<ProbeOutcome, ProbeError> {
            Ok(ProbeOutcome {
                success: true,
                latency_ms: Some(4),
                packet_loss: 0,
                sent: 3,
                received: 3,
            })
        }
    }

    fn monitor(dir: &std::path::Path) -> Arc<Monitor> {
        let mut config = KernelConfig::default();
        config.history.dir = dir.join("logs");
        config.notifications.startup_message = false;
        let registry = DeviceRegistry::from_devices(vec![DeviceConfig::always_on("r1", "10.0.0.1")]);
        Monitor::new(
            &config,
            ConfigWatcher::new(dir.join("devices.json")),
            registry,
            MonitorDeps {
                prober: Arc::new(AlwaysUp),
                alerts: Arc::new(LogAlertChannel),
                clock: Arc::new(SystemClock),
                health: HealthTracker::new(),
            },
        )
    }

    #[tokio::test]
    async fn update_interval_is_answered_with_error_to_sender_only() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor(dir.path());
        let (a, mut rx_a) = monitor.connect_subscriber();
        let (_b, mut rx_b) = monitor.connect_subscriber();
        rx_a.recv().await.unwrap();
        rx_b.recv().await.unwrap();

        monitor.handle_client_text(&a, r#"{"type":"update_interval","interval":1}"#);

        assert!(rx_a.recv().await.unwrap().contains(r#""type":"error""#));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_device_check_replies_error() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor(dir.path());
        let (a, mut rx) = monitor.connect_subscriber();
        rx.recv().await.unwrap();

        monitor.handle_client_text(&a, r#"{"type":"check_device","device":"ghost"}"#);
        assert!(rx.recv().await.unwrap().contains("unknown device: ghost"));
    }

    #[tokio::test]
    async fn status_change_is_broadcast_and_logged() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor(dir.path());
        let (_id, mut rx) = monitor.connect_subscriber();
        rx.recv().await.unwrap();

        assert!(monitor.check_now("r1").await);

        let device_update = rx.recv().await.unwrap();
        assert!(device_update.contains(r#""type":"device_update""#));
        // premier passage : pas de state_change, directement les stats
        let stats = rx.recv().await.unwrap();
        assert!(stats.contains(r#""type":"stats_update""#));
        assert_eq!(monitor.device("r1").unwrap().status, DeviceStatus::Online);

        let history = monitor.history().recent(Some("r1"), 5).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, DeviceStatus::Online);
    }
}
