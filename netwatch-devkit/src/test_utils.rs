/*!
Test Harness pour le moteur netwatch

Compose un `Monitor` complet avec les doubles du devkit :
- prober scripté (pas de réseau)
- canal d'alerte enregistreur
- horloge manuelle
- registre et historique dans un répertoire temporaire
*/

use crate::alert_stub::RecordingAlertChannel;
use crate::clock::ManualClock;
use crate::prober_stub::ScriptedProber;
use anyhow::{Context, Result};
use netwatch_kernel::config::KernelConfig;
use netwatch_kernel::health::HealthTracker;
use netwatch_kernel::publisher::{SubscriberId, SubscriberReceiver};
use netwatch_kernel::scheduler::CycleReport;
use netwatch_kernel::watcher::ConfigWatcher;
use netwatch_kernel::{Monitor, MonitorDeps};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

pub struct TestHarness {
    pub monitor: Arc<Monitor>,
    pub prober: Arc<ScriptedProber>,
    pub alerts: Arc<RecordingAlertChannel>,
    pub clock: Arc<ManualClock>,
    pub config: KernelConfig,
    registry_path: PathBuf,
    registry_writes: AtomicU64,
    _dir: TempDir,
}

impl TestHarness {
    /// Harness avec la config par défaut (annonce de démarrage désactivée)
    pub async fn new(devices_json: &str) -> Result<Self> {
        Self::with_config(devices_json, |_| {}).await
    }

    pub async fn with_config(devices_json: &str, tweak: impl FnOnce(&mut KernelConfig)) -> Result<Self> {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();

        let dir = tempfile::tempdir().context("creating harness dir")?;
        let registry_path = dir.path().join("devices.json");
        std::fs::write(&registry_path, devices_json).context("writing registry")?;

        let mut config = KernelConfig::default();
        config.devices_file = registry_path.clone();
        config.history.dir = dir.path().join("logs");
        config.notifications.startup_message = false;
        tweak(&mut config);

        let prober = Arc::new(ScriptedProber::new());
        let alerts = Arc::new(RecordingAlertChannel::new());
        let clock = Arc::new(ManualClock::starting_now());

        let mut watcher = ConfigWatcher::new(registry_path.clone());
        let registry = watcher.load_initial().await;
        let monitor = Monitor::new(
            &config,
            watcher,
            registry,
            MonitorDeps {
                prober: prober.clone(),
                alerts: alerts.clone(),
                clock: clock.clone(),
                health: HealthTracker::new(),
            },
        );

        Ok(Self {
            monitor,
            prober,
            alerts,
            clock,
            config,
            registry_path,
            registry_writes: AtomicU64::new(0),
            _dir: dir,
        })
    }

    /// Avance l'horloge au-delà de la période de démarrage silencieuse
    pub fn skip_initial_scan(&self) {
        let delay = Duration::from_secs(self.config.notifications.initial_scan_delay_secs);
        self.clock.advance(delay + Duration::from_secs(1));
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub async fn cycle(&self) -> CycleReport {
        self.monitor.run_cycle().await
    }

    /// Avance de `step` puis lance un cycle, `count` fois
    pub async fn cycles(&self, count: usize, step: Duration) {
        for _ in 0..count {
            self.advance(step);
            self.cycle().await;
        }
    }

    /// Réécrit le registre avec une mtime garantie différente de la précédente
    pub fn rewrite_registry(&self, devices_json: &str) -> Result<()> {
        std::fs::write(&self.registry_path, devices_json).context("rewriting registry")?;
        let bump = self.registry_writes.fetch_add(1, Ordering::SeqCst) + 1;
        let mtime = SystemTime::now() + Duration::from_secs(bump * 10);
        let file = std::fs::File::options()
            .write(true)
            .open(&self.registry_path)
            .context("opening registry")?;
        file.set_modified(mtime).context("bumping registry mtime")?;
        Ok(())
    }

    pub fn subscribe(&self) -> Subscriber {
        let (id, rx) = self.monitor.connect_subscriber();
        Subscriber { id, rx }
    }
}

/// Abonné de test : lit les messages JSON poussés par le publisher
pub struct Subscriber {
    pub id: SubscriberId,
    rx: SubscriberReceiver,
}

impl Subscriber {
    pub async fn next(&mut self) -> Result<Value> {
        let text = tokio::time::timeout(Duration::from_secs(1), self.rx.recv())
            .await
            .context("timeout waiting for subscriber message")?
            .context("subscriber channel closed")?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Tous les messages déjà reçus, sans attendre
    pub fn drain(&mut self) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(text) = self.rx.try_recv() {
            if let Ok(value) = serde_json::from_str(&text) {
                out.push(value);
            }
        }
        out
    }

    pub fn drain_of_type(&mut self, kind: &str) -> Vec<Value> {
        self.drain()
            .into_iter()
            .filter(|m| m.get("type").and_then(Value::as_str) == Some(kind))
            .collect()
    }
}

/// Champ imbriqué par chemin pointé (`stats.online`)
pub fn field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        match current {
            Value::Object(obj) => current = obj.get(part)?,
            _ => return None,
        }
    }
    Some(current)
}
