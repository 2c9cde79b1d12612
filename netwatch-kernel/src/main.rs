/**
 * NETWATCH KERNEL - Point d'entrée du moniteur de disponibilité
 *
 * RÔLE : Bootstrap : config, registre d'équipements, canal d'alerte, moteur de
 * surveillance, tâches de fond et serveur HTTP/WebSocket.
 *
 * ARCHITECTURE : cycles de ping planifiés + état partagé + diffusion WebSocket + API REST.
 */

use anyhow::Context;
use netwatch_kernel::alerts::{LogAlertChannel, MqttAlertChannel, SharedAlertChannel};
use netwatch_kernel::config::{load_config, AlertTransport};
use netwatch_kernel::health::HealthTracker;
use netwatch_kernel::http::{build_router, AppState};
use netwatch_kernel::probe::PingExecutor;
use netwatch_kernel::state::SystemClock;
use netwatch_kernel::watcher::ConfigWatcher;
use netwatch_kernel::{Monitor, MonitorDeps};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await;

    // registre d'équipements, filigrane posé pour le poll
    let mut watcher = ConfigWatcher::new(cfg.devices_file.clone());
    let registry = watcher.load_initial().await;
    tracing::info!("[kernel] monitoring {} devices from {:?}", registry.len(), cfg.devices_file);

    let health = HealthTracker::new();

    // canal d'alerte
    let alerts: SharedAlertChannel = match cfg.alerts.transport {
        AlertTransport::Log => Arc::new(LogAlertChannel),
        AlertTransport::Mqtt => {
            tracing::info!(
                "[kernel] alerts via MQTT {}:{} on {}",
                cfg.alerts.mqtt.host, cfg.alerts.mqtt.port, cfg.alerts.mqtt.topic
            );
            Arc::new(MqttAlertChannel::connect(&cfg.alerts.mqtt, health.clone()))
        }
    };

    let prober = Arc::new(PingExecutor::new(cfg.probe.packets, cfg.probe.packet_size));

    let monitor = Monitor::new(
        &cfg,
        watcher,
        registry,
        MonitorDeps {
            prober,
            alerts,
            clock: Arc::new(SystemClock),
            health,
        },
    );

    // cycles de ping + poll du registre
    monitor.spawn_background_tasks(cfg.probe_interval(), cfg.config_poll_interval());

    // HTTP
    let app = build_router(AppState { monitor });

    let addr = cfg.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("[kernel] listening on http://{}", addr);
    axum::serve(listener, app).await.context("HTTP server error")?;
    Ok(())
}
