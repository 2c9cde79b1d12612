use netwatch_devkit::{Reply, TestHarness};
use netwatch_kernel::gate::IncidentPhase;
use netwatch_kernel::models::DeviceStatus;
use std::time::Duration;

const ROUTER: &str = r#"{"Router1": {"ip": "10.0.0.1", "24h": true}}"#;
const STEP: Duration = Duration::from_secs(5);

fn offline_for_secs(text: &str) -> u64 {
    text.lines()
        .find_map(|l| l.strip_prefix("Offline for: "))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

#[tokio::test]
async fn router_outage_then_recovery_sends_exactly_two_alerts() {
    let h = TestHarness::new(ROUTER).await.unwrap();
    h.skip_initial_scan();
    h.prober.set("10.0.0.1", Reply::Down);

    // 20 secondes hors ligne, un cycle toutes les 5s
    h.cycle().await;
    h.cycles(4, STEP).await;

    let outages = h.alerts.matching("DEVICE OFFLINE");
    assert_eq!(outages.len(), 1);
    assert!(outages[0].contains("Router1"));
    assert_eq!(h.monitor.gate_phase("Router1"), IncidentPhase::ConfirmedOffline);

    h.prober.set("10.0.0.1", Reply::Up(3));
    h.cycles(1, STEP).await;

    let recoveries = h.alerts.matching("DEVICE ONLINE");
    assert_eq!(recoveries.len(), 1);
    assert!(offline_for_secs(&recoveries[0]) >= 15);
    assert_eq!(h.alerts.count(), 2);
    assert_eq!(h.monitor.gate_phase("Router1"), IncidentPhase::NoIncident);
    assert_eq!(h.monitor.device("Router1").unwrap().status, DeviceStatus::Online);
}

#[tokio::test]
async fn new_outage_after_recovery_alerts_again() {
    let h = TestHarness::new(ROUTER).await.unwrap();
    h.skip_initial_scan();

    for _ in 0..2 {
        h.prober.set("10.0.0.1", Reply::Down);
        h.cycle().await;
        h.cycles(4, STEP).await;
        h.prober.set("10.0.0.1", Reply::Up(2));
        h.cycles(1, STEP).await;
    }

    assert_eq!(h.alerts.matching("DEVICE OFFLINE").len(), 2);
    assert_eq!(h.alerts.matching("DEVICE ONLINE").len(), 2);
}

#[tokio::test]
async fn flapping_device_never_alerts() {
    let h = TestHarness::new(ROUTER).await.unwrap();
    h.skip_initial_scan();

    h.prober.set("10.0.0.1", Reply::Down);
    h.cycle().await;
    h.cycles(2, STEP).await;
    h.prober.set("10.0.0.1", Reply::Up(1));
    h.cycles(1, Duration::from_secs(2)).await;

    assert_eq!(h.alerts.attempts(), 0);
    assert_eq!(h.monitor.gate_phase("Router1"), IncidentPhase::NoIncident);
}

#[tokio::test]
async fn startup_quiet_period_holds_alerts() {
    let h = TestHarness::new(ROUTER).await.unwrap();
    h.prober.set("10.0.0.1", Reply::Down);

    h.cycle().await;
    h.cycles(11, STEP).await; // jusqu'à t = 55s
    assert_eq!(h.alerts.attempts(), 0);

    h.cycles(1, STEP).await; // t = 60s
    assert_eq!(h.alerts.matching("DEVICE OFFLINE").len(), 1);
}

#[tokio::test]
async fn unready_channel_defers_outage_alert() {
    let h = TestHarness::new(ROUTER).await.unwrap();
    h.skip_initial_scan();
    h.alerts.set_ready(false);
    h.prober.set("10.0.0.1", Reply::Down);

    h.cycle().await;
    h.cycles(4, STEP).await;
    assert_eq!(h.alerts.attempts(), 0);
    assert_eq!(h.monitor.gate_phase("Router1"), IncidentPhase::SuspectedOffline);

    h.alerts.set_ready(true);
    h.cycles(1, STEP).await;
    assert_eq!(h.alerts.matching("DEVICE OFFLINE").len(), 1);
}

#[tokio::test]
async fn failed_delivery_is_not_retried_by_default() {
    let h = TestHarness::new(ROUTER).await.unwrap();
    h.skip_initial_scan();
    h.alerts.set_failing(true);
    h.prober.set("10.0.0.1", Reply::Down);

    h.cycle().await;
    h.cycles(4, STEP).await;
    assert_eq!(h.alerts.attempts(), 1);
    assert_eq!(h.alerts.count(), 0);

    h.alerts.set_failing(false);
    h.cycles(3, STEP).await;
    assert_eq!(h.alerts.attempts(), 1);

    // l'épisode compte comme alerté : le rétablissement est annoncé
    h.prober.set("10.0.0.1", Reply::Up(1));
    h.cycles(1, STEP).await;
    assert_eq!(h.alerts.matching("DEVICE ONLINE").len(), 1);
}

#[tokio::test]
async fn failed_delivery_retried_when_enabled() {
    let h = TestHarness::with_config(ROUTER, |c| c.notifications.retry_failed_alerts = true)
        .await
        .unwrap();
    h.skip_initial_scan();
    h.alerts.set_failing(true);
    h.prober.set("10.0.0.1", Reply::Down);

    h.cycle().await;
    h.cycles(3, STEP).await; // t = 15s, premier essai raté
    assert_eq!(h.alerts.attempts(), 1);

    h.alerts.set_failing(false);
    h.cycles(1, STEP).await;
    assert_eq!(h.alerts.matching("DEVICE OFFLINE").len(), 1);
    assert_eq!(h.alerts.attempts(), 2);
}

#[tokio::test]
async fn startup_message_sent_once_when_enabled() {
    let h = TestHarness::with_config(ROUTER, |c| c.notifications.startup_message = true)
        .await
        .unwrap();
    h.cycle().await;
    h.cycle().await;
    let startup = h.alerts.matching("Monitoring active");
    assert_eq!(startup.len(), 1);
    assert!(startup[0].contains("1 device(s)"));
}
