use netwatch_devkit::{Reply, TestHarness};
use netwatch_kernel::models::DeviceStatus;
use std::time::Duration;

const TWO_DEVICES: &str = r#"{
    "r1": {"ip": "10.0.0.1", "24h": true},
    "r2": {"ip": "10.0.0.2", "24h": true}
}"#;

#[tokio::test]
async fn overlapping_cycle_skips_devices_in_flight() {
    let h = TestHarness::new(TWO_DEVICES).await.unwrap();
    h.prober.set_delay(Duration::from_millis(200));

    let monitor = h.monitor.clone();
    let first = tokio::spawn(async move { monitor.run_cycle().await });
    while h.monitor.scheduler().in_flight_count() < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let second = h.cycle().await;
    assert_eq!(second.skipped, 2);
    assert_eq!(second.checked, 0);

    // la vérification prioritaire passe malgré la vérification en cours
    assert!(h.monitor.check_now("r1").await);

    let first = first.await.unwrap();
    assert_eq!(first.checked, 2);
    assert_eq!(h.prober.calls("10.0.0.1"), 2);
    assert_eq!(h.prober.calls("10.0.0.2"), 1);
    assert_eq!(h.monitor.scheduler().in_flight_count(), 0);
}

#[tokio::test]
async fn failing_probes_use_backoff_timeouts() {
    let h = TestHarness::new(r#"{"r1": {"ip": "10.0.0.1", "24h": true}}"#).await.unwrap();
    h.prober.set("10.0.0.1", Reply::Down);
    h.cycle().await;

    let millis: Vec<u128> = h.prober.timeouts().iter().map(|d| d.as_millis()).collect();
    assert_eq!(millis, vec![1000, 1500, 2250, 3375]);
    assert_eq!(h.monitor.device("r1").unwrap().status, DeviceStatus::Offline);
    assert_eq!(h.monitor.device("r1").unwrap().packet_loss, Some(100));
}

#[tokio::test]
async fn execution_failure_reads_as_offline() {
    let h = TestHarness::new(r#"{"r1": {"ip": "10.0.0.1", "24h": true}}"#).await.unwrap();
    h.prober.set("10.0.0.1", Reply::Fail);
    let report = h.cycle().await;

    assert_eq!(report.checked, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(h.monitor.device("r1").unwrap().status, DeviceStatus::Offline);
}

#[tokio::test]
async fn device_outside_working_hours_is_not_probed() {
    let h = TestHarness::new(
        r#"{"Printer": {"ip": "10.0.0.50", "workingHours": {"weekday": {"start": 0, "end": 0}}}}"#,
    )
    .await
    .unwrap();
    h.cycle().await;

    assert_eq!(h.prober.total_calls(), 0);
    let printer = h.monitor.device("Printer").unwrap();
    assert_eq!(printer.status, DeviceStatus::OutOfSchedule);
    assert_eq!(printer.latency_ms, None);
}

#[tokio::test]
async fn manual_check_of_unknown_device_is_refused() {
    let h = TestHarness::new(TWO_DEVICES).await.unwrap();
    assert!(!h.monitor.check_now("ghost").await);
    assert!(!h.monitor.trigger_check("ghost"));
    assert_eq!(h.prober.total_calls(), 0);
}

#[tokio::test]
async fn transitions_are_written_to_history() {
    let h = TestHarness::new(r#"{"r1": {"ip": "10.0.0.1", "24h": true}}"#).await.unwrap();
    h.cycle().await;
    h.prober.set("10.0.0.1", Reply::Down);
    h.cycle().await;
    h.cycle().await;

    let events = h.monitor.history().recent(Some("r1"), 10).await.unwrap();
    let statuses: Vec<DeviceStatus> = events.iter().map(|e| e.status).collect();
    assert_eq!(statuses, vec![DeviceStatus::Offline, DeviceStatus::Online]);
}
