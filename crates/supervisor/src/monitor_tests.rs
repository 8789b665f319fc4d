// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::sampler::FakeSampler;
use rosey_bus::MemoryBus;
use std::time::Duration;

const PID: u32 = 4242;

fn limits() -> ResourceLimits {
    ResourceLimits {
        max_rss_bytes: 1000,
        max_cpu_percent: 50.0,
        max_open_handles: 10,
        sample_interval: Duration::from_millis(10),
    }
}

fn config(debounce: u32) -> MonitorConfig {
    MonitorConfig {
        limits: limits(),
        breach_debounce: debounce,
        cpu_window: 5,
    }
}

fn sample(cpu: f64, rss: u64, handles: u64) -> ResourceSample {
    ResourceSample {
        cpu_percent: cpu,
        rss_bytes: rss,
        open_handles: handles,
    }
}

fn start(
    cfg: MonitorConfig,
    sampler: FakeSampler,
    bus: &MemoryBus,
) -> (ResourceMonitor, mpsc::UnboundedReceiver<Breach>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let monitor = ResourceMonitor::start(
        PluginId::new("dice"),
        PID,
        cfg,
        sampler,
        Arc::new(bus.clone()),
        tx,
    );
    (monitor, rx)
}

async fn recv_breach(rx: &mut mpsc::UnboundedReceiver<Breach>) -> Breach {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no breach within timeout")
        .expect("breach channel closed")
}

#[tokio::test]
async fn healthy_process_reports_no_breach() {
    let bus = MemoryBus::new();
    let sampler = FakeSampler::new();
    sampler.set_samples(PID, vec![sample(5.0, 100, 2)]);

    let (monitor, mut rx) = start(config(2), sampler, &bus);
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(rx.try_recv().is_err());
    assert!(monitor.last_sample().is_some());
    monitor.stop();
}

#[tokio::test]
async fn rss_breach_is_debounced_then_reported() {
    let bus = MemoryBus::new();
    let sampler = FakeSampler::new();
    sampler.set_samples(PID, vec![sample(5.0, 5000, 2)]);

    let (monitor, mut rx) = start(config(3), sampler, &bus);

    let breach = recv_breach(&mut rx).await;
    assert_eq!(breach.metric, Metric::Rss);
    assert_eq!(breach.observed, 5000.0);
    assert_eq!(breach.limit, 1000.0);

    bus.flush().await.unwrap();
    let events = bus.published_matching("rosey.plugins.dice.resource.exceeded");
    assert!(!events.is_empty());
    assert_eq!(events[0].event_type, "plugin.resource.exceeded");
    assert_eq!(events[0].data["metric"], serde_json::json!("rss_bytes"));
    monitor.stop();
}

#[tokio::test]
async fn single_spike_below_debounce_is_ignored() {
    let bus = MemoryBus::new();
    let sampler = FakeSampler::new();
    // one breaching sample, then healthy forever
    sampler.set_samples(
        PID,
        vec![sample(5.0, 5000, 2), sample(5.0, 100, 2)],
    );

    let (monitor, mut rx) = start(config(3), sampler, &bus);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(rx.try_recv().is_err(), "spike should be debounced away");
    monitor.stop();
}

#[tokio::test]
async fn cpu_breach_uses_rolling_average() {
    let bus = MemoryBus::new();
    let sampler = FakeSampler::new();
    sampler.set_samples(PID, vec![sample(100.0, 100, 2)]);

    let (monitor, mut rx) = start(config(2), sampler, &bus);

    let breach = recv_breach(&mut rx).await;
    assert_eq!(breach.metric, Metric::Cpu);
    assert!(monitor.rolling_cpu_avg() > 50.0);
    monitor.stop();
}

#[tokio::test]
async fn handles_breach_reported() {
    let bus = MemoryBus::new();
    let sampler = FakeSampler::new();
    sampler.set_samples(PID, vec![sample(5.0, 100, 64)]);

    let (monitor, mut rx) = start(config(2), sampler, &bus);
    let breach = recv_breach(&mut rx).await;
    assert_eq!(breach.metric, Metric::Handles);
    monitor.stop();
}

#[tokio::test]
async fn paused_monitor_stops_sampling() {
    let bus = MemoryBus::new();
    let sampler = FakeSampler::new();
    sampler.set_samples(PID, vec![sample(5.0, 5000, 2)]);

    let (monitor, mut rx) = start(config(2), sampler, &bus);
    monitor.pause();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err(), "paused monitor must not report");

    monitor.resume();
    let breach = recv_breach(&mut rx).await;
    assert_eq!(breach.metric, Metric::Rss);
    monitor.stop();
}
