//! Drives the Anomaly Engine through a sequence of simulated poll ticks and
//! checks that a firing alarm actually lands on the identifier-based alarm
//! queue, end to end, with no network I/O involved.

use loopd::anomaly::{self, AlarmEvent, CounterUpdate};
use loopd::config::PollerConfig;
use loopd::model::{AlarmKind, AlarmRef, Interface};
use loopd::queues::AlarmQueue;

fn cfg() -> PollerConfig {
    PollerConfig {
        update_interval_hours: 6,
        poll_interval_secs: 10,
        recheck_interval_secs: 2,
        bcmax: 1000,
        mavlow: 10,
        mavmax: 500,
        recover_ratio_pct: 50,
    }
}

#[tokio::test]
async fn steady_traffic_then_spike_pushes_one_alarm_ref() {
    let mut intf = Interface::new(1, "eth0".into(), "uplink".into(), std::path::PathBuf::new());
    let window_size = 4;
    let queue = AlarmQueue::new();

    let counters = [1_000u64, 1_100, 1_200, 1_300, 1_400, 10_000];
    let mut prev = 0u64;
    for (tick, &counter) in counters.iter().enumerate() {
        if tick == 0 {
            prev = counter;
            anomaly::ingest_counter(&mut intf.poll, counter, 1.0);
            continue;
        }
        let outcome = anomaly::ingest_counter(&mut intf.poll, counter, 1.0);
        assert_eq!(outcome, CounterUpdate::Delta((counter - prev) as f64));
        prev = counter;

        anomaly::update_moving_average(&mut intf.poll, window_size);
        if let AlarmEvent::Fired(kind) = anomaly::evaluate_alarm(&mut intf.poll, &cfg(), window_size) {
            queue.push(AlarmRef::new("10.0.0.1", intf.index)).await;
            assert_eq!(kind, AlarmKind::Bcmax);
        }
    }

    let drained = queue.drain().await;
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0], AlarmRef::new("10.0.0.1", 1));
}

#[tokio::test]
async fn quiet_traffic_never_queues_an_alarm() {
    let mut intf = Interface::new(2, "eth1".into(), "access".into(), std::path::PathBuf::new());
    let window_size = 4;
    let queue = AlarmQueue::new();

    let mut counter = 500u64;
    anomaly::ingest_counter(&mut intf.poll, counter, 1.0);
    for _ in 0..8 {
        counter += 5;
        anomaly::ingest_counter(&mut intf.poll, counter, 1.0);
        anomaly::update_moving_average(&mut intf.poll, window_size);
        if let AlarmEvent::Fired(_) = anomaly::evaluate_alarm(&mut intf.poll, &cfg(), window_size) {
            queue.push(AlarmRef::new("10.0.0.2", intf.index)).await;
        }
    }

    assert!(queue.is_empty().await);
}
