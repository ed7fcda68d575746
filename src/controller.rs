// Copyright 2026 loopd contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Main Controller (spec.md §4.F, Component F): owns the live dataset,
//! drives the poll tick, dispatches the periodic inventory reconciliation,
//! and folds the Anomaly Engine's per-sample verdicts into the alarm and
//! action queues.
//!
//! Grounded on `examples/original_source/src/loopd/main.cpp`'s `mainloop`
//! (tick scheduling, detached reconciliation thread, `prepare_data`'s
//! swap-and-sweep) and `data.cpp`'s `callback` (per-device poll result ->
//! `process_intdata`/`check_alarm` -> queue push). The original swaps a
//! freshly-reconciled `devsdata` into the live one and diffs by
//! `delete_mark`; the same swap-and-sweep happens here in
//! [`apply_reconciled`]. Unlike the original, the swap is a synchronous
//! barrier (spec.md §5): the Worker is aborted and joined, and both work
//! queues are drained, before the new map is installed, so the Worker can
//! never be mid-action against a device the swap is about to delete.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::anomaly::{self, AlarmEvent, CounterUpdate};
use crate::config::Config;
use crate::inventory;
use crate::model::{AlarmRef, DeviceMap, HostState};
use crate::queues::{ActionQueue, ActionReason, ActionTask, AlarmQueue, ReturnQueue};
use crate::rrd::TimeSeries;
use crate::snmp::oids;
use crate::snmp::poller::{MuxPoller, PollOutcome, PollTask};
use crate::snmp::wire::Value;
use crate::worker;

/// Shared handles the controller, worker, and any future component pass
/// around (spec.md §5's lock set, minus the OS-thread-specific condvars
/// now folded into [`crate::queues::Queue`]).
pub struct Shared {
    pub devices: Arc<Mutex<DeviceMap>>,
    pub config: Arc<Config>,
    pub action_queue: Arc<ActionQueue>,
    pub alarm_queue: Arc<AlarmQueue>,
    pub return_queue: Arc<ReturnQueue>,
}

impl Shared {
    pub fn new(config: Config) -> Self {
        Shared {
            devices: Arc::new(Mutex::new(DeviceMap::new())),
            config: Arc::new(config),
            action_queue: Arc::new(ActionQueue::new()),
            alarm_queue: Arc::new(AlarmQueue::new()),
            return_queue: Arc::new(ReturnQueue::new()),
        }
    }
}

/// Runs one SNMP poll tick across every `Enabled` device and folds each
/// response into the Anomaly Engine, matching `mainloop`'s
/// `poller.poll()` followed by `data.cpp`'s `callback`.
pub async fn run_tick(shared: &Shared, poller: &MuxPoller) {
    let tasks: Vec<PollTask> = {
        let guard = shared.devices.lock().await;
        guard
            .values()
            .filter(|dev| dev.state == HostState::Enabled)
            .map(|dev| PollTask { host: dev.host.clone(), community: dev.community.clone(), oids: dev.request.clone() })
            .collect()
    };

    if tasks.is_empty() {
        return;
    }

    let outcomes = poller.poll_all(tasks).await;
    for outcome in outcomes {
        apply_outcome(shared, outcome).await;
    }
}

async fn apply_outcome(shared: &Shared, outcome: PollOutcome) {
    let PollOutcome { host, result } = outcome;

    let response = match result {
        Ok(r) => r,
        Err(e) => {
            warn!(host = %host, "device is unreachable: {e}");
            let mut guard = shared.devices.lock().await;
            if let Some(dev) = guard.get_mut(&host) {
                dev.state = HostState::Unreachable;
            }
            drop(guard);
            shared.action_queue.push(ActionTask { host, reason: ActionReason::Unreachable }).await;
            return;
        }
    };

    if response.varbinds.len() < 2 {
        warn!(host = %host, "short PDU in poll response, ignoring");
        return;
    }

    let Some(objid) = response.varbinds[0].value.as_object_id_string() else {
        warn!(host = %host, "unexpected ASN type in answer to sysObjectID");
        return;
    };
    let Some(timeticks) = response.varbinds[1].value.as_timeticks() else {
        warn!(host = %host, "unexpected ASN type in answer to sysUpTime");
        return;
    };

    let mut guard = shared.devices.lock().await;
    let Some(dev) = guard.get_mut(&host) else { return };

    if objid != dev.objid {
        info!(host = %host, "device type has changed, PDU ignored, reinitializing");
        dev.state = HostState::Init;
        drop(guard);
        shared.action_queue.push(ActionTask { host, reason: ActionReason::Reinit }).await;
        return;
    }

    let timedelta = ((timeticks as i64 - dev.timeticks) / 100).max(1) as f64;
    dev.timeticks = timeticks as i64;

    let window_size = shared.config.poller.window_size();
    let mut new_alarms = Vec::new();

    for vb in &response.varbinds[2..] {
        let Some(ifindex) = oids::trailing_index(&vb.oid) else { continue };
        let Some(intf) = dev.interfaces.get_mut(&ifindex) else {
            warn!(host = %host, ifindex, "host returned PDU for unknown interface");
            continue;
        };
        let Some(counter) = (match &vb.value {
            Value::Counter64(c) => Some(*c),
            _ => None,
        }) else {
            warn!(host = %host, ifindex, "unexpected ASN type in answer to ifHCInBroadcastPkts");
            continue;
        };

        match anomaly::ingest_counter(&mut intf.poll, counter, timedelta) {
            CounterUpdate::Seeded | CounterUpdate::Reset => continue,
            CounterUpdate::Delta(delta) => {
                anomaly::update_moving_average(&mut intf.poll, window_size);
                if let Ok(ts) = TimeSeries::init(&intf.rrd_path, shared.config.poller.poll_interval_secs) {
                    if let Err(e) = ts.add_data(delta, intf.poll.lastmav) {
                        warn!(host = %host, ifindex, "failed to record sample: {e}");
                    }
                }

                match anomaly::evaluate_alarm(&mut intf.poll, &shared.config.poller, window_size) {
                    AlarmEvent::Fired(kind) => {
                        info!(host = %host, ifindex, alarm = %kind, "abnormal broadcast pps level detected");
                        new_alarms.push(AlarmRef::new(host.clone(), ifindex));
                    }
                    AlarmEvent::Cleared => info!(host = %host, ifindex, "alarm cleared"),
                    AlarmEvent::ClearedAndRearmed(kind) => {
                        info!(host = %host, ifindex, alarm = %kind, "alarm cleared and immediately reset");
                    }
                    AlarmEvent::StillFiring(_) | AlarmEvent::Quiet => {}
                }
            }
        }
    }
    drop(guard);

    if !new_alarms.is_empty() {
        shared.alarm_queue.push_many(new_alarms).await;
    }
}

/// Spawns the Worker against `shared`'s queues (`workloop`'s entry point).
fn spawn_worker(shared: &Arc<Shared>) -> JoinHandle<()> {
    tokio::spawn(worker::run(
        shared.devices.clone(),
        shared.config.clone(),
        shared.action_queue.clone(),
        shared.alarm_queue.clone(),
        shared.return_queue.clone(),
    ))
}

/// Aborts and joins the running Worker, if any. Called before a dataset
/// swap so the Worker can't be mid-action against a device the swap is
/// about to mutate or delete (spec.md §5's "dataset swap is a synchronous
/// barrier").
async fn pause_worker(worker_handle: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = worker_handle.take() {
        handle.abort();
        if let Err(e) = handle.await {
            if !e.is_cancelled() {
                warn!("worker task panicked while being paused for dataset swap: {e}");
            }
        }
    }
}

/// Folds a freshly-reconciled inventory pass into the live dataset and
/// queues newly-added/reinitialized devices for the Worker
/// (`mainloop`'s swap branch + `prepare_data`'s delete sweep).
async fn apply_reconciled(shared: &Arc<Shared>, worker_handle: &mut Option<JoinHandle<()>>) {
    // Reconcile against a snapshot, not the live map: the Zabbix round
    // trip can take seconds, and holding the dataset lock that long
    // would stall every poll tick (`prepare_data`'s swap, not an
    // in-place hold, is exactly what keeps the original's main thread
    // responsive while a separate thread resolves the snapshot). Poll
    // samples landing on the live map while reconciliation is in flight
    // are lost on swap-back, same as `prepare_data`'s own unresolved
    // "transfer actual interface data somewhere here?" gap.
    let mut snapshot = shared.devices.lock().await.clone();

    match inventory::run_cycle(&mut snapshot, &shared.config).await {
        Ok(stats) => {
            let to_delete: Vec<String> = snapshot.iter().filter(|(_, d)| d.delete_mark).map(|(h, _)| h.clone()).collect();
            for host in &to_delete {
                if let Some(dev) = snapshot.get(host) {
                    for intf in dev.interfaces.values() {
                        if let Ok(ts) = TimeSeries::init(&intf.rrd_path, shared.config.poller.poll_interval_secs) {
                            let _ = ts.remove();
                        }
                    }
                }
                snapshot.remove(host);
            }

            let needing_init: Vec<String> = snapshot
                .iter()
                .filter(|(_, d)| d.state == HostState::Init)
                .map(|(h, _)| h.clone())
                .collect();

            // Pause the Worker and drop whatever it had queued before the
            // swap: every pending action/alarm references the map that's
            // about to be replaced, and a stale reference resolved after
            // the swap could act on a device that no longer exists or has
            // been re-keyed (spec.md §4.F step 2, §5's synchronous-barrier
            // requirement).
            pause_worker(worker_handle).await;
            shared.action_queue.drain().await;
            shared.alarm_queue.drain().await;

            let mut guard = shared.devices.lock().await;
            *guard = snapshot;
            info!(
                added = stats.added,
                updated = stats.updated,
                marked_for_deletion = stats.marked_for_deletion,
                total = guard.len(),
                "inventory reconciliation complete"
            );
            drop(guard);

            for host in needing_init {
                shared.action_queue.push(ActionTask { host, reason: ActionReason::Reinit }).await;
            }

            *worker_handle = Some(spawn_worker(shared));
        }
        Err(e) => warn!("inventory reconciliation failed: {e}"),
    }
}

/// Drains hosts the Worker handed back as newly `Enabled`, rebuilding
/// each device's composite poll request (`return_dev`'s tail end).
async fn drain_returns(shared: &Shared) {
    for host in shared.return_queue.drain().await {
        let mut guard = shared.devices.lock().await;
        if let Some(dev) = guard.get_mut(&host) {
            dev.prepare_request();
        }
    }
}

/// The Main Controller's tick loop (`mainloop`): poll, reconcile on
/// schedule, drain worker returns, sleep out the remainder of the tick.
pub async fn run(shared: Arc<Shared>) {
    let timeout = Duration::from_secs(5);
    let poller = MuxPoller::new(64, timeout);
    let poll_interval = Duration::from_secs(shared.config.poller.poll_interval_secs);
    let update_interval = Duration::from_secs(shared.config.poller.update_interval_hours * 3600);

    let mut worker_handle: Option<JoinHandle<()>> = None;
    apply_reconciled(&shared, &mut worker_handle).await;
    let mut last_update = Instant::now();

    loop {
        let begin = Instant::now();

        run_tick(&shared, &poller).await;
        drain_returns(&shared).await;

        let devices_empty = shared.devices.lock().await.is_empty();
        if devices_empty || last_update.elapsed() >= update_interval {
            apply_reconciled(&shared, &mut worker_handle).await;
            last_update = Instant::now();
        }

        let elapsed = begin.elapsed();
        if elapsed < poll_interval {
            tokio::time::sleep(poll_interval - elapsed).await;
        }
    }
}
