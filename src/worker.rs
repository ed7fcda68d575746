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

//! The Worker (spec.md §4.E, Component E): reinitializes devices reported
//! unreachable or type-changed, backs off retries, confirms alarms with a
//! secondary sample, and dispatches notifications.
//!
//! Grounded on `examples/original_source/src/loopd/worker.cpp`
//! (`process_alarms`, `check_bc_rate`, `process_devices`, `return_dev`,
//! `workloop`) and `device.cpp` (`init_device`, `update_ints`). The
//! original runs this as a dedicated OS thread parked on a condition
//! variable; here it is a dedicated tokio task parked on
//! [`crate::queues::Queue::wait_non_empty`], reading/writing the shared
//! dataset through a `tokio::sync::Mutex` instead of `thread_sync`'s three
//! separate `std::mutex`es.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::model::{AlarmKind, Device, DeviceMap, HostState, Interface, MAX_BACKOFF};
use crate::queues::{ActionQueue, ActionTask, AlarmQueue, ReturnQueue};
use crate::snmp::{client, discovery};
use crate::{mail, rrd};

const RETRY_INTERVAL_SECS: u32 = 10;

/// Snapshot of interface attributes just before an alarm confirmation
/// probe, so the SNMP round trip can happen without holding the dataset
/// lock (mirrors `process_alarms`' `datalock.unlock()` around `check_bc_rate`).
struct AlarmSnapshot {
    host: String,
    community: String,
    device_name: String,
    if_name: String,
    if_alias: String,
    alarm: AlarmKind,
    lastmav: f64,
    mav_len: usize,
    rrd_path: std::path::PathBuf,
}

fn snapshot_alarm(devices: &DeviceMap, host: &str, ifindex: u32) -> Option<AlarmSnapshot> {
    let dev = devices.get(host)?;
    let intf = dev.interfaces.get(&ifindex)?;
    Some(AlarmSnapshot {
        host: dev.host.clone(),
        community: dev.community.clone(),
        device_name: dev.name.clone(),
        if_name: intf.name.clone(),
        if_alias: intf.alias.clone(),
        alarm: intf.poll.alarm,
        lastmav: intf.poll.lastmav,
        mav_len: intf.poll.mav_vals.len(),
        rrd_path: intf.rrd_path.clone(),
    })
}

/// Two GETs `recheck_interval` apart, matching `check_bc_rate`. Returns
/// `None` on timeout, matching the original's `return 0`.
async fn recheck_bc_rate(host: &str, community: &str, ifindex: u32, interval: Duration, timeout: Duration) -> Option<u64> {
    let oid = crate::snmp::oids::if_hc_in_broadcast_pkts(ifindex);

    let first = client::get(host, community, &[oid.clone()], timeout).await.ok()?;
    let a = first.varbinds.first()?.value.as_counter64()?;
    sleep(interval).await;
    let second = client::get(host, community, &[oid], timeout).await.ok()?;
    let b = second.varbinds.first()?.value.as_counter64()?;

    Some((b.saturating_sub(a)) / interval.as_secs().max(1))
}

/// Handles one alarm reference end to end: recheck, threshold compare,
/// graph render, email dispatch (`process_alarms` body).
async fn handle_alarm(devices: &Arc<Mutex<DeviceMap>>, host: String, ifindex: u32, cfg: &Config) {
    let snap = {
        let guard = devices.lock().await;
        match snapshot_alarm(&guard, &host, ifindex) {
            Some(s) => s,
            None => return, // device/interface no longer exists; stale reference, discard.
        }
    };

    let recheck_interval = Duration::from_secs(cfg.poller.recheck_interval_secs);
    let timeout = Duration::from_secs(5);
    let bcrate = recheck_bc_rate(&snap.host, &snap.community, ifindex, recheck_interval, timeout).await;

    let threshold = match snap.alarm {
        AlarmKind::Spike => snap.lastmav * snap.mav_len as f64 * 0.5,
        AlarmKind::Bcmax => cfg.poller.bcmax as f64 * 0.8,
        AlarmKind::Mavmax => cfg.poller.mavmax as f64 * 0.8,
        AlarmKind::None => return,
    };

    if let Some(rate) = bcrate {
        if rate != 0 && (rate as f64) < threshold {
            info!(host = %snap.host, ifindex, rate, threshold, "alarm not sent, rechecked rate below threshold");
            return;
        }
    }

    let graph_png = match rrd::TimeSeries::init(&snap.rrd_path, cfg.poller.poll_interval_secs)
        .and_then(|ts| {
            let dest = snap.rrd_path.with_extension("png");
            ts.graph(
                &dest,
                &format!("{}: {} - {}", snap.host, snap.if_name, snap.if_alias),
                cfg.notifier.image_width,
                cfg.notifier.image_height,
            )?;
            std::fs::read(&dest).map_err(Into::into)
        }) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(host = %snap.host, ifindex, "failed to render alert graph: {e}");
            Vec::new()
        }
    };

    let ctx = mail::AlertContext {
        host: &snap.host,
        device_name: &snap.device_name,
        if_name: &snap.if_name,
        if_alias: &snap.if_alias,
        alarm: snap.alarm,
        recheck_bcrate: bcrate,
        graph_png,
    };

    match mail::build_message(&ctx, &cfg.notifier) {
        Ok(message) => {
            if let Err(e) = mail::send(message, &cfg.notifier).await {
                warn!(host = %snap.host, ifindex, "failed to send alert: {e}");
            } else {
                info!(host = %snap.host, ifindex, alarm = %snap.alarm, "alert dispatched");
            }
        }
        Err(e) => warn!(host = %snap.host, ifindex, "failed to build alert message: {e}"),
    }
}

/// Probes and enumerates one device (`init_device` + `update_ints`
/// folded together, since both are driven from the same reinit task
/// here rather than two functions called in sequence from `process_devices`).
async fn reinit_device(devices: &Arc<Mutex<DeviceMap>>, host: &str, cfg: &Config) -> bool {
    let (community, default_community) = {
        let guard = devices.lock().await;
        let Some(dev) = guard.get(host) else { return false };
        (dev.community.clone(), cfg.snmp.default_community.clone())
    };

    let timeout = Duration::from_secs(5);
    let objid = match discovery::probe_objid(host, &community, timeout).await {
        Ok(objid) => objid,
        Err(_) if community == default_community => {
            mark_unreachable(devices, host).await;
            return false;
        }
        Err(_) => match discovery::probe_objid(host, &default_community, timeout).await {
            Ok(objid) => {
                let mut guard = devices.lock().await;
                if let Some(dev) = guard.get_mut(host) {
                    dev.community = default_community.clone();
                }
                objid
            }
            Err(_) => {
                mark_unreachable(devices, host).await;
                return false;
            }
        },
    };

    let interfaces = match discovery::enumerate_interfaces(host, &community, timeout).await {
        Ok(ifaces) => ifaces,
        Err(_) => {
            mark_unreachable(devices, host).await;
            return false;
        }
    };

    let mut guard = devices.lock().await;
    let Some(dev) = guard.get_mut(host) else { return false };

    if !dev.objid.is_empty() && dev.objid != objid {
        info!(host, old = %dev.objid, new = %objid, "device type changed");
    }
    dev.objid = objid;
    dev.state = HostState::Enabled;

    for intf in dev.interfaces.values_mut() {
        intf.delete_mark = true;
    }
    for found in interfaces {
        if !found.active {
            continue;
        }
        match dev.interfaces.get_mut(&found.index) {
            Some(existing) => {
                existing.alias = found.alias;
                existing.delete_mark = false;
            }
            None => {
                let rrd_path = dev.datadir.join(format!("{}.rrd", found.index));
                let mut intf = Interface::new(found.index, found.name, found.alias, rrd_path);
                intf.delete_mark = false;
                info!(host, ifindex = found.index, "interface added");
                dev.interfaces.insert(found.index, intf);
            }
        }
    }
    dev.prepare_request();
    true
}

async fn mark_unreachable(devices: &Arc<Mutex<DeviceMap>>, host: &str) {
    let mut guard = devices.lock().await;
    if let Some(dev) = guard.get_mut(host) {
        dev.state = HostState::Unreachable;
        warn!(host, "device is not responding with any known community");
    }
}

/// Runs one reinit attempt for `task`, then either hands the device back
/// via `return_queue` or bumps its backoff and re-queues the task for a
/// later retry (`process_devices`'s `wait_backoff` loop).
async fn run_action(
    devices: &Arc<Mutex<DeviceMap>>,
    task: ActionTask,
    cfg: &Arc<Config>,
    action_queue: &Arc<ActionQueue>,
    return_queue: &Arc<ReturnQueue>,
) {
    let enabled = reinit_device(devices, &task.host, cfg).await;

    let backoff = {
        let mut guard = devices.lock().await;
        match guard.get_mut(&task.host) {
            Some(dev) if enabled => {
                dev.backoff = 1;
                dev.timeticks = 0;
                None
            }
            Some(dev) => {
                dev.bump_backoff();
                Some(dev.backoff)
            }
            None => return, // device removed from the dataset mid-reinit; drop the task.
        }
    };

    match backoff {
        None => {
            info!(host = %task.host, "device active, passing back to controller");
            return_queue.push(task.host).await;
        }
        Some(backoff) => {
            let delay = Duration::from_secs((RETRY_INTERVAL_SECS * backoff).min(MAX_BACKOFF * RETRY_INTERVAL_SECS) as u64);
            warn!(host = %task.host, backoff, "device still unreachable, retrying later");
            let action_queue = action_queue.clone();
            tokio::spawn(async move {
                sleep(delay).await;
                action_queue.push(task).await;
            });
        }
    }
}

/// Drives the Worker's main loop: parks on the action/alarm queues,
/// processes whatever is queued, hands recovered devices back via
/// `return_queue` (`workloop`).
pub async fn run(
    devices: Arc<Mutex<DeviceMap>>,
    cfg: Arc<Config>,
    action_queue: Arc<ActionQueue>,
    alarm_queue: Arc<AlarmQueue>,
    return_queue: Arc<ReturnQueue>,
) {
    loop {
        for alarm in alarm_queue.drain().await {
            handle_alarm(&devices, alarm.host, alarm.ifindex, &cfg).await;
        }

        for task in action_queue.drain().await {
            run_action(&devices, task, &cfg, &action_queue, &return_queue).await;
        }

        tokio::select! {
            _ = action_queue.wait_non_empty() => {}
            _ = alarm_queue.wait_non_empty() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn snapshot_alarm_returns_none_for_missing_device() {
        let devices = DeviceMap::new();
        assert!(snapshot_alarm(&devices, "10.0.0.1", 1).is_none());
    }

    #[tokio::test]
    async fn snapshot_alarm_reads_current_state() {
        let mut devices = DeviceMap::new();
        let mut dev = Device::new("10.0.0.1", "sw1", "public", PathBuf::new());
        dev.interfaces.insert(1, Interface::new(1, "eth0".into(), "uplink".into(), PathBuf::new()));
        dev.interfaces.get_mut(&1).unwrap().poll.alarm = AlarmKind::Mavmax;
        devices.insert("10.0.0.1".into(), dev);

        let snap = snapshot_alarm(&devices, "10.0.0.1", 1).unwrap();
        assert_eq!(snap.alarm, AlarmKind::Mavmax);
        assert_eq!(snap.if_name, "eth0");
    }
}
