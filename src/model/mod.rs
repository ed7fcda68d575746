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

//! Device/Interface/PollData ownership model (spec.md §3, §4.B).
//!
//! Pure data owner: the main dataset (`DeviceMap`) owns every `Device` and
//! `Interface`; the worker and the anomaly engine only ever hold
//! identifiers (host string, interface index) that get re-resolved against
//! the live map. Grounded on `examples/original_source/src/loopd/device.h`
//! for struct shape and `data.h` for `PollData` (there: `polldata`).

pub mod alarm;

pub use alarm::{AlarmKind, AlarmRef};

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use crate::snmp::oids::{self, Oid};

/// Lifecycle state of a device (spec.md §4 "Device state").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    /// Freshly added or objID-mismatched device awaiting probe + enumeration.
    Init,
    /// Actively polled each tick.
    Enabled,
    /// Owned, accounted for, retried with backoff by the worker.
    Unreachable,
}

/// Bounded per-interface poll state (spec.md §3 PollData).
#[derive(Debug, Clone)]
pub struct PollData {
    pub alarm: AlarmKind,
    /// Last raw 64-bit ifHCInBroadcastPkts counter.
    pub counter: u64,
    /// Current moving average.
    pub lastmav: f64,
    /// Average frozen at the moment of alarm entry; used only for spike classification.
    pub prevmav: f64,
    /// Per-tick rate samples, newest at the front, bounded by the configured window size.
    pub mav_vals: VecDeque<f64>,
}

impl Default for PollData {
    fn default() -> Self {
        PollData {
            alarm: AlarmKind::None,
            counter: 0,
            lastmav: 0.0,
            prevmav: 0.0,
            mav_vals: VecDeque::new(),
        }
    }
}

impl PollData {
    /// Clears alarm, counter, averages and the sample window. Used on
    /// device reinitialization (spec.md §4.B `reset`).
    pub fn reset(&mut self) {
        *self = PollData::default();
    }
}

/// A monitored interface (spec.md §3 Interface).
#[derive(Debug, Clone)]
pub struct Interface {
    pub index: u32,
    pub name: String,
    pub alias: String,
    pub delete_mark: bool,
    /// Path to this interface's time-series store file; created lazily.
    pub rrd_path: PathBuf,
    pub poll: PollData,
}

impl Interface {
    pub fn new(index: u32, name: String, alias: String, rrd_path: PathBuf) -> Self {
        Interface {
            index,
            name,
            alias,
            delete_mark: false,
            rrd_path,
            poll: PollData::default(),
        }
    }
}

/// A monitored device (spec.md §3 Device).
#[derive(Debug, Clone)]
pub struct Device {
    pub host: String,
    pub name: String,
    pub community: String,
    pub datadir: PathBuf,
    /// SNMP sysObjectID. Non-empty iff state has been `Enabled` at least once.
    pub objid: String,
    pub state: HostState,
    /// Prebuilt composite GET: sysObjectID, sysUpTime, one ifHCInBroadcastPkts per interface.
    pub request: Vec<Oid>,
    /// Last-seen sysUpTime timeticks while `Enabled`; reinterpreted as
    /// "next retry unix timestamp" while `state != Enabled`.
    pub timeticks: i64,
    /// Exponential-backoff multiplier: starts at 1, doubles, capped.
    pub backoff: u32,
    pub delete_mark: bool,
    pub interfaces: HashMap<u32, Interface>,
}

pub const MAX_BACKOFF: u32 = 1024;

impl Device {
    pub fn new(host: impl Into<String>, name: impl Into<String>, community: impl Into<String>, datadir: PathBuf) -> Self {
        Device {
            host: host.into(),
            name: name.into(),
            community: community.into(),
            datadir,
            objid: String::new(),
            state: HostState::Init,
            request: Vec::new(),
            timeticks: 0,
            backoff: 1,
            delete_mark: false,
            interfaces: HashMap::new(),
        }
    }

    /// Rebuilds the composite GET from the current interface set and
    /// stores it on the device (spec.md §4.B `prepare_request`).
    ///
    /// Invariant: the result contains exactly `2 + interfaces.len()`
    /// variable bindings.
    pub fn prepare_request(&mut self) {
        let mut req = Vec::with_capacity(2 + self.interfaces.len());
        req.push(oids::sys_object_id());
        req.push(oids::sys_up_time());
        let mut indices: Vec<u32> = self.interfaces.keys().copied().collect();
        indices.sort_unstable();
        for ifindex in indices {
            req.push(oids::if_hc_in_broadcast_pkts(ifindex));
        }
        self.request = req;
    }

    /// Zeros per-interface poll state, timeticks, and backoff (used on
    /// reinitialization, spec.md §4.B `reset`).
    pub fn reset(&mut self) {
        for intf in self.interfaces.values_mut() {
            intf.poll.reset();
        }
        self.timeticks = 0;
        self.backoff = 1;
    }

    pub fn bump_backoff(&mut self) {
        if self.backoff < MAX_BACKOFF {
            self.backoff *= 2;
        }
    }
}

/// The live device map. Owned exclusively by the Main Controller; the
/// Reconciler only ever sees a clone snapshot.
pub type DeviceMap = HashMap<String, Device>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_device() -> Device {
        Device::new("10.0.0.1", "sw1", "public", PathBuf::from("/data/10.0.0.1"))
    }

    #[test]
    fn prepare_request_invariant_counts() {
        let mut dev = sample_device();
        for i in [1u32, 2, 5] {
            dev.interfaces
                .insert(i, Interface::new(i, format!("eth{i}"), String::new(), PathBuf::new()));
        }
        dev.prepare_request();
        assert_eq!(dev.request.len(), 2 + dev.interfaces.len());
    }

    #[test]
    fn reset_clears_poll_state_but_keeps_interfaces() {
        let mut dev = sample_device();
        dev.interfaces
            .insert(1, Interface::new(1, "eth1".into(), String::new(), PathBuf::new()));
        dev.interfaces.get_mut(&1).unwrap().poll.counter = 42;
        dev.interfaces.get_mut(&1).unwrap().poll.alarm = AlarmKind::Bcmax;
        dev.timeticks = 123;
        dev.backoff = 8;

        dev.reset();

        assert_eq!(dev.interfaces.len(), 1);
        assert_eq!(dev.interfaces[&1].poll.counter, 0);
        assert_eq!(dev.interfaces[&1].poll.alarm, AlarmKind::None);
        assert_eq!(dev.timeticks, 0);
        assert_eq!(dev.backoff, 1);
    }

    #[test]
    fn create_device_idempotent_by_host() {
        let mut devices = DeviceMap::new();
        devices.insert("10.0.0.1".into(), sample_device());
        let existing = devices.get_mut("10.0.0.1").unwrap();
        existing.delete_mark = true;
        // Reconciler re-sighting clears the delete mark without replacing the record.
        existing.delete_mark = false;
        assert_eq!(devices.len(), 1);
        assert!(!devices["10.0.0.1"].delete_mark);
    }
}
