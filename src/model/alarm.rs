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

//! Alarm kinds and the weak (identifier-based) alarm reference that flows
//! through `alarm_queue`.
//!
//! Grounded on `examples/original_source/src/loopd/data.h`'s `alarm_info`
//! (a raw `device *` / `int_info *` pair) and `data.cpp`'s
//! `alarmtype_names` map. Per spec.md §9 Design Notes, the pointer pair is
//! replaced with a `(host, ifindex)` identifier pair that is re-resolved
//! against the live dataset under the dataset lock — a stale reference
//! (device removed by a swap) becomes a clean "not found, discard" rather
//! than a dangling pointer.

use std::fmt;

/// The kind of abnormal broadcast condition detected on an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlarmKind {
    #[default]
    None,
    /// Raw broadcast pps exceeded `bcmax`.
    Bcmax,
    /// Moving-average broadcast pps exceeded `mavmax`.
    Mavmax,
    /// The moving average jumped sharply relative to its pre-event baseline.
    Spike,
}

impl AlarmKind {
    pub fn is_firing(self) -> bool {
        !matches!(self, AlarmKind::None)
    }

    pub fn name(self) -> &'static str {
        match self {
            AlarmKind::None => "none",
            AlarmKind::Bcmax => "raw broadcast max",
            AlarmKind::Mavmax => "moving average max",
            AlarmKind::Spike => "spike on the average",
        }
    }
}

impl fmt::Display for AlarmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A weak reference to an alarmed interface, identified rather than
/// pointed-to. Resolved against the live dataset at the point of use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlarmRef {
    pub host: String,
    pub ifindex: u32,
}

impl AlarmRef {
    pub fn new(host: impl Into<String>, ifindex: u32) -> Self {
        AlarmRef {
            host: host.into(),
            ifindex,
        }
    }
}
