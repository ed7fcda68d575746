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

//! Multiplex Poller (spec.md §4.D, Component D): drives one GET per
//! device concurrently from a single task, bounded by `max_in_flight`.
//!
//! Grounded on `examples/original_source/src/loopd/worker.cpp`'s
//! `mux_poller`/`workloop` pair, which multiplexes many sockets through a
//! single `select`/`epoll` readiness loop rather than a thread per host.
//! `FuturesUnordered` is the async equivalent: many in-flight futures
//! polled together on one task, refilled as each resolves, never spawning
//! a task per device.

use std::time::Duration;

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;

use crate::error::Result;
use crate::snmp::client;
use crate::snmp::oids::Oid;
use crate::snmp::wire::Response;

/// One device's worth of composite GET to issue this tick.
#[derive(Debug, Clone)]
pub struct PollTask {
    pub host: String,
    pub community: String,
    pub oids: Vec<Oid>,
}

/// The per-device result of a tick's poll.
pub struct PollOutcome {
    pub host: String,
    pub result: Result<Response>,
}

/// Bounded-concurrency single-task fan-out driver.
pub struct MuxPoller {
    max_in_flight: usize,
    timeout: Duration,
}

impl MuxPoller {
    pub fn new(max_in_flight: usize, timeout: Duration) -> Self {
        MuxPoller {
            max_in_flight: max_in_flight.max(1),
            timeout,
        }
    }

    /// Polls every task, returning one outcome per input task. All requests
    /// are driven from this single call; at most `max_in_flight` are ever
    /// outstanding at once.
    pub async fn poll_all(&self, tasks: Vec<PollTask>) -> Vec<PollOutcome> {
        let mut pending = tasks.into_iter();
        let mut in_flight = FuturesUnordered::new();
        let mut outcomes = Vec::new();

        for task in pending.by_ref().take(self.max_in_flight) {
            in_flight.push(self.issue(task));
        }

        while let Some(outcome) = in_flight.next().await {
            outcomes.push(outcome);
            if let Some(task) = pending.next() {
                in_flight.push(self.issue(task));
            }
        }

        outcomes
    }

    async fn issue(&self, task: PollTask) -> PollOutcome {
        let result = client::get(&task.host, &task.community, &task.oids, self.timeout).await;
        PollOutcome { host: task.host, result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_in_flight_floors_at_one() {
        let poller = MuxPoller::new(0, Duration::from_secs(1));
        assert_eq!(poller.max_in_flight, 1);
    }
}
