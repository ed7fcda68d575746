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

//! Cross-component work queues shared between the Main Controller, the
//! Anomaly Engine, and the Worker (spec.md §4, §5).
//!
//! Grounded on `examples/original_source/src/loopd/data.h`'s
//! `action_queue`/`alarm_queue` and `worker.cpp`'s `return_data`: there,
//! three `std::vector`s guarded by plain `std::mutex`es, double-buffered
//! (`*_queue` filled under lock, swapped into a `*_data` working copy the
//! owning thread drains without holding the lock). Async tasks cooperate
//! instead of contending on an OS mutex, so a single `tokio::sync::Mutex`
//! plus a `Notify` replaces both the double buffer and the condition
//! variable (`thread_sync::wake` in the original) that `workloop` parks
//! on. Per spec.md §9 Design Notes, entries are identifiers
//! (`host`/`AlarmRef`), never references into the live dataset.

use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};

use crate::model::AlarmRef;

/// Why the Worker needs to (re)touch a device, mirroring the two
/// `device->state` transitions that push onto `action_queue` in
/// `data.cpp::callback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionReason {
    /// Device type changed (sysObjectID mismatch) or is brand new; needs
    /// a full reinit/enumerate pass.
    Reinit,
    /// The poll callback reported unreachability.
    Unreachable,
}

/// One device handed from the Main Controller (or the poller) to the
/// Worker for reinit/backoff handling.
#[derive(Debug, Clone)]
pub struct ActionTask {
    pub host: String,
    pub reason: ActionReason,
}

/// A generic notify-on-push work queue. Any number of producers and
/// consumers may share one instance; [`Queue::wait_non_empty`] parks a
/// consumer until a producer calls [`Queue::push`] or [`Queue::push_many`].
pub struct Queue<T> {
    items: Mutex<VecDeque<T>>,
    notify: Notify,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Queue {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, item: T) {
        self.items.lock().await.push_back(item);
        self.notify.notify_one();
    }

    pub async fn push_many(&self, into: impl IntoIterator<Item = T>) {
        let mut guard = self.items.lock().await;
        let before = guard.len();
        guard.extend(into);
        if guard.len() > before {
            self.notify.notify_one();
        }
    }

    /// Removes and returns every item currently queued, leaving the queue
    /// empty. Non-blocking; returns an empty `Vec` if nothing is queued.
    pub async fn drain(&self) -> Vec<T> {
        let mut guard = self.items.lock().await;
        guard.drain(..).collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    /// Parks until the queue is non-empty, matching `workloop`'s
    /// `while (syncdata->sleeping) syncdata->wake.wait(statelock)` loop.
    /// Spurious wakeups are safe: the caller re-checks emptiness itself
    /// via [`Queue::drain`] or [`Queue::is_empty`].
    pub async fn wait_non_empty(&self) {
        loop {
            if !self.is_empty().await {
                return;
            }
            self.notify.notified().await;
        }
    }
}

pub type ActionQueue = Queue<ActionTask>;
pub type AlarmQueue = Queue<AlarmRef>;
/// Hosts the Worker has reinitialized successfully and is handing back to
/// the Main Controller for the next tick's poll set (`return_dev`/`return_data`).
pub type ReturnQueue = Queue<String>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn push_then_drain_returns_all_items() {
        let queue: Queue<u32> = Queue::new();
        queue.push(1).await;
        queue.push(2).await;
        let drained = queue.drain().await;
        assert_eq!(drained, vec![1, 2]);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn wait_non_empty_unblocks_on_push() {
        let queue: Arc<Queue<u32>> = Arc::new(Queue::new());
        let waiter = queue.clone();
        let handle = tokio::spawn(async move {
            waiter.wait_non_empty().await;
            waiter.drain().await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(7).await;

        let drained = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter did not complete")
            .expect("task panicked");
        assert_eq!(drained, vec![7]);
    }

    #[tokio::test]
    async fn push_many_wakes_a_single_waiter() {
        let queue: Queue<ActionTask> = Queue::new();
        queue
            .push_many([
                ActionTask { host: "a".into(), reason: ActionReason::Reinit },
                ActionTask { host: "b".into(), reason: ActionReason::Unreachable },
            ])
            .await;
        assert_eq!(queue.drain().await.len(), 2);
    }
}
