// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Dispatch strategies.
//!
//! Every logical operation maps to one dispatch over the devices of a
//! partition: reads use [`first_response`] (first usable answer wins),
//! writes use [`quorum_response`] (a status class must reach quorum) and
//! streaming object writes use [`put_response`] which feeds one body to a
//! quorum of backends before entering the same decision loop.
//!
//! A dispatch owns a cancellation token that fires when it returns; workers
//! observe it at every suspension point, so stragglers drop their responses
//! instead of leaking them.

use std::sync::Mutex;
use std::time::Duration;

use http::StatusCode;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::raw::synthetic;
use crate::raw::HttpResponse;
use crate::ring::Device;

mod first;
pub use first::first_response;

mod quorum;
pub use quorum::quorum_response;

mod put;
pub use put::put_response;

/// How long a decided quorum waits for stragglers, to improve consistency
/// of read-after-write.
pub(crate) const POST_QUORUM_GRACE: Duration = Duration::from_millis(100);

/// Overall deadline for a quorum decision, also the tail deadline of a
/// streaming PUT.
pub(crate) const POST_PUT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long the read dispatcher waits on one attempt before firing the next
/// without cancelling the previous.
pub(crate) const FIRST_ATTEMPT_WINDOW: Duration = Duration::from_secs(1);

pub(crate) const UNAVAILABLE_BODY: &str = "The service is currently unavailable.";

/// Quorum threshold for a replica count: `ceil(replicas / 2)`.
pub const fn quorum(replica_count: usize) -> usize {
    replica_count / 2 + replica_count % 2
}

pub(crate) fn is_server_error(status: StatusCode) -> bool {
    status.as_u16() >= 500
}

/// One handoff stream shared by the workers of a dispatch, so two failing
/// workers never migrate to the same device.
pub(crate) struct Handoffs {
    iter: Mutex<Box<dyn Iterator<Item = Device> + Send>>,
}

impl Handoffs {
    pub(crate) fn new(iter: Box<dyn Iterator<Item = Device> + Send>) -> Self {
        Self {
            iter: Mutex::new(iter),
        }
    }

    pub(crate) fn next(&self) -> Option<Device> {
        self.iter.lock().expect("handoff iterator poisoned").next()
    }
}

/// Publish a worker's response, or drop it (closing the body) when the
/// dispatch has already returned.
pub(crate) async fn deliver(
    tx: &mpsc::Sender<HttpResponse>,
    resp: HttpResponse,
    cancel: &CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tx.send(resp) => {}
    }
}

/// Response bookkeeping for the quorum decision loop.
///
/// The class tally only counts usable (non-5xx) responses; failures still
/// land in `responses` so the outstanding count shrinks and impossibility
/// can short-circuit.
pub(crate) struct QuorumState {
    q: usize,
    total_workers: usize,
    responses: Vec<HttpResponse>,
    class_counts: [usize; 6],
}

impl QuorumState {
    pub(crate) fn new(q: usize, total_workers: usize) -> Self {
        Self {
            q,
            total_workers,
            responses: Vec::with_capacity(total_workers),
            class_counts: [0; 6],
        }
    }

    pub(crate) fn add(&mut self, resp: HttpResponse) {
        let class = (resp.status().as_u16() / 100) as usize;
        if !is_server_error(resp.status()) && class < self.class_counts.len() {
            self.class_counts[class] += 1;
        }
        self.responses.push(resp);
    }

    fn outstanding(&self) -> usize {
        self.total_workers - self.responses.len()
    }

    /// Index of the earliest response whose status class has reached quorum.
    fn decided_index(&self) -> Option<usize> {
        self.responses.iter().position(|r| {
            let class = (r.status().as_u16() / 100) as usize;
            class < self.class_counts.len() && self.class_counts[class] >= self.q
        })
    }

    fn quorum_possible(&self) -> bool {
        let outstanding = self.outstanding();
        self.class_counts.iter().any(|c| c + outstanding >= self.q)
    }
}

/// Run the quorum decision loop until a representative response emerges.
///
/// Returns the earliest response of the first class to reach quorum, after
/// giving pending requests a short grace window to land. Synthesizes a 503
/// when quorum has become impossible or `deadline` passes.
pub(crate) async fn decide(
    rx: &mut mpsc::Receiver<HttpResponse>,
    state: &mut QuorumState,
    deadline: Duration,
) -> HttpResponse {
    let deadline = Instant::now() + deadline;
    loop {
        if let Some(idx) = state.decided_index() {
            // Give pending requests a chance to finish, to improve
            // consistency of read-after-write.
            let grace = Instant::now() + POST_QUORUM_GRACE;
            while state.outstanding() > 0 {
                tokio::select! {
                    r = rx.recv() => match r {
                        Some(resp) => state.add(resp),
                        None => break,
                    },
                    _ = tokio::time::sleep_until(grace) => break,
                }
            }
            return state.responses.swap_remove(idx);
        }

        if !state.quorum_possible() {
            log::debug!(
                "quorum impossible with {} outstanding of {}",
                state.outstanding(),
                state.total_workers
            );
            return synthetic(StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_BODY);
        }

        tokio::select! {
            r = rx.recv() => match r {
                Some(resp) => state.add(resp),
                // Every worker is gone; whatever quorum was possible on
                // paper is not arriving.
                None => return synthetic(StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_BODY),
            },
            _ = tokio::time::sleep_until(deadline) => {
                return synthetic(StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_BODY)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_threshold() {
        assert_eq!(quorum(1), 1);
        assert_eq!(quorum(2), 1);
        assert_eq!(quorum(3), 2);
        assert_eq!(quorum(4), 2);
        assert_eq!(quorum(5), 3);
    }

    #[test]
    fn test_tally_ignores_server_errors() {
        let mut state = QuorumState::new(2, 3);
        state.add(synthetic(StatusCode::CREATED, ""));
        state.add(synthetic(StatusCode::INTERNAL_SERVER_ERROR, ""));
        assert_eq!(state.class_counts, [0, 0, 1, 0, 0, 0]);
        assert!(state.decided_index().is_none());

        state.add(synthetic(StatusCode::CREATED, ""));
        assert_eq!(state.class_counts, [0, 0, 2, 0, 0, 0]);
        // The earliest response of the winning class, not the latest.
        assert_eq!(state.decided_index(), Some(0));
    }

    #[test]
    fn test_quorum_possible() {
        let mut state = QuorumState::new(2, 3);
        assert!(state.quorum_possible());

        state.add(synthetic(StatusCode::NOT_FOUND, ""));
        state.add(synthetic(StatusCode::INTERNAL_SERVER_ERROR, ""));
        // One outstanding plus the 404 can still reach two.
        assert!(state.quorum_possible());

        state.add(synthetic(StatusCode::INTERNAL_SERVER_ERROR, ""));
        assert!(!state.quorum_possible());
    }
}
