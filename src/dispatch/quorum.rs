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

use std::sync::Arc;

use http::Request;
use http::StatusCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::decide;
use super::deliver;
use super::is_server_error;
use super::quorum;
use super::Handoffs;
use super::QuorumState;
use super::POST_PUT_TIMEOUT;
use crate::raw::capture;
use crate::raw::synthetic;
use crate::raw::HttpClient;
use crate::raw::HttpResponse;
use crate::raw::RequestBody;
use crate::ring::Device;
use crate::ring::Ring;
use crate::types::Result;

/// Write-path dispatch: return a response representative of a quorum of
/// backends.
///
/// One worker per primary device builds and sends its request, migrating to
/// handoff devices on transport errors and 5xx answers. Responses funnel
/// into the shared decision loop, which returns once any status class
/// reaches `ceil(replicas / 2)`, after a short grace for stragglers, or
/// synthesizes a 503 when that can no longer happen.
pub async fn quorum_response<F>(
    client: &HttpClient,
    ring: &dyn Ring,
    partition: u64,
    make_request: F,
) -> HttpResponse
where
    F: Fn(usize, &Device) -> Result<Request<RequestBody>> + Send + Sync + 'static,
{
    let cancel = CancellationToken::new();
    let _drop_guard = cancel.clone().drop_guard();

    let primaries = ring.primary_nodes(partition);
    let total = primaries.len();
    let q = quorum(ring.replica_count());
    let handoffs = Arc::new(Handoffs::new(ring.handoff_iter(partition)));
    let make_request = Arc::new(make_request);

    let (tx, mut rx) = mpsc::channel(total.max(1));
    for (index, dev) in primaries.into_iter().enumerate() {
        tokio::spawn(write_worker(
            client.clone(),
            index,
            dev,
            handoffs.clone(),
            make_request.clone(),
            tx.clone(),
            cancel.clone(),
        ));
    }
    drop(tx);

    let mut state = QuorumState::new(q, total);
    decide(&mut rx, &mut state, POST_PUT_TIMEOUT).await
}

/// Run one device's write to completion: send, and walk the handoff chain
/// while answers are unusable. Publishes exactly one response: the first
/// non-5xx, or the final failure once handoffs exhaust so the dispatcher
/// can stop counting on this worker.
async fn write_worker<F>(
    client: HttpClient,
    index: usize,
    dev: Device,
    handoffs: Arc<Handoffs>,
    make_request: Arc<F>,
    tx: mpsc::Sender<HttpResponse>,
    cancel: CancellationToken,
) where
    F: Fn(usize, &Device) -> Result<Request<RequestBody>> + Send + Sync + 'static,
{
    let mut dev = Some(dev);
    let mut last_failure = None;

    while let Some(d) = dev.take() {
        let resp = match make_request(index, &d) {
            Ok(req) => {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    r = client.send(req) => match r {
                        Ok(live) => capture(live).await,
                        Err(err) => synthetic(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            &err.to_string(),
                        ),
                    },
                }
            }
            Err(err) => synthetic(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
        };

        if is_server_error(resp.status()) {
            log::debug!(
                "write to {} returned {}, trying handoff",
                d.host(),
                resp.status()
            );
            last_failure = Some(resp);
            dev = handoffs.next();
        } else {
            deliver(&tx, resp, &cancel).await;
            return;
        }
    }

    if let Some(resp) = last_failure {
        deliver(&tx, resp, &cancel).await;
    }
}
