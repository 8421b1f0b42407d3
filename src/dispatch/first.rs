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

use http::header::ACCEPT_RANGES;
use http::header::ETAG;
use http::HeaderValue;
use http::Request;
use http::StatusCode;
use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::FIRST_ATTEMPT_WINDOW;
use crate::raw::synthetic;
use crate::raw::HttpClient;
use crate::raw::HttpResponse;
use crate::raw::RequestBody;
use crate::ring::Device;
use crate::ring::Ring;
use crate::types::Result;

/// Statuses worth returning to the caller as-is from a read.
fn is_terminal(status: StatusCode) -> bool {
    status.is_success()
        || status == StatusCode::NOT_MODIFIED
        || status == StatusCode::PRECONDITION_FAILED
        || status == StatusCode::RANGE_NOT_SATISFIABLE
}

/// Read-path dispatch: return the first usable response.
///
/// Primaries are tried in uniformly random order, spilling over into
/// handoffs, up to `replica_count + 2` attempts. Attempts race: after firing
/// one, the dispatcher waits one second for any outstanding attempt to
/// answer before firing the next, without cancelling anything already in
/// flight. A late answer from an early attempt is still welcome.
///
/// With no usable answer, the synthesized verdict is 503 when internal
/// errors (transport failures and 5xx) reached the replica count, else 404.
pub async fn first_response(
    client: &HttpClient,
    ring: &dyn Ring,
    partition: u64,
    make_request: impl Fn(&Device) -> Result<Request<RequestBody>>,
) -> HttpResponse {
    let cancel = CancellationToken::new();
    let _drop_guard = cancel.clone().drop_guard();

    let mut primaries = ring.primary_nodes(partition);
    primaries.shuffle(&mut rand::thread_rng());
    let mut handoffs = ring.handoff_iter(partition);

    let replica_count = ring.replica_count();
    let max_attempts = replica_count + 2;
    // Workers send None for transport failures.
    let (tx, mut rx) = mpsc::channel::<Option<HttpResponse>>(max_attempts);

    let mut internal_errors = 0usize;
    for attempt in 0..max_attempts {
        let dev = if attempt < primaries.len() {
            primaries[attempt].clone()
        } else {
            match handoffs.next() {
                Some(dev) => dev,
                None => break,
            }
        };

        let req = match make_request(&dev) {
            Ok(req) => req,
            Err(err) => {
                log::debug!("building read request for {}: {err}", dev.host());
                internal_errors += 1;
                continue;
            }
        };

        let client = client.clone();
        let tx = tx.clone();
        let worker_cancel = cancel.clone();
        tokio::spawn(async move {
            let resp = tokio::select! {
                _ = worker_cancel.cancelled() => return,
                r = client.send(req) => r.ok(),
            };
            tokio::select! {
                // Dispatch already returned; dropping the response closes
                // its body.
                _ = worker_cancel.cancelled() => {}
                _ = tx.send(resp) => {}
            }
        });

        tokio::select! {
            r = rx.recv() => {
                match r.expect("response channel held open by dispatcher") {
                    Some(resp) if is_terminal(resp.status()) => {
                        return normalize_read_response(resp);
                    }
                    Some(resp) => {
                        if resp.status().as_u16() >= 500 {
                            internal_errors += 1;
                        }
                        // Not usable; body dropped here.
                    }
                    None => internal_errors += 1,
                }
            }
            _ = tokio::time::sleep(FIRST_ATTEMPT_WINDOW) => {}
        }
    }

    if internal_errors >= replica_count {
        synthetic(StatusCode::SERVICE_UNAVAILABLE, "")
    } else {
        synthetic(StatusCode::NOT_FOUND, "")
    }
}

/// Success reads advertise range support and carry their etag unquoted.
fn normalize_read_response(mut resp: HttpResponse) -> HttpResponse {
    resp.headers_mut()
        .insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some(etag) = resp.headers().get(ETAG).and_then(|v| v.to_str().ok()) {
        let trimmed = etag.trim_matches('"');
        if trimmed.len() != etag.len() {
            if let Ok(v) = HeaderValue::from_str(trimmed) {
                resp.headers_mut().insert(ETAG, v);
            }
        }
    }
    resp
}
