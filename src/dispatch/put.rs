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

use futures::StreamExt;
use http::Request;
use http::StatusCode;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::decide;
use super::deliver;
use super::is_server_error;
use super::quorum;
use super::Handoffs;
use super::QuorumState;
use super::POST_PUT_TIMEOUT;
use super::UNAVAILABLE_BODY;
use crate::raw::body_pipe;
use crate::raw::capture;
use crate::raw::synthetic;
use crate::raw::BytesStream;
use crate::raw::HttpClient;
use crate::raw::HttpResponse;
use crate::raw::PipeWriter;
use crate::raw::PutBodyGate;
use crate::raw::RequestBody;
use crate::ring::Device;
use crate::ring::Ring;
use crate::types::Error;
use crate::types::ErrorKind;
use crate::types::Result;

/// What a PUT worker reports at the start barrier.
///
/// Only PUT workers carry this barrier: the coordinator must count ready
/// body sinks before it starts the copy, an accounting read and plain write
/// dispatches never need.
enum StartOutcome {
    /// The backend accepted the headers and is waiting for the body.
    Ready(PipeWriter),
    /// A final non-5xx response arrived before any body was wanted.
    Settled,
    /// Handoffs exhausted without a usable answer.
    Failed,
}

/// Streaming object write: feed one source body to a quorum of backends.
///
/// Every primary gets a worker that dials with `Expect: 100-continue`
/// semantics: the request body is a gate that announces its writer the
/// moment the transport first asks for bytes. Workers that draw a 5xx or a
/// transport error before that moment migrate along the shared handoff
/// chain. Once every worker has either a ready writer, a settled response
/// or nothing left to try, the source is tee-copied to all ready writers
/// and the ordinary quorum decision runs over the final statuses.
pub async fn put_response<F>(
    client: &HttpClient,
    ring: &dyn Ring,
    partition: u64,
    source: BytesStream,
    make_request: F,
) -> HttpResponse
where
    F: Fn(usize, &Device, RequestBody) -> Result<Request<RequestBody>> + Send + Sync + 'static,
{
    let cancel = CancellationToken::new();
    let _drop_guard = cancel.clone().drop_guard();

    let primaries = ring.primary_nodes(partition);
    let total = primaries.len();
    let q = quorum(ring.replica_count());
    let handoffs = Arc::new(Handoffs::new(ring.handoff_iter(partition)));
    let make_request = Arc::new(make_request);

    let (start_tx, mut start_rx) = mpsc::channel(total.max(1));
    let (resp_tx, mut resp_rx) = mpsc::channel(total.max(1));
    for (index, dev) in primaries.into_iter().enumerate() {
        tokio::spawn(put_worker(
            client.clone(),
            index,
            dev,
            handoffs.clone(),
            make_request.clone(),
            start_tx.clone(),
            resp_tx.clone(),
            cancel.clone(),
        ));
    }
    drop(start_tx);
    drop(resp_tx);

    // Start barrier: every worker reports ready, settled or failed exactly
    // once, then drops its barrier handle.
    let mut writers: Vec<PipeWriter> = Vec::new();
    let mut settled = 0usize;
    while let Some(outcome) = start_rx.recv().await {
        match outcome {
            StartOutcome::Ready(w) => writers.push(w),
            StartOutcome::Settled => settled += 1,
            StartOutcome::Failed => {}
        }
    }

    if writers.len() + settled < q {
        log::debug!(
            "put cannot reach quorum: {} ready writers, {} settled, need {}",
            writers.len(),
            settled,
            q
        );
        return synthetic(StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_BODY);
    }

    if !writers.is_empty() {
        if let Err(err) = broadcast(source, &mut writers, settled, q).await {
            log::debug!("put body copy failed: {err}");
            return synthetic(StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_BODY);
        }
    }
    // Closing the writers ends every backend's request body.
    drop(writers);

    let mut state = QuorumState::new(q, total);
    decide(&mut resp_rx, &mut state, POST_PUT_TIMEOUT).await
}

/// Copy the source once, broadcasting each chunk to all ready writers.
///
/// A writer whose backend went away is dropped from the set; that only
/// fails the PUT when the survivors plus already-settled responses can no
/// longer reach quorum. Byte order per writer is the source order.
async fn broadcast(
    mut source: BytesStream,
    writers: &mut Vec<PipeWriter>,
    settled: usize,
    q: usize,
) -> Result<()> {
    while let Some(chunk) = source.next().await {
        let chunk = chunk?;
        if chunk.is_empty() {
            continue;
        }

        let results =
            futures::future::join_all(writers.iter().map(|w| w.write(chunk.clone()))).await;
        let mut results = results.into_iter();
        writers.retain(|_| results.next().expect("one result per writer").is_ok());

        if writers.len() + settled < q {
            return Err(Error::new(
                ErrorKind::Unexpected,
                "lost too many body sinks to finish this write",
            ));
        }
        if writers.is_empty() {
            // Enough settled responses exist; no point draining the source.
            break;
        }
    }
    Ok(())
}

enum Dial {
    Settled(HttpResponse),
    Ready(PipeWriter),
}

/// One device's streaming write.
///
/// Dials with a gated body, walking the handoff chain while dials settle
/// with 5xx or transport errors. After the barrier, a ready worker waits
/// for its final status; one that outlives the tail deadline is aborted,
/// which closes the backend connection.
#[allow(clippy::too_many_arguments)]
async fn put_worker<F>(
    client: HttpClient,
    index: usize,
    dev: Device,
    handoffs: Arc<Handoffs>,
    make_request: Arc<F>,
    start_tx: mpsc::Sender<StartOutcome>,
    resp_tx: mpsc::Sender<HttpResponse>,
    cancel: CancellationToken,
) where
    F: Fn(usize, &Device, RequestBody) -> Result<Request<RequestBody>> + Send + Sync + 'static,
{
    let mut dev = Some(dev);
    let mut last_failure = None;

    while let Some(d) = dev.take() {
        let (writer, reader) = body_pipe();
        let (ready_tx, mut ready_rx) = oneshot::channel();
        let gate = PutBodyGate::new(reader, writer, ready_tx, cancel.clone());

        let req = match make_request(index, &d, RequestBody::Stream(Box::pin(gate))) {
            Ok(req) => req,
            Err(err) => {
                last_failure = Some(synthetic(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &err.to_string(),
                ));
                dev = handoffs.next();
                continue;
            }
        };

        let send_fut = client.send(req);
        tokio::pin!(send_fut);

        let dial = tokio::select! {
            _ = cancel.cancelled() => return,
            r = &mut send_fut => Dial::Settled(settle(r).await),
            w = &mut ready_rx => match w {
                Ok(w) => Dial::Ready(w),
                // The transport dropped the body without polling it; its
                // verdict is on the way.
                Err(_) => tokio::select! {
                    _ = cancel.cancelled() => return,
                    r = &mut send_fut => Dial::Settled(settle(r).await),
                },
            },
        };

        match dial {
            Dial::Settled(resp) if is_server_error(resp.status()) => {
                log::debug!(
                    "put to {} rejected with {}, trying handoff",
                    d.host(),
                    resp.status()
                );
                last_failure = Some(resp);
                dev = handoffs.next();
            }
            Dial::Settled(resp) => {
                let _ = start_tx.send(StartOutcome::Settled).await;
                drop(start_tx);
                deliver(&resp_tx, resp, &cancel).await;
                return;
            }
            Dial::Ready(w) => {
                let _ = start_tx.send(StartOutcome::Ready(w)).await;
                drop(start_tx);

                tokio::select! {
                    _ = cancel.cancelled() => {}
                    r = &mut send_fut => {
                        deliver(&resp_tx, settle(r).await, &cancel).await;
                    }
                    _ = tokio::time::sleep(POST_PUT_TIMEOUT) => {
                        // Aborting the in-flight request closes the
                        // connection; the dispatcher stops hearing from us.
                        log::warn!("put to {} timed out awaiting final status", d.host());
                    }
                }
                return;
            }
        }
    }

    let _ = start_tx.send(StartOutcome::Failed).await;
    drop(start_tx);
    if let Some(resp) = last_failure {
        deliver(&resp_tx, resp, &cancel).await;
    }
}

/// Buffer a dial's outcome so the response owns no live socket.
async fn settle(r: Result<HttpResponse>) -> HttpResponse {
    match r {
        Ok(live) => capture(live).await,
        Err(err) => synthetic(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
    }
}
