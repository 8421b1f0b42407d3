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

use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::types::Error;
use crate::types::ErrorKind;
use crate::types::Result;

/// Boxed stream of body chunks used for both request and response bodies.
pub type BytesStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send + 'static>>;

/// Body of an outgoing backend request.
pub enum RequestBody {
    /// An empty body.
    Empty,
    /// Body with bytes.
    Bytes(Bytes),
    /// Body with a stream, used by streaming object PUTs.
    Stream(BytesStream),
}

impl Default for RequestBody {
    fn default() -> Self {
        RequestBody::Empty
    }
}

/// Create an in-memory body pipe.
///
/// The writer half is handed to the tee-copy loop; the reader half becomes
/// the request body of one backend PUT. The channel holds at most one chunk
/// so a stalled backend exerts backpressure on the copy instead of buffering
/// the whole object.
pub fn body_pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(1);
    (PipeWriter { tx }, PipeReader { rx })
}

/// Write half of a body pipe. Dropping it ends the body stream.
pub struct PipeWriter {
    tx: mpsc::Sender<Bytes>,
}

impl PipeWriter {
    /// Deliver one chunk to the paired request body.
    ///
    /// Fails when the request side is gone, which means the backend settled
    /// (or was aborted) before consuming the full body.
    pub async fn write(&self, chunk: Bytes) -> Result<()> {
        self.tx.send(chunk).await.map_err(|_| {
            Error::new(ErrorKind::Unexpected, "body sink closed before copy finished")
                .set_temporary()
        })
    }
}

/// Read half of a body pipe.
pub struct PipeReader {
    rx: mpsc::Receiver<Bytes>,
}

impl Stream for PipeReader {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|v| v.map(Ok))
    }
}

/// A request body that publishes its paired [`PipeWriter`] the first time it
/// is polled.
///
/// A transport honoring `Expect: 100-continue` does not poll the request
/// body until the backend accepts the headers, so the first poll is the
/// moment the backend has said "go ahead". The PUT worker waits on the
/// receiving end of `ready` to learn that this request is ready for bytes.
pub struct PutBodyGate {
    inner: PipeReader,
    ready: Option<(oneshot::Sender<PipeWriter>, PipeWriter)>,
    cancel: CancellationToken,
}

impl PutBodyGate {
    pub fn new(
        inner: PipeReader,
        writer: PipeWriter,
        ready: oneshot::Sender<PipeWriter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner,
            ready: Some((ready, writer)),
            cancel,
        }
    }
}

impl Stream for PutBodyGate {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(Some(Err(Error::new(
                ErrorKind::Unexpected,
                "request was cancelled",
            ))));
        }

        if let Some((ready, writer)) = self.ready.take() {
            // The worker may already have settled on a final response, in
            // which case nobody is listening and the bytes are discarded by
            // the transport anyway.
            let _ = ready.send(writer);
        }

        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(None) if self.cancel.is_cancelled() => Poll::Ready(Some(Err(
                Error::new(ErrorKind::Unexpected, "request was cancelled"),
            ))),
            other => other,
        }
    }
}
