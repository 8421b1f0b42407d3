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

use std::fmt::Debug;
use std::fmt::Formatter;
use std::mem;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use http::Request;
use http::Response;

use super::body::RequestBody;
use super::response::HttpResponse;
use super::response::ResponseBody;
use crate::types::Error;
use crate::types::ErrorKind;
use crate::types::Result;

/// Dial timeout for new backend connections.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// TCP keepalive interval for pooled backend connections.
pub const TCP_KEEPALIVE: Duration = Duration::from_secs(5);
/// Overall per-request deadline. Generous on purpose: a single large object
/// PUT may legitimately stream for a very long time.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(120 * 60);

/// The transport seam under [`HttpClient`].
///
/// Production uses [`ReqwestSender`]; tests inject scripted transports,
/// including ones that model `Expect: 100-continue` deferral by not polling
/// the request body before answering.
#[async_trait]
pub trait HttpSend: Send + Sync + 'static {
    async fn send(&self, req: Request<RequestBody>) -> Result<HttpResponse>;
}

/// HttpClient shared by every dispatcher of one proxy client.
///
/// Cloning is cheap and all clones share the same connection pool.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<dyn HttpSend>,
}

/// We don't want users to know details about our clients.
impl Debug for HttpClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient").finish()
    }
}

impl HttpClient {
    /// Create a new http client with the default transport.
    pub fn new() -> Result<Self> {
        Ok(Self::with(ReqwestSender::new()?))
    }

    /// Create a http client over a custom transport.
    pub fn with(sender: impl HttpSend) -> Self {
        Self {
            inner: Arc::new(sender),
        }
    }

    /// Send an http request and get the response in streaming.
    pub async fn send(&self, req: Request<RequestBody>) -> Result<HttpResponse> {
        self.inner.send(req).await
    }
}

/// The default transport, tuned for intra-cluster backend traffic.
pub struct ReqwestSender {
    client: reqwest::Client,
}

impl ReqwestSender {
    pub fn new() -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .connect_timeout(CONNECT_TIMEOUT)
            .tcp_keepalive(TCP_KEEPALIVE)
            .timeout(CLIENT_TIMEOUT)
            .build()
            .map_err(|err| {
                Error::new(ErrorKind::Unexpected, "http client build failed").set_source(err)
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpSend for ReqwestSender {
    async fn send(&self, req: Request<RequestBody>) -> Result<HttpResponse> {
        // Uri stores all string alike data in `Bytes` which means
        // the clone here is cheap.
        let uri = req.uri().clone();
        let (parts, body) = req.into_parts();

        let mut req_builder = self
            .client
            .request(
                parts.method,
                reqwest::Url::from_str(&uri.to_string()).map_err(|err| {
                    Error::new(ErrorKind::Unexpected, "request url is invalid")
                        .with_context("url", uri.to_string())
                        .set_source(err)
                })?,
            )
            .headers(parts.headers);

        req_builder = match body {
            RequestBody::Empty => req_builder.body(reqwest::Body::from("")),
            RequestBody::Bytes(bs) => req_builder.body(reqwest::Body::from(bs)),
            RequestBody::Stream(s) => req_builder.body(reqwest::Body::wrap_stream(s)),
        };

        let mut resp = req_builder.send().await.map_err(|err| {
            let is_temporary = !(
                // Builder related error should not be retried.
                err.is_builder() ||
                // Redirected too many times.
                err.is_redirect() ||
                // Status is checked by the dispatchers, never here.
                err.is_status()
            );

            let mut oerr = Error::new(ErrorKind::Unexpected, "send http request")
                .with_operation("http_util::ReqwestSender::send")
                .with_context("url", uri.to_string())
                .set_source(err);
            if is_temporary {
                oerr = oerr.set_temporary();
            }

            oerr
        })?;

        let mut hr = Response::builder().status(resp.status());

        // Swap headers directly instead of copy the entire map.
        mem::swap(hr.headers_mut().unwrap(), resp.headers_mut());

        let stream = resp.bytes_stream().map_err(move |err| {
            Error::new(ErrorKind::Unexpected, "read data from http response")
                .with_context("url", uri.to_string())
                .set_source(err)
        });

        let resp = hr
            .body(ResponseBody::Stream(Box::pin(stream)))
            .expect("response must build succeed");
        Ok(resp)
    }
}
