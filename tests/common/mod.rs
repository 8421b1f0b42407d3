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

//! Shared fixtures: a fixed-placement ring and a scripted transport.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use http::HeaderMap;
use http::Request;
use http::Response;
use http::StatusCode;
use swiftproxy::raw::HttpResponse;
use swiftproxy::raw::HttpSend;
use swiftproxy::raw::RequestBody;
use swiftproxy::raw::ResponseBody;
use swiftproxy::ring::Device;
use swiftproxy::ring::Ring;
use swiftproxy::ring::RingLoader;
use swiftproxy::types::Error;
use swiftproxy::types::ErrorKind;
use swiftproxy::types::Result;

pub fn dev(port: u16) -> Device {
    Device {
        ip: "10.88.0.1".to_string(),
        port,
        device: format!("sd{port}"),
    }
}

/// A ring with fixed placement: same partition for every key.
pub struct FakeRing {
    pub partition: u64,
    pub primaries: Vec<Device>,
    pub handoffs: Vec<Device>,
    pub replicas: usize,
}

impl FakeRing {
    pub fn new(primaries: Vec<Device>, handoffs: Vec<Device>) -> Self {
        let replicas = primaries.len();
        Self {
            partition: 17,
            primaries,
            handoffs,
            replicas,
        }
    }
}

impl Ring for FakeRing {
    fn partition_for(&self, _: &str, _: Option<&str>, _: Option<&str>) -> u64 {
        self.partition
    }

    fn primary_nodes(&self, _: u64) -> Vec<Device> {
        self.primaries.clone()
    }

    fn handoff_iter(&self, _: u64) -> Box<dyn Iterator<Item = Device> + Send> {
        Box::new(self.handoffs.clone().into_iter())
    }

    fn replica_count(&self) -> usize {
        self.replicas
    }
}

pub struct FakeLoader {
    pub ring: Arc<dyn Ring>,
}

impl RingLoader for FakeLoader {
    fn object_ring(&self, _policy_index: i32) -> Result<Arc<dyn Ring>> {
        Ok(self.ring.clone())
    }
}

pub struct FailingLoader;

impl RingLoader for FailingLoader {
    fn object_ring(&self, policy_index: i32) -> Result<Arc<dyn Ring>> {
        Err(Error::new(
            ErrorKind::NotFound,
            format!("no ring for policy {policy_index}"),
        ))
    }
}

/// What one scripted backend does with a request.
#[derive(Clone)]
pub enum Script {
    /// Answer immediately without ever polling the request body, the shape
    /// of a backend rejecting before sending `100 Continue`.
    Status(u16),
    /// Like `Status` but with response headers.
    WithHeaders(u16, Vec<(&'static str, &'static str)>),
    /// Like `Status` but with a response body.
    Body(u16, &'static str),
    /// Answer after a delay, body unpolled.
    Delayed(Duration, u16),
    /// Drain the request body (triggering the 100-continue gate), record
    /// the bytes, then answer.
    AcceptBody(u16),
    /// Fail at the transport level.
    TransportError,
    /// Never answer.
    Hang,
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub key: String,
    pub method: String,
    pub uri: String,
    pub headers: HeaderMap,
}

#[derive(Default)]
pub struct MockState {
    pub requests: Mutex<Vec<Recorded>>,
    pub bodies: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockState {
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn body_for(&self, device: &Device) -> Option<Vec<u8>> {
        self.bodies.lock().unwrap().get(&device.host()).cloned()
    }

    pub fn requests_for(&self, device: &Device) -> Vec<Recorded> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.key == device.host())
            .cloned()
            .collect()
    }
}

/// Scripted transport: routes by `ip:port`.
pub struct MockSend {
    scripts: HashMap<String, Script>,
    pub state: Arc<MockState>,
}

impl MockSend {
    pub fn new(scripts: Vec<(Device, Script)>) -> Self {
        Self {
            scripts: scripts
                .into_iter()
                .map(|(dev, script)| (dev.host(), script))
                .collect(),
            state: Arc::new(MockState::default()),
        }
    }
}

fn respond(code: u16, headers: &[(&'static str, &'static str)], body: &'static str) -> Result<HttpResponse> {
    let mut builder = Response::builder().status(StatusCode::from_u16(code).unwrap());
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    Ok(builder
        .body(ResponseBody::Bytes(Bytes::from_static(body.as_bytes())))
        .expect("mock response must build"))
}

#[async_trait]
impl HttpSend for MockSend {
    async fn send(&self, req: Request<RequestBody>) -> Result<HttpResponse> {
        let uri = req.uri().clone();
        let key = format!(
            "{}:{}",
            uri.host().unwrap_or_default(),
            uri.port_u16().unwrap_or(80)
        );
        let (parts, body) = req.into_parts();
        self.state.requests.lock().unwrap().push(Recorded {
            key: key.clone(),
            method: parts.method.to_string(),
            uri: uri.to_string(),
            headers: parts.headers,
        });

        match self.scripts.get(&key).cloned() {
            None => respond(404, &[], ""),
            Some(Script::Status(code)) => respond(code, &[], ""),
            Some(Script::WithHeaders(code, headers)) => respond(code, &headers, ""),
            Some(Script::Body(code, body)) => respond(code, &[], body),
            Some(Script::Delayed(delay, code)) => {
                tokio::time::sleep(delay).await;
                respond(code, &[], "")
            }
            Some(Script::TransportError) => Err(Error::new(
                ErrorKind::Unexpected,
                "connection refused",
            )
            .set_temporary()),
            Some(Script::Hang) => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
            Some(Script::AcceptBody(code)) => {
                let mut collected = Vec::new();
                match body {
                    RequestBody::Empty => {}
                    RequestBody::Bytes(bs) => collected.extend_from_slice(&bs),
                    RequestBody::Stream(mut s) => {
                        while let Some(chunk) = s.next().await {
                            collected.extend_from_slice(&chunk?);
                        }
                    }
                }
                self.state
                    .bodies
                    .lock()
                    .unwrap()
                    .entry(key)
                    .or_default()
                    .extend_from_slice(&collected);
                respond(code, &[], "")
            }
        }
    }
}

/// A one-chunk-at-a-time source body for PUT tests.
pub fn source_body(chunks: &[&'static str]) -> swiftproxy::raw::BytesStream {
    let chunks: Vec<Result<Bytes>> = chunks
        .iter()
        .map(|c| Ok(Bytes::from_static(c.as_bytes())))
        .collect();
    Box::pin(futures::stream::iter(chunks))
}
