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

use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use http::header::EXPECT;
use http::HeaderMap;
use http::HeaderValue;
use http::Method;
use http::Request;
use http::StatusCode;

use super::core::add_update_headers;
use super::core::backend_url;
use super::core::ProxyCore;
use super::core::H_CONTAINER_PARTITION;
use super::core::H_POLICY_INDEX;
use crate::dispatch::first_response;
use crate::dispatch::put_response;
use crate::dispatch::quorum_response;
use crate::raw::build_query;
use crate::raw::extend_headers;
use crate::raw::new_request_build_error;
use crate::raw::synthetic;
use crate::raw::BytesStream;
use crate::raw::HttpResponse;
use crate::raw::RequestBody;
use crate::ring::Ring;
use crate::types::Error;
use crate::types::ErrorKind;
use crate::types::Result;

/// Object operations for one `(account, container)` pair.
///
/// Resolving the container's storage policy (and with it the object ring)
/// can fail; the facade then substitutes [`ErroringObjectClient`] so the
/// failure surfaces uniformly on every object call of the request.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    async fn put_object(&self, obj: &str, headers: &HeaderMap, source: BytesStream)
        -> HttpResponse;
    async fn post_object(&self, obj: &str, headers: &HeaderMap) -> HttpResponse;
    async fn get_object(&self, obj: &str, headers: &HeaderMap) -> HttpResponse;
    async fn grep_object(&self, obj: &str, search: &str) -> HttpResponse;
    async fn head_object(&self, obj: &str, headers: &HeaderMap) -> HttpResponse;
    async fn delete_object(&self, obj: &str, headers: &HeaderMap) -> HttpResponse;
    fn object_ring(&self) -> Result<Arc<dyn Ring>>;
}

/// Stand-in client installed when container info or the object ring could
/// not be resolved. Every call reports the original failure as a 500.
pub struct ErroringObjectClient {
    body: String,
}

impl ErroringObjectClient {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    fn respond(&self) -> HttpResponse {
        synthetic(StatusCode::INTERNAL_SERVER_ERROR, &self.body)
    }
}

#[async_trait]
impl ObjectClient for ErroringObjectClient {
    async fn put_object(
        &self,
        _obj: &str,
        _headers: &HeaderMap,
        _source: BytesStream,
    ) -> HttpResponse {
        self.respond()
    }

    async fn post_object(&self, _obj: &str, _headers: &HeaderMap) -> HttpResponse {
        self.respond()
    }

    async fn get_object(&self, _obj: &str, _headers: &HeaderMap) -> HttpResponse {
        self.respond()
    }

    async fn grep_object(&self, _obj: &str, _search: &str) -> HttpResponse {
        self.respond()
    }

    async fn head_object(&self, _obj: &str, _headers: &HeaderMap) -> HttpResponse {
        self.respond()
    }

    async fn delete_object(&self, _obj: &str, _headers: &HeaderMap) -> HttpResponse {
        self.respond()
    }

    fn object_ring(&self) -> Result<Arc<dyn Ring>> {
        Err(Error::new(ErrorKind::NotFound, self.body.clone()))
    }
}

/// The regular object client: bound to one container's storage policy and
/// object ring.
pub struct StandardObjectClient {
    core: Arc<ProxyCore>,
    account: String,
    container: String,
    policy: i32,
    object_ring: Arc<dyn Ring>,
}

impl StandardObjectClient {
    pub fn new(
        core: Arc<ProxyCore>,
        account: &str,
        container: &str,
        policy: i32,
        object_ring: Arc<dyn Ring>,
    ) -> Self {
        Self {
            core,
            account: account.to_string(),
            container: container.to_string(),
            policy,
            object_ring,
        }
    }

    fn container_placement(&self) -> (u64, Vec<crate::ring::Device>) {
        let partition = self
            .core
            .container_ring
            .partition_for(&self.account, Some(&self.container), None);
        let devices = self.core.container_ring.primary_nodes(partition);
        (partition, devices)
    }
}

#[async_trait]
impl ObjectClient for StandardObjectClient {
    async fn put_object(
        &self,
        obj: &str,
        headers: &HeaderMap,
        source: BytesStream,
    ) -> HttpResponse {
        let object_replica_count = self.object_ring.replica_count();
        let partition = self
            .object_ring
            .partition_for(&self.account, Some(&self.container), Some(obj));
        let (container_partition, container_devices) = self.container_placement();

        let account = self.account.clone();
        let container = self.container.clone();
        let obj = obj.to_string();
        let headers = headers.clone();
        let policy = self.policy;
        put_response(
            &self.core.client,
            self.object_ring.as_ref(),
            partition,
            source,
            move |index, dev, body| {
                let url = backend_url(dev, partition, &account, Some(&container), Some(&obj), "");
                let mut req = Request::builder()
                    .method(Method::PUT)
                    .uri(&url)
                    .body(body)
                    .map_err(new_request_build_error)?;
                let h = req.headers_mut();
                h.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
                extend_headers(h, &headers);
                h.insert(H_POLICY_INDEX, HeaderValue::from(policy));
                h.insert(H_CONTAINER_PARTITION, HeaderValue::from(container_partition));
                add_update_headers(
                    "x-container",
                    h,
                    &container_devices,
                    index,
                    object_replica_count,
                );
                // Backends that can't take this object (full disk, bad
                // placement) get to say so before any body is sent.
                h.insert(EXPECT, HeaderValue::from_static("100-Continue"));
                Ok(req)
            },
        )
        .await
    }

    async fn post_object(&self, obj: &str, headers: &HeaderMap) -> HttpResponse {
        let object_replica_count = self.object_ring.replica_count();
        let partition = self
            .object_ring
            .partition_for(&self.account, Some(&self.container), Some(obj));
        let (container_partition, container_devices) = self.container_placement();

        let account = self.account.clone();
        let container = self.container.clone();
        let obj = obj.to_string();
        let headers = headers.clone();
        let policy = self.policy;
        quorum_response(
            &self.core.client,
            self.object_ring.as_ref(),
            partition,
            move |index, dev| {
                let url = backend_url(dev, partition, &account, Some(&container), Some(&obj), "");
                let mut req = Request::builder()
                    .method(Method::POST)
                    .uri(&url)
                    .body(RequestBody::Empty)
                    .map_err(new_request_build_error)?;
                let h = req.headers_mut();
                extend_headers(h, &headers);
                h.insert(H_POLICY_INDEX, HeaderValue::from(policy));
                h.insert(H_CONTAINER_PARTITION, HeaderValue::from(container_partition));
                add_update_headers(
                    "x-container",
                    h,
                    &container_devices,
                    index,
                    object_replica_count,
                );
                Ok(req)
            },
        )
        .await
    }

    async fn get_object(&self, obj: &str, headers: &HeaderMap) -> HttpResponse {
        let partition = self
            .object_ring
            .partition_for(&self.account, Some(&self.container), Some(obj));
        first_response(
            &self.core.client,
            self.object_ring.as_ref(),
            partition,
            |dev| {
                let url = backend_url(
                    dev,
                    partition,
                    &self.account,
                    Some(&self.container),
                    Some(obj),
                    "",
                );
                let mut req = Request::builder()
                    .method(Method::GET)
                    .uri(&url)
                    .body(RequestBody::Empty)
                    .map_err(new_request_build_error)?;
                extend_headers(req.headers_mut(), headers);
                req.headers_mut()
                    .insert(H_POLICY_INDEX, HeaderValue::from(self.policy));
                Ok(req)
            },
        )
        .await
    }

    async fn grep_object(&self, obj: &str, search: &str) -> HttpResponse {
        let partition = self
            .object_ring
            .partition_for(&self.account, Some(&self.container), Some(obj));
        let query = build_query(&[("e", search.to_string())]);
        first_response(
            &self.core.client,
            self.object_ring.as_ref(),
            partition,
            |dev| {
                let url = backend_url(
                    dev,
                    partition,
                    &self.account,
                    Some(&self.container),
                    Some(obj),
                    &query,
                );
                let method = Method::from_bytes(b"GREP").map_err(|err| {
                    Error::new(ErrorKind::Unexpected, "building grep method").set_source(err)
                })?;
                let mut req = Request::builder()
                    .method(method)
                    .uri(&url)
                    .body(RequestBody::Empty)
                    .map_err(new_request_build_error)?;
                req.headers_mut()
                    .insert(H_POLICY_INDEX, HeaderValue::from(self.policy));
                Ok(req)
            },
        )
        .await
    }

    async fn head_object(&self, obj: &str, headers: &HeaderMap) -> HttpResponse {
        let partition = self
            .object_ring
            .partition_for(&self.account, Some(&self.container), Some(obj));
        first_response(
            &self.core.client,
            self.object_ring.as_ref(),
            partition,
            |dev| {
                let url = backend_url(
                    dev,
                    partition,
                    &self.account,
                    Some(&self.container),
                    Some(obj),
                    "",
                );
                let mut req = Request::builder()
                    .method(Method::HEAD)
                    .uri(&url)
                    .body(RequestBody::Empty)
                    .map_err(new_request_build_error)?;
                extend_headers(req.headers_mut(), headers);
                req.headers_mut()
                    .insert(H_POLICY_INDEX, HeaderValue::from(self.policy));
                Ok(req)
            },
        )
        .await
    }

    async fn delete_object(&self, obj: &str, headers: &HeaderMap) -> HttpResponse {
        let object_replica_count = self.object_ring.replica_count();
        let partition = self
            .object_ring
            .partition_for(&self.account, Some(&self.container), Some(obj));
        let (container_partition, container_devices) = self.container_placement();

        let account = self.account.clone();
        let container = self.container.clone();
        let obj = obj.to_string();
        let headers = headers.clone();
        let policy = self.policy;
        quorum_response(
            &self.core.client,
            self.object_ring.as_ref(),
            partition,
            move |index, dev| {
                let url = backend_url(dev, partition, &account, Some(&container), Some(&obj), "");
                let mut req = Request::builder()
                    .method(Method::DELETE)
                    .uri(&url)
                    .body(RequestBody::Empty)
                    .map_err(new_request_build_error)?;
                let h = req.headers_mut();
                extend_headers(h, &headers);
                if !h.contains_key(CONTENT_TYPE) {
                    h.insert(
                        CONTENT_TYPE,
                        HeaderValue::from_static("application/octet-stream"),
                    );
                }
                h.insert(H_POLICY_INDEX, HeaderValue::from(policy));
                h.insert(H_CONTAINER_PARTITION, HeaderValue::from(container_partition));
                add_update_headers(
                    "x-container",
                    h,
                    &container_devices,
                    index,
                    object_replica_count,
                );
                Ok(req)
            },
        )
        .await
    }

    fn object_ring(&self) -> Result<Arc<dyn Ring>> {
        Ok(self.object_ring.clone())
    }
}
