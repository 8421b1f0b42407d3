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
use std::sync::Arc;

use http::HeaderMap;
use http::HeaderName;
use http::HeaderValue;
use http::Method;
use http::Request;
use http::StatusCode;

use crate::dispatch::first_response;
use crate::dispatch::quorum_response;
use crate::raw::build_query;
use crate::raw::extend_headers;
use crate::raw::new_request_build_error;
use crate::raw::percent_encode_path;
use crate::raw::synthetic;
use crate::raw::HttpClient;
use crate::raw::HttpResponse;
use crate::raw::RequestBody;
use crate::ring::Device;
use crate::ring::Ring;
use crate::ring::RingLoader;
use crate::types::PolicyList;
use crate::types::Result;

pub(crate) const H_POLICY_INDEX: &str = "x-backend-storage-policy-index";
pub(crate) const H_POLICY_DEFAULT: &str = "x-backend-storage-policy-default";
pub(crate) const H_ACCOUNT_PARTITION: &str = "x-account-partition";
pub(crate) const H_CONTAINER_PARTITION: &str = "x-container-partition";
pub(crate) const H_STORAGE_POLICY: &str = "x-storage-policy";

/// The RPC layer: owns the rings, the policies and the transport, and knows
/// how to phrase every account and container operation as a dispatch over
/// backend servers. Object operations live on
/// [`StandardObjectClient`](super::object::StandardObjectClient), which is
/// resolved per container through its storage policy.
pub struct ProxyCore {
    pub policies: PolicyList,
    pub client: HttpClient,
    pub account_ring: Arc<dyn Ring>,
    pub container_ring: Arc<dyn Ring>,
    pub ring_loader: Arc<dyn RingLoader>,
}

impl Debug for ProxyCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyCore")
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}

/// `http://{ip}:{port}/{device}/{partition}/{account}[/{container}[/{object}]][?query]`
pub(crate) fn backend_url(
    dev: &Device,
    partition: u64,
    account: &str,
    container: Option<&str>,
    object: Option<&str>,
    query: &str,
) -> String {
    let mut url = format!(
        "http://{}:{}/{}/{}/{}",
        dev.ip,
        dev.port,
        dev.device,
        partition,
        percent_encode_path(account)
    );
    if let Some(container) = container {
        url.push('/');
        url.push_str(&percent_encode_path(container));
        if let Some(object) = object {
            url.push('/');
            url.push_str(&percent_encode_path(object));
        }
    }
    url.push_str(query);
    url
}

/// Stripe listing servers over the workers of an object or container write.
///
/// Worker `index` is told about devices `index, index + replicas, ...` so
/// each backend notifies a distinct slice of the listing servers and no
/// update is delivered twice.
pub(crate) fn add_update_headers(
    prefix: &str,
    headers: &mut HeaderMap,
    devices: &[Device],
    index: usize,
    replicas: usize,
) {
    if index >= devices.len() || replicas == 0 {
        return;
    }
    let mut hosts = Vec::new();
    let mut devs = Vec::new();
    let mut i = index;
    while i < devices.len() {
        hosts.push(devices[i].host());
        devs.push(devices[i].device.clone());
        i += replicas;
    }
    let host_name = HeaderName::from_bytes(format!("{prefix}-host").as_bytes());
    let device_name = HeaderName::from_bytes(format!("{prefix}-device").as_bytes());
    if let (Ok(host_name), Ok(device_name)) = (host_name, device_name) {
        if let Ok(v) = HeaderValue::from_str(&hosts.join(",")) {
            headers.insert(host_name, v);
        }
        if let Ok(v) = HeaderValue::from_str(&devs.join(",")) {
            headers.insert(device_name, v);
        }
    }
}

impl ProxyCore {
    pub fn new(
        policies: PolicyList,
        account_ring: Arc<dyn Ring>,
        container_ring: Arc<dyn Ring>,
        ring_loader: Arc<dyn RingLoader>,
    ) -> Result<Self> {
        Ok(Self::with_client(
            policies,
            account_ring,
            container_ring,
            ring_loader,
            HttpClient::new()?,
        ))
    }

    /// Build a core over a caller-supplied transport.
    pub fn with_client(
        policies: PolicyList,
        account_ring: Arc<dyn Ring>,
        container_ring: Arc<dyn Ring>,
        ring_loader: Arc<dyn RingLoader>,
        client: HttpClient,
    ) -> Self {
        log::debug!("proxy core built with policies: {policies:?}");
        Self {
            policies,
            client,
            account_ring,
            container_ring,
            ring_loader,
        }
    }

    pub async fn put_account(&self, account: &str, headers: &HeaderMap) -> HttpResponse {
        let partition = self.account_ring.partition_for(account, None, None);
        let account = account.to_string();
        let headers = headers.clone();
        quorum_response(
            &self.client,
            self.account_ring.as_ref(),
            partition,
            move |_index, dev| {
                let url = backend_url(dev, partition, &account, None, None, "");
                let mut req = Request::builder()
                    .method(Method::PUT)
                    .uri(&url)
                    .body(RequestBody::Empty)
                    .map_err(new_request_build_error)?;
                extend_headers(req.headers_mut(), &headers);
                Ok(req)
            },
        )
        .await
    }

    pub async fn post_account(&self, account: &str, headers: &HeaderMap) -> HttpResponse {
        let partition = self.account_ring.partition_for(account, None, None);
        let account = account.to_string();
        let headers = headers.clone();
        quorum_response(
            &self.client,
            self.account_ring.as_ref(),
            partition,
            move |_index, dev| {
                let url = backend_url(dev, partition, &account, None, None, "");
                let mut req = Request::builder()
                    .method(Method::POST)
                    .uri(&url)
                    .body(RequestBody::Empty)
                    .map_err(new_request_build_error)?;
                extend_headers(req.headers_mut(), &headers);
                Ok(req)
            },
        )
        .await
    }

    pub async fn get_account(
        &self,
        account: &str,
        options: &[(&str, String)],
        headers: &HeaderMap,
    ) -> HttpResponse {
        let partition = self.account_ring.partition_for(account, None, None);
        let query = build_query(options);
        first_response(
            &self.client,
            self.account_ring.as_ref(),
            partition,
            |dev| {
                let url = backend_url(dev, partition, account, None, None, &query);
                let mut req = Request::builder()
                    .method(Method::GET)
                    .uri(&url)
                    .body(RequestBody::Empty)
                    .map_err(new_request_build_error)?;
                extend_headers(req.headers_mut(), headers);
                Ok(req)
            },
        )
        .await
    }

    pub async fn head_account(&self, account: &str, headers: &HeaderMap) -> HttpResponse {
        let partition = self.account_ring.partition_for(account, None, None);
        first_response(
            &self.client,
            self.account_ring.as_ref(),
            partition,
            |dev| {
                let url = backend_url(dev, partition, account, None, None, "");
                let mut req = Request::builder()
                    .method(Method::HEAD)
                    .uri(&url)
                    .body(RequestBody::Empty)
                    .map_err(new_request_build_error)?;
                extend_headers(req.headers_mut(), headers);
                Ok(req)
            },
        )
        .await
    }

    pub async fn delete_account(&self, account: &str, headers: &HeaderMap) -> HttpResponse {
        let partition = self.account_ring.partition_for(account, None, None);
        let account = account.to_string();
        let headers = headers.clone();
        quorum_response(
            &self.client,
            self.account_ring.as_ref(),
            partition,
            move |_index, dev| {
                let url = backend_url(dev, partition, &account, None, None, "");
                let mut req = Request::builder()
                    .method(Method::DELETE)
                    .uri(&url)
                    .body(RequestBody::Empty)
                    .map_err(new_request_build_error)?;
                extend_headers(req.headers_mut(), &headers);
                Ok(req)
            },
        )
        .await
    }

    /// Create a container.
    ///
    /// `X-Storage-Policy`, when present, must name a known, non-deprecated
    /// policy; its index rides to the backends along with the cluster
    /// default, and the account servers to notify are striped across the
    /// container replicas.
    pub async fn put_container(
        &self,
        account: &str,
        container: &str,
        headers: &HeaderMap,
    ) -> HttpResponse {
        let partition = self
            .container_ring
            .partition_for(account, Some(container), None);
        let account_partition = self.account_ring.partition_for(account, None, None);
        let account_devices = self.account_ring.primary_nodes(account_partition);
        let container_replica_count = self.container_ring.replica_count();

        let default_index = self.policies.default_index();
        let mut policy_index = default_index;
        if let Some(name) = headers
            .get(H_STORAGE_POLICY)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
        {
            match self.policies.by_name(name) {
                None => {
                    return synthetic(
                        StatusCode::BAD_REQUEST,
                        &format!("Invalid X-Storage-Policy \"{name}\""),
                    )
                }
                Some(p) if p.deprecated => {
                    return synthetic(
                        StatusCode::BAD_REQUEST,
                        &format!("Storage Policy \"{name}\" is deprecated"),
                    )
                }
                Some(p) => policy_index = p.index,
            }
        }

        let account = account.to_string();
        let container = container.to_string();
        let headers = headers.clone();
        quorum_response(
            &self.client,
            self.container_ring.as_ref(),
            partition,
            move |index, dev| {
                let url = backend_url(dev, partition, &account, Some(&container), None, "");
                let mut req = Request::builder()
                    .method(Method::PUT)
                    .uri(&url)
                    .body(RequestBody::Empty)
                    .map_err(new_request_build_error)?;
                let h = req.headers_mut();
                extend_headers(h, &headers);
                h.insert(H_POLICY_INDEX, HeaderValue::from(policy_index));
                h.insert(H_POLICY_DEFAULT, HeaderValue::from(default_index));
                h.insert(H_ACCOUNT_PARTITION, HeaderValue::from(account_partition));
                add_update_headers(
                    "x-account",
                    h,
                    &account_devices,
                    index,
                    container_replica_count,
                );
                Ok(req)
            },
        )
        .await
    }

    pub async fn post_container(
        &self,
        account: &str,
        container: &str,
        headers: &HeaderMap,
    ) -> HttpResponse {
        let partition = self
            .container_ring
            .partition_for(account, Some(container), None);
        let account = account.to_string();
        let container = container.to_string();
        let headers = headers.clone();
        quorum_response(
            &self.client,
            self.container_ring.as_ref(),
            partition,
            move |_index, dev| {
                let url = backend_url(dev, partition, &account, Some(&container), None, "");
                let mut req = Request::builder()
                    .method(Method::POST)
                    .uri(&url)
                    .body(RequestBody::Empty)
                    .map_err(new_request_build_error)?;
                extend_headers(req.headers_mut(), &headers);
                Ok(req)
            },
        )
        .await
    }

    pub async fn get_container(
        &self,
        account: &str,
        container: &str,
        options: &[(&str, String)],
        headers: &HeaderMap,
    ) -> HttpResponse {
        let partition = self
            .container_ring
            .partition_for(account, Some(container), None);
        let query = build_query(options);
        first_response(
            &self.client,
            self.container_ring.as_ref(),
            partition,
            |dev| {
                let url = backend_url(dev, partition, account, Some(container), None, &query);
                let mut req = Request::builder()
                    .method(Method::GET)
                    .uri(&url)
                    .body(RequestBody::Empty)
                    .map_err(new_request_build_error)?;
                extend_headers(req.headers_mut(), headers);
                Ok(req)
            },
        )
        .await
    }

    pub async fn head_container(
        &self,
        account: &str,
        container: &str,
        headers: &HeaderMap,
    ) -> HttpResponse {
        let partition = self
            .container_ring
            .partition_for(account, Some(container), None);
        first_response(
            &self.client,
            self.container_ring.as_ref(),
            partition,
            |dev| {
                let url = backend_url(dev, partition, account, Some(container), None, "");
                let mut req = Request::builder()
                    .method(Method::HEAD)
                    .uri(&url)
                    .body(RequestBody::Empty)
                    .map_err(new_request_build_error)?;
                extend_headers(req.headers_mut(), headers);
                Ok(req)
            },
        )
        .await
    }

    pub async fn delete_container(
        &self,
        account: &str,
        container: &str,
        headers: &HeaderMap,
    ) -> HttpResponse {
        let partition = self
            .container_ring
            .partition_for(account, Some(container), None);
        let account_partition = self.account_ring.partition_for(account, None, None);
        let account_devices = self.account_ring.primary_nodes(account_partition);
        let container_replica_count = self.container_ring.replica_count();

        let account = account.to_string();
        let container = container.to_string();
        let headers = headers.clone();
        quorum_response(
            &self.client,
            self.container_ring.as_ref(),
            partition,
            move |index, dev| {
                let url = backend_url(dev, partition, &account, Some(&container), None, "");
                let mut req = Request::builder()
                    .method(Method::DELETE)
                    .uri(&url)
                    .body(RequestBody::Empty)
                    .map_err(new_request_build_error)?;
                let h = req.headers_mut();
                extend_headers(h, &headers);
                h.insert(H_ACCOUNT_PARTITION, HeaderValue::from(account_partition));
                add_update_headers(
                    "x-account",
                    h,
                    &account_devices,
                    index,
                    container_replica_count,
                );
                Ok(req)
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(ip: &str, port: u16, device: &str) -> Device {
        Device {
            ip: ip.to_string(),
            port,
            device: device.to_string(),
        }
    }

    #[test]
    fn test_backend_url() {
        let d = dev("10.0.0.1", 6000, "sda");
        assert_eq!(
            backend_url(&d, 17, "AUTH test", None, None, ""),
            "http://10.0.0.1:6000/sda/17/AUTH%20test"
        );
        assert_eq!(
            backend_url(&d, 17, "a", Some("c"), Some("o/with/slashes"), "?format=json"),
            "http://10.0.0.1:6000/sda/17/a/c/o/with/slashes?format=json"
        );
    }

    #[test]
    fn test_add_update_headers_stripes_devices() {
        let devices = vec![
            dev("10.0.0.1", 6001, "sda"),
            dev("10.0.0.2", 6001, "sdb"),
            dev("10.0.0.3", 6001, "sdc"),
            dev("10.0.0.4", 6001, "sdd"),
            dev("10.0.0.5", 6001, "sde"),
        ];

        let mut headers = HeaderMap::new();
        add_update_headers("x-container", &mut headers, &devices, 1, 3);
        assert_eq!(
            headers["x-container-host"],
            "10.0.0.2:6001,10.0.0.5:6001"
        );
        assert_eq!(headers["x-container-device"], "sdb,sde");
    }

    #[test]
    fn test_add_update_headers_index_past_devices() {
        let devices = vec![dev("10.0.0.1", 6001, "sda")];
        let mut headers = HeaderMap::new();
        add_update_headers("x-container", &mut headers, &devices, 2, 3);
        assert!(headers.is_empty());
    }
}
