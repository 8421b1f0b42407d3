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

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use bytes::Bytes;
use http::HeaderMap;
use http::Response;
use http::StatusCode;

use super::cache::SharedCache;
use super::cache::CONTAINER_INFO_TTL;
use super::core::ProxyCore;
use super::object::ErroringObjectClient;
use super::object::ObjectClient;
use super::object::StandardObjectClient;
use crate::raw::new_json_deserialize_error;
use crate::raw::synthetic;
use crate::raw::BytesStream;
use crate::raw::HttpResponse;
use crate::raw::ResponseBody;
use crate::ring::Ring;
use crate::types::ContainerInfo;
use crate::types::ContainerRecord;
use crate::types::Error;
use crate::types::ErrorKind;
use crate::types::ObjectRecord;
use crate::types::Result;

/// Pagination and filtering options for account and container listings.
#[derive(Debug, Clone, Default)]
pub struct ListingOptions {
    pub marker: String,
    pub end_marker: String,
    /// `0` means no explicit limit.
    pub limit: usize,
    pub prefix: String,
    pub delimiter: String,
    pub reverse: bool,
}

impl ListingOptions {
    fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut options = vec![
            ("format", "json".to_string()),
            ("marker", self.marker.clone()),
            ("end_marker", self.end_marker.clone()),
            ("prefix", self.prefix.clone()),
            ("delimiter", self.delimiter.clone()),
        ];
        if self.limit != 0 {
            options.push(("limit", self.limit.to_string()));
        }
        if self.reverse {
            options.push(("reverse", "true".to_string()));
        }
        options
    }
}

/// The proxy-facing client: RPC layer plus the two-tier container-info
/// cache and its write-through invalidation.
///
/// The local tier lives for this client's lifetime; one instance per
/// proxied request is the intended shape. The shared tier outlives requests
/// and is best-effort.
pub struct ProxyClient {
    core: Arc<ProxyCore>,
    shared: Option<Arc<dyn SharedCache>>,
    local: Mutex<HashMap<String, Arc<ContainerInfo>>>,
}

fn container_info_key(account: &str, container: &str) -> String {
    format!("container/{account}/{container}")
}

impl ProxyClient {
    pub fn new(core: Arc<ProxyCore>, shared: Option<Arc<dyn SharedCache>>) -> Self {
        Self {
            core,
            shared,
            local: Mutex::new(HashMap::new()),
        }
    }

    pub fn core(&self) -> &Arc<ProxyCore> {
        &self.core
    }

    /// Pre-populate the local tier.
    ///
    /// Mostly for tests: seeding [`crate::types::NIL_CONTAINER_INFO`] forces
    /// the "no container info" path without touching a backend.
    pub fn seed_container_info(&self, account: &str, container: &str, info: Arc<ContainerInfo>) {
        self.local
            .lock()
            .expect("local container info cache poisoned")
            .insert(container_info_key(account, container), info);
    }

    async fn invalidate_container_info(&self, account: &str, container: &str) {
        let key = container_info_key(account, container);
        self.local
            .lock()
            .expect("local container info cache poisoned")
            .remove(&key);
        if let Some(shared) = &self.shared {
            shared.delete(&key).await;
        }
    }

    /// Two-tier container info lookup: local map, then the shared cache,
    /// then a HEAD against the container servers which also refills the
    /// shared tier.
    pub async fn get_container_info(
        &self,
        account: &str,
        container: &str,
    ) -> Result<Arc<ContainerInfo>> {
        let key = container_info_key(account, container);

        let mut info = self
            .local
            .lock()
            .expect("local container info cache poisoned")
            .get(&key)
            .cloned();

        if info.is_none() {
            if let Some(shared) = &self.shared {
                info = shared
                    .get(&key)
                    .await
                    .and_then(|bs| serde_json::from_slice::<ContainerInfo>(&bs).ok())
                    .map(Arc::new);
            }
        }

        if info.is_none() {
            let resp = self
                .core
                .head_container(account, container, &HeaderMap::new())
                .await;
            let status = resp.status();
            if !status.is_success() {
                return Err(Error::new(
                    ErrorKind::Unexpected,
                    format!(
                        "{} error retrieving info for container {}/{}",
                        status.as_u16(),
                        account,
                        container
                    ),
                ));
            }
            let ci = ContainerInfo::from_headers(resp.headers()).map_err(|err| {
                err.with_operation("ProxyClient::get_container_info")
                    .with_context("container", format!("{account}/{container}"))
            })?;
            let ci = Arc::new(ci);
            if let Some(shared) = &self.shared {
                if let Ok(encoded) = serde_json::to_vec(ci.as_ref()) {
                    shared
                        .set(&key, Bytes::from(encoded), CONTAINER_INFO_TTL)
                        .await;
                }
            }
            info = Some(ci);
        }

        let info = info.expect("container info filled above");
        if ContainerInfo::is_nil(&info) {
            return Err(Error::new(ErrorKind::NotFound, "no container info for testing"));
        }
        Ok(info)
    }

    async fn object_client(&self, account: &str, container: &str) -> Box<dyn ObjectClient> {
        let ci = match self.get_container_info(account, container).await {
            Ok(ci) => ci,
            Err(err) => {
                log::debug!("resolving object client for {account}/{container}: {err}");
                return Box::new(ErroringObjectClient::new(
                    "Could not retrieve container information.",
                ));
            }
        };
        match self.core.ring_loader.object_ring(ci.storage_policy_index) {
            Ok(ring) => Box::new(StandardObjectClient::new(
                self.core.clone(),
                account,
                container,
                ci.storage_policy_index,
                ring,
            )),
            Err(err) => {
                log::warn!(
                    "loading object ring for policy {}: {err}",
                    ci.storage_policy_index
                );
                Box::new(ErroringObjectClient::new(format!(
                    "Could not load object ring for policy {}.",
                    ci.storage_policy_index
                )))
            }
        }
    }

    pub async fn put_account(&self, account: &str, headers: &HeaderMap) -> HttpResponse {
        self.core.put_account(account, headers).await
    }

    pub async fn post_account(&self, account: &str, headers: &HeaderMap) -> HttpResponse {
        self.core.post_account(account, headers).await
    }

    pub async fn get_account(
        &self,
        account: &str,
        options: &[(&str, String)],
        headers: &HeaderMap,
    ) -> HttpResponse {
        self.core.get_account(account, options, headers).await
    }

    pub async fn head_account(&self, account: &str, headers: &HeaderMap) -> HttpResponse {
        self.core.head_account(account, headers).await
    }

    pub async fn delete_account(&self, account: &str, headers: &HeaderMap) -> HttpResponse {
        self.core.delete_account(account, headers).await
    }

    pub async fn put_container(
        &self,
        account: &str,
        container: &str,
        headers: &HeaderMap,
    ) -> HttpResponse {
        let resp = self.core.put_container(account, container, headers).await;
        self.invalidate_container_info(account, container).await;
        resp
    }

    pub async fn post_container(
        &self,
        account: &str,
        container: &str,
        headers: &HeaderMap,
    ) -> HttpResponse {
        let resp = self.core.post_container(account, container, headers).await;
        self.invalidate_container_info(account, container).await;
        resp
    }

    pub async fn get_container(
        &self,
        account: &str,
        container: &str,
        options: &[(&str, String)],
        headers: &HeaderMap,
    ) -> HttpResponse {
        self.core
            .get_container(account, container, options, headers)
            .await
    }

    pub async fn head_container(
        &self,
        account: &str,
        container: &str,
        headers: &HeaderMap,
    ) -> HttpResponse {
        self.core.head_container(account, container, headers).await
    }

    pub async fn delete_container(
        &self,
        account: &str,
        container: &str,
        headers: &HeaderMap,
    ) -> HttpResponse {
        let resp = self.core.delete_container(account, container, headers).await;
        self.invalidate_container_info(account, container).await;
        resp
    }

    pub async fn put_object(
        &self,
        account: &str,
        container: &str,
        obj: &str,
        headers: &HeaderMap,
        source: BytesStream,
    ) -> HttpResponse {
        self.object_client(account, container)
            .await
            .put_object(obj, headers, source)
            .await
    }

    pub async fn post_object(
        &self,
        account: &str,
        container: &str,
        obj: &str,
        headers: &HeaderMap,
    ) -> HttpResponse {
        self.object_client(account, container)
            .await
            .post_object(obj, headers)
            .await
    }

    pub async fn get_object(
        &self,
        account: &str,
        container: &str,
        obj: &str,
        headers: &HeaderMap,
    ) -> HttpResponse {
        self.object_client(account, container)
            .await
            .get_object(obj, headers)
            .await
    }

    pub async fn grep_object(
        &self,
        account: &str,
        container: &str,
        obj: &str,
        search: &str,
    ) -> HttpResponse {
        self.object_client(account, container)
            .await
            .grep_object(obj, search)
            .await
    }

    pub async fn head_object(
        &self,
        account: &str,
        container: &str,
        obj: &str,
        headers: &HeaderMap,
    ) -> HttpResponse {
        self.object_client(account, container)
            .await
            .head_object(obj, headers)
            .await
    }

    pub async fn delete_object(
        &self,
        account: &str,
        container: &str,
        obj: &str,
        headers: &HeaderMap,
    ) -> HttpResponse {
        self.object_client(account, container)
            .await
            .delete_object(obj, headers)
            .await
    }

    /// The object ring serving a container, resolved through its policy.
    pub async fn object_ring_for(
        &self,
        account: &str,
        container: &str,
    ) -> Result<Arc<dyn Ring>> {
        self.object_client(account, container).await.object_ring()
    }
}

/// A thin, stable client surface bound to one account.
pub struct AccountClient {
    proxy: Arc<ProxyClient>,
    account: String,
}

impl AccountClient {
    pub fn new(proxy: Arc<ProxyClient>, account: impl Into<String>) -> Self {
        Self {
            proxy,
            account: account.into(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub async fn put_account(&self, headers: &HeaderMap) -> HttpResponse {
        self.proxy.put_account(&self.account, headers).await
    }

    pub async fn post_account(&self, headers: &HeaderMap) -> HttpResponse {
        self.proxy.post_account(&self.account, headers).await
    }

    pub async fn head_account(&self, headers: &HeaderMap) -> HttpResponse {
        self.proxy.head_account(&self.account, headers).await
    }

    pub async fn delete_account(&self, headers: &HeaderMap) -> HttpResponse {
        self.proxy.delete_account(&self.account, headers).await
    }

    /// List containers, decoded. On a non-2xx the raw response passes
    /// through undecoded.
    pub async fn get_account(
        &self,
        options: &ListingOptions,
        headers: &HeaderMap,
    ) -> (Option<Vec<ContainerRecord>>, HttpResponse) {
        let resp = self
            .proxy
            .get_account(&self.account, &options.to_query(), headers)
            .await;
        decode_listing(resp).await
    }

    /// List containers without decoding.
    pub async fn get_account_raw(
        &self,
        options: &ListingOptions,
        headers: &HeaderMap,
    ) -> HttpResponse {
        self.proxy
            .get_account(&self.account, &options.to_query(), headers)
            .await
    }

    pub async fn put_container(&self, container: &str, headers: &HeaderMap) -> HttpResponse {
        self.proxy
            .put_container(&self.account, container, headers)
            .await
    }

    pub async fn post_container(&self, container: &str, headers: &HeaderMap) -> HttpResponse {
        self.proxy
            .post_container(&self.account, container, headers)
            .await
    }

    /// List objects in a container, decoded. On a non-2xx the raw response
    /// passes through undecoded.
    pub async fn get_container(
        &self,
        container: &str,
        options: &ListingOptions,
        headers: &HeaderMap,
    ) -> (Option<Vec<ObjectRecord>>, HttpResponse) {
        let resp = self
            .proxy
            .get_container(&self.account, container, &options.to_query(), headers)
            .await;
        decode_listing(resp).await
    }

    /// List objects without decoding.
    pub async fn get_container_raw(
        &self,
        container: &str,
        options: &ListingOptions,
        headers: &HeaderMap,
    ) -> HttpResponse {
        self.proxy
            .get_container(&self.account, container, &options.to_query(), headers)
            .await
    }

    pub async fn head_container(&self, container: &str, headers: &HeaderMap) -> HttpResponse {
        self.proxy
            .head_container(&self.account, container, headers)
            .await
    }

    pub async fn delete_container(&self, container: &str, headers: &HeaderMap) -> HttpResponse {
        self.proxy
            .delete_container(&self.account, container, headers)
            .await
    }

    pub async fn put_object(
        &self,
        container: &str,
        obj: &str,
        headers: &HeaderMap,
        source: BytesStream,
    ) -> HttpResponse {
        self.proxy
            .put_object(&self.account, container, obj, headers, source)
            .await
    }

    pub async fn post_object(
        &self,
        container: &str,
        obj: &str,
        headers: &HeaderMap,
    ) -> HttpResponse {
        self.proxy
            .post_object(&self.account, container, obj, headers)
            .await
    }

    pub async fn get_object(
        &self,
        container: &str,
        obj: &str,
        headers: &HeaderMap,
    ) -> HttpResponse {
        self.proxy
            .get_object(&self.account, container, obj, headers)
            .await
    }

    pub async fn head_object(
        &self,
        container: &str,
        obj: &str,
        headers: &HeaderMap,
    ) -> HttpResponse {
        self.proxy
            .head_object(&self.account, container, obj, headers)
            .await
    }

    pub async fn delete_object(
        &self,
        container: &str,
        obj: &str,
        headers: &HeaderMap,
    ) -> HttpResponse {
        self.proxy
            .delete_object(&self.account, container, obj, headers)
            .await
    }
}

/// Decode a 2xx JSON listing body, leaving the buffered body readable on
/// the returned response. Decode failures become a synthetic 500.
async fn decode_listing<T: serde::de::DeserializeOwned>(
    resp: HttpResponse,
) -> (Option<Vec<T>>, HttpResponse) {
    if !resp.status().is_success() {
        return (None, resp);
    }
    let (parts, body) = resp.into_parts();
    let bs = match body.bytes().await {
        Ok(bs) => bs,
        Err(err) => {
            return (
                None,
                synthetic(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
            )
        }
    };
    match serde_json::from_slice::<Vec<T>>(&bs) {
        Ok(list) => (
            Some(list),
            Response::from_parts(parts, ResponseBody::Bytes(bs)),
        ),
        Err(err) => (
            None,
            synthetic(
                StatusCode::INTERNAL_SERVER_ERROR,
                &new_json_deserialize_error(err).to_string(),
            ),
        ),
    }
}
