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

//! Facade, cache and RPC-layer behavior against scripted backends.

mod common;

use std::sync::Arc;

use common::*;
use http::HeaderMap;
use http::StatusCode;
use swiftproxy::proxy::AccountClient;
use swiftproxy::proxy::ListingOptions;
use swiftproxy::proxy::MemoryCache;
use swiftproxy::proxy::ProxyClient;
use swiftproxy::proxy::ProxyCore;
use swiftproxy::raw::headers_from_pairs;
use swiftproxy::raw::HttpClient;
use swiftproxy::ring::Device;
use swiftproxy::ring::RingLoader;
use swiftproxy::types::Policy;
use swiftproxy::types::PolicyList;
use swiftproxy::types::NIL_CONTAINER_INFO;

fn account_devices() -> Vec<Device> {
    vec![dev(7101), dev(7102), dev(7103)]
}

fn container_devices() -> Vec<Device> {
    vec![dev(7201), dev(7202), dev(7203)]
}

fn object_devices() -> Vec<Device> {
    vec![dev(7301), dev(7302), dev(7303)]
}

fn policies() -> PolicyList {
    PolicyList::new(vec![
        Policy {
            name: "gold".to_string(),
            index: 0,
            deprecated: false,
            default: true,
        },
        Policy {
            name: "silver".to_string(),
            index: 1,
            deprecated: false,
            default: false,
        },
        Policy {
            name: "tin".to_string(),
            index: 2,
            deprecated: true,
            default: false,
        },
    ])
}

/// Container HEAD headers that fill a valid ContainerInfo.
fn container_info_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        ("x-container-object-count", "5"),
        ("x-container-bytes-used", "1024"),
        ("x-backend-storage-policy-index", "1"),
        ("x-container-meta-color", "red"),
    ]
}

struct Cluster {
    proxy: Arc<ProxyClient>,
    state: Arc<MockState>,
    cache: Arc<MemoryCache>,
}

fn cluster(scripts: Vec<(Device, Script)>) -> Cluster {
    cluster_with_loader(
        scripts,
        Arc::new(FakeLoader {
            ring: Arc::new(FakeRing::new(object_devices(), vec![])),
        }),
    )
}

fn cluster_with_loader(scripts: Vec<(Device, Script)>, loader: Arc<dyn RingLoader>) -> Cluster {
    let mock = MockSend::new(scripts);
    let state = mock.state.clone();
    let core = Arc::new(ProxyCore::with_client(
        policies(),
        Arc::new(FakeRing::new(account_devices(), vec![])),
        Arc::new(FakeRing::new(container_devices(), vec![])),
        loader,
        HttpClient::with(mock),
    ));
    let cache = Arc::new(MemoryCache::new());
    let proxy = Arc::new(ProxyClient::new(core, Some(cache.clone())));
    Cluster {
        proxy,
        state,
        cache,
    }
}

fn all(devices: Vec<Device>, script: Script) -> Vec<(Device, Script)> {
    devices
        .into_iter()
        .map(|d| (d, script.clone()))
        .collect()
}

#[tokio::test]
async fn container_info_miss_fill_populates_shared_cache() {
    use swiftproxy::proxy::SharedCache;

    let cluster = cluster(all(
        container_devices(),
        Script::WithHeaders(204, container_info_headers()),
    ));

    let ci = cluster.proxy.get_container_info("a", "c").await.unwrap();
    assert_eq!(ci.object_count, 5);
    assert_eq!(ci.bytes_used, 1024);
    assert_eq!(ci.storage_policy_index, 1);
    assert_eq!(ci.metadata.get("Color").map(String::as_str), Some("red"));
    assert!(ci.sysmetadata.is_empty());
    assert_eq!(ci.read_acl, "");

    assert!(cluster.cache.get("container/a/c").await.is_some());

    // Second lookup is served from the shared tier.
    let before = cluster.state.request_count();
    let again = cluster.proxy.get_container_info("a", "c").await.unwrap();
    assert_eq!(again.storage_policy_index, 1);
    assert_eq!(cluster.state.request_count(), before);
}

#[tokio::test]
async fn container_info_error_carries_status() {
    let cluster = cluster(all(container_devices(), Script::Status(500)));

    let err = cluster.proxy.get_container_info("a", "c").await.unwrap_err();
    assert!(err.to_string().contains("503"), "got: {err}");
}

#[tokio::test]
async fn container_mutations_invalidate_both_tiers() {
    use swiftproxy::proxy::SharedCache;

    let cluster = cluster(all(
        container_devices(),
        Script::WithHeaders(201, container_info_headers()),
    ));

    // Local tier poisoned with the sentinel: lookups fail without touching
    // any backend, even though the shared tier has a healthy entry.
    cluster
        .proxy
        .seed_container_info("a", "c", NIL_CONTAINER_INFO.clone());
    let healthy = swiftproxy::types::ContainerInfo {
        object_count: 1,
        bytes_used: 2,
        storage_policy_index: 0,
        ..Default::default()
    };
    cluster
        .cache
        .set(
            "container/a/c",
            serde_json::to_vec(&healthy).unwrap().into(),
            swiftproxy::proxy::CONTAINER_INFO_TTL,
        )
        .await;
    assert!(cluster.proxy.get_container_info("a", "c").await.is_err());

    let resp = cluster.proxy.put_container("a", "c", &HeaderMap::new()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // Both tiers are clean: the next lookup goes to the backend and
    // succeeds.
    assert!(cluster.cache.get("container/a/c").await.is_none());
    let ci = cluster.proxy.get_container_info("a", "c").await.unwrap();
    assert_eq!(ci.object_count, 5);
}

#[tokio::test]
async fn nil_sentinel_breaks_object_resolution() {
    let cluster = cluster(all(object_devices(), Script::Status(200)));
    cluster
        .proxy
        .seed_container_info("a", "c", NIL_CONTAINER_INFO.clone());

    let resp = cluster
        .proxy
        .get_object("a", "c", "o", &HeaderMap::new())
        .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = resp.into_body().bytes().await.unwrap();
    assert_eq!(&body[..], b"Could not retrieve container information.");
}

#[tokio::test]
async fn put_container_resolves_policy_name() {
    let cluster = cluster(all(container_devices(), Script::Status(201)));

    let headers = headers_from_pairs([("x-storage-policy", "silver")]);
    let resp = cluster.proxy.put_container("a", "c", &headers).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    for d in container_devices() {
        let reqs = cluster.state.requests_for(&d);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].headers["x-backend-storage-policy-index"], "1");
        assert_eq!(reqs[0].headers["x-backend-storage-policy-default"], "0");
        assert_eq!(reqs[0].headers["x-account-partition"], "17");
    }
}

#[tokio::test]
async fn put_container_stripes_account_devices() {
    let cluster = cluster(all(container_devices(), Script::Status(201)));

    let resp = cluster.proxy.put_container("a", "c", &HeaderMap::new()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // Three container replicas, three account devices: worker i notifies
    // account device i.
    let accounts = account_devices();
    for (i, d) in container_devices().iter().enumerate() {
        let reqs = cluster.state.requests_for(d);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].headers["x-account-host"], accounts[i].host().as_str());
        assert_eq!(reqs[0].headers["x-account-device"], accounts[i].device.as_str());
    }
}

#[tokio::test]
async fn put_container_rejects_unknown_policy() {
    let cluster = cluster(all(container_devices(), Script::Status(201)));

    let headers = headers_from_pairs([("x-storage-policy", "platinum")]);
    let resp = cluster.proxy.put_container("a", "c", &headers).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = resp.into_body().bytes().await.unwrap();
    assert_eq!(&body[..], b"Invalid X-Storage-Policy \"platinum\"");
    assert_eq!(cluster.state.request_count(), 0);
}

#[tokio::test]
async fn put_container_rejects_deprecated_policy() {
    let cluster = cluster(all(container_devices(), Script::Status(201)));

    let headers = headers_from_pairs([("x-storage-policy", "tin")]);
    let resp = cluster.proxy.put_container("a", "c", &headers).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = resp.into_body().bytes().await.unwrap();
    assert_eq!(&body[..], b"Storage Policy \"tin\" is deprecated");
}

#[tokio::test]
async fn object_put_carries_listing_update_headers() {
    let mut scripts = all(object_devices(), Script::AcceptBody(201));
    scripts.extend(all(
        container_devices(),
        Script::WithHeaders(204, container_info_headers()),
    ));
    let cluster = cluster(scripts);

    let resp = cluster
        .proxy
        .put_object("a", "c", "o", &HeaderMap::new(), source_body(&["data"]))
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let containers = container_devices();
    for (i, d) in object_devices().iter().enumerate() {
        let reqs = cluster.state.requests_for(d);
        assert_eq!(reqs.len(), 1, "object device {i} saw one PUT");
        let headers = &reqs[0].headers;
        assert_eq!(headers["expect"], "100-Continue");
        assert_eq!(headers["content-type"], "application/octet-stream");
        // Policy 1 comes from the container info fill above.
        assert_eq!(headers["x-backend-storage-policy-index"], "1");
        assert_eq!(headers["x-container-partition"], "17");
        assert_eq!(headers["x-container-host"], containers[i].host().as_str());
        assert_eq!(headers["x-container-device"], containers[i].device.as_str());
    }

    for d in object_devices() {
        assert_eq!(cluster.state.body_for(&d).as_deref(), Some(b"data".as_ref()));
    }
}

#[tokio::test]
async fn object_ring_load_failure_yields_erroring_client() {
    let mut scripts = all(object_devices(), Script::Status(200));
    scripts.extend(all(
        container_devices(),
        Script::WithHeaders(204, container_info_headers()),
    ));
    let cluster = cluster_with_loader(scripts, Arc::new(FailingLoader));

    let resp = cluster
        .proxy
        .get_object("a", "c", "o", &HeaderMap::new())
        .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = resp.into_body().bytes().await.unwrap();
    assert_eq!(&body[..], b"Could not load object ring for policy 1.");
}

#[tokio::test]
async fn account_listing_decodes_json() {
    let cluster = cluster(all(
        account_devices(),
        Script::Body(200, r#"[{"name":"backups","count":3,"bytes":12048}]"#),
    ));
    let client = AccountClient::new(cluster.proxy.clone(), "AUTH_test");

    let options = ListingOptions {
        marker: "b".to_string(),
        limit: 100,
        ..Default::default()
    };
    let (records, resp) = client.get_account(&options, &HeaderMap::new()).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let records = records.expect("2xx listing must decode");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "backups");
    assert_eq!(records[0].count, 3);

    let reqs = cluster.state.requests.lock().unwrap();
    let uri = &reqs[0].uri;
    assert!(uri.contains("format=json"), "got: {uri}");
    assert!(uri.contains("marker=b"), "got: {uri}");
    assert!(uri.contains("limit=100"), "got: {uri}");
}

#[tokio::test]
async fn container_listing_decodes_subdir_rows() {
    let mut scripts = all(
        container_devices(),
        Script::Body(
            200,
            r#"[{"name":"o1","hash":"h","bytes":4,"content_type":"text/plain","last_modified":"2016-08-17T07:03:36.000000"},{"subdir":"photos/"}]"#,
        ),
    );
    // The listing GET needs no container info, but keep HEAD working.
    scripts.extend(all(account_devices(), Script::Status(204)));
    let cluster = cluster(scripts);
    let client = AccountClient::new(cluster.proxy.clone(), "AUTH_test");

    let (records, resp) = client
        .get_container("c", &ListingOptions::default(), &HeaderMap::new())
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let records = records.expect("2xx listing must decode");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].name, "o1");
    assert_eq!(records[1].subdir.as_deref(), Some("photos/"));
}

#[tokio::test]
async fn listing_passes_non_2xx_through() {
    let cluster = cluster(all(account_devices(), Script::Status(412)));
    let client = AccountClient::new(cluster.proxy.clone(), "AUTH_test");

    let (records, resp) = client
        .get_account(&ListingOptions::default(), &HeaderMap::new())
        .await;
    assert!(records.is_none());
    assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn facade_get_object_normalizes_read_headers() {
    let mut scripts = all(
        object_devices(),
        Script::WithHeaders(200, vec![("etag", "\"deadbeef\"")]),
    );
    scripts.extend(all(
        container_devices(),
        Script::WithHeaders(204, container_info_headers()),
    ));
    let cluster = cluster(scripts);

    let resp = cluster
        .proxy
        .get_object("a", "c", "o", &HeaderMap::new())
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["accept-ranges"], "bytes");
    assert_eq!(resp.headers()["etag"], "deadbeef");
}
