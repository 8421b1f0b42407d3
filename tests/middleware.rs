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

//! S3 auth preparation middleware, driven through an axum stack.

use std::collections::HashMap;

use axum::body::Body;
use axum::extract::Request;
use axum::middleware::from_fn_with_state;
use axum::Router;
use tower::ServiceExt;

use swiftproxy::middleware::s3_auth_middleware;
use swiftproxy::middleware::Authorizer;
use swiftproxy::middleware::S3AuthConfig;
use swiftproxy::middleware::S3AuthInfo;

/// Reports what the middleware stashed on the request.
async fn probe(request: Request) -> String {
    if let Some(info) = request.extensions().get::<S3AuthInfo>() {
        return format!(
            "info key={} signature={} string_to_sign={:?}",
            info.key, info.signature, info.string_to_sign
        );
    }
    if let Some(authorizer) = request.extensions().get::<Authorizer>() {
        let (parts, _) = http::Request::new(()).into_parts();
        let (ok, status) = authorizer.authorize(&parts);
        return format!("denier ok={ok} status={}", status.as_u16());
    }
    "plain".to_string()
}

fn app(enabled: bool) -> Router {
    let mut map = HashMap::new();
    if enabled {
        map.insert("enabled".to_string(), "true".to_string());
    }
    let config = S3AuthConfig::from_map(&map);
    Router::new()
        .fallback(probe)
        .layer(from_fn_with_state(config, s3_auth_middleware))
}

async fn body_string(resp: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn disabled_middleware_is_a_passthrough() {
    let req = http::Request::builder()
        .uri("/bucket/key")
        .header("Authorization", "AWS akid:c2ln")
        .body(Body::empty())
        .unwrap();

    let resp = app(false).oneshot(req).await.unwrap();
    assert_eq!(body_string(resp).await, "plain");
}

#[tokio::test]
async fn prepares_canonical_string_to_sign() {
    let req = http::Request::builder()
        .method("GET")
        .uri("/bucket/key?acl&partNumber=2&foo=bar")
        .header("Authorization", "AWS akid:c2ln")
        .header("Date", "Tue, 27 Mar 2007 19:36:42 +0000")
        .header("x-amz-acl", "public-read")
        .header("X-Amz-Meta-Foo", "bar")
        .body(Body::empty())
        .unwrap();

    let resp = app(true).oneshot(req).await.unwrap();
    let body = body_string(resp).await;
    assert!(body.starts_with("info key=akid signature=c2ln"), "got: {body}");
    assert!(
        body.ends_with(
            "string_to_sign=\"GET\\n\\n\\nTue, 27 Mar 2007 19:36:42 +0000\\nx-amz-acl:public-read\\nx-amz-meta-foo:bar\\n/bucket/key?acl\""
        ),
        "got: {body}"
    );
}

#[tokio::test]
async fn malformed_credentials_install_deferred_denial() {
    let req = http::Request::builder()
        .uri("/bucket/key")
        .header("Authorization", "AWS nocolon")
        .body(Body::empty())
        .unwrap();

    let resp = app(true).oneshot(req).await.unwrap();
    assert_eq!(body_string(resp).await, "denier ok=false status=403");
}

#[tokio::test]
async fn credentials_from_query_parameters() {
    let req = http::Request::builder()
        .uri("/bucket/key?AWSAccessKeyId=akid&Signature=c2ln%2Fx")
        .body(Body::empty())
        .unwrap();

    let resp = app(true).oneshot(req).await.unwrap();
    let body = body_string(resp).await;
    assert!(
        body.starts_with("info key=akid signature=c2ln/x"),
        "got: {body}"
    );
}

#[tokio::test]
async fn requests_without_credentials_flow_through() {
    let req = http::Request::builder()
        .uri("/bucket/key")
        .body(Body::empty())
        .unwrap();

    let resp = app(true).oneshot(req).await.unwrap();
    assert_eq!(body_string(resp).await, "plain");
}
