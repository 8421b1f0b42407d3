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

//! S3 V2 signature preparation.
//!
//! This layer only prepares: it extracts the caller's credentials, builds
//! the canonical string-to-sign and stashes both on the request for a later
//! authentication stage to verify against the account's secret. Malformed
//! credentials don't fail here either: they install a deny-everything
//! authorizer and let the request keep flowing so the enforcement point
//! stays in one place.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::Request;
use axum::extract::State;
use axum::middleware::Next;
use axum::response::Response;
use base64::engine::general_purpose;
use base64::Engine;
use hmac::Hmac;
use hmac::Mac;
use http::header::AUTHORIZATION;
use http::request::Parts;
use http::HeaderMap;
use http::Method;
use http::StatusCode;
use sha1::Sha1;

use crate::raw::percent_decode_path;
use crate::raw::query_pairs;

type HmacSha1 = Hmac<Sha1>;

/// Query tokens eligible to participate in V2 signing.
///
/// Membership is tested against the raw `k` or `k=v` token, so a
/// sub-resource carrying a value does not sign. Kept for drop-in parity
/// with existing deployments.
pub const S3_SUBRESOURCES: &[&str] = &[
    "acl",
    "delete",
    "lifecycle",
    "location",
    "logging",
    "notification",
    "partNumber",
    "policy",
    "requestPayment",
    "torrent",
    "uploads",
    "uploadId",
    "versionId",
    "versioning",
    "versions",
    "website",
    "response-cache-control",
    "response-content-disposition",
    "response-content-encoding",
    "response-content-language",
    "response-content-type",
    "response-expires",
    "cors",
    "tagging",
    "restore",
];

/// Credentials and canonical string stashed on the request by the
/// preparation layer. Verification happens downstream, once the account's
/// secret is known.
#[derive(Debug, Clone)]
pub struct S3AuthInfo {
    pub key: String,
    pub signature: String,
    pub string_to_sign: String,
    pub account: Option<String>,
}

impl S3AuthInfo {
    /// S3 V2 signature check: HMAC-SHA1 over the canonical string, compared
    /// in constant time against the base64-decoded claimed signature.
    pub fn validate_signature(&self, secret: &[u8]) -> bool {
        let Ok(mut mac) = HmacSha1::new_from_slice(secret) else {
            return false;
        };
        mac.update(self.string_to_sign.as_bytes());
        let Ok(claimed) = general_purpose::STANDARD.decode(&self.signature) else {
            return false;
        };
        mac.verify_slice(&claimed).is_ok()
    }
}

/// A deferred authorization decision, consulted by the enforcement stage.
#[derive(Clone)]
pub struct Authorizer(Arc<dyn Fn(&Parts) -> (bool, StatusCode) + Send + Sync>);

impl Authorizer {
    pub fn new(f: impl Fn(&Parts) -> (bool, StatusCode) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Denies everything; installed when credentials can't be parsed.
    pub fn deny_all() -> Self {
        Self::new(|_| (false, StatusCode::FORBIDDEN))
    }

    pub fn authorize(&self, parts: &Parts) -> (bool, StatusCode) {
        (self.0)(parts)
    }
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer").finish_non_exhaustive()
    }
}

/// Middleware configuration. Anything but an explicit `enabled = true`
/// leaves the layer as a pass-through.
#[derive(Debug, Clone, Default)]
pub struct S3AuthConfig {
    enabled: bool,
}

impl S3AuthConfig {
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let enabled = map
            .get("enabled")
            .map(|v| !v.eq_ignore_ascii_case("false"))
            .unwrap_or(false);
        Self { enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

/// The preparation middleware, for use with
/// `axum::middleware::from_fn_with_state`.
pub async fn s3_auth_middleware(
    State(config): State<S3AuthConfig>,
    mut request: Request,
    next: Next,
) -> Response {
    if !config.enabled {
        return next.run(request).await;
    }
    // Already processed by an earlier instance.
    if request.extensions().get::<S3AuthInfo>().is_some() {
        return next.run(request).await;
    }

    let raw_query = request.uri().query().unwrap_or("").to_string();

    let header_auth = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|auth| {
            let auth = auth.strip_prefix("AWS ").unwrap_or(auth);
            auth.rsplit_once(':')
                .map(|(k, s)| (k.to_string(), s.to_string()))
        });

    let (key, signature) = match header_auth {
        // An Authorization header that won't split into key:signature.
        Some(None) => {
            log::debug!("malformed S3 credentials, installing deferred denial");
            request.extensions_mut().insert(Authorizer::deny_all());
            return next.run(request).await;
        }
        Some(Some(creds)) => creds,
        None => {
            let mut key = String::new();
            let mut signature = String::new();
            for (k, v) in query_pairs(&raw_query) {
                match k {
                    "AWSAccessKeyId" => key = percent_decode_path(v),
                    "Signature" => signature = percent_decode_path(v),
                    _ => {}
                }
            }
            (key, signature)
        }
    };

    if key.is_empty() || signature.is_empty() {
        // Not an S3 request.
        return next.run(request).await;
    }

    let string_to_sign = string_to_sign(
        request.method(),
        request.headers(),
        request.uri().path(),
        &raw_query,
    );
    log::debug!("S3 string to sign: {string_to_sign:?}");

    request.extensions_mut().insert(S3AuthInfo {
        key,
        signature,
        string_to_sign,
        account: None,
    });

    next.run(request).await
}

/// The canonical MIME form of a lowercased header name (`x-amz-acl`
/// becomes `X-Amz-Acl`). Signing sorts headers by this form.
fn canonical_mime_name(name: &str) -> String {
    name.split('-')
        .map(|seg| {
            let mut chars = seg.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Build the V2 canonical string-to-sign.
fn string_to_sign(method: &Method, headers: &HeaderMap, path: &str, raw_query: &str) -> String {
    let mut buf = String::new();
    buf.push_str(method.as_str());
    buf.push('\n');
    buf.push_str(
        headers
            .get("content-md5")
            .and_then(|v| v.to_str().ok())
            .unwrap_or(""),
    );
    buf.push('\n');
    buf.push_str(
        headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or(""),
    );
    buf.push('\n');
    // An x-amz-date header supersedes Date, which then signs as an empty
    // line.
    let amz_date = headers
        .get("x-amz-date")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if amz_date.is_empty() {
        buf.push_str(
            headers
                .get("date")
                .and_then(|v| v.to_str().ok())
                .unwrap_or(""),
        );
    }
    buf.push('\n');

    let mut amz_names: Vec<&str> = headers
        .keys()
        .map(|n| n.as_str())
        .filter(|n| n.starts_with("x-amz-"))
        .collect();
    amz_names.sort_by_key(|n| canonical_mime_name(n));
    for name in amz_names {
        for value in headers.get_all(name) {
            if let Ok(value) = value.to_str() {
                buf.push_str(name);
                buf.push(':');
                buf.push_str(value);
                buf.push('\n');
            }
        }
    }

    buf.push_str(path);
    if !raw_query.is_empty() {
        let mut signable: Vec<&str> = raw_query
            .split('&')
            .filter(|part| S3_SUBRESOURCES.contains(part))
            .collect();
        signable.sort_unstable();
        if !signable.is_empty() {
            buf.push('?');
            buf.push_str(&signable.join("&"));
        }
    }
    buf
}
