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

use http::header::AsHeaderName;
use http::HeaderMap;
use http::HeaderName;
use http::HeaderValue;

use crate::types::Error;
use crate::types::ErrorKind;
use crate::types::Result;

/// Parse header value to string according to name.
#[inline]
pub fn parse_header_to_str<K>(headers: &HeaderMap, name: K) -> Result<Option<&str>>
where
    K: AsHeaderName,
{
    headers
        .get(name)
        .map(|v| {
            v.to_str().map_err(|e| {
                Error::new(ErrorKind::Unexpected, "header value is not valid utf-8")
                    .set_source(e)
            })
        })
        .transpose()
}

/// Parse an integer valued header, erroring when it is absent or malformed.
///
/// Backend servers are required to send these on every well-formed response,
/// so absence is an error here rather than a `None`.
pub fn parse_required_i64(headers: &HeaderMap, name: &str) -> Result<i64> {
    let v = parse_header_to_str(headers, name)?.ok_or_else(|| {
        Error::new(ErrorKind::Unexpected, "required header is missing").with_context("header", name)
    })?;
    v.parse::<i64>().map_err(|e| {
        Error::new(ErrorKind::Unexpected, "header value is not valid integer")
            .with_context("header", name)
            .set_source(e)
    })
}

/// Parse an integer valued header as i32. See [`parse_required_i64`].
pub fn parse_required_i32(headers: &HeaderMap, name: &str) -> Result<i32> {
    let v = parse_required_i64(headers, name)?;
    i32::try_from(v).map_err(|e| {
        Error::new(ErrorKind::Unexpected, "header value is out of range")
            .with_context("header", name)
            .set_source(e)
    })
}

/// Copy user supplied headers onto an outgoing backend request builder.
///
/// Invalid names or values are skipped; user headers never fail a dispatch.
pub fn extend_headers(target: &mut HeaderMap, source: &HeaderMap) {
    for (name, value) in source.iter() {
        target.insert(name.clone(), value.clone());
    }
}

/// Build a `HeaderMap` from string pairs, skipping entries that are not
/// valid header names or values.
pub fn headers_from_pairs<'a, I>(pairs: I) -> HeaderMap
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut headers = HeaderMap::new();
    for (k, v) in pairs {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(k.as_bytes()),
            HeaderValue::from_str(v),
        ) {
            headers.insert(name, value);
        }
    }
    headers
}

/// Restore the canonical MIME form of a header name suffix.
///
/// Header names arrive lowercased. Metadata keys are stored in their
/// canonical form (`x-container-meta-foo-bar` stripped of its prefix becomes
/// `Foo-Bar`), matching what backends and existing tooling expect.
pub fn canonical_suffix(name: &str, prefix: &str) -> Option<String> {
    if name.len() <= prefix.len() || !name[..prefix.len()].eq_ignore_ascii_case(prefix) {
        return None;
    }
    let suffix = &name[prefix.len()..];
    let canonical = suffix
        .split('-')
        .map(|seg| {
            let mut chars = seg.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-");
    Some(canonical)
}
