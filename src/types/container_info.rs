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

use http::HeaderMap;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde::Serialize;

use crate::raw::canonical_suffix;
use crate::raw::parse_header_to_str;
use crate::raw::parse_required_i32;
use crate::raw::parse_required_i64;
use crate::types::Result;

/// Cached description of one container, built from a container HEAD.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub object_count: i64,
    pub bytes_used: i64,
    pub storage_policy_index: i32,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub sysmetadata: HashMap<String, String>,
    #[serde(default)]
    pub read_acl: String,
    #[serde(default)]
    pub write_acl: String,
    #[serde(default)]
    pub sync_key: String,
}

/// Sentinel meaning "container info deliberately absent".
///
/// Tests inject this into a cache tier to force the "no container info"
/// error path without a backend round trip. Detected by pointer identity,
/// never by value: a real container may legitimately hash to all-default
/// fields.
pub static NIL_CONTAINER_INFO: Lazy<Arc<ContainerInfo>> =
    Lazy::new(|| Arc::new(ContainerInfo::default()));

impl ContainerInfo {
    /// Check whether an instance is the [`NIL_CONTAINER_INFO`] sentinel.
    pub fn is_nil(this: &Arc<ContainerInfo>) -> bool {
        Arc::ptr_eq(this, &NIL_CONTAINER_INFO)
    }

    /// Build container info from the headers of a 2xx container HEAD.
    pub fn from_headers(headers: &HeaderMap) -> Result<ContainerInfo> {
        let mut ci = ContainerInfo {
            object_count: parse_required_i64(headers, "x-container-object-count")?,
            bytes_used: parse_required_i64(headers, "x-container-bytes-used")?,
            storage_policy_index: parse_required_i32(headers, "x-backend-storage-policy-index")?,
            ..Default::default()
        };

        for name in headers.keys() {
            let name = name.as_str();
            if let Some(key) = canonical_suffix(name, "x-container-meta-") {
                if let Some(v) = parse_header_to_str(headers, name)? {
                    ci.metadata.insert(key, v.to_string());
                }
            } else if let Some(key) = canonical_suffix(name, "x-container-sysmeta-") {
                if let Some(v) = parse_header_to_str(headers, name)? {
                    ci.sysmetadata.insert(key, v.to_string());
                }
            } else if name.eq_ignore_ascii_case("x-container-read") {
                ci.read_acl = parse_header_to_str(headers, name)?.unwrap_or("").to_string();
            } else if name.eq_ignore_ascii_case("x-container-write") {
                ci.write_acl = parse_header_to_str(headers, name)?.unwrap_or("").to_string();
            } else if name.eq_ignore_ascii_case("x-container-sync-key") {
                ci.sync_key = parse_header_to_str(headers, name)?.unwrap_or("").to_string();
            }
        }

        Ok(ci)
    }
}
