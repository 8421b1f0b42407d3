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

//! The placement contract consumed by dispatchers.
//!
//! A ring maps a logical key to a partition, the partition to an ordered
//! list of primary devices, and supplies an open-ended stream of handoff
//! devices when primaries fail. Loading rings from their on-disk format
//! lives outside this crate; everything here only consumes the contract.

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::types::Result;

/// A backend address: one storage device on one server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    pub ip: String,
    pub port: u16,
    pub device: String,
}

impl Device {
    /// `ip:port` as used in listing-update headers.
    pub fn host(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// A consistent-hashing ring.
///
/// `handoff_iter` must yield devices distinct from the partition's primaries
/// and from each other. Implementations are shared across dispatch tasks as
/// `Arc<dyn Ring>` and must be safe for concurrent lookups.
pub trait Ring: Send + Sync {
    /// Map a logical key to its partition.
    fn partition_for(&self, account: &str, container: Option<&str>, object: Option<&str>) -> u64;

    /// The ordered primary devices for a partition. Length equals
    /// [`Ring::replica_count`].
    fn primary_nodes(&self, partition: u64) -> Vec<Device>;

    /// Fallback devices for a partition, in preference order, excluding
    /// primaries.
    fn handoff_iter(&self, partition: u64) -> Box<dyn Iterator<Item = Device> + Send>;

    /// Number of primaries per partition. Positive.
    fn replica_count(&self) -> usize;
}

/// Source of per-policy object rings.
///
/// The account and container rings are fixed for a cluster, but every
/// storage policy names its own object ring.
pub trait RingLoader: Send + Sync {
    fn object_ring(&self, policy_index: i32) -> Result<Arc<dyn Ring>>;
}
