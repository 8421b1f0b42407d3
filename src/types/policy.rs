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

//! Storage policies.
//!
//! A policy names an object ring. Containers are created against a policy
//! (or the cluster default) and carry its index in
//! `X-Backend-Storage-Policy-Index` for every object operation underneath
//! them.

use serde::Deserialize;
use serde::Serialize;

/// A single storage policy as loaded from cluster configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub name: String,
    pub index: i32,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub default: bool,
}

/// The ordered set of storage policies for a cluster.
///
/// Exactly one policy is the default. An empty list behaves as a single
/// default policy with index 0, which is what clusters that predate policies
/// look like.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyList(Vec<Policy>);

impl PolicyList {
    pub fn new(policies: Vec<Policy>) -> Self {
        Self(policies)
    }

    /// Index of the default policy.
    pub fn default_index(&self) -> i32 {
        self.0
            .iter()
            .find(|p| p.default)
            .map(|p| p.index)
            .unwrap_or(0)
    }

    /// Look a policy up by its configured name.
    pub fn by_name(&self, name: &str) -> Option<&Policy> {
        self.0.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Policy> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PolicyList {
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

    #[test]
    fn test_default_index() {
        assert_eq!(sample().default_index(), 0);
        assert_eq!(PolicyList::default().default_index(), 0);
    }

    #[test]
    fn test_by_name() {
        let policies = sample();
        assert_eq!(policies.by_name("silver").map(|p| p.index), Some(1));
        assert!(policies.by_name("tin").map(|p| p.deprecated).unwrap());
        assert!(policies.by_name("platinum").is_none());
    }
}
