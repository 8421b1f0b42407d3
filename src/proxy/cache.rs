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

use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

/// How long a filled container-info entry stays fresh in the shared tier.
pub const CONTAINER_INFO_TTL: Duration = Duration::from_secs(30);

/// The external shared cache tier, typically memcache in production.
///
/// Strictly best-effort: implementations swallow their own backend errors
/// and callers treat a miss and a failure identically. Values are opaque
/// encoded bytes; container info goes through JSON.
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Bytes>;
    async fn set(&self, key: &str, value: Bytes, ttl: Duration);
    async fn delete(&self, key: &str);
}

/// In-process [`SharedCache`] with per-entry TTL.
///
/// Serves single-node deployments and tests; a multi-proxy cluster wants a
/// genuinely shared store behind the same trait.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, (Bytes, Instant)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Bytes> {
        if let Some(entry) = self.entries.get(key) {
            let (value, expires) = entry.value();
            if Instant::now() < *expires {
                return Some(value.clone());
            }
        }
        // Expired entries are dropped on the read path.
        self.entries.remove(key);
        None
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
    }

    async fn delete(&self, key: &str) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_round_trip() {
        let cache = MemoryCache::new();
        cache
            .set("container/a/c", Bytes::from_static(b"{}"), Duration::from_secs(30))
            .await;

        assert_eq!(cache.get("container/a/c").await, Some(Bytes::from_static(b"{}")));

        cache.delete("container/a/c").await;
        assert_eq!(cache.get("container/a/c").await, None);
    }

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let cache = MemoryCache::new();
        cache
            .set("k", Bytes::from_static(b"v"), Duration::from_millis(0))
            .await;

        assert_eq!(cache.get("k").await, None);
    }
}
