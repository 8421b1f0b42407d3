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

//! swiftproxy is the proxy-side direct client for Swift-compatible
//! distributed object storage clusters.
//!
//! Given a logical operation on an account, container or object, it fans
//! HTTP requests out to the backend servers a consistent-hashing ring picks
//! for the key, and folds the answers into one representative response:
//! reads return the first usable answer, writes wait for a status class to
//! reach quorum, and object PUTs stream one body to a quorum of backends
//! behind an `Expect: 100-continue` gate.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use http::HeaderMap;
//! use swiftproxy::proxy::{AccountClient, ListingOptions, MemoryCache, ProxyClient, ProxyCore};
//! use swiftproxy::types::PolicyList;
//! use swiftproxy::Result;
//!
//! # async fn example(
//! #     account_ring: Arc<dyn swiftproxy::ring::Ring>,
//! #     container_ring: Arc<dyn swiftproxy::ring::Ring>,
//! #     loader: Arc<dyn swiftproxy::ring::RingLoader>,
//! # ) -> Result<()> {
//! let core = Arc::new(ProxyCore::new(
//!     PolicyList::default(),
//!     account_ring,
//!     container_ring,
//!     loader,
//! )?);
//! let proxy = Arc::new(ProxyClient::new(core, Some(Arc::new(MemoryCache::new()))));
//! let client = AccountClient::new(proxy, "AUTH_test");
//!
//! let (containers, resp) = client
//!     .get_account(&ListingOptions::default(), &HeaderMap::new())
//!     .await;
//! if let Some(containers) = containers {
//!     for c in containers {
//!         println!("{} ({} objects)", c.name, c.count);
//!     }
//! } else {
//!     println!("listing failed: {}", resp.status());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The ring loader and the on-disk ring format live outside this crate;
//! anything implementing [`ring::Ring`] and [`ring::RingLoader`] plugs in.

pub mod dispatch;
pub mod middleware;
pub mod proxy;
pub mod raw;
pub mod ring;
pub mod types;

pub use types::Error;
pub use types::ErrorKind;
pub use types::Result;
