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

//! The proxy client proper: RPC layer, per-container object clients, the
//! container-info cache and the account-bound facade.

mod cache;
pub use cache::MemoryCache;
pub use cache::SharedCache;
pub use cache::CONTAINER_INFO_TTL;

mod core;
pub use self::core::ProxyCore;

mod object;
pub use object::ErroringObjectClient;
pub use object::ObjectClient;
pub use object::StandardObjectClient;

mod client;
pub use client::AccountClient;
pub use client::ListingOptions;
pub use client::ProxyClient;
