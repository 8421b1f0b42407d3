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

//! HTTP plumbing shared by the dispatchers and the RPC layer.

mod body;
pub use body::body_pipe;
pub use body::BytesStream;
pub use body::PipeReader;
pub use body::PipeWriter;
pub use body::PutBodyGate;
pub use body::RequestBody;

mod client;
pub use client::HttpClient;
pub use client::HttpSend;
pub use client::ReqwestSender;
pub use client::CLIENT_TIMEOUT;
pub use client::CONNECT_TIMEOUT;
pub use client::TCP_KEEPALIVE;

mod error;
pub use error::new_json_deserialize_error;
pub use error::new_request_build_error;

mod header;
pub use header::canonical_suffix;
pub use header::extend_headers;
pub use header::headers_from_pairs;
pub use header::parse_header_to_str;
pub use header::parse_required_i32;
pub use header::parse_required_i64;

mod response;
pub use response::capture;
pub use response::synthetic;
pub use response::HttpResponse;
pub use response::ResponseBody;

mod uri;
pub use uri::build_query;
pub use uri::percent_decode_path;
pub use uri::percent_encode_path;
pub use uri::query_pairs;
