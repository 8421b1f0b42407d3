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

use bytes::Bytes;
use bytes::BytesMut;
use futures::StreamExt;
use http::header::CONTENT_LENGTH;
use http::header::CONTENT_TYPE;
use http::Response;
use http::StatusCode;

use super::body::BytesStream;
use crate::types::Result;

/// Body of a representative response handed back by a dispatcher.
///
/// `Empty` and `Bytes` are socket-free; `Stream` is a live backend body and
/// only ever reaches the caller as the single surviving read response.
pub enum ResponseBody {
    Empty,
    Bytes(Bytes),
    Stream(BytesStream),
}

impl ResponseBody {
    /// Consume the body into memory.
    pub async fn bytes(self) -> Result<Bytes> {
        match self {
            ResponseBody::Empty => Ok(Bytes::new()),
            ResponseBody::Bytes(bs) => Ok(bs),
            ResponseBody::Stream(mut s) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = s.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Empty => f.write_str("ResponseBody::Empty"),
            ResponseBody::Bytes(bs) => write!(f, "ResponseBody::Bytes({})", bs.len()),
            ResponseBody::Stream(_) => f.write_str("ResponseBody::Stream"),
        }
    }
}

/// An HTTP response as seen by dispatchers and the facade.
pub type HttpResponse = Response<ResponseBody>;

/// Build a socket-free response with the given status and body text.
///
/// Safe to drop or read at any time; used for every synthesized outcome
/// (quorum impossible, overall timeout, invalid policy and friends).
pub fn synthetic(status: StatusCode, body: &str) -> HttpResponse {
    let bs = Bytes::copy_from_slice(body.as_bytes());
    Response::builder()
        .status(status)
        .header(CONTENT_LENGTH, bs.len())
        .header(CONTENT_TYPE, "text/plain")
        .body(ResponseBody::Bytes(bs))
        .expect("synthetic response must build")
}

/// Buffer a live response fully into memory.
///
/// Several backends race to answer one dispatch and only one response
/// survives; buffering detaches the survivor from its connection so the
/// transport can reclaim the socket no matter when (or whether) the caller
/// reads the body. A body that fails mid-read degrades to a synthetic 500
/// carrying the read error.
pub async fn capture(resp: HttpResponse) -> HttpResponse {
    let (parts, body) = resp.into_parts();
    match body.bytes().await {
        Ok(bs) => Response::from_parts(parts, ResponseBody::Bytes(bs)),
        Err(err) => synthetic(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("error reading backend response: {err}"),
        ),
    }
}
