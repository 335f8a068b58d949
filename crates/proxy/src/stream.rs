// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Memory mode: relay the remote body straight to the browser.
//!
//! Nothing is buffered beyond one upstream chunk. Once the headers are out
//! the response is committed; a read error after that point aborts the
//! connection and the client keeps a truncated file.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use snafu::{ResultExt, ensure};
use tracing::{info, warn};
use url::Url;

use crate::{
    config::{MemoryLimit, ProxyConfig},
    error::{ProxyError, UnreachableSnafu, UpstreamStatusSnafu},
    naming::{disguised_filename, remote_basename},
};

/// Chunk size used when the memory ceiling is unlimited (100 MiB).
pub const FALLBACK_CHUNK_SIZE: usize = 100 * 1024 * 1024;

/// `floor(limit / 1.3)` bytes, computed in integers, never zero.
pub fn chunk_size(limit: MemoryLimit) -> usize {
    match limit {
        MemoryLimit::Unlimited => FALLBACK_CHUNK_SIZE,
        MemoryLimit::Bytes(size) => {
            let chunk = u128::from(size.as_bytes()) * 10 / 13;
            usize::try_from(chunk).unwrap_or(usize::MAX).max(1)
        }
    }
}

/// Opens remote resources for memory-mode delivery.
#[derive(Clone, Debug)]
pub struct StreamingProxy {
    client:     reqwest::Client,
    chunk_size: usize,
    disguise:   bool,
}

impl StreamingProxy {
    pub fn new(client: reqwest::Client, config: &ProxyConfig) -> Self {
        Self {
            client,
            chunk_size: chunk_size(config.memory_limit),
            disguise: config.disguise,
        }
    }

    /// Opens `url` for reading. Fails with [`ProxyError::Unreachable`] or
    /// [`ProxyError::UpstreamStatus`] before anything is sent to the client.
    pub async fn open(&self, url: &Url) -> Result<StreamedDownload, ProxyError> {
        let upstream = self
            .client
            .get(url.clone())
            .send()
            .await
            .context(UnreachableSnafu { url: url.as_str() })?;

        let status = upstream.status();
        ensure!(
            status.is_success(),
            UpstreamStatusSnafu {
                url:    url.as_str(),
                status: status.as_u16(),
            }
        );

        let (filename, content_type) = if self.disguise {
            (disguised_filename(url), HeaderValue::from_static("image/jpeg"))
        } else {
            let passthrough = upstream
                .headers()
                .get(header::CONTENT_TYPE)
                .cloned()
                .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
            (remote_basename(url), passthrough)
        };

        info!(%url, filename, chunk_size = self.chunk_size, "Streaming remote resource");
        Ok(StreamedDownload {
            url: url.clone(),
            filename,
            content_type,
            chunk_size: self.chunk_size,
            transferred: Arc::new(AtomicU64::new(0)),
            upstream,
        })
    }
}

/// An opened remote resource, ready to become the response.
#[derive(Debug)]
pub struct StreamedDownload {
    url:          Url,
    filename:     String,
    content_type: HeaderValue,
    chunk_size:   usize,
    transferred:  Arc<AtomicU64>,
    upstream:     reqwest::Response,
}

impl StreamedDownload {
    /// Name announced in `Content-Disposition`.
    pub fn filename(&self) -> &str { &self.filename }

    /// Live count of body bytes handed to the client so far.
    pub fn transferred(&self) -> Arc<AtomicU64> { Arc::clone(&self.transferred) }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::PRAGMA, HeaderValue::from_static("public"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("must-revalidate, post-check=0, pre-check=0"),
        );
        headers.append(header::CACHE_CONTROL, HeaderValue::from_static("private"));
        headers.insert(header::CONTENT_TYPE, self.content_type.clone());
        if let Some(disposition) = content_disposition(&self.filename) {
            headers.insert(header::CONTENT_DISPOSITION, disposition);
        }
        headers.insert(
            "content-transfer-encoding",
            HeaderValue::from_static("binary"),
        );
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        headers
    }
}

impl IntoResponse for StreamedDownload {
    fn into_response(self) -> Response {
        let headers = self.headers();
        let limit = self.chunk_size;
        let counter = Arc::clone(&self.transferred);
        let guard = TransferGuard {
            url:         self.url.to_string(),
            transferred: Arc::clone(&self.transferred),
            expected:    self.upstream.content_length(),
        };
        let url = self.url;

        let body = self
            .upstream
            .bytes_stream()
            .map_ok(move |bytes| {
                stream::iter(
                    split_chunks(bytes, limit)
                        .into_iter()
                        .map(Ok::<_, reqwest::Error>),
                )
            })
            .try_flatten()
            .inspect_ok(move |chunk| {
                counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
            })
            .inspect_err(move |e| warn!(%url, error = %e, "Remote stream failed mid-transfer"))
            .map(move |item| {
                let _ = &guard;
                item
            });

        (StatusCode::OK, headers, Body::from_stream(body)).into_response()
    }
}

/// Logs the outcome once the response body is finished or dropped.
struct TransferGuard {
    url:         String,
    transferred: Arc<AtomicU64>,
    expected:    Option<u64>,
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        let bytes = self.transferred.load(Ordering::Relaxed);
        match self.expected {
            Some(expected) if expected != bytes => {
                warn!(url = %self.url, bytes, expected, "Stream ended early");
            }
            _ => info!(url = %self.url, bytes, "Stream finished"),
        }
    }
}

fn split_chunks(mut bytes: Bytes, limit: usize) -> Vec<Bytes> {
    let mut chunks = Vec::with_capacity(bytes.len().div_ceil(limit.max(1)));
    while bytes.len() > limit {
        chunks.push(bytes.split_to(limit));
    }
    if !bytes.is_empty() {
        chunks.push(bytes);
    }
    chunks
}

/// `attachment; filename="<name>"` with the name's UTF-8 bytes sent as is.
fn content_disposition(filename: &str) -> Option<HeaderValue> {
    let value = format!("attachment; filename=\"{}\"", header_safe(filename));
    HeaderValue::from_bytes(value.as_bytes()).ok()
}

/// Quotes, backslashes and control characters cannot appear in a quoted
/// header parameter.
fn header_safe(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
