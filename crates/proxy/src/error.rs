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

use std::{any::Any, path::PathBuf};

use axum::response::{IntoResponse, Response};
use mole_error::{ErrorExt, StackError, StatusCode};
use snafu::Snafu;

use crate::carrier::codec::CodecError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProxyError {
    #[snafu(display("Invalid URL: {input}"))]
    Validation { input: String, reason: String },

    #[snafu(display("Unable to reach {url}"))]
    Unreachable { url: String, source: reqwest::Error },

    #[snafu(display("Upstream answered {status} for {url}"))]
    UpstreamStatus { url: String, status: u16 },

    #[snafu(display("Failed to create the file: {}", path.display()))]
    StorageWrite {
        path:   PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Carried message could not be decoded"))]
    Encoding { source: CodecError },

    #[snafu(display("Failed to build the outbound HTTP client"))]
    Client { source: reqwest::Error },

    #[snafu(display("Failed to render the page"))]
    Render { source: tera::Error },
}

impl StackError for ProxyError {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) {
        buf.push(format!("{layer}: {self}"));
    }

    fn next(&self) -> Option<&dyn StackError> { None }
}

impl ErrorExt for ProxyError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::Encoding { .. } => StatusCode::InvalidArgument,
            Self::Unreachable { .. } | Self::UpstreamStatus { .. } => StatusCode::BadGateway,
            Self::StorageWrite { .. } | Self::Client { .. } | Self::Render { .. } => {
                StatusCode::Internal
            }
        }
    }

    fn as_any(&self) -> &dyn Any { self as _ }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status_code().http_status(), self.output_msg()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::http;

    use super::*;

    #[test]
    fn maps_taxonomy_to_http_status() {
        let invalid = ProxyError::Validation {
            input:  "nope".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        assert_eq!(invalid.status_code().http_status(), http::StatusCode::BAD_REQUEST);
        assert_eq!(invalid.output_msg(), "Invalid URL: nope");

        let upstream = ProxyError::UpstreamStatus {
            url:    "http://h/a".to_string(),
            status: 404,
        };
        assert_eq!(upstream.status_code().http_status(), http::StatusCode::BAD_GATEWAY);

        let storage = ProxyError::StorageWrite {
            path:   PathBuf::from("/nowhere/a.jpg"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(storage.output_msg(), "Internal error: internal");
    }
}
