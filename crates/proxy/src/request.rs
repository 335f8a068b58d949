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

use snafu::ensure;
use url::Url;

use crate::{
    error::{ProxyError, ValidationSnafu},
    strategy::Strategy,
};

/// A validated submission. Only [`validate_url`] produces the URL, so an
/// invalid address never reaches a strategy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url:      Url,
    pub strategy: Strategy,
}

impl DownloadRequest {
    pub fn new(input: &str, strategy: Strategy) -> Result<Self, ProxyError> {
        Ok(Self {
            url: validate_url(input)?,
            strategy,
        })
    }
}

/// Accepts absolute `http` or `https` URLs with a host. Surrounding
/// whitespace is ignored.
pub fn validate_url(input: &str) -> Result<Url, ProxyError> {
    let trimmed = input.trim();
    let url = Url::parse(trimmed).map_err(|e| ProxyError::Validation {
        input:  input.to_string(),
        reason: e.to_string(),
    })?;
    ensure!(
        matches!(url.scheme(), "http" | "https"),
        ValidationSnafu {
            input,
            reason: format!("unsupported scheme {}", url.scheme()),
        }
    );
    ensure!(
        url.host_str().is_some_and(|host| !host.is_empty()),
        ValidationSnafu {
            input,
            reason: "missing host",
        }
    );
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_absolute_http_urls() {
        let url = validate_url("  http://example.com/song.mp3 ").unwrap();
        assert_eq!(url.as_str(), "http://example.com/song.mp3");
        assert!(validate_url("https://example.com:8443/a?b=c").is_ok());
    }

    #[test]
    fn rejects_everything_else() {
        let inputs = [
            "not a url",
            "",
            "/relative/path",
            "mailto:a@b.c",
            "ftp://h/a",
            "file:///etc/passwd",
        ];
        for input in inputs {
            let err = validate_url(input).unwrap_err();
            assert!(matches!(err, ProxyError::Validation { .. }), "{input}");
            assert_eq!(err.to_string(), format!("Invalid URL: {input}"));
        }
    }

    #[test]
    fn request_keeps_chosen_strategy() {
        let request = DownloadRequest::new("http://h/a.zip", Strategy::File).unwrap();
        assert_eq!(request.strategy, Strategy::File);
        assert!(DownloadRequest::new("nope", Strategy::File).is_err());
    }
}
