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

//! The page's own URL, rebuilt from the inbound request and stripped of the
//! parameters that only live for one redirect.

use std::fmt;

use axum::http::{HeaderMap, Uri, header};
use url::Url;

use crate::strategy::Strategy;

/// Query parameters that never survive [`canonicalize`].
pub const TRANSIENT_PARAMS: [&str; 2] = ["msg", "method"];

const MSG_PARAM: &str = "msg";
const METHOD_PARAM: &str = "method";

/// Scheme, host and script path of the page, plus any non-transient query
/// parameters the visitor supplied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalUrl(Url);

impl CanonicalUrl {
    pub fn scheme(&self) -> &str { self.0.scheme() }

    /// Host including a non-default port.
    pub fn host(&self) -> String {
        match (self.0.host_str(), self.0.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        }
    }

    pub fn path(&self) -> &str { self.0.path() }

    pub const fn as_url(&self) -> &Url { &self.0 }

    /// The canonical URL with `method=<strategy>` appended.
    pub fn with_strategy_param(&self, strategy: Strategy) -> Url {
        let mut url = self.0.clone();
        url.query_pairs_mut().append_pair(METHOD_PARAM, strategy.as_ref());
        url
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

/// Appends `msg=<encoded>` to `url`.
pub fn with_message_param(mut url: Url, encoded: &str) -> Url {
    url.query_pairs_mut().append_pair(MSG_PARAM, encoded);
    url
}

/// Rebuilds the absolute URL the client requested.
///
/// Any sign of TLS termination in front of the server (`X-Forwarded-Proto`,
/// `X-Forwarded-Ssl`, `Front-End-Https` or a `Forwarded: proto=` element)
/// turns the scheme into `https`. The host comes from the `Host` header,
/// then from the request target.
pub fn request_url(headers: &HeaderMap, uri: &Uri) -> Result<Url, url::ParseError> {
    let scheme = if forwarded_tls(headers) {
        "https"
    } else {
        uri.scheme_str().unwrap_or("http")
    };
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| uri.authority().map(|authority| authority.as_str()))
        .unwrap_or("localhost");
    let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());

    Url::parse(&format!("{scheme}://{host}{path_and_query}"))
}

fn forwarded_tls(headers: &HeaderMap) -> bool {
    let header_is = |name: &str, expected: &str| {
        headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(|value| value.trim().eq_ignore_ascii_case(expected))
    };

    header_is("x-forwarded-proto", "https")
        || header_is("x-forwarded-ssl", "on")
        || header_is("front-end-https", "on")
        || headers
            .get_all(header::FORWARDED)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split([',', ';']))
            .any(|pair| pair.trim().eq_ignore_ascii_case("proto=https"))
}

/// Points `request` at `script_path` and drops the transient `msg` and
/// `method` parameters. Applying it to its own output changes nothing.
pub fn canonicalize(request: &Url, script_path: &str) -> CanonicalUrl {
    let kept: Vec<(String, String)> = request
        .query_pairs()
        .filter(|(key, _)| !TRANSIENT_PARAMS.contains(&key.as_ref()))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut url = request.clone();
    url.set_path(script_path);
    url.set_fragment(None);
    url.set_query(None);
    if !kept.is_empty() {
        url.query_pairs_mut().extend_pairs(kept);
    }
    CanonicalUrl(url)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn url(s: &str) -> Url { Url::parse(s).unwrap() }

    #[test]
    fn strips_transient_params_and_targets_script_path() {
        let canonical = canonicalize(
            &url("http://example.com/some/where?msg=aGk&lang=en&method=file#top"),
            "/",
        );
        assert_eq!(canonical.to_string(), "http://example.com/?lang=en");
        assert_eq!(canonical.scheme(), "http");
        assert_eq!(canonical.host(), "example.com");
        assert_eq!(canonical.path(), "/");
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let samples = [
            "http://example.com/",
            "https://example.com:8443/index?msg=x&method=memory",
            "http://h/a/b?q=a+b&msg=&z=%2F&method=FILE&q=2",
            "http://h/?method=file&method=memory",
        ];
        for sample in samples {
            let once = canonicalize(&url(sample), "/mole");
            let twice = canonicalize(once.as_url(), "/mole");
            assert_eq!(once, twice, "{sample}");
        }
    }

    #[test]
    fn appends_params_with_the_right_separator() {
        let bare = canonicalize(&url("http://h/?msg=x"), "/");
        assert_eq!(bare.with_strategy_param(Strategy::File).as_str(), "http://h/?method=file");

        let with_query = canonicalize(&url("http://h/?lang=en"), "/");
        let target = with_message_param(with_query.with_strategy_param(Strategy::Memory), "aGk");
        assert_eq!(target.as_str(), "http://h/?lang=en&method=memory&msg=aGk");
    }

    #[test]
    fn request_url_honours_forwarded_tls() {
        let uri: Uri = "/?method=file".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("mole.example:8080"));
        assert_eq!(
            request_url(&headers, &uri).unwrap().as_str(),
            "http://mole.example:8080/?method=file"
        );

        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert_eq!(request_url(&headers, &uri).unwrap().scheme(), "https");

        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("mole.example"));
        headers.insert(
            header::FORWARDED,
            HeaderValue::from_static("for=192.0.2.60;proto=https;by=203.0.113.43"),
        );
        assert_eq!(request_url(&headers, &uri).unwrap().scheme(), "https");
    }

    #[test]
    fn request_url_falls_back_to_target_authority() {
        let uri: Uri = "http://fallback.example/x".parse().unwrap();
        let rebuilt = request_url(&HeaderMap::new(), &uri).unwrap();
        assert_eq!(rebuilt.as_str(), "http://fallback.example/x");

        let uri: Uri = "/x".parse().unwrap();
        let rebuilt = request_url(&HeaderMap::new(), &uri).unwrap();
        assert_eq!(rebuilt.host_str(), Some("localhost"));
    }
}
