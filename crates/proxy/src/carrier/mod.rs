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

//! Where the one-shot status message and the sticky strategy live between a
//! form submission and the next page render.
//!
//! [`SessionCarrier`] keeps them server side, keyed by a cookie.
//! [`QueryCarrier`] keeps them in the redirect URL itself (`msg` and
//! `method`). The controller only sees [`StateCarrier`].

pub mod codec;
mod query;
mod session;

use std::{fmt, str::FromStr};

use axum::http::{HeaderMap, HeaderValue, header};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use url::Url;
use uuid::Uuid;

pub use self::{
    query::QueryCarrier,
    session::{DEFAULT_SESSION_CAPACITY, DEFAULT_SESSION_IDLE, SESSION_COOKIE, SessionCarrier},
};
use crate::{config::ProxyConfig, self_url::CanonicalUrl, strategy::Strategy};

/// Which [`StateCarrier`] implementation a deployment uses.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CarrierKind {
    /// Message and strategy travel in the redirect URL.
    #[default]
    Query,
    /// Message and strategy are kept in server memory per session cookie.
    Session,
}

impl CarrierKind {
    pub fn build(self, config: &ProxyConfig) -> Box<dyn StateCarrier> {
        match self {
            Self::Query => Box::new(QueryCarrier),
            Self::Session => Box::new(SessionCarrier::new(
                config.session_capacity,
                config.session_idle,
            )),
        }
    }
}

/// The state threaded through one redirect cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingState {
    pub status_message: Option<String>,
    pub strategy:       Strategy,
}

impl PendingState {
    pub fn new(status_message: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            status_message: Some(status_message.into()),
            strategy,
        }
    }

    pub const fn silent(strategy: Strategy) -> Self {
        Self {
            status_message: None,
            strategy,
        }
    }
}

/// Session token stored in the [`SESSION_COOKIE`] cookie.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self { Self(Uuid::new_v4()) }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> { Uuid::parse_str(s).map(Self) }
}

/// What one request knows about its carried state: the session cookie, if
/// any, and the raw `msg` / `method` query values.
///
/// A carrier returns an updated handle from [`StateCarrier::put`]; the
/// controller builds the redirect from it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CarrierHandle {
    session: Option<SessionId>,
    issued:  bool,
    message: Option<String>,
    method:  Option<String>,
}

impl CarrierHandle {
    /// Reads the session cookie from `headers` and the transient query
    /// parameters from `request_url`. The last occurrence of a repeated
    /// parameter wins.
    pub fn from_request(headers: &HeaderMap, request_url: &Url) -> Self {
        let mut handle = Self {
            session: session_cookie(headers),
            ..Self::default()
        };
        for (key, value) in request_url.query_pairs() {
            match key.as_ref() {
                "msg" => handle.message = Some(value.into_owned()),
                "method" => handle.method = Some(value.into_owned()),
                _ => {}
            }
        }
        handle
    }

    pub const fn session(&self) -> Option<SessionId> { self.session }

    /// The raw `method` query value.
    pub fn method_param(&self) -> Option<&str> { self.method.as_deref() }

    /// The raw, still encoded `msg` query value.
    pub fn message_param(&self) -> Option<&str> { self.message.as_deref() }

    /// The same handle with the message dropped, for links and form targets
    /// that must not redisplay it.
    #[must_use]
    pub fn without_message(&self) -> Self {
        Self {
            message: None,
            ..self.clone()
        }
    }

    #[must_use]
    pub(crate) fn with_session(self, session: SessionId, issued: bool) -> Self {
        Self {
            session: Some(session),
            issued: self.issued || issued,
            ..self
        }
    }

    #[must_use]
    pub(crate) fn with_params(self, message: Option<String>, method: Option<String>) -> Self {
        Self {
            message,
            method,
            ..self
        }
    }

    /// `Set-Cookie` value when this request minted a new session.
    pub fn set_cookie(&self) -> Option<HeaderValue> {
        let session = self.session.filter(|_| self.issued)?;
        HeaderValue::from_str(&format!(
            "{SESSION_COOKIE}={session}; Path=/; HttpOnly; SameSite=Lax"
        ))
        .ok()
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(name, _)| *name == SESSION_COOKIE)
        .find_map(|(_, value)| value.trim_matches('"').parse().ok())
}

/// Carries a [`PendingState`] across one Post/Redirect/Get cycle.
///
/// Implementations must deliver a message at most once: after
/// [`take_message`](StateCarrier::take_message) has returned it, rendering
/// the page again without a new submission yields `None`. The strategy is
/// sticky and survives reads.
pub trait StateCarrier: Send + Sync {
    fn kind(&self) -> CarrierKind;

    /// Makes sure the request has somewhere to keep state. Session carriers
    /// mint a session here; query carriers have nothing to do.
    fn open(&self, handle: CarrierHandle) -> CarrierHandle { handle }

    /// Records `state` immediately before a redirect and returns the handle
    /// to build the redirect from.
    fn put(&self, handle: CarrierHandle, state: PendingState) -> CarrierHandle;

    /// Returns the pending message and forgets it.
    fn take_message(&self, handle: &CarrierHandle) -> Option<String>;

    /// The remembered strategy, [`Strategy::Memory`] for a fresh client.
    fn strategy(&self, handle: &CarrierHandle) -> Strategy;

    /// Where to send the browser next.
    fn location(&self, canonical: &CanonicalUrl, handle: &CarrierHandle) -> Url;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_cookie_and_transient_params() {
        let session = SessionId::generate();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {SESSION_COOKIE}={session}")).unwrap(),
        );
        let url = Url::parse("http://h/?method=file&msg=aGk&lang=en").unwrap();

        let handle = CarrierHandle::from_request(&headers, &url);
        assert_eq!(handle.session(), Some(session));
        assert_eq!(handle.method_param(), Some("file"));
        assert_eq!(handle.message_param(), Some("aGk"));
        assert_eq!(handle.without_message().message_param(), None);
        assert!(handle.set_cookie().is_none());
    }

    #[test]
    fn ignores_malformed_session_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("mole_session=not-a-uuid"),
        );
        let url = Url::parse("http://h/").unwrap();
        assert_eq!(CarrierHandle::from_request(&headers, &url).session(), None);
    }

    #[test]
    fn issued_session_produces_set_cookie() {
        let session = SessionId::generate();
        let handle = CarrierHandle::default().with_session(session, true);
        let cookie = handle.set_cookie().unwrap();
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with(&format!("{SESSION_COOKIE}={session};")));
        assert!(cookie.contains("HttpOnly"));
    }

    #[test]
    fn kind_builds_matching_carrier() {
        let config = ProxyConfig::default();
        assert_eq!(CarrierKind::Query.build(&config).kind(), CarrierKind::Query);
        assert_eq!(CarrierKind::Session.build(&config).kind(), CarrierKind::Session);
        assert_eq!("SESSION".parse::<CarrierKind>().unwrap(), CarrierKind::Session);
    }
}
