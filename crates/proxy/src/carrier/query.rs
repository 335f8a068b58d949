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

use snafu::ResultExt;
use tracing::warn;
use url::Url;

use super::{CarrierHandle, CarrierKind, PendingState, StateCarrier, codec};
use crate::{
    error::{EncodingSnafu, ProxyError},
    self_url::{CanonicalUrl, with_message_param},
    strategy::Strategy,
};

/// Keeps pending state in the redirect URL: the strategy as `method`, the
/// message base64url-encoded as `msg`.
///
/// Delivery is at most once because the rendered page replaces its history
/// entry with the canonical URL and every form and link targets that URL.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueryCarrier;

impl QueryCarrier {
    fn decode(encoded: &str) -> Result<String, ProxyError> {
        codec::decode(encoded).context(EncodingSnafu)
    }
}

impl StateCarrier for QueryCarrier {
    fn kind(&self) -> CarrierKind { CarrierKind::Query }

    fn put(&self, handle: CarrierHandle, state: PendingState) -> CarrierHandle {
        let message = state.status_message.as_deref().map(codec::encode);
        handle.with_params(message, Some(state.strategy.to_string()))
    }

    fn take_message(&self, handle: &CarrierHandle) -> Option<String> {
        let encoded = handle.message_param().filter(|m| !m.is_empty())?;
        match Self::decode(encoded) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(error = %e, "Dropping undecodable status message");
                None
            }
        }
    }

    fn strategy(&self, handle: &CarrierHandle) -> Strategy {
        handle
            .method_param()
            .map(Strategy::from_query)
            .unwrap_or_default()
    }

    fn location(&self, canonical: &CanonicalUrl, handle: &CarrierHandle) -> Url {
        let url = canonical.with_strategy_param(self.strategy(handle));
        match handle.message_param() {
            Some(encoded) => with_message_param(url, encoded),
            None => url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::self_url::canonicalize;

    fn handle_for(url: &str) -> CarrierHandle {
        CarrierHandle::from_request(&axum::http::HeaderMap::new(), &Url::parse(url).unwrap())
    }

    #[test]
    fn location_carries_strategy_and_encoded_message() {
        let carrier = QueryCarrier;
        let request = Url::parse("http://h/?msg=stale&method=memory").unwrap();
        let canonical = canonicalize(&request, "/");
        let handle = carrier.put(
            handle_for(request.as_str()),
            PendingState::new("Invalid URL: x", Strategy::File),
        );

        let location = carrier.location(&canonical, &handle);
        assert_eq!(
            location.as_str(),
            format!("http://h/?method=file&msg={}", codec::encode("Invalid URL: x"))
        );

        let landed = handle_for(location.as_str());
        assert_eq!(carrier.take_message(&landed).as_deref(), Some("Invalid URL: x"));
        assert_eq!(carrier.strategy(&landed), Strategy::File);
    }

    #[test]
    fn silent_state_drops_any_previous_message() {
        let carrier = QueryCarrier;
        let request = Url::parse("http://h/?msg=c3RhbGU").unwrap();
        let handle = carrier.put(
            handle_for(request.as_str()),
            PendingState::silent(Strategy::Memory),
        );
        let location = carrier.location(&canonicalize(&request, "/"), &handle);
        assert_eq!(location.as_str(), "http://h/?method=memory");
    }

    #[test]
    fn message_free_url_shows_nothing() {
        let carrier = QueryCarrier;
        assert_eq!(carrier.take_message(&handle_for("http://h/?method=file")), None);
        assert_eq!(carrier.take_message(&handle_for("http://h/?msg=")), None);
    }

    #[test]
    fn undecodable_message_is_dropped() {
        let carrier = QueryCarrier;
        assert_eq!(carrier.take_message(&handle_for("http://h/?msg=_w")), None);
        assert_eq!(carrier.take_message(&handle_for("http://h/?msg=%21%21")), None);
    }
}
