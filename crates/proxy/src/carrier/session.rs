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

use std::{fmt, time::Duration};

use moka::{ops::compute::Op, sync::Cache};
use tracing::debug;
use url::Url;

use super::{CarrierHandle, CarrierKind, PendingState, SessionId, StateCarrier};
use crate::{self_url::CanonicalUrl, strategy::Strategy};

/// Name of the cookie holding the session token.
pub const SESSION_COOKIE: &str = "mole_session";

/// Sessions kept at most.
pub const DEFAULT_SESSION_CAPACITY: u64 = 10_000;

/// Sessions untouched for this long are dropped.
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(30 * 60);

/// Keeps pending state in process memory, one slot per session.
///
/// A slot is only stored once something is put into it, so visits that never
/// submit the form cost nothing. Slots are bounded by `capacity` and dropped
/// after `idle` without access; a restart forgets all of them.
pub struct SessionCarrier {
    slots: Cache<SessionId, PendingState>,
}

impl SessionCarrier {
    pub fn new(capacity: u64, idle: Duration) -> Self {
        let slots = Cache::builder()
            .max_capacity(capacity)
            .time_to_idle(idle)
            .build();
        Self { slots }
    }

    /// Approximate number of stored sessions.
    pub fn session_count(&self) -> u64 {
        self.slots.run_pending_tasks();
        self.slots.entry_count()
    }

    fn ensure_session(handle: CarrierHandle) -> CarrierHandle {
        if handle.session().is_some() {
            return handle;
        }
        let session = SessionId::generate();
        debug!(%session, "Issued session");
        handle.with_session(session, true)
    }
}

impl Default for SessionCarrier {
    fn default() -> Self { Self::new(DEFAULT_SESSION_CAPACITY, DEFAULT_SESSION_IDLE) }
}

impl fmt::Debug for SessionCarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCarrier")
            .field("sessions", &self.slots.entry_count())
            .finish()
    }
}

impl StateCarrier for SessionCarrier {
    fn kind(&self) -> CarrierKind { CarrierKind::Session }

    fn open(&self, handle: CarrierHandle) -> CarrierHandle { Self::ensure_session(handle) }

    fn put(&self, handle: CarrierHandle, state: PendingState) -> CarrierHandle {
        let handle = Self::ensure_session(handle);
        if let Some(session) = handle.session() {
            self.slots.insert(session, state);
        }
        handle
    }

    fn take_message(&self, handle: &CarrierHandle) -> Option<String> {
        let session = handle.session()?;
        let mut taken = None;
        self.slots.entry(session).and_compute_with(|slot| {
            let Some(slot) = slot else {
                return Op::Nop;
            };
            let mut state = slot.into_value();
            taken = state.status_message.take();
            if taken.is_some() { Op::Put(state) } else { Op::Nop }
        });
        taken
    }

    fn strategy(&self, handle: &CarrierHandle) -> Strategy {
        handle
            .session()
            .and_then(|session| self.slots.get(&session))
            .map(|state| state.strategy)
            .unwrap_or_default()
    }

    fn location(&self, canonical: &CanonicalUrl, _handle: &CarrierHandle) -> Url {
        canonical.as_url().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::self_url::canonicalize;

    #[test]
    fn message_is_delivered_once_and_strategy_sticks() {
        let carrier = SessionCarrier::default();
        let handle = carrier.open(CarrierHandle::default());
        assert!(handle.set_cookie().is_some());

        let handle = carrier.put(handle, PendingState::new("Invalid URL: x", Strategy::File));
        assert_eq!(carrier.take_message(&handle).as_deref(), Some("Invalid URL: x"));
        assert_eq!(carrier.take_message(&handle), None);
        assert_eq!(carrier.strategy(&handle), Strategy::File);
    }

    #[test]
    fn unknown_session_reads_as_empty() {
        let carrier = SessionCarrier::default();
        let stale = CarrierHandle::default().with_session(SessionId::generate(), false);
        let handle = carrier.open(stale.clone());
        assert_eq!(handle.session(), stale.session());
        assert!(handle.set_cookie().is_none());
        assert_eq!(carrier.take_message(&handle), None);
        assert_eq!(carrier.strategy(&handle), Strategy::Memory);
    }

    #[test]
    fn known_session_is_kept_without_new_cookie() {
        let carrier = SessionCarrier::default();
        let first = carrier.put(
            carrier.open(CarrierHandle::default()),
            PendingState::silent(Strategy::File),
        );
        let returning = CarrierHandle::default().with_session(first.session().unwrap(), false);
        let again = carrier.open(returning);
        assert_eq!(again.session(), first.session());
        assert!(again.set_cookie().is_none());
        assert_eq!(carrier.strategy(&again), Strategy::File);
    }

    #[test]
    fn visits_without_submissions_store_nothing() {
        let carrier = SessionCarrier::default();
        for _ in 0..10_000 {
            let handle = carrier.open(CarrierHandle::default());
            assert_eq!(carrier.take_message(&handle), None);
        }
        assert_eq!(carrier.session_count(), 0);
    }

    #[test]
    fn store_is_bounded_by_capacity() {
        let carrier = SessionCarrier::new(100, DEFAULT_SESSION_IDLE);
        for _ in 0..2_000 {
            carrier.put(CarrierHandle::default(), PendingState::new("m", Strategy::File));
        }
        assert!(carrier.session_count() <= 100);
    }

    #[test]
    fn idle_sessions_expire() {
        let carrier = SessionCarrier::new(100, Duration::from_millis(50));
        let handle = carrier.put(CarrierHandle::default(), PendingState::new("m", Strategy::File));
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(carrier.take_message(&handle), None);
        assert_eq!(carrier.strategy(&handle), Strategy::Memory);
    }

    #[test]
    fn redirects_to_the_bare_canonical_url() {
        let carrier = SessionCarrier::default();
        let canonical = canonicalize(&Url::parse("http://h/?msg=abc&method=file").unwrap(), "/");
        let handle = carrier.put(CarrierHandle::default(), PendingState::silent(Strategy::File));
        assert_eq!(carrier.location(&canonical, &handle).as_str(), "http://h/");
    }
}
