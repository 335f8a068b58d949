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

//! The proxy download core.
//!
//! A submitted URL is either streamed straight back to the browser under a
//! disguised `image/jpeg` identity ([`StreamingProxy`]) or fetched and stored
//! as `<name>.jpg` for later pickup ([`FetchAndPersist`]). The
//! [`RedirectController`] runs the Post/Redirect/Get cycle around both and
//! hands the one-shot status message to a [`StateCarrier`].

pub mod carrier;
mod config;
mod controller;
mod error;
pub mod listing;
mod naming;
mod page;
mod persist;
mod request;
mod self_url;
mod strategy;
mod stream;

pub use carrier::{
    CarrierHandle, CarrierKind, PendingState, QueryCarrier, SESSION_COOKIE, SessionCarrier,
    StateCarrier,
};
pub use config::{MemoryLimit, ProxyConfig};
pub use controller::{Outcome, RedirectController, RequestContext, Submission};
pub use error::ProxyError;
pub use naming::{DISGUISE_EXTENSION, disguised_filename, remote_basename};
pub use persist::{FetchAndPersist, StoredFile};
pub use request::{DownloadRequest, validate_url};
pub use self_url::{CanonicalUrl, TRANSIENT_PARAMS, canonicalize, request_url};
pub use strategy::{Strategy, select_strategy};
pub use stream::{FALLBACK_CHUNK_SIZE, StreamedDownload, StreamingProxy, chunk_size};
