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

//! The Post/Redirect/Get cycle around the two delivery strategies.

use std::fmt;

use axum::{
    http::{HeaderMap, Uri, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use jiff::Timestamp;
use mole_error::ErrorExt;
use serde::Deserialize;
use snafu::ResultExt;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::{
    carrier::{CarrierHandle, CarrierKind, PendingState, StateCarrier},
    config::ProxyConfig,
    error::{ClientSnafu, ProxyError},
    listing::{DEFAULT_PRECISION, format_bytes, list_files},
    page::{EntryView, PageRenderer, PageView},
    persist::{FetchAndPersist, StoredFile},
    request::DownloadRequest,
    self_url::{CanonicalUrl, canonicalize, request_url},
    strategy::{Strategy, select_strategy},
    stream::{StreamedDownload, StreamingProxy},
};

const UNABLE_TO_OPEN: &str = "Unable to open the requested url.";
const FAILED_TO_CONNECT: &str = "Failed to connect to the given url.";

/// The form fields posted to the page. A missing `url` re-renders the form.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Submission {
    pub url:    Option<String>,
    pub option: Option<String>,
}

/// What the controller knows about an inbound request before acting on it.
#[derive(Clone, Debug)]
pub struct RequestContext {
    canonical: CanonicalUrl,
    handle:    CarrierHandle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
enum Phase {
    AwaitingInput,
    Validating,
    Executing,
    Completed,
}

impl Phase {
    const fn can_enter(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::AwaitingInput, Self::Validating)
                | (Self::Validating, Self::Executing | Self::Completed)
                | (Self::Executing, Self::Completed)
        )
    }
}

/// Tracks one submission through [`Phase`]s.
#[derive(Debug)]
struct Cycle {
    phase: Phase,
}

impl Cycle {
    const fn new() -> Self {
        Self {
            phase: Phase::AwaitingInput,
        }
    }

    fn enter(&mut self, next: Phase) {
        debug_assert!(self.phase.can_enter(next), "{} -> {next}", self.phase);
        debug!(from = %self.phase, to = %next, "Redirect cycle");
        self.phase = next;
    }
}

/// How a request ends.
#[derive(Debug)]
pub enum Outcome {
    /// The page, with any pending message consumed.
    RenderForm { html: String, handle: CarrierHandle },
    /// `303 See Other` back to the page.
    Redirect { location: Url, handle: CarrierHandle },
    /// Memory mode: the disguised download itself.
    Stream {
        download: StreamedDownload,
        handle:   CarrierHandle,
    },
    /// Memory mode could not open the remote resource. Answered with the
    /// error status and an empty body; there is no redirect.
    StreamFailed {
        error:  ProxyError,
        handle: CarrierHandle,
    },
}

impl Outcome {
    const fn handle(&self) -> &CarrierHandle {
        match self {
            Self::RenderForm { handle, .. }
            | Self::Redirect { handle, .. }
            | Self::Stream { handle, .. }
            | Self::StreamFailed { handle, .. } => handle,
        }
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        let cookie = self.handle().set_cookie();
        let mut response = match self {
            Self::RenderForm { html, .. } => Html(html).into_response(),
            Self::Redirect { location, .. } => Redirect::to(location.as_str()).into_response(),
            Self::Stream { download, .. } => download.into_response(),
            Self::StreamFailed { error, .. } => error.status_code().http_status().into_response(),
        };
        if let Some(cookie) = cookie {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
        response
    }
}

/// Runs validation, strategy dispatch and the redirect for every request to
/// the page.
pub struct RedirectController {
    config:    ProxyConfig,
    carrier:   Box<dyn StateCarrier>,
    streaming: StreamingProxy,
    persist:   FetchAndPersist,
    page:      PageRenderer,
}

impl fmt::Debug for RedirectController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedirectController")
            .field("config", &self.config)
            .field("carrier", &self.carrier.kind())
            .finish_non_exhaustive()
    }
}

impl RedirectController {
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let mut client = reqwest::Client::builder();
        if let Some(user_agent) = &config.user_agent {
            client = client.user_agent(user_agent.clone());
        }
        let client = client.build().context(ClientSnafu)?;

        Ok(Self {
            carrier: config.carrier.build(&config),
            streaming: StreamingProxy::new(client.clone(), &config),
            persist: FetchAndPersist::new(client, &config),
            page: PageRenderer::new()?,
            config,
        })
    }

    pub const fn config(&self) -> &ProxyConfig { &self.config }

    pub fn context(&self, headers: &HeaderMap, uri: &Uri) -> Result<RequestContext, ProxyError> {
        let request_url = request_url(headers, uri).map_err(|e| ProxyError::Validation {
            input:  uri.to_string(),
            reason: e.to_string(),
        })?;
        Ok(RequestContext {
            canonical: canonicalize(&request_url, &self.config.script_path),
            handle: CarrierHandle::from_request(headers, &request_url),
        })
    }

    /// `GET` on the page.
    ///
    /// With the query carrier a visit without a `method` parameter is first
    /// redirected to the canonical URL that carries one.
    pub async fn show(&self, ctx: RequestContext) -> Result<Outcome, ProxyError> {
        let handle = self.carrier.open(ctx.handle);
        let has_method = handle.method_param().is_some_and(|m| !m.is_empty());
        if self.carrier.kind() == CarrierKind::Query && !has_method {
            let strategy = self.carrier.strategy(&handle);
            let handle = self.carrier.put(handle, PendingState::silent(strategy));
            return Ok(Outcome::Redirect {
                location: self.carrier.location(&ctx.canonical, &handle),
                handle,
            });
        }
        self.render(&ctx.canonical, handle).await
    }

    /// `POST` on the page.
    pub async fn submit(
        &self,
        ctx: RequestContext,
        submission: Submission,
    ) -> Result<Outcome, ProxyError> {
        let mut cycle = Cycle::new();
        cycle.enter(Phase::Validating);

        let handle = self.carrier.open(ctx.handle);
        let Some(input) = submission.url else {
            cycle.enter(Phase::Completed);
            return self.render(&ctx.canonical, handle).await;
        };

        let sticky = self.carrier.strategy(&handle);
        let method = handle.method_param().map(str::to_owned);
        let strategy = select_strategy(
            submission.option.as_deref(),
            method.as_deref(),
            Some(sticky),
        );

        let request = match DownloadRequest::new(&input, strategy) {
            Ok(request) => request,
            Err(e) => {
                info!(input, "Rejected submission");
                // The radio choice of a rejected submission is not remembered.
                let prior = select_strategy(None, method.as_deref(), Some(sticky));
                cycle.enter(Phase::Completed);
                let state = PendingState::new(e.to_string(), prior);
                return Ok(self.redirect(&ctx.canonical, handle, state));
            }
        };

        cycle.enter(Phase::Executing);
        let outcome = match request.strategy {
            Strategy::File => {
                let message = self.fetch_to_storage(&request.url).await;
                let state = PendingState::new(message, Strategy::File);
                self.redirect(&ctx.canonical, handle, state)
            }
            Strategy::Memory => self.stream_to_client(&request.url, handle).await,
        };
        cycle.enter(Phase::Completed);
        Ok(outcome)
    }

    #[instrument(skip(self), fields(strategy = "file"))]
    async fn fetch_to_storage(&self, url: &Url) -> String {
        let started = Timestamp::now();
        match self.persist.run(url).await {
            Ok(stored) => {
                let elapsed = Timestamp::now().duration_since(started);
                success_message(url, &stored, elapsed.as_secs_f64())
            }
            Err(e) => {
                warn!(error = %e, chain = ?e.debug_chain(), "File download failed");
                match e {
                    ProxyError::StorageWrite { path, .. } => {
                        let name = path.file_name().map_or_else(
                            || path.display().to_string(),
                            |n| n.to_string_lossy().into_owned(),
                        );
                        format!("Failed to create the file: {name}")
                    }
                    _ => FAILED_TO_CONNECT.to_string(),
                }
            }
        }
    }

    #[instrument(skip(self, handle), fields(strategy = "memory"))]
    async fn stream_to_client(&self, url: &Url, handle: CarrierHandle) -> Outcome {
        match self.streaming.open(url).await {
            Ok(download) => Outcome::Stream {
                download,
                handle: self.carrier.put(handle, PendingState::silent(Strategy::Memory)),
            },
            Err(error) => {
                warn!(%error, "Memory download failed to open");
                Outcome::StreamFailed {
                    handle: self
                        .carrier
                        .put(handle, PendingState::new(UNABLE_TO_OPEN, Strategy::Memory)),
                    error,
                }
            }
        }
    }

    fn redirect(
        &self,
        canonical: &CanonicalUrl,
        handle: CarrierHandle,
        state: PendingState,
    ) -> Outcome {
        let handle = self.carrier.put(handle, state);
        Outcome::Redirect {
            location: self.carrier.location(canonical, &handle),
            handle,
        }
    }

    async fn render(
        &self,
        canonical: &CanonicalUrl,
        handle: CarrierHandle,
    ) -> Result<Outcome, ProxyError> {
        let message = self.carrier.take_message(&handle);
        let strategy = self.carrier.strategy(&handle);
        let clean_url = match self.carrier.kind() {
            CarrierKind::Query => canonical.with_strategy_param(strategy),
            CarrierKind::Session => canonical.as_url().clone(),
        };

        let hidden = [self.config.script_name()];
        let entries = match list_files(&self.config.storage_dir, &hidden).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    dir = %self.config.storage_dir.display(),
                    error = %e,
                    "Failed to list stored files"
                );
                Vec::new()
            }
        };

        let view = PageView {
            message,
            strategy,
            form_action: clean_url.to_string(),
            clean_url: clean_url.to_string(),
            replace_history: self.carrier.kind() == CarrierKind::Query,
            entries: entries
                .iter()
                .map(|entry| EntryView::new(entry, &self.config.files_route))
                .collect(),
        };
        Ok(Outcome::RenderForm {
            html: self.page.render(&view)?,
            handle: handle.without_message(),
        })
    }
}

fn success_message(url: &Url, stored: &StoredFile, seconds: f64) -> String {
    format!(
        "Downloaded {url} to {} ({}) in {seconds:.3} sec",
        stored.name(),
        format_bytes(stored.size_bytes, DEFAULT_PRECISION)
    )
}
