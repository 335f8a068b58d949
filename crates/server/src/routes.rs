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

//! The page itself and the stored-file route.

use std::sync::Arc;

use axum::{
    Form, Router,
    extract::{OriginalUri, State},
    http::HeaderMap,
    routing::get,
};
use mole_proxy::{Outcome, ProxyError, RedirectController, Submission};
use tower_http::services::ServeDir;
use tracing::instrument;

/// Mounts the page at the configured script path and the storage directory
/// under the files route.
pub fn page_routes(controller: Arc<RedirectController>) -> Router {
    let config = controller.config();
    let files = ServeDir::new(&config.storage_dir);
    let script_path = config.script_path.clone();
    let files_route = config.files_route.trim_end_matches('/').to_string();

    Router::new()
        .route(&script_path, get(show_page).post(submit_form))
        .nest_service(&files_route, files)
        .with_state(controller)
}

#[instrument(skip_all, fields(uri = %uri))]
async fn show_page(
    State(controller): State<Arc<RedirectController>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Result<Outcome, ProxyError> {
    let ctx = controller.context(&headers, &uri)?;
    controller.show(ctx).await
}

#[instrument(skip_all, fields(uri = %uri))]
async fn submit_form(
    State(controller): State<Arc<RedirectController>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Form(submission): Form<Submission>,
) -> Result<Outcome, ProxyError> {
    let ctx = controller.context(&headers, &uri)?;
    controller.submit(ctx, submission).await
}
