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

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use snafu::ResultExt;
use tera::{Context, Tera};

use crate::{
    error::{ProxyError, RenderSnafu},
    listing::ListingEntry,
    strategy::Strategy,
};

const TEMPLATE_NAME: &str = "page.html";
const TEMPLATE: &str = include_str!("../templates/page.html");

/// Characters left alone when a stored file name becomes a link.
const FILE_NAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Everything the page shows for one render.
#[derive(Debug, Serialize)]
pub(crate) struct PageView {
    pub message:         Option<String>,
    pub strategy:        Strategy,
    /// Where the form posts to.
    pub form_action:     String,
    /// The message-free address of this page.
    pub clean_url:       String,
    /// Rewrite the history entry to `clean_url` once rendered.
    pub replace_history: bool,
    pub entries:         Vec<EntryView>,
}

#[derive(Debug, Serialize)]
pub(crate) struct EntryView {
    name: String,
    href: String,
    size: String,
}

impl EntryView {
    pub fn new(entry: &ListingEntry, files_route: &str) -> Self {
        Self {
            href: format!(
                "{}/{}",
                files_route.trim_end_matches('/'),
                utf8_percent_encode(&entry.name, FILE_NAME)
            ),
            size: entry.display_size(),
            name: entry.name.clone(),
        }
    }
}

/// The compiled page template. Values are HTML-escaped on render.
#[derive(Debug)]
pub(crate) struct PageRenderer {
    tera: Tera,
}

impl PageRenderer {
    pub fn new() -> Result<Self, ProxyError> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, TEMPLATE)
            .context(RenderSnafu)?;
        Ok(Self { tera })
    }

    pub fn render(&self, view: &PageView) -> Result<String, ProxyError> {
        let context = Context::from_serialize(view).context(RenderSnafu)?;
        self.tera.render(TEMPLATE_NAME, &context).context(RenderSnafu)
    }
}
