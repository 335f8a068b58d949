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

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// How a submitted URL is delivered to the browser.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Strategy {
    /// Stream the remote bytes through to the client.
    #[default]
    Memory,
    /// Store the remote resource on disk and list it for later pickup.
    File,
}

impl Strategy {
    /// Reads the `option` form field. Only the exact value `file` selects
    /// [`Strategy::File`].
    pub fn from_form(value: &str) -> Self {
        if value == "file" { Self::File } else { Self::Memory }
    }

    /// Reads the `method` query parameter, ignoring case.
    pub fn from_query(value: &str) -> Self { value.parse().unwrap_or_default() }
}

/// Picks the strategy for a request.
///
/// A submitted form value wins, then a non-empty `method` query value, then
/// whatever the state carrier remembered, then [`Strategy::Memory`].
/// Unrecognised values fall back to [`Strategy::Memory`] instead of
/// consulting the next source.
pub fn select_strategy(
    form_option: Option<&str>,
    query_method: Option<&str>,
    sticky: Option<Strategy>,
) -> Strategy {
    if let Some(value) = form_option {
        return Strategy::from_form(value);
    }
    if let Some(value) = query_method.filter(|value| !value.is_empty()) {
        return Strategy::from_query(value);
    }
    sticky.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_value_wins_over_everything() {
        let chosen = select_strategy(Some("file"), Some("memory"), Some(Strategy::Memory));
        assert_eq!(chosen, Strategy::File);

        let chosen = select_strategy(Some("memory"), Some("file"), Some(Strategy::File));
        assert_eq!(chosen, Strategy::Memory);
    }

    #[test]
    fn query_value_wins_over_sticky() {
        let chosen = select_strategy(None, Some("FILE"), Some(Strategy::Memory));
        assert_eq!(chosen, Strategy::File);

        let chosen = select_strategy(None, Some("memory"), Some(Strategy::File));
        assert_eq!(chosen, Strategy::Memory);
    }

    #[test]
    fn sticky_value_wins_over_default() {
        assert_eq!(select_strategy(None, None, Some(Strategy::File)), Strategy::File);
        assert_eq!(select_strategy(None, Some(""), Some(Strategy::File)), Strategy::File);
        assert_eq!(select_strategy(None, None, None), Strategy::Memory);
    }

    #[test]
    fn unknown_values_fall_back_to_memory() {
        assert_eq!(select_strategy(Some("torrent"), None, Some(Strategy::File)), Strategy::Memory);
        assert_eq!(select_strategy(Some("FILE"), None, None), Strategy::Memory);
        assert_eq!(select_strategy(None, Some("ftp"), Some(Strategy::File)), Strategy::Memory);
    }

    #[test]
    fn renders_lowercase() {
        assert_eq!(Strategy::File.to_string(), "file");
        assert_eq!(Strategy::Memory.as_ref(), "memory");
    }
}
