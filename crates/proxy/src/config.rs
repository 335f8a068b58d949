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

use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use mole_base::{ReadableSize, readable_size::ParseSizeError};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use smart_default::SmartDefault;

use crate::carrier::{CarrierKind, DEFAULT_SESSION_CAPACITY, DEFAULT_SESSION_IDLE};

/// Memory ceiling the streaming proxy sizes its chunks from.
///
/// Parses `-1` or `unlimited` as [`MemoryLimit::Unlimited`] and anything else
/// as a [`ReadableSize`] (`128M`, `64MiB`, `1048576`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryLimit {
    Unlimited,
    Bytes(ReadableSize),
}

impl Default for MemoryLimit {
    fn default() -> Self { Self::Bytes(ReadableSize::mb(128)) }
}

impl fmt::Display for MemoryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => f.write_str("-1"),
            Self::Bytes(size) => write!(f, "{size}"),
        }
    }
}

impl FromStr for MemoryLimit {
    type Err = ParseSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "-1" || s.eq_ignore_ascii_case("unlimited") {
            return Ok(Self::Unlimited);
        }
        s.parse().map(Self::Bytes)
    }
}

impl Serialize for MemoryLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MemoryLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LimitVisitor;

        impl de::Visitor<'_> for LimitVisitor {
            type Value = MemoryLimit;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("-1, \"unlimited\" or a size such as \"128MiB\"")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                match v {
                    -1 => Ok(MemoryLimit::Unlimited),
                    v => u64::try_from(v)
                        .map(|bytes| MemoryLimit::Bytes(ReadableSize(bytes)))
                        .map_err(|_| E::custom(format!("invalid memory limit {v}"))),
                }
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(MemoryLimit::Bytes(ReadableSize(v)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(LimitVisitor)
    }
}

/// Configuration of the proxy core.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, bon::Builder)]
#[serde(default)]
pub struct ProxyConfig {
    /// Directory stored files are written to and listed from
    #[default(_code = "PathBuf::from(\"downloads\")")]
    #[builder(default = PathBuf::from("downloads"), into)]
    pub storage_dir: PathBuf,

    /// Memory ceiling used to size streaming chunks
    #[builder(default)]
    pub memory_limit: MemoryLimit,

    /// Where the one-shot message lives between submit and render
    #[builder(default)]
    pub carrier: CarrierKind,

    /// Most sessions the session carrier keeps
    #[default(_code = "DEFAULT_SESSION_CAPACITY")]
    #[builder(default = DEFAULT_SESSION_CAPACITY)]
    pub session_capacity: u64,

    /// Sessions idle for longer are forgotten, e.g. `30m`
    #[default(_code = "DEFAULT_SESSION_IDLE")]
    #[builder(default = DEFAULT_SESSION_IDLE)]
    #[serde(with = "humantime_serde")]
    pub session_idle: Duration,

    /// Path of the page; every redirect targets it
    #[default = "/"]
    #[builder(default = "/".to_string(), into)]
    pub script_path: String,

    /// Route under which stored files are served
    #[default = "/files"]
    #[builder(default = "/files".to_string(), into)]
    pub files_route: String,

    /// Send downloads as `image/jpeg` named `<name>.jpg`
    #[default = true]
    #[builder(default = true)]
    pub disguise: bool,

    /// User-Agent for outbound requests
    #[builder(into)]
    pub user_agent: Option<String>,
}

impl ProxyConfig {
    /// Last segment of the script path, hidden from the directory listing.
    #[must_use]
    pub fn script_name(&self) -> &str {
        self.script_path
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_limit_parses_sentinel_and_sizes() {
        assert_eq!("-1".parse::<MemoryLimit>().unwrap(), MemoryLimit::Unlimited);
        assert_eq!(
            "Unlimited".parse::<MemoryLimit>().unwrap(),
            MemoryLimit::Unlimited
        );
        assert_eq!(
            "128M".parse::<MemoryLimit>().unwrap(),
            MemoryLimit::Bytes(ReadableSize::mb(128))
        );
        assert!("lots".parse::<MemoryLimit>().is_err());
    }

    #[test]
    fn loads_from_toml() {
        let config: ProxyConfig = toml::from_str(
            r#"
            storage_dir = "/srv/mole"
            memory_limit = -1
            carrier = "session"
            disguise = false
            "#,
        )
        .unwrap();
        assert_eq!(config.storage_dir, PathBuf::from("/srv/mole"));
        assert_eq!(config.memory_limit, MemoryLimit::Unlimited);
        assert_eq!(config.carrier, CarrierKind::Session);
        assert!(!config.disguise);
        assert_eq!(config.script_path, "/");

        let config: ProxyConfig = toml::from_str("memory_limit = \"64MiB\"").unwrap();
        assert_eq!(config.memory_limit, MemoryLimit::Bytes(ReadableSize::mb(64)));
        assert_eq!(config.session_idle, DEFAULT_SESSION_IDLE);
    }

    #[test]
    fn session_store_limits_load_from_toml() {
        let config: ProxyConfig = toml::from_str(
            r#"
            session_capacity = 500
            session_idle = "5m"
            "#,
        )
        .unwrap();
        assert_eq!(config.session_capacity, 500);
        assert_eq!(config.session_idle, Duration::from_secs(300));

        let written = toml::to_string(&config).unwrap();
        assert!(written.contains("session_idle = \"5m\""));
    }

    #[test]
    fn defaults_match_builder() {
        let built = ProxyConfig::builder().build();
        assert_eq!(built, ProxyConfig::default());
        assert_eq!(built.memory_limit, MemoryLimit::Bytes(ReadableSize::mb(128)));
        assert_eq!(built.carrier, CarrierKind::Query);
    }

    #[test]
    fn script_name_is_last_segment() {
        let config = ProxyConfig::builder().script_path("/tools/index.php").build();
        assert_eq!(config.script_name(), "index.php");
        assert_eq!(ProxyConfig::default().script_name(), "");
    }
}
