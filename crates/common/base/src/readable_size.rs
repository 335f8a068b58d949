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

//! Human readable byte sizes for configuration values such as
//! `max_body_size = "1MiB"` or `memory_limit = "128M"`.

use std::{fmt, num::ParseFloatError, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use snafu::{ResultExt, Snafu, ensure};

pub const B: u64 = 1;
pub const KIB: u64 = B * 1024;
pub const MIB: u64 = KIB * 1024;
pub const GIB: u64 = MIB * 1024;
pub const TIB: u64 = GIB * 1024;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ParseSizeError {
    #[snafu(display("Size string is empty"))]
    Empty,

    #[snafu(display("Invalid size number in {input:?}"))]
    Number {
        input:  String,
        source: ParseFloatError,
    },

    #[snafu(display("Unknown size unit {unit:?}"))]
    Unit { unit: String },

    #[snafu(display("Size {input:?} must not be negative"))]
    Negative { input: String },
}

/// A byte count that serializes as `"128MiB"` and parses the usual unit
/// spellings (`K`, `KB`, `KiB`, ... case-insensitive, all binary).
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::From,
    derive_more::Into,
)]
pub struct ReadableSize(pub u64);

impl ReadableSize {
    pub const fn b(count: u64) -> Self { Self(count) }

    pub const fn kb(count: u64) -> Self { Self(count * KIB) }

    pub const fn mb(count: u64) -> Self { Self(count * MIB) }

    pub const fn gb(count: u64) -> Self { Self(count * GIB) }

    pub const fn as_bytes(self) -> u64 { self.0 }

    pub const fn as_mb(self) -> u64 { self.0 / MIB }
}

impl fmt::Display for ReadableSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = self.0;
        if size == 0 {
            return write!(f, "0B");
        }
        for (unit, suffix) in [(TIB, "TiB"), (GIB, "GiB"), (MIB, "MiB"), (KIB, "KiB")] {
            if size % unit == 0 {
                return write!(f, "{}{suffix}", size / unit);
            }
        }
        write!(f, "{size}B")
    }
}

impl FromStr for ReadableSize {
    type Err = ParseSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        ensure!(!input.is_empty(), EmptySnafu);
        ensure!(!input.starts_with('-'), NegativeSnafu { input });

        let split = input
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(input.len());
        let (number, unit) = input.split_at(split);

        let unit = match unit.trim().to_ascii_lowercase().as_str() {
            "" | "b" => B,
            "k" | "kb" | "kib" => KIB,
            "m" | "mb" | "mib" => MIB,
            "g" | "gb" | "gib" => GIB,
            "t" | "tb" | "tib" => TIB,
            other => return UnitSnafu { unit: other }.fail(),
        };
        let number: f64 = number.parse().context(NumberSnafu { input })?;

        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let bytes = (number * unit as f64) as u64;
        Ok(Self(bytes))
    }
}

impl Serialize for ReadableSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReadableSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SizeVisitor;

        impl de::Visitor<'_> for SizeVisitor {
            type Value = ReadableSize;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte count or a size string such as \"128MiB\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(ReadableSize(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map(ReadableSize)
                    .map_err(|_| E::custom(format!("size {v} must not be negative")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(SizeVisitor)
    }
}
