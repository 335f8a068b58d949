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

//! The directory listing shown beside the form.

use std::{io, path::Path};

use mole_base::readable_size::{GIB, KIB, MIB, TIB};
use tokio::fs;

/// Names that never appear in the listing.
pub const IGNORED: [&str; 8] = [
    ".",
    "..",
    "LICENSE",
    ".git",
    "README.md",
    "VERSION",
    "img",
    "assets",
];

/// Decimal places used by [`format_bytes`] on the page.
pub const DEFAULT_PRECISION: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingEntry {
    pub name:       String,
    pub size_bytes: u64,
}

impl ListingEntry {
    pub fn display_size(&self) -> String { format_bytes(self.size_bytes, DEFAULT_PRECISION) }
}

/// Regular files in `dir`, sorted by name, minus [`IGNORED`] and `hidden`.
pub async fn list_files(dir: &Path, hidden: &[&str]) -> io::Result<Vec<ListingEntry>> {
    let mut entries = Vec::new();
    let mut read_dir = fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if IGNORED.contains(&name.as_str()) || hidden.contains(&name.as_str()) {
            continue;
        }
        let metadata = entry.metadata().await?;
        if metadata.is_file() {
            entries.push(ListingEntry {
                name,
                size_bytes: metadata.len(),
            });
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// `"<n> B"` below one KiB, otherwise the value in the largest binary unit
/// rounded to `precision` places with trailing zeros dropped.
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64, precision: usize) -> String {
    let (unit, name) = match bytes {
        b if b < KIB => return format!("{bytes} B"),
        b if b < MIB => (KIB, "KB"),
        b if b < GIB => (MIB, "MB"),
        b if b < TIB => (GIB, "GB"),
        _ => (TIB, "TB"),
    };
    let value = format!("{:.precision$}", bytes as f64 / unit as f64);
    let value = if value.contains('.') {
        value.trim_end_matches('0').trim_end_matches('.')
    } else {
        value.as_str()
    };
    format!("{value} {name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_binary_units() {
        assert_eq!(format_bytes(0, 2), "0 B");
        assert_eq!(format_bytes(1023, 2), "1023 B");
        assert_eq!(format_bytes(1024, 2), "1 KB");
        assert_eq!(format_bytes(1536, 2), "1.5 KB");
        assert_eq!(format_bytes(12345, 2), "12.06 KB");
        assert_eq!(format_bytes(5 * MIB, 2), "5 MB");
        assert_eq!(format_bytes(3 * GIB + GIB / 4, 2), "3.25 GB");
        assert_eq!(format_bytes(2 * TIB, 0), "2 TB");
    }

    #[tokio::test]
    async fn lists_regular_files_only_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.mp3.jpg"), [0u8; 10]).unwrap();
        std::fs::write(dir.path().join("a.zip.jpg"), [0u8; 2048]).unwrap();
        std::fs::write(dir.path().join("README.md"), "hi").unwrap();
        std::fs::write(dir.path().join("index"), "").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let entries = list_files(dir.path(), &["index"]).await.unwrap();
        assert_eq!(
            entries,
            vec![
                ListingEntry {
                    name:       "a.zip.jpg".to_string(),
                    size_bytes: 2048,
                },
                ListingEntry {
                    name:       "b.mp3.jpg".to_string(),
                    size_bytes: 10,
                },
            ]
        );
        assert_eq!(entries[0].display_size(), "2 KB");
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_files(&dir.path().join("gone"), &[]).await.is_err());
    }
}
