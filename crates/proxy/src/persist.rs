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

use std::path::{Path, PathBuf};

use snafu::ResultExt;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{info, warn};
use url::Url;

use crate::{
    config::ProxyConfig,
    error::{ProxyError, StorageWriteSnafu, UnreachableSnafu},
    naming::{disguised_filename, remote_basename},
};

/// A download written to the storage directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredFile {
    pub path:       PathBuf,
    pub size_bytes: u64,
}

impl StoredFile {
    /// File name relative to the storage directory.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// File mode: fetch the whole body, following redirects, and store it as
/// `<basename>.jpg`. Response headers are discarded.
#[derive(Clone, Debug)]
pub struct FetchAndPersist {
    client:      reqwest::Client,
    storage_dir: PathBuf,
    disguise:    bool,
}

impl FetchAndPersist {
    pub fn new(client: reqwest::Client, config: &ProxyConfig) -> Self {
        Self {
            client,
            storage_dir: config.storage_dir.clone(),
            disguise: config.disguise,
        }
    }

    /// The path a download of `url` is stored at.
    pub fn target_path(&self, url: &Url) -> PathBuf {
        let name = if self.disguise {
            disguised_filename(url)
        } else {
            remote_basename(url)
        };
        self.storage_dir.join(name)
    }

    pub async fn run(&self, url: &Url) -> Result<StoredFile, ProxyError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .context(UnreachableSnafu { url: url.as_str() })?;

        // Error pages are stored too; only a failed transfer counts as a failure.
        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "Upstream answered with an error status, storing body anyway");
        }

        let body = response
            .bytes()
            .await
            .context(UnreachableSnafu { url: url.as_str() })?;

        let path = self.target_path(url);
        if let Err(e) = write_file(&path, &body).await {
            let _ = fs::remove_file(&path).await;
            return Err(e).context(StorageWriteSnafu { path });
        }

        info!(%url, path = %path.display(), bytes = body.len(), "Stored remote resource");
        Ok(StoredFile {
            path,
            size_bytes: body.len() as u64,
        })
    }
}

async fn write_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persist_into(dir: &Path, disguise: bool) -> FetchAndPersist {
        let config = ProxyConfig::builder()
            .storage_dir(dir)
            .disguise(disguise)
            .build();
        FetchAndPersist::new(reqwest::Client::new(), &config)
    }

    #[test]
    fn target_path_appends_jpg_unless_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::parse("http://h/archive.tar.gz").unwrap();

        assert_eq!(
            persist_into(dir.path(), true).target_path(&url),
            dir.path().join("archive.tar.gz.jpg")
        );
        assert_eq!(
            persist_into(dir.path(), false).target_path(&url),
            dir.path().join("archive.tar.gz")
        );
    }

    #[tokio::test]
    async fn write_file_stores_all_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3.jpg");
        write_file(&path, &[1u8; 12345]).await.unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 12345);

        let stored = StoredFile {
            path,
            size_bytes: 12345,
        };
        assert_eq!(stored.name(), "song.mp3.jpg");
    }

    #[tokio::test]
    async fn write_file_fails_in_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("a.jpg");
        assert!(write_file(&path, b"x").await.is_err());
    }
}
