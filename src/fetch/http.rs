// LCP Core - Readium LCP package reader
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! HTTP package download
//!
//! Streams the response body to a `.part` file through a buffered writer,
//! hashing as it goes, then checks length and SHA-256 against the license
//! link before renaming the file into place.

use super::PackageFetcher;
use crate::error::{LcpError, Result};
use crate::license::{License, LicenseLink};
use crate::publication::Format;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

const DOWNLOAD_BUFF_SZ: usize = 64 * 1024;

/// Settings for HttpPackageFetcher
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// Directory the package is written to
    pub destination: PathBuf,
    /// Whole-request timeout
    pub timeout: Duration,
    /// Attempts after the first one for connection-level failures
    pub max_retries: u32,
}

impl HttpFetcherConfig {
    pub fn new<P: Into<PathBuf>>(destination: P) -> Self {
        Self {
            destination: destination.into(),
            timeout: Duration::from_secs(300),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpPackageFetcher {
    client: Client,
    config: HttpFetcherConfig,
}

impl HttpPackageFetcher {
    pub fn new(config: HttpFetcherConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    async fn download_once(
        &self,
        link: &LicenseLink,
        url: &Url,
        part_path: &Path,
        progress: Option<&watch::Sender<f64>>,
    ) -> Result<()> {
        let response = self.client.get(url.clone()).send().await?;
        if response.status() != StatusCode::OK {
            return Err(LcpError::DownloadFailed(format!(
                "{} answered {}",
                link.href,
                response.status()
            )));
        }

        let expected = link.length.or(response.content_length());
        let file = File::create(part_path).await?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_BUFF_SZ, file);
        let mut hasher = Sha256::new();
        let mut written = 0u64;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            hasher.update(&chunk);
            written += chunk.len() as u64;

            if let (Some(tx), Some(total)) = (progress, expected) {
                if total > 0 {
                    tx.send_replace((written as f64 / total as f64).min(1.0));
                }
            }
        }
        writer.flush().await?;

        verify_download(link, written, &hasher.finalize())
    }
}

/// Check the downloaded length and hash against the license link
pub(crate) fn verify_download(link: &LicenseLink, written: u64, digest: &[u8]) -> Result<()> {
    if let Some(length) = link.length {
        if length != written {
            return Err(LcpError::DownloadFailed(format!(
                "expected {} bytes, received {}",
                length, written
            )));
        }
    }
    if let Some(hash) = &link.hash {
        if BASE64.encode(digest) != hash.trim() {
            return Err(LcpError::DownloadFailed("package hash does not match the license".to_string()));
        }
    }
    Ok(())
}

/// Parse the publication link; only http(s) downloads are supported
pub(crate) fn download_url(link: &LicenseLink) -> Result<Url> {
    let url = Url::parse(&link.href)
        .map_err(|e| LcpError::invalid_license(format!("publication link '{}': {}", link.href, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(LcpError::DownloadFailed(format!("unsupported URL scheme '{}'", other))),
    }
}

/// File extension for a downloaded package
pub(crate) fn package_extension(media_type: Option<&str>) -> &'static str {
    match media_type.and_then(Format::from_media_type) {
        Some(Format::Epub) => "epub",
        Some(Format::Audiobook) => "lcpa",
        Some(Format::Pdf) => "lcpdf",
        Some(Format::WebPub) | None => "webpub",
    }
}

fn is_retryable(err: &LcpError) -> bool {
    match err {
        LcpError::Http(e) => e.is_connect() || e.is_timeout() || e.is_body(),
        _ => false,
    }
}

#[async_trait]
impl PackageFetcher for HttpPackageFetcher {
    async fn fetch(&self, license: &License, progress: Option<watch::Sender<f64>>) -> Result<PathBuf> {
        let link = license
            .publication_link()
            .ok_or_else(|| LcpError::invalid_license("license has no publication link"))?;
        let url = download_url(link)?;

        tokio::fs::create_dir_all(&self.config.destination).await?;
        let file_name = format!("{}.{}", Uuid::new_v4(), package_extension(link.media_type.as_deref()));
        let final_path = self.config.destination.join(&file_name);
        let part_path = self.config.destination.join(format!("{}.part", file_name));

        info!(license_id = %license.id(), url = %link.href, "downloading package");
        let mut attempt = 0;
        loop {
            match self.download_once(link, &url, &part_path, progress.as_ref()).await {
                Ok(()) => break,
                Err(e) => {
                    let _ = tokio::fs::remove_file(&part_path).await;
                    if attempt < self.config.max_retries && is_retryable(&e) {
                        attempt += 1;
                        let backoff = Duration::from_secs(2u64.pow(attempt.min(5)));
                        warn!(license_id = %license.id(), attempt, error = %e, "download failed, retrying");
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        tokio::fs::rename(&part_path, &final_path).await?;
        if let Some(tx) = &progress {
            tx.send_replace(1.0);
        }
        debug!(path = %final_path.display(), "package downloaded");
        Ok(final_path)
    }
}
