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


//! Package acquisition
//!
//! Downloading the encrypted package named by a license's `publication`
//! link. The package stays encrypted on disk; only the reader ever sees
//! plaintext, and only in memory.

pub mod http;

pub use http::{HttpPackageFetcher, HttpFetcherConfig};

use crate::error::Result;
use crate::license::License;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::watch;

/// Fetches the package a license points at
///
/// Progress is published as a fraction in `[0, 1]` on a watch channel, so a
/// slow observer never holds up the transfer.
#[async_trait]
pub trait PackageFetcher: Send + Sync {
    async fn fetch(&self, license: &License, progress: Option<watch::Sender<f64>>) -> Result<PathBuf>;
}
