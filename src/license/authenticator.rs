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


//! Host-side passphrase prompt

use super::document::License;
use async_trait::async_trait;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Why the user is being asked for a passphrase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationReason {
    /// No explicit, cached or stored passphrase unlocked the license
    PassphraseNotFound,
    /// The passphrase from the previous prompt was wrong
    InvalidPassphrase,
}

impl fmt::Display for AuthenticationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthenticationReason::PassphraseNotFound => f.write_str("passphrase not found"),
            AuthenticationReason::InvalidPassphrase => f.write_str("invalid passphrase"),
        }
    }
}

/// Asks the user for the clear passphrase of a license
///
/// Return `None` when the user dismisses the prompt. Implementations should
/// also stop waiting once `cancel` fires; the service stops waiting on them
/// regardless.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn retrieve_passphrase(
        &self,
        license: &License,
        reason: AuthenticationReason,
        cancel: &CancellationToken,
    ) -> Option<String>;
}
