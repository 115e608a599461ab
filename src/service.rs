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


//! LCP service
//!
//! Entry point of the crate: validates licenses, authenticates passphrases
//! into decryption contexts and assembles publications.
//!
//! # Pipeline
//! ```text
//! asset + license bytes + passphrase?
//!   -> validate -> authenticate -> build publication -> rights check
//!   -> Publication
//! ```

use crate::asset::Asset;
use crate::config::LcpConfig;
use crate::crypto::{CipherAlgorithm, DecryptionContext, UserKey};
use crate::error::{CancelReason, LcpError, Result};
use crate::fetch::PackageFetcher;
use crate::license::{self, AuthenticationReason, Authenticator, License, PassphraseCache, SignatureVerifier};
use crate::publication::{self, Publication};
use crate::rights::{self, Usability};
use crate::storage::PassphraseStore;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct LcpService {
    config: LcpConfig,
    cache: Arc<PassphraseCache>,
    store: Option<PassphraseStore>,
    authenticator: Option<Arc<dyn Authenticator>>,
    verifier: Option<SignatureVerifier>,
}

impl LcpService {
    /// Create a service using the process-wide passphrase cache
    ///
    /// # Errors
    /// `InvalidConfiguration` if the config fails validation or the trusted
    /// provider key cannot be parsed.
    pub fn new(config: LcpConfig) -> Result<Self> {
        config.validate()?;
        let verifier = match &config.trusted_provider_key_pem {
            Some(pem) => Some(SignatureVerifier::from_pem(pem)?),
            None => None,
        };
        Ok(Self {
            config,
            cache: PassphraseCache::global(),
            store: None,
            authenticator: None,
            verifier,
        })
    }

    /// Use a private cache instead of the process-wide one
    pub fn with_cache(mut self, cache: Arc<PassphraseCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Persist validated keys and use them as candidates
    pub fn with_store(mut self, store: PassphraseStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Prompt through `authenticator` when no known passphrase works
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn config(&self) -> &LcpConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<PassphraseCache> {
        &self.cache
    }

    pub fn store(&self) -> Option<&PassphraseStore> {
        self.store.as_ref()
    }

    /// Parse and check a license document
    pub fn validate(&self, bytes: &[u8]) -> Result<License> {
        license::validate(bytes, self.verifier.as_ref())
    }

    /// Recover the content key of `license`
    ///
    /// Candidates are tried in order: the explicit passphrase, the cached key,
    /// keys from the passphrase store. If none unlocks the license and an
    /// authenticator is configured, the user is prompted up to
    /// `max_prompt_attempts` times.
    ///
    /// # Errors
    /// - `RightsRestricted` if the license is not usable right now
    /// - `WrongPassphrase` when every candidate and prompt failed
    /// - `AuthenticationCancelled` when the prompt was dismissed, `cancel`
    ///   fired, or the configured timeout elapsed
    pub async fn authenticate(
        &self,
        license: &License,
        passphrase: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<DecryptionContext> {
        if let Usability::Restricted(reason) = rights::check_license_at(license, Utc::now()) {
            return Err(LcpError::RightsRestricted(reason));
        }
        let license_id = license.id();

        if let Some(passphrase) = passphrase {
            let key = UserKey::from_passphrase(passphrase);
            if key.unlocks(license.key_check(), license_id) {
                debug!(license_id, source = "explicit", "passphrase accepted");
                return self.finish(license, key).await;
            }
            debug!(license_id, "explicit passphrase rejected");
        }

        if let Some(key) = self.cache.get(license_id) {
            if key.unlocks(license.key_check(), license_id) {
                debug!(license_id, source = "cache", "passphrase accepted");
                return self.finish(license, key).await;
            }
            self.cache.clear(Some(license_id));
        }

        if let Some(store) = &self.store {
            match store.candidates(license).await {
                Ok(keys) => {
                    for key in keys {
                        if key.unlocks(license.key_check(), license_id) {
                            debug!(license_id, source = "store", "passphrase accepted");
                            return self.finish(license, key).await;
                        }
                    }
                }
                Err(e) => warn!(license_id, error = %e, "passphrase store unavailable"),
            }
        }

        if let Some(authenticator) = &self.authenticator {
            let mut reason = AuthenticationReason::PassphraseNotFound;
            for attempt in 1..=self.config.max_prompt_attempts {
                let entered = self.prompt(authenticator.as_ref(), license, reason, cancel).await?;
                let key = UserKey::from_passphrase(&entered);
                if key.unlocks(license.key_check(), license_id) {
                    debug!(license_id, attempt, source = "prompt", "passphrase accepted");
                    return self.finish(license, key).await;
                }
                info!(license_id, attempt, "prompted passphrase rejected");
                reason = AuthenticationReason::InvalidPassphrase;
            }
        }

        Err(LcpError::WrongPassphrase {
            license_id: license_id.to_string(),
        })
    }

    async fn prompt(
        &self,
        authenticator: &dyn Authenticator,
        license: &License,
        reason: AuthenticationReason,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(LcpError::AuthenticationCancelled(CancelReason::Signal));
        }
        debug!(license_id = %license.id(), %reason, "prompting for passphrase");

        let request = authenticator.retrieve_passphrase(license, reason, cancel);
        let outcome = match self.config.auth_timeout {
            Some(limit) => tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LcpError::AuthenticationCancelled(CancelReason::Signal)),
                result = tokio::time::timeout(limit, request) => {
                    result.map_err(|_| LcpError::AuthenticationCancelled(CancelReason::Timeout))?
                }
            },
            None => tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LcpError::AuthenticationCancelled(CancelReason::Signal)),
                result = request => result,
            },
        };

        outcome.ok_or(LcpError::AuthenticationCancelled(CancelReason::User))
    }

    /// Unwrap the content key, then remember the user key
    async fn finish(&self, license: &License, key: UserKey) -> Result<DecryptionContext> {
        let algorithm = CipherAlgorithm::from_uri(license.content_key_algorithm()).ok_or_else(|| {
            LcpError::invalid_license(format!(
                "unsupported content key algorithm {}",
                license.content_key_algorithm()
            ))
        })?;
        let content_key = key
            .unwrap_content_key(license.encrypted_content_key())
            .map_err(|e| LcpError::invalid_license(format!("content key cannot be decrypted: {}", e)))?;

        self.cache.insert(license.id(), key);
        if let Some(store) = &self.store {
            if let Err(e) = store.save(license, &key).await {
                warn!(license_id = %license.id(), error = %e, "could not persist passphrase");
            }
        }

        info!(license_id = %license.id(), "license authenticated");
        Ok(DecryptionContext::new(license.id(), content_key, algorithm))
    }

    /// Drop cached keys for one license, or all of them
    ///
    /// Publications already opened keep working; their context holds its own
    /// copy of the content key.
    pub fn clear_cache(&self, license_id: Option<&str>) {
        self.cache.clear(license_id);
        debug!(license_id = license_id.unwrap_or("*"), "passphrase cache cleared");
    }

    /// Clear the cache and the persisted passphrases
    pub async fn forget_passphrases(&self, license_id: Option<&str>) -> Result<()> {
        self.clear_cache(license_id);
        if let Some(store) = &self.store {
            let removed = store.remove(license_id).await?;
            info!(license_id = license_id.unwrap_or("*"), removed, "stored passphrases removed");
        }
        Ok(())
    }

    /// Run the full pipeline for one asset
    ///
    /// `license_bytes` may be omitted when the package embeds its license.
    pub async fn open_publication(
        &self,
        asset: Asset,
        license_bytes: Option<&[u8]>,
        passphrase: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Publication> {
        let (location, format, container) = asset.into_parts();

        let license_bytes = match license_bytes {
            Some(bytes) => bytes.to_vec(),
            None => container
                .embedded_license()?
                .ok_or_else(|| LcpError::invalid_license("no license given and none embedded in the package"))?,
        };
        let license = self.validate(&license_bytes)?;
        let context = self.authenticate(&license, passphrase, cancel).await?;

        let publication = publication::build(container, context, license, format, &self.config)?;
        if let Usability::Restricted(reason) = rights::check_usable(&publication) {
            return Err(LcpError::RightsRestricted(reason));
        }

        info!(
            location = %location,
            license_id = %publication.license().id(),
            title = publication.metadata().title.as_deref().unwrap_or(""),
            "publication opened"
        );
        Ok(publication)
    }

    /// Validate a license and download the package it points at
    pub async fn acquire_publication(
        &self,
        fetcher: &dyn PackageFetcher,
        license_bytes: &[u8],
        progress: Option<watch::Sender<f64>>,
    ) -> Result<PathBuf> {
        let license = self.validate(license_bytes)?;
        fetcher.fetch(&license, progress).await
    }
}

impl std::fmt::Debug for LcpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LcpService")
            .field("config", &self.config)
            .field("cached_keys", &self.cache.len())
            .field("store", &self.store.is_some())
            .field("authenticator", &self.authenticator.is_some())
            .finish()
    }
}
