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


//! Reader configuration
//!
//! Tunables for the authentication and streaming pipeline. The defaults are
//! what a playback host wants; tests shrink the chunk window to exercise
//! block-boundary handling.

use crate::crypto::BLOCK_SIZE;
use crate::error::{LcpError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default ciphertext window per read step (1 MiB)
pub const DEFAULT_CHUNK_WINDOW: usize = 1024 * 1024;

/// Default number of times the authenticator is asked before giving up
pub const DEFAULT_MAX_PROMPT_ATTEMPTS: u32 = 3;

/// Configuration for LcpService and the publications it opens
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LcpConfig {
    /// Upper bound on ciphertext fetched and decrypted per read step
    pub chunk_window: usize,

    /// Bound on a single authenticator prompt (None = wait for cancellation)
    #[serde(with = "optional_secs")]
    pub auth_timeout: Option<Duration>,

    /// How many times the authenticator is asked before WrongPassphrase
    pub max_prompt_attempts: u32,

    /// PEM-encoded RSA public key of a trusted license provider.
    /// When set, license signatures are verified against it.
    pub trusted_provider_key_pem: Option<String>,
}

impl Default for LcpConfig {
    fn default() -> Self {
        Self {
            chunk_window: DEFAULT_CHUNK_WINDOW,
            auth_timeout: None,
            max_prompt_attempts: DEFAULT_MAX_PROMPT_ATTEMPTS,
            trusted_provider_key_pem: None,
        }
    }
}

impl LcpConfig {
    pub fn builder() -> LcpConfigBuilder {
        LcpConfigBuilder::new()
    }

    /// Load configuration from a JSON file; missing fields take defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the reader relies on
    pub fn validate(&self) -> Result<()> {
        if self.chunk_window < BLOCK_SIZE {
            return Err(LcpError::InvalidConfiguration(format!(
                "chunk_window must be at least {} bytes, got {}",
                BLOCK_SIZE, self.chunk_window
            )));
        }
        Ok(())
    }

    /// Chunk window rounded down to whole cipher blocks
    pub fn aligned_chunk_window(&self) -> usize {
        (self.chunk_window / BLOCK_SIZE).max(1) * BLOCK_SIZE
    }
}

/// Builder for LcpConfig
#[derive(Debug)]
pub struct LcpConfigBuilder {
    config: LcpConfig,
}

impl LcpConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: LcpConfig::default(),
        }
    }

    pub fn chunk_window(mut self, bytes: usize) -> Self {
        self.config.chunk_window = bytes;
        self
    }

    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.config.auth_timeout = Some(timeout);
        self
    }

    pub fn max_prompt_attempts(mut self, attempts: u32) -> Self {
        self.config.max_prompt_attempts = attempts;
        self
    }

    pub fn trusted_provider_key_pem<S: Into<String>>(mut self, pem: S) -> Self {
        self.config.trusted_provider_key_pem = Some(pem.into());
        self
    }

    pub fn build(self) -> Result<LcpConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for LcpConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

mod optional_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<f64> = Option::deserialize(deserializer)?;
        Ok(secs.filter(|s| *s > 0.0).map(Duration::from_secs_f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LcpConfig::default();
        assert_eq!(config.chunk_window, DEFAULT_CHUNK_WINDOW);
        assert_eq!(config.max_prompt_attempts, 3);
        assert!(config.auth_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_rejects_tiny_window() {
        let result = LcpConfig::builder().chunk_window(8).build();
        assert!(matches!(result, Err(LcpError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_aligned_window_rounds_down() {
        let config = LcpConfig::builder().chunk_window(250).build().unwrap();
        assert_eq!(config.aligned_chunk_window(), 240);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: LcpConfig =
            serde_json::from_str(r#"{"chunk_window": 4096, "auth_timeout": 2.5}"#).unwrap();
        assert_eq!(config.chunk_window, 4096);
        assert_eq!(config.auth_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.max_prompt_attempts, DEFAULT_MAX_PROMPT_ATTEMPTS);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lcp.json");
        std::fs::write(&path, r#"{"max_prompt_attempts": 1}"#).unwrap();
        let config = LcpConfig::from_json_file(&path).unwrap();
        assert_eq!(config.max_prompt_attempts, 1);
    }
}
