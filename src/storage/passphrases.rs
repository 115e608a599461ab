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


//! Persisted passphrase store
//!
//! Remembers user keys that unlocked a license so the user is not prompted
//! again after a restart. Keys for other licenses of the same user at the same
//! provider are offered as candidates too, since providers usually reuse one
//! passphrase per user.

use super::Database;
use crate::crypto::UserKey;
use crate::error::Result;
use crate::license::License;
use chrono::Utc;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PassphraseStore {
    db: Database,
}

impl PassphraseStore {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            db: Database::new(path).await?,
        })
    }

    pub async fn in_memory() -> Result<Self> {
        Ok(Self {
            db: Database::new_in_memory().await?,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Remember a validated key for a license (insert or replace)
    pub async fn save(&self, license: &License, key: &UserKey) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO passphrases (license_id, provider, user_id, user_key, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(license_id) DO UPDATE SET
                user_key = excluded.user_key,
                user_id = excluded.user_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(license.id())
        .bind(license.provider())
        .bind(license.user().id.as_deref())
        .bind(key.to_hex())
        .bind(&now)
        .bind(&now)
        .execute(self.db.pool())
        .await?;

        debug!(license_id = %license.id(), "passphrase stored");
        Ok(())
    }

    /// Key stored for exactly this license
    pub async fn load(&self, license_id: &str) -> Result<Option<UserKey>> {
        let hex_key: Option<String> = sqlx::query_scalar("SELECT user_key FROM passphrases WHERE license_id = ?")
            .bind(license_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(hex_key.and_then(|h| parse_key(license_id, &h)))
    }

    /// Stored keys worth trying for a license, most specific first
    pub async fn candidates(&self, license: &License) -> Result<Vec<UserKey>> {
        let mut keys = Vec::new();
        if let Some(key) = self.load(license.id()).await? {
            keys.push(key);
        }

        if let Some(user_id) = license.user().id.as_deref() {
            let rows: Vec<(String, String)> = sqlx::query_as(
                r#"
                SELECT license_id, user_key FROM passphrases
                WHERE provider = ? AND user_id = ? AND license_id != ?
                ORDER BY updated_at DESC
                "#,
            )
            .bind(license.provider())
            .bind(user_id)
            .bind(license.id())
            .fetch_all(self.db.pool())
            .await?;

            for (other_id, hex_key) in rows {
                if let Some(key) = parse_key(&other_id, &hex_key) {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
            }
        }
        Ok(keys)
    }

    /// Delete the key of one license, or all keys when `license_id` is None
    pub async fn remove(&self, license_id: Option<&str>) -> Result<u64> {
        let result = match license_id {
            Some(id) => {
                sqlx::query("DELETE FROM passphrases WHERE license_id = ?")
                    .bind(id)
                    .execute(self.db.pool())
                    .await?
            }
            None => sqlx::query("DELETE FROM passphrases").execute(self.db.pool()).await?,
        };
        Ok(result.rows_affected())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM passphrases")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }
}

fn parse_key(license_id: &str, hex_key: &str) -> Option<UserKey> {
    let key = UserKey::from_hex(hex_key);
    if key.is_none() {
        warn!(license_id, "ignoring malformed stored passphrase");
    }
    key
}
