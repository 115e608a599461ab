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


//! Passphrase persistence
//!
//! SQLite via sqlx. The only table holds hex user keys (SHA-256 of the
//! passphrase) per license; clear passphrases are never stored.

pub mod database;
pub mod migrations;
pub mod passphrases;

pub use database::Database;
pub use passphrases::PassphraseStore;
