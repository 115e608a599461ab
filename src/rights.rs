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


//! Go/no-go usability check
//!
//! Only the license status and the rights period take part. Print and copy
//! counters are reported by the license but not enforced here.

use crate::license::{License, LicenseStatus};
use crate::publication::Publication;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Usability {
    Usable,
    Restricted(String),
}

impl Usability {
    pub fn is_usable(&self) -> bool {
        matches!(self, Usability::Usable)
    }
}

pub fn check_usable(publication: &Publication) -> Usability {
    check_usable_at(publication, Utc::now())
}

pub fn check_usable_at(publication: &Publication, now: DateTime<Utc>) -> Usability {
    check_license_at(publication.license(), now)
}

/// Rights check on the license alone, before anything is decrypted
pub fn check_license_at(license: &License, now: DateTime<Utc>) -> Usability {
    let status = license.status();
    if status != LicenseStatus::Active {
        return Usability::Restricted(format!("license status is {}", status));
    }

    let rights = license.rights();
    if let Some(start) = rights.start {
        if start > now {
            return Usability::Restricted(format!("license is not valid before {}", start.to_rfc3339()));
        }
    }
    if let Some(end) = rights.end {
        if end < now {
            return Usability::Restricted(format!("license ended on {}", end.to_rfc3339()));
        }
    }
    Usability::Usable
}
