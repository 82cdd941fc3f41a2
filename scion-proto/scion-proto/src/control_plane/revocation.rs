// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Interface revocations.
//!
//! A revocation announces that a [`HopCrossing`] can no longer be used. Revocations are signed by
//! the AS owning the interface; verifying the signature is left to the path resolution service,
//! which answers with a [`RevocationVerdict`].

use std::{
    fmt,
    time::{Duration, SystemTime},
};

use bytes::Bytes;

use crate::path::HopCrossing;

/// The content of a revocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationInfo {
    /// The revoked interface.
    pub hop: HopCrossing,
    /// Time the revocation was issued.
    pub timestamp: SystemTime,
    /// How long the revocation is valid after issuance.
    pub ttl: Duration,
}

impl RevocationInfo {
    /// Default validity of a revocation.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

    /// Creates a revocation for `hop` issued at `timestamp`.
    pub fn new(hop: HopCrossing, timestamp: SystemTime, ttl: Duration) -> Self {
        Self {
            hop,
            timestamp,
            ttl,
        }
    }

    /// Time at which the revocation stops being valid.
    pub fn expiration(&self) -> SystemTime {
        self.timestamp + self.ttl
    }

    /// Returns true if the revocation is no longer valid at `now`.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expiration() <= now
    }
}

impl fmt::Display for RevocationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "revocation of {} (ttl {:?})", self.hop, self.ttl)
    }
}

/// A revocation together with its signature.
///
/// The signature is opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRevocation {
    info: RevocationInfo,
    signature: Bytes,
}

impl SignedRevocation {
    /// Creates a signed revocation.
    pub fn new(info: RevocationInfo, signature: Bytes) -> Self {
        Self { info, signature }
    }

    /// Creates a revocation with an empty signature, for tests and trusted local sources.
    pub fn unsigned(info: RevocationInfo) -> Self {
        Self::new(info, Bytes::new())
    }

    /// The revocation content.
    pub fn info(&self) -> &RevocationInfo {
        &self.info
    }

    /// The revoked hop.
    pub fn hop(&self) -> &HopCrossing {
        &self.info.hop
    }

    /// The raw signature.
    pub fn signature(&self) -> &Bytes {
        &self.signature
    }
}

/// Verdict of the path resolution service on a revocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RevocationVerdict {
    /// The revocation is authentic and current.
    Valid,
    /// The revocation failed verification.
    Invalid,
    /// The revocation is authentic but no longer current.
    Stale,
    /// The service could not decide, e.g. because key material is missing.
    Unknown,
}

impl RevocationVerdict {
    /// Returns true if paths crossing the revoked hop have to be dropped.
    ///
    /// `Unknown` drops paths too, serving a possibly defunct path is worse than losing one.
    pub fn requires_removal(&self) -> bool {
        matches!(self, RevocationVerdict::Valid | RevocationVerdict::Unknown)
    }
}

impl fmt::Display for RevocationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RevocationVerdict::Valid => "valid",
            RevocationVerdict::Invalid => "invalid",
            RevocationVerdict::Stale => "stale",
            RevocationVerdict::Unknown => "unknown",
        };
        f.write_str(s)
    }
}
