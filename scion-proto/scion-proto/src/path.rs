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

//! SCION paths as ordered sequences of hop crossings.
//!
//! A [`Path`] is identified by its [`PathFingerprint`], the exact ordered list of
//! [`HopCrossing`]s it traverses. Paths are collected into immutable [`PathSet`]s which are
//! filtered by [`policy`]s and pruned on revocations.

use std::{
    fmt,
    str::FromStr,
    time::{Duration, SystemTime},
};

use crate::address::{AddressParseError, IsdAsn};

mod fingerprint;
/// Path policies filtering paths by the hops they cross
pub mod policy;
mod set;
pub mod test_builder;

pub use fingerprint::PathFingerprint;
pub use set::PathSet;

/// Errors that can occur when constructing a path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// A path must cross at least one interface.
    #[error("path has no hops")]
    Empty,
    /// A hop crossing could not be parsed.
    #[error("invalid hop crossing {0:?}, expected <isd>-<asn>#<interface>")]
    InvalidHopCrossing(String),
    /// The ISD-AS of a hop crossing could not be parsed.
    #[error(transparent)]
    Address(#[from] AddressParseError),
}

/// An AS local interface identifier.
///
/// Identifiers are only unique within one AS. `0` is never assigned to an interface and is used
/// as the wildcard in hop predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct InterfaceId(pub u64);

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for InterfaceId {
    fn from(value: u64) -> Self {
        InterfaceId(value)
    }
}

/// A single interface traversal: the AS that is crossed and the local interface used.
///
/// String Format: `<isd>-<asn>#<interface>`, e.g. `1-ff00:0:130#1002`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HopCrossing {
    /// The AS being crossed.
    pub isd_asn: IsdAsn,
    /// The AS local interface.
    pub interface: InterfaceId,
}

impl HopCrossing {
    /// Creates a new hop crossing.
    pub fn new(isd_asn: IsdAsn, interface: impl Into<InterfaceId>) -> Self {
        Self {
            isd_asn,
            interface: interface.into(),
        }
    }
}

impl FromStr for HopCrossing {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((isd_asn, interface)) = s.split_once('#') else {
            return Err(PathError::InvalidHopCrossing(s.to_string()));
        };

        let isd_asn = IsdAsn::from_str(isd_asn)?;
        let interface = match u64::from_str(interface) {
            // 0 is the interface wildcard, never a crossed interface
            Ok(0) | Err(_) => return Err(PathError::InvalidHopCrossing(s.to_string())),
            Ok(interface) => interface,
        };

        Ok(Self::new(isd_asn, interface))
    }
}

impl fmt::Display for HopCrossing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.isd_asn, self.interface)
    }
}

/// Parses a whitespace separated list of hop crossings.
///
/// ```
/// use scion_proto::path::parse_hops;
///
/// let hops = parse_hops("1-ff00:0:111#105 1-ff00:0:130#1002").unwrap();
/// assert_eq!(hops.len(), 2);
/// ```
pub fn parse_hops(s: &str) -> Result<Vec<HopCrossing>, PathError> {
    s.split_whitespace().map(HopCrossing::from_str).collect()
}

/// An end to end SCION path.
///
/// The hop sequence is never empty. Paths compare equal for deduplication purposes if their
/// [`PathFingerprint`]s are equal, regardless of other metadata.
#[derive(Debug, Clone)]
pub struct Path {
    /// The AS the path starts in.
    pub src: IsdAsn,
    /// The AS the path ends in.
    pub dst: IsdAsn,
    fingerprint: PathFingerprint,
    /// Time at which the path stops being usable.
    pub expiration: SystemTime,
    /// Path MTU as reported by the resolution service, 0 if unknown.
    pub mtu: u16,
}

impl Path {
    /// Creates a new path from its hop crossings.
    ///
    /// Returns [`PathError::Empty`] if `hops` is empty.
    pub fn new(hops: Vec<HopCrossing>, expiration: SystemTime) -> Result<Self, PathError> {
        let (Some(first), Some(last)) = (hops.first(), hops.last()) else {
            return Err(PathError::Empty);
        };

        Ok(Self {
            src: first.isd_asn,
            dst: last.isd_asn,
            fingerprint: PathFingerprint::new(hops),
            expiration,
            mtu: 0,
        })
    }

    /// Sets the path MTU.
    pub fn with_mtu(mut self, mtu: u16) -> Self {
        self.mtu = mtu;
        self
    }

    /// Returns the fingerprint of this path.
    pub fn fingerprint(&self) -> &PathFingerprint {
        &self.fingerprint
    }

    /// Returns the ordered hop crossings of this path.
    pub fn hops(&self) -> &[HopCrossing] {
        self.fingerprint.hops()
    }

    /// The AS the path starts in.
    pub fn source(&self) -> IsdAsn {
        self.src
    }

    /// The AS the path ends in.
    pub fn destination(&self) -> IsdAsn {
        self.dst
    }

    /// Returns true if the path crosses `hop` anywhere.
    pub fn contains_hop(&self, hop: &HopCrossing) -> bool {
        self.hops().contains(hop)
    }

    /// Returns true if the path is expired at `now`.
    ///
    /// A path expiring exactly at `now` is expired.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expiration <= now
    }

    /// Remaining lifetime at `now`, zero if expired.
    pub fn remaining_lifetime(&self, now: SystemTime) -> Duration {
        self.expiration
            .duration_since(now)
            .unwrap_or(Duration::ZERO)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fingerprint)
    }
}
