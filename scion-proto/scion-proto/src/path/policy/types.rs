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

use std::{fmt::Display, str::FromStr};

use crate::{
    address::{Asn, Isd, IsdAsn},
    path::{HopCrossing, InterfaceId, policy::PolicyError},
};

/// A Predicate to check a hop interface against
///
/// Is either a wildcard (0) or a specific value
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct InterfacePredicate(u64);
impl InterfacePredicate {
    /// The wildcard predicate
    pub const ANY: InterfacePredicate = InterfacePredicate(0);

    /// Creates a new hop interface predicate
    ///
    /// 0 is deemed as a wildcard
    ///
    /// all other values have to match exactly
    pub fn new(interface: u64) -> Self {
        Self(interface)
    }

    /// Checks if given interface matches the predicate
    pub fn matches(&self, interface: InterfaceId) -> bool {
        self.is_wildcard() || self.0 == interface.0
    }

    /// Returns true if this is a wildcard and matches against any interface
    pub fn is_wildcard(&self) -> bool {
        self.0 == 0
    }

    /// Returns the contained value
    pub fn into_inner(&self) -> u64 {
        self.0
    }
}
impl From<u64> for InterfacePredicate {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

/// Predicate to check hop crossings against
///
/// Every field is either an exact value or the wildcard `0`.
///
/// String Format:
/// - "0"             - Match any hop
/// - "1"             - Just match ISD
/// - "1-ff00:0:133"  - Match ISD and ASN
/// - "1-ff00:0:133#3" - Match ISD, ASN and interface
/// - "0-0#3"         - Match interface 3 in any AS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HopPredicate {
    /// The ISD to match against
    pub isd: Isd,
    /// The ASN to match against
    pub asn: Asn,
    /// The interface to match against
    pub interface: InterfacePredicate,
}
impl HopPredicate {
    /// A predicate matching every hop
    pub const ANY: HopPredicate = HopPredicate {
        isd: Isd::WILDCARD,
        asn: Asn::WILDCARD,
        interface: InterfacePredicate::ANY,
    };

    /// Creates a new hop predicate
    pub fn new(isd: Isd, asn: Asn, interface: impl Into<InterfacePredicate>) -> Self {
        Self {
            isd,
            asn,
            interface: interface.into(),
        }
    }

    /// Creates a predicate matching exactly the given hop crossing
    pub fn exact(hop: &HopCrossing) -> Self {
        Self::new(hop.isd_asn.isd(), hop.isd_asn.asn(), hop.interface.0)
    }

    /// Checks if the predicate matches the given AS and interface
    pub fn matches_parts(&self, isd_asn: IsdAsn, interface: InterfaceId) -> bool {
        self.isd.matches(isd_asn.isd())
            && self.asn.matches(isd_asn.asn())
            && self.interface.matches(interface)
    }

    /// Checks if the predicate matches the given hop crossing
    pub fn matches(&self, hop: &HopCrossing) -> bool {
        self.matches_parts(hop.isd_asn, hop.interface)
    }

    /// Returns true if this is a wildcard predicate which matches any hop
    pub fn is_wildcard(&self) -> bool {
        self.isd.is_wildcard() && self.asn.is_wildcard() && self.interface.is_wildcard()
    }
}
impl FromStr for HopPredicate {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| {
            PolicyError::InvalidPredicate {
                input: s.to_string(),
                reason,
            }
        };

        let (isd_asn, interface) = match s.split_once('#') {
            Some((isd_asn, interface)) => (isd_asn, Some(interface)),
            None => (s, None),
        };

        let (isd, asn) = match isd_asn.split_once('-') {
            Some((isd, asn)) => (isd, Some(asn)),
            None => (isd_asn, None),
        };

        let isd = Isd::from_str(isd).map_err(|e| invalid(e.to_string()))?;
        let asn = match asn {
            Some(asn) => Asn::from_str(asn).map_err(|e| invalid(e.to_string()))?,
            None if interface.is_some() => {
                return Err(invalid("interface requires an ASN".into()));
            }
            None => Asn::WILDCARD,
        };
        let interface = match interface {
            Some(interface) => {
                u64::from_str(interface)
                    .map(InterfacePredicate::new)
                    .map_err(|e| invalid(e.to_string()))?
            }
            None => InterfacePredicate::ANY,
        };

        Ok(Self {
            isd,
            asn,
            interface,
        })
    }
}
impl Display for HopPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.isd)?;
        if !self.asn.is_wildcard() || !self.interface.is_wildcard() {
            write!(f, "-{}", self.asn)?;
        }
        if !self.interface.is_wildcard() {
            write!(f, "#{}", self.interface.0)?;
        }
        Ok(())
    }
}
