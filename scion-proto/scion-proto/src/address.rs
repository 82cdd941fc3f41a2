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

//! SCION ISD and AS identifiers.

use std::{fmt, str::FromStr};

/// Errors returned when parsing ISD, AS or ISD-AS identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    /// The ISD part is not a valid 16-bit decimal number.
    #[error("invalid ISD: {0:?}")]
    InvalidIsd(String),
    /// The AS part is neither a BGP style decimal nor a SCION style hex ASN.
    #[error("invalid ASN: {0:?}")]
    InvalidAsn(String),
    /// The ISD-AS is missing the `-` separator.
    #[error("invalid ISD-AS, expected <isd>-<asn>: {0:?}")]
    InvalidIsdAsn(String),
}

/// Isolation domain identifier.
///
/// `0` is the wildcard ISD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Isd(pub u16);

impl Isd {
    /// The wildcard ISD.
    pub const WILDCARD: Isd = Isd(0);

    /// Returns true if this is the wildcard ISD.
    pub const fn is_wildcard(&self) -> bool {
        self.0 == 0
    }

    /// Checks if `other` matches this ISD, treating the wildcard as matching anything.
    pub fn matches(&self, other: Isd) -> bool {
        self.is_wildcard() || *self == other
    }
}

impl FromStr for Isd {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u16::from_str(s)
            .map(Isd)
            .map_err(|_| AddressParseError::InvalidIsd(s.to_string()))
    }
}

impl fmt::Display for Isd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Autonomous system number, 48 bits wide.
///
/// `0` is the wildcard ASN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Asn(pub u64);

impl Asn {
    /// The wildcard ASN.
    pub const WILDCARD: Asn = Asn(0);
    /// Largest representable ASN.
    pub const MAX: Asn = Asn((1 << 48) - 1);

    const BGP_MAX: u64 = u32::MAX as u64;
    const GROUP_BITS: u32 = 16;

    /// Returns true if this is the wildcard ASN.
    pub const fn is_wildcard(&self) -> bool {
        self.0 == 0
    }

    /// Checks if `other` matches this ASN, treating the wildcard as matching anything.
    pub fn matches(&self, other: Asn) -> bool {
        self.is_wildcard() || *self == other
    }
}

impl FromStr for Asn {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressParseError::InvalidAsn(s.to_string());

        if !s.contains(':') {
            let value = u64::from_str(s).map_err(|_| invalid())?;
            if value > Self::BGP_MAX {
                return Err(invalid());
            }
            return Ok(Asn(value));
        }

        let groups: Vec<&str> = s.split(':').collect();
        if groups.len() != 3 {
            return Err(invalid());
        }

        let mut value = 0u64;
        for group in groups {
            if group.is_empty() || group.len() > 4 {
                return Err(invalid());
            }
            let part = u16::from_str_radix(group, 16).map_err(|_| invalid())?;
            value = (value << Self::GROUP_BITS) | u64::from(part);
        }

        Ok(Asn(value))
    }
}

impl fmt::Display for Asn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 <= Self::BGP_MAX {
            return write!(f, "{}", self.0);
        }

        let mask = (1u64 << Self::GROUP_BITS) - 1;
        write!(
            f,
            "{:x}:{:x}:{:x}",
            (self.0 >> (2 * Self::GROUP_BITS)) & mask,
            (self.0 >> Self::GROUP_BITS) & mask,
            self.0 & mask
        )
    }
}

/// A combined ISD and AS identifier, the unit of administration in SCION.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct IsdAsn(u64);

impl IsdAsn {
    /// The wildcard ISD-AS `0-0`.
    pub const WILDCARD: IsdAsn = IsdAsn::new(Isd::WILDCARD, Asn::WILDCARD);

    /// Creates a new ISD-AS. ASN bits beyond 48 are dropped.
    pub const fn new(isd: Isd, asn: Asn) -> Self {
        IsdAsn(((isd.0 as u64) << 48) | (asn.0 & Asn::MAX.0))
    }

    /// Returns the ISD part.
    pub const fn isd(&self) -> Isd {
        Isd((self.0 >> 48) as u16)
    }

    /// Returns the AS part.
    pub const fn asn(&self) -> Asn {
        Asn(self.0 & Asn::MAX.0)
    }

    /// Returns the packed 64-bit representation.
    pub const fn to_u64(&self) -> u64 {
        self.0
    }

    /// Returns true if both ISD and AS are wildcards.
    pub const fn is_wildcard(&self) -> bool {
        self.isd().is_wildcard() && self.asn().is_wildcard()
    }
}

impl From<u64> for IsdAsn {
    fn from(value: u64) -> Self {
        IsdAsn(value)
    }
}

impl FromStr for IsdAsn {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((isd, asn)) = s.split_once('-') else {
            return Err(AddressParseError::InvalidIsdAsn(s.to_string()));
        };

        Ok(IsdAsn::new(Isd::from_str(isd)?, Asn::from_str(asn)?))
    }
}

impl fmt::Display for IsdAsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.isd(), self.asn())
    }
}
