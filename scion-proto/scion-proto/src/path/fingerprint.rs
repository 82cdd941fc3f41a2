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

use std::{fmt, sync::Arc};

use super::HopCrossing;

/// The deduplication key of a [`Path`](super::Path).
///
/// Unlike a hash, the fingerprint holds the complete ordered hop sequence. Two fingerprints are
/// equal if and only if the hop sequences are equal, which makes it usable as a primary key.
/// Cloning is cheap, the sequence is shared.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathFingerprint(Arc<[HopCrossing]>);

impl PathFingerprint {
    /// Number of hops written by the alternate display format before eliding.
    const DISPLAYED_HOPS: usize = 4;

    /// Returns the fingerprint for the given hop sequence.
    pub fn new(hops: impl Into<Arc<[HopCrossing]>>) -> Self {
        Self(hops.into())
    }

    /// Returns the hop sequence this fingerprint was derived from.
    pub fn hops(&self) -> &[HopCrossing] {
        &self.0
    }

    fn format(&self, f: &mut fmt::Formatter<'_>, n_displayed: usize) -> fmt::Result {
        for (i, hop) in self.0.iter().take(n_displayed).enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{hop}")?;
        }

        if self.0.len() > n_displayed {
            write!(f, " ..{}", self.0.len() - n_displayed)?;
        }

        Ok(())
    }
}

impl fmt::Display for PathFingerprint {
    /// Formats the full hop sequence, space separated.
    ///
    /// The alternate flag shortens long sequences for log output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            self.format(f, Self::DISPLAYED_HOPS)
        } else {
            self.format(f, self.0.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{
        address::{Asn, Isd, IsdAsn},
        path::InterfaceId,
    };

    fn hop() -> impl Strategy<Value = HopCrossing> {
        (1u16..4, 1u64..4, 1u64..6).prop_map(|(isd, asn, ifid)| {
            HopCrossing {
                isd_asn: IsdAsn::new(Isd(isd), Asn(asn)),
                interface: InterfaceId(ifid),
            }
        })
    }

    #[test]
    fn should_display_hop_sequence() {
        let fp = PathFingerprint::new(crate::path::parse_hops("1-1#1 1-2#3").unwrap());
        assert_eq!(fp.to_string(), "1-1#1 1-2#3");
    }

    #[test]
    fn should_elide_long_sequences_in_alternate_format() {
        let fp = PathFingerprint::new(
            crate::path::parse_hops("1-1#1 1-2#1 1-2#2 1-3#1 1-3#2 1-4#1").unwrap(),
        );
        assert_eq!(format!("{fp:#}"), "1-1#1 1-2#1 1-2#2 1-3#1 ..2");
    }

    proptest! {
        #[test]
        fn equal_sequences_have_equal_fingerprints(hops in prop::collection::vec(hop(), 1..8)) {
            prop_assert_eq!(PathFingerprint::new(hops.clone()), PathFingerprint::new(hops));
        }

        #[test]
        fn differing_sequences_have_differing_fingerprints(
            a in prop::collection::vec(hop(), 1..6),
            b in prop::collection::vec(hop(), 1..6),
        ) {
            prop_assert_eq!(a == b, PathFingerprint::new(a) == PathFingerprint::new(b));
        }

        #[test]
        fn reordering_changes_fingerprint(hops in prop::collection::vec(hop(), 2..8)) {
            let mut reversed = hops.clone();
            reversed.reverse();
            prop_assume!(reversed != hops);
            prop_assert_ne!(PathFingerprint::new(hops), PathFingerprint::new(reversed));
        }
    }
}
