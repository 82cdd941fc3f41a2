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

use super::{PolicyError, types::HopPredicate};
use crate::path::{HopCrossing, Path, policy::PathPolicy};

/// Path Policy hop sequence
///
/// A sequence is an ordered list of hop predicates that a path has to match position by
/// position, end to end. A path with a different number of hops than the sequence never
/// matches.
///
/// Examples:
///
/// ```
/// use scion_proto::path::policy::sequence::Sequence;
///
/// // Four hops: leave 1-ff00:0:111 through interface 105, then any three hops.
/// Sequence::parse("1-ff00:0:111#105 0 0 0").unwrap();
///
/// // Two hops, first anywhere in ISD 1, second in 2-ff00:0:133 through interface 2.
/// Sequence::parse("1 2-ff00:0:133#2").unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence(Vec<HopPredicate>);

impl Sequence {
    /// Creates a new sequence, fails if no predicates are given.
    pub fn new(predicates: impl IntoIterator<Item = HopPredicate>) -> Result<Self, PolicyError> {
        let predicates: Vec<HopPredicate> = predicates.into_iter().collect();
        if predicates.is_empty() {
            return Err(PolicyError::EmptySequence);
        }
        Ok(Self(predicates))
    }

    /// Parses a whitespace separated list of hop predicates.
    pub fn parse(s: &str) -> Result<Self, PolicyError> {
        let predicates = s
            .split_whitespace()
            .map(HopPredicate::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(predicates)
    }

    /// The predicates in order.
    pub fn predicates(&self) -> &[HopPredicate] {
        &self.0
    }

    /// Number of hops a matching path has.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false, a sequence holds at least one predicate.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks if the sequence matches the given hops.
    pub fn matches(&self, hops: &[HopCrossing]) -> bool {
        hops.len() == self.0.len()
            && self
                .0
                .iter()
                .zip(hops)
                .all(|(predicate, hop)| predicate.matches(hop))
    }
}
impl FromStr for Sequence {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
impl Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, predicate) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{predicate}")?;
        }
        Ok(())
    }
}
impl PathPolicy for Sequence {
    fn path_allowed(&self, path: &Path) -> bool {
        self.matches(path.hops())
    }
}
