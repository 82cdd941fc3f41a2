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

use std::str::FromStr;

use super::{PolicyError, types::HopPredicate};
use crate::path::{HopCrossing, Path, policy::PathPolicy};

/// ACL filtering paths hop by hop
///
/// For every hop of a path the entries are evaluated in order, the first entry whose predicate
/// matches the hop decides if the hop is allowed. A path is allowed only if all of its hops are.
///
/// The last entry must be a catch-all, so that every hop is decided by some entry.
///
/// ## Examples
///```
/// use std::str::FromStr;
///
/// use scion_proto::path::policy::{
///     acl::{Acl, AclAction, AclEntry},
///     types::HopPredicate,
/// };
///
/// // Deny all hops through AS 1-ff00:0:130, allow everything else
/// let acl = Acl::new([
///     AclEntry::new(AclAction::Deny, HopPredicate::from_str("1-ff00:0:130").unwrap()),
///     AclEntry::new(AclAction::Allow, HopPredicate::ANY),
/// ])
/// .unwrap();
///
/// // The same ACL in compact form, a trailing operator is the catch-all entry
/// assert_eq!(Acl::parse("- 1-ff00:0:130 +").unwrap(), acl);
///
/// // Missing catch-all
/// assert!(Acl::parse("- 1-ff00:0:130").is_err());
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Acl {
    entries: Vec<AclEntry>,
}
impl Acl {
    /// Creates a new Acl from entries
    ///
    /// Fails if there are no entries or if the last entry is not a catch-all.
    pub fn new(entries: impl IntoIterator<Item = AclEntry>) -> Result<Self, PolicyError> {
        let entries: Vec<AclEntry> = entries.into_iter().collect();

        match entries.last() {
            None => Err(PolicyError::EmptyAcl),
            Some(last) if !last.hop_predicate.is_wildcard() => Err(PolicyError::MissingCatchAll),
            Some(_) => Ok(Self { entries }),
        }
    }

    /// Parses an Acl from a string
    ///
    /// format:
    /// - "{operator} {hop-predicate} {operator} {hop-predicate} ... {operator} [0]"
    ///
    /// The final operator may omit its predicate, in which case it applies to all hops.
    pub fn parse(s: &str) -> Result<Self, PolicyError> {
        let mut entries = Vec::new();
        let mut split = s.split_whitespace();

        while let Some(op) = split.next() {
            let action = AclAction::parse(op)?;

            let hop = match split.next() {
                Some(hop) => HopPredicate::from_str(hop)?,
                None => HopPredicate::ANY,
            };

            entries.push(AclEntry::new(action, hop));
        }

        Self::new(entries)
    }

    /// The entries in evaluation order
    pub fn entries(&self) -> &[AclEntry] {
        &self.entries
    }

    /// Returns the action of the first entry matching `hop`
    ///
    /// Never None for a constructed Acl, the catch-all matches every hop.
    pub fn decide(&self, hop: &HopCrossing) -> Option<AclAction> {
        self.entries.iter().find_map(|entry| {
            match entry.matches(hop) {
                AclMatchResult::Allow => Some(AclAction::Allow),
                AclMatchResult::Deny => Some(AclAction::Deny),
                AclMatchResult::Impartial => None,
            }
        })
    }

    /// Checks if the Acl allows every one of the given hops
    pub fn matches(&self, hops: &[HopCrossing]) -> bool {
        hops.iter()
            .all(|hop| self.decide(hop) == Some(AclAction::Allow))
    }
}
impl FromStr for Acl {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
impl PathPolicy for Acl {
    fn path_allowed(&self, path: &Path) -> bool {
        self.matches(path.hops())
    }
}

/// Access control list entry
///
/// Will either allow or deny a hop matching the predicate
///
/// String Format:
/// - {operator} {hop-predicate}
/// - "- 1"   - Deny ISD 1
/// - "+ 1-2" - Allow IsdAsn 1-2
/// - "- 1-ff00:0:133#2" - Deny interface 2 of 1-ff00:0:133
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AclEntry {
    /// Action to apply if predicate matches
    pub action: AclAction,
    /// Hop predicate
    pub hop_predicate: HopPredicate,
}
impl AclEntry {
    /// Creates a new AclEntry
    pub fn new(action: AclAction, hop: HopPredicate) -> Self {
        Self {
            action,
            hop_predicate: hop,
        }
    }

    /// Creates a catch-all entry
    pub fn catch_all(action: AclAction) -> Self {
        Self::new(action, HopPredicate::ANY)
    }

    /// Parses an AclEntry from a string
    pub fn parse(s: &str) -> Result<Self, PolicyError> {
        let mut iter = s.split_whitespace();

        let action = iter
            .next()
            .ok_or(PolicyError::MissingOperator)
            .and_then(AclAction::parse)?;

        let hop = iter
            .next()
            .ok_or(PolicyError::MissingPredicate)
            .and_then(HopPredicate::from_str)?;

        Ok(Self::new(action, hop))
    }

    /// Checks if the AclEntry matches the given hop
    /// Returns Allow, Deny or Impartial
    /// If Impartial, the next entry should be checked
    fn matches(&self, hop: &HopCrossing) -> AclMatchResult {
        if self.hop_predicate.matches(hop) {
            match self.action {
                AclAction::Allow => AclMatchResult::Allow,
                AclAction::Deny => AclMatchResult::Deny,
            }
        } else {
            AclMatchResult::Impartial
        }
    }
}
impl FromStr for AclEntry {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Result of matching an ACL entry against a hop
#[derive(Debug, PartialEq, Eq, Clone)]
enum AclMatchResult {
    /// The hop matched and the entry allows it
    Allow,
    /// The hop matched and the entry denies it
    Deny,
    /// The hop did not match the entry
    Impartial,
}

/// Access control list entry action
///
/// Defines what happens to a hop matching the [AclEntry]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AclAction {
    /// Allows the hop
    Allow,
    /// Denies the hop, and with it the path
    Deny,
}
impl AclAction {
    /// Parses an AclAction from a string
    pub fn parse(s: &str) -> Result<Self, PolicyError> {
        match s {
            "+" => Ok(AclAction::Allow),
            "-" => Ok(AclAction::Deny),
            _ => Err(PolicyError::InvalidOperator(s.to_string())),
        }
    }
}
impl FromStr for AclAction {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod test {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::path::{PathSet, parse_hops};

    fn path(hops: &str) -> Path {
        Path::new(
            parse_hops(hops).unwrap(),
            SystemTime::now() + Duration::from_secs(3600),
        )
        .unwrap()
    }

    fn acl(s: &str) -> Acl {
        Acl::parse(s).unwrap_or_else(|e| panic!("Should parse {s}: {e}"))
    }

    mod parse {
        use super::*;

        #[test]
        fn parse_valid_acl_succeeds() {
            acl("+");
            acl("- 1 +");
            acl("- 1 + 0");
            acl("- 1 + 0-0");
            acl("- 1 + 0-0#0");
            acl("- 1-2 +");
            acl("- 2 - 3-1#1 +");
            acl("- 1 - 2-2#1 +");
        }

        fn expect_parse_fail(s: &str) -> PolicyError {
            Acl::parse(s).expect_err(&format!("Should fail with: {s}"))
        }

        #[test]
        fn parse_invalid_acl_returns_error() {
            assert_eq!(expect_parse_fail(""), PolicyError::EmptyAcl);
            assert_eq!(expect_parse_fail("- 1"), PolicyError::MissingCatchAll);
            assert_eq!(expect_parse_fail("+ 1-ff00:0:1#1"), PolicyError::MissingCatchAll);
            assert!(matches!(expect_parse_fail("1"), PolicyError::InvalidOperator(_)));
            assert!(matches!(expect_parse_fail("+ +"), PolicyError::InvalidPredicate { .. }));
            assert!(matches!(expect_parse_fail("- x +"), PolicyError::InvalidPredicate { .. }));
        }

        #[test]
        fn entry_parse_requires_operator_and_predicate() {
            assert_eq!(
                AclEntry::parse("- 1-ff00:0:130#1002").unwrap(),
                AclEntry::new(
                    AclAction::Deny,
                    HopPredicate::from_str("1-ff00:0:130#1002").unwrap()
                )
            );
            assert_eq!(AclEntry::parse("").unwrap_err(), PolicyError::MissingOperator);
            assert_eq!(AclEntry::parse("+").unwrap_err(), PolicyError::MissingPredicate);
        }
    }

    mod evaluate {
        use super::*;

        const SRC_DST_VIA_122: &str =
            "2-ff00:0:222#1019 1-ff00:0:122#1910 1-ff00:0:122#1916 1-ff00:0:131#1619";
        const SRC_DST_VIA_121: &str =
            "2-ff00:0:222#1019 1-ff00:0:121#1912 1-ff00:0:121#2328 1-ff00:0:131#1619";
        const SRC_DST_VIA_211: &str =
            "2-ff00:0:222#1019 2-ff00:0:211#1911 2-ff00:0:211#2327 1-ff00:0:131#1619";

        #[test]
        fn deny_then_allow_all_excludes_only_matching_paths() {
            let acl = acl("- 1-ff00:0:121#0 +");

            assert!(acl.path_allowed(&path(SRC_DST_VIA_122)));
            assert!(!acl.path_allowed(&path(SRC_DST_VIA_121)));
            assert!(acl.path_allowed(&path(SRC_DST_VIA_211)));
        }

        #[test]
        fn longer_deny_lists_are_applied_in_order() {
            let acl = acl("- 1-ff00:0:121 - 2-ff00:0:211#2327 +");
            let set = PathSet::from_paths([
                path(SRC_DST_VIA_122),
                path(SRC_DST_VIA_121),
                path(SRC_DST_VIA_211),
            ]);

            let filtered = set.filter(&acl);
            assert_eq!(filtered.len(), 1);
            assert!(filtered.contains(path(SRC_DST_VIA_122).fingerprint()));
        }

        #[test]
        fn allow_then_deny_all_requires_every_hop_to_match() {
            let acl = acl("+ 1 -");

            assert!(acl.path_allowed(&path("1-ff00:0:111#1 1-ff00:0:110#2")));
            assert!(!acl.path_allowed(&path("1-ff00:0:111#1 2-ff00:0:210#2")));
        }

        #[test]
        fn first_matching_entry_decides() {
            let acl = acl("+ 1-ff00:0:132#1910 - 1-ff00:0:132 +");

            assert!(acl.path_allowed(&path("1-ff00:0:133#1019 1-ff00:0:132#1910")));
            assert!(!acl.path_allowed(&path("1-ff00:0:133#1019 1-ff00:0:132#1916")));
            assert_eq!(
                acl.decide(&HopCrossing::from_str("1-ff00:0:132#1916").unwrap()),
                Some(AclAction::Deny)
            );
        }

        #[test]
        fn deny_all_rejects_everything() {
            let acl = Acl::new([AclEntry::catch_all(AclAction::Deny)]).unwrap();
            assert!(!acl.path_allowed(&path(SRC_DST_VIA_122)));
        }
    }
}
