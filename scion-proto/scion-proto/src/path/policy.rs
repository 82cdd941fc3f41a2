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

//! SCION Path Policies
//!
//! Policies restrict the paths handed to applications. A [`Policy`] combines an [`Acl`], deciding
//! per hop, with a [`Sequence`], constraining the hop sequence as a whole. A path has to pass
//! both parts that are present.
//!
//! Policies are validated on construction, evaluating them never fails.

use std::borrow::Cow;

use crate::path::{
    HopCrossing, Path, PathSet,
    policy::{acl::Acl, sequence::Sequence},
};

/// ACL Policy filtering paths based on contained hops
pub mod acl;
/// Sequence Policy requiring paths to follow a hop sequence
pub mod sequence;
/// Types shared in the path policy module
pub mod types;

/// Errors detected while constructing a policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// A hop predicate could not be parsed.
    #[error("invalid hop predicate {input:?}: {reason}")]
    InvalidPredicate {
        /// The offending input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },
    /// An ACL operator is neither `+` nor `-`.
    #[error("invalid ACL operator {0:?}, expected + or -")]
    InvalidOperator(String),
    /// An ACL entry is missing its operator.
    #[error("ACL entry is missing an operator")]
    MissingOperator,
    /// An ACL entry is missing its hop predicate.
    #[error("ACL entry is missing a hop predicate")]
    MissingPredicate,
    /// An ACL without entries.
    #[error("ACL has no entries")]
    EmptyAcl,
    /// The last entry of an ACL does not match every hop.
    #[error("last ACL entry must be a catch-all")]
    MissingCatchAll,
    /// A sequence without predicates.
    #[error("sequence has no hop predicates")]
    EmptySequence,
}

/// A Path Policy allows or disallows a path based on its hops
pub trait PathPolicy: Send + Sync + 'static {
    /// Returns true if the path should be handed out.
    fn path_allowed(&self, path: &Path) -> bool;
}

/// A named path policy combining an ACL and a hop sequence
///
/// The name identifies the policy, e.g. when it keys a path watch. A policy without ACL and
/// sequence allows every path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Identity of the policy
    pub name: Cow<'static, str>,
    /// ACL the hops of a path are checked against
    pub acl: Option<Acl>,
    /// Hop sequence a path has to follow
    pub sequence: Option<Sequence>,
}
impl Policy {
    /// Creates a new Policy
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        acl: Option<Acl>,
        sequence: Option<Sequence>,
    ) -> Self {
        Self {
            name: name.into(),
            acl,
            sequence,
        }
    }

    /// Creates a policy allowing every path
    pub fn allow_all(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, None, None)
    }

    /// Returns true if the policy imposes no constraint
    pub fn is_pass_through(&self) -> bool {
        self.acl.is_none() && self.sequence.is_none()
    }

    /// Checks if the policy matches the given hops
    ///
    /// Returns true if the hops are allowed by this policy
    pub fn matches(&self, hops: &[HopCrossing]) -> bool {
        self.sequence
            .as_ref()
            .map(|seq| seq.matches(hops))
            .unwrap_or(true)
            && self
                .acl
                .as_ref()
                .map(|acl| acl.matches(hops))
                .unwrap_or(true)
    }
}
impl PathPolicy for Policy {
    fn path_allowed(&self, path: &Path) -> bool {
        self.matches(path.hops())
    }
}

/// Filters `paths` by `policy`, no policy allows every path.
pub fn filter(paths: &PathSet, policy: Option<&Policy>) -> PathSet {
    match policy {
        Some(policy) if !policy.is_pass_through() => paths.filter(policy),
        _ => paths.clone(),
    }
}
