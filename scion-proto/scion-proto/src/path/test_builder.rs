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

//! Utility for constructing deterministic test paths
//!
//! The [`TestPathBuilder`] defines the exact hop crossings of a path and its expiration.
//!
//!  #### To create a basic path
//! ```
//! use std::time::Duration;
//!
//! use scion_proto::path::test_builder::TestPathBuilder;
//!
//! let path = TestPathBuilder::new()
//!     .hop("1-ff00:0:111#105")
//!     .hops("1-ff00:0:130#1002 1-ff00:0:130#1004")
//!     .hop("1-ff00:0:110#2")
//!     .expiring_in(Duration::from_secs(60))
//!     .build();
//!
//! assert_eq!(path.hops().len(), 4);
//! ```
//!
//! This is intended for tests only, not for constructing production paths. Invalid input
//! panics.

use std::{
    str::FromStr,
    time::{Duration, SystemTime},
};

use crate::path::{HopCrossing, Path, PathSet, parse_hops};

/// Default lifetime of built paths.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(6 * 60 * 60);

/// A builder for constructing deterministic test paths.
#[derive(Debug, Clone)]
pub struct TestPathBuilder {
    hops: Vec<HopCrossing>,
    expiration: Option<SystemTime>,
    mtu: u16,
}

impl Default for TestPathBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPathBuilder {
    /// Creates a builder without hops, expiring [`DEFAULT_LIFETIME`] after [`Self::build`].
    pub fn new() -> Self {
        Self {
            hops: Vec::new(),
            expiration: None,
            mtu: 1472,
        }
    }

    /// Appends one hop crossing in `<isd>-<asn>#<interface>` format.
    pub fn hop(mut self, hop: &str) -> Self {
        self.hops
            .push(HopCrossing::from_str(hop).expect("valid hop crossing"));
        self
    }

    /// Appends whitespace separated hop crossings.
    pub fn hops(mut self, hops: &str) -> Self {
        self.hops
            .extend(parse_hops(hops).expect("valid hop crossings"));
        self
    }

    /// Sets an absolute expiration time.
    pub fn expiring_at(mut self, expiration: SystemTime) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Sets the expiration relative to the current time.
    pub fn expiring_in(self, lifetime: Duration) -> Self {
        self.expiring_at(SystemTime::now() + lifetime)
    }

    /// Sets the path MTU.
    pub fn with_mtu(mut self, mtu: u16) -> Self {
        self.mtu = mtu;
        self
    }

    /// Builds the path, panics if no hops were added.
    pub fn build(self) -> Path {
        let expiration = self
            .expiration
            .unwrap_or_else(|| SystemTime::now() + DEFAULT_LIFETIME);
        Path::new(self.hops, expiration)
            .expect("test path needs at least one hop")
            .with_mtu(self.mtu)
    }
}

/// Builds a path from whitespace separated hop crossings with the default lifetime.
pub fn test_path(hops: &str) -> Path {
    TestPathBuilder::new().hops(hops).build()
}

/// Builds paths from hop crossing strings, see [`test_path`].
pub fn test_paths<'a>(paths: impl IntoIterator<Item = &'a str>) -> Vec<Path> {
    paths.into_iter().map(test_path).collect()
}

/// Builds a path set from hop crossing strings, see [`test_path`].
pub fn test_path_set<'a>(paths: impl IntoIterator<Item = &'a str>) -> PathSet {
    PathSet::from_paths(test_paths(paths))
}
