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

use std::{
    collections::{HashMap, hash_map},
    sync::Arc,
    time::SystemTime,
};

use super::{HopCrossing, Path, PathFingerprint, policy::PathPolicy};

/// An immutable set of paths keyed by their [`PathFingerprint`].
///
/// Every operation returns a new set, existing sets are never modified. Paths are shared
/// between sets, so deriving a set is cheap.
#[derive(Debug, Clone, Default)]
pub struct PathSet {
    paths: HashMap<PathFingerprint, Arc<Path>>,
}

impl PathSet {
    /// Creates an empty path set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a path set from the given paths.
    ///
    /// If multiple paths share a fingerprint, the first one is kept.
    pub fn from_paths(paths: impl IntoIterator<Item = Path>) -> Self {
        paths.into_iter().collect()
    }

    /// Number of paths in the set.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns true if the set contains no paths.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Returns the path with the given fingerprint.
    pub fn get(&self, fingerprint: &PathFingerprint) -> Option<&Arc<Path>> {
        self.paths.get(fingerprint)
    }

    /// Returns true if a path with the given fingerprint is in the set.
    pub fn contains(&self, fingerprint: &PathFingerprint) -> bool {
        self.paths.contains_key(fingerprint)
    }

    /// Iterates over all paths in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Path>> + '_ {
        self.paths.values()
    }

    /// Iterates over all fingerprints in no particular order.
    pub fn fingerprints(&self) -> impl Iterator<Item = &PathFingerprint> + '_ {
        self.paths.keys()
    }

    /// Returns true if any path in the set crosses `hop`.
    pub fn contains_hop(&self, hop: &HopCrossing) -> bool {
        self.paths.values().any(|path| path.contains_hop(hop))
    }

    /// Returns the earliest expiration of all paths, `None` for an empty set.
    pub fn earliest_expiration(&self) -> Option<SystemTime> {
        self.paths.values().map(|path| path.expiration).min()
    }

    /// Returns a new set without the paths expired at `now`.
    pub fn filter_expired(&self, now: SystemTime) -> PathSet {
        self.retained(|path| !path.is_expired(now))
    }

    /// Returns a new set without the paths crossing `hop`.
    pub fn without_hop(&self, hop: &HopCrossing) -> PathSet {
        self.retained(|path| !path.contains_hop(hop))
    }

    /// Returns a new set with only the paths allowed by `policy`.
    pub fn filter<P: PathPolicy + ?Sized>(&self, policy: &P) -> PathSet {
        self.retained(|path| policy.path_allowed(path))
    }

    fn retained(&self, mut keep: impl FnMut(&Path) -> bool) -> PathSet {
        PathSet {
            paths: self
                .paths
                .iter()
                .filter(|(_, path)| keep(path))
                .map(|(fp, path)| (fp.clone(), path.clone()))
                .collect(),
        }
    }
}

impl FromIterator<Path> for PathSet {
    fn from_iter<I: IntoIterator<Item = Path>>(iter: I) -> Self {
        let mut paths = HashMap::new();
        for path in iter {
            if let hash_map::Entry::Vacant(vacant) = paths.entry(path.fingerprint().clone()) {
                vacant.insert(Arc::new(path));
            }
        }
        Self { paths }
    }
}

impl PartialEq for PathSet {
    /// Two sets are equal if they hold the same fingerprints.
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.fingerprints().all(|fp| other.contains(fp))
    }
}

impl Eq for PathSet {}

#[cfg(test)]
mod tests {
    use std::{str::FromStr, time::Duration};

    use proptest::prelude::*;

    use super::*;
    use crate::path::parse_hops;

    const BASE_TIME: SystemTime = SystemTime::UNIX_EPOCH;

    fn path(hops: &str, expires_after_secs: u64) -> Path {
        Path::new(
            parse_hops(hops).unwrap(),
            BASE_TIME + Duration::from_secs(expires_after_secs),
        )
        .unwrap()
    }

    fn hop(s: &str) -> HopCrossing {
        HopCrossing::from_str(s).unwrap()
    }

    #[test]
    fn should_deduplicate_by_fingerprint_keeping_first() {
        let set = PathSet::from_paths([
            path("1-1#1 1-2#1", 10).with_mtu(1400),
            path("1-1#1 1-2#1", 20).with_mtu(1280),
            path("1-1#2 1-2#2", 10),
        ]);

        assert_eq!(set.len(), 2);
        let fp = path("1-1#1 1-2#1", 0).fingerprint().clone();
        assert_eq!(set.get(&fp).unwrap().mtu, 1400);
    }

    #[test]
    fn should_drop_expired_paths() {
        let set = PathSet::from_paths([path("1-1#1", 10), path("1-1#2", 20)]);
        let now = BASE_TIME + Duration::from_secs(10);

        let filtered = set.filter_expired(now);
        assert_eq!(filtered.len(), 1);
        assert_eq!(set.len(), 2, "source set must stay untouched");
        assert_eq!(
            filtered.earliest_expiration(),
            Some(BASE_TIME + Duration::from_secs(20))
        );
    }

    #[test]
    fn should_drop_paths_crossing_hop() {
        let set = PathSet::from_paths([
            path("1-ff00:0:111#105 1-ff00:0:130#1002 1-ff00:0:130#1004 1-ff00:0:110#2", 10),
            path("1-ff00:0:111#104 1-ff00:0:120#5 1-ff00:0:120#6 1-ff00:0:110#1", 10),
        ]);

        let revoked = hop("1-ff00:0:130#1002");
        assert!(set.contains_hop(&revoked));

        let remaining = set.without_hop(&revoked);
        assert_eq!(remaining.len(), 1);
        assert!(!remaining.contains_hop(&revoked));

        let unrelated = set.without_hop(&hop("2-ff00:0:1#1"));
        assert_eq!(unrelated, set);
    }

    fn path_set() -> impl Strategy<Value = (PathSet, Vec<HopCrossing>)> {
        let hops = (1u64..4, 1u64..4).prop_map(|(asn, ifid)| hop(&format!("1-{asn}#{ifid}")));
        let path = (prop::collection::vec(hops.clone(), 1..5), 0u64..100)
            .prop_map(|(hops, exp)| Path::new(hops, BASE_TIME + Duration::from_secs(exp)).unwrap());
        (prop::collection::vec(path, 0..10), prop::collection::vec(hops, 1..3))
            .prop_map(|(paths, hops)| (PathSet::from_paths(paths), hops))
    }

    proptest! {
        #[test]
        fn filters_never_grow_and_are_idempotent((set, hops) in path_set(), now in 0u64..100) {
            let now = BASE_TIME + Duration::from_secs(now);

            let once = set.filter_expired(now);
            prop_assert!(once.len() <= set.len());
            prop_assert_eq!(once.filter_expired(now), once);

            for hop in &hops {
                let once = set.without_hop(hop);
                prop_assert!(once.len() <= set.len());
                prop_assert!(!once.contains_hop(hop));
                prop_assert_eq!(once.without_hop(hop), once);
            }
        }
    }
}
