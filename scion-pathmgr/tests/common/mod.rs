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

//! Shared helpers for path manager integration tests.

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    future::pending,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};

use bytes::Bytes;
use scion_pathmgr::path::{
    manager::{PathManager, PathManagerConfig, Timers, watch::SnapshotReader},
    resolver::{PathRequestFlags, PathResolver, ResolverError},
};
use scion_proto::{
    address::IsdAsn,
    control_plane::revocation::{RevocationInfo, RevocationVerdict, SignedRevocation},
    path::{HopCrossing, Path, test_builder::test_path},
};
use tokio::sync::Notify;

/// Path from 1-ff00:0:111 to 1-ff00:0:110 via 1-ff00:0:130.
pub const PATH_VIA_130: &str =
    "1-ff00:0:111#105 1-ff00:0:130#1002 1-ff00:0:130#1004 1-ff00:0:110#2";
/// Path from 1-ff00:0:111 to 1-ff00:0:110 via 1-ff00:0:120.
pub const PATH_VIA_120: &str = "1-ff00:0:111#104 1-ff00:0:120#5 1-ff00:0:120#6 1-ff00:0:110#1";

pub fn ia(s: &str) -> IsdAsn {
    s.parse().unwrap()
}

pub fn src() -> IsdAsn {
    ia("1-ff00:0:111")
}

pub fn dst() -> IsdAsn {
    ia("1-ff00:0:110")
}

pub fn paths(hops: &[&str]) -> Result<Vec<Path>, String> {
    Ok(hops.iter().map(|h| test_path(h)).collect())
}

pub fn test_config() -> PathManagerConfig {
    PathManagerConfig {
        timers: Timers {
            normal_refire: Duration::from_secs(100),
            error_refire: Duration::from_millis(10),
        },
        ..Default::default()
    }
}

pub fn manager(resolver: &MockResolver) -> PathManager<MockResolver> {
    PathManager::new(test_config(), resolver.clone()).unwrap()
}

pub fn revocation(hop: &str) -> SignedRevocation {
    let hop: HopCrossing = hop.parse().unwrap();
    SignedRevocation::new(
        RevocationInfo::new(hop, SystemTime::now(), RevocationInfo::DEFAULT_TTL),
        Bytes::from_static(b"signature"),
    )
}

/// Sorted textual hop sequences of the paths in a snapshot.
pub fn path_strings(reader: &SnapshotReader) -> Vec<String> {
    let mut paths: Vec<String> = reader
        .load()
        .paths
        .iter()
        .map(|p| p.to_string())
        .collect();
    paths.sort();
    paths
}

/// Waits until the reader reaches at least the given revision.
pub async fn wait_for_revision(reader: &SnapshotReader, revision: u64) {
    while reader.revision() < revision {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// Waits until the resolver has seen the given number of revocations.
pub async fn wait_for_revocations(resolver: &MockResolver, count: usize) {
    while resolver.revocation_requests() < count {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// Scripted resolver.
///
/// Answers path requests for a pair with a response set for it, otherwise from a queue of
/// one-shot responses, then with the default response.
#[derive(Clone)]
pub struct MockResolver(Arc<Mutex<MockState>>);

struct MockState {
    scripted: VecDeque<Result<Vec<Path>, String>>,
    default_response: Result<Vec<Path>, String>,
    pair_responses: HashMap<(IsdAsn, IsdAsn), Result<Vec<Path>, String>>,
    held_pairs: HashMap<(IsdAsn, IsdAsn), Arc<Notify>>,
    verdict: Result<RevocationVerdict, String>,
    hang: bool,
    path_requests: usize,
    revocation_requests: usize,
    last_request: Option<(IsdAsn, IsdAsn, u16, PathRequestFlags)>,
    revocations: Vec<SignedRevocation>,
}

impl MockResolver {
    pub fn new(response: Result<Vec<Path>, String>) -> Self {
        MockResolver(Arc::new(Mutex::new(MockState {
            scripted: VecDeque::new(),
            default_response: response,
            pair_responses: HashMap::new(),
            held_pairs: HashMap::new(),
            verdict: Ok(RevocationVerdict::Valid),
            hang: false,
            path_requests: 0,
            revocation_requests: 0,
            last_request: None,
            revocations: Vec::new(),
        })))
    }

    /// Sets the response used once the scripted responses are exhausted.
    pub fn set_response(&self, response: Result<Vec<Path>, String>) {
        self.0.lock().unwrap().default_response = response;
    }

    /// Sets the response for all requests from `src` to `dst`.
    pub fn set_response_for(&self, src: IsdAsn, dst: IsdAsn, response: Result<Vec<Path>, String>) {
        self.0
            .lock()
            .unwrap()
            .pair_responses
            .insert((src, dst), response);
    }

    /// Makes further path requests from `src` to `dst` wait until released.
    ///
    /// Revocation verification is not affected.
    pub fn hold(&self, src: IsdAsn, dst: IsdAsn) {
        self.0
            .lock()
            .unwrap()
            .held_pairs
            .insert((src, dst), Arc::new(Notify::new()));
    }

    /// Lets the held path requests from `src` to `dst` complete.
    pub fn release(&self, src: IsdAsn, dst: IsdAsn) {
        if let Some(gate) = self.0.lock().unwrap().held_pairs.remove(&(src, dst)) {
            gate.notify_waiters();
        }
    }

    /// Queues a response for a single request.
    pub fn push_response(&self, response: Result<Vec<Path>, String>) {
        self.0.lock().unwrap().scripted.push_back(response);
    }

    pub fn set_verdict(&self, verdict: Result<RevocationVerdict, String>) {
        self.0.lock().unwrap().verdict = verdict;
    }

    /// Makes all further requests wait forever.
    pub fn set_hang(&self, hang: bool) {
        self.0.lock().unwrap().hang = hang;
    }

    pub fn path_requests(&self) -> usize {
        self.0.lock().unwrap().path_requests
    }

    pub fn revocation_requests(&self) -> usize {
        self.0.lock().unwrap().revocation_requests
    }

    /// Returns (dst, src, max_paths, flags) of the last path request.
    pub fn last_request(&self) -> Option<(IsdAsn, IsdAsn, u16, PathRequestFlags)> {
        self.0.lock().unwrap().last_request
    }

    pub fn revocations(&self) -> Vec<SignedRevocation> {
        self.0.lock().unwrap().revocations.clone()
    }
}

impl PathResolver for MockResolver {
    async fn paths(
        &self,
        dst: IsdAsn,
        src: IsdAsn,
        max_paths: u16,
        flags: PathRequestFlags,
    ) -> Result<Vec<Path>, ResolverError> {
        let (response, hang, gate) = {
            let mut guard = self.0.lock().unwrap();
            guard.path_requests += 1;
            guard.last_request = Some((dst, src, max_paths, flags));
            let response = match guard.pair_responses.get(&(src, dst)) {
                Some(response) => response.clone(),
                None => match guard.scripted.pop_front() {
                    Some(response) => response,
                    None => guard.default_response.clone(),
                },
            };
            (response, guard.hang, guard.held_pairs.get(&(src, dst)).cloned())
        };

        if hang {
            pending::<()>().await;
        }
        if let Some(gate) = gate {
            gate.notified().await;
        }

        match response {
            Ok(mut paths) => {
                paths.truncate(max_paths as usize);
                Ok(paths)
            }
            Err(e) => Err(ResolverError::service(e)),
        }
    }

    async fn notify_revocation(
        &self,
        revocation: SignedRevocation,
    ) -> Result<RevocationVerdict, ResolverError> {
        let (verdict, hang) = {
            let mut guard = self.0.lock().unwrap();
            guard.revocation_requests += 1;
            guard.revocations.push(revocation);
            (guard.verdict.clone(), guard.hang)
        };

        if hang {
            pending::<()>().await;
        }

        verdict.map_err(ResolverError::service)
    }
}
