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

//! Path watches.
//!
//! A [`Watch`] is driven by its own task and is the only writer of its [`Snapshot`]. Consumers
//! hold a [`WatchHandle`] or any number of [`SnapshotReader`]s and load the latest snapshot
//! without blocking the task.

use std::{
    borrow::Cow,
    fmt::{self, Display},
    future::Future,
    pin::Pin,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicU8, Ordering},
    },
    time::{Duration, SystemTime},
};

use arc_swap::{ArcSwap, Guard};
use scion_proto::{
    address::IsdAsn,
    control_plane::revocation::SignedRevocation,
    path::{
        HopCrossing, PathSet,
        policy::{self, Policy},
    },
};
use tokio::{select, sync::mpsc, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, instrument};

use crate::path::{
    manager::{
        PathManager, PathManagerError, PathManagerRef, Timers,
        registry::{WatchEntry, WatchRegistry},
    },
    resolver::{PathRequestFlags, PathResolver},
};

/// Identifier of a watch, unique per manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchId(pub u64);

impl Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a watch observes: a (src, dst) pair and the name of its policy, if any.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchKey {
    /// Source ISD-AS
    pub src: IsdAsn,
    /// Destination ISD-AS
    pub dst: IsdAsn,
    /// Policy name
    pub policy: Option<Cow<'static, str>>,
}

impl WatchKey {
    /// Creates a new watch key.
    pub fn new(src: IsdAsn, dst: IsdAsn, policy: Option<Cow<'static, str>>) -> Self {
        WatchKey { src, dst, policy }
    }
}

impl Display for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)?;
        if let Some(policy) = &self.policy {
            write!(f, " [{policy}]")?;
        }
        Ok(())
    }
}

/// Lifecycle state of a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WatchState {
    /// The last refresh produced paths.
    Normal = 0,
    /// The watch has no paths or the last refresh failed.
    ErrorBackoff = 1,
    /// The watch was destroyed. Terminal.
    Destroyed = 2,
}

impl WatchState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WatchState::Normal,
            1 => WatchState::ErrorBackoff,
            _ => WatchState::Destroyed,
        }
    }
}

/// An immutable view of the paths of a watch.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Paths allowed by the watch's policy.
    pub paths: PathSet,
    /// Increases by one with every publication. The initial snapshot has revision 1.
    pub revision: u64,
    /// Time of the last successful refresh.
    pub refreshed_at: SystemTime,
}

impl Snapshot {
    /// Returns the paths that are not yet expired at `now`.
    pub fn usable_paths(&self, now: SystemTime) -> PathSet {
        self.paths.filter_expired(now)
    }
}

/// State shared between a watch task and its readers.
pub(crate) struct WatchShared {
    pub key: WatchKey,
    snapshot: ArcSwap<Snapshot>,
    state: AtomicU8,
    /// Set once the watch is destroyed. Held while publishing.
    destroyed: Mutex<bool>,
}

impl WatchShared {
    fn new(key: WatchKey, paths: PathSet, state: WatchState, now: SystemTime) -> Self {
        WatchShared {
            key,
            snapshot: ArcSwap::from_pointee(Snapshot {
                paths,
                revision: 1,
                refreshed_at: now,
            }),
            state: AtomicU8::new(state as u8),
            destroyed: Mutex::new(false),
        }
    }

    pub fn load(&self) -> Guard<Arc<Snapshot>> {
        self.snapshot.load()
    }

    pub fn load_full(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    pub fn state(&self) -> WatchState {
        WatchState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Publishes a new snapshot with the next revision.
    ///
    /// `refreshed_at` of `None` keeps the time of the previous snapshot. Returns the new revision,
    /// or `None` if the watch was destroyed.
    fn publish(
        &self,
        paths: PathSet,
        refreshed_at: Option<SystemTime>,
        state: WatchState,
    ) -> Option<u64> {
        let destroyed = self.lock_destroyed();
        if *destroyed {
            return None;
        }

        let previous = self.snapshot.load();
        let revision = previous.revision + 1;
        let refreshed_at = refreshed_at.unwrap_or(previous.refreshed_at);

        self.snapshot.store(Arc::new(Snapshot {
            paths,
            revision,
            refreshed_at,
        }));
        self.state.store(state as u8, Ordering::Release);

        Some(revision)
    }

    /// Updates the state without publishing. No-op once destroyed.
    fn set_state(&self, state: WatchState) {
        let destroyed = self.lock_destroyed();
        if !*destroyed {
            self.state.store(state as u8, Ordering::Release);
        }
    }

    /// Marks the watch as destroyed. Returns false if it already was.
    pub fn mark_destroyed(&self) -> bool {
        let mut destroyed = self.lock_destroyed();
        if *destroyed {
            return false;
        }

        *destroyed = true;
        self.state
            .store(WatchState::Destroyed as u8, Ordering::Release);
        true
    }

    fn lock_destroyed(&self) -> MutexGuard<'_, bool> {
        self.destroyed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A revocation dispatched to a watch.
pub(crate) struct RevocationRequest {
    pub revocation: SignedRevocation,
    /// Aborts verification of this revocation.
    pub cancel: CancellationToken,
}

/// Handle to a watch.
///
/// Dropping the handle destroys the watch. Use [`WatchHandle::reader`] to share snapshots.
pub struct WatchHandle {
    id: WatchId,
    shared: Arc<WatchShared>,
    cancel_token: CancellationToken,
    registry: Weak<WatchRegistry>,
}

impl WatchHandle {
    /// Returns the id of the watch.
    pub fn id(&self) -> WatchId {
        self.id
    }

    /// Returns the key of the watch.
    pub fn key(&self) -> &WatchKey {
        &self.shared.key
    }

    /// Returns the latest snapshot.
    ///
    /// After the watch is destroyed, returns the last snapshot published before.
    pub fn load(&self) -> Arc<Snapshot> {
        self.shared.load_full()
    }

    /// Returns the current state.
    pub fn state(&self) -> WatchState {
        self.shared.state()
    }

    /// Returns a reader for the snapshots of this watch.
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            shared: self.shared.clone(),
        }
    }

    /// Stops the watch and removes it from its manager. Idempotent.
    ///
    /// A refresh that completes afterwards is discarded.
    pub fn destroy(&self) {
        if !self.shared.mark_destroyed() {
            return;
        }

        self.cancel_token.cancel();
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }

        tracing::debug!(watch_id = %self.id, key = %self.shared.key, "Destroyed path watch");
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("id", &self.id)
            .field("key", &self.shared.key)
            .field("state", &self.state())
            .finish()
    }
}

/// Read-only access to the snapshots of a watch.
///
/// Readers do not keep the watch alive.
#[derive(Clone)]
pub struct SnapshotReader {
    shared: Arc<WatchShared>,
}

impl SnapshotReader {
    /// Returns the latest snapshot.
    pub fn load(&self) -> Arc<Snapshot> {
        self.shared.load_full()
    }

    /// Returns the revision of the latest snapshot.
    pub fn revision(&self) -> u64 {
        self.shared.load().revision
    }

    /// Returns the current state of the watch.
    pub fn state(&self) -> WatchState {
        self.shared.state()
    }

    /// Returns the key of the watch.
    pub fn key(&self) -> &WatchKey {
        &self.shared.key
    }
}

/// The task driving a watch. Cancelled on drop.
pub(crate) struct WatchTask {
    _task: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl Drop for WatchTask {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Worker maintaining the paths of one watch.
pub(crate) struct Watch<R: PathResolver> {
    id: WatchId,
    policy: Option<Arc<Policy>>,
    timers: Timers,
    manager: PathManagerRef<R>,
    shared: Arc<WatchShared>,
    /// Mirrors the published state while the watch is alive.
    state: WatchState,
    next_refire: Instant,
}

impl<R: PathResolver> Watch<R> {
    /// Creates a watch from the result of its initial query.
    pub fn new(
        id: WatchId,
        key: WatchKey,
        policy: Option<Arc<Policy>>,
        paths: PathSet,
        manager: PathManagerRef<R>,
        timers: Timers,
    ) -> Self {
        let state = state_for(&paths);
        let next_refire = next_refire(&timers, state, &paths);

        Watch {
            id,
            policy,
            timers,
            manager,
            shared: Arc::new(WatchShared::new(key, paths, state, SystemTime::now())),
            state,
            next_refire,
        }
    }

    /// Registers the watch and spawns its task.
    #[instrument(
        name = "path-watch",
        skip_all,
        fields(
            watch_id = %self.id,
            src = %self.shared.key.src,
            dst = %self.shared.key.dst,
            policy = ?self.shared.key.policy,
        )
    )]
    pub fn manage(mut self, registry: &Arc<WatchRegistry>) -> WatchHandle {
        let cancel_token = CancellationToken::new();
        let (revocations_tx, revocations_rx) = mpsc::unbounded_channel();
        let id = self.id;
        let shared = self.shared.clone();

        let task = {
            let cancel_token = cancel_token.clone();

            async move {
                let exit_reason = self.run(&cancel_token, revocations_rx).await;

                // If manager still exists, drop the registry entry
                if let Some(manager) = self.manager.get() {
                    manager.remove_watch(self.id);
                }

                // Handles could still be around
                self.shared.mark_destroyed();

                tracing::info!(exit_reason, "Path watch task exiting");
            }
        };

        registry.insert(
            id,
            WatchEntry {
                shared: shared.clone(),
                revocations: revocations_tx,
                _task: WatchTask {
                    _task: tokio::spawn(task.in_current_span()),
                    cancel_token: cancel_token.clone(),
                },
            },
        );

        WatchHandle {
            id,
            shared,
            cancel_token,
            registry: Arc::downgrade(registry),
        }
    }

    /// Runs until cancelled or the manager is dropped. Returns the exit reason.
    ///
    /// Revocations are handled while a refresh query is in flight.
    async fn run(
        &mut self,
        cancel_token: &CancellationToken,
        mut revocations: mpsc::UnboundedReceiver<RevocationRequest>,
    ) -> &'static str {
        let mut pending: Option<PendingRefresh> = None;

        loop {
            tracing::trace!(
                state = ?self.state,
                refreshing = pending.is_some(),
                "Path watch task tick"
            );

            select! {
                biased;
                // Cancellation
                _ = cancel_token.cancelled() => {
                    return "destroyed";
                }
                // Revocations
                request = revocations.recv() => {
                    let Some(request) = request else {
                        return "revocation channel closed";
                    };
                    let Some(manager) = self.manager.get() else {
                        return "manager dropped";
                    };

                    let revoked = self.handle_revocation(request, &manager, cancel_token).await;
                    if let (Some(hop), Some(pending)) = (revoked, pending.as_mut()) {
                        pending.revoked.push(hop);
                    }
                }
                // Refresh result
                result = poll_refresh(&mut pending), if pending.is_some() => {
                    let revoked = pending.take().map(|p| p.revoked).unwrap_or_default();
                    self.complete_refresh(result, &revoked);
                }
                // Refresh tick
                _ = tokio::time::sleep_until(self.next_refire), if pending.is_none() => {
                    let Some(manager) = self.manager.get() else {
                        return "manager dropped";
                    };

                    pending = Some(self.start_refresh(manager, cancel_token.clone()));
                }
            }
        }
    }

    /// Starts re-querying the paths.
    fn start_refresh(
        &self,
        manager: PathManager<R>,
        cancel_token: CancellationToken,
    ) -> PendingRefresh {
        tracing::trace!("Refreshing paths");
        let (src, dst) = (self.shared.key.src, self.shared.key.dst);

        PendingRefresh {
            query: Box::pin(async move {
                manager
                    .resolve_paths(src, dst, PathRequestFlags::default(), &cancel_token)
                    .await
            }),
            revoked: Vec::new(),
        }
    }

    /// Publishes the filtered result of a refresh, without the interfaces revoked meanwhile.
    ///
    /// A failed query keeps the last snapshot.
    fn complete_refresh(
        &mut self,
        result: Result<PathSet, PathManagerError>,
        revoked: &[HopCrossing],
    ) {
        let paths = match result {
            Ok(paths) => {
                let mut paths = policy::filter(&paths, self.policy.as_deref());
                for hop in revoked {
                    paths = paths.without_hop(hop);
                }
                paths
            }
            Err(PathManagerError::Cancelled) => {
                tracing::debug!("Refresh cancelled");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to refresh paths, keeping last snapshot");
                self.shared.set_state(WatchState::ErrorBackoff);
                self.reschedule(WatchState::ErrorBackoff, &PathSet::new());
                return;
            }
        };

        let state = state_for(&paths);
        let count = paths.len();
        self.reschedule(state, &paths);

        let Some(revision) = self.shared.publish(paths, Some(SystemTime::now()), state) else {
            tracing::debug!("Watch destroyed during refresh, discarding result");
            return;
        };

        match state {
            WatchState::Normal => {
                tracing::debug!(revision, paths = count, "Published refreshed paths");
            }
            _ => tracing::debug!(revision, "No paths available, backing off"),
        }
    }

    /// Drops the paths crossing a revoked interface, unless the resolver rejects the revocation.
    ///
    /// Returns the revoked interface if paths were dropped.
    async fn handle_revocation(
        &mut self,
        request: RevocationRequest,
        manager: &PathManager<R>,
        cancel_token: &CancellationToken,
    ) -> Option<HopCrossing> {
        let hop = *request.revocation.hop();

        // The snapshot may have changed since the revocation was dispatched.
        if !self.shared.load().paths.contains_hop(&hop) {
            tracing::trace!(%hop, "Revocation does not affect current paths");
            return None;
        }

        let verdict = select! {
            biased;
            _ = cancel_token.cancelled() => return None,
            verdict = manager.verify_revocation(request.revocation, &request.cancel) => verdict,
        };

        match verdict {
            Ok(verdict) if verdict.requires_removal() => {
                tracing::debug!(%hop, %verdict, "Revocation accepted");
            }
            Ok(verdict) => {
                tracing::debug!(%hop, %verdict, "Ignoring rejected revocation");
                return None;
            }
            Err(e) => {
                tracing::warn!(%hop, error = %e, "Failed to verify revocation, keeping paths");
                return None;
            }
        }

        let current = self.shared.load_full();
        let remaining = current.paths.without_hop(&hop);
        let removed = current.paths.len() - remaining.len();
        let emptied = remaining.is_empty();
        let state = if emptied {
            WatchState::ErrorBackoff
        } else {
            self.state
        };

        let revision = self.shared.publish(remaining, None, state)?;
        tracing::info!(%hop, removed, revision, "Removed revoked paths");

        if emptied {
            // Recover right away instead of waiting for the next tick.
            self.state = WatchState::ErrorBackoff;
            self.next_refire = Instant::now();
        }

        Some(hop)
    }

    fn reschedule(&mut self, state: WatchState, paths: &PathSet) {
        self.state = state;
        self.next_refire = next_refire(&self.timers, state, paths);
    }
}

/// A refresh query in flight and the interfaces revoked while it runs.
struct PendingRefresh {
    query: Pin<Box<dyn Future<Output = Result<PathSet, PathManagerError>> + Send>>,
    revoked: Vec<HopCrossing>,
}

/// Completes with the result of the pending refresh. Never completes if there is none.
async fn poll_refresh(
    pending: &mut Option<PendingRefresh>,
) -> Result<PathSet, PathManagerError> {
    match pending {
        Some(pending) => pending.query.as_mut().await,
        None => std::future::pending().await,
    }
}

fn state_for(paths: &PathSet) -> WatchState {
    if paths.is_empty() {
        WatchState::ErrorBackoff
    } else {
        WatchState::Normal
    }
}

/// Returns the time of the next refresh.
///
/// In normal state, refreshes no later than the earliest path expiry, but never sooner than
/// `error_refire`.
fn next_refire(timers: &Timers, state: WatchState, paths: &PathSet) -> Instant {
    let mut delay = timers.refire_interval(state);

    if state == WatchState::Normal {
        if let Some(expiration) = paths.earliest_expiration() {
            let until_expiry = expiration
                .duration_since(SystemTime::now())
                .unwrap_or(Duration::ZERO);
            delay = delay.min(until_expiry.max(timers.error_refire));
        }
    }

    Instant::now() + delay
}

#[cfg(test)]
mod tests {
    use scion_proto::path::test_builder::{TestPathBuilder, test_path_set};

    use super::*;

    fn key() -> WatchKey {
        WatchKey::new(
            "1-ff00:0:133".parse().unwrap(),
            "1-ff00:0:131".parse().unwrap(),
            Some("acl".into()),
        )
    }

    fn shared() -> WatchShared {
        WatchShared::new(
            key(),
            test_path_set(["1-ff00:0:133#1019 1-ff00:0:132#1910"]),
            WatchState::Normal,
            SystemTime::now(),
        )
    }

    #[test]
    fn key_display() {
        assert_eq!(key().to_string(), "1-ff00:0:133 -> 1-ff00:0:131 [acl]");

        let plain = WatchKey::new(key().src, key().dst, None);
        assert_eq!(plain.to_string(), "1-ff00:0:133 -> 1-ff00:0:131");
    }

    #[test]
    fn initial_snapshot_has_revision_one() {
        let shared = shared();
        assert_eq!(shared.load().revision, 1);
        assert_eq!(shared.load().paths.len(), 1);
        assert_eq!(shared.state(), WatchState::Normal);
    }

    #[test]
    fn publish_increments_revision() {
        let shared = shared();
        let refreshed_at = shared.load().refreshed_at;

        assert_eq!(
            shared.publish(PathSet::new(), None, WatchState::ErrorBackoff),
            Some(2)
        );
        assert_eq!(shared.state(), WatchState::ErrorBackoff);
        assert!(shared.load().paths.is_empty());
        assert_eq!(shared.load().refreshed_at, refreshed_at);

        let later = refreshed_at + Duration::from_secs(5);
        assert_eq!(
            shared.publish(
                test_path_set(["1-ff00:0:133#1018 1-ff00:0:122#1815"]),
                Some(later),
                WatchState::Normal,
            ),
            Some(3)
        );
        assert_eq!(shared.state(), WatchState::Normal);
        assert_eq!(shared.load().refreshed_at, later);
    }

    #[test]
    fn destroy_freezes_snapshot() {
        let shared = shared();
        let before = shared.load_full();

        assert!(shared.mark_destroyed());
        assert!(!shared.mark_destroyed());
        assert_eq!(shared.state(), WatchState::Destroyed);

        assert_eq!(shared.publish(PathSet::new(), None, WatchState::Normal), None);
        shared.set_state(WatchState::Normal);

        assert_eq!(shared.state(), WatchState::Destroyed);
        assert!(Arc::ptr_eq(&before, &shared.load_full()));
    }

    #[test]
    fn usable_paths_drop_expired() {
        let now = SystemTime::now();
        let snapshot = Snapshot {
            paths: PathSet::from_paths([
                TestPathBuilder::new()
                    .hops("1-ff00:0:133#1019 1-ff00:0:132#1910")
                    .expiring_at(now - Duration::from_secs(1))
                    .build(),
                TestPathBuilder::new()
                    .hops("1-ff00:0:133#1018 1-ff00:0:122#1815")
                    .build(),
            ]),
            revision: 1,
            refreshed_at: now,
        };

        assert_eq!(snapshot.usable_paths(now).len(), 1);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn refire_is_bounded_by_expiry() {
        let timers = Timers::default();
        let start = Instant::now();

        let empty = next_refire(&timers, WatchState::ErrorBackoff, &PathSet::new());
        assert_eq!(empty - start, timers.error_refire);

        let long_lived = test_path_set(["1-ff00:0:133#1019 1-ff00:0:132#1910"]);
        let normal = next_refire(&timers, WatchState::Normal, &long_lived);
        assert_eq!(normal - start, timers.normal_refire);

        let short_lived = PathSet::from_paths([TestPathBuilder::new()
            .hops("1-ff00:0:133#1019 1-ff00:0:132#1910")
            .expiring_in(Duration::from_secs(20))
            .build()]);
        let bounded = next_refire(&timers, WatchState::Normal, &short_lived);
        assert!(bounded - start <= Duration::from_secs(20));
        assert!(bounded - start >= timers.error_refire);

        let almost_expired = PathSet::from_paths([TestPathBuilder::new()
            .hops("1-ff00:0:133#1019 1-ff00:0:132#1910")
            .expiring_in(Duration::from_millis(10))
            .build()]);
        let floored = next_refire(&timers, WatchState::Normal, &almost_expired);
        assert_eq!(floored - start, timers.error_refire);
    }
}
