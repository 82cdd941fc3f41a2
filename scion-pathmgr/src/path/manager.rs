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

//! Path manager for SCION path watches.
//!
//! Answers one-shot path queries and maintains watches. A watch is a background task that keeps
//! the policy-filtered path set for a (src, dst) pair fresh and publishes it as an immutable
//! [`Snapshot`](watch::Snapshot). Readers load snapshots lock-free via `ArcSwap`.
//!
//! ## Refresh
//!
//! A watch re-queries the path resolution service every `normal_refire` while it has paths and
//! every `error_refire` while it has none or the last query failed. A failed query keeps the
//! last snapshot.
//!
//! ## Revocations
//!
//! [`PathManager::revoke`] forwards a revocation to every watch whose current snapshot crosses
//! the revoked interface. Each watch verifies the revocation with the resolution service and,
//! unless it is rejected, drops the affected paths. A watch left without paths refreshes
//! immediately.

// Internal:
//
// PathManager: Entry point. Holds the configuration, the resolver and the watch registry.
//
// WatchRegistry: Mutex guarded map from watch id to the watch's shared state, its revocation
// channel and its task. Not generic so that handles can reach it through a weak reference.
//
// Watch: Per-watch worker. Sole writer of its snapshot. Refresh ticks and revocations are
// handled sequentially by the worker, so snapshot revisions are strictly ordered.

use std::{
    future::Future,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, SystemTime},
};

use scion_proto::{
    address::IsdAsn,
    control_plane::revocation::{RevocationVerdict, SignedRevocation},
    path::{
        PathSet,
        policy::{self, Policy},
    },
};
use tokio::select;
use tokio_util::sync::CancellationToken;

use crate::path::{
    manager::{
        registry::WatchRegistry,
        traits::PathQuerier,
        watch::{RevocationRequest, Watch, WatchHandle, WatchId, WatchKey, WatchState},
    },
    resolver::{PathRequestFlags, PathResolver, ResolverError},
};

mod registry;
pub mod watch;

/// Path manager traits.
pub mod traits {
    use scion_proto::{address::IsdAsn, path::PathSet};
    use tokio_util::sync::CancellationToken;

    use super::PathManagerError;
    use crate::{path::resolver::PathRequestFlags, types::ResFut};

    /// Trait for one-shot path queries.
    pub trait PathQuerier: Send + Sync {
        /// Returns the currently valid paths from `src` to `dst`.
        fn query_paths<'a>(
            &'a self,
            src: IsdAsn,
            dst: IsdAsn,
            flags: PathRequestFlags,
            cancel: &'a CancellationToken,
        ) -> impl ResFut<'a, PathSet, PathManagerError>;
    }
}

/// Refresh intervals of a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timers {
    /// Interval between refreshes while the watch has paths.
    pub normal_refire: Duration,
    /// Interval between refreshes while the watch has no paths or the last refresh failed.
    pub error_refire: Duration,
}

impl Default for Timers {
    fn default() -> Self {
        Timers {
            normal_refire: Duration::from_secs(60),
            error_refire: Duration::from_secs(1),
        }
    }
}

impl Timers {
    /// Returns the refresh interval for the given watch state.
    pub fn refire_interval(&self, state: WatchState) -> Duration {
        match state {
            WatchState::Normal => self.normal_refire,
            WatchState::ErrorBackoff | WatchState::Destroyed => self.error_refire,
        }
    }
}

/// Configuration for the [`PathManager`].
#[derive(Debug, Clone, Copy)]
pub struct PathManagerConfig {
    /// Refresh intervals of watches.
    pub timers: Timers,
    /// Maximum number of paths requested per query.
    pub max_paths: u16,
    /// Upper bound for a single path query.
    pub query_timeout: Duration,
    /// Upper bound for a single revocation verification.
    pub revocation_timeout: Duration,
}

impl Default for PathManagerConfig {
    fn default() -> Self {
        PathManagerConfig {
            timers: Timers::default(),
            max_paths: 5,
            query_timeout: Duration::from_secs(5),
            revocation_timeout: Duration::from_secs(5),
        }
    }
}

impl PathManagerConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.timers.error_refire.is_zero() {
            return Err("error_refire must be non-zero");
        }

        if self.timers.error_refire >= self.timers.normal_refire {
            return Err("error_refire must be smaller than normal_refire");
        }

        if self.max_paths == 0 {
            return Err("max_paths must be non-zero");
        }

        if self.query_timeout.is_zero() || self.revocation_timeout.is_zero() {
            return Err("timeouts must be non-zero");
        }

        Ok(())
    }
}

/// Path manager errors.
#[derive(Debug, thiserror::Error)]
pub enum PathManagerError {
    /// The resolver failed.
    #[error("path resolution failed: {0}")]
    Resolution(#[from] ResolverError),
    /// The resolver did not answer in time.
    #[error("path resolution timed out after {0:?}")]
    Timeout(Duration),
    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

/// Path manager maintaining path watches.
pub struct PathManager<R: PathResolver>(Arc<PathManagerInner<R>>);

impl<R: PathResolver> Clone for PathManager<R> {
    fn clone(&self) -> Self {
        PathManager(self.0.clone())
    }
}

struct PathManagerInner<R: PathResolver> {
    config: PathManagerConfig,
    resolver: R,
    registry: Arc<WatchRegistry>,
    next_watch_id: AtomicU64,
}

impl<R: PathResolver> PathManager<R> {
    /// Creates a new [`PathManager`].
    pub fn new(config: PathManagerConfig, resolver: R) -> Result<Self, &'static str> {
        config.validate()?;

        Ok(PathManager(Arc::new(PathManagerInner {
            config,
            resolver,
            registry: Arc::new(WatchRegistry::default()),
            next_watch_id: AtomicU64::new(1),
        })))
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PathManagerConfig {
        &self.0.config
    }

    /// Returns the resolver.
    pub fn resolver(&self) -> &R {
        &self.0.resolver
    }

    /// Returns the currently valid paths from `src` to `dst`.
    ///
    /// Paths are deduplicated by fingerprint and expired paths are dropped. Does not create a
    /// watch.
    pub async fn query(
        &self,
        src: IsdAsn,
        dst: IsdAsn,
        flags: PathRequestFlags,
        cancel: &CancellationToken,
    ) -> Result<PathSet, PathManagerError> {
        let paths = self.resolve_paths(src, dst, flags, cancel).await?;
        tracing::debug!(%src, %dst, paths = paths.len(), "Queried paths");
        Ok(paths)
    }

    /// Like [`PathManager::query`], keeping only the paths the policy allows.
    pub async fn query_filter(
        &self,
        src: IsdAsn,
        dst: IsdAsn,
        policy: &Policy,
        cancel: &CancellationToken,
    ) -> Result<PathSet, PathManagerError> {
        let paths = self
            .resolve_paths(src, dst, PathRequestFlags::default(), cancel)
            .await?;
        let filtered = policy::filter(&paths, Some(policy));
        tracing::debug!(
            %src,
            %dst,
            policy = %policy.name,
            paths = paths.len(),
            allowed = filtered.len(),
            "Queried paths with policy"
        );
        Ok(filtered)
    }

    /// Starts a watch for all paths from `src` to `dst`.
    ///
    /// Every call creates an independent watch. The returned handle already holds the result of
    /// the initial query. If the initial query fails, no watch is created.
    pub async fn watch(
        &self,
        src: IsdAsn,
        dst: IsdAsn,
        cancel: &CancellationToken,
    ) -> Result<WatchHandle, PathManagerError> {
        self.start_watch(src, dst, None, cancel).await
    }

    /// Starts a watch for the paths from `src` to `dst` the policy allows.
    pub async fn watch_filter(
        &self,
        src: IsdAsn,
        dst: IsdAsn,
        policy: Arc<Policy>,
        cancel: &CancellationToken,
    ) -> Result<WatchHandle, PathManagerError> {
        self.start_watch(src, dst, Some(policy), cancel).await
    }

    /// Returns the number of live watches.
    pub fn watch_count(&self) -> usize {
        self.0.registry.len()
    }

    /// Forwards a revocation to every watch whose current snapshot crosses the revoked interface.
    ///
    /// Returns immediately. Verification and path removal happen in the affected watches. The
    /// token aborts their verification calls.
    ///
    /// Returns the number of watches the revocation was dispatched to.
    pub fn revoke(&self, revocation: SignedRevocation, cancel: &CancellationToken) -> usize {
        let hop = *revocation.hop();

        if revocation.info().is_expired(SystemTime::now()) {
            tracing::debug!(%hop, "Ignoring expired revocation");
            return 0;
        }

        let mut dispatched = 0;
        for (id, revocations) in self.0.registry.affected_by(&hop) {
            let request = RevocationRequest {
                revocation: revocation.clone(),
                cancel: cancel.clone(),
            };

            match revocations.send(request) {
                Ok(()) => dispatched += 1,
                Err(_) => tracing::trace!(watch_id = %id, "Watch stopped before revocation"),
            }
        }

        tracing::debug!(%hop, dispatched, "Dispatched revocation");
        dispatched
    }

    /// Destroys all watches.
    ///
    /// Outstanding handles keep their last snapshot.
    pub fn shutdown(&self) {
        let entries = self.0.registry.drain();
        let count = entries.len();

        for entry in entries {
            entry.shared.mark_destroyed();
        }

        tracing::info!(count, "Path manager shut down");
    }

    /// Creates a weak reference to this PathManager.
    pub fn weak_ref(&self) -> PathManagerRef<R> {
        PathManagerRef(Arc::downgrade(&self.0))
    }

    /// Queries the resolver and drops duplicate and expired paths.
    pub(crate) async fn resolve_paths(
        &self,
        src: IsdAsn,
        dst: IsdAsn,
        flags: PathRequestFlags,
        cancel: &CancellationToken,
    ) -> Result<PathSet, PathManagerError> {
        let max_paths = self.0.config.max_paths;
        let paths = with_deadline(
            cancel,
            self.0.config.query_timeout,
            self.0.resolver.paths(dst, src, max_paths, flags),
        )
        .await?;

        Ok(PathSet::from_paths(paths).filter_expired(SystemTime::now()))
    }

    /// Hands a revocation to the resolver for verification.
    pub(crate) async fn verify_revocation(
        &self,
        revocation: SignedRevocation,
        cancel: &CancellationToken,
    ) -> Result<RevocationVerdict, PathManagerError> {
        with_deadline(
            cancel,
            self.0.config.revocation_timeout,
            self.0.resolver.notify_revocation(revocation),
        )
        .await
    }

    async fn start_watch(
        &self,
        src: IsdAsn,
        dst: IsdAsn,
        policy: Option<Arc<Policy>>,
        cancel: &CancellationToken,
    ) -> Result<WatchHandle, PathManagerError> {
        let key = WatchKey::new(src, dst, policy.as_ref().map(|p| p.name.clone()));

        let paths = self
            .resolve_paths(src, dst, PathRequestFlags::default(), cancel)
            .await
            .inspect_err(|e| tracing::warn!(%key, error = %e, "Initial path query failed"))?;
        let paths = policy::filter(&paths, policy.as_deref());

        let id = WatchId(self.0.next_watch_id.fetch_add(1, Ordering::Relaxed));
        tracing::info!(%key, watch_id = %id, paths = paths.len(), "Starting path watch");

        let watch = Watch::new(id, key, policy, paths, self.weak_ref(), self.0.config.timers);
        Ok(watch.manage(&self.0.registry))
    }

    /// Removes a watch from the registry.
    pub(crate) fn remove_watch(&self, id: WatchId) {
        if self.0.registry.remove(id) {
            tracing::debug!(watch_id = %id, "Removed path watch");
        }
    }
}

impl<R: PathResolver> PathQuerier for PathManager<R> {
    fn query_paths<'a>(
        &'a self,
        src: IsdAsn,
        dst: IsdAsn,
        flags: PathRequestFlags,
        cancel: &'a CancellationToken,
    ) -> impl crate::types::ResFut<'a, PathSet, PathManagerError> {
        self.query(src, dst, flags, cancel)
    }
}

/// Weak reference to a PathManager.
pub struct PathManagerRef<R: PathResolver>(Weak<PathManagerInner<R>>);

impl<R: PathResolver> Clone for PathManagerRef<R> {
    fn clone(&self) -> Self {
        PathManagerRef(self.0.clone())
    }
}

impl<R: PathResolver> PathManagerRef<R> {
    /// Attempts to upgrade the weak reference to a strong reference.
    pub fn get(&self) -> Option<PathManager<R>> {
        self.0.upgrade().map(PathManager)
    }
}

/// Runs a resolver call, bounded by `timeout` and aborted by `cancel`.
async fn with_deadline<T>(
    cancel: &CancellationToken,
    timeout: Duration,
    call: impl Future<Output = Result<T, ResolverError>>,
) -> Result<T, PathManagerError> {
    select! {
        biased;
        _ = cancel.cancelled() => Err(PathManagerError::Cancelled),
        res = tokio::time::timeout(timeout, call) => {
            match res {
                Ok(res) => res.map_err(PathManagerError::from),
                Err(_) => Err(PathManagerError::Timeout(timeout)),
            }
        }
    }
}
