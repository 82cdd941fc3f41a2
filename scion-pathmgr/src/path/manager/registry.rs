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

//! Registry of live watches.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use scion_proto::path::HopCrossing;
use tokio::sync::mpsc;

use crate::path::manager::watch::{RevocationRequest, WatchId, WatchShared, WatchTask};

/// A registered watch.
pub(crate) struct WatchEntry {
    pub shared: Arc<WatchShared>,
    pub revocations: mpsc::UnboundedSender<RevocationRequest>,
    /// Cancels the watch task when the entry is dropped.
    pub _task: WatchTask,
}

/// Live watches by id.
#[derive(Default)]
pub(crate) struct WatchRegistry {
    watches: Mutex<HashMap<WatchId, WatchEntry>>,
}

impl WatchRegistry {
    pub fn insert(&self, id: WatchId, entry: WatchEntry) {
        tracing::trace!(watch_id = %id, key = %entry.shared.key, "Registering watch");
        self.lock().insert(id, entry);
    }

    /// Removes a watch. Returns false if it was not registered.
    pub fn remove(&self, id: WatchId) -> bool {
        // Dropped outside the lock.
        let removed = self.lock().remove(&id);
        removed.is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns the revocation channels of all watches whose current snapshot crosses `hop`.
    pub fn affected_by(
        &self,
        hop: &HopCrossing,
    ) -> Vec<(WatchId, mpsc::UnboundedSender<RevocationRequest>)> {
        self.lock()
            .iter()
            .filter(|(_, entry)| entry.shared.load().paths.contains_hop(hop))
            .map(|(id, entry)| (*id, entry.revocations.clone()))
            .collect()
    }

    /// Removes all watches.
    pub fn drain(&self) -> Vec<WatchEntry> {
        self.lock().drain().map(|(_, entry)| entry).collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WatchId, WatchEntry>> {
        // Entries stay consistent even if a holder panicked.
        self.watches.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
