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

//! # SCION path manager
//!
//! Keeps policy-filtered path sets fresh for watched (source, destination) pairs.
//!
//! The [`PathManager`](path::manager::PathManager) answers one-shot path queries and runs one
//! background task per watch. Each watch periodically re-queries the path resolution service,
//! filters the answer with its [`Policy`](scion_proto::path::policy::Policy) and publishes a
//! [`Snapshot`](path::manager::watch::Snapshot) that any number of readers can load without
//! blocking. Interface revocations are fanned out to all affected watches, which drop the
//! revoked paths immediately and recover quickly if nothing is left.
//!
//! All state lives in memory. The path resolution service is reached through the
//! [`PathResolver`](path::resolver::PathResolver) trait supplied by the caller.

pub mod path;
pub mod types;
