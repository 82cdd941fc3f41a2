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

//! A [PathResolver] is the connector to the path resolution service.
//!
//! The service computes end-to-end paths between two ISD-ASes and verifies revocations. How it is
//! reached is up to the implementation; the path manager only relies on this trait.

use std::borrow::Cow;

use scion_proto::{
    address::IsdAsn,
    control_plane::revocation::{RevocationVerdict, SignedRevocation},
    path::Path,
};

use crate::types::ResFut;

/// Flags modifying a path request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PathRequestFlags {
    /// Bypass caches of the resolution service and fetch fresh paths.
    pub refresh: bool,
    /// Include hidden paths.
    pub hidden: bool,
}

/// Path resolver trait.
pub trait PathResolver: Send + Sync + 'static {
    /// Returns up to `max_paths` candidate paths from `src` to `dst`, best first.
    ///
    /// An empty answer is not an error.
    fn paths(
        &self,
        dst: IsdAsn,
        src: IsdAsn,
        max_paths: u16,
        flags: PathRequestFlags,
    ) -> impl ResFut<'_, Vec<Path>, ResolverError>;

    /// Hands a revocation to the resolution service for verification.
    fn notify_revocation(
        &self,
        revocation: SignedRevocation,
    ) -> impl ResFut<'_, RevocationVerdict, ResolverError>;
}

/// Path resolver errors.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    /// The resolution service could not be reached.
    #[error("transport error: {0}")]
    Transport(Box<dyn std::error::Error + Send + Sync>),

    /// The resolution service answered with an error.
    #[error("resolution service error: {0}")]
    Service(Cow<'static, str>),
}

impl ResolverError {
    /// Creates a service error from a message.
    pub fn service(msg: impl Into<Cow<'static, str>>) -> Self {
        ResolverError::Service(msg.into())
    }
}
