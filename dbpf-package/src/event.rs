// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Notifications emitted by packages.

use crate::ResourceKey;

/// Describes a change made to a [crate::Package].
///
/// Events are advisory. Nothing in the package depends on listeners
/// observing them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PackageEvent {
    /// A resource was added or replaced.
    ResourceAdded(ResourceKey),

    /// A resource was removed.
    ResourceRemoved(ResourceKey),

    /// The package was written out with the given number of resources and bytes.
    Saved(usize, u64),
}

impl std::fmt::Display for PackageEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResourceAdded(key) => write!(f, "added resource {}", key),
            Self::ResourceRemoved(key) => write!(f, "removed resource {}", key),
            Self::Saved(count, size) => {
                write!(f, "wrote {} resources in {} bytes", count, size)
            }
        }
    }
}

/// A callable receiving [PackageEvent]s.
pub type PackageListener = Box<dyn Fn(&PackageEvent) + Send + Sync>;
