// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! DBPF resource packages.

A DBPF package is a flat container of opaque resources addressed by a
[ResourceKey] (type, group, instance). A package consists of a 96 byte
header, resource payloads, and an index of 32 byte records describing
where each payload lives and whether it is compressed.

[Package] loads the header and index eagerly and reads payloads lazily
from the backing stream. Resources can be added and removed in memory and
the result written out with [Package::save] or [Package::save_to_path].

```no_run
use dbpf_package::{Package, ResourceKey};

let mut package = Package::open("example.package")?;
let key = ResourceKey::new(0x0166_038c, 0, 42);
package.add_resource(key, b"payload".to_vec(), true)?;
package.save_to_path("example.package")?;
# Ok::<(), dbpf_package::Error>(())
```
*/

pub mod compression;
pub mod event;
pub mod factory;
pub mod format;
pub mod index;
pub mod key;
pub mod package;

pub use {
    compression::{CompressionAdapter, ZlibCompression},
    event::{PackageEvent, PackageListener},
    factory::{FactoryRegistry, RawBytesFactory, ResourceFactory},
    format::PackageHeader,
    index::{IndexEntry, ResourceIndex},
    key::{fnv1a_64, ResourceKey},
    package::{Package, PackageOptions, PackageSource, SaveMode},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("(de)serialization error: {0}")]
    Scroll(#[from] scroll::Error),

    #[error("not a DBPF package (magic {0:02x?})")]
    BadMagic([u8; 4]),

    #[error("malformed package: {0}")]
    Format(String),

    #[error("{what} at offset {offset} with length {length} extends past end of {size} byte stream")]
    Bounds {
        what: &'static str,
        offset: u64,
        length: u64,
        size: u64,
    },

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("resource {0} has neither pending data nor a backing source")]
    Integrity(ResourceKey),

    #[error("resource {0} is too large to store in a package")]
    TooLarge(ResourceKey),

    #[error("{0} exceeds the limits of the package format")]
    Overflow(&'static str),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("decompressed to {actual} bytes; expected {expected}")]
    DecompressedSize { expected: usize, actual: usize },

    #[error("save cancelled")]
    Cancelled,

    #[error("unable to parse resource key: {0}")]
    KeyParse(String),

    #[error("no factory registered for resource type {0:08x}")]
    NoFactory(u32),
}

pub type PackageResult<T> = std::result::Result<T, Error>;
