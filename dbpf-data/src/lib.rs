// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `DATA` structured resources.

`DATA` is a self-describing binary format stored inside DBPF package
resources. It consists of structure definitions (named record layouts made
of typed fields) and data entries (named values, optionally laid out by a
structure). Records reference each other and their names through relative
offsets, so the format has no fixed layout beyond its record sizes.

Names are identified by a 32-bit FNV-1 hash; see [fnv1_32].

```
use dbpf_data::{DataEntry, DataResource, DataType, DataValue};

let mut resource = DataResource::new();
let mut entry = DataEntry::new(Some("volume"), DataType::Float);
entry.set_values(&[DataValue::Float(0.5)])?;
resource.entries.push(entry);

let data = resource.to_bytes()?;
let parsed = DataResource::parse(&data)?;
assert_eq!(parsed, resource);
# Ok::<(), dbpf_data::Error>(())
```
*/

pub mod data_type;
pub mod hash;
pub mod parser;
pub mod resource;
pub mod value;
pub mod writer;

pub use {
    data_type::DataType,
    hash::fnv1_32,
    resource::{DataEntry, DataResource, FieldDefinition, StructureDefinition},
    value::{decode_values, DataValue},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a DATA resource (magic {0:02x?})")]
    BadMagic([u8; 4]),

    #[error("malformed DATA resource: {0}")]
    Format(String),

    #[error("{what} at position {position} with length {length} is outside the resource")]
    Bounds {
        what: &'static str,
        position: i64,
        length: usize,
    },

    #[error("string is not NUL terminated")]
    UnterminatedString,

    #[error("string contains a NUL byte: {0:?}")]
    InteriorNul(String),

    #[error("invalid UTF-8 in string: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("entry refers to position {0} which is not a structure record")]
    UnresolvedStructure(usize),

    #[error("entry refers to structure {0} which does not exist")]
    UnknownStructure(usize),

    #[error("offset from {base} to {target} cannot be represented")]
    OffsetOverflow { target: usize, base: usize },

    #[error("{0} exceeds the limits of the format")]
    Overflow(&'static str),

    #[error("{length} bytes is not a whole number of {data_type} values")]
    ValueSize { data_type: DataType, length: usize },

    #[error("expected a {expected} value; got {actual}")]
    ValueType { expected: DataType, actual: DataType },
}

pub type DataResult<T> = std::result::Result<T, Error>;
