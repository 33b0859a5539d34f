// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! In-memory representation of `DATA` resources.

A [DataResource] holds a list of [StructureDefinition]s describing record
layouts and a list of [DataEntry]s holding values. An entry may refer to a
structure; on disk that reference is a relative offset, in memory it is an
index into [DataResource::structures].
*/

use {
    crate::{
        hash::fnv1_32,
        value::{decode_values, DataValue},
        DataResult, DataType, Error,
    },
    std::borrow::Cow,
};

/// Magic bytes at the start of every `DATA` resource.
pub const DATA_MAGIC: [u8; 4] = *b"DATA";

/// Version written by [DataResource::new].
pub const DEFAULT_VERSION: u32 = 0x100;

/// Resolve the hash to write for a name.
///
/// An explicit non-zero hash is kept as is. A zero hash is recomputed from
/// the name, if there is one.
pub(crate) fn effective_name_hash(name: Option<&str>, name_hash: u32) -> u32 {
    match (name, name_hash) {
        (Some(name), 0) => fnv1_32(name.as_bytes()),
        _ => name_hash,
    }
}

/// Describes one field of a structure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldDefinition {
    pub name: Option<String>,
    pub name_hash: u32,
    pub data_type: DataType,

    /// Offset of the field's value within a structure instance.
    pub data_offset: u32,

    pub position_offset: u32,
}

impl FieldDefinition {
    pub fn new(name: &str, data_type: DataType, data_offset: u32) -> Self {
        Self {
            name: Some(name.to_string()),
            name_hash: fnv1_32(name.as_bytes()),
            data_type,
            data_offset,
            position_offset: 0,
        }
    }
}

/// Describes the layout of a record type.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StructureDefinition {
    pub name: Option<String>,
    pub name_hash: u32,
    pub reserved: u32,

    /// Size in bytes of one instance of the structure.
    pub size: u32,

    pub fields: Vec<FieldDefinition>,
}

impl StructureDefinition {
    pub fn new(name: &str, size: u32) -> Self {
        Self {
            name: Some(name.to_string()),
            name_hash: fnv1_32(name.as_bytes()),
            size,
            ..Default::default()
        }
    }

    /// Find a field by name, comparing name hashes.
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        let hash = fnv1_32(name.as_bytes());

        self.fields.iter().find(|f| f.name_hash == hash)
    }
}

/// A named value, optionally laid out according to a structure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DataEntry {
    pub name: Option<String>,
    pub name_hash: u32,

    /// Index into [DataResource::structures].
    pub structure: Option<usize>,

    pub data_type: DataType,

    /// Number of elements held in the field data.
    pub field_count: u32,

    pub(crate) field_data: Option<Vec<u8>>,
}

impl DataEntry {
    /// Construct an entry without structure or data.
    ///
    /// Pass `None` for a nameless entry.
    pub fn new(name: Option<&str>, data_type: DataType) -> Self {
        Self {
            name: name.map(|s| s.to_string()),
            name_hash: name.map(|s| fnv1_32(s.as_bytes())).unwrap_or_default(),
            structure: None,
            data_type,
            field_count: 0,
            field_data: None,
        }
    }

    /// Raw field bytes, if the entry has any.
    pub fn field_data(&self) -> Option<&[u8]> {
        self.field_data.as_deref()
    }

    /// Replace the raw field bytes.
    ///
    /// An empty buffer is stored as no data. `field_count` is not touched.
    pub fn set_field_data(&mut self, data: Option<Vec<u8>>) {
        self.field_data = data.filter(|d| !d.is_empty());
    }

    /// Length in bytes of the field data.
    pub fn field_size(&self) -> usize {
        self.field_data.as_ref().map(|d| d.len()).unwrap_or_default()
    }

    /// Decode the field data into values of [Self::data_type].
    pub fn values(&self) -> DataResult<Vec<DataValue>> {
        match &self.field_data {
            Some(data) => decode_values(self.data_type, data),
            None => Ok(vec![]),
        }
    }

    /// Replace the field data with encoded values.
    ///
    /// Every value must have the entry's data type. `field_count` becomes the
    /// number of values.
    pub fn set_values(&mut self, values: &[DataValue]) -> DataResult<()> {
        let mut data = Vec::new();

        for value in values {
            if value.data_type() != self.data_type {
                return Err(Error::ValueType {
                    expected: self.data_type,
                    actual: value.data_type(),
                });
            }

            value.encode(&mut data)?;
        }

        self.field_count =
            u32::try_from(values.len()).map_err(|_| Error::Overflow("value count"))?;
        self.set_field_data(Some(data));

        Ok(())
    }

    /// The name, or a hex rendering of the hash for nameless entries.
    pub fn display_name(&self) -> Cow<'_, str> {
        match &self.name {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(format!("0x{:08x}", self.name_hash)),
        }
    }
}

/// A decoded `DATA` resource.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DataResource {
    pub version: u32,
    pub structures: Vec<StructureDefinition>,
    pub entries: Vec<DataEntry>,
}

impl Default for DataResource {
    fn default() -> Self {
        Self::new()
    }
}

impl DataResource {
    pub fn new() -> Self {
        Self {
            version: DEFAULT_VERSION,
            structures: vec![],
            entries: vec![],
        }
    }

    /// Whether a buffer looks like a `DATA` resource.
    pub fn sniff(data: &[u8]) -> bool {
        data.starts_with(&DATA_MAGIC)
    }

    /// Parse a resource from bytes.
    pub fn parse(data: &[u8]) -> DataResult<Self> {
        crate::parser::parse_data_resource(data)
    }

    /// Serialize the resource.
    pub fn to_bytes(&self) -> DataResult<Vec<u8>> {
        crate::writer::write_data_resource(self)
    }

    /// Add a structure, returning its index for use in [DataEntry::structure].
    pub fn add_structure(&mut self, structure: StructureDefinition) -> usize {
        self.structures.push(structure);

        self.structures.len() - 1
    }

    /// Resolve the structure an entry refers to.
    pub fn structure_of(&self, entry: &DataEntry) -> Option<&StructureDefinition> {
        entry.structure.and_then(|i| self.structures.get(i))
    }

    /// Find an entry by name, comparing name hashes.
    pub fn entry(&self, name: &str) -> Option<&DataEntry> {
        let hash = fnv1_32(name.as_bytes());

        self.entries.iter().find(|e| e.name_hash == hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_field_data_is_none() {
        let mut entry = DataEntry::new(Some("e"), DataType::UInt8);
        entry.set_field_data(Some(vec![]));

        assert_eq!(entry.field_data(), None);
        assert_eq!(entry.field_size(), 0);
    }

    #[test]
    fn set_values_checks_type() -> DataResult<()> {
        let mut entry = DataEntry::new(Some("counts"), DataType::UInt16);
        entry.set_values(&[DataValue::UInt16(1), DataValue::UInt16(0xbeef)])?;

        assert_eq!(entry.field_count, 2);
        assert_eq!(entry.field_data(), Some(&[1, 0, 0xef, 0xbe][..]));
        assert_eq!(
            entry.values()?,
            vec![DataValue::UInt16(1), DataValue::UInt16(0xbeef)]
        );

        assert!(matches!(
            entry.set_values(&[DataValue::Int32(1)]),
            Err(Error::ValueType {
                expected: DataType::UInt16,
                actual: DataType::Int32
            })
        ));

        Ok(())
    }

    #[test]
    fn name_hashes() {
        assert_eq!(effective_name_hash(Some("a"), 0), 0x050c_5d7e);
        assert_eq!(effective_name_hash(Some("a"), 42), 42);
        assert_eq!(effective_name_hash(None, 0), 0);

        let entry = DataEntry::new(None, DataType::Int32);
        assert_eq!(entry.name_hash, 0);
        assert_eq!(entry.display_name(), "0x00000000");
    }

    #[test]
    fn lookups() {
        let mut resource = DataResource::new();

        let mut structure = StructureDefinition::new("Point", 8);
        structure.fields.push(FieldDefinition::new("x", DataType::Float, 0));
        structure.fields.push(FieldDefinition::new("y", DataType::Float, 4));
        let index = resource.add_structure(structure);

        let mut entry = DataEntry::new(Some("origin"), DataType::Float);
        entry.structure = Some(index);
        resource.entries.push(entry);

        let entry = resource.entry("origin").expect("entry should exist");
        let structure = resource.structure_of(entry).expect("structure should resolve");
        assert_eq!(structure.field("y").map(|f| f.data_offset), Some(4));
        assert!(structure.field("z").is_none());
    }
}
