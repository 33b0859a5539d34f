// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Parsing of `DATA` resources.

References between records are signed 32-bit offsets relative to a base
position that depends on the referencing field. [NULL_OFFSET] marks an
absent reference and is checked before any offset is resolved.
*/

use {
    crate::{
        resource::{DataEntry, DataResource, FieldDefinition, StructureDefinition, DATA_MAGIC},
        DataResult, DataType, Error,
    },
    byteorder::{ByteOrder, LittleEndian},
    log::debug,
    std::collections::HashMap,
};

/// Offset value denoting "no reference".
pub const NULL_OFFSET: u32 = 0x8000_0000;

/// Size of the file header.
pub const HEADER_SIZE: usize = 24;

/// Size of a structure definition record.
pub const STRUCTURE_RECORD_SIZE: usize = 24;

/// Size of a field definition record.
pub const FIELD_RECORD_SIZE: usize = 20;

/// Size of a data entry record.
pub const ENTRY_RECORD_SIZE: usize = 28;

/// Bounds checked access to a `DATA` buffer.
struct DataReader<'a> {
    data: &'a [u8],
}

impl<'a> DataReader<'a> {
    fn u32_at(&self, position: usize, what: &'static str) -> DataResult<u32> {
        position
            .checked_add(4)
            .and_then(|end| self.data.get(position..end))
            .map(LittleEndian::read_u32)
            .ok_or(Error::Bounds {
                what,
                position: position as i64,
                length: 4,
            })
    }

    fn count_at(&self, position: usize, what: &'static str) -> DataResult<usize> {
        let value = self.u32_at(position, what)? as i32;

        usize::try_from(value).map_err(|_| Error::Format(format!("negative {}: {}", what, value)))
    }

    /// Resolve the offset stored at `slot` relative to `base`.
    ///
    /// Returns `None` for [NULL_OFFSET].
    fn offset_at(&self, slot: usize, base: usize, what: &'static str) -> DataResult<Option<usize>> {
        let raw = self.u32_at(slot, what)?;

        if raw == NULL_OFFSET {
            return Ok(None);
        }

        let position = base as i64 + raw as i32 as i64;

        match usize::try_from(position) {
            Ok(position) if position <= self.data.len() => Ok(Some(position)),
            _ => Err(Error::Bounds {
                what,
                position,
                length: 0,
            }),
        }
    }

    /// Ensure a table of `count` records starting at `position` fits.
    fn check_table(
        &self,
        position: usize,
        count: usize,
        record_size: usize,
        what: &'static str,
    ) -> DataResult<()> {
        let fits = count
            .checked_mul(record_size)
            .and_then(|length| position.checked_add(length))
            .map(|end| end <= self.data.len())
            .unwrap_or(false);

        if fits {
            Ok(())
        } else {
            Err(Error::Bounds {
                what,
                position: position as i64,
                length: count.saturating_mul(record_size),
            })
        }
    }

    fn name_at(&self, position: Option<usize>) -> DataResult<Option<String>> {
        let position = match position {
            Some(position) => position,
            None => return Ok(None),
        };

        let tail = &self.data[position..];
        let end = tail
            .iter()
            .position(|b| *b == 0)
            .ok_or(Error::UnterminatedString)?;

        Ok(Some(std::str::from_utf8(&tail[..end])?.to_string()))
    }

    fn bytes_at(&self, position: usize, length: usize, what: &'static str) -> DataResult<&'a [u8]> {
        position
            .checked_add(length)
            .and_then(|end| self.data.get(position..end))
            .ok_or(Error::Bounds {
                what,
                position: position as i64,
                length,
            })
    }
}

fn parse_field(reader: &DataReader, position: usize) -> DataResult<FieldDefinition> {
    Ok(FieldDefinition {
        name: reader.name_at(reader.offset_at(position, position, "field name")?)?,
        name_hash: reader.u32_at(position + 4, "field name hash")?,
        data_type: DataType::from(reader.u32_at(position + 8, "field data type")?),
        data_offset: reader.u32_at(position + 12, "field data offset")?,
        position_offset: reader.u32_at(position + 16, "field position offset")?,
    })
}

fn parse_structure(reader: &DataReader, position: usize) -> DataResult<StructureDefinition> {
    let name = reader.name_at(reader.offset_at(position, position, "structure name")?)?;
    let name_hash = reader.u32_at(position + 4, "structure name hash")?;
    let reserved = reader.u32_at(position + 8, "structure reserved")?;
    let size = reader.u32_at(position + 12, "structure size")?;
    let field_table = reader.offset_at(position + 16, position + 16, "field table")?;
    let field_count = reader.u32_at(position + 20, "field count")? as usize;

    let fields = match (field_table, field_count) {
        (_, 0) => vec![],
        (None, _) => {
            return Err(Error::Format(format!(
                "structure at {} declares {} fields without a field table",
                position, field_count
            )))
        }
        (Some(start), count) => {
            reader.check_table(start, count, FIELD_RECORD_SIZE, "field table")?;

            (0..count)
                .map(|i| parse_field(reader, start + i * FIELD_RECORD_SIZE))
                .collect::<DataResult<Vec<_>>>()?
        }
    };

    Ok(StructureDefinition {
        name,
        name_hash,
        reserved,
        size,
        fields,
    })
}

fn parse_entry(
    reader: &DataReader,
    position: usize,
    structures: &HashMap<usize, usize>,
) -> DataResult<DataEntry> {
    let name = reader.name_at(reader.offset_at(position, position, "entry name")?)?;
    let name_hash = reader.u32_at(position + 4, "entry name hash")?;

    let structure = match reader.offset_at(position + 8, position + 8, "entry structure")? {
        Some(target) => Some(
            *structures
                .get(&target)
                .ok_or(Error::UnresolvedStructure(target))?,
        ),
        None => None,
    };

    let data_type = DataType::from(reader.u32_at(position + 12, "entry data type")?);
    let field_size = reader.u32_at(position + 16, "entry field size")? as usize;
    let field_offset = reader.offset_at(position + 20, position + 20, "entry field data")?;
    let field_count = reader.u32_at(position + 24, "entry field count")?;

    let field_data = match field_offset {
        Some(start) if field_size != 0 => {
            Some(reader.bytes_at(start, field_size, "entry field data")?.to_vec())
        }
        _ => None,
    };

    Ok(DataEntry {
        name,
        name_hash,
        structure,
        data_type,
        field_count,
        field_data,
    })
}

/// Parse a `DATA` resource.
///
/// Structures are parsed first so entries can resolve their structure
/// references to indices.
pub fn parse_data_resource(data: &[u8]) -> DataResult<DataResource> {
    if !data.starts_with(&DATA_MAGIC) {
        let mut magic = [0u8; 4];
        let len = data.len().min(4);
        magic[..len].copy_from_slice(&data[..len]);

        return Err(Error::BadMagic(magic));
    }

    let reader = DataReader { data };

    let version = reader.u32_at(4, "version")?;
    let data_table = reader.offset_at(8, 12, "data table")?;
    let entry_count = reader.count_at(12, "entry count")?;
    let structure_table = reader.offset_at(16, 20, "structure table")?;
    let structure_count = reader.count_at(20, "structure count")?;

    let mut structures = Vec::new();
    let mut structure_positions = HashMap::new();

    if structure_count != 0 {
        let start = structure_table.ok_or_else(|| {
            Error::Format(format!(
                "{} structures declared without a structure table",
                structure_count
            ))
        })?;
        reader.check_table(start, structure_count, STRUCTURE_RECORD_SIZE, "structure table")?;

        for i in 0..structure_count {
            let position = start + i * STRUCTURE_RECORD_SIZE;
            structure_positions.insert(position, i);
            structures.push(parse_structure(&reader, position)?);
        }
    }

    let mut entries = Vec::new();

    if entry_count != 0 {
        let start = data_table.ok_or_else(|| {
            Error::Format(format!(
                "{} entries declared without a data table",
                entry_count
            ))
        })?;
        reader.check_table(start, entry_count, ENTRY_RECORD_SIZE, "data table")?;

        for i in 0..entry_count {
            entries.push(parse_entry(
                &reader,
                start + i * ENTRY_RECORD_SIZE,
                &structure_positions,
            )?);
        }
    }

    debug!(
        "parsed DATA resource version {:#x}: {} structures, {} entries",
        version,
        structures.len(),
        entries.len()
    );

    Ok(DataResource {
        version,
        structures,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A header with no tables.
    fn empty_header() -> Vec<u8> {
        let mut data = b"DATA".to_vec();
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&NULL_OFFSET.to_le_bytes());
        data.extend_from_slice(&0i32.to_le_bytes());
        data.extend_from_slice(&NULL_OFFSET.to_le_bytes());
        data.extend_from_slice(&0i32.to_le_bytes());

        data
    }

    #[test]
    fn empty() -> DataResult<()> {
        let resource = parse_data_resource(&empty_header())?;

        assert_eq!(resource.version, 1);
        assert!(resource.structures.is_empty());
        assert!(resource.entries.is_empty());

        Ok(())
    }

    #[test]
    fn bad_magic() {
        assert!(matches!(
            parse_data_resource(b"DBPF"),
            Err(Error::BadMagic(magic)) if &magic == b"DBPF"
        ));
        assert!(matches!(
            parse_data_resource(b"DA"),
            Err(Error::BadMagic(_))
        ));
    }

    #[test]
    fn truncated_header() {
        assert!(matches!(
            parse_data_resource(&empty_header()[..18]),
            Err(Error::Bounds { .. })
        ));
    }

    #[test]
    fn hand_built_entry() -> DataResult<()> {
        let mut data = empty_header();

        // One entry record at 24; the data table slot at 8 is relative to 12.
        data[8..12].copy_from_slice(&12i32.to_le_bytes());
        data[12..16].copy_from_slice(&1i32.to_le_bytes());

        // Entry: name at 52 (offset 28 from 24), no structure, UInt32, 4
        // bytes of data at 57 (offset 13 from slot 44), 1 element.
        data.extend_from_slice(&28i32.to_le_bytes());
        data.extend_from_slice(&0x050c_5d7eu32.to_le_bytes());
        data.extend_from_slice(&NULL_OFFSET.to_le_bytes());
        data.extend_from_slice(&6u32.to_le_bytes());
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(&13i32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        assert_eq!(data.len(), 52);

        data.extend_from_slice(b"a\0\0\0\0");
        data.extend_from_slice(&0xdead_beefu32.to_le_bytes());

        let resource = parse_data_resource(&data)?;
        assert_eq!(resource.entries.len(), 1);

        let entry = &resource.entries[0];
        assert_eq!(entry.name.as_deref(), Some("a"));
        assert_eq!(entry.structure, None);
        assert_eq!(entry.data_type, DataType::UInt32);
        assert_eq!(
            entry.values()?,
            vec![crate::DataValue::UInt32(0xdead_beef)]
        );

        Ok(())
    }

    #[test]
    fn negative_offsets() -> DataResult<()> {
        let mut data = empty_header();
        data[8..12].copy_from_slice(&12i32.to_le_bytes());
        data[12..16].copy_from_slice(&1i32.to_le_bytes());

        // Entry name points backwards at the magic, which is not NUL
        // terminated until the version field's zero bytes.
        data.extend_from_slice(&(-24i32).to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&NULL_OFFSET.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&NULL_OFFSET.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());

        let resource = parse_data_resource(&data)?;
        assert_eq!(resource.entries[0].name.as_deref(), Some("DATA\u{1}"));
        assert_eq!(resource.entries[0].field_data(), None);

        Ok(())
    }

    #[test]
    fn offset_outside_buffer() {
        let mut data = empty_header();
        data[16..20].copy_from_slice(&1000i32.to_le_bytes());
        data[20..24].copy_from_slice(&1i32.to_le_bytes());

        assert!(matches!(
            parse_data_resource(&data),
            Err(Error::Bounds { .. })
        ));
    }

    #[test]
    fn table_without_offset() {
        let mut data = empty_header();
        data[12..16].copy_from_slice(&3i32.to_le_bytes());

        assert!(matches!(parse_data_resource(&data), Err(Error::Format(_))));
    }

    #[test]
    fn negative_count() {
        let mut data = empty_header();
        data[20..24].copy_from_slice(&(-1i32).to_le_bytes());

        assert!(matches!(parse_data_resource(&data), Err(Error::Format(_))));
    }
}
