// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Serialization of `DATA` resources.

Output is produced in two passes. The first writes the header and every
fixed size record with zeroed offset slots, followed by names and field
data, remembering where everything landed. The second patches each offset
slot with the distance from its base to the target, or [NULL_OFFSET].

Layout: header, structure records, field tables (one per structure, in
structure order), entry records, then names and field data.
*/

use {
    crate::{
        parser::NULL_OFFSET,
        resource::{effective_name_hash, DataResource, DATA_MAGIC},
        DataResult, Error,
    },
    byteorder::{ByteOrder, LittleEndian, WriteBytesExt},
    log::debug,
    std::io::Write,
};

fn count_i32(count: usize, what: &'static str) -> DataResult<i32> {
    i32::try_from(count).map_err(|_| Error::Overflow(what))
}

fn count_u32(count: usize, what: &'static str) -> DataResult<u32> {
    u32::try_from(count).map_err(|_| Error::Overflow(what))
}

/// Append a NUL terminated name, returning its position.
fn write_name(dest: &mut Vec<u8>, name: Option<&str>) -> DataResult<Option<usize>> {
    match name {
        Some(name) => {
            if name.as_bytes().contains(&0) {
                return Err(Error::InteriorNul(name.to_string()));
            }

            let position = dest.len();
            dest.write_all(name.as_bytes())?;
            dest.write_u8(0)?;

            Ok(Some(position))
        }
        None => Ok(None),
    }
}

/// Write the offset from `base` to `target` into the slot at `slot`.
fn patch_offset(dest: &mut [u8], slot: usize, base: usize, target: Option<usize>) -> DataResult<()> {
    let value = match target {
        Some(target) => {
            let relative = i32::try_from(target as i64 - base as i64)
                .ok()
                .filter(|v| *v as u32 != NULL_OFFSET)
                .ok_or(Error::OffsetOverflow { target, base })?;

            relative as u32
        }
        None => NULL_OFFSET,
    };

    LittleEndian::write_u32(&mut dest[slot..slot + 4], value);

    Ok(())
}

/// Serialize a `DATA` resource.
pub fn write_data_resource(resource: &DataResource) -> DataResult<Vec<u8>> {
    for entry in &resource.entries {
        if let Some(index) = entry.structure {
            if index >= resource.structures.len() {
                return Err(Error::UnknownStructure(index));
            }
        }
    }

    let mut dest = Vec::new();

    // Pass 1: fixed size records with placeholder offsets.
    dest.write_all(&DATA_MAGIC)?;
    dest.write_u32::<LittleEndian>(resource.version)?;
    dest.write_u32::<LittleEndian>(0)?;
    dest.write_i32::<LittleEndian>(count_i32(resource.entries.len(), "entry count")?)?;
    dest.write_u32::<LittleEndian>(0)?;
    dest.write_i32::<LittleEndian>(count_i32(resource.structures.len(), "structure count")?)?;

    let mut structure_positions = Vec::with_capacity(resource.structures.len());
    for structure in &resource.structures {
        structure_positions.push(dest.len());

        dest.write_u32::<LittleEndian>(0)?;
        dest.write_u32::<LittleEndian>(effective_name_hash(
            structure.name.as_deref(),
            structure.name_hash,
        ))?;
        dest.write_u32::<LittleEndian>(structure.reserved)?;
        dest.write_u32::<LittleEndian>(structure.size)?;
        dest.write_u32::<LittleEndian>(0)?;
        dest.write_u32::<LittleEndian>(count_u32(structure.fields.len(), "field count")?)?;
    }

    let mut field_positions = Vec::with_capacity(resource.structures.len());
    for structure in &resource.structures {
        let mut positions = Vec::with_capacity(structure.fields.len());

        for field in &structure.fields {
            positions.push(dest.len());

            dest.write_u32::<LittleEndian>(0)?;
            dest.write_u32::<LittleEndian>(effective_name_hash(
                field.name.as_deref(),
                field.name_hash,
            ))?;
            dest.write_u32::<LittleEndian>(u32::from(field.data_type))?;
            dest.write_u32::<LittleEndian>(field.data_offset)?;
            dest.write_u32::<LittleEndian>(field.position_offset)?;
        }

        field_positions.push(positions);
    }

    let mut entry_positions = Vec::with_capacity(resource.entries.len());
    for entry in &resource.entries {
        entry_positions.push(dest.len());

        dest.write_u32::<LittleEndian>(0)?;
        dest.write_u32::<LittleEndian>(effective_name_hash(entry.name.as_deref(), entry.name_hash))?;
        dest.write_u32::<LittleEndian>(0)?;
        dest.write_u32::<LittleEndian>(u32::from(entry.data_type))?;
        dest.write_u32::<LittleEndian>(count_u32(entry.field_size(), "field size")?)?;
        dest.write_u32::<LittleEndian>(0)?;
        dest.write_u32::<LittleEndian>(entry.field_count)?;
    }

    // Pass 1, continued: variable length data.
    let structure_names = resource
        .structures
        .iter()
        .map(|s| write_name(&mut dest, s.name.as_deref()))
        .collect::<DataResult<Vec<_>>>()?;

    let mut field_names = Vec::with_capacity(resource.structures.len());
    for structure in &resource.structures {
        field_names.push(
            structure
                .fields
                .iter()
                .map(|f| write_name(&mut dest, f.name.as_deref()))
                .collect::<DataResult<Vec<_>>>()?,
        );
    }

    let entry_names = resource
        .entries
        .iter()
        .map(|e| write_name(&mut dest, e.name.as_deref()))
        .collect::<DataResult<Vec<_>>>()?;

    let mut entry_data = Vec::with_capacity(resource.entries.len());
    for entry in &resource.entries {
        entry_data.push(match entry.field_data() {
            Some(data) => {
                let position = dest.len();
                dest.write_all(data)?;
                Some(position)
            }
            None => None,
        });
    }

    // Pass 2: resolve every offset slot.
    patch_offset(&mut dest, 8, 12, entry_positions.first().copied())?;
    patch_offset(&mut dest, 16, 20, structure_positions.first().copied())?;

    for (i, position) in structure_positions.iter().copied().enumerate() {
        patch_offset(&mut dest, position, position, structure_names[i])?;
        patch_offset(
            &mut dest,
            position + 16,
            position + 16,
            field_positions[i].first().copied(),
        )?;

        for (j, field_position) in field_positions[i].iter().copied().enumerate() {
            patch_offset(&mut dest, field_position, field_position, field_names[i][j])?;
        }
    }

    for (i, (entry, position)) in resource
        .entries
        .iter()
        .zip(entry_positions.iter().copied())
        .enumerate()
    {
        patch_offset(&mut dest, position, position, entry_names[i])?;
        patch_offset(
            &mut dest,
            position + 8,
            position + 8,
            entry.structure.map(|s| structure_positions[s]),
        )?;
        patch_offset(&mut dest, position + 20, position + 20, entry_data[i])?;
    }

    debug!(
        "wrote DATA resource: {} structures, {} entries, {} bytes",
        resource.structures.len(),
        resource.entries.len(),
        dest.len()
    );

    Ok(dest)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{parser::HEADER_SIZE, DataEntry, DataType, StructureDefinition},
    };

    fn u32_at(data: &[u8], position: usize) -> u32 {
        LittleEndian::read_u32(&data[position..position + 4])
    }

    #[test]
    fn empty_resource_uses_null_offsets() -> DataResult<()> {
        let data = write_data_resource(&DataResource::new())?;

        assert_eq!(data.len(), HEADER_SIZE);
        assert_eq!(&data[0..4], b"DATA");
        assert_eq!(u32_at(&data, 8), NULL_OFFSET);
        assert_eq!(u32_at(&data, 12), 0);
        assert_eq!(u32_at(&data, 16), NULL_OFFSET);
        assert_eq!(u32_at(&data, 20), 0);

        Ok(())
    }

    #[test]
    fn offsets_are_relative_to_their_base() -> DataResult<()> {
        let mut resource = DataResource::new();
        let index = resource.add_structure(StructureDefinition::new("S", 4));

        let mut entry = DataEntry::new(Some("e"), DataType::UInt32);
        entry.structure = Some(index);
        entry.set_field_data(Some(vec![1, 2, 3, 4]));
        entry.field_count = 1;
        resource.entries.push(entry);

        let data = write_data_resource(&resource)?;

        // Structure table at 24, relative to 20.
        assert_eq!(u32_at(&data, 16), 4);
        // Entry table follows the single structure record at 48, relative to 12.
        assert_eq!(u32_at(&data, 8), 36);
        // The structure has no fields.
        assert_eq!(u32_at(&data, 24 + 16), NULL_OFFSET);
        // Entry structure reference at 56 points back at 24.
        assert_eq!(u32_at(&data, 48 + 8) as i32, -32);
        assert_eq!(u32_at(&data, 48 + 16), 4);

        // Names follow the entry record: "S\0" at 76 then "e\0" at 78; field
        // data at 80.
        assert_eq!(data.len(), 84);
        assert_eq!(u32_at(&data, 24), 76 - 24);
        assert_eq!(u32_at(&data, 48), 78 - 48);
        assert_eq!(u32_at(&data, 48 + 20), 80 - 68);
        assert_eq!(&data[80..84], &[1, 2, 3, 4]);

        Ok(())
    }

    #[test]
    fn zero_hash_is_recomputed() -> DataResult<()> {
        let mut entry = DataEntry::new(Some("a"), DataType::Boolean);
        entry.name_hash = 0;

        let mut resource = DataResource::new();
        resource.entries.push(entry);

        let data = write_data_resource(&resource)?;
        assert_eq!(u32_at(&data, HEADER_SIZE + 4), 0x050c_5d7e);

        Ok(())
    }

    #[test]
    fn dangling_structure_reference() {
        let mut entry = DataEntry::new(Some("e"), DataType::Int8);
        entry.structure = Some(3);

        let mut resource = DataResource::new();
        resource.entries.push(entry);

        assert!(matches!(
            write_data_resource(&resource),
            Err(Error::UnknownStructure(3))
        ));
    }

    #[test]
    fn names_with_nul_are_rejected() {
        let mut resource = DataResource::new();
        resource
            .entries
            .push(DataEntry::new(Some("bad\0name"), DataType::Int8));

        assert!(matches!(
            write_data_resource(&resource),
            Err(Error::InteriorNul(_))
        ));
    }
}
