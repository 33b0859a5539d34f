// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! On-disk structures of DBPF packages.

use {
    crate::{PackageResult, ResourceKey},
    scroll::{IOread, IOwrite, Pread, Pwrite, SizeWith},
    std::io::{Read, Write},
};

/// File magic. `DBPF`.
pub const DBPF_MAGIC: [u8; 4] = *b"DBPF";

/// Size of the file header, including trailing padding.
pub const HEADER_SIZE: usize = 96;

/// Number of bytes occupied by the declared header fields.
///
/// The remainder of [HEADER_SIZE] is zero padding.
pub const HEADER_FIELDS_SIZE: usize = 84;

/// Size of a single index record.
pub const INDEX_ENTRY_SIZE: usize = 32;

/// Size of the index type discriminator preceding index records.
pub const INDEX_TYPE_SIZE: usize = 4;

/// Compression flag value denoting a compressed payload.
pub const COMPRESSION_FLAG_COMPRESSED: u16 = 0xffff;

/// Compression flag value denoting a payload stored as-is.
pub const COMPRESSION_FLAG_STORED: u16 = 0;

/// Format version written into new packages.
pub const DEFAULT_MAJOR_VERSION: u32 = 2;
pub const DEFAULT_MINOR_VERSION: u32 = 1;
pub const DEFAULT_INDEX_MAJOR_VERSION: u32 = 0;
pub const DEFAULT_INDEX_MINOR_VERSION: u32 = 3;

/// A DBPF package header.
///
/// The header records where the resource index lives. Fields not
/// interpreted by this crate (user versions, hole index fields, reserved
/// slots) are carried through loads and saves untouched.
#[derive(Clone, Copy, Debug, Eq, IOread, IOwrite, PartialEq, Pread, Pwrite, SizeWith)]
pub struct PackageHeader {
    /// File magic. `DBPF`.
    pub magic: [u8; 4],

    pub major_version: u32,
    pub minor_version: u32,
    pub user_major_version: u32,
    pub user_minor_version: u32,
    pub unused0: u32,

    /// Creation time as seconds since UNIX epoch.
    pub created: u32,

    /// Modification time as seconds since UNIX epoch.
    pub modified: u32,

    pub index_major_version: u32,

    /// Number of records in the resource index.
    pub resource_count: u32,

    /// Absolute offset of the resource index.
    pub index_position: u32,

    /// Size in bytes of the resource index, including its type discriminator.
    pub index_size: u32,

    pub unused1: u32,
    pub unused2: u32,

    pub index_minor_version: u32,

    /// Legacy hole index. Not used, preserved verbatim.
    pub hole_index_position: u32,
    pub hole_index_size: u32,
    pub hole_count: u32,

    pub unused3: u32,
    pub unused4: u32,
    pub unused5: u32,
}

impl Default for PackageHeader {
    fn default() -> Self {
        Self {
            magic: DBPF_MAGIC,
            major_version: DEFAULT_MAJOR_VERSION,
            minor_version: DEFAULT_MINOR_VERSION,
            user_major_version: 0,
            user_minor_version: 0,
            unused0: 0,
            created: 0,
            modified: 0,
            index_major_version: DEFAULT_INDEX_MAJOR_VERSION,
            resource_count: 0,
            index_position: 0,
            index_size: 0,
            unused1: 0,
            unused2: 0,
            index_minor_version: DEFAULT_INDEX_MINOR_VERSION,
            hole_index_position: 0,
            hole_index_size: 0,
            hole_count: 0,
            unused3: 0,
            unused4: 0,
            unused5: 0,
        }
    }
}

impl PackageHeader {
    /// Read a header from a reader.
    ///
    /// Consumes exactly [HEADER_SIZE] bytes. Bytes between the declared
    /// fields and the end of the header are skipped. The magic is not
    /// checked; see [Self::is_valid].
    pub fn read_from(reader: &mut impl Read) -> PackageResult<Self> {
        let header = reader.ioread_with::<PackageHeader>(scroll::LE)?;

        let mut trailing = [0u8; HEADER_SIZE - HEADER_FIELDS_SIZE];
        reader.read_exact(&mut trailing)?;

        Ok(header)
    }

    /// Parse a header from the beginning of a byte slice.
    pub fn from_bytes(data: &[u8]) -> PackageResult<Self> {
        Ok(data.pread_with::<PackageHeader>(0, scroll::LE)?)
    }

    /// Whether the header carries the DBPF magic.
    pub fn is_valid(&self) -> bool {
        self.magic == DBPF_MAGIC
    }

    /// Write the header, zero padded to [HEADER_SIZE] bytes.
    pub fn write_to(&self, writer: &mut impl Write) -> PackageResult<()> {
        writer.iowrite_with(*self, scroll::LE)?;
        writer.write_all(&[0u8; HEADER_SIZE - HEADER_FIELDS_SIZE])?;

        Ok(())
    }

    /// Serialize the header to a [HEADER_SIZE] byte array.
    pub fn to_bytes(&self) -> PackageResult<[u8; HEADER_SIZE]> {
        let mut data = [0u8; HEADER_SIZE];
        data.pwrite_with(*self, 0, scroll::LE)?;

        Ok(data)
    }
}

/// A raw record in the resource index.
///
/// This is the on-disk representation. [crate::IndexEntry] is the
/// in-memory form.
#[derive(Clone, Copy, Debug, Default, Eq, IOread, IOwrite, PartialEq, Pread, Pwrite, SizeWith)]
pub struct IndexRecord {
    pub resource_type: u32,
    pub group: u32,
    pub instance_high: u32,
    pub instance_low: u32,

    /// Absolute offset of the payload.
    pub chunk_offset: u32,

    /// Size of the payload as stored.
    pub file_size: u32,

    /// Size of the payload once decompressed.
    pub memory_size: u32,

    pub compression_flag: u16,
    pub reserved: u16,
}

impl IndexRecord {
    pub fn key(&self) -> ResourceKey {
        ResourceKey::from_parts(
            self.resource_type,
            self.group,
            self.instance_high,
            self.instance_low,
        )
    }
}

#[cfg(test)]
mod tests {
    use {super::*, scroll::ctx::SizeWith as _, std::io::Cursor};

    #[test]
    fn structure_sizes() {
        assert_eq!(PackageHeader::size_with(&scroll::LE), HEADER_FIELDS_SIZE);
        assert_eq!(IndexRecord::size_with(&scroll::LE), INDEX_ENTRY_SIZE);
    }

    #[test]
    fn header_layout() -> PackageResult<()> {
        let header = PackageHeader {
            created: 0x1122_3344,
            resource_count: 7,
            index_position: 96,
            index_size: 4 + 7 * 32,
            hole_index_position: 0xdead_beef,
            unused5: 0xfeed_f00d,
            ..PackageHeader::default()
        };

        let mut data = Vec::new();
        header.write_to(&mut data)?;

        assert_eq!(data.len(), HEADER_SIZE);
        assert_eq!(&data[0..4], b"DBPF");
        assert_eq!(&data[4..8], &2u32.to_le_bytes());
        assert_eq!(&data[24..28], &0x1122_3344u32.to_le_bytes());
        assert_eq!(&data[36..40], &7u32.to_le_bytes());
        assert_eq!(&data[40..44], &96u32.to_le_bytes());
        assert_eq!(&data[44..48], &228u32.to_le_bytes());
        assert_eq!(&data[56..60], &3u32.to_le_bytes());
        assert_eq!(&data[60..64], &0xdead_beefu32.to_le_bytes());
        assert_eq!(&data[80..84], &0xfeed_f00du32.to_le_bytes());
        assert!(data[84..].iter().all(|b| *b == 0));

        assert_eq!(header.to_bytes()?.to_vec(), data);

        let mut reader = Cursor::new(&data);
        assert_eq!(PackageHeader::read_from(&mut reader)?, header);
        assert_eq!(reader.position(), HEADER_SIZE as u64);
        assert_eq!(PackageHeader::from_bytes(&data)?, header);

        Ok(())
    }

    #[test]
    fn header_skips_trailing_bytes() -> PackageResult<()> {
        let mut data = PackageHeader::default().to_bytes()?.to_vec();
        data[90] = 0x42;
        data.extend_from_slice(b"next");

        let mut reader = Cursor::new(&data);
        let header = PackageHeader::read_from(&mut reader)?;

        assert!(header.is_valid());
        assert_eq!(reader.position(), HEADER_SIZE as u64);

        Ok(())
    }

    #[test]
    fn header_validity() {
        let mut header = PackageHeader::default();
        assert!(header.is_valid());

        header.magic = *b"DBPP";
        assert!(!header.is_valid());
    }

    #[test]
    fn truncated_header() {
        let data = vec![0u8; 40];
        assert!(PackageHeader::read_from(&mut Cursor::new(&data)).is_err());
    }

    #[test]
    fn index_record_layout() -> PackageResult<()> {
        let record = IndexRecord {
            resource_type: 0x0166_1233,
            group: 2,
            instance_high: 3,
            instance_low: 4,
            chunk_offset: 5,
            file_size: 6,
            memory_size: 7,
            compression_flag: COMPRESSION_FLAG_COMPRESSED,
            reserved: 1,
        };

        let mut data = Vec::new();
        data.iowrite_with(record, scroll::LE)?;

        assert_eq!(data.len(), INDEX_ENTRY_SIZE);
        assert_eq!(&data[0..4], &0x0166_1233u32.to_le_bytes());
        assert_eq!(&data[28..30], &[0xff, 0xff]);
        assert_eq!(&data[30..32], &[1, 0]);

        assert_eq!(data.pread_with::<IndexRecord>(0, scroll::LE)?, record);
        assert_eq!(record.key(), ResourceKey::new(0x0166_1233, 2, (3 << 32) | 4));

        Ok(())
    }
}
