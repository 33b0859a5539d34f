// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The resource index.

use {
    crate::{
        format::{IndexRecord, COMPRESSION_FLAG_COMPRESSED},
        ResourceKey,
    },
    std::collections::{hash_map::Entry, HashMap, HashSet},
};

/// Describes where a resource's payload lives and how it is encoded.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct IndexEntry {
    pub key: ResourceKey,

    /// Absolute offset of the payload in the package.
    pub chunk_offset: u32,

    /// Size of the payload as stored in the package.
    pub file_size: u32,

    /// Size of the payload once decompressed.
    pub memory_size: u32,

    /// `0xffff` when compressed, anything else when stored as-is.
    pub compression_flag: u16,

    pub reserved: u16,
}

impl IndexEntry {
    /// Whether the stored payload must be decompressed.
    pub fn is_compressed(&self) -> bool {
        self.compression_flag == COMPRESSION_FLAG_COMPRESSED
    }

    /// Convert to the on-disk record form.
    pub fn to_record(&self) -> IndexRecord {
        IndexRecord {
            resource_type: self.key.resource_type,
            group: self.key.group,
            instance_high: self.key.instance_high(),
            instance_low: self.key.instance_low(),
            chunk_offset: self.chunk_offset,
            file_size: self.file_size,
            memory_size: self.memory_size,
            compression_flag: self.compression_flag,
            reserved: self.reserved,
        }
    }
}

impl From<IndexRecord> for IndexEntry {
    fn from(record: IndexRecord) -> Self {
        Self {
            key: record.key(),
            chunk_offset: record.chunk_offset,
            file_size: record.file_size,
            memory_size: record.memory_size,
            compression_flag: record.compression_flag,
            reserved: record.reserved,
        }
    }
}

/// Maps resource keys to their index entries.
///
/// Entries are additionally bucketed by resource type and by group so
/// filtered enumeration doesn't need to scan the entire index. An entry is
/// present in exactly one type bucket and one group bucket. Buckets are
/// dropped as soon as they become empty.
///
/// Enumeration order is unspecified.
#[derive(Clone, Debug, Default)]
pub struct ResourceIndex {
    entries: HashMap<ResourceKey, IndexEntry>,
    by_type: HashMap<u32, HashSet<ResourceKey>>,
    by_group: HashMap<u32, HashSet<ResourceKey>>,
}

impl ResourceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add an entry.
    ///
    /// Returns false without modifying anything if an entry with the same
    /// key already exists.
    pub fn add(&mut self, entry: IndexEntry) -> bool {
        match self.entries.entry(entry.key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(entry);

                self.by_type
                    .entry(entry.key.resource_type)
                    .or_default()
                    .insert(entry.key);
                self.by_group
                    .entry(entry.key.group)
                    .or_default()
                    .insert(entry.key);

                true
            }
        }
    }

    /// Remove an entry.
    ///
    /// Returns false if no entry exists for the key.
    pub fn remove(&mut self, key: &ResourceKey) -> bool {
        self.take(key).is_some()
    }

    /// Remove an entry, returning it.
    pub fn take(&mut self, key: &ResourceKey) -> Option<IndexEntry> {
        let entry = self.entries.remove(key)?;

        Self::remove_from_bucket(&mut self.by_type, key.resource_type, key);
        Self::remove_from_bucket(&mut self.by_group, key.group, key);

        Some(entry)
    }

    fn remove_from_bucket(
        buckets: &mut HashMap<u32, HashSet<ResourceKey>>,
        bucket: u32,
        key: &ResourceKey,
    ) {
        if let Entry::Occupied(mut slot) = buckets.entry(bucket) {
            slot.get_mut().remove(key);

            if slot.get().is_empty() {
                slot.remove();
            }
        }
    }

    /// Replace the entry stored under `entry.key`.
    ///
    /// This is a remove followed by an add. Returns whether an entry
    /// previously existed.
    pub fn update(&mut self, entry: IndexEntry) -> bool {
        let existed = self.remove(&entry.key);
        self.add(entry);

        existed
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&IndexEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    /// Obtain all entries sorted by key.
    pub fn sorted_entries(&self) -> Vec<IndexEntry> {
        let mut entries = self.entries.values().copied().collect::<Vec<_>>();
        entries.sort_by_key(|entry| entry.key);

        entries
    }

    /// Iterate over entries having a given resource type.
    pub fn by_type(&self, resource_type: u32) -> impl Iterator<Item = &IndexEntry> {
        self.bucket_entries(self.by_type.get(&resource_type))
    }

    /// Iterate over entries in a given group.
    pub fn by_group(&self, group: u32) -> impl Iterator<Item = &IndexEntry> {
        self.bucket_entries(self.by_group.get(&group))
    }

    fn bucket_entries<'a>(
        &'a self,
        bucket: Option<&'a HashSet<ResourceKey>>,
    ) -> impl Iterator<Item = &'a IndexEntry> + 'a {
        bucket
            .into_iter()
            .flat_map(|keys| keys.iter())
            .filter_map(move |key| self.entries.get(key))
    }

    /// Distinct resource types present in the index.
    pub fn resource_types(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_type.keys().copied()
    }

    /// Distinct groups present in the index.
    pub fn groups(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_group.keys().copied()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_type.clear();
        self.by_group.clear();
    }

    /// Verify the secondary buckets agree with the primary map.
    ///
    /// Every entry must appear exactly once in the bucket for its type and
    /// once in the bucket for its group, buckets must not contain unknown
    /// keys, and no bucket may be empty.
    pub fn is_consistent(&self) -> bool {
        let check = |buckets: &HashMap<u32, HashSet<ResourceKey>>,
                     bucket_of: fn(&ResourceKey) -> u32| {
            let mut seen = 0;

            for (bucket, keys) in buckets {
                if keys.is_empty() {
                    return false;
                }

                for key in keys {
                    if bucket_of(key) != *bucket || !self.entries.contains_key(key) {
                        return false;
                    }
                    seen += 1;
                }
            }

            seen == self.entries.len()
        };

        check(&self.by_type, |key| key.resource_type) && check(&self.by_group, |key| key.group)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::format::COMPRESSION_FLAG_STORED};

    fn entry(resource_type: u32, group: u32, instance: u64) -> IndexEntry {
        IndexEntry {
            key: ResourceKey::new(resource_type, group, instance),
            chunk_offset: 0,
            file_size: 0,
            memory_size: 0,
            compression_flag: COMPRESSION_FLAG_STORED,
            reserved: 0,
        }
    }

    #[test]
    fn add_rejects_duplicates() {
        let mut index = ResourceIndex::new();

        assert!(index.add(entry(1, 2, 3)));

        let mut other = entry(1, 2, 3);
        other.file_size = 42;
        assert!(!index.add(other));

        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&ResourceKey::new(1, 2, 3)).unwrap().file_size, 0);
        assert!(index.is_consistent());
    }

    #[test]
    fn remove_prunes_buckets() {
        let mut index = ResourceIndex::new();
        index.add(entry(1, 10, 0));
        index.add(entry(1, 20, 1));
        index.add(entry(2, 10, 2));

        assert!(index.remove(&ResourceKey::new(2, 10, 2)));
        assert!(!index.remove(&ResourceKey::new(2, 10, 2)));

        let mut types = index.resource_types().collect::<Vec<_>>();
        types.sort_unstable();
        assert_eq!(types, vec![1]);
        assert_eq!(index.by_type(2).count(), 0);
        assert_eq!(index.by_group(10).count(), 1);
        assert!(index.is_consistent());

        assert!(index.remove(&ResourceKey::new(1, 10, 0)));
        assert_eq!(index.groups().collect::<Vec<_>>(), vec![20]);
        assert!(index.is_consistent());
    }

    #[test]
    fn update_replaces() {
        let mut index = ResourceIndex::new();
        assert!(!index.update(entry(5, 5, 5)));

        let mut replacement = entry(5, 5, 5);
        replacement.chunk_offset = 1234;
        assert!(index.update(replacement));

        assert_eq!(index.len(), 1);
        assert_eq!(
            index.get(&ResourceKey::new(5, 5, 5)).map(|e| e.chunk_offset),
            Some(1234)
        );
        assert!(index.is_consistent());
    }

    #[test]
    fn filtered_enumeration() {
        let mut index = ResourceIndex::new();
        for i in 0..10 {
            index.add(entry(i % 3, i % 2, i as u64));
        }

        assert_eq!(index.by_type(0).count(), 4);
        assert_eq!(index.by_type(1).count(), 3);
        assert_eq!(index.by_group(0).count(), 5);
        assert!(index.by_type(0).all(|e| e.key.resource_type == 0));
        assert!(index.by_group(1).all(|e| e.key.group == 1));
        assert_eq!(index.by_type(99).count(), 0);
    }

    #[test]
    fn sorted_entries_order() {
        let mut index = ResourceIndex::new();
        index.add(entry(2, 0, 0));
        index.add(entry(1, 5, 0));
        index.add(entry(1, 0, 7));

        let keys = index
            .sorted_entries()
            .into_iter()
            .map(|e| e.key)
            .collect::<Vec<_>>();

        assert_eq!(
            keys,
            vec![
                ResourceKey::new(1, 0, 7),
                ResourceKey::new(1, 5, 0),
                ResourceKey::new(2, 0, 0)
            ]
        );
    }

    #[test]
    fn record_conversion() {
        let mut e = entry(0x0166_1233, 7, 0x1_0000_0002);
        e.compression_flag = COMPRESSION_FLAG_COMPRESSED;
        e.reserved = 1;

        let record = e.to_record();
        assert_eq!(record.instance_high, 1);
        assert_eq!(record.instance_low, 2);
        assert_eq!(IndexEntry::from(record), e);
        assert!(e.is_compressed());
    }

    #[test]
    fn clear_empties_everything() {
        let mut index = ResourceIndex::new();
        index.add(entry(1, 1, 1));
        index.clear();

        assert!(index.is_empty());
        assert_eq!(index.resource_types().count(), 0);
        assert!(index.is_consistent());
    }
}
