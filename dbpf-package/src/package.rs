// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reading and writing DBPF packages.

A [Package] holds the parsed header and resource index of a package plus
the payloads of resources added since the package was last saved. Payloads
of untouched resources stay in the backing source and are copied verbatim
when the package is saved.

Packages perform no internal synchronization. Callers must not run
mutations or saves concurrently against the same instance.
*/

use {
    crate::{
        compression::{CompressionAdapter, ZlibCompression},
        event::{PackageEvent, PackageListener},
        format::{
            IndexRecord, PackageHeader, COMPRESSION_FLAG_COMPRESSED, COMPRESSION_FLAG_STORED,
            HEADER_SIZE, INDEX_ENTRY_SIZE, INDEX_TYPE_SIZE,
        },
        index::{IndexEntry, ResourceIndex},
        Error, PackageResult, ResourceKey,
    },
    log::{debug, info, warn},
    scroll::{IOread, IOwrite},
    std::{
        collections::HashMap,
        fmt::{Debug, Formatter},
        io::{Cursor, Read, Seek, SeekFrom, Write},
        path::Path,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
    },
};

/// A seekable stream a package can read payloads from.
pub trait PackageSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> PackageSource for T {}

/// How [Package::save] writes to its destination.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SaveMode {
    /// Assemble the complete package in memory, then write it to the
    /// destination in one pass.
    ///
    /// A failure while assembling (integrity problems, I/O errors reading
    /// the old source, cancellation) leaves the destination untouched.
    Staged,

    /// Write directly into the destination as the package is assembled.
    ///
    /// Every payload is read into memory before the first byte is written,
    /// so the destination may share storage with the package's current
    /// source. The output itself is not buffered. Problems detectable in
    /// advance (missing payloads, stored ranges outside the source) are
    /// reported before anything is written. A later failure, such as an I/O
    /// error or cancellation, leaves the destination holding a partially
    /// written, unusable package.
    Direct,
}

impl Default for SaveMode {
    fn default() -> Self {
        Self::Staged
    }
}

/// Settings controlling the behavior of a [Package].
#[derive(Clone, Debug)]
pub struct PackageOptions {
    read_only: bool,
    save_mode: SaveMode,
    compression: Arc<dyn CompressionAdapter>,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            save_mode: SaveMode::default(),
            compression: Arc::new(ZlibCompression::default()),
        }
    }
}

impl PackageOptions {
    /// Whether mutating operations are refused.
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, value: bool) {
        self.read_only = value;
    }

    pub fn save_mode(&self) -> SaveMode {
        self.save_mode
    }

    pub fn set_save_mode(&mut self, mode: SaveMode) {
        self.save_mode = mode;
    }

    /// The adapter used to compress and decompress payloads.
    pub fn compression(&self) -> &Arc<dyn CompressionAdapter> {
        &self.compression
    }

    pub fn set_compression(&mut self, adapter: Arc<dyn CompressionAdapter>) {
        self.compression = adapter;
    }
}

/// Describes the package produced by a save.
struct SaveLayout {
    header: PackageHeader,
    entries: Vec<IndexEntry>,
    size: u64,
}

fn check_bounds(what: &'static str, offset: u64, length: u64, size: u64) -> PackageResult<()> {
    match offset.checked_add(length) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::Bounds {
            what,
            offset,
            length,
            size,
        }),
    }
}

/// Resolve the length of a stream without disturbing its position.
fn stream_len(stream: &mut impl Seek) -> PackageResult<u64> {
    let position = stream.stream_position()?;
    let len = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(position))?;

    Ok(len)
}

fn unix_timestamp() -> u32 {
    u32::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

/// Read the stored payload of an entry from a source.
///
/// The range is bounds checked before any buffer is allocated.
fn read_stored_payload(
    source: &mut impl PackageSource,
    source_size: u64,
    entry: &IndexEntry,
) -> PackageResult<Vec<u8>> {
    check_bounds(
        "resource payload",
        entry.chunk_offset as u64,
        entry.file_size as u64,
        source_size,
    )?;

    let mut data = Vec::with_capacity(entry.file_size as usize);
    copy_stored_payload(source, source_size, entry, &mut data)?;

    Ok(data)
}

/// Copy the stored payload of an entry from a source to a writer.
///
/// The position of the source is restored afterwards.
fn copy_stored_payload(
    source: &mut impl PackageSource,
    source_size: u64,
    entry: &IndexEntry,
    dest: &mut impl Write,
) -> PackageResult<u64> {
    let offset = entry.chunk_offset as u64;
    let length = entry.file_size as u64;
    check_bounds("resource payload", offset, length, source_size)?;

    let previous = source.stream_position()?;
    source.seek(SeekFrom::Start(offset))?;
    let copied = std::io::copy(&mut source.by_ref().take(length), dest)?;
    source.seek(SeekFrom::Start(previous))?;

    if copied != length {
        return Err(Error::Bounds {
            what: "resource payload",
            offset,
            length,
            size: offset + copied,
        });
    }

    Ok(copied)
}

/// A DBPF resource package.
pub struct Package {
    header: PackageHeader,
    index_type: u32,
    index: ResourceIndex,
    pending: HashMap<ResourceKey, Vec<u8>>,
    source: Option<Box<dyn PackageSource>>,
    options: PackageOptions,
    dirty: bool,
    listeners: Vec<PackageListener>,
}

impl Debug for Package {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Package")
            .field("header", &self.header)
            .field("index_type", &self.index_type)
            .field("resources", &self.index.len())
            .field("pending", &self.pending.len())
            .field("has_source", &self.source.is_some())
            .field("options", &self.options)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl Default for Package {
    fn default() -> Self {
        Self::new()
    }
}

impl Package {
    /// Construct an empty package with default options.
    pub fn new() -> Self {
        Self::with_options(PackageOptions::default())
    }

    /// Construct an empty package.
    pub fn with_options(options: PackageOptions) -> Self {
        Self {
            header: PackageHeader::default(),
            index_type: 0,
            index: ResourceIndex::new(),
            pending: HashMap::new(),
            source: None,
            options,
            dirty: false,
            listeners: vec![],
        }
    }

    /// Load a package from a seekable stream using default options.
    pub fn load(source: impl PackageSource + 'static) -> PackageResult<Self> {
        Self::load_with_options(source, PackageOptions::default())
    }

    /// Load a package from a seekable stream.
    ///
    /// The header and resource index are parsed eagerly. Payloads are read
    /// on demand. The stream is retained as the package's backing source.
    pub fn load_with_options(
        mut source: impl PackageSource + 'static,
        options: PackageOptions,
    ) -> PackageResult<Self> {
        let stream_size = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;

        if stream_size < HEADER_SIZE as u64 {
            return Err(Error::Format(format!(
                "stream of {} bytes is too small to hold a header",
                stream_size
            )));
        }

        let header = PackageHeader::read_from(&mut source)?;

        if !header.is_valid() {
            return Err(Error::BadMagic(header.magic));
        }

        let mut index = ResourceIndex::new();
        let mut index_type = 0;
        let mut dirty = false;

        if header.resource_count != 0 && header.index_size != 0 {
            let required = INDEX_TYPE_SIZE as u64
                + header.resource_count as u64 * INDEX_ENTRY_SIZE as u64;

            if (header.index_size as u64) < required {
                return Err(Error::Format(format!(
                    "index of {} bytes cannot hold {} records",
                    header.index_size, header.resource_count
                )));
            }

            check_bounds(
                "resource index",
                header.index_position as u64,
                header.index_size as u64,
                stream_size,
            )?;

            source.seek(SeekFrom::Start(header.index_position as u64))?;
            index_type = source.ioread_with::<u32>(scroll::LE)?;

            for _ in 0..header.resource_count {
                let entry = IndexEntry::from(source.ioread_with::<IndexRecord>(scroll::LE)?);

                if !index.add(entry) {
                    warn!(
                        "ignoring duplicate index record for {} at offset {}",
                        entry.key, entry.chunk_offset
                    );
                    dirty = true;
                }
            }
        }

        info!(
            "loaded package with {} resources (version {}.{})",
            index.len(),
            header.major_version,
            header.minor_version
        );

        Ok(Self {
            header,
            index_type,
            index,
            pending: HashMap::new(),
            source: Some(Box::new(source)),
            options,
            dirty,
            listeners: vec![],
        })
    }

    /// Open a package file using default options.
    pub fn open(path: impl AsRef<Path>) -> PackageResult<Self> {
        Self::open_with_options(path, PackageOptions::default())
    }

    /// Open a package file.
    pub fn open_with_options(path: impl AsRef<Path>, options: PackageOptions) -> PackageResult<Self> {
        let path = path.as_ref();
        debug!("opening package {}", path.display());

        Self::load_with_options(std::fs::File::open(path)?, options)
    }

    /// The package header as of the last load or save.
    pub fn header(&self) -> &PackageHeader {
        &self.header
    }

    /// The index type discriminator preceding index records.
    pub fn index_type(&self) -> u32 {
        self.index_type
    }

    pub fn index(&self) -> &ResourceIndex {
        &self.index
    }

    pub fn options(&self) -> &PackageOptions {
        &self.options
    }

    /// Number of resources in the package.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Whether the package has changes that haven't been saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_read_only(&self) -> bool {
        self.options.read_only
    }

    /// Whether the package has a stream to read stored payloads from.
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.index.contains(key)
    }

    pub fn entry(&self, key: &ResourceKey) -> Option<&IndexEntry> {
        self.index.get(key)
    }

    /// Iterate over all index entries.
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.index.iter()
    }

    pub fn by_type(&self, resource_type: u32) -> impl Iterator<Item = &IndexEntry> {
        self.index.by_type(resource_type)
    }

    pub fn by_group(&self, group: u32) -> impl Iterator<Item = &IndexEntry> {
        self.index.by_group(group)
    }

    /// Register a listener for [PackageEvent]s.
    pub fn subscribe(&mut self, listener: impl Fn(&PackageEvent) + Send + Sync + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&self, event: PackageEvent) {
        debug!("{}", event);

        for listener in &self.listeners {
            listener(&event);
        }
    }

    fn ensure_writable(&self, operation: &'static str) -> PackageResult<()> {
        if self.options.read_only {
            Err(Error::Unsupported(operation))
        } else {
            Ok(())
        }
    }

    /// Obtain the decompressed payload for an index entry.
    ///
    /// Payloads added since the last save are served from memory. Others
    /// are read from the backing source. No interpretation of the payload
    /// happens here; see [crate::FactoryRegistry] for typed decoding.
    pub fn raw_bytes_for_entry(&mut self, entry: &IndexEntry) -> PackageResult<Vec<u8>> {
        let stored = if let Some(data) = self.pending.get(&entry.key) {
            data.clone()
        } else {
            let source = self.source.as_mut().ok_or(Error::Integrity(entry.key))?;
            let source_size = stream_len(source)?;

            read_stored_payload(source, source_size, entry)?
        };

        if entry.is_compressed() {
            self.options
                .compression
                .decompress(&stored, entry.memory_size as usize)
        } else {
            Ok(stored)
        }
    }

    /// Obtain the decompressed payload of a resource, if present.
    pub fn raw_bytes(&mut self, key: &ResourceKey) -> PackageResult<Option<Vec<u8>>> {
        match self.index.get(key).copied() {
            Some(entry) => Ok(Some(self.raw_bytes_for_entry(&entry)?)),
            None => Ok(None),
        }
    }

    /// Add a resource, replacing any existing resource with the same key.
    ///
    /// When `compress` is true the payload is run through the compression
    /// adapter. The compressed form is kept only if it is smaller than the
    /// original. Otherwise the original bytes are stored uncompressed, so
    /// the compression flag always describes the bytes actually stored.
    pub fn add_resource(
        &mut self,
        key: ResourceKey,
        data: Vec<u8>,
        compress: bool,
    ) -> PackageResult<IndexEntry> {
        self.ensure_writable("adding resources to a read-only package")?;

        let memory_size = u32::try_from(data.len()).map_err(|_| Error::TooLarge(key))?;

        let (stored, compression_flag) = if compress {
            let compressed = self.options.compression.compress(&data)?;

            if compressed.len() < data.len() {
                (compressed, COMPRESSION_FLAG_COMPRESSED)
            } else {
                debug!(
                    "{} does not compress ({} -> {} bytes); storing as-is",
                    key,
                    data.len(),
                    compressed.len()
                );
                (data, COMPRESSION_FLAG_STORED)
            }
        } else {
            (data, COMPRESSION_FLAG_STORED)
        };

        let entry = IndexEntry {
            key,
            chunk_offset: 0,
            file_size: stored.len() as u32,
            memory_size,
            compression_flag,
            reserved: 0,
        };

        self.index.take(&key);
        self.index.add(entry);
        self.pending.insert(key, stored);
        self.dirty = true;

        self.emit(PackageEvent::ResourceAdded(key));

        Ok(entry)
    }

    /// Remove a resource.
    ///
    /// Returns false and changes nothing if the resource doesn't exist.
    pub fn remove_resource(&mut self, key: &ResourceKey) -> PackageResult<bool> {
        self.ensure_writable("removing resources from a read-only package")?;

        if !self.index.remove(key) {
            return Ok(false);
        }

        self.pending.remove(key);
        self.dirty = true;

        self.emit(PackageEvent::ResourceRemoved(*key));

        Ok(true)
    }

    /// Write the package to a stream and adopt that stream as the new source.
    ///
    /// The stream should be empty or positioned over content that may be
    /// overwritten from offset 0. Bytes beyond the end of the new package
    /// are not truncated.
    ///
    /// On success, pending payloads are dropped, index entries point at
    /// their new locations in `dest` and the package is no longer dirty.
    pub fn save<S>(&mut self, dest: S) -> PackageResult<()>
    where
        S: Read + Write + Seek + Send + 'static,
    {
        self.save_with_cancellation(dest, &AtomicBool::new(false))
    }

    /// Like [Self::save] but checks `cancel` before processing each resource.
    ///
    /// Cancellation yields [Error::Cancelled]. With [SaveMode::Staged] the
    /// destination is left untouched; with [SaveMode::Direct] its content is
    /// unspecified.
    pub fn save_with_cancellation<S>(&mut self, mut dest: S, cancel: &AtomicBool) -> PackageResult<()>
    where
        S: Read + Write + Seek + Send + 'static,
    {
        self.ensure_writable("saving a read-only package")?;

        let layout = match self.options.save_mode {
            SaveMode::Staged => {
                let mut staging = Cursor::new(Vec::new());
                let layout = self.write_package(&mut staging, cancel, false)?;

                dest.seek(SeekFrom::Start(0))?;
                dest.write_all(staging.get_ref())?;

                layout
            }
            SaveMode::Direct => self.write_package(&mut dest, cancel, true)?,
        };

        dest.flush()?;
        self.commit(layout, Box::new(dest));

        Ok(())
    }

    /// Write the package to a file.
    ///
    /// Content is written to a temporary file in the same directory which
    /// then atomically replaces `path`. The package then reads from the new
    /// file. This works when `path` is the file the package was opened from.
    pub fn save_to_path(&mut self, path: impl AsRef<Path>) -> PackageResult<()> {
        self.ensure_writable("saving a read-only package")?;

        let path = path.as_ref();
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        let layout = self.write_package(temp.as_file_mut(), &AtomicBool::new(false), false)?;
        temp.as_file_mut().flush()?;
        temp.as_file().sync_all()?;

        let file = temp.persist(path).map_err(|e| Error::Io(e.error))?;
        info!("wrote package to {}", path.display());

        self.commit(layout, Box::new(file));

        Ok(())
    }

    /// Serialize the package to a byte vector.
    ///
    /// This is a snapshot. The package itself is not modified.
    pub fn to_vec(&mut self) -> PackageResult<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        self.write_package(&mut buffer, &AtomicBool::new(false), false)?;

        Ok(buffer.into_inner())
    }

    /// Drop stale state and write a minimal package to `dest`.
    ///
    /// Payloads not referenced by the index are discarded and the index is
    /// rebuilt before saving. Space used by removed or replaced resources in
    /// the old source is not carried over, as with every save.
    pub fn compact<S>(&mut self, dest: S) -> PackageResult<()>
    where
        S: Read + Write + Seek + Send + 'static,
    {
        self.compact_state()?;
        self.save(dest)
    }

    /// Like [Self::compact] but writes to a file, as [Self::save_to_path].
    pub fn compact_to_path(&mut self, path: impl AsRef<Path>) -> PackageResult<()> {
        self.compact_state()?;
        self.save_to_path(path)
    }

    fn compact_state(&mut self) -> PackageResult<()> {
        self.ensure_writable("compacting a read-only package")?;

        let before = self.pending.len();
        let index = &self.index;
        self.pending.retain(|key, _| index.contains(key));
        let orphaned = before - self.pending.len();

        let entries = self.index.sorted_entries();
        self.index.clear();
        for entry in entries {
            if !self.index.add(entry) {
                warn!("dropping duplicate entry for {}", entry.key);
            }
        }

        info!(
            "compacting package: {} resources, {} orphaned payloads dropped",
            self.index.len(),
            orphaned
        );

        Ok(())
    }

    /// Write the complete package to `dest`, starting at offset 0.
    ///
    /// Every entry is validated before anything is written: each needs a
    /// pending payload or a stored range inside the backing source. With
    /// `prefetch`, stored payloads are then read into memory so `dest` may
    /// alias the source.
    ///
    /// A provisional header and index are written first. Payloads follow in
    /// index order, either from pending data or copied from the backing
    /// source. The header and index are then rewritten with final offsets
    /// and timestamps. Nothing in `self` is modified.
    fn write_package<W: Write + Seek>(
        &mut self,
        dest: &mut W,
        cancel: &AtomicBool,
        prefetch: bool,
    ) -> PackageResult<SaveLayout> {
        let entries = self.index.sorted_entries();

        let source_size = match self.source.as_mut() {
            Some(source) => stream_len(source)?,
            None => 0,
        };

        for entry in entries
            .iter()
            .filter(|entry| !self.pending.contains_key(&entry.key))
        {
            if self.source.is_none() {
                return Err(Error::Integrity(entry.key));
            }

            check_bounds(
                "resource payload",
                entry.chunk_offset as u64,
                entry.file_size as u64,
                source_size,
            )?;
        }

        let mut prefetched = HashMap::new();
        if prefetch {
            if let Some(source) = self.source.as_mut() {
                for entry in entries
                    .iter()
                    .filter(|entry| !self.pending.contains_key(&entry.key))
                {
                    if cancel.load(Ordering::Relaxed) {
                        return Err(Error::Cancelled);
                    }

                    let data = read_stored_payload(source, source_size, entry)?;
                    prefetched.insert(entry.key, data);
                }
            }

            debug!("read {} stored payloads ahead of writing", prefetched.len());
        }

        let resource_count =
            u32::try_from(entries.len()).map_err(|_| Error::Overflow("resource count"))?;
        let index_size = u32::try_from(INDEX_TYPE_SIZE + entries.len() * INDEX_ENTRY_SIZE)
            .map_err(|_| Error::Overflow("index size"))?;

        let mut header = self.header;
        header.resource_count = resource_count;
        header.index_position = HEADER_SIZE as u32;
        header.index_size = index_size;

        dest.seek(SeekFrom::Start(0))?;
        header.write_to(dest)?;
        Self::write_index(dest, self.index_type, &entries)?;

        let mut cursor = HEADER_SIZE as u64 + index_size as u64;
        let mut relocated = Vec::with_capacity(entries.len());

        for entry in entries {
            if cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }

            let chunk_offset = u32::try_from(cursor).map_err(|_| Error::Overflow("package size"))?;

            let written = if let Some(data) = self
                .pending
                .get(&entry.key)
                .or_else(|| prefetched.get(&entry.key))
            {
                dest.write_all(data)?;
                data.len() as u64
            } else if let Some(source) = self.source.as_mut() {
                copy_stored_payload(source, source_size, &entry, dest)?
            } else {
                return Err(Error::Integrity(entry.key));
            };

            debug!(
                "{}: {} bytes at offset {} (previously {})",
                entry.key, written, chunk_offset, entry.chunk_offset
            );

            relocated.push(IndexEntry {
                chunk_offset,
                file_size: written as u32,
                ..entry
            });
            cursor += written;
        }

        let now = unix_timestamp();
        if header.created == 0 {
            header.created = now;
        }
        header.modified = now;

        dest.seek(SeekFrom::Start(0))?;
        header.write_to(dest)?;
        Self::write_index(dest, self.index_type, &relocated)?;
        dest.seek(SeekFrom::Start(cursor))?;

        Ok(SaveLayout {
            header,
            entries: relocated,
            size: cursor,
        })
    }

    fn write_index(
        dest: &mut impl Write,
        index_type: u32,
        entries: &[IndexEntry],
    ) -> PackageResult<()> {
        dest.iowrite_with(index_type, scroll::LE)?;

        for entry in entries {
            dest.iowrite_with(entry.to_record(), scroll::LE)?;
        }

        Ok(())
    }

    /// Adopt the result of a successful save.
    fn commit(&mut self, layout: SaveLayout, source: Box<dyn PackageSource>) {
        let count = layout.entries.len();

        self.header = layout.header;
        self.index.clear();
        for entry in layout.entries {
            self.index.add(entry);
        }
        self.pending.clear();
        self.source = Some(source);
        self.dirty = false;

        info!("saved package with {} resources ({} bytes)", count, layout.size);
        self.emit(PackageEvent::Saved(count, layout.size));
    }
}
