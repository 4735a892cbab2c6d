// Wire layouts follow
// https://android.googlesource.com/platform/frameworks/base/+/master/libs/androidfw/include/androidfw/ResourceTypes.h

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Write};

use binrw::{BinRead, BinWrite};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::chunk::{parse_children, Chunk, ChunkMeta, SerializeOptions, METADATA_SIZE};
use crate::config::ResourceConfiguration;
use crate::error::{Error, Result};
use crate::res_value::{ResourceValue, ValueType};
use crate::stream;
use crate::string_pool::StringPoolChunk;

/// Sentinel offset marking an absent entry in a dense offset table.
pub const NO_ENTRY: u32 = 0xffff_ffff;
/// Type chunk flag: the entry table stores only present entries.
pub const FLAG_SPARSE: u8 = 0x01;
/// Entry flag: the entry holds a map of name/value pairs.
pub const FLAG_COMPLEX: u16 = 0x0001;
/// Entry flag: the resource may be referenced by library consumers.
pub const FLAG_PUBLIC: u16 = 0x0002;
/// Type-spec mask bit marking an entry as public.
pub const SPEC_PUBLIC: u32 = 0x4000_0000;

const TYPE_HEADER_BODY: u16 = 12;
const SPEC_HEADER_SIZE: u16 = 16;
const LIBRARY_HEADER_SIZE: u16 = 12;
const TABLE_HEADER_SIZE: u16 = METADATA_SIZE + 4;
const PACKAGE_HEADER_SIZE: u16 = 288;
const PACKAGE_NAME_UNITS: usize = 128;
/// Byte offset of the type-strings slot within the package header.
const TYPE_STRINGS_OFFSET_SLOT: usize = 268;
/// Byte offset of the key-strings slot within the package header.
const KEY_STRINGS_OFFSET_SLOT: usize = 276;

const ENTRY_SIMPLE_HEADER: u16 = 8;
const ENTRY_COMPLEX_HEADER: u16 = 16;

/// One resource entry: the key-string index plus either a single value or a
/// map of name/value pairs inherited from a parent entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    header_size: u16,
    flags: u16,
    key_index: u32,
    value: EntryValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryValue {
    Simple(ResourceValue),
    Complex {
        /// Resource identifier of the parent mapping, or 0 if there is none.
        parent_entry: u32,
        values: BTreeMap<u32, ResourceValue>,
    },
}

impl Entry {
    pub fn simple(key_index: u32, value: ResourceValue) -> Self {
        Self {
            header_size: ENTRY_SIMPLE_HEADER,
            flags: 0,
            key_index,
            value: EntryValue::Simple(value),
        }
    }

    pub fn complex(key_index: u32, parent_entry: u32, values: BTreeMap<u32, ResourceValue>) -> Self {
        Self {
            header_size: ENTRY_COMPLEX_HEADER,
            flags: FLAG_COMPLEX,
            key_index,
            value: EntryValue::Complex {
                parent_entry,
                values,
            },
        }
    }

    fn parse(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let header_size = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let key_index = cursor.read_u32::<LittleEndian>()?;

        let value = if flags & FLAG_COMPLEX != 0 {
            let parent_entry = cursor.read_u32::<LittleEndian>()?;
            let value_count = cursor.read_u32::<LittleEndian>()?;
            let mut values = BTreeMap::new();
            for _ in 0..value_count {
                let name = cursor.read_u32::<LittleEndian>()?;
                values.insert(name, ResourceValue::read_le(cursor)?);
            }
            EntryValue::Complex {
                parent_entry,
                values,
            }
        } else {
            EntryValue::Simple(ResourceValue::read_le(cursor)?)
        };

        Ok(Self {
            header_size,
            flags,
            key_index,
            value,
        })
    }

    fn write_to(&self, out: &mut Cursor<Vec<u8>>, options: SerializeOptions) -> Result<()> {
        let mut flags = self.flags;
        if options.private_resources() {
            flags &= !FLAG_PUBLIC;
        }
        out.write_u16::<LittleEndian>(self.header_size)?;
        out.write_u16::<LittleEndian>(flags)?;
        out.write_u32::<LittleEndian>(self.key_index)?;
        match &self.value {
            EntryValue::Simple(value) => value.write_le(out)?,
            EntryValue::Complex {
                parent_entry,
                values,
            } => {
                out.write_u32::<LittleEndian>(*parent_entry)?;
                out.write_u32::<LittleEndian>(values.len() as u32)?;
                for (name, value) in values {
                    out.write_u32::<LittleEndian>(*name)?;
                    value.write_le(out)?;
                }
            }
        }
        Ok(())
    }

    pub fn header_size(&self) -> u16 {
        self.header_size
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    pub fn key_index(&self) -> u32 {
        self.key_index
    }

    pub fn set_key_index(&mut self, key_index: u32) {
        self.key_index = key_index;
    }

    pub fn is_complex(&self) -> bool {
        self.flags & FLAG_COMPLEX != 0
    }

    pub fn is_public(&self) -> bool {
        self.flags & FLAG_PUBLIC != 0
    }

    pub fn set_public(&mut self, public: bool) {
        if public {
            self.flags |= FLAG_PUBLIC;
        } else {
            self.flags &= !FLAG_PUBLIC;
        }
    }

    pub fn value(&self) -> &EntryValue {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut EntryValue {
        &mut self.value
    }
}

/// A collection of resource entries for one resource type under one device
/// configuration. The entry table is dense (one offset slot per possible
/// index) or sparse (index/offset pairs for present entries only).
#[derive(Debug, Clone)]
pub struct TypeChunk {
    meta: ChunkMeta,
    id: u8,
    flags: u8,
    total_entry_count: u32,
    configuration: ResourceConfiguration,
    entries: BTreeMap<u16, Entry>,
}

impl TypeChunk {
    pub fn new(id: u8, configuration: ResourceConfiguration) -> Self {
        let header_size = METADATA_SIZE + TYPE_HEADER_BODY + configuration.size() as u16;
        Self {
            meta: ChunkMeta::synthetic(header_size),
            id,
            flags: 0,
            total_entry_count: 0,
            configuration,
            entries: BTreeMap::new(),
        }
    }

    pub(crate) fn parse(meta: ChunkMeta, cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let base = meta.original_offset;
        let id = cursor.read_u8()?;
        if id == 0 {
            return Err(Error::InvalidTypeId(0));
        }
        let flags = cursor.read_u8()?;
        let reserved = cursor.read_u16::<LittleEndian>()?;
        if reserved != 0 {
            return Err(Error::InvalidReserved {
                field: "type chunk reserved",
                value: reserved as u32,
            });
        }
        let total_entry_count = cursor.read_u32::<LittleEndian>()?;
        let entries_start = cursor.read_u32::<LittleEndian>()?;
        let configuration = ResourceConfiguration::parse(cursor)?;

        cursor.set_position(base + meta.header_size as u64);
        let mut entries = BTreeMap::new();
        if flags & FLAG_SPARSE != 0 {
            let mut table = Vec::with_capacity(total_entry_count as usize);
            for _ in 0..total_entry_count {
                let index = cursor.read_u16::<LittleEndian>()?;
                let offset = cursor.read_u16::<LittleEndian>()? as u32 * 4;
                table.push((index, offset));
            }
            for (index, offset) in table {
                cursor.set_position(base + entries_start as u64 + offset as u64);
                entries.insert(index, Entry::parse(cursor)?);
            }
        } else {
            let mut table = Vec::with_capacity(total_entry_count as usize);
            for _ in 0..total_entry_count {
                table.push(cursor.read_u32::<LittleEndian>()?);
            }
            for (index, offset) in table.into_iter().enumerate() {
                if offset == NO_ENTRY {
                    continue;
                }
                cursor.set_position(base + entries_start as u64 + offset as u64);
                entries.insert(index as u16, Entry::parse(cursor)?);
            }
        }

        Ok(Self {
            meta,
            id,
            flags,
            total_entry_count,
            configuration,
            entries,
        })
    }

    pub fn meta(&self) -> ChunkMeta {
        self.meta
    }

    /// The 1-based type id; an index into the package's type string pool.
    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn is_sparse(&self) -> bool {
        self.flags & FLAG_SPARSE != 0
    }

    /// Toggle the sparse wire encoding. Only the flag changes; entries are
    /// re-encoded accordingly on the next write.
    pub fn set_sparse_entries(&mut self, sparse: bool) {
        if sparse {
            self.flags |= FLAG_SPARSE;
        } else {
            self.flags &= !FLAG_SPARSE;
        }
    }

    pub fn total_entry_count(&self) -> u32 {
        self.total_entry_count
    }

    pub fn configuration(&self) -> &ResourceConfiguration {
        &self.configuration
    }

    pub fn entries(&self) -> &BTreeMap<u16, Entry> {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut BTreeMap<u16, Entry> {
        &mut self.entries
    }

    /// Replace the whole entry table and its declared capacity.
    pub fn set_entries(&mut self, entries: BTreeMap<u16, Entry>, total_entry_count: u32) {
        self.entries = entries;
        self.total_entry_count = total_entry_count;
    }

    /// Apply a batch of entry updates: `Some` inserts or replaces, `None`
    /// removes. Indices outside `total_entry_count` are silently ignored.
    pub fn override_entries(&mut self, overrides: BTreeMap<u16, Option<Entry>>) {
        for (index, entry) in overrides {
            if (index as u32) >= self.total_entry_count {
                continue;
            }
            match entry {
                Some(entry) => {
                    self.entries.insert(index, entry);
                }
                None => {
                    self.entries.remove(&index);
                }
            }
        }
    }

    fn offset_table_size(&self) -> u32 {
        if self.is_sparse() {
            (self.entries.len() * 4) as u32
        } else {
            self.total_entry_count * 4
        }
    }

    pub(crate) fn write_header(&self, out: &mut Cursor<Vec<u8>>) -> Result<()> {
        out.write_u8(self.id)?;
        out.write_u8(self.flags)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(self.total_entry_count)?;
        let entries_start = if self.entries.is_empty() {
            0
        } else {
            self.meta.header_size as u32 + self.offset_table_size()
        };
        out.write_u32::<LittleEndian>(entries_start)?;
        self.configuration.write_to(out)?;
        Ok(())
    }

    pub(crate) fn write_payload(
        &self,
        out: &mut Cursor<Vec<u8>>,
        _header: &mut Vec<u8>,
        options: SerializeOptions,
    ) -> Result<()> {
        let mut offsets: Vec<u8> = Vec::with_capacity(self.offset_table_size() as usize);
        let mut blob = Cursor::new(Vec::new());

        if self.is_sparse() {
            for (&index, entry) in &self.entries {
                let offset = blob.position() as u32;
                if offset % 4 != 0 {
                    return Err(Error::MisalignedSparseEntry(offset));
                }
                offsets.write_u16::<LittleEndian>(index)?;
                offsets.write_u16::<LittleEndian>((offset / 4) as u16)?;
                entry.write_to(&mut blob, options)?;
            }
        } else {
            for index in 0..self.total_entry_count {
                match self.entries.get(&(index as u16)) {
                    Some(entry) => {
                        offsets.write_u32::<LittleEndian>(blob.position() as u32)?;
                        entry.write_to(&mut blob, options)?;
                    }
                    None => offsets.write_u32::<LittleEndian>(NO_ENTRY)?,
                }
            }
        }

        out.write_all(&offsets)?;
        out.write_all(&blob.into_inner())?;
        Ok(())
    }
}

/// Per-entry configuration masks for one resource type: which configuration
/// axes vary between that type's chunks, plus the public bit.
#[derive(Debug, Clone)]
pub struct TypeSpecChunk {
    meta: ChunkMeta,
    id: u8,
    types_count: u16,
    masks: Vec<u32>,
}

impl TypeSpecChunk {
    pub fn new(id: u8, masks: Vec<u32>) -> Self {
        Self {
            meta: ChunkMeta::synthetic(SPEC_HEADER_SIZE),
            id,
            types_count: 0,
            masks,
        }
    }

    pub(crate) fn parse(meta: ChunkMeta, cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let id = cursor.read_u8()?;
        if id == 0 {
            return Err(Error::InvalidTypeId(0));
        }
        let reserved = cursor.read_u8()?;
        if reserved != 0 {
            return Err(Error::InvalidReserved {
                field: "type spec reserved",
                value: reserved as u32,
            });
        }
        // formerly reserved; newer encoders store the type chunk count here
        let types_count = cursor.read_u16::<LittleEndian>()?;
        let entry_count = cursor.read_u32::<LittleEndian>()?;
        let mut masks = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            masks.push(cursor.read_u32::<LittleEndian>()?);
        }
        Ok(Self {
            meta,
            id,
            types_count,
            masks,
        })
    }

    pub fn meta(&self) -> ChunkMeta {
        self.meta
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn masks(&self) -> &[u32] {
        &self.masks
    }

    pub fn masks_mut(&mut self) -> &mut Vec<u32> {
        &mut self.masks
    }

    pub fn is_public(&self, index: usize) -> bool {
        self.masks
            .get(index)
            .map(|mask| mask & SPEC_PUBLIC != 0)
            .unwrap_or(false)
    }

    pub(crate) fn write_header(&self, out: &mut Cursor<Vec<u8>>) -> Result<()> {
        out.write_u8(self.id)?;
        out.write_u8(0)?;
        out.write_u16::<LittleEndian>(self.types_count)?;
        out.write_u32::<LittleEndian>(self.masks.len() as u32)?;
        Ok(())
    }

    pub(crate) fn write_payload(
        &self,
        out: &mut Cursor<Vec<u8>>,
        _header: &mut Vec<u8>,
        options: SerializeOptions,
    ) -> Result<()> {
        for &mask in &self.masks {
            let mask = if options.private_resources() {
                mask & !SPEC_PUBLIC
            } else {
                mask
            };
            out.write_u32::<LittleEndian>(mask)?;
        }
        Ok(())
    }
}

/// One shared-library dependency: the package id assigned at build time and
/// the package name it must be re-resolved against at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub package_id: u32,
    pub package_name: String,
}

/// The dynamic package-id to package-name table of a package.
#[derive(Debug, Clone)]
pub struct LibraryChunk {
    meta: ChunkMeta,
    entries: Vec<LibraryEntry>,
}

impl LibraryChunk {
    pub fn new(entries: Vec<LibraryEntry>) -> Self {
        Self {
            meta: ChunkMeta::synthetic(LIBRARY_HEADER_SIZE),
            entries,
        }
    }

    pub(crate) fn parse(meta: ChunkMeta, cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let entry_count = cursor.read_u32::<LittleEndian>()?;
        cursor.set_position(meta.original_offset + meta.header_size as u64);
        let mut entries = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            let package_id = cursor.read_u32::<LittleEndian>()?;
            if package_id > 0xff {
                return Err(Error::PackageIdTooLarge(package_id));
            }
            let package_name = stream::read_utf16_fixed(cursor, PACKAGE_NAME_UNITS)?;
            entries.push(LibraryEntry {
                package_id,
                package_name,
            });
        }
        Ok(Self { meta, entries })
    }

    pub fn meta(&self) -> ChunkMeta {
        self.meta
    }

    pub fn entries(&self) -> &[LibraryEntry] {
        &self.entries
    }

    pub(crate) fn write_header(&self, out: &mut Cursor<Vec<u8>>) -> Result<()> {
        out.write_u32::<LittleEndian>(self.entries.len() as u32)?;
        Ok(())
    }

    pub(crate) fn write_payload(
        &self,
        out: &mut Cursor<Vec<u8>>,
        _header: &mut Vec<u8>,
        _options: SerializeOptions,
    ) -> Result<()> {
        for entry in &self.entries {
            out.write_u32::<LittleEndian>(entry.package_id)?;
            stream::write_utf16_fixed(out, &entry.package_name, PACKAGE_NAME_UNITS)?;
        }
        Ok(())
    }
}

/// All resources of one package: a type string pool, a key string pool, and
/// the type, type-spec and library chunks, kept in parse order.
#[derive(Debug, Clone)]
pub struct PackageChunk {
    meta: ChunkMeta,
    id: u32,
    package_name: String,
    last_public_type: u32,
    last_public_key: u32,
    type_id_offset: u32,
    children: Vec<Chunk>,
    type_pool_index: usize,
    key_pool_index: usize,
}

impl PackageChunk {
    pub fn new(
        id: u32,
        package_name: impl Into<String>,
        type_pool: StringPoolChunk,
        key_pool: StringPoolChunk,
    ) -> Self {
        Self {
            meta: ChunkMeta::synthetic(PACKAGE_HEADER_SIZE),
            id,
            package_name: package_name.into(),
            last_public_type: 0,
            last_public_key: 0,
            type_id_offset: 0,
            children: vec![Chunk::StringPool(type_pool), Chunk::StringPool(key_pool)],
            type_pool_index: 0,
            key_pool_index: 1,
        }
    }

    pub(crate) fn parse(meta: ChunkMeta, cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let base = meta.original_offset;
        let id = cursor.read_u32::<LittleEndian>()?;
        if id > 0xff {
            return Err(Error::PackageIdTooLarge(id));
        }
        let package_name = stream::read_utf16_fixed(cursor, PACKAGE_NAME_UNITS)?;
        let type_strings_offset = cursor.read_u32::<LittleEndian>()?;
        let last_public_type = cursor.read_u32::<LittleEndian>()?;
        let key_strings_offset = cursor.read_u32::<LittleEndian>()?;
        let last_public_key = cursor.read_u32::<LittleEndian>()?;
        let type_id_offset = cursor.read_u32::<LittleEndian>()?;

        cursor.set_position(base + meta.header_size as u64);
        let end = base + meta.original_chunk_size as u64;

        let mut children = Vec::new();
        let mut type_pool_index = None;
        let mut key_pool_index = None;
        let mut seen_library = false;
        while cursor.position() < end {
            let child_offset = cursor.position();
            let child = Chunk::parse(cursor)?;
            if child_offset == base + type_strings_offset as u64 {
                if !matches!(child, Chunk::StringPool(_)) {
                    return Err(Error::MissingStringPool("package type strings"));
                }
                type_pool_index = Some(children.len());
            }
            if child_offset == base + key_strings_offset as u64 {
                if !matches!(child, Chunk::StringPool(_)) {
                    return Err(Error::MissingStringPool("package key strings"));
                }
                key_pool_index = Some(children.len());
            }
            if matches!(child, Chunk::TableLibrary(_)) {
                if seen_library {
                    return Err(Error::DuplicateLibraryChunk);
                }
                seen_library = true;
            }
            children.push(child);
        }

        Ok(Self {
            meta,
            id,
            package_name,
            last_public_type,
            last_public_key,
            type_id_offset,
            children,
            type_pool_index: type_pool_index
                .ok_or(Error::MissingStringPool("package type strings"))?,
            key_pool_index: key_pool_index.ok_or(Error::MissingStringPool("package key strings"))?,
        })
    }

    pub fn meta(&self) -> ChunkMeta {
        self.meta
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.package_name
    }

    pub fn children(&self) -> &[Chunk] {
        &self.children
    }

    /// Append a type, type-spec or library child.
    pub fn add_chunk(&mut self, chunk: Chunk) {
        self.children.push(chunk);
    }

    pub fn type_string_pool(&self) -> &StringPoolChunk {
        match &self.children[self.type_pool_index] {
            Chunk::StringPool(pool) => pool,
            _ => unreachable!("package child {} is not a string pool", self.type_pool_index),
        }
    }

    pub fn type_string_pool_mut(&mut self) -> &mut StringPoolChunk {
        match &mut self.children[self.type_pool_index] {
            Chunk::StringPool(pool) => pool,
            _ => unreachable!("package child {} is not a string pool", self.type_pool_index),
        }
    }

    pub fn key_string_pool(&self) -> &StringPoolChunk {
        match &self.children[self.key_pool_index] {
            Chunk::StringPool(pool) => pool,
            _ => unreachable!("package child {} is not a string pool", self.key_pool_index),
        }
    }

    pub fn key_string_pool_mut(&mut self) -> &mut StringPoolChunk {
        match &mut self.children[self.key_pool_index] {
            Chunk::StringPool(pool) => pool,
            _ => unreachable!("package child {} is not a string pool", self.key_pool_index),
        }
    }

    pub fn type_chunks(&self) -> impl Iterator<Item = &TypeChunk> {
        self.children.iter().filter_map(|child| match child {
            Chunk::TableType(chunk) => Some(chunk),
            _ => None,
        })
    }

    pub fn type_chunks_mut(&mut self) -> impl Iterator<Item = &mut TypeChunk> {
        self.children.iter_mut().filter_map(|child| match child {
            Chunk::TableType(chunk) => Some(chunk),
            _ => None,
        })
    }

    pub fn type_spec_chunks(&self) -> impl Iterator<Item = &TypeSpecChunk> {
        self.children.iter().filter_map(|child| match child {
            Chunk::TableTypeSpec(chunk) => Some(chunk),
            _ => None,
        })
    }

    pub fn library_chunk(&self) -> Option<&LibraryChunk> {
        self.children.iter().find_map(|child| match child {
            Chunk::TableLibrary(chunk) => Some(chunk),
            _ => None,
        })
    }

    /// Delete the given key-pool strings and cascade the cleanup: entries
    /// whose key vanished are removed, type chunks whose entries all vanished
    /// are dropped, and a type spec whose last type chunk was dropped goes
    /// with it. Returns the number of type chunks deleted.
    pub fn delete_key_strings(&mut self, keys: &BTreeSet<u32>) -> usize {
        let remap = self.key_string_pool_mut().delete_strings(keys);

        let mut doomed_children: BTreeSet<usize> = BTreeSet::new();
        let mut deleted_ids: BTreeSet<u8> = BTreeSet::new();
        let mut remaining_ids: BTreeSet<u8> = BTreeSet::new();
        let mut deleted_chunks = 0usize;

        for (child_index, child) in self.children.iter_mut().enumerate() {
            if let Chunk::TableType(type_chunk) = child {
                let mut overrides: BTreeMap<u16, Option<Entry>> = BTreeMap::new();
                for (&index, entry) in type_chunk.entries() {
                    let mapped = remap
                        .get(entry.key_index() as usize)
                        .copied()
                        .unwrap_or(-1);
                    if mapped < 0 {
                        overrides.insert(index, None);
                    } else if mapped as u32 != entry.key_index() {
                        let mut updated = entry.clone();
                        updated.set_key_index(mapped as u32);
                        overrides.insert(index, Some(updated));
                    }
                }
                let had_entries = !type_chunk.entries().is_empty();
                type_chunk.override_entries(overrides);
                if had_entries && type_chunk.entries().is_empty() {
                    doomed_children.insert(child_index);
                    deleted_ids.insert(type_chunk.id());
                    deleted_chunks += 1;
                } else {
                    remaining_ids.insert(type_chunk.id());
                }
            }
        }

        for (child_index, child) in self.children.iter().enumerate() {
            if let Chunk::TableTypeSpec(spec) = child {
                if deleted_ids.contains(&spec.id()) && !remaining_ids.contains(&spec.id()) {
                    doomed_children.insert(child_index);
                }
            }
        }

        if !doomed_children.is_empty() {
            let type_pool_index = self.type_pool_index;
            let key_pool_index = self.key_pool_index;
            let old_children = std::mem::take(&mut self.children);
            for (index, child) in old_children.into_iter().enumerate() {
                if doomed_children.contains(&index) {
                    continue;
                }
                if index == type_pool_index {
                    self.type_pool_index = self.children.len();
                }
                if index == key_pool_index {
                    self.key_pool_index = self.children.len();
                }
                self.children.push(child);
            }
        }

        deleted_chunks
    }

    /// Rewrite every entry value that points into the global string pool
    /// through `remap`, deleting simple entries whose string is gone.
    fn remap_global_strings(&mut self, remap: &[i32]) -> Result<()> {
        for type_chunk in self.type_chunks_mut() {
            let mut overrides: BTreeMap<u16, Option<Entry>> = BTreeMap::new();
            for (&index, entry) in type_chunk.entries() {
                match entry.value() {
                    EntryValue::Simple(value) => {
                        if value.value_type != ValueType::String {
                            continue;
                        }
                        let mapped = remap.get(value.data as usize).copied().unwrap_or(-1);
                        if mapped < 0 {
                            overrides.insert(index, None);
                        } else if mapped as u32 != value.data {
                            let mut updated = entry.clone();
                            if let EntryValue::Simple(value) = updated.value_mut() {
                                value.data = mapped as u32;
                            }
                            overrides.insert(index, Some(updated));
                        }
                    }
                    EntryValue::Complex { .. } => {
                        // the entry survives even if it carries no values: it
                        // may still override a parent or supply a different
                        // parent_entry
                        let mut updated = entry.clone();
                        let mut changed = false;
                        if let EntryValue::Complex { values, .. } = updated.value_mut() {
                            for value in values.values_mut() {
                                if value.value_type != ValueType::String {
                                    continue;
                                }
                                let mapped =
                                    remap.get(value.data as usize).copied().unwrap_or(-1);
                                if mapped < 0 {
                                    return Err(Error::DanglingStringRef(value.data));
                                }
                                if mapped as u32 != value.data {
                                    value.data = mapped as u32;
                                    changed = true;
                                }
                            }
                        }
                        if changed {
                            overrides.insert(index, Some(updated));
                        }
                    }
                }
            }
            type_chunk.override_entries(overrides);
        }
        Ok(())
    }

    pub(crate) fn write_header(&self, out: &mut Cursor<Vec<u8>>) -> Result<()> {
        out.write_u32::<LittleEndian>(self.id)?;
        stream::write_utf16_fixed(out, &self.package_name, PACKAGE_NAME_UNITS)?;
        // type and key string pool offsets are patched during payload writing
        out.write_u32::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(self.last_public_type)?;
        out.write_u32::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(self.last_public_key)?;
        out.write_u32::<LittleEndian>(self.type_id_offset)?;
        Ok(())
    }

    pub(crate) fn write_payload(
        &self,
        out: &mut Cursor<Vec<u8>>,
        header: &mut Vec<u8>,
        options: SerializeOptions,
    ) -> Result<()> {
        for (index, child) in self.children.iter().enumerate() {
            let position = self.meta.header_size as u32 + out.position() as u32;
            if index == self.type_pool_index {
                LittleEndian::write_u32(
                    &mut header[TYPE_STRINGS_OFFSET_SLOT..TYPE_STRINGS_OFFSET_SLOT + 4],
                    position,
                );
            }
            if index == self.key_pool_index {
                LittleEndian::write_u32(
                    &mut header[KEY_STRINGS_OFFSET_SLOT..KEY_STRINGS_OFFSET_SLOT + 4],
                    position,
                );
            }
            out.write_all(&child.to_bytes(options)?)?;
        }
        Ok(())
    }
}

/// The top-level resource table: the global value string pool plus one or
/// more packages. Stray pools and unknown chunks are kept as children.
#[derive(Debug, Clone)]
pub struct ResourceTableChunk {
    meta: ChunkMeta,
    children: Vec<Chunk>,
}

impl ResourceTableChunk {
    pub fn new(string_pool: StringPoolChunk) -> Self {
        Self {
            meta: ChunkMeta::synthetic(TABLE_HEADER_SIZE),
            children: vec![Chunk::StringPool(string_pool)],
        }
    }

    pub(crate) fn parse(meta: ChunkMeta, cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let _package_count = cursor.read_u32::<LittleEndian>()?;
        cursor.set_position(meta.original_offset + meta.header_size as u64);
        let end = meta.original_offset + meta.original_chunk_size as u64;
        let children = parse_children(cursor, end)?;
        if !children
            .iter()
            .any(|child| matches!(child, Chunk::StringPool(_)))
        {
            return Err(Error::MissingStringPool("resource table"));
        }
        Ok(Self { meta, children })
    }

    pub fn meta(&self) -> ChunkMeta {
        self.meta
    }

    pub fn children(&self) -> &[Chunk] {
        &self.children
    }

    /// The global value string pool: the first pool child.
    pub fn string_pool(&self) -> &StringPoolChunk {
        self.children
            .iter()
            .find_map(|child| match child {
                Chunk::StringPool(pool) => Some(pool),
                _ => None,
            })
            .unwrap_or_else(|| unreachable!("resource table lost its string pool"))
    }

    pub fn string_pool_mut(&mut self) -> &mut StringPoolChunk {
        self.children
            .iter_mut()
            .find_map(|child| match child {
                Chunk::StringPool(pool) => Some(pool),
                _ => None,
            })
            .unwrap_or_else(|| unreachable!("resource table lost its string pool"))
    }

    pub fn packages(&self) -> impl Iterator<Item = &PackageChunk> {
        self.children.iter().filter_map(|child| match child {
            Chunk::TablePackage(package) => Some(package),
            _ => None,
        })
    }

    pub fn packages_mut(&mut self) -> impl Iterator<Item = &mut PackageChunk> {
        self.children.iter_mut().filter_map(|child| match child {
            Chunk::TablePackage(package) => Some(package),
            _ => None,
        })
    }

    pub fn add_package_chunk(&mut self, package: PackageChunk) {
        self.children.push(Chunk::TablePackage(package));
    }

    /// Delete the given global-pool strings and rewrite every entry value
    /// that referenced them. A simple entry whose string vanished is deleted;
    /// a complex sub-value must survive the remap or the call fails.
    pub fn delete_strings(&mut self, indices: &BTreeSet<u32>) -> Result<()> {
        let remap = self.string_pool_mut().delete_strings(indices);
        for package in self.packages_mut() {
            package.remap_global_strings(&remap)?;
        }
        Ok(())
    }

    pub(crate) fn write_header(&self, out: &mut Cursor<Vec<u8>>) -> Result<()> {
        out.write_u32::<LittleEndian>(self.packages().count() as u32)?;
        Ok(())
    }

    pub(crate) fn write_payload(
        &self,
        out: &mut Cursor<Vec<u8>>,
        _header: &mut Vec<u8>,
        options: SerializeOptions,
    ) -> Result<()> {
        for child in &self.children {
            out.write_all(&child.to_bytes(options)?)?;
        }
        Ok(())
    }
}
