/*
    Copyright (C) 2025 the resarc developers

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU General Public License as published by
    the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU General Public License for more details.

    You should have received a copy of the GNU General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

// Chunk layouts follow
// https://android.googlesource.com/platform/frameworks/base/+/master/libs/androidfw/include/androidfw/ResourceTypes.h

use std::io::{Cursor, Read, Write};
use std::ops::BitOr;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, trace};

use crate::error::{Error, Result};
use crate::stream;
use crate::string_pool::StringPoolChunk;
use crate::table::{LibraryChunk, PackageChunk, ResourceTableChunk, TypeChunk, TypeSpecChunk};
use crate::xml::{
    XmlCdataChunk, XmlChunk, XmlEndElementChunk, XmlNamespaceChunk, XmlResourceMapChunk,
    XmlStartElementChunk,
};

/// Size of the framing every chunk starts with: type, header size, chunk size.
pub const METADATA_SIZE: u16 = 8;

/// Chunks are padded with zero bytes to this boundary.
pub const PAD_BOUNDARY: usize = 4;

/// Type identifier for a chunk. The meaning of a chunk's payload depends on
/// this value; codes the dispatcher has no model for become [`UnknownChunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkType {
    Null,
    StringPool,
    Table,
    Xml,
    XmlStartNamespace,
    XmlEndNamespace,
    XmlStartElement,
    XmlEndElement,
    XmlCdata,
    XmlResourceMap,
    TablePackage,
    TableType,
    TableTypeSpec,
    TableLibrary,
    TableOverlayable,
    TableOverlayablePolicy,
}

impl ChunkType {
    pub fn code(self) -> u16 {
        match self {
            ChunkType::Null => 0x0000,
            ChunkType::StringPool => 0x0001,
            ChunkType::Table => 0x0002,
            ChunkType::Xml => 0x0003,
            ChunkType::XmlStartNamespace => 0x0100,
            ChunkType::XmlEndNamespace => 0x0101,
            ChunkType::XmlStartElement => 0x0102,
            ChunkType::XmlEndElement => 0x0103,
            ChunkType::XmlCdata => 0x0104,
            ChunkType::XmlResourceMap => 0x0180,
            ChunkType::TablePackage => 0x0200,
            ChunkType::TableType => 0x0201,
            ChunkType::TableTypeSpec => 0x0202,
            ChunkType::TableLibrary => 0x0203,
            ChunkType::TableOverlayable => 0x0204,
            ChunkType::TableOverlayablePolicy => 0x0205,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0x0000 => ChunkType::Null,
            0x0001 => ChunkType::StringPool,
            0x0002 => ChunkType::Table,
            0x0003 => ChunkType::Xml,
            0x0100 => ChunkType::XmlStartNamespace,
            0x0101 => ChunkType::XmlEndNamespace,
            0x0102 => ChunkType::XmlStartElement,
            0x0103 => ChunkType::XmlEndElement,
            0x0104 => ChunkType::XmlCdata,
            0x0180 => ChunkType::XmlResourceMap,
            0x0200 => ChunkType::TablePackage,
            0x0201 => ChunkType::TableType,
            0x0202 => ChunkType::TableTypeSpec,
            0x0203 => ChunkType::TableLibrary,
            0x0204 => ChunkType::TableOverlayable,
            0x0205 => ChunkType::TableOverlayablePolicy,
            _ => return None,
        })
    }
}

impl TryFrom<u16> for ChunkType {
    type Error = Error;

    fn try_from(code: u16) -> Result<Self> {
        ChunkType::from_code(code).ok_or(Error::UnknownChunkType(code))
    }
}

/// Framing captured when a chunk is parsed.
///
/// `header_size` is authoritative and preserved on write. The other two
/// fields are parse-time metadata only: the emitted size of a chunk is always
/// recomputed from its payload, and `original_offset` is meaningless once the
/// tree has been serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkMeta {
    pub header_size: u16,
    pub original_chunk_size: u32,
    pub original_offset: u64,
}

impl ChunkMeta {
    /// Metadata for a chunk built in memory rather than parsed.
    pub fn synthetic(header_size: u16) -> Self {
        Self {
            header_size,
            original_chunk_size: 0,
            original_offset: 0,
        }
    }
}

/// Bitmask of transformations applied while serializing a chunk tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerializeOptions(u32);

impl SerializeOptions {
    /// Byte-faithful output.
    pub const NONE: Self = Self(0);
    /// Deduplicate identical strings and styles in every string pool.
    pub const SHRINK: Self = Self(1);
    /// Strip the public flag from entries and type-spec masks.
    pub const PRIVATE_RESOURCES: Self = Self(2);

    pub fn shrink(self) -> bool {
        self.0 & Self::SHRINK.0 != 0
    }

    pub fn private_resources(self) -> bool {
        self.0 & Self::PRIVATE_RESOURCES.0 != 0
    }
}

impl BitOr for SerializeOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One node of the chunk tree. The set of variants is closed by the file
/// format; anything else round-trips as [`UnknownChunk`].
#[derive(Debug, Clone)]
pub enum Chunk {
    StringPool(StringPoolChunk),
    Table(ResourceTableChunk),
    Xml(XmlChunk),
    XmlStartNamespace(XmlNamespaceChunk),
    XmlEndNamespace(XmlNamespaceChunk),
    XmlStartElement(XmlStartElementChunk),
    XmlEndElement(XmlEndElementChunk),
    XmlCdata(XmlCdataChunk),
    XmlResourceMap(XmlResourceMapChunk),
    TablePackage(PackageChunk),
    TableType(TypeChunk),
    TableTypeSpec(TypeSpecChunk),
    TableLibrary(LibraryChunk),
    Unknown(UnknownChunk),
}

impl Chunk {
    /// Read one chunk starting at the cursor position. On return the cursor
    /// sits at the start of the next chunk regardless of how much of the
    /// payload the concrete parser consumed.
    pub fn parse(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let offset = cursor.position();
        let code = cursor.read_u16::<LittleEndian>()?;
        let header_size = cursor.read_u16::<LittleEndian>()?;
        let chunk_size = cursor.read_u32::<LittleEndian>()?;
        trace!("chunk 0x{code:04x} at {offset}: header {header_size}, size {chunk_size}");

        if header_size < METADATA_SIZE {
            return Err(Error::HeaderSizeMismatch {
                declared: header_size,
                written: METADATA_SIZE as usize,
            });
        }
        if chunk_size < header_size as u32 {
            return Err(Error::HeaderSizeMismatch {
                declared: header_size,
                written: chunk_size as usize,
            });
        }

        let meta = ChunkMeta {
            header_size,
            original_chunk_size: chunk_size,
            original_offset: offset,
        };

        let chunk = match ChunkType::from_code(code) {
            Some(ChunkType::StringPool) => Chunk::StringPool(StringPoolChunk::parse(meta, cursor)?),
            Some(ChunkType::Table) => Chunk::Table(ResourceTableChunk::parse(meta, cursor)?),
            Some(ChunkType::Xml) => Chunk::Xml(XmlChunk::parse(meta, cursor)?),
            Some(ChunkType::XmlStartNamespace) => {
                Chunk::XmlStartNamespace(XmlNamespaceChunk::parse(meta, cursor)?)
            }
            Some(ChunkType::XmlEndNamespace) => {
                Chunk::XmlEndNamespace(XmlNamespaceChunk::parse(meta, cursor)?)
            }
            Some(ChunkType::XmlStartElement) => {
                Chunk::XmlStartElement(XmlStartElementChunk::parse(meta, cursor)?)
            }
            Some(ChunkType::XmlEndElement) => {
                Chunk::XmlEndElement(XmlEndElementChunk::parse(meta, cursor)?)
            }
            Some(ChunkType::XmlCdata) => Chunk::XmlCdata(XmlCdataChunk::parse(meta, cursor)?),
            Some(ChunkType::XmlResourceMap) => {
                Chunk::XmlResourceMap(XmlResourceMapChunk::parse(meta, cursor)?)
            }
            Some(ChunkType::TablePackage) => {
                Chunk::TablePackage(PackageChunk::parse(meta, cursor)?)
            }
            Some(ChunkType::TableType) => Chunk::TableType(TypeChunk::parse(meta, cursor)?),
            Some(ChunkType::TableTypeSpec) => {
                Chunk::TableTypeSpec(TypeSpecChunk::parse(meta, cursor)?)
            }
            Some(ChunkType::TableLibrary) => {
                Chunk::TableLibrary(LibraryChunk::parse(meta, cursor)?)
            }
            _ => Chunk::Unknown(UnknownChunk::parse(code, meta, cursor)?),
        };

        cursor.set_position(offset + chunk_size as u64);
        Ok(chunk)
    }

    /// The raw 16-bit type code, also available for unknown chunks.
    pub fn type_code(&self) -> u16 {
        match self {
            Chunk::StringPool(_) => ChunkType::StringPool.code(),
            Chunk::Table(_) => ChunkType::Table.code(),
            Chunk::Xml(_) => ChunkType::Xml.code(),
            Chunk::XmlStartNamespace(_) => ChunkType::XmlStartNamespace.code(),
            Chunk::XmlEndNamespace(_) => ChunkType::XmlEndNamespace.code(),
            Chunk::XmlStartElement(_) => ChunkType::XmlStartElement.code(),
            Chunk::XmlEndElement(_) => ChunkType::XmlEndElement.code(),
            Chunk::XmlCdata(_) => ChunkType::XmlCdata.code(),
            Chunk::XmlResourceMap(_) => ChunkType::XmlResourceMap.code(),
            Chunk::TablePackage(_) => ChunkType::TablePackage.code(),
            Chunk::TableType(_) => ChunkType::TableType.code(),
            Chunk::TableTypeSpec(_) => ChunkType::TableTypeSpec.code(),
            Chunk::TableLibrary(_) => ChunkType::TableLibrary.code(),
            Chunk::Unknown(unknown) => unknown.type_code(),
        }
    }

    pub fn chunk_type(&self) -> Option<ChunkType> {
        ChunkType::from_code(self.type_code())
    }

    pub fn meta(&self) -> ChunkMeta {
        match self {
            Chunk::StringPool(c) => c.meta(),
            Chunk::Table(c) => c.meta(),
            Chunk::Xml(c) => c.meta(),
            Chunk::XmlStartNamespace(c) => c.meta(),
            Chunk::XmlEndNamespace(c) => c.meta(),
            Chunk::XmlStartElement(c) => c.meta(),
            Chunk::XmlEndElement(c) => c.meta(),
            Chunk::XmlCdata(c) => c.meta(),
            Chunk::XmlResourceMap(c) => c.meta(),
            Chunk::TablePackage(c) => c.meta(),
            Chunk::TableType(c) => c.meta(),
            Chunk::TableTypeSpec(c) => c.meta(),
            Chunk::TableLibrary(c) => c.meta(),
            Chunk::Unknown(c) => c.meta(),
        }
    }

    pub fn header_size(&self) -> u16 {
        self.meta().header_size
    }

    fn write_header(&self, out: &mut Cursor<Vec<u8>>) -> Result<()> {
        match self {
            Chunk::StringPool(c) => c.write_header(out),
            Chunk::Table(c) => c.write_header(out),
            Chunk::Xml(c) => c.write_header(out),
            Chunk::XmlStartNamespace(c) => c.write_header(out),
            Chunk::XmlEndNamespace(c) => c.write_header(out),
            Chunk::XmlStartElement(c) => c.write_header(out),
            Chunk::XmlEndElement(c) => c.write_header(out),
            Chunk::XmlCdata(c) => c.write_header(out),
            Chunk::XmlResourceMap(c) => c.write_header(out),
            Chunk::TablePackage(c) => c.write_header(out),
            Chunk::TableType(c) => c.write_header(out),
            Chunk::TableTypeSpec(c) => c.write_header(out),
            Chunk::TableLibrary(c) => c.write_header(out),
            Chunk::Unknown(c) => c.write_header(out),
        }
    }

    fn write_payload(
        &self,
        out: &mut Cursor<Vec<u8>>,
        header: &mut Vec<u8>,
        options: SerializeOptions,
    ) -> Result<()> {
        match self {
            Chunk::StringPool(c) => c.write_payload(out, header, options),
            Chunk::Table(c) => c.write_payload(out, header, options),
            Chunk::Xml(c) => c.write_payload(out, header, options),
            Chunk::XmlStartNamespace(c) => c.write_payload(out, header, options),
            Chunk::XmlEndNamespace(c) => c.write_payload(out, header, options),
            Chunk::XmlStartElement(c) => c.write_payload(out, header, options),
            Chunk::XmlEndElement(c) => c.write_payload(out, header, options),
            Chunk::XmlCdata(c) => c.write_payload(out, header, options),
            Chunk::XmlResourceMap(c) => c.write_payload(out, header, options),
            Chunk::TablePackage(c) => c.write_payload(out, header, options),
            Chunk::TableType(c) => c.write_payload(out, header, options),
            Chunk::TableTypeSpec(c) => c.write_payload(out, header, options),
            Chunk::TableLibrary(c) => c.write_payload(out, header, options),
            Chunk::Unknown(c) => c.write_payload(out, header, options),
        }
    }

    /// Serialize the chunk. The header is written into a scratch buffer with
    /// a placeholder chunk size, the payload is produced (patching any header
    /// slots whose value it determines), the payload is padded to the chunk
    /// boundary, and finally the real chunk size is patched in at offset 4.
    pub fn to_bytes(&self, options: SerializeOptions) -> Result<Vec<u8>> {
        let header_size = self.header_size();

        let mut header_out = Cursor::new(Vec::with_capacity(header_size as usize));
        header_out.write_u16::<LittleEndian>(self.type_code())?;
        header_out.write_u16::<LittleEndian>(header_size)?;
        header_out.write_u32::<LittleEndian>(0)?;
        self.write_header(&mut header_out)?;

        let mut header = header_out.into_inner();
        if header.len() != header_size as usize {
            return Err(Error::HeaderSizeMismatch {
                declared: header_size,
                written: header.len(),
            });
        }

        let mut payload_out = Cursor::new(Vec::new());
        self.write_payload(&mut payload_out, &mut header, options)?;
        stream::pad4(&mut payload_out)?;
        let payload = payload_out.into_inner();

        let chunk_size = (header.len() + payload.len()) as u32;
        LittleEndian::write_u32(&mut header[4..8], chunk_size);

        header.extend_from_slice(&payload);
        Ok(header)
    }
}

/// Parse consecutive child chunks until `end` is reached.
pub(crate) fn parse_children(cursor: &mut Cursor<&[u8]>, end: u64) -> Result<Vec<Chunk>> {
    let mut children = Vec::new();
    while cursor.position() < end {
        children.push(Chunk::parse(cursor)?);
    }
    Ok(children)
}

/// A chunk whose type the dispatcher has no structured model for. The header
/// body and payload are preserved byte-for-byte.
#[derive(Debug, Clone)]
pub struct UnknownChunk {
    meta: ChunkMeta,
    code: u16,
    header_body: Vec<u8>,
    payload: Vec<u8>,
}

impl UnknownChunk {
    pub(crate) fn parse(code: u16, meta: ChunkMeta, cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let mut header_body = vec![0u8; meta.header_size as usize - METADATA_SIZE as usize];
        cursor.read_exact(&mut header_body)?;
        let mut payload =
            vec![0u8; (meta.original_chunk_size - meta.header_size as u32) as usize];
        cursor.read_exact(&mut payload)?;
        Ok(Self {
            meta,
            code,
            header_body,
            payload,
        })
    }

    pub fn meta(&self) -> ChunkMeta {
        self.meta
    }

    pub fn type_code(&self) -> u16 {
        self.code
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub(crate) fn write_header(&self, out: &mut Cursor<Vec<u8>>) -> Result<()> {
        out.write_all(&self.header_body)?;
        Ok(())
    }

    pub(crate) fn write_payload(
        &self,
        out: &mut Cursor<Vec<u8>>,
        _header: &mut Vec<u8>,
        _options: SerializeOptions,
    ) -> Result<()> {
        out.write_all(&self.payload)?;
        Ok(())
    }
}

/// A whole file: a sequence of top-level chunks covering the buffer exactly.
///
/// Nothing is borrowed from the input once `parse` returns; the buffer can be
/// dropped immediately afterwards.
#[derive(Debug, Clone, Default)]
pub struct ResourceFile {
    chunks: Vec<Chunk>,
}

impl ResourceFile {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let mut chunks = Vec::new();
        while (cursor.position() as usize) < data.len() {
            chunks.push(Chunk::parse(&mut cursor)?);
        }
        debug!("parsed {} top-level chunks", chunks.len());
        Ok(Self { chunks })
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunks_mut(&mut self) -> &mut Vec<Chunk> {
        &mut self.chunks
    }

    pub fn to_bytes(&self, options: SerializeOptions) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for chunk in &self.chunks {
            out.extend_from_slice(&chunk.to_bytes(options)?);
        }
        Ok(out)
    }
}
