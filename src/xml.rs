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

use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use binrw::{binrw, BinRead, BinWrite};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::chunk::{parse_children, Chunk, ChunkMeta, SerializeOptions, METADATA_SIZE};
use crate::error::{Error, Result};
use crate::res_value::{ResourceId, ResourceValue, ValueType};
use crate::string_pool::StringPoolChunk;

/// On-wire size of an [`XmlAttribute`], in bytes.
pub const ATTRIBUTE_SIZE: u16 = 20;

const NODE_HEADER_SIZE: u16 = METADATA_SIZE + 8;
const XML_HEADER_SIZE: u16 = METADATA_SIZE;

/// The header every XML node chunk carries: the source line the node came
/// from and an optional comment string.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XmlNodeHeader {
    /// Line number in the original source file this node appeared at.
    pub line_number: u32,
    /// Pool index of the comment attached to the node; -1 if none.
    pub comment_index: i32,
}

impl XmlNodeHeader {
    pub fn new(line_number: u32) -> Self {
        Self {
            line_number,
            comment_index: -1,
        }
    }
}

/// One attribute of a start-element node. String indices resolve against the
/// document's string pool; `raw_value_index` is -1 when the attribute only
/// has a typed value.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XmlAttribute {
    pub namespace_index: i32,
    pub name_index: u32,
    pub raw_value_index: i32,
    pub typed_value: ResourceValue,
}

/// A compiled XML document: a string pool, an optional resource map, and the
/// namespace/element/CDATA node chunks in document order.
#[derive(Debug, Clone)]
pub struct XmlChunk {
    meta: ChunkMeta,
    children: Vec<Chunk>,
}

impl XmlChunk {
    pub fn new(children: Vec<Chunk>) -> Self {
        Self {
            meta: ChunkMeta::synthetic(XML_HEADER_SIZE),
            children,
        }
    }

    pub(crate) fn parse(meta: ChunkMeta, cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        cursor.set_position(meta.original_offset + meta.header_size as u64);
        let end = meta.original_offset + meta.original_chunk_size as u64;
        let children = parse_children(cursor, end)?;
        Ok(Self { meta, children })
    }

    pub fn meta(&self) -> ChunkMeta {
        self.meta
    }

    pub fn children(&self) -> &[Chunk] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<Chunk> {
        &mut self.children
    }

    /// The document's string pool, against which every node's indices
    /// resolve.
    pub fn string_pool(&self) -> Option<&StringPoolChunk> {
        self.children.iter().find_map(|child| match child {
            Chunk::StringPool(pool) => Some(pool),
            _ => None,
        })
    }

    pub fn resource_map(&self) -> Option<&XmlResourceMapChunk> {
        self.children.iter().find_map(|child| match child {
            Chunk::XmlResourceMap(map) => Some(map),
            _ => None,
        })
    }

    pub(crate) fn write_header(&self, _out: &mut Cursor<Vec<u8>>) -> Result<()> {
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

/// A namespace start or end node; which of the two it is comes from the
/// enclosing [`Chunk`] variant.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlNamespaceChunk {
    meta: ChunkMeta,
    pub node: XmlNodeHeader,
    pub prefix_index: u32,
    pub uri_index: u32,
}

impl XmlNamespaceChunk {
    pub fn new(line_number: u32, prefix_index: u32, uri_index: u32) -> Self {
        Self {
            meta: ChunkMeta::synthetic(NODE_HEADER_SIZE),
            node: XmlNodeHeader::new(line_number),
            prefix_index,
            uri_index,
        }
    }

    pub(crate) fn parse(meta: ChunkMeta, cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let node = XmlNodeHeader::read_le(cursor)?;
        cursor.set_position(meta.original_offset + meta.header_size as u64);
        let prefix_index = cursor.read_u32::<LittleEndian>()?;
        let uri_index = cursor.read_u32::<LittleEndian>()?;
        Ok(Self {
            meta,
            node,
            prefix_index,
            uri_index,
        })
    }

    pub fn meta(&self) -> ChunkMeta {
        self.meta
    }

    pub(crate) fn write_header(&self, out: &mut Cursor<Vec<u8>>) -> Result<()> {
        self.node.write_le(out)?;
        Ok(())
    }

    pub(crate) fn write_payload(
        &self,
        out: &mut Cursor<Vec<u8>>,
        _header: &mut Vec<u8>,
        _options: SerializeOptions,
    ) -> Result<()> {
        out.write_u32::<LittleEndian>(self.prefix_index)?;
        out.write_u32::<LittleEndian>(self.uri_index)?;
        Ok(())
    }
}

/// An element start node with its attributes.
///
/// The id/class/style indices are 1-based on the wire with 0 meaning absent;
/// in memory they are 0-based with -1 meaning absent.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlStartElementChunk {
    meta: ChunkMeta,
    pub node: XmlNodeHeader,
    pub namespace_index: i32,
    pub name_index: u32,
    pub id_index: i32,
    pub class_index: i32,
    pub style_index: i32,
    attributes: Vec<XmlAttribute>,
}

impl XmlStartElementChunk {
    pub fn new(
        line_number: u32,
        namespace_index: i32,
        name_index: u32,
        attributes: Vec<XmlAttribute>,
    ) -> Self {
        Self {
            meta: ChunkMeta::synthetic(NODE_HEADER_SIZE),
            node: XmlNodeHeader::new(line_number),
            namespace_index,
            name_index,
            id_index: -1,
            class_index: -1,
            style_index: -1,
            attributes,
        }
    }

    pub(crate) fn parse(meta: ChunkMeta, cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let node = XmlNodeHeader::read_le(cursor)?;

        let ext_base = meta.original_offset + meta.header_size as u64;
        cursor.set_position(ext_base);
        let namespace_index = cursor.read_i32::<LittleEndian>()?;
        let name_index = cursor.read_u32::<LittleEndian>()?;
        let attribute_start = cursor.read_u16::<LittleEndian>()?;
        let attribute_size = cursor.read_u16::<LittleEndian>()?;
        if attribute_size != ATTRIBUTE_SIZE {
            return Err(Error::InvalidReserved {
                field: "attribute size",
                value: attribute_size as u32,
            });
        }
        let attribute_count = cursor.read_u16::<LittleEndian>()?;
        let id_index = cursor.read_u16::<LittleEndian>()? as i32 - 1;
        let class_index = cursor.read_u16::<LittleEndian>()? as i32 - 1;
        let style_index = cursor.read_u16::<LittleEndian>()? as i32 - 1;

        cursor.set_position(ext_base + attribute_start as u64);
        let mut attributes = Vec::with_capacity(attribute_count as usize);
        for _ in 0..attribute_count {
            attributes.push(XmlAttribute::read_le(cursor)?);
        }

        Ok(Self {
            meta,
            node,
            namespace_index,
            name_index,
            id_index,
            class_index,
            style_index,
            attributes,
        })
    }

    pub fn meta(&self) -> ChunkMeta {
        self.meta
    }

    pub fn attributes(&self) -> &[XmlAttribute] {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Vec<XmlAttribute> {
        &mut self.attributes
    }

    /// Rewrite attribute values of type `Reference` through `remap`.
    /// References into the system package (top byte 0x01) are never touched.
    pub fn remap_references(&mut self, remap: &BTreeMap<u32, u32>) {
        for attribute in &mut self.attributes {
            if attribute.typed_value.value_type != ValueType::Reference {
                continue;
            }
            let data = attribute.typed_value.data;
            if data >> 24 == 0x01 {
                continue;
            }
            if let Some(&replacement) = remap.get(&data) {
                attribute.typed_value.data = replacement;
            }
        }
    }

    pub(crate) fn write_header(&self, out: &mut Cursor<Vec<u8>>) -> Result<()> {
        self.node.write_le(out)?;
        Ok(())
    }

    pub(crate) fn write_payload(
        &self,
        out: &mut Cursor<Vec<u8>>,
        _header: &mut Vec<u8>,
        _options: SerializeOptions,
    ) -> Result<()> {
        out.write_i32::<LittleEndian>(self.namespace_index)?;
        out.write_u32::<LittleEndian>(self.name_index)?;
        out.write_u16::<LittleEndian>(ATTRIBUTE_SIZE)?; // attribute_start
        out.write_u16::<LittleEndian>(ATTRIBUTE_SIZE)?;
        out.write_u16::<LittleEndian>(self.attributes.len() as u16)?;
        out.write_u16::<LittleEndian>((self.id_index + 1) as u16)?;
        out.write_u16::<LittleEndian>((self.class_index + 1) as u16)?;
        out.write_u16::<LittleEndian>((self.style_index + 1) as u16)?;
        for attribute in &self.attributes {
            attribute.write_le(out)?;
        }
        Ok(())
    }
}

/// An element end node.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlEndElementChunk {
    meta: ChunkMeta,
    pub node: XmlNodeHeader,
    pub namespace_index: i32,
    pub name_index: u32,
}

impl XmlEndElementChunk {
    pub fn new(line_number: u32, namespace_index: i32, name_index: u32) -> Self {
        Self {
            meta: ChunkMeta::synthetic(NODE_HEADER_SIZE),
            node: XmlNodeHeader::new(line_number),
            namespace_index,
            name_index,
        }
    }

    pub(crate) fn parse(meta: ChunkMeta, cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let node = XmlNodeHeader::read_le(cursor)?;
        cursor.set_position(meta.original_offset + meta.header_size as u64);
        let namespace_index = cursor.read_i32::<LittleEndian>()?;
        let name_index = cursor.read_u32::<LittleEndian>()?;
        Ok(Self {
            meta,
            node,
            namespace_index,
            name_index,
        })
    }

    pub fn meta(&self) -> ChunkMeta {
        self.meta
    }

    pub(crate) fn write_header(&self, out: &mut Cursor<Vec<u8>>) -> Result<()> {
        self.node.write_le(out)?;
        Ok(())
    }

    pub(crate) fn write_payload(
        &self,
        out: &mut Cursor<Vec<u8>>,
        _header: &mut Vec<u8>,
        _options: SerializeOptions,
    ) -> Result<()> {
        out.write_i32::<LittleEndian>(self.namespace_index)?;
        out.write_u32::<LittleEndian>(self.name_index)?;
        Ok(())
    }
}

/// A CDATA node: the raw character data plus its typed interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlCdataChunk {
    meta: ChunkMeta,
    pub node: XmlNodeHeader,
    pub raw_value_index: u32,
    pub typed_value: ResourceValue,
}

impl XmlCdataChunk {
    pub fn new(line_number: u32, raw_value_index: u32, typed_value: ResourceValue) -> Self {
        Self {
            meta: ChunkMeta::synthetic(NODE_HEADER_SIZE),
            node: XmlNodeHeader::new(line_number),
            raw_value_index,
            typed_value,
        }
    }

    pub(crate) fn parse(meta: ChunkMeta, cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let node = XmlNodeHeader::read_le(cursor)?;
        cursor.set_position(meta.original_offset + meta.header_size as u64);
        let raw_value_index = cursor.read_u32::<LittleEndian>()?;
        let typed_value = ResourceValue::read_le(cursor)?;
        Ok(Self {
            meta,
            node,
            raw_value_index,
            typed_value,
        })
    }

    pub fn meta(&self) -> ChunkMeta {
        self.meta
    }

    pub(crate) fn write_header(&self, out: &mut Cursor<Vec<u8>>) -> Result<()> {
        self.node.write_le(out)?;
        Ok(())
    }

    pub(crate) fn write_payload(
        &self,
        out: &mut Cursor<Vec<u8>>,
        _header: &mut Vec<u8>,
        _options: SerializeOptions,
    ) -> Result<()> {
        out.write_u32::<LittleEndian>(self.raw_value_index)?;
        self.typed_value.write_le(out)?;
        Ok(())
    }
}

/// Maps string pool indices of attribute names back to resource identifiers,
/// one slot per pooled attribute name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlResourceMapChunk {
    meta: ChunkMeta,
    resources: Vec<u32>,
}

impl XmlResourceMapChunk {
    pub fn new(resources: Vec<u32>) -> Self {
        Self {
            meta: ChunkMeta::synthetic(METADATA_SIZE),
            resources,
        }
    }

    pub(crate) fn parse(meta: ChunkMeta, cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        cursor.set_position(meta.original_offset + meta.header_size as u64);
        let count = (meta.original_chunk_size - meta.header_size as u32) / 4;
        let mut resources = Vec::with_capacity(count as usize);
        for _ in 0..count {
            resources.push(cursor.read_u32::<LittleEndian>()?);
        }
        Ok(Self { meta, resources })
    }

    pub fn meta(&self) -> ChunkMeta {
        self.meta
    }

    pub fn resources(&self) -> &[u32] {
        &self.resources
    }

    /// The resource identifier for a string pool index, if the map covers it.
    pub fn resource(&self, index: usize) -> Option<ResourceId> {
        self.resources.get(index).map(|&id| ResourceId(id))
    }

    pub(crate) fn write_header(&self, _out: &mut Cursor<Vec<u8>>) -> Result<()> {
        Ok(())
    }

    pub(crate) fn write_payload(
        &self,
        out: &mut Cursor<Vec<u8>>,
        _header: &mut Vec<u8>,
        _options: SerializeOptions,
    ) -> Result<()> {
        for &resource in &self.resources {
            out.write_u32::<LittleEndian>(resource)?;
        }
        Ok(())
    }
}
