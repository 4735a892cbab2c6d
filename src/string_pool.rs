use std::collections::{BTreeSet, HashMap};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use binrw::{binrw, BinRead, BinWrite};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::chunk::{ChunkMeta, SerializeOptions, METADATA_SIZE};
use crate::error::{Error, Result};
use crate::stream;

/// String pool is encoded in UTF-8 rather than UTF-16LE.
pub const UTF8_FLAG: u32 = 1 << 8;
/// The string index is sorted by string value.
pub const SORTED_FLAG: u32 = 1 << 0;
/// Terminates a span list on the wire.
pub const RES_STRING_POOL_SPAN_END: u32 = 0xffff_ffff;

/// Framing plus the five pool header words.
const POOL_HEADER_SIZE: u16 = METADATA_SIZE + 20;
/// Byte offset of the styles-start slot within the chunk header.
const STYLE_START_OFFSET: usize = 24;

/// A span of style information applied to a range of a pooled string. The
/// span's name is itself a pool string (the tag that produced it).
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringPoolSpan {
    /// Pool index of the string naming this span.
    pub name_index: u32,
    /// First character of the range.
    pub start: u32,
    /// Last character of the range.
    pub stop: u32,
}

/// The styling information of one pooled string: an ordered list of spans.
/// Style `i` belongs to string `i`; the style list may be shorter than the
/// string list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StringPoolStyle {
    pub spans: Vec<StringPoolSpan>,
}

impl StringPoolStyle {
    fn parse(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let mut spans = Vec::new();
        loop {
            let probe = cursor.read_u32::<LittleEndian>()?;
            if probe == RES_STRING_POOL_SPAN_END {
                break;
            }
            cursor.seek(SeekFrom::Current(-4))?;
            spans.push(StringPoolSpan::read_le(cursor)?);
        }
        Ok(Self { spans })
    }
}

/// An interned, offset-indexed table of strings with optional styling,
/// referenced from every other chunk by index.
#[derive(Debug, Clone)]
pub struct StringPoolChunk {
    meta: ChunkMeta,
    flags: u32,
    strings: Vec<String>,
    styles: Vec<StringPoolStyle>,
    always_dedup: bool,
}

impl StringPoolChunk {
    pub fn new(utf8: bool) -> Self {
        Self {
            meta: ChunkMeta::synthetic(POOL_HEADER_SIZE),
            flags: if utf8 { UTF8_FLAG } else { 0 },
            strings: Vec::new(),
            styles: Vec::new(),
            always_dedup: false,
        }
    }

    pub(crate) fn parse(meta: ChunkMeta, cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let string_count = cursor.read_u32::<LittleEndian>()?;
        let style_count = cursor.read_u32::<LittleEndian>()?;
        let flags = cursor.read_u32::<LittleEndian>()?;
        let strings_start = cursor.read_u32::<LittleEndian>()?;
        let styles_start = cursor.read_u32::<LittleEndian>()?;

        // A non-monotonic offset table means the encoder shared string bytes;
        // arm dedup so a re-write shares them again.
        let mut always_dedup = false;
        let mut string_offsets = Vec::with_capacity(string_count as usize);
        let mut previous = 0u32;
        for index in 0..string_count {
            let offset = cursor.read_u32::<LittleEndian>()?;
            if index > 0 && offset <= previous {
                always_dedup = true;
            }
            previous = offset;
            string_offsets.push(offset);
        }

        let mut style_offsets = Vec::with_capacity(style_count as usize);
        for _ in 0..style_count {
            style_offsets.push(cursor.read_u32::<LittleEndian>()?);
        }

        let utf8 = flags & UTF8_FLAG != 0;
        let strings_base = meta.original_offset + strings_start as u64;
        let mut strings = Vec::with_capacity(string_count as usize);
        for offset in &string_offsets {
            cursor.set_position(strings_base + *offset as u64);
            strings.push(decode_string(cursor, utf8)?);
        }

        let styles_base = meta.original_offset + styles_start as u64;
        let mut styles = Vec::with_capacity(style_count as usize);
        for offset in &style_offsets {
            cursor.set_position(styles_base + *offset as u64);
            styles.push(StringPoolStyle::parse(cursor)?);
        }

        Ok(Self {
            meta,
            flags,
            strings,
            styles,
            always_dedup,
        })
    }

    pub fn meta(&self) -> ChunkMeta {
        self.meta
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn is_utf8(&self) -> bool {
        self.flags & UTF8_FLAG != 0
    }

    pub fn is_sorted(&self) -> bool {
        self.flags & SORTED_FLAG != 0
    }

    /// Whether re-writes share identical strings even without `SHRINK`.
    pub fn always_dedup(&self) -> bool {
        self.always_dedup
    }

    pub fn count(&self) -> usize {
        self.strings.len()
    }

    pub fn style_count(&self) -> usize {
        self.styles.len()
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn styles(&self) -> &[StringPoolStyle] {
        &self.styles
    }

    pub fn styles_mut(&mut self) -> &mut Vec<StringPoolStyle> {
        &mut self.styles
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    pub fn set(&mut self, index: usize, value: impl Into<String>) -> Result<()> {
        let count = self.strings.len();
        match self.strings.get_mut(index) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(Error::StringIndexOutOfRange {
                index: index as u32,
                count: count as u32,
            }),
        }
    }

    /// Append a string, returning its index.
    pub fn add(&mut self, value: impl Into<String>) -> usize {
        self.strings.push(value.into());
        self.strings.len() - 1
    }

    /// Index of the first occurrence of `needle`, by linear scan.
    pub fn index_of(&self, needle: &str) -> Option<usize> {
        self.strings.iter().position(|s| s == needle)
    }

    /// Delete the given string indices, compacting the pool and its styles.
    ///
    /// A deletion target that a surviving style span still names is kept
    /// alive instead of deleted; a string revived this way revives its own
    /// style, so the protection scan runs until stable. Returns
    /// `remap[old] = new index, or -1 if deleted`; every surviving span's
    /// `name_index` is rewritten through the same remap.
    pub fn delete_strings(&mut self, indices: &BTreeSet<u32>) -> Vec<i32> {
        let count = self.strings.len();
        let mut doomed: BTreeSet<u32> = indices
            .iter()
            .copied()
            .filter(|&index| (index as usize) < count)
            .collect();

        loop {
            let mut revived = Vec::new();
            for (index, style) in self.styles.iter().enumerate() {
                if doomed.contains(&(index as u32)) {
                    continue;
                }
                for span in &style.spans {
                    if doomed.contains(&span.name_index) {
                        revived.push(span.name_index);
                    }
                }
            }
            if revived.is_empty() {
                break;
            }
            for index in revived {
                doomed.remove(&index);
            }
        }

        let mut remap = vec![0i32; count];
        let mut next = 0i32;
        for (index, slot) in remap.iter_mut().enumerate() {
            if doomed.contains(&(index as u32)) {
                *slot = -1;
            } else {
                *slot = next;
                next += 1;
            }
        }

        let old_strings = std::mem::take(&mut self.strings);
        let old_styles = std::mem::take(&mut self.styles);
        for (index, string) in old_strings.into_iter().enumerate() {
            if remap[index] < 0 {
                continue;
            }
            if index < old_styles.len() {
                let mut style = old_styles[index].clone();
                for span in &mut style.spans {
                    if let Some(&mapped) = remap.get(span.name_index as usize) {
                        span.name_index = mapped as u32;
                    }
                }
                self.styles.push(style);
            }
            self.strings.push(string);
        }

        remap
    }

    fn offset_table_size(&self) -> u32 {
        ((self.strings.len() + self.styles.len()) * 4) as u32
    }

    pub(crate) fn write_header(&self, out: &mut Cursor<Vec<u8>>) -> Result<()> {
        out.write_u32::<LittleEndian>(self.strings.len() as u32)?;
        out.write_u32::<LittleEndian>(self.styles.len() as u32)?;
        out.write_u32::<LittleEndian>(self.flags)?;
        let strings_start = if self.strings.is_empty() {
            0
        } else {
            self.meta.header_size as u32 + self.offset_table_size()
        };
        out.write_u32::<LittleEndian>(strings_start)?;
        // styles-start is patched in once the payload is known
        out.write_u32::<LittleEndian>(0)?;
        Ok(())
    }

    pub(crate) fn write_payload(
        &self,
        out: &mut Cursor<Vec<u8>>,
        header: &mut Vec<u8>,
        options: SerializeOptions,
    ) -> Result<()> {
        let dedup = options.shrink() || self.always_dedup;
        let utf8 = self.is_utf8();

        let mut offsets: Vec<u8> = Vec::with_capacity(self.offset_table_size() as usize);

        let mut string_blob: Vec<u8> = Vec::new();
        {
            let mut used: HashMap<&str, u32> = HashMap::new();
            for string in &self.strings {
                if dedup {
                    if let Some(&previous) = used.get(string.as_str()) {
                        offsets.write_u32::<LittleEndian>(previous)?;
                        continue;
                    }
                }
                let offset = string_blob.len() as u32;
                string_blob.extend_from_slice(&encode_string(string, utf8));
                if dedup {
                    used.insert(string.as_str(), offset);
                }
                offsets.write_u32::<LittleEndian>(offset)?;
            }
        }
        stream::pad4_vec(&mut string_blob);

        let mut style_blob = Cursor::new(Vec::new());
        if !self.styles.is_empty() {
            let mut used: HashMap<&StringPoolStyle, u32> = HashMap::new();
            for style in &self.styles {
                if dedup {
                    if let Some(&previous) = used.get(style) {
                        offsets.write_u32::<LittleEndian>(previous)?;
                        continue;
                    }
                }
                let offset = style_blob.position() as u32;
                for span in &style.spans {
                    span.write_le(&mut style_blob)?;
                }
                style_blob.write_u32::<LittleEndian>(RES_STRING_POOL_SPAN_END)?;
                if dedup {
                    used.insert(style, offset);
                }
                offsets.write_u32::<LittleEndian>(offset)?;
            }
            // the style section always closes with two extra sentinel words
            style_blob.write_u32::<LittleEndian>(RES_STRING_POOL_SPAN_END)?;
            style_blob.write_u32::<LittleEndian>(RES_STRING_POOL_SPAN_END)?;
            stream::pad4(&mut style_blob)?;

            let styles_start =
                self.meta.header_size as u32 + self.offset_table_size() + string_blob.len() as u32;
            LittleEndian::write_u32(
                &mut header[STYLE_START_OFFSET..STYLE_START_OFFSET + 4],
                styles_start,
            );
        }

        out.write_all(&offsets)?;
        out.write_all(&string_blob)?;
        out.write_all(&style_blob.into_inner())?;
        Ok(())
    }
}

/// Decode one length-prefixed pool string at the cursor.
///
/// UTF-8 strings carry two prefixes (UTF-16 unit count, then byte count);
/// UTF-16 strings carry one (unit count). Either prefix doubles its width
/// when the high bit of the first unit is set. Strings are NUL terminated on
/// the wire; the terminator is not counted by the prefix.
pub fn decode_string<R: Read>(reader: &mut R, utf8: bool) -> Result<String> {
    if utf8 {
        let _unit_count = decode_length8(reader)?;
        let byte_count = decode_length8(reader)?;
        let mut data = vec![0u8; byte_count as usize];
        reader.read_exact(&mut data)?;
        let terminator = reader.read_u8()?;
        if terminator != 0 {
            return Err(Error::InvalidReserved {
                field: "string terminator",
                value: terminator as u32,
            });
        }
        Ok(String::from_utf8(data)?)
    } else {
        let unit_count = decode_length16(reader)?;
        let mut units = Vec::with_capacity(unit_count as usize);
        for _ in 0..unit_count {
            units.push(reader.read_u16::<LittleEndian>()?);
        }
        let terminator = reader.read_u16::<LittleEndian>()?;
        if terminator != 0 {
            return Err(Error::InvalidReserved {
                field: "string terminator",
                value: terminator as u32,
            });
        }
        Ok(String::from_utf16(&units)?)
    }
}

/// Encode one pool string, including length prefixes and NUL terminator.
pub fn encode_string(value: &str, utf8: bool) -> Vec<u8> {
    let mut out = Vec::new();
    if utf8 {
        encode_length8(&mut out, value.encode_utf16().count());
        encode_length8(&mut out, value.len());
        out.extend_from_slice(value.as_bytes());
        out.push(0);
    } else {
        let units: Vec<u16> = value.encode_utf16().collect();
        encode_length16(&mut out, units.len());
        for unit in units {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out.extend_from_slice(&[0, 0]);
    }
    out
}

pub fn decode_length8<R: Read>(reader: &mut R) -> Result<u32> {
    let first = reader.read_u8()?;
    if first & 0x80 != 0 {
        let second = reader.read_u8()?;
        Ok((((first & 0x7f) as u32) << 8) | second as u32)
    } else {
        Ok(first as u32)
    }
}

pub fn encode_length8(out: &mut Vec<u8>, length: usize) {
    if length >= 0x80 {
        out.push((0x80 | (length >> 8)) as u8);
        out.push((length & 0xff) as u8);
    } else {
        out.push(length as u8);
    }
}

pub fn decode_length16<R: Read>(reader: &mut R) -> Result<u32> {
    let first = reader.read_u16::<LittleEndian>()?;
    if first & 0x8000 != 0 {
        let second = reader.read_u16::<LittleEndian>()?;
        Ok((((first & 0x7fff) as u32) << 16) | second as u32)
    } else {
        Ok(first as u32)
    }
}

pub fn encode_length16(out: &mut Vec<u8>, length: usize) {
    if length >= 0x8000 {
        let first = (0x8000 | (length >> 16)) as u16;
        out.extend_from_slice(&first.to_le_bytes());
        out.extend_from_slice(&((length & 0xffff) as u16).to_le_bytes());
    } else {
        out.extend_from_slice(&(length as u16).to_le_bytes());
    }
}
