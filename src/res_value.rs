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

use std::fmt::{self, Display};

use binrw::binrw;

use crate::error::{Error, Result};

/// On-wire size of a [`ResourceValue`], in bytes.
pub const VALUE_SIZE: u16 = 8;

/// A single typed scalar as stored in entries, attribute values and CDATA
/// nodes. The `data` word is carried as raw bits; interpreting it (colors,
/// dimensions, floats) is left to consumers.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceValue {
    /// Number of bytes in this structure. Every known encoder writes 8.
    pub size: u16,

    #[br(temp)]
    #[br(assert(res0 == 0))]
    #[bw(calc = 0)]
    res0: u8,

    /// How `data` is to be interpreted. Decoded from the raw tag byte; a
    /// code outside the closed set is reported as `UnknownValueType`.
    #[br(try_map = ValueType::from_code)]
    #[bw(map = |value_type: &ValueType| value_type.code())]
    pub value_type: ValueType,

    /// The value bits, as interpreted according to `value_type`.
    pub data: u32,
}

impl ResourceValue {
    pub fn new(value_type: ValueType, data: u32) -> Self {
        Self {
            size: VALUE_SIZE,
            value_type,
            data,
        }
    }
}

/// Type discriminant of a [`ResourceValue`]. The set is closed by the file
/// format.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum ValueType {
    /// The value is either undefined (0) or explicitly empty (1).
    Null,
    /// The value holds a reference to another resource table entry.
    Reference,
    /// The value holds an attribute resource identifier.
    Attribute,
    /// The value holds an index into the containing resource table's global
    /// value string pool.
    String,
    /// The value holds a single-precision floating point number.
    Float,
    /// The value holds a complex number encoding a dimension, such as "100in".
    Dimension,
    /// The value holds a complex number encoding a fraction of a container.
    Fraction,
    /// A reference that must be resolved through the dynamic reference table
    /// before use.
    DynamicReference,
    /// An attribute identifier that must be resolved through the dynamic
    /// reference table before use.
    DynamicAttribute,
    /// A raw integer of the form n..n.
    IntDec,
    /// A raw integer of the form 0xn..n.
    IntHex,
    /// Either 0 or 1, for "false" or "true".
    IntBoolean,
    /// A raw color of the form #aarrggbb.
    IntColorArgb8,
    /// A raw color of the form #rrggbb.
    IntColorRgb8,
    /// A raw color of the form #argb.
    IntColorArgb4,
    /// A raw color of the form #rgb.
    IntColorRgb4,
}

impl ValueType {
    pub fn code(self) -> u8 {
        match self {
            ValueType::Null => 0x00,
            ValueType::Reference => 0x01,
            ValueType::Attribute => 0x02,
            ValueType::String => 0x03,
            ValueType::Float => 0x04,
            ValueType::Dimension => 0x05,
            ValueType::Fraction => 0x06,
            ValueType::DynamicReference => 0x07,
            ValueType::DynamicAttribute => 0x08,
            ValueType::IntDec => 0x10,
            ValueType::IntHex => 0x11,
            ValueType::IntBoolean => 0x12,
            ValueType::IntColorArgb8 => 0x1c,
            ValueType::IntColorRgb8 => 0x1d,
            ValueType::IntColorArgb4 => 0x1e,
            ValueType::IntColorRgb4 => 0x1f,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0x00 => ValueType::Null,
            0x01 => ValueType::Reference,
            0x02 => ValueType::Attribute,
            0x03 => ValueType::String,
            0x04 => ValueType::Float,
            0x05 => ValueType::Dimension,
            0x06 => ValueType::Fraction,
            0x07 => ValueType::DynamicReference,
            0x08 => ValueType::DynamicAttribute,
            0x10 => ValueType::IntDec,
            0x11 => ValueType::IntHex,
            0x12 => ValueType::IntBoolean,
            0x1c => ValueType::IntColorArgb8,
            0x1d => ValueType::IntColorRgb8,
            0x1e => ValueType::IntColorArgb4,
            0x1f => ValueType::IntColorRgb4,
            _ => return Err(Error::UnknownValueType(code)),
        })
    }
}

/// A packed resource identifier. The value is structured as 0xpptteeee,
/// where pp is the package id, tt is the 1-based type id in that package,
/// and eeee is the entry index in that type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(pub u32);

impl ResourceId {
    pub fn new(package: u8, type_id: u8, entry: u16) -> Self {
        Self(((package as u32) << 24) | ((type_id as u32) << 16) | (entry as u32))
    }

    pub fn package(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn type_id(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn entry(self) -> u16 {
        self.0 as u16
    }
}

impl From<u32> for ResourceId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<ResourceId> for u32 {
    fn from(value: ResourceId) -> Self {
        value.0
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_id_packs_and_unpacks() {
        let id = ResourceId::new(0x7f, 0x01, 0x0042);
        assert_eq!(id.0, 0x7f010042);
        assert_eq!(id.package(), 0x7f);
        assert_eq!(id.type_id(), 0x01);
        assert_eq!(id.entry(), 0x42);
        assert_eq!(id.to_string(), "0x7f010042");
    }

    #[test]
    fn value_type_codes_round_trip() {
        for code in [
            0x00u8, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x10, 0x11, 0x12, 0x1c, 0x1d,
            0x1e, 0x1f,
        ] {
            assert_eq!(ValueType::from_code(code).unwrap().code(), code);
        }
        assert!(ValueType::from_code(0x20).is_err());
    }
}
