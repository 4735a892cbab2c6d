use std::io::{Read, Seek, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::align;
use crate::error::{Error, Result};

/// Zero-pad the writer so the next byte lands on a 4-byte chunk boundary.
pub fn pad4<W: Write + Seek>(out: &mut W) -> Result<()> {
    let pos = out.stream_position()?;
    for _ in pos..align(pos, 4) {
        out.write_u8(0)?;
    }
    Ok(())
}

/// Zero-pad an in-memory buffer to a 4-byte boundary.
pub fn pad4_vec(buf: &mut Vec<u8>) {
    let padded = align(buf.len() as u64, 4) as usize;
    buf.resize(padded, 0);
}

/// Read a fixed field of `units` UTF-16LE code units, stopping at the first
/// NUL. The reader always consumes the whole field.
pub fn read_utf16_fixed<R: Read>(reader: &mut R, units: usize) -> Result<String> {
    let mut data = Vec::new();
    let mut terminated = false;
    for _ in 0..units {
        let unit = reader.read_u16::<LittleEndian>()?;
        if unit == 0 {
            terminated = true;
        }
        if !terminated {
            data.push(unit);
        }
    }
    Ok(String::from_utf16(&data)?)
}

/// Write `value` into a fixed field of `units` UTF-16LE code units, padded
/// with NULs. The encoded string must leave room for at least one NUL.
pub fn write_utf16_fixed<W: Write>(out: &mut W, value: &str, units: usize) -> Result<()> {
    let mut data: Vec<u16> = value.encode_utf16().collect();
    if data.len() >= units {
        return Err(Error::NameTooLong { limit: units });
    }
    data.resize(units, 0);
    for unit in data {
        out.write_u16::<LittleEndian>(unit)?;
    }
    Ok(())
}
