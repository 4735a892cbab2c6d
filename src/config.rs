use std::fmt::{self, Display};
use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// Smallest configuration record any known encoder emits.
pub const MIN_SIZE: u32 = 28;
/// Record size that carries screen layout, ui mode and smallest width.
pub const SCREEN_CONFIG_MIN_SIZE: u32 = 32;
/// Record size that carries screen dimensions in dp.
pub const SCREEN_DP_MIN_SIZE: u32 = 36;
/// Record size that carries locale script and variant.
pub const LOCALE_MIN_SIZE: u32 = 48;
/// Record size that carries the second screen layout byte and color mode.
pub const SCREEN_CONFIG_EXTENSION_MIN_SIZE: u32 = 52;

/// The device configuration a slab of resource entries applies to.
///
/// The record has a fixed 28-byte prefix and grows through documented size
/// tiers; fields beyond the declared size are absent. Trailing bytes not
/// described by any tier are kept verbatim in `unknown` so newer encodings
/// survive a round trip.
#[derive(Debug, Clone)]
pub struct ResourceConfiguration {
    size: u32,
    pub mcc: u16,
    pub mnc: u16,
    pub language: [u8; 2],
    pub region: [u8; 2],
    pub orientation: u8,
    pub touchscreen: u8,
    pub density: u16,
    pub keyboard: u8,
    pub navigation: u8,
    pub input_flags: u8,
    pub screen_width: u16,
    pub screen_height: u16,
    pub sdk_version: u16,
    pub minor_version: u16,
    pub screen_layout: u8,
    pub ui_mode: u8,
    pub smallest_screen_width_dp: u16,
    pub screen_width_dp: u16,
    pub screen_height_dp: u16,
    pub locale_script: [u8; 4],
    pub locale_variant: [u8; 8],
    pub screen_layout2: u8,
    pub color_mode: u8,
    unknown: Vec<u8>,
}

impl Default for ResourceConfiguration {
    fn default() -> Self {
        Self {
            size: MIN_SIZE,
            mcc: 0,
            mnc: 0,
            language: [0; 2],
            region: [0; 2],
            orientation: 0,
            touchscreen: 0,
            density: 0,
            keyboard: 0,
            navigation: 0,
            input_flags: 0,
            screen_width: 0,
            screen_height: 0,
            sdk_version: 0,
            minor_version: 0,
            screen_layout: 0,
            ui_mode: 0,
            smallest_screen_width_dp: 0,
            screen_width_dp: 0,
            screen_height_dp: 0,
            locale_script: [0; 4],
            locale_variant: [0; 8],
            screen_layout2: 0,
            color_mode: 0,
            unknown: Vec::new(),
        }
    }
}

/// Equality ignores the declared size and the unknown tail, so the same
/// configuration parsed from records of different tiers compares equal.
impl PartialEq for ResourceConfiguration {
    fn eq(&self, other: &Self) -> bool {
        self.mcc == other.mcc
            && self.mnc == other.mnc
            && self.language == other.language
            && self.region == other.region
            && self.orientation == other.orientation
            && self.touchscreen == other.touchscreen
            && self.density == other.density
            && self.keyboard == other.keyboard
            && self.navigation == other.navigation
            && self.input_flags == other.input_flags
            && self.screen_width == other.screen_width
            && self.screen_height == other.screen_height
            && self.sdk_version == other.sdk_version
            && self.minor_version == other.minor_version
            && self.screen_layout == other.screen_layout
            && self.ui_mode == other.ui_mode
            && self.smallest_screen_width_dp == other.smallest_screen_width_dp
            && self.screen_width_dp == other.screen_width_dp
            && self.screen_height_dp == other.screen_height_dp
            && self.locale_script == other.locale_script
            && self.locale_variant == other.locale_variant
            && self.screen_layout2 == other.screen_layout2
            && self.color_mode == other.color_mode
    }
}

impl Eq for ResourceConfiguration {}

impl ResourceConfiguration {
    /// The declared size of the record on the wire, including the size word.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn parse(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let start = cursor.position();
        let size = cursor.read_u32::<LittleEndian>()?;
        if size < MIN_SIZE {
            return Err(Error::ConfigTooSmall(size));
        }

        let mut config = ResourceConfiguration {
            size,
            ..Default::default()
        };

        config.mcc = cursor.read_u16::<LittleEndian>()?;
        config.mnc = cursor.read_u16::<LittleEndian>()?;
        cursor.read_exact(&mut config.language)?;
        cursor.read_exact(&mut config.region)?;
        config.orientation = cursor.read_u8()?;
        config.touchscreen = cursor.read_u8()?;
        config.density = cursor.read_u16::<LittleEndian>()?;
        config.keyboard = cursor.read_u8()?;
        config.navigation = cursor.read_u8()?;
        config.input_flags = cursor.read_u8()?;
        cursor.read_u8()?; // input padding
        config.screen_width = cursor.read_u16::<LittleEndian>()?;
        config.screen_height = cursor.read_u16::<LittleEndian>()?;
        config.sdk_version = cursor.read_u16::<LittleEndian>()?;
        config.minor_version = cursor.read_u16::<LittleEndian>()?;

        if size >= SCREEN_CONFIG_MIN_SIZE {
            config.screen_layout = cursor.read_u8()?;
            config.ui_mode = cursor.read_u8()?;
            config.smallest_screen_width_dp = cursor.read_u16::<LittleEndian>()?;
        }
        if size >= SCREEN_DP_MIN_SIZE {
            config.screen_width_dp = cursor.read_u16::<LittleEndian>()?;
            config.screen_height_dp = cursor.read_u16::<LittleEndian>()?;
        }
        if size >= LOCALE_MIN_SIZE {
            cursor.read_exact(&mut config.locale_script)?;
            cursor.read_exact(&mut config.locale_variant)?;
        }
        if size >= SCREEN_CONFIG_EXTENSION_MIN_SIZE {
            config.screen_layout2 = cursor.read_u8()?;
            config.color_mode = cursor.read_u8()?;
            cursor.read_u16::<LittleEndian>()?; // extension padding
        }

        let consumed = cursor.position() - start;
        if (size as u64) > consumed {
            let mut unknown = vec![0u8; (size as u64 - consumed) as usize];
            cursor.read_exact(&mut unknown)?;
            config.unknown = unknown;
        }
        cursor.set_position(start + size as u64);

        Ok(config)
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_u32::<LittleEndian>(self.size)?;
        out.write_u16::<LittleEndian>(self.mcc)?;
        out.write_u16::<LittleEndian>(self.mnc)?;
        out.write_all(&self.language)?;
        out.write_all(&self.region)?;
        out.write_u8(self.orientation)?;
        out.write_u8(self.touchscreen)?;
        out.write_u16::<LittleEndian>(self.density)?;
        out.write_u8(self.keyboard)?;
        out.write_u8(self.navigation)?;
        out.write_u8(self.input_flags)?;
        out.write_u8(0)?; // input padding
        out.write_u16::<LittleEndian>(self.screen_width)?;
        out.write_u16::<LittleEndian>(self.screen_height)?;
        out.write_u16::<LittleEndian>(self.sdk_version)?;
        out.write_u16::<LittleEndian>(self.minor_version)?;

        if self.size >= SCREEN_CONFIG_MIN_SIZE {
            out.write_u8(self.screen_layout)?;
            out.write_u8(self.ui_mode)?;
            out.write_u16::<LittleEndian>(self.smallest_screen_width_dp)?;
        }
        if self.size >= SCREEN_DP_MIN_SIZE {
            out.write_u16::<LittleEndian>(self.screen_width_dp)?;
            out.write_u16::<LittleEndian>(self.screen_height_dp)?;
        }
        if self.size >= LOCALE_MIN_SIZE {
            out.write_all(&self.locale_script)?;
            out.write_all(&self.locale_variant)?;
        }
        if self.size >= SCREEN_CONFIG_EXTENSION_MIN_SIZE {
            out.write_u8(self.screen_layout2)?;
            out.write_u8(self.color_mode)?;
            out.write_u16::<LittleEndian>(0)?; // extension padding
        }

        out.write_all(&self.unknown)?;
        Ok(())
    }

    /// The unpacked language qualifier, "" for the default configuration.
    pub fn language(&self) -> String {
        unpack_language(self.language)
    }

    /// The unpacked region qualifier, "" for the default configuration.
    pub fn region(&self) -> String {
        unpack_region(self.region)
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Pack a lower-case ISO language code of length 2 or 3 into the two-byte
/// field the configuration record uses. Two-letter codes are stored as-is;
/// three-letter codes are bit-packed relative to 'a' with the high bit set.
pub fn pack_language(language: &str) -> [u8; 2] {
    pack_language_or_region(language, b'a')
}

/// Inverse of [`pack_language`].
pub fn unpack_language(packed: [u8; 2]) -> String {
    unpack_language_or_region(packed, b'a')
}

/// Pack a region code ("US", or a three-digit UN M.49 code) the same way as
/// [`pack_language`] but relative to '0'.
pub fn pack_region(region: &str) -> [u8; 2] {
    pack_language_or_region(region, b'0')
}

/// Inverse of [`pack_region`].
pub fn unpack_region(packed: [u8; 2]) -> String {
    unpack_language_or_region(packed, b'0')
}

fn pack_language_or_region(value: &str, base: u8) -> [u8; 2] {
    let bytes = value.as_bytes();
    match bytes.len() {
        2 => [bytes[0], bytes[1]],
        3 => {
            let first = (bytes[0] - base) as u32;
            let second = (bytes[1] - base) as u32;
            let third = (bytes[2] - base) as u32;
            [
                (0x80 | (third << 2) | (second >> 3)) as u8,
                ((second << 5) | first) as u8,
            ]
        }
        _ => [0, 0],
    }
}

fn unpack_language_or_region(packed: [u8; 2], base: u8) -> String {
    if packed[0] & 0x80 != 0 {
        let first = packed[1] & 0x1f;
        let second = ((packed[1] & 0xe0) >> 5) | ((packed[0] & 0x03) << 3);
        let third = (packed[0] & 0x7c) >> 2;
        String::from_utf8_lossy(&[first + base, second + base, third + base]).into_owned()
    } else if packed[0] != 0 {
        String::from_utf8_lossy(&packed).into_owned()
    } else {
        String::new()
    }
}

impl Display for ResourceConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            return write!(f, "default");
        }

        let mut parts: Vec<String> = Vec::new();
        if self.mcc != 0 {
            parts.push(format!("mcc{}", self.mcc));
        }
        if self.mnc != 0 {
            parts.push(format!("mnc{}", self.mnc));
        }
        let language = self.language();
        if !language.is_empty() {
            parts.push(language);
        }
        let region = self.region();
        if !region.is_empty() {
            parts.push(format!("r{region}"));
        }
        match self.screen_layout & 0xc0 {
            0x40 => parts.push("ldltr".to_string()),
            0x80 => parts.push("ldrtl".to_string()),
            _ => {}
        }
        if self.smallest_screen_width_dp != 0 {
            parts.push(format!("sw{}dp", self.smallest_screen_width_dp));
        }
        if self.screen_width_dp != 0 {
            parts.push(format!("w{}dp", self.screen_width_dp));
        }
        if self.screen_height_dp != 0 {
            parts.push(format!("h{}dp", self.screen_height_dp));
        }
        match self.screen_layout & 0x0f {
            1 => parts.push("small".to_string()),
            2 => parts.push("normal".to_string()),
            3 => parts.push("large".to_string()),
            4 => parts.push("xlarge".to_string()),
            _ => {}
        }
        match self.screen_layout & 0x30 {
            0x10 => parts.push("notlong".to_string()),
            0x20 => parts.push("long".to_string()),
            _ => {}
        }
        match self.orientation {
            1 => parts.push("port".to_string()),
            2 => parts.push("land".to_string()),
            3 => parts.push("square".to_string()),
            _ => {}
        }
        match self.ui_mode & 0x0f {
            2 => parts.push("desk".to_string()),
            3 => parts.push("car".to_string()),
            4 => parts.push("television".to_string()),
            5 => parts.push("appliance".to_string()),
            6 => parts.push("watch".to_string()),
            7 => parts.push("vrheadset".to_string()),
            _ => {}
        }
        match self.ui_mode & 0x30 {
            0x10 => parts.push("notnight".to_string()),
            0x20 => parts.push("night".to_string()),
            _ => {}
        }
        match self.density {
            0 => {}
            120 => parts.push("ldpi".to_string()),
            160 => parts.push("mdpi".to_string()),
            213 => parts.push("tvdpi".to_string()),
            240 => parts.push("hdpi".to_string()),
            320 => parts.push("xhdpi".to_string()),
            480 => parts.push("xxhdpi".to_string()),
            640 => parts.push("xxxhdpi".to_string()),
            0xfffe => parts.push("anydpi".to_string()),
            0xffff => parts.push("nodpi".to_string()),
            other => parts.push(format!("{other}dpi")),
        }
        match self.touchscreen {
            1 => parts.push("notouch".to_string()),
            2 => parts.push("stylus".to_string()),
            3 => parts.push("finger".to_string()),
            _ => {}
        }
        match self.input_flags & 0x03 {
            1 => parts.push("keysexposed".to_string()),
            2 => parts.push("keyshidden".to_string()),
            3 => parts.push("keyssoft".to_string()),
            _ => {}
        }
        match self.keyboard {
            1 => parts.push("nokeys".to_string()),
            2 => parts.push("qwerty".to_string()),
            3 => parts.push("12key".to_string()),
            _ => {}
        }
        match self.input_flags & 0x0c {
            0x04 => parts.push("navexposed".to_string()),
            0x08 => parts.push("navhidden".to_string()),
            _ => {}
        }
        match self.navigation {
            1 => parts.push("nonav".to_string()),
            2 => parts.push("dpad".to_string()),
            3 => parts.push("trackball".to_string()),
            4 => parts.push("wheel".to_string()),
            _ => {}
        }
        if self.screen_width != 0 || self.screen_height != 0 {
            parts.push(format!("{}x{}", self.screen_width, self.screen_height));
        }
        if self.sdk_version != 0 {
            parts.push(format!("v{}", self.sdk_version));
        }

        write!(f, "{}", parts.join("-"))
    }
}
