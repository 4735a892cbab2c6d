use std::string::{FromUtf16Error, FromUtf8Error};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported while parsing, editing or serializing a resource container.
#[derive(Error, Debug)]
pub enum Error {
    #[error("chunk type 0x{0:04x} is not a valid type code")]
    UnknownChunkType(u16),

    #[error("resource value tag 0x{0:02x} is not a known value type")]
    UnknownValueType(u8),

    #[error("chunk declares a header of {declared} bytes but {written} were produced")]
    HeaderSizeMismatch { declared: u16, written: usize },

    #[error("reserved field {field} must be zero, got {value:#x}")]
    InvalidReserved { field: &'static str, value: u32 },

    #[error("configuration record of {0} bytes is smaller than the 28-byte minimum")]
    ConfigTooSmall(u32),

    #[error("string index {index} out of range for a pool of {count}")]
    StringIndexOutOfRange { index: u32, count: u32 },

    #[error("package id {0:#x} does not fit in one byte")]
    PackageIdTooLarge(u32),

    #[error("type id {0} is not a valid 1-based type index")]
    InvalidTypeId(u32),

    #[error("{0} has no string pool child")]
    MissingStringPool(&'static str),

    #[error("package contains more than one library chunk")]
    DuplicateLibraryChunk,

    #[error("sparse entry payload offset {0} is not 4-byte aligned")]
    MisalignedSparseEntry(u32),

    #[error("string {0} is still referenced by a complex entry after deletion")]
    DanglingStringRef(u32),

    #[error("string does not fit in a {limit}-unit name field")]
    NameTooLong { limit: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Codec(binrw::Error),

    #[error("invalid UTF-8 string data: {0}")]
    Utf8(#[from] FromUtf8Error),

    #[error("invalid UTF-16 string data: {0}")]
    Utf16(#[from] FromUtf16Error),
}

/// Value-tag decoding smuggles [`Error::UnknownValueType`] through binrw's
/// custom error box; unwrap it so callers see the tag variant directly.
impl From<binrw::Error> for Error {
    fn from(error: binrw::Error) -> Self {
        if let Some(&Error::UnknownValueType(code)) = error.custom_err::<Error>() {
            return Error::UnknownValueType(code);
        }
        Error::Codec(error)
    }
}
