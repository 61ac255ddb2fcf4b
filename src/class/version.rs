use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};

use crate::class::FormatError;

pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// The only class file version this core accepts.
pub const SUPPORTED_VERSION: ClassVersion = ClassVersion {
    minor: 0,
    major: 52,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassVersion {
    pub minor: u16,
    pub major: u16,
}

impl ClassVersion {
    pub fn read<R: Read + ?Sized>(buffer: &mut R) -> Result<Self, FormatError> {
        Ok(ClassVersion {
            minor: buffer.read_u16::<BigEndian>()?,
            major: buffer.read_u16::<BigEndian>()?,
        })
    }

    pub fn check_supported(self) -> Result<(), FormatError> {
        if self != SUPPORTED_VERSION {
            return Err(FormatError::UnsupportedVersion {
                major: self.major,
                minor: self.minor,
            });
        }
        Ok(())
    }
}

pub fn check_magic_number<R: Read + ?Sized>(buffer: &mut R) -> Result<(), FormatError> {
    if buffer.read_u32::<BigEndian>()? != CLASS_MAGIC {
        return Err(FormatError::BadMagic);
    }
    Ok(())
}
