use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Error, ErrorKind, Result};

/// First four bytes of every class file
pub const MAGIC: u32 = 0xCAFE_BABE;

/// Version of the class file, which is used to verify that the JVM has the
/// necessary features to interpret the class
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Version {
    pub minor_version: u16,
    pub major_version: u16,
}

impl Version {
    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    pub const JAVA8: Version = Version {
        minor_version: 0,
        major_version: 52,
    };

    /// JVM class file version corresponding to Java SE 11 (released September 2018)
    pub const JAVA11: Version = Version {
        minor_version: 0,
        major_version: 55,
    };

    /// Read the version out of a class file header
    ///
    /// Checks no more than the magic number and the version fields; everything past the first
    /// eight bytes of the blob is somebody else's problem.
    pub fn of_class_file(blob: &[u8]) -> Result<Version> {
        let mut reader = blob;
        let magic = reader.read_u32::<BigEndian>()?;
        if magic != MAGIC {
            let msg = format!("Invalid class file magic {:#010x}", magic);
            return Err(Error::new(ErrorKind::InvalidData, msg));
        }
        let minor_version = reader.read_u16::<BigEndian>()?;
        let major_version = reader.read_u16::<BigEndian>()?;
        Ok(Version {
            minor_version,
            major_version,
        })
    }
}
