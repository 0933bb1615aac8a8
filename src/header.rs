//! DAT file header.
//!
//! The header lives at a fixed position, [`HEADER_OFFSET`] bytes into the
//! file, and is [`HEADER_SIZE`] bytes long: nine little-endian `u32` fields.
//!
//! ```text
//!  0x140  magic             0x5442
//!  0x144  block_size        per-file block length (0x100, 0x400, ...)
//!  0x148  file_size
//!  0x14c  file_version
//!  0x150  file_version2
//!  0x154  first_free_block  absolute offset
//!  0x158  last_free_block   absolute offset
//!  0x15c  free_block_count
//!  0x160  root_offset       first block of the root chain
//! ```
//!
//! Parsing never validates.  A parsed header may be semantically invalid
//! until [`Header::validate`] or [`Header::is_valid`] says otherwise.

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use thiserror::Error;

use crate::block::read_span;
use crate::error::{DatError, Result};

pub const HEADER_OFFSET: u64   = 320;
pub const HEADER_SIZE:   usize = 36;
pub const HEADER_MAGIC:  u32   = 0x5442;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidityError {
    #[error("Bad magic {0:#x} (expected {HEADER_MAGIC:#x})")]
    BadMagic(u32),
    #[error("Root offset {offset:#x} exceeds file size {file_size:#x}")]
    RootOffsetOutOfRange { offset: u32, file_size: u32 },
    #[error("First free block {offset:#x} exceeds file size {file_size:#x}")]
    FirstFreeOutOfRange { offset: u32, file_size: u32 },
    #[error("Last free block {offset:#x} exceeds file size {file_size:#x}")]
    LastFreeOutOfRange { offset: u32, file_size: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Header {
    pub magic:            u32,
    pub block_size:       u32,
    pub file_size:        u32,
    pub file_version:     u32,
    pub file_version2:    u32,
    pub first_free_block: u32,
    pub last_free_block:  u32,
    pub free_block_count: u32,
    pub root_offset:      u32,
}

impl Header {
    /// Decode the first [`HEADER_SIZE`] bytes of `blob`.  Trailing bytes are
    /// ignored.
    pub fn parse(blob: &[u8]) -> Result<Self> {
        if blob.len() < HEADER_SIZE {
            return Err(DatError::Truncated {
                what:      "header",
                offset:    HEADER_OFFSET,
                needed:    HEADER_SIZE,
                available: blob.len(),
            });
        }
        let mut r = &blob[..HEADER_SIZE];
        Ok(Self {
            magic:            r.read_u32::<LittleEndian>()?,
            block_size:       r.read_u32::<LittleEndian>()?,
            file_size:        r.read_u32::<LittleEndian>()?,
            file_version:     r.read_u32::<LittleEndian>()?,
            file_version2:    r.read_u32::<LittleEndian>()?,
            first_free_block: r.read_u32::<LittleEndian>()?,
            last_free_block:  r.read_u32::<LittleEndian>()?,
            free_block_count: r.read_u32::<LittleEndian>()?,
            root_offset:      r.read_u32::<LittleEndian>()?,
        })
    }

    /// Seek to [`HEADER_OFFSET`] and decode the header found there.
    pub fn read<R: Read + Seek>(mut reader: R) -> Result<Self> {
        reader.seek(SeekFrom::Start(HEADER_OFFSET))?;
        let blob = read_span(&mut reader, HEADER_SIZE)?;
        Self::parse(&blob)
    }

    /// Open `path`, read its header, and close the file again.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::read(file)
    }

    /// First inconsistency found, magic first.
    pub fn validate(&self) -> std::result::Result<(), ValidityError> {
        if self.magic != HEADER_MAGIC {
            return Err(ValidityError::BadMagic(self.magic));
        }
        let file_size = self.file_size;
        if self.root_offset > file_size {
            return Err(ValidityError::RootOffsetOutOfRange { offset: self.root_offset, file_size });
        }
        if self.first_free_block > file_size {
            return Err(ValidityError::FirstFreeOutOfRange { offset: self.first_free_block, file_size });
        }
        if self.last_free_block > file_size {
            return Err(ValidityError::LastFreeOutOfRange { offset: self.last_free_block, file_size });
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Upper bound on the number of distinct blocks the file can hold.
    pub fn max_blocks(&self) -> u32 {
        self.file_size.checked_div(self.block_size).unwrap_or(0)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{magic: {:#x}, block_size: {:#x}, file_size: {:#x}, \
             file_version: {:#x}, file_version2: {:#x}, \
             first_free_block: {:#x}, last_free_block: {:#x}, \
             free_block_count: {:#x}, root_offset: {:#x}}}",
            self.magic,
            self.block_size,
            self.file_size,
            self.file_version,
            self.file_version2,
            self.first_free_block,
            self.last_free_block,
            self.free_block_count,
            self.root_offset,
        )
    }
}
