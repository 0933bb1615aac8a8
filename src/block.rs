//! Fixed-size physical blocks.
//!
//! Every block is exactly `header.block_size` bytes:
//!
//! ```text
//! [ next_block_offset: u32 LE | payload: block_size - 4 bytes ]
//! ```
//!
//! A `next_block_offset` of zero terminates the chain.  The payload is kept
//! verbatim; its meaning belongs to whoever consumes the assembled chain.

use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{DatError, Result};
use crate::header::Header;

/// Byte length of the link field at the start of every block.
pub const LINK_SIZE: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// File this block was read from; `None` for blocks decoded from a blob.
    pub source:            Option<PathBuf>,
    pub offset:            u32,
    /// Physical length, normally equal to `header.block_size`.
    pub size:              u32,
    pub next_block_offset: u32,
    pub data:              Vec<u8>,
}

impl Block {
    /// Decode a block from an in-memory blob.  `size` is the blob length and
    /// `offset` is left at zero.
    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        Self::decode(blob, 0)
    }

    /// Read exactly `block_size` bytes at `offset` and decode them.
    pub fn read<R: Read + Seek>(mut reader: R, offset: u32, block_size: u32) -> Result<Self> {
        let needed = block_size as usize;
        if needed < LINK_SIZE {
            return Err(DatError::Truncated {
                what:      "block",
                offset:    offset as u64,
                needed:    LINK_SIZE,
                available: needed,
            });
        }
        reader.seek(SeekFrom::Start(offset as u64))?;
        let blob = read_span(&mut reader, needed)?;
        if blob.len() < needed {
            return Err(DatError::Truncated {
                what:      "block",
                offset:    offset as u64,
                needed,
                available: blob.len(),
            });
        }
        tracing::trace!("read block at {offset:#x} ({block_size} bytes)");
        Self::decode(&blob, offset)
    }

    /// Independent read: re-derives `block_size` from the file's own header
    /// before reading the block at `offset`.
    pub fn from_file<P: AsRef<Path>>(path: P, offset: u32) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let header = Header::read(&mut file)?;
        let mut block = Self::read(&mut file, offset, header.block_size)?;
        block.source = Some(path.to_owned());
        Ok(block)
    }

    fn decode(blob: &[u8], offset: u32) -> Result<Self> {
        if blob.len() < LINK_SIZE {
            return Err(DatError::Truncated {
                what:      "block link",
                offset:    offset as u64,
                needed:    LINK_SIZE,
                available: blob.len(),
            });
        }
        let next_block_offset = (&blob[..LINK_SIZE]).read_u32::<LittleEndian>()?;
        Ok(Self {
            source: None,
            offset,
            size: blob.len() as u32,
            next_block_offset,
            data: blob[LINK_SIZE..].to_vec(),
        })
    }

    /// True when this block ends its chain.
    pub fn is_terminal(&self) -> bool {
        self.next_block_offset == 0
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = self.source
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".into());
        write!(
            f,
            "{{source: {}, offset: {:#x}, size: {:#x}, next: {:#x}, data: {}}}",
            source,
            self.offset,
            self.size,
            self.next_block_offset,
            hex::encode(&self.data),
        )
    }
}

/// Read up to `len` bytes from the current position.  A short result means
/// the source ran out; the caller decides whether that is an error.
pub(crate) fn read_span<R: Read>(reader: R, len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(len);
    reader.take(len as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn link_is_little_endian() {
        let mut blob = vec![0xEF, 0xBE, 0xAD, 0xDE];
        blob.extend(std::iter::repeat(b'A').take(252));
        let block = Block::from_blob(&blob).unwrap();
        assert_eq!(block.size, 256);
        assert_eq!(block.next_block_offset, 0xdeadbeef);
        assert_eq!(block.data, vec![b'A'; 252]);
        assert!(!block.is_terminal());
    }

    #[test]
    fn one_byte_blob_is_a_decode_error() {
        assert!(Block::from_blob(b"A").unwrap_err().is_decode());
    }

    #[test]
    fn read_rejects_block_size_below_link() {
        let err = Block::read(Cursor::new(vec![0u8; 64]), 0, 3).unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn read_reports_truncation() {
        let err = Block::read(Cursor::new(vec![0u8; 300]), 0x100, 0x100).unwrap_err();
        match err {
            DatError::Truncated { what, offset, needed, available } => {
                assert_eq!(what, "block");
                assert_eq!(offset, 0x100);
                assert_eq!(needed, 0x100);
                assert_eq!(available, 300 - 0x100);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn read_records_position() {
        let mut bytes = vec![0u8; 0x20];
        bytes[0x10..0x14].copy_from_slice(&0x40u32.to_le_bytes());
        bytes[0x14..0x18].copy_from_slice(b"abcd");
        let block = Block::read(Cursor::new(bytes), 0x10, 8).unwrap();
        assert_eq!(block.offset, 0x10);
        assert_eq!(block.size, 8);
        assert_eq!(block.next_block_offset, 0x40);
        assert_eq!(block.data, b"abcd");
        assert_eq!(block.source, None);
    }
}
