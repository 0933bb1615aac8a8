//! An opened DAT file with its header already parsed.
//!
//! [`DatFile`] reads the header once on open and reuses its `block_size` for
//! every block read afterwards.  The path-based free functions at the bottom
//! of this module are the independent entry points: each opens the file,
//! performs one bounded read, and closes it again.
//!
//! ```no_run
//! use turbine_dat::DatFile;
//!
//! let mut dat = DatFile::open("cell.dat")?;
//! let root = dat.root_chain()?;
//! println!("root directory: {} bytes in {} blocks", root.data.len(), root.block_count);
//! # Ok::<(), turbine_dat::DatError>(())
//! ```

use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use crate::block::Block;
use crate::chain::{BlockChain, BlockSource, ChainWalker, TraversalLimits};
use crate::error::{DatError, Result};
use crate::header::Header;

// ── OpenOptions ──────────────────────────────────────────────────────────────

/// Configuration for [`DatFile::open_with`] and [`DatFile::from_reader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Reject headers that fail [`Header::validate`].
    pub validate_header: bool,
    /// Traversal checks for chain walks.  `None` derives them from the header
    /// via [`TraversalLimits::for_header`].
    pub limits:          Option<TraversalLimits>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self { validate_header: true, limits: None }
    }
}

// ── DatFile ──────────────────────────────────────────────────────────────────

pub struct DatFile<R: Read + Seek> {
    reader: R,
    header: Header,
    path:   Option<PathBuf>,
    limits: TraversalLimits,
}

impl DatFile<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, OpenOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, opts: OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        let mut dat = Self::from_reader(File::open(path)?, opts)?;
        dat.path = Some(path.to_owned());
        Ok(dat)
    }
}

impl<R: Read + Seek> DatFile<R> {
    pub fn from_reader(mut reader: R, opts: OpenOptions) -> Result<Self> {
        let header = Header::read(&mut reader)?;
        if opts.validate_header {
            header.validate()?;
        }
        tracing::debug!(
            "opened DAT: block_size={:#x} file_size={:#x} root={:#x} valid={}",
            header.block_size,
            header.file_size,
            header.root_offset,
            header.is_valid(),
        );
        let limits = opts.limits.unwrap_or_else(|| TraversalLimits::for_header(&header));
        Ok(Self { reader, header, path: None, limits })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn block_size(&self) -> u32 {
        self.header.block_size
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn limits(&self) -> TraversalLimits {
        self.limits
    }

    /// Read one block using the cached block size.
    pub fn read_block(&mut self, offset: u32) -> Result<Block> {
        let mut block = Block::read(&mut self.reader, offset, self.header.block_size)?;
        block.source = self.path.clone();
        Ok(block)
    }

    /// First block of the root chain.
    pub fn root_block(&mut self) -> Result<Block> {
        self.read_block(self.header.root_offset)
    }

    /// Lazily walk the chain that begins with `start`.
    pub fn walk(&mut self, start: Block) -> ChainWalker<'_, Self> {
        let limits = self.limits;
        ChainWalker::new(self, start, limits)
    }

    /// Walk the chain that begins with `start` to completion.
    pub fn assemble(&mut self, start: Block) -> Result<BlockChain> {
        BlockChain::assemble(self.walk(start))
    }

    /// Assemble the chain whose first block sits at `offset`.
    pub fn read_chain(&mut self, offset: u32) -> Result<BlockChain> {
        let start = self.read_block(offset)?;
        self.assemble(start)
    }

    pub fn root_chain(&mut self) -> Result<BlockChain> {
        self.read_chain(self.header.root_offset)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read + Seek> BlockSource for DatFile<R> {
    fn header(&self) -> &Header {
        &self.header
    }

    fn read_block(&mut self, offset: u32) -> Result<Block> {
        DatFile::read_block(self, offset)
    }
}

// ── Path-based entry points ──────────────────────────────────────────────────

/// Read and decode the header of the file at `path`.  Does not validate.
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<Header> {
    Header::from_file(path)
}

/// Read one block of `block_size` bytes at `offset`.  `block_size` should
/// come from a header read earlier from the same file.
pub fn read_block<P: AsRef<Path>>(path: P, offset: u32, block_size: u32) -> Result<Block> {
    let path = path.as_ref();
    let mut block = Block::read(File::open(path)?, offset, block_size)?;
    block.source = Some(path.to_owned());
    Ok(block)
}

/// Assemble the chain starting at `start`, following links into the file
/// `start` was read from.  The header is parsed once for the whole walk and
/// not validated, so a chain can still be pulled out of a file whose free
/// list is damaged.
pub fn assemble_chain(start: &Block) -> Result<BlockChain> {
    if start.is_terminal() {
        return BlockChain::assemble([Ok(start.clone())]);
    }
    let path = start.source
        .as_deref()
        .ok_or(DatError::Detached { offset: start.offset })?;
    let opts = OpenOptions { validate_header: false, ..OpenOptions::default() };
    let mut dat = DatFile::open_with(path, opts)?;
    dat.assemble(start.clone())
}
