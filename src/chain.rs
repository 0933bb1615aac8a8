//! Chain walking and assembly.
//!
//! A chain is a singly linked list of blocks: each block's
//! `next_block_offset` names its successor and zero ends the list.
//! [`ChainWalker`] follows the links lazily, one block read per element, and
//! [`BlockChain::assemble`] folds the walk into one contiguous buffer.
//!
//! # Traversal limits
//! Links come straight from disk.  A corrupt file can point a link back at an
//! earlier block (a cycle) or past the end of the file.  [`TraversalLimits`]
//! controls which of these are checked:
//!
//! | Check           | Failure                              |
//! |-----------------|--------------------------------------|
//! | `detect_cycles` | [`TraversalError::Cycle`]            |
//! | `check_bounds`  | [`TraversalError::LinkOutOfBounds`]  |
//! | `max_blocks`    | [`TraversalError::TooManyBlocks`]    |
//!
//! [`TraversalLimits::unchecked`] disables all three, in which case a cyclic
//! chain never terminates.

use std::collections::HashSet;
use thiserror::Error;

use crate::block::Block;
use crate::error::Result;
use crate::header::Header;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraversalError {
    #[error("Link revisits block at offset {offset:#x}")]
    Cycle { offset: u32 },
    #[error("Link to {offset:#x} (+{block_size:#x}) runs past file size {file_size:#x}")]
    LinkOutOfBounds { offset: u32, block_size: u32, file_size: u32 },
    #[error("Chain exceeds {limit} blocks")]
    TooManyBlocks { limit: usize },
}

// ── Limits ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalLimits {
    pub detect_cycles: bool,
    pub check_bounds:  bool,
    /// `None` means no cap.
    pub max_blocks:    Option<usize>,
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self { detect_cycles: true, check_bounds: true, max_blocks: None }
    }
}

impl TraversalLimits {
    /// All checks on, capped at the number of distinct blocks `header` allows.
    pub fn for_header(header: &Header) -> Self {
        Self {
            max_blocks: Some((header.max_blocks() as usize).max(1)),
            ..Self::default()
        }
    }

    /// Follow links blindly.
    pub fn unchecked() -> Self {
        Self { detect_cycles: false, check_bounds: false, max_blocks: None }
    }
}

// ── Block source ─────────────────────────────────────────────────────────────

/// Anything that can hand out blocks of one file by offset.
pub trait BlockSource {
    fn header(&self) -> &Header;
    fn read_block(&mut self, offset: u32) -> Result<Block>;
}

// ── Walker ───────────────────────────────────────────────────────────────────

enum WalkState {
    Start(Block),
    Next(u32),
    Done,
}

/// Forward-only iterator over the blocks of one chain.
///
/// The start block is yielded as given; every later element costs exactly one
/// block read.  After the terminal block or the first error the walker is
/// exhausted.  To walk again, build a new walker from the start block.
pub struct ChainWalker<'a, S: BlockSource + ?Sized> {
    source:  &'a mut S,
    state:   WalkState,
    limits:  TraversalLimits,
    visited: HashSet<u32>,
    yielded: usize,
}

impl<'a, S: BlockSource + ?Sized> ChainWalker<'a, S> {
    pub fn new(source: &'a mut S, start: Block, limits: TraversalLimits) -> Self {
        Self {
            source,
            state: WalkState::Start(start),
            limits,
            visited: HashSet::new(),
            yielded: 0,
        }
    }

    /// Number of blocks yielded so far.
    pub fn visited_count(&self) -> usize {
        self.yielded
    }

    fn check_link(&self, offset: u32) -> std::result::Result<(), TraversalError> {
        if self.limits.detect_cycles && self.visited.contains(&offset) {
            return Err(TraversalError::Cycle { offset });
        }
        if self.limits.check_bounds {
            let header = self.source.header();
            let end = offset as u64 + header.block_size as u64;
            if end > header.file_size as u64 {
                return Err(TraversalError::LinkOutOfBounds {
                    offset,
                    block_size: header.block_size,
                    file_size:  header.file_size,
                });
            }
        }
        Ok(())
    }

    fn fetch(&mut self, offset: u32) -> Result<Block> {
        self.check_link(offset)?;
        self.source.read_block(offset)
    }

    fn accept(&mut self, block: Block) -> Result<Block> {
        if let Some(limit) = self.limits.max_blocks {
            if self.yielded >= limit {
                return Err(TraversalError::TooManyBlocks { limit }.into());
            }
        }
        if self.limits.detect_cycles {
            self.visited.insert(block.offset);
        }
        self.yielded += 1;
        self.state = if block.is_terminal() {
            WalkState::Done
        } else {
            WalkState::Next(block.next_block_offset)
        };
        Ok(block)
    }
}

impl<S: BlockSource + ?Sized> Iterator for ChainWalker<'_, S> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let step = match std::mem::replace(&mut self.state, WalkState::Done) {
            WalkState::Done          => return None,
            WalkState::Start(block)  => self.accept(block),
            WalkState::Next(offset)  => self.fetch(offset).and_then(|b| self.accept(b)),
        };
        if let Err(ref e) = step {
            tracing::warn!("chain walk stopped after {} block(s): {e}", self.yielded);
        }
        Some(step)
    }
}

// ── Assembly ─────────────────────────────────────────────────────────────────

/// A chain's payloads concatenated in link order.
///
/// `data` holds every visited block's full payload, including whatever unused
/// bytes trail the terminal block; trimming to a logical length is up to the
/// consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockChain {
    /// Sum of the visited blocks' physical sizes.
    pub size:        u64,
    pub data:        Vec<u8>,
    pub block_count: usize,
}

impl BlockChain {
    /// Drain `blocks` and concatenate their payloads.  The first error aborts
    /// assembly; no partial chain is returned.
    pub fn assemble<I>(blocks: I) -> Result<Self>
    where
        I: IntoIterator<Item = Result<Block>>,
    {
        let mut chain = BlockChain::default();
        for block in blocks {
            let block = block?;
            chain.size += block.size as u64;
            chain.data.extend_from_slice(&block.data);
            chain.block_count += 1;
        }
        Ok(chain)
    }
}

impl std::fmt::Display for BlockChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{size: {}, data: {}}}", self.size, hex::encode(&self.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DatError;
    use crate::header::HEADER_MAGIC;
    use std::collections::HashMap;

    /// In-memory source: blocks keyed by offset, reads counted.
    struct MapSource {
        header: Header,
        blocks: HashMap<u32, Block>,
        reads:  usize,
    }

    impl MapSource {
        fn new(block_size: u32, file_size: u32, links: &[(u32, u32)]) -> Self {
            let header = Header {
                magic:            HEADER_MAGIC,
                block_size,
                file_size,
                file_version:     1,
                file_version2:    0,
                first_free_block: 0,
                last_free_block:  0,
                free_block_count: 0,
                root_offset:      links[0].0,
            };
            let blocks = links
                .iter()
                .map(|&(offset, next)| {
                    let block = Block {
                        source:            None,
                        offset,
                        size:              block_size,
                        next_block_offset: next,
                        data:              vec![(offset >> 8) as u8; block_size as usize - 4],
                    };
                    (offset, block)
                })
                .collect();
            Self { header, blocks, reads: 0 }
        }

        fn start(&self) -> Block {
            self.blocks[&self.header.root_offset].clone()
        }
    }

    impl BlockSource for MapSource {
        fn header(&self) -> &Header {
            &self.header
        }

        fn read_block(&mut self, offset: u32) -> Result<Block> {
            self.reads += 1;
            self.blocks.get(&offset).cloned().ok_or(DatError::Truncated {
                what:      "block",
                offset:    offset as u64,
                needed:    self.header.block_size as usize,
                available: 0,
            })
        }
    }

    #[test]
    fn walks_until_zero_link_inclusive() {
        let mut src = MapSource::new(0x10, 0x1000, &[(0x100, 0x300), (0x300, 0x200), (0x200, 0)]);
        let start = src.start();
        let offsets: Vec<u32> = ChainWalker::new(&mut src, start, TraversalLimits::default())
            .map(|b| b.unwrap().offset)
            .collect();
        assert_eq!(offsets, vec![0x100, 0x300, 0x200]);
        assert_eq!(src.reads, 2);
    }

    #[test]
    fn single_terminal_block_needs_no_read() {
        let mut src = MapSource::new(0x10, 0x1000, &[(0x100, 0)]);
        let start = src.start();
        let chain = BlockChain::assemble(ChainWalker::new(&mut src, start.clone(), TraversalLimits::default())).unwrap();
        assert_eq!(chain.size, 0x10);
        assert_eq!(chain.data, start.data);
        assert_eq!(chain.block_count, 1);
        assert_eq!(src.reads, 0);
    }

    #[test]
    fn cycle_is_reported() {
        let mut src = MapSource::new(0x10, 0x1000, &[(0x100, 0x200), (0x200, 0x100)]);
        let start = src.start();
        let results: Vec<_> = ChainWalker::new(&mut src, start, TraversalLimits::default()).collect();
        assert_eq!(results.len(), 3);
        match &results[2] {
            Err(DatError::Traversal(TraversalError::Cycle { offset })) => assert_eq!(*offset, 0x100),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn self_link_is_a_cycle() {
        let mut src = MapSource::new(0x10, 0x1000, &[(0x100, 0x100)]);
        let start = src.start();
        let err = BlockChain::assemble(ChainWalker::new(&mut src, start, TraversalLimits::default())).unwrap_err();
        assert!(err.is_traversal());
    }

    #[test]
    fn out_of_bounds_link_is_reported_before_reading() {
        let mut src = MapSource::new(0x10, 0x1000, &[(0x100, 0xff8)]);
        let start = src.start();
        let err = BlockChain::assemble(ChainWalker::new(&mut src, start, TraversalLimits::default())).unwrap_err();
        match err {
            DatError::Traversal(TraversalError::LinkOutOfBounds { offset, block_size, file_size }) => {
                assert_eq!((offset, block_size, file_size), (0xff8, 0x10, 0x1000));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(src.reads, 0);
    }

    #[test]
    fn block_cap_stops_unchecked_cycle() {
        let mut src = MapSource::new(0x10, 0x1000, &[(0x100, 0x200), (0x200, 0x100)]);
        let start = src.start();
        let limits = TraversalLimits { max_blocks: Some(5), ..TraversalLimits::unchecked() };
        let results: Vec<_> = ChainWalker::new(&mut src, start, limits).collect();
        assert_eq!(results.len(), 6);
        assert!(results[..5].iter().all(|r| r.is_ok()));
        assert!(matches!(
            results[5],
            Err(DatError::Traversal(TraversalError::TooManyBlocks { limit: 5 }))
        ));
    }

    #[test]
    fn walker_is_fused_after_error() {
        let mut src = MapSource::new(0x10, 0x1000, &[(0x100, 0x400)]);
        let start = src.start();
        let mut walker = ChainWalker::new(&mut src, start, TraversalLimits::default());
        assert!(walker.next().unwrap().is_ok());
        assert!(walker.next().unwrap().unwrap_err().is_decode());
        assert!(walker.next().is_none());
        assert_eq!(walker.visited_count(), 1);
    }

    #[test]
    fn for_header_caps_at_distinct_block_count() {
        let src = MapSource::new(0x100, 0x1000, &[(0x100, 0)]);
        assert_eq!(TraversalLimits::for_header(&src.header).max_blocks, Some(0x10));
    }
}
