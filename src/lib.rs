pub mod error;
pub mod header;
pub mod block;
pub mod chain;
pub mod dat_file;

pub use error::{DatError, Result};
pub use header::{Header, ValidityError, HEADER_MAGIC, HEADER_OFFSET, HEADER_SIZE};
pub use block::Block;
pub use chain::{BlockChain, BlockSource, ChainWalker, TraversalError, TraversalLimits};
pub use dat_file::{DatFile, OpenOptions, assemble_chain, read_block, read_header};
