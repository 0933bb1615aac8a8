//! Error taxonomy shared by every reader in the crate.
//!
//! | Kind        | Variant                  | Raised by                              |
//! |-------------|--------------------------|----------------------------------------|
//! | Decode      | [`DatError::Truncated`]  | header / block reads that come up short |
//! | Validity    | [`DatError::Validity`]   | explicit header checks only            |
//! | Traversal   | [`DatError::Traversal`]  | chain walking (cycles, wild links)     |
//!
//! Nothing is retried or substituted with a default.  Callers decide per kind
//! whether to abort or skip the affected file or chain.

use std::io;
use thiserror::Error;

use crate::chain::TraversalError;
use crate::header::ValidityError;

#[derive(Error, Debug)]
pub enum DatError {
    /// Fewer bytes were available than a fixed-width structure needs.
    #[error("Truncated {what} at offset {offset:#x}: needed {needed} bytes, found {available}")]
    Truncated {
        what:      &'static str,
        offset:    u64,
        needed:    usize,
        available: usize,
    },
    #[error("Invalid header: {0}")]
    Validity(#[from] ValidityError),
    #[error("Chain traversal aborted: {0}")]
    Traversal(#[from] TraversalError),
    /// The block was decoded from a detached blob and has no file to follow
    /// its links into.
    #[error("Block at offset {offset:#x} has no source file")]
    Detached { offset: u32 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DatError {
    /// True for the decode kind (short header or block).
    pub fn is_decode(&self) -> bool {
        matches!(self, DatError::Truncated { .. })
    }

    pub fn is_traversal(&self) -> bool {
        matches!(self, DatError::Traversal(_))
    }
}

pub type Result<T> = std::result::Result<T, DatError>;
