//! Error types and the related `Result<T>`

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// An error from underlying I/O
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// A record's signature didn't match what the format requires.
    #[error("Invalid archive: {0}")]
    InvalidArchive(&'static str),

    /// The input ended before a record could be fully read.
    #[error("Truncated input: expected {0} more bytes")]
    Truncated(&'static str),

    /// Decoding a file name as UTF-8 failed.
    #[error("Invalid UTF-8 in {0}")]
    Encoding(&'static str, #[source] std::str::Utf8Error),

    /// A central-directory entry had no matching local section, or vice versa.
    #[error("Unpaired entry {0:?} between local section and central directory")]
    UnpairedEntry(String),

    /// Two entries in the same archive claimed the same file name.
    #[error("Duplicate entry for {0:?}")]
    DuplicateEntry(String),

    /// A patch directive referenced a delta or compression engine id
    /// that isn't registered.
    #[error("Unknown {kind} engine id {id}")]
    UnknownEngine { kind: &'static str, id: u32 },

    /// The patch stream declared a `patchVersion` this core doesn't understand.
    #[error("Unsupported patch version {0}")]
    UnsupportedPatchVersion(u32),

    /// The patch stream's first directive wasn't BEGIN.
    #[error("Patch stream didn't start with a BEGIN directive")]
    MissingBegin,

    /// A patch directive carried a tag byte that isn't one of the five
    /// known commands.
    #[error("Unknown patch directive tag {0}")]
    UnknownDirectiveTag(u8),

    /// The archive was mutated, or finalized-state was otherwise violated.
    #[error("Illegal state: {0}")]
    IllegalState(&'static str),

    /// A 64-bit length or offset didn't fit in this platform's `usize`.
    #[error("Value too large for this platform's address space")]
    InsufficientAddressSpace,
}
