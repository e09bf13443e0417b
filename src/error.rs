//! Library-wide error and result types.

use std::io;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the container decoder can produce.
///
/// Every error is fatal to the decode step that raised it; nothing is
/// retried or recovered internally.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The data does not have the expected structure: wrong magic, a
    /// truncated header, an entry range beyond the end of the file, or a
    /// malformed signature block.
    #[error("format error: {0}")]
    Format(String),

    /// A stored CRC32 did not match the one computed over the raw bytes.
    ///
    /// `what` names the checksummed region, `offset` is its absolute
    /// position in the file.
    #[error(
        "{what} checksum mismatch at offset {offset:#x}: stored {stored:#010x}, computed {computed:#010x}"
    )]
    Checksum {
        what: &'static str,
        offset: u64,
        stored: u32,
        computed: u32,
    },

    /// An underlying read or write failed. Network failures from the HTTP
    /// reader surface here as well.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }
}
