mod http;
mod local;

pub use http::HttpRangeReader;
pub use local::LocalFileReader;

use crate::error::Result;
use async_trait::async_trait;
use std::io;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Fill the buffer completely, erroring on a short read.
    ///
    /// Container decoding depends on fixed-size records, so a source that
    /// runs out of bytes mid-record is a hard error, not a partial result.
    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut read = 0;
        while read < buf.len() {
            let n = self.read_at(offset + read as u64, &mut buf[read..]).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("short read at offset {}", offset + read as u64),
                )
                .into());
            }
            read += n;
        }
        Ok(())
    }
}
