//! Low-level firmware container parser.
//!
//! This module handles the binary parsing of bundle and package
//! structures, reading from any source that implements the [`ReadAt`]
//! trait.
//!
//! ## Parsing Strategy
//!
//! Both container kinds are read from the front:
//! 1. Decode the fixed-size header at the container's base offset and
//!    validate its checksum
//! 2. Decode the entry table at the declared header size and validate it
//!    against the table checksum before trusting a single record
//! 3. For a bundle, interpret each entry as the absolute byte range of an
//!    embedded package; for a package, as the base-relative range of one
//!    extractable file
//! 4. Optionally parse the trailing signature block after the last package
//!
//! A package is not a separate file: it is decoded at a base offset inside
//! its parent bundle, and every offset it declares is translated by that
//! base. The file handle is shared, never duplicated; all reads are
//! positional, so sibling packages can be decoded concurrently.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::io::ReadAt;

use super::signature::Signature;
use super::structures::*;

/// A fully decoded bundle directory: header, package table, and the
/// optional trailing signature.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub header: BundleHeader,
    pub packages: Vec<PackageEntry>,
    pub signature: Option<Signature>,
}

/// Validate an entry table buffer against its stored checksum.
///
/// Runs before any record is decoded; an empty table is valid only if the
/// stored checksum equals the CRC32 of the empty buffer.
fn validate_table(data: &[u8], stored: u32, what: &'static str, offset: u64) -> Result<()> {
    let computed = crc32(data);
    if computed != stored {
        return Err(Error::Checksum {
            what,
            offset,
            stored,
            computed,
        });
    }
    Ok(())
}

/// Low-level bundle parser.
///
/// Reads and validates the top-level container structures from a data
/// source. Generic over the reader type to support both local files and
/// HTTP sources.
///
/// ## Usage
///
/// Typically used through [`BundleExtractor`](super::BundleExtractor)
/// rather than directly.
pub struct BundleParser<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
}

impl<R: ReadAt> BundleParser<R> {
    /// Create a new parser for the given reader.
    pub fn new(reader: Arc<R>) -> Self {
        Self { reader }
    }

    /// Read and validate the bundle header at the start of the file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] if the magic does not match, or
    /// [`Error::Checksum`] if the stored header checksum does not cover
    /// the header bytes.
    pub async fn read_header(&self) -> Result<BundleHeader> {
        let mut buf = vec![0u8; BundleHeader::SIZE];
        self.reader.read_exact_at(0, &mut buf).await?;
        BundleHeader::from_bytes(&buf)
    }

    /// Read and validate the package table.
    ///
    /// The table sits at the header's declared `header_size` and holds
    /// `table_entries` fixed-size records describing embedded packages.
    /// Records are returned strictly in table order; that order is
    /// authoritative.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Checksum`] if the raw table bytes do not match the
    /// stored table checksum, and [`Error::Format`] if the table or any
    /// entry's declared range extends past the end of the file.
    pub async fn read_entries(&self, header: &BundleHeader) -> Result<Vec<PackageEntry>> {
        let table_offset = u64::from(header.header_size);
        let length = PackageEntry::SIZE * header.table_entries as usize;
        let file_size = self.reader.size();

        if table_offset + length as u64 > file_size {
            return Err(Error::format(format!(
                "package table extends beyond end of file ({} + {length} > {file_size})",
                table_offset
            )));
        }

        let mut buf = vec![0u8; length];
        self.reader.read_exact_at(table_offset, &mut buf).await?;
        validate_table(&buf, header.table_checksum, "package table", table_offset)?;

        let mut entries = Vec::with_capacity(header.table_entries as usize);
        for rec in buf.chunks_exact(PackageEntry::SIZE) {
            entries.push(PackageEntry::from_bytes(rec)?);
        }

        for (index, entry) in entries.iter().enumerate() {
            let in_bounds = entry
                .offset
                .checked_add(entry.length)
                .is_some_and(|end| end <= file_size);
            if !in_bounds {
                return Err(Error::format(format!(
                    "package {index} range {}..+{} exceeds file size {file_size}",
                    entry.offset, entry.length
                )));
            }
        }

        Ok(entries)
    }

    /// Parse the signature block trailing the last package, if any.
    ///
    /// The block occupies the bytes from the end of the last package's
    /// declared range to the end of the file. No trailing bytes (or no
    /// packages at all) is not an error; the signature is simply absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] if trailing bytes exist but do not form a
    /// well-formed signature block.
    pub async fn read_signature(&self, packages: &[PackageEntry]) -> Result<Option<Signature>> {
        let Some(last) = packages.last() else {
            return Ok(None);
        };

        let end_of_data = last.offset + last.length;
        let file_size = self.reader.size();
        if end_of_data >= file_size {
            return Ok(None);
        }

        let mut buf = vec![0u8; (file_size - end_of_data) as usize];
        self.reader.read_exact_at(end_of_data, &mut buf).await?;

        Signature::parse(&String::from_utf8_lossy(&buf)).map(Some)
    }

    /// Decode the complete bundle directory in one call.
    pub async fn read_bundle(&self) -> Result<Bundle> {
        let header = self.read_header().await?;
        let packages = self.read_entries(&header).await?;
        let signature = self.read_signature(&packages).await?;
        Ok(Bundle {
            header,
            packages,
            signature,
        })
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}

/// Low-level package parser, anchored at a base offset inside the
/// enclosing file.
///
/// Every offset the package declares - its entry table position and each
/// file's byte range - is interpreted relative to this base. A standalone
/// `.ipkg` file is simply a package with base 0.
pub struct PackageParser<R: ReadAt> {
    reader: Arc<R>,
    base: u64,
}

impl<R: ReadAt> PackageParser<R> {
    /// Create a parser for the package starting at `base`.
    pub fn new(reader: Arc<R>, base: u64) -> Self {
        Self { reader, base }
    }

    /// The package's absolute offset within the enclosing file.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Read and validate the package header at the base offset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] on a magic mismatch or [`Error::Checksum`]
    /// on a header checksum mismatch.
    pub async fn read_header(&self) -> Result<PackageHeader> {
        let mut buf = vec![0u8; PackageHeader::SIZE];
        self.reader.read_exact_at(self.base, &mut buf).await?;
        PackageHeader::from_bytes(&buf, self.base)
    }

    /// Read and validate the file table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Checksum`] on a table checksum mismatch, and
    /// [`Error::Format`] if the table or any file's base-translated range
    /// extends past the end of the file.
    pub async fn read_entries(&self, header: &PackageHeader) -> Result<Vec<FileEntry>> {
        let table_offset = self.base + u64::from(header.header_size);
        let length = FileEntry::SIZE * header.table_entries as usize;
        let file_size = self.reader.size();

        if table_offset + length as u64 > file_size {
            return Err(Error::format(format!(
                "file table extends beyond end of file ({table_offset} + {length} > {file_size})"
            )));
        }

        let mut buf = vec![0u8; length];
        self.reader.read_exact_at(table_offset, &mut buf).await?;
        validate_table(&buf, header.table_checksum, "file table", table_offset)?;

        let mut entries = Vec::with_capacity(header.table_entries as usize);
        for rec in buf.chunks_exact(FileEntry::SIZE) {
            entries.push(FileEntry::from_bytes(rec)?);
        }

        for entry in &entries {
            let in_bounds = self
                .base
                .checked_add(entry.offset)
                .and_then(|start| start.checked_add(entry.length))
                .is_some_and(|end| end <= file_size);
            if !in_bounds {
                return Err(Error::format(format!(
                    "file {:?} range {}..+{} exceeds file size {file_size}",
                    entry.name, entry.offset, entry.length
                )));
            }
        }

        Ok(entries)
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}
