use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;

use crate::error::{Error, Result};
use crate::io::ReadAt;

use super::parser::{Bundle, BundleParser, PackageParser};
use super::structures::{FileEntry, PackageEntry, PackageHeader};

/// Copy granularity for streaming extraction. Firmware images run into the
/// gigabytes, so ranges are never materialized whole.
const CHUNK_SIZE: usize = 1024 * 1024;

/// Extraction behavior switches.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Recompute each file's CRC32 while copying and fail on mismatch.
    pub verify: bool,
    /// Suppress per-file progress output.
    pub quiet: bool,
    /// Overwrite existing files without asking.
    pub overwrite: bool,
    /// Never overwrite existing files, skip silently.
    pub never_overwrite: bool,
}

/// Totals reported by a whole-bundle extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractSummary {
    pub packages: usize,
    pub files: usize,
    pub bytes: u64,
}

/// Copy `[start, start + length)` from the reader to a new file on disk,
/// creating parent directories as needed.
///
/// Returns the CRC32 of the copied bytes, computed incrementally while
/// streaming. Partial output on failure is left in place for the caller to
/// deal with.
pub(crate) async fn copy_range<R: ReadAt + ?Sized>(
    reader: &R,
    start: u64,
    length: u64,
    path: &Path,
) -> Result<u32> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut file = fs::File::create(path).await?;
    let mut crc = flate2::Crc::new();
    let mut buf = vec![0u8; CHUNK_SIZE.min(length.try_into().unwrap_or(CHUNK_SIZE))];

    let mut pos = start;
    let mut remaining = length;
    while remaining > 0 {
        let n = remaining.min(CHUNK_SIZE as u64) as usize;
        reader.read_exact_at(pos, &mut buf[..n]).await?;
        crc.update(&buf[..n]);
        file.write_all(&buf[..n]).await?;
        pos += n as u64;
        remaining -= n as u64;
    }

    file.flush().await?;
    Ok(crc.sum())
}

/// Compute the CRC32 of `[start, start + length)` with the same chunked
/// reads as [`copy_range`], without writing anything.
pub(crate) async fn crc_range<R: ReadAt + ?Sized>(
    reader: &R,
    start: u64,
    length: u64,
) -> Result<u32> {
    let mut crc = flate2::Crc::new();
    let mut buf = vec![0u8; CHUNK_SIZE.min(length.try_into().unwrap_or(CHUNK_SIZE))];

    let mut pos = start;
    let mut remaining = length;
    while remaining > 0 {
        let n = remaining.min(CHUNK_SIZE as u64) as usize;
        reader.read_exact_at(pos, &mut buf[..n]).await?;
        crc.update(&buf[..n]);
        pos += n as u64;
        remaining -= n as u64;
    }

    Ok(crc.sum())
}

/// Skip-or-write decision for an existing destination path.
fn should_write(path: &Path, name: &str, opts: &ExtractOptions) -> bool {
    if !path.exists() {
        return true;
    }
    if opts.never_overwrite {
        if !opts.quiet {
            eprintln!("Skipping: {name} (file exists)");
        }
        return false;
    }
    if !opts.overwrite {
        if !opts.quiet {
            eprintln!("Skipping: {name} (use -o to overwrite)");
        }
        return false;
    }
    true
}

/// A package opened at its base offset, with header and file table decoded
/// and validated.
pub struct PackageReader<R: ReadAt> {
    parser: PackageParser<R>,
    header: PackageHeader,
    files: Vec<FileEntry>,
}

impl<R: ReadAt> PackageReader<R> {
    /// Decode the package anchored at `base` within the shared reader.
    pub async fn open(reader: Arc<R>, base: u64) -> Result<Self> {
        let parser = PackageParser::new(reader, base);
        let header = parser.read_header().await?;
        let files = parser.read_entries(&header).await?;
        Ok(Self {
            parser,
            header,
            files,
        })
    }

    pub fn header(&self) -> &PackageHeader {
        &self.header
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    /// The package's absolute offset within the enclosing file.
    pub fn base(&self) -> u64 {
        self.parser.base()
    }

    /// Extract every file entry into `dir`, in table order.
    ///
    /// Entry names are used verbatim as file names; extracting a bundle
    /// from an untrusted source should sanitize names first.
    ///
    /// Returns the number of files written and the total bytes copied.
    pub async fn extract_to(&self, dir: &Path, opts: &ExtractOptions) -> Result<(usize, u64)> {
        fs::create_dir_all(dir).await?;

        let mut files = 0;
        let mut bytes = 0;
        for entry in &self.files {
            let path = dir.join(&entry.name);
            if !should_write(&path, &entry.name, opts) {
                continue;
            }
            if !opts.quiet {
                println!("  extracting: {}/{}", self.header.name, entry.name);
            }

            let start = self.base() + entry.offset;
            let crc = copy_range(self.parser.reader().as_ref(), start, entry.length, &path).await?;
            if opts.verify && crc != entry.checksum {
                return Err(Error::Checksum {
                    what: "file data",
                    offset: start,
                    stored: entry.checksum,
                    computed: crc,
                });
            }

            files += 1;
            bytes += entry.length;
        }

        Ok((files, bytes))
    }

    /// Compute the CRC32 over a file entry's byte range without extracting
    /// it, for comparison against the entry's stored checksum.
    pub async fn checksum_file(&self, entry: &FileEntry) -> Result<u32> {
        crc_range(
            self.parser.reader().as_ref(),
            self.base() + entry.offset,
            entry.length,
        )
        .await
    }

    /// Stream a file entry's bytes to stdout.
    pub async fn extract_to_stdout(&self, entry: &FileEntry) -> Result<()> {
        let mut stdout = tokio::io::stdout();
        let mut buf = vec![0u8; CHUNK_SIZE.min(entry.length.try_into().unwrap_or(CHUNK_SIZE))];

        let mut pos = self.base() + entry.offset;
        let mut remaining = entry.length;
        while remaining > 0 {
            let n = remaining.min(CHUNK_SIZE as u64) as usize;
            self.parser
                .reader()
                .read_exact_at(pos, &mut buf[..n])
                .await?;
            stdout.write_all(&buf[..n]).await?;
            pos += n as u64;
            remaining -= n as u64;
        }

        stdout.flush().await?;
        Ok(())
    }
}

/// High-level bundle extraction API.
pub struct BundleExtractor<R: ReadAt> {
    parser: BundleParser<R>,
}

impl<R: ReadAt> BundleExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: BundleParser::new(reader),
        }
    }

    /// Decode the bundle directory: header, package table, signature.
    pub async fn read_bundle(&self) -> Result<Bundle> {
        self.parser.read_bundle().await
    }

    /// Open the package a bundle entry points at.
    pub async fn open_package(&self, entry: &PackageEntry) -> Result<PackageReader<R>> {
        PackageReader::open(self.parser.reader().clone(), entry.offset).await
    }

    /// Extract the whole bundle: every package becomes a subdirectory of
    /// `dest` named from its header, holding its file entries.
    ///
    /// Packages occupy independent byte ranges and write to independent
    /// directories, so they are extracted concurrently, one task per
    /// package. Failures abort the remaining tasks; files already written
    /// stay on disk.
    pub async fn extract_to(&self, dest: &Path, opts: &ExtractOptions) -> Result<ExtractSummary>
    where
        R: 'static,
    {
        let bundle = self.read_bundle().await?;
        fs::create_dir_all(dest).await?;

        let mut tasks = JoinSet::new();
        for entry in bundle.packages {
            let reader = self.parser.reader().clone();
            let dest = dest.to_path_buf();
            let opts = opts.clone();
            tasks.spawn(async move {
                let package = PackageReader::open(reader, entry.offset).await?;
                let dir = dest.join(package.name());
                let (files, bytes) = package.extract_to(&dir, &opts).await?;
                Ok::<_, Error>((files, bytes))
            });
        }

        let mut summary = ExtractSummary::default();
        while let Some(joined) = tasks.join_next().await {
            let (files, bytes) = joined.map_err(|e| Error::Io(std::io::Error::other(e)))??;
            summary.packages += 1;
            summary.files += files;
            summary.bytes += bytes;
        }

        Ok(summary)
    }

    /// Extract each embedded package as a raw `.pkg` file in `dest`,
    /// leaving the sub-containers intact instead of unpacking them.
    pub async fn extract_packages_to(
        &self,
        dest: &Path,
        opts: &ExtractOptions,
    ) -> Result<ExtractSummary> {
        let bundle = self.read_bundle().await?;
        fs::create_dir_all(dest).await?;

        let mut summary = ExtractSummary::default();
        for entry in &bundle.packages {
            let parser = PackageParser::new(self.parser.reader().clone(), entry.offset);
            let header = parser.read_header().await?;

            let name = format!("{}.pkg", header.name);
            let path = dest.join(&name);
            if !should_write(&path, &name, opts) {
                continue;
            }
            if !opts.quiet {
                println!("  extracting: {name}");
            }

            copy_range(
                self.parser.reader().as_ref(),
                entry.offset,
                entry.length,
                &path,
            )
            .await?;

            summary.packages += 1;
            summary.files += 1;
            summary.bytes += entry.length;
        }

        Ok(summary)
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        self.parser.reader()
    }
}
