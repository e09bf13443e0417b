//! # hpfw
//!
//! An HP firmware bundle inspection and extraction utility.
//!
//! This library decodes the firmware distribution format used by HP
//! networked printing devices: a bundle container embedding multiple
//! package sub-containers at byte offsets within the same file, each
//! package embedding individually named file entries, with an optional
//! trailing plain-text signature block. Remote bundles are read over HTTP
//! Range requests, so inspecting a multi-gigabyte image only transfers the
//! headers and tables it actually touches.
//!
//! ## Features
//!
//! - Decode and validate bundle and package headers (CRC32 checksummed)
//! - Stream-extract embedded files without buffering them in memory
//! - Verify per-file CRC32 checksums during or instead of extraction
//! - Parse the trailing signed-file fingerprint block
//! - Read bundles from the local filesystem or HTTP/HTTPS URLs
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use hpfw::{BundleExtractor, LocalFileReader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let reader = Arc::new(LocalFileReader::new(Path::new("firmware.bdl"))?);
//!     let extractor = BundleExtractor::new(reader);
//!
//!     // List every package in the bundle
//!     let bundle = extractor.read_bundle().await?;
//!     for entry in &bundle.packages {
//!         let package = extractor.open_package(entry).await?;
//!         println!("{} ({} files)", package.name(), package.files().len());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod bundle;
pub mod cli;
pub mod error;
pub mod io;

pub use bundle::{
    Bundle, BundleExtractor, BundleHeader, BundleParser, ExtractOptions, ExtractSummary,
    FileEntry, PackageEntry, PackageHeader, PackageParser, PackageReader, Signature, Version,
};
pub use cli::Cli;
pub use error::{Error, Result};
pub use io::{HttpRangeReader, LocalFileReader, ReadAt};
