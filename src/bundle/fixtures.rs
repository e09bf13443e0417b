//! Synthetic firmware images for tests.
//!
//! Builders assemble byte-exact bundle and package images with valid
//! header and table checksums, so tests can corrupt a single byte and
//! assert on the precise failure.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::io::ReadAt;

use super::structures::{
    BundleHeader, FileEntry, HEADER_CHECKSUM_OFFSET, PackageEntry, PackageHeader, crc32,
};

/// In-memory `ReadAt` source.
pub(crate) struct MemReader(Vec<u8>);

impl MemReader {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self(data)
    }
}

#[async_trait]
impl ReadAt for MemReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let len = self.0.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let n = buf.len().min((len - offset) as usize);
        buf[..n].copy_from_slice(&self.0[offset as usize..offset as usize + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.0.len() as u64
    }
}

fn put_cstring(buf: &mut [u8], offset: usize, s: &str) {
    buf[offset..offset + s.len()].copy_from_slice(s.as_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Compute and store the header checksum over the finished buffer.
fn finish_header(buf: &mut [u8]) {
    buf[HEADER_CHECKSUM_OFFSET..HEADER_CHECKSUM_OFFSET + 4].fill(0);
    let crc = crc32(buf);
    put_u32(buf, HEADER_CHECKSUM_OFFSET, crc);
}

/// A bundle header with a valid checksum.
pub(crate) fn bundle_header_bytes(name: &str, entries: u32, table_checksum: u32) -> Vec<u8> {
    let mut buf = vec![0u8; BundleHeader::SIZE];
    put_u32(&mut buf, 0, BundleHeader::MAGIC);
    buf[4..6].copy_from_slice(&2u16.to_le_bytes()); // version 2.0
    put_u32(&mut buf, 8, BundleHeader::SIZE as u32);
    put_u32(&mut buf, 16, entries);
    put_u32(&mut buf, 20, table_checksum);
    put_u32(&mut buf, 24, 1_600_000_000); // 2020-09-13T12:26:40Z
    put_cstring(&mut buf, 32, "2507052_043290");
    put_cstring(&mut buf, 288, "Hewlett-Packard");
    put_cstring(&mut buf, 544, name);
    put_cstring(&mut buf, 809, "4.5.0.1");
    put_cstring(&mut buf, 1065, "CLS");
    finish_header(&mut buf);
    buf
}

/// A package header with a valid checksum.
pub(crate) fn package_header_bytes(
    name: &str,
    uuid: Uuid,
    entries: u32,
    table_checksum: u32,
) -> Vec<u8> {
    let mut buf = vec![0u8; PackageHeader::SIZE];
    put_u32(&mut buf, 0, PackageHeader::MAGIC);
    buf[4..6].copy_from_slice(&1u16.to_le_bytes()); // version 1.0
    put_u32(&mut buf, 8, PackageHeader::SIZE as u32);
    put_u32(&mut buf, 16, entries);
    put_u32(&mut buf, 20, table_checksum);
    put_u32(&mut buf, 24, 1_600_000_000);
    put_cstring(&mut buf, 32, "2507052_043290");
    put_cstring(&mut buf, 288, "Hewlett-Packard");
    put_cstring(&mut buf, 544, name);
    buf[800..816].copy_from_slice(&uuid.to_bytes_le());
    buf[816] = 0x7F; // matches the constant observed in real images
    put_cstring(&mut buf, 829, "firmware package");
    finish_header(&mut buf);
    buf
}

#[derive(Clone)]
pub(crate) struct FileSpec {
    pub name: String,
    pub data: Vec<u8>,
}

impl FileSpec {
    pub(crate) fn new(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            data: data.to_vec(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct PackageSpec {
    pub name: String,
    pub files: Vec<FileSpec>,
}

impl PackageSpec {
    pub(crate) fn new(name: &str, files: &[FileSpec]) -> Self {
        Self {
            name: name.to_string(),
            files: files.to_vec(),
        }
    }
}

/// A complete package image: header, file table, data blobs.
pub(crate) fn package_image(spec: &PackageSpec) -> Vec<u8> {
    let data_start = PackageHeader::SIZE + spec.files.len() * FileEntry::SIZE;

    let mut table = vec![0u8; spec.files.len() * FileEntry::SIZE];
    let mut cursor = data_start as u64;
    for (i, file) in spec.files.iter().enumerate() {
        let rec = &mut table[i * FileEntry::SIZE..(i + 1) * FileEntry::SIZE];
        put_cstring(rec, 0, &file.name);
        put_u64(rec, 0x100, cursor);
        put_u64(rec, 0x108, file.data.len() as u64);
        put_u32(rec, 0x110, crc32(&file.data));
        cursor += file.data.len() as u64;
    }

    let uuid = Uuid::from_u128(u128::from(crc32(spec.name.as_bytes())));
    let mut image = package_header_bytes(&spec.name, uuid, spec.files.len() as u32, crc32(&table));
    image.extend_from_slice(&table);
    for file in &spec.files {
        image.extend_from_slice(&file.data);
    }
    image
}

/// A complete bundle image.
///
/// Packages are laid out back to back, `gap` zero bytes after the package
/// table; `signature` text, if given, trails the last package.
pub(crate) fn bundle_image(
    name: &str,
    specs: &[PackageSpec],
    gap: usize,
    signature: Option<&str>,
) -> Vec<u8> {
    let images: Vec<Vec<u8>> = specs.iter().map(package_image).collect();

    let mut table = vec![0u8; specs.len() * PackageEntry::SIZE];
    let mut offset = (BundleHeader::SIZE + table.len() + gap) as u64;
    for (i, image) in images.iter().enumerate() {
        let rec = &mut table[i * PackageEntry::SIZE..(i + 1) * PackageEntry::SIZE];
        put_u64(rec, 0, offset);
        put_u64(rec, 8, image.len() as u64);
        offset += image.len() as u64;
    }

    let mut bundle = bundle_header_bytes(name, specs.len() as u32, crc32(&table));
    bundle.extend_from_slice(&table);
    bundle.extend_from_slice(&vec![0u8; gap]);
    for image in &images {
        bundle.extend_from_slice(image);
    }
    if let Some(text) = signature {
        bundle.extend_from_slice(text.as_bytes());
    }
    bundle
}
