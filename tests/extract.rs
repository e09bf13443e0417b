//! End-to-end extraction tests against a synthetic firmware bundle built
//! on disk: three packages with valid header, table, and file checksums,
//! plus a trailing signature block.

use std::sync::Arc;

use hpfw::{
    BundleExtractor, BundleHeader, ExtractOptions, FileEntry, LocalFileReader, PackageEntry,
    PackageHeader, PackageReader, Signature,
};

fn crc32(data: &[u8]) -> u32 {
    let mut crc = flate2::Crc::new();
    crc.update(data);
    crc.sum()
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

/// Store the header checksum: CRC32 of the buffer with the 4 checksum
/// bytes at offset 12 zeroed.
fn finish_header(buf: &mut [u8]) {
    buf[12..16].fill(0);
    let crc = crc32(buf);
    put_u32(buf, 12, crc);
}

fn package_image(name: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
    let data_start = PackageHeader::SIZE + files.len() * FileEntry::SIZE;

    let mut table = vec![0u8; files.len() * FileEntry::SIZE];
    let mut cursor = data_start as u64;
    for (i, (file_name, data)) in files.iter().enumerate() {
        let rec = &mut table[i * FileEntry::SIZE..(i + 1) * FileEntry::SIZE];
        put_cstring(rec, 0, file_name);
        put_u64(rec, 0x100, cursor);
        put_u64(rec, 0x108, data.len() as u64);
        put_u32(rec, 0x110, crc32(data));
        cursor += data.len() as u64;
    }

    let mut header = vec![0u8; PackageHeader::SIZE];
    put_u32(&mut header, 0, PackageHeader::MAGIC);
    header[4..6].copy_from_slice(&1u16.to_le_bytes());
    put_u32(&mut header, 8, PackageHeader::SIZE as u32);
    put_u32(&mut header, 16, files.len() as u32);
    put_u32(&mut header, 20, crc32(&table));
    put_u32(&mut header, 24, 1_600_000_000);
    put_cstring(&mut header, 32, "2507052_043290");
    put_cstring(&mut header, 288, "Hewlett-Packard");
    put_cstring(&mut header, 544, name);
    header[800..816].copy_from_slice(&crc32(name.as_bytes()).to_le_bytes().repeat(4));
    finish_header(&mut header);

    let mut image = header;
    image.extend_from_slice(&table);
    for (_, data) in files {
        image.extend_from_slice(data);
    }
    image
}

fn bundle_image(
    name: &str,
    packages: &[(&str, &[(&str, &[u8])])],
    signature: Option<&str>,
) -> Vec<u8> {
    let images: Vec<Vec<u8>> = packages
        .iter()
        .map(|(pkg_name, files)| package_image(pkg_name, files))
        .collect();

    let mut table = vec![0u8; packages.len() * PackageEntry::SIZE];
    let mut offset = (BundleHeader::SIZE + table.len()) as u64;
    for (i, image) in images.iter().enumerate() {
        put_u64(&mut table, i * PackageEntry::SIZE, offset);
        put_u64(&mut table, i * PackageEntry::SIZE + 8, image.len() as u64);
        offset += image.len() as u64;
    }

    let mut header = vec![0u8; BundleHeader::SIZE];
    put_u32(&mut header, 0, BundleHeader::MAGIC);
    header[4..6].copy_from_slice(&2u16.to_le_bytes());
    put_u32(&mut header, 8, BundleHeader::SIZE as u32);
    put_u32(&mut header, 16, packages.len() as u32);
    put_u32(&mut header, 20, crc32(&table));
    put_u32(&mut header, 24, 1_600_000_000);
    put_cstring(&mut header, 32, "2507052_043290");
    put_cstring(&mut header, 288, "Hewlett-Packard");
    put_cstring(&mut header, 544, name);
    finish_header(&mut header);

    let mut bundle = header;
    bundle.extend_from_slice(&table);
    for image in &images {
        bundle.extend_from_slice(image);
    }
    if let Some(text) = signature {
        bundle.extend_from_slice(text.as_bytes());
    }
    bundle
}

const PACKAGES: &[(&str, &[(&str, &[u8])])] = &[
    ("Kernel", &[("uImage", b"kernel image payload")]),
    (
        "RootFs",
        &[
            ("rootfs.img", b"squashfs root filesystem"),
            ("build.info", b"release 2507052_043290"),
        ],
    ),
    ("AsianFonts", &[("fonts.pak", b"font archive bytes")]),
];

fn quiet() -> ExtractOptions {
    ExtractOptions {
        quiet: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn extracts_three_packages_byte_identically() {
    let dir = tempfile::tempdir().unwrap();
    let bundle_path = dir.path().join("firmware.bdl");
    std::fs::write(&bundle_path, bundle_image("TestFw", PACKAGES, None)).unwrap();

    let reader = Arc::new(LocalFileReader::new(&bundle_path).unwrap());
    let extractor = BundleExtractor::new(reader);

    let dest = dir.path().join("out");
    let summary = extractor.extract_to(&dest, &quiet()).await.unwrap();

    assert_eq!(summary.packages, 3);
    assert_eq!(summary.files, 4);

    for (pkg_name, files) in PACKAGES {
        let pkg_dir = dest.join(pkg_name);
        assert!(pkg_dir.is_dir(), "{pkg_name} directory missing");
        for (file_name, data) in *files {
            let written = std::fs::read(pkg_dir.join(file_name)).unwrap();
            assert_eq!(&written, data, "{pkg_name}/{file_name} content differs");
        }
    }
}

#[tokio::test]
async fn verify_mode_accepts_an_intact_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let bundle_path = dir.path().join("firmware.bdl");
    std::fs::write(&bundle_path, bundle_image("TestFw", PACKAGES, None)).unwrap();

    let reader = Arc::new(LocalFileReader::new(&bundle_path).unwrap());
    let extractor = BundleExtractor::new(reader);

    let opts = ExtractOptions {
        verify: true,
        quiet: true,
        ..Default::default()
    };
    let summary = extractor
        .extract_to(&dir.path().join("out"), &opts)
        .await
        .unwrap();
    assert_eq!(summary.files, 4);
}

#[tokio::test]
async fn parses_the_trailing_signature_block() {
    let signature = Signature {
        fingerprint_length: 256,
        key: "hp-2017".to_string(),
        hash: "sha256".to_string(),
        digest: "3q2+7w==".to_string(),
    };

    let dir = tempfile::tempdir().unwrap();
    let bundle_path = dir.path().join("firmware.bdl");
    std::fs::write(
        &bundle_path,
        bundle_image("SignedFw", PACKAGES, Some(&signature.to_string())),
    )
    .unwrap();

    let reader = Arc::new(LocalFileReader::new(&bundle_path).unwrap());
    let bundle = BundleExtractor::new(reader).read_bundle().await.unwrap();

    assert_eq!(bundle.header.name, "SignedFw");
    assert_eq!(bundle.signature, Some(signature));
}

#[tokio::test]
async fn split_packages_reopen_as_standalone_containers() {
    let dir = tempfile::tempdir().unwrap();
    let bundle_path = dir.path().join("firmware.bdl");
    let image = bundle_image("TestFw", PACKAGES, None);
    std::fs::write(&bundle_path, &image).unwrap();

    let reader = Arc::new(LocalFileReader::new(&bundle_path).unwrap());
    let extractor = BundleExtractor::new(reader);

    let dest = dir.path().join("pkgs");
    let summary = extractor.extract_packages_to(&dest, &quiet()).await.unwrap();
    assert_eq!(summary.packages, 3);

    // Each dump is the package's exact byte range out of the bundle...
    let bundle = extractor.read_bundle().await.unwrap();
    let entry = bundle.packages[0];
    let raw = std::fs::read(dest.join("Kernel.pkg")).unwrap();
    assert_eq!(
        raw,
        &image[entry.offset as usize..(entry.offset + entry.length) as usize]
    );

    // ...and a dumped package is itself a valid standalone container.
    let pkg_reader = Arc::new(LocalFileReader::new(&dest.join("Kernel.pkg")).unwrap());
    let package = PackageReader::open(pkg_reader, 0).await.unwrap();
    assert_eq!(package.name(), "Kernel");
    assert_eq!(package.files().len(), 1);
    assert_eq!(package.files()[0].name, "uImage");

    let out = dir.path().join("kernel-out");
    package.extract_to(&out, &quiet()).await.unwrap();
    assert_eq!(
        std::fs::read(out.join("uImage")).unwrap(),
        b"kernel image payload"
    );
}
