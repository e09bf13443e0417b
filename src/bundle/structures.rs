use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, Utc};
use std::fmt;
use std::io::Cursor;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Offset of the 4-byte header checksum field, shared by both header kinds.
pub const HEADER_CHECKSUM_OFFSET: usize = 12;

/// Container format version: two little-endian u16 fields, 4 bytes total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    pub const SIZE: usize = 4;

    /// Decode from the cursor's current position. Any two values are valid.
    pub fn read(cursor: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
        Ok(Self {
            major: cursor.read_u16::<LittleEndian>()?,
            minor: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// Encode as the same 4 bytes `read` consumes.
    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.major.to_le_bytes());
        buf.extend_from_slice(&self.minor.to_le_bytes());
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Decode a fixed-capacity null-terminated ASCII field.
///
/// Returns the bytes up to (not including) the first NUL, the whole field if
/// no NUL is present, and an empty string on an immediate NUL.
pub fn read_cstring(data: &[u8], offset: usize, capacity: usize) -> String {
    let field = &data[offset..offset + capacity];
    let end = field.iter().position(|&b| b == 0).unwrap_or(capacity);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Decode a 16-byte identifier stored in GUID byte order (first three fields
/// little-endian, the rest big-endian).
pub fn read_uuid(data: &[u8], offset: usize) -> Uuid {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&data[offset..offset + 16]);
    Uuid::from_bytes_le(bytes)
}

/// 32-bit Unix-seconds header field. Always within chrono's range.
fn decode_timestamp(secs: u32) -> DateTime<Utc> {
    DateTime::from_timestamp(i64::from(secs), 0).unwrap_or_default()
}

/// CRC32 of a header buffer with its checksum field zeroed out, the value
/// the stored header checksum must equal.
pub(crate) fn header_crc(data: &[u8]) -> u32 {
    let mut copy = data.to_vec();
    copy[HEADER_CHECKSUM_OFFSET..HEADER_CHECKSUM_OFFSET + 4].fill(0);
    crc32(&copy)
}

/// One-shot CRC32 (IEEE) over a byte buffer.
pub(crate) fn crc32(data: &[u8]) -> u32 {
    let mut crc = flate2::Crc::new();
    crc.update(data);
    crc.sum()
}

/// Bundle header - fixed 2345-byte region at the start of the file.
///
/// Decoded fields end at byte 1321; the remainder is reserved but still
/// covered by the header checksum.
#[derive(Debug, Clone)]
pub struct BundleHeader {
    pub version: Version,
    pub header_size: u32,
    pub header_checksum: u32,
    pub table_entries: u32,
    pub table_checksum: u32,
    pub date_code: DateTime<Utc>,
    pub reserved: u32,
    pub release: String,
    pub vendor: String,
    pub name: String,
    pub unknown1: u8,
    pub unknown2: u32,
    pub unknown3: u32,
    pub future_smart_version: String,
    pub model_code: String,
}

impl BundleHeader {
    /// 'ibdl' read little-endian as u32
    pub const MAGIC: u32 = 0x6C64_6269;
    pub const SIZE: usize = 2345;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::format(format!(
                "bundle header truncated: {} of {} bytes",
                data.len(),
                Self::SIZE
            )));
        }

        let mut cursor = Cursor::new(data);

        let magic = cursor.read_u32::<LittleEndian>()?;
        if magic != Self::MAGIC {
            return Err(Error::format(format!(
                "not an HP firmware bundle (magic {magic:#010x})"
            )));
        }

        let version = Version::read(&mut cursor)?;
        let header_size = cursor.read_u32::<LittleEndian>()?;
        let header_checksum = cursor.read_u32::<LittleEndian>()?;
        let table_entries = cursor.read_u32::<LittleEndian>()?;
        let table_checksum = cursor.read_u32::<LittleEndian>()?;
        let date_code = decode_timestamp(cursor.read_u32::<LittleEndian>()?);
        let reserved = cursor.read_u32::<LittleEndian>()?;

        let release = read_cstring(data, 32, 0x100);
        let vendor = read_cstring(data, 288, 0x100);
        let name = read_cstring(data, 544, 0x100);

        // Trailing fields of unconfirmed meaning; preserved verbatim.
        cursor.set_position(800);
        let unknown1 = cursor.read_u8()?;
        let unknown2 = cursor.read_u32::<LittleEndian>()?;
        let unknown3 = cursor.read_u32::<LittleEndian>()?;

        let future_smart_version = read_cstring(data, 809, 0x100);
        let model_code = read_cstring(data, 1065, 0x100);

        let computed = header_crc(&data[..Self::SIZE]);
        if computed != header_checksum {
            return Err(Error::Checksum {
                what: "bundle header",
                offset: 0,
                stored: header_checksum,
                computed,
            });
        }

        Ok(Self {
            version,
            header_size,
            header_checksum,
            table_entries,
            table_checksum,
            date_code,
            reserved,
            release,
            vendor,
            name,
            unknown1,
            unknown2,
            unknown3,
            future_smart_version,
            model_code,
        })
    }
}

/// Bundle entry table record: the absolute byte range of one embedded
/// package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageEntry {
    pub offset: u64,
    pub length: u64,
}

impl PackageEntry {
    pub const SIZE: usize = 16;

    pub fn from_bytes(rec: &[u8]) -> std::io::Result<Self> {
        let mut cursor = Cursor::new(rec);
        Ok(Self {
            offset: cursor.read_u64::<LittleEndian>()?,
            length: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// Package header - fixed 0x43D-byte region at the package's base offset.
#[derive(Debug, Clone)]
pub struct PackageHeader {
    pub version: Version,
    pub header_size: u32,
    pub header_checksum: u32,
    pub table_entries: u32,
    pub table_checksum: u32,
    pub date_code: DateTime<Utc>,
    pub reserved: u32,
    pub release: String,
    pub vendor: String,
    pub name: String,
    /// 16-byte identifier in GUID byte order. Observed identical across
    /// sibling packages with differing contents, so it is not a content
    /// hash; possibly the GUID of the target partition.
    pub uuid: Uuid,
    /// 13 reserved bytes of unconfirmed layout, preserved verbatim.
    pub unknown: [u8; 13],
    pub comment: String,
}

impl PackageHeader {
    /// 'ipkg' read little-endian as u32
    pub const MAGIC: u32 = 0x676B_7069;
    pub const SIZE: usize = 0x043D;

    /// Decode a package header. `base` is the package's absolute offset in
    /// the enclosing file, used for error context only.
    pub fn from_bytes(data: &[u8], base: u64) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::format(format!(
                "package header truncated: {} of {} bytes",
                data.len(),
                Self::SIZE
            )));
        }

        let mut cursor = Cursor::new(data);

        let magic = cursor.read_u32::<LittleEndian>()?;
        if magic != Self::MAGIC {
            return Err(Error::format(format!(
                "not an HP firmware package (magic {magic:#010x})"
            )));
        }

        let version = Version::read(&mut cursor)?;
        let header_size = cursor.read_u32::<LittleEndian>()?;
        let header_checksum = cursor.read_u32::<LittleEndian>()?;
        let table_entries = cursor.read_u32::<LittleEndian>()?;
        let table_checksum = cursor.read_u32::<LittleEndian>()?;
        let date_code = decode_timestamp(cursor.read_u32::<LittleEndian>()?);
        let reserved = cursor.read_u32::<LittleEndian>()?;

        let release = read_cstring(data, 32, 0x100);
        let vendor = read_cstring(data, 288, 0x100);
        let name = read_cstring(data, 544, 0x100);

        let uuid = read_uuid(data, 800);
        let mut unknown = [0u8; 13];
        unknown.copy_from_slice(&data[816..829]);
        let comment = read_cstring(data, 829, 0x100);

        let computed = header_crc(&data[..Self::SIZE]);
        if computed != header_checksum {
            return Err(Error::Checksum {
                what: "package header",
                offset: base,
                stored: header_checksum,
                computed,
            });
        }

        Ok(Self {
            version,
            header_size,
            header_checksum,
            table_entries,
            table_checksum,
            date_code,
            reserved,
            release,
            vendor,
            name,
            uuid,
            unknown,
            comment,
        })
    }
}

/// Package entry table record: one extractable file.
///
/// `offset` is relative to the package's base offset, not to the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub offset: u64,
    pub length: u64,
    pub checksum: u32,
}

impl FileEntry {
    pub const SIZE: usize = 0x100 + 8 + 8 + 4;

    pub fn from_bytes(rec: &[u8]) -> std::io::Result<Self> {
        let name = read_cstring(rec, 0, 0x100);
        let mut cursor = Cursor::new(&rec[0x100..]);
        Ok(Self {
            name,
            offset: cursor.read_u64::<LittleEndian>()?,
            length: cursor.read_u64::<LittleEndian>()?,
            checksum: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::fixtures;

    #[test]
    fn version_round_trips() {
        let version = Version { major: 3, minor: 17 };
        let mut buf = Vec::new();
        version.write(&mut buf);
        assert_eq!(buf.len(), Version::SIZE);

        let mut cursor = Cursor::new(buf.as_slice());
        assert_eq!(Version::read(&mut cursor).unwrap(), version);
    }

    #[test]
    fn cstring_stops_at_first_nul() {
        let mut field = [0u8; 256];
        field[..3].copy_from_slice(b"ABC");
        assert_eq!(read_cstring(&field, 0, 256), "ABC");
    }

    #[test]
    fn cstring_immediate_nul_is_empty() {
        let field = [0u8; 256];
        assert_eq!(read_cstring(&field, 0, 256), "");
    }

    #[test]
    fn cstring_without_nul_takes_whole_field() {
        let field = [b'x'; 256];
        assert_eq!(read_cstring(&field, 0, 256).len(), 256);
    }

    #[test]
    fn uuid_uses_guid_byte_order() {
        let bytes: [u8; 16] = [
            0x78, 0x56, 0x34, 0x12, // first field, little-endian
            0xcd, 0xab, // second
            0x21, 0x43, // third
            0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03, 0x04, // rest verbatim
        ];
        let uuid = read_uuid(&bytes, 0);
        assert_eq!(
            uuid.to_string(),
            "12345678-abcd-4321-dead-beef01020304"
        );
    }

    #[test]
    fn bundle_header_decodes() {
        let data = fixtures::bundle_header_bytes("Proline_fw", 2, 0xdead_beef);
        let header = BundleHeader::from_bytes(&data).unwrap();
        assert_eq!(header.name, "Proline_fw");
        assert_eq!(header.vendor, "Hewlett-Packard");
        assert_eq!(header.header_size, BundleHeader::SIZE as u32);
        assert_eq!(header.table_entries, 2);
        assert_eq!(header.table_checksum, 0xdead_beef);
        assert_eq!(header.version, Version { major: 2, minor: 0 });
    }

    #[test]
    fn bundle_header_rejects_bad_magic() {
        let mut data = fixtures::bundle_header_bytes("fw", 0, 0);
        data[0] = b'x';
        assert!(matches!(
            BundleHeader::from_bytes(&data),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn bundle_header_checksum_covers_every_other_byte() {
        let data = fixtures::bundle_header_bytes("fw", 1, 0);
        assert!(BundleHeader::from_bytes(&data).is_ok());

        // Flipping any byte outside the checksum field must fail validation.
        for &pos in &[0x20, 0x150, 0x400, BundleHeader::SIZE - 1] {
            let mut corrupt = data.clone();
            corrupt[pos] ^= 0xFF;
            assert!(
                matches!(
                    BundleHeader::from_bytes(&corrupt),
                    Err(Error::Checksum { what: "bundle header", .. })
                ),
                "byte {pos} flip went undetected"
            );
        }
    }

    #[test]
    fn header_crc_zeroes_the_checksum_field() {
        let data = fixtures::bundle_header_bytes("fw", 1, 0);
        let mut zeroed = data.clone();
        zeroed[HEADER_CHECKSUM_OFFSET..HEADER_CHECKSUM_OFFSET + 4].fill(0);
        assert_eq!(header_crc(&data), crc32(&zeroed));
    }

    #[test]
    fn package_header_decodes() {
        let uuid = Uuid::from_u128(0x1234_5678_9abc_def0_1122_3344_5566_7788);
        let data = fixtures::package_header_bytes("Kernel", uuid, 3, 0x0102_0304);
        let header = PackageHeader::from_bytes(&data, 4096).unwrap();
        assert_eq!(header.name, "Kernel");
        assert_eq!(header.uuid, uuid);
        assert_eq!(header.table_entries, 3);
        assert_eq!(header.header_size, PackageHeader::SIZE as u32);
    }

    #[test]
    fn package_header_checksum_mismatch_reports_base_offset() {
        let uuid = Uuid::nil();
        let mut data = fixtures::package_header_bytes("Kernel", uuid, 0, 0);
        data[600] ^= 0x01;
        match PackageHeader::from_bytes(&data, 8192) {
            Err(Error::Checksum { what, offset, .. }) => {
                assert_eq!(what, "package header");
                assert_eq!(offset, 8192);
            }
            other => panic!("expected checksum error, got {other:?}"),
        }
    }

    #[test]
    fn entry_records_decode_in_declared_layout() {
        let mut rec = Vec::new();
        rec.extend_from_slice(&4096u64.to_le_bytes());
        rec.extend_from_slice(&8192u64.to_le_bytes());
        let entry = PackageEntry::from_bytes(&rec).unwrap();
        assert_eq!(entry, PackageEntry { offset: 4096, length: 8192 });

        let mut rec = vec![0u8; FileEntry::SIZE];
        rec[..6].copy_from_slice(b"uImage");
        rec[0x100..0x108].copy_from_slice(&512u64.to_le_bytes());
        rec[0x108..0x110].copy_from_slice(&1024u64.to_le_bytes());
        rec[0x110..0x114].copy_from_slice(&0xcafe_f00du32.to_le_bytes());
        let entry = FileEntry::from_bytes(&rec).unwrap();
        assert_eq!(entry.name, "uImage");
        assert_eq!(entry.offset, 512);
        assert_eq!(entry.length, 1024);
        assert_eq!(entry.checksum, 0xcafe_f00d);
    }
}
