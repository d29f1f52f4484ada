//! Code specific to the ZIP archive record layout.
//!
//! We try to keep the nitty gritty here, and higher-level archive assembly
//! in [`crate::archive`]. Most comments quote the ZIP spec, `APPNOTE.TXT`.
//!
//! Every record type exposes `read`, `write`, and `structure_length`
//! (the exact byte count `write` emits), matching the record codec
//! contract used throughout this crate.

use crate::arch::usize;
use crate::bytes::{Reader, Writer};
use crate::result::Result;

/// General-purpose bit flag: sizes and CRC-32 live in a trailing data
/// descriptor rather than the local file header.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
/// General-purpose bit flag: the file name and comment are UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

/// Compression method: stored, no compression applied.
pub const METHOD_STORED: u16 = 0;
/// Compression method: raw DEFLATE.
pub const METHOD_DEFLATED: u16 = 8;

const LOCAL_FILE_HEADER_MAGIC: [u8; 4] = [b'P', b'K', 3, 4];
const DATA_DESCRIPTOR_MAGIC: [u8; 4] = [b'P', b'K', 7, 8];
const CENTRAL_DIRECTORY_MAGIC: [u8; 4] = [b'P', b'K', 1, 2];
const EOCD_MAGIC: [u8; 4] = [b'P', b'K', 5, 6];

/// 4.3.7 Local file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name: String,
    pub extra_field: Vec<u8>,
}

impl LocalFile {
    /// Returns true if sizes/CRC live in a trailing [`DataDescriptor`]
    /// rather than in this header.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    pub fn read(r: &mut Reader) -> Result<Self> {
        // local file header signature     4 bytes  (0x04034b50)
        // version needed to extract       2 bytes
        // general purpose bit flag        2 bytes
        // compression method              2 bytes
        // last mod file time              2 bytes
        // last mod file date              2 bytes
        // crc-32                          4 bytes
        // compressed size                 4 bytes
        // uncompressed size                4 bytes
        // file name length                2 bytes
        // extra field length              2 bytes
        //
        // file name (variable size)
        // extra field (variable size)
        r.expect_signature(LOCAL_FILE_HEADER_MAGIC, "Invalid local file header")?;
        let minimum_extract_version = r.read_u16()?;
        let flags = r.read_u16()?;
        let compression_method = r.read_u16()?;
        let last_modified_time = r.read_u16()?;
        let last_modified_date = r.read_u16()?;
        let crc32 = r.read_u32()?;
        let compressed_size = r.read_u32()?;
        let uncompressed_size = r.read_u32()?;
        let name_len = usize(r.read_u16()?)?;
        let extra_len = usize(r.read_u16()?)?;
        let name = r.read_string(name_len, "local file name")?;
        let extra_field = r.read_bytes(extra_len)?.to_vec();

        Ok(Self {
            minimum_extract_version,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            name,
            extra_field,
        })
    }

    pub fn write(&self, w: &mut Writer) {
        w.write_bytes(&LOCAL_FILE_HEADER_MAGIC);
        w.write_u16(self.minimum_extract_version);
        w.write_u16(self.flags);
        w.write_u16(self.compression_method);
        w.write_u16(self.last_modified_time);
        w.write_u16(self.last_modified_date);
        w.write_u32(self.crc32);
        w.write_u32(self.compressed_size);
        w.write_u32(self.uncompressed_size);
        w.write_u16(self.name.len() as u16);
        w.write_u16(self.extra_field.len() as u16);
        w.write_bytes(self.name.as_bytes());
        w.write_bytes(&self.extra_field);
    }

    pub fn structure_length(&self) -> usize {
        30 + self.name.len() + self.extra_field.len()
    }
}

/// 4.3.9 Data descriptor.
///
/// Trails the compressed payload when [`FLAG_DATA_DESCRIPTOR`] is set.
/// Writers in this core always emit the optional signature; readers
/// accept either form (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

impl DataDescriptor {
    pub fn read(r: &mut Reader) -> Result<Self> {
        // The descriptor may or may not be preceded by its signature.
        // If the next four bytes match the signature, consume them;
        // otherwise the four bytes we just peeked at are the CRC-32.
        if r.peek_signature() == Some(DATA_DESCRIPTOR_MAGIC) {
            r.expect_signature(DATA_DESCRIPTOR_MAGIC, "Invalid data descriptor")?;
        }
        let crc32 = r.read_u32()?;
        let compressed_size = r.read_u32()?;
        let uncompressed_size = r.read_u32()?;
        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }

    /// Always written with the signature, per this core's canonical
    /// write-with-signature / read-either policy.
    pub fn write(&self, w: &mut Writer) {
        w.write_bytes(&DATA_DESCRIPTOR_MAGIC);
        w.write_u32(self.crc32);
        w.write_u32(self.compressed_size);
        w.write_u32(self.uncompressed_size);
    }

    pub fn structure_length(&self) -> usize {
        16
    }
}

/// 4.3.12 Central directory file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryFile {
    pub source_version: u16,
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number: u16,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub header_offset: u32,
    pub name: String,
    pub extra_field: Vec<u8>,
    pub file_comment: String,
}

impl CentralDirectoryFile {
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Equality that ignores `header_offset`, since the same logical
    /// entry can legitimately live at different offsets in two archives.
    /// This is the "position-independent equality" the patch generator
    /// uses to decide between COPY and REFRESH.
    pub fn position_independent_eq(&self, other: &Self) -> bool {
        self.source_version == other.source_version
            && self.minimum_extract_version == other.minimum_extract_version
            && self.flags == other.flags
            && self.compression_method == other.compression_method
            && self.last_modified_time == other.last_modified_time
            && self.last_modified_date == other.last_modified_date
            && self.crc32 == other.crc32
            && self.compressed_size == other.compressed_size
            && self.uncompressed_size == other.uncompressed_size
            && self.disk_number == other.disk_number
            && self.internal_file_attributes == other.internal_file_attributes
            && self.external_file_attributes == other.external_file_attributes
            && self.name == other.name
            && self.extra_field == other.extra_field
            && self.file_comment == other.file_comment
    }

    /// Whether `self` and `other` describe bit-identical payloads: same
    /// CRC, same compressed size, same compression method. Used to
    /// distinguish REFRESH (payload matches, metadata doesn't) from PATCH.
    pub fn payload_eq(&self, other: &Self) -> bool {
        self.crc32 == other.crc32
            && self.compressed_size == other.compressed_size
            && self.compression_method == other.compression_method
    }

    pub fn read(r: &mut Reader) -> Result<Self> {
        // central file header signature   4 bytes  (0x02014b50)
        // version made by                 2 bytes
        // version needed to extract       2 bytes
        // general purpose bit flag        2 bytes
        // compression method              2 bytes
        // last mod file time              2 bytes
        // last mod file date              2 bytes
        // crc-32                          4 bytes
        // compressed size                 4 bytes
        // uncompressed size               4 bytes
        // file name length                2 bytes
        // extra field length              2 bytes
        // file comment length             2 bytes
        // disk number start               2 bytes
        // internal file attributes        2 bytes
        // external file attributes        4 bytes
        // relative offset of local header 4 bytes
        //
        // file name (variable size)
        // extra field (variable size)
        // file comment (variable size)
        r.expect_signature(CENTRAL_DIRECTORY_MAGIC, "Invalid central directory entry")?;
        let source_version = r.read_u16()?;
        let minimum_extract_version = r.read_u16()?;
        let flags = r.read_u16()?;
        let compression_method = r.read_u16()?;
        let last_modified_time = r.read_u16()?;
        let last_modified_date = r.read_u16()?;
        let crc32 = r.read_u32()?;
        let compressed_size = r.read_u32()?;
        let uncompressed_size = r.read_u32()?;
        let name_len = usize(r.read_u16()?)?;
        let extra_len = usize(r.read_u16()?)?;
        let comment_len = usize(r.read_u16()?)?;
        let disk_number = r.read_u16()?;
        let internal_file_attributes = r.read_u16()?;
        let external_file_attributes = r.read_u32()?;
        let header_offset = r.read_u32()?;
        let name = r.read_string(name_len, "central directory file name")?;
        let extra_field = r.read_bytes(extra_len)?.to_vec();
        let file_comment = r.read_string(comment_len, "central directory file comment")?;

        Ok(Self {
            source_version,
            minimum_extract_version,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number,
            internal_file_attributes,
            external_file_attributes,
            header_offset,
            name,
            extra_field,
            file_comment,
        })
    }

    pub fn write(&self, w: &mut Writer) {
        w.write_bytes(&CENTRAL_DIRECTORY_MAGIC);
        w.write_u16(self.source_version);
        w.write_u16(self.minimum_extract_version);
        w.write_u16(self.flags);
        w.write_u16(self.compression_method);
        w.write_u16(self.last_modified_time);
        w.write_u16(self.last_modified_date);
        w.write_u32(self.crc32);
        w.write_u32(self.compressed_size);
        w.write_u32(self.uncompressed_size);
        w.write_u16(self.name.len() as u16);
        w.write_u16(self.extra_field.len() as u16);
        w.write_u16(self.file_comment.len() as u16);
        w.write_u16(self.disk_number);
        w.write_u16(self.internal_file_attributes);
        w.write_u32(self.external_file_attributes);
        w.write_u32(self.header_offset);
        w.write_bytes(self.name.as_bytes());
        w.write_bytes(&self.extra_field);
        w.write_bytes(self.file_comment.as_bytes());
    }

    pub fn structure_length(&self) -> usize {
        46 + self.name.len() + self.extra_field.len() + self.file_comment.len()
    }
}

/// 4.3.16 End of central directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub entries_on_this_disk: u16,
    pub entries: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub file_comment: String,
}

impl EndOfCentralDirectory {
    pub fn read(r: &mut Reader) -> Result<Self> {
        // end of central dir signature    4 bytes  (0x06054b50)
        // number of this disk             2 bytes
        // number of the disk with the
        // start of the central directory  2 bytes
        // total number of entries in
        // the central dir on this disk    2 bytes
        // total number of entries in
        // the central dir                 2 bytes
        // size of the central directory   4 bytes
        // offset of start of central
        // directory with respect to
        // the starting disk number        4 bytes
        // zipfile comment length          2 bytes
        r.expect_signature(EOCD_MAGIC, "Invalid end of central directory record")?;
        let disk_number = r.read_u16()?;
        let disk_with_central_directory = r.read_u16()?;
        let entries_on_this_disk = r.read_u16()?;
        let entries = r.read_u16()?;
        let central_directory_size = r.read_u32()?;
        let central_directory_offset = r.read_u32()?;
        let comment_len = usize(r.read_u16()?)?;
        let file_comment = r.read_string(comment_len, "archive comment")?;

        Ok(Self {
            disk_number,
            disk_with_central_directory,
            entries_on_this_disk,
            entries,
            central_directory_size,
            central_directory_offset,
            file_comment,
        })
    }

    pub fn write(&self, w: &mut Writer) {
        w.write_bytes(&EOCD_MAGIC);
        w.write_u16(self.disk_number);
        w.write_u16(self.disk_with_central_directory);
        w.write_u16(self.entries_on_this_disk);
        w.write_u16(self.entries);
        w.write_u32(self.central_directory_size);
        w.write_u32(self.central_directory_offset);
        w.write_u16(self.file_comment.len() as u16);
        w.write_bytes(self.file_comment.as_bytes());
    }

    pub fn structure_length(&self) -> usize {
        22 + self.file_comment.len()
    }
}

/// Returns true if the next four bytes in `r` are a local file header
/// signature, without consuming anything. Used by the archive loader
/// (§4.2) to tell where the local section ends and the central
/// directory begins.
pub fn peek_is_local_file_header(r: &Reader) -> bool {
    r.peek_signature() == Some(LOCAL_FILE_HEADER_MAGIC)
}

pub fn peek_is_central_directory_entry(r: &Reader) -> bool {
    r.peek_signature() == Some(CENTRAL_DIRECTORY_MAGIC)
}

pub fn peek_is_eocd(r: &Reader) -> bool {
    r.peek_signature() == Some(EOCD_MAGIC)
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_local_file() -> LocalFile {
        LocalFile {
            minimum_extract_version: 20,
            flags: FLAG_UTF8,
            compression_method: METHOD_DEFLATED,
            last_modified_time: 0x1234,
            last_modified_date: 0x5678,
            crc32: 0xdead_beef,
            compressed_size: 12,
            uncompressed_size: 40,
            name: "dir/entry.txt".to_owned(),
            extra_field: vec![1, 2, 3, 4],
        }
    }

    #[test]
    fn local_file_round_trips() {
        let local = sample_local_file();
        let mut w = Writer::new();
        local.write(&mut w);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), local.structure_length());

        let mut r = Reader::new(&bytes);
        let parsed = LocalFile::read(&mut r).unwrap();
        assert_eq!(parsed, local);
        assert!(r.is_empty());
    }

    #[test]
    fn data_descriptor_reads_with_or_without_its_signature() {
        let descriptor = DataDescriptor {
            crc32: 0x1111_2222,
            compressed_size: 10,
            uncompressed_size: 20,
        };

        // Writers in this core always include the optional signature...
        let mut w = Writer::new();
        descriptor.write(&mut w);
        let with_sig = w.into_bytes();
        assert_eq!(&with_sig[..4], &DATA_DESCRIPTOR_MAGIC);
        let parsed = DataDescriptor::read(&mut Reader::new(&with_sig)).unwrap();
        assert_eq!(parsed, descriptor);

        // ...but readers must also accept the signature-less form some
        // writers in the wild still produce.
        let mut without_sig = Writer::new();
        without_sig.write_u32(descriptor.crc32);
        without_sig.write_u32(descriptor.compressed_size);
        without_sig.write_u32(descriptor.uncompressed_size);
        let bytes = without_sig.into_bytes();
        let parsed = DataDescriptor::read(&mut Reader::new(&bytes)).unwrap();
        assert_eq!(parsed, descriptor);
    }

    #[test]
    fn central_directory_position_independent_eq_ignores_header_offset() {
        let mut a = CentralDirectoryFile {
            source_version: 20,
            minimum_extract_version: 20,
            flags: FLAG_UTF8,
            compression_method: METHOD_DEFLATED,
            last_modified_time: 0,
            last_modified_date: 0,
            crc32: 1,
            compressed_size: 2,
            uncompressed_size: 3,
            disk_number: 0,
            internal_file_attributes: 0,
            external_file_attributes: 0,
            header_offset: 0,
            name: "a.txt".to_owned(),
            extra_field: Vec::new(),
            file_comment: String::new(),
        };
        let mut b = a.clone();
        b.header_offset = 999;
        assert!(a.position_independent_eq(&b));

        a.crc32 = 2;
        assert!(!a.position_independent_eq(&b));
        assert!(!a.payload_eq(&b));
    }

    #[test]
    fn central_directory_payload_eq_ignores_metadata_fields() {
        let a = CentralDirectoryFile {
            source_version: 20,
            minimum_extract_version: 20,
            flags: FLAG_UTF8,
            compression_method: METHOD_DEFLATED,
            last_modified_time: 0,
            last_modified_date: 0,
            crc32: 7,
            compressed_size: 8,
            uncompressed_size: 9,
            disk_number: 0,
            internal_file_attributes: 0,
            external_file_attributes: 0,
            header_offset: 0,
            name: "a.txt".to_owned(),
            extra_field: Vec::new(),
            file_comment: String::new(),
        };
        let mut renamed_timestamp = a.clone();
        renamed_timestamp.last_modified_time = 0xffff;
        assert!(a.payload_eq(&renamed_timestamp));
        assert!(!a.position_independent_eq(&renamed_timestamp));
    }

    #[test]
    fn eocd_round_trips() {
        let eocd = EndOfCentralDirectory {
            disk_number: 0,
            disk_with_central_directory: 0,
            entries_on_this_disk: 3,
            entries: 3,
            central_directory_size: 123,
            central_directory_offset: 456,
            file_comment: "a comment".to_owned(),
        };
        let mut w = Writer::new();
        eocd.write(&mut w);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), eocd.structure_length());
        let parsed = EndOfCentralDirectory::read(&mut Reader::new(&bytes)).unwrap();
        assert_eq!(parsed, eocd);
    }
}
