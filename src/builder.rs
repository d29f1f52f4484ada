//! The in-memory archive builder: the reference producer described in
//! §4.3. Used by the demos and the test suite to build sample archives;
//! the patch applier builds its output archive directly out of
//! [`crate::archive::LocalSectionParts`] instead, since it's
//! reassembling payloads that already arrived compressed.

use std::io::Write;

use crc32fast::Hasher;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::archive::{Archive, LocalSectionParts};
use crate::msdos;
use crate::result::Result;
use crate::spec::{CentralDirectoryFile, DataDescriptor, LocalFile, FLAG_DATA_DESCRIPTOR, FLAG_UTF8, METHOD_DEFLATED};

/// Minimum extract version for a plain deflated entry: PKZIP 2.0.
const MIN_EXTRACT_VERSION: u16 = 20;

/// Builds an [`Archive`] one entry at a time, deflating each entry's
/// bytes with a raw (headerless) deflate stream so the output is
/// directly concatenable into the archive, per §4.3.
pub struct ArchiveBuilder {
    archive: Archive,
    use_data_descriptor: bool,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            archive: Archive::new(),
            use_data_descriptor: true,
        }
    }

    /// Controls whether appended entries carry sizes/CRC in a trailing
    /// data descriptor (the default) or inline in the local header.
    pub fn use_data_descriptor(mut self, use_data_descriptor: bool) -> Self {
        self.use_data_descriptor = use_data_descriptor;
        self
    }

    /// Appends an entry, deflating `contents` with raw DEFLATE.
    pub fn add_entry(&mut self, name: &str, last_modified_millis: i64, contents: &[u8]) -> Result<()> {
        let compressed = deflate_raw(contents);
        let crc32 = crc32(contents);
        log::trace!(
            "deflated {name}: {} bytes -> {} bytes",
            contents.len(),
            compressed.len()
        );
        self.add_compressed_entry(
            name,
            last_modified_millis,
            METHOD_DEFLATED,
            crc32,
            contents.len(),
            compressed,
        )
    }

    /// Appends an entry whose bytes are already compressed (or already
    /// stored, with `compression_method == METHOD_STORED`). Used when
    /// reusing payload bytes pulled out of another archive, rather than
    /// re-deflating plaintext.
    pub fn add_compressed_entry(
        &mut self,
        name: &str,
        last_modified_millis: i64,
        compression_method: u16,
        crc32: u32,
        uncompressed_size: usize,
        compressed: Vec<u8>,
    ) -> Result<()> {
        let (time, date) = msdos::from_epoch_millis(last_modified_millis);
        let mut flags = FLAG_UTF8;
        if self.use_data_descriptor {
            flags |= FLAG_DATA_DESCRIPTOR;
        }

        let (header_sizes, descriptor) = if self.use_data_descriptor {
            (
                (0u32, 0u32),
                Some(DataDescriptor {
                    crc32,
                    compressed_size: compressed.len() as u32,
                    uncompressed_size: uncompressed_size as u32,
                }),
            )
        } else {
            ((crc32, compressed.len() as u32), None)
        };

        let local = LocalFile {
            minimum_extract_version: MIN_EXTRACT_VERSION,
            flags,
            compression_method,
            last_modified_time: time,
            last_modified_date: date,
            crc32: header_sizes.0,
            compressed_size: header_sizes.1,
            uncompressed_size: if self.use_data_descriptor {
                0
            } else {
                uncompressed_size as u32
            },
            name: name.to_owned(),
            extra_field: Vec::new(),
        };

        let central = CentralDirectoryFile {
            source_version: MIN_EXTRACT_VERSION,
            minimum_extract_version: MIN_EXTRACT_VERSION,
            flags,
            compression_method,
            last_modified_time: time,
            last_modified_date: date,
            crc32,
            compressed_size: compressed.len() as u32,
            uncompressed_size: uncompressed_size as u32,
            disk_number: 0,
            internal_file_attributes: 0,
            external_file_attributes: 0,
            header_offset: 0, // recomputed by Archive::finalize
            name: name.to_owned(),
            extra_field: Vec::new(),
            file_comment: String::new(),
        };

        let section = LocalSectionParts {
            local,
            data: compressed,
            descriptor,
        };

        self.archive.push_entry(section, central)
    }

    /// Finalizes and returns the built archive.
    pub fn finish(mut self) -> Result<Archive> {
        self.archive.finalize()?;
        Ok(self.archive)
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn deflate_raw(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    // Writes to an in-memory Vec can't fail.
    encoder.write_all(data).expect("in-memory deflate write");
    encoder.finish().expect("in-memory deflate finish")
}

fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::archive::Archive;

    #[test]
    fn builds_a_single_entry_archive() {
        let mut builder = ArchiveBuilder::new();
        builder.add_entry("a.txt", 0, b"hello").unwrap();
        let archive = builder.finish().unwrap();

        assert_eq!(archive.local_sections().len(), 1);
        assert_eq!(archive.central_directory().len(), 1);
        let (section, central) = archive.find_by_name("a.txt").unwrap();
        assert_eq!(central.uncompressed_size, 5);
        assert_eq!(central.crc32, 0x3610a686);
        assert_eq!(section.local.name, "a.txt");
    }

    #[test]
    fn empty_archive_has_zeroed_eocd() {
        let archive = ArchiveBuilder::new().finish().unwrap();
        assert_eq!(archive.eocd().entries, 0);
        assert_eq!(archive.eocd().central_directory_size, 0);
        assert_eq!(archive.eocd().central_directory_offset, 0);
    }

    #[test]
    fn round_trips_through_bytes() {
        let mut builder = ArchiveBuilder::new();
        builder.add_entry("a.txt", 0, b"hello").unwrap();
        builder.add_entry("dir/b.txt", 0, b"goodbye, cruel world").unwrap();
        let archive = builder.finish().unwrap();
        let bytes = archive.serialize().unwrap();

        let parsed = Archive::load(&bytes).unwrap();
        assert_eq!(parsed.local_sections().len(), 2);
        assert_eq!(parsed, archive);
    }

    #[test]
    fn data_descriptor_flag_zeroes_the_local_header_and_carries_authoritative_values() {
        let mut builder = ArchiveBuilder::new();
        builder.add_entry("a.txt", 0, b"hello").unwrap();
        let archive = builder.finish().unwrap();
        let (section, _) = archive.find_by_name("a.txt").unwrap();

        assert!(section.local.has_data_descriptor());
        assert_eq!(section.local.crc32, 0);
        assert_eq!(section.local.compressed_size, 0);
        assert_eq!(section.local.uncompressed_size, 0);
        let descriptor = section.descriptor.unwrap();
        assert_eq!(descriptor.crc32, 0x3610a686);
        assert_eq!(descriptor.uncompressed_size, 5);
        assert_eq!(section.authoritative(), (0x3610a686, descriptor.compressed_size as usize, 5));
    }

    #[test]
    fn without_the_data_descriptor_flag_the_local_header_carries_sizes_directly() {
        let mut builder = ArchiveBuilder::new().use_data_descriptor(false);
        builder.add_entry("a.txt", 0, b"hello").unwrap();
        let archive = builder.finish().unwrap();
        let (section, _) = archive.find_by_name("a.txt").unwrap();

        assert!(!section.local.has_data_descriptor());
        assert!(section.descriptor.is_none());
        assert_eq!(section.local.crc32, 0x3610a686);
        assert_eq!(section.local.uncompressed_size, 5);
    }
}
