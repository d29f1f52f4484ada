//! The in-memory [`Archive`]: an ordered local section, a central
//! directory, and an EOCD trailer, plus load-from-bytes and
//! write-to-bytes.
//!
//! Higher layers (the builder, the patch generator/applier) only ever
//! touch this module's API; the bit-level record layout lives in
//! [`crate::spec`].

use crate::bytes::{Reader, Writer};
use crate::crc_reader::Crc32Reader;
use crate::result::{Error, Result};
use crate::spec::{self, CentralDirectoryFile, DataDescriptor, EndOfCentralDirectory, LocalFile};

/// The per-entry triple: a local file header, its compressed payload,
/// and (iff the header's data-descriptor flag is set) a trailing
/// [`DataDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSectionParts {
    pub local: LocalFile,
    pub data: Vec<u8>,
    pub descriptor: Option<DataDescriptor>,
}

impl LocalSectionParts {
    pub fn structure_length(&self) -> usize {
        self.local.structure_length()
            + self.data.len()
            + self.descriptor.map_or(0, |d| d.structure_length())
    }

    fn write(&self, w: &mut Writer) {
        self.local.write(w);
        w.write_bytes(&self.data);
        if let Some(d) = &self.descriptor {
            d.write(w);
        }
    }

    /// Parses a local section starting at the front of `r`.
    ///
    /// `authoritative_compressed_size` must be supplied when the local
    /// header's own size fields are zeroed out by the data-descriptor
    /// flag (§3.1); it comes from the matching central directory entry,
    /// which always carries the authoritative value.
    fn read(r: &mut Reader, authoritative_compressed_size: Option<usize>) -> Result<Self> {
        let local = LocalFile::read(r)?;
        let data_len = if local.has_data_descriptor() {
            authoritative_compressed_size.ok_or(Error::InvalidArchive(
                "Local file uses a data descriptor but no central directory entry provided its size",
            ))?
        } else {
            local.compressed_size as usize
        };
        let data = r.read_bytes(data_len)?.to_vec();
        let descriptor = if local.has_data_descriptor() {
            Some(DataDescriptor::read(r)?)
        } else {
            None
        };
        Ok(Self {
            local,
            data,
            descriptor,
        })
    }

    /// The authoritative CRC32/sizes for this section: from the
    /// descriptor if present, otherwise from the local header (§3.1).
    pub fn authoritative(&self) -> (u32, usize, usize) {
        match &self.descriptor {
            Some(d) => (
                d.crc32,
                d.compressed_size as usize,
                d.uncompressed_size as usize,
            ),
            None => (
                self.local.crc32,
                self.local.compressed_size as usize,
                self.local.uncompressed_size as usize,
            ),
        }
    }
}

/// An in-memory ZIP archive: ordered local sections, a parallel ordered
/// central directory, and an EOCD trailer.
///
/// `local_sections[i]` always pairs with `central_directory[i]`: they
/// describe the same file by name. [`Archive::finalize`] recomputes
/// offsets and the EOCD from the current contents; after that,
/// [`Archive::push_entry`] fails with [`Error::IllegalState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    local_sections: Vec<LocalSectionParts>,
    central_directory: Vec<CentralDirectoryFile>,
    eocd: EndOfCentralDirectory,
    finalized: bool,
}

impl Archive {
    pub fn new() -> Self {
        Self {
            local_sections: Vec::new(),
            central_directory: Vec::new(),
            eocd: EndOfCentralDirectory {
                disk_number: 0,
                disk_with_central_directory: 0,
                entries_on_this_disk: 0,
                entries: 0,
                central_directory_size: 0,
                central_directory_offset: 0,
                file_comment: String::new(),
            },
            finalized: false,
        }
    }

    /// Builds an archive directly from a matched local section list and
    /// central directory (as produced by the patch applier from a
    /// directive stream). Both must be the same length and pair by name
    /// at the same index, or this fails with a format error.
    pub fn from_parts(
        local_sections: Vec<LocalSectionParts>,
        central_directory: Vec<CentralDirectoryFile>,
    ) -> Result<Self> {
        if local_sections.len() != central_directory.len() {
            return Err(Error::InvalidArchive(
                "Local section and central directory lengths differ",
            ));
        }
        for (local, central) in local_sections.iter().zip(&central_directory) {
            if local.local.name != central.name {
                return Err(Error::UnpairedEntry(local.local.name.clone()));
            }
        }
        Ok(Self {
            local_sections,
            central_directory,
            eocd: EndOfCentralDirectory {
                disk_number: 0,
                disk_with_central_directory: 0,
                entries_on_this_disk: 0,
                entries: 0,
                central_directory_size: 0,
                central_directory_offset: 0,
                file_comment: String::new(),
            },
            finalized: false,
        })
    }

    /// Appends a matched local section / central directory entry pair.
    /// Fails with [`Error::IllegalState`] if the archive was already
    /// finalized, or with a format error if the names don't match.
    pub fn push_entry(&mut self, local: LocalSectionParts, central: CentralDirectoryFile) -> Result<()> {
        if self.finalized {
            return Err(Error::IllegalState(
                "Can't mutate an archive after it's been finalized",
            ));
        }
        if local.local.name != central.name {
            return Err(Error::UnpairedEntry(local.local.name.clone()));
        }
        self.local_sections.push(local);
        self.central_directory.push(central);
        Ok(())
    }

    pub fn local_sections(&self) -> &[LocalSectionParts] {
        &self.local_sections
    }

    pub fn central_directory(&self) -> &[CentralDirectoryFile] {
        &self.central_directory
    }

    pub fn eocd(&self) -> &EndOfCentralDirectory {
        &self.eocd
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Finds the central directory entry with the given name, if any.
    pub fn find_by_name(&self, name: &str) -> Option<(&LocalSectionParts, &CentralDirectoryFile)> {
        self.central_directory
            .iter()
            .position(|c| c.name == name)
            .map(|i| (&self.local_sections[i], &self.central_directory[i]))
    }

    /// Finds the local section whose header sits at the given byte
    /// offset in a finalized archive. Used by the patch applier to
    /// resolve a directive's `oldLocalHeaderOffset`.
    pub fn section_at_offset(&self, offset: usize) -> Result<&LocalSectionParts> {
        self.central_directory
            .iter()
            .position(|c| c.header_offset as usize == offset)
            .map(|i| &self.local_sections[i])
            .ok_or(Error::InvalidArchive(
                "No local section at the given offset",
            ))
    }

    /// Recomputes local-header offsets and the EOCD from the current
    /// contents. Idempotent: calling it twice yields the same numbers.
    pub fn finalize(&mut self) -> Result<()> {
        let mut offset: u64 = 0;
        for (local, central) in self.local_sections.iter().zip(self.central_directory.iter_mut()) {
            central.header_offset = offset as u32;
            offset += local.structure_length() as u64;
        }
        let central_directory_offset = offset;
        let mut central_directory_size: u64 = 0;
        for central in &self.central_directory {
            central_directory_size += central.structure_length() as u64;
        }

        self.eocd = EndOfCentralDirectory {
            disk_number: 0,
            disk_with_central_directory: 0,
            entries_on_this_disk: self.central_directory.len() as u16,
            entries: self.central_directory.len() as u16,
            central_directory_size: central_directory_size as u32,
            central_directory_offset: central_directory_offset as u32,
            file_comment: self.eocd.file_comment.clone(),
        };
        self.finalized = true;
        log::trace!(
            "finalized archive: {} entries, central directory at offset {}",
            self.central_directory.len(),
            central_directory_offset
        );
        Ok(())
    }

    /// Decompresses every entry and checks its declared CRC-32 against
    /// the actual uncompressed bytes, catching corruption a purely
    /// structural load wouldn't notice.
    pub fn verify_crc32(&self) -> Result<()> {
        use std::io::Read;

        for (section, central) in self.local_sections.iter().zip(&self.central_directory) {
            let (crc32, _, _) = section.authoritative();
            let mut out = Vec::new();
            match central.compression_method {
                spec::METHOD_STORED => {
                    Crc32Reader::new(section.data.as_slice(), crc32).read_to_end(&mut out)?;
                }
                spec::METHOD_DEFLATED => {
                    let decoder = flate2::read::DeflateDecoder::new(section.data.as_slice());
                    Crc32Reader::new(decoder, crc32).read_to_end(&mut out)?;
                }
                _ => {
                    return Err(Error::InvalidArchive(
                        "Can't verify the CRC of an entry with an unrecognized compression method",
                    ))
                }
            }
        }
        Ok(())
    }

    /// Serializes the archive. The archive must already be finalized.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        if !self.finalized {
            return Err(Error::IllegalState(
                "Archive must be finalized before serialization",
            ));
        }
        let mut w = Writer::new();
        for local in &self.local_sections {
            local.write(&mut w);
        }
        for central in &self.central_directory {
            central.write(&mut w);
        }
        self.eocd.write(&mut w);
        Ok(w.into_bytes())
    }

    /// Serializes just the central directory + EOCD, the payload of a
    /// patch stream's BEGIN directive (§3.4).
    pub fn write_central_directory_section(&self, w: &mut Writer) {
        for central in &self.central_directory {
            central.write(w);
        }
        self.eocd.write(w);
    }

    /// Reads back a central directory + EOCD section as written by
    /// [`Archive::write_central_directory_section`]. The EOCD's
    /// `entries` field bounds how many central directory records follow.
    pub fn read_central_directory_section(
        r: &mut Reader,
    ) -> Result<(Vec<CentralDirectoryFile>, EndOfCentralDirectory)> {
        let mut central_directory = Vec::new();
        while spec::peek_is_central_directory_entry(r) {
            central_directory.push(CentralDirectoryFile::read(r)?);
        }
        let eocd = EndOfCentralDirectory::read(r)?;
        if central_directory.len() != eocd.entries as usize {
            return Err(Error::InvalidArchive(
                "Central directory entry count doesn't match EOCD",
            ));
        }
        Ok((central_directory, eocd))
    }

    /// Loads a finalized archive from a complete byte buffer (§4.2).
    pub fn load(bytes: &[u8]) -> Result<Self> {
        log::debug!("loading archive ({} bytes)", bytes.len());
        let eocd_pos = find_eocd(bytes)?;
        let eocd = EndOfCentralDirectory::read(&mut Reader::new(&bytes[eocd_pos..]))?;

        if eocd.disk_number != 0 || eocd.disk_with_central_directory != 0 {
            return Err(Error::InvalidArchive(
                "Multi-disk archives aren't supported",
            ));
        }

        let cd_start = eocd.central_directory_offset as usize;
        if cd_start > eocd_pos {
            return Err(Error::InvalidArchive(
                "Central directory offset is past the end of central directory record",
            ));
        }
        let mut cd_reader = Reader::new(&bytes[cd_start..eocd_pos]);
        let mut central_directory = Vec::with_capacity(eocd.entries as usize);
        for _ in 0..eocd.entries {
            central_directory.push(CentralDirectoryFile::read(&mut cd_reader)?);
        }
        if !cd_reader.is_empty() {
            return Err(Error::InvalidArchive(
                "Trailing bytes between central directory and EOCD",
            ));
        }

        // Authoritative sizes, by offset, for entries whose local header
        // defers to a trailing data descriptor.
        let mut local_sections = Vec::with_capacity(central_directory.len());
        let mut local_reader = Reader::new(&bytes[..cd_start]);
        let mut consumed = 0usize;
        while spec::peek_is_local_file_header(&local_reader) {
            let central = central_directory
                .iter()
                .find(|c| c.header_offset as usize == consumed)
                .ok_or(Error::InvalidArchive(
                    "Local file header has no matching central directory entry",
                ))?;
            let authoritative_size = central.compressed_size as usize;
            let section = LocalSectionParts::read(&mut local_reader, Some(authoritative_size))?;
            consumed += section.structure_length();
            local_sections.push(section);
        }
        if !local_reader.is_empty() {
            return Err(Error::InvalidArchive(
                "Local section didn't run exactly up to the central directory",
            ));
        }

        let archive = Self::pair_by_name(local_sections, central_directory, eocd)?;
        log::info!("loaded archive with {} entries", archive.central_directory.len());
        Ok(archive)
    }

    /// Reorders `central_directory` to align index-for-index with
    /// `local_sections` by name, as required by the rest of this module.
    fn pair_by_name(
        local_sections: Vec<LocalSectionParts>,
        central_directory: Vec<CentralDirectoryFile>,
        eocd: EndOfCentralDirectory,
    ) -> Result<Self> {
        if local_sections.len() != central_directory.len() {
            return Err(Error::InvalidArchive(
                "Local section and central directory have different entry counts",
            ));
        }
        let mut by_name: std::collections::HashMap<String, CentralDirectoryFile> =
            std::collections::HashMap::with_capacity(central_directory.len());
        for central in central_directory {
            if by_name.contains_key(&central.name) {
                return Err(Error::DuplicateEntry(central.name));
            }
            by_name.insert(central.name.clone(), central);
        }

        let mut ordered_central = Vec::with_capacity(local_sections.len());
        for section in &local_sections {
            let central = by_name
                .remove(&section.local.name)
                .ok_or_else(|| Error::UnpairedEntry(section.local.name.clone()))?;
            ordered_central.push(central);
        }

        Ok(Self {
            local_sections,
            central_directory: ordered_central,
            eocd,
            finalized: true,
        })
    }
}

/// Searches backward through `bytes` for the EOCD signature. The EOCD is
/// always at (or very near) the end of the file; a variable-length
/// comment is the only reason it isn't at a fixed offset.
fn find_eocd(bytes: &[u8]) -> Result<usize> {
    if bytes.len() < 22 {
        return Err(Error::InvalidArchive(
            "Too small to contain an end of central directory record",
        ));
    }
    const MAGIC: [u8; 4] = [b'P', b'K', 5, 6];
    let mut i = bytes.len() - 4;
    loop {
        if bytes[i..i + 4] == MAGIC {
            return Ok(i);
        }
        if i == 0 {
            break;
        }
        i -= 1;
    }
    Err(Error::InvalidArchive(
        "Couldn't find the end of central directory record",
    ))
}
