//! Replays a directive stream against an old archive to reconstruct the
//! new one (§4.4, §4.6).

use crate::arch::usize;
use crate::archive::{Archive, LocalSectionParts};
use crate::patch::{self, PatchDirective};
use crate::registry::{CompressionRegistry, DeltaRegistry};
use crate::result::{Error, Result};

/// Applies a patch stream against an old archive using the given engine
/// registries.
pub struct PatchApplier {
    deltas: DeltaRegistry,
    compressors: CompressionRegistry,
}

impl PatchApplier {
    pub fn new(deltas: DeltaRegistry, compressors: CompressionRegistry) -> Self {
        Self { deltas, compressors }
    }

    /// An applier stocked with the reference whole-replace delta and raw
    /// DEFLATE engines (see [`crate::registry`]).
    pub fn with_defaults() -> Self {
        Self::new(crate::registry::default_delta_registry(), crate::registry::default_compression_registry())
    }

    /// Reconstructs the new archive described by `patch_bytes`, using
    /// `old` to resolve COPY/REFRESH/PATCH directives.
    pub fn apply(&self, old: &Archive, patch_bytes: &[u8]) -> Result<Archive> {
        let (version, mut directives) = patch::read_patch(patch_bytes)?;
        log::debug!("applying patch version {version} ({} directives)", directives.len());
        if directives.is_empty() {
            return Err(Error::MissingBegin);
        }
        let begin = match directives.remove(0) {
            PatchDirective::Begin(begin) => begin,
            _ => return Err(Error::MissingBegin),
        };

        let mut local_sections = Vec::with_capacity(begin.central_directory.len());
        for directive in directives {
            let section = match directive {
                PatchDirective::Begin(_) => {
                    return Err(Error::InvalidArchive("Patch stream has more than one BEGIN directive"))
                }
                PatchDirective::Copy { offset } => old.section_at_offset(usize(offset)?)?.clone(),
                PatchDirective::Refresh { offset, metadata } => {
                    let old_section = old.section_at_offset(usize(offset)?)?;
                    LocalSectionParts {
                        local: metadata.local,
                        data: old_section.data.clone(),
                        descriptor: metadata.descriptor,
                    }
                }
                PatchDirective::Patch { offset, metadata } => {
                    let old_section = old.section_at_offset(usize(offset)?)?;
                    let delta_engine = self.deltas.get(metadata.delta_engine_id())?;
                    let uncompressor = self.compressors.get(metadata.compression_engine_id())?;
                    let delta = uncompressor.uncompress(&metadata.blob)?;
                    let data = delta_engine.apply(&old_section.data, &delta)?;
                    LocalSectionParts {
                        local: metadata.refresh.local,
                        data,
                        descriptor: metadata.refresh.descriptor,
                    }
                }
                PatchDirective::New(metadata) => LocalSectionParts {
                    local: metadata.refresh.local,
                    data: metadata.blob,
                    descriptor: metadata.refresh.descriptor,
                },
            };
            local_sections.push(section);
        }

        if local_sections.len() != begin.central_directory.len() {
            return Err(Error::InvalidArchive(
                "Patch stream produced a different number of entries than its BEGIN directive declared",
            ));
        }

        let mut archive = Archive::from_parts(local_sections, begin.central_directory)?;
        archive.finalize()?;
        Ok(archive)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::builder::ArchiveBuilder;
    use crate::patch::generator::PatchGenerator;

    fn build(entries: &[(&str, &[u8])]) -> Archive {
        let mut builder = ArchiveBuilder::new();
        for (name, contents) in entries {
            builder.add_entry(name, 0, contents).unwrap();
        }
        builder.finish().unwrap()
    }

    #[test]
    fn round_trips_a_mixed_patch() {
        let old = build(&[
            ("unchanged.txt", b"same bytes"),
            ("renamed_meta.txt", b"same payload"),
            ("modified.txt", b"before"),
            ("gone.txt", b"will be dropped"),
        ]);
        let new = build(&[
            ("unchanged.txt", b"same bytes"),
            ("renamed_meta.txt", b"same payload"),
            ("modified.txt", b"after, and longer"),
            ("brand_new.txt", b"hello from the future"),
        ]);

        let generated = PatchGenerator::with_defaults().generate(&old, &new).unwrap();
        assert_eq!(generated.report.copied, 1);
        assert_eq!(generated.report.patched, 1);
        assert_eq!(generated.report.added, 1);
        assert_eq!(generated.report.removed, 1);

        let applied = PatchApplier::with_defaults().apply(&old, &generated.bytes).unwrap();
        assert_eq!(applied, new);
    }

    #[test]
    fn round_trips_when_only_metadata_changes() {
        let old = build(&[("a.txt", b"payload")]);
        // Same bytes, but without a data descriptor this time: the local
        // header's flags/sizes layout differs even though the payload
        // doesn't, which is exactly the REFRESH case (§4.4).
        let mut builder = ArchiveBuilder::new().use_data_descriptor(false);
        builder.add_entry("a.txt", 0, b"payload").unwrap();
        let new = builder.finish().unwrap();

        let generated = PatchGenerator::with_defaults().generate(&old, &new).unwrap();
        assert_eq!(generated.report.refreshed, 1);

        let applied = PatchApplier::with_defaults().apply(&old, &generated.bytes).unwrap();
        assert_eq!(applied, new);
    }

    #[test]
    fn unknown_delta_engine_id_in_a_patch_directive_is_an_error() {
        let old = build(&[("a.txt", b"before")]);
        let new = build(&[("a.txt", b"after")]);
        let generated = PatchGenerator::with_defaults().generate(&old, &new).unwrap();

        let applier = PatchApplier::new(DeltaRegistry::new(), crate::registry::default_compression_registry());
        let err = applier.apply(&old, &generated.bytes).unwrap_err();
        assert!(matches!(err, Error::UnknownEngine { kind: "delta", .. }));
    }
}
