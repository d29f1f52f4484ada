//! Plans a directive stream that turns an old archive into a new one
//! (§4.4): COPY where nothing changed, REFRESH where only metadata
//! moved, PATCH where the payload changed, NEW for entries the old
//! archive never had.

use std::collections::HashMap;
use std::fmt;

use crate::archive::Archive;
use crate::patch::{self, BeginMetadata, NewMetadata, PatchDirective, PatchMetadata, RefreshMetadata};
use crate::registry::{Compressor, DeltaGenerator};
use crate::result::Result;

/// Ordered delta and compression engines the generator tries in turn;
/// the first one that [`DeltaGenerator::accepts`]/[`Compressor::accepts`]
/// wins (§4.4).
pub struct PatchGenerator {
    delta_generators: Vec<Box<dyn DeltaGenerator>>,
    compressors: Vec<Box<dyn Compressor>>,
}

impl PatchGenerator {
    pub fn new(delta_generators: Vec<Box<dyn DeltaGenerator>>, compressors: Vec<Box<dyn Compressor>>) -> Self {
        Self {
            delta_generators,
            compressors,
        }
    }

    /// A generator using the reference whole-replace delta and raw
    /// DEFLATE engines (see [`crate::registry`]).
    pub fn with_defaults() -> Self {
        Self::new(
            crate::registry::default_delta_generators(),
            crate::registry::default_compression_engines(),
        )
    }

    fn pick_delta(&self, old: &[u8], new: &[u8]) -> Result<(&dyn DeltaGenerator, Vec<u8>)> {
        for engine in &self.delta_generators {
            if engine.accepts(old, new) {
                let delta = engine.generate(old, new)?;
                return Ok((engine.as_ref(), delta));
            }
        }
        // default_delta_generators always includes an always-accepting
        // engine, so an empty list here means the caller built a custom
        // one without a catch-all.
        Err(crate::result::Error::InvalidArchive(
            "No registered delta generator accepts this pair of payloads",
        ))
    }

    fn pick_compressor(&self, bytes: &[u8]) -> Result<(&dyn Compressor, Vec<u8>)> {
        for engine in &self.compressors {
            if engine.accepts(bytes) {
                let compressed = engine.compress(bytes)?;
                return Ok((engine.as_ref(), compressed));
            }
        }
        Err(crate::result::Error::InvalidArchive(
            "No registered compressor accepts this blob",
        ))
    }

    /// Diffs `old` against `new` and returns the wire-ready patch bytes
    /// plus a human-readable [`PatchReport`].
    pub fn generate(&self, old: &Archive, new: &Archive) -> Result<GeneratedPatch> {
        let old_by_name: HashMap<&str, usize> = old
            .central_directory()
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.as_str(), i))
            .collect();
        let new_names: std::collections::HashSet<&str> =
            new.central_directory().iter().map(|c| c.name.as_str()).collect();

        let mut report = PatchReport::default();
        let mut directives = Vec::with_capacity(new.central_directory().len() + 1);
        directives.push(PatchDirective::Begin(BeginMetadata {
            central_directory: new.central_directory().to_vec(),
            eocd: new.eocd().clone(),
        }));

        for (new_section, new_central) in new.local_sections().iter().zip(new.central_directory()) {
            match old_by_name.get(new_central.name.as_str()) {
                None => {
                    report.added += 1;
                    directives.push(PatchDirective::New(NewMetadata {
                        refresh: RefreshMetadata {
                            local: new_section.local.clone(),
                            descriptor: new_section.descriptor,
                        },
                        blob: new_section.data.clone(),
                    }));
                }
                Some(&i) => {
                    let old_section = &old.local_sections()[i];
                    let old_central = &old.central_directory()[i];
                    let offset = old_central.header_offset;

                    if old_central.position_independent_eq(new_central) {
                        report.copied += 1;
                        directives.push(PatchDirective::Copy { offset });
                    } else if old_central.payload_eq(new_central) {
                        report.refreshed += 1;
                        directives.push(PatchDirective::Refresh {
                            offset,
                            metadata: RefreshMetadata {
                                local: new_section.local.clone(),
                                descriptor: new_section.descriptor,
                            },
                        });
                    } else {
                        let (delta_engine, delta) = self.pick_delta(&old_section.data, &new_section.data)?;
                        let (compressor, blob) = self.pick_compressor(&delta)?;
                        log::trace!(
                            "{}: delta engine {}, compression engine {}, {} byte blob",
                            new_central.name,
                            delta_engine.id(),
                            compressor.id(),
                            blob.len()
                        );
                        report.patched += 1;
                        report.patch_blob_bytes += blob.len();
                        directives.push(PatchDirective::Patch {
                            offset,
                            metadata: PatchMetadata::new(
                                RefreshMetadata {
                                    local: new_section.local.clone(),
                                    descriptor: new_section.descriptor,
                                },
                                delta_engine.id(),
                                compressor.id(),
                                blob,
                            ),
                        });
                    }
                }
            }
        }

        report.removed = old
            .central_directory()
            .iter()
            .filter(|c| !new_names.contains(c.name.as_str()))
            .count();

        let bytes = patch::write_patch(patch::PATCH_VERSION, &directives);
        log::info!("generated patch: {report}");
        Ok(GeneratedPatch {
            version: patch::PATCH_VERSION,
            bytes,
            directives,
            report,
        })
    }
}

/// The result of [`PatchGenerator::generate`]: the serialized patch plus
/// the directives that produced it and a summary report.
pub struct GeneratedPatch {
    pub version: u32,
    pub bytes: Vec<u8>,
    pub directives: Vec<PatchDirective>,
    pub report: PatchReport,
}

/// A tally of what a generated patch does, for logging or display to a
/// human (§6.4's demo binaries print this).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchReport {
    pub copied: usize,
    pub refreshed: usize,
    pub patched: usize,
    pub added: usize,
    pub removed: usize,
    pub patch_blob_bytes: usize,
}

impl fmt::Display for PatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} copied, {} refreshed, {} patched ({} bytes of delta), {} added, {} removed",
            self.copied, self.refreshed, self.patched, self.patch_blob_bytes, self.added, self.removed
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::builder::ArchiveBuilder;

    fn build(entries: &[(&str, &[u8])]) -> Archive {
        let mut builder = ArchiveBuilder::new();
        for (name, contents) in entries {
            builder.add_entry(name, 0, contents).unwrap();
        }
        builder.finish().unwrap()
    }

    #[test]
    fn unchanged_archive_is_all_copies() {
        let old = build(&[("a.txt", b"hello"), ("b.txt", b"world")]);
        let new = build(&[("a.txt", b"hello"), ("b.txt", b"world")]);
        let generated = PatchGenerator::with_defaults().generate(&old, &new).unwrap();
        assert_eq!(generated.report.copied, 2);
        assert_eq!(generated.report.patched, 0);
        assert_eq!(generated.report.added, 0);
    }

    #[test]
    fn changed_payload_is_a_patch() {
        let old = build(&[("a.txt", b"hello")]);
        let new = build(&[("a.txt", b"hello, world")]);
        let generated = PatchGenerator::with_defaults().generate(&old, &new).unwrap();
        assert_eq!(generated.report.patched, 1);
        assert_eq!(generated.report.copied, 0);
    }

    #[test]
    fn new_entry_is_a_new_directive() {
        let old = build(&[("a.txt", b"hello")]);
        let new = build(&[("a.txt", b"hello"), ("b.txt", b"new file")]);
        let generated = PatchGenerator::with_defaults().generate(&old, &new).unwrap();
        assert_eq!(generated.report.copied, 1);
        assert_eq!(generated.report.added, 1);
    }

    #[test]
    fn dropped_entry_is_counted_as_removed() {
        let old = build(&[("a.txt", b"hello"), ("gone.txt", b"bye")]);
        let new = build(&[("a.txt", b"hello")]);
        let generated = PatchGenerator::with_defaults().generate(&old, &new).unwrap();
        assert_eq!(generated.report.removed, 1);
        // a "removed" entry never gets its own directive: BEGIN's central
        // directory already excludes it, which is enough.
        assert_eq!(generated.directives.len(), 2);
    }

    struct TaggedDelta(u32);

    impl DeltaGenerator for TaggedDelta {
        fn id(&self) -> u32 {
            self.0
        }

        fn accepts(&self, _old: &[u8], _new: &[u8]) -> bool {
            true
        }

        fn generate(&self, _old: &[u8], new: &[u8]) -> Result<Vec<u8>> {
            Ok(new.to_vec())
        }
    }

    #[test]
    fn the_first_accepting_delta_engine_in_the_list_wins() {
        let old = build(&[("a.txt", b"before")]);
        let new = build(&[("a.txt", b"after")]);
        let generator = PatchGenerator::new(
            vec![Box::new(TaggedDelta(111)), Box::new(TaggedDelta(222))],
            crate::registry::default_compression_engines(),
        );
        let generated = generator.generate(&old, &new).unwrap();
        let patch_directive = generated
            .directives
            .iter()
            .find_map(|d| match d {
                PatchDirective::Patch { metadata, .. } => Some(metadata),
                _ => None,
            })
            .unwrap();
        assert_eq!(patch_directive.delta_engine_id(), 111);
    }
}
