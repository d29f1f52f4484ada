//! `zipatch` reads and writes ZIP archives and computes or applies a
//! compact, structural patch between two of them.
//!
//! Rather than diffing archives byte-for-byte, the patch format
//! operates on the ZIP record structure: entries whose local section is
//! unchanged are copied by reference, entries whose metadata moved but
//! whose payload didn't are refreshed in place, and only entries whose
//! payload actually changed carry a delta. [`archive::Archive::load`]
//! parses an archive, [`builder::ArchiveBuilder`] builds one,
//! [`patch::generator::PatchGenerator`] diffs two of them, and
//! [`patch::applier::PatchApplier`] reconstructs the new archive from
//! the old one and a patch.
//!
//! Everything here runs synchronously against in-memory buffers; there
//! is no async runtime and no threading underneath (§5).

pub mod arch;
pub mod archive;
pub mod builder;
pub mod bytes;
mod crc_reader;
pub mod msdos;
pub mod patch;
pub mod registry;
pub mod result;
pub mod spec;

pub use archive::Archive;
pub use builder::ArchiveBuilder;
pub use patch::applier::PatchApplier;
pub use patch::generator::{GeneratedPatch, PatchGenerator, PatchReport};
pub use result::{Error, Result};
