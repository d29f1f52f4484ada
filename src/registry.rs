//! Pluggable delta and compression engines, keyed by a stable numeric id
//! (§4.6, §6.3).
//!
//! The core doesn't take a position on *which* byte-level diff algorithm
//! a caller uses; it only promises id→engine lookup and correct routing.
//! The reference engines registered by [`default_delta_generators`] and
//! [`default_delta_registry`] are a minimal, always-correct stand-in
//! (whole-payload replacement) for a real differ like bsdiff — a caller
//! wanting real deltas registers their own engine under the same id,
//! ahead of the reference engine, and the "first acceptor wins" rule
//! (§4.4) means the reference engine is never consulted.

use std::collections::HashMap;

use crate::result::{Error, Result};

/// Reserved id meaning "no transformation": the identity compressor, and
/// (for a delta) "ship the new payload verbatim".
pub const NONE: u32 = 0;
/// Default delta engine id used when an older patch version (1) omits
/// the engine id field.
pub const JAVAXDELTA: u32 = 1;
/// A second, independently registrable delta engine id.
pub const BSDIFF: u32 = 2;
/// Raw (headerless) DEFLATE, as required by the builder (§4.3).
pub const DEFLATE_RAW: u32 = 1;

pub trait DeltaGenerator {
    fn id(&self) -> u32;
    /// Returns true if this engine can produce a delta from `old` to `new`.
    fn accepts(&self, old: &[u8], new: &[u8]) -> bool;
    fn generate(&self, old: &[u8], new: &[u8]) -> Result<Vec<u8>>;
}

pub trait DeltaApplier {
    fn id(&self) -> u32;
    fn apply(&self, old: &[u8], delta: &[u8]) -> Result<Vec<u8>>;
}

pub trait Compressor {
    fn id(&self) -> u32;
    fn accepts(&self, bytes: &[u8]) -> bool;
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>>;
}

pub trait Uncompressor {
    fn id(&self) -> u32;
    fn uncompress(&self, bytes: &[u8]) -> Result<Vec<u8>>;
}

/// Lookup of [`DeltaApplier`]s by engine id, used by the patch applier.
#[derive(Default)]
pub struct DeltaRegistry {
    appliers: HashMap<u32, Box<dyn DeltaApplier>>,
}

impl DeltaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, applier: Box<dyn DeltaApplier>) {
        self.appliers.insert(applier.id(), applier);
    }

    pub fn get(&self, id: u32) -> Result<&dyn DeltaApplier> {
        self.appliers
            .get(&id)
            .map(|b| b.as_ref())
            .ok_or(Error::UnknownEngine { kind: "delta", id })
    }
}

/// Lookup of [`Uncompressor`]s by engine id, used by the patch applier.
#[derive(Default)]
pub struct CompressionRegistry {
    uncompressors: HashMap<u32, Box<dyn Uncompressor>>,
}

impl CompressionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, uncompressor: Box<dyn Uncompressor>) {
        self.uncompressors.insert(uncompressor.id(), uncompressor);
    }

    pub fn get(&self, id: u32) -> Result<&dyn Uncompressor> {
        self.uncompressors
            .get(&id)
            .map(|b| b.as_ref())
            .ok_or(Error::UnknownEngine {
                kind: "compression",
                id,
            })
    }
}

/// Reference delta engine: the "delta" is the new payload verbatim, and
/// applying it ignores the old payload entirely. Always accepts. See
/// the module docs for why this is a reasonable default rather than a
/// placeholder.
pub struct WholeReplaceDelta {
    id: u32,
}

impl WholeReplaceDelta {
    pub fn new(id: u32) -> Self {
        Self { id }
    }
}

impl DeltaGenerator for WholeReplaceDelta {
    fn id(&self) -> u32 {
        self.id
    }

    fn accepts(&self, _old: &[u8], _new: &[u8]) -> bool {
        true
    }

    fn generate(&self, _old: &[u8], new: &[u8]) -> Result<Vec<u8>> {
        Ok(new.to_vec())
    }
}

impl DeltaApplier for WholeReplaceDelta {
    fn id(&self) -> u32 {
        self.id
    }

    fn apply(&self, _old: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
        Ok(delta.to_vec())
    }
}

/// Identity compression: `NONE`.
pub struct IdentityCompression;

impl Compressor for IdentityCompression {
    fn id(&self) -> u32 {
        NONE
    }

    fn accepts(&self, _bytes: &[u8]) -> bool {
        true
    }

    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

impl Uncompressor for IdentityCompression {
    fn id(&self) -> u32 {
        NONE
    }

    fn uncompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// Raw (headerless) DEFLATE compression, matching the builder's output
/// format so PATCH blobs and archive payloads use the same codec.
pub struct DeflateRawCompression;

impl Compressor for DeflateRawCompression {
    fn id(&self) -> u32 {
        DEFLATE_RAW
    }

    fn accepts(&self, _bytes: &[u8]) -> bool {
        true
    }

    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        use std::io::Write;
        let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(bytes)?;
        Ok(encoder.finish()?)
    }
}

impl Uncompressor for DeflateRawCompression {
    fn id(&self) -> u32 {
        DEFLATE_RAW
    }

    fn uncompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        use std::io::Read;
        let mut decoder = flate2::read::DeflateDecoder::new(bytes);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }
}

/// The ordered delta-generator list a fresh [`crate::patch::generator::PatchGenerator`]
/// should be handed if the caller has no real differ to register: the
/// two reference engines under their reserved ids, `JAVAXDELTA` first.
pub fn default_delta_generators() -> Vec<Box<dyn DeltaGenerator>> {
    vec![
        Box::new(WholeReplaceDelta::new(JAVAXDELTA)),
        Box::new(WholeReplaceDelta::new(BSDIFF)),
    ]
}

/// A [`DeltaRegistry`] with the same two reference engines registered,
/// for the apply side.
pub fn default_delta_registry() -> DeltaRegistry {
    let mut registry = DeltaRegistry::new();
    registry.register(Box::new(WholeReplaceDelta::new(JAVAXDELTA)));
    registry.register(Box::new(WholeReplaceDelta::new(BSDIFF)));
    registry
}

/// The ordered compression-engine list for the generate side: raw
/// DEFLATE first, then the identity fallback.
pub fn default_compression_engines() -> Vec<Box<dyn Compressor>> {
    vec![Box::new(DeflateRawCompression), Box::new(IdentityCompression)]
}

/// A [`CompressionRegistry`] with `NONE` and `DEFLATE_RAW` registered,
/// for the apply side.
pub fn default_compression_registry() -> CompressionRegistry {
    let mut registry = CompressionRegistry::new();
    registry.register(Box::new(IdentityCompression));
    registry.register(Box::new(DeflateRawCompression));
    registry
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn whole_replace_delta_round_trips() {
        let engine = WholeReplaceDelta::new(BSDIFF);
        let delta = engine.generate(b"old payload", b"new payload").unwrap();
        let applied = DeltaApplier::apply(&engine, b"old payload", &delta).unwrap();
        assert_eq!(applied, b"new payload");
    }

    #[test]
    fn deflate_raw_round_trips() {
        let c = DeflateRawCompression;
        let compressed = c.compress(b"hello hello hello hello").unwrap();
        let decompressed = c.uncompress(&compressed).unwrap();
        assert_eq!(decompressed, b"hello hello hello hello");
    }

    #[test]
    fn unknown_engine_id_is_an_error() {
        let registry = default_delta_registry();
        assert!(matches!(
            registry.get(999),
            Err(Error::UnknownEngine { kind: "delta", id: 999 })
        ));
    }
}
