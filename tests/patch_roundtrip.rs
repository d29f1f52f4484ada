use std::fs;

use anyhow::{Context, Result};

use zipatch::patch::generator::PatchGenerator;
use zipatch::{Archive, ArchiveBuilder, PatchApplier};

fn build(entries: &[(&str, &[u8])]) -> Result<Archive> {
    let mut builder = ArchiveBuilder::new();
    for (name, contents) in entries {
        builder.add_entry(name, 0, contents)?;
    }
    Ok(builder.finish()?)
}

#[test]
fn unchanged_archive_round_trips_as_all_copies() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let old = build(&[("readme.txt", b"hello"), ("data.bin", b"\x00\x01\x02\x03")])?;
    let new = build(&[("readme.txt", b"hello"), ("data.bin", b"\x00\x01\x02\x03")])?;

    let generated = PatchGenerator::with_defaults().generate(&old, &new)?;
    assert_eq!(generated.report.copied, 2);
    assert_eq!(generated.report.patched + generated.report.refreshed + generated.report.added, 0);

    let applied = PatchApplier::with_defaults().apply(&old, &generated.bytes)?;
    assert_eq!(applied, new);
    applied.verify_crc32()?;
    Ok(())
}

#[test]
fn a_changed_payload_produces_a_correct_patch_directive() -> Result<()> {
    let old = build(&[("log.txt", b"line one\n")])?;
    let new = build(&[("log.txt", b"line one\nline two\n")])?;

    let generated = PatchGenerator::with_defaults().generate(&old, &new)?;
    assert_eq!(generated.report.patched, 1);

    let applied = PatchApplier::with_defaults().apply(&old, &generated.bytes)?;
    assert_eq!(applied, new);
    applied.verify_crc32()?;

    let (_, central) = applied.find_by_name("log.txt").context("missing entry")?;
    assert_eq!(central.uncompressed_size, b"line one\nline two\n".len() as u32);
    Ok(())
}

#[test]
fn an_entry_that_only_exists_in_the_new_archive_is_added_verbatim() -> Result<()> {
    let old = build(&[("a.txt", b"a")])?;
    let new = build(&[("a.txt", b"a"), ("b.txt", b"brand new file")])?;

    let generated = PatchGenerator::with_defaults().generate(&old, &new)?;
    assert_eq!(generated.report.added, 1);

    let applied = PatchApplier::with_defaults().apply(&old, &generated.bytes)?;
    assert_eq!(applied, new);
    Ok(())
}

#[test]
fn an_entry_dropped_from_the_new_archive_does_not_appear_in_the_result() -> Result<()> {
    let old = build(&[("a.txt", b"a"), ("gone.txt", b"will vanish")])?;
    let new = build(&[("a.txt", b"a")])?;

    let generated = PatchGenerator::with_defaults().generate(&old, &new)?;
    assert_eq!(generated.report.removed, 1);

    let applied = PatchApplier::with_defaults().apply(&old, &generated.bytes)?;
    assert_eq!(applied, new);
    assert!(applied.find_by_name("gone.txt").is_none());
    Ok(())
}

#[test]
fn a_patch_round_trips_through_a_file_on_disk() -> Result<()> {
    let old = build(&[("a.txt", b"before"), ("b.txt", b"unchanged")])?;
    let new = build(&[("a.txt", b"after, and different length"), ("b.txt", b"unchanged")])?;

    let generated = PatchGenerator::with_defaults().generate(&old, &new)?;

    let dir = tempfile::tempdir()?;
    let patch_path = dir.path().join("patch.bin");
    fs::write(&patch_path, &generated.bytes)?;

    let read_back = fs::read(&patch_path)?;
    let applied = PatchApplier::with_defaults().apply(&old, &read_back)?;
    assert_eq!(applied, new);
    Ok(())
}

#[test]
fn an_applier_without_a_registered_delta_engine_errors_instead_of_guessing() -> Result<()> {
    let old = build(&[("a.txt", b"before")])?;
    let new = build(&[("a.txt", b"after")])?;
    let generated = PatchGenerator::with_defaults().generate(&old, &new)?;

    let applier = zipatch::PatchApplier::new(
        zipatch::registry::DeltaRegistry::new(),
        zipatch::registry::default_compression_registry(),
    );
    assert!(applier.apply(&old, &generated.bytes).is_err());
    Ok(())
}
