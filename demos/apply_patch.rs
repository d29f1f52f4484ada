use std::fs;
use std::path::PathBuf;

use anyhow::*;
use log::*;
use structopt::*;

use zipatch::{Archive, PatchApplier};

#[derive(Debug, StructOpt)]
#[structopt(name = "apply-patch", about = "Applies a structural patch to a ZIP archive")]
struct Opt {
    /// Pass multiple times for additional verbosity (info, debug, trace)
    #[structopt(short, long, parse(from_occurrences))]
    verbosity: usize,

    /// Decompress and check every entry's CRC-32 after applying the patch.
    #[structopt(long)]
    verify: bool,

    #[structopt(name("old ZIP"))]
    old_path: PathBuf,

    #[structopt(name("patch"))]
    patch_path: PathBuf,

    #[structopt(name("new ZIP output"))]
    new_path: PathBuf,
}

fn main() -> Result<()> {
    let args = Opt::from_args();

    let mut errlog = stderrlog::new();
    errlog.verbosity(args.verbosity + 1);
    errlog.init()?;

    info!("Reading {:#?}", &args.old_path);
    let old_bytes = fs::read(&args.old_path).with_context(|| format!("Couldn't read {}", args.old_path.display()))?;
    let old = Archive::load(&old_bytes).context("Couldn't parse old archive")?;

    info!("Reading {:#?}", &args.patch_path);
    let patch_bytes =
        fs::read(&args.patch_path).with_context(|| format!("Couldn't read {}", args.patch_path.display()))?;

    let new = PatchApplier::with_defaults()
        .apply(&old, &patch_bytes)
        .context("Couldn't apply patch")?;

    if args.verify {
        info!("Verifying CRC-32s of the reconstructed archive");
        new.verify_crc32().context("Reconstructed archive failed CRC verification")?;
    }

    let bytes = new.serialize().context("Couldn't serialize the reconstructed archive")?;
    fs::write(&args.new_path, &bytes).with_context(|| format!("Couldn't write {}", args.new_path.display()))?;
    Ok(())
}
