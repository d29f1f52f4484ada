use std::fs;
use std::path::PathBuf;

use anyhow::*;
use log::*;
use structopt::*;

use zipatch::{Archive, PatchGenerator};

#[derive(Debug, StructOpt)]
#[structopt(name = "gen-patch", about = "Generates a structural patch between two ZIP archives")]
struct Opt {
    /// Pass multiple times for additional verbosity (info, debug, trace)
    #[structopt(short, long, parse(from_occurrences))]
    verbosity: usize,

    #[structopt(name("old ZIP"))]
    old_path: PathBuf,

    #[structopt(name("new ZIP"))]
    new_path: PathBuf,

    #[structopt(name("patch output"))]
    patch_path: PathBuf,
}

fn main() -> Result<()> {
    let args = Opt::from_args();

    let mut errlog = stderrlog::new();
    errlog.verbosity(args.verbosity + 1);
    errlog.init()?;

    info!("Reading {:#?}", &args.old_path);
    let old_bytes = fs::read(&args.old_path).with_context(|| format!("Couldn't read {}", args.old_path.display()))?;
    let old = Archive::load(&old_bytes).context("Couldn't parse old archive")?;

    info!("Reading {:#?}", &args.new_path);
    let new_bytes = fs::read(&args.new_path).with_context(|| format!("Couldn't read {}", args.new_path.display()))?;
    let new = Archive::load(&new_bytes).context("Couldn't parse new archive")?;

    let generated = PatchGenerator::with_defaults()
        .generate(&old, &new)
        .context("Couldn't generate patch")?;
    println!("{}", generated.report);

    fs::write(&args.patch_path, &generated.bytes)
        .with_context(|| format!("Couldn't write {}", args.patch_path.display()))?;
    Ok(())
}
