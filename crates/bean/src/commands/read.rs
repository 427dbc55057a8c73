use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

/// Read a file from the specified namespace
#[derive(Parser, Debug)]
pub struct Read {
    /// File to read
    pub artifact: PathBuf,
}

pub fn read(args: Read, ns_path: &Path) -> Result<()> {
    let data = libnamespace::read_file(&args.artifact, ns_path)
        .with_context(|| format!("read file {} failed", args.artifact.display()))?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&data)?;
    stdout.flush()?;

    Ok(())
}
