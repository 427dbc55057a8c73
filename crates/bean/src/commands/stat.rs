use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

/// Retrieve file metadata from the specified namespace
#[derive(Parser, Debug)]
pub struct Stat {
    /// File to stat
    pub artifact: PathBuf,
}

pub fn stat(args: Stat, ns_path: &Path) -> Result<()> {
    let info = libnamespace::stat(&args.artifact, ns_path)
        .with_context(|| format!("stat file {} failed", args.artifact.display()))?;

    let rendered = serde_json::to_string(&info)
        .with_context(|| format!("marshal file {} info failed", args.artifact.display()))?;
    println!("{rendered}");

    Ok(())
}
