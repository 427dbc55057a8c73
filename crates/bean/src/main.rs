//! # Bean
//! Simple container file access utility. Reads a file, or its metadata,
//! as seen from a container's mount namespace, resolved either from a
//! container pid (`-p`) or from a ready-made namespace path in
//! `$CONTAINER_MOUNT`.

mod commands;
mod observability;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Simple container file access utility")]
struct Opts {
    /// Container initial process id; its mount namespace link is resolved
    /// under $HOSTFS/proc
    #[arg(short, long, global = true)]
    pid: Option<i32>,

    /// Change log level to debug
    #[arg(long, global = true)]
    debug: bool,

    /// Log format: text or json
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    subcmd: SubCommand,
}

#[derive(Subcommand, Debug)]
enum SubCommand {
    /// Read a file from the specified namespace
    Read(commands::read::Read),
    /// Retrieve file metadata from the specified namespace
    Stat(commands::stat::Stat),
}

fn main() -> ExitCode {
    let opts = Opts::parse();

    if let Err(err) = observability::init(opts.debug, opts.log_format.as_deref()) {
        eprintln!("log init failed: {err:?}");
        return ExitCode::FAILURE;
    }

    match run(opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(opts: Opts) -> Result<()> {
    let ns_path = resolve_namespace(opts.pid)?;
    match opts.subcmd {
        SubCommand::Read(read) => commands::read::read(read, &ns_path),
        SubCommand::Stat(stat) => commands::stat::stat(stat, &ns_path),
    }
}

/// With `-p`, the target's mount namespace link lives under the host
/// procfs, prefixed by $HOSTFS when the host /proc is mounted away from
/// its usual place. Without it, $CONTAINER_MOUNT must carry a ready-made
/// namespace path.
fn resolve_namespace(pid: Option<i32>) -> Result<PathBuf> {
    match pid {
        Some(pid) => {
            let hostfs = std::env::var("HOSTFS").unwrap_or_default();
            Ok(PathBuf::from(format!("{hostfs}/proc/{pid}/ns/mnt")))
        }
        None => match std::env::var("CONTAINER_MOUNT") {
            Ok(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => bail!("container namespace is not specified"),
        },
    }
}
