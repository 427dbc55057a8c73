use std::path::PathBuf;

use crate::kind::NamespaceKind;

/// Errors surfaced by the namespace engine and the convenience operations.
#[derive(Debug, thiserror::Error)]
pub enum NamespaceError {
    #[error("namespace id is not specified")]
    Configuration,
    #[error("failed to read namespace link {path:?}")]
    Procfs {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[cfg(target_os = "linux")]
    #[error("failed to open namespace file {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: nix::errno::Errno,
    },
    #[cfg(target_os = "linux")]
    #[error("failed to enter {kind} namespace")]
    Enter {
        kind: NamespaceKind,
        #[source]
        errno: nix::errno::Errno,
    },
    /// The task signalled failure with a non-zero status in the in-thread
    /// strategy.
    #[error("task exited with status {0}")]
    Task(i32),
    /// The forked worker exited non-zero; the child's diagnostic went to
    /// its standard error.
    #[error("namespace execute failed")]
    Execute,
    #[cfg(target_os = "linux")]
    #[error("failed to fork namespace worker")]
    Fork(#[source] nix::errno::Errno),
    #[cfg(target_os = "linux")]
    #[error("failed to wait for namespace worker")]
    Wait(#[source] nix::errno::Errno),
    #[cfg(target_os = "linux")]
    #[error("failed to create worker pipe")]
    Pipe(#[source] nix::errno::Errno),
    /// An OS error that occurred inside the worker, replayed in the
    /// calling process.
    #[cfg(target_os = "linux")]
    #[error("{0}")]
    Errno(nix::errno::Errno),
    #[error("unexpected framing in streamed output")]
    Framing,
    #[error("failed to decode worker result")]
    Bridge(#[from] serde_json::Error),
    #[error("not implemented")]
    NotImplemented,
}
