//! Owned handles to `/proc/<pid>/ns/<kind>` files.

use std::os::unix::prelude::RawFd;
use std::path::PathBuf;

use crate::error::NamespaceError;
use crate::kind::NamespaceKind;

/// An open (or not yet opened) namespace file, tagged with its kind. The
/// entry engine owns a handle for the duration of one task; the fd is
/// opened lazily and closed exactly once.
#[derive(Debug)]
pub(crate) struct NsHandle {
    pub(crate) path: PathBuf,
    pub(crate) kind: NamespaceKind,
    pub(crate) fd: Option<RawFd>,
}

impl NsHandle {
    pub(crate) fn new(path: PathBuf, kind: NamespaceKind) -> Self {
        NsHandle {
            path,
            kind,
            fd: None,
        }
    }
}

#[cfg(target_os = "linux")]
impl NsHandle {
    /// Opens the backing namespace file read-only. Re-init on an already
    /// open handle is a no-op; init after `deinit` opens a fresh fd.
    pub(crate) fn init(&mut self) -> Result<(), NamespaceError> {
        if self.fd.is_some() {
            return Ok(());
        }

        let fd = nix::fcntl::open(
            &self.path,
            nix::fcntl::OFlag::O_RDONLY | nix::fcntl::OFlag::O_CLOEXEC,
            nix::sys::stat::Mode::empty(),
        )
        .map_err(|source| NamespaceError::Open {
            path: self.path.clone(),
            source,
        })?;
        self.fd = Some(fd);

        Ok(())
    }

    /// Moves the calling thread into this namespace. The mount namespace
    /// cannot be entered here: it is irreversible for the calling thread
    /// and is only ever joined by the forked worker.
    pub(crate) fn enter(&self) -> Result<(), NamespaceError> {
        match self.kind {
            NamespaceKind::Uts
            | NamespaceKind::Ipc
            | NamespaceKind::User
            | NamespaceKind::Pid
            | NamespaceKind::Net => {}
            _ => return Err(NamespaceError::NotImplemented),
        }

        // An unopened handle surfaces the kernel's EBADF.
        let fd = self.fd.unwrap_or(-1);
        nix::sched::setns(fd, self.kind.clone_flags()).map_err(|errno| NamespaceError::Enter {
            kind: self.kind,
            errno,
        })
    }

    /// Closes the fd; double-deinit is a no-op. The handle may be
    /// re-initialized afterwards for another run.
    pub(crate) fn deinit(&mut self) {
        if let Some(fd) = self.fd.take() {
            let _ = nix::unistd::close(fd);
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl NsHandle {
    pub(crate) fn init(&mut self) -> Result<(), NamespaceError> {
        Err(NamespaceError::NotImplemented)
    }

    pub(crate) fn enter(&self) -> Result<(), NamespaceError> {
        Err(NamespaceError::NotImplemented)
    }

    pub(crate) fn deinit(&mut self) {
        self.fd = None;
    }
}

impl Drop for NsHandle {
    fn drop(&mut self) {
        self.deinit();
    }
}
