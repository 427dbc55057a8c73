//! Target specification and the namespace-entry engine.
//!
//! A [`Namespace`] is the immutable plan for one target process: which
//! namespace kinds to enter and the procfs links backing them. Building it
//! diffs the calling thread's namespaces against the target's, so kinds the
//! caller already shares with the target are dropped up front. Executing a
//! task then either enters the remaining namespaces on the calling thread
//! (and restores them afterwards), or hands the task to a forked worker
//! when the mount namespace is involved, since a thread that entered a
//! foreign mount namespace cannot leave it again.

use std::path::PathBuf;

use libc::c_int;

use crate::error::NamespaceError;
use crate::handle::NsHandle;
use crate::kind::NamespaceKind;
use crate::task::{self, Task};
#[cfg(target_os = "linux")]
use crate::worker;

/// The immutable entry plan for one target process.
#[derive(Debug)]
pub struct Namespace {
    pub(crate) proc_root: PathBuf,
    pub(crate) pid: i32,
    pub(crate) currents: Vec<NsHandle>,
    pub(crate) targets: Vec<NsHandle>,
    /// OR of the flags of every kind that actually needs entering.
    pub(crate) flags: c_int,
}

/// Builds a [`Namespace`] from the target pid, the requested kinds and an
/// optional prefix for hosts whose procfs is mounted away from `/proc`.
#[derive(Debug, Default)]
pub struct NamespaceBuilder {
    pid: Option<i32>,
    kinds: Vec<NamespaceKind>,
    proc_root_prefix: Option<PathBuf>,
}

impl NamespaceBuilder {
    /// The process whose namespaces are to be entered. Required.
    pub fn pid(mut self, pid: i32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// The namespace kinds to enter, in the order they should be joined.
    pub fn kinds<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = NamespaceKind>,
    {
        self.kinds = kinds.into_iter().collect();
        self
    }

    /// Prefix prepended to `/proc` when resolving the target's namespace
    /// links, for callers whose host procfs is bind-mounted elsewhere.
    pub fn proc_root_prefix<P: Into<PathBuf>>(mut self, prefix: P) -> Self {
        self.proc_root_prefix = Some(prefix.into());
        self
    }

    pub fn build(self) -> Result<Namespace, NamespaceError> {
        let pid = match self.pid {
            Some(pid) if pid > 0 => pid,
            _ => return Err(NamespaceError::Configuration),
        };

        let proc_root = match &self.proc_root_prefix {
            Some(prefix) if !prefix.as_os_str().is_empty() => prefix.join("proc"),
            _ => PathBuf::from("/proc"),
        };

        let mut namespace = Namespace {
            proc_root,
            pid,
            currents: Vec::new(),
            targets: Vec::new(),
            flags: 0,
        };
        namespace.resolve(&self.kinds)?;

        Ok(namespace)
    }
}

impl Namespace {
    pub fn builder() -> NamespaceBuilder {
        NamespaceBuilder::default()
    }

    /// Diffs the calling thread's namespace links against the target's.
    /// Kinds whose links already match are skipped entirely; the rest get a
    /// current/target handle pair so the engine can enter and later
    /// restore them.
    #[cfg(target_os = "linux")]
    fn resolve(&mut self, kinds: &[NamespaceKind]) -> Result<(), NamespaceError> {
        if kinds.is_empty() {
            return Ok(());
        }

        let current_base = PathBuf::from(format!(
            "/proc/{}/task/{}/ns",
            nix::unistd::getpid(),
            nix::unistd::gettid()
        ));
        let target_base = self.proc_root.join(self.pid.to_string()).join("ns");

        for &kind in kinds {
            let current_path = current_base.join(kind.name());
            let target_path = target_base.join(kind.name());

            let current_link =
                std::fs::read_link(&current_path).map_err(|source| NamespaceError::Procfs {
                    path: current_path.clone(),
                    source,
                })?;
            let target_link =
                std::fs::read_link(&target_path).map_err(|source| NamespaceError::Procfs {
                    path: target_path.clone(),
                    source,
                })?;

            if current_link == target_link {
                tracing::debug!(%kind, pid = self.pid, "already in target namespace, skipping");
                continue;
            }

            self.currents.push(NsHandle::new(current_path, kind));
            self.targets.push(NsHandle::new(target_path, kind));
            self.flags |= kind.flag();
        }

        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn resolve(&mut self, _kinds: &[NamespaceKind]) -> Result<(), NamespaceError> {
        Ok(())
    }

    /// Runs `task` inside the target namespaces.
    ///
    /// When every requested namespace already matches the caller's, the
    /// task runs directly. When the mount namespace needs entering, the
    /// task runs in a forked worker and only its exit status travels back.
    /// Otherwise the calling thread enters the namespaces, runs the task
    /// and is restored to its original set before this returns, on success
    /// and failure alike.
    #[cfg(target_os = "linux")]
    #[tracing::instrument(level = "debug", skip_all, fields(pid = self.pid, flags = self.flags))]
    pub fn execute(&mut self, task: Task<'_>) -> Result<(), NamespaceError> {
        if self.currents.is_empty() {
            tracing::debug!("no namespace to enter, running task in place");
            return task::run_in_place(task);
        }

        if self.flags & NamespaceKind::Mnt.flag() != 0 {
            worker::execute(self, task)
        } else {
            self.execute_in_thread(task)
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn execute(&mut self, _task: Task<'_>) -> Result<(), NamespaceError> {
        Err(NamespaceError::NotImplemented)
    }

    #[cfg(target_os = "linux")]
    fn execute_in_thread(&mut self, task: Task<'_>) -> Result<(), NamespaceError> {
        let mut resume = None;
        let result = enter_and_run(&mut self.currents, &mut self.targets, &mut resume, task);

        // Restore the original namespaces for every target that was
        // actually entered, then release every handle, regardless of how
        // the task went.
        if let Some(last) = resume {
            for current in self.currents.iter().take(last + 1) {
                if let Err(err) = current.enter() {
                    tracing::error!(kind = %current.kind, ?err, "failed to restore namespace");
                }
            }
        }
        for target in self.targets.iter_mut() {
            target.deinit();
        }
        for current in self.currents.iter_mut() {
            current.deinit();
        }

        result
    }
}

#[cfg(target_os = "linux")]
fn enter_and_run(
    currents: &mut [NsHandle],
    targets: &mut [NsHandle],
    resume: &mut Option<usize>,
    task: Task<'_>,
) -> Result<(), NamespaceError> {
    for current in currents.iter_mut() {
        current.init()?;
    }

    for (index, target) in targets.iter_mut().enumerate() {
        target.init()?;
        tracing::debug!(kind = %target.kind, path = %target.path.display(), "entering namespace");
        target.enter()?;
        *resume = Some(index);
    }

    task::run_in_place(task)
}
