//! Forked-worker strategy.
//!
//! Entering a mount namespace is a one-way door for the calling thread, so
//! the engine forks a worker, lets it join the target namespaces and run
//! the task, and only the exit status travels back. Fork takes care of
//! moving the task payload into the child; compared to clone this keeps
//! the borrow checker out of the picture entirely.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::prelude::RawFd;
use std::process;

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};

use crate::error::NamespaceError;
use crate::kind;
use crate::namespace::Namespace;
use crate::task::Task;

/// Forks and runs `cb` in the child; the closure's return value becomes
/// the child's exit status. The parent gets the child's pid and is
/// responsible for reaping it.
pub(crate) fn fork_worker<F>(cb: F) -> Result<Pid, NamespaceError>
where
    F: FnOnce() -> i32,
{
    match unsafe { unistd::fork().map_err(NamespaceError::Fork)? } {
        ForkResult::Parent { child } => Ok(child),
        ForkResult::Child => process::exit(cb()),
    }
}

/// Forks a worker that joins the namespaces described by `namespace` and
/// runs `task`. Returns without waiting; streaming operations read the
/// worker's pipe before reaping it.
pub(crate) fn spawn(namespace: &Namespace, task: Task<'_>) -> Result<Pid, NamespaceError> {
    fork_worker(move || child_main(namespace, task))
}

/// Forks a worker, waits for it and maps its exit status: zero is
/// success, anything else the opaque execute failure (the child's
/// diagnostic already went to stderr).
pub(crate) fn execute(namespace: &Namespace, task: Task<'_>) -> Result<(), NamespaceError> {
    let child = spawn(namespace, task)?;
    wait_for(child)
}

pub(crate) fn wait_for(child: Pid) -> Result<(), NamespaceError> {
    match waitpid(child, None).map_err(NamespaceError::Wait)? {
        WaitStatus::Exited(_, 0) => Ok(()),
        _ => Err(NamespaceError::Execute),
    }
}

fn child_main(namespace: &Namespace, task: Task<'_>) -> i32 {
    // Open every requested namespace file first, then enter them in
    // dependency order; kinds the builder already skipped are not in
    // `flags` and stay untouched.
    let mut handles = Vec::with_capacity(namespace.targets.len());
    for kind in kind::ENTRY_ORDER {
        if namespace.flags & kind.flag() == 0 {
            continue;
        }
        let Some(target) = namespace.targets.iter().find(|t| t.kind == kind) else {
            continue;
        };
        match nix::fcntl::open(
            &target.path,
            nix::fcntl::OFlag::O_RDONLY | nix::fcntl::OFlag::O_CLOEXEC,
            nix::sys::stat::Mode::empty(),
        ) {
            Ok(fd) => handles.push((kind, fd)),
            Err(errno) => {
                eprintln!(
                    "failed to open namespace file {}: {}",
                    target.path.display(),
                    errno
                );
                return 1;
            }
        }
    }

    for (kind, fd) in &handles {
        if let Err(errno) = nix::sched::setns(*fd, kind.clone_flags()) {
            eprintln!("failed to enter {kind} namespace: {errno}");
            return 1;
        }
    }

    let status = match task {
        Task::Function(f) => f(),
        Task::Program { program, args } => {
            // execvp only returns on failure; the namespace fds are
            // close-on-exec and vanish with the successful exec.
            match exec_program(&program, &args) {
                Ok(never) => match never {},
                Err(errno) => {
                    eprintln!("failed to exec {}: {}", program.display(), errno);
                    return 1;
                }
            }
        }
    };

    for (_, fd) in handles {
        let _ = unistd::close(fd);
    }

    status
}

fn exec_program(
    program: &std::path::Path,
    args: &[std::ffi::OsString],
) -> Result<std::convert::Infallible, Errno> {
    let file = CString::new(program.as_os_str().as_bytes()).map_err(|_| Errno::EINVAL)?;
    let argv0 = program
        .file_name()
        .map(|name| name.as_bytes())
        .unwrap_or_else(|| program.as_os_str().as_bytes());
    let mut argv = Vec::with_capacity(args.len() + 1);
    argv.push(CString::new(argv0).map_err(|_| Errno::EINVAL)?);
    for arg in args {
        argv.push(CString::new(arg.as_bytes()).map_err(|_| Errno::EINVAL)?);
    }
    unistd::execvp(&file, &argv)
}

/// Writes the whole buffer, retrying interrupted and short writes.
pub(crate) fn write_all(fd: RawFd, mut data: &[u8]) -> Result<(), Errno> {
    while !data.is_empty() {
        match unistd::write(fd, data) {
            Ok(0) => return Err(Errno::EIO),
            Ok(written) => data = &data[written..],
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(errno),
        }
    }
    Ok(())
}

/// Drains a pipe until EOF.
pub(crate) fn read_to_end(fd: RawFd) -> Result<Vec<u8>, Errno> {
    let mut out = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match unistd::read(fd, &mut buf) {
            Ok(0) => return Ok(out),
            Ok(count) => out.extend_from_slice(&buf[..count]),
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(errno),
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{bail, Result};
    use nix::unistd::getpid;

    use super::*;
    use crate::kind::NamespaceKind;

    fn empty_namespace() -> Result<Namespace> {
        // Using our own pid leaves nothing to enter, so the worker only
        // exercises the fork/exit-status plumbing.
        Ok(Namespace::builder()
            .pid(getpid().as_raw())
            .kinds([NamespaceKind::Mnt])
            .build()?)
    }

    #[test]
    fn test_fork_worker_reports_exit_status() -> Result<()> {
        let child = fork_worker(|| 0)?;
        match waitpid(child, None)? {
            WaitStatus::Exited(pid, 0) => assert_eq!(pid, child),
            status => bail!("unexpected wait status: {status:?}"),
        }

        let child = fork_worker(|| 7)?;
        match waitpid(child, None)? {
            WaitStatus::Exited(_, 7) => Ok(()),
            status => bail!("unexpected wait status: {status:?}"),
        }
    }

    #[test]
    fn test_execute_maps_task_status() -> Result<()> {
        let namespace = empty_namespace()?;
        execute(&namespace, Task::function(|| 0))?;

        match execute(&namespace, Task::function(|| 3)) {
            Err(NamespaceError::Execute) => Ok(()),
            other => bail!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_execute_program_task() -> Result<()> {
        let namespace = empty_namespace()?;
        execute(&namespace, Task::program("true", Vec::<String>::new()))?;

        match execute(&namespace, Task::program("false", Vec::<String>::new())) {
            Err(NamespaceError::Execute) => {}
            other => bail!("unexpected result: {other:?}"),
        }

        match execute(
            &namespace,
            Task::program("/no/such/binary", Vec::<String>::new()),
        ) {
            Err(NamespaceError::Execute) => Ok(()),
            other => bail!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_pipe_round_trip() -> Result<()> {
        let (read_end, write_end) = unistd::pipe()?;
        let payload = vec![7u8; 100_000];
        let expected = payload.clone();

        let child = fork_worker(move || {
            let _ = unistd::close(read_end);
            match write_all(write_end, &payload) {
                Ok(()) => 0,
                Err(_) => 1,
            }
        })?;
        let _ = unistd::close(write_end);

        let received = read_to_end(read_end)?;
        let _ = unistd::close(read_end);
        wait_for(child)?;

        assert_eq!(received, expected);
        Ok(())
    }
}
