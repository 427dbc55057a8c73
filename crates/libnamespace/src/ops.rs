//! Convenience operations built on the entry engine: stream several files
//! out of a target's mount namespace, or fetch one file's bytes or
//! metadata through a literal namespace path.

use std::path::{Path, PathBuf};

use crate::error::NamespaceError;
use crate::file::FileInfo;

/// Separator written between files on the cat pipe. Eight bytes that are
/// vanishingly unlikely to occur in text the operation is used for.
pub(crate) const CAT_SEPARATOR: &[u8] = b"\r\n\r\n\0\0\0\0";

/// Reads every path inside the mount namespace of `pid` and returns one
/// buffer per path, in order. A file the worker cannot read comes back as
/// an empty buffer, indistinguishable from a genuinely empty file.
#[cfg(target_os = "linux")]
pub fn cat(
    paths: &[PathBuf],
    pid: i32,
    proc_root_prefix: Option<&str>,
) -> Result<Vec<Vec<u8>>, NamespaceError> {
    use crate::kind::NamespaceKind;
    use crate::task::Task;
    use crate::worker;

    let mut builder = crate::Namespace::builder()
        .pid(pid)
        .kinds([NamespaceKind::Mnt]);
    if let Some(prefix) = proc_root_prefix {
        builder = builder.proc_root_prefix(prefix);
    }
    let namespace = builder.build()?;

    let (read_end, write_end) = nix::unistd::pipe().map_err(NamespaceError::Pipe)?;
    let files = paths.to_vec();
    let task = Task::function(move || write_files(write_end, &files));

    let child = match worker::spawn(&namespace, task) {
        Ok(child) => child,
        Err(err) => {
            let _ = nix::unistd::close(read_end);
            let _ = nix::unistd::close(write_end);
            return Err(err);
        }
    };
    let _ = nix::unistd::close(write_end);

    let output = worker::read_to_end(read_end);
    let _ = nix::unistd::close(read_end);
    let wait = worker::wait_for(child);

    let output = output.map_err(NamespaceError::Pipe)?;
    wait?;

    let pieces = split_stream(&output);
    if pieces.len() != paths.len() {
        return Err(NamespaceError::Framing);
    }
    Ok(pieces)
}

#[cfg(target_os = "linux")]
fn write_files(fd: std::os::unix::prelude::RawFd, files: &[PathBuf]) -> i32 {
    for (index, file) in files.iter().enumerate() {
        if index > 0 && crate::worker::write_all(fd, CAT_SEPARATOR).is_err() {
            return 1;
        }
        // unreadable files degrade to an empty buffer on the caller side
        let data = std::fs::read(file).unwrap_or_else(|err| {
            tracing::warn!(file = %file.display(), %err, "skipping unreadable file");
            Vec::new()
        });
        if crate::worker::write_all(fd, &data).is_err() {
            return 1;
        }
    }
    0
}

pub(crate) fn split_stream(data: &[u8]) -> Vec<Vec<u8>> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut cursor = 0;
    while cursor + CAT_SEPARATOR.len() <= data.len() {
        if &data[cursor..cursor + CAT_SEPARATOR.len()] == CAT_SEPARATOR {
            pieces.push(data[start..cursor].to_vec());
            cursor += CAT_SEPARATOR.len();
            start = cursor;
        } else {
            cursor += 1;
        }
    }
    pieces.push(data[start..].to_vec());
    pieces
}

/// Reads `path` as seen from the namespace behind `ns_path` (a literal
/// link such as `/proc/2233/ns/mnt`). OS errors hit by the worker are
/// replayed verbatim in the calling process.
#[cfg(target_os = "linux")]
pub fn read_file(
    path: impl AsRef<Path>,
    ns_path: impl AsRef<Path>,
) -> Result<Vec<u8>, NamespaceError> {
    let path = path.as_ref().to_path_buf();
    let ns_path = ns_path.as_ref().to_path_buf();
    fetch(ns_path, move |fd| {
        let data = std::fs::read(&path).map_err(io_errno)?;
        crate::worker::write_all(fd, &data)
    })
}

/// Stats `path` as seen from the namespace behind `ns_path`.
#[cfg(target_os = "linux")]
pub fn stat(path: impl AsRef<Path>, ns_path: impl AsRef<Path>) -> Result<FileInfo, NamespaceError> {
    let path = path.as_ref().to_path_buf();
    let ns_path = ns_path.as_ref().to_path_buf();
    let data = fetch(ns_path, move |fd| {
        let st = nix::sys::stat::stat(&path)?;
        let info = FileInfo::from_stat(&path, &st);
        let payload = serde_json::to_vec(&info).map_err(|_| nix::errno::Errno::EIO)?;
        crate::worker::write_all(fd, &payload)
    })?;
    Ok(serde_json::from_slice(&data)?)
}

/// Shared shape of the single-file operations: fork a worker that joins
/// `ns_path`, runs `produce` against the write end of a result pipe and
/// exits with the errno of whatever failed; the parent drains the pipe
/// and replays a non-zero exit status as that errno.
#[cfg(target_os = "linux")]
fn fetch<F>(ns_path: PathBuf, produce: F) -> Result<Vec<u8>, NamespaceError>
where
    F: FnOnce(std::os::unix::prelude::RawFd) -> Result<(), nix::errno::Errno>,
{
    use nix::sys::wait::{waitpid, WaitStatus};

    let (read_end, write_end) = nix::unistd::pipe().map_err(NamespaceError::Pipe)?;
    let child = crate::worker::fork_worker(move || {
        let _ = nix::unistd::close(read_end);
        let result = join_namespace(&ns_path).and_then(|()| produce(write_end));
        match result {
            Ok(()) => 0,
            Err(errno) => errno as i32,
        }
    });
    let child = match child {
        Ok(child) => child,
        Err(err) => {
            let _ = nix::unistd::close(read_end);
            let _ = nix::unistd::close(write_end);
            return Err(err);
        }
    };
    let _ = nix::unistd::close(write_end);

    let output = crate::worker::read_to_end(read_end);
    let _ = nix::unistd::close(read_end);
    let status = waitpid(child, None).map_err(NamespaceError::Wait)?;

    match status {
        WaitStatus::Exited(_, 0) => Ok(output.map_err(NamespaceError::Pipe)?),
        WaitStatus::Exited(_, code) => Err(NamespaceError::Errno(nix::errno::Errno::from_i32(
            code,
        ))),
        _ => Err(NamespaceError::Execute),
    }
}

/// Moves the worker into the namespace behind `ns_path`. The nstype is
/// left empty so the kernel checks the fd against its own namespace type.
#[cfg(target_os = "linux")]
fn join_namespace(ns_path: &Path) -> Result<(), nix::errno::Errno> {
    let fd = nix::fcntl::open(
        ns_path,
        nix::fcntl::OFlag::O_RDONLY | nix::fcntl::OFlag::O_CLOEXEC,
        nix::sys::stat::Mode::empty(),
    )?;
    let result = nix::sched::setns(fd, nix::sched::CloneFlags::empty());
    let _ = nix::unistd::close(fd);
    result
}

#[cfg(target_os = "linux")]
fn io_errno(err: std::io::Error) -> nix::errno::Errno {
    nix::errno::Errno::from_i32(err.raw_os_error().unwrap_or(libc::EIO))
}

#[cfg(not(target_os = "linux"))]
pub fn cat(
    _paths: &[PathBuf],
    _pid: i32,
    _proc_root_prefix: Option<&str>,
) -> Result<Vec<Vec<u8>>, NamespaceError> {
    Err(NamespaceError::NotImplemented)
}

#[cfg(not(target_os = "linux"))]
pub fn read_file(
    _path: impl AsRef<Path>,
    _ns_path: impl AsRef<Path>,
) -> Result<Vec<u8>, NamespaceError> {
    Err(NamespaceError::NotImplemented)
}

#[cfg(not(target_os = "linux"))]
pub fn stat(
    _path: impl AsRef<Path>,
    _ns_path: impl AsRef<Path>,
) -> Result<FileInfo, NamespaceError> {
    Err(NamespaceError::NotImplemented)
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use std::fs;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    use anyhow::{bail, Result};
    use nix::unistd::getpid;

    use super::*;

    #[test]
    fn test_split_stream() {
        assert_eq!(split_stream(b""), vec![Vec::<u8>::new()]);
        assert_eq!(split_stream(b"abc"), vec![b"abc".to_vec()]);

        let mut joined = Vec::new();
        joined.extend_from_slice(b"first");
        joined.extend_from_slice(CAT_SEPARATOR);
        joined.extend_from_slice(b"");
        joined.extend_from_slice(CAT_SEPARATOR);
        joined.extend_from_slice(b"third\n");
        assert_eq!(
            split_stream(&joined),
            vec![b"first".to_vec(), Vec::new(), b"third\n".to_vec()]
        );
    }

    #[test]
    fn test_cat_own_mount_namespace() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        fs::write(&first, b"hello from first\n")?;
        fs::write(&second, vec![0xABu8; 70_000])?;

        let mount_ns_before = fs::read_link("/proc/self/ns/mnt")?;
        let buffers = cat(
            &[first.clone(), second.clone()],
            getpid().as_raw(),
            None,
        )?;
        assert_eq!(buffers.len(), 2);
        assert_eq!(buffers[0], fs::read(&first)?);
        assert_eq!(buffers[1], fs::read(&second)?);
        // the worker forked away, the caller's mount view is untouched
        assert_eq!(fs::read_link("/proc/self/ns/mnt")?, mount_ns_before);
        Ok(())
    }

    #[test]
    fn test_cat_unreadable_file_degrades_to_empty_buffer() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let present = dir.path().join("present");
        fs::write(&present, b"data")?;
        let missing = dir.path().join("missing");

        let buffers = cat(&[present, missing], getpid().as_raw(), None)?;
        assert_eq!(buffers.len(), 2);
        assert_eq!(buffers[0], b"data");
        assert!(buffers[1].is_empty());
        Ok(())
    }

    #[test]
    fn test_cat_unknown_pid() {
        match cat(&[PathBuf::from("/etc/hostname")], i32::MAX, None) {
            Err(NamespaceError::Procfs { .. }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_read_file_bad_namespace_path() {
        match read_file("/etc/hostname", "/proc/self/ns/no-such-ns") {
            Err(NamespaceError::Errno(nix::errno::Errno::ENOENT)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    // The remaining scenarios join a real mount namespace, which needs
    // CAP_SYS_ADMIN even for our own.
    #[test]
    fn test_read_file_through_own_namespace() -> Result<()> {
        if !nix::unistd::getuid().is_root() {
            return Ok(());
        }

        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"namespace file contents\n")?;
        file.flush()?;

        let data = read_file(file.path(), "/proc/self/ns/mnt")?;
        assert_eq!(data, b"namespace file contents\n");

        match read_file("/no/such/file", "/proc/self/ns/mnt") {
            Err(NamespaceError::Errno(nix::errno::Errno::ENOENT)) => Ok(()),
            other => bail!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_stat_through_own_namespace() -> Result<()> {
        if !nix::unistd::getuid().is_root() {
            return Ok(());
        }

        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"0123456789")?;
        file.flush()?;
        fs::set_permissions(file.path(), fs::Permissions::from_mode(0o644))?;

        let info = stat(file.path(), "/proc/self/ns/mnt")?;
        let meta = fs::metadata(file.path())?;

        assert_eq!(info.name, file.path().display().to_string());
        assert_eq!(info.perm, "-rw-r--r--");
        assert_eq!(info.size, 10);
        assert_eq!(info.mode & 0o777, 0o644);
        assert_eq!(info.inode, std::os::linux::fs::MetadataExt::st_ino(&meta));
        assert!(info.access_time > 0);
        assert!(info.modify_time > 0);
        Ok(())
    }
}
