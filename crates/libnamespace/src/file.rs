use std::path::Path;

use serde::{Deserialize, Serialize};

/// File metadata as observed inside the target namespace. Times are
/// nanoseconds since the Unix epoch; `perm` is the symbolic form of the
/// low permission bits of `mode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub perm: String,
    pub uid: u32,
    pub gid: u32,
    pub size: i64,
    pub mode: u32,
    pub inode: u64,
    pub block_size: i64,
    pub blocks: i64,
    pub links: u64,
    pub access_time: i64,
    pub modify_time: i64,
}

#[cfg(target_os = "linux")]
impl FileInfo {
    pub(crate) fn from_stat(path: &Path, st: &libc::stat) -> FileInfo {
        FileInfo {
            name: path.display().to_string(),
            perm: perm_string(st.st_mode),
            uid: st.st_uid,
            gid: st.st_gid,
            size: st.st_size as i64,
            mode: st.st_mode,
            inode: st.st_ino as u64,
            block_size: st.st_blksize as i64,
            blocks: st.st_blocks as i64,
            links: st.st_nlink as u64,
            access_time: st.st_atime as i64 * 1_000_000_000 + st.st_atime_nsec as i64,
            modify_time: st.st_mtime as i64 * 1_000_000_000 + st.st_mtime_nsec as i64,
        }
    }
}

/// Renders the low nine mode bits as `-rwxr-xr-x`.
pub(crate) fn perm_string(mode: u32) -> String {
    let mut out = String::with_capacity(10);
    out.push('-');
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}
