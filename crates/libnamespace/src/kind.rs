//! Namespace kinds and their kernel flag values.

use std::fmt;

use libc::c_int;

// Values mirror the kernel's CLONE_NEW* constants. They are spelled out so
// the enum keeps its numeric contract on targets where libc does not define
// them; a test pins them to libc on Linux.
const CLONE_NEWNS: c_int = 0x0002_0000;
const CLONE_NEWUTS: c_int = 0x0400_0000;
const CLONE_NEWIPC: c_int = 0x0800_0000;
const CLONE_NEWUSER: c_int = 0x1000_0000;
const CLONE_NEWPID: c_int = 0x2000_0000;
const CLONE_NEWNET: c_int = 0x4000_0000;

/// The namespace types a target process can be observed through. Each kind
/// maps to a `/proc/<pid>/ns/<name>` link and a `CLONE_NEW*` flag, so a set
/// of kinds can be carried around as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceKind {
    Mnt,
    Uts,
    Ipc,
    User,
    Pid,
    Net,
}

/// The order in which the forked worker joins namespaces when several are
/// requested. User before pid and net, mount last; entering in any other
/// order can be refused by the kernel once a stricter namespace is joined.
pub(crate) const ENTRY_ORDER: [NamespaceKind; 6] = [
    NamespaceKind::Ipc,
    NamespaceKind::Uts,
    NamespaceKind::User,
    NamespaceKind::Pid,
    NamespaceKind::Net,
    NamespaceKind::Mnt,
];

impl NamespaceKind {
    /// The procfs name of this namespace kind, as it appears under
    /// `/proc/<pid>/ns/`.
    pub const fn name(self) -> &'static str {
        match self {
            NamespaceKind::Mnt => "mnt",
            NamespaceKind::Uts => "uts",
            NamespaceKind::Ipc => "ipc",
            NamespaceKind::User => "user",
            NamespaceKind::Pid => "pid",
            NamespaceKind::Net => "net",
        }
    }

    /// The `CLONE_NEW*` flag for this kind. Callers may OR flags together
    /// to describe a set of kinds.
    pub const fn flag(self) -> c_int {
        match self {
            NamespaceKind::Mnt => CLONE_NEWNS,
            NamespaceKind::Uts => CLONE_NEWUTS,
            NamespaceKind::Ipc => CLONE_NEWIPC,
            NamespaceKind::User => CLONE_NEWUSER,
            NamespaceKind::Pid => CLONE_NEWPID,
            NamespaceKind::Net => CLONE_NEWNET,
        }
    }

    /// Looks a kind up by its procfs name.
    pub fn from_name(name: &str) -> Option<NamespaceKind> {
        match name {
            "mnt" => Some(NamespaceKind::Mnt),
            "uts" => Some(NamespaceKind::Uts),
            "ipc" => Some(NamespaceKind::Ipc),
            "user" => Some(NamespaceKind::User),
            "pid" => Some(NamespaceKind::Pid),
            "net" => Some(NamespaceKind::Net),
            _ => None,
        }
    }

    #[cfg(target_os = "linux")]
    pub(crate) fn clone_flags(self) -> nix::sched::CloneFlags {
        nix::sched::CloneFlags::from_bits_truncate(self.flag())
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
