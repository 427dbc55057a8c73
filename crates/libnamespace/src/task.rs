use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use crate::error::NamespaceError;

/// The work to run inside the target namespaces.
///
/// A `Function` returns a status code, zero meaning success. When the
/// engine forks (mount namespace requested), the closure runs in a freshly
/// forked child: it must not rely on caller-side state that does not
/// survive a fork, such as other threads or handles owned by them.
/// A `Program` is executed in place of the forked worker; in the in-thread
/// strategy it runs as an ordinary child process with inherited stdio.
pub enum Task<'a> {
    Function(Box<dyn FnOnce() -> i32 + 'a>),
    Program {
        program: PathBuf,
        args: Vec<OsString>,
    },
}

impl<'a> Task<'a> {
    pub fn function<F>(f: F) -> Task<'a>
    where
        F: FnOnce() -> i32 + 'a,
    {
        Task::Function(Box::new(f))
    }

    pub fn program<P, I, S>(program: P, args: I) -> Task<'a>
    where
        P: Into<PathBuf>,
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Task::Program {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Debug for Task<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Function(_) => f.write_str("Task::Function"),
            Task::Program { program, args } => f
                .debug_struct("Task::Program")
                .field("program", program)
                .field("args", args)
                .finish(),
        }
    }
}

/// Runs a task on the calling thread, used once all required namespaces
/// are (or already were) in place.
pub(crate) fn run_in_place(task: Task<'_>) -> Result<(), NamespaceError> {
    match task {
        Task::Function(f) => match f() {
            0 => Ok(()),
            status => Err(NamespaceError::Task(status)),
        },
        Task::Program { program, args } => {
            let status = Command::new(&program).args(&args).status().map_err(|err| {
                #[cfg(target_os = "linux")]
                {
                    NamespaceError::Errno(nix::errno::Errno::from_i32(
                        err.raw_os_error().unwrap_or(libc::EIO),
                    ))
                }
                #[cfg(not(target_os = "linux"))]
                {
                    let _ = err;
                    NamespaceError::NotImplemented
                }
            })?;
            match status.code() {
                Some(0) => Ok(()),
                Some(code) => Err(NamespaceError::Task(code)),
                // killed by a signal
                None => Err(NamespaceError::Task(-1)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_status_mapping() {
        assert!(run_in_place(Task::function(|| 0)).is_ok());
        match run_in_place(Task::function(|| 3)) {
            Err(NamespaceError::Task(3)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_function_may_borrow_caller_state() {
        let mut ran = false;
        let task = Task::function(|| {
            ran = true;
            0
        });
        run_in_place(task).unwrap();
        assert!(ran);
    }

    #[test]
    fn test_program_status_mapping() {
        assert!(run_in_place(Task::program("true", Vec::<String>::new())).is_ok());
        match run_in_place(Task::program("false", Vec::<String>::new())) {
            Err(NamespaceError::Task(1)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_debug_does_not_expose_closure() {
        assert_eq!(format!("{:?}", Task::function(|| 0)), "Task::Function");
        let task = Task::program("/bin/ls", ["-l"]);
        assert!(format!("{task:?}").contains("/bin/ls"));
    }
}
