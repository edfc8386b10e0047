//! Fork, exec and reap.
//!
//! Everything the child needs is prepared in the parent before `fork`, so the
//! child only issues async-signal-safe system calls (`signal`, `sigprocmask`,
//! `open`, `dup2`, `close`, `execv`, `write`, `_exit`) and never touches the allocator or returns into
//! caller code.

use procrun_core::ExitOutcome;

/// Child exit status when replacing the process image fails.
pub const EXEC_FAILED_STATUS: i32 = 127;

/// Child exit status when the redirection target cannot be set up.
pub const REDIRECT_FAILED_STATUS: i32 = 126;

/// Explains an outcome that matches one of the child's own failure statuses.
pub fn child_failure_hint(outcome: &ExitOutcome) -> Option<&'static str> {
    match outcome.code() {
        Some(EXEC_FAILED_STATUS) => Some("child could not replace its process image"),
        Some(REDIRECT_FAILED_STATUS) => Some("child could not redirect its standard output"),
        _ => None,
    }
}

#[cfg(unix)]
pub use unix::*;

#[cfg(unix)]
mod unix {
    use super::{EXEC_FAILED_STATUS, REDIRECT_FAILED_STATUS};
    use nix::errno::Errno;
    use nix::fcntl::{open, OFlag};
    use nix::sys::stat::Mode;
    use nix::sys::wait::{waitpid, WaitStatus};
    use nix::unistd::{close, dup2, fork, ForkResult, Pid};
    use procrun_core::{CommandDescriptor, ExitOutcome, ProcrunError, RedirectTarget, Result};
    use std::ffi::CString;
    use std::os::raw::c_char;
    use std::os::unix::ffi::OsStrExt;
    use std::ptr;

    /// A command descriptor converted for `execv`: owned C strings plus a
    /// NULL-terminated pointer array into them.
    pub struct ExecArgv {
        strings: Vec<CString>,
        pointers: Vec<*const c_char>,
    }

    impl ExecArgv {
        pub fn new(command: &CommandDescriptor) -> Result<Self> {
            let strings = command
                .argv()
                .iter()
                .map(|arg| CString::new(arg.as_bytes()))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| ProcrunError::ContractViolation(format!("argv entry: {}", e)))?;

            // Heap buffers of the CStrings do not move with the Vec.
            let mut pointers: Vec<*const c_char> = strings.iter().map(|s| s.as_ptr()).collect();
            pointers.push(ptr::null());

            Ok(Self { strings, pointers })
        }

        pub fn program(&self) -> &CString {
            &self.strings[0]
        }

        /// Number of argv entries, not counting the terminator.
        pub fn len(&self) -> usize {
            self.strings.len()
        }

        pub fn is_empty(&self) -> bool {
            self.strings.is_empty()
        }

        pub fn is_terminated(&self) -> bool {
            self.pointers.last().map_or(false, |p| p.is_null())
        }
    }

    /// What the child does between `fork` and `execv`.
    pub enum ChildSetup {
        Inherit,
        RedirectStdout { path: CString, mode: Mode },
    }

    impl ChildSetup {
        pub fn for_target(target: Option<&RedirectTarget>) -> Result<Self> {
            let Some(target) = target else {
                return Ok(ChildSetup::Inherit);
            };

            let path = CString::new(target.path.as_os_str().as_bytes()).map_err(|_| {
                ProcrunError::ContractViolation(format!(
                    "redirection path {} contains a NUL byte",
                    target.path.display()
                ))
            })?;
            let mode = Mode::from_bits_truncate(target.mode as libc::mode_t);

            Ok(ChildSetup::RedirectStdout { path, mode })
        }
    }

    /// Create the child. The child branch never returns from this call.
    pub fn spawn(argv: &ExecArgv, setup: &ChildSetup) -> Result<Pid> {
        // SAFETY: the child branch only runs `child_main`, which restricts
        // itself to async-signal-safe calls and always ends in exec or _exit.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => child_main(argv, setup),
            Ok(ForkResult::Parent { child }) => Ok(child),
            Err(e) => Err(ProcrunError::Spawn(format!("fork failed: {}", e))),
        }
    }

    fn child_main(argv: &ExecArgv, setup: &ChildSetup) -> ! {
        reset_signals();

        if let ChildSetup::RedirectStdout { path, mode } = setup {
            redirect_stdout(path, *mode);
        }

        // SAFETY: both pointers come from live CStrings owned by `argv` and
        // the pointer array is NULL-terminated.
        unsafe {
            libc::execv(argv.program().as_ptr(), argv.pointers.as_ptr());
        }
        child_abort(b"procrun: execv failed\n", EXEC_FAILED_STATUS)
    }

    /// Ignored dispositions survive exec and the Rust runtime ignores
    /// SIGPIPE: restore its default and clear the mask.
    fn reset_signals() {
        // SAFETY: signal(2), sigemptyset(3) and sigprocmask(2) are
        // async-signal-safe; the set lives on this stack frame.
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);

            let mut empty: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut empty);
            libc::sigprocmask(libc::SIG_SETMASK, &empty, ptr::null_mut());
        }
    }

    fn redirect_stdout(path: &CString, mode: Mode) {
        let flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC;
        let fd = match open(path.as_c_str(), flags, mode) {
            Ok(fd) => fd,
            Err(_) => child_abort(
                b"procrun: cannot open redirection target\n",
                REDIRECT_FAILED_STATUS,
            ),
        };

        let duplicated = dup2(fd, libc::STDOUT_FILENO);
        if fd != libc::STDOUT_FILENO {
            let _ = close(fd);
        }
        if duplicated.is_err() {
            child_abort(b"procrun: dup2 onto stdout failed\n", REDIRECT_FAILED_STATUS);
        }
    }

    fn child_abort(message: &[u8], status: i32) -> ! {
        // SAFETY: write(2) and _exit(2) are async-signal-safe; the buffer is
        // a static byte string.
        unsafe {
            libc::write(
                libc::STDERR_FILENO,
                message.as_ptr() as *const libc::c_void,
                message.len(),
            );
            libc::_exit(status)
        }
    }

    /// Block until `pid` terminates and classify how it ended.
    pub fn parent_wait(pid: Pid) -> Result<ExitOutcome> {
        loop {
            match waitpid(pid, None) {
                Ok(WaitStatus::Exited(_, code)) => return Ok(ExitOutcome::Exited(code)),
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    return Ok(ExitOutcome::Signaled(signal as i32))
                }
                Ok(WaitStatus::Stopped(_, signal)) => {
                    return Ok(ExitOutcome::Stopped(signal as i32))
                }
                Ok(_) => return Ok(ExitOutcome::Other),
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    return Err(ProcrunError::Wait(format!("waitpid({}) failed: {}", pid, e)))
                }
            }
        }
    }

}
