//! Spawn a program, optionally send its standard output to a file, wait for
//! it and report whether it exited with status zero.
//!
//! ```no_run
//! assert!(procrun_runner::run(&["/bin/true"]));
//! assert!(procrun_runner::run_redirected("/tmp/out.txt", &["/bin/echo", "hello"]));
//! assert!(procrun_runner::run_shell("test -d /tmp"));
//! ```

pub mod executor;
pub mod process;
pub mod report;

pub use executor::{resolve, ProcessRunner};
pub use process::{EXEC_FAILED_STATUS, REDIRECT_FAILED_STATUS};
pub use report::{MemoryReporter, Reporter, RunEvent, TracingReporter};

use std::path::Path;

/// Run `command` through the platform interpreter with the default runner.
pub fn run_shell(command: &str) -> bool {
    ProcessRunner::new().run_shell(command)
}

/// Run `argv[0]` with `argv` using the default runner.
pub fn run<S: AsRef<str>>(argv: &[S]) -> bool {
    ProcessRunner::new().run(argv)
}

/// Run `argv` with its standard output written to `output`.
pub fn run_redirected<P: AsRef<Path>, S: AsRef<str>>(output: P, argv: &[S]) -> bool {
    ProcessRunner::new().run_redirected(output, argv)
}
