use crate::report::{Reporter, RunEvent, TracingReporter};
use procrun_core::{
    CommandDescriptor, ExitOutcome, ProcrunError, RedirectTarget, RunMode, RunSummary,
    RunnerConfig,
};
use std::path::Path;
use std::process::{Command, ExitStatus};
use std::sync::Arc;
use tracing::error;

/// Runs commands to completion and reports exit-code-zero as success.
///
/// Every entry point is blocking and total: expected failures (missing
/// executable, unwritable output path, non-zero exit, signals) and broken
/// preconditions all come back as `false`. The reasons go to the configured
/// [`Reporter`].
#[derive(Clone)]
pub struct ProcessRunner {
    config: RunnerConfig,
    reporter: Arc<dyn Reporter>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            config: RunnerConfig::default(),
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `argv[0]` with `argv` and wait for it.
    pub fn run<S: AsRef<str>>(&self, argv: &[S]) -> bool {
        self.run_detailed(argv).success
    }

    pub fn run_detailed<S: AsRef<str>>(&self, argv: &[S]) -> RunSummary {
        let summary = RunSummary::new(RunMode::Exec, to_strings(argv));
        match CommandDescriptor::new(summary.command.clone()) {
            Ok(command) => self.execute(summary, &command, None),
            Err(e) => self.reject(summary, e),
        }
    }

    /// Like [`run`](Self::run), with the child's standard output written to
    /// `output` (created or truncated).
    pub fn run_redirected<P: AsRef<Path>, S: AsRef<str>>(&self, output: P, argv: &[S]) -> bool {
        self.run_redirected_detailed(output, argv).success
    }

    pub fn run_redirected_detailed<P: AsRef<Path>, S: AsRef<str>>(
        &self,
        output: P,
        argv: &[S],
    ) -> RunSummary {
        let summary =
            RunSummary::new(RunMode::Redirect, to_strings(argv)).with_output(output.as_ref());
        let target = RedirectTarget::new(output).with_mode(self.config.redirect_mode);

        match CommandDescriptor::new(summary.command.clone()) {
            Ok(command) => self.execute(summary, &command, Some(&target)),
            Err(e) => self.reject(summary, e),
        }
    }

    /// Run an already built descriptor, optionally redirecting stdout.
    pub fn run_command(&self, command: &CommandDescriptor, target: Option<&RedirectTarget>) -> bool {
        let mode = if target.is_some() {
            RunMode::Redirect
        } else {
            RunMode::Exec
        };
        let mut summary = RunSummary::new(mode, command.argv().to_vec());
        if let Some(target) = target {
            summary = summary.with_output(&target.path);
        }
        self.execute(summary, command, target).success
    }

    /// Hand `command` to the configured interpreter (`sh -c` by default).
    ///
    /// The string is interpreted by the shell, metacharacters included, so
    /// it must never carry untrusted input.
    pub fn run_shell(&self, command: &str) -> bool {
        self.run_shell_detailed(command).success
    }

    pub fn run_shell_detailed(&self, command: &str) -> RunSummary {
        let summary = RunSummary::new(RunMode::Shell, vec![command.to_string()]);
        if command.is_empty() {
            return self.reject(
                summary,
                ProcrunError::ContractViolation("shell command is empty".to_string()),
            );
        }

        let mut child = match Command::new(&self.config.shell)
            .arg(&self.config.shell_flag)
            .arg(command)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                self.reporter.report(&RunEvent::SpawnFailed {
                    run_id: summary.run_id,
                    error: format!("{}: {}", self.config.shell, e),
                });
                return self.finish(summary, None);
            }
        };

        let pid = child.id() as i32;
        self.reporter.report(&RunEvent::Spawned {
            run_id: summary.run_id,
            pid,
            program: self.config.shell.clone(),
        });

        match child.wait() {
            Ok(status) => self.finish(summary, Some(outcome_from_status(status))),
            Err(e) => {
                self.reporter.report(&RunEvent::WaitFailed {
                    run_id: summary.run_id,
                    pid,
                    error: e.to_string(),
                });
                self.finish(summary, None)
            }
        }
    }

    /// Whether the configured interpreter exists and is executable.
    pub fn shell_available(&self) -> bool {
        which::which(&self.config.shell).is_ok()
    }

    pub async fn run_async(&self, argv: Vec<String>) -> bool {
        self.blocking(move |runner| runner.run(&argv)).await
    }

    pub async fn run_redirected_async<P>(&self, output: P, argv: Vec<String>) -> bool
    where
        P: AsRef<Path> + Send + 'static,
    {
        self.blocking(move |runner| runner.run_redirected(output, &argv))
            .await
    }

    pub async fn run_shell_async(&self, command: String) -> bool {
        self.blocking(move |runner| runner.run_shell(&command)).await
    }

    async fn blocking<F>(&self, f: F) -> bool
    where
        F: FnOnce(&ProcessRunner) -> bool + Send + 'static,
    {
        let runner = self.clone();
        match tokio::task::spawn_blocking(move || f(&runner)).await {
            Ok(success) => success,
            Err(e) => {
                error!(error = %e, "Blocking run task did not complete");
                false
            }
        }
    }

    /// Spawn, wait and classify. The only difference between the plain and
    /// redirecting paths is the child setup.
    #[cfg(unix)]
    fn execute(
        &self,
        summary: RunSummary,
        command: &CommandDescriptor,
        target: Option<&RedirectTarget>,
    ) -> RunSummary {
        use crate::process::{parent_wait, spawn, ChildSetup, ExecArgv};

        let prepared = ExecArgv::new(command)
            .and_then(|argv| ChildSetup::for_target(target).map(|setup| (argv, setup)));
        let (argv, setup) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return self.reject(summary, e),
        };

        let pid = match spawn(&argv, &setup) {
            Ok(pid) => pid,
            Err(e) => {
                self.reporter.report(&RunEvent::SpawnFailed {
                    run_id: summary.run_id,
                    error: e.to_string(),
                });
                return self.finish(summary, None);
            }
        };

        self.reporter.report(&RunEvent::Spawned {
            run_id: summary.run_id,
            pid: pid.as_raw(),
            program: command.program().to_string(),
        });

        match parent_wait(pid) {
            Ok(outcome) => self.finish(summary, Some(outcome)),
            Err(e) => {
                self.reporter.report(&RunEvent::WaitFailed {
                    run_id: summary.run_id,
                    pid: pid.as_raw(),
                    error: e.to_string(),
                });
                self.finish(summary, None)
            }
        }
    }

    #[cfg(not(unix))]
    fn execute(
        &self,
        summary: RunSummary,
        _command: &CommandDescriptor,
        _target: Option<&RedirectTarget>,
    ) -> RunSummary {
        self.reporter.report(&RunEvent::SpawnFailed {
            run_id: summary.run_id,
            error: "argv execution requires a Unix platform".to_string(),
        });
        self.finish(summary, None)
    }

    fn reject(&self, summary: RunSummary, err: ProcrunError) -> RunSummary {
        self.reporter.report(&RunEvent::ContractViolation {
            run_id: summary.run_id,
            reason: err.to_string(),
        });
        self.finish(summary, None)
    }

    fn finish(&self, summary: RunSummary, outcome: Option<ExitOutcome>) -> RunSummary {
        let summary = summary.finish(outcome);
        self.reporter.report(&RunEvent::Finished {
            summary: summary.clone(),
        });
        summary
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Look up a bare program name on `PATH`.
///
/// Image replacement does not search `PATH`, so `["ls", "-l"]` must become
/// `["/usr/bin/ls", "-l"]` first. Names containing a path separator are
/// returned unchanged.
pub fn resolve(command: &CommandDescriptor) -> procrun_core::Result<CommandDescriptor> {
    if Path::new(command.program()).components().count() > 1 {
        return Ok(command.clone());
    }

    let path = which::which(command.program())
        .map_err(|e| ProcrunError::NotFound(format!("{}: {}", command.program(), e)))?;
    command.with_program(path.to_string_lossy())
}

fn to_strings<S: AsRef<str>>(argv: &[S]) -> Vec<String> {
    argv.iter().map(|s| s.as_ref().to_string()).collect()
}

fn outcome_from_status(status: ExitStatus) -> ExitOutcome {
    if let Some(code) = status.code() {
        return ExitOutcome::Exited(code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return ExitOutcome::Signaled(signal);
        }
        if let Some(signal) = status.stopped_signal() {
            return ExitOutcome::Stopped(signal);
        }
    }

    ExitOutcome::Other
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::report::MemoryReporter;
    use std::fs;

    fn recording_runner() -> (ProcessRunner, Arc<MemoryReporter>) {
        let reporter = Arc::new(MemoryReporter::new());
        let runner = ProcessRunner::new().with_reporter(reporter.clone());
        (runner, reporter)
    }

    #[test]
    fn test_run_true_and_false() {
        let runner = ProcessRunner::new();
        assert!(runner.run(&["/bin/true"]));
        assert!(!runner.run(&["/bin/false"]));
    }

    #[test]
    fn test_run_reports_spawn_and_finish() {
        let (runner, reporter) = recording_runner();
        let summary = runner.run_detailed(&["/bin/sh", "-c", "exit 3"]);

        assert!(!summary.success);
        assert_eq!(summary.outcome, Some(ExitOutcome::Exited(3)));

        let events = reporter.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], RunEvent::Spawned { .. }));
        assert!(matches!(&events[1], RunEvent::Finished { summary: s } if s == &summary));
    }

    #[test]
    fn test_empty_argv_is_contract_violation() {
        let (runner, reporter) = recording_runner();
        let empty: [&str; 0] = [];
        assert!(!runner.run(&empty));

        let events = reporter.events();
        assert!(matches!(events[0], RunEvent::ContractViolation { .. }));
        assert!(!events.iter().any(|e| matches!(e, RunEvent::Spawned { .. })));
    }

    #[test]
    fn test_empty_shell_command_spawns_nothing() {
        let (runner, reporter) = recording_runner();
        assert!(!runner.run_shell(""));

        let events = reporter.events();
        assert!(!events.iter().any(|e| matches!(e, RunEvent::Spawned { .. })));
        assert!(matches!(events[0], RunEvent::ContractViolation { .. }));
    }

    #[test]
    fn test_whitespace_shell_command_is_handed_to_shell() {
        let (runner, reporter) = recording_runner();
        assert!(runner.run_shell("   "));
        assert!(matches!(reporter.events()[0], RunEvent::Spawned { .. }));
    }

    #[test]
    fn test_run_shell() {
        let runner = ProcessRunner::new();
        assert!(runner.run_shell("exit 0"));
        assert!(!runner.run_shell("exit 1"));
        assert!(runner.run_shell("true && test 1 -eq 1"));
    }

    #[test]
    fn test_run_shell_missing_interpreter() {
        let (runner, reporter) = recording_runner();
        let runner = runner.with_config(RunnerConfig {
            shell: "/nonexistent/sh".to_string(),
            ..RunnerConfig::default()
        });

        assert!(!runner.shell_available());
        assert!(!runner.run_shell("true"));
        assert!(matches!(reporter.events()[0], RunEvent::SpawnFailed { .. }));
    }

    #[test]
    fn test_shell_available_by_default() {
        assert!(ProcessRunner::new().shell_available());
    }

    #[test]
    fn test_run_shell_signal() {
        let runner = ProcessRunner::new();
        let summary = runner.run_shell_detailed("kill -9 $$");
        assert_eq!(summary.outcome, Some(ExitOutcome::Signaled(9)));
        assert!(!summary.success);
    }

    #[test]
    fn test_run_redirected_uses_configured_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let runner = ProcessRunner::new().with_config(RunnerConfig {
            redirect_mode: 0o600,
            ..RunnerConfig::default()
        });

        assert!(runner.run_redirected(&out, &["/bin/echo", "hello"]));
        assert_eq!(fs::read_to_string(&out).unwrap(), "hello\n");
        let mode = fs::metadata(&out).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode & !0o600, 0);
    }

    #[test]
    fn test_run_command_with_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = RedirectTarget::new(dir.path().join("cmd.txt"));
        let command = CommandDescriptor::new(["/bin/echo", "-n", "descriptor"]).unwrap();

        assert!(ProcessRunner::new().run_command(&command, Some(&target)));
        assert_eq!(fs::read_to_string(&target.path).unwrap(), "descriptor");
    }

    #[test]
    fn test_resolve_bare_name() {
        let command = CommandDescriptor::new(["sh", "-c", "exit 0"]).unwrap();
        let resolved = resolve(&command).unwrap();
        assert!(resolved.program().starts_with('/'));
        assert_eq!(resolved.args(), command.args());
        assert!(ProcessRunner::new().run_command(&resolved, None));
    }

    #[test]
    fn test_resolve_keeps_paths_and_reports_missing() {
        let command = CommandDescriptor::new(["/bin/true"]).unwrap();
        assert_eq!(resolve(&command).unwrap(), command);

        let relative = CommandDescriptor::new(["./procrun-no-such-program"]).unwrap();
        assert_eq!(resolve(&relative).unwrap(), relative);

        let missing = CommandDescriptor::new(["procrun-no-such-program"]).unwrap();
        assert!(matches!(resolve(&missing), Err(ProcrunError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_async_wrappers() {
        let runner = ProcessRunner::new();
        assert!(runner.run_async(vec!["/bin/true".to_string()]).await);
        assert!(!runner.run_async(vec!["/bin/false".to_string()]).await);
        assert!(runner.run_shell_async("exit 0".to_string()).await);

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("async.txt");
        assert!(
            runner
                .run_redirected_async(out.clone(), vec!["/bin/echo".to_string(), "hi".to_string()])
                .await
        );
        assert_eq!(fs::read_to_string(&out).unwrap(), "hi\n");
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_independent() {
        let runner = ProcessRunner::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let runner = runner.clone();
                let code = i % 2;
                tokio::spawn(async move {
                    let ok = runner
                        .run_shell_async(format!("exit {}", code))
                        .await;
                    (code, ok)
                })
            })
            .collect();

        for handle in handles {
            let (code, ok) = handle.await.unwrap();
            assert_eq!(ok, code == 0);
        }
    }
}
