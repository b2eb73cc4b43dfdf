//! External process execution for the command-line drivers.
//!
//! Drivers depend on [`CommandRunner`] instead of spawning processes directly,
//! so the argument protocol and exit-code handling can be tested with a
//! scripted runner.

use std::{
    fmt,
    io::{self, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
};

use keystash_core::storage::SecretStoreError;
use tracing::debug;

/// Captured result of one process invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ProcessOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit status {code}")?,
            None => f.write_str("terminated by signal")?,
        }
        let captured = if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let captured = String::from_utf8_lossy(captured);
        let captured = captured.trim();
        if !captured.is_empty() {
            write!(f, ": {captured}")?;
        }
        Ok(())
    }
}

/// Locates and runs external programs synchronously.
pub trait CommandRunner: Send + Sync {
    /// Resolve `program` on the execution path. `Ok(None)` means not installed.
    fn locate(&self, program: &str) -> Result<Option<PathBuf>, SecretStoreError>;

    /// Run `program` with `args`, feeding `stdin` when given, and wait for it.
    /// A non-zero exit is reported through [`ProcessOutput::code`], not as an error.
    fn run(
        &self,
        program: &Path,
        args: &[&str],
        stdin: Option<&[u8]>,
    ) -> Result<ProcessOutput, SecretStoreError>;
}

/// Runner backed by `std::process` and a `PATH` lookup.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn locate(&self, program: &str) -> Result<Option<PathBuf>, SecretStoreError> {
        match which::which(program) {
            Ok(path) => Ok(Some(path)),
            Err(which::Error::CannotFindBinaryPath) => Ok(None),
            Err(err) => Err(SecretStoreError::io(format!("locate {program}"), err)),
        }
    }

    fn run(
        &self,
        program: &Path,
        args: &[&str],
        stdin: Option<&[u8]>,
    ) -> Result<ProcessOutput, SecretStoreError> {
        let context = invocation(program, args);
        debug!(command = %context, "spawning");

        let mut child = Command::new(program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SecretStoreError::io(&context, e))?;

        // stdin is fed from a scoped thread while stdout/stderr drain; a tool
        // that exits without reading its input still reports its own status
        let pipe = child.stdin.take();
        let (output, written) = thread::scope(|scope| {
            let writer = pipe.zip(stdin).map(|(mut pipe, input)| {
                scope.spawn(move || match pipe.write_all(input) {
                    Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                    other => other,
                })
            });
            let output = child.wait_with_output();
            let written = match writer {
                Some(handle) => handle
                    .join()
                    .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked"))),
                None => Ok(()),
            };
            (output, written)
        });

        let output = output.map_err(|e| SecretStoreError::io(&context, e))?;
        written.map_err(|e| SecretStoreError::io(&context, e))?;
        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Whether `program` is reachable on the execution path.
pub fn package_installed(
    runner: &dyn CommandRunner,
    program: &str,
) -> Result<bool, SecretStoreError> {
    Ok(runner.locate(program)?.is_some())
}

/// Tool name plus subcommand, for error context. Later arguments may carry
/// secret values and are left out.
pub(crate) fn invocation(program: &Path, args: &[&str]) -> String {
    let name = program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string());
    match args.first() {
        Some(sub) => format!("{name} {sub}"),
        None => name,
    }
}

/// Error for a tool invocation that exited unsuccessfully.
pub(crate) fn tool_failure(
    program: &Path,
    args: &[&str],
    output: &ProcessOutput,
) -> SecretStoreError {
    SecretStoreError::io(invocation(program, args), output)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        collections::{HashSet, VecDeque},
        sync::Mutex,
    };

    use super::*;

    /// One recorded invocation.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Call {
        pub program: PathBuf,
        pub args: Vec<String>,
        pub stdin: Option<Vec<u8>>,
    }

    /// Runner that answers from a queue of canned outputs and records calls.
    #[derive(Debug, Default)]
    pub struct ScriptedRunner {
        installed: HashSet<String>,
        replies: Mutex<VecDeque<Result<ProcessOutput, SecretStoreError>>>,
        calls: Mutex<Vec<Call>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn installed(mut self, program: &str) -> Self {
            self.installed.insert(program.to_string());
            self
        }

        pub fn reply(self, code: i32, stdout: &str) -> Self {
            self.replies
                .lock()
                .expect("lock")
                .push_back(Ok(output(code, stdout)));
            self
        }

        pub fn fail(self, err: SecretStoreError) -> Self {
            self.replies.lock().expect("lock").push_back(Err(err));
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().expect("lock").clone()
        }

        pub fn args(&self) -> Vec<Vec<String>> {
            self.calls().into_iter().map(|c| c.args).collect()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn locate(&self, program: &str) -> Result<Option<PathBuf>, SecretStoreError> {
            Ok(self
                .installed
                .contains(program)
                .then(|| PathBuf::from("/usr/bin").join(program)))
        }

        fn run(
            &self,
            program: &Path,
            args: &[&str],
            stdin: Option<&[u8]>,
        ) -> Result<ProcessOutput, SecretStoreError> {
            self.calls.lock().expect("lock").push(Call {
                program: program.to_path_buf(),
                args: args.iter().map(|a| a.to_string()).collect(),
                stdin: stdin.map(<[u8]>::to_vec),
            });
            self.replies
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected call: {}", invocation(program, args)))
        }
    }

    pub fn output(code: i32, stdout: &str) -> ProcessOutput {
        ProcessOutput {
            code: Some(code),
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedRunner;
    use super::*;

    #[test]
    fn package_installed_reports_presence() {
        let runner = ScriptedRunner::new().installed("keyctl");
        assert!(package_installed(&runner, "keyctl").expect("probe"));
        assert!(!package_installed(&runner, "secret-tool").expect("probe"));
    }

    #[test]
    fn invocation_omits_trailing_arguments() {
        let program = Path::new("/usr/bin/keyctl");
        assert_eq!(
            invocation(program, &["add", "user", "k", "hunter2"]),
            "keyctl add"
        );
        assert_eq!(invocation(program, &[]), "keyctl");
    }

    #[test]
    fn output_display_prefers_stderr() {
        let out = ProcessOutput {
            code: Some(1),
            stdout: b"ignored".to_vec(),
            stderr: b"keyctl_search: Required key not available\n".to_vec(),
        };
        assert_eq!(
            out.to_string(),
            "exit status 1: keyctl_search: Required key not available"
        );
        assert!(!out.success());
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_captures_stdout_and_exit_code() {
        let runner = SystemRunner;
        let Some(cat) = runner.locate("cat").expect("locate") else {
            return;
        };
        let out = runner.run(&cat, &[], Some(b"piped")).expect("run cat");
        assert!(out.success());
        assert_eq!(out.stdout, b"piped");

        if let Some(falsy) = runner.locate("false").expect("locate") {
            let out = runner.run(&falsy, &[], None).expect("run false");
            assert_eq!(out.code, Some(1));
        }
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_drains_output_while_feeding_large_input() {
        let runner = SystemRunner;
        let Some(cat) = runner.locate("cat").expect("locate") else {
            return;
        };
        // larger than any pipe buffer in both directions
        let input = vec![b'y'; 1 << 20];
        let out = runner.run(&cat, &[], Some(&input)).expect("run cat");
        assert!(out.success());
        assert_eq!(out.stdout.len(), input.len());
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_keeps_exit_status_when_tool_ignores_stdin() {
        let runner = SystemRunner;
        let Some(truthy) = runner.locate("true").expect("locate") else {
            return;
        };
        let input = vec![b'x'; 4 << 20];
        let out = runner
            .run(&truthy, &[], Some(&input))
            .expect("early exit is not an error");
        assert_eq!(out.code, Some(0));

        if let Some(falsy) = runner.locate("false").expect("locate") {
            let out = runner.run(&falsy, &[], Some(&input)).expect("run false");
            assert_eq!(out.code, Some(1));
        }
    }

    #[test]
    fn system_runner_reports_missing_program() {
        let runner = SystemRunner;
        assert_eq!(
            runner
                .locate("keystash-definitely-not-installed")
                .expect("locate"),
            None
        );
    }
}
