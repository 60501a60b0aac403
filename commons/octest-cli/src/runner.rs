use std::path::PathBuf;

use crate::error::CliError;

/// A fully assembled command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            dir: None,
        }
    }

    /// First positional argument, skipping leading global flags such as
    /// `--kubeconfig=...`.
    pub fn verb(&self) -> Option<&str> {
        self.args
            .iter()
            .map(String::as_str)
            .find(|arg| !arg.starts_with('-'))
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Positional arguments after the verb, flags excluded.
    pub fn positional(&self) -> Vec<&str> {
        self.args
            .iter()
            .map(String::as_str)
            .filter(|arg| !arg.starts_with('-'))
            .skip(1)
            .collect()
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a finished process left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Trimmed stdout followed by trimmed stderr.
    pub fn combined(&self) -> String {
        [self.stdout.trim(), self.stderr.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Process execution seam between the CLI wrapper and the operating system.
///
/// Implementations only fail when the process could not be started; a
/// non-zero exit is reported through [`CommandOutput::code`].
pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CliError>;
}

/// Runs commands as child processes through `duct`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DuctRunner;

impl CommandRunner for DuctRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CliError> {
        let mut cmd = duct::cmd(&invocation.program, &invocation.args);
        for (key, value) in &invocation.env {
            cmd = cmd.env(key, value);
        }
        if let Some(ref dir) = invocation.dir {
            cmd = cmd.dir(dir);
        }

        let output = cmd
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|source| CliError::Spawn {
                command: invocation.command_line(),
                source,
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
