use std::path::PathBuf;

use thiserror::Error;

use crate::cli::Identity;

/// Substrings the cluster CLI prints when the target object is absent.
const NOT_FOUND_MARKERS: &[&str] =
    &["NotFound", "not found", "No resources found"];

/// CLI wrapper errors
#[derive(Error, Debug)]
pub enum CliError {
    #[error("failed to start `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}: {}", exit_label(.code), failure_text(.stdout, .stderr))]
    Exit {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("no kubeconfig configured for the {0} identity")]
    MissingKubeconfig(Identity),

    #[error("failed to write command output to {path:?}")]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to prepare work directory")]
    WorkDir(#[source] std::io::Error),

    #[error("binary `{0}` not found in PATH")]
    BinaryNotFound(String),

    #[error("invalid CLI configuration")]
    Config(#[from] envconfig::Error),
}

impl CliError {
    /// True when a failed command reported that its target does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            CliError::Exit { stdout, stderr, .. } => {
                looks_not_found(stdout) || looks_not_found(stderr)
            }
            _ => false,
        }
    }

    /// Combined output of a command that ran and failed.
    pub fn output(&self) -> Option<String> {
        match self {
            CliError::Exit { stdout, stderr, .. } => {
                Some(failure_text(stdout, stderr))
            }
            _ => None,
        }
    }
}

/// Matches the "already gone" wording of `get`/`delete`.
pub fn looks_not_found(text: &str) -> bool {
    NOT_FOUND_MARKERS.iter().any(|marker| text.contains(marker))
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "signal".to_string(),
    }
}

fn failure_text(stdout: &str, stderr: &str) -> String {
    let stdout = stdout.trim();
    let stderr = stderr.trim();
    match (stdout.is_empty(), stderr.is_empty()) {
        (true, true) => "<no output>".to_string(),
        (false, true) => stdout.to_string(),
        (true, false) => stderr.to_string(),
        (false, false) => format!("{stdout}\n{stderr}"),
    }
}
