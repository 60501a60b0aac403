use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use envconfig::Envconfig;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::config::CliConfig;
use crate::error::CliError;
use crate::runner::{CommandOutput, CommandRunner, DuctRunner, Invocation};

/// Whose credentials a command runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    /// The unprivileged test user.
    User,
    /// Cluster admin.
    Admin,
    /// Admin of the hosted (guest) cluster.
    Guest,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::User => f.write_str("user"),
            Identity::Admin => f.write_str("admin"),
            Identity::Guest => f.write_str("guest"),
        }
    }
}

enum WorkDir {
    Temp(TempDir),
    Fixed(PathBuf),
}

impl WorkDir {
    fn path(&self) -> &Path {
        match self {
            WorkDir::Temp(dir) => dir.path(),
            WorkDir::Fixed(path) => path,
        }
    }
}

/// Handle on the cluster CLI.
///
/// Context modifiers ([`Cli::as_admin`], [`Cli::without_namespace`], ...)
/// return a new handle and leave the receiver untouched, so one `Cli` can be
/// shared by a whole scenario.
#[derive(Clone)]
pub struct Cli {
    config: Arc<CliConfig>,
    runner: Arc<dyn CommandRunner>,
    work_dir: Arc<WorkDir>,
    identity: Identity,
    namespace: Option<String>,
    without_namespace: bool,
}

impl fmt::Debug for Cli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cli")
            .field("binary", &self.config.binary)
            .field("identity", &self.identity)
            .field("namespace", &self.namespace)
            .field("without_namespace", &self.without_namespace)
            .field("work_dir", &self.work_dir.path())
            .finish()
    }
}

impl Cli {
    pub fn new(
        config: CliConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, CliError> {
        let work_dir = match config.work_dir {
            Some(ref dir) => {
                std::fs::create_dir_all(dir).map_err(CliError::WorkDir)?;
                WorkDir::Fixed(PathBuf::from(dir))
            }
            None => WorkDir::Temp(
                tempfile::Builder::new()
                    .prefix("octest-")
                    .tempdir()
                    .map_err(CliError::WorkDir)?,
            ),
        };
        let namespace = config.namespace.clone();
        Ok(Self {
            config: Arc::new(config),
            runner,
            work_dir: Arc::new(work_dir),
            identity: Identity::User,
            namespace,
            without_namespace: false,
        })
    }

    /// Build from `OCTEST_*`/`KUBECONFIG` environment variables, spawning
    /// real processes.
    pub fn from_env() -> Result<Self, CliError> {
        let mut config = CliConfig::init_from_env()?;
        match which::which(&config.binary) {
            Ok(path) => config.binary = path.to_string_lossy().to_string(),
            Err(e) => warn!(
                binary = %config.binary,
                error = %e,
                "CLI binary not resolved in PATH, using it as given"
            ),
        }
        Self::new(config, Arc::new(DuctRunner))
    }

    pub fn config(&self) -> &CliConfig {
        &self.config
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Namespace commands are bound to, if any.
    pub fn namespace(&self) -> Option<&str> {
        if self.without_namespace {
            None
        } else {
            self.namespace.as_deref()
        }
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    pub fn as_admin(&self) -> Self {
        self.with_identity(Identity::Admin)
    }

    pub fn as_user(&self) -> Self {
        self.with_identity(Identity::User)
    }

    /// Run against the hosted cluster's credentials.
    pub fn as_guest(&self) -> Self {
        self.with_identity(Identity::Guest)
    }

    pub fn without_namespace(&self) -> Self {
        Self {
            without_namespace: true,
            ..self.clone()
        }
    }

    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            without_namespace: false,
            ..self.clone()
        }
    }

    fn with_identity(&self, identity: Identity) -> Self {
        Self {
            identity,
            ..self.clone()
        }
    }

    /// Start a command for `verb` (`get`, `apply`, `delete`, `process`, ...).
    pub fn run(&self, verb: impl Into<String>) -> CommandBuilder {
        CommandBuilder {
            cli: self.clone(),
            verb: verb.into(),
            args: Vec::new(),
        }
    }
}

/// A command being assembled; consumed by one of the execution methods.
#[derive(Debug)]
pub struct CommandBuilder {
    cli: Cli,
    verb: String,
    args: Vec<String>,
}

impl CommandBuilder {
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Command line as it would be executed:
    /// `[--kubeconfig=..] <verb> [--namespace=..] <args..>`.
    pub fn invocation(&self) -> Result<Invocation, CliError> {
        let mut args = Vec::with_capacity(self.args.len() + 3);
        if let Some(kubeconfig) =
            self.cli.config.kubeconfig_for(self.cli.identity)?
        {
            args.push(format!("--kubeconfig={}", kubeconfig.display()));
        }
        args.push(self.verb.clone());
        if let Some(namespace) = self.cli.namespace() {
            args.push(format!("--namespace={namespace}"));
        }
        args.extend(self.args.iter().cloned());
        Ok(Invocation::new(self.cli.config.binary.clone(), args))
    }

    fn run_checked(&self) -> Result<CommandOutput, CliError> {
        let invocation = self.invocation()?;
        let command = invocation.command_line();
        debug!(identity = %self.cli.identity, "running `{}`", command);

        let output = self.cli.runner.run(&invocation)?;
        if output.success() {
            return Ok(output);
        }
        debug!(
            code = ?output.code,
            "`{}` failed: {}",
            command,
            output.combined()
        );
        Err(CliError::Exit {
            command,
            code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Run for the side effect only.
    pub fn execute(self) -> Result<(), CliError> {
        self.run_checked().map(|_| ())
    }

    /// Stdout and stderr combined into one trimmed string.
    pub fn output(self) -> Result<String, CliError> {
        self.run_checked().map(|out| out.combined())
    }

    /// Stdout and stderr separately, each trimmed.
    pub fn outputs(self) -> Result<(String, String), CliError> {
        self.run_checked().map(|out| {
            (out.stdout.trim().to_string(), out.stderr.trim().to_string())
        })
    }

    /// Write stdout to `file_name` inside the work directory and return the
    /// path. Used to hand rendered manifests to `apply -f`.
    pub fn output_to_file(self, file_name: &str) -> Result<PathBuf, CliError> {
        let path = self.cli.work_dir().join(file_name);
        let output = self.run_checked()?;
        std::fs::write(&path, output.stdout).map_err(|source| {
            CliError::WriteOutput {
                path: path.clone(),
                source,
            }
        })?;
        Ok(path)
    }
}
