// Checks run once before any scenario touches the cluster.

use anyhow::{Context, Result};
use octest_cli::{Cli, CliError};

/// The CLI binary must be installed and logged in.
pub fn check_prerequisites(cli: &Cli) -> Result<()> {
    let binary = &cli.config().binary;
    if !is_tool_available(binary) {
        return Err(CliError::BinaryNotFound(binary.clone()).into());
    }

    let user = cli
        .without_namespace()
        .run("whoami")
        .output()
        .with_context(|| format!("{binary} is not logged in to a cluster"))?;

    tracing::info!(user = %user.trim(), "prerequisites are available");
    Ok(())
}

fn is_tool_available(tool: &str) -> bool {
    which::which(tool).is_ok()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use octest_cli::{CliConfig, CommandOutput, FakeRunner};

    use super::*;

    fn cli_for(binary: &str, fake: FakeRunner) -> Cli {
        let config = CliConfig {
            binary: binary.to_string(),
            ..CliConfig::default()
        };
        Cli::new(config, Arc::new(fake)).unwrap()
    }

    #[test]
    fn test_is_tool_available() {
        assert!(is_tool_available("sh"));
        assert!(!is_tool_available("octest-no-such-binary"));
    }

    #[test]
    fn logged_out_cli_fails_preflight() {
        let cli = cli_for(
            "sh",
            FakeRunner::new(|_| CommandOutput::failed(1, "error: You must be logged in")),
        );
        let err = check_prerequisites(&cli).unwrap_err();
        assert!(format!("{err:#}").contains("You must be logged in"));
    }

    #[test]
    fn missing_binary_fails_preflight() {
        let cli = cli_for("octest-no-such-binary", FakeRunner::succeeding());
        let err = check_prerequisites(&cli).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::BinaryNotFound(_))
        ));
    }
}
