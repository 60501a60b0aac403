use std::path::PathBuf;

use envconfig::Envconfig;

use crate::cli::Identity;
use crate::error::CliError;

/// Connection settings for the cluster CLI.
#[derive(Envconfig, Debug, Clone)]
pub struct CliConfig {
    #[envconfig(from = "OCTEST_CLI_BINARY", default = "oc")]
    pub binary: String,

    // Credentials of the unprivileged test user
    #[envconfig(from = "KUBECONFIG")]
    pub kubeconfig: Option<String>,

    #[envconfig(from = "OCTEST_ADMIN_KUBECONFIG")]
    pub admin_kubeconfig: Option<String>,

    // Hosted (guest) cluster credentials
    #[envconfig(from = "OCTEST_GUEST_KUBECONFIG")]
    pub guest_kubeconfig: Option<String>,

    #[envconfig(from = "OCTEST_NAMESPACE")]
    pub namespace: Option<String>,

    /// Where rendered manifests and captured outputs are written.
    /// A temporary directory is used when unset.
    #[envconfig(from = "OCTEST_WORK_DIR")]
    pub work_dir: Option<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            binary: "oc".to_string(),
            kubeconfig: None,
            admin_kubeconfig: None,
            guest_kubeconfig: None,
            namespace: None,
            work_dir: None,
        }
    }
}

impl CliConfig {
    /// Kubeconfig to pass for `identity`. `None` means the CLI's ambient
    /// credentials are used.
    pub fn kubeconfig_for(
        &self,
        identity: Identity,
    ) -> Result<Option<PathBuf>, CliError> {
        let path = match identity {
            Identity::User => self.kubeconfig.as_ref(),
            Identity::Admin => {
                self.admin_kubeconfig.as_ref().or(self.kubeconfig.as_ref())
            }
            Identity::Guest => Some(
                self.guest_kubeconfig
                    .as_ref()
                    .ok_or(CliError::MissingKubeconfig(Identity::Guest))?,
            ),
        };
        Ok(path.map(PathBuf::from))
    }
}
