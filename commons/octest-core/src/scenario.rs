//! Per-scenario state and the create / wait / assert / clean-up flow.
//!
//! Every scenario gets its own [`ScenarioContext`] with a freshly generated
//! namespace, so scenarios never see each other's objects. Cleanups
//! registered with [`Scenario::defer`] run last-in first-out once the body
//! returns, whether it passed or not.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use octest_cli::Cli;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::naming::uniq;
use crate::poll::Poller;
use crate::resource::{
    DeletePolicy, ResourceDescriptor, ResourceError, ResourceManager,
    ResourceRef,
};
use crate::template::{LocalRenderer, TemplateRenderer};

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("skipped: {0}")]
    Skipped(String),

    #[error("scenario `{0}` has no CLI configured")]
    MissingCli(String),
}

pub struct ScenarioContext {
    name: String,
    namespace: String,
    cli: Cli,
    resources: ResourceManager,
    fixtures: PathBuf,
    poller: Poller,
    no_cleanup: bool,
}

impl fmt::Debug for ScenarioContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioContext")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("fixtures", &self.fixtures)
            .field("poller", &self.poller)
            .field("no_cleanup", &self.no_cleanup)
            .finish_non_exhaustive()
    }
}

pub struct ScenarioContextBuilder {
    name: String,
    cli: Option<Cli>,
    renderer: Option<Arc<dyn TemplateRenderer>>,
    namespace_prefix: String,
    fixtures: PathBuf,
    poller: Poller,
    no_cleanup: bool,
}

impl ScenarioContextBuilder {
    pub fn cli(mut self, cli: Cli) -> Self {
        self.cli = Some(cli);
        self
    }

    /// Defaults to rendering locally into the CLI's work dir.
    pub fn renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn namespace_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.namespace_prefix = prefix.into();
        self
    }

    pub fn fixtures(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fixtures = dir.into();
        self
    }

    /// Poller used for the scenario's own convergence waits.
    pub fn poller(mut self, poller: Poller) -> Self {
        self.poller = poller;
        self
    }

    pub fn no_cleanup(mut self, no_cleanup: bool) -> Self {
        self.no_cleanup = no_cleanup;
        self
    }

    pub fn build(self) -> Result<ScenarioContext, ScenarioError> {
        let cli = self.cli.ok_or(ScenarioError::MissingCli(self.name.clone()))?;
        let namespace = uniq(&self.namespace_prefix);
        let cli = cli.with_namespace(namespace.clone());
        let renderer = self
            .renderer
            .unwrap_or_else(|| Arc::new(LocalRenderer::for_cli(&cli)));
        let resources = ResourceManager::new(cli.as_admin(), renderer);
        Ok(ScenarioContext {
            name: self.name,
            namespace,
            cli,
            resources,
            fixtures: self.fixtures,
            poller: self.poller,
            no_cleanup: self.no_cleanup,
        })
    }
}

impl ScenarioContext {
    pub fn builder(name: impl Into<String>) -> ScenarioContextBuilder {
        ScenarioContextBuilder {
            name: name.into(),
            cli: None,
            renderer: None,
            namespace_prefix: "octest".to_string(),
            fixtures: PathBuf::from("fixtures"),
            poller: Poller::new(Duration::from_secs(5), Duration::from_secs(300)),
            no_cleanup: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The namespace generated for this scenario.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// User-identity CLI bound to the scenario namespace.
    pub fn cli(&self) -> &Cli {
        &self.cli
    }

    /// Admin-identity manager, also bound to the scenario namespace.
    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn poller(&self) -> Poller {
        self.poller
    }

    pub fn fixture(&self, file: impl AsRef<Path>) -> PathBuf {
        self.fixtures.join(file)
    }

    pub fn no_cleanup(&self) -> bool {
        self.no_cleanup
    }

    /// `kind/name` in the scenario namespace.
    pub fn resource(
        &self,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> ResourceRef {
        ResourceRef::namespaced(kind, name, self.namespace.clone())
    }
}

type Cleanup = Box<dyn FnOnce(&ScenarioContext) -> anyhow::Result<()> + Send>;

pub struct Scenario {
    ctx: ScenarioContext,
    cleanups: Vec<(String, Cleanup)>,
}

impl Scenario {
    pub fn new(ctx: ScenarioContext) -> Self {
        Self {
            ctx,
            cleanups: Vec::new(),
        }
    }

    pub fn ctx(&self) -> &ScenarioContext {
        &self.ctx
    }

    /// Error to return from a body whose preconditions do not hold.
    pub fn skip(reason: impl Into<String>) -> anyhow::Error {
        ScenarioError::Skipped(reason.into()).into()
    }

    pub fn defer(
        &mut self,
        label: impl Into<String>,
        action: impl FnOnce(&ScenarioContext) -> anyhow::Result<()> + Send + 'static,
    ) {
        self.cleanups.push((label.into(), Box::new(action)));
    }

    /// Delete `target` during cleanup; already being gone is fine.
    pub fn defer_delete(&mut self, target: ResourceRef) {
        self.defer(format!("delete {target}"), move |ctx| {
            ctx.resources()
                .delete(&target, DeletePolicy::IgnoreNotFound)
                .map_err(Into::into)
        });
    }

    /// Create the scenario namespace and schedule its removal.
    pub fn create_namespace(&mut self) -> Result<ResourceRef, ResourceError> {
        let target = ResourceRef::cluster("namespace", self.ctx.namespace.clone());
        self.ctx
            .cli
            .as_admin()
            .without_namespace()
            .run("create")
            .args(target.args())
            .execute()
            .map_err(|source| ResourceError::Apply {
                target: target.clone(),
                source,
            })?;
        info!(namespace = %self.ctx.namespace, "namespace created");
        self.defer_delete(target.clone());
        Ok(target)
    }

    /// Create from a template and schedule the object's deletion.
    pub async fn create(
        &mut self,
        descriptor: &ResourceDescriptor,
    ) -> Result<ResourceRef, ResourceError> {
        let target = self.ctx.resources.create(descriptor).await?;
        self.defer_delete(target.clone());
        Ok(target)
    }

    pub async fn run<F>(mut self, body: F) -> ScenarioReport
    where
        F: AsyncFnOnce(&mut Scenario) -> anyhow::Result<()>,
    {
        let start = Instant::now();
        let name = self.ctx.name.clone();
        info!(scenario = %name, namespace = %self.ctx.namespace, "running scenario");

        let outcome = match body(&mut self).await {
            Ok(()) => Outcome::Passed,
            Err(e) => match e.downcast_ref::<ScenarioError>() {
                Some(ScenarioError::Skipped(reason)) => {
                    info!(scenario = %name, reason = %reason, "scenario skipped");
                    Outcome::Skipped(reason.clone())
                }
                _ => {
                    error!(scenario = %name, error = %format!("{e:#}"), "scenario failed");
                    Outcome::Failed(format!("{e:#}"))
                }
            },
        };

        let cleanup_failures = self.run_cleanups();
        let outcome = match outcome {
            Outcome::Passed if !cleanup_failures.is_empty() => Outcome::Failed(
                format!("cleanup failed: {}", cleanup_failures.join("; ")),
            ),
            other => other,
        };

        let report = ScenarioReport {
            name,
            outcome,
            elapsed: start.elapsed(),
            cleanup_failures,
        };
        info!("{report}");
        report
    }

    fn run_cleanups(&mut self) -> Vec<String> {
        let cleanups = std::mem::take(&mut self.cleanups);
        let mut failures = Vec::new();
        for (label, action) in cleanups.into_iter().rev() {
            if self.ctx.no_cleanup {
                info!(
                    scenario = %self.ctx.name,
                    cleanup = %label,
                    "cleanup disabled, leaving in place"
                );
                continue;
            }
            if let Err(e) = action(&self.ctx) {
                warn!(
                    scenario = %self.ctx.name,
                    cleanup = %label,
                    error = %format!("{e:#}"),
                    "cleanup failed"
                );
                failures.push(format!("{label}: {e:#}"));
            }
        }
        failures
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed(String),
    Skipped(String),
}

#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub name: String,
    pub outcome: Outcome,
    pub elapsed: Duration,
    pub cleanup_failures: Vec<String>,
}

impl ScenarioReport {
    pub fn failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.elapsed.as_secs_f64();
        match self.outcome {
            Outcome::Passed => write!(f, "PASS {} ({secs:.1}s)", self.name),
            Outcome::Skipped(ref reason) => {
                write!(f, "SKIP {} ({secs:.1}s): {reason}", self.name)
            }
            Outcome::Failed(ref reason) => {
                write!(f, "FAIL {} ({secs:.1}s): {reason}", self.name)
            }
        }
    }
}
