//! Create and remove templated cluster objects.
//!
//! `create` only means the API server accepted the object. Anything that
//! depends on the object having taken effect has to be polled for, which is
//! what the `wait_for_*` helpers are for.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use octest_cli::{Cli, CliError, looks_not_found};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::poll::{CheckError, PollError, Poller, Readiness};
use crate::template::{LocalRenderer, Params, TemplateRenderer};

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("failed to render template {template:?}")]
    TemplateRender {
        template: PathBuf,
        #[source]
        source: PollError,
    },

    #[error("cluster rejected {target}")]
    Apply {
        target: ResourceRef,
        #[source]
        source: CliError,
    },

    #[error("failed to delete {target}")]
    Delete {
        target: ResourceRef,
        #[source]
        source: CliError,
    },

    #[error("failed to query {target}")]
    Query {
        target: ResourceRef,
        #[source]
        source: CliError,
    },

    #[error("unexpected output for {target}")]
    Decode {
        target: ResourceRef,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    NotDeleted(PollError),

    #[error(transparent)]
    Converge(PollError),
}

/// Identifies one cluster object for get/delete.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

impl ResourceRef {
    pub fn namespaced(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    pub fn cluster(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: None,
        }
    }

    /// `<kind> <name> [-n <namespace>]`
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![self.kind.clone(), self.name.clone()];
        if let Some(ref ns) = self.namespace {
            args.push("-n".to_string());
            args.push(ns.clone());
        }
        args
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)?;
        if let Some(ref ns) = self.namespace {
            write!(f, " in {ns}")?;
        }
        Ok(())
    }
}

/// Template plus parameters for one object to create.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    pub template: PathBuf,
    pub params: Params,
    pub target: ResourceRef,
}

impl ResourceDescriptor {
    /// Seeds `NAME` and, for namespaced targets, `NAMESPACE` from `target`.
    pub fn new(template: impl Into<PathBuf>, target: ResourceRef) -> Self {
        let mut params = Params::new().set("NAME", target.name.clone());
        if let Some(ref ns) = target.namespace {
            params = params.set("NAMESPACE", ns.clone());
        }
        Self {
            template: template.into(),
            params,
            target,
        }
    }

    pub fn param(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.params = self.params.set(key, value);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Cleanup mode: an object that is already gone is fine.
    IgnoreNotFound,
    Strict,
}

/// Applies rendered templates and tears the resulting objects down again.
#[derive(Clone)]
pub struct ResourceManager {
    cli: Cli,
    renderer: Arc<dyn TemplateRenderer>,
    render_poller: Poller,
    delete_poller: Poller,
}

impl fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceManager")
            .field("cli", &self.cli)
            .field("render_poller", &self.render_poller)
            .field("delete_poller", &self.delete_poller)
            .finish_non_exhaustive()
    }
}

impl ResourceManager {
    /// Queries and deletes run with `cli`'s identity; `create` always
    /// applies as admin.
    pub fn new(cli: Cli, renderer: Arc<dyn TemplateRenderer>) -> Self {
        Self {
            cli,
            renderer,
            render_poller: Poller::render(),
            delete_poller: Poller::deletion(),
        }
    }

    pub fn with_local_renderer(cli: Cli) -> Self {
        let renderer = Arc::new(LocalRenderer::for_cli(&cli));
        Self::new(cli, renderer)
    }

    pub fn with_render_poller(mut self, poller: Poller) -> Self {
        self.render_poller = poller;
        self
    }

    pub fn with_delete_poller(mut self, poller: Poller) -> Self {
        self.delete_poller = poller;
        self
    }

    pub fn cli(&self) -> &Cli {
        &self.cli
    }

    /// Render the descriptor's template and apply it as admin.
    pub async fn create(
        &self,
        descriptor: &ResourceDescriptor,
    ) -> Result<ResourceRef, ResourceError> {
        let manifest = self.render(descriptor).await?;
        check_rendered_identity(&manifest, &descriptor.target);
        debug!(resource = %descriptor.target, manifest = ?manifest, "applying");

        self.cli
            .as_admin()
            .without_namespace()
            .run("apply")
            .arg("-f")
            .arg(manifest.to_string_lossy())
            .execute()
            .map_err(|source| ResourceError::Apply {
                target: descriptor.target.clone(),
                source,
            })?;
        info!(resource = %descriptor.target, "created");
        Ok(descriptor.target.clone())
    }

    /// [`ResourceManager::create`], deleting the object again when the guard
    /// is dropped.
    pub async fn create_guarded(
        &self,
        descriptor: &ResourceDescriptor,
    ) -> Result<ResourceGuard, ResourceError> {
        let target = self.create(descriptor).await?;
        Ok(ResourceGuard {
            manager: self.clone(),
            target,
            armed: true,
        })
    }

    async fn render(
        &self,
        descriptor: &ResourceDescriptor,
    ) -> Result<PathBuf, ResourceError> {
        self.render_poller
            .until(
                format!("render {}", descriptor.template.display()),
                || {
                    let rendered = self
                        .renderer
                        .render(&descriptor.template, &descriptor.params);
                    async move {
                        match rendered {
                            Ok(path) => Ok(Readiness::Ready(path)),
                            Err(e) if e.is_retryable() => {
                                Err(CheckError::transient(e))
                            }
                            Err(e) => Err(CheckError::permanent(e)),
                        }
                    }
                },
            )
            .await
            .map_err(|source| ResourceError::TemplateRender {
                template: descriptor.template.clone(),
                source,
            })
    }

    pub fn delete(
        &self,
        target: &ResourceRef,
        policy: DeletePolicy,
    ) -> Result<(), ResourceError> {
        let mut cmd = self.cli.without_namespace().run("delete").args(target.args());
        if policy == DeletePolicy::IgnoreNotFound {
            cmd = cmd.arg("--ignore-not-found");
        }
        match cmd.execute() {
            Ok(()) => {
                info!(resource = %target, "deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() && policy == DeletePolicy::IgnoreNotFound => {
                info!(resource = %target, "the resource is deleted already");
                Ok(())
            }
            Err(source) => Err(ResourceError::Delete {
                target: target.clone(),
                source,
            }),
        }
    }

    /// Delete, then wait until `get` no longer finds the object.
    pub async fn delete_and_wait(
        &self,
        target: &ResourceRef,
        policy: DeletePolicy,
    ) -> Result<(), ResourceError> {
        self.delete(target, policy)?;
        self.delete_poller
            .until_true(format!("{target} to be deleted"), || {
                let gone = self.exists(target).map(|exists| !exists);
                async move { gone.map_err(CheckError::transient) }
            })
            .await
            .map_err(ResourceError::NotDeleted)
    }

    pub fn exists(&self, target: &ResourceRef) -> Result<bool, ResourceError> {
        let result = self
            .cli
            .without_namespace()
            .run("get")
            .args(target.args())
            .arg("--no-headers")
            .output();
        match result {
            Ok(out) => Ok(!looks_not_found(&out)),
            Err(e) if e.is_not_found() => Ok(false),
            Err(source) => Err(ResourceError::Query {
                target: target.clone(),
                source,
            }),
        }
    }

    /// `get -o=jsonpath=<path>`, stdout only.
    pub fn get_jsonpath(
        &self,
        target: &ResourceRef,
        path: &str,
    ) -> Result<String, ResourceError> {
        self.cli
            .without_namespace()
            .run("get")
            .args(target.args())
            .arg(format!("-o=jsonpath={path}"))
            .outputs()
            .map(|(stdout, _)| stdout)
            .map_err(|source| ResourceError::Query {
                target: target.clone(),
                source,
            })
    }

    /// The whole object as JSON.
    pub fn get_json(
        &self,
        target: &ResourceRef,
    ) -> Result<serde_json::Value, ResourceError> {
        self.get_as(target)
    }

    /// Decode the object into a typed view holding just the fields a
    /// scenario cares about.
    pub fn get_as<T: DeserializeOwned>(
        &self,
        target: &ResourceRef,
    ) -> Result<T, ResourceError> {
        let (stdout, _) = self
            .cli
            .without_namespace()
            .run("get")
            .args(target.args())
            .args(["-o", "json"])
            .outputs()
            .map_err(|source| ResourceError::Query {
                target: target.clone(),
                source,
            })?;
        serde_json::from_str(&stdout).map_err(|source| ResourceError::Decode {
            target: target.clone(),
            source,
        })
    }

    pub fn label(
        &self,
        target: &ResourceRef,
        key: &str,
        value: &str,
    ) -> Result<(), ResourceError> {
        self.cli
            .without_namespace()
            .run("label")
            .args(target.args())
            .args([format!("{key}={value}"), "--overwrite".to_string()])
            .execute()
            .map_err(|source| ResourceError::Apply {
                target: target.clone(),
                source,
            })
    }

    pub fn patch_merge(
        &self,
        target: &ResourceRef,
        patch: &serde_json::Value,
    ) -> Result<(), ResourceError> {
        self.cli
            .without_namespace()
            .run("patch")
            .args(target.args())
            .args(["--type=merge".to_string(), "-p".to_string(), patch.to_string()])
            .execute()
            .map_err(|source| ResourceError::Apply {
                target: target.clone(),
                source,
            })
    }

    pub async fn wait_for_exists(
        &self,
        target: &ResourceRef,
        poller: Poller,
    ) -> Result<(), ResourceError> {
        poller
            .until_true(format!("{target} to exist"), || {
                let exists = self.exists(target);
                async move { exists.map_err(CheckError::transient) }
            })
            .await
            .map_err(ResourceError::Converge)
    }

    /// Wait until the field at `path` equals `expected` (whitespace
    /// trimmed). Query failures count as transient.
    pub async fn wait_for_jsonpath(
        &self,
        target: &ResourceRef,
        path: &str,
        expected: &str,
        poller: Poller,
    ) -> Result<(), ResourceError> {
        poller
            .until_true(
                format!("{target} field {path} to become {expected:?}"),
                || {
                    let value = self.get_jsonpath(target, path);
                    async move {
                        let value = value.map_err(CheckError::transient)?;
                        debug!(resource = %target, path, value = %value, "observed");
                        Ok::<_, CheckError>(value.trim() == expected)
                    }
                },
            )
            .await
            .map_err(ResourceError::Converge)
    }

    /// Run `<verb> <args..>` until its output contains `needle`, returning
    /// that output. For free-form text only; prefer
    /// [`ResourceManager::wait_for_jsonpath`] for fields.
    pub async fn wait_for_output(
        &self,
        verb: &str,
        args: &[&str],
        needle: &str,
        poller: Poller,
    ) -> Result<String, ResourceError> {
        poller
            .until(format!("`{verb} {}` to mention {needle:?}", args.join(" ")), || {
                let output = self
                    .cli
                    .without_namespace()
                    .run(verb)
                    .args(args.iter().copied())
                    .output();
                async move {
                    let output = output.map_err(CheckError::from)?;
                    Ok::<_, CheckError>(if output.contains(needle) {
                        Readiness::Ready(output)
                    } else {
                        Readiness::Pending
                    })
                }
            })
            .await
            .map_err(ResourceError::Converge)
    }
}

/// Warn when the rendered manifest names a different object than the one
/// the caller will later delete; cleanup would silently miss it.
fn check_rendered_identity(manifest: &Path, target: &ResourceRef) {
    let Ok(text) = std::fs::read_to_string(manifest) else {
        return;
    };
    let Ok(doc) = serde_yaml::from_str::<serde_yaml::Value>(&text) else {
        return;
    };
    let kind = doc.get("kind").and_then(serde_yaml::Value::as_str);
    let name = doc
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(serde_yaml::Value::as_str);
    if let (Some(kind), Some(name)) = (kind, name) {
        if !kind.eq_ignore_ascii_case(&target.kind) || name != target.name {
            warn!(
                resource = %target,
                rendered = %format!("{kind}/{name}"),
                "rendered manifest does not match the tracked resource"
            );
        }
    }
}

/// Deletes its resource (ignoring not-found) when dropped.
#[must_use = "dropping the guard deletes the resource"]
pub struct ResourceGuard {
    manager: ResourceManager,
    target: ResourceRef,
    armed: bool,
}

impl ResourceGuard {
    pub fn target(&self) -> &ResourceRef {
        &self.target
    }

    /// Keep the resource; the guard no longer deletes it.
    pub fn disarm(mut self) -> ResourceRef {
        self.armed = false;
        self.target.clone()
    }

    /// Delete now and report the outcome instead of logging it.
    pub fn delete(mut self) -> Result<(), ResourceError> {
        self.armed = false;
        self.manager.delete(&self.target, DeletePolicy::IgnoreNotFound)
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) =
            self.manager.delete(&self.target, DeletePolicy::IgnoreNotFound)
        {
            let error = anyhow::Error::from(e);
            warn!(resource = %self.target, error = %format!("{error:#}"), "cleanup failed");
        }
    }
}
