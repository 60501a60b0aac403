//! `${NAME}` parameter substitution and the renderers that turn a template
//! plus parameters into a manifest file ready for `apply -f`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use octest_cli::{Cli, CliError};
use thiserror::Error;
use tracing::debug;

use crate::naming::random_suffix;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("invalid parameter `{0}`, expected KEY=VALUE")]
    InvalidParam(String),

    #[error("parameter `{0}` given more than once")]
    DuplicateParam(String),

    #[error("no value for placeholder ${{{0}}}")]
    MissingParam(String),

    #[error("unterminated placeholder at byte {0}")]
    Unterminated(usize),

    #[error("failed to read template {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write rendered template {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to process template {path:?}")]
    Process {
        path: PathBuf,
        #[source]
        source: CliError,
    },
}

impl TemplateError {
    /// Failures of the rendering machinery rather than of the template.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TemplateError::Write { .. } | TemplateError::Process { .. })
    }
}

/// Named template parameters. Keys are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert; a repeated key replaces the earlier value.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Parse `KEY=VALUE` pairs, rejecting malformed and repeated keys.
    pub fn parse<I, S>(pairs: I) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut params = BTreeMap::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair
                .split_once('=')
                .filter(|(key, _)| is_param_name(key))
                .ok_or_else(|| TemplateError::InvalidParam(pair.to_string()))?;
            if params.insert(key.to_string(), value.to_string()).is_some() {
                return Err(TemplateError::DuplicateParam(key.to_string()));
            }
        }
        Ok(Self(params))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `-p KEY=VALUE` pairs for `oc process`.
    pub fn to_process_args(&self) -> Vec<String> {
        self.iter()
            .flat_map(|(k, v)| ["-p".to_string(), format!("{k}={v}")])
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

fn is_param_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A manifest with `${NAME}` placeholders.
#[derive(Debug, Clone)]
pub struct Template {
    text: String,
}

impl Template {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn from_file(path: &Path) -> Result<Self, TemplateError> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            TemplateError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(Self::new(text))
    }

    /// Names of all placeholders in the template.
    pub fn placeholders(&self) -> Result<BTreeSet<String>, TemplateError> {
        let mut names = BTreeSet::new();
        self.substitute(|name| {
            names.insert(name.to_string());
            Ok(String::new())
        })?;
        Ok(names)
    }

    /// Replace every placeholder with its parameter.
    ///
    /// Parameters no placeholder refers to are ignored. Substituted values
    /// are not scanned again.
    pub fn render(&self, params: &Params) -> Result<String, TemplateError> {
        self.substitute(|name| {
            params
                .get(name)
                .map(str::to_string)
                .ok_or_else(|| TemplateError::MissingParam(name.to_string()))
        })
    }

    fn substitute(
        &self,
        mut value_of: impl FnMut(&str) -> Result<String, TemplateError>,
    ) -> Result<String, TemplateError> {
        let text = self.text.as_str();
        let mut out = String::with_capacity(text.len());
        let mut pos = 0;

        while let Some(offset) = text[pos..].find("${") {
            let open = pos + offset;
            out.push_str(&text[pos..open]);
            let rest = &text[open + 2..];
            let close = rest
                .find('}')
                .ok_or(TemplateError::Unterminated(open))?;
            let name = &rest[..close];
            if is_param_name(name) {
                out.push_str(&value_of(name)?);
            } else {
                // not a parameter reference, keep as written
                out.push_str(&text[open..open + 2 + close + 1]);
            }
            pos = open + 2 + close + 1;
        }
        out.push_str(&text[pos..]);
        Ok(out)
    }
}

/// Turns a template file and parameters into a manifest file on disk.
pub trait TemplateRenderer: Send + Sync {
    fn render(
        &self,
        template: &Path,
        params: &Params,
    ) -> Result<PathBuf, TemplateError>;
}

fn rendered_file_name(template: &Path, extension: &str) -> String {
    let stem = template
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "resource".to_string());
    format!("{}-{stem}.{extension}", random_suffix(8))
}

/// Renders in process and writes the manifest into `out_dir`.
#[derive(Debug, Clone)]
pub struct LocalRenderer {
    out_dir: PathBuf,
}

impl LocalRenderer {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    /// Writes into the CLI's work directory.
    pub fn for_cli(cli: &Cli) -> Self {
        Self::new(cli.work_dir())
    }
}

impl TemplateRenderer for LocalRenderer {
    fn render(
        &self,
        template: &Path,
        params: &Params,
    ) -> Result<PathBuf, TemplateError> {
        let rendered = Template::from_file(template)?.render(params)?;
        let path = self.out_dir.join(rendered_file_name(template, "yaml"));
        std::fs::write(&path, rendered).map_err(|source| {
            TemplateError::Write {
                path: path.clone(),
                source,
            }
        })?;
        debug!(template = ?template, rendered = ?path, "rendered template");
        Ok(path)
    }
}

/// Delegates to `oc process` so OpenShift `Template` objects (with their
/// declared parameters and generators) are rendered by the cluster CLI.
#[derive(Debug, Clone)]
pub struct OcProcessRenderer {
    cli: Cli,
}

impl OcProcessRenderer {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }
}

impl TemplateRenderer for OcProcessRenderer {
    fn render(
        &self,
        template: &Path,
        params: &Params,
    ) -> Result<PathBuf, TemplateError> {
        let path = self
            .cli
            .as_admin()
            .run("process")
            .args(["--ignore-unknown-parameters=true", "-f"])
            .arg(template.to_string_lossy())
            .args(params.to_process_args())
            .output_to_file(&rendered_file_name(template, "json"))
            .map_err(|source| TemplateError::Process {
                path: template.to_path_buf(),
                source,
            })?;
        debug!(template = ?template, rendered = ?path, "processed template");
        Ok(path)
    }
}
