// System E2E scenarios
// Each scenario runs in its own generated namespace against the cluster the
// configured CLI is logged in to.

pub mod preflight;

use std::sync::Arc;

use anyhow::{Result, bail};
use octest_cli::Cli;
use octest_core::{
    LocalRenderer, OcProcessRenderer, Scenario, ScenarioContext, ScenarioReport,
    TemplateRenderer,
};

pub use config::TestConfig;
pub use scenarios::ScenarioName;

pub fn renderer_for(config: &TestConfig, cli: &Cli) -> Result<Arc<dyn TemplateRenderer>> {
    match config.renderer.as_str() {
        "local" => Ok(Arc::new(LocalRenderer::for_cli(cli))),
        "oc-process" => Ok(Arc::new(OcProcessRenderer::new(cli.clone()))),
        other => bail!("unknown renderer {other:?}, expected `local` or `oc-process`"),
    }
}

/// Fresh context for one scenario run.
pub fn context_for(
    name: ScenarioName,
    config: &TestConfig,
    cli: &Cli,
) -> Result<ScenarioContext> {
    let ctx = ScenarioContext::builder(name.as_str())
        .cli(cli.clone())
        .renderer(renderer_for(config, cli)?)
        .namespace_prefix(config.namespace_prefix.clone())
        .fixtures(config.fixtures_dir.clone())
        .poller(config.poller())
        .no_cleanup(config.no_cleanup)
        .build()?;
    Ok(ctx)
}

pub async fn run_scenarios(
    names: &[ScenarioName],
    config: &TestConfig,
    cli: &Cli,
) -> Result<Vec<ScenarioReport>> {
    let mut reports = Vec::with_capacity(names.len());
    for &name in names {
        let ctx = context_for(name, config, cli)?;
        reports.push(name.run(Scenario::new(ctx), config).await);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use octest_cli::{CliConfig, FakeRunner};

    use super::*;

    #[test]
    fn unknown_renderer_is_rejected() {
        let cli = Cli::new(CliConfig::default(), Arc::new(FakeRunner::succeeding())).unwrap();
        let config = TestConfig {
            renderer: "helm".to_string(),
            ..TestConfig::default()
        };
        let err = renderer_for(&config, &cli).err().unwrap();
        assert!(err.to_string().contains("helm"));
        assert!(context_for(ScenarioName::ConfigmapPropagation, &config, &cli).is_err());
    }

    #[test]
    fn contexts_follow_config() {
        let cli = Cli::new(CliConfig::default(), Arc::new(FakeRunner::succeeding())).unwrap();
        let config = TestConfig {
            namespace_prefix: "ci".to_string(),
            no_cleanup: true,
            ..TestConfig::default()
        };
        let ctx = context_for(ScenarioName::PodWithCollector, &config, &cli).unwrap();
        assert_eq!(ctx.name(), "pod_with_collector");
        assert!(ctx.namespace().starts_with("ci-"));
        assert!(ctx.no_cleanup());
        assert_eq!(ctx.poller(), config.poller());
    }
}
