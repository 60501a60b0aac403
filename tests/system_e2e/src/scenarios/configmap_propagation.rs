// A config map created from a template shows up in listings, carries the
// rendered data and picks up a label applied afterwards.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use octest_core::{ResourceDescriptor, Scenario, expect_eq, uniq};
use serde::Deserialize;
use tracing::info;

pub const NAME: &str = "configmap_propagation";

#[derive(Debug, Deserialize)]
struct ConfigMapView {
    #[serde(default)]
    data: BTreeMap<String, String>,
}

pub async fn run(s: &mut Scenario) -> Result<()> {
    s.create_namespace()?;

    let ctx = s.ctx();
    let name = uniq("octest-cm");
    let cm = ctx.resource("configmap", name.clone());
    let namespace = ctx.namespace().to_string();
    let poller = ctx.poller();
    let resources = ctx.resources().clone();
    let descriptor = ResourceDescriptor::new(ctx.fixture("configmap.yaml"), cm.clone())
        .param("LEVEL", "Debug");

    s.create(&descriptor).await?;

    resources
        .wait_for_output("get", &["configmap", "-n", namespace.as_str()], &name, poller)
        .await
        .context("config map never listed")?;
    info!(configmap = %cm, "config map listed");

    let view: ConfigMapView = resources.get_as(&cm)?;
    let level = view.data.get("level").map(String::as_str);
    expect_eq(level, Some("Debug"), "config map level")?;

    resources.label(&cm, "octest-verified", "true")?;
    resources
        .wait_for_jsonpath(&cm, "{.metadata.labels.octest-verified}", "true", poller)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use octest_cli::{Cli, CliConfig, CommandOutput, FakeRunner, Invocation};
    use octest_core::{Outcome, Poller, ScenarioContext};

    use super::*;

    fn context(fake: Arc<FakeRunner>) -> ScenarioContext {
        let cli = Cli::new(CliConfig::default(), fake).unwrap();
        ScenarioContext::builder(NAME)
            .cli(cli)
            .fixtures(concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures"))
            .poller(Poller::new(Duration::from_secs(1), Duration::from_secs(10)))
            .build()
            .unwrap()
    }

    /// `metadata.name` of the manifest passed to `apply -f`.
    fn applied_name(inv: &Invocation) -> String {
        let manifest = inv.args.last().unwrap();
        let text = std::fs::read_to_string(manifest).unwrap();
        text.lines()
            .find_map(|line| line.trim().strip_prefix("name: "))
            .unwrap()
            .to_string()
    }

    /// A cluster that lists the applied config map and serves `level`.
    fn cluster(level: &'static str) -> Arc<FakeRunner> {
        let mut applied: Option<String> = None;
        let mut labelled = false;
        Arc::new(FakeRunner::new(move |inv| {
            let args = inv.args.join(" ");
            match inv.verb() {
                Some("apply") => {
                    applied = Some(applied_name(inv));
                    CommandOutput::ok("")
                }
                Some("label") => {
                    labelled = true;
                    CommandOutput::ok("")
                }
                Some("get") if args.contains("jsonpath") => {
                    CommandOutput::ok(if labelled { "true" } else { "" })
                }
                Some("get") if args.contains("-o json") => CommandOutput::ok(
                    format!(r#"{{"data":{{"level":"{level}"}}}}"#),
                ),
                Some("get") => match applied {
                    Some(ref name) => CommandOutput::ok(format!("{name}   1   2s")),
                    None => CommandOutput::ok(""),
                },
                _ => CommandOutput::ok(""),
            }
        }))
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn passes_against_converging_cluster() {
        let fake = cluster("Debug");

        let report = Scenario::new(context(fake.clone()))
            .run(async |s: &mut Scenario| run(s).await)
            .await;

        assert_eq!(report.outcome, Outcome::Passed, "{report}");
        let applied = fake
            .calls()
            .into_iter()
            .find(|inv| inv.verb() == Some("apply"))
            .map(|inv| applied_name(&inv))
            .unwrap();
        assert!(applied.starts_with("octest-cm-"));
        assert_eq!(fake.count_verb("label"), 1);

        // config map first, then its namespace
        let deletes: Vec<_> = fake
            .calls()
            .into_iter()
            .filter(|inv| inv.verb() == Some("delete"))
            .collect();
        assert_eq!(deletes.len(), 2);
        assert_eq!(deletes[0].positional()[..2], ["configmap", applied.as_str()]);
        assert_eq!(deletes[1].positional()[0], "namespace");
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_level_fails_the_scenario() {
        let fake = cluster("Info");

        let report = Scenario::new(context(fake.clone()))
            .run(async |s: &mut Scenario| run(s).await)
            .await;

        match report.outcome {
            Outcome::Failed(ref reason) => assert_eq!(
                reason,
                "config map level: expected Some(\"Debug\"), got Some(\"Info\")"
            ),
            ref other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(fake.count_verb("label"), 0);
        assert_eq!(fake.count_verb("delete"), 2);
    }
}
