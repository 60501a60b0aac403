// A pod reaches Running while its logs are collected in the background.
// The collector is joined before the scenario returns, so its output is
// never lost even when the pod converges first.

use std::time::Duration;

use anyhow::{Context, Result};
use octest_core::{BackgroundTask, ResourceDescriptor, Scenario, expect_contains, uniq};
use tracing::info;

pub const NAME: &str = "pod_with_collector";

const MESSAGE: &str = "octest-ready";

pub async fn run(s: &mut Scenario, image: &str) -> Result<()> {
    s.create_namespace()?;

    let ctx = s.ctx();
    let name = uniq("octest-pod");
    let pod = ctx.resource("pod", name.clone());
    let poller = ctx.poller();
    let resources = ctx.resources().clone();
    // Waits for the container to start, then dumps what it printed.
    let logs = ctx.cli().as_admin().run("logs").args([
        format!("pod/{name}"),
        "--pod-running-timeout=5m".to_string(),
    ]);
    let descriptor = ResourceDescriptor::new(ctx.fixture("pod.yaml"), pod.clone())
        .param("IMAGE", image)
        .param("MESSAGE", MESSAGE);

    s.create(&descriptor).await?;

    let collector = BackgroundTask::command("log collector", logs);

    let converged = resources
        .wait_for_jsonpath(&pod, "{.status.phase}", "Running", poller)
        .await;
    if converged.is_ok() {
        info!(pod = %pod, "pod running, waiting for log collector");
    }

    let logs = collector
        .join_within(poller.timeout() + Duration::from_secs(60))
        .await
        .context("log collector")?;
    converged?;
    let logs = logs.context("pod logs")?;

    expect_contains(&logs, MESSAGE, "pod log")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use octest_cli::{Cli, CliConfig, CommandOutput, FakeRunner};
    use octest_core::{Outcome, Poller, ScenarioContext};

    use super::*;

    #[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
    async fn collector_is_joined_after_pod_runs() {
        let phase_polls = AtomicUsize::new(0);
        let fake = Arc::new(FakeRunner::new(move |inv| match inv.verb() {
            Some("get") => {
                let n = phase_polls.fetch_add(1, Ordering::SeqCst);
                CommandOutput::ok(if n < 2 { "Pending" } else { "Running" })
            }
            Some("logs") => CommandOutput::ok(MESSAGE),
            _ => CommandOutput::ok(""),
        }));
        let cli = Cli::new(CliConfig::default(), fake.clone()).unwrap();
        let ctx = ScenarioContext::builder(NAME)
            .cli(cli)
            .fixtures(concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures"))
            .poller(Poller::new(Duration::from_millis(10), Duration::from_secs(5)))
            .build()
            .unwrap();

        let report = Scenario::new(ctx)
            .run(async |s: &mut Scenario| run(s, "busybox").await)
            .await;

        assert_eq!(report.outcome, Outcome::Passed, "{report}");
        assert_eq!(fake.count_verb("logs"), 1);
    }

    #[tokio::test]
    async fn pod_that_never_runs_fails_after_join() {
        let fake = Arc::new(FakeRunner::new(|inv| match inv.verb() {
            Some("get") => CommandOutput::ok("Pending"),
            Some("logs") => CommandOutput::failed(1, "container is waiting to start"),
            _ => CommandOutput::ok(""),
        }));
        let cli = Cli::new(CliConfig::default(), fake.clone()).unwrap();
        let ctx = ScenarioContext::builder(NAME)
            .cli(cli)
            .fixtures(concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures"))
            .poller(Poller::new(Duration::from_millis(5), Duration::from_millis(50)))
            .build()
            .unwrap();

        let report = Scenario::new(ctx)
            .run(async |s: &mut Scenario| run(s, "busybox").await)
            .await;

        assert!(report.failed());
        assert_eq!(fake.count_verb("logs"), 1);
        assert!(matches!(
            report.outcome,
            Outcome::Failed(ref reason) if reason.contains("Running")
        ));
    }
}
