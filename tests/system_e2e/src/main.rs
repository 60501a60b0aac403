use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use envconfig::Envconfig;
use octest_cli::Cli;
use system_e2e::{ScenarioName, TestConfig, preflight, run_scenarios};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Run end-to-end scenarios against the cluster the CLI is logged in to.
#[derive(Parser, Debug)]
#[command(name = "system-e2e", version)]
struct Args {
    /// Scenario to run; repeat to run several. Runs all when omitted.
    #[arg(long = "scenario", value_enum)]
    scenarios: Vec<ScenarioName>,

    /// List scenario names and exit.
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,system_e2e=debug,octest_core=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    if args.list {
        for name in ScenarioName::ALL {
            println!("{name}");
        }
        return ExitCode::SUCCESS;
    }

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("E2E run aborted: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<bool> {
    info!("Starting System E2E Test...");
    let config = TestConfig::init_from_env()?;
    let cli = Cli::from_env()?;
    preflight::check_prerequisites(&cli)?;

    let selected = if args.scenarios.is_empty() {
        ScenarioName::ALL.to_vec()
    } else {
        args.scenarios
    };
    let reports = run_scenarios(&selected, &config, &cli).await?;

    println!();
    for report in &reports {
        println!("{report}");
    }
    let failed = reports.iter().filter(|r| r.failed()).count();
    if failed > 0 {
        error!(failed, total = reports.len(), "E2E scenarios failed");
        Ok(false)
    } else {
        info!(total = reports.len(), "E2E scenarios passed");
        Ok(true)
    }
}
