//! Command-line driver for the interview queue engine.
//!
//! `simulate` replays a burst of applicants against a manual clock so the
//! admission, eviction and estimate behaviour can be inspected without
//! waiting for real calls to finish.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use clap::{Parser, Subcommand};
use tracing::info;

use interview_engine::logging::{setup_logging, LoggingConfig};
use interview_engine::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (TOML, JSON or YAML); INTERVIEW_QUEUE__* env vars override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective configuration as JSON
    Config,

    /// Replay a burst of applicants on a simulated clock
    Simulate {
        /// Number of applicants arriving at once
        #[arg(short, long, default_value = "6")]
        applicants: usize,

        /// Minutes between leave events (0 lets every call run to its forced end)
        #[arg(short = 'e', long, default_value = "0")]
        leave_every: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = InterviewQueueConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    setup_logging(LoggingConfig::try_from(&config.logging)?)?;

    match args.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Simulate {
            applicants,
            leave_every,
        } => simulate(config, applicants, leave_every).await,
    }
}

async fn simulate(config: InterviewQueueConfig, applicants: usize, leave_every: i64) -> Result<()> {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemorySessionStore::new());
    let scheduler = Arc::new(ManualEvictionScheduler::new());
    let provisioner = Arc::new(RoomUrlProvisioner::from_config(&config.provisioning)?);

    let controller = AdmissionController::new(
        config.admission.clone(),
        store.clone(),
        scheduler.clone(),
        provisioner,
        clock.clone(),
    );
    let estimator = WaitTimeEstimator::new(config.admission.clone(), store.clone(), clock.clone());

    info!("Simulating {} applicants", applicants);

    for n in 0..applicants {
        let id = SessionId::from(format!("applicant-{:02}", n + 1));
        store.insert(Session::new(id.clone())).await?;
        match controller.join(&id).await? {
            JoinOutcome::InCall { call_url } => println!("t+0m   {} joined call {}", id, call_url),
            JoinOutcome::Queued { position } => {
                let eta = estimator.estimate_wait(&id).await?;
                println!("t+0m   {} queued at #{} (eta {} min)", id, position, eta);
            }
        }
    }

    let start = clock.now();
    let step = Duration::minutes(1);

    while controller.stats().await?.in_call > 0 {
        clock.advance(step);
        let elapsed = (clock.now() - start).num_minutes();

        if leave_every > 0 && elapsed % leave_every == 0 {
            let in_call = store.list_in_call().await?;
            if let Some(session) = in_call.first() {
                let outcome = controller.leave(&session.id).await?;
                println!("t+{}m  {} left, admitted {:?}", elapsed, session.id, outcome.admitted);
            }
        }

        for eviction in scheduler.take_due(clock.now()) {
            let outcome = controller
                .forced_end(&eviction.session_id, &eviction.handle)
                .await?;
            if outcome.cleared {
                println!(
                    "t+{}m  {} evicted, admitted {:?}",
                    elapsed, eviction.session_id, outcome.admitted
                );
            }
        }
    }

    let stats = controller.stats().await?;
    println!("done: {}", serde_json::to_string(&stats)?);
    Ok(())
}
