use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use dotenvy::dotenv;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use sheaf_cli::{Command, Config};
use sheaf_client::{KvStoreEnum, UpstreamClient};
use sheaf_core::{
    HarvestService, HarvestStatus, InvocationOutcome, MergedSnapshot, SheafConfig,
    TracingReporter, Universe, load_sheaf_config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let config = Config::parse();

    let sheaf_config = load_sheaf_config(config.config.clone())?.ok_or_else(|| {
        anyhow::anyhow!(
            "No configuration file found. Create ~/.config/sheaf/sheaf.toml or use --config"
        )
    })?;
    sheaf_config
        .validate()
        .context("Invalid configuration")?;

    let upstream = UpstreamClient::new(
        &sheaf_config.provider,
        config.provider_api_key.clone(),
        &sheaf_config.http,
        sheaf_config.retry.clone(),
    )
    .context("Failed to create provider client")?;

    let store = if config.memory_store {
        warn!("Using the in-memory store; nothing persists after this process exits");
        KvStoreEnum::memory()
    } else {
        let (url, token) = config.kv_credentials()?;
        KvStoreEnum::rest(url, token, &sheaf_config.http, sheaf_config.retry.clone())
            .context("Failed to create key-value store client")?
    };

    let service = HarvestService::with_config(store, upstream, sheaf_config.harvest.clone());
    execute(config.command, &service, &sheaf_config).await
}

type Service = HarvestService<KvStoreEnum, UpstreamClient>;

async fn execute(
    command: Command,
    service: &Service,
    sheaf_config: &SheafConfig,
) -> anyhow::Result<()> {
    let reporter = TracingReporter;

    match command {
        Command::Invoke { .. } => {
            let universe = load_universe(sheaf_config)?;
            let outcome = service
                .run_invocation_with_progress(&universe, command.window(), &reporter, Utc::now())
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            print_outcome(&outcome);
        }
        Command::Merge => {
            let universe = load_universe(sheaf_config)?;
            let outcome = service
                .merge_with_progress(&universe, &reporter, Utc::now())
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            print_outcome(&outcome);
        }
        Command::Status => {
            let status = service.status().await?;
            print_status(&status);
        }
        Command::Snapshot { summary } => match service.snapshot().await? {
            Some(snapshot) if summary => print_snapshot_summary(&snapshot),
            Some(snapshot) => {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            }
            None => eprintln!("No snapshot has been published yet."),
        },
        Command::Run {
            interval_secs,
            until_merged,
        } => {
            run_scheduler(
                service,
                sheaf_config,
                Duration::from_secs(interval_secs),
                until_merged,
            )
            .await?;
        }
    }

    Ok(())
}

fn load_universe(sheaf_config: &SheafConfig) -> anyhow::Result<Universe> {
    Universe::from_config(&sheaf_config.universe).context("Failed to load the universe")
}

/// Invokes on a fixed interval until Ctrl-C (or the merge, with `until_merged`).
///
/// The universe is re-read before every invocation. A failed invocation is
/// logged and the loop keeps going; an in-flight invocation always runs to
/// completion before shutdown.
async fn run_scheduler(
    service: &Service,
    sheaf_config: &SheafConfig,
    interval: Duration,
    until_merged: bool,
) -> anyhow::Result<()> {
    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, stopping after the current invocation");
            signal_token.cancel();
        }
    });

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = interval.as_secs(), "Scheduler started");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let universe = match load_universe(sheaf_config) {
            Ok(universe) => universe,
            Err(e) => {
                error!("{:#}", e);
                continue;
            }
        };

        match service
            .run_invocation_with_progress(
                &universe,
                Default::default(),
                &TracingReporter,
                Utc::now(),
            )
            .await
        {
            Ok(outcome) => {
                print_outcome(&outcome);
                let cycle_done = matches!(
                    outcome,
                    InvocationOutcome::Merged { .. } | InvocationOutcome::Idle { .. }
                );
                if until_merged && cycle_done {
                    info!("Cycle merged, scheduler exiting");
                    break;
                }
            }
            Err(e) => {
                error!(
                    error = %e,
                    retryable = e.is_retryable(),
                    "Invocation failed: {}",
                    e.user_message()
                );
            }
        }
    }

    info!("Scheduler stopped");
    Ok(())
}

fn print_outcome(outcome: &InvocationOutcome) {
    match outcome {
        InvocationOutcome::Committed {
            batch_start,
            batch_size,
            succeeded,
            failed,
            next_offset,
            cursor_advanced,
        } => {
            info!("");
            info!("═══════════════════════════════════════════════════════");
            info!("Batch committed: [{}, {})", batch_start, batch_start + batch_size);
            info!("═══════════════════════════════════════════════════════");
            info!("  ✓ Succeeded:         {}", succeeded);
            info!("  ✗ Failed:            {}", failed);
            if *cursor_advanced {
                info!("  → Next offset:       {}", next_offset);
            } else {
                info!("  → Cursor unchanged (manual window)");
            }
            info!("═══════════════════════════════════════════════════════");
        }
        InvocationOutcome::Rejected {
            batch_start,
            batch_size,
            succeeded,
            failed,
            reason,
        } => {
            warn!(
                "Batch [{}, {}) rejected: {} ({} ok, {} failed). Retrying on the next invocation.",
                batch_start,
                batch_start + batch_size,
                reason,
                succeeded,
                failed
            );
        }
        InvocationOutcome::Merged {
            cycle,
            count,
            part_count,
            missing_parts,
        } => {
            info!("");
            info!("═══════════════════════════════════════════════════════");
            info!("Cycle {} published", cycle);
            info!("═══════════════════════════════════════════════════════");
            info!("  Records:             {}", count);
            info!("  Batches merged:      {}", part_count);
            info!("  Batches missing:     {}", missing_parts);
            info!("═══════════════════════════════════════════════════════");
        }
        InvocationOutcome::MergeAborted { expected_parts } => {
            warn!(
                "Merge aborted: none of the {} expected batch records exist",
                expected_parts
            );
        }
        InvocationOutcome::Idle { cycle } => {
            info!("Cycle {} is already published; nothing to do", cycle);
        }
    }
}

fn print_status(status: &HarvestStatus) {
    println!("\nHarvest status\n");
    match &status.cursor {
        Some(cursor) => {
            println!("  Cycle:                 {}", cursor.cycle_date);
            println!("  Offset:                {}", cursor.offset);
            println!("  Cursor version:        {}", cursor.version);
            match cursor.completed_cycle {
                Some(day) => println!("  Last published cycle:  {}", day),
                None => println!("  Last published cycle:  -"),
            }
        }
        None => println!("  Cursor:                not initialised"),
    }
    match status.last_run {
        Some(at) => println!("  Last run:              {}", at.to_rfc3339()),
        None => println!("  Last run:              never"),
    }
    if let Some(batch) = &status.last_batch {
        println!(
            "  Last batch:            [{}, {}) {} ({} ok, {} failed{})",
            batch.batch_start,
            batch.batch_start + batch.batch_size,
            batch.disposition.as_str(),
            batch.succeeded,
            batch.failed,
            if batch.rate_limited { ", rate-limited" } else { "" }
        );
        if let Some(reason) = &batch.reason {
            println!("  Reason:                {}", reason);
        }
    }
    println!();
}

fn print_snapshot_summary(snapshot: &MergedSnapshot) {
    println!("\nPublished snapshot\n");
    println!("  Generated at:          {}", snapshot.generated_at.to_rfc3339());
    println!("  Universe size:         {}", snapshot.universe_total);
    println!("  Records:               {}", snapshot.count);
    println!("  Batches merged:        {}", snapshot.part_count);
    println!("  Batches missing:       {}", snapshot.missing_parts);
    println!();
}
