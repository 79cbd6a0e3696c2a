use clap::Parser;
use edflex_core::config::EdflexConfig;
use edflex_core::jobs::scheduler::DEFAULT_TICK_INTERVAL;
use edflex_core::jobs::{JobOutcome, JobScheduler, JobTrigger, SyncJob};
use edflex_core::models::SyncKind;
use edflex_core::sync::CategorySynchronizer;
use edflex_core::EdflexApi;
use edflex_integrations::EdflexApiClient;
use edflex_sync::cli::{Cli, Commands};
use edflex_sync::components::AppComponents;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    edflex_core::o11y::init_tracing_from_env()?;
    let cli = Cli::parse();
    let components = Arc::new(AppComponents::new(EdflexConfig::from_env()?));
    let config = components.config();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let now = chrono::Utc::now();
            let mut scheduler = JobScheduler::new(DEFAULT_TICK_INTERVAL)?;
            scheduler.register(
                Arc::new(components.categories_job()),
                &config.categories_cron,
                now,
            )?;
            scheduler.register(Arc::new(components.contents_job()), &config.contents_cron, now)?;
            forward_signals(scheduler.trigger())?;

            scheduler
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!(error = %e, "failed to listen for shutdown signal");
                    }
                })
                .await;
        }
        Commands::SyncCategories => {
            let outcome = components.categories_job().execute().await;
            report(&outcome)?;
        }
        Commands::SyncContents {
            max_records,
            staleness_hours,
        } => {
            let mut job = components.contents_job().with_max_records(max_records);
            if let Some(hours) = staleness_hours {
                if hours <= 0 {
                    anyhow::bail!("--staleness-hours must be > 0");
                }
                job = job.with_staleness(chrono::Duration::hours(hours));
            }
            let outcome = job.execute().await;
            report(&outcome)?;
        }
        Commands::CheckConnection => {
            let client = EdflexApiClient::from_config(config)?;
            match client.can_connect_to_the_api().await {
                Ok(true) => println!("edflex api: ok"),
                Ok(false) => anyhow::bail!("edflex api: credentials rejected"),
                Err(e) => anyhow::bail!("edflex api: error ({e})"),
            }
        }
        Commands::PurgeOrphans => {
            let api = Arc::new(EdflexApiClient::from_config(config)?);
            let store = Arc::new(components.sqlite_category_store().await?);
            let deleted = CategorySynchronizer::new(api, store)
                .delete_orphaned_edflex_category_translations()
                .await?;
            println!("deleted {deleted} orphaned category translations");
        }
        Commands::ShowConfig => {
            println!("{config:#?}");
        }
    }

    Ok(())
}

/// SIGHUP requests a categories run and SIGUSR1 a contents run.
#[cfg(unix)]
fn forward_signals(trigger: JobTrigger) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    for (signal_kind, kind) in [
        (SignalKind::hangup(), SyncKind::Categories),
        (SignalKind::user_defined1(), SyncKind::Contents),
    ] {
        let mut signals = signal(signal_kind)?;
        let requests = futures_util::stream::poll_fn(move |cx| signals.poll_recv(cx));
        let trigger = trigger.clone();
        tokio::spawn(async move { trigger.forward(requests, kind).await });
    }
    Ok(())
}

#[cfg(not(unix))]
fn forward_signals(_trigger: JobTrigger) -> anyhow::Result<()> {
    Ok(())
}

fn report(outcome: &JobOutcome) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    match outcome {
        JobOutcome::Failed { error } => anyhow::bail!("synchronization failed: {error}"),
        _ => Ok(()),
    }
}
