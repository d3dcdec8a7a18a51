use anyhow::Result;
use clap::Parser;
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

use hubtools::cli::{Cli, Commands};
use hubtools::config::{Config, LoggingConfig};
use hubtools::engine::ConsoleProgress;
use hubtools::menu::{settle, Flow, Menu};
use hubtools::operations::{ExtractOptions, Operations};
use hubtools::report;
use hubtools::shutdown::{say_goodbye, InterruptGuard};
use hubtools::{initialize_config, CrmClient, InitOptions, RateLimitedTransport};

fn init_logging(logging: &LoggingConfig) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if logging.format == "json" {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let overrides = cli.overrides();

    // Handle init command early as it doesn't need config loading
    if let Some(Commands::Init {
        config,
        no_prompt,
        force,
    }) = &cli.command
    {
        let mut defaults = Config::default();
        defaults.merge(overrides);
        init_logging(&defaults.logging);
        return initialize_config(InitOptions {
            config_path: config.clone(),
            no_prompt: *no_prompt,
            force: *force,
        })
        .await;
    }

    let mut config = Config::load(cli.config.as_ref())?;
    config.merge(overrides);
    init_logging(&config.logging);
    debug!(paths = ?config.paths, batch = ?config.batch, "Effective configuration");

    if config.api.token.as_deref().map_or(true, |t| t.trim().is_empty()) {
        eprintln!("No HubSpot access token found.");
        eprintln!("Set HUBSPOT_TOKEN in a .env file, run `hubtools init`, or pass --token.");
        return Ok(());
    }
    config.validate()?;

    let guard = InterruptGuard::new();
    guard.listen();

    let transport = RateLimitedTransport::new(&config.api)?;
    let ops = Operations::new(CrmClient::new(transport), config, guard.token());

    match cli.command.unwrap_or(Commands::Menu) {
        Commands::Init { .. } => {}
        Commands::Menu => Menu::new(&ops, &guard).run().await?,
        Commands::Objects => {
            let _busy = guard.busy();
            settle(&guard, ops.catalog().await, report::objects);
        }
        Commands::Fields { object, .. } => {
            let _busy = guard.busy();
            match object {
                Some(object) => settle(&guard, ops.export_fields(&object).await, |p| {
                    report::written(p);
                }),
                None => settle(&guard, ops.export_all_fields().await, report::bulk),
            };
        }
        Commands::Sample { object, .. } => {
            let _busy = guard.busy();
            match object {
                Some(object) => settle(&guard, ops.export_sample(&object).await, |p| {
                    report::written(p);
                }),
                None => settle(&guard, ops.export_all_samples().await, report::bulk),
            };
        }
        Commands::Orphans {
            object,
            missing,
            properties,
            after,
            ..
        } => {
            let options = ExtractOptions {
                filters: Vec::new(),
                properties: (!properties.is_empty()).then_some(properties),
                start_after: after,
            };
            let mut progress = ConsoleProgress::new();
            let _busy = guard.busy();
            let result = ops
                .export_orphans(&object, missing.as_deref(), options, &mut progress)
                .await;
            settle(&guard, result, report::extract);
        }
        Commands::Delete { file, yes, .. } => delete(&ops, &guard, file, yes).await?,
    }
    Ok(())
}

/// Plans, confirms and runs the archive of one file or the whole input folder
async fn delete(
    ops: &Operations,
    guard: &InterruptGuard,
    file: Option<PathBuf>,
    yes: bool,
) -> Result<()> {
    let planned = {
        let _busy = guard.busy();
        match file {
            Some(path) => ops.plan_delete(&path).await.map(|plan| (vec![plan], Vec::new())),
            None => ops.plan_input_dir().await,
        }
    };
    let (plans, rejected) = match planned {
        Ok(found) => found,
        Err(err) => {
            settle(guard, Err::<(), _>(err), |_| {});
            return Ok(());
        }
    };

    report::rejected(&rejected);
    if plans.is_empty() {
        println!("Nothing to archive.");
        return Ok(());
    }
    for plan in &plans {
        report::plan(plan);
    }

    if !yes {
        let total: usize = plans.iter().map(|p| p.ids.len()).sum();
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Archive {total} record(s)?"))
            .default(false)
            .interact();
        match confirmed {
            Ok(true) => {}
            Ok(false) => {
                println!("Nothing archived.");
                return Ok(());
            }
            Err(dialoguer::Error::IO(err)) if err.kind() == std::io::ErrorKind::Interrupted => {
                say_goodbye();
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }
    }

    for plan in &plans {
        let mut progress = ConsoleProgress::new();
        let _busy = guard.busy();
        let result = ops.execute_delete(plan, &mut progress).await;
        if settle(guard, result, report::delete) == Flow::Stop {
            break;
        }
    }
    info!(files = plans.len(), "Archive finished");
    Ok(())
}
