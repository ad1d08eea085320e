use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use clap::{Parser, Subcommand};
use shared::status::{ChildState, StatusReport};
use store_core::{Registry, StaticEnvironment};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod backend;
mod config;
mod stores;

use backend::DemoBackend;
use config::load_settings;
use stores::AdminPage;

#[derive(Parser, Debug)]
#[command(about = "Mounts the admin page stores headlessly and reports their status")]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print status reports as JSON.
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mount the page, initialize it once and print the report.
    Run,
    /// Force the permissions fetch to fail once, then retry.
    RetryDemo,
    /// Select a user, then navigate and watch the selection reset.
    Navigate { path: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let command = args.command.unwrap_or(Command::Run);
    if matches!(command, Command::RetryDemo) && settings.fail_permissions_attempts == 0 {
        settings.fail_permissions_attempts = 1;
    }
    info!(?settings, ?command, "demo starting");

    let backend = DemoBackend::new(
        Duration::from_millis(settings.fetch_latency_ms),
        settings.fail_permissions_attempts,
    );
    let registry = Registry::<AdminPage>::new(Arc::new(backend));
    let env = StaticEnvironment::at(settings.initial_path.clone()).with_param("org", "acme");
    let guard = registry.mount(&env)?;
    let root = guard.root().clone();

    match command {
        Command::Run => {
            if let Err(err) = root.init().await {
                warn!(error = %err, "page failed to initialize");
            }
            print_report(&root.report(), args.json)?;
            if root.stores().users.invite("margaret").await {
                println!("invited margaret: {}", root.stores().users.summary.get());
            }
        }
        Command::RetryDemo => {
            let attempts = settings.fail_permissions_attempts + 1;
            let mut result = root.init().await;
            print_report(&root.report(), args.json)?;
            while result.is_err() && root.attempts() < attempts {
                info!(attempt = root.attempts() + 1, "retrying");
                result = root.retry().await;
                print_report(&root.report(), args.json)?;
            }
            result?;
            println!("roles: {:?}", root.stores().roles.roles.get());
        }
        Command::Navigate { path } => {
            root.init().await?;
            let selection = &root.stores().selection;
            if let Some(first) = root.stores().users.users.get().first() {
                selection.select(first);
            }
            println!("selected before: {:?}", selection.selected.get());

            let moved = registry.refresh_deps(guard.scope(), &StaticEnvironment::at(path))?;
            println!(
                "navigated: {moved}, now at {}, selected after: {:?}",
                root.deps().location().path,
                selection.selected.get()
            );
        }
    }

    drop(guard);
    info!(scopes = registry.len(), "demo finished");
    Ok(())
}

fn print_report(report: &StatusReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "scope {} is {:?} after {} attempt(s)",
        report.scope, report.status, report.attempts
    );
    for child in &report.children {
        let state = match child.state {
            ChildState::Pending => "pending".to_string(),
            ChildState::Succeeded => "ok".to_string(),
            ChildState::Failed(kind) => format!("failed ({kind:?})"),
        };
        match &child.message {
            Some(message) => println!("  {:<12} {state}: {message}", child.store),
            None => println!("  {:<12} {state}", child.store),
        }
    }
    if let Some(error) = &report.error {
        println!("  error: store `{}` {}", error.store, error.message);
    }
    Ok(())
}
