use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing::{error, info};

use procpulse::app::App;
use procpulse::cli::{Cli, Commands, MonitorArgs};
use procpulse::core::probes::list_processes;
use procpulse::core::resolver::{filter_by_name, resolve};
use procpulse::utils::{logging, AppConfig, MonitorSettings};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    let level = cli.log_level.as_deref().or(config.log_level.as_deref());
    let file = cli.log_file.as_deref().or(config.log_file.as_deref());
    let log_path = logging::init_log(level, file);

    match cli.command {
        Commands::Monitor(args) => {
            handle_monitor(args, &config).await?;
            if let Some(path) = log_path {
                println!("Log written to {}", path.display());
            }
        }
        Commands::Ps { filters } => {
            handle_ps(&filters);
        }
    }

    Ok(())
}

async fn handle_monitor(args: MonitorArgs, config: &AppConfig) -> Result<()> {
    let settings = MonitorSettings::from_sources(&args, config).context("Invalid monitor settings")?;

    let target = match resolve(&args.target, &args.filters, list_processes()) {
        Ok(target) => target,
        Err(e) => {
            error!("failed to resolve '{}': {}", args.target, e);
            return Err(e.into());
        }
    };
    info!(pid = target.pid, name = %target.name, "monitoring");

    let mut app = App::new(target, settings);
    app.run().await
}

fn handle_ps(filters: &[String]) {
    let filters: Vec<&str> = filters.iter().map(String::as_str).collect();
    let matches = filter_by_name(&filters, list_processes());

    println!("{}", format!("{:<8} {}", "PID", "NAME").bold());
    println!("{}", "-".repeat(40));
    for process in &matches {
        println!("{:<8} {}", process.pid, process.name);
    }
    println!("\n{} process(es)", matches.len());
}
