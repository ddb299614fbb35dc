use anyhow::Result;
use clap::{Parser, Subcommand};

use dockhand::{init_telemetry, AppState, DockhandConfig, StaleVerdict};

#[derive(Parser)]
#[command(name = "dockhand")]
#[command(about = "Deployment control-plane agent for a git-checked-out application")]
#[command(
    long_about = "Dockhand manages the lifecycle state of a locally checked-out repository: \
                  inspect the current ref, fetch/checkout/pull, reconcile stale local branches \
                  against the remote, and coordinate restarts of the dependent application."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP control-plane server (default)
    Serve,
    /// Print repository state: current ref, branches, tags, recent log
    Info {
        /// Number of recent commits to show
        #[arg(long, default_value = "10", help = "How many commit summaries to print")]
        limit: usize,
    },
    /// Scan local branches whose upstream is gone and print their verdicts
    Scan,
    /// Write a dockhand.toml with the default configuration
    WriteConfig {
        /// Overwrite an existing dockhand.toml
        #[arg(long, help = "Overwrite dockhand.toml if it already exists")]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    DockhandConfig::load_env_file()?;
    let config = DockhandConfig::load()?;
    init_telemetry(
        &config.observability.log_level,
        config.observability.json_logs,
    )?;

    match Cli::parse().command {
        None | Some(Commands::Serve) => {
            let state = AppState::from_config(&config);
            dockhand::serve(&config, state).await
        }
        Some(Commands::Info { limit }) => print_info(&config, limit).await,
        Some(Commands::Scan) => print_scan(&config).await,
        Some(Commands::WriteConfig { force }) => write_config(&config, force),
    }
}

async fn print_info(config: &DockhandConfig, limit: usize) -> Result<()> {
    let state = AppState::from_config(config);
    let current = state.inspector.current_ref().await?;
    println!("On: {current}");

    println!("\nBranches:");
    for branch in state.inspector.list_branches().await? {
        let marker = if Some(branch.as_str()) == current.branch_name() {
            "*"
        } else {
            " "
        };
        println!("{marker} {branch}");
    }

    let tags = state.inspector.list_tags().await?;
    if !tags.is_empty() {
        println!("\nTags:");
        for tag in tags {
            println!("  {tag}");
        }
    }

    println!("\nRecent commits:");
    for line in state.inspector.recent_log(limit).await? {
        println!("  {line}");
    }
    Ok(())
}

async fn print_scan(config: &DockhandConfig) -> Result<()> {
    let state = AppState::from_config(config);
    let stale = state.scanner.scan().await?;
    if stale.is_empty() {
        println!("No stale branches: every local branch either has a live upstream or never tracked one.");
        return Ok(());
    }
    for entry in stale {
        let verdict = match entry.verdict {
            StaleVerdict::SafeToDelete => "safe to delete",
            StaleVerdict::HasLocalChanges => "has local changes",
            StaleVerdict::Active => "active",
        };
        let upstream = entry.branch.upstream.as_deref().unwrap_or("?");
        println!(
            "{:<30} upstream {upstream} gone, {} unpushed: {verdict}",
            entry.branch.name, entry.branch.ahead
        );
    }
    Ok(())
}

fn write_config(config: &DockhandConfig, force: bool) -> Result<()> {
    let path = std::path::Path::new("dockhand.toml");
    if path.exists() && !force {
        anyhow::bail!("dockhand.toml already exists (use --force to overwrite)");
    }
    config.save_to_file(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
