// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::io;
use std::path::PathBuf;
use sysman::packages::{self, PackageCommands};
use sysman::paths::Paths;
use sysman::pipeline::config as pipeline_config;
use sysman::rollback::RollbackCommands;
use sysman::services::{self, ServiceCommands};
use sysman::update::RollbackPreview;
use sysman::{editor, prompt, update};
use tracing::info;

#[derive(Parser)]
#[command(name = "sysman")]
#[command(author, version, about = "Pipeline-driven system updates with log-based rollback", long_about = None)]
struct Cli {
    /// Configuration directory (default: ~/.config/sysman)
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run, roll back or configure system updates
    Update {
        #[command(subcommand)]
        command: UpdateCommands,
    },
    /// Keep the declared package list and the system in sync
    Package {
        #[command(subcommand)]
        command: PackageCommand,
    },
    /// Keep systemd services in line with the declared service list
    Service {
        #[command(subcommand)]
        command: ServiceCommand,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum UpdateCommands {
    /// Write a stub update pipeline
    Generate,
    /// Open the update pipeline in $EDITOR
    Edit,
    /// Mark a checkpoint and run the update pipeline
    Run,
    /// Undo every package change since the last checkpoint
    Rollback {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Show what a rollback would do without running it
    Plan,
}

#[derive(Subcommand)]
enum ServiceCommand {
    /// Write a stub service list
    Generate,
    /// Enable declared services and retire dropped ones
    Sync,
    /// Open the service list in $EDITOR
    Edit,
    /// Reinstall and re-enable one service
    Reinstall {
        /// Service name as written in the service list
        name: String,
    },
}

#[derive(Subcommand)]
enum PackageCommand {
    /// Reconcile the package list with installed packages
    Sync,
    /// Open the package list in $EDITOR
    Edit,
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("sysman v{}", env!("CARGO_PKG_VERSION"));
        println!("Run 'sysman --help' for usage information");
        return Ok(());
    };

    if let Commands::Completions { shell } = command {
        clap_complete::generate(shell, &mut Cli::command(), "sysman", &mut io::stdout());
        return Ok(());
    }

    let mut paths = Paths::discover()?;
    if let Some(dir) = cli.config_dir {
        paths = paths.with_config_dir(dir);
    }

    match command {
        Commands::Update { command } => run_update(&paths, command),
        Commands::Package { command } => run_package(&paths, command),
        Commands::Service { command } => run_service(&paths, command),
        Commands::Completions { .. } => Ok(()),
    }
}

fn run_update(paths: &Paths, command: UpdateCommands) -> Result<()> {
    match command {
        UpdateCommands::Generate => {
            let path = pipeline_config::generate(&paths.pipeline_file)?;
            println!("Stub pipeline written to {}", path.display());
            println!("Edit it with 'sysman update edit'");
        }
        UpdateCommands::Edit => {
            editor::open_existing(
                &paths.pipeline_file,
                "No update pipeline defined. Generate one with 'sysman update generate'",
            )?;
        }
        UpdateCommands::Run => {
            let checkpoint = update::run(paths)?;
            println!("Update complete. Roll back with 'sysman update rollback' (checkpoint {})", checkpoint);
        }
        UpdateCommands::Plan => {
            let preview = update::plan_rollback(paths)?;
            println!("Changes since {}:", preview.checkpoint);
            if preview.resolved.is_empty() {
                report_nothing_to_roll_back(&preview);
            } else {
                print!("{}", preview.resolved);
                report_unresolved(&preview);
            }
        }
        UpdateCommands::Rollback { yes } => {
            let preview = update::plan_rollback(paths)?;
            if preview.resolved.is_empty() {
                report_nothing_to_roll_back(&preview);
                return Ok(());
            }

            println!("Rolling back to {}:", preview.checkpoint);
            print!("{}", preview.resolved);
            report_unresolved(&preview);

            if !yes && !prompt::confirm("Are you sure?")? {
                info!("Rollback cancelled");
                println!("Rollback cancelled.");
                return Ok(());
            }

            let checkpoint = update::execute_rollback(paths, preview, &RollbackCommands::default())?;
            println!("Rollback complete. New checkpoint {}", checkpoint);
        }
    }
    Ok(())
}

fn report_nothing_to_roll_back(preview: &RollbackPreview) {
    if preview.plan.is_empty() {
        println!("No package changes since {}. Nothing to roll back.", preview.checkpoint);
    } else {
        println!(
            "Nothing to roll back: none of the {} changed package(s) since {} has a cached package to restore.",
            preview.unresolved(),
            preview.checkpoint
        );
    }
}

fn report_unresolved(preview: &RollbackPreview) {
    let unresolved = preview.unresolved();
    if unresolved > 0 {
        println!("{} package(s) have no cached package and will be left as they are.", unresolved);
    }
}

fn run_package(paths: &Paths, command: PackageCommand) -> Result<()> {
    match command {
        PackageCommand::Sync => {
            let mut terminal = packages::sync::Terminal;
            let plan = packages::sync::sync(&paths.package_list, &PackageCommands::default(), &mut terminal)?;
            if plan.is_empty() {
                println!("Package list and system are in sync.");
            }
        }
        PackageCommand::Edit => {
            editor::open_existing(
                &paths.package_list,
                "No package list yet. Create one with 'sysman package sync'",
            )?;
        }
    }
    Ok(())
}

fn run_service(paths: &Paths, command: ServiceCommand) -> Result<()> {
    let commands = ServiceCommands::default();
    match command {
        ServiceCommand::Generate => {
            let path = services::generate(&paths.service_list)?;
            println!("Stub service list written to {}", path.display());
        }
        ServiceCommand::Sync => {
            let plan = services::sync::sync(&paths.service_list, &paths.service_list_synced, &commands)?;
            if plan.is_empty() {
                println!("Services are in sync.");
            } else {
                print!("{}", plan);
            }
        }
        ServiceCommand::Edit => {
            editor::open_existing(
                &paths.service_list,
                "No service list defined. Generate one with 'sysman service generate'",
            )?;
        }
        ServiceCommand::Reinstall { name } => {
            let plan = services::sync::reinstall(&name, &paths.service_list, &paths.service_list_synced, &commands)?;
            print!("{}", plan);
        }
    }
    Ok(())
}
