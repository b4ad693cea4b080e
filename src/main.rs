//! usbforge - multi-boot USB provisioner.
//!
//! Installs Ventoy on a removable drive, adds a Kali persistence partition
//! and a Windows To Go partition, and stages ISOs with boot-menu icons.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use usbforge::config::Config;

#[derive(Parser)]
#[command(name = "usbforge")]
#[command(about = "Multi-boot USB provisioner (Ventoy + Kali persistence + Windows To Go)")]
#[command(
    after_help = "QUICK START:\n  usbforge preflight             Check host tools and sources\n  usbforge drives                List removable drives\n  sudo usbforge provision        Set up a USB drive interactively\n  sudo usbforge provision --headless   Use the config file only"
)]
struct Cli {
    /// Configuration file (default: $USBFORGE_CONFIG, ./config/usbforge.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision a USB drive (ERASES the selected drive)
    Provision {
        /// Take every input from the config file, use the first drive and
        /// skip confirmation
        #[arg(long)]
        headless: bool,
    },

    /// List removable drives
    Drives,

    /// Compute the partition plan for a drive size without touching a device
    Plan {
        /// Total drive capacity in GB
        #[arg(long)]
        total_gb: f64,
        /// Persistence partition size (default: from config)
        #[arg(long)]
        persistence_gb: Option<u64>,
        /// Windows To Go partition size (default: computed)
        #[arg(long)]
        raw_image_gb: Option<u64>,
        /// Free space reserved for the Ventoy partition (default: from config)
        #[arg(long)]
        min_free_gb: Option<u64>,
    },

    /// Run preflight checks (host tools, privileges, sources)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
    /// Print the boot-menu descriptor generated for the given image names
    Descriptor {
        /// Image file names, e.g. ubuntu-24.04-desktop-amd64.iso
        images: Vec<String>,
    },
}

fn main() -> Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Provision { headless } => {
            commands::cmd_provision(&config, headless)?;
        }

        Commands::Drives => {
            commands::cmd_drives()?;
        }

        Commands::Plan {
            total_gb,
            persistence_gb,
            raw_image_gb,
            min_free_gb,
        } => {
            commands::cmd_plan(&config, total_gb, persistence_gb, raw_image_gb, min_free_gb)?;
        }

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&config, strict)?;
        }

        Commands::Show { what } => {
            let show_target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
                ShowTarget::Descriptor { images } => {
                    commands::show::ShowTarget::Descriptor { images }
                }
            };
            commands::cmd_show(show_target, &config)?;
        }
    }

    Ok(())
}
