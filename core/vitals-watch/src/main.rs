//! vitals-watch: CLI companion for the Vitals HUD.
//!
//! ## Subcommands
//!
//! - `watch`: log changes to addon data files as they happen
//! - `repair`: fix malformed data files in place (original kept as `.backup`)
//! - `dashboard`: print the character overview on the refresh cadence
//! - `command`: run one command for a character through its agent
//! - `instruct`: run a free-text instruction naming its character ("... for <Name>")

mod command_cmd;
mod dashboard_cmd;
mod logging;
mod repair_cmd;
mod watch;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use vitals_core::config::{load_config, resolve_config_path};
use vitals_core::{StoragePaths, VitalsConfig};

#[derive(Parser)]
#[command(name = "vitals-watch")]
#[command(about = "Vitals HUD companion: watch, repair, dashboard, and commands")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.vitals-hud/config.toml, or $VITALS_HUD_CONFIG)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch data directories and log every change
    Watch {
        /// Directory to monitor (defaults to the discovered data roots)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Character names to track
        #[arg(short, long = "characters", num_args = 1..)]
        characters: Vec<String>,
    },

    /// Check data files and repair malformed JSON
    Repair {
        /// File to check (defaults to every *.json in the data roots)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Show the character overview
    Dashboard {
        /// Character names (defaults to the configured characters)
        #[arg(short, long = "characters", num_args = 1..)]
        characters: Vec<String>,

        /// Print a single frame and exit
        #[arg(long)]
        once: bool,
    },

    /// Run a command for a character
    Command {
        #[arg(value_name = "CHARACTER")]
        character: String,

        #[arg(value_name = "TEXT", required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Run an instruction that names its character, e.g. "check vitals for Wondolio"
    Instruct {
        #[arg(value_name = "TEXT", required = true, num_args = 1..)]
        text: Vec<String>,
    },
}

/// Resolved configuration shared by every subcommand.
pub struct AppContext {
    pub config: VitalsConfig,
    pub storage: StoragePaths,
}

impl AppContext {
    fn load(explicit_config: Option<PathBuf>) -> Result<Self, String> {
        let storage = StoragePaths::from_home().map_err(String::from)?;
        let config_path = resolve_config_path(explicit_config, &storage);
        let config = load_config(&config_path).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "Using default configuration");
            VitalsConfig::default()
        });
        let storage = config.apply_to(storage);
        Ok(Self { config, storage })
    }

    fn tracked_or(&self, characters: Vec<String>) -> Vec<String> {
        if characters.is_empty() {
            self.config.tracked_characters()
        } else {
            characters
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let log_dir = StoragePaths::from_home().ok().map(|s| s.log_dir());
    let _logging_guard = logging::init(log_dir.as_deref());

    let ctx = match AppContext::load(cli.config) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!(error = %e, "vitals-watch startup failed");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Watch { path, characters } => {
            let dirs = match path {
                Some(path) if path.is_dir() => vec![path],
                _ => ctx.storage.existing_data_roots(),
            };
            watch::run(&dirs, ctx.tracked_or(characters))
        }
        Commands::Repair { file } => {
            let files = match file {
                Some(file) => vec![file],
                None => repair_cmd::discover_files(ctx.storage.data_roots()),
            };
            match repair_cmd::run(&files) {
                0 => Ok(()),
                n => Err(format!("{} file(s) still invalid", n)),
            }
        }
        Commands::Dashboard { characters, once } => dashboard_cmd::run(&ctx, characters, once),
        Commands::Command { character, text } => command_cmd::run_command(&ctx, &character, &text),
        Commands::Instruct { text } => command_cmd::run_instruction(&ctx, &text),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "vitals-watch failed");
        std::process::exit(1);
    }
}
