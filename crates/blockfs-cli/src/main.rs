//! # blockfs CLI
//!
//! Drive an in-memory blockfs engine from a script or an interactive shell.

use std::fs::File;
use std::io::{self, BufReader, IsTerminal, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use blockfs_config::{init_logging, log_cli_info, Config, LogLevel};
use blockfs_core::Engine;
use clap::{Parser, Subcommand};

mod script;

use script::Session;

/// blockfs - in-memory block-structured file storage
#[derive(Parser)]
#[command(name = "blockfs")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the global/project lookup
    #[arg(long, env = "BLOCKFS_CONFIG")]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read commands from stdin, one per line
    Shell,

    /// Execute a script file against a fresh engine
    Run {
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print the built-in defaults as TOML
    Default,
    /// Print the global config file location
    Path,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let mut config = Config::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config
        }
        None => {
            blockfs_config::reload().context("Failed to load config")?;
            blockfs_config::config().clone()
        }
    };
    config.engine.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_logging(cli.log_level.unwrap_or(config.log.level));

    match cli.command {
        Commands::Shell => {
            let stdin = io::stdin();
            let prompt = stdin.is_terminal();
            let mut session = Session::new(Engine::with_config(config.engine)?, io::stdout());
            session.run_interactive(stdin.lock(), prompt)?;
            finish(session)
        }
        Commands::Run { script } => {
            let file = File::open(&script)
                .with_context(|| format!("Failed to open script {}", script.display()))?;
            let mut session = Session::new(Engine::with_config(config.engine)?, io::stdout());
            session.run_script(BufReader::new(file))?;
            finish(session)
        }
        Commands::Config { command } => {
            match command {
                ConfigCommands::Show => print!("{}", config.to_toml()),
                ConfigCommands::Default => print!("{}", Config::default_toml()),
                ConfigCommands::Path => match Config::global_config_path() {
                    Some(path) => println!("{}", path.display()),
                    None => println!("(no home directory)"),
                },
            }
            Ok(())
        }
    }
}

fn finish<W: Write>(session: Session<W>) -> Result<()> {
    let stats = session.engine().stats();
    log_cli_info!(
        "Session finished",
        files = stats.live_files,
        blocks = stats.blocks,
        open_descriptors = stats.open_descriptors,
    );
    session.into_inner().flush()?;
    Ok(())
}
