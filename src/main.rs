//! tcpline - An interactive line-oriented TCP client.
//!
//! Connects to a server, then sends each line typed on stdin and prints the
//! server's reply, until the exit command is typed or input ends.

mod client;
mod config;
mod error;
mod protocol;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use client::{Connection, Outcome, Session};
use config::{Config, Overrides};
use protocol::Framing;
use std::path::{Path, PathBuf};
use std::process::Command as ProcessCommand;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tcpline")]
#[command(author, version, about = "An interactive line-oriented TCP client")]
#[command(long_about = "Connects to HOST:PORT, sends each line typed on stdin and prints the server's reply.\n\nType the exit command (default: quit) or close input to stop.")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Server host (default from config: tcp-server)
    #[arg(value_name = "HOST")]
    host: Option<String>,

    /// Server port (default from config: 12345)
    #[arg(value_name = "PORT")]
    port: Option<u16>,

    /// Use an alternate config file
    #[arg(short = 'c', long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Fail immediately if the connection is refused
    #[arg(long)]
    no_retry: bool,

    /// Delay between refused connection attempts
    #[arg(long, value_name = "MS")]
    retry_interval_ms: Option<u64>,

    /// Give up after this many refused attempts
    #[arg(long, value_name = "N")]
    max_attempts: Option<u32>,

    /// Bound on each connection attempt
    #[arg(long, value_name = "MS")]
    connect_timeout_ms: Option<u64>,

    /// How requests and replies are delimited
    #[arg(short = 'F', long, value_enum)]
    framing: Option<Framing>,

    /// Largest single read in raw framing
    #[arg(short = 'b', long, value_name = "BYTES")]
    buffer_size: Option<usize>,

    /// Give up waiting for a reply after this long
    #[arg(short = 't', long, value_name = "MS")]
    reply_timeout_ms: Option<u64>,

    /// Input that ends the session without being sent
    #[arg(long, value_name = "TEXT")]
    exit_command: Option<String>,

    /// Send every line, including the exit command
    #[arg(long, conflicts_with = "exit_command")]
    no_exit_command: bool,

    /// Prompt shown before each input line on a terminal
    #[arg(short = 'p', long, value_name = "TEXT")]
    prompt: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            host: self.host.clone(),
            port: self.port,
            no_retry: self.no_retry,
            retry_interval_ms: self.retry_interval_ms,
            max_attempts: self.max_attempts,
            connect_timeout_ms: self.connect_timeout_ms,
            framing: self.framing,
            buffer_size: self.buffer_size,
            reply_timeout_ms: self.reply_timeout_ms,
            exit_command: self.exit_command.clone(),
            no_exit_command: self.no_exit_command,
            prompt: self.prompt.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Open configuration file in $EDITOR
    Config {
        /// Print the effective configuration instead of editing it
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };

    match cli.command {
        Some(Commands::Config { show }) => handle_config(&config_path, show),
        None => {
            let config = Config::load_from(&config_path)
                .context("Failed to load configuration")?;
            let config = cli.overrides().apply(config);
            config.validate().context("Invalid configuration")?;
            run_session(config).await
        }
    }
}

/// Initialize logging on stderr so replies on stdout stay clean.
fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => "tcpline=warn",
        1 => "tcpline=info",
        _ => "tcpline=debug",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();
    Ok(())
}

/// Connect and run the interactive loop.
async fn run_session(config: Config) -> Result<()> {
    let endpoint = config.endpoint();
    info!(
        "Connecting to {} (retry on refused: {}, framing: {})",
        endpoint, config.connect.retry_refused, config.wire.framing
    );

    let conn = Connection::open(&endpoint, &config.connect, config.wire.clone())
        .await
        .with_context(|| format!("Failed to connect to {}", endpoint))?;
    eprintln!("Connected to {}", endpoint);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut session = Session::new(stdin, tokio::io::stdout(), &config.session);
    if !atty::is(atty::Stream::Stdin) {
        session = session.without_prompt();
    }

    match session.run(conn).await {
        Ok(Outcome::Quit) => info!("Session ended by exit command"),
        Ok(Outcome::EndOfInput) => info!("Session ended at end of input"),
        Err(e) if e.is_disconnect() => {
            return Err(e).with_context(|| format!("Lost connection to {}", endpoint));
        }
        Err(e) => return Err(e).context("Session failed"),
    }
    Ok(())
}

/// Handle the config command.
fn handle_config(config_path: &Path, show: bool) -> Result<()> {
    if show {
        let config = Config::load_from(config_path)?;
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    // Create default config if it doesn't exist
    if !config_path.exists() {
        Config::default().save_to(config_path)?;
        println!("Created default config at {}", config_path.display());
    }

    // Open in editor
    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let status = ProcessCommand::new(&editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        eprintln!("Editor exited with non-zero status");
    }

    Ok(())
}
