//! toolgate CLI — the main entry point.
//!
//! Commands:
//! - `init`      — Write the default config and policy files
//! - `policy`    — Show, check, add and suggest policy rules
//! - `parse`     — Parse a saved model reply and show what would run
//! - `sanitize`  — Show how raw tool arguments are repaired and tokenized
//! - `replay`    — Drive a session from a transcript of model replies

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use toolgate_config::{AgentMode, AppConfig, LoggingConfig};
use toolgate_security::Action;

mod commands;
mod terminal;

#[derive(Parser)]
#[command(
    name = "toolgate",
    about = "toolgate — policy-gated tool calls for model agents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (defaults to ~/.toolgate/config.toml)
    #[arg(long, global = true, env = "TOOLGATE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config and policy files
    Init,

    /// Manage security policy rules
    Policy {
        #[command(subcommand)]
        action: PolicyCommand,
    },

    /// Parse a model reply from a file ("-" for stdin)
    Parse { file: PathBuf },

    /// Sanitize and tokenize raw tool arguments
    Sanitize {
        /// The raw `args` attribute text
        args: String,

        /// Tool the arguments are for
        #[arg(long, default_value = "@coder")]
        tool: String,
    },

    /// Replay a transcript of model replies through the orchestrator
    Replay {
        /// JSON transcript: {"task": "...", "replies": ["...", ...]}
        transcript: PathBuf,

        /// Override the agent mode
        #[arg(long)]
        mode: Option<AgentMode>,

        /// Override the turn budget
        #[arg(long)]
        max_turns: Option<u32>,

        /// Files appended to the system prompt as context blocks
        #[arg(long = "context", value_name = "FILE")]
        context: Vec<PathBuf>,
    },
}

#[derive(Subcommand)]
enum PolicyCommand {
    /// List the effective rules
    Show,

    /// Show the decision for a tool call
    Check { tool: String, args: String },

    /// Add or update a rule in the active policy file
    Add { pattern: String, action: Action },

    /// Show the pattern an escalation would save
    Suggest { tool: String, args: String },
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_env_overrides(|key| std::env::var(key).ok())?;
            config.validate()?;
            config
        }
        None => AppConfig::load()?,
    };
    Ok(config)
}

fn init_tracing(verbose: bool, json: bool, logging: &LoggingConfig) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json || logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    init_tracing(cli.verbose, cli.log_json, &config.logging);

    match cli.command {
        Commands::Init => commands::init::run(&config)?,
        Commands::Policy { action } => match action {
            PolicyCommand::Show => commands::policy::show(&config)?,
            PolicyCommand::Check { tool, args } => commands::policy::check(&config, &tool, &args)?,
            PolicyCommand::Add { pattern, action } => {
                commands::policy::add(&config, &pattern, action)?
            }
            PolicyCommand::Suggest { tool, args } => {
                commands::policy::suggest(&config, &tool, &args)?
            }
        },
        Commands::Parse { file } => commands::parse::run(&file)?,
        Commands::Sanitize { args, tool } => commands::sanitize::run(&config, &tool, &args),
        Commands::Replay {
            transcript,
            mode,
            max_turns,
            context,
        } => {
            let mut config = config;
            if let Some(mode) = mode {
                config.agent.mode = mode;
            }
            if let Some(max_turns) = max_turns {
                config.agent.max_turns = max_turns;
            }
            config.validate()?;
            commands::replay::run(&config, &transcript, &context).await?
        }
    }

    Ok(())
}
