use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

use cli::run::RunOptions;
use cli::terminal::SessionEnd;

#[derive(Parser)]
#[command(name = "ptydeck")]
#[command(about = "Run coding-agent CLIs in pseudo-terminals and track what they are doing")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.ptydeck/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default ~/.ptydeck/config.toml
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },

    /// Tokenize a command line and print the tokens as JSON
    Parse {
        input: String,

        /// Use Windows quoting rules
        #[arg(long)]
        windows: bool,

        /// Treat the input as a command whose first token is an executable path
        #[arg(long)]
        argv0: bool,
    },

    /// Show the effective command configuration of a provider
    Resolve { provider: String },

    /// List recorded terminal sessions
    Sessions {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Start an agent CLI in a PTY and attach to it
    Run {
        /// Provider id (claude, codex, gemini, ...)
        provider: String,

        /// Task id the terminal belongs to
        #[arg(long)]
        task: String,

        /// Open a chat terminal instead of the task's main terminal
        #[arg(long)]
        chat: bool,

        /// Working directory (defaults to the current directory)
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Resume the previous conversation
        #[arg(long)]
        resume: bool,

        /// Skip the agent's permission prompts
        #[arg(long)]
        auto_approve: bool,

        /// Initial prompt for the agent
        #[arg(long)]
        prompt: Option<String>,

        /// Start through the login shell instead of directly
        #[arg(long)]
        shell: bool,

        /// Open a shell in place of the agent once it exits
        #[arg(long)]
        keep_open: bool,

        #[arg(long, default_value_t = 0)]
        cols: u16,

        #[arg(long, default_value_t = 0)]
        rows: u16,
    },

    /// Open a terminal on a remote host through the system ssh client
    Ssh {
        /// Host or alias from your ssh config
        target: String,

        /// Task id the terminal belongs to (random by default)
        #[arg(long)]
        task: Option<String>,

        /// Command the remote shell runs first
        #[arg(long)]
        init: Option<String>,

        /// Extra arguments passed to ssh
        #[arg(last = true)]
        ssh_args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let end = match cli.command {
        Commands::Init { force } => {
            cli::init::init_command(cli.config, force)?;
            None
        }
        Commands::Parse {
            input,
            windows,
            argv0,
        } => {
            cli::parse::parse_command(&input, windows, argv0)?;
            None
        }
        Commands::Resolve { provider } => {
            let config = cli::load_config(cli.config.as_deref())?;
            cli::resolve::resolve_command(config, &provider)?;
            None
        }
        Commands::Sessions { json } => {
            let config = cli::load_config(cli.config.as_deref())?;
            cli::sessions::sessions_command(&config, json)?;
            None
        }
        Commands::Run {
            provider,
            task,
            chat,
            cwd,
            resume,
            auto_approve,
            prompt,
            shell,
            keep_open,
            cols,
            rows,
        } => {
            let config = cli::load_config(cli.config.as_deref())?;
            let opts = RunOptions {
                provider,
                task,
                chat,
                cwd,
                resume,
                auto_approve,
                prompt,
                shell,
                keep_open,
                cols,
                rows,
            };
            Some(cli::run::run_command(&config, opts).await?)
        }
        Commands::Ssh {
            target,
            task,
            init,
            ssh_args,
        } => {
            let config = cli::load_config(cli.config.as_deref())?;
            Some(cli::ssh::ssh_command(&config, target, task, init, ssh_args).await?)
        }
    };

    // Stdin is read on a blocking thread that cannot be cancelled, so an
    // attached session exits the process instead of returning.
    match end {
        Some(SessionEnd::Exited(code)) => std::process::exit(code.map_or(1, |c| c as i32)),
        Some(SessionEnd::Interrupted) => std::process::exit(130),
        None => Ok(()),
    }
}
