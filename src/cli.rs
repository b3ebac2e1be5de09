use crate::command;
use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, long_about = None)]
#[command(name = "agentbox")]
#[command(about = "Provision and track disposable Lima VMs as coding-agent sandboxes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision a new sandbox VM
    Create {
        /// Session name (a random name is chosen when omitted)
        #[arg(short, long)]
        name: Option<String>,

        /// Seconds until the session expires (0 for no expiry)
        #[arg(short, long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Skip the configured setup scripts
        #[arg(long)]
        skip_setup: bool,
    },

    /// List sessions
    #[command(visible_alias = "ls")]
    List {
        /// Include failed and stopped sessions
        #[arg(short, long)]
        all: bool,
    },

    /// Show details for one session
    Status {
        /// Session id
        id: String,
    },

    /// Delete a session's VM and its record
    #[command(visible_alias = "rm")]
    Destroy {
        /// Session id
        id: String,

        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Destroy expired sessions and drop failed or stopped ones
    Prune {
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Create {
            name,
            timeout,
            skip_setup,
        } => command::create::run(name.as_deref(), timeout, skip_setup),
        Commands::List { all } => command::list::run(all),
        Commands::Status { id } => command::status::run(&id),
        Commands::Destroy { id, yes } => command::destroy::run(&id, yes),
        Commands::Prune { yes } => command::prune::run(yes),
    }
}
