mod subcommands;


use crate::config::{Config, load_config};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hostbridge")]
#[command(about = "Mailbox RPC between sandboxed agents and a privileged host")]
pub struct Cli {
    /// Config file (default: ~/.hostbridge/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the host: watch every group's mailbox and dispatch requests until Ctrl-C
    Host,
    /// Run one agent invocation and print the JSON outcome
    Agent {
        #[arg(long)]
        group: String,
        #[arg(short, long, default_value = "default")]
        session: String,
        /// Run with main-group privileges
        #[arg(long)]
        main: bool,
        /// Chat this invocation answers; default target for send_message
        #[arg(long)]
        chat_jid: Option<String>,
        #[arg(short, long)]
        message: String,
    },
    /// Inspect resource mappings
    Mappings {
        #[command(subcommand)]
        cmd: MappingsCommands,
    },
}

#[derive(Subcommand)]
enum MappingsCommands {
    /// List every mapping in the registry
    List,
    /// Evaluate the authorization gate for a group and a resource
    Check {
        #[arg(long)]
        group: String,
        #[arg(long)]
        resource: String,
    },
}

fn load(cli_config: Option<&PathBuf>) -> Result<Config> {
    load_config(cli_config.map(PathBuf::as_path))
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load(cli.config.as_ref())?;

    match cli.command {
        Commands::Host => {
            subcommands::host(&config).await?;
        }
        Commands::Agent {
            group,
            session,
            main,
            chat_jid,
            message,
        } => {
            subcommands::agent(&config, &group, &session, main, chat_jid, &message).await?;
        }
        Commands::Mappings { cmd } => match cmd {
            MappingsCommands::List => subcommands::mappings_list(&config)?,
            MappingsCommands::Check { group, resource } => {
                subcommands::mappings_check(&config, &group, &resource)?;
            }
        },
    }

    Ok(())
}
