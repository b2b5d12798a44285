//! HookRelay CLI - manage clients and hooks of a running relay server.
//!
//! # Commands
//!
//! - `hookrelay client add <name>` - Create a client and print its secret
//! - `hookrelay client del <name>` - Delete a client and its hooks
//! - `hookrelay client list` - List clients
//! - `hookrelay client regen <name>` - Issue a new secret
//! - `hookrelay hook add <client> <identifier>` - Create a hook and print its URL
//! - `hookrelay hook del <url-or-uuid>` - Delete a hook
//! - `hookrelay version` - Show CLI and server versions

use clap::{Parser, Subcommand};
use colored::Colorize;
use hookrelay_cli::{AdminClient, CliResult, DEFAULT_URL, client_line};
use std::process::ExitCode;

/// HookRelay admin CLI
#[derive(Parser)]
#[command(name = "hookrelay")]
#[command(version)]
#[command(about = "Manage clients and hooks of a HookRelay server")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Admin API of the server
    #[arg(long, global = true, env = "HOOKRELAY_URL", default_value = DEFAULT_URL)]
    url: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage clients
    #[command(subcommand)]
    Client(ClientCommand),

    /// Manage hooks
    #[command(subcommand)]
    Hook(HookCommand),

    /// Show CLI and server versions
    Version,
}

#[derive(Subcommand)]
enum ClientCommand {
    /// Create a client and print its secret
    Add { name: String },
    /// Delete a client and all of its hooks
    #[command(alias = "rm")]
    Del { name: String },
    /// List clients
    #[command(alias = "ls")]
    List,
    /// Issue a new secret, invalidating the old one
    Regen { name: String },
}

#[derive(Subcommand)]
enum HookCommand {
    /// Create a hook and print its URL
    Add { client: String, identifier: String },
    /// Delete a hook by URL or uuid
    #[command(alias = "rm")]
    Del { reference: String },
}

async fn run(cli: Cli) -> CliResult<()> {
    let admin = AdminClient::new(&cli.url, hookrelay_cli::DEFAULT_TIMEOUT)?;

    match cli.command {
        Commands::Client(ClientCommand::Add { name }) => println!("{}", admin.add_client(&name).await?),
        Commands::Client(ClientCommand::Del { name }) => {
            println!("{}", admin.delete_client(&name).await?)
        }
        Commands::Client(ClientCommand::List) => {
            for client in admin.list_clients().await? {
                println!("{}", client_line(&client));
            }
        }
        Commands::Client(ClientCommand::Regen { name }) => {
            println!("{}", admin.regenerate_secret(&name).await?)
        }
        Commands::Hook(HookCommand::Add { client, identifier }) => {
            println!("{}", admin.add_hook(&client, &identifier).await?.url)
        }
        Commands::Hook(HookCommand::Del { reference }) => {
            println!("{}", admin.delete_hook(&reference).await?)
        }
        Commands::Version => {
            println!("hookrelay {}", env!("CARGO_PKG_VERSION"));
            println!("{}", admin.server_version().await?);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
