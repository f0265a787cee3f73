//! ---
//! culvert_section: "02-control-client"
//! culvert_subsection: "binary"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Operator CLI for interacting with a culvertd endpoint."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
use anyhow::Result;
use clap::{Parser, Subcommand};
use culvert_logging as logging;
use culvert_proto::ControlAction;

mod config;
mod service;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Culvert operator control utility",
    long_about = None
)]
struct Cli {
    #[arg(
        long,
        value_name = "URL",
        env = "CULVERT_URL",
        default_value = "http://127.0.0.1:8080",
        global = true,
        help = "Base URL of the culvertd control endpoint"
    )]
    base_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Show the supervised service status")]
    Status(service::StatusOptions),
    #[command(about = "Start the supervised service")]
    Start,
    #[command(about = "Stop the supervised service")]
    Stop,
    #[command(about = "Restart the supervised service")]
    Restart,
    #[command(about = "Print recent service logs, optionally following the live stream")]
    Logs(service::LogsOptions),
    #[command(subcommand, about = "Inspect and update the agent configuration")]
    Config(config::ConfigCommand),
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Status(options) => service::status(&cli.base_url, options)?,
        Commands::Start => service::control(&cli.base_url, ControlAction::Start)?,
        Commands::Stop => service::control(&cli.base_url, ControlAction::Stop)?,
        Commands::Restart => service::control(&cli.base_url, ControlAction::Restart)?,
        Commands::Logs(options) => service::logs(&cli.base_url, options)?,
        Commands::Config(command) => config::run(&cli.base_url, command)?,
    }
    Ok(())
}
