//! ---
//! culvert_section: "02-control-client"
//! culvert_subsection: "binary"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Operator CLI for interacting with a culvertd endpoint."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use culvert_client::{ConfigSession, ControlClient, SaveError};
use tokio::runtime::Runtime;

/// Top-level configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the agent configuration as pretty JSON.
    Show,
    /// Push a local JSON document to the agent after checking it decodes.
    Apply(ApplyOptions),
}

/// Options for the apply command.
#[derive(Debug, Args)]
pub struct ApplyOptions {
    /// Path of the JSON document to push.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

/// Execute the supplied configuration command.
pub fn run(base_url: &str, command: ConfigCommand) -> Result<()> {
    let runtime = Runtime::new()?;
    runtime.block_on(async move {
        let client = Arc::new(ControlClient::new(base_url)?);
        let session = ConfigSession::new(client);
        session
            .load()
            .await
            .context("failed to fetch the configuration")?;

        match command {
            ConfigCommand::Show => {
                println!("{}", session.canonical_text());
                Ok(())
            }
            ConfigCommand::Apply(options) => {
                let text = std::fs::read_to_string(&options.file)
                    .with_context(|| format!("unable to read {}", options.file.display()))?;
                session.set_buffer(text);
                match session.save().await {
                    Ok(()) => {
                        if let Some(notice) = session.notice() {
                            println!("{notice}");
                        }
                        Ok(())
                    }
                    Err(SaveError::Invalid(err)) => {
                        bail!("{} is not valid JSON: {err}", options.file.display())
                    }
                    Err(SaveError::Control(err)) => {
                        Err(err).context("the agent rejected the document")
                    }
                }
            }
        }
    })
}
