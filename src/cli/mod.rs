//! Command-line interface parsing and handling
//!
//! Parses arguments and dispatches into the ask/chat drivers.

pub mod ask;
pub mod model_list;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cli::ask::{run_ask, run_chat};
use crate::cli::model_list::list_models;

#[derive(Parser)]
#[command(name = "fanfuse")]
#[command(about = "Ask several AI models at once and fuse the answers")]
#[command(
    long_about = "Fanfuse sends one prompt to up to three AI models concurrently, prints each \
answer as it arrives, and can synthesize the answers into a single fused response.\n\n\
Environment Variables:\n\
  FANFUSE_API_KEY   API key for the inference endpoint (required)\n\
  FANFUSE_BASE_URL  Custom API base URL (optional, defaults to https://api.openai.com/v1)\n\n\
After all models answer, pick 2 or 3 responses to fuse, or skip to keep them side by side."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the available models
    Models,
    /// Send one prompt, print every model's answer, then offer fusion
    Ask {
        /// The prompt to send
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
        /// Model to query (repeatable, up to 3); defaults from config
        #[arg(short = 'm', long = "model")]
        models: Vec<String>,
        /// Session to append the transcript to
        #[arg(short = 's', long, default_value = "default")]
        session: String,
        /// Skip the fusion step
        #[arg(long)]
        no_fuse: bool,
        /// Attach a text file (repeatable); only forwarded to models that
        /// support attachments
        #[arg(short = 'a', long = "attach")]
        attachments: Vec<PathBuf>,
    },
    /// Interactive chat loop (default)
    Chat {
        /// Model to query (repeatable, up to 3); defaults from config
        #[arg(short = 'm', long = "model")]
        models: Vec<String>,
        /// Session to append the transcript to
        #[arg(short = 's', long, default_value = "default")]
        session: String,
        /// Skip the fusion step after each turn
        #[arg(long)]
        no_fuse: bool,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    match args.command.unwrap_or(Commands::Chat {
        models: Vec::new(),
        session: "default".to_string(),
        no_fuse: false,
    }) {
        Commands::Models => list_models(),
        Commands::Ask {
            prompt,
            models,
            session,
            no_fuse,
            attachments,
        } => run_ask(prompt, models, session, no_fuse, attachments).await,
        Commands::Chat {
            models,
            session,
            no_fuse,
        } => run_chat(models, session, no_fuse).await,
    }
}
