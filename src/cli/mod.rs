//! Command-line interface parsing and handling
//!
//! This module parses command-line arguments and dispatches to the chat
//! runner, the settings handlers, and the notes folder commands.

pub mod chat;
pub mod docs;


use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::chat::run_chat;
use crate::cli::docs::run_docs;
use crate::core::config::Config;
use crate::utils::logging::init_tracing;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("VERGEN_GIT_SHA"),
    "\nbuilt: ",
    env!("VERGEN_BUILD_TIMESTAMP"),
    "\nrustc: ",
    env!("VERGEN_RUSTC_SEMVER"),
);

#[derive(Parser)]
#[command(name = "quillpad")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "Markdown notes with a streaming chat client for local language models")]
#[command(
    long_about = "Quillpad keeps markdown notes in a folder and chats about them with a \
locally hosted language-model server (any server speaking the Ollama /api/generate protocol). \
Replies stream in as they are generated.\n\n\
Configuration:\n\
  quillpad set endpoint-url http://localhost:11434\n\
  quillpad set model llama3\n\
  quillpad set folder ~/notes\n\n\
Diagnostics:\n\
  RUST_LOG=debug    Print pipeline diagnostics to stderr"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Notes folder to use (remembered for later runs)
    #[arg(short = 'f', long, global = true, value_name = "DIR")]
    pub folder: Option<PathBuf>,

    /// Append each chat turn to the given transcript file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Chat with the model; reads messages from stdin when none is given
    Chat {
        /// Message to send
        #[arg(trailing_var_arg = true)]
        message: Vec<String>,
        /// Note (relative to the notes folder) to include as context
        #[arg(short = 'd', long, value_name = "NOTE")]
        doc: Option<String>,
        /// Print the final reply as HTML instead of streaming plain text
        #[arg(long)]
        html: bool,
    },
    /// Set a configuration value
    Set {
        /// Configuration key: endpoint-url, model, or folder
        key: String,
        /// Value for the key
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Reset a configuration value to its default
    Unset {
        /// Configuration key: endpoint-url, model, or folder
        key: String,
    },
    /// Show the current configuration
    Config,
    /// Work with notes in the notes folder
    Docs {
        #[command(subcommand)]
        command: DocsCommands,
    },
}

#[derive(Subcommand)]
pub enum DocsCommands {
    /// List notes as a tree
    List,
    /// Print a note
    Show { path: String },
    /// Print a note rendered as HTML
    Render { path: String },
    /// Create an empty note (".md" is appended when missing)
    New { name: String },
    /// Rename a note (".md" is appended when missing)
    Rename { old: String, new: String },
    /// Replace a note's contents with stdin
    Write { path: String },
}

/// Resolve the notes folder from the flag or the stored config, persisting a
/// newly given folder.
pub(crate) fn resolve_folder(
    config: &mut Config,
    folder: Option<PathBuf>,
) -> Result<PathBuf, Box<dyn Error>> {
    match folder {
        Some(folder) => {
            if !folder.is_dir() {
                return Err(format!("Not a directory: {}", folder.display()).into());
            }
            if config.last_folder.as_ref() != Some(&folder) {
                config.last_folder = Some(folder.clone());
                config.save()?;
            }
            Ok(folder)
        }
        None => config.last_folder.clone().ok_or_else(|| {
            "No notes folder selected. Pass --folder <DIR> or run 'quillpad set folder <DIR>'."
                .into()
        }),
    }
}

pub(crate) fn apply_set(config: &mut Config, key: &str, value: &str) -> Result<String, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("A value is required for '{key}'"));
    }
    match key {
        "endpoint-url" => {
            config.endpoint_url = Some(value.to_string());
            Ok(format!("Set endpoint-url to: {value}"))
        }
        "model" => {
            config.model_name = Some(value.to_string());
            Ok(format!("Set model to: {value}"))
        }
        "folder" => {
            config.last_folder = Some(PathBuf::from(value));
            Ok(format!("Set folder to: {value}"))
        }
        _ => Err(format!("Unknown config key: {key}")),
    }
}

pub(crate) fn apply_unset(config: &mut Config, key: &str) -> Result<String, String> {
    match key {
        "endpoint-url" => config.endpoint_url = None,
        "model" => config.model_name = None,
        "folder" => config.last_folder = None,
        _ => return Err(format!("Unknown config key: {key}")),
    }
    Ok(format!("Unset {key}"))
}

pub fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    match args.command {
        None => {
            run_chat(Vec::new(), None, false, args.folder, args.log).await
        }
        Some(Commands::Chat { message, doc, html }) => {
            run_chat(message, doc, html, args.folder, args.log).await
        }
        Some(Commands::Set { key, value }) => {
            let mut config = Config::load()?;
            match apply_set(&mut config, &key, &value.join(" ")) {
                Ok(summary) => {
                    config.save()?;
                    println!("✅ {summary}");
                    Ok(())
                }
                Err(message) => {
                    eprintln!("❌ {message}");
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Unset { key }) => {
            let mut config = Config::load()?;
            match apply_unset(&mut config, &key) {
                Ok(summary) => {
                    config.save()?;
                    println!("✅ {summary}");
                    Ok(())
                }
                Err(message) => {
                    eprintln!("❌ {message}");
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Config) => {
            Config::load()?.print_all();
            Ok(())
        }
        Some(Commands::Docs { command }) => run_docs(command, args.folder),
    }
}
