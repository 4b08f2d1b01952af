//! bainian - batch New Year greetings for a desktop chat client
//!
//! Harvests the contact directory into a CSV contact table, then sends a
//! templated greeting to every recipient of that table and logs the result.
//!
//! CHANGELOG:
//! - 10/12/2026 - history, members and note-to-self commands
//! - 10/05/2026 - Initial CLI

use anyhow::Result;
use bainian_core::dispatch::DispatchRequest;
use bainian_core::harvest::HarvestRequest;
use bainian_core::{Config, TaskRunner};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod output;

/// Harvest chat contacts and send templated New Year greetings.
#[derive(Parser, Debug)]
#[command(name = "bainian")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Compact JSON output (no whitespace)
    #[arg(long, global = true)]
    compact: bool,

    /// Config file (default: $BAINIAN_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Scripted client fixture to run against
    #[arg(long, global = true)]
    surface: Option<PathBuf>,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    // =========================================================================
    // CHAT CLIENT COMMANDS
    // =========================================================================
    /// Check that the chat window can be found
    Check,

    /// Harvest contacts into a contact table
    Harvest {
        /// Only contacts with this tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Output file; one [strftime] token is replaced with the local time
        #[arg(short, long)]
        output: Option<String>,

        /// Maximum number of contacts
        #[arg(short, long)]
        quota: Option<usize>,
    },

    /// Send the greeting to every recipient of a contact table
    Dispatch {
        /// Contact table (CSV)
        table: PathBuf,

        /// Message template ({称谓} and {敬语} are substituted)
        #[arg(short, long)]
        message: Option<String>,

        /// Read the message template from a file
        #[arg(long, conflicts_with = "message")]
        message_file: Option<PathBuf>,

        /// Go through every step but paste an empty message
        #[arg(long)]
        dry_run: bool,
    },

    /// Send messages to your own file transfer conversation
    NoteToSelf {
        /// One message per argument
        #[arg(required = true)]
        messages: Vec<String>,
    },

    /// Read and classify the chat history of a conversation
    History {
        /// Conversation to open first (default: the focused one)
        #[arg(long)]
        chat: Option<String>,

        /// Pages to scroll back before reading
        #[arg(short, long, default_value_t = 1)]
        pages: u32,
    },

    /// List the members of a group chat
    Members {
        /// Group to open first (default: the focused one)
        #[arg(long)]
        chat: Option<String>,
    },

    // =========================================================================
    // FILE COMMANDS
    // =========================================================================
    /// Check a contact table and summarize its recipients
    Validate {
        /// Contact table (CSV)
        table: PathBuf,
    },

    /// Preview the rendered greeting
    Render {
        #[arg(short, long)]
        message: Option<String>,

        #[arg(long, conflicts_with = "message")]
        message_file: Option<PathBuf>,

        /// Title to substitute (default from config)
        #[arg(long)]
        title: Option<String>,

        /// Honorific to substitute (default from config)
        #[arg(long)]
        honorific: Option<String>,

        /// Render once per recipient of this table instead
        #[arg(long, conflicts_with_all = ["title", "honorific"])]
        table: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let output_controls = output::OutputControls {
        json: cli.json,
        compact: cli.compact,
    };
    let config = Config::resolve(cli.config.as_deref())?;

    let command = match cli.command {
        // File commands
        Command::Validate { table } => {
            return commands::offline::validate(&table, &config, &output_controls);
        }
        Command::Render {
            message,
            message_file,
            title,
            honorific,
            table,
        } => {
            let template = commands::message_template(message, message_file.as_deref(), &config)?;
            return commands::offline::render(
                &template,
                title.as_deref(),
                honorific.as_deref(),
                table.as_deref(),
                &config,
                &output_controls,
            );
        }

        // Chat client commands
        Command::Check => bainian_core::Command::Check,
        Command::Harvest { tag, output, quota } => {
            bainian_core::Command::Harvest(HarvestRequest {
                tag,
                output: output.unwrap_or_else(|| config.harvest.output_template.clone()),
                quota: quota.unwrap_or(config.harvest.quota),
            })
        }
        Command::Dispatch {
            table,
            message,
            message_file,
            dry_run,
        } => bainian_core::Command::Dispatch(DispatchRequest {
            template: commands::message_template(message, message_file.as_deref(), &config)?,
            table,
            dry_run,
        }),
        Command::NoteToSelf { messages } => bainian_core::Command::NoteToSelf { messages },
        Command::History { chat, pages } => bainian_core::Command::History { chat, pages },
        Command::Members { chat } => bainian_core::Command::Members { chat },
    };

    let surface = commands::session::load_surface(cli.surface.as_deref())?;
    let runner = TaskRunner::new(surface, config);
    commands::session::run(&runner, command, &output_controls)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json = cli.json;

    match run(cli) {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            if json {
                println!("{}", output::format_error(&format!("{:#}", e)));
            } else {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::from(1)
        }
    }
}
