//! # Bus Lens CLI
//!
//! Command-line interface for inspecting and operating an Azure Service Bus
//! namespace.
//!
//! This module provides CLI commands for:
//! - Managing saved connection profiles
//! - Listing queues, topics and subscriptions
//! - Sending messages and keeping a local send history
//! - Peeking, deleting and resending dead-lettered messages

use bus_lens_core::{
    DeadLetterSource, Destination, MessageProperty, PropertyType, ServiceBusError,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod commands;
pub mod config;
pub mod output;
pub mod store;

pub use config::{CliConfig, ConfigError, LogFormat, OutputFormat};
pub use store::{ConnectionProfile, HistoryEntry, LocalStore, StoreError};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// Bus Lens - inspect and operate Azure Service Bus namespaces
#[derive(Parser, Debug)]
#[command(name = "bus-lens")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect and operate Azure Service Bus namespaces")]
#[command(
    long_about = "Bus Lens lists queues, topics and subscriptions, sends messages and browses dead-lettered messages over the Service Bus REST API"
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BUS_LENS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level, overriding the configured one
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Output format, overriding the configured one
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<OutputFormat>,

    /// Saved connection to use (name or id) instead of the selected one
    #[arg(long, global = true)]
    pub connection: Option<String>,

    /// Connection string to use instead of a saved connection
    #[arg(
        long,
        env = "BUS_LENS_CONNECTION_STRING",
        hide_env_values = true,
        global = true
    )]
    pub connection_string: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage saved connections
    Connections {
        #[command(subcommand)]
        action: ConnectionCommands,
    },

    /// Check that the namespace accepts the credentials
    Test,

    /// List queues with their message counts
    Queues,

    /// List topics
    Topics,

    /// List the subscriptions of a topic
    Subscriptions {
        /// Topic name
        topic: String,

        /// Look up correlation filters from subscription rules
        #[arg(long)]
        with_filters: bool,
    },

    /// Send a message to a queue or topic
    Send(SendArgs),

    /// Dead-letter queue commands
    DeadLetters {
        #[command(subcommand)]
        action: DeadLetterCommands,
    },

    /// Sent-message history commands
    History {
        #[command(subcommand)]
        action: HistoryCommands,
    },

    /// Export connections and history as JSON
    Export {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import connections and history from an export file
    Import {
        /// Export file to read
        file: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Connection management subcommands
#[derive(Subcommand, Debug)]
pub enum ConnectionCommands {
    /// Save a connection string under a name
    Add {
        /// Display name
        name: String,

        /// `Endpoint=...;SharedAccessKeyName=...;SharedAccessKey=...`
        #[arg(value_name = "CONNECTION_STRING")]
        value: String,

        /// Make this the selected connection
        #[arg(short, long)]
        select: bool,
    },

    /// List saved connections
    List,

    /// Remove a saved connection
    Remove {
        /// Connection name or id
        #[arg(value_name = "CONNECTION")]
        profile: String,
    },

    /// Select the connection used by default
    Select {
        /// Connection name or id
        #[arg(value_name = "CONNECTION")]
        profile: String,
    },
}

/// Queue or topic to send to
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct DestinationArgs {
    /// Queue name
    #[arg(long)]
    pub queue: Option<String>,

    /// Topic name
    #[arg(long)]
    pub topic: Option<String>,
}

impl DestinationArgs {
    pub fn destination(&self) -> Result<Destination, CliError> {
        match (&self.queue, &self.topic) {
            (Some(queue), None) => Ok(Destination::queue(queue)),
            (None, Some(topic)) => Ok(Destination::topic(topic)),
            _ => Err(CliError::InvalidArgument {
                arg: "--queue/--topic".to_string(),
                message: "exactly one of --queue or --topic is required".to_string(),
            }),
        }
    }
}

/// Arguments of the `send` command
#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub destination: DestinationArgs,

    /// Message body
    #[arg(short, long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// Read the message body from a file
    #[arg(long)]
    pub body_file: Option<PathBuf>,

    /// Custom property as `name=value` or `name:type=value`
    #[arg(short, long = "property", value_parser = parse_property)]
    pub properties: Vec<MessageProperty>,

    /// Subject (label)
    #[arg(long)]
    pub subject: Option<String>,

    /// Content type, `application/json` when omitted
    #[arg(long)]
    pub content_type: Option<String>,

    /// Correlation id
    #[arg(long)]
    pub correlation_id: Option<String>,

    /// Message id
    #[arg(long)]
    pub message_id: Option<String>,
}

/// Dead-letter queue to read: `--queue Q` or `--topic T --subscription S`
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Queue whose dead-letter queue to use
    #[arg(long, conflicts_with_all = ["topic", "subscription"])]
    pub queue: Option<String>,

    /// Topic of the subscription
    #[arg(long, requires = "subscription")]
    pub topic: Option<String>,

    /// Subscription whose dead-letter queue to use
    #[arg(long, requires = "topic")]
    pub subscription: Option<String>,
}

impl SourceArgs {
    pub fn source(&self) -> Result<DeadLetterSource, CliError> {
        match (&self.queue, &self.topic, &self.subscription) {
            (Some(queue), None, None) => Ok(DeadLetterSource::queue(queue)),
            (None, Some(topic), Some(subscription)) => {
                Ok(DeadLetterSource::subscription(topic, subscription))
            }
            _ => Err(CliError::InvalidArgument {
                arg: "--queue/--topic/--subscription".to_string(),
                message: "give --queue, or --topic with --subscription".to_string(),
            }),
        }
    }
}

/// Dead-letter subcommands
#[derive(Subcommand, Debug)]
pub enum DeadLetterCommands {
    /// Peek-lock the head of a dead-letter queue
    Peek {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Delete a locked dead-letter message
    Delete {
        #[command(flatten)]
        source: SourceArgs,

        /// Sequence number of the message
        #[arg(long)]
        sequence_number: String,

        /// Lock token returned by peek
        #[arg(long)]
        lock_token: String,
    },

    /// Peek the head message and send it again
    Resend {
        #[command(flatten)]
        source: SourceArgs,

        /// Send to this queue instead of the original entity
        #[arg(long, conflicts_with = "to_topic")]
        to_queue: Option<String>,

        /// Send to this topic instead of the original entity
        #[arg(long)]
        to_topic: Option<String>,

        /// Delete the dead-lettered original after a successful send
        #[arg(long)]
        delete: bool,
    },
}

/// History subcommands
#[derive(Subcommand, Debug)]
pub enum HistoryCommands {
    /// List sent messages, newest first
    List {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Forget all sent messages
    Clear,

    /// Send a message from history again
    Resend {
        /// History entry id
        id: String,
    },
}

/// Parse `name=value` or `name:type=value` into a message property
pub fn parse_property(raw: &str) -> Result<MessageProperty, String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value or name:type=value, got '{}'", raw))?;

    let (name, property_type) = match key.split_once(':') {
        Some((name, ty)) => (
            name,
            ty.parse::<PropertyType>().map_err(|e| e.to_string())?,
        ),
        None => (key, PropertyType::String),
    };

    if name.trim().is_empty() {
        return Err(format!("property name missing in '{}'", raw));
    }
    Ok(MessageProperty::new(name.trim(), value, property_type))
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Service Bus error: {0}")]
    ServiceBus(#[from] ServiceBusError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Command failed: {message}")]
    CommandFailed { message: String },

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("No connection selected; add one with `bus-lens connections add` or pass --connection-string")]
    NoConnection,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Configuration(_) => 1,
            CliError::ServiceBus(_) => 2,
            CliError::Store(_) => 3,
            CliError::InvalidArgument { .. } => 4,
            CliError::Io(_) => 5,
            CliError::NoConnection => 6,
            CliError::CommandFailed { .. } => 7,
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    let config = config::load_configuration(cli.config.as_deref())?;
    initialize_logging(&cli, &config)?;

    let mut stdout = std::io::stdout().lock();
    commands::execute(cli, &config, &mut stdout).await
}

/// Install the tracing subscriber, logging to stderr.
///
/// `RUST_LOG` wins over `--log-level`, which wins over the configured level.
pub fn initialize_logging(cli: &Cli, config: &CliConfig) -> Result<(), CliError> {
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&level).map_err(|e| CliError::InvalidArgument {
            arg: "--log-level".to_string(),
            message: e.to_string(),
        })?,
    };

    let json = cli.json_logs || config.logging.format == LogFormat::Json;
    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| CliError::CommandFailed {
        message: format!("Failed to initialise logging: {}", e),
    })
}
