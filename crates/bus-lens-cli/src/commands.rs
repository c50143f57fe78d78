//! Command implementations.

use bus_lens_core::{
    Credentials, DeadLetterSource, Destination, OutboundMessage, ServiceBusClient,
    ServiceBusError,
};
use clap::CommandFactory;
use std::io::Write;
use tracing::{info, warn};

use crate::config::{CliConfig, OutputFormat};
use crate::output;
use crate::store::{ConnectionProfile, HistoryEntry, LocalStore};
use crate::{
    Cli, CliError, Commands, ConnectionCommands, DeadLetterCommands, HistoryCommands, SendArgs,
    SourceArgs,
};

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;

/// Settings shared by every command of one invocation
struct Context<'a> {
    config: &'a CliConfig,
    format: OutputFormat,
    connection: Option<String>,
    connection_string: Option<String>,
}

impl Context<'_> {
    fn open_store(&self) -> Result<LocalStore, CliError> {
        Ok(LocalStore::open(self.config.store.resolve_directory())?)
    }

    /// `--connection-string`, then `--connection`, then the selected profile
    fn credentials(&self, store: &LocalStore) -> Result<Credentials, CliError> {
        if let Some(raw) = &self.connection_string {
            return raw
                .parse::<Credentials>()
                .map_err(|e| CliError::ServiceBus(ServiceBusError::from(e)));
        }
        if let Some(key) = &self.connection {
            return Ok(store.find_connection(key)?.credentials());
        }
        store
            .selected_connection()
            .map(ConnectionProfile::credentials)
            .ok_or(CliError::NoConnection)
    }

    fn client(&self, store: &LocalStore) -> Result<ServiceBusClient, CliError> {
        let credentials = self.credentials(store)?;
        let client_config = self.config.client.to_client_config()?;
        Ok(ServiceBusClient::new(&credentials, client_config)?)
    }
}

/// Run a parsed command, writing results to `out`
pub async fn execute(cli: Cli, config: &CliConfig, out: &mut dyn Write) -> Result<(), CliError> {
    let context = Context {
        config,
        format: cli.format.unwrap_or(config.output.format),
        connection: cli.connection,
        connection_string: cli.connection_string,
    };

    match cli.command {
        Commands::Connections { action } => execute_connections_command(&context, action, out),
        Commands::Test => execute_test_command(&context, out).await,
        Commands::Queues => execute_queues_command(&context, out).await,
        Commands::Topics => execute_topics_command(&context, out).await,
        Commands::Subscriptions {
            topic,
            with_filters,
        } => execute_subscriptions_command(&context, &topic, with_filters, out).await,
        Commands::Send(args) => execute_send_command(&context, args, out).await,
        Commands::DeadLetters { action } => {
            execute_dead_letters_command(&context, action, out).await
        }
        Commands::History { action } => execute_history_command(&context, action, out).await,
        Commands::Export { output } => execute_export_command(&context, output, out),
        Commands::Import { file } => execute_import_command(&context, file, out),
        Commands::Completions { shell } => execute_completions_command(shell, out),
    }
}

fn execute_connections_command(
    context: &Context<'_>,
    action: ConnectionCommands,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let mut store = context.open_store()?;

    match action {
        ConnectionCommands::Add {
            name,
            value,
            select,
        } => {
            let profile = ConnectionProfile::new(name, &value)?;
            let id = profile.id.clone();
            info!(connection = %profile.name, "Saving connection");
            store.save_connection(profile)?;
            if select || store.selected_connection().is_none() {
                store.select_connection(&id)?;
            }
            output::print_status(out, context.format, &format!("Saved connection {}", id))?;
        }
        ConnectionCommands::List => {
            let selected = store.selected_connection().map(|c| c.id.as_str());
            output::print_connections(out, context.format, store.connections(), selected)?;
        }
        ConnectionCommands::Remove { profile } => {
            let removed = store.delete_connection(&profile)?;
            output::print_status(
                out,
                context.format,
                &format!("Removed connection '{}'", removed.name),
            )?;
        }
        ConnectionCommands::Select { profile } => {
            let selected = store.select_connection(&profile)?;
            let message = format!("Selected connection '{}'", selected.name);
            output::print_status(out, context.format, &message)?;
        }
    }
    Ok(())
}

async fn execute_test_command(context: &Context<'_>, out: &mut dyn Write) -> Result<(), CliError> {
    let store = context.open_store()?;
    let client = context.client(&store)?;

    if client.test_connection().await {
        let message = format!("Connected to {}", client.endpoint());
        output::print_status(out, context.format, &message)?;
        Ok(())
    } else {
        Err(CliError::CommandFailed {
            message: format!("Could not connect to {}", client.endpoint()),
        })
    }
}

/// Each invocation builds a new client, so listings are always fetched fresh
async fn execute_queues_command(
    context: &Context<'_>,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let store = context.open_store()?;
    let client = context.client(&store)?;

    let queues = client.list_queues(false).await?;
    output::print_queues(out, context.format, &queues)?;
    Ok(())
}

async fn execute_topics_command(
    context: &Context<'_>,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let store = context.open_store()?;
    let client = context.client(&store)?;

    let topics = client.list_topics(false).await?;
    output::print_topics(out, context.format, &topics)?;
    Ok(())
}

async fn execute_subscriptions_command(
    context: &Context<'_>,
    topic: &str,
    with_filters: bool,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let store = context.open_store()?;
    let client = context.client(&store)?;

    let mut subscriptions = client.list_subscriptions(topic).await?;
    if with_filters {
        for subscription in &mut subscriptions {
            subscription.correlation_filter = client
                .get_subscription_correlation_filter(topic, &subscription.name)
                .await;
        }
    }
    output::print_subscriptions(out, context.format, &subscriptions)?;
    Ok(())
}

fn outbound_message(args: SendArgs) -> Result<OutboundMessage, CliError> {
    let body = match (args.body, args.body_file) {
        (Some(body), _) => body,
        (None, Some(path)) => std::fs::read_to_string(&path)?,
        (None, None) => {
            return Err(CliError::InvalidArgument {
                arg: "--body".to_string(),
                message: "give --body or --body-file".to_string(),
            })
        }
    };

    let mut message = OutboundMessage::new(body).with_properties(args.properties);
    message.subject = args.subject;
    message.content_type = args.content_type;
    message.correlation_id = args.correlation_id;
    message.message_id = args.message_id;
    Ok(message)
}

/// Send `message` and record it in history along with the subscription it came from
async fn send_and_record(
    client: &ServiceBusClient,
    store: &mut LocalStore,
    destination: &Destination,
    message: &OutboundMessage,
    subscription_name: Option<String>,
) -> Result<(), CliError> {
    client.send_message(destination, message).await?;
    let entry = HistoryEntry::record(destination, message, subscription_name);
    if let Err(e) = store.record_message(entry) {
        warn!(error = %e, "Message sent but not recorded in history");
    }
    Ok(())
}

async fn execute_send_command(
    context: &Context<'_>,
    args: SendArgs,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let mut store = context.open_store()?;
    let client = context.client(&store)?;

    let destination = args.destination.destination()?;
    let message = outbound_message(args)?;
    send_and_record(&client, &mut store, &destination, &message, None).await?;

    output::print_status(out, context.format, &format!("Message sent to {}", destination))?;
    Ok(())
}

/// Where a resent dead letter goes when no destination is given
fn origin_of(source: &DeadLetterSource) -> Destination {
    match source {
        DeadLetterSource::Queue { queue } => Destination::queue(queue),
        DeadLetterSource::Subscription { topic, .. } => Destination::topic(topic),
    }
}

async fn execute_dead_letters_command(
    context: &Context<'_>,
    action: DeadLetterCommands,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let mut store = context.open_store()?;
    let client = context.client(&store)?;

    match action {
        DeadLetterCommands::Peek { source } => {
            let messages = client.fetch_dead_letters(&source.source()?).await?;
            output::print_dead_letters(out, context.format, &messages)?;
        }
        DeadLetterCommands::Delete {
            source,
            sequence_number,
            lock_token,
        } => {
            let source = source.source()?;
            client
                .delete_dead_letter(&source, &sequence_number, &lock_token)
                .await?;
            let message = format!("Deleted message {} from {}", sequence_number, source);
            output::print_status(out, context.format, &message)?;
        }
        DeadLetterCommands::Resend {
            source,
            to_queue,
            to_topic,
            delete,
        } => {
            execute_dead_letter_resend(
                context,
                &client,
                &mut store,
                &source,
                (to_queue, to_topic),
                delete,
                out,
            )
            .await?;
        }
    }
    Ok(())
}

async fn execute_dead_letter_resend(
    context: &Context<'_>,
    client: &ServiceBusClient,
    store: &mut LocalStore,
    source: &SourceArgs,
    target: (Option<String>, Option<String>),
    delete: bool,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let source = source.source()?;
    let destination = match target {
        (Some(queue), _) => Destination::queue(queue),
        (None, Some(topic)) => Destination::topic(topic),
        (None, None) => origin_of(&source),
    };

    let messages = client.fetch_dead_letters(&source).await?;
    let Some(dead_letter) = messages.first() else {
        output::print_status(out, context.format, "No dead-lettered messages")?;
        return Ok(());
    };

    let subscription_name = match &source {
        DeadLetterSource::Subscription { subscription, .. } => Some(subscription.clone()),
        DeadLetterSource::Queue { .. } => None,
    };
    send_and_record(
        client,
        store,
        &destination,
        &dead_letter.to_outbound(),
        subscription_name,
    )
    .await?;
    info!(
        sequence_number = %dead_letter.sequence_number,
        destination = %destination,
        "Dead-lettered message resent"
    );

    if delete {
        let lock_token = dead_letter
            .lock_token
            .as_deref()
            .ok_or_else(|| CliError::CommandFailed {
                message: format!(
                    "Message {} was resent but has no lock token; the original was kept",
                    dead_letter.sequence_number
                ),
            })?;
        client
            .delete_dead_letter(&source, &dead_letter.sequence_number, lock_token)
            .await?;
    }

    let message = format!(
        "Resent message {} to {}{}",
        dead_letter.sequence_number,
        destination,
        if delete { " and deleted the original" } else { "" }
    );
    output::print_status(out, context.format, &message)?;
    Ok(())
}

async fn execute_history_command(
    context: &Context<'_>,
    action: HistoryCommands,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let mut store = context.open_store()?;

    match action {
        HistoryCommands::List { limit } => {
            let history = store.history();
            let shown = &history[..limit.min(history.len())];
            output::print_history(out, context.format, shown)?;
        }
        HistoryCommands::Clear => {
            store.clear_history()?;
            output::print_status(out, context.format, "History cleared")?;
        }
        HistoryCommands::Resend { id } => {
            let entry = store.find_message(&id)?.clone();
            let client = context.client(&store)?;
            let destination = entry.destination();
            send_and_record(
                &client,
                &mut store,
                &destination,
                &entry.to_outbound(),
                entry.subscription_name.clone(),
            )
            .await?;
            output::print_status(out, context.format, &format!("Message sent to {}", destination))?;
        }
    }
    Ok(())
}

fn execute_export_command(
    context: &Context<'_>,
    path: Option<std::path::PathBuf>,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let store = context.open_store()?;
    let json = store.export_json()?;

    match path {
        Some(path) => {
            std::fs::write(&path, json)?;
            let message = format!("Exported to {}", path.display());
            output::print_status(out, context.format, &message)?;
        }
        None => writeln!(out, "{}", json)?,
    }
    Ok(())
}

fn execute_import_command(
    context: &Context<'_>,
    path: std::path::PathBuf,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let mut store = context.open_store()?;
    let json = std::fs::read_to_string(&path)?;
    let summary = store.import_json(&json)?;

    let mut parts = Vec::new();
    if let Some(count) = summary.connections {
        parts.push(format!("{} connections", count));
    }
    if let Some(count) = summary.messages {
        parts.push(format!("{} messages", count));
    }
    let message = if parts.is_empty() {
        "Nothing to import".to_string()
    } else {
        format!("Imported {}", parts.join(" and "))
    };
    output::print_status(out, context.format, &message)?;
    Ok(())
}

fn execute_completions_command(
    shell: clap_complete::Shell,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    info!(shell = ?shell, "Generating shell completions");
    clap_complete::generate(shell, &mut Cli::command(), "bus-lens", out);
    Ok(())
}
