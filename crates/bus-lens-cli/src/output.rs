//! Rendering of command results as text tables or JSON.

use bus_lens_core::{DeadLetterMessage, Queue, Subscription, Topic};
use serde::Serialize;
use std::io::{self, Write};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::config::OutputFormat;
use crate::store::{ConnectionProfile, HistoryEntry};

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;

fn count(value: Option<i64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn json<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)
}

/// Write rows as borderless columns under their header
fn table<R: Tabled>(out: &mut dyn Write, rows: Vec<R>) -> io::Result<()> {
    let mut table = Table::new(rows);
    table.with(Style::blank());
    writeln!(out, "{}", table)
}

#[derive(Tabled)]
struct QueueRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "MESSAGES")]
    messages: String,
    #[tabled(rename = "DEAD-LETTERED")]
    dead_lettered: String,
}

#[derive(Tabled)]
struct TopicRow {
    #[tabled(rename = "NAME")]
    name: String,
}

#[derive(Tabled)]
struct SubscriptionRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "MESSAGES")]
    messages: String,
    #[tabled(rename = "DEAD-LETTERED")]
    dead_lettered: String,
    #[tabled(rename = "CORRELATION FILTER")]
    correlation_filter: String,
}

#[derive(Tabled)]
struct ConnectionRow {
    #[tabled(rename = "")]
    selected: &'static str,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "ENDPOINT")]
    endpoint: String,
    #[tabled(rename = "KEY NAME")]
    key_name: String,
    #[tabled(rename = "ID")]
    id: String,
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "SENT")]
    sent: String,
    #[tabled(rename = "DESTINATION")]
    destination: String,
    #[tabled(rename = "SUBJECT")]
    subject: String,
    #[tabled(rename = "ID")]
    id: String,
}

pub fn print_queues(out: &mut dyn Write, format: OutputFormat, queues: &[Queue]) -> io::Result<()> {
    match format {
        OutputFormat::Json => json(out, queues),
        OutputFormat::Text => {
            let rows: Vec<_> = queues
                .iter()
                .map(|q| QueueRow {
                    name: q.name.clone(),
                    messages: count(q.message_count),
                    dead_lettered: count(q.dead_letter_message_count),
                })
                .collect();
            table(out, rows)
        }
    }
}

pub fn print_topics(out: &mut dyn Write, format: OutputFormat, topics: &[Topic]) -> io::Result<()> {
    match format {
        OutputFormat::Json => json(out, topics),
        OutputFormat::Text => {
            let rows: Vec<_> = topics
                .iter()
                .map(|t| TopicRow {
                    name: t.name.clone(),
                })
                .collect();
            table(out, rows)
        }
    }
}

pub fn print_subscriptions(
    out: &mut dyn Write,
    format: OutputFormat,
    subscriptions: &[Subscription],
) -> io::Result<()> {
    match format {
        OutputFormat::Json => json(out, subscriptions),
        OutputFormat::Text => {
            let rows: Vec<_> = subscriptions
                .iter()
                .map(|s| SubscriptionRow {
                    name: s.name.clone(),
                    messages: count(s.message_count),
                    dead_lettered: count(s.dead_letter_message_count),
                    correlation_filter: s
                        .correlation_filter
                        .clone()
                        .unwrap_or_else(|| "-".to_string()),
                })
                .collect();
            table(out, rows)
        }
    }
}

pub fn print_dead_letters(
    out: &mut dyn Write,
    format: OutputFormat,
    messages: &[DeadLetterMessage],
) -> io::Result<()> {
    if format == OutputFormat::Json {
        return json(out, messages);
    }
    if messages.is_empty() {
        return writeln!(out, "No dead-lettered messages");
    }

    for message in messages {
        writeln!(out, "Sequence number: {}", message.sequence_number)?;
        let fields = [
            ("Message id", &message.message_id),
            ("Subject", &message.subject),
            ("Correlation id", &message.correlation_id),
            ("Content type", &message.content_type),
            ("Enqueued", &message.enqueued_time),
            ("Reason", &message.dead_letter_reason),
            ("Description", &message.dead_letter_error_description),
            ("Lock token", &message.lock_token),
        ];
        for (label, value) in fields {
            if let Some(value) = value {
                writeln!(out, "{}: {}", label, value)?;
            }
        }
        for property in &message.properties {
            writeln!(out, "  {} = {}", property.key, property.value)?;
        }
        writeln!(out)?;
        writeln!(out, "{}", message.body)?;
    }
    Ok(())
}

/// Connection profile as shown to the user; the key never leaves the store
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionView<'a> {
    id: &'a str,
    name: &'a str,
    endpoint: &'a str,
    key_name: &'a str,
    selected: bool,
}

pub fn print_connections(
    out: &mut dyn Write,
    format: OutputFormat,
    connections: &[ConnectionProfile],
    selected: Option<&str>,
) -> io::Result<()> {
    let views: Vec<_> = connections
        .iter()
        .map(|c| ConnectionView {
            id: &c.id,
            name: &c.name,
            endpoint: &c.endpoint,
            key_name: &c.key_name,
            selected: Some(c.id.as_str()) == selected,
        })
        .collect();

    match format {
        OutputFormat::Json => json(out, &views),
        OutputFormat::Text => {
            let rows: Vec<_> = views
                .iter()
                .map(|v| ConnectionRow {
                    selected: if v.selected { "*" } else { "" },
                    name: v.name.to_string(),
                    endpoint: v.endpoint.to_string(),
                    key_name: v.key_name.to_string(),
                    id: v.id.to_string(),
                })
                .collect();
            table(out, rows)
        }
    }
}

pub fn print_history(
    out: &mut dyn Write,
    format: OutputFormat,
    history: &[HistoryEntry],
) -> io::Result<()> {
    match format {
        OutputFormat::Json => json(out, history),
        OutputFormat::Text => {
            let rows: Vec<_> = history
                .iter()
                .map(|m| HistoryRow {
                    sent: m.sent_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    destination: m.destination().to_string(),
                    subject: m.subject.clone().unwrap_or_else(|| "-".to_string()),
                    id: m.id.clone(),
                })
                .collect();
            table(out, rows)
        }
    }
}

/// One-line outcome of a command; `{"message": ...}` in JSON mode
pub fn print_status(out: &mut dyn Write, format: OutputFormat, message: &str) -> io::Result<()> {
    match format {
        OutputFormat::Json => json(out, &serde_json::json!({ "message": message })),
        OutputFormat::Text => writeln!(out, "{}", message),
    }
}
