//! Atom feed parsing for the management API.
//!
//! Listing endpoints answer with an Atom feed holding one `<entry>` per
//! entity. The entity name is the entry `<title>`; counters and filters sit
//! under `<content>` inside a `QueueDescription`, `SubscriptionDescription`
//! or `RuleDescription`, often with namespace-prefixed tag names
//! (`<d2p1:DeadLetterMessageCount>`). Elements are therefore matched on
//! their local name, and lookups search all descendants in document order.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::entity::{Queue, Subscription, Topic};
use crate::error::ServiceBusError;

#[cfg(test)]
#[path = "atom_tests.rs"]
mod tests;

/// Minimal element tree built from a feed
#[derive(Debug, Default)]
pub(crate) struct XmlElement {
    name: String,
    text: String,
    children: Vec<XmlElement>,
}

impl XmlElement {
    fn named(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    /// First descendant with the given local name, depth first
    pub(crate) fn find(&self, name: &str) -> Option<&XmlElement> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }

    /// All descendants with the given local name, in document order
    pub(crate) fn find_all<'a>(&'a self, name: &str) -> Vec<&'a XmlElement> {
        let mut found = Vec::new();
        self.collect(name, &mut found);
        found
    }

    fn collect<'a>(&'a self, name: &str, found: &mut Vec<&'a XmlElement>) {
        for child in &self.children {
            if child.name == name {
                found.push(child);
            }
            child.collect(name, found);
        }
    }

    /// Concatenated text of this element and its descendants
    pub(crate) fn text_content(&self) -> String {
        let mut out = self.text.clone();
        for child in &self.children {
            out.push_str(&child.text_content());
        }
        out
    }
}

/// Parse an XML document into an element tree rooted at a synthetic node
pub(crate) fn parse_document(xml: &str) -> Result<XmlElement, ServiceBusError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack = vec![XmlElement::named("#document".to_string())];
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                stack.push(XmlElement::named(name));
            }
            Ok(Event::Empty(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlElement::named(name));
                }
            }
            Ok(Event::End(_)) => {
                let element = stack.pop().ok_or_else(|| parse_error("unbalanced end tag"))?;
                let parent = stack
                    .last_mut()
                    .ok_or_else(|| parse_error("unbalanced end tag"))?;
                parent.children.push(element);
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| parse_error(&format!("invalid text: {}", e)))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error(&format!("XML parsing error: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    if stack.len() != 1 {
        return Err(parse_error("document ended inside an element"));
    }
    stack.pop().ok_or_else(|| parse_error("empty document"))
}

fn parse_error(message: &str) -> ServiceBusError {
    ServiceBusError::Parse {
        message: message.to_string(),
    }
}

/// Entry title, skipping entries with a missing or empty title
fn entry_title(entry: &XmlElement) -> Option<String> {
    let title = entry.find("title")?.text_content();
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// Integer text of the first `name` descendant; unparseable text is treated as absent
fn count_of(parent: &XmlElement, name: &str) -> Option<i64> {
    parent.find(name)?.text_content().trim().parse().ok()
}

/// `MessageCount` and `CountDetails/DeadLetterMessageCount` of a description element
fn counters(description: Option<&XmlElement>) -> (Option<i64>, Option<i64>) {
    match description {
        Some(desc) => {
            let message_count = count_of(desc, "MessageCount");
            let dead_letter_count = desc
                .find("CountDetails")
                .and_then(|details| count_of(details, "DeadLetterMessageCount"));
            (message_count, dead_letter_count)
        }
        None => (None, None),
    }
}

fn description<'a>(entry: &'a XmlElement, kind: &str) -> Option<&'a XmlElement> {
    entry.find("content")?.find(kind)
}

fn non_empty_label(parent: &XmlElement) -> Option<String> {
    let label = parent.find("Label")?.text_content();
    if label.is_empty() {
        None
    } else {
        Some(label)
    }
}

/// Parse a `$Resources/Queues` feed
pub fn parse_queues(xml: &str) -> Result<Vec<Queue>, ServiceBusError> {
    let doc = parse_document(xml)?;

    Ok(doc
        .find_all("entry")
        .into_iter()
        .filter_map(|entry| {
            let name = entry_title(entry)?;
            let (message_count, dead_letter_message_count) =
                counters(description(entry, "QueueDescription"));
            Some(Queue {
                name,
                message_count,
                dead_letter_message_count,
            })
        })
        .collect())
}

/// Parse a `$Resources/Topics` feed
pub fn parse_topics(xml: &str) -> Result<Vec<Topic>, ServiceBusError> {
    let doc = parse_document(xml)?;

    Ok(doc
        .find_all("entry")
        .into_iter()
        .filter_map(|entry| {
            Some(Topic {
                name: entry_title(entry)?,
                subscriptions: None,
            })
        })
        .collect())
}

/// Parse a `{topic}/Subscriptions` feed
pub fn parse_subscriptions(xml: &str) -> Result<Vec<Subscription>, ServiceBusError> {
    let doc = parse_document(xml)?;

    Ok(doc
        .find_all("entry")
        .into_iter()
        .filter_map(|entry| {
            let name = entry_title(entry)?;
            let desc = description(entry, "SubscriptionDescription");
            let (message_count, dead_letter_message_count) = counters(desc);
            let correlation_filter = desc
                .and_then(|d| d.find("CorrelationFilter"))
                .and_then(non_empty_label);
            Some(Subscription {
                name,
                message_count,
                dead_letter_message_count,
                correlation_filter,
            })
        })
        .collect())
}

/// First non-empty `RuleDescription/Filter/Label` in a `.../Rules` feed
pub fn parse_rule_correlation_label(xml: &str) -> Result<Option<String>, ServiceBusError> {
    let doc = parse_document(xml)?;

    Ok(doc
        .find_all("RuleDescription")
        .into_iter()
        .filter_map(|rule| rule.find("Filter"))
        .find_map(non_empty_label))
}
