use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::query::{Address, AttachmentInfo, MessageDetail, MessageSummary};

/// One message as stored in the archive file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedMessage {
    pub id: i64,
    /// Account the message was synced from
    pub source_id: i64,
    /// Provider-side id (Gmail message id), used by deletion manifests
    pub source_message_id: String,
    /// 0 when unknown; filled in from the threading headers on load
    #[serde(default)]
    pub conversation_id: i64,
    pub subject: String,
    pub from: Address,
    #[serde(default)]
    pub to: Vec<Address>,
    #[serde(default)]
    pub cc: Vec<Address>,
    #[serde(default)]
    pub bcc: Vec<Address>,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub size_estimate: i64,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub body_text: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentInfo>,
    /// The Message-ID header value
    #[serde(default)]
    pub message_id: Option<String>,
    /// The In-Reply-To header value (references immediate parent)
    #[serde(default)]
    pub in_reply_to: Option<String>,
    /// The References header (all Message-IDs in the conversation chain)
    #[serde(default)]
    pub references: Vec<String>,
}

impl ArchivedMessage {
    /// Sender domain, lowercased
    pub fn from_domain(&self) -> String {
        extract_domain(&self.from.email).to_lowercase()
    }

    pub fn recipients(&self) -> impl Iterator<Item = &Address> {
        self.to.iter().chain(self.cc.iter()).chain(self.bcc.iter())
    }

    pub fn attachment_size(&self) -> i64 {
        self.attachments.iter().map(|a| a.size).sum()
    }

    pub fn snippet(&self) -> String {
        self.body_text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .take(120)
            .collect()
    }

    pub fn summary(&self) -> MessageSummary {
        MessageSummary {
            id: self.id,
            source_message_id: self.source_message_id.clone(),
            conversation_id: self.conversation_id,
            subject: self.subject.clone(),
            snippet: self.snippet(),
            from_email: self.from.email.clone(),
            from_name: self.from.name.clone(),
            sent_at: self.sent_at,
            size_estimate: self.size_estimate,
            has_attachments: !self.attachments.is_empty(),
            attachment_count: self.attachments.len(),
            labels: self.labels.clone(),
        }
    }

    pub fn detail(&self) -> MessageDetail {
        MessageDetail {
            id: self.id,
            source_message_id: self.source_message_id.clone(),
            conversation_id: self.conversation_id,
            subject: self.subject.clone(),
            sent_at: self.sent_at,
            size_estimate: self.size_estimate,
            from: vec![self.from.clone()],
            to: self.to.clone(),
            cc: self.cc.clone(),
            bcc: self.bcc.clone(),
            body_text: self.body_text.clone(),
            labels: self.labels.clone(),
            attachments: self.attachments.clone(),
        }
    }
}

/// Builder for archive messages
#[derive(Default)]
pub struct MessageBuilder {
    id: i64,
    source_id: i64,
    from: String,
    to: Vec<String>,
    cc: Vec<String>,
    subject: String,
    body: String,
    date: Option<DateTime<Utc>>,
    size_estimate: i64,
    labels: Vec<String>,
    attachments: Vec<AttachmentInfo>,
    message_id: Option<String>,
    in_reply_to: Option<String>,
    references: Vec<String>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    pub fn source(mut self, source_id: i64) -> Self {
        self.source_id = source_id;
        self
    }

    /// Accepts "Name <email>" or a bare address
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to.push(to.into());
        self
    }

    pub fn cc(mut self, cc: impl Into<String>) -> Self {
        self.cc.push(cc.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn size(mut self, size_estimate: i64) -> Self {
        self.size_estimate = size_estimate;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn attachment(mut self, attachment: AttachmentInfo) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn in_reply_to(mut self, in_reply_to: impl Into<String>) -> Self {
        self.in_reply_to = Some(in_reply_to.into());
        self
    }

    pub fn references(mut self, references: Vec<String>) -> Self {
        self.references = references;
        self
    }

    pub fn build(self) -> ArchivedMessage {
        let size_estimate = if self.size_estimate > 0 {
            self.size_estimate
        } else {
            self.body.len() as i64 + self.attachments.iter().map(|a| a.size).sum::<i64>()
        };

        ArchivedMessage {
            id: self.id,
            source_id: self.source_id,
            source_message_id: format!("{:016x}", self.id),
            conversation_id: 0, // Set by assign_conversation_ids
            subject: self.subject,
            from: parse_address(&self.from),
            to: self.to.iter().map(|a| parse_address(a)).collect(),
            cc: self.cc.iter().map(|a| parse_address(a)).collect(),
            bcc: Vec::new(),
            sent_at: self.date.unwrap_or_else(Utc::now),
            size_estimate,
            labels: self.labels,
            body_text: self.body,
            attachments: self.attachments,
            message_id: self.message_id,
            in_reply_to: self.in_reply_to,
            references: self.references,
        }
    }
}

/// Extracts the email address from a "Name <email>" format string
/// If no angle brackets are present, returns the string trimmed as-is
pub fn extract_email(from: &str) -> String {
    match (from.find('<'), from.rfind('>')) {
        (Some(start), Some(end)) if end > start => from[start + 1..end].trim().to_string(),
        _ => from.trim().to_string(),
    }
}

/// Extracts the domain from an email address.
/// If no `@` is present, returns the full email to avoid grouping unrelated
/// malformed addresses together.
pub fn extract_domain(email: &str) -> String {
    email.split('@').nth(1).unwrap_or(email).to_string()
}

/// Splits "Name <email>" into an [`Address`]
pub fn parse_address(raw: &str) -> Address {
    let email = extract_email(raw);
    let name = match raw.find('<') {
        Some(idx) => raw[..idx].trim().trim_matches('"').to_string(),
        None => String::new(),
    };
    Address { email, name }
}

/// Fills in `conversation_id` for messages that lack one, using the
/// Message-ID, In-Reply-To and References headers.
/// Connected messages are grouped with union-find; each group takes the
/// smallest message id in it as its conversation id.
pub fn assign_conversation_ids(messages: &mut [ArchivedMessage]) {
    if messages.is_empty() {
        return;
    }

    let mut msg_id_to_idx: HashMap<String, usize> = HashMap::new();
    for (i, message) in messages.iter().enumerate() {
        if let Some(ref msg_id) = message.message_id {
            msg_id_to_idx.insert(msg_id.clone(), i);
        }
    }

    // Messages referencing each Message-ID, including ones not in the archive
    let mut reference_to_messages: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, message) in messages.iter().enumerate() {
        if let Some(ref reply_to) = message.in_reply_to {
            reference_to_messages
                .entry(reply_to.clone())
                .or_default()
                .push(i);
        }
        for reference in &message.references {
            reference_to_messages
                .entry(reference.clone())
                .or_default()
                .push(i);
        }
    }

    let mut parent: Vec<usize> = (0..messages.len()).collect();

    for (i, message) in messages.iter().enumerate() {
        if let Some(ref reply_to) = message.in_reply_to
            && let Some(&j) = msg_id_to_idx.get(reply_to)
        {
            union(&mut parent, i, j);
        }
        for reference in &message.references {
            if let Some(&j) = msg_id_to_idx.get(reference) {
                union(&mut parent, i, j);
            }
        }
    }

    // Messages sharing a reference belong together even if the target is missing
    for referencing in reference_to_messages.values() {
        if referencing.len() > 1 {
            let first = referencing[0];
            for &other in &referencing[1..] {
                union(&mut parent, first, other);
            }
        }
    }

    let mut root_to_conversation: HashMap<usize, i64> = HashMap::new();
    for i in 0..messages.len() {
        let root = find(&parent, i);
        let id = messages[i].id;
        root_to_conversation
            .entry(root)
            .and_modify(|c| *c = (*c).min(id))
            .or_insert(id);
    }

    for i in 0..messages.len() {
        if messages[i].conversation_id == 0 {
            let root = find(&parent, i);
            messages[i].conversation_id = root_to_conversation[&root];
        }
    }
}

fn find(parent: &[usize], mut i: usize) -> usize {
    while parent[i] != i {
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], i: usize, j: usize) {
    let root_i = find(parent, i);
    let root_j = find(parent, j);
    if root_i != root_j {
        parent[root_i] = root_j;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_message(id: i64, message_id: &str) -> ArchivedMessage {
        MessageBuilder::new()
            .id(id)
            .from("test@example.com")
            .subject("Test")
            .message_id(message_id)
            .build()
    }

    #[test]
    fn test_extract_email_with_name_and_brackets() {
        assert_eq!(
            extract_email("John Doe <john@example.com>"),
            "john@example.com"
        );
    }

    #[test]
    fn test_extract_email_without_brackets() {
        assert_eq!(extract_email("  john@example.com "), "john@example.com");
    }

    #[test]
    fn test_extract_domain_no_at_symbol_returns_full_input() {
        assert_eq!(extract_domain("localuser"), "localuser");
        assert_eq!(extract_domain("a@mail.example.com"), "mail.example.com");
    }

    #[test]
    fn test_parse_address_with_quoted_name() {
        let addr = parse_address("\"Chen, Alice\" <alice@example.com>");
        assert_eq!(addr.email, "alice@example.com");
        assert_eq!(addr.name, "Chen, Alice");

        let bare = parse_address("bob@example.com");
        assert_eq!(bare.name, "");
    }

    #[test]
    fn test_builder_derives_size_from_content() {
        let message = MessageBuilder::new()
            .id(1)
            .body("hello")
            .attachment(AttachmentInfo {
                size: 10,
                ..AttachmentInfo::default()
            })
            .build();
        assert_eq!(message.size_estimate, 15);
        assert_eq!(message.attachment_size(), 10);
        assert!(message.summary().has_attachments);
    }

    #[test]
    fn test_snippet_collapses_whitespace() {
        let message = MessageBuilder::new().body("line one\n\n  line two").build();
        assert_eq!(message.snippet(), "line one line two");
    }

    #[test]
    fn test_assign_conversation_ids_reply_chain() {
        let mut messages = vec![
            create_test_message(10, "<a@x>"),
            MessageBuilder::new()
                .id(11)
                .message_id("<b@x>")
                .in_reply_to("<a@x>")
                .build(),
            create_test_message(12, "<c@x>"),
        ];
        assign_conversation_ids(&mut messages);

        assert_eq!(messages[0].conversation_id, 10);
        assert_eq!(messages[1].conversation_id, 10);
        assert_eq!(messages[2].conversation_id, 12);
    }

    #[test]
    fn test_assign_conversation_ids_shared_reference_to_missing_message() {
        let mut messages = vec![
            MessageBuilder::new()
                .id(5)
                .references(vec!["<gone@x>".to_string()])
                .build(),
            MessageBuilder::new()
                .id(3)
                .in_reply_to("<gone@x>")
                .build(),
        ];
        assign_conversation_ids(&mut messages);
        assert_eq!(messages[0].conversation_id, 3);
        assert_eq!(messages[1].conversation_id, 3);
    }

    #[test]
    fn test_assign_conversation_ids_keeps_existing_ids() {
        let mut messages = vec![create_test_message(1, "<a@x>")];
        messages[0].conversation_id = 99;
        assign_conversation_ids(&mut messages);
        assert_eq!(messages[0].conversation_id, 99);
    }
}
