use chrono::{Duration, TimeZone, Utc};

use crate::archive::ArchiveFile;
use crate::message::MessageBuilder;
use crate::query::{AccountInfo, AttachmentInfo};

const DEMO_SENDERS: &[(&str, &str)] = &[
    ("GitHub <notifications@github.com>", "Notifications"),
    ("Linear <notify@linear.app>", "Updates"),
    ("Stripe <receipts@stripe.com>", "Receipts"),
    ("Alice Chen <alice@example.com>", "Personal"),
    ("Bob Martinez <bob@example.com>", "Personal"),
    ("Figma <no-reply@figma.com>", "Updates"),
    ("newsletter@rustweekly.dev", "Newsletters"),
    ("AWS Billing <billing@aws.amazon.com>", "Receipts"),
];

const DEMO_SUBJECTS: &[&str] = &[
    "[rust-lang/rust] Fix ICE in pattern matching (PR #12345)",
    "ENG-1234: Implement user authentication",
    "Your receipt from Acme Corp",
    "Coffee tomorrow?",
    "Trip photos",
    "Alice commented on Design System v2",
    "This Week in Rust 512",
    "Your AWS invoice is available",
];

/// Builds a deterministic demo archive for screenshots and trying the UI without data
pub fn create_demo_archive() -> ArchiveFile {
    let accounts = vec![
        AccountInfo {
            id: 1,
            source_type: "gmail".to_string(),
            identifier: "demo@example.com".to_string(),
            display_name: "Demo User".to_string(),
        },
        AccountInfo {
            id: 2,
            source_type: "imap".to_string(),
            identifier: "demo@work.example".to_string(),
            display_name: "Demo Work".to_string(),
        },
    ];

    let start = Utc
        .with_ymd_and_hms(2023, 1, 3, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);

    let mut messages = Vec::new();
    for i in 0..240_i64 {
        let which = (i as usize * 7 + i as usize / 3) % DEMO_SENDERS.len();
        let (from, label) = DEMO_SENDERS[which];
        let subject = DEMO_SUBJECTS[which];
        let account = if i % 5 == 0 { 2 } else { 1 };
        let to = if account == 2 {
            "Demo Work <demo@work.example>"
        } else {
            "Demo User <demo@example.com>"
        };

        let mut builder = MessageBuilder::new()
            .id(i + 1)
            .source(account)
            .from(from)
            .to(to)
            .subject(if i % 4 == 1 {
                format!("Re: {subject}")
            } else {
                subject.to_string()
            })
            .body(format!(
                "Hello,\n\nThis is demo message {} about \"{}\".\n\nThanks,\n{}",
                i + 1,
                subject,
                from
            ))
            .date(start + Duration::hours(i * 71))
            .label("INBOX")
            .message_id(format!("<demo-{}@example.com>", i + 1));

        if which != 6 {
            builder = builder.label(label);
        }
        if i % 9 == 0 {
            builder = builder.cc("Bob Martinez <bob@example.com>");
        }
        if i % 4 == 1 && i > 0 {
            // Reply to the previous message from the same sender slot
            builder = builder.in_reply_to(format!("<demo-{}@example.com>", i));
        }
        if which == 2 || which == 7 || i % 11 == 0 {
            builder = builder.attachment(AttachmentInfo {
                id: 1000 + i,
                filename: format!("invoice-{:04}.pdf", i + 1),
                mime_type: "application/pdf".to_string(),
                size: 20_000 + i * 311,
                content_hash: format!("{:064x}", 0xdeadbeef_u64 + i as u64),
            });
        }
        messages.push(builder.build());
    }

    ArchiveFile { accounts, messages }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_archive_is_deterministic() {
        let a = create_demo_archive();
        let b = create_demo_archive();
        assert_eq!(a.messages, b.messages);
        assert_eq!(a.accounts.len(), 2);
    }

    #[test]
    fn test_demo_archive_covers_empty_buckets_and_attachments() {
        let archive = create_demo_archive();
        assert!(archive.messages.iter().any(|m| m.from.name.is_empty()));
        assert!(archive.messages.iter().any(|m| !m.attachments.is_empty()));
        assert!(archive.messages.iter().any(|m| m.in_reply_to.is_some()));
    }
}
