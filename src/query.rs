//! Data model of the archive query layer and the engine seam the TUI reads through.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::DrillFilter;

/// Grouping dimension for aggregate views
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum ViewDimension {
    #[default]
    Senders,
    SenderNames,
    Recipients,
    RecipientNames,
    Domains,
    Labels,
    Time,
}

impl ViewDimension {
    /// Ring order used for cycling
    pub const ALL: [ViewDimension; 7] = [
        ViewDimension::Senders,
        ViewDimension::SenderNames,
        ViewDimension::Recipients,
        ViewDimension::RecipientNames,
        ViewDimension::Domains,
        ViewDimension::Labels,
        ViewDimension::Time,
    ];

    /// Default sub-grouping after drilling into a row of this dimension.
    ///
    /// An address maps to one display name in practice, so the `*Names` dimension
    /// right after its address dimension is skipped. A name can cover many
    /// addresses, so `*Names` still moves on to the next address dimension.
    pub fn next_subgroup(self) -> Self {
        match self {
            ViewDimension::Senders | ViewDimension::SenderNames => ViewDimension::Recipients,
            ViewDimension::Recipients | ViewDimension::RecipientNames => ViewDimension::Domains,
            ViewDimension::Domains => ViewDimension::Labels,
            ViewDimension::Labels => ViewDimension::Time,
            ViewDimension::Time => ViewDimension::Senders,
        }
    }

    /// Steps around the dimension ring, never landing on `skip`
    pub fn cycle(self, forward: bool, skip: Option<ViewDimension>) -> Self {
        let len = Self::ALL.len();
        let mut idx = self as usize;
        for _ in 0..len {
            idx = if forward {
                (idx + 1) % len
            } else {
                (idx + len - 1) % len
            };
            let candidate = Self::ALL[idx];
            if Some(candidate) != skip {
                return candidate;
            }
        }
        self
    }

    pub fn label(self) -> &'static str {
        match self {
            ViewDimension::Senders => "Senders",
            ViewDimension::SenderNames => "Sender Names",
            ViewDimension::Recipients => "Recipients",
            ViewDimension::RecipientNames => "Recipient Names",
            ViewDimension::Domains => "Domains",
            ViewDimension::Labels => "Labels",
            ViewDimension::Time => "Time",
        }
    }

    /// Singular form used in filter descriptions ("sender:alice@example.com")
    pub fn field_name(self) -> &'static str {
        match self {
            ViewDimension::Senders => "sender",
            ViewDimension::SenderNames => "sender name",
            ViewDimension::Recipients => "recipient",
            ViewDimension::RecipientNames => "recipient name",
            ViewDimension::Domains => "domain",
            ViewDimension::Labels => "label",
            ViewDimension::Time => "period",
        }
    }
}

impl fmt::Display for ViewDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Bucket size for the Time dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeGranularity {
    Year,
    #[default]
    Month,
    Day,
}

impl TimeGranularity {
    pub fn next(self) -> Self {
        match self {
            TimeGranularity::Year => TimeGranularity::Month,
            TimeGranularity::Month => TimeGranularity::Day,
            TimeGranularity::Day => TimeGranularity::Year,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeGranularity::Year => "Year",
            TimeGranularity::Month => "Month",
            TimeGranularity::Day => "Day",
        }
    }

    /// Formats a timestamp into this granularity's period key ("2024", "2024-01", "2024-01-15")
    pub fn period(self, date: &DateTime<Utc>) -> String {
        let fmt = match self {
            TimeGranularity::Year => "%Y",
            TimeGranularity::Month => "%Y-%m",
            TimeGranularity::Day => "%Y-%m-%d",
        };
        date.format(fmt).to_string()
    }
}

/// Aggregate sort field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Count,
    Size,
    AttachmentSize,
    Name,
}

impl SortField {
    pub fn next(self) -> Self {
        match self {
            SortField::Count => SortField::Size,
            SortField::Size => SortField::AttachmentSize,
            SortField::AttachmentSize => SortField::Name,
            SortField::Name => SortField::Count,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortField::Count => "Count",
            SortField::Size => "Size",
            SortField::AttachmentSize => "Attachments",
            SortField::Name => "Name",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Desc,
    Asc,
}

impl SortDirection {
    pub fn flip(self) -> Self {
        match self {
            SortDirection::Desc => SortDirection::Asc,
            SortDirection::Asc => SortDirection::Desc,
        }
    }

    pub fn arrow(self) -> &'static str {
        match self {
            SortDirection::Desc => "↓",
            SortDirection::Asc => "↑",
        }
    }
}

/// Message list sort field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageSortField {
    #[default]
    Date,
    Size,
    Subject,
}

impl MessageSortField {
    pub fn next(self) -> Self {
        match self {
            MessageSortField::Date => MessageSortField::Size,
            MessageSortField::Size => MessageSortField::Subject,
            MessageSortField::Subject => MessageSortField::Date,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MessageSortField::Date => "Date",
            MessageSortField::Size => "Size",
            MessageSortField::Subject => "Subject",
        }
    }
}

/// One row of an aggregate view
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregateRow {
    /// Sender address, domain, label, period... Empty for the "no value" bucket.
    pub key: String,
    pub count: i64,
    pub total_size: i64,
    pub attachment_size: i64,
    pub attachment_count: i64,
    /// Number of distinct keys in the whole result, repeated on every row
    pub total_unique: i64,
}

/// A message as shown in list views
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: i64,
    pub source_message_id: String,
    pub conversation_id: i64,
    pub subject: String,
    pub snippet: String,
    pub from_email: String,
    pub from_name: String,
    pub sent_at: DateTime<Utc>,
    pub size_estimate: i64,
    pub has_attachments: bool,
    pub attachment_count: usize,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Address {
    pub email: String,
    #[serde(default)]
    pub name: String,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            f.write_str(&self.email)
        } else {
            write!(f, "{} <{}>", self.name, self.email)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttachmentInfo {
    pub id: i64,
    pub filename: String,
    pub mime_type: String,
    pub size: i64,
    /// SHA-256 of the content, used to locate the blob in the attachment store
    pub content_hash: String,
}

/// A full message with body and attachments
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageDetail {
    pub id: i64,
    pub source_message_id: String,
    pub conversation_id: i64,
    pub subject: String,
    pub sent_at: DateTime<Utc>,
    pub size_estimate: i64,
    pub from: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub body_text: String,
    pub labels: Vec<String>,
    pub attachments: Vec<AttachmentInfo>,
}

impl MessageDetail {
    /// Header block, attachment list and body as displayed in the detail view.
    /// Scrolling is bounded by the length of this.
    pub fn display_lines(&self) -> Vec<String> {
        let join = |addrs: &[Address]| {
            addrs
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut lines = vec![format!("From: {}", join(&self.from))];
        lines.push(format!("To: {}", join(&self.to)));
        if !self.cc.is_empty() {
            lines.push(format!("Cc: {}", join(&self.cc)));
        }
        if !self.bcc.is_empty() {
            lines.push(format!("Bcc: {}", join(&self.bcc)));
        }
        lines.push(format!("Date: {}", self.sent_at.format("%Y-%m-%d %H:%M")));
        lines.push(format!("Subject: {}", self.subject));
        if !self.labels.is_empty() {
            lines.push(format!("Labels: {}", self.labels.join(", ")));
        }
        if !self.attachments.is_empty() {
            lines.push(format!("Attachments ({}):", self.attachments.len()));
            for att in &self.attachments {
                lines.push(format!("  {} ({})", att.filename, format_bytes(att.size)));
            }
        }
        lines.push(String::new());
        lines.extend(self.body_text.lines().map(str::to_string));
        lines
    }
}

/// Human-readable byte count (512 B, 1.5 KB, 2.0 MB)
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Message/byte/attachment counts scoped to some filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TotalStats {
    pub message_count: i64,
    pub total_size: i64,
    pub attachment_count: i64,
    pub attachment_size: i64,
    pub label_count: i64,
    pub account_count: i64,
}

impl TotalStats {
    /// Stats for a single aggregate row, used when drilling into it
    pub fn from_row(row: &AggregateRow) -> Self {
        Self {
            message_count: row.count,
            total_size: row.total_size,
            attachment_count: row.attachment_count,
            attachment_size: row.attachment_size,
            ..Self::default()
        }
    }

    pub fn sum_rows(rows: &[AggregateRow]) -> Self {
        rows.iter().fold(Self::default(), |mut acc, row| {
            acc.message_count += row.count;
            acc.total_size += row.total_size;
            acc.attachment_count += row.attachment_count;
            acc.attachment_size += row.attachment_size;
            acc
        })
    }
}

/// A source account in the archive
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: i64,
    pub source_type: String,
    /// Usually the account's email address
    pub identifier: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateOptions {
    pub source_id: Option<i64>,
    pub sort_field: SortField,
    pub sort_direction: SortDirection,
    pub limit: usize,
    pub granularity: TimeGranularity,
    pub attachments_only: bool,
    /// Restricts aggregation to messages matching this search
    pub search_query: Option<String>,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            source_id: None,
            sort_field: SortField::Count,
            sort_direction: SortDirection::Desc,
            limit: 100,
            granularity: TimeGranularity::Month,
            attachments_only: false,
            search_query: None,
        }
    }
}

/// Sorting and paging for message listings
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageQuery {
    pub sort_field: MessageSortField,
    pub sort_direction: SortDirection,
    /// 0 means no limit
    pub limit: usize,
    pub offset: usize,
    /// Restricts the listing to one conversation (thread view)
    pub conversation_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsOptions {
    pub source_id: Option<i64>,
    pub attachments_only: bool,
    pub search_query: Option<String>,
    /// When searching, match against this dimension's key instead of subject and sender
    pub group_by: Option<ViewDimension>,
}

/// Errors raised by a query engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("archive I/O failed: {0}")]
    Io(String),
    #[error("archive could not be parsed: {0}")]
    Parse(String),
    #[error("invalid query: {0}")]
    Invalid(String),
}

pub type QueryResult<T> = Result<T, QueryError>;

/// Read-only access to the message archive.
///
/// Calls are blocking; the runtime moves them off the UI loop.
#[cfg_attr(test, mockall::automock)]
pub trait QueryEngine: Send + Sync {
    /// Groups all messages (within the options' account/attachment scope) by `dimension`
    fn aggregate(
        &self,
        dimension: ViewDimension,
        opts: &AggregateOptions,
    ) -> QueryResult<Vec<AggregateRow>>;

    /// Groups the messages matching `filter` by `dimension`
    fn sub_aggregate(
        &self,
        filter: &DrillFilter,
        dimension: ViewDimension,
        opts: &AggregateOptions,
    ) -> QueryResult<Vec<AggregateRow>>;

    fn list_messages(
        &self,
        filter: &DrillFilter,
        query: &MessageQuery,
    ) -> QueryResult<Vec<MessageSummary>>;

    fn get_message(&self, id: i64) -> QueryResult<Option<MessageDetail>>;

    /// Full-text search including message bodies
    fn search(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> QueryResult<Vec<MessageSummary>>;

    /// Metadata-only search (subject, sender address and name) within `filter`
    fn search_fast(
        &self,
        query: &str,
        filter: &DrillFilter,
        limit: usize,
        offset: usize,
    ) -> QueryResult<Vec<MessageSummary>>;

    fn search_fast_count(&self, query: &str, filter: &DrillFilter) -> QueryResult<i64>;

    /// Provider-side message ids for everything matching `filter`
    fn source_message_ids(&self, filter: &DrillFilter) -> QueryResult<Vec<String>>;

    fn list_accounts(&self) -> QueryResult<Vec<AccountInfo>>;

    fn total_stats(&self, opts: &StatsOptions) -> QueryResult<TotalStats>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_subgroup_skips_paired_name_dimension() {
        assert_eq!(ViewDimension::Senders.next_subgroup(), ViewDimension::Recipients);
        assert_eq!(ViewDimension::Recipients.next_subgroup(), ViewDimension::Domains);
    }

    #[test]
    fn test_next_subgroup_keeps_name_to_address_order() {
        assert_eq!(
            ViewDimension::SenderNames.next_subgroup(),
            ViewDimension::Recipients
        );
        assert_eq!(
            ViewDimension::RecipientNames.next_subgroup(),
            ViewDimension::Domains
        );
    }

    #[test]
    fn test_next_subgroup_wraps_from_time() {
        assert_eq!(ViewDimension::Time.next_subgroup(), ViewDimension::Senders);
        assert_eq!(ViewDimension::Domains.next_subgroup(), ViewDimension::Labels);
        assert_eq!(ViewDimension::Labels.next_subgroup(), ViewDimension::Time);
    }

    #[test]
    fn test_cycle_wraps_in_both_directions() {
        assert_eq!(ViewDimension::Time.cycle(true, None), ViewDimension::Senders);
        assert_eq!(ViewDimension::Senders.cycle(false, None), ViewDimension::Time);
        assert_eq!(
            ViewDimension::Senders.cycle(true, None),
            ViewDimension::SenderNames
        );
    }

    #[test]
    fn test_cycle_skips_drill_dimension() {
        let next = ViewDimension::Senders.cycle(true, Some(ViewDimension::SenderNames));
        assert_eq!(next, ViewDimension::Recipients);

        let prev = ViewDimension::Recipients.cycle(false, Some(ViewDimension::SenderNames));
        assert_eq!(prev, ViewDimension::Senders);
    }

    #[test]
    fn test_granularity_cycles_year_month_day() {
        assert_eq!(TimeGranularity::default(), TimeGranularity::Month);
        assert_eq!(TimeGranularity::Month.next(), TimeGranularity::Day);
        assert_eq!(TimeGranularity::Day.next(), TimeGranularity::Year);
        assert_eq!(TimeGranularity::Year.next(), TimeGranularity::Month);
    }

    #[test]
    fn test_granularity_period_keys() {
        let date = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
        assert_eq!(TimeGranularity::Year.period(&date), "2024");
        assert_eq!(TimeGranularity::Month.period(&date), "2024-03");
        assert_eq!(TimeGranularity::Day.period(&date), "2024-03-07");
    }

    #[test]
    fn test_sum_rows() {
        let rows = vec![
            AggregateRow {
                key: "a".into(),
                count: 3,
                total_size: 100,
                attachment_count: 1,
                attachment_size: 40,
                total_unique: 2,
            },
            AggregateRow {
                key: "b".into(),
                count: 2,
                total_size: 50,
                attachment_count: 0,
                attachment_size: 0,
                total_unique: 2,
            },
        ];
        let stats = TotalStats::sum_rows(&rows);
        assert_eq!(stats.message_count, 5);
        assert_eq!(stats.total_size, 150);
        assert_eq!(stats.attachment_count, 1);
        assert_eq!(stats.attachment_size, 40);
    }

    #[test]
    fn test_address_display() {
        let bare = Address {
            email: "a@example.com".into(),
            name: String::new(),
        };
        let named = Address {
            email: "a@example.com".into(),
            name: "Alice".into(),
        };
        assert_eq!(bare.to_string(), "a@example.com");
        assert_eq!(named.to_string(), "Alice <a@example.com>");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_display_lines_include_headers_attachments_and_body() {
        let detail = MessageDetail {
            subject: "Hello".into(),
            from: vec![Address {
                email: "a@example.com".into(),
                name: "Alice".into(),
            }],
            body_text: "line one\nline two".into(),
            attachments: vec![AttachmentInfo {
                filename: "a.pdf".into(),
                size: 2048,
                ..AttachmentInfo::default()
            }],
            ..MessageDetail::default()
        };
        let lines = detail.display_lines();
        assert_eq!(lines[0], "From: Alice <a@example.com>");
        assert!(lines.contains(&"Subject: Hello".to_string()));
        assert!(lines.contains(&"  a.pdf (2.0 KB)".to_string()));
        assert!(!lines.iter().any(|l| l.starts_with("Cc:")));
        assert_eq!(lines.last().map(String::as_str), Some("line two"));
    }
}
