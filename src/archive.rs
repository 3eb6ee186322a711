//! In-memory [`QueryEngine`] over a JSON archive file.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::filter::DrillFilter;
use crate::message::{ArchivedMessage, assign_conversation_ids};
use crate::query::{
    AccountInfo, Address, AggregateOptions, AggregateRow, MessageDetail, MessageQuery,
    MessageSortField, MessageSummary, QueryEngine, QueryError, QueryResult, SortDirection,
    SortField, StatsOptions, TimeGranularity, TotalStats, ViewDimension,
};
use crate::search_syntax::{self, ParsedQuery};

/// On-disk archive layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveFile {
    #[serde(default)]
    pub accounts: Vec<AccountInfo>,
    pub messages: Vec<ArchivedMessage>,
}

/// Which message fields free-text terms are matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextScope {
    /// Subject and sender only
    Metadata,
    /// Subject, sender and body
    Full,
}

pub struct ArchiveEngine {
    accounts: Vec<AccountInfo>,
    messages: Vec<ArchivedMessage>,
}

impl ArchiveEngine {
    pub fn new(archive: ArchiveFile) -> Self {
        let mut messages = archive.messages;
        assign_conversation_ids(&mut messages);
        messages.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then(a.id.cmp(&b.id)));
        Self {
            accounts: archive.accounts,
            messages,
        }
    }

    pub fn open(path: &Path) -> QueryResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| QueryError::Io(format!("{}: {e}", path.display())))?;
        let archive: ArchiveFile =
            serde_json::from_str(&content).map_err(|e| QueryError::Parse(e.to_string()))?;
        info!(
            "loaded archive {} ({} messages, {} accounts)",
            path.display(),
            archive.messages.len(),
            archive.accounts.len()
        );
        Ok(Self::new(archive))
    }

    fn scoped<'a>(
        &'a self,
        source_id: Option<i64>,
        attachments_only: bool,
    ) -> impl Iterator<Item = &'a ArchivedMessage> + 'a {
        self.messages.iter().filter(move |m| {
            source_id.is_none_or(|id| m.source_id == id)
                && (!attachments_only || !m.attachments.is_empty())
        })
    }

    fn filtered<'a>(
        &'a self,
        filter: &'a DrillFilter,
    ) -> impl Iterator<Item = &'a ArchivedMessage> + 'a {
        self.scoped(filter.source_id, filter.attachments_only)
            .filter(move |m| matches_filter(m, filter))
    }

    fn aggregate_over<'a>(
        &self,
        messages: impl Iterator<Item = &'a ArchivedMessage>,
        dimension: ViewDimension,
        opts: &AggregateOptions,
    ) -> Vec<AggregateRow> {
        let search = opts
            .search_query
            .as_deref()
            .map(search_syntax::parse)
            .filter(|q| !q.is_empty());

        let mut buckets: HashMap<String, AggregateRow> = HashMap::new();
        for message in messages {
            if let Some(query) = &search
                && !matches_query(message, query, TextScope::Metadata)
            {
                continue;
            }
            for key in keys_for(message, dimension, opts.granularity) {
                let row = buckets.entry(key.clone()).or_insert_with(|| AggregateRow {
                    key,
                    ..AggregateRow::default()
                });
                row.count += 1;
                row.total_size += message.size_estimate;
                row.attachment_count += message.attachments.len() as i64;
                row.attachment_size += message.attachment_size();
            }
        }

        let mut rows: Vec<AggregateRow> = buckets.into_values().collect();
        rows.sort_by(|a, b| {
            let ord = match opts.sort_field {
                SortField::Count => a.count.cmp(&b.count),
                SortField::Size => a.total_size.cmp(&b.total_size),
                SortField::AttachmentSize => a.attachment_size.cmp(&b.attachment_size),
                SortField::Name => a.key.cmp(&b.key),
            };
            let ord = match opts.sort_direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            ord.then_with(|| a.key.cmp(&b.key))
        });

        let unique = rows.len() as i64;
        for row in &mut rows {
            row.total_unique = unique;
        }
        if opts.limit > 0 {
            rows.truncate(opts.limit);
        }
        rows
    }

    fn text_search<'a>(
        &self,
        candidates: impl Iterator<Item = &'a ArchivedMessage>,
        query: &str,
        scope: TextScope,
    ) -> Vec<&'a ArchivedMessage> {
        let parsed = search_syntax::parse(query);
        candidates
            .filter(|m| matches_query(m, &parsed, scope))
            .collect()
    }
}

fn page<T: Clone>(items: &[T], limit: usize, offset: usize) -> Vec<T> {
    let iter = items.iter().skip(offset).cloned();
    if limit == 0 {
        iter.collect()
    } else {
        iter.take(limit).collect()
    }
}

/// COALESCE(display name, email)
fn name_or_email(addr: &Address) -> &str {
    if addr.name.is_empty() {
        &addr.email
    } else {
        &addr.name
    }
}

fn keys_for(
    message: &ArchivedMessage,
    dimension: ViewDimension,
    granularity: TimeGranularity,
) -> Vec<String> {
    fn or_empty(keys: BTreeSet<String>) -> Vec<String> {
        if keys.is_empty() {
            vec![String::new()]
        } else {
            keys.into_iter().collect()
        }
    }

    match dimension {
        ViewDimension::Senders => vec![message.from.email.to_lowercase()],
        ViewDimension::SenderNames => vec![name_or_email(&message.from).to_string()],
        ViewDimension::Recipients => or_empty(
            message
                .recipients()
                .map(|a| a.email.to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        ),
        ViewDimension::RecipientNames => or_empty(
            message
                .recipients()
                .map(|a| name_or_email(a).to_string())
                .filter(|n| !n.is_empty())
                .collect(),
        ),
        ViewDimension::Domains => {
            if message.from.email.is_empty() {
                vec![String::new()]
            } else {
                vec![message.from_domain()]
            }
        }
        ViewDimension::Labels => or_empty(message.labels.iter().cloned().collect()),
        ViewDimension::Time => vec![granularity.period(&message.sent_at)],
    }
}

fn matches_dimension(
    message: &ArchivedMessage,
    dimension: ViewDimension,
    value: &str,
    granularity: TimeGranularity,
) -> bool {
    keys_for(message, dimension, granularity)
        .iter()
        .any(|k| k.eq_ignore_ascii_case(value))
}

fn matches_filter(message: &ArchivedMessage, filter: &DrillFilter) -> bool {
    ViewDimension::ALL.iter().all(|&dim| {
        let granularity = filter
            .time_range
            .as_ref()
            .map(|t| t.granularity)
            .unwrap_or_default();
        if filter.matches_empty(dim) {
            return matches_dimension(message, dim, "", granularity);
        }
        match filter.value(dim) {
            Some(value) => matches_dimension(message, dim, value, granularity),
            None => true,
        }
    })
}

fn matches_query(message: &ArchivedMessage, query: &ParsedQuery, scope: TextScope) -> bool {
    let contains = |haystack: &str, needle: &str| haystack.to_lowercase().contains(needle);

    let terms_ok = query.terms.iter().all(|term| {
        contains(&message.subject, term)
            || contains(&message.from.email, term)
            || contains(&message.from.name, term)
            || (scope == TextScope::Full && contains(&message.body_text, term))
    });
    let from_ok = query
        .from
        .iter()
        .all(|f| contains(&message.from.email, f) || contains(&message.from.name, f));
    let to_ok = query.to.iter().all(|t| {
        message
            .recipients()
            .any(|a| contains(&a.email, t) || contains(&a.name, t))
    });
    let subject_ok = query.subject.iter().all(|s| contains(&message.subject, s));
    let labels_ok = query
        .labels
        .iter()
        .all(|l| message.labels.iter().any(|ml| ml.to_lowercase() == *l));
    let attachment_ok = !query.has_attachment || !message.attachments.is_empty();
    let date = message.sent_at.date_naive();
    let after_ok = query.after.is_none_or(|d| date >= d);
    let before_ok = query.before.is_none_or(|d| date < d);

    terms_ok && from_ok && to_ok && subject_ok && labels_ok && attachment_ok && after_ok && before_ok
}

fn sort_messages(messages: &mut [MessageSummary], field: MessageSortField, direction: SortDirection) {
    messages.sort_by(|a, b| {
        let ord = match field {
            MessageSortField::Date => a.sent_at.cmp(&b.sent_at),
            MessageSortField::Size => a.size_estimate.cmp(&b.size_estimate),
            MessageSortField::Subject => a.subject.to_lowercase().cmp(&b.subject.to_lowercase()),
        };
        let ord = match direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord == Ordering::Equal {
            a.id.cmp(&b.id)
        } else {
            ord
        }
    });
}

impl QueryEngine for ArchiveEngine {
    fn aggregate(
        &self,
        dimension: ViewDimension,
        opts: &AggregateOptions,
    ) -> QueryResult<Vec<AggregateRow>> {
        debug!("aggregate by {dimension:?}");
        let scoped = self.scoped(opts.source_id, opts.attachments_only);
        Ok(self.aggregate_over(scoped, dimension, opts))
    }

    fn sub_aggregate(
        &self,
        filter: &DrillFilter,
        dimension: ViewDimension,
        opts: &AggregateOptions,
    ) -> QueryResult<Vec<AggregateRow>> {
        debug!("sub-aggregate by {dimension:?} within [{}]", filter.describe());
        Ok(self.aggregate_over(self.filtered(filter), dimension, opts))
    }

    fn list_messages(
        &self,
        filter: &DrillFilter,
        query: &MessageQuery,
    ) -> QueryResult<Vec<MessageSummary>> {
        let mut summaries: Vec<MessageSummary> = self
            .filtered(filter)
            .filter(|m| query.conversation_id.is_none_or(|c| m.conversation_id == c))
            .map(ArchivedMessage::summary)
            .collect();
        sort_messages(&mut summaries, query.sort_field, query.sort_direction);
        Ok(page(&summaries, query.limit, query.offset))
    }

    fn get_message(&self, id: i64) -> QueryResult<Option<MessageDetail>> {
        Ok(self
            .messages
            .iter()
            .find(|m| m.id == id)
            .map(ArchivedMessage::detail))
    }

    fn search(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> QueryResult<Vec<MessageSummary>> {
        let hits: Vec<MessageSummary> = self
            .text_search(self.messages.iter(), query, TextScope::Full)
            .into_iter()
            .map(ArchivedMessage::summary)
            .collect();
        Ok(page(&hits, limit, offset))
    }

    fn search_fast(
        &self,
        query: &str,
        filter: &DrillFilter,
        limit: usize,
        offset: usize,
    ) -> QueryResult<Vec<MessageSummary>> {
        let hits: Vec<MessageSummary> = self
            .text_search(self.filtered(filter), query, TextScope::Metadata)
            .into_iter()
            .map(ArchivedMessage::summary)
            .collect();
        Ok(page(&hits, limit, offset))
    }

    fn search_fast_count(&self, query: &str, filter: &DrillFilter) -> QueryResult<i64> {
        Ok(self
            .text_search(self.filtered(filter), query, TextScope::Metadata)
            .len() as i64)
    }

    fn source_message_ids(&self, filter: &DrillFilter) -> QueryResult<Vec<String>> {
        if !filter.is_constrained() {
            return Err(QueryError::Invalid(
                "refusing to resolve an unconstrained filter".to_string(),
            ));
        }
        Ok(self
            .filtered(filter)
            .map(|m| m.source_message_id.clone())
            .collect())
    }

    fn list_accounts(&self) -> QueryResult<Vec<AccountInfo>> {
        Ok(self.accounts.clone())
    }

    fn total_stats(&self, opts: &StatsOptions) -> QueryResult<TotalStats> {
        let search = opts
            .search_query
            .as_deref()
            .map(search_syntax::parse)
            .filter(|q| !q.is_empty());

        let mut stats = TotalStats::default();
        let mut labels = BTreeSet::new();
        for message in self.scoped(opts.source_id, opts.attachments_only) {
            if let Some(query) = &search {
                let hit = match opts.group_by {
                    Some(dim) => keys_for(message, dim, TimeGranularity::default())
                        .iter()
                        .any(|k| {
                            let k = k.to_lowercase();
                            query.terms.iter().all(|t| k.contains(t.as_str()))
                        }),
                    None => matches_query(message, query, TextScope::Metadata),
                };
                if !hit {
                    continue;
                }
            }
            stats.message_count += 1;
            stats.total_size += message.size_estimate;
            stats.attachment_count += message.attachments.len() as i64;
            stats.attachment_size += message.attachment_size();
            labels.extend(message.labels.iter().cloned());
        }
        stats.label_count = labels.len() as i64;
        stats.account_count = match opts.source_id {
            Some(_) => 1,
            None => self.accounts.len() as i64,
        };
        Ok(stats)
    }
}
