//! Drill-down filter accumulation and selection sets

use std::collections::BTreeSet;

use crate::query::{TimeGranularity, ViewDimension};

/// A time bucket constraint
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TimeRange {
    /// "2024", "2024-01" or "2024-01-15"
    pub period: String,
    pub granularity: TimeGranularity,
}

/// Equality constraints accumulated by successive drill-downs.
///
/// A drill into an empty aggregate key ("no sender name recorded") leaves the
/// field unset and records the dimension in `empty_targets` instead.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DrillFilter {
    pub sender: Option<String>,
    pub sender_name: Option<String>,
    pub recipient: Option<String>,
    pub recipient_name: Option<String>,
    pub domain: Option<String>,
    pub label: Option<String>,
    pub time_range: Option<TimeRange>,
    /// Account scope, `None` for all accounts
    pub source_id: Option<i64>,
    pub attachments_only: bool,
    pub empty_targets: BTreeSet<ViewDimension>,
}

impl DrillFilter {
    /// A filter carrying only account and attachment scope
    pub fn scoped(source_id: Option<i64>, attachments_only: bool) -> Self {
        Self {
            source_id,
            attachments_only,
            ..Self::default()
        }
    }

    /// A scoped filter constrained by a single aggregate key
    pub fn for_key(
        dimension: ViewDimension,
        key: &str,
        granularity: TimeGranularity,
        source_id: Option<i64>,
    ) -> Self {
        let mut filter = Self::scoped(source_id, false);
        filter.apply(dimension, key, granularity);
        filter
    }

    fn field_mut(&mut self, dimension: ViewDimension) -> Option<&mut Option<String>> {
        match dimension {
            ViewDimension::Senders => Some(&mut self.sender),
            ViewDimension::SenderNames => Some(&mut self.sender_name),
            ViewDimension::Recipients => Some(&mut self.recipient),
            ViewDimension::RecipientNames => Some(&mut self.recipient_name),
            ViewDimension::Domains => Some(&mut self.domain),
            ViewDimension::Labels => Some(&mut self.label),
            ViewDimension::Time => None,
        }
    }

    /// The value constraining `dimension`, if any
    pub fn value(&self, dimension: ViewDimension) -> Option<&str> {
        match dimension {
            ViewDimension::Senders => self.sender.as_deref(),
            ViewDimension::SenderNames => self.sender_name.as_deref(),
            ViewDimension::Recipients => self.recipient.as_deref(),
            ViewDimension::RecipientNames => self.recipient_name.as_deref(),
            ViewDimension::Domains => self.domain.as_deref(),
            ViewDimension::Labels => self.label.as_deref(),
            ViewDimension::Time => self.time_range.as_ref().map(|t| t.period.as_str()),
        }
    }

    /// ANDs the constraint `dimension == key` onto the filter.
    ///
    /// Time keys take `granularity` as given; callers pass the granularity in
    /// effect at the moment of the drill.
    pub fn apply(&mut self, dimension: ViewDimension, key: &str, granularity: TimeGranularity) {
        if key.is_empty() {
            match self.field_mut(dimension) {
                Some(field) => *field = None,
                None => self.time_range = None,
            }
            self.empty_targets.insert(dimension);
            return;
        }

        self.empty_targets.remove(&dimension);
        match self.field_mut(dimension) {
            Some(field) => *field = Some(key.to_string()),
            None => {
                self.time_range = Some(TimeRange {
                    period: key.to_string(),
                    granularity,
                })
            }
        }
    }

    pub fn matches_empty(&self, dimension: ViewDimension) -> bool {
        self.empty_targets.contains(&dimension)
    }

    /// True when any drill constraint is set; account and attachment scope don't count
    pub fn is_constrained(&self) -> bool {
        ViewDimension::ALL
            .iter()
            .any(|d| self.value(*d).is_some())
            || !self.empty_targets.is_empty()
    }

    /// Compact label for headers, e.g. `sender:alice@example.com recipient:(empty)`
    pub fn describe(&self) -> String {
        let parts: Vec<String> = ViewDimension::ALL
            .iter()
            .filter_map(|d| {
                if let Some(v) = self.value(*d) {
                    Some(format!("{}:{}", d.field_name(), v))
                } else if self.matches_empty(*d) {
                    Some(format!("{}:(empty)", d.field_name()))
                } else {
                    None
                }
            })
            .collect();
        parts.join(" ")
    }
}

/// Rows the user has marked for a bulk action.
///
/// Aggregate keys are only meaningful for the dimension they were picked in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    pub aggregate_keys: BTreeSet<String>,
    pub aggregate_dimension: ViewDimension,
    pub message_ids: BTreeSet<i64>,
}

impl Selection {
    pub fn clear(&mut self) {
        self.aggregate_keys.clear();
        self.message_ids.clear();
    }

    /// Drops aggregate keys and binds the selection to a new dimension
    pub fn retag(&mut self, dimension: ViewDimension) {
        self.aggregate_keys.clear();
        self.aggregate_dimension = dimension;
    }

    pub fn toggle_aggregate(&mut self, dimension: ViewDimension, key: &str) {
        if self.aggregate_dimension != dimension {
            self.retag(dimension);
        }
        if !self.aggregate_keys.remove(key) {
            self.aggregate_keys.insert(key.to_string());
        }
    }

    pub fn toggle_message(&mut self, id: i64) {
        if !self.message_ids.remove(&id) {
            self.message_ids.insert(id);
        }
    }

    /// Adds every key in `keys`, keeping what was already picked under `dimension`
    pub fn select_aggregates<'a>(
        &mut self,
        dimension: ViewDimension,
        keys: impl IntoIterator<Item = &'a str>,
    ) {
        if self.aggregate_dimension != dimension {
            self.retag(dimension);
        }
        self.aggregate_keys
            .extend(keys.into_iter().map(str::to_string));
    }

    pub fn select_messages(&mut self, ids: impl IntoIterator<Item = i64>) {
        self.message_ids.extend(ids);
    }

    pub fn is_empty(&self) -> bool {
        self.aggregate_keys.is_empty() && self.message_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.aggregate_keys.len() + self.message_ids.len()
    }
}
