//! Inline search: debounced input, fast/deep modes, pre-search snapshot and pagination.
//!
//! Keystrokes never search directly. Each one bumps the debounce token and
//! schedules a tick carrying the token; a tick whose token is no longer live
//! is dropped when it arrives.

use tracing::debug;

use crate::app::{App, Effect};
use crate::fencing::LoadCategory;
use crate::filter::DrillFilter;
use crate::keys::Key;
use crate::query::{MessageSummary, QueryResult, TotalStats};
use crate::view_state::ViewLevel;

/// Fast mode fetches the next page once the cursor is this close to the end
pub const FAST_PAGINATION_THRESHOLD: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Metadata only, scoped to the drill filter
    #[default]
    Fast,
    /// Full text including bodies
    Deep,
}

impl SearchMode {
    pub fn toggle(self) -> Self {
        match self {
            SearchMode::Fast => SearchMode::Deep,
            SearchMode::Deep => SearchMode::Fast,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SearchMode::Fast => "Fast",
            SearchMode::Deep => "Deep",
        }
    }
}

/// Message list as it was before the search started
#[derive(Debug, Clone, PartialEq)]
pub struct PreSearchSnapshot {
    pub messages: Vec<MessageSummary>,
    pub cursor: usize,
    pub scroll: usize,
    pub context_stats: Option<TotalStats>,
}

/// One page of search to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub mode: SearchMode,
    pub filter: DrillFilter,
    pub limit: usize,
    pub offset: usize,
    pub append: bool,
}

/// A page of results. `total` is -1 while more pages may exist.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchPage {
    pub messages: Vec<MessageSummary>,
    pub total: i64,
}

#[derive(Debug, Clone, Default)]
pub struct SearchState {
    /// Input line is open and receiving keys
    pub active: bool,
    pub input: String,
    pub mode: SearchMode,
    pub debounce_token: u64,
    pub loading: bool,
    pub loading_more: bool,
    /// -1 unknown, 0 confirmed empty, >0 exact
    pub total: i64,
    /// Offset of the next page
    pub offset: usize,
    pub snapshot: Option<PreSearchSnapshot>,
}

impl SearchState {
    pub fn reset_results(&mut self) {
        self.loading = false;
        self.loading_more = false;
        self.total = 0;
        self.offset = 0;
    }

    /// Closes the input line and invalidates pending ticks. Totals are kept.
    pub fn close_input(&mut self) {
        self.active = false;
        self.input.clear();
        self.snapshot = None;
        self.loading = false;
        self.loading_more = false;
        self.debounce_token += 1;
    }

    /// Closes the input line and forgets everything but the mode
    pub fn reset(&mut self) {
        self.close_input();
        self.reset_results();
    }

    fn bump_token(&mut self) -> u64 {
        self.debounce_token += 1;
        self.debounce_token
    }
}

impl App {
    pub(crate) fn activate_search(&mut self) -> Vec<Effect> {
        if !matches!(
            self.view.level,
            ViewLevel::Aggregates | ViewLevel::SubAggregate | ViewLevel::MessageList
        ) {
            return Vec::new();
        }

        self.search.active = true;
        self.search.input = self.view.search_query.clone();
        if self.view.level == ViewLevel::MessageList
            && self.view.search_query.is_empty()
            && !self.loading
        {
            self.search.snapshot = Some(PreSearchSnapshot {
                messages: self.view.data.messages.clone(),
                cursor: self.view.cursor,
                scroll: self.view.scroll,
                context_stats: self.view.context_stats,
            });
        }
        Vec::new()
    }

    /// Keys while the input line is open
    pub(crate) fn handle_search_key(&mut self, key: Key) -> Vec<Effect> {
        match key {
            Key::Esc => self.cancel_search(),
            Key::Enter => self.commit_search(),
            Key::Tab => self.toggle_search_mode(),
            Key::Backspace => {
                self.search.input.pop();
                self.on_search_input_changed()
            }
            Key::Ctrl('u') => {
                self.search.input.clear();
                self.on_search_input_changed()
            }
            Key::Char(c) => {
                self.search.input.push(c);
                self.on_search_input_changed()
            }
            _ => Vec::new(),
        }
    }

    fn on_search_input_changed(&mut self) -> Vec<Effect> {
        let token = self.search.bump_token();
        self.search.loading = !self.search.input.trim().is_empty();
        let delay = match self.search.mode {
            SearchMode::Fast => self.tuning.fast_debounce,
            SearchMode::Deep => self.tuning.deep_debounce,
        };
        vec![Effect::SearchTick {
            delay,
            query: self.search.input.clone(),
            token,
        }]
    }

    pub(crate) fn on_search_tick(&mut self, query: String, token: u64) -> Vec<Effect> {
        if token != self.search.debounce_token {
            debug!(
                "dropping stale search tick {token} (live {})",
                self.search.debounce_token
            );
            return Vec::new();
        }
        self.apply_search_query(query.trim())
    }

    fn apply_search_query(&mut self, query: &str) -> Vec<Effect> {
        self.view.search_query = query.to_string();
        match self.view.level {
            ViewLevel::MessageList => {
                if query.is_empty() {
                    return self.clear_message_search(true);
                }
                self.search.reset_results();
                self.issue_search(0, false)
            }
            ViewLevel::Aggregates | ViewLevel::SubAggregate => {
                self.search.loading = false;
                if query.is_empty() && self.view.level == ViewLevel::Aggregates {
                    self.view.context_stats = None;
                }
                self.load_aggregates()
            }
            _ => Vec::new(),
        }
    }

    fn toggle_search_mode(&mut self) -> Vec<Effect> {
        if self.view.level != ViewLevel::MessageList {
            return Vec::new();
        }
        self.search.mode = self.search.mode.toggle();
        self.search.bump_token();
        debug!("search mode now {}", self.search.mode.label());

        let query = self.search.input.trim().to_string();
        if query.is_empty() {
            return Vec::new();
        }
        self.view.search_query = query;
        self.search.reset_results();
        self.issue_search(0, false)
    }

    fn commit_search(&mut self) -> Vec<Effect> {
        let query = self.search.input.trim().to_string();
        if query.is_empty() {
            return self.cancel_search();
        }

        self.search.active = false;
        self.search.snapshot = None;
        self.search.bump_token();

        match self.view.level {
            ViewLevel::MessageList => {
                self.view.search_query = query;
                self.search.reset_results();
                self.issue_search(0, false)
            }
            ViewLevel::Aggregates | ViewLevel::SubAggregate => {
                self.search.loading = false;
                if self.view.search_query == query {
                    return Vec::new();
                }
                self.view.search_query = query;
                self.load_aggregates()
            }
            _ => Vec::new(),
        }
    }

    pub(crate) fn cancel_search(&mut self) -> Vec<Effect> {
        self.search.active = false;
        self.search.input.clear();
        self.search.bump_token();

        if self.view.level == ViewLevel::MessageList && self.search.snapshot.is_some() {
            let effects = self.clear_message_search(false);
            self.search.snapshot = None;
            return effects;
        }
        self.search.snapshot = None;
        self.search.reset_results();

        if self.view.search_query.is_empty() {
            return Vec::new();
        }
        self.view.search_query.clear();
        match self.view.level {
            ViewLevel::MessageList => self.load_messages(),
            ViewLevel::Aggregates | ViewLevel::SubAggregate => {
                if self.view.level == ViewLevel::Aggregates {
                    self.view.context_stats = None;
                }
                self.load_aggregates()
            }
            _ => Vec::new(),
        }
    }

    /// Drops the query at MessageList, restoring the snapshot when there is one.
    /// With `keep_snapshot` the snapshot stays for a later cancel.
    fn clear_message_search(&mut self, keep_snapshot: bool) -> Vec<Effect> {
        self.view.search_query.clear();
        self.search.reset_results();

        let snapshot = if keep_snapshot {
            self.search.snapshot.clone()
        } else {
            self.search.snapshot.take()
        };
        match snapshot {
            Some(snapshot) => {
                self.view.data.messages = snapshot.messages;
                self.view.cursor = snapshot.cursor;
                self.view.scroll = snapshot.scroll;
                self.view.context_stats = snapshot.context_stats;
                Vec::new()
            }
            None => self.load_messages(),
        }
    }

    /// Filter a message-list search runs under
    fn search_filter(&self) -> DrillFilter {
        let mut filter = self.view.drill_filter.clone();
        filter.source_id = self.account_filter;
        filter.attachments_only = self.attachments_only;
        filter
    }

    pub(crate) fn issue_search(&mut self, offset: usize, append: bool) -> Vec<Effect> {
        let request_id = self.ledger.next(LoadCategory::Search);
        if append {
            self.search.loading_more = true;
        } else {
            self.search.loading = true;
        }
        debug!(
            "search #{request_id} {:?} offset {offset} ({})",
            self.view.search_query,
            self.search.mode.label()
        );
        vec![Effect::Search {
            request_id,
            request: SearchRequest {
                query: self.view.search_query.clone(),
                mode: self.search.mode,
                filter: self.search_filter(),
                limit: self.tuning.search_page_size,
                offset,
                append,
            },
        }]
    }

    pub(crate) fn on_search_loaded(
        &mut self,
        request_id: u64,
        append: bool,
        result: QueryResult<SearchPage>,
    ) -> Vec<Effect> {
        if !self.ledger.is_current(LoadCategory::Search, request_id)
            || self.view.level != ViewLevel::MessageList
            || self.view.search_query.is_empty()
        {
            debug!("dropping stale search result #{request_id}");
            return Vec::new();
        }

        self.search.loading = false;
        self.search.loading_more = false;
        let page = match result {
            Ok(page) => page,
            Err(e) => {
                self.error = Some(e.to_string());
                return Vec::new();
            }
        };
        self.error = None;

        if append {
            self.view.data.messages.extend(page.messages);
        } else {
            self.view.data.messages = page.messages;
            self.view.cursor = 0;
            self.view.scroll = 0;
        }
        self.search.offset = self.view.data.messages.len();
        self.search.total = page.total;

        let loaded = self.view.data.messages.len() as i64;
        let count = self.search.total.max(loaded);
        let stats = match self.view.context_stats {
            Some(mut stats)
                if count > 0 && (stats.total_size > 0 || stats.attachment_count > 0) =>
            {
                stats.message_count = count;
                stats
            }
            _ => TotalStats {
                message_count: count,
                ..TotalStats::default()
            },
        };
        self.view.context_stats = Some(stats);
        Vec::new()
    }

    /// Fast mode: fetch the next page when the cursor nears the end of loaded results
    pub(crate) fn maybe_load_more(&mut self) -> Vec<Effect> {
        if self.view.level != ViewLevel::MessageList
            || self.view.search_query.is_empty()
            || self.search.mode != SearchMode::Fast
            || self.search.loading
            || self.search.loading_more
        {
            return Vec::new();
        }
        let loaded = self.view.data.messages.len();
        if self.search.total > loaded as i64
            && self.view.cursor + FAST_PAGINATION_THRESHOLD >= loaded
        {
            return self.issue_search(self.search.offset, true);
        }
        Vec::new()
    }

    /// Deep mode: an explicit page-down at the last row fetches the next page
    pub(crate) fn load_more_deep(&mut self) -> Vec<Effect> {
        if self.view.level != ViewLevel::MessageList
            || self.view.search_query.is_empty()
            || self.search.mode != SearchMode::Deep
            || self.search.total != -1
            || self.search.loading_more
        {
            return Vec::new();
        }
        let loaded = self.view.data.messages.len();
        if loaded == 0 || self.view.cursor + 1 < loaded {
            return Vec::new();
        }
        self.issue_search(self.search.offset, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppEvent;
    use crate::config::Tuning;
    use crate::query::QueryError;
    use std::time::Duration;

    fn summary(id: i64) -> MessageSummary {
        MessageSummary {
            id,
            subject: format!("message {id}"),
            ..MessageSummary::default()
        }
    }

    fn list_app(n: i64) -> App {
        let mut app = App::new(Tuning::default());
        app.view.level = ViewLevel::MessageList;
        app.view.data.messages = (1..=n).map(summary).collect();
        app.view.context_stats = Some(TotalStats {
            message_count: n,
            total_size: 1000,
            ..TotalStats::default()
        });
        app
    }

    fn type_text(app: &mut App, text: &str) -> Vec<Effect> {
        let mut effects = Vec::new();
        for c in text.chars() {
            effects = app.update(AppEvent::Key(Key::Char(c)));
        }
        effects
    }

    fn tick_of(effects: &[Effect]) -> (String, u64, Duration) {
        match effects.first() {
            Some(Effect::SearchTick {
                query,
                token,
                delay,
            }) => (query.clone(), *token, *delay),
            other => panic!("expected a search tick, got {other:?}"),
        }
    }

    fn search_of(effects: &[Effect]) -> (u64, SearchRequest) {
        match effects.first() {
            Some(Effect::Search {
                request_id,
                request,
            }) => (*request_id, request.clone()),
            other => panic!("expected a search, got {other:?}"),
        }
    }

    #[test]
    fn test_keystroke_schedules_tick_with_mode_delay() {
        let mut app = list_app(3);
        app.update(AppEvent::Key(Key::Char('/')));
        assert!(app.search.active);

        let (query, token, delay) = tick_of(&type_text(&mut app, "inv"));
        assert_eq!(query, "inv");
        assert_eq!(token, app.search.debounce_token);
        assert_eq!(delay, app.tuning.fast_debounce);
        assert!(app.search.loading);
    }

    #[test]
    fn test_stale_tick_is_discarded() {
        let mut app = list_app(3);
        app.update(AppEvent::Key(Key::Char('/')));
        let (query, stale_token, _) = tick_of(&type_text(&mut app, "a"));
        type_text(&mut app, "b");

        let effects = app.update(AppEvent::SearchTick {
            query,
            token: stale_token,
        });
        assert!(effects.is_empty());
        assert!(app.view.search_query.is_empty());
        assert_eq!(app.ledger.current(LoadCategory::Search), 0);
    }

    #[test]
    fn test_live_tick_issues_fenced_search() {
        let mut app = list_app(3);
        app.view
            .drill_filter
            .apply(crate::query::ViewDimension::Senders, "a@x.com", Default::default());
        app.update(AppEvent::Key(Key::Char('/')));
        let (query, token, _) = tick_of(&type_text(&mut app, "report"));

        let effects = app.update(AppEvent::SearchTick { query, token });
        let (request_id, request) = search_of(&effects);
        assert_eq!(request_id, 1);
        assert_eq!(request.query, "report");
        assert_eq!(request.offset, 0);
        assert!(!request.append);
        assert_eq!(request.filter.sender.as_deref(), Some("a@x.com"));
        assert_eq!(app.view.search_query, "report");
    }

    #[test]
    fn test_deep_mode_uses_longer_delay() {
        let mut app = list_app(1);
        app.update(AppEvent::Key(Key::Char('/')));
        app.update(AppEvent::Key(Key::Tab));
        assert_eq!(app.search.mode, SearchMode::Deep);

        let (_, _, delay) = tick_of(&type_text(&mut app, "x"));
        assert_eq!(delay, app.tuning.deep_debounce);
    }

    #[test]
    fn test_mode_toggle_invalidates_tick_and_searches_now() {
        let mut app = list_app(1);
        app.update(AppEvent::Key(Key::Char('/')));
        let (query, token, _) = tick_of(&type_text(&mut app, "q3"));

        let effects = app.update(AppEvent::Key(Key::Tab));
        let (_, request) = search_of(&effects);
        assert_eq!(request.mode, SearchMode::Deep);
        assert_eq!(request.query, "q3");

        assert!(app.update(AppEvent::SearchTick { query, token }).is_empty());
    }

    #[test]
    fn test_mode_toggle_only_at_message_list() {
        let mut app = App::new(Tuning::default());
        app.update(AppEvent::Key(Key::Char('/')));
        app.update(AppEvent::Key(Key::Tab));
        assert_eq!(app.search.mode, SearchMode::Fast);
    }

    #[test]
    fn test_cancel_restores_snapshot_deep_copy() {
        let mut app = list_app(5);
        app.view.cursor = 3;
        app.view.scroll = 1;
        app.update(AppEvent::Key(Key::Char('/')));

        let before = app.view.context_stats;
        if let Some(stats) = app.view.context_stats.as_mut() {
            stats.message_count = 999;
            stats.total_size = 1;
        }
        app.view.data.messages.truncate(1);
        app.view.cursor = 0;

        let effects = app.update(AppEvent::Key(Key::Esc));
        assert!(effects.is_empty());
        assert_eq!(app.view.context_stats, before);
        assert_eq!(app.view.data.messages.len(), 5);
        assert_eq!(app.view.cursor, 3);
        assert_eq!(app.view.scroll, 1);
        assert!(app.search.snapshot.is_none());
        assert_eq!(app.search.offset, 0);
    }

    #[test]
    fn test_cancel_without_snapshot_reloads() {
        let mut app = list_app(2);
        app.view.search_query = "old".to_string();
        app.update(AppEvent::Key(Key::Char('/')));
        assert!(app.search.snapshot.is_none());

        let effects = app.update(AppEvent::Key(Key::Esc));
        assert!(matches!(effects.first(), Some(Effect::LoadMessages { .. })));
        assert!(app.view.search_query.is_empty());
    }

    #[test]
    fn test_commit_discards_snapshot() {
        let mut app = list_app(2);
        app.update(AppEvent::Key(Key::Char('/')));
        type_text(&mut app, "abc");

        let effects = app.update(AppEvent::Key(Key::Enter));
        let (_, request) = search_of(&effects);
        assert_eq!(request.query, "abc");
        assert!(!app.search.active);
        assert!(app.search.snapshot.is_none());
    }

    #[test]
    fn test_commit_empty_behaves_like_cancel() {
        let mut app = list_app(4);
        app.view.cursor = 2;
        app.update(AppEvent::Key(Key::Char('/')));
        let effects = app.update(AppEvent::Key(Key::Enter));
        assert!(effects.is_empty());
        assert!(!app.search.active);
        assert_eq!(app.view.cursor, 2);
    }

    #[test]
    fn test_backspace_to_empty_restores_list() {
        let mut app = list_app(3);
        app.update(AppEvent::Key(Key::Char('/')));
        let (query, token, _) = tick_of(&type_text(&mut app, "z"));
        let effects = app.update(AppEvent::SearchTick { query, token });
        let (request_id, _) = search_of(&effects);
        app.update(AppEvent::SearchLoaded {
            request_id,
            append: false,
            result: Ok(SearchPage {
                messages: vec![summary(9)],
                total: 1,
            }),
        });
        assert_eq!(app.view.data.messages.len(), 1);

        let (query, token, _) = tick_of(&app.update(AppEvent::Key(Key::Backspace)));
        assert!(app.update(AppEvent::SearchTick { query, token }).is_empty());
        assert_eq!(app.view.data.messages.len(), 3);
        assert!(app.search.snapshot.is_some());
    }

    #[test]
    fn test_results_replace_then_append() {
        let mut app = list_app(0);
        app.view.context_stats = None;
        app.view.search_query = "x".to_string();
        let effects = app.issue_search(0, false);
        let (request_id, _) = search_of(&effects);

        app.update(AppEvent::SearchLoaded {
            request_id,
            append: false,
            result: Ok(SearchPage {
                messages: (1..=100).map(summary).collect(),
                total: 250,
            }),
        });
        assert_eq!(app.view.data.messages.len(), 100);
        assert_eq!(app.search.offset, 100);
        assert_eq!(app.view.context_stats.map(|s| s.message_count), Some(250));

        app.view.cursor = 85;
        let effects = app.maybe_load_more();
        let (request_id, request) = search_of(&effects);
        assert_eq!(request.offset, 100);
        assert!(request.append);

        app.update(AppEvent::SearchLoaded {
            request_id,
            append: true,
            result: Ok(SearchPage {
                messages: (101..=200).map(summary).collect(),
                total: 250,
            }),
        });
        assert_eq!(app.view.data.messages.len(), 200);
        assert_eq!(app.view.cursor, 85);
        assert_eq!(app.search.offset, 200);
    }

    #[test]
    fn test_fast_pagination_waits_for_threshold() {
        let mut app = list_app(100);
        app.view.search_query = "x".to_string();
        app.search.total = 300;
        app.search.offset = 100;
        app.view.cursor = 10;
        assert!(app.maybe_load_more().is_empty());
    }

    #[test]
    fn test_deep_pagination_only_at_last_row_with_unknown_total() {
        let mut app = list_app(100);
        app.view.search_query = "x".to_string();
        app.search.mode = SearchMode::Deep;
        app.search.total = -1;
        app.search.offset = 100;

        app.view.cursor = 50;
        assert!(app.load_more_deep().is_empty());

        app.view.cursor = 99;
        let (_, request) = search_of(&app.load_more_deep());
        assert_eq!(request.offset, 100);
        assert!(request.append);

        app.search.loading_more = false;
        app.search.total = 100;
        assert!(app.load_more_deep().is_empty());
    }

    #[test]
    fn test_unknown_total_counts_loaded_rows() {
        let mut app = list_app(0);
        app.view.search_query = "x".to_string();
        let (request_id, _) = search_of(&app.issue_search(0, false));
        app.update(AppEvent::SearchLoaded {
            request_id,
            append: false,
            result: Ok(SearchPage {
                messages: (1..=100).map(summary).collect(),
                total: -1,
            }),
        });
        let stats = app.view.context_stats.unwrap();
        assert_eq!(stats.message_count, 100);
        // Drill-down byte totals survive a search
        assert_eq!(stats.total_size, 1000);
    }

    #[test]
    fn test_zero_results_reset_context_stats() {
        let mut app = list_app(3);
        app.view.search_query = "nothing".to_string();
        let (request_id, _) = search_of(&app.issue_search(0, false));
        app.update(AppEvent::SearchLoaded {
            request_id,
            append: false,
            result: Ok(SearchPage::default()),
        });
        assert_eq!(app.view.context_stats, Some(TotalStats::default()));
        assert!(app.view.data.messages.is_empty());
    }

    #[test]
    fn test_stale_search_result_ignored() {
        let mut app = list_app(2);
        app.view.search_query = "x".to_string();
        let (old_id, _) = search_of(&app.issue_search(0, false));
        app.issue_search(0, false);

        app.update(AppEvent::SearchLoaded {
            request_id: old_id,
            append: false,
            result: Ok(SearchPage {
                messages: vec![summary(42)],
                total: 1,
            }),
        });
        assert_eq!(app.view.data.messages.len(), 2);
        assert!(app.search.loading);
    }

    #[test]
    fn test_search_error_sets_error_field() {
        let mut app = list_app(2);
        app.view.search_query = "x".to_string();
        let (request_id, _) = search_of(&app.issue_search(0, false));
        app.update(AppEvent::SearchLoaded {
            request_id,
            append: false,
            result: Err(QueryError::Invalid("bad".into())),
        });
        assert_eq!(app.error.as_deref(), Some("invalid query: bad"));
        assert_eq!(app.view.data.messages.len(), 2);
    }

    #[test]
    fn test_aggregate_level_search_reloads_aggregates() {
        let mut app = App::new(Tuning::default());
        app.update(AppEvent::Key(Key::Char('/')));
        let (query, token, _) = tick_of(&type_text(&mut app, "alice"));
        let effects = app.update(AppEvent::SearchTick { query, token });
        match effects.first() {
            Some(Effect::LoadAggregates { options, .. }) => {
                assert_eq!(options.search_query.as_deref(), Some("alice"));
            }
            other => panic!("expected aggregate reload, got {other:?}"),
        }

        // Committing the same query does not reload again
        assert!(app.update(AppEvent::Key(Key::Enter)).is_empty());
        assert!(!app.search.active);
    }
}
