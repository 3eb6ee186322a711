use crate::filter::DrillFilter;
use crate::query::{
    AggregateRow, MessageDetail, MessageSortField, MessageSummary, SortDirection, SortField,
    TimeGranularity, TotalStats, ViewDimension,
};
use crate::search::SearchMode;

/// Which screen is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewLevel {
    #[default]
    Aggregates,
    SubAggregate,
    MessageList,
    MessageDetail,
    ThreadView,
}

impl ViewLevel {
    pub fn is_aggregate(self) -> bool {
        matches!(self, ViewLevel::Aggregates | ViewLevel::SubAggregate)
    }
}

/// Loaded rows for a view. Kept apart from the navigation fields so a
/// breadcrumb can carry it or not.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewData {
    pub rows: Vec<AggregateRow>,
    pub messages: Vec<MessageSummary>,
    pub thread_messages: Vec<MessageSummary>,
    pub detail: Option<MessageDetail>,
}

/// Everything needed to draw and resume one view level
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewState {
    pub level: ViewLevel,
    pub dimension: ViewDimension,
    /// Dimension of the aggregate view this level was drilled from
    pub drill_dimension: Option<ViewDimension>,
    pub drill_filter: DrillFilter,
    /// Display key of the row last drilled into
    pub filter_key: String,
    /// Message list reached through "all messages" rather than a drill
    pub all_messages: bool,
    pub cursor: usize,
    pub scroll: usize,
    pub context_stats: Option<TotalStats>,
    pub search_query: String,
    pub sort_field: SortField,
    pub sort_direction: SortDirection,
    pub message_sort_field: MessageSortField,
    pub message_sort_direction: SortDirection,
    pub granularity: TimeGranularity,

    pub detail_index: usize,
    pub detail_from_thread: bool,
    pub detail_scroll: usize,
    /// Subject shown in the detail header while its body loads
    pub pending_subject: String,
    /// Find-in-message input, `Some` while it is open
    pub detail_search_input: Option<String>,
    pub detail_search_query: String,
    /// Display line numbers containing `detail_search_query`
    pub detail_search_matches: Vec<usize>,
    pub detail_search_match: usize,

    pub thread_conversation_id: i64,
    pub thread_cursor: usize,
    pub thread_scroll: usize,
    pub thread_truncated: bool,

    pub data: ViewData,
}

impl ViewState {
    /// Keeps `cursor` inside the page window of height `page_size`
    pub fn ensure_cursor_visible(&mut self, page_size: usize) {
        self.scroll = window_start(self.cursor, self.scroll, page_size);
    }

    pub fn ensure_thread_cursor_visible(&mut self, page_size: usize) {
        self.thread_scroll = window_start(self.thread_cursor, self.thread_scroll, page_size);
    }

    /// Number of rows in the list the cursor walks at this level
    pub fn list_len(&self) -> usize {
        match self.level {
            ViewLevel::Aggregates | ViewLevel::SubAggregate => self.data.rows.len(),
            ViewLevel::MessageList => self.data.messages.len(),
            ViewLevel::ThreadView => self.data.thread_messages.len(),
            ViewLevel::MessageDetail => 0,
        }
    }

    pub fn current_row(&self) -> Option<&AggregateRow> {
        self.data.rows.get(self.cursor)
    }

    pub fn current_message(&self) -> Option<&MessageSummary> {
        self.data.messages.get(self.cursor)
    }

    pub fn current_thread_message(&self) -> Option<&MessageSummary> {
        self.data.thread_messages.get(self.thread_cursor)
    }

    pub fn clear_detail_search(&mut self) {
        self.detail_search_input = None;
        self.detail_search_query.clear();
        self.detail_search_matches.clear();
        self.detail_search_match = 0;
    }

    /// Line of the current find-in-message match
    pub fn current_detail_match(&self) -> Option<usize> {
        if self.detail_search_query.is_empty() {
            return None;
        }
        self.detail_search_matches
            .get(self.detail_search_match)
            .copied()
    }
}

fn window_start(cursor: usize, scroll: usize, page_size: usize) -> usize {
    let page_size = page_size.max(1);
    if cursor < scroll {
        cursor
    } else if cursor >= scroll + page_size {
        cursor + 1 - page_size
    } else {
        scroll
    }
}

/// A saved view on the back stack.
///
/// `cached` is `None` when the view was still loading when it was left, in
/// which case restoring it means reloading. The search mode and total belong
/// to the cached results, so paging can resume after coming back.
#[derive(Debug, Clone, PartialEq)]
pub struct Breadcrumb {
    pub view: ViewState,
    pub cached: Option<ViewData>,
    pub search_mode: SearchMode,
    pub search_total: i64,
}

impl Breadcrumb {
    pub fn capture(state: &ViewState, reusable: bool) -> Self {
        let mut view = state.clone();
        let data = std::mem::take(&mut view.data);
        Self {
            view,
            cached: reusable.then_some(data),
            search_mode: SearchMode::default(),
            search_total: 0,
        }
    }

    pub fn with_search(mut self, mode: SearchMode, total: i64) -> Self {
        self.search_mode = mode;
        self.search_total = total;
        self
    }

    /// Returns the saved view and whether its data came back with it
    pub fn restore(self) -> (ViewState, bool) {
        let mut view = self.view;
        match self.cached {
            Some(data) => {
                view.data = data;
                (view, true)
            }
            None => (view, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_rows(n: usize) -> ViewState {
        let mut state = ViewState::default();
        state.data.rows = (0..n)
            .map(|i| AggregateRow {
                key: format!("k{i}"),
                count: 1,
                ..AggregateRow::default()
            })
            .collect();
        state
    }

    #[test]
    fn test_breadcrumb_round_trip_with_cache() {
        let mut state = state_with_rows(3);
        state.cursor = 2;
        state.scroll = 1;
        state
            .drill_filter
            .apply(ViewDimension::Domains, "example.com", TimeGranularity::Month);

        let (restored, cached) = Breadcrumb::capture(&state, true).restore();
        assert!(cached);
        assert_eq!(restored, state);
    }

    #[test]
    fn test_breadcrumb_without_cache_drops_data() {
        let state = state_with_rows(3);
        let crumb = Breadcrumb::capture(&state, false);
        assert!(crumb.cached.is_none());

        let (restored, cached) = crumb.restore();
        assert!(!cached);
        assert!(restored.data.rows.is_empty());
        assert_eq!(restored.level, state.level);
    }

    #[test]
    fn test_breadcrumb_carries_search_position() {
        let crumb = Breadcrumb::capture(&state_with_rows(1), true).with_search(SearchMode::Deep, -1);
        assert_eq!(crumb.search_mode, SearchMode::Deep);
        assert_eq!(crumb.search_total, -1);
    }

    #[test]
    fn test_current_detail_match_needs_query() {
        let mut state = ViewState::default();
        state.detail_search_matches = vec![3, 9];
        state.detail_search_match = 1;
        assert_eq!(state.current_detail_match(), None);

        state.detail_search_query = "x".into();
        assert_eq!(state.current_detail_match(), Some(9));

        state.clear_detail_search();
        assert!(state.detail_search_matches.is_empty());
        assert_eq!(state.current_detail_match(), None);
    }

    #[test]
    fn test_ensure_cursor_visible_scrolls_down_and_up() {
        let mut state = state_with_rows(30);
        state.cursor = 12;
        state.ensure_cursor_visible(10);
        assert_eq!(state.scroll, 3);

        state.cursor = 1;
        state.ensure_cursor_visible(10);
        assert_eq!(state.scroll, 1);

        state.cursor = 5;
        state.ensure_cursor_visible(10);
        assert_eq!(state.scroll, 1);
    }

    #[test]
    fn test_list_len_follows_level() {
        let mut state = state_with_rows(4);
        assert_eq!(state.list_len(), 4);
        state.level = ViewLevel::MessageList;
        assert_eq!(state.list_len(), 0);
    }
}
