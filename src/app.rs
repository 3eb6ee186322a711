use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Tuning;
use crate::deletion::{DeletionError, Manifest, StageRequest, StagedDeletion};
use crate::export::{ExportError, ExportReport};
use crate::fencing::{LoadCategory, RequestLedger};
use crate::filter::{DrillFilter, Selection};
use crate::keys::Key;
use crate::query::{
    AccountInfo, AggregateOptions, AggregateRow, AttachmentInfo, MessageDetail, MessageQuery,
    MessageSortField, MessageSummary, QueryResult, SortDirection, StatsOptions, TotalStats,
    ViewDimension,
};
use crate::search::{SearchPage, SearchRequest, SearchState};
use crate::view_state::{Breadcrumb, ViewLevel, ViewState};

/// Warning indicator character for messages
pub const WARNING_CHAR: char = '⚠';

pub const NO_SELECTION_MESSAGE: &str =
    "No messages selected. Use Space to select, S for all visible.";

/// Rows taken by the header, stats line, borders and the bottom bar
const CHROME_HEIGHT: u16 = 5;

/// Overlay currently owning the keyboard
#[derive(Debug, Clone, PartialEq)]
pub enum Modal {
    Help,
    QuitConfirm,
    /// Cursor 0 is "All accounts", then one row per account
    AccountSelector { cursor: usize },
    /// Cursor 0 is "All messages", 1 is "Only with attachments"
    AttachmentFilter { cursor: usize },
    DeleteConfirm(StagedDeletion),
    ExportAttachments {
        cursor: usize,
        selected: BTreeSet<usize>,
    },
}

impl Modal {
    /// Body lines for confirm-style modals
    pub fn message(&self) -> Vec<String> {
        match self {
            Modal::QuitConfirm => vec!["Quit vaultterm?".to_string(), "(y/n)".to_string()],
            Modal::DeleteConfirm(staged) => {
                let mut lines = vec![
                    format!(
                        "Stage {} message(s) for deletion?",
                        staged.manifest.message_count()
                    ),
                    format!("Batch: {}", staged.manifest.description),
                ];
                if let Some(warning) = &staged.warning {
                    lines.push(warning.clone());
                }
                lines.push(String::new());
                lines.push("(y/n)".to_string());
                lines
            }
            _ => Vec::new(),
        }
    }
}

/// Asynchronous work requested by a transition. The runtime executes these
/// and reports back with an [`AppEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// `filter` is set for sub-aggregates
    LoadAggregates {
        request_id: u64,
        dimension: ViewDimension,
        filter: Option<DrillFilter>,
        options: AggregateOptions,
    },
    LoadMessages {
        request_id: u64,
        filter: DrillFilter,
        query: MessageQuery,
    },
    LoadThread {
        request_id: u64,
        filter: DrillFilter,
        query: MessageQuery,
    },
    LoadDetail {
        request_id: u64,
        message_id: i64,
    },
    Search {
        request_id: u64,
        request: SearchRequest,
    },
    SearchTick {
        delay: Duration,
        query: String,
        token: u64,
    },
    LoadStats(StatsOptions),
    LoadAccounts,
    ExpireFlash {
        delay: Duration,
        generation: u64,
    },
    BuildManifest(StageRequest),
    SaveManifest(Manifest),
    ExportAttachments {
        subject: String,
        message_id: i64,
        attachments: Vec<AttachmentInfo>,
    },
    Quit,
}

/// Everything that can drive a transition
#[derive(Debug)]
pub enum AppEvent {
    Key(Key),
    Resize {
        height: u16,
    },
    AggregatesLoaded {
        request_id: u64,
        result: QueryResult<Vec<AggregateRow>>,
    },
    MessagesLoaded {
        request_id: u64,
        result: QueryResult<Vec<MessageSummary>>,
    },
    ThreadLoaded {
        request_id: u64,
        result: QueryResult<Vec<MessageSummary>>,
    },
    DetailLoaded {
        request_id: u64,
        result: QueryResult<Option<MessageDetail>>,
    },
    SearchLoaded {
        request_id: u64,
        append: bool,
        result: QueryResult<SearchPage>,
    },
    SearchTick {
        query: String,
        token: u64,
    },
    FlashExpired {
        generation: u64,
    },
    StatsLoaded(QueryResult<TotalStats>),
    AccountsLoaded(QueryResult<Vec<AccountInfo>>),
    ManifestBuilt(Result<StagedDeletion, DeletionError>),
    /// Batch id and message count of the saved manifest
    ManifestSaved(Result<(String, usize), DeletionError>),
    ExportFinished(Result<ExportReport, ExportError>),
}

/// The navigation state machine.
///
/// All state changes go through [`App::update`]; nothing else mutates the
/// current view or the breadcrumb stack.
#[derive(Debug)]
pub struct App {
    pub view: ViewState,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub ledger: RequestLedger,
    pub selection: Selection,
    pub search: SearchState,
    pub accounts: Vec<AccountInfo>,
    /// Account scope, `None` for all accounts
    pub account_filter: Option<i64>,
    pub attachments_only: bool,
    /// Archive-wide stats for the header
    pub stats: Option<TotalStats>,
    pub loading: bool,
    /// Blocking operation in progress (staging, export)
    pub busy: Option<String>,
    pub error: Option<String>,
    pub flash: Option<String>,
    flash_generation: u64,
    pub modal: Option<Modal>,
    /// Rows visible in list views
    pub page_size: usize,
    pub detail_line_count: usize,
    pub tuning: Tuning,
    pub quitting: bool,
}

impl App {
    pub fn new(tuning: Tuning) -> Self {
        Self {
            view: ViewState::default(),
            breadcrumbs: Vec::new(),
            ledger: RequestLedger::new(),
            selection: Selection::default(),
            search: SearchState::default(),
            accounts: Vec::new(),
            account_filter: None,
            attachments_only: false,
            stats: None,
            loading: false,
            busy: None,
            error: None,
            flash: None,
            flash_generation: 0,
            modal: None,
            page_size: 20,
            detail_line_count: 0,
            tuning,
            quitting: false,
        }
    }

    /// Initial loads
    pub fn start(&mut self) -> Vec<Effect> {
        let mut effects = vec![Effect::LoadAccounts, self.stats_effect()];
        effects.extend(self.load_aggregates());
        effects
    }

    pub fn update(&mut self, event: AppEvent) -> Vec<Effect> {
        match event {
            AppEvent::Key(key) => self.handle_key(key),
            AppEvent::Resize { height } => {
                self.resize(height);
                Vec::new()
            }
            AppEvent::AggregatesLoaded { request_id, result } => {
                self.on_aggregates_loaded(request_id, result)
            }
            AppEvent::MessagesLoaded { request_id, result } => {
                self.on_messages_loaded(request_id, result)
            }
            AppEvent::ThreadLoaded { request_id, result } => {
                self.on_thread_loaded(request_id, result)
            }
            AppEvent::DetailLoaded { request_id, result } => {
                self.on_detail_loaded(request_id, result)
            }
            AppEvent::SearchLoaded {
                request_id,
                append,
                result,
            } => self.on_search_loaded(request_id, append, result),
            AppEvent::SearchTick { query, token } => self.on_search_tick(query, token),
            AppEvent::FlashExpired { generation } => {
                if generation == self.flash_generation {
                    self.flash = None;
                }
                Vec::new()
            }
            AppEvent::StatsLoaded(result) => {
                match result {
                    Ok(stats) => self.stats = Some(stats),
                    Err(e) => warn!("stats load failed: {e}"),
                }
                Vec::new()
            }
            AppEvent::AccountsLoaded(result) => {
                match result {
                    Ok(accounts) => self.accounts = accounts,
                    Err(e) => self.error = Some(e.to_string()),
                }
                Vec::new()
            }
            AppEvent::ManifestBuilt(result) => self.on_manifest_built(result),
            AppEvent::ManifestSaved(result) => self.on_manifest_saved(result),
            AppEvent::ExportFinished(result) => {
                self.busy = None;
                match result {
                    Ok(report) => {
                        info!("exported {} attachments to {:?}", report.exported, report.dir);
                        self.flash(report.summary())
                    }
                    Err(e) => self.flash(format!("Export failed: {e}")),
                }
            }
        }
    }

    pub fn resize(&mut self, height: u16) {
        self.page_size = height.saturating_sub(CHROME_HEIGHT).max(1) as usize;
        self.view.ensure_cursor_visible(self.page_size);
        self.view.ensure_thread_cursor_visible(self.page_size);
        self.view.detail_scroll = self.view.detail_scroll.min(self.max_detail_scroll());
    }

    pub fn detail_page_size(&self) -> usize {
        self.page_size + 2
    }

    fn max_detail_scroll(&self) -> usize {
        self.detail_line_count
            .saturating_sub(self.detail_page_size())
    }

    /// Shows a transient notice; older expiry timers leave a newer notice alone
    pub fn flash(&mut self, message: impl Into<String>) -> Vec<Effect> {
        self.flash = Some(message.into());
        self.flash_generation += 1;
        vec![Effect::ExpireFlash {
            delay: self.tuning.flash_duration,
            generation: self.flash_generation,
        }]
    }

    /// Path of views from the top, e.g. `Senders › alice@example.com › Recipients`
    pub fn breadcrumb_path(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        let views = self
            .breadcrumbs
            .iter()
            .map(|c| &c.view)
            .chain(std::iter::once(&self.view));
        for view in views {
            let part = match view.level {
                ViewLevel::Aggregates | ViewLevel::SubAggregate => view.dimension.label().to_string(),
                ViewLevel::MessageList if view.all_messages => "All messages".to_string(),
                ViewLevel::MessageList if view.filter_key.is_empty() => "(empty)".to_string(),
                ViewLevel::MessageList => view.filter_key.clone(),
                ViewLevel::MessageDetail => "Message".to_string(),
                ViewLevel::ThreadView => "Thread".to_string(),
            };
            if parts.last() != Some(&part) {
                parts.push(part);
            }
        }
        parts.join(" › ")
    }

    // Loads

    pub(crate) fn stats_effect(&self) -> Effect {
        Effect::LoadStats(StatsOptions {
            source_id: self.account_filter,
            attachments_only: self.attachments_only,
            ..StatsOptions::default()
        })
    }

    fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            source_id: self.account_filter,
            sort_field: self.view.sort_field,
            sort_direction: self.view.sort_direction,
            limit: self.tuning.aggregate_limit,
            granularity: self.view.granularity,
            attachments_only: self.attachments_only,
            search_query: (!self.view.search_query.is_empty())
                .then(|| self.view.search_query.clone()),
        }
    }

    /// Reloads whatever the current level displays
    pub(crate) fn load_data(&mut self) -> Vec<Effect> {
        match self.view.level {
            ViewLevel::Aggregates | ViewLevel::SubAggregate => self.load_aggregates(),
            ViewLevel::MessageList if !self.view.search_query.is_empty() => {
                self.search.reset_results();
                self.issue_search(0, false)
            }
            ViewLevel::MessageList => self.load_messages(),
            ViewLevel::ThreadView => self.load_thread(),
            ViewLevel::MessageDetail => {
                let list = if self.view.detail_from_thread {
                    &self.view.data.thread_messages
                } else {
                    &self.view.data.messages
                };
                match list.get(self.view.detail_index).map(|m| m.id) {
                    Some(id) => self.load_detail(id),
                    None => Vec::new(),
                }
            }
        }
    }

    pub(crate) fn load_aggregates(&mut self) -> Vec<Effect> {
        let request_id = self.ledger.next(LoadCategory::Aggregate);
        self.loading = true;
        let filter = (self.view.level == ViewLevel::SubAggregate)
            .then(|| self.view.drill_filter.clone());
        debug!(
            "aggregate #{request_id} by {} (sub: {})",
            self.view.dimension,
            filter.is_some()
        );
        vec![Effect::LoadAggregates {
            request_id,
            dimension: self.view.dimension,
            filter,
            options: self.aggregate_options(),
        }]
    }

    pub(crate) fn load_messages(&mut self) -> Vec<Effect> {
        let request_id = self.ledger.next(LoadCategory::Messages);
        self.loading = true;
        let mut filter = self.view.drill_filter.clone();
        filter.source_id = self.account_filter;
        filter.attachments_only = self.attachments_only;
        debug!("messages #{request_id} for {:?}", filter.describe());
        vec![Effect::LoadMessages {
            request_id,
            filter,
            query: MessageQuery {
                sort_field: self.view.message_sort_field,
                sort_direction: self.view.message_sort_direction,
                ..MessageQuery::default()
            },
        }]
    }

    fn load_thread(&mut self) -> Vec<Effect> {
        let request_id = self.ledger.next(LoadCategory::Messages);
        self.loading = true;
        vec![Effect::LoadThread {
            request_id,
            filter: DrillFilter::scoped(self.account_filter, false),
            query: MessageQuery {
                sort_field: MessageSortField::Date,
                sort_direction: SortDirection::Asc,
                // One extra row tells us the thread was cut off
                limit: self.tuning.thread_limit + 1,
                offset: 0,
                conversation_id: Some(self.view.thread_conversation_id),
            },
        }]
    }

    fn load_detail(&mut self, message_id: i64) -> Vec<Effect> {
        let request_id = self.ledger.next(LoadCategory::Detail);
        self.loading = true;
        vec![Effect::LoadDetail {
            request_id,
            message_id,
        }]
    }

    // Completions

    fn on_aggregates_loaded(
        &mut self,
        request_id: u64,
        result: QueryResult<Vec<AggregateRow>>,
    ) -> Vec<Effect> {
        if !self.ledger.is_current(LoadCategory::Aggregate, request_id)
            || !self.view.level.is_aggregate()
        {
            debug!("dropping stale aggregate result #{request_id}");
            return Vec::new();
        }
        self.loading = false;
        match result {
            Ok(rows) => {
                self.error = None;
                if !self.view.search_query.is_empty() {
                    self.view.context_stats = Some(TotalStats::sum_rows(&rows));
                } else if self.view.level == ViewLevel::Aggregates {
                    self.view.context_stats = None;
                }
                self.view.data.rows = rows;
                self.clamp_cursor();
            }
            Err(e) => {
                warn!("aggregate load failed: {e}");
                self.error = Some(e.to_string());
            }
        }
        Vec::new()
    }

    fn on_messages_loaded(
        &mut self,
        request_id: u64,
        result: QueryResult<Vec<MessageSummary>>,
    ) -> Vec<Effect> {
        if !self.ledger.is_current(LoadCategory::Messages, request_id)
            || self.view.level != ViewLevel::MessageList
        {
            debug!("dropping stale message list #{request_id}");
            return Vec::new();
        }
        self.loading = false;
        if !self.view.search_query.is_empty() {
            debug!("message list #{request_id} superseded by search");
            return Vec::new();
        }
        match result {
            Ok(messages) => {
                self.error = None;
                self.view.data.messages = messages;
                self.clamp_cursor();
            }
            Err(e) => {
                warn!("message load failed: {e}");
                self.error = Some(e.to_string());
            }
        }
        Vec::new()
    }

    fn on_thread_loaded(
        &mut self,
        request_id: u64,
        result: QueryResult<Vec<MessageSummary>>,
    ) -> Vec<Effect> {
        if !self.ledger.is_current(LoadCategory::Messages, request_id)
            || self.view.level != ViewLevel::ThreadView
        {
            debug!("dropping stale thread #{request_id}");
            return Vec::new();
        }
        self.loading = false;
        match result {
            Ok(mut messages) => {
                self.error = None;
                self.view.thread_truncated = messages.len() > self.tuning.thread_limit;
                messages.truncate(self.tuning.thread_limit);
                self.view.data.thread_messages = messages;
                self.view.thread_cursor = self
                    .view
                    .thread_cursor
                    .min(self.view.data.thread_messages.len().saturating_sub(1));
                self.view.ensure_thread_cursor_visible(self.page_size);
            }
            Err(e) => {
                warn!("thread load failed: {e}");
                self.error = Some(e.to_string());
            }
        }
        Vec::new()
    }

    fn on_detail_loaded(
        &mut self,
        request_id: u64,
        result: QueryResult<Option<MessageDetail>>,
    ) -> Vec<Effect> {
        if !self.ledger.is_current(LoadCategory::Detail, request_id)
            || self.view.level != ViewLevel::MessageDetail
        {
            debug!("dropping stale detail #{request_id}");
            return Vec::new();
        }
        self.loading = false;
        match result {
            Ok(Some(detail)) => {
                self.error = None;
                self.detail_line_count = detail.display_lines().len();
                self.view.data.detail = Some(detail);
            }
            Ok(None) => self.error = Some("Message not found".to_string()),
            Err(e) => {
                warn!("detail load failed: {e}");
                self.error = Some(e.to_string());
            }
        }
        Vec::new()
    }

    fn clamp_cursor(&mut self) {
        let len = self.view.list_len();
        self.view.cursor = self.view.cursor.min(len.saturating_sub(1));
        self.view.ensure_cursor_visible(self.page_size);
    }

    // Navigation

    fn push_breadcrumb(&mut self) {
        let reusable = !self.loading && !self.search.loading;
        self.breadcrumbs.push(
            Breadcrumb::capture(&self.view, reusable)
                .with_search(self.search.mode, self.search.total),
        );
    }

    /// Enter on an aggregate row
    pub(crate) fn enter_drill_down(&mut self) -> Vec<Effect> {
        let Some(row) = self.view.current_row().cloned() else {
            return Vec::new();
        };
        let top_level = self.view.level == ViewLevel::Aggregates;
        self.push_breadcrumb();

        let mut filter = if top_level {
            self.selection.clear();
            DrillFilter::scoped(self.account_filter, self.attachments_only)
        } else {
            self.view.drill_filter.clone()
        };
        filter.apply(self.view.dimension, &row.key, self.view.granularity);
        info!("drill {}={:?} -> {}", self.view.dimension, row.key, filter.describe());

        self.view.drill_filter = filter;
        self.view.drill_dimension = Some(self.view.dimension);
        self.view.filter_key = row.key.clone();
        self.view.all_messages = false;
        self.view.context_stats = Some(TotalStats::from_row(&row));
        self.enter_message_list();
        self.load_messages()
    }

    fn enter_message_list(&mut self) {
        self.view.level = ViewLevel::MessageList;
        self.view.cursor = 0;
        self.view.scroll = 0;
        self.view.data.messages.clear();
        self.view.search_query.clear();
        self.search.reset();
        self.error = None;
    }

    /// 'a' at an aggregate level
    pub(crate) fn show_all_messages(&mut self) -> Vec<Effect> {
        let query = self.view.search_query.clone();
        self.push_breadcrumb();
        if self.view.level == ViewLevel::Aggregates {
            self.view.drill_filter = DrillFilter::scoped(self.account_filter, self.attachments_only);
            self.view.drill_dimension = None;
            self.view.all_messages = true;
            self.view.context_stats = None;
        }
        self.view.filter_key.clear();
        self.enter_message_list();

        if query.is_empty() {
            self.load_messages()
        } else {
            self.view.search_query = query;
            self.issue_search(0, false)
        }
    }

    /// Tab/'g' at MessageList: group the current messages by another dimension
    pub(crate) fn enter_sub_aggregate(&mut self) -> Vec<Effect> {
        let base = self.view.drill_dimension.unwrap_or(self.view.dimension);
        self.sub_aggregate_by(base.next_subgroup())
    }

    /// 't' at a drilled MessageList: straight to a Time breakdown
    pub(crate) fn enter_time_sub_aggregate(&mut self) -> Vec<Effect> {
        if !self.view.drill_filter.is_constrained()
            || self.view.drill_dimension == Some(ViewDimension::Time)
        {
            return Vec::new();
        }
        self.sub_aggregate_by(ViewDimension::Time)
    }

    fn sub_aggregate_by(&mut self, dimension: ViewDimension) -> Vec<Effect> {
        self.push_breadcrumb();

        self.view.level = ViewLevel::SubAggregate;
        self.view.dimension = dimension;
        self.view.cursor = 0;
        self.view.scroll = 0;
        self.view.data.rows.clear();
        self.view.search_query.clear();
        self.search.reset();
        self.selection.retag(dimension);
        self.error = None;
        info!("sub-aggregate by {dimension} within {}", self.view.drill_filter.describe());
        self.load_aggregates()
    }

    /// 'g' at an unfiltered MessageList
    pub(crate) fn go_to_top(&mut self) -> Vec<Effect> {
        let dimension = self
            .breadcrumbs
            .first()
            .map(|c| c.view.dimension)
            .unwrap_or(self.view.dimension);
        self.reset_to_top(dimension);
        self.load_aggregates()
    }

    fn reset_to_top(&mut self, dimension: ViewDimension) {
        self.breadcrumbs.clear();
        self.view = ViewState {
            dimension,
            drill_filter: DrillFilter::scoped(self.account_filter, self.attachments_only),
            sort_field: self.view.sort_field,
            sort_direction: self.view.sort_direction,
            message_sort_field: self.view.message_sort_field,
            message_sort_direction: self.view.message_sort_direction,
            granularity: self.view.granularity,
            ..ViewState::default()
        };
        self.search.reset();
        self.selection.clear();
        self.selection.retag(dimension);
        self.error = None;
    }

    pub(crate) fn open_detail(&mut self, from_thread: bool) -> Vec<Effect> {
        let index = if from_thread {
            self.view.thread_cursor
        } else {
            self.view.cursor
        };
        let message = if from_thread {
            self.view.current_thread_message()
        } else {
            self.view.current_message()
        };
        let Some((id, subject)) = message.map(|m| (m.id, m.subject.clone())) else {
            return Vec::new();
        };
        self.push_breadcrumb();
        self.view.level = ViewLevel::MessageDetail;
        self.view.detail_index = index;
        self.view.detail_from_thread = from_thread;
        self.show_detail_placeholder(subject);
        self.load_detail(id)
    }

    fn show_detail_placeholder(&mut self, subject: String) {
        self.view.detail_scroll = 0;
        self.view.clear_detail_search();
        self.view.data.detail = None;
        self.view.pending_subject = subject;
        self.detail_line_count = 0;
    }

    /// Left/right in the detail view
    pub(crate) fn change_detail_message(&mut self, delta: isize) -> Vec<Effect> {
        let len = if self.view.detail_from_thread {
            self.view.data.thread_messages.len()
        } else {
            self.view.data.messages.len()
        };
        if len == 0 {
            return self.flash("No messages loaded");
        }
        let current = self.view.detail_index.min(len - 1);
        self.view.detail_index = current;
        let target = current as isize + delta;
        if target < 0 {
            return self.flash("At first message");
        }
        if target >= len as isize {
            return self.flash("At last message");
        }

        let index = target as usize;
        self.view.detail_index = index;
        let list = if self.view.detail_from_thread {
            self.view.thread_cursor = index;
            self.view.ensure_thread_cursor_visible(self.page_size);
            &self.view.data.thread_messages
        } else {
            self.view.cursor = index;
            self.view.ensure_cursor_visible(self.page_size);
            &self.view.data.messages
        };
        let (id, subject) = (list[index].id, list[index].subject.clone());
        self.show_detail_placeholder(subject);
        self.load_detail(id)
    }

    /// '/' in the detail view; the previous query is offered for editing
    pub(crate) fn open_detail_search(&mut self) {
        self.view.detail_search_input = Some(self.view.detail_search_query.clone());
    }

    /// Enter on the find-in-message line
    pub(crate) fn commit_detail_search(&mut self) -> Vec<Effect> {
        let query = self.view.detail_search_input.take().unwrap_or_default();
        self.view.detail_search_matches.clear();
        self.view.detail_search_match = 0;
        self.view.detail_search_query = query.trim().to_string();
        if self.view.detail_search_query.is_empty() {
            return Vec::new();
        }

        let needle = self.view.detail_search_query.to_lowercase();
        if let Some(detail) = &self.view.data.detail {
            self.view.detail_search_matches = detail
                .display_lines()
                .iter()
                .enumerate()
                .filter(|(_, line)| line.to_lowercase().contains(&needle))
                .map(|(i, _)| i)
                .collect();
        }
        debug!(
            "find {:?}: {} matching lines",
            self.view.detail_search_query,
            self.view.detail_search_matches.len()
        );
        self.scroll_to_detail_match();
        Vec::new()
    }

    /// 'n'/'N' in the detail view, wrapping at either end
    pub(crate) fn step_detail_match(&mut self, forward: bool) -> Vec<Effect> {
        let len = self.view.detail_search_matches.len();
        if self.view.detail_search_query.is_empty() || len == 0 {
            return Vec::new();
        }
        let current = self.view.detail_search_match.min(len - 1);
        self.view.detail_search_match = if forward {
            (current + 1) % len
        } else {
            (current + len - 1) % len
        };
        self.scroll_to_detail_match();
        Vec::new()
    }

    fn scroll_to_detail_match(&mut self) {
        if let Some(line) = self.view.current_detail_match() {
            self.view.detail_scroll = line.min(self.max_detail_scroll());
        }
    }

    /// 'T' at MessageList or MessageDetail
    pub(crate) fn open_thread(&mut self) -> Vec<Effect> {
        let conversation_id = match self.view.level {
            ViewLevel::MessageList => self.view.current_message().map(|m| m.conversation_id),
            ViewLevel::MessageDetail => self.view.data.detail.as_ref().map(|d| d.conversation_id),
            _ => None,
        };
        let Some(conversation_id) = conversation_id.filter(|id| *id > 0) else {
            return self.flash("No thread for this message");
        };
        self.push_breadcrumb();
        self.view.level = ViewLevel::ThreadView;
        self.view.thread_conversation_id = conversation_id;
        self.view.thread_cursor = 0;
        self.view.thread_scroll = 0;
        self.view.thread_truncated = false;
        self.view.data.thread_messages.clear();
        self.load_thread()
    }

    /// Pops one breadcrumb. Cached data comes back as is; otherwise the
    /// restored level is reloaded.
    pub(crate) fn go_back(&mut self) -> Vec<Effect> {
        let Some(crumb) = self.breadcrumbs.pop() else {
            return Vec::new();
        };
        let left = self.view.level;
        let detail_index = self.view.detail_index;
        let from_thread = self.view.detail_from_thread;
        let (search_mode, search_total) = (crumb.search_mode, crumb.search_total);

        let (mut view, cached) = crumb.restore();
        if left == ViewLevel::MessageDetail {
            match view.level {
                ViewLevel::ThreadView if from_thread => {
                    view.thread_cursor = detail_index;
                    view.ensure_thread_cursor_visible(self.page_size);
                }
                ViewLevel::MessageList if !from_thread => {
                    view.cursor = detail_index;
                    view.ensure_cursor_visible(self.page_size);
                }
                _ => {}
            }
        }
        debug!("back to {:?} (cached: {cached})", view.level);

        self.view = view;
        self.error = None;
        self.loading = false;
        self.search.close_input();
        self.search.offset = self.view.data.messages.len();
        self.search.total = search_total;
        if !self.view.search_query.is_empty() {
            self.search.mode = search_mode;
        }
        if self.view.level.is_aggregate() && self.selection.aggregate_dimension != self.view.dimension {
            self.selection.retag(self.view.dimension);
        }

        if cached {
            Vec::new()
        } else {
            self.load_data()
        }
    }

    /// Tab/BackTab/'g' at aggregate levels
    pub(crate) fn cycle_dimension(&mut self, forward: bool) -> Vec<Effect> {
        let skip = match self.view.level {
            ViewLevel::SubAggregate => self.view.drill_dimension,
            _ => None,
        };
        let dimension = self.view.dimension.cycle(forward, skip);
        self.switch_dimension(dimension)
    }

    fn switch_dimension(&mut self, dimension: ViewDimension) -> Vec<Effect> {
        self.view.dimension = dimension;
        self.view.cursor = 0;
        self.view.scroll = 0;
        self.view.data.rows.clear();
        self.selection.retag(dimension);
        self.load_aggregates()
    }

    /// 't' at aggregate levels
    pub(crate) fn press_time(&mut self) -> Vec<Effect> {
        if self.view.dimension == ViewDimension::Time {
            self.view.granularity = self.view.granularity.next();
            debug!("granularity now {}", self.view.granularity.label());
            return self.load_aggregates();
        }
        if self.view.level == ViewLevel::SubAggregate
            && self.view.drill_dimension == Some(ViewDimension::Time)
        {
            return Vec::new();
        }
        self.switch_dimension(ViewDimension::Time)
    }

    pub(crate) fn cycle_sort(&mut self) -> Vec<Effect> {
        match self.view.level {
            ViewLevel::Aggregates | ViewLevel::SubAggregate => {
                self.view.sort_field = self.view.sort_field.next();
                self.load_aggregates()
            }
            ViewLevel::MessageList => {
                self.view.message_sort_field = self.view.message_sort_field.next();
                self.load_data()
            }
            _ => Vec::new(),
        }
    }

    pub(crate) fn reverse_sort(&mut self) -> Vec<Effect> {
        match self.view.level {
            ViewLevel::Aggregates | ViewLevel::SubAggregate => {
                self.view.sort_direction = self.view.sort_direction.flip();
                self.load_aggregates()
            }
            ViewLevel::MessageList => {
                self.view.message_sort_direction = self.view.message_sort_direction.flip();
                self.load_data()
            }
            _ => Vec::new(),
        }
    }

    // Cursor

    pub(crate) fn move_cursor(&mut self, delta: isize) -> Vec<Effect> {
        match self.view.level {
            ViewLevel::MessageDetail => self.scroll_detail(delta),
            ViewLevel::ThreadView => {
                self.view.thread_cursor = step(
                    self.view.thread_cursor,
                    delta,
                    self.view.data.thread_messages.len(),
                );
                self.view.ensure_thread_cursor_visible(self.page_size);
                Vec::new()
            }
            _ => {
                self.view.cursor = step(self.view.cursor, delta, self.view.list_len());
                self.view.ensure_cursor_visible(self.page_size);
                self.maybe_load_more()
            }
        }
    }

    /// Flashes instead of moving when already at the edge
    fn scroll_detail(&mut self, delta: isize) -> Vec<Effect> {
        let max = self.max_detail_scroll();
        self.view.detail_scroll = self.view.detail_scroll.min(max);
        if delta < 0 && self.view.detail_scroll == 0 {
            return self.flash("At top");
        }
        if delta > 0 && self.view.detail_scroll >= max {
            return self.flash("At bottom");
        }
        self.view.detail_scroll = step(self.view.detail_scroll, delta, max + 1);
        Vec::new()
    }

    /// Home, or 'g' in the detail view
    pub(crate) fn jump_to_start(&mut self) -> Vec<Effect> {
        match self.view.level {
            ViewLevel::MessageDetail => self.view.detail_scroll = 0,
            ViewLevel::ThreadView => self.set_thread_cursor(0),
            _ => self.set_cursor(0),
        }
        Vec::new()
    }

    /// End, or 'G' in the detail view
    pub(crate) fn jump_to_end(&mut self) -> Vec<Effect> {
        match self.view.level {
            ViewLevel::MessageDetail => {
                self.view.detail_scroll = self.max_detail_scroll();
                Vec::new()
            }
            ViewLevel::ThreadView => {
                self.set_thread_cursor(self.view.data.thread_messages.len().saturating_sub(1));
                Vec::new()
            }
            _ => {
                self.set_cursor(self.view.list_len().saturating_sub(1));
                self.maybe_load_more()
            }
        }
    }

    fn set_cursor(&mut self, cursor: usize) {
        self.view.cursor = cursor;
        self.view.ensure_cursor_visible(self.page_size);
    }

    fn set_thread_cursor(&mut self, cursor: usize) {
        self.view.thread_cursor = cursor;
        self.view.ensure_thread_cursor_visible(self.page_size);
    }

    pub(crate) fn page_down(&mut self, rows: usize) -> Vec<Effect> {
        let at_last_row = self.view.level == ViewLevel::MessageList
            && self.view.cursor + 1 >= self.view.list_len();
        if at_last_row {
            return self.load_more_deep();
        }
        let mut effects = self.move_cursor(rows as isize);
        if effects.is_empty() {
            effects = self.load_more_deep();
        }
        effects
    }

    pub(crate) fn page_rows(&self, half: bool) -> usize {
        let rows = if self.view.level == ViewLevel::MessageDetail {
            self.detail_page_size()
        } else {
            self.page_size
        };
        if half { (rows / 2).max(1) } else { rows }
    }

    // Selection and staging

    pub(crate) fn toggle_selection(&mut self) {
        match self.view.level {
            ViewLevel::Aggregates | ViewLevel::SubAggregate => {
                if let Some(row) = self.view.current_row() {
                    let key = row.key.clone();
                    self.selection.toggle_aggregate(self.view.dimension, &key);
                }
            }
            ViewLevel::MessageList => {
                if let Some(id) = self.view.current_message().map(|m| m.id) {
                    self.selection.toggle_message(id);
                }
            }
            _ => {}
        }
    }

    /// 'S': only the rows currently on screen
    pub(crate) fn select_all_visible(&mut self) {
        let start = self.view.scroll.min(self.view.list_len());
        let end = (start + self.page_size).min(self.view.list_len());
        match self.view.level {
            ViewLevel::Aggregates | ViewLevel::SubAggregate => self.selection.select_aggregates(
                self.view.dimension,
                self.view.data.rows[start..end].iter().map(|r| r.key.as_str()),
            ),
            ViewLevel::MessageList => self
                .selection
                .select_messages(self.view.data.messages[start..end].iter().map(|m| m.id)),
            _ => {}
        }
    }

    /// Account identifier for a manifest, with a warning when it is ambiguous
    fn account_context(&self) -> (String, Option<String>) {
        match self.account_filter {
            Some(id) => {
                if let Some(account) = self.accounts.iter().find(|a| a.id == id) {
                    return (account.identifier.clone(), None);
                }
            }
            None => {
                if let [only] = self.accounts.as_slice() {
                    return (only.identifier.clone(), None);
                }
            }
        }
        (
            String::new(),
            Some(format!(
                "{WARNING_CHAR} Multiple accounts: manifest has no account scope"
            )),
        )
    }

    /// 'd' stages the selection; 'D' first selects the row under the cursor
    pub(crate) fn stage_selection(&mut self, include_current: bool) -> Vec<Effect> {
        if include_current && self.selection.is_empty() {
            self.toggle_selection();
        }
        if self.selection.is_empty() {
            return self.flash(NO_SELECTION_MESSAGE);
        }

        let message_source_ids = if self.view.level == ViewLevel::MessageList {
            self.view
                .data
                .messages
                .iter()
                .filter(|m| self.selection.message_ids.contains(&m.id))
                .map(|m| m.source_message_id.clone())
                .collect()
        } else {
            Vec::new()
        };
        let (account, warning) = self.account_context();
        let request = StageRequest {
            dimension: self.selection.aggregate_dimension,
            aggregate_keys: self.selection.aggregate_keys.iter().cloned().collect(),
            granularity: self.view.granularity,
            source_id: self.account_filter,
            message_source_ids,
            account,
            warning,
        };
        self.busy = Some("Preparing deletion...".to_string());
        vec![Effect::BuildManifest(request)]
    }

    fn on_manifest_built(&mut self, result: Result<StagedDeletion, DeletionError>) -> Vec<Effect> {
        self.busy = None;
        match result {
            Ok(staged) => {
                self.modal = Some(Modal::DeleteConfirm(staged));
                Vec::new()
            }
            Err(DeletionError::NothingSelected) => self.flash(NO_SELECTION_MESSAGE),
            Err(e) => {
                warn!("staging failed: {e}");
                self.flash(format!("Staging failed: {e}"))
            }
        }
    }

    fn on_manifest_saved(&mut self, result: Result<(String, usize), DeletionError>) -> Vec<Effect> {
        self.busy = None;
        match result {
            Ok((id, count)) => {
                self.selection.clear();
                self.flash(format!(
                    "Staged {count} messages for deletion.\nBatch ID: {id}"
                ))
            }
            Err(e) => {
                warn!("saving manifest failed: {e}");
                self.flash(format!("Staging failed: {e}"))
            }
        }
    }

    // Modals

    pub(crate) fn open_export(&mut self) -> Vec<Effect> {
        match self.view.data.detail.as_ref().map(|d| d.attachments.len()) {
            Some(0) => self.flash("No attachments to export"),
            Some(count) => {
                self.modal = Some(Modal::ExportAttachments {
                    cursor: 0,
                    selected: (0..count).collect(),
                });
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    pub(crate) fn export_selected(&mut self, selected: &BTreeSet<usize>) -> Vec<Effect> {
        let Some(detail) = &self.view.data.detail else {
            return Vec::new();
        };
        let attachments: Vec<AttachmentInfo> = detail
            .attachments
            .iter()
            .enumerate()
            .filter(|(i, _)| selected.contains(i))
            .map(|(_, a)| a.clone())
            .collect();
        if attachments.is_empty() {
            return self.flash("No attachments selected");
        }
        let effect = Effect::ExportAttachments {
            subject: detail.subject.clone(),
            message_id: detail.id,
            attachments,
        };
        self.busy = Some("Exporting attachments...".to_string());
        vec![effect]
    }

    pub(crate) fn select_account(&mut self, cursor: usize) -> Vec<Effect> {
        self.account_filter = match cursor {
            0 => None,
            n => self.accounts.get(n - 1).map(|a| a.id),
        };
        info!("account filter now {:?}", self.account_filter);
        let dimension = self
            .breadcrumbs
            .first()
            .map(|c| c.view.dimension)
            .unwrap_or(self.view.dimension);
        self.reset_to_top(dimension);
        let mut effects = self.load_aggregates();
        effects.push(self.stats_effect());
        effects
    }

    pub(crate) fn set_attachments_only(&mut self, only: bool) -> Vec<Effect> {
        self.attachments_only = only;
        self.view.drill_filter.attachments_only = only;
        let mut effects = self.load_data();
        if self.view.level == ViewLevel::Aggregates {
            effects.push(self.stats_effect());
        }
        effects
    }

    pub(crate) fn request_quit(&mut self) -> Vec<Effect> {
        self.quitting = true;
        vec![Effect::Quit]
    }
}

/// Moves `current` by `delta` inside `0..len`
fn step(current: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (current as isize + delta).clamp(0, len as isize - 1) as usize
}
