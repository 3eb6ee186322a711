use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Local, Utc};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Row, StatefulWidget, Table, TableState, Widget},
};

use crate::app::{App, WARNING_CHAR};
use crate::query::{MessageSummary, ViewDimension, format_bytes};
use crate::view_state::ViewLevel;

/// Format a date for display in message lists.
/// Shows time for the current year, year for older messages
fn format_date(date: &DateTime<Utc>) -> String {
    let local: DateTime<Local> = date.with_timezone(&Local);
    let now = Local::now();

    if local.year() == now.year() {
        local.format("%b %d %H:%M").to_string()
    } else {
        local.format("%b %d  %Y").to_string()
    }
}

/// Aggregate keys are empty for the "no value" bucket
fn display_key(key: &str) -> &str {
    if key.is_empty() { "(empty)" } else { key }
}

fn highlight() -> Style {
    Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD)
}

fn selection_mark(selected: bool) -> &'static str {
    if selected { "●" } else { " " }
}

/// Spinner frames for animated busy indicator
const SPINNER_FRAMES: &[char] = &['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

/// Render-only state that doesn't belong in the state machine
#[derive(Debug, Default)]
pub struct UiState {
    /// Frame counter for spinner animation
    pub spinner_frame: usize,
}

impl UiState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the spinner animation frame
    pub fn tick_spinner(&mut self) {
        self.spinner_frame = (self.spinner_frame + 1) % SPINNER_FRAMES.len();
    }

    pub fn spinner_char(&self) -> char {
        SPINNER_FRAMES[self.spinner_frame % SPINNER_FRAMES.len()]
    }
}

/// Clears `area` so an overlay doesn't blend with what's underneath
fn clear_area(area: Rect, buf: &mut Buffer) {
    let area = area.intersection(buf.area);
    for row in area.y..area.y + area.height {
        for col in area.x..area.x + area.width {
            buf[(col, row)].set_char(' ');
            buf[(col, row)].set_style(Style::default());
        }
    }
}

/// Widget for the busy/loading modal overlay
pub struct BusyModalWidget<'a> {
    message: &'a str,
    spinner: char,
}

impl<'a> BusyModalWidget<'a> {
    pub fn new(message: &'a str, spinner: char) -> Self {
        Self { message, spinner }
    }
}

impl Widget for BusyModalWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let display_msg = format!("{} {}", self.spinner, self.message);

        let msg_width = display_msg.chars().count() as u16 + 4;
        let box_width = msg_width.max(20).min(area.width.saturating_sub(4));
        let box_height = 3;

        let x = area.x + (area.width.saturating_sub(box_width)) / 2;
        let y = area.y + (area.height.saturating_sub(box_height)) / 2;
        let modal_area = Rect::new(x, y, box_width, box_height);
        clear_area(modal_area, buf);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan));
        let inner = block.inner(modal_area);
        block.render(modal_area, buf);

        let msg_x = inner.x + (inner.width.saturating_sub(display_msg.chars().count() as u16)) / 2;
        buf.set_line(
            msg_x,
            inner.y,
            &Line::from(Span::styled(
                display_msg,
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )),
            inner.width,
        );
    }
}

/// Widget for transient notices. Multi-line messages get one row per line.
pub struct StatusModalWidget<'a> {
    message: &'a str,
}

impl<'a> StatusModalWidget<'a> {
    pub fn new(message: &'a str) -> Self {
        Self { message }
    }
}

impl Widget for StatusModalWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let lines: Vec<&str> = self.message.lines().collect();
        let widest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) as u16;

        let box_width = (widest + 4).max(20).min(area.width.saturating_sub(4));
        let box_height = (lines.len() as u16 + 2).min(area.height);

        let x = area.x + (area.width.saturating_sub(box_width)) / 2;
        let y = area.y + (area.height.saturating_sub(box_height)) / 2;
        let modal_area = Rect::new(x, y, box_width, box_height);
        clear_area(modal_area, buf);

        // Yellow for warnings
        let color = if self.message.starts_with(WARNING_CHAR) {
            Color::Yellow
        } else {
            Color::White
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color));
        let inner = block.inner(modal_area);
        block.render(modal_area, buf);

        for (i, line) in lines.iter().enumerate().take(inner.height as usize) {
            let msg_x = inner.x + (inner.width.saturating_sub(line.chars().count() as u16)) / 2;
            buf.set_line(
                msg_x,
                inner.y + i as u16,
                &Line::from(Span::styled(
                    *line,
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                )),
                inner.width,
            );
        }
    }
}

/// Top line: where we are and what the archive (or current scope) holds
pub struct HeaderWidget<'a> {
    app: &'a App,
}

impl<'a> HeaderWidget<'a> {
    pub fn new(app: &'a App) -> Self {
        Self { app }
    }
}

impl Widget for HeaderWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let app = self.app;
        let account = app
            .account_filter
            .and_then(|id| app.accounts.iter().find(|a| a.id == id))
            .map_or("All accounts", |a| a.identifier.as_str());

        let mut spans = vec![
            Span::styled(
                format!(" {} ", app.breadcrumb_path()),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("[{account}]"), Style::default().fg(Color::Cyan)),
        ];
        if app.attachments_only {
            spans.push(Span::styled(
                " [attachments]",
                Style::default().fg(Color::Magenta),
            ));
        }

        let stats = app.view.context_stats.or(app.stats);
        if let Some(stats) = stats {
            spans.push(Span::styled(
                format!(
                    "  {} msgs | {} | {} attachments ({})",
                    stats.message_count,
                    format_bytes(stats.total_size),
                    stats.attachment_count,
                    format_bytes(stats.attachment_size)
                ),
                Style::default().fg(Color::DarkGray),
            ));
        }
        if !app.selection.is_empty() {
            spans.push(Span::styled(
                format!("  {} selected", app.selection.len()),
                Style::default().fg(Color::Yellow),
            ));
        }

        Paragraph::new(Line::from(spans)).render(area, buf);
    }
}

/// Aggregate rows for the top level and sub-aggregates
pub struct AggregateTableWidget<'a> {
    app: &'a App,
}

impl<'a> AggregateTableWidget<'a> {
    pub fn new(app: &'a App) -> Self {
        Self { app }
    }
}

impl StatefulWidget for AggregateTableWidget<'_> {
    type State = TableState;

    fn render(self, area: Rect, buf: &mut Buffer, state: &mut Self::State) {
        let view = &self.app.view;
        let rows_data = &view.data.rows;

        let mut title = format!(" {}", view.dimension);
        if view.dimension == ViewDimension::Time {
            title.push_str(&format!(" by {}", view.granularity.label()));
        }
        if let Some(first) = rows_data.first() {
            title.push_str(&format!(" ({} unique)", first.total_unique));
        }
        title.push_str(&format!(
            " | sort: {} {} ",
            view.sort_field.label(),
            view.sort_direction.arrow()
        ));
        if !view.search_query.is_empty() {
            title.push_str(&format!("| search: {} ", view.search_query));
        }
        if self.app.loading {
            title.push_str("| loading… ");
        }

        let block = Block::default().borders(Borders::ALL).title(title);

        let selection = &self.app.selection;
        let picked = |key: &str| {
            selection.aggregate_dimension == view.dimension && selection.aggregate_keys.contains(key)
        };
        let rows: Vec<Row> = rows_data
            .iter()
            .map(|row| {
                let style = if row.key.is_empty() {
                    Style::default().fg(Color::DarkGray)
                } else {
                    Style::default()
                };
                Row::new(vec![
                    selection_mark(picked(&row.key)).to_string(),
                    display_key(&row.key).to_string(),
                    row.count.to_string(),
                    format_bytes(row.total_size),
                    format_bytes(row.attachment_size),
                ])
                .style(style)
            })
            .collect();

        let table = Table::new(
            rows,
            [
                Constraint::Length(1),
                Constraint::Min(20),
                Constraint::Length(8),
                Constraint::Length(10),
                Constraint::Length(12),
            ],
        )
        .header(
            Row::new(vec!["", view.dimension.label(), "Count", "Size", "Attachments"])
                .style(Style::default().add_modifier(Modifier::UNDERLINED)),
        )
        .block(block)
        .row_highlight_style(highlight());

        StatefulWidget::render(table, area, buf, state);
    }
}

fn message_row<'a>(message: &MessageSummary, selected: bool) -> Row<'a> {
    let from = if message.from_name.is_empty() {
        message.from_email.clone()
    } else {
        message.from_name.clone()
    };
    let attachment = if message.has_attachments { "📎" } else { " " };
    Row::new(vec![
        selection_mark(selected).to_string(),
        format_date(&message.sent_at),
        from,
        attachment.to_string(),
        message.subject.clone(),
        format_bytes(message.size_estimate),
    ])
}

const MESSAGE_COLUMNS: [Constraint; 6] = [
    Constraint::Length(1),
    Constraint::Length(12),
    Constraint::Length(24),
    Constraint::Length(2),
    Constraint::Min(20),
    Constraint::Length(9),
];

/// Widget for rendering the message list
pub struct MessageTableWidget<'a> {
    app: &'a App,
}

impl<'a> MessageTableWidget<'a> {
    pub fn new(app: &'a App) -> Self {
        Self { app }
    }
}

impl StatefulWidget for MessageTableWidget<'_> {
    type State = TableState;

    fn render(self, area: Rect, buf: &mut Buffer, state: &mut Self::State) {
        let app = self.app;
        let view = &app.view;
        let messages = &view.data.messages;

        let mut title = if view.all_messages {
            " All messages".to_string()
        } else {
            let filter = view.drill_filter.describe();
            format!(
                " {}",
                if filter.is_empty() { "Messages" } else { filter.as_str() }
            )
        };
        let loaded = messages.len();
        if view.search_query.is_empty() {
            title.push_str(&format!(" ({loaded})"));
        } else {
            let total = match app.search.total {
                -1 => format!("{loaded}+"),
                total => total.to_string(),
            };
            title.push_str(&format!(
                " | {} search \"{}\": {} of {}",
                app.search.mode.label(),
                view.search_query,
                loaded,
                total
            ));
        }
        title.push_str(&format!(
            " | sort: {} {} ",
            view.message_sort_field.label(),
            view.message_sort_direction.arrow()
        ));
        if app.loading || app.search.loading || app.search.loading_more {
            title.push_str("| loading… ");
        }

        let block = Block::default().borders(Borders::ALL).title(title);

        if messages.is_empty() && !app.loading && !app.search.loading {
            let inner = block.inner(area);
            block.render(area, buf);
            let msg = "No messages";
            let x = inner.x + (inner.width.saturating_sub(msg.len() as u16)) / 2;
            let y = inner.y + inner.height / 2;
            buf.set_line(
                x,
                y,
                &Line::from(Span::styled(msg, Style::default().fg(Color::DarkGray))),
                inner.width,
            );
            return;
        }

        let rows: Vec<Row> = messages
            .iter()
            .map(|m| message_row(m, app.selection.message_ids.contains(&m.id)))
            .collect();

        let table = Table::new(rows, MESSAGE_COLUMNS)
            .header(
                Row::new(vec!["", "Date", "From", "", "Subject", "Size"])
                    .style(Style::default().add_modifier(Modifier::UNDERLINED)),
            )
            .block(block)
            .row_highlight_style(highlight());

        StatefulWidget::render(table, area, buf, state);
    }
}

/// Widget for rendering the thread view (all messages in a conversation)
pub struct ThreadViewWidget<'a> {
    app: &'a App,
}

impl<'a> ThreadViewWidget<'a> {
    pub fn new(app: &'a App) -> Self {
        Self { app }
    }
}

impl StatefulWidget for ThreadViewWidget<'_> {
    type State = TableState;

    fn render(self, area: Rect, buf: &mut Buffer, state: &mut Self::State) {
        let messages = &self.app.view.data.thread_messages;
        let subject = messages.first().map_or("", |m| m.subject.as_str());
        let mut title = format!(" Thread: {} ({} messages", subject, messages.len());
        if self.app.view.thread_truncated {
            title.push_str(&format!(", first {} shown", self.app.tuning.thread_limit));
        }
        title.push_str(") ");

        let block = Block::default().borders(Borders::ALL).title(title);

        let first_sender = messages.first().map(|m| &m.from_email);
        let rows: Vec<Row> = messages
            .iter()
            .map(|m| {
                let style = if first_sender.is_some_and(|s| s != &m.from_email) {
                    Style::default().fg(Color::Cyan)
                } else {
                    Style::default()
                };
                message_row(m, false).style(style)
            })
            .collect();

        let table = Table::new(rows, MESSAGE_COLUMNS)
            .header(
                Row::new(vec!["", "Date", "From", "", "Subject", "Size"])
                    .style(Style::default().add_modifier(Modifier::UNDERLINED)),
            )
            .block(block)
            .row_highlight_style(highlight());

        StatefulWidget::render(table, area, buf, state);
    }
}

/// Headers, attachments and body of one message
pub struct DetailWidget<'a> {
    app: &'a App,
}

impl<'a> DetailWidget<'a> {
    pub fn new(app: &'a App) -> Self {
        Self { app }
    }
}

impl Widget for DetailWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let view = &self.app.view;
        let list_len = if view.detail_from_thread {
            view.data.thread_messages.len()
        } else {
            view.data.messages.len()
        };
        let title = format!(" Message {} of {} ", view.detail_index + 1, list_len);
        let block = Block::default().borders(Borders::TOP).title(title);

        let Some(detail) = &view.data.detail else {
            let text = if self.app.loading {
                format!("Loading {}…", view.pending_subject)
            } else {
                String::new()
            };
            Paragraph::new(text)
                .style(Style::default().fg(Color::DarkGray))
                .block(block)
                .render(area, buf);
            return;
        };

        let current_match = view.current_detail_match();
        let lines: Vec<Line> = detail
            .display_lines()
            .into_iter()
            .enumerate()
            .skip(view.detail_scroll)
            .map(|(i, line)| {
                if current_match == Some(i) {
                    return Line::from(Span::styled(format!("▶ {line}"), highlight()));
                }
                if view.detail_search_matches.contains(&i) && !view.detail_search_query.is_empty()
                {
                    return Line::from(Span::styled(line, Style::default().fg(Color::Yellow)));
                }
                let is_header = ["From:", "To:", "Cc:", "Bcc:", "Date:", "Subject:", "Labels:"]
                    .iter()
                    .any(|p| line.starts_with(p));
                if is_header {
                    Line::from(Span::styled(line, Style::default().fg(Color::Cyan)))
                } else {
                    Line::from(line)
                }
            })
            .collect();

        Paragraph::new(lines).block(block).render(area, buf);
    }
}

/// Bottom line: the search input when open, errors, otherwise key hints
pub struct HelpBarWidget<'a> {
    app: &'a App,
    spinner: char,
}

impl<'a> HelpBarWidget<'a> {
    pub fn new(app: &'a App, spinner: char) -> Self {
        Self { app, spinner }
    }
}

impl Widget for HelpBarWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let app = self.app;
        if app.search.active {
            let mut spans = vec![
                Span::styled("/", Style::default().fg(Color::Yellow)),
                Span::raw(app.search.input.clone()),
                Span::styled("▏", Style::default().fg(Color::Yellow)),
            ];
            if app.view.level == ViewLevel::MessageList {
                spans.push(Span::styled(
                    format!("  [{}] Tab: mode", app.search.mode.label()),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            if app.search.loading {
                spans.push(Span::styled(
                    format!(" {}", self.spinner),
                    Style::default().fg(Color::Cyan),
                ));
            }
            Paragraph::new(Line::from(spans)).render(area, buf);
            return;
        }

        if app.view.level == ViewLevel::MessageDetail {
            if let Some(input) = &app.view.detail_search_input {
                let line = Line::from(vec![
                    Span::styled("/", Style::default().fg(Color::Yellow)),
                    Span::raw(input.clone()),
                    Span::styled("▏", Style::default().fg(Color::Yellow)),
                ]);
                Paragraph::new(line).render(area, buf);
                return;
            }
            if !app.view.detail_search_query.is_empty() {
                let matches = &app.view.detail_search_matches;
                let position = if matches.is_empty() {
                    "[no matches]".to_string()
                } else {
                    format!("[{}/{}]", app.view.detail_search_match + 1, matches.len())
                };
                Paragraph::new(format!(
                    "/{} {position}  n/N: next/prev | Esc: clear",
                    app.view.detail_search_query
                ))
                .style(Style::default().fg(Color::Yellow))
                .render(area, buf);
                return;
            }
        }

        if let Some(error) = &app.error {
            Paragraph::new(format!("{WARNING_CHAR} {error}"))
                .style(Style::default().fg(Color::Red))
                .render(area, buf);
            return;
        }

        let help_text = match app.view.level {
            ViewLevel::Aggregates => {
                "j/k: move | Enter: drill | a: all | Tab: group | t: time | s/r: sort | /: search | Space/S: select | d: stage | A: account | f: filter | ?: help"
            }
            ViewLevel::SubAggregate => {
                "j/k: move | Enter: drill | Tab: group | t: time | s/r: sort | /: search | Space/S: select | d: stage | Esc: back"
            }
            ViewLevel::MessageList => {
                "j/k: move | Enter: open | T: thread | Tab: sub-group | s/r: sort | /: search | Space/S: select | d: stage | Esc: back"
            }
            ViewLevel::MessageDetail => {
                "j/k: scroll | g/G: top/bottom | ←/→: prev/next | /: find | T: thread | e: export | Esc: back"
            }
            ViewLevel::ThreadView => "j/k: move | Enter: open | Esc: back",
        };

        Paragraph::new(help_text)
            .style(Style::default().fg(Color::DarkGray))
            .render(area, buf);
    }
}

/// Widget for the confirmation dialog
pub struct ConfirmDialogWidget {
    lines: Vec<String>,
}

impl ConfirmDialogWidget {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }
}

impl Widget for ConfirmDialogWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        clear_area(area, buf);
        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Confirm ")
            .style(Style::default().fg(Color::Red));

        let inner = block.inner(area);
        block.render(area, buf);

        for (i, line) in self.lines.into_iter().enumerate() {
            if i >= inner.height as usize {
                break;
            }

            let style = if line.starts_with(WARNING_CHAR) {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::White)
            };

            buf.set_line(
                inner.x,
                inner.y + i as u16,
                &Line::from(Span::styled(line, style)),
                inner.width,
            );
        }
    }
}

/// A pick list: account selector, attachment filter, export chooser
pub struct SelectorWidget<'a> {
    title: &'a str,
    items: Vec<String>,
    cursor: usize,
    /// Checkbox state per item, for multi-select lists
    checked: Option<&'a BTreeSet<usize>>,
    hint: &'a str,
}

impl<'a> SelectorWidget<'a> {
    pub fn new(title: &'a str, items: Vec<String>, cursor: usize) -> Self {
        Self {
            title,
            items,
            cursor,
            checked: None,
            hint: "j/k: move | Enter: select | Esc: cancel",
        }
    }

    pub fn checked(mut self, checked: &'a BTreeSet<usize>) -> Self {
        self.checked = Some(checked);
        self
    }

    pub fn hint(mut self, hint: &'a str) -> Self {
        self.hint = hint;
        self
    }
}

impl Widget for SelectorWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        clear_area(area, buf);
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} ", self.title));

        let inner = block.inner(area);
        block.render(area, buf);

        let visible = inner.height.saturating_sub(2) as usize;
        let skip = self.cursor.saturating_sub(visible.saturating_sub(1));
        for (i, item) in self.items.iter().enumerate().skip(skip).take(visible) {
            let style = if i == self.cursor {
                highlight()
            } else {
                Style::default()
            };
            let line = match self.checked {
                Some(checked) if checked.contains(&i) => format!("[x] {item}"),
                Some(_) => format!("[ ] {item}"),
                None => item.clone(),
            };
            buf.set_line(
                inner.x,
                inner.y + (i - skip) as u16,
                &Line::from(Span::styled(line, style)),
                inner.width,
            );
        }

        let help_y = inner.y + inner.height.saturating_sub(1);
        buf.set_line(
            inner.x,
            help_y,
            &Line::from(Span::styled(self.hint, Style::default().fg(Color::DarkGray))),
            inner.width,
        );
    }
}

const HELP_LINES: &[&str] = &[
    "Navigation",
    "  j/k ↑/↓       move            PgUp/PgDn ^u/^d  page",
    "  Enter         drill / open    Esc              back",
    "  a             all messages    g/Tab            next grouping",
    "  t             time (again: granularity; in a drilled list: by time)",
    "  T             thread view     ←/→ h/l          prev/next message",
    "  Home/End      first/last      g/G              top/bottom of message",
    "Sorting and search",
    "  s             sort field      r/v              reverse",
    "  /             search (Tab in the list switches fast/deep)",
    "  / n N         find in message, next/previous match",
    "Selection",
    "  Space         toggle          S                select visible",
    "  x             clear           d/D              stage deletion",
    "Filters",
    "  A             account         f                attachments",
    "  e             export attachments (message view)",
    "",
    "q: quit   any key: close",
];

pub struct HelpWidget;

impl Widget for HelpWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        clear_area(area, buf);
        let lines: Vec<Line> = HELP_LINES
            .iter()
            .map(|l| {
                if l.starts_with(' ') || l.is_empty() {
                    Line::from(*l)
                } else {
                    Line::from(Span::styled(*l, Style::default().fg(Color::Cyan)))
                }
            })
            .collect();
        Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title(" Keys "))
            .render(area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_text(buf: &Buffer) -> String {
        buf.content().iter().map(|c| c.symbol()).collect()
    }

    #[test]
    fn test_spinner_wraps() {
        let mut state = UiState::new();
        for _ in 0..SPINNER_FRAMES.len() {
            state.tick_spinner();
        }
        assert_eq!(state.spinner_char(), SPINNER_FRAMES[0]);
    }

    #[test]
    fn test_display_key_marks_empty_bucket() {
        assert_eq!(display_key(""), "(empty)");
        assert_eq!(display_key("INBOX"), "INBOX");
    }

    #[test]
    fn test_status_modal_renders_each_line() {
        let area = Rect::new(0, 0, 60, 10);
        let mut buf = Buffer::empty(area);
        StatusModalWidget::new("Staged 3 messages for deletion.\nBatch ID: abc").render(area, &mut buf);
        let text = buffer_text(&buf);
        assert!(text.contains("Staged 3 messages"));
        assert!(text.contains("Batch ID: abc"));
    }

    #[test]
    fn test_selector_shows_checkboxes() {
        let area = Rect::new(0, 0, 40, 8);
        let mut buf = Buffer::empty(area);
        let checked: BTreeSet<usize> = [1].into_iter().collect();
        SelectorWidget::new("Export", vec!["a.pdf".into(), "b.pdf".into()], 0)
            .checked(&checked)
            .render(area, &mut buf);
        let text = buffer_text(&buf);
        assert!(text.contains("[ ] a.pdf"));
        assert!(text.contains("[x] b.pdf"));
    }

    #[test]
    fn test_confirm_dialog_renders_lines() {
        let area = Rect::new(0, 0, 50, 6);
        let mut buf = Buffer::empty(area);
        ConfirmDialogWidget::new(vec!["Stage 2 message(s) for deletion?".into(), "(y/n)".into()])
            .render(area, &mut buf);
        assert!(buffer_text(&buf).contains("(y/n)"));
    }
}
