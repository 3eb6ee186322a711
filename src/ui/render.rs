use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    widgets::TableState,
};

use crate::app::{App, Modal};
use crate::ui::widgets::{
    AggregateTableWidget, BusyModalWidget, ConfirmDialogWidget, DetailWidget, HeaderWidget,
    HelpBarWidget, HelpWidget, MessageTableWidget, SelectorWidget, StatusModalWidget,
    ThreadViewWidget, UiState,
};
use crate::view_state::ViewLevel;

/// Renders the entire application UI
pub fn render(frame: &mut Frame, app: &App, ui_state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header
            Constraint::Min(1),    // Main content
            Constraint::Length(1), // Help bar / search input
        ])
        .split(frame.area());

    frame.render_widget(HeaderWidget::new(app), chunks[0]);

    let view = &app.view;
    match view.level {
        ViewLevel::Aggregates | ViewLevel::SubAggregate => {
            let mut state = table_state(view.cursor, view.scroll, view.data.rows.len());
            frame.render_stateful_widget(AggregateTableWidget::new(app), chunks[1], &mut state);
        }
        ViewLevel::MessageList => {
            let mut state = table_state(view.cursor, view.scroll, view.data.messages.len());
            frame.render_stateful_widget(MessageTableWidget::new(app), chunks[1], &mut state);
        }
        ViewLevel::ThreadView => {
            let mut state = table_state(
                view.thread_cursor,
                view.thread_scroll,
                view.data.thread_messages.len(),
            );
            frame.render_stateful_widget(ThreadViewWidget::new(app), chunks[1], &mut state);
        }
        ViewLevel::MessageDetail => frame.render_widget(DetailWidget::new(app), chunks[1]),
    }

    frame.render_widget(HelpBarWidget::new(app, ui_state.spinner_char()), chunks[2]);

    if let Some(modal) = &app.modal {
        render_modal(frame, app, modal);
    }

    // Busy takes priority over everything else
    if let Some(msg) = &app.busy {
        let modal = BusyModalWidget::new(msg, ui_state.spinner_char());
        frame.render_widget(modal, frame.area());
    } else if app.modal.is_none()
        && let Some(msg) = &app.flash
    {
        frame.render_widget(StatusModalWidget::new(msg), frame.area());
    }
}

fn table_state(cursor: usize, scroll: usize, len: usize) -> TableState {
    let selected = (len > 0).then_some(cursor);
    TableState::default()
        .with_offset(scroll)
        .with_selected(selected)
}

fn render_modal(frame: &mut Frame, app: &App, modal: &Modal) {
    match modal {
        Modal::Help => {
            frame.render_widget(HelpWidget, centered_rect(70, 80, frame.area()));
        }
        Modal::QuitConfirm | Modal::DeleteConfirm(_) => {
            let dialog = ConfirmDialogWidget::new(modal.message());
            frame.render_widget(dialog, centered_rect(60, 30, frame.area()));
        }
        Modal::AccountSelector { cursor } => {
            let items = std::iter::once("All accounts".to_string())
                .chain(app.accounts.iter().map(|a| {
                    if a.display_name.is_empty() {
                        a.identifier.clone()
                    } else {
                        format!("{} ({})", a.identifier, a.display_name)
                    }
                }))
                .collect();
            let widget = SelectorWidget::new("Select Account", items, *cursor);
            frame.render_widget(widget, centered_rect(60, 50, frame.area()));
        }
        Modal::AttachmentFilter { cursor } => {
            let items = vec![
                "All messages".to_string(),
                "Only messages with attachments".to_string(),
            ];
            let widget = SelectorWidget::new("Filter", items, *cursor);
            frame.render_widget(widget, centered_rect(50, 30, frame.area()));
        }
        Modal::ExportAttachments { cursor, selected } => {
            let items = app
                .view
                .data
                .detail
                .as_ref()
                .map(|d| {
                    d.attachments
                        .iter()
                        .map(|a| format!("{} ({})", a.filename, crate::query::format_bytes(a.size)))
                        .collect()
                })
                .unwrap_or_default();
            let widget = SelectorWidget::new("Export Attachments", items, *cursor)
                .checked(selected)
                .hint("Space: toggle | a: all | n: none | Enter: export | Esc: cancel");
            frame.render_widget(widget, centered_rect(60, 50, frame.area()));
        }
    }
}

/// Creates a centered rectangle for dialogs
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppEvent;
    use crate::config::Tuning;
    use crate::query::{AggregateRow, MessageSummary};
    use ratatui::{Terminal, backend::TestBackend};

    fn draw(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal
            .draw(|f| render(f, app, &UiState::new()))
            .unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn test_centered_rect() {
        let area = Rect::new(0, 0, 100, 100);
        let centered = centered_rect(50, 50, area);

        assert!(centered.x > 0);
        assert!(centered.y > 0);
        assert!(centered.width < area.width);
        assert!(centered.height < area.height);
    }

    #[test]
    fn test_renders_aggregate_rows() {
        let mut app = App::new(Tuning::default());
        app.view.data.rows = vec![
            AggregateRow {
                key: "alice@example.com".into(),
                count: 12,
                ..AggregateRow::default()
            },
            AggregateRow {
                key: String::new(),
                count: 3,
                ..AggregateRow::default()
            },
        ];
        let text = draw(&app);
        assert!(text.contains("alice@example.com"));
        assert!(text.contains("(empty)"));
        assert!(text.contains("Senders"));
    }

    #[test]
    fn test_renders_message_list_and_search_line() {
        let mut app = App::new(Tuning::default());
        app.view.level = ViewLevel::MessageList;
        app.view.data.messages = vec![MessageSummary {
            id: 1,
            subject: "Quarterly report".into(),
            from_email: "bob@example.com".into(),
            ..MessageSummary::default()
        }];
        app.update(AppEvent::Key(crate::keys::Key::Char('/')));
        app.update(AppEvent::Key(crate::keys::Key::Char('q')));

        let text = draw(&app);
        assert!(text.contains("Quarterly report"));
        assert!(text.contains("/q"));
        assert!(text.contains("[Fast]"));
    }

    #[test]
    fn test_detail_marks_current_find_match() {
        let mut app = App::new(Tuning::default());
        app.view.level = ViewLevel::MessageDetail;
        app.view.data.detail = Some(crate::query::MessageDetail {
            subject: "Receipt".into(),
            body_text: "thanks\nyour invoice is attached".into(),
            ..crate::query::MessageDetail::default()
        });
        app.view.detail_search_query = "invoice".into();
        app.view.detail_search_matches = vec![6];

        let text = draw(&app);
        assert!(text.contains("▶ your invoice is attached"));
        assert!(text.contains("/invoice [1/1]"));

        app.view.detail_search_matches.clear();
        assert!(draw(&app).contains("/invoice [no matches]"));
    }

    #[test]
    fn test_busy_overlay_wins_over_flash() {
        let mut app = App::new(Tuning::default());
        app.flash("Exported 1 attachment(s)");
        app.busy = Some("Preparing deletion...".into());
        let text = draw(&app);
        assert!(text.contains("Preparing deletion..."));
        assert!(!text.contains("Exported 1"));
    }
}
