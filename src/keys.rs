//! Key decoding and per-level key maps.
//!
//! Precedence: ctrl+c, busy overlay, modal, open search line, then the map
//! of the current level.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::app::{App, Effect, Modal};
use crate::view_state::ViewLevel;

/// A key press with the terminal details stripped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Ctrl(char),
    Enter,
    Esc,
    Tab,
    BackTab,
    Backspace,
    Up,
    Down,
    Left,
    Right,
    PageUp,
    PageDown,
    Home,
    End,
}

impl Key {
    /// `None` for releases, repeats we don't handle, and keys with no binding
    pub fn from_event(event: KeyEvent) -> Option<Key> {
        if event.kind != KeyEventKind::Press {
            return None;
        }
        let key = match event.code {
            KeyCode::Char(c) if event.modifiers.contains(KeyModifiers::CONTROL) => Key::Ctrl(c),
            KeyCode::Char(c) => Key::Char(c),
            KeyCode::Enter => Key::Enter,
            KeyCode::Esc => Key::Esc,
            KeyCode::Tab => Key::Tab,
            KeyCode::BackTab => Key::BackTab,
            KeyCode::Backspace => Key::Backspace,
            KeyCode::Up => Key::Up,
            KeyCode::Down => Key::Down,
            KeyCode::Left => Key::Left,
            KeyCode::Right => Key::Right,
            KeyCode::PageUp => Key::PageUp,
            KeyCode::PageDown => Key::PageDown,
            KeyCode::Home => Key::Home,
            KeyCode::End => Key::End,
            _ => return None,
        };
        Some(key)
    }
}

impl App {
    pub(crate) fn handle_key(&mut self, key: Key) -> Vec<Effect> {
        if key == Key::Ctrl('c') {
            return self.request_quit();
        }
        // Keys are swallowed while a blocking operation runs
        if self.busy.is_some() {
            return Vec::new();
        }
        if self.modal.is_some() {
            return self.handle_modal_key(key);
        }
        if self.search.active {
            return self.handle_search_key(key);
        }
        if self.view.detail_search_input.is_some() {
            return self.handle_detail_search_key(key);
        }
        if let Some(effects) = self.handle_movement_key(key) {
            return effects;
        }

        match self.view.level {
            ViewLevel::Aggregates | ViewLevel::SubAggregate => self.handle_aggregate_key(key),
            ViewLevel::MessageList => self.handle_message_list_key(key),
            ViewLevel::MessageDetail => self.handle_detail_key(key),
            ViewLevel::ThreadView => self.handle_thread_key(key),
        }
    }

    /// Cursor keys shared by every level
    fn handle_movement_key(&mut self, key: Key) -> Option<Vec<Effect>> {
        let effects = match key {
            Key::Char('j') | Key::Down => self.move_cursor(1),
            Key::Char('k') | Key::Up => self.move_cursor(-1),
            Key::PageDown => self.page_down(self.page_rows(false)),
            Key::Ctrl('d') => self.page_down(self.page_rows(true)),
            Key::PageUp => self.move_cursor(-(self.page_rows(false) as isize)),
            Key::Ctrl('u') => self.move_cursor(-(self.page_rows(true) as isize)),
            Key::Home => self.jump_to_start(),
            Key::End => self.jump_to_end(),
            _ => return None,
        };
        Some(effects)
    }

    fn handle_aggregate_key(&mut self, key: Key) -> Vec<Effect> {
        match key {
            Key::Enter => self.enter_drill_down(),
            Key::Esc => {
                if self.view.level == ViewLevel::SubAggregate {
                    self.go_back()
                } else if !self.view.search_query.is_empty() {
                    self.cancel_search()
                } else {
                    Vec::new()
                }
            }
            Key::Char('a') => self.show_all_messages(),
            Key::Tab | Key::Char('g') => self.cycle_dimension(true),
            Key::BackTab => self.cycle_dimension(false),
            Key::Char('t') => self.press_time(),
            Key::Char('s') => self.cycle_sort(),
            Key::Char('r') | Key::Char('v') => self.reverse_sort(),
            Key::Char('/') => self.activate_search(),
            _ => self.handle_common_key(key),
        }
    }

    fn handle_message_list_key(&mut self, key: Key) -> Vec<Effect> {
        match key {
            Key::Enter => self.open_detail(false),
            Key::Esc => {
                if self.view.search_query.is_empty() {
                    self.go_back()
                } else {
                    self.cancel_search()
                }
            }
            Key::Tab | Key::Char('g') => {
                if self.view.drill_filter.is_constrained() {
                    self.enter_sub_aggregate()
                } else if key == Key::Char('g') {
                    self.go_to_top()
                } else {
                    Vec::new()
                }
            }
            Key::Char('t') => self.enter_time_sub_aggregate(),
            Key::Char('T') => self.open_thread(),
            Key::Char('s') => self.cycle_sort(),
            Key::Char('r') | Key::Char('v') => self.reverse_sort(),
            Key::Char('/') => self.activate_search(),
            _ => self.handle_common_key(key),
        }
    }

    fn handle_detail_key(&mut self, key: Key) -> Vec<Effect> {
        match key {
            Key::Left | Key::Char('h') => self.change_detail_message(-1),
            Key::Right | Key::Char('l') => self.change_detail_message(1),
            Key::Char('g') => self.jump_to_start(),
            Key::Char('G') => self.jump_to_end(),
            Key::Char('/') => {
                self.open_detail_search();
                Vec::new()
            }
            Key::Char('n') => self.step_detail_match(true),
            Key::Char('N') => self.step_detail_match(false),
            // A find query is cleared before leaving
            Key::Esc if !self.view.detail_search_query.is_empty() => {
                self.view.clear_detail_search();
                Vec::new()
            }
            Key::Esc | Key::Backspace => self.go_back(),
            Key::Char('T') => self.open_thread(),
            Key::Char('e') => self.open_export(),
            Key::Char('?') => self.open_modal(Modal::Help),
            Key::Char('q') => self.open_modal(Modal::QuitConfirm),
            _ => Vec::new(),
        }
    }

    fn handle_thread_key(&mut self, key: Key) -> Vec<Effect> {
        match key {
            Key::Enter => self.open_detail(true),
            Key::Esc | Key::Backspace => self.go_back(),
            Key::Char('?') => self.open_modal(Modal::Help),
            Key::Char('q') => self.open_modal(Modal::QuitConfirm),
            _ => Vec::new(),
        }
    }

    /// Selection, filters and overlays at list levels
    fn handle_common_key(&mut self, key: Key) -> Vec<Effect> {
        match key {
            Key::Char(' ') => {
                self.toggle_selection();
                Vec::new()
            }
            Key::Char('S') => {
                self.select_all_visible();
                Vec::new()
            }
            Key::Char('x') => {
                self.selection.clear();
                Vec::new()
            }
            Key::Char('d') => self.stage_selection(false),
            Key::Char('D') => self.stage_selection(true),
            Key::Char('A') => {
                let cursor = self
                    .account_filter
                    .and_then(|id| self.accounts.iter().position(|a| a.id == id))
                    .map_or(0, |i| i + 1);
                self.open_modal(Modal::AccountSelector { cursor })
            }
            Key::Char('f') => self.open_modal(Modal::AttachmentFilter {
                cursor: usize::from(self.attachments_only),
            }),
            Key::Char('?') => self.open_modal(Modal::Help),
            Key::Char('q') => self.open_modal(Modal::QuitConfirm),
            _ => Vec::new(),
        }
    }

    /// Keys while the find-in-message line is open
    fn handle_detail_search_key(&mut self, key: Key) -> Vec<Effect> {
        let Some(input) = self.view.detail_search_input.as_mut() else {
            return Vec::new();
        };
        match key {
            Key::Enter => self.commit_detail_search(),
            Key::Esc => {
                self.view.detail_search_input = None;
                Vec::new()
            }
            Key::Backspace => {
                input.pop();
                Vec::new()
            }
            Key::Char(c) => {
                input.push(c);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn open_modal(&mut self, modal: Modal) -> Vec<Effect> {
        self.modal = Some(modal);
        Vec::new()
    }

    fn handle_modal_key(&mut self, key: Key) -> Vec<Effect> {
        let Some(modal) = self.modal.take() else {
            return Vec::new();
        };
        match modal {
            Modal::Help => Vec::new(),
            Modal::QuitConfirm => match key {
                Key::Char('y') | Key::Char('Y') => self.request_quit(),
                _ => Vec::new(),
            },
            Modal::DeleteConfirm(staged) => match key {
                Key::Char('y') | Key::Char('Y') => {
                    self.busy = Some("Saving manifest...".to_string());
                    vec![Effect::SaveManifest(staged.manifest)]
                }
                Key::Char('n') | Key::Char('N') | Key::Esc => Vec::new(),
                _ => {
                    self.modal = Some(Modal::DeleteConfirm(staged));
                    Vec::new()
                }
            },
            Modal::AccountSelector { cursor } => {
                let len = self.accounts.len() + 1;
                match key {
                    Key::Enter => self.select_account(cursor),
                    Key::Esc => Vec::new(),
                    other => self.open_modal(Modal::AccountSelector {
                        cursor: move_in_list(cursor, other, len),
                    }),
                }
            }
            Modal::AttachmentFilter { cursor } => match key {
                Key::Enter => self.set_attachments_only(cursor == 1),
                Key::Esc => Vec::new(),
                other => self.open_modal(Modal::AttachmentFilter {
                    cursor: move_in_list(cursor, other, 2),
                }),
            },
            Modal::ExportAttachments {
                cursor,
                mut selected,
            } => {
                let len = self
                    .view
                    .data
                    .detail
                    .as_ref()
                    .map_or(0, |d| d.attachments.len());
                match key {
                    Key::Enter => self.export_selected(&selected),
                    Key::Esc => Vec::new(),
                    Key::Char(' ') => {
                        if !selected.remove(&cursor) {
                            selected.insert(cursor);
                        }
                        self.open_modal(Modal::ExportAttachments { cursor, selected })
                    }
                    Key::Char('a') => {
                        selected = (0..len).collect();
                        self.open_modal(Modal::ExportAttachments { cursor, selected })
                    }
                    Key::Char('n') => {
                        selected.clear();
                        self.open_modal(Modal::ExportAttachments { cursor, selected })
                    }
                    other => self.open_modal(Modal::ExportAttachments {
                        cursor: move_in_list(cursor, other, len),
                        selected,
                    }),
                }
            }
        }
    }
}

fn move_in_list(cursor: usize, key: Key, len: usize) -> usize {
    match key {
        Key::Char('j') | Key::Down => (cursor + 1).min(len.saturating_sub(1)),
        Key::Char('k') | Key::Up => cursor.saturating_sub(1),
        _ => cursor,
    }
}
