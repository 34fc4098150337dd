use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Frame,
};

use crate::actions::Action;
use crate::desktop::{ElementId, WindowEntry, WindowHandle};
use crate::kanban::{self, Assignment};
use crate::workers::{Worker, WorkerStatus};

/// Theme colors inspired by Claude Code
pub struct Theme {
    pub bg: Color,
    pub fg: Color,
    pub accent: Color,
    pub dim: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            bg: Color::Rgb(30, 30, 30),
            fg: Color::Rgb(220, 220, 220),
            accent: Color::Rgb(217, 119, 87), // Claude orange
            dim: Color::Rgb(100, 100, 100),
            success: Color::Rgb(80, 200, 120),
            warning: Color::Rgb(255, 193, 7),
            error: Color::Rgb(220, 53, 69),
        }
    }
}

/// Input mode for the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// Typing a command destined for the selected worker
    Command,
    /// Typing a role for a freshly spawned worker
    Spawning,
    /// Choosing a discovered window to connect
    Picking,
    /// Confirming a disconnect
    Confirming,
}

/// Main application state
pub struct App {
    /// Snapshot of tracked workers, re-pulled on every update notification
    pub workers: Vec<Worker>,
    /// Currently selected worker index
    pub list_state: ListState,
    /// Current message to display (info or error)
    pub error_message: Option<String>,
    /// Latest task assignments from the board
    pub assignments: Vec<Assignment>,
    /// Text shown in the mirror pane, keyed to the selected worker
    mirror_text: Option<String>,
    /// Windows offered by the connect picker
    pub picker_entries: Vec<WindowEntry>,
    pub picker_state: ListState,
    /// Theme
    pub theme: Theme,
    /// Current input mode
    pub input_mode: InputMode,
    /// Text input buffer
    pub input_buffer: String,
    /// Pending action queue
    pub pending_actions: Vec<Action>,
}

impl App {
    pub fn new() -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            workers: Vec::new(),
            list_state,
            error_message: None,
            assignments: Vec::new(),
            mirror_text: None,
            picker_entries: Vec::new(),
            picker_state: ListState::default(),
            theme: Theme::default(),
            input_mode: InputMode::Normal,
            input_buffer: String::new(),
            pending_actions: Vec::new(),
        }
    }

    /// Get the currently selected worker
    pub fn selected_worker(&self) -> Option<&Worker> {
        self.list_state.selected().and_then(|i| self.workers.get(i))
    }

    pub fn mirror_text(&self) -> Option<&str> {
        self.mirror_text.as_deref()
    }

    /// Take pending actions (drains the queue)
    pub fn take_pending_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.pending_actions)
    }

    /// Replace the worker snapshot after an update notification
    pub fn set_workers(&mut self, workers: Vec<Worker>) {
        self.workers = workers;
        if let Some(selected) = self.list_state.selected() {
            if selected >= self.workers.len() && !self.workers.is_empty() {
                self.list_state.select(Some(self.workers.len() - 1));
            }
        }
        self.refresh_mirror_from_selection();
    }

    fn selected_identity(&self) -> Option<(WindowHandle, ElementId)> {
        self.selected_worker().and_then(|w| w.identity())
    }

    fn refresh_mirror_from_selection(&mut self) {
        self.mirror_text = self
            .selected_worker()
            .and_then(|w| w.last_buffer.clone());
    }

    /// Handle an action and return whether to quit
    pub fn handle_action(&mut self, action: Action) -> Result<bool> {
        match action {
            Action::KeyPress(key) => self.handle_key(key),
            Action::BufferCaptured(handle, element_id, text) => {
                // Incremental path: only repaint the mirror if this identity
                // is the one on screen.
                if self.selected_identity() == Some((handle, element_id)) {
                    self.mirror_text = Some(text);
                }
                Ok(false)
            }
            Action::AssignmentsUpdated(assignments) => {
                for fresh in kanban::new_assignments(&self.assignments, &assignments) {
                    self.error_message = Some(format!(
                        "New task for {}: {}",
                        fresh.recipient, fresh.title
                    ));
                }
                self.assignments = assignments;
                Ok(false)
            }
            Action::WindowsListed(entries) => {
                if self.input_mode == InputMode::Picking {
                    self.picker_entries = entries;
                    self.picker_state
                        .select(if self.picker_entries.is_empty() {
                            None
                        } else {
                            Some(0)
                        });
                }
                Ok(false)
            }
            Action::Error(msg) | Action::Info(msg) => {
                self.error_message = Some(msg);
                Ok(false)
            }
            Action::Quit => Ok(true),
            _ => Ok(false),
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        // Clear transient message on any key press
        if self.error_message.is_some() && self.input_mode == InputMode::Normal {
            self.error_message = None;
        }

        match self.input_mode {
            InputMode::Normal => self.handle_normal_key(key),
            InputMode::Command => self.handle_command_key(key),
            InputMode::Spawning => self.handle_spawning_key(key),
            InputMode::Picking => self.handle_picking_key(key),
            InputMode::Confirming => self.handle_confirming_key(key),
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('j') | KeyCode::Down => self.next_worker(),
            KeyCode::Char('k') | KeyCode::Up => self.previous_worker(),
            KeyCode::Enter => {
                if self.selected_worker().is_some() {
                    self.input_mode = InputMode::Command;
                    self.input_buffer.clear();
                }
            }
            KeyCode::Char('n') => {
                self.input_mode = InputMode::Spawning;
                self.input_buffer.clear();
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(true);
            }
            KeyCode::Char('c') => {
                self.input_mode = InputMode::Picking;
                self.picker_entries.clear();
                self.picker_state.select(None);
                self.pending_actions.push(Action::RefreshWindows);
            }
            KeyCode::Char('d') => {
                if self.selected_worker().is_some() {
                    self.input_mode = InputMode::Confirming;
                }
            }
            KeyCode::Char('y') => {
                self.pending_actions.push(Action::CopyBuffer);
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_command_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Enter => {
                if !self.input_buffer.is_empty() {
                    if let Some(serial) = self.selected_worker().map(|w| w.serial) {
                        let command = std::mem::take(&mut self.input_buffer);
                        self.pending_actions
                            .push(Action::SendCommand(serial, command));
                    }
                }
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Esc => {
                self.input_buffer.clear();
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Char(c) => {
                self.input_buffer.push(c);
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_spawning_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Enter => {
                if !self.input_buffer.is_empty() {
                    let role = std::mem::take(&mut self.input_buffer);
                    self.pending_actions.push(Action::SpawnWorker(role));
                }
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Esc => {
                self.input_buffer.clear();
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Char(c) => {
                // Only allow valid role name characters
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    self.input_buffer.push(c);
                }
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_picking_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Char('r') => {
                self.pending_actions.push(Action::RefreshWindows);
            }
            KeyCode::Char('j') | KeyCode::Down => {
                step_selection(&mut self.picker_state, self.picker_entries.len(), 1);
            }
            KeyCode::Char('k') | KeyCode::Up => {
                step_selection(&mut self.picker_state, self.picker_entries.len(), -1);
            }
            KeyCode::Enter => {
                if let Some(entry) = self
                    .picker_state
                    .selected()
                    .and_then(|i| self.picker_entries.get(i))
                {
                    self.pending_actions
                        .push(Action::ConnectWindow(entry.clone()));
                }
                self.input_mode = InputMode::Normal;
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_confirming_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                if let Some(worker) = self.selected_worker() {
                    self.pending_actions
                        .push(Action::DisconnectWorker(worker.serial));
                }
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
            }
            _ => {}
        }
        Ok(false)
    }

    fn next_worker(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        step_selection(&mut self.list_state, self.workers.len(), 1);
        self.refresh_mirror_from_selection();
    }

    fn previous_worker(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        step_selection(&mut self.list_state, self.workers.len(), -1);
        self.refresh_mirror_from_selection();
    }

    fn worker_has_task(&self, worker: &Worker) -> bool {
        self.assignments
            .iter()
            .any(|a| a.is_for(&worker.kanban_label))
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(0),    // Main content
                Constraint::Length(3), // Footer/status
            ])
            .split(frame.area());

        self.render_header(frame, chunks[0]);
        self.render_main(frame, chunks[1]);
        self.render_footer(frame, chunks[2]);

        // Render modal dialogs on top
        match self.input_mode {
            InputMode::Command => self.render_command_dialog(frame),
            InputMode::Spawning => self.render_spawn_dialog(frame),
            InputMode::Picking => self.render_picker_dialog(frame),
            InputMode::Confirming => self.render_confirm_dialog(frame),
            InputMode::Normal => {}
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let title = Paragraph::new(Line::from(vec![
            Span::styled(
                " AgentDeck ",
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                "│ Terminal Mirror for AI Agents",
                Style::default().fg(self.theme.dim),
            ),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(title, area);
    }

    fn render_main(&mut self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(40), // Worker table
                Constraint::Percentage(60), // Mirror pane
            ])
            .split(area);

        self.render_worker_list(frame, chunks[0]);
        self.render_mirror_pane(frame, chunks[1]);
    }

    fn render_worker_list(&mut self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = if self.workers.is_empty() {
            vec![ListItem::new(Line::from(Span::styled(
                "  No workers. Press 'n' to spawn or 'c' to connect one.",
                Style::default().fg(self.theme.dim),
            )))]
        } else {
            self.workers
                .iter()
                .map(|worker| {
                    let status_icon = match worker.status {
                        WorkerStatus::Online => {
                            Span::styled("● ", Style::default().fg(self.theme.success))
                        }
                        WorkerStatus::Starting => {
                            Span::styled("○ ", Style::default().fg(self.theme.warning))
                        }
                        WorkerStatus::Offline => {
                            Span::styled("✗ ", Style::default().fg(self.theme.error))
                        }
                    };

                    let mut spans = vec![
                        status_icon,
                        Span::styled(&worker.display_title, Style::default().fg(self.theme.fg)),
                        Span::styled(
                            format!("  {}", worker.activity.label()),
                            Style::default().fg(self.theme.dim),
                        ),
                        Span::styled(
                            format!("  {}", worker.elapsed),
                            Style::default().fg(self.theme.dim),
                        ),
                    ];
                    if self.worker_has_task(worker) {
                        spans.push(Span::styled(
                            "  ▲ task",
                            Style::default().fg(self.theme.warning),
                        ));
                    }

                    ListItem::new(Line::from(spans))
                })
                .collect()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .title(" Workers ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.theme.dim)),
            )
            .highlight_style(
                Style::default()
                    .bg(Color::Rgb(50, 50, 50))
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▶ ");

        frame.render_stateful_widget(list, area, &mut self.list_state);
    }

    fn render_mirror_pane(&self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4), // Worker detail
                Constraint::Min(0),    // Live mirror
            ])
            .split(area);

        self.render_worker_detail(frame, chunks[0]);

        let mirror_area = chunks[1];
        let visible_lines = mirror_area.height.saturating_sub(2) as usize;
        let content: Vec<Line> = match &self.mirror_text {
            Some(text) => {
                let lines: Vec<&str> = text.lines().collect();
                let start = lines.len().saturating_sub(visible_lines);
                lines[start..]
                    .iter()
                    .map(|l| Line::from(Span::styled(*l, Style::default().fg(self.theme.fg))))
                    .collect()
            }
            None => vec![Line::from(Span::styled(
                "No buffer captured yet",
                Style::default().fg(self.theme.dim),
            ))],
        };

        let mirror = Paragraph::new(content).block(
            Block::default()
                .title(" Mirror ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(mirror, mirror_area);
    }

    fn render_worker_detail(&self, frame: &mut Frame, area: Rect) {
        let content = if let Some(worker) = self.selected_worker() {
            vec![
                Line::from(vec![
                    Span::styled("Id: ", Style::default().fg(self.theme.dim)),
                    Span::styled(&worker.id, Style::default().fg(self.theme.fg)),
                    Span::styled("  Role: ", Style::default().fg(self.theme.dim)),
                    Span::styled(&worker.role, Style::default().fg(self.theme.fg)),
                ]),
                Line::from(vec![
                    Span::styled("Status: ", Style::default().fg(self.theme.dim)),
                    Span::styled(
                        worker.status.label(),
                        Style::default().fg(match worker.status {
                            WorkerStatus::Online => self.theme.success,
                            WorkerStatus::Starting => self.theme.warning,
                            WorkerStatus::Offline => self.theme.error,
                        }),
                    ),
                    Span::styled(
                        format!(
                            "  cache {}  hits {}  walks {}{}",
                            if worker.cached { "hit" } else { "miss" },
                            worker.hits,
                            worker.walks,
                            if worker.log_path.is_some() {
                                "  transcript"
                            } else {
                                ""
                            }
                        ),
                        Style::default().fg(self.theme.dim),
                    ),
                ]),
            ]
        } else {
            vec![Line::from(Span::styled(
                "No worker selected",
                Style::default().fg(self.theme.dim),
            ))]
        };

        let detail = Paragraph::new(content).block(
            Block::default()
                .title(" Details ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(detail, area);
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let help_text =
            " q: Quit │ j/k: Navigate │ Enter: Command │ n: Spawn │ c: Connect │ d: Disconnect │ y: Copy buffer ";

        let content = if let Some(ref msg) = self.error_message {
            let style = if msg.contains("copied") || msg.contains("New task") {
                Style::default().fg(self.theme.success)
            } else {
                Style::default().fg(self.theme.error)
            };
            Line::from(Span::styled(format!(" {} ", msg), style))
        } else {
            Line::from(Span::styled(help_text, Style::default().fg(self.theme.dim)))
        };

        let footer = Paragraph::new(content).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(footer, area);
    }

    fn render_command_dialog(&self, frame: &mut Frame) {
        let area = centered_rect(60, 20, frame.area());

        frame.render_widget(Clear, area);

        let target = self
            .selected_worker()
            .map(|w| w.display_title.as_str())
            .unwrap_or("unknown");
        let block = Block::default()
            .title(format!(" Send to {} ", target))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.theme.accent));

        let inner = block.inner(area);
        frame.render_widget(block, area);

        let text = vec![
            Line::from(""),
            Line::from(Span::styled(
                "Command is typed into the worker's terminal:",
                Style::default().fg(self.theme.fg),
            )),
            Line::from(""),
            Line::from(Span::styled(
                format!("▶ {}_", self.input_buffer),
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Press Enter to send, Esc to cancel. Sending steals focus briefly.",
                Style::default().fg(self.theme.dim),
            )),
        ];

        let paragraph = Paragraph::new(text);
        frame.render_widget(paragraph, inner);
    }

    fn render_spawn_dialog(&self, frame: &mut Frame) {
        let area = centered_rect(50, 20, frame.area());

        frame.render_widget(Clear, area);

        let block = Block::default()
            .title(" Spawn Worker ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.theme.accent));

        let inner = block.inner(area);
        frame.render_widget(block, area);

        let text = vec![
            Line::from(""),
            Line::from(Span::styled(
                "Enter role for the new worker:",
                Style::default().fg(self.theme.fg),
            )),
            Line::from(""),
            Line::from(Span::styled(
                format!("▶ {}_", self.input_buffer),
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Press Enter to spawn, Esc to cancel",
                Style::default().fg(self.theme.dim),
            )),
        ];

        let paragraph = Paragraph::new(text);
        frame.render_widget(paragraph, inner);
    }

    fn render_picker_dialog(&mut self, frame: &mut Frame) {
        let area = centered_rect(60, 60, frame.area());

        frame.render_widget(Clear, area);

        let block = Block::default()
            .title(" Connect Window ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.theme.accent));

        let inner = block.inner(area);
        frame.render_widget(block, area);

        let items: Vec<ListItem> = if self.picker_entries.is_empty() {
            vec![ListItem::new(Line::from(Span::styled(
                "  Scanning terminal windows...",
                Style::default().fg(self.theme.dim),
            )))]
        } else {
            self.picker_entries
                .iter()
                .map(|entry| {
                    ListItem::new(Line::from(vec![
                        Span::styled(&entry.display_name, Style::default().fg(self.theme.fg)),
                        Span::styled(
                            format!("  {}:{}", entry.handle, entry.element_id.short()),
                            Style::default().fg(self.theme.dim),
                        ),
                    ]))
                })
                .collect()
        };

        let list = List::new(items)
            .highlight_style(
                Style::default()
                    .bg(Color::Rgb(50, 50, 50))
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▶ ");

        frame.render_stateful_widget(list, inner, &mut self.picker_state);
    }

    fn render_confirm_dialog(&self, frame: &mut Frame) {
        let area = centered_rect(50, 20, frame.area());

        frame.render_widget(Clear, area);

        let block = Block::default()
            .title(" Confirm Disconnect ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.theme.error));

        let inner = block.inner(area);
        frame.render_widget(block, area);

        let worker_name = self
            .selected_worker()
            .map(|w| w.display_title.as_str())
            .unwrap_or("unknown");

        let text = vec![
            Line::from(""),
            Line::from(Span::styled(
                format!("Stop tracking '{}'?", worker_name),
                Style::default().fg(self.theme.fg),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "The terminal keeps running; only the mirror disconnects.",
                Style::default().fg(self.theme.warning),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Press 'y' to confirm, 'n' or Esc to cancel",
                Style::default().fg(self.theme.dim),
            )),
        ];

        let paragraph = Paragraph::new(text);
        frame.render_widget(paragraph, inner);
    }
}

fn step_selection(state: &mut ListState, len: usize, delta: isize) {
    if len == 0 {
        state.select(None);
        return;
    }
    let current = state.selected().unwrap_or(0) as isize;
    let next = (current + delta).rem_euclid(len as isize) as usize;
    state.select(Some(next));
}

/// Helper function to create a centered rectangle
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
