//! Terminal dashboard for the coordinator

use crate::network::{self, NetworkEvent};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    layout::{Constraint, Direction, Layout, Margin, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
    Frame, Terminal,
};
use std::io::stdout;
use std::time::Duration;
use tokio::sync::mpsc;
use watchparty_core::Coordinator;
use watchparty_server::config::ServerConfig;
use watchparty_server::metrics::{LogEntry, LogLevel, Metrics, ServerStatus};
use watchparty_server::AppState;

const TICK: Duration = Duration::from_millis(100);
const PAGE: usize = 10;

/// Position in the activity log. Offset 0 is the newest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogView {
    offset: usize,
    follow: bool,
}

impl Default for LogView {
    fn default() -> Self {
        Self { offset: 0, follow: true }
    }
}

impl LogView {
    fn older(&mut self, by: usize, total: usize) {
        if total == 0 {
            return;
        }
        self.offset = (self.offset + by).min(total - 1);
        self.follow = false;
    }

    fn newer(&mut self, by: usize) {
        self.offset = self.offset.saturating_sub(by);
        self.follow = self.offset == 0;
    }

    fn oldest(&mut self, total: usize) {
        self.older(total, total);
    }

    fn set_follow(&mut self, follow: bool) {
        self.follow = follow;
        if follow {
            self.offset = 0;
        }
    }

    /// Apply a key press. Returns true when the dashboard should close.
    fn on_key(&mut self, key: KeyEvent, total: usize) -> bool {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
            KeyCode::Up | KeyCode::Char('k') => self.older(1, total),
            KeyCode::Down | KeyCode::Char('j') => self.newer(1),
            KeyCode::PageUp => self.older(PAGE, total),
            KeyCode::PageDown => self.newer(PAGE),
            KeyCode::Home => self.oldest(total),
            KeyCode::End => self.set_follow(true),
            KeyCode::Char('a') => self.set_follow(!self.follow),
            _ => {}
        }
        false
    }
}

/// Build the state for dashboard mode
pub fn app_state(config: &ServerConfig) -> AppState {
    AppState::new(Coordinator::new(config.coordinator_config()))
}

/// Run the dashboard until the user quits
pub async fn run(config: ServerConfig, state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(ratatui::backend::CrosstermBackend::new(out))?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<NetworkEvent>();
    let server_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = network::run_with_dashboard(config, server_state, event_tx).await {
            tracing::error!("Server error: {}", e);
        }
    });

    let mut view = LogView::default();
    loop {
        // A failed bind leaves the error on screen; jump to it
        while let Ok(event) = event_rx.try_recv() {
            if let NetworkEvent::Failed(_) = event {
                view.set_follow(true);
            }
        }

        state.refresh_metrics();
        terminal.draw(|f| draw(f, &state.metrics.read(), &view))?;

        if !event::poll(TICK)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            let total = state.metrics.read().logs.len();
            if view.on_key(key, total) {
                break;
            }
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn draw(f: &mut Frame, m: &Metrics, view: &LogView) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Min(10),
            Constraint::Length(1),
        ])
        .split(f.area());

    f.render_widget(header(m), rows[0]);
    draw_stats(f, rows[1], m);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(rows[2]);
    f.render_widget(participants(m), body[0]);
    draw_logs(f, body[1], m, view);

    f.render_widget(footer(view), rows[3]);
}

fn header(m: &Metrics) -> Paragraph<'static> {
    let (status, color) = match m.status {
        ServerStatus::Starting => ("STARTING", Color::Yellow),
        ServerStatus::Running => ("RUNNING", Color::Green),
        ServerStatus::Error => ("ERROR", Color::Red),
    };
    let addr = m.listen_addr.clone().unwrap_or_else(|| "...".to_string());

    Paragraph::new(Line::from(vec![
        Span::styled("Watch Party Coordinator", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  │  "),
        Span::styled(status, Style::default().fg(color)),
        Span::raw("  │  ws://"),
        Span::styled(format!("{}/ws", addr), Style::default().fg(Color::Cyan)),
        Span::raw("  │  up "),
        Span::styled(m.uptime(), Style::default().fg(Color::Cyan)),
    ]))
    .block(Block::default().borders(Borders::ALL))
}

/// One labelled value per line inside a titled box
fn stat_block(title: &str, stats: Vec<(&'static str, String, Color)>) -> Paragraph<'static> {
    let lines: Vec<Line> = stats
        .into_iter()
        .map(|(label, value, color)| {
            Line::from(vec![
                Span::raw(format!("{}: ", label)),
                Span::styled(value, Style::default().fg(color)),
            ])
        })
        .collect();
    Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(format!(" {} ", title)))
}

fn draw_stats(f: &mut Frame, area: Rect, m: &Metrics) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 3); 3])
        .split(area);

    let connections = stat_block(
        "Connections",
        vec![
            ("Open", m.active_connections.to_string(), Color::Green),
            ("Since start", m.total_connections.to_string(), Color::White),
            ("Peak", m.peak_connections.to_string(), Color::Magenta),
        ],
    );
    let sessions = stat_block(
        "Sessions",
        vec![
            ("Live", m.active_sessions.to_string(), Color::Green),
            ("Created", m.sessions_created.to_string(), Color::White),
            ("Policy", m.join_policy.clone(), Color::Cyan),
        ],
    );
    let failures = if m.delivery_failures > 0 { Color::Red } else { Color::Green };
    let traffic = stat_block(
        "Traffic",
        vec![
            ("Joins", format!("{} ok / {} rejected", m.joins, m.join_rejections), Color::Yellow),
            ("Controls", m.controls_received.to_string(), Color::Cyan),
            ("Failed deliveries", m.delivery_failures.to_string(), failures),
        ],
    );

    f.render_widget(connections, cols[0]);
    f.render_widget(sessions, cols[1]);
    f.render_widget(traffic, cols[2]);
}

fn participants(m: &Metrics) -> List<'static> {
    let items: Vec<ListItem> = m
        .participant_list
        .iter()
        .map(|p| {
            let sessions = if p.sessions.is_empty() {
                "idle".to_string()
            } else {
                p.sessions.join(", ")
            };
            ListItem::new(Line::from(vec![
                Span::styled(p.participant_id.clone(), Style::default().fg(Color::Yellow)),
                Span::styled(
                    format!(" since {} ", p.connected_at.format("%H:%M")),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(sessions),
            ]))
        })
        .collect();

    List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Participants ({}) ", m.participant_list.len())),
    )
}

fn level_color(level: LogLevel) -> Color {
    match level {
        LogLevel::Info => Color::Blue,
        LogLevel::Warning => Color::Yellow,
        LogLevel::Error => Color::Red,
        LogLevel::Connection => Color::Green,
        LogLevel::Session => Color::Cyan,
        LogLevel::Control => Color::Magenta,
    }
}

fn log_line(entry: &LogEntry) -> ListItem<'static> {
    ListItem::new(Line::from(vec![
        Span::styled(
            entry.timestamp.format("%H:%M:%S ").to_string(),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!("{:<5} ", entry.level.as_str()),
            Style::default().fg(level_color(entry.level)),
        ),
        Span::raw(entry.message.clone()),
    ]))
}

fn draw_logs(f: &mut Frame, area: Rect, m: &Metrics, view: &LogView) {
    let height = area.height.saturating_sub(2) as usize;
    let total = m.logs.len();

    let items: Vec<ListItem> = m
        .logs
        .iter()
        .rev()
        .skip(view.offset)
        .take(height)
        .map(log_line)
        .collect();

    let position = match (view.follow, total) {
        (true, _) => " following".to_string(),
        (false, 0) => String::new(),
        (false, n) => format!(" {}/{}", n - view.offset, n),
    };
    f.render_widget(
        List::new(items).block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" Activity{} ", position)),
        ),
        area,
    );

    if total > height {
        let mut bar = ScrollbarState::new(total).position(total.saturating_sub(view.offset + height));
        f.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            area.inner(Margin { vertical: 1, horizontal: 0 }),
            &mut bar,
        );
    }
}

fn key_hint(key: &'static str, action: &'static str) -> [Span<'static>; 2] {
    [
        Span::styled(format!(" {} ", key), Style::default().fg(Color::Black).bg(Color::White)),
        Span::raw(format!(" {}  ", action)),
    ]
}

fn footer(view: &LogView) -> Paragraph<'static> {
    let mut spans: Vec<Span> = [
        key_hint("Q", "Quit"),
        key_hint("↑↓", "Scroll"),
        key_hint("PgUp/Dn", "Page"),
        key_hint("A", "Follow:"),
    ]
    .into_iter()
    .flatten()
    .collect();
    let (label, color) = if view.follow { ("on", Color::Green) } else { ("off", Color::Yellow) };
    spans.push(Span::styled(label, Style::default().fg(color)));
    Paragraph::new(Line::from(spans))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_scrolling_stops_following() {
        let mut view = LogView::default();
        assert!(!view.on_key(press(KeyCode::Up), 5));
        assert_eq!(view, LogView { offset: 1, follow: false });

        view.on_key(press(KeyCode::PageUp), 5);
        assert_eq!(view.offset, 4);

        view.on_key(press(KeyCode::PageDown), 5);
        assert_eq!(view, LogView::default());
    }

    #[test]
    fn test_empty_log_does_not_scroll() {
        let mut view = LogView::default();
        view.on_key(press(KeyCode::Home), 0);
        assert_eq!(view, LogView::default());
    }

    #[test]
    fn test_quit_keys() {
        let mut view = LogView::default();
        assert!(view.on_key(press(KeyCode::Char('q')), 0));
        assert!(view.on_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL), 0));
        assert!(!view.on_key(press(KeyCode::Char('c')), 0));
    }

    #[test]
    fn test_toggle_follow() {
        let mut view = LogView { offset: 3, follow: false };
        view.on_key(press(KeyCode::Char('a')), 10);
        assert_eq!(view, LogView::default());
        view.on_key(press(KeyCode::Char('a')), 10);
        assert!(!view.follow);
    }
}
