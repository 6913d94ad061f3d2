use std::collections::VecDeque;
use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers, MouseEventKind};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Margin, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, Borders, Cell, Clear, Gauge, Paragraph, Row, Scrollbar, ScrollbarOrientation,
    ScrollbarState, Table, TableState, Tabs, Wrap,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info};

use super::backend::ControlAction;
use super::data_io;
use super::error::Result;
use super::filter::{Classification, ContentBucket, LinkTable, StatusBucket};
use super::model::{RunStatus, Severity};
use super::runtime::{LiveLink, TerminalSession, merge_snapshot};
use super::tabs::Tab;
use super::types::CrawlEvent;
use super::ui_utils::{TableRow, centered_rect, point_in_rect, severity_style, status_code_style};
use super::window::DEFAULT_DEBOUNCE;

const PAGE_JUMP_STEP: usize = 10;
const WHEEL_STEP: i64 = 3;
const MAX_MESSAGES: usize = 50;

pub struct TuiOptions {
    pub label: String,
    pub export_dir: PathBuf,
    pub save: Option<PathBuf>,
    pub auto_close: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageKind {
    Status,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptKind {
    Search(LinkTable),
    StartUrl,
}

#[derive(Debug)]
struct Prompt {
    kind: PromptKind,
    input: String,
}

#[derive(Debug, Default)]
struct UiState {
    selected: [usize; 6],
    messages: VecDeque<(MessageKind, String)>,
    done: bool,
    help: bool,
    prompt: Option<Prompt>,
    table_area: Option<Rect>,
    viewport_lines: u32,
    settle_until: Option<Instant>,
}

impl UiState {
    fn push(&mut self, kind: MessageKind, message: String) {
        self.messages.push_back((kind, message));
        while self.messages.len() > MAX_MESSAGES {
            self.messages.pop_front();
        }
    }

    fn scrolled(&mut self) {
        self.settle_until = Some(Instant::now() + DEFAULT_DEBOUNCE * 3);
    }

    fn poll_timeout(&self, tick_rate: Duration, last_tick: Instant) -> Duration {
        let remaining = tick_rate.saturating_sub(last_tick.elapsed());
        match self.settle_until {
            Some(until) if Instant::now() < until => remaining.min(DEFAULT_DEBOUNCE),
            _ => remaining,
        }
    }
}

pub(crate) fn draw_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    session: &mut TerminalSession,
    mut live: Option<&mut LiveLink>,
    options: TuiOptions,
    rx: &mut UnboundedReceiver<CrawlEvent>,
) -> io::Result<()> {
    let mut ui = UiState::default();
    let mut last_tick = Instant::now();
    let tick_rate = Duration::from_millis(120);

    loop {
        while let Ok(event) = rx.try_recv() {
            let current = live.as_deref().map_or(0, LiveLink::generation);
            if apply_event(session, &mut ui, current, event)
                && let Some(link) = live.as_deref_mut()
            {
                link.spawn_poller();
            }
        }

        session.pump(Instant::now());

        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(5),
                    Constraint::Length(3),
                    Constraint::Min(6),
                    Constraint::Length(4),
                ])
                .split(f.area());

            draw_header(f, chunks[0], session, &options, &ui);
            draw_tabs(f, chunks[1], session);
            ui.table_area = Some(chunks[2]);
            draw_table(f, chunks[2], session, &ui);
            draw_footer(f, chunks[3], session, &ui);

            if ui.help {
                draw_help(f);
            } else if let Some(prompt) = ui.prompt.as_ref() {
                draw_prompt(f, prompt);
            }
        })?;

        if let Some(area) = ui.table_area {
            // borders plus the header row
            let lines = u32::from(area.height.saturating_sub(3));
            if lines != ui.viewport_lines {
                ui.viewport_lines = lines;
                session.resize(lines);
                ui.scrolled();
            }
        }

        let timeout = ui.poll_timeout(tick_rate, last_tick);
        if event::poll(timeout)? {
            match event::read()? {
                Event::Key(key) => {
                    if ui.help {
                        if matches!(
                            key.code,
                            KeyCode::Esc | KeyCode::Enter | KeyCode::Char('?')
                        ) {
                            ui.help = false;
                        }
                    } else if ui.prompt.is_some() {
                        handle_prompt_key(key, session, live.as_deref(), &mut ui);
                    } else if !handle_key(key, session, live.as_deref(), &options, &mut ui) {
                        break;
                    }
                }
                Event::Mouse(mouse) => {
                    if ui.help || ui.prompt.is_some() {
                        continue;
                    }
                    let delta = match mouse.kind {
                        MouseEventKind::ScrollDown => WHEEL_STEP,
                        MouseEventKind::ScrollUp => -WHEEL_STEP,
                        _ => 0,
                    };
                    if delta != 0
                        && let Some(area) = ui.table_area
                        && point_in_rect(mouse.column, mouse.row, area)
                    {
                        let tab = session.active_tab();
                        if let Some(view) = session.view_mut(tab) {
                            view.scroll_by_rows(delta);
                            ui.scrolled();
                        }
                    }
                }
                _ => {}
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if ui.done && options.auto_close {
            break;
        }
    }

    Ok(())
}

/// Folds one background event into the session and the UI. Returns true
/// when a new crawl started and the poller has to be replaced.
fn apply_event(
    session: &mut TerminalSession,
    ui: &mut UiState,
    current: u64,
    event: CrawlEvent,
) -> bool {
    match event {
        CrawlEvent::Snapshot {
            generation,
            response,
            ack,
        } => {
            merge_snapshot(session, current, generation, *response, ack);
        }
        CrawlEvent::Started(url) => {
            session.reset();
            ui.selected = [0; 6];
            ui.done = false;
            ui.push(MessageKind::Status, format!("crawl started: {url}"));
            return true;
        }
        CrawlEvent::Finished(generation) if generation == current => {
            ui.done = true;
            ui.push(MessageKind::Status, "crawl finished".to_string());
        }
        CrawlEvent::Finished(_) => {}
        CrawlEvent::Status(message) => ui.push(MessageKind::Status, message),
        CrawlEvent::Warning(message) => ui.push(MessageKind::Warning, message),
        CrawlEvent::Error(message) => ui.push(MessageKind::Error, message),
    }
    false
}

/// Returns false when the loop should exit.
fn handle_key(
    key: KeyEvent,
    session: &mut TerminalSession,
    live: Option<&LiveLink>,
    options: &TuiOptions,
    ui: &mut UiState,
) -> bool {
    let tab = session.active_tab();
    match key.code {
        KeyCode::Char('q') => return false,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return false,
        KeyCode::Tab => session.activate(tab.next()),
        KeyCode::BackTab => session.activate(tab.prev()),
        KeyCode::Char(ch @ '1'..='6') => {
            if let Some(next) = Tab::from_hotkey(ch) {
                session.activate(next);
            }
        }
        KeyCode::Char('f') => {
            let label = if tab.url_table().is_some() {
                session.cycle_filter().label().to_string()
            } else if let Some(table) = tab.link_table() {
                session
                    .cycle_link_status(table)
                    .map(StatusBucket::label)
                    .unwrap_or("all")
                    .to_string()
            } else {
                session
                    .cycle_severity()
                    .map(|s| s.label())
                    .unwrap_or("all")
                    .to_string()
            };
            ui.selected[tab.as_index()] = 0;
            ui.push(MessageKind::Status, format!("filter: {label}"));
        }
        KeyCode::Char('F') => {
            if tab.url_table().is_some() {
                session.apply_filter(Classification::All);
            } else if let Some(table) = tab.link_table() {
                session.set_link_search(table, "");
                while session.filters().link_filter(table).status.is_some() {
                    session.cycle_link_status(table);
                }
            } else {
                session.set_severity(None);
            }
            ui.selected[tab.as_index()] = 0;
            ui.push(MessageKind::Status, "filters cleared".to_string());
        }
        KeyCode::Char('/') => {
            if let Some(table) = tab.link_table() {
                ui.prompt = Some(Prompt {
                    kind: PromptKind::Search(table),
                    input: session.filters().link_filter(table).search.clone(),
                });
            }
        }
        KeyCode::Char('?') => ui.help = true,
        KeyCode::Char('e') => match export_tab(session, tab, &options.export_dir) {
            Ok((path, rows)) => {
                info!(path = %path.display(), rows, "exported table");
                ui.push(
                    MessageKind::Status,
                    format!("exported {rows} rows to {}", path.display()),
                );
            }
            Err(err) => {
                error!(error = %err, "export failed");
                ui.push(MessageKind::Error, format!("export failed: {err}"));
            }
        },
        KeyCode::Char('w') => match options.save.as_deref() {
            Some(path) => match data_io::save_snapshot(path, session.store()) {
                Ok(()) => ui.push(
                    MessageKind::Status,
                    format!("saved snapshot to {}", path.display()),
                ),
                Err(err) => ui.push(MessageKind::Error, format!("save failed: {err}")),
            },
            None => ui.push(
                MessageKind::Warning,
                "no --save path configured".to_string(),
            ),
        },
        KeyCode::Char('p') => match live {
            Some(link) => {
                let action = if session.store().paused() {
                    ControlAction::Resume
                } else {
                    ControlAction::Pause
                };
                link.send_control(action);
            }
            None => ui.push(MessageKind::Warning, "not connected to a live crawl".into()),
        },
        KeyCode::Char('x') => match live {
            Some(link) => link.send_control(ControlAction::Stop),
            None => ui.push(MessageKind::Warning, "not connected to a live crawl".into()),
        },
        KeyCode::Char('S') => {
            if live.is_some() {
                ui.prompt = Some(Prompt {
                    kind: PromptKind::StartUrl,
                    input: String::new(),
                });
            } else {
                ui.push(MessageKind::Warning, "not connected to a live crawl".into());
            }
        }
        KeyCode::Up | KeyCode::Char('k') => move_selection(session, ui, -1),
        KeyCode::Down | KeyCode::Char('j') => move_selection(session, ui, 1),
        KeyCode::PageUp => move_selection(session, ui, -(PAGE_JUMP_STEP as i64)),
        KeyCode::PageDown => move_selection(session, ui, PAGE_JUMP_STEP as i64),
        KeyCode::Home | KeyCode::Char('g') => move_selection(session, ui, i64::MIN),
        KeyCode::End | KeyCode::Char('G') => move_selection(session, ui, i64::MAX),
        _ => {}
    }
    true
}

fn handle_prompt_key(
    key: KeyEvent,
    session: &mut TerminalSession,
    live: Option<&LiveLink>,
    ui: &mut UiState,
) {
    let Some(prompt) = ui.prompt.as_mut() else {
        return;
    };
    match key.code {
        KeyCode::Esc => {
            ui.prompt = None;
            return;
        }
        KeyCode::Enter => {
            let kind = prompt.kind;
            let input = prompt.input.trim().to_string();
            ui.prompt = None;
            match kind {
                PromptKind::Search(table) => {
                    session.set_link_search(table, &input);
                    ui.selected[Tab::from(table).as_index()] = 0;
                }
                PromptKind::StartUrl if input.is_empty() => {}
                PromptKind::StartUrl => {
                    if let Some(link) = live {
                        link.send_control(ControlAction::Start { url: input });
                    }
                }
            }
            return;
        }
        KeyCode::Backspace => {
            prompt.input.pop();
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            prompt.input.clear();
        }
        KeyCode::Char(ch) => {
            if !key
                .modifiers
                .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
            {
                prompt.input.push(ch);
            }
        }
        _ => {}
    }
    // Link search narrows as you type.
    if let PromptKind::Search(table) = prompt.kind {
        let input = prompt.input.clone();
        session.set_link_search(table, &input);
        ui.selected[Tab::from(table).as_index()] = 0;
    }
}

fn move_selection(session: &mut TerminalSession, ui: &mut UiState, delta: i64) {
    let tab = session.active_tab();
    let Some(view) = session.view_mut(tab) else {
        return;
    };
    let len = view.len();
    let slot = &mut ui.selected[tab.as_index()];
    if len == 0 {
        *slot = 0;
        return;
    }
    let current = (*slot).min(len - 1) as i64;
    let next = current.saturating_add(delta).clamp(0, len as i64 - 1) as usize;
    *slot = next;
    view.scroll_into_view(next);
    ui.scrolled();
}

/// Writes the active tab's current filtered view to a CSV file.
pub(crate) fn export_tab(
    session: &TerminalSession,
    tab: Tab,
    dir: &Path,
) -> Result<(PathBuf, usize)> {
    let base_url = session.store().stats().base_url.as_deref();
    let kind = match tab {
        Tab::Overview => "urls",
        Tab::InternalUrls => "internal_urls",
        Tab::ExternalUrls => "external_urls",
        Tab::InternalLinks => "internal_links",
        Tab::ExternalLinks => "external_links",
        Tab::Issues => "issues",
    };
    let path = data_io::default_export_path(dir, base_url, kind);
    let out = data_io::create_export(&path)?;
    let rows = match (tab.url_table(), tab.link_table()) {
        (Some(table), _) => data_io::export_urls(out, &session.current_urls(table))?,
        (_, Some(table)) => data_io::export_links(
            out,
            &session.current_links(table),
            session.store().classifier(),
        )?,
        _ => data_io::export_issues(out, &session.current_issues())?,
    };
    Ok((path, rows))
}

fn draw_header(
    f: &mut ratatui::Frame,
    area: Rect,
    session: &TerminalSession,
    options: &TuiOptions,
    ui: &UiState,
) {
    let store = session.store();
    let stats = store.stats();
    let counts = session.url_counts();
    let status = store.run_status();
    let metric_label = Style::default().fg(Color::Gray);
    let sep_style = Style::default().fg(Color::DarkGray);

    let title = match (ui.done, options.auto_close) {
        (true, true) => "crawlwatch - finished (auto-closing)".to_string(),
        (true, false) => "crawlwatch - finished (press q to quit)".to_string(),
        (false, _) => format!("crawlwatch - {} (press ? for help)", status.label()),
    };

    let mut first = vec![
        Span::styled("Crawled ", metric_label),
        Span::styled(
            stats.crawled.to_string(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled("  |  ", sep_style),
        Span::styled("Discovered ", metric_label),
        Span::styled(
            stats.discovered.to_string(),
            Style::default().fg(Color::LightCyan),
        ),
        Span::styled("  |  ", sep_style),
        Span::styled("Depth ", metric_label),
        Span::raw(stats.depth.to_string()),
        Span::styled("  |  ", sep_style),
        Span::styled("Speed ", metric_label),
        Span::raw(format!("{:.1}/s", stats.speed)),
        Span::styled("  |  ", sep_style),
        Span::styled(
            options.label.clone(),
            Style::default().fg(Color::White),
        ),
    ];
    if store.paused() {
        first.push(Span::styled(
            "  PAUSED",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ));
    }
    if store.running_pagespeed() {
        first.push(Span::styled("  pagespeed", Style::default().fg(Color::Magenta)));
    }

    let mut buckets = vec![Span::styled("Status  ", metric_label)];
    for bucket in StatusBucket::ALL {
        buckets.push(Span::styled(
            format!("{} ", bucket.label()),
            status_code_style(Some(match bucket {
                StatusBucket::Success => 200,
                StatusBucket::Redirect => 300,
                StatusBucket::ClientError => 400,
                StatusBucket::ServerError => 500,
            })),
        ));
        buckets.push(Span::raw(format!("{}   ", counts.status_count(bucket))));
    }
    buckets.push(Span::styled("none ", Style::default().fg(Color::DarkGray)));
    buckets.push(Span::raw(counts.no_status.to_string()));
    buckets.push(Span::styled("  |  ", sep_style));
    for bucket in ContentBucket::ALL {
        buckets.push(Span::styled(format!("{} ", bucket.label()), metric_label));
        buckets.push(Span::raw(format!("{}  ", counts.content_count(bucket))));
    }

    let lines = vec![
        Line::from(first),
        Line::from(buckets),
        Line::from(vec![
            Span::styled("Base  ", metric_label),
            Span::raw(stats.base_url.clone().unwrap_or_else(|| "-".to_string())),
            Span::styled("  |  ", sep_style),
            Span::styled("Filter ", metric_label),
            Span::styled(
                session.filters().global.label(),
                Style::default().fg(Color::Yellow),
            ),
            Span::raw(format!(" ({} of {})", counts.matched, counts.total)),
        ]),
    ];

    let header_area = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(40), Constraint::Length(28)])
        .split(area);
    let border = if ui.done || status == RunStatus::Completed {
        Color::Green
    } else {
        Color::Cyan
    };
    f.render_widget(
        Paragraph::new(lines)
            .block(
                Block::default()
                    .title(title)
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(border)),
            )
            .wrap(Wrap { trim: true }),
        header_area[0],
    );

    let ratio = (store.progress() / 100.0).clamp(0.0, 1.0);
    f.render_widget(
        Gauge::default()
            .block(Block::default().title("Progress").borders(Borders::ALL))
            .gauge_style(
                Style::default()
                    .fg(border)
                    .bg(Color::Black)
                    .add_modifier(Modifier::BOLD),
            )
            .ratio(ratio)
            .label(format!("{:.1}%", ratio * 100.0)),
        header_area[1],
    );
}

fn tab_badge(session: &TerminalSession, tab: Tab) -> usize {
    match (tab.url_table(), tab.link_table()) {
        (Some(table), _) => session.url_engine(table).map_or(0, |e| e.len()),
        (_, Some(LinkTable::Internal)) => session.link_totals().internal,
        (_, Some(LinkTable::External)) => session.link_totals().external,
        _ => session.issue_counts().total,
    }
}

fn draw_tabs(f: &mut ratatui::Frame, area: Rect, session: &TerminalSession) {
    let hotkey_style = Style::default()
        .fg(Color::White)
        .add_modifier(Modifier::BOLD);
    let tab_label_style = Style::default().fg(Color::Gray);
    let titles = Tab::ALL.iter().map(|&tab| {
        let mut spans = vec![
            Span::styled(tab.hotkey().to_string(), hotkey_style),
            Span::styled(format!(" {} ", tab.title()), tab_label_style),
            Span::styled(
                tab_badge(session, tab).to_string(),
                Style::default().fg(Color::DarkGray),
            ),
        ];
        if session.is_parked(tab) {
            spans.push(Span::styled("*", Style::default().fg(Color::Yellow)));
        }
        Line::from(spans)
    });
    f.render_widget(
        Tabs::new(titles)
            .select(session.active_tab().as_index())
            .block(Block::default().borders(Borders::ALL))
            .highlight_style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
        area,
    );
}

fn columns(tab: Tab) -> (&'static [&'static str], Vec<Constraint>) {
    match tab {
        Tab::InternalLinks | Tab::ExternalLinks => (
            &["Status", "Source", "Target", "Anchor", "Domain"],
            vec![
                Constraint::Length(7),
                Constraint::Percentage(30),
                Constraint::Percentage(35),
                Constraint::Percentage(20),
                Constraint::Min(10),
            ],
        ),
        Tab::Issues => (
            &["Severity", "Category", "Issue", "URL"],
            vec![
                Constraint::Length(9),
                Constraint::Length(16),
                Constraint::Percentage(45),
                Constraint::Min(20),
            ],
        ),
        _ => (
            &["Status", "Type", "Size", "ms", "Depth", "Title", "URL"],
            vec![
                Constraint::Length(7),
                Constraint::Length(18),
                Constraint::Length(9),
                Constraint::Length(6),
                Constraint::Length(6),
                Constraint::Percentage(30),
                Constraint::Min(20),
            ],
        ),
    }
}

fn table_row(tab: Tab, row: &TableRow) -> Row<'static> {
    let cells = row.cells.iter().enumerate().map(|(idx, text)| {
        let cell = Cell::from(text.clone());
        match (tab, idx) {
            (Tab::Issues, 0) => match row.severity {
                Some(severity) => cell.style(severity_style(severity)),
                None => cell,
            },
            (Tab::Issues, _) => cell,
            (_, 0) => cell.style(status_code_style(row.status)),
            _ => cell,
        }
    });
    Row::new(cells.collect::<Vec<_>>()).height(row.height)
}

fn draw_table(f: &mut ratatui::Frame, area: Rect, session: &TerminalSession, ui: &UiState) {
    let tab = session.active_tab();
    let (headers, widths) = columns(tab);
    let Some(view) = session.view(tab) else {
        f.render_widget(
            Paragraph::new("table unavailable")
                .block(Block::default().title(tab.title()).borders(Borders::ALL)),
            area,
        );
        return;
    };

    let first = view.first_visible_index();
    let visible = view.rows_per_viewport();
    let rows = view
        .live_rows()
        .into_iter()
        .filter(|(index, _)| (first..first + visible).contains(index))
        .map(|(_, row)| table_row(tab, row))
        .collect::<Vec<_>>();

    let selected = ui.selected[tab.as_index()];
    let mut state = TableState::default();
    if (first..first + rows.len()).contains(&selected) {
        state.select(Some(selected - first));
    }

    let title = match tab.link_table() {
        Some(table) => {
            let filter = session.filters().link_filter(table);
            let counts = session.link_counts(table);
            format!(
                "{} [{} of {}] status:{} search:{}",
                tab.title(),
                counts.matched,
                counts.in_table,
                filter.status.map(StatusBucket::label).unwrap_or("all"),
                if filter.search.is_empty() {
                    "-"
                } else {
                    filter.search.as_str()
                }
            )
        }
        None if tab == Tab::Issues => {
            let counts = session.issue_counts();
            let per_severity = Severity::ALL
                .iter()
                .map(|&severity| format!("{}:{}", severity.label(), counts.severity_count(severity)))
                .collect::<Vec<_>>()
                .join(" ");
            format!(
                "Issues [{} of {}] {} severity:{}",
                counts.matched,
                counts.total,
                per_severity,
                session
                    .filters()
                    .severity
                    .map(|s| s.label())
                    .unwrap_or("all")
            )
        }
        None => format!("{} [{}]", tab.title(), view.len()),
    };

    let header = Row::new(headers.iter().copied()).style(
        Style::default()
            .fg(Color::Gray)
            .add_modifier(Modifier::BOLD),
    );
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().title(title).borders(Borders::ALL))
        .row_highlight_style(Style::default().bg(Color::DarkGray));
    f.render_stateful_widget(table, area, &mut state);

    if view.is_empty() {
        return;
    }
    let content = session.surface(tab).map_or(0, |surface| surface.content_height());
    let mut scrollbar = ScrollbarState::new(content as usize)
        .position(view.scroll_top() as usize)
        .viewport_content_length(view.viewport_height() as usize);
    f.render_stateful_widget(
        Scrollbar::new(ScrollbarOrientation::VerticalRight),
        area.inner(Margin {
            vertical: 1,
            horizontal: 0,
        }),
        &mut scrollbar,
    );
}

fn draw_footer(f: &mut ratatui::Frame, area: Rect, session: &TerminalSession, ui: &UiState) {
    let tab = session.active_tab();
    let selected = session
        .record_url(tab, ui.selected[tab.as_index()])
        .unwrap_or("-")
        .to_string();
    let (last_style, last) = match ui.messages.back() {
        Some((MessageKind::Error, msg)) => (Style::default().fg(Color::Red), msg.clone()),
        Some((MessageKind::Warning, msg)) => (Style::default().fg(Color::Yellow), msg.clone()),
        Some((MessageKind::Status, msg)) => (Style::default().fg(Color::Green), msg.clone()),
        None => (Style::default().fg(Color::DarkGray), "-".to_string()),
    };
    let key = Style::default()
        .fg(Color::White)
        .add_modifier(Modifier::BOLD);
    let label = Style::default().fg(Color::Gray);
    let lines = vec![
        Line::from(vec![
            Span::styled("Selected ", Style::default().fg(Color::DarkGray)),
            Span::raw(selected),
        ]),
        Line::from(vec![
            Span::styled("Last ", Style::default().fg(Color::DarkGray)),
            Span::styled(last, last_style),
        ]),
        Line::from(vec![
            Span::styled("q", key),
            Span::styled(" quit  ", label),
            Span::styled("1-6", key),
            Span::styled(" tabs  ", label),
            Span::styled("f/F", key),
            Span::styled(" filter  ", label),
            Span::styled("/", key),
            Span::styled(" search  ", label),
            Span::styled("e", key),
            Span::styled(" export  ", label),
            Span::styled("p x S", key),
            Span::styled(" pause stop start  ", label),
            Span::styled("?", key),
            Span::styled(" help", label),
        ]),
    ];
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::TOP)),
        area,
    );
}

fn draw_help(f: &mut ratatui::Frame) {
    let area = centered_rect(64, 70, f.area());
    f.render_widget(Clear, area);
    let rows = [
        ("1-6, tab", "switch table"),
        ("j/k, up/down", "move selection"),
        ("pgup/pgdn, g/G", "jump"),
        ("wheel", "scroll table"),
        ("f", "cycle filter for this table"),
        ("F", "clear filters for this table"),
        ("/", "search links (source, target, anchor)"),
        ("e", "export current table to CSV"),
        ("w", "save snapshot"),
        ("p", "pause / resume crawl"),
        ("x", "stop crawl"),
        ("S", "start a new crawl"),
        ("q", "quit"),
    ];
    let lines = rows
        .iter()
        .map(|(keys, what)| {
            Line::from(vec![
                Span::styled(
                    format!("{keys:<16}"),
                    Style::default()
                        .fg(Color::White)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(*what, Style::default().fg(Color::Gray)),
            ])
        })
        .collect::<Vec<_>>();
    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .title("Help (esc to close)")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        ),
        area,
    );
}

fn draw_prompt(f: &mut ratatui::Frame, prompt: &Prompt) {
    let area = centered_rect(64, 20, f.area());
    f.render_widget(Clear, area);
    let title = match prompt.kind {
        PromptKind::Search(_) => "Search links",
        PromptKind::StartUrl => "Start crawl at URL",
    };
    f.render_widget(
        Paragraph::new(vec![
            Line::from(format!("> {}", prompt.input)),
            Line::from(Span::styled(
                "enter to apply, esc to cancel, ctrl+u to clear",
                Style::default().fg(Color::DarkGray),
            )),
        ])
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .wrap(Wrap { trim: true }),
        area,
    );
}
