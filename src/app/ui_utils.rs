use std::sync::Arc;

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};

use super::model::{Issue, Link, Resource, Severity};
use super::window::RowSurface;

/// One rendered table row; the draw loop turns it into a ratatui `Row`.
#[derive(Debug, Clone, Default)]
pub struct TableRow {
    pub index: usize,
    pub top: u64,
    pub height: u16,
    pub cells: Vec<String>,
    pub status: Option<u16>,
    pub severity: Option<Severity>,
}

/// Terminal-backed surface: keeps the content height the engine reports so
/// the draw loop can size the scrollbar.
#[derive(Debug)]
pub struct TableSurface {
    viewport: u32,
    row_height: u16,
    content_height: u64,
}

impl TableSurface {
    pub fn new(viewport: u32, row_height: u16) -> Self {
        Self {
            viewport,
            row_height: row_height.max(1),
            content_height: 0,
        }
    }

    pub fn content_height(&self) -> u64 {
        self.content_height
    }
}

impl RowSurface for TableSurface {
    type Row = TableRow;

    fn has_body(&self) -> bool {
        true
    }

    fn viewport_height(&self) -> u32 {
        self.viewport
    }

    fn create_row(&mut self) -> TableRow {
        TableRow {
            height: self.row_height,
            ..TableRow::default()
        }
    }

    fn position_row(&mut self, row: &mut TableRow, index: usize, top: u64) {
        row.index = index;
        row.top = top;
    }

    fn destroy_row(&mut self, _row: TableRow) {}

    fn set_content_height(&mut self, height: u64) {
        self.content_height = height;
    }

    // rows are drawn by index, the offset has no use in the terminal
    fn set_block_offset(&mut self, _offset: u64) {}
}

pub fn render_resource_row(row: &mut TableRow, r: &Arc<Resource>, _index: usize) {
    row.status = r.status_code;
    row.severity = None;
    row.cells = vec![
        status_label(r.status_code),
        short_content_type(&r.content_type).to_string(),
        human_size(r.size),
        format!("{:.0}", r.response_time * 1000.0),
        r.depth.to_string(),
        r.title.clone(),
        r.url.clone(),
    ];
}

pub fn render_link_row(row: &mut TableRow, link: &Arc<Link>, _index: usize) {
    row.status = link.target_status;
    row.severity = None;
    row.cells = vec![
        link.target_status
            .map(|c| c.to_string())
            .unwrap_or_else(|| "n/c".to_string()),
        link.source_url.clone(),
        link.target_url.clone(),
        link.anchor_text.clone(),
        link.target_domain.clone(),
    ];
}

/// Two lines: the issue, then its details.
pub fn render_issue_row(row: &mut TableRow, issue: &Arc<Issue>, _index: usize) {
    row.status = None;
    row.severity = Some(issue.severity);
    row.cells = vec![
        issue.severity.label().to_string(),
        issue.category.clone(),
        format!("{}\n{}", issue.issue, issue.details),
        issue.url.clone(),
    ];
}

fn status_label(status: Option<u16>) -> String {
    status.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string())
}

fn short_content_type(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
}

pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

pub fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
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

pub fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    let right = rect.x.saturating_add(rect.width);
    let bottom = rect.y.saturating_add(rect.height);
    x >= rect.x && x < right && y >= rect.y && y < bottom
}

pub fn status_code_style(code: Option<u16>) -> Style {
    match code {
        None => Style::default().fg(Color::DarkGray),
        Some(200..=299) => Style::default().fg(Color::Green),
        Some(300..=399) => Style::default().fg(Color::Yellow),
        Some(400..=499) => Style::default().fg(Color::Red),
        Some(500..) => Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
        Some(_) => Style::default().fg(Color::Gray),
    }
}

pub fn severity_style(severity: Severity) -> Style {
    match severity {
        Severity::Error => Style::default()
            .fg(Color::LightRed)
            .add_modifier(Modifier::BOLD),
        Severity::Warning => Style::default().fg(Color::Yellow),
        Severity::Info => Style::default().fg(Color::Cyan),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::window::WindowedTable;

    #[test]
    fn surface_tracks_engine_geometry() {
        let render: fn(&mut TableRow, &Arc<Issue>, usize) = render_issue_row;
        let mut table = WindowedTable::initialize(TableSurface::new(10, 2), 2, 1, render).unwrap();
        let issues = (0..40)
            .map(|i| {
                Arc::new(Issue {
                    url: format!("https://example.com/{i}"),
                    issue: "Missing title".into(),
                    details: "No <title> element".into(),
                    ..Issue::default()
                })
            })
            .collect::<Vec<_>>();
        table.set_data(issues);
        assert_eq!(table.surface().content_height(), 80);
        assert_eq!(table.live_rows().count(), 6);
        let (_, first) = table.live_rows().next().unwrap();
        assert_eq!(first.height, 2);
        assert_eq!(first.cells[2], "Missing title\nNo <title> element");
        table.clear();
        assert_eq!(table.live_rows().count(), 0);
        assert_eq!(table.surface().content_height(), 0);
    }

    #[test]
    fn resource_row_cells() {
        let mut row = TableRow::default();
        let resource = Arc::new(Resource {
            url: "https://example.com/".into(),
            status_code: Some(301),
            content_type: "text/html; charset=utf-8".into(),
            size: 2048,
            response_time: 0.25,
            ..Resource::default()
        });
        render_resource_row(&mut row, &resource, 0);
        assert_eq!(row.cells[..5], ["301", "text/html", "2.0 KB", "250", "0"]);
        assert_eq!(row.status, Some(301));
    }

    #[test]
    fn sizes_and_styles() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(status_code_style(Some(404)), Style::default().fg(Color::Red));
        assert_eq!(status_code_style(None), Style::default().fg(Color::DarkGray));
        assert!(point_in_rect(2, 2, Rect::new(0, 0, 5, 5)));
        assert!(!point_in_rect(5, 2, Rect::new(0, 0, 5, 5)));
    }
}
