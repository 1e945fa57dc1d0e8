/// Dashboard Screen - title bar over a 2x2 grid of trend graphs

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::core::history::{DashboardSnapshot, MetricKind};
use crate::utils::{format_interval, truncate_string};
use crate::widgets::trend::{graph_data, graph_max, trend_graph};

const MAX_NAME_LEN: usize = 40;

/// Draw one frame from `snapshot`. The layout is recomputed every call.
pub fn render(frame: &mut Frame, snapshot: &DashboardSnapshot) {
    let area = frame_area(frame.size(), snapshot);
    if area.width == 0 || area.height == 0 {
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Title
            Constraint::Min(0),    // Graphs
        ])
        .split(area);

    frame.render_widget(title_bar(snapshot), chunks[0]);

    for (kind, cell) in MetricKind::ALL.into_iter().zip(grid_cells(chunks[1])) {
        let series = snapshot.series(kind);
        let display_max = snapshot.display_max(kind);
        let max = graph_max(kind, display_max);
        let data = graph_data(kind, series, max);
        let graph = trend_graph(kind, &data, max, series.latest(), display_max, snapshot.zoom(kind));
        frame.render_widget(graph, cell);
    }
}

/// Area described by the snapshot, clipped to the real frame
fn frame_area(frame_size: Rect, snapshot: &DashboardSnapshot) -> Rect {
    if snapshot.width == 0 || snapshot.height == 0 {
        return frame_size;
    }
    Rect::new(0, 0, snapshot.width, snapshot.height).intersection(frame_size)
}

/// Two equal rows of two equal columns, in `MetricKind::ALL` order
pub fn grid_cells(area: Rect) -> [Rect; 4] {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Ratio(1, 2), Constraint::Ratio(1, 2)])
        .split(area);

    let split_row = |row: Rect| {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Ratio(1, 2), Constraint::Ratio(1, 2)])
            .split(row)
    };
    let top = split_row(rows[0]);
    let bottom = split_row(rows[1]);

    [top[0], top[1], bottom[0], bottom[1]]
}

fn title_bar(snapshot: &DashboardSnapshot) -> Paragraph<'static> {
    let (status, status_color) = if snapshot.exited {
        ("exited", Color::Red)
    } else {
        ("running", Color::Green)
    };

    let line = Line::from(vec![
        Span::styled(
            " procpulse ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw("│ "),
        Span::styled(
            format!(
                "{} (pid {})",
                truncate_string(&snapshot.process_label, MAX_NAME_LEN),
                snapshot.pid
            ),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" │ "),
        Span::styled(
            format!("every {}", format_interval(snapshot.interval)),
            Style::default().fg(Color::Gray),
        ),
        Span::raw(" │ "),
        Span::styled(status, Style::default().fg(status_color)),
        Span::raw(" │ "),
        Span::styled(
            "[q] Quit  [1-4] Zoom  [0] Reset",
            Style::default().fg(Color::Gray),
        ),
    ]);

    Paragraph::new(line).style(Style::default().bg(Color::Black))
}
