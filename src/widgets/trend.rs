/// Trend graph for one metric
///
/// Formatting and colour selection are pure functions of the sample value and
/// thresholds; nothing here keeps state between frames.

use ratatui::{
    style::{Color, Modifier, Style},
    text::Span,
    widgets::{Block, BorderType, Borders, RenderDirection, Sparkline},
};

use crate::core::history::{MetricKind, MetricSeries, Sample, ZoomConfig};
use crate::utils::format_bytes;

/// Fraction of the display maximum where the graph turns yellow
pub const WARN_FRACTION: f64 = 0.6;
/// Fraction of the display maximum where the graph turns red
pub const ALERT_FRACTION: f64 = 0.8;

/// Graph units per natural unit (CPU keeps two decimals)
fn resolution(kind: MetricKind) -> f64 {
    match kind {
        MetricKind::Cpu => 100.0,
        _ => 1.0,
    }
}

/// Colour band for the share of the display maximum in use
pub fn band_color(fraction: Option<f64>, warn: f64, alert: f64) -> Color {
    match fraction {
        None => Color::DarkGray,
        Some(f) if f >= alert => Color::Red,
        Some(f) if f >= warn => Color::Yellow,
        Some(_) => Color::Green,
    }
}

/// Latest value as a share of `display_max`
pub fn usage_fraction(latest: Option<Sample>, display_max: f64) -> Option<f64> {
    let value = latest?.value()?;
    (display_max > 0.0).then(|| value / display_max)
}

/// Human-readable value in the metric's unit
pub fn format_value(kind: MetricKind, value: f64) -> String {
    match kind {
        MetricKind::Cpu => format!("{:.2}%", value),
        MetricKind::Memory => format_bytes(value.max(0.0).round() as u64),
        MetricKind::NetworkConnections | MetricKind::OpenFiles => format!("{:.0}", value),
    }
}

fn format_sample(kind: MetricKind, sample: Option<Sample>) -> String {
    match sample {
        Some(Sample::Value(v)) => format_value(kind, v),
        Some(Sample::Failed) => "n/a".to_string(),
        None => "--".to_string(),
    }
}

/// e.g. `CPU 12.34% / 100.00% (1.0x)`
pub fn panel_title(kind: MetricKind, latest: Option<Sample>, display_max: f64, zoom: ZoomConfig) -> String {
    format!(
        "{} {} / {} ({:.1}x)",
        kind.label(),
        format_sample(kind, latest),
        format_value(kind, display_max),
        zoom.factor()
    )
}

/// Series scaled to sparkline bars; failed samples become empty columns
pub fn graph_data(kind: MetricKind, series: &MetricSeries, graph_max: u64) -> Vec<u64> {
    let scale = resolution(kind);
    series
        .iter()
        .map(|sample| match sample {
            Sample::Value(v) if *v > 0.0 => ((v * scale).round() as u64).min(graph_max),
            _ => 0,
        })
        .collect()
}

pub fn graph_max(kind: MetricKind, display_max: f64) -> u64 {
    ((display_max * resolution(kind)).ceil() as u64).max(1)
}

/// Sparkline with the newest sample on the right edge
pub fn trend_graph<'a>(
    kind: MetricKind,
    data: &'a [u64],
    max: u64,
    latest: Option<Sample>,
    display_max: f64,
    zoom: ZoomConfig,
) -> Sparkline<'a> {
    let color = band_color(usage_fraction(latest, display_max), WARN_FRACTION, ALERT_FRACTION);
    let title = Span::styled(
        format!(" {} ", panel_title(kind, latest, display_max, zoom)),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    );

    Sparkline::default()
        .data(data)
        .max(max)
        .direction(RenderDirection::RightToLeft)
        .style(Style::default().fg(color))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .title(title),
        )
}
