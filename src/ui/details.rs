use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem, ListState, Paragraph, Wrap},
};

use crate::api::SeriesMetadata;
use crate::watchlist::WatchedSeries;

use super::widgets::titled_block;

pub fn render_details_view(
    frame: &mut Frame,
    area: Rect,
    series: &WatchedSeries,
    metadata: Option<&SeriesMetadata>,
    sources_state: &mut ListState,
    accent: Color,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(8),
            Constraint::Length(sources_height(series.series_urls.len())),
            Constraint::Min(3),
        ])
        .split(area);

    render_summary(frame, chunks[0], series, metadata, accent);
    render_sources(frame, chunks[1], series, sources_state, accent);
    render_missing(frame, chunks[2], series, accent);
}

/// One row per source plus borders, kept between 3 and 10 rows
fn sources_height(sources: usize) -> u16 {
    u16::try_from(sources)
        .unwrap_or(u16::MAX)
        .saturating_add(2)
        .clamp(3, 10)
}

fn field<'a>(label: &'a str, value: String) -> Line<'a> {
    Line::from(vec![
        Span::styled(format!("{:<12}", label), Style::default().fg(Color::DarkGray)),
        Span::raw(value),
    ])
}

fn render_summary(
    frame: &mut Frame,
    area: Rect,
    series: &WatchedSeries,
    metadata: Option<&SeriesMetadata>,
    accent: Color,
) {
    let mut lines = vec![
        field("Library", series.library.to_string()),
        field("Checked", series.frequency.as_display().to_string()),
        field(
            "FlareSolverr",
            if series.use_flaresolverr { "on" } else { "off" }.to_string(),
        ),
    ];

    match metadata {
        Some(meta) => {
            let year = if meta.year > 0 {
                meta.year.to_string()
            } else {
                "?".to_string()
            };
            lines.push(field(
                "Published",
                format!("{} ({}) - {}", meta.publisher, year, meta.status),
            ));
            lines.push(field("Chapters", meta.total_issues.to_string()));
            if !meta.description_text.is_empty() {
                lines.push(Line::from(Span::styled(
                    meta.description_text.clone(),
                    Style::default().fg(Color::Gray),
                )));
            }
        }
        None => lines.push(Line::from(Span::styled(
            "No metadata yet",
            Style::default().fg(Color::DarkGray),
        ))),
    }

    let title = metadata
        .map(|m| m.name.as_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(&series.series_folder_name);

    let summary = Paragraph::new(lines)
        .block(titled_block(title, accent))
        .wrap(Wrap { trim: true });
    frame.render_widget(summary, area);
}

fn render_sources(
    frame: &mut Frame,
    area: Rect,
    series: &WatchedSeries,
    sources_state: &mut ListState,
    accent: Color,
) {
    let items: Vec<ListItem> = series
        .series_urls
        .iter()
        .map(|url| ListItem::new(url.as_str()))
        .collect();

    let list = List::new(items)
        .block(titled_block("Sources", accent))
        .highlight_style(
            Style::default()
                .bg(accent)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▶ ");

    frame.render_stateful_widget(list, area, sources_state);
}

fn render_missing(frame: &mut Frame, area: Rect, series: &WatchedSeries, accent: Color) {
    let title = format!("Missing Chapters ({})", series.missing_chapters_count);

    if series.missing_chapters_list.is_empty() {
        let done = Paragraph::new("All known chapters are downloaded")
            .block(titled_block(&title, accent))
            .style(Style::default().fg(Color::Green));
        frame.render_widget(done, area);
        return;
    }

    let items: Vec<ListItem> = series
        .missing_chapters_list
        .iter()
        .map(|name| ListItem::new(Span::styled(name.as_str(), Style::default().fg(Color::Yellow))))
        .collect();

    frame.render_widget(List::new(items).block(titled_block(&title, accent)), area);
}
