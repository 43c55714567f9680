use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem, ListState, Paragraph},
};

use crate::watchlist::{WatchedSeries, total_missing};

use super::widgets::{titled_block, truncate};

pub fn render_library_view(
    frame: &mut Frame,
    area: Rect,
    series: &[WatchedSeries],
    list_state: &mut ListState,
    loading: bool,
    accent: Color,
) {
    let title = if loading {
        "Watched Series (loading...)".to_string()
    } else {
        format!(
            "Watched Series ({}, {} missing)",
            series.len(),
            total_missing(series)
        )
    };

    if series.is_empty() {
        let hint = if loading {
            ""
        } else {
            "Nothing watched yet. Press / to search or a to add a URL."
        };
        let empty = Paragraph::new(hint)
            .block(titled_block(&title, accent))
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, area);
        return;
    }

    let name_width = (area.width as usize).saturating_sub(48).max(16);

    let items: Vec<ListItem> = series
        .iter()
        .map(|s| {
            let (missing, missing_color) = if s.is_complete() {
                ("up to date".to_string(), Color::Green)
            } else {
                (format!("{} missing", s.missing_chapters_count), Color::Yellow)
            };

            let sources = if s.source_count() > 1 {
                format!(" +{}", s.source_count() - 1)
            } else {
                String::new()
            };

            let line = Line::from(vec![
                Span::raw(format!(
                    "{:<width$}",
                    truncate(&s.series_folder_name, name_width),
                    width = name_width
                )),
                Span::raw(" "),
                Span::styled(
                    format!("{:<14}", truncate(&s.display_site_name, 14)),
                    Style::default().fg(Color::Cyan),
                ),
                Span::styled(sources, Style::default().fg(Color::DarkGray)),
                Span::raw(" "),
                Span::styled(
                    format!("{:<11}", s.frequency.as_display()),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(missing, Style::default().fg(missing_color)),
            ]);

            ListItem::new(line)
        })
        .collect();

    let list = List::new(items)
        .block(titled_block(&title, accent))
        .highlight_style(
            Style::default()
                .bg(accent)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▶ ");

    frame.render_stateful_widget(list, area, list_state);
}
