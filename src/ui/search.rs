use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};

use crate::api::SearchResult;

use super::widgets::{titled_block, truncate};

pub fn render_search_view(
    frame: &mut Frame,
    area: Rect,
    query: &str,
    results: &[SearchResult],
    list_state: &mut ListState,
    is_loading: bool,
    site: Option<&str>,
    accent: Color,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(5),
        ])
        .split(area);

    render_search_input(frame, chunks[0], query, is_loading, accent);

    let site_line = Line::from(vec![
        Span::styled(" Site: ", Style::default().fg(Color::DarkGray)),
        Span::styled(site.unwrap_or("All sites"), Style::default().fg(Color::Cyan)),
        Span::styled("  (Ctrl+s to change)", Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(site_line), chunks[1]);

    render_search_results(frame, chunks[2], results, list_state, accent);

    let selected = list_state.selected().and_then(|i| results.get(i));
    render_result_preview(frame, chunks[3], selected, accent);
}

/// "author, status" for a result, when the site reported either
fn byline(result: &SearchResult) -> Option<String> {
    match (result.author.as_deref(), result.status.as_deref()) {
        (Some(author), Some(status)) => Some(format!("{}, {}", author, status)),
        (Some(one), None) | (None, Some(one)) => Some(one.to_string()),
        (None, None) => None,
    }
}

fn render_result_preview(
    frame: &mut Frame,
    area: Rect,
    result: Option<&SearchResult>,
    accent: Color,
) {
    let Some(result) = result else {
        frame.render_widget(titled_block("Preview", accent), area);
        return;
    };

    let mut lines = vec![Line::from(Span::styled(
        result.source_url.as_str(),
        Style::default().fg(Color::DarkGray),
    ))];
    lines.push(Line::from(
        result
            .description
            .as_deref()
            .unwrap_or("No description")
            .to_string(),
    ));

    let preview = Paragraph::new(lines)
        .block(titled_block(&result.title, accent))
        .wrap(Wrap { trim: true });
    frame.render_widget(preview, area);
}

fn render_search_input(
    frame: &mut Frame,
    area: Rect,
    query: &str,
    is_loading: bool,
    accent: Color,
) {
    let title = if is_loading {
        " Search sources (loading...) "
    } else {
        " Search sources "
    };

    let input = Paragraph::new(query)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(accent))
                .title(title)
                .title_style(Style::default().fg(accent).add_modifier(Modifier::BOLD)),
        )
        .style(Style::default().fg(Color::White));

    frame.render_widget(input, area);
}

fn render_search_results(
    frame: &mut Frame,
    area: Rect,
    results: &[SearchResult],
    list_state: &mut ListState,
    accent: Color,
) {
    let title = format!("Results ({})", results.len());

    if results.is_empty() {
        let empty = Paragraph::new("Type at least 3 characters and press Enter")
            .block(titled_block(&title, accent))
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, area);
        return;
    }

    let title_width = (area.width as usize).saturating_sub(24).max(16);

    let items: Vec<ListItem> = results
        .iter()
        .map(|r| {
            let mut spans = vec![
                Span::styled(
                    format!("{:<16}", truncate(&r.site, 16)),
                    Style::default().fg(Color::Cyan),
                ),
                Span::raw(truncate(&r.title, title_width)),
            ];
            if let Some(byline) = byline(r) {
                spans.push(Span::styled(
                    format!("  {}", byline),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            ListItem::new(Line::from(spans))
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
