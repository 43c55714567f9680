use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{List, ListItem, Paragraph},
};

use crate::jobs::JobsPanel;
use crate::watchlist::Frequency;

use super::widgets::titled_block;

pub fn render_jobs_view(frame: &mut Frame, area: Rect, panel: &JobsPanel, accent: Color) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(6), Constraint::Min(3)])
        .split(area);

    render_schedule(frame, chunks[0], panel, accent);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[1]);

    render_job_list(
        frame,
        columns[0],
        "Active",
        &panel.status.active_jobs,
        Color::Green,
        accent,
    );
    render_job_list(
        frame,
        columns[1],
        "Queued",
        &panel.status.scheduled_jobs,
        Color::Blue,
        accent,
    );
}

fn render_schedule(frame: &mut Frame, area: Rect, panel: &JobsPanel, accent: Color) {
    let mut lines: Vec<Line> = Frequency::ALL
        .iter()
        .map(|frequency| {
            let next = panel
                .schedule
                .next_run(*frequency)
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "never ran".to_string());
            let hours = frequency.interval().as_secs() / 3600;
            Line::from(vec![
                Span::styled(
                    format!("{:<12}", frequency.as_display()),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(next),
                Span::styled(
                    format!("  every {}h", hours),
                    Style::default().fg(Color::DarkGray),
                ),
            ])
        })
        .collect();

    let title = match (&panel.last_error, panel.updated_at) {
        (Some(_), _) => "Next Update Checks (backend unreachable)".to_string(),
        (None, Some(at)) if panel.status.is_idle() => {
            format!("Next Update Checks (idle, as of {})", at.format("%H:%M:%S"))
        }
        (None, Some(at)) => format!("Next Update Checks (as of {})", at.format("%H:%M:%S")),
        (None, None) => "Next Update Checks (loading...)".to_string(),
    };

    if let Some(err) = &panel.last_error {
        lines.truncate(3);
        lines.push(Line::from(Span::styled(
            err.as_str(),
            Style::default().fg(Color::Red),
        )));
    }

    frame.render_widget(Paragraph::new(lines).block(titled_block(&title, accent)), area);
}

fn render_job_list(
    frame: &mut Frame,
    area: Rect,
    label: &str,
    jobs: &[String],
    color: Color,
    accent: Color,
) {
    let title = format!("{} ({})", label, jobs.len());

    if jobs.is_empty() {
        let idle = Paragraph::new("Nothing here")
            .block(titled_block(&title, accent))
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(idle, area);
        return;
    }

    let items: Vec<ListItem> = jobs
        .iter()
        .map(|job| ListItem::new(Span::styled(job.as_str(), Style::default().fg(color))))
        .collect();

    frame.render_widget(List::new(items).block(titled_block(&title, accent)), area);
}
