use crate::app::{App, DetailState};
use crate::util::{sanitize_line, strip_control_chars};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use super::listings::SPINNER;

/// Render the listing detail view
pub fn render(f: &mut Frame, app: &App, area: Rect) {
    if area.width < 3 || area.height < 3 {
        return;
    }

    let Some(summary) = app.detail_summary.as_ref() else {
        let paragraph = Paragraph::new("No listing selected")
            .block(Block::default().borders(Borders::ALL).title("Listing"));
        f.render_widget(paragraph, area);
        return;
    };

    // Prefer the fresh detail row over the feed's copy once it arrives
    let loaded = match &app.detail {
        Some(DetailState::Loaded(listing)) => Some(listing),
        _ => None,
    };
    let shown = loaded.map(|l| &l.summary).unwrap_or(summary);

    let mut meta = vec![Span::styled(
        shown.display_price(),
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
    )];
    if let Some(category) = shown.category {
        meta.push(Span::raw(format!("  {}", category)));
    }
    meta.push(Span::styled(
        format!("  listed {}", shown.created_at.format("%Y-%m-%d %H:%M UTC")),
        Style::default().fg(Color::DarkGray),
    ));

    let mut lines = vec![
        Line::from(Span::styled(
            sanitize_line(&shown.title).into_owned(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(meta),
    ];
    if let Some(url) = shown.image_url.as_deref() {
        lines.push(Line::from(Span::styled(
            format!("Image: {} (o to open)", sanitize_line(url)),
            Style::default().fg(Color::DarkGray),
        )));
    }
    lines.push(Line::from(""));

    match &app.detail {
        Some(DetailState::Loading) | None => lines.push(Line::from(format!(
            "{} Loading details...",
            SPINNER[app.spinner_frame % SPINNER.len()]
        ))),
        Some(DetailState::Loaded(listing)) => match listing.description.as_deref() {
            Some(description) if !description.trim().is_empty() => {
                let description = strip_control_chars(description);
                lines.extend(description.lines().map(|l| Line::from(l.to_string())));
            }
            _ => lines.push(Line::from(Span::styled(
                "No description.",
                Style::default().fg(Color::Gray),
            ))),
        },
        Some(DetailState::Missing) => lines.push(Line::from(Span::styled(
            "This listing is no longer available.",
            Style::default().fg(Color::Yellow),
        ))),
        Some(DetailState::Failed(error)) => lines.push(Line::from(Span::styled(
            format!("Failed to load details: {}", error),
            Style::default().fg(Color::Red),
        ))),
    }

    let paragraph = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title("Listing"))
        .wrap(Wrap { trim: false })
        .scroll((app.detail_scroll, 0));
    f.render_widget(paragraph, area);
}
