use crate::app::{App, Tab};
use crate::feed::{FeedSnapshot, Phase, ViewState};
use crate::listing::ListingSummary;
use crate::util::{sanitize_line, truncate_to_width};
use chrono::{DateTime, Utc};
use ratatui::{
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

pub(super) const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Width reserved right of the title for price and age.
const META_WIDTH: usize = 22;

/// Format timestamp as relative time
pub fn format_relative_time(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - created_at).num_seconds();

    // Clock skew between client and backend
    if diff < 60 {
        return "now".to_string();
    }
    if diff < 3600 {
        return format!("{}m", diff / 60);
    }
    if diff < 86400 {
        return format!("{}h", diff / 3600);
    }
    if diff < 604800 {
        return format!("{}d", diff / 86400);
    }
    created_at.format("%b %d").to_string()
}

/// Render the listing feed of the current tab
pub fn render(f: &mut Frame, app: &App, area: Rect) {
    if area.width < 3 || area.height < 3 {
        return;
    }

    let feed_tab = app.current();
    let snapshot = feed_tab.snapshot();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(block_title(app, &snapshot));

    let message = match snapshot.view {
        ViewState::List => None,
        ViewState::Spinner => Some(Line::from(format!(
            "{} Loading listings...",
            SPINNER[app.spinner_frame % SPINNER.len()]
        ))),
        ViewState::Empty => Some(Line::from(Span::styled(
            "No listings yet. Press r to refresh.",
            Style::default().fg(Color::Gray),
        ))),
        ViewState::Unavailable => Some(Line::from(Span::styled(
            format!(
                "Couldn't load listings: {}. Press r to retry.",
                snapshot.last_error.as_deref().unwrap_or("unknown error")
            ),
            Style::default().fg(Color::Red),
        ))),
    };
    if let Some(message) = message {
        let paragraph = Paragraph::new(message)
            .block(block)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        f.render_widget(paragraph, area);
        return;
    }

    let inner_width = area.width.saturating_sub(2) as usize;
    let now = Utc::now();
    let mut items: Vec<ListItem> = snapshot
        .items
        .iter()
        .map(|listing| ListItem::new(listing_line(listing, inner_width, now)))
        .collect();

    match snapshot.phase {
        Phase::LoadingMore => items.push(ListItem::new(Line::from(Span::styled(
            format!("{} Loading more...", SPINNER[app.spinner_frame % SPINNER.len()]),
            Style::default().fg(Color::Gray),
        )))),
        _ if !snapshot.has_more => items.push(ListItem::new(Line::from(Span::styled(
            "End of listings",
            Style::default().fg(Color::DarkGray),
        )))),
        _ => {}
    }

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White));
    let mut state = ListState::default().with_selected(Some(feed_tab.selected));
    f.render_stateful_widget(list, area, &mut state);
}

fn block_title(app: &App, snapshot: &FeedSnapshot) -> String {
    let mut title = app.tab.title().to_string();
    if app.tab == Tab::Market {
        if let Some(category) = app.category {
            title.push_str(" · ");
            title.push_str(category.as_str());
        }
    }
    if !snapshot.items.is_empty() {
        title.push_str(&format!(" ({})", snapshot.items.len()));
    }
    if snapshot.phase == Phase::Refreshing {
        title.push(' ');
        title.push_str(SPINNER[app.spinner_frame % SPINNER.len()]);
    }
    title
}

fn listing_line(listing: &ListingSummary, width: usize, now: DateTime<Utc>) -> Line<'static> {
    let title = sanitize_line(&listing.title);
    let title_width = width.saturating_sub(META_WIDTH).max(8);
    let title = truncate_to_width(&title, title_width).into_owned();

    let mut spans = vec![Span::styled(
        format!("{:<width$}", title, width = title_width),
        Style::default().add_modifier(Modifier::BOLD),
    )];
    spans.push(Span::styled(
        format!(" {:>10}", listing.display_price()),
        Style::default().fg(Color::Green),
    ));
    spans.push(Span::styled(
        format!("  {}", format_relative_time(listing.created_at, now)),
        Style::default().fg(Color::DarkGray),
    ));
    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_relative_time_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(format_relative_time(now, now), "now");
        assert_eq!(format_relative_time(now - Duration::minutes(5), now), "5m");
        assert_eq!(format_relative_time(now - Duration::hours(3), now), "3h");
        assert_eq!(format_relative_time(now - Duration::days(2), now), "2d");
        assert_eq!(format_relative_time(now - Duration::days(30), now), "May 16");
    }

    #[test]
    fn test_relative_time_future_is_now() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(format_relative_time(now + Duration::minutes(10), now), "now");
    }
}
