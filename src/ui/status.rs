use crate::app::{App, View};
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    widgets::Paragraph,
    Frame,
};
use std::borrow::Cow;

/// Render the status bar
pub fn render(f: &mut Frame, app: &App, area: Rect) {
    if area.width < 1 || area.height < 1 {
        return;
    }

    let text: Cow<'_, str> = if let Some((msg, _)) = &app.status_message {
        Cow::Borrowed(msg.as_ref())
    } else {
        match app.view {
            View::Feed if app.mine.is_some() => Cow::Borrowed(
                "[r]efresh [j/k]move [Enter]open [c]ategory [o]image [Tab]my listings [q]uit",
            ),
            View::Feed => {
                Cow::Borrowed("[r]efresh [j/k]move [Enter]open [c]ategory [o]image [q]uit")
            }
            View::Detail => Cow::Borrowed("[b]ack [j/k]scroll [o]pen image [q]uit"),
        }
    };

    let style = Style::default().bg(Color::DarkGray).fg(Color::White);
    f.render_widget(Paragraph::new(text).style(style), area);
}
