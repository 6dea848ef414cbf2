//! Keyboard input handling for the feed and detail views.

use crossterm::event::{KeyCode, KeyModifiers};
use tokio::sync::mpsc;

use super::helpers::{
    maybe_load_more, open_image, show_feed, spawn_detail_load, spawn_feed_op, FeedOp,
};
use super::Action;
use crate::app::{App, AppEvent, Tab, View};

/// Main input dispatch function.
pub(super) fn handle_input(
    app: &mut App,
    code: KeyCode,
    modifiers: KeyModifiers,
    event_tx: &mpsc::Sender<AppEvent>,
) -> Action {
    if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
        return Action::Quit;
    }
    match app.view {
        View::Feed => handle_feed_input(app, code, event_tx),
        View::Detail => handle_detail_input(app, code, event_tx),
    }
}

fn handle_feed_input(app: &mut App, code: KeyCode, event_tx: &mpsc::Sender<AppEvent>) -> Action {
    match code {
        KeyCode::Char('q') => return Action::Quit,
        KeyCode::Char('j') | KeyCode::Down => {
            app.current_mut().select_next();
            maybe_load_more(app, event_tx);
        }
        KeyCode::Char('k') | KeyCode::Up => app.current_mut().select_prev(),
        KeyCode::Char('g') | KeyCode::Home => app.current_mut().select_first(),
        KeyCode::Char('r') => {
            app.set_status("Refreshing...");
            spawn_feed_op(app, app.tab, FeedOp::Refresh, event_tx);
        }
        KeyCode::Tab => {
            if app.next_tab() {
                show_feed(app, app.tab, event_tx);
            }
        }
        KeyCode::Char('c') => {
            if app.tab != Tab::Market {
                app.set_status("Categories apply to the market feed");
            } else {
                let category = app.cycle_category();
                app.set_status(match category {
                    Some(c) => format!("Category: {}", c),
                    None => "All categories".to_string(),
                });
                spawn_feed_op(app, Tab::Market, FeedOp::Initial, event_tx);
            }
        }
        KeyCode::Enter => {
            if let Some(id) = app.enter_detail() {
                spawn_detail_load(app, id, event_tx);
            }
        }
        KeyCode::Char('o') => open_image(app),
        _ => {}
    }
    Action::Continue
}

fn handle_detail_input(app: &mut App, code: KeyCode, event_tx: &mpsc::Sender<AppEvent>) -> Action {
    match code {
        KeyCode::Char('q') => return Action::Quit,
        KeyCode::Esc | KeyCode::Char('b') => {
            app.exit_detail();
            // Back on the list: it may be stale after time spent in the detail view
            show_feed(app, app.tab, event_tx);
        }
        KeyCode::Char('j') | KeyCode::Down => {
            app.detail_scroll = app.detail_scroll.saturating_add(1);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.detail_scroll = app.detail_scroll.saturating_sub(1);
        }
        KeyCode::Char('o') => open_image(app),
        _ => {}
    }
    Action::Continue
}
