//! Application event handling.
//!
//! Applies background task results: feed outcomes, listing details and panics.

use crate::app::{App, AppEvent, Tab};
use crate::feed::{SkipReason, SyncOutcome, Trigger};

pub(super) fn handle_app_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::FeedSynced {
            tab,
            mount,
            outcome,
        } => handle_feed_synced(app, tab, mount, outcome),
        AppEvent::DetailLoaded {
            id,
            generation,
            result,
        } => app.apply_detail(id, generation, result),
        AppEvent::TaskPanicked { task, error } => {
            tracing::error!(task, error = %error, "Background task panicked");
            app.set_status(format!("Internal error in {}: {}", task, error));
        }
    }
}

fn handle_feed_synced(app: &mut App, tab: Tab, mount: u64, outcome: SyncOutcome) {
    let is_current = app.tab == tab;
    let Some(feed_tab) = app.feed_tab_mut(tab) else {
        return;
    };
    if feed_tab.mount != mount {
        tracing::debug!(?tab, mount, current = feed_tab.mount, "Ignoring outcome from replaced feed");
        return;
    }
    feed_tab.sync_selection();
    let exhausted = !feed_tab.snapshot().has_more;

    if !is_current {
        return;
    }
    match outcome {
        SyncOutcome::Committed {
            trigger: Trigger::LoadMore,
            ..
        } if exhausted => app.set_status("End of listings"),
        SyncOutcome::Committed { .. } => {}
        SyncOutcome::Failed { trigger, error } => {
            let what = match trigger {
                Trigger::Initial => "Loading listings",
                Trigger::Refresh => "Refresh",
                Trigger::LoadMore => "Loading more",
            };
            app.set_status(format!("{} failed: {}", what, error));
        }
        SyncOutcome::Skipped {
            trigger: Trigger::Refresh,
            reason: SkipReason::Busy(_),
        } => app.set_status("Already syncing..."),
        SyncOutcome::Skipped { .. } | SyncOutcome::Discarded { .. } => {}
    }
}
