//! Helper functions for UI operations.
//!
//! Background task spawning for feed operations and listing details, plus
//! opening listing images.

use crate::app::{App, AppEvent, Tab};
use crate::listing::ListingId;
use crate::util::validate_url_for_open;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc;

/// Feed operation to run in the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FeedOp {
    Initial,
    Refresh,
    LoadMore,
    FocusRegained,
}

/// Wraps a future to catch panics and convert them to errors.
///
/// Instead of the task silently disappearing, panics become `Err(String)`
/// carrying the panic message so the UI can report them.
///
/// # Example
///
/// ```ignore
/// tokio::spawn(async move {
///     match catch_task_panic(async { do_work().await }).await {
///         Ok(result) => handle_result(result),
///         Err(panic_msg) => {
///             let _ = tx.send(AppEvent::TaskPanicked { task: "work", error: panic_msg }).await;
///         }
///     }
/// });
/// ```
pub(super) async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: std::future::Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                format!("Unknown panic: {:?}", (*panic).type_id())
            }
        })
}

/// Run `op` on `tab`'s feed in a background task.
///
/// The outcome comes back as `AppEvent::FeedSynced` tagged with the tab's
/// current mount so results from a replaced feed can be told apart.
pub(super) fn spawn_feed_op(app: &App, tab: Tab, op: FeedOp, event_tx: &mpsc::Sender<AppEvent>) {
    let Some(feed_tab) = app.feed_tab(tab) else {
        return;
    };
    let feed = feed_tab.feed.clone();
    let mount = feed_tab.mount;
    let tx = event_tx.clone();

    tracing::debug!(?tab, ?op, mount, "Spawning feed task");

    tokio::spawn(async move {
        let result = catch_task_panic(async {
            match op {
                FeedOp::Initial => feed.load_initial().await,
                FeedOp::Refresh => feed.refresh().await,
                FeedOp::LoadMore => feed.load_more().await,
                FeedOp::FocusRegained => feed.on_focus_regained().await,
            }
        })
        .await;

        let event = match result {
            Ok(outcome) => AppEvent::FeedSynced { tab, mount, outcome },
            Err(error) => {
                tracing::error!(?tab, ?op, error = %error, "Feed task panicked");
                AppEvent::TaskPanicked {
                    task: "feed_sync",
                    error,
                }
            }
        };
        if let Err(e) = tx.send(event).await {
            tracing::warn!(error = %e, event = "FeedSynced", "Channel send failed (receiver dropped)");
        }
    });
}

/// Show a feed tab: the first visit mounts it with an initial load, later
/// visits count as regaining focus.
pub(super) fn show_feed(app: &App, tab: Tab, event_tx: &mpsc::Sender<AppEvent>) {
    let Some(feed_tab) = app.feed_tab(tab) else {
        return;
    };
    let op = if feed_tab.snapshot().page_index == 0 {
        FeedOp::Initial
    } else {
        FeedOp::FocusRegained
    };
    spawn_feed_op(app, tab, op, event_tx);
}

/// Request the next page when the cursor is near the end of the current feed.
pub(super) fn maybe_load_more(app: &App, event_tx: &mpsc::Sender<AppEvent>) {
    if app.current().wants_more() {
        spawn_feed_op(app, app.tab, FeedOp::LoadMore, event_tx);
    }
}

/// Fetch a listing's detail row in the background.
///
/// Aborts any earlier detail fetch; the generation counter catches results
/// that were already on their way.
pub(super) fn spawn_detail_load(app: &mut App, id: ListingId, event_tx: &mpsc::Sender<AppEvent>) {
    if let Some(handle) = app.detail_handle.take() {
        handle.abort();
    }

    let generation = app.detail_generation;
    let client = app.client.clone();
    let tx = event_tx.clone();

    tracing::debug!(id = %id, generation, "Spawning listing detail load");

    app.detail_handle = Some(tokio::spawn(async move {
        let result = catch_task_panic(client.fetch_listing(&id)).await;
        let event = match result {
            Ok(result) => AppEvent::DetailLoaded {
                id,
                generation,
                result,
            },
            Err(error) => {
                tracing::error!(id = %id, error = %error, "Listing detail task panicked");
                AppEvent::TaskPanicked {
                    task: "listing_detail",
                    error,
                }
            }
        };
        if let Err(e) = tx.send(event).await {
            tracing::warn!(error = %e, event = "DetailLoaded", "Channel send failed (receiver dropped)");
        }
    }));
}

/// Open the selected listing's image in the system viewer/browser.
pub(super) fn open_image(app: &mut App) {
    let listing = match &app.detail_summary {
        Some(summary) => Some(summary.clone()),
        None => app.current().selected_listing(),
    };
    let Some(listing) = listing else {
        return;
    };
    let Some(url) = listing.image_url.as_deref() else {
        app.set_status("Listing has no image");
        return;
    };

    // Remote-supplied URL: validate before handing it to the OS opener
    if let Err(e) = validate_url_for_open(url) {
        app.set_status(e.to_string());
    } else if let Err(e) = open::that(url) {
        app.set_status(format!("Failed to open image: {}", e));
    } else {
        app.set_status("Opening image...");
    }
}
