//! Paginated listing feed kept in sync with the backend.
//!
//! A [`FeedSynchronizer`] owns the locally cached page of listings for one view
//! and exposes the four triggers a view can fire:
//!
//! - [`load_initial`](FeedSynchronizer::load_initial) on mount (spinner while empty)
//! - [`refresh`](FeedSynchronizer::refresh) on demand, silent: the old list stays up
//! - [`load_more`](FeedSynchronizer::load_more) near the end of the list
//! - [`on_focus_regained`](FeedSynchronizer::on_focus_regained) when the view is shown again
//!
//! At most one fetch is in flight per feed. The list is always sorted newest
//! first and never holds two listings with the same id.
//!
//! # Example
//!
//! ```ignore
//! let feed = FeedSynchronizer::new(source, ListingFilter::default(), SyncOptions::default());
//! feed.load_initial().await;
//! let snapshot = feed.snapshot();
//! ```

mod state;
mod synchronizer;

pub use state::{Phase, ViewState};
pub use synchronizer::{
    FeedSnapshot, FeedSynchronizer, FocusPolicy, SkipReason, SyncOptions, SyncOutcome, Trigger,
    DEFAULT_PAGE_SIZE,
};
