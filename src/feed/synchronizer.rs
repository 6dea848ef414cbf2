use super::state::{FeedState, Phase, Ticket, ViewState};
use crate::backend::{ListingSource, RemoteError};
use crate::listing::{ListingFilter, ListingSummary};
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// What regaining focus does to a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FocusPolicy {
    /// Empty feed: full initial load (with spinner). Otherwise: silent refresh.
    #[default]
    RefreshOrLoad,
    /// Always a silent refresh.
    AlwaysRefresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub page_size: usize,
    pub focus_policy: FocusPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            focus_policy: FocusPolicy::default(),
        }
    }
}

/// The operation an outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Initial,
    Refresh,
    LoadMore,
}

impl Trigger {
    fn phase(self) -> Phase {
        match self {
            Trigger::Initial => Phase::LoadingInitial,
            Trigger::Refresh => Phase::Refreshing,
            Trigger::LoadMore => Phase::LoadingMore,
        }
    }
}

/// Why a trigger did not start a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another fetch is in flight.
    Busy(Phase),
    /// `load_more` after a short page.
    Exhausted,
    /// The view has been unmounted.
    Unmounted,
}

/// Result of a synchronizer operation. Failures are values, never panics.
#[derive(Debug)]
pub enum SyncOutcome {
    /// A page was fetched and applied. `added` counts rows that were new to the list.
    Committed {
        trigger: Trigger,
        fetched: usize,
        added: usize,
    },
    Skipped {
        trigger: Trigger,
        reason: SkipReason,
    },
    /// The fetch failed; the list is exactly as it was before the call.
    Failed {
        trigger: Trigger,
        error: RemoteError,
    },
    /// The view unmounted while the fetch was in flight; the result was dropped.
    Discarded { trigger: Trigger },
}

impl SyncOutcome {
    pub fn trigger(&self) -> Trigger {
        match self {
            SyncOutcome::Committed { trigger, .. }
            | SyncOutcome::Skipped { trigger, .. }
            | SyncOutcome::Failed { trigger, .. }
            | SyncOutcome::Discarded { trigger } => *trigger,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, SyncOutcome::Committed { .. })
    }

    pub fn error(&self) -> Option<&RemoteError> {
        match self {
            SyncOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Point-in-time copy of a feed for rendering. Cloning the list is O(1).
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub items: Arc<Vec<ListingSummary>>,
    pub phase: Phase,
    pub has_more: bool,
    pub page_index: usize,
    pub last_error: Option<Arc<str>>,
    pub view: ViewState,
}

/// Keeps one feed view's listings in sync with the remote collection.
///
/// All operations take `&self` and may be called concurrently; the state lock
/// is never held across the network call. Only one fetch runs at a time: a
/// trigger that arrives while another fetch is in flight is skipped, not
/// queued. Clones share the same feed.
#[derive(Clone)]
pub struct FeedSynchronizer {
    source: Arc<dyn ListingSource>,
    filter: Arc<ListingFilter>,
    options: SyncOptions,
    state: Arc<Mutex<FeedState>>,
}

impl std::fmt::Debug for FeedSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSynchronizer")
            .field("filter", &self.filter)
            .field("options", &self.options)
            .field("state", &*lock(&self.state))
            .finish()
    }
}

impl FeedSynchronizer {
    /// Mount a new, empty feed. Nothing is fetched until the first trigger.
    pub fn new(source: Arc<dyn ListingSource>, filter: ListingFilter, options: SyncOptions) -> Self {
        let options = SyncOptions {
            page_size: options.page_size.max(1),
            ..options
        };
        Self {
            source,
            filter: Arc::new(filter),
            options,
            state: Arc::new(Mutex::new(FeedState::default())),
        }
    }

    pub fn filter(&self) -> &ListingFilter {
        &self.filter
    }

    pub fn options(&self) -> SyncOptions {
        self.options
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let state = lock(&self.state);
        FeedSnapshot {
            items: Arc::clone(state.items()),
            phase: state.phase(),
            has_more: state.has_more(),
            page_index: state.page_index(),
            last_error: state.last_error().cloned(),
            view: state.view_state(),
        }
    }

    /// Fetch the first page and replace the list with it.
    pub async fn load_initial(&self) -> SyncOutcome {
        self.run(Trigger::Initial).await
    }

    /// Re-fetch the first page and swap it in once it arrives.
    ///
    /// The previous list stays visible for the whole fetch.
    pub async fn refresh(&self) -> SyncOutcome {
        self.run(Trigger::Refresh).await
    }

    /// Fetch the next page and append the rows not already shown.
    pub async fn load_more(&self) -> SyncOutcome {
        self.run(Trigger::LoadMore).await
    }

    /// The feed view became visible again.
    pub async fn on_focus_regained(&self) -> SyncOutcome {
        let is_empty = lock(&self.state).items().is_empty();
        match self.options.focus_policy {
            FocusPolicy::RefreshOrLoad if is_empty => self.load_initial().await,
            FocusPolicy::RefreshOrLoad | FocusPolicy::AlwaysRefresh => self.refresh().await,
        }
    }

    /// The feed view is gone. In-flight results are dropped on arrival and
    /// further triggers are no-ops.
    pub fn unmount(&self) {
        lock(&self.state).unmount();
        tracing::debug!(filter = ?self.filter, "Feed unmounted");
    }

    async fn run(&self, trigger: Trigger) -> SyncOutcome {
        let page_size = self.options.page_size;

        let ticket = {
            let mut state = lock(&self.state);
            if let Some(reason) = skip_reason(&state, trigger) {
                tracing::trace!(?trigger, ?reason, "Feed trigger skipped");
                return SyncOutcome::Skipped { trigger, reason };
            }
            match state.begin(trigger.phase(), page_size) {
                Some(ticket) => ticket,
                None => {
                    return SyncOutcome::Skipped {
                        trigger,
                        reason: SkipReason::Busy(state.phase()),
                    }
                }
            }
        };

        let mut in_flight = InFlight {
            state: &self.state,
            ticket,
            settled: false,
        };

        tracing::debug!(?trigger, offset = ticket.offset, limit = page_size, "Fetching feed page");
        let result = self
            .source
            .fetch_page(ticket.offset, page_size, &self.filter)
            .await;

        let mut state = lock(&self.state);
        in_flight.settled = true;

        if !state.accepts(&ticket) {
            tracing::debug!(?trigger, "Feed unmounted during fetch, discarding result");
            return SyncOutcome::Discarded { trigger };
        }

        match result {
            Ok(rows) => {
                let fetched = rows.len();
                let added = match trigger {
                    Trigger::LoadMore => state.commit_next_page(rows, page_size),
                    Trigger::Initial | Trigger::Refresh => state.commit_first_page(rows, page_size),
                };
                tracing::debug!(
                    ?trigger,
                    fetched,
                    added,
                    total = state.items().len(),
                    has_more = state.has_more(),
                    "Feed page committed"
                );
                SyncOutcome::Committed {
                    trigger,
                    fetched,
                    added,
                }
            }
            Err(error) => {
                tracing::warn!(?trigger, error = %error, "Feed fetch failed, keeping previous listings");
                state.commit_failure(error.to_string());
                SyncOutcome::Failed { trigger, error }
            }
        }
    }
}

fn skip_reason(state: &FeedState, trigger: Trigger) -> Option<SkipReason> {
    if !state.is_mounted() {
        Some(SkipReason::Unmounted)
    } else if state.phase() != Phase::Idle {
        Some(SkipReason::Busy(state.phase()))
    } else if trigger == Trigger::LoadMore && !state.has_more() {
        Some(SkipReason::Exhausted)
    } else {
        None
    }
}

/// Releases the fetch slot if the operation's future is dropped before the
/// fetch settles (task aborted, caller timed out).
struct InFlight<'a> {
    state: &'a Mutex<FeedState>,
    ticket: Ticket,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = lock(self.state);
        if state.accepts(&self.ticket) {
            tracing::debug!("Feed fetch abandoned before completion");
            state.abandon();
        }
    }
}

fn lock(state: &Mutex<FeedState>) -> MutexGuard<'_, FeedState> {
    // The state is always left consistent between statements, so a poisoned
    // lock is still usable.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
