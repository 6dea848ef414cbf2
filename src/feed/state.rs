use crate::listing::{ListingId, ListingSummary};
use std::collections::HashSet;
use std::sync::Arc;

/// What the synchronizer is currently fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    LoadingInitial,
    Refreshing,
    LoadingMore,
}

/// Presentation state derived from the feed's items, phase and last error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    /// A first-page fetch (initial load or refresh) is in flight and there is
    /// no previous list to keep on screen.
    Spinner,
    /// Loaded, and the collection is genuinely empty.
    Empty,
    /// Nothing to show because the last fetch failed.
    Unavailable,
    List,
}

/// Permission to run one fetch, handed out by [`FeedState::begin`].
///
/// Carries the generation it was issued under so a result that arrives after
/// the view unmounted can be recognized and dropped.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ticket {
    pub generation: u64,
    pub offset: usize,
}

/// Locally cached, ordered, duplicate-free page of listings.
///
/// Invariants maintained by every mutation:
/// - `items` is sorted by `created_at` descending (ties keep arrival order)
/// - no two items share an `id`
/// - `items` is replaced by swapping the `Arc`, never cleared in place, so a
///   snapshot taken during a fetch always sees the previous complete list
#[derive(Debug, Clone)]
pub(crate) struct FeedState {
    items: Arc<Vec<ListingSummary>>,
    page_index: usize,
    has_more: bool,
    phase: Phase,
    last_error: Option<Arc<str>>,
    generation: u64,
    mounted: bool,
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            items: Arc::new(Vec::new()),
            page_index: 0,
            has_more: true,
            phase: Phase::Idle,
            last_error: None,
            generation: 0,
            mounted: true,
        }
    }
}

impl FeedState {
    pub fn items(&self) -> &Arc<Vec<ListingSummary>> {
        &self.items
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_error(&self) -> Option<&Arc<str>> {
        self.last_error.as_ref()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn view_state(&self) -> ViewState {
        if !self.items.is_empty() {
            ViewState::List
        } else if matches!(self.phase, Phase::LoadingInitial | Phase::Refreshing) {
            ViewState::Spinner
        } else if self.last_error.is_some() {
            ViewState::Unavailable
        } else {
            ViewState::Empty
        }
    }

    /// Claim the fetch slot for `phase`. `None` if another fetch is in flight
    /// or the view is gone.
    pub(crate) fn begin(&mut self, phase: Phase, page_size: usize) -> Option<Ticket> {
        if !self.mounted || self.phase != Phase::Idle {
            return None;
        }
        let offset = match phase {
            Phase::LoadingMore => self.page_index.saturating_mul(page_size),
            _ => 0,
        };
        self.phase = phase;
        Some(Ticket {
            generation: self.generation,
            offset,
        })
    }

    /// True if a result issued under `ticket` may still be applied.
    pub(crate) fn accepts(&self, ticket: &Ticket) -> bool {
        self.mounted && ticket.generation == self.generation
    }

    /// Replace the list with a freshly fetched first page.
    ///
    /// Returns the number of rows now visible.
    pub(crate) fn commit_first_page(
        &mut self,
        rows: Vec<ListingSummary>,
        page_size: usize,
    ) -> usize {
        let fetched = rows.len();
        let mut seen = HashSet::with_capacity(fetched);
        let mut rows: Vec<ListingSummary> =
            rows.into_iter().filter(|r| seen.insert(r.id.clone())).collect();
        sort_newest_first(&mut rows);

        let visible = rows.len();
        self.items = Arc::new(rows);
        self.page_index = 1;
        self.has_more = fetched == page_size;
        self.finish_ok();
        visible
    }

    /// Append the next page, skipping rows already present.
    ///
    /// Overlap happens when rows were inserted remotely since the previous page
    /// was read: offsets shift and the tail of the old page reappears.
    /// Returns the number of rows actually added.
    pub(crate) fn commit_next_page(
        &mut self,
        rows: Vec<ListingSummary>,
        page_size: usize,
    ) -> usize {
        let fetched = rows.len();
        let mut seen: HashSet<ListingId> = self.items.iter().map(|r| r.id.clone()).collect();
        let fresh: Vec<ListingSummary> =
            rows.into_iter().filter(|r| seen.insert(r.id.clone())).collect();
        let added = fresh.len();

        if added > 0 {
            let mut merged = Vec::with_capacity(self.items.len() + added);
            merged.extend(self.items.iter().cloned());
            merged.extend(fresh);
            sort_newest_first(&mut merged);
            self.items = Arc::new(merged);
        }
        self.page_index += 1;
        self.has_more = fetched == page_size;
        self.finish_ok();
        added
    }

    /// Record a failed fetch. Items, cursor and `has_more` are untouched.
    pub(crate) fn commit_failure(&mut self, message: String) {
        self.phase = Phase::Idle;
        self.last_error = Some(Arc::from(message));
    }

    /// End of the view's lifetime: invalidates outstanding tickets and
    /// releases the list.
    pub(crate) fn unmount(&mut self) {
        self.mounted = false;
        self.generation = self.generation.wrapping_add(1);
        self.phase = Phase::Idle;
        self.items = Arc::new(Vec::new());
    }

    /// Release the fetch slot without touching data or `last_error`.
    pub(crate) fn abandon(&mut self) {
        self.phase = Phase::Idle;
    }

    fn finish_ok(&mut self) {
        self.phase = Phase::Idle;
        self.last_error = None;
    }
}

/// Stable sort: rows with equal `created_at` keep their relative order.
fn sort_newest_first(rows: &mut [ListingSummary]) {
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn listing(id: &str, minute: u32) -> ListingSummary {
        ListingSummary {
            id: ListingId::new(id),
            title: format!("Listing {}", id),
            price: 1.0,
            image_url: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
            category: None,
        }
    }

    fn ids(state: &FeedState) -> Vec<&str> {
        state.items().iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_default_state() {
        let state = FeedState::default();
        assert!(state.items().is_empty());
        assert_eq!(state.page_index(), 0);
        assert!(state.has_more());
        assert_eq!(state.phase(), Phase::Idle);
        assert_eq!(state.view_state(), ViewState::Empty);
    }

    #[test]
    fn test_begin_is_exclusive() {
        let mut state = FeedState::default();
        assert!(state.begin(Phase::LoadingInitial, 10).is_some());
        assert!(state.begin(Phase::LoadingInitial, 10).is_none());
        assert!(state.begin(Phase::Refreshing, 10).is_none());
        assert!(state.begin(Phase::LoadingMore, 10).is_none());
        assert_eq!(state.view_state(), ViewState::Spinner);
    }

    #[test]
    fn test_load_more_offset_follows_page_index() {
        let mut state = FeedState::default();
        state.begin(Phase::LoadingInitial, 3).unwrap();
        state.commit_first_page(vec![listing("a", 9), listing("b", 8), listing("c", 7)], 3);

        let ticket = state.begin(Phase::LoadingMore, 3).unwrap();
        assert_eq!(ticket.offset, 3);
    }

    #[test]
    fn test_first_page_sets_cursor_and_has_more() {
        let mut state = FeedState::default();
        state.begin(Phase::LoadingInitial, 2).unwrap();
        let visible = state.commit_first_page(vec![listing("a", 9), listing("b", 8)], 2);
        assert_eq!(visible, 2);
        assert_eq!(state.page_index(), 1);
        assert!(state.has_more());
        assert_eq!(state.phase(), Phase::Idle);

        state.begin(Phase::Refreshing, 2).unwrap();
        state.commit_first_page(vec![listing("a", 9)], 2);
        assert!(!state.has_more());
    }

    #[test]
    fn test_empty_first_page_exhausts() {
        let mut state = FeedState::default();
        state.begin(Phase::LoadingInitial, 10).unwrap();
        state.commit_first_page(Vec::new(), 10);
        assert!(!state.has_more());
        assert_eq!(state.view_state(), ViewState::Empty);
    }

    #[test]
    fn test_first_page_dedupes_and_sorts() {
        let mut state = FeedState::default();
        state.begin(Phase::LoadingInitial, 4).unwrap();
        state.commit_first_page(
            vec![listing("b", 5), listing("a", 9), listing("b", 5), listing("c", 1)],
            4,
        );
        assert_eq!(ids(&state), vec!["a", "b", "c"]);
        // has_more counts fetched rows, not surviving ones
        assert!(state.has_more());
    }

    #[test]
    fn test_next_page_skips_overlap() {
        let mut state = FeedState::default();
        state.begin(Phase::LoadingInitial, 2).unwrap();
        state.commit_first_page(vec![listing("a", 9), listing("b", 8)], 2);

        // A remote insert shifted offsets: "b" reappears at the top of page 2
        state.begin(Phase::LoadingMore, 2).unwrap();
        let added = state.commit_next_page(vec![listing("b", 8), listing("c", 7)], 2);
        assert_eq!(added, 1);
        assert_eq!(ids(&state), vec!["a", "b", "c"]);
        assert_eq!(state.page_index(), 2);
        assert!(state.has_more());
    }

    #[test]
    fn test_next_page_keeps_order_on_ties() {
        let mut state = FeedState::default();
        state.begin(Phase::LoadingInitial, 2).unwrap();
        state.commit_first_page(vec![listing("a", 5), listing("b", 5)], 2);
        state.begin(Phase::LoadingMore, 2).unwrap();
        state.commit_next_page(vec![listing("c", 5)], 2);
        assert_eq!(ids(&state), vec!["a", "b", "c"]);
        assert!(!state.has_more());
    }

    #[test]
    fn test_next_page_all_duplicates_still_advances() {
        let mut state = FeedState::default();
        state.begin(Phase::LoadingInitial, 1).unwrap();
        state.commit_first_page(vec![listing("a", 9)], 1);
        let before = Arc::clone(state.items());

        state.begin(Phase::LoadingMore, 1).unwrap();
        assert_eq!(state.commit_next_page(vec![listing("a", 9)], 1), 0);
        assert_eq!(state.page_index(), 2);
        // No rows added, so the list allocation is reused
        assert!(Arc::ptr_eq(&before, state.items()));
    }

    #[test]
    fn test_failure_preserves_data() {
        let mut state = FeedState::default();
        state.begin(Phase::LoadingInitial, 2).unwrap();
        state.commit_first_page(vec![listing("a", 9), listing("b", 8)], 2);

        state.begin(Phase::Refreshing, 2).unwrap();
        state.commit_failure("boom".to_string());
        assert_eq!(ids(&state), vec!["a", "b"]);
        assert_eq!(state.page_index(), 1);
        assert!(state.has_more());
        assert_eq!(state.phase(), Phase::Idle);
        assert_eq!(state.last_error().map(|e| &**e), Some("boom"));
        assert_eq!(state.view_state(), ViewState::List);
    }

    #[test]
    fn test_failure_without_data_is_unavailable() {
        let mut state = FeedState::default();
        state.begin(Phase::LoadingInitial, 2).unwrap();
        state.commit_failure("offline".to_string());
        assert_eq!(state.view_state(), ViewState::Unavailable);

        state.begin(Phase::LoadingInitial, 2).unwrap();
        state.commit_first_page(Vec::new(), 2);
        assert!(state.last_error().is_none());
        assert_eq!(state.view_state(), ViewState::Empty);
    }

    #[test]
    fn test_refresh_over_empty_feed_shows_spinner() {
        let mut state = FeedState::default();
        state.begin(Phase::Refreshing, 2).unwrap();
        assert_eq!(state.view_state(), ViewState::Spinner);
        state.commit_first_page(Vec::new(), 2);
        assert_eq!(state.view_state(), ViewState::Empty);

        state.begin(Phase::LoadingInitial, 2).unwrap();
        state.commit_failure("offline".to_string());
        assert_eq!(state.view_state(), ViewState::Unavailable);

        // Retrying with a refresh hides the stale error while it runs
        state.begin(Phase::Refreshing, 2).unwrap();
        assert_eq!(state.view_state(), ViewState::Spinner);
        state.commit_failure("still offline".to_string());
        assert_eq!(state.view_state(), ViewState::Unavailable);
    }

    #[test]
    fn test_abandon_releases_slot() {
        let mut state = FeedState::default();
        state.begin(Phase::LoadingInitial, 2).unwrap();
        state.commit_first_page(vec![listing("a", 9)], 2);
        state.begin(Phase::Refreshing, 2).unwrap();
        state.abandon();
        assert_eq!(state.phase(), Phase::Idle);
        assert_eq!(ids(&state), vec!["a"]);
        assert!(state.begin(Phase::Refreshing, 2).is_some());
    }

    #[test]
    fn test_unmount_invalidates_tickets() {
        let mut state = FeedState::default();
        let ticket = state.begin(Phase::LoadingInitial, 2).unwrap();
        assert!(state.accepts(&ticket));

        state.unmount();
        assert!(!state.accepts(&ticket));
        assert!(!state.is_mounted());
        assert!(state.begin(Phase::Refreshing, 2).is_none());
    }
}
