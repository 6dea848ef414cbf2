use crate::backend::{ListingSource, RemoteError, RestClient};
use crate::feed::{FeedSnapshot, FeedSynchronizer, Phase, SyncOptions, SyncOutcome};
use crate::listing::{Category, Listing, ListingFilter, ListingId, ListingSummary};
use lru::LruCache;
use std::borrow::Cow;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

/// Rows from the end of the list at which the next page is requested.
pub const LOAD_MORE_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    /// All listings, optionally narrowed by category.
    Market,
    /// The signed-in user's own listings.
    Mine,
}

impl Tab {
    pub fn title(self) -> &'static str {
        match self {
            Tab::Market => "Market",
            Tab::Mine => "My listings",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Feed,
    Detail,
}

/// Detail view content for the opened listing.
#[derive(Debug, Clone)]
pub enum DetailState {
    Loading,
    Loaded(Arc<Listing>),
    /// Deleted remotely since the feed was loaded.
    Missing,
    Failed(String),
}

/// One mounted feed view and its cursor.
pub struct FeedTab {
    pub feed: FeedSynchronizer,
    pub selected: usize,
    /// Id under the cursor, so the selection follows the row across refreshes.
    selected_id: Option<ListingId>,
    /// Identifies this mount; events from an earlier mount of the same tab are stale.
    pub mount: u64,
}

impl FeedTab {
    fn new(feed: FeedSynchronizer, mount: u64) -> Self {
        Self {
            feed,
            selected: 0,
            selected_id: None,
            mount,
        }
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.feed.snapshot()
    }

    pub fn selected_listing(&self) -> Option<ListingSummary> {
        self.feed.snapshot().items.get(self.selected).cloned()
    }

    pub fn select_next(&mut self) {
        let items = self.feed.snapshot().items;
        if self.selected + 1 < items.len() {
            self.selected += 1;
        }
        self.selected_id = items.get(self.selected).map(|l| l.id.clone());
    }

    pub fn select_prev(&mut self) {
        let items = self.feed.snapshot().items;
        self.selected = self.selected.saturating_sub(1);
        self.selected_id = items.get(self.selected).map(|l| l.id.clone());
    }

    pub fn select_first(&mut self) {
        let items = self.feed.snapshot().items;
        self.selected = 0;
        self.selected_id = items.first().map(|l| l.id.clone());
    }

    /// Re-anchor the cursor after the list was swapped.
    ///
    /// Stays on the same listing if it is still present, otherwise keeps the
    /// index (clamped to the new length).
    pub fn sync_selection(&mut self) {
        let items = self.feed.snapshot().items;
        if let Some(pos) = self
            .selected_id
            .as_ref()
            .and_then(|id| items.iter().position(|l| &l.id == id))
        {
            self.selected = pos;
        } else {
            self.selected = self.selected.min(items.len().saturating_sub(1));
        }
        self.selected_id = items.get(self.selected).map(|l| l.id.clone());
    }

    /// True when the cursor is close enough to the end to fetch the next page.
    pub fn wants_more(&self) -> bool {
        let snapshot = self.feed.snapshot();
        !snapshot.items.is_empty()
            && snapshot.has_more
            && snapshot.phase == Phase::Idle
            && self.selected + LOAD_MORE_THRESHOLD >= snapshot.items.len()
    }
}

/// Events from background tasks
pub enum AppEvent {
    /// A feed operation finished.
    ///
    /// `mount` is the tab's mount counter when the task was spawned.
    FeedSynced {
        tab: Tab,
        mount: u64,
        outcome: SyncOutcome,
    },
    /// Detail fetch finished; `generation` filters out superseded requests.
    DetailLoaded {
        id: ListingId,
        generation: u64,
        result: Result<Option<Listing>, RemoteError>,
    },
    /// A background task panicked.
    TaskPanicked { task: &'static str, error: String },
}

pub struct App {
    pub client: Arc<RestClient>,
    source: Arc<dyn ListingSource>,
    pub options: SyncOptions,
    pub category: Option<Category>,
    pub tab: Tab,
    pub view: View,
    pub market: FeedTab,
    /// Present only when signed in.
    pub mine: Option<FeedTab>,
    next_mount: u64,

    pub detail_summary: Option<ListingSummary>,
    pub detail: Option<DetailState>,
    pub detail_generation: u64,
    pub detail_cache: LruCache<ListingId, Arc<Listing>>,
    pub detail_handle: Option<JoinHandle<()>>,
    pub detail_scroll: u16,

    pub status_message: Option<(Cow<'static, str>, Instant)>,
    pub needs_redraw: bool,
    pub spinner_frame: usize,
}

impl App {
    pub fn new(
        client: Arc<RestClient>,
        options: SyncOptions,
        category: Option<Category>,
        detail_cache_size: NonZeroUsize,
    ) -> Self {
        let source: Arc<dyn ListingSource> = client.clone();
        let market = FeedTab::new(
            FeedSynchronizer::new(
                Arc::clone(&source),
                ListingFilter::category(category),
                options,
            ),
            0,
        );
        let mine = client.session().map(|session| {
            FeedTab::new(
                FeedSynchronizer::new(
                    Arc::clone(&source),
                    ListingFilter::seller(session.user_id()),
                    options,
                ),
                1,
            )
        });

        Self {
            client,
            source,
            options,
            category,
            tab: Tab::Market,
            view: View::Feed,
            market,
            mine,
            next_mount: 2,
            detail_summary: None,
            detail: None,
            detail_generation: 0,
            detail_cache: LruCache::new(detail_cache_size),
            detail_handle: None,
            detail_scroll: 0,
            status_message: None,
            needs_redraw: true,
            spinner_frame: 0,
        }
    }

    pub fn tabs(&self) -> Vec<Tab> {
        if self.mine.is_some() {
            vec![Tab::Market, Tab::Mine]
        } else {
            vec![Tab::Market]
        }
    }

    pub fn feed_tab(&self, tab: Tab) -> Option<&FeedTab> {
        match tab {
            Tab::Market => Some(&self.market),
            Tab::Mine => self.mine.as_ref(),
        }
    }

    pub fn feed_tab_mut(&mut self, tab: Tab) -> Option<&mut FeedTab> {
        match tab {
            Tab::Market => Some(&mut self.market),
            Tab::Mine => self.mine.as_mut(),
        }
    }

    pub fn current(&self) -> &FeedTab {
        self.feed_tab(self.tab).unwrap_or(&self.market)
    }

    pub fn current_mut(&mut self) -> &mut FeedTab {
        match (self.tab, self.mine.as_mut()) {
            (Tab::Mine, Some(mine)) => mine,
            _ => &mut self.market,
        }
    }

    /// Switch to the next tab. Returns false if there is only one.
    pub fn next_tab(&mut self) -> bool {
        let tabs = self.tabs();
        if tabs.len() < 2 {
            return false;
        }
        let idx = tabs.iter().position(|t| *t == self.tab).unwrap_or(0);
        self.tab = tabs[(idx + 1) % tabs.len()];
        true
    }

    /// Advance the market category filter and remount the market feed with it.
    ///
    /// The old feed is unmounted, so anything it still has in flight is dropped.
    pub fn cycle_category(&mut self) -> Option<Category> {
        self.category = Category::cycle(self.category);
        self.market.feed.unmount();

        let mount = self.next_mount;
        self.next_mount += 1;
        self.market = FeedTab::new(
            FeedSynchronizer::new(
                Arc::clone(&self.source),
                ListingFilter::category(self.category),
                self.options,
            ),
            mount,
        );
        tracing::info!(category = ?self.category, mount, "Market feed remounted");
        self.category
    }

    /// Open the detail view for the selected listing.
    ///
    /// Returns the id to fetch, or `None` when nothing is selected or the
    /// detail was served from cache.
    pub fn enter_detail(&mut self) -> Option<ListingId> {
        let summary = self.current().selected_listing()?;
        let id = summary.id.clone();
        self.view = View::Detail;
        self.detail_scroll = 0;
        self.detail_summary = Some(summary);

        if let Some(listing) = self.detail_cache.get(&id) {
            tracing::debug!(id = %id, "Listing detail cache hit");
            self.detail = Some(DetailState::Loaded(Arc::clone(listing)));
            return None;
        }

        self.detail_generation = self.detail_generation.wrapping_add(1);
        self.detail = Some(DetailState::Loading);
        Some(id)
    }

    pub fn exit_detail(&mut self) {
        if let Some(handle) = self.detail_handle.take() {
            handle.abort();
        }
        self.view = View::Feed;
        self.detail = None;
        self.detail_summary = None;
    }

    /// Apply a finished detail fetch if it is still the one being waited on.
    pub fn apply_detail(
        &mut self,
        id: ListingId,
        generation: u64,
        result: Result<Option<Listing>, RemoteError>,
    ) {
        if generation != self.detail_generation || self.view != View::Detail {
            tracing::debug!(id = %id, generation, current = self.detail_generation, "Ignoring stale listing detail");
            return;
        }
        self.detail_handle = None;
        self.detail = Some(match result {
            Ok(Some(listing)) => {
                let listing = Arc::new(listing);
                self.detail_cache.put(id, Arc::clone(&listing));
                DetailState::Loaded(listing)
            }
            Ok(None) => DetailState::Missing,
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "Failed to load listing detail");
                DetailState::Failed(e.to_string())
            }
        });
    }

    /// True while something on screen is waiting on the network.
    pub fn is_busy(&self) -> bool {
        let feed_busy = |tab: &FeedTab| tab.feed.snapshot().phase != Phase::Idle;
        matches!(self.detail, Some(DetailState::Loading))
            || feed_busy(&self.market)
            || self.mine.as_ref().is_some_and(feed_busy)
    }

    /// Set status message (will auto-expire after 3 seconds)
    pub fn set_status(&mut self, msg: impl Into<Cow<'static, str>>) {
        self.status_message = Some((msg.into(), Instant::now()));
    }

    /// Clear status message if expired (older than 3 seconds)
    /// Returns true if a message was actually cleared
    pub fn clear_expired_status(&mut self) -> bool {
        if let Some((_, time)) = &self.status_message {
            if time.elapsed().as_secs() >= 3 {
                self.status_message = None;
                return true;
            }
        }
        false
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if let Some(handle) = self.detail_handle.take() {
            handle.abort();
        }
        self.market.feed.unmount();
        if let Some(mine) = &self.mine {
            mine.feed.unmount();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use secrecy::SecretString;
    use std::sync::Mutex;

    struct StaticSource(Mutex<Vec<ListingSummary>>);

    #[async_trait]
    impl ListingSource for StaticSource {
        async fn fetch_page(
            &self,
            offset: usize,
            limit: usize,
            _filter: &ListingFilter,
        ) -> Result<Vec<ListingSummary>, RemoteError> {
            let rows = self.0.lock().unwrap();
            Ok(rows.iter().skip(offset).take(limit).cloned().collect())
        }
    }

    fn listing(id: &str, minute: u32) -> ListingSummary {
        ListingSummary {
            id: ListingId::new(id),
            title: format!("Listing {}", id),
            price: 5.0,
            image_url: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
            category: None,
        }
    }

    fn test_app(rows: Vec<ListingSummary>) -> (App, Arc<StaticSource>) {
        let client = RestClient::new(
            reqwest::Client::new(),
            "https://market.example.co",
            SecretString::from("anon".to_string()),
        )
        .unwrap();
        let mut app = App::new(
            Arc::new(client),
            SyncOptions {
                page_size: 4,
                ..SyncOptions::default()
            },
            None,
            NonZeroUsize::new(4).unwrap(),
        );
        let source = Arc::new(StaticSource(Mutex::new(rows)));
        let dyn_source: Arc<dyn ListingSource> = source.clone();
        app.source = dyn_source;
        app.market = FeedTab::new(
            FeedSynchronizer::new(source.clone(), ListingFilter::default(), app.options),
            0,
        );
        (app, source)
    }

    #[test]
    fn test_anonymous_app_has_only_market_tab() {
        let (mut app, _) = test_app(Vec::new());
        assert_eq!(app.tabs(), vec![Tab::Market]);
        assert!(!app.next_tab());
        assert_eq!(app.tab, Tab::Market);
    }

    #[tokio::test]
    async fn test_selection_follows_listing_across_refresh() {
        let (mut app, source) = test_app(vec![listing("a", 9), listing("b", 8), listing("c", 7)]);
        app.market.feed.load_initial().await;
        app.market.sync_selection();
        app.market.select_next();
        assert_eq!(app.market.selected_listing().unwrap().id.as_str(), "b");

        // A newer listing appears at the top
        source.0.lock().unwrap().insert(0, listing("z", 30));
        app.market.feed.refresh().await;
        app.market.sync_selection();
        assert_eq!(app.market.selected, 2);
        assert_eq!(app.market.selected_listing().unwrap().id.as_str(), "b");
    }

    #[tokio::test]
    async fn test_wants_more_near_end() {
        let rows = (0..8).map(|i| listing(&format!("l{}", i), 50 - i)).collect();
        let (mut app, _) = test_app(rows);
        app.market.feed.load_initial().await;
        app.market.sync_selection();
        assert!(!app.market.wants_more());

        app.market.select_next();
        assert!(app.market.wants_more());
    }

    #[tokio::test]
    async fn test_cycle_category_remounts_market() {
        let (mut app, _) = test_app(vec![listing("a", 9)]);
        let old = app.market.feed.clone();
        let old_mount = app.market.mount;

        assert_eq!(app.cycle_category(), Some(Category::Electronics));
        assert!(old.snapshot().items.is_empty());
        assert!(matches!(
            old.load_initial().await,
            SyncOutcome::Skipped { .. }
        ));
        assert_ne!(app.market.mount, old_mount);
        assert_eq!(
            *app.market.feed.filter(),
            ListingFilter::category(Some(Category::Electronics))
        );
        assert!(app.market.feed.filter().seller.is_none());
    }

    #[tokio::test]
    async fn test_detail_cache_and_stale_results() {
        let (mut app, _) = test_app(vec![listing("a", 9), listing("b", 8)]);
        app.market.feed.load_initial().await;
        app.market.sync_selection();

        let id = app.enter_detail().unwrap();
        let generation = app.detail_generation;
        assert!(matches!(app.detail, Some(DetailState::Loading)));

        // A result for an older request is ignored
        app.apply_detail(id.clone(), generation - 1, Ok(None));
        assert!(matches!(app.detail, Some(DetailState::Loading)));

        let detail = Listing {
            summary: listing("a", 9),
            description: Some("Barely used".to_string()),
            user_id: None,
        };
        app.apply_detail(id, generation, Ok(Some(detail)));
        assert!(matches!(app.detail, Some(DetailState::Loaded(_))));

        app.exit_detail();
        assert_eq!(app.view, View::Feed);
        // Served from cache the second time
        assert!(app.enter_detail().is_none());
        assert!(matches!(app.detail, Some(DetailState::Loaded(_))));
    }

    #[test]
    fn test_status_message_set() {
        let (mut app, _) = test_app(Vec::new());
        app.set_status("Hello");
        assert!(!app.clear_expired_status());
        assert_eq!(app.status_message.as_ref().map(|(m, _)| m.as_ref()), Some("Hello"));
    }
}
