use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use once_cell::sync::OnceCell;

use crate::api::{ApiResult, Category, Comment, VideoEntry, VideoPage};
use crate::data::{CategoryService, CommentService, FeedService, InteractionService};
use crate::feed::{Advance, FeedStore};
use crate::filter::Selection;
use crate::interact::{self, Coordinator, IntentKind, Outcome, Resolution};
use crate::playback::{Controller, MediaElement, PlaybackEvent, PlaybackState};
use crate::rating::{Overlay, OverlayEvent, OverlayState};
use crate::session;

const COMMENT_CACHE_TTL: Duration = Duration::from_secs(120);
const COMMENT_CACHE_MAX: usize = 64;

fn session_debug_enabled() -> bool {
    static FLAG: OnceCell<bool> = OnceCell::new();
    *FLAG.get_or_init(|| {
        std::env::var("REELVIEW_DEBUG_SESSION")
            .map(|val| !val.trim().is_empty() && val.trim() != "0")
            .unwrap_or(false)
    })
}

fn debug_log(message: impl AsRef<str>) {
    if session_debug_enabled() {
        eprintln!("{}", message.as_ref());
    }
}

pub struct Options {
    pub feed_service: Arc<dyn FeedService>,
    pub category_service: Arc<dyn CategoryService>,
    pub comment_service: Arc<dyn CommentService>,
    pub interaction_service: Arc<dyn InteractionService>,
    pub session_manager: Arc<session::Manager>,
    pub element: Box<dyn MediaElement>,
    pub initial_entry: Option<VideoEntry>,
    pub page_size: usize,
    pub preload_threshold: usize,
    pub comment_page_size: usize,
    pub autoplay: bool,
    pub start_muted: bool,
    pub auto_advance_delay: Duration,
    pub rating_countdown: Duration,
    pub rating_ack: Duration,
}

struct PendingPage {
    request_id: u64,
    filter_key: String,
}

struct PendingComments {
    request_id: u64,
    video_id: String,
}

struct PendingDetails {
    request_id: u64,
    video_id: String,
}

struct PendingCategories {
    request_id: u64,
}

enum AsyncResponse {
    Page {
        request_id: u64,
        filter_key: String,
        result: ApiResult<VideoPage>,
    },
    Details {
        request_id: u64,
        video_id: String,
        result: ApiResult<VideoEntry>,
    },
    Comments {
        request_id: u64,
        video_id: String,
        result: ApiResult<Vec<Comment>>,
    },
    Categories {
        request_id: u64,
        result: ApiResult<Vec<Category>>,
    },
}

struct CachedThread {
    comments: Vec<Comment>,
    fetched_at: Instant,
}

/// The watch-session model: one ordered feed, one active player binding, one
/// rating overlay, and the pending-request guards that make every response
/// either current or silently stale. All state mutation happens on the
/// caller's loop; worker threads only run HTTP and send messages back.
pub struct Session {
    feed_service: Arc<dyn FeedService>,
    category_service: Arc<dyn CategoryService>,
    session_manager: Arc<session::Manager>,
    store: FeedStore,
    selection: Selection,
    categories: Vec<Category>,
    playback: Controller,
    overlay: Overlay,
    coordinator: Coordinator,
    comments: Vec<Comment>,
    comment_cache: HashMap<String, CachedThread>,
    comment_service: Arc<dyn CommentService>,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
    interact_rx: Receiver<interact::Response>,
    pending_page: Option<PendingPage>,
    pending_comments: Option<PendingComments>,
    pending_details: Option<PendingDetails>,
    pending_categories: Option<PendingCategories>,
    pending_advance: Option<i64>,
    auto_advance_at: Option<Instant>,
    next_request_id: u64,
    preload_threshold: usize,
    comment_page_size: usize,
    auto_advance_delay: Duration,
    end_of_feed: bool,
    status: String,
}

impl Session {
    pub fn new(options: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let (interact_tx, interact_rx) = unbounded();
        let coordinator = Coordinator::new(
            options.interaction_service,
            options.comment_service.clone(),
            options.session_manager.clone(),
            interact_tx,
        );
        let store = match options.initial_entry {
            Some(entry) => FeedStore::with_initial(options.page_size, entry),
            None => FeedStore::new(options.page_size),
        };
        let playback = Controller::new(options.element, options.autoplay, options.start_muted);
        let overlay = Overlay::new(options.rating_countdown, options.rating_ack);

        Self {
            feed_service: options.feed_service,
            category_service: options.category_service,
            session_manager: options.session_manager,
            store,
            selection: Selection::new(),
            categories: Vec::new(),
            playback,
            overlay,
            coordinator,
            comments: Vec::new(),
            comment_cache: HashMap::new(),
            comment_service: options.comment_service,
            response_tx,
            response_rx,
            interact_rx,
            pending_page: None,
            pending_comments: None,
            pending_details: None,
            pending_categories: None,
            pending_advance: None,
            auto_advance_at: None,
            next_request_id: 1,
            preload_threshold: options.preload_threshold,
            comment_page_size: options.comment_page_size.max(1),
            auto_advance_delay: options.auto_advance_delay,
            end_of_feed: false,
            status: "Loading feed...".to_string(),
        }
    }

    pub fn start(&mut self) {
        self.request_categories();
        if self.store.current_entry().is_some() {
            self.bind_current();
        }
        self.request_page();
    }

    // -- accessors ---------------------------------------------------------

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn current_entry(&self) -> Option<&VideoEntry> {
        self.store.current_entry()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.store.current_index()
    }

    pub fn loaded_count(&self) -> usize {
        self.store.len()
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn overlay_state(&self) -> OverlayState {
        self.overlay.state()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn is_muted(&self) -> bool {
        self.playback.is_muted()
    }

    pub fn end_of_feed(&self) -> bool {
        self.end_of_feed
    }

    pub fn is_signed_in(&self) -> bool {
        self.session_manager.is_signed_in()
    }

    pub fn is_loading(&self) -> bool {
        self.pending_page.is_some()
            || self.pending_comments.is_some()
            || self.pending_categories.is_some()
            || self.coordinator.has_pending()
    }

    // -- category filter ---------------------------------------------------

    pub fn toggle_category(&mut self, category_id: &str) {
        let before = self.selection.filter_key();
        self.selection.toggle(category_id);
        if self.selection.filter_key() != before {
            self.apply_filter_change();
        }
    }

    pub fn toggle_all_categories(&mut self) {
        if self.selection.toggle_all() {
            self.apply_filter_change();
        }
    }

    fn apply_filter_change(&mut self) {
        let key = self.selection.filter_key();
        debug_log(format!("filter changed to {}", key));
        self.store.reset_filter(key);
        self.end_of_feed = false;
        self.pending_advance = None;
        self.auto_advance_at = None;
        self.playback.teardown();
        self.overlay.cancel();
        self.comments.clear();
        self.coordinator.forget_thread_intents();
        self.status = "Loading feed...".to_string();
        self.request_page();
    }

    // -- pagination --------------------------------------------------------

    fn next_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }

    /// Fetch the next page for the active filter. Re-entrant calls while a
    /// fetch for the same filter is in flight are no-ops; a fetch for a
    /// replaced filter stays in flight and is discarded on arrival.
    fn request_page(&mut self) {
        let filter_key = self.store.filter_key().to_string();
        if let Some(pending) = &self.pending_page {
            if pending.filter_key == filter_key {
                return;
            }
        }
        if !self.store.pager().has_more {
            return;
        }

        let request_id = self.next_id();
        let skip = self.store.pager().skip;
        let limit = self.store.pager().limit;
        let category_ids = self.selection.ids();
        self.pending_page = Some(PendingPage {
            request_id,
            filter_key: filter_key.clone(),
        });

        let service = self.feed_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.videos_by_category(&category_ids, skip, limit);
            let _ = tx.send(AsyncResponse::Page {
                request_id,
                filter_key,
                result,
            });
        });
    }

    fn maybe_request_more(&mut self) {
        if self.store.near_tail(self.preload_threshold) && self.store.pager().has_more {
            self.request_page();
        }
    }

    fn request_categories(&mut self) {
        let request_id = self.next_id();
        self.pending_categories = Some(PendingCategories { request_id });
        let service = self.category_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.list_categories();
            let _ = tx.send(AsyncResponse::Categories { request_id, result });
        });
    }

    fn request_details(&mut self, video_id: &str) {
        let request_id = self.next_id();
        self.pending_details = Some(PendingDetails {
            request_id,
            video_id: video_id.to_string(),
        });
        let service = self.feed_service.clone();
        let tx = self.response_tx.clone();
        let video = video_id.to_string();
        thread::spawn(move || {
            let result = service.video_details(&video);
            let _ = tx.send(AsyncResponse::Details {
                request_id,
                video_id: video,
                result,
            });
        });
    }

    // -- navigation --------------------------------------------------------

    pub fn advance(&mut self, delta: i64) {
        match self.store.advance(delta) {
            Advance::Moved(index) => {
                self.pending_advance = None;
                self.end_of_feed = false;
                debug_log(format!("advanced to index {}", index));
                self.bind_current();
                self.maybe_request_more();
            }
            Advance::NeedsFetch => {
                self.pending_advance = Some(delta);
                self.status = "Loading more videos...".to_string();
                self.request_page();
            }
            Advance::EndOfFeed => {
                self.pending_advance = None;
                self.end_of_feed = true;
                self.status = "You're all caught up.".to_string();
            }
        }
    }

    fn bind_current(&mut self) {
        let Some(entry) = self.store.current_entry() else {
            return;
        };
        let video_id = entry.id.clone();
        let playback_url = entry.playback_url.clone();
        let title = entry.title.clone();

        self.overlay.cancel();
        self.auto_advance_at = None;
        self.comments.clear();
        self.coordinator.forget_thread_intents();

        if let Err(err) = self.playback.open(&video_id, &playback_url) {
            self.status = format!("Playback failed for \"{}\": {}", title, err);
        } else {
            self.status = format!("Now playing \"{}\"", title);
        }
        self.load_comments_for_current();
    }

    // -- playback ----------------------------------------------------------

    pub fn toggle_play(&mut self) {
        if let Err(err) = self.playback.toggle_play() {
            self.status = format!("Player error: {}", err);
        }
    }

    pub fn toggle_mute(&mut self) {
        if let Err(err) = self.playback.toggle_mute() {
            self.status = format!("Player error: {}", err);
        }
    }

    // -- comments ----------------------------------------------------------

    fn load_comments_for_current(&mut self) {
        let Some(entry) = self.store.current_entry() else {
            return;
        };
        let video_id = entry.id.clone();

        if let Some(cached) = self.comment_cache.get(&video_id) {
            if cached.fetched_at.elapsed() < COMMENT_CACHE_TTL {
                self.comments = cached.comments.clone();
                self.pending_comments = None;
                return;
            }
        }

        let request_id = self.next_id();
        self.pending_comments = Some(PendingComments {
            request_id,
            video_id: video_id.clone(),
        });
        let service = self.comment_service.clone();
        let tx = self.response_tx.clone();
        let limit = self.comment_page_size;
        thread::spawn(move || {
            let result = service.comments(&video_id, 0, limit, None);
            let _ = tx.send(AsyncResponse::Comments {
                request_id,
                video_id,
                result,
            });
        });
    }

    fn sync_comment_cache(&mut self) {
        let Some(entry) = self.store.current_entry() else {
            return;
        };
        let video_id = entry.id.clone();
        if self.comment_cache.len() >= COMMENT_CACHE_MAX {
            // drop the stalest thread to stay bounded
            if let Some(oldest) = self
                .comment_cache
                .iter()
                .min_by_key(|(_, cached)| cached.fetched_at)
                .map(|(id, _)| id.clone())
            {
                self.comment_cache.remove(&oldest);
            }
        }
        self.comment_cache.insert(
            video_id,
            CachedThread {
                comments: self.comments.clone(),
                fetched_at: Instant::now(),
            },
        );
    }

    // -- interactions ------------------------------------------------------

    pub fn toggle_like(&mut self) {
        let Some(entry) = self.store.current_entry() else {
            return;
        };
        let video_id = entry.id.clone();
        let desired = !entry.is_liked;
        let outcome = self
            .coordinator
            .set_like(&mut self.store, &video_id, desired);
        self.report_outcome(outcome, if desired { "Liked" } else { "Unliked" });
    }

    pub fn toggle_bookmark(&mut self) {
        let Some(entry) = self.store.current_entry() else {
            return;
        };
        let video_id = entry.id.clone();
        let desired = !entry.is_bookmarked;
        let outcome = self
            .coordinator
            .set_bookmark(&mut self.store, &video_id, desired);
        self.report_outcome(outcome, if desired { "Bookmarked" } else { "Unbookmarked" });
    }

    pub fn toggle_follow(&mut self) {
        let Some(entry) = self.store.current_entry() else {
            return;
        };
        let uploader_id = entry.uploader.id.clone();
        let desired = !entry.is_followed;
        let outcome = self
            .coordinator
            .set_follow(&mut self.store, &uploader_id, desired);
        self.report_outcome(outcome, if desired { "Followed" } else { "Unfollowed" });
    }

    pub fn add_comment(&mut self, body: &str) {
        if body.trim().is_empty() {
            self.status = "Comment text required.".to_string();
            return;
        }
        let Some(entry) = self.store.current_entry() else {
            return;
        };
        let video_id = entry.id.clone();
        let outcome = self
            .coordinator
            .add_comment(&mut self.comments, &video_id, body);
        self.report_outcome(outcome, "Comment posted");
        self.sync_comment_cache();
    }

    pub fn delete_comment(&mut self, comment_id: &str) {
        let Some(entry) = self.store.current_entry() else {
            return;
        };
        let video_id = entry.id.clone();
        let outcome = self
            .coordinator
            .delete_comment(&mut self.comments, &video_id, comment_id);
        self.report_outcome(outcome, "Comment deleted");
        self.sync_comment_cache();
    }

    pub fn toggle_comment_like(&mut self, comment_id: &str) {
        let desired = interact::find_comment(&self.comments, comment_id)
            .map(|comment| !comment.is_liked)
            .unwrap_or(true);
        let outcome = self
            .coordinator
            .set_comment_like(&mut self.comments, comment_id, desired);
        self.report_outcome(outcome, if desired { "Comment liked" } else { "Comment unliked" });
        self.sync_comment_cache();
    }

    pub fn submit_rating(&mut self, rating: u8, now: Instant) {
        let Some(video_id) = self.playback.active_id().map(str::to_string) else {
            self.status = "Nothing is playing.".to_string();
            return;
        };
        if self.overlay.submit(rating, now).is_none() {
            self.status = "No rating prompt is active.".to_string();
            return;
        }
        match self.coordinator.submit_rating(&video_id, rating) {
            Outcome::Applied => {
                self.status = "Thanks for your rating!".to_string();
            }
            Outcome::SignInRequired => {
                self.overlay.cancel();
                self.status = "Sign in to rate videos.".to_string();
            }
            _ => {}
        }
    }

    fn report_outcome(&mut self, outcome: Outcome, verb: &str) {
        match outcome {
            Outcome::Applied => {
                self.status = format!("{} (sending...)", verb);
            }
            Outcome::SignInRequired => {
                self.status = "Sign in to interact with videos.".to_string();
            }
            Outcome::NoSuchTarget => {
                debug_log(format!("{}: target not loaded, ignoring", verb));
            }
            Outcome::NotPermitted => {
                self.status = "You can only delete your own comments.".to_string();
            }
        }
    }

    // -- response handling -------------------------------------------------

    /// Drain every queued worker response. Called once per loop turn.
    pub fn pump(&mut self) {
        loop {
            match self.response_rx.try_recv() {
                Ok(response) => self.handle_async(response),
                Err(_) => break,
            }
        }
        loop {
            match self.interact_rx.try_recv() {
                Ok(response) => self.handle_interaction(response),
                Err(_) => break,
            }
        }
    }

    fn handle_async(&mut self, response: AsyncResponse) {
        match response {
            AsyncResponse::Page {
                request_id,
                filter_key,
                result,
            } => {
                if filter_key != self.store.filter_key() {
                    debug_log(format!("dropping stale page for filter {}", filter_key));
                    return;
                }
                let Some(pending) = &self.pending_page else {
                    return;
                };
                if pending.request_id != request_id {
                    return;
                }
                self.pending_page = None;

                match result {
                    Ok(page) => {
                        let returned = page.data.len();
                        let had_current = self.store.current_index().is_some();
                        let added = self.store.append_entries(page.data);
                        self.store.pager_mut().absorb(returned);
                        debug_log(format!(
                            "page merged: returned={} added={} has_more={}",
                            returned,
                            added,
                            self.store.pager().has_more
                        ));
                        if added > 0 {
                            self.status = format!("Loaded {} videos.", self.store.len());
                        }
                        if !had_current && self.store.current_index().is_some() {
                            self.bind_current();
                        }
                        if let Some(delta) = self.pending_advance.take() {
                            self.advance(delta);
                        }
                    }
                    Err(err) => {
                        self.store.pager_mut().fail();
                        self.pending_advance = None;
                        self.status =
                            format!("Couldn't load more videos: {} (change filters to retry)", err);
                    }
                }
            }
            AsyncResponse::Details {
                request_id,
                video_id,
                result,
            } => {
                let Some(pending) = &self.pending_details else {
                    return;
                };
                if pending.request_id != request_id || pending.video_id != video_id {
                    return;
                }
                self.pending_details = None;
                match result {
                    Ok(details) => {
                        let found = self.store.mutate_entry(&video_id, |entry| {
                            entry.views = details.views;
                            entry.likes = details.likes;
                            entry.comments = details.comments;
                            entry.shares = details.shares;
                            entry.is_liked = details.is_liked;
                            entry.is_bookmarked = details.is_bookmarked;
                            entry.is_followed = details.is_followed;
                        });
                        if !found {
                            debug_log(format!("details for unloaded video {}", video_id));
                        }
                    }
                    Err(err) => {
                        debug_log(format!("details fetch failed for {}: {}", video_id, err));
                    }
                }
            }
            AsyncResponse::Comments {
                request_id,
                video_id,
                result,
            } => {
                let Some(pending) = &self.pending_comments else {
                    return;
                };
                if pending.request_id != request_id || pending.video_id != video_id {
                    return;
                }
                self.pending_comments = None;
                let active = self
                    .store
                    .current_entry()
                    .map(|entry| entry.id.clone());
                if active.as_deref() != Some(video_id.as_str()) {
                    debug_log(format!("dropping stale comments for {}", video_id));
                    return;
                }
                match result {
                    Ok(comments) => {
                        self.comments = comments;
                        self.sync_comment_cache();
                    }
                    Err(err) => {
                        self.status = format!("Couldn't load comments: {}", err);
                    }
                }
            }
            AsyncResponse::Categories { request_id, result } => {
                let Some(pending) = &self.pending_categories else {
                    return;
                };
                if pending.request_id != request_id {
                    return;
                }
                self.pending_categories = None;
                match result {
                    Ok(categories) => {
                        self.categories = categories;
                    }
                    Err(err) => {
                        self.status = format!("Couldn't load categories: {}", err);
                    }
                }
            }
        }
    }

    fn handle_interaction(&mut self, response: interact::Response) {
        let active = self
            .store
            .current_entry()
            .map(|entry| entry.id.clone());
        let resolution = self.coordinator.handle_response(
            &mut self.store,
            &mut self.comments,
            active.as_deref(),
            response,
        );
        match resolution {
            Resolution::Stale => {
                debug_log("superseded interaction response dropped");
            }
            Resolution::Confirmed { key } => match key.kind {
                IntentKind::Like => {
                    // pull fresh counters so the optimistic numbers converge
                    self.request_details(&key.target);
                }
                IntentKind::CommentAdd | IntentKind::CommentDelete | IntentKind::CommentLike => {
                    self.sync_comment_cache();
                }
                _ => {}
            },
            Resolution::RolledBack { key: _, notice } => {
                self.sync_comment_cache();
                self.status = format!("That didn't go through: {}", notice);
            }
        }
    }

    // -- timers ------------------------------------------------------------

    /// Drive playback completion, the rating countdown, and auto-advance.
    /// Call once per loop turn with the current instant.
    pub fn tick(&mut self, now: Instant) {
        match self.playback.poll() {
            Ok(Some(PlaybackEvent::Ended)) => {
                self.overlay.show(now);
                self.status = "Rate this video (1-5), or wait to skip.".to_string();
            }
            Ok(None) => {}
            Err(err) => {
                self.status = format!("Player error: {}", err);
            }
        }

        match self.overlay.tick(now) {
            Some(OverlayEvent::Expired) => {
                self.auto_advance_at = Some(now + self.auto_advance_delay);
            }
            Some(OverlayEvent::Dismissed) => {
                self.auto_advance_at = Some(now + self.auto_advance_delay);
            }
            None => {}
        }

        if let Some(at) = self.auto_advance_at {
            if now >= at {
                self.auto_advance_at = None;
                if self.playback.state() == PlaybackState::Ended {
                    self.advance(1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::auth;
    use crate::data::{
        MockCategoryService, MockCommentService, MockFeedService, MockInteractionService,
    };
    use crate::playback::testing::ScriptedElement;
    use crate::storage;

    struct Fixture {
        _dir: tempfile::TempDir,
        session: Session,
        feed: Arc<MockFeedService>,
        interactions: Arc<MockInteractionService>,
        ended: Arc<AtomicBool>,
    }

    fn fixture(video_count: usize, signed_in: bool, preload_threshold: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            storage::Store::open(storage::Options {
                path: Some(dir.path().join("state.db")),
            })
            .unwrap(),
        );
        if signed_in {
            let id = store
                .upsert_account(storage::Account {
                    id: 0,
                    remote_id: "remote-1".into(),
                    username: "mika".into(),
                    display_name: "Mika".into(),
                    created_at: chrono::Utc::now(),
                    updated_at: chrono::Utc::now(),
                })
                .unwrap();
            store
                .upsert_token(storage::Token {
                    account_id: id,
                    token: "tok".into(),
                    issued_at: chrono::Utc::now(),
                })
                .unwrap();
        }
        let flow = Arc::new(auth::Flow::new(auth::Config::default()).unwrap());
        let manager = Arc::new(session::Manager::new(store, flow));
        manager.load_existing().unwrap();

        let feed = Arc::new(MockFeedService::with_count(video_count));
        let interactions = Arc::new(MockInteractionService::default());
        let element = ScriptedElement::new();
        let ended = element.ended_flag();

        let session = Session::new(Options {
            feed_service: feed.clone(),
            category_service: Arc::new(MockCategoryService),
            comment_service: Arc::new(MockCommentService::default()),
            interaction_service: interactions.clone(),
            session_manager: manager,
            element: Box::new(element),
            initial_entry: None,
            page_size: 10,
            preload_threshold,
            comment_page_size: 10,
            autoplay: true,
            start_muted: true,
            auto_advance_delay: Duration::from_secs(3),
            rating_countdown: Duration::from_secs(10),
            rating_ack: Duration::from_secs(3),
        });

        Fixture {
            _dir: dir,
            session,
            feed,
            interactions,
            ended,
        }
    }

    /// Block until one async response arrives, then drain everything queued.
    fn pump_blocking(session: &mut Session) {
        if let Ok(response) = session
            .response_rx
            .recv_timeout(Duration::from_secs(2))
        {
            session.handle_async(response);
        }
        session.pump();
    }

    fn settle(session: &mut Session) {
        // categories + first page + comments all land asynchronously
        for _ in 0..4 {
            pump_blocking(session);
            if session.current_entry().is_some()
                && !session.comments().is_empty()
                && !session.categories().is_empty()
            {
                break;
            }
        }
        session.pump();
    }

    #[test]
    fn start_loads_first_page_and_binds_first_entry() {
        let mut fx = fixture(13, false, 0);
        fx.session.start();
        settle(&mut fx.session);

        assert_eq!(fx.session.loaded_count(), 10);
        assert_eq!(fx.session.current_index(), Some(0));
        assert_eq!(fx.session.playback_state(), PlaybackState::Playing);
        assert_eq!(
            fx.session.current_entry().map(|e| e.id.as_str()),
            Some("v0")
        );
        assert_eq!(fx.feed.page_calls(), 1);
        assert_eq!(fx.session.categories().len(), 3);
        assert_eq!(fx.session.comments().len(), 1);
    }

    #[test]
    fn advance_within_loaded_entries_binds_each_video() {
        let mut fx = fixture(13, false, 0);
        fx.session.start();
        settle(&mut fx.session);

        fx.session.advance(1);
        assert_eq!(
            fx.session.current_entry().map(|e| e.id.as_str()),
            Some("v1")
        );
        fx.session.advance(-1);
        assert_eq!(
            fx.session.current_entry().map(|e| e.id.as_str()),
            Some("v0")
        );
    }

    #[test]
    fn advancing_past_tail_fetches_exactly_once_then_ends() {
        let mut fx = fixture(13, false, 0);
        fx.session.start();
        settle(&mut fx.session);
        assert_eq!(fx.feed.page_calls(), 1);

        for _ in 0..9 {
            fx.session.advance(1);
        }
        assert_eq!(fx.session.current_index(), Some(9));

        // one more advance crosses the tail: exactly one fetch-more
        fx.session.advance(1);
        pump_blocking(&mut fx.session);
        assert_eq!(fx.feed.page_calls(), 2);

        // the pending advance resumed after the short page landed
        assert_eq!(fx.session.current_index(), Some(10));
        assert_eq!(fx.session.loaded_count(), 13);
        assert!(!fx.session.end_of_feed());

        fx.session.advance(1);
        fx.session.advance(1);
        assert_eq!(fx.session.current_index(), Some(12));

        // at the true end: no further fetch, just the end-of-feed signal
        fx.session.advance(1);
        assert!(fx.session.end_of_feed());
        assert_eq!(fx.feed.page_calls(), 2);
    }

    #[test]
    fn page_for_replaced_filter_is_discarded() {
        let mut fx = fixture(13, false, 0);
        fx.session.start();
        // switch filters before the first page lands
        fx.session.toggle_category("food");

        // both the stale "all" page and the "food" page arrive
        for _ in 0..3 {
            pump_blocking(&mut fx.session);
        }

        // only the current filter's page was committed: one absorb, not two
        assert_eq!(fx.session.loaded_count(), 10);
        assert_eq!(fx.session.store.pager().skip, 10);
        assert_eq!(fx.session.store.filter_key(), "food");
    }

    #[test]
    fn reentrant_page_requests_are_noops() {
        let mut fx = fixture(30, false, 0);
        fx.session.start();
        settle(&mut fx.session);
        assert_eq!(fx.feed.page_calls(), 1);

        // three requests for the same filter while one is in flight
        fx.session.request_page();
        fx.session.request_page();
        fx.session.request_page();
        pump_blocking(&mut fx.session);

        assert_eq!(fx.feed.page_calls(), 2);
        assert_eq!(fx.session.loaded_count(), 20);
    }

    #[test]
    fn failed_page_freezes_pagination_but_keeps_entries() {
        let mut fx = fixture(13, false, 0);
        fx.session.start();
        settle(&mut fx.session);
        assert_eq!(fx.session.loaded_count(), 10);

        fx.feed.set_fail(true);
        for _ in 0..9 {
            fx.session.advance(1);
        }
        fx.session.advance(1);
        pump_blocking(&mut fx.session);

        assert_eq!(fx.session.loaded_count(), 10);
        assert!(!fx.session.store.pager().has_more);
        assert!(fx.session.status().contains("Couldn't load more videos"));

        // a filter change resets the cursor and recovers
        fx.feed.set_fail(false);
        fx.session.toggle_category("food");
        assert!(fx.session.store.pager().has_more);
    }

    #[test]
    fn filter_change_tears_down_playback_and_comments() {
        let mut fx = fixture(13, false, 0);
        fx.session.start();
        settle(&mut fx.session);
        assert_eq!(fx.session.playback_state(), PlaybackState::Playing);

        fx.session.toggle_category("food");
        assert_eq!(fx.session.loaded_count(), 0);
        assert!(fx.session.comments().is_empty());
        assert_eq!(fx.session.playback_state(), PlaybackState::Idle);

        settle(&mut fx.session);
        assert_eq!(fx.session.loaded_count(), 10);
        assert_eq!(fx.session.playback_state(), PlaybackState::Playing);
    }

    #[test]
    fn ended_video_shows_overlay_then_auto_advances_after_expiry() {
        let mut fx = fixture(13, false, 0);
        fx.session.start();
        settle(&mut fx.session);

        let t0 = Instant::now();
        fx.ended.store(true, Ordering::SeqCst);
        fx.session.tick(t0);
        assert!(matches!(
            fx.session.overlay_state(),
            OverlayState::Counting { remaining: 10 }
        ));
        assert_eq!(fx.session.playback_state(), PlaybackState::Ended);

        // countdown expires silently after 10 elapsed seconds
        fx.session.tick(t0 + Duration::from_secs(10));
        assert_eq!(fx.session.overlay_state(), OverlayState::Hidden);

        // fixed delay later the session advances on its own
        fx.session.tick(t0 + Duration::from_secs(13));
        assert_eq!(
            fx.session.current_entry().map(|e| e.id.as_str()),
            Some("v1")
        );
        // no rating request was ever issued
        assert!(fx.interactions.calls().is_empty());
    }

    #[test]
    fn rating_submission_goes_through_the_coordinator() {
        let mut fx = fixture(13, true, 0);
        fx.session.start();
        settle(&mut fx.session);

        let t0 = Instant::now();
        fx.ended.store(true, Ordering::SeqCst);
        fx.session.tick(t0);

        fx.session.submit_rating(4, t0);
        assert!(matches!(
            fx.session.overlay_state(),
            OverlayState::Acknowledging { .. }
        ));
        if let Ok(response) = fx
            .session
            .interact_rx
            .recv_timeout(Duration::from_secs(2))
        {
            fx.session.handle_interaction(response);
        }
        assert!(fx
            .interactions
            .calls()
            .iter()
            .any(|call| call == "rate v0 4"));

        // acknowledgment dismisses and arms the auto-advance
        fx.session.tick(t0 + Duration::from_secs(3));
        assert_eq!(fx.session.overlay_state(), OverlayState::Hidden);
        fx.session.tick(t0 + Duration::from_secs(6));
        assert_eq!(
            fx.session.current_entry().map(|e| e.id.as_str()),
            Some("v1")
        );
    }

    #[test]
    fn rating_without_overlay_is_rejected() {
        let mut fx = fixture(13, true, 0);
        fx.session.start();
        settle(&mut fx.session);

        fx.session.submit_rating(5, Instant::now());
        assert!(fx.session.status().contains("No rating prompt"));
        assert!(fx.interactions.calls().is_empty());
    }

    #[test]
    fn unauthenticated_like_prompts_sign_in_without_mutation() {
        let mut fx = fixture(13, false, 0);
        fx.session.start();
        settle(&mut fx.session);

        fx.session.toggle_like();
        assert!(fx.session.status().contains("Sign in"));
        assert!(!fx.session.current_entry().unwrap().is_liked);
        assert!(fx.interactions.calls().is_empty());
    }

    #[test]
    fn like_applies_optimistically_and_reconciles_details() {
        let mut fx = fixture(13, true, 0);
        fx.session.start();
        settle(&mut fx.session);

        fx.session.toggle_like();
        assert!(fx.session.current_entry().unwrap().is_liked);
        assert_eq!(fx.session.current_entry().unwrap().likes, 5);

        // interaction response, then the details reconciliation it triggers
        if let Ok(response) = fx
            .session
            .interact_rx
            .recv_timeout(Duration::from_secs(2))
        {
            fx.session.handle_interaction(response);
        }
        pump_blocking(&mut fx.session);

        // mock details still report the server count; optimistic value converges
        assert_eq!(fx.session.current_entry().unwrap().likes, 4);
        assert!(fx
            .interactions
            .calls()
            .iter()
            .any(|call| call == "like v0"));
    }

    #[test]
    fn near_tail_preload_requests_next_page_in_background() {
        let mut fx = fixture(30, false, 3);
        fx.session.start();
        settle(&mut fx.session);
        assert_eq!(fx.feed.page_calls(), 1);

        // index 6 of 10 leaves 3 remaining: preload fires
        for _ in 0..6 {
            fx.session.advance(1);
        }
        pump_blocking(&mut fx.session);
        assert_eq!(fx.feed.page_calls(), 2);
        assert_eq!(fx.session.loaded_count(), 20);
    }
}
