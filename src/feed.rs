use std::collections::HashSet;

use crate::api::VideoEntry;

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Skip/limit cursor for one category filter. `has_more` turns false the
/// first time a page comes back short, or when a fetch fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pager {
    pub skip: usize,
    pub limit: usize,
    pub has_more: bool,
}

impl Pager {
    pub fn new(limit: usize) -> Self {
        Self {
            skip: 0,
            limit: limit.max(1),
            has_more: true,
        }
    }

    pub fn reset(&mut self) {
        self.skip = 0;
        self.has_more = true;
    }

    /// Account for a page of `returned` entries: a full page means more may
    /// follow, anything short is the end.
    pub fn absorb(&mut self, returned: usize) {
        self.has_more = returned == self.limit;
        self.skip += self.limit;
    }

    /// A failed fetch freezes the cursor until the filter changes.
    pub fn fail(&mut self) {
        self.has_more = false;
    }
}

/// Outcome of moving the current-index cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Cursor landed on a loaded entry (possibly clamped).
    Moved(usize),
    /// The move would pass the loaded tail and more pages may exist; fetch
    /// before retrying. The cursor has not moved.
    NeedsFetch,
    /// Nothing further to show: at the tail with no more pages.
    EndOfFeed,
}

/// Ordered feed entries plus the single current-index cursor. This is the
/// only place entry state lives; interactions patch entries through here.
#[derive(Debug)]
pub struct FeedStore {
    entries: Vec<VideoEntry>,
    current: Option<usize>,
    pager: Pager,
    filter_key: String,
}

impl FeedStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            current: None,
            pager: Pager::new(page_size),
            filter_key: "all".to_string(),
        }
    }

    /// Seed the store with a pinned initial entry (deep link into the feed).
    /// Later pages deduplicate against it like any other entry.
    pub fn with_initial(page_size: usize, initial: VideoEntry) -> Self {
        let mut store = Self::new(page_size);
        store.entries.push(initial);
        store.current = Some(0);
        store
    }

    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    pub fn pager_mut(&mut self) -> &mut Pager {
        &mut self.pager
    }

    pub fn filter_key(&self) -> &str {
        &self.filter_key
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[VideoEntry] {
        &self.entries
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_entry(&self) -> Option<&VideoEntry> {
        self.current.and_then(|idx| self.entries.get(idx))
    }

    pub fn entry(&self, id: &str) -> Option<&VideoEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Throw away everything loaded and restart the cursor for a new filter.
    pub fn reset_filter(&mut self, filter_key: String) {
        self.entries.clear();
        self.current = None;
        self.pager.reset();
        self.filter_key = filter_key;
    }

    /// Merge a page of entries, dropping any id already present (first
    /// occurrence wins) while preserving arrival order of the rest. Returns
    /// the number of entries actually added.
    pub fn append_entries(&mut self, incoming: Vec<VideoEntry>) -> usize {
        let mut seen: HashSet<String> =
            self.entries.iter().map(|entry| entry.id.clone()).collect();
        let mut added = 0;
        for entry in incoming {
            if seen.insert(entry.id.clone()) {
                self.entries.push(entry);
                added += 1;
            }
        }
        if self.current.is_none() && !self.entries.is_empty() {
            self.current = Some(0);
        }
        added
    }

    /// Move the cursor by `delta`, clamping at 0. Moving past the loaded
    /// tail yields `NeedsFetch` exactly once per attempt while more pages may
    /// exist; once they don't, the cursor parks on the last entry and
    /// `EndOfFeed` is reported.
    pub fn advance(&mut self, delta: i64) -> Advance {
        if self.entries.is_empty() {
            return if self.pager.has_more {
                Advance::NeedsFetch
            } else {
                Advance::EndOfFeed
            };
        }

        let current = self.current.unwrap_or(0);
        let target = current as i64 + delta;
        let target = target.max(0) as usize;

        if target < self.entries.len() {
            self.current = Some(target);
            return Advance::Moved(target);
        }

        if self.pager.has_more {
            return Advance::NeedsFetch;
        }

        let last = self.entries.len() - 1;
        if current < last {
            self.current = Some(last);
            Advance::Moved(last)
        } else {
            Advance::EndOfFeed
        }
    }

    /// True when the cursor is close enough to the loaded tail that the next
    /// page should be requested in the background.
    pub fn near_tail(&self, threshold: usize) -> bool {
        match self.current {
            Some(current) => {
                let remaining = self.entries.len().saturating_sub(current + 1);
                remaining <= threshold
            }
            None => false,
        }
    }

    /// Apply a partial update to exactly one entry. Returns false when the
    /// id is not loaded; callers log and move on.
    pub fn mutate_entry<F>(&mut self, id: &str, patch: F) -> bool
    where
        F: FnOnce(&mut VideoEntry),
    {
        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                patch(entry);
                true
            }
            None => false,
        }
    }

    /// Set the follow flag on every loaded entry by the given uploader,
    /// returning the prior flag per touched entry for rollback.
    pub fn set_followed_for_uploader(
        &mut self,
        uploader_id: &str,
        followed: bool,
    ) -> Vec<(String, bool)> {
        let mut prior = Vec::new();
        for entry in &mut self.entries {
            if entry.uploader.id == uploader_id {
                prior.push((entry.id.clone(), entry.is_followed));
                entry.is_followed = followed;
            }
        }
        prior
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::{Uploader, UploaderKind};

    pub(crate) fn entry(id: &str, uploader_id: &str) -> VideoEntry {
        VideoEntry {
            id: id.to_string(),
            title: format!("video {}", id),
            description: String::new(),
            hashtags: Vec::new(),
            playback_url: format!("https://cdn.reelview.app/{}.mp4", id),
            thumbnail_urls: Vec::new(),
            uploader: Uploader {
                id: uploader_id.to_string(),
                username: format!("user_{}", uploader_id),
                avatar_url: String::new(),
                kind: UploaderKind::Individual {
                    first_name: "Sam".into(),
                    last_name: "Reel".into(),
                },
            },
            views: 0,
            likes: 0,
            comments: 0,
            shares: 0,
            is_liked: false,
            is_bookmarked: false,
            is_followed: false,
        }
    }

    fn entries(ids: &[&str]) -> Vec<VideoEntry> {
        ids.iter().map(|id| entry(id, "u1")).collect()
    }

    #[test]
    fn append_deduplicates_by_id_first_wins() {
        let mut store = FeedStore::new(10);
        store.append_entries(entries(&["a", "b", "c"]));
        let added = store.append_entries(entries(&["b", "d", "a", "e"]));
        assert_eq!(added, 2);
        let ids: Vec<&str> = store.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn append_never_produces_duplicate_ids() {
        let mut store = FeedStore::new(10);
        store.append_entries(entries(&["a", "b"]));
        store.append_entries(entries(&["b", "c", "c"]));
        store.append_entries(entries(&["a", "c", "d"]));
        let mut ids: Vec<&str> = store.entries().iter().map(|e| e.id.as_str()).collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }

    #[test]
    fn pinned_initial_entry_is_deduplicated() {
        let mut store = FeedStore::with_initial(10, entry("a", "u1"));
        let added = store.append_entries(entries(&["a", "b"]));
        assert_eq!(added, 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.current_index(), Some(0));
    }

    #[test]
    fn advance_clamps_at_zero() {
        let mut store = FeedStore::new(10);
        store.append_entries(entries(&["a", "b"]));
        assert_eq!(store.advance(-5), Advance::Moved(0));
        assert_eq!(store.advance(1), Advance::Moved(1));
        assert_eq!(store.advance(-1), Advance::Moved(0));
    }

    #[test]
    fn advance_past_tail_requests_fetch_without_moving() {
        let mut store = FeedStore::new(10);
        store.append_entries(entries(&["a", "b"]));
        store.advance(1);
        assert_eq!(store.advance(1), Advance::NeedsFetch);
        assert_eq!(store.current_index(), Some(1));
    }

    #[test]
    fn advance_end_of_feed_when_no_more_pages() {
        let mut store = FeedStore::new(10);
        store.append_entries(entries(&["a", "b"]));
        store.pager_mut().has_more = false;
        store.advance(1);
        assert_eq!(store.advance(1), Advance::EndOfFeed);
        assert_eq!(store.current_index(), Some(1));
    }

    #[test]
    fn fetch_more_scenario_reaches_end_of_feed() {
        // 10 entries at skip=0/limit=10; advancing to the tail fetches more;
        // the short second page flips has_more; index 12 is the end.
        let mut store = FeedStore::new(10);
        let first: Vec<VideoEntry> = (0..10).map(|i| entry(&format!("v{}", i), "u1")).collect();
        store.append_entries(first);
        store.pager_mut().absorb(10);
        assert!(store.pager().has_more);

        for _ in 0..9 {
            assert!(matches!(store.advance(1), Advance::Moved(_)));
        }
        assert_eq!(store.current_index(), Some(9));
        assert_eq!(store.advance(1), Advance::NeedsFetch);
        assert_eq!(store.pager().skip, 10);

        let second: Vec<VideoEntry> = (10..13).map(|i| entry(&format!("v{}", i), "u1")).collect();
        store.append_entries(second);
        store.pager_mut().absorb(3);
        assert!(!store.pager().has_more);

        assert_eq!(store.advance(1), Advance::Moved(10));
        store.advance(1);
        assert_eq!(store.advance(1), Advance::Moved(12));
        assert_eq!(store.advance(1), Advance::EndOfFeed);
        assert_eq!(store.current_index(), Some(12));
    }

    #[test]
    fn reset_filter_clears_entries_and_cursor() {
        let mut store = FeedStore::new(10);
        store.append_entries(entries(&["a", "b"]));
        store.pager_mut().absorb(2);
        store.reset_filter("food".into());
        assert!(store.is_empty());
        assert_eq!(store.current_index(), None);
        assert_eq!(store.pager().skip, 0);
        assert!(store.pager().has_more);
        assert_eq!(store.filter_key(), "food");
    }

    #[test]
    fn mutate_entry_unknown_id_is_noop() {
        let mut store = FeedStore::new(10);
        store.append_entries(entries(&["a"]));
        assert!(store.mutate_entry("a", |e| e.likes += 1));
        assert!(!store.mutate_entry("zz", |e| e.likes += 1));
        assert_eq!(store.entry("a").unwrap().likes, 1);
    }

    #[test]
    fn follow_flag_propagates_to_all_entries_by_uploader() {
        let mut store = FeedStore::new(10);
        store.append_entries(vec![
            entry("a", "u1"),
            entry("b", "u2"),
            entry("c", "u1"),
        ]);
        let prior = store.set_followed_for_uploader("u1", true);
        assert_eq!(prior.len(), 2);
        assert!(store.entry("a").unwrap().is_followed);
        assert!(!store.entry("b").unwrap().is_followed);
        assert!(store.entry("c").unwrap().is_followed);
    }

    #[test]
    fn near_tail_threshold() {
        let mut store = FeedStore::new(10);
        store.append_entries(entries(&["a", "b", "c", "d", "e"]));
        assert!(!store.near_tail(2));
        store.advance(2);
        assert!(store.near_tail(2));
    }

    #[test]
    fn pager_absorb_tracks_has_more() {
        let mut pager = Pager::new(10);
        pager.absorb(10);
        assert!(pager.has_more);
        assert_eq!(pager.skip, 10);
        pager.absorb(3);
        assert!(!pager.has_more);
        pager.reset();
        assert!(pager.has_more);
        assert_eq!(pager.skip, 0);
    }

    #[test]
    fn pager_failure_freezes_cursor() {
        let mut pager = Pager::new(10);
        pager.fail();
        assert!(!pager.has_more);
    }
}
