use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use crate::api::{
    self, ApiError, ApiResult, Category, Comment, Uploader, UploaderKind, VideoEntry, VideoPage,
};

pub trait FeedService: Send + Sync {
    fn videos_by_category(
        &self,
        category_ids: &[String],
        skip: usize,
        limit: usize,
    ) -> ApiResult<VideoPage>;
    fn video_details(&self, video_id: &str) -> ApiResult<VideoEntry>;
}

pub trait CategoryService: Send + Sync {
    fn list_categories(&self) -> ApiResult<Vec<Category>>;
}

pub trait CommentService: Send + Sync {
    fn comments(
        &self,
        video_id: &str,
        skip: usize,
        limit: usize,
        last_comment_id: Option<&str>,
    ) -> ApiResult<Vec<Comment>>;
    fn add_comment(&self, video_id: &str, body: &str) -> ApiResult<Comment>;
    fn delete_comment(&self, video_id: &str, comment_id: &str) -> ApiResult<()>;
}

pub trait InteractionService: Send + Sync {
    fn like(&self, video_id: &str) -> ApiResult<()>;
    fn unlike(&self, video_id: &str) -> ApiResult<()>;
    fn bookmark(&self, video_id: &str) -> ApiResult<()>;
    fn unbookmark(&self, video_id: &str) -> ApiResult<()>;
    fn follow(&self, user_id: &str) -> ApiResult<()>;
    fn unfollow(&self, user_id: &str) -> ApiResult<()>;
    fn like_comment(&self, comment_id: &str) -> ApiResult<()>;
    fn unlike_comment(&self, comment_id: &str) -> ApiResult<()>;
    fn rate(&self, video_id: &str, rating: u8) -> ApiResult<()>;
}

pub struct HttpFeedService {
    client: Arc<api::Client>,
}

impl HttpFeedService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl FeedService for HttpFeedService {
    fn videos_by_category(
        &self,
        category_ids: &[String],
        skip: usize,
        limit: usize,
    ) -> ApiResult<VideoPage> {
        self.client.videos_by_category(category_ids, skip, limit)
    }

    fn video_details(&self, video_id: &str) -> ApiResult<VideoEntry> {
        self.client.video_details(video_id)
    }
}

pub struct HttpCategoryService {
    client: Arc<api::Client>,
}

impl HttpCategoryService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl CategoryService for HttpCategoryService {
    fn list_categories(&self) -> ApiResult<Vec<Category>> {
        self.client.categories()
    }
}

pub struct HttpCommentService {
    client: Arc<api::Client>,
}

impl HttpCommentService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for HttpCommentService {
    fn comments(
        &self,
        video_id: &str,
        skip: usize,
        limit: usize,
        last_comment_id: Option<&str>,
    ) -> ApiResult<Vec<Comment>> {
        self.client.comments(video_id, skip, limit, last_comment_id)
    }

    fn add_comment(&self, video_id: &str, body: &str) -> ApiResult<Comment> {
        self.client.add_comment(video_id, body)
    }

    fn delete_comment(&self, video_id: &str, comment_id: &str) -> ApiResult<()> {
        self.client.delete_comment(video_id, comment_id)
    }
}

pub struct HttpInteractionService {
    client: Arc<api::Client>,
}

impl HttpInteractionService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl InteractionService for HttpInteractionService {
    fn like(&self, video_id: &str) -> ApiResult<()> {
        self.client.like(video_id)
    }

    fn unlike(&self, video_id: &str) -> ApiResult<()> {
        self.client.unlike(video_id)
    }

    fn bookmark(&self, video_id: &str) -> ApiResult<()> {
        self.client.bookmark(video_id)
    }

    fn unbookmark(&self, video_id: &str) -> ApiResult<()> {
        self.client.unbookmark(video_id)
    }

    fn follow(&self, user_id: &str) -> ApiResult<()> {
        self.client.follow(user_id)
    }

    fn unfollow(&self, user_id: &str) -> ApiResult<()> {
        self.client.unfollow(user_id)
    }

    fn like_comment(&self, comment_id: &str) -> ApiResult<()> {
        self.client.like_comment(comment_id)
    }

    fn unlike_comment(&self, comment_id: &str) -> ApiResult<()> {
        self.client.unlike_comment(comment_id)
    }

    fn rate(&self, video_id: &str, rating: u8) -> ApiResult<()> {
        self.client.rate(video_id, rating)
    }
}

/// Deterministic in-memory feed for offline use and tests. Pages are cut from
/// a fixed entry list by skip/limit, matching the backend contract.
pub struct MockFeedService {
    entries: Mutex<Vec<VideoEntry>>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl MockFeedService {
    pub fn new(entries: Vec<VideoEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_count(count: usize) -> Self {
        let entries = (0..count)
            .map(|i| sample_entry(&format!("v{}", i), "u1"))
            .collect();
        Self::new(entries)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn page_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FeedService for MockFeedService {
    fn videos_by_category(
        &self,
        _category_ids: &[String],
        skip: usize,
        limit: usize,
    ) -> ApiResult<VideoPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Backend("mock feed offline".into()));
        }
        let entries = self.entries.lock();
        let end = (skip + limit).min(entries.len());
        let data = if skip < entries.len() {
            entries[skip..end].to_vec()
        } else {
            Vec::new()
        };
        Ok(VideoPage {
            count: data.len() as i64,
            data,
        })
    }

    fn video_details(&self, video_id: &str) -> ApiResult<VideoEntry> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Backend("mock feed offline".into()));
        }
        let entries = self.entries.lock();
        entries
            .iter()
            .find(|entry| entry.id == video_id)
            .cloned()
            .ok_or_else(|| ApiError::Backend("video not found".into()))
    }
}

#[derive(Default)]
pub struct MockCategoryService;

impl CategoryService for MockCategoryService {
    fn list_categories(&self) -> ApiResult<Vec<Category>> {
        Ok(vec![
            Category {
                id: "food".into(),
                name: "Food & Drink".into(),
            },
            Category {
                id: "travel".into(),
                name: "Travel".into(),
            },
            Category {
                id: "fitness".into(),
                name: "Fitness".into(),
            },
        ])
    }
}

#[derive(Default)]
pub struct MockCommentService {
    fail: AtomicBool,
}

impl MockCommentService {
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl CommentService for MockCommentService {
    fn comments(
        &self,
        video_id: &str,
        _skip: usize,
        _limit: usize,
        _last_comment_id: Option<&str>,
    ) -> ApiResult<Vec<Comment>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Backend("mock comments offline".into()));
        }
        Ok(vec![sample_comment(
            &format!("c-{}", video_id),
            "Loved this place!",
        )])
    }

    fn add_comment(&self, _video_id: &str, body: &str) -> ApiResult<Comment> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Backend("mock comments offline".into()));
        }
        Ok(sample_comment("c-created", body))
    }

    fn delete_comment(&self, _video_id: &str, _comment_id: &str) -> ApiResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Backend("mock comments offline".into()));
        }
        Ok(())
    }
}

/// Interaction stub that records every call and can be flipped into a failing
/// mode to exercise rollback paths.
#[derive(Default)]
pub struct MockInteractionService {
    fail: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl MockInteractionService {
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) -> ApiResult<()> {
        self.calls.lock().push(call);
        if self.fail.load(Ordering::SeqCst) {
            Err(ApiError::Backend("mock interaction offline".into()))
        } else {
            Ok(())
        }
    }
}

impl InteractionService for MockInteractionService {
    fn like(&self, video_id: &str) -> ApiResult<()> {
        self.record(format!("like {}", video_id))
    }

    fn unlike(&self, video_id: &str) -> ApiResult<()> {
        self.record(format!("unlike {}", video_id))
    }

    fn bookmark(&self, video_id: &str) -> ApiResult<()> {
        self.record(format!("bookmark {}", video_id))
    }

    fn unbookmark(&self, video_id: &str) -> ApiResult<()> {
        self.record(format!("unbookmark {}", video_id))
    }

    fn follow(&self, user_id: &str) -> ApiResult<()> {
        self.record(format!("follow {}", user_id))
    }

    fn unfollow(&self, user_id: &str) -> ApiResult<()> {
        self.record(format!("unfollow {}", user_id))
    }

    fn like_comment(&self, comment_id: &str) -> ApiResult<()> {
        self.record(format!("like_comment {}", comment_id))
    }

    fn unlike_comment(&self, comment_id: &str) -> ApiResult<()> {
        self.record(format!("unlike_comment {}", comment_id))
    }

    fn rate(&self, video_id: &str, rating: u8) -> ApiResult<()> {
        self.record(format!("rate {} {}", video_id, rating))
    }
}

pub fn sample_entry(id: &str, uploader_id: &str) -> VideoEntry {
    VideoEntry {
        id: id.to_string(),
        title: format!("Review {}", id),
        description: "Sample review for offline browsing.".into(),
        hashtags: vec!["#local".into()],
        playback_url: format!("https://cdn.reelview.app/{}.mp4", id),
        thumbnail_urls: vec![format!("https://cdn.reelview.app/{}.jpg", id)],
        uploader: Uploader {
            id: uploader_id.to_string(),
            username: format!("user_{}", uploader_id),
            avatar_url: String::new(),
            kind: UploaderKind::Individual {
                first_name: "Sam".into(),
                last_name: "Reel".into(),
            },
        },
        views: 120,
        likes: 4,
        comments: 1,
        shares: 0,
        is_liked: false,
        is_bookmarked: false,
        is_followed: false,
    }
}

pub fn sample_comment(id: &str, body: &str) -> Comment {
    Comment {
        id: id.to_string(),
        first_name: "Sam".into(),
        last_name: "Reel".into(),
        username: "sam_reel".into(),
        profile_pic: String::new(),
        body: body.to_string(),
        likes: 0,
        is_liked: false,
        commented_at: Utc::now(),
        replies: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_feed_pages_by_skip_and_limit() {
        let service = MockFeedService::with_count(13);
        let first = service.videos_by_category(&[], 0, 10).unwrap();
        assert_eq!(first.data.len(), 10);
        let second = service.videos_by_category(&[], 10, 10).unwrap();
        assert_eq!(second.data.len(), 3);
        let third = service.videos_by_category(&[], 20, 10).unwrap();
        assert!(third.data.is_empty());
        assert_eq!(service.page_calls(), 3);
    }

    #[test]
    fn mock_feed_failure_mode() {
        let service = MockFeedService::with_count(3);
        service.set_fail(true);
        assert!(service.videos_by_category(&[], 0, 10).is_err());
    }

    #[test]
    fn mock_interactions_record_calls() {
        let service = MockInteractionService::default();
        service.like("v1").unwrap();
        service.follow("u1").unwrap();
        assert_eq!(service.calls(), vec!["like v1", "follow u1"]);
    }
}
