use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use crossbeam_channel::Sender;

use crate::api::Comment;
use crate::data::{CommentService, InteractionService};
use crate::feed::FeedStore;
use crate::session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentKind {
    Like,
    Bookmark,
    Follow,
    CommentLike,
    CommentAdd,
    CommentDelete,
    Rate,
}

/// One serialization lane: intents of the same kind against the same target
/// supersede each other; different lanes are independent and may be in
/// flight concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntentKey {
    pub kind: IntentKind,
    pub target: String,
}

impl IntentKey {
    fn new(kind: IntentKind, target: &str) -> Self {
        Self {
            kind,
            target: target.to_string(),
        }
    }
}

/// Pre-intent state captured for rollback. When intents chain (a later one
/// supersedes an unresolved one), the snapshot of the first intent in the
/// chain is carried forward: it is the last server-confirmed state.
#[derive(Debug, Clone)]
enum Snapshot {
    VideoLike { flag: bool, count: i64 },
    VideoBookmark { flag: bool },
    Follow { prior: Vec<(String, bool)> },
    CommentLike { flag: bool, count: i64 },
    CommentInserted { provisional_id: String },
    CommentRemoved { index: usize, comment: Comment },
    Nothing,
}

#[derive(Debug)]
struct Pending {
    generation: u64,
    snapshot: Snapshot,
}

#[derive(Debug)]
pub struct Response {
    pub key: IntentKey,
    pub generation: u64,
    pub payload: Payload,
}

#[derive(Debug)]
pub enum Payload {
    Toggle {
        desired: bool,
        error: Option<String>,
    },
    CommentAdded {
        video_id: String,
        result: Result<Comment, String>,
    },
    CommentDeleted {
        video_id: String,
        error: Option<String>,
    },
    Rated {
        video_id: String,
        rating: u8,
        error: Option<String>,
    },
}

/// What happened when an intent was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Optimistic patch applied, request in flight.
    Applied,
    /// No auth token: nothing was mutated and no request was made.
    SignInRequired,
    /// Target id is not loaded; logged by the caller, never fatal.
    NoSuchTarget,
    /// Author-owned operation attempted on someone else's content.
    NotPermitted,
}

/// What happened when a response came back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Superseded by a later intent; silently discarded.
    Stale,
    /// Backend accepted the optimistic state as final.
    Confirmed { key: IntentKey },
    /// Backend failed; optimistic state restored to the pre-intent values.
    RolledBack { key: IntentKey, notice: String },
}

/// Single entry point for every gated action. Applies the optimistic patch,
/// runs the request on a worker thread, and reconciles the response against
/// the per-lane generation counter so only the newest intent wins.
pub struct Coordinator {
    service: Arc<dyn InteractionService>,
    comment_service: Arc<dyn CommentService>,
    session: Arc<session::Manager>,
    tx: Sender<Response>,
    generations: HashMap<IntentKey, u64>,
    pending: HashMap<IntentKey, Pending>,
}

impl Coordinator {
    pub fn new(
        service: Arc<dyn InteractionService>,
        comment_service: Arc<dyn CommentService>,
        session: Arc<session::Manager>,
        tx: Sender<Response>,
    ) -> Self {
        Self {
            service,
            comment_service,
            session,
            tx,
            generations: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn bump(&mut self, key: &IntentKey) -> u64 {
        let counter = self.generations.entry(key.clone()).or_insert(0);
        *counter += 1;
        *counter
    }

    fn gate(&self) -> bool {
        self.session.is_signed_in()
    }

    pub fn set_like(&mut self, store: &mut FeedStore, video_id: &str, desired: bool) -> Outcome {
        if !self.gate() {
            return Outcome::SignInRequired;
        }
        let key = IntentKey::new(IntentKind::Like, video_id);
        let snapshot = match self.pending.get(&key) {
            Some(pending) => pending.snapshot.clone(),
            None => match store.entry(video_id) {
                Some(entry) => Snapshot::VideoLike {
                    flag: entry.is_liked,
                    count: entry.likes,
                },
                None => return Outcome::NoSuchTarget,
            },
        };
        store.mutate_entry(video_id, |entry| {
            if entry.is_liked != desired {
                entry.likes += if desired { 1 } else { -1 };
                entry.is_liked = desired;
            }
        });
        let generation = self.bump(&key);
        self.pending
            .insert(key.clone(), Pending { generation, snapshot });

        let service = self.service.clone();
        let tx = self.tx.clone();
        let video = video_id.to_string();
        thread::spawn(move || {
            let result = if desired {
                service.like(&video)
            } else {
                service.unlike(&video)
            };
            let _ = tx.send(Response {
                key: IntentKey::new(IntentKind::Like, &video),
                generation,
                payload: Payload::Toggle {
                    desired,
                    error: result.err().map(|err| err.to_string()),
                },
            });
        });
        Outcome::Applied
    }

    pub fn set_bookmark(
        &mut self,
        store: &mut FeedStore,
        video_id: &str,
        desired: bool,
    ) -> Outcome {
        if !self.gate() {
            return Outcome::SignInRequired;
        }
        let key = IntentKey::new(IntentKind::Bookmark, video_id);
        let snapshot = match self.pending.get(&key) {
            Some(pending) => pending.snapshot.clone(),
            None => match store.entry(video_id) {
                Some(entry) => Snapshot::VideoBookmark {
                    flag: entry.is_bookmarked,
                },
                None => return Outcome::NoSuchTarget,
            },
        };
        store.mutate_entry(video_id, |entry| entry.is_bookmarked = desired);
        let generation = self.bump(&key);
        self.pending
            .insert(key.clone(), Pending { generation, snapshot });

        let service = self.service.clone();
        let tx = self.tx.clone();
        let video = video_id.to_string();
        thread::spawn(move || {
            let result = if desired {
                service.bookmark(&video)
            } else {
                service.unbookmark(&video)
            };
            let _ = tx.send(Response {
                key: IntentKey::new(IntentKind::Bookmark, &video),
                generation,
                payload: Payload::Toggle {
                    desired,
                    error: result.err().map(|err| err.to_string()),
                },
            });
        });
        Outcome::Applied
    }

    /// Follow is keyed by uploader and propagates to every loaded entry by
    /// that uploader so the whole feed stays consistent.
    pub fn set_follow(
        &mut self,
        store: &mut FeedStore,
        uploader_id: &str,
        desired: bool,
    ) -> Outcome {
        if !self.gate() {
            return Outcome::SignInRequired;
        }
        let key = IntentKey::new(IntentKind::Follow, uploader_id);
        let prior = store.set_followed_for_uploader(uploader_id, desired);
        if prior.is_empty() {
            return Outcome::NoSuchTarget;
        }
        let snapshot = match self.pending.get(&key) {
            Some(pending) => pending.snapshot.clone(),
            None => Snapshot::Follow { prior },
        };
        let generation = self.bump(&key);
        self.pending
            .insert(key.clone(), Pending { generation, snapshot });

        let service = self.service.clone();
        let tx = self.tx.clone();
        let uploader = uploader_id.to_string();
        thread::spawn(move || {
            let result = if desired {
                service.follow(&uploader)
            } else {
                service.unfollow(&uploader)
            };
            let _ = tx.send(Response {
                key: IntentKey::new(IntentKind::Follow, &uploader),
                generation,
                payload: Payload::Toggle {
                    desired,
                    error: result.err().map(|err| err.to_string()),
                },
            });
        });
        Outcome::Applied
    }

    pub fn set_comment_like(
        &mut self,
        comments: &mut Vec<Comment>,
        comment_id: &str,
        desired: bool,
    ) -> Outcome {
        if !self.gate() {
            return Outcome::SignInRequired;
        }
        let key = IntentKey::new(IntentKind::CommentLike, comment_id);
        let snapshot = match self.pending.get(&key) {
            Some(pending) => pending.snapshot.clone(),
            None => match find_comment(comments, comment_id) {
                Some(comment) => Snapshot::CommentLike {
                    flag: comment.is_liked,
                    count: comment.likes,
                },
                None => return Outcome::NoSuchTarget,
            },
        };
        if let Some(comment) = find_comment_mut(comments, comment_id) {
            if comment.is_liked != desired {
                comment.likes += if desired { 1 } else { -1 };
                comment.is_liked = desired;
            }
        }
        let generation = self.bump(&key);
        self.pending
            .insert(key.clone(), Pending { generation, snapshot });

        let service = self.service.clone();
        let tx = self.tx.clone();
        let comment = comment_id.to_string();
        thread::spawn(move || {
            let result = if desired {
                service.like_comment(&comment)
            } else {
                service.unlike_comment(&comment)
            };
            let _ = tx.send(Response {
                key: IntentKey::new(IntentKind::CommentLike, &comment),
                generation,
                payload: Payload::Toggle {
                    desired,
                    error: result.err().map(|err| err.to_string()),
                },
            });
        });
        Outcome::Applied
    }

    /// Optimistic insert at the head of the thread, with a provisional id
    /// swapped for the server-issued comment on success.
    pub fn add_comment(
        &mut self,
        comments: &mut Vec<Comment>,
        video_id: &str,
        body: &str,
    ) -> Outcome {
        let Some(active) = self.session.active() else {
            return Outcome::SignInRequired;
        };
        if body.trim().is_empty() {
            return Outcome::NoSuchTarget;
        }

        let provisional_id = format!("pending-{}", self.next_provisional());
        let key = IntentKey::new(IntentKind::CommentAdd, &provisional_id);
        comments.insert(
            0,
            Comment {
                id: provisional_id.clone(),
                first_name: active.account.display_name.clone(),
                last_name: String::new(),
                username: active.account.username.clone(),
                profile_pic: String::new(),
                body: body.trim().to_string(),
                likes: 0,
                is_liked: false,
                commented_at: Utc::now(),
                replies: Vec::new(),
            },
        );
        let generation = self.bump(&key);
        self.pending.insert(
            key.clone(),
            Pending {
                generation,
                snapshot: Snapshot::CommentInserted {
                    provisional_id: provisional_id.clone(),
                },
            },
        );

        let service = self.service_comments();
        let tx = self.tx.clone();
        let video = video_id.to_string();
        let text = body.trim().to_string();
        thread::spawn(move || {
            let result = service
                .add_comment(&video, &text)
                .map_err(|err| err.to_string());
            let _ = tx.send(Response {
                key,
                generation,
                payload: Payload::CommentAdded {
                    video_id: video,
                    result,
                },
            });
        });
        Outcome::Applied
    }

    /// Optimistic removal; author-owned only.
    pub fn delete_comment(
        &mut self,
        comments: &mut Vec<Comment>,
        video_id: &str,
        comment_id: &str,
    ) -> Outcome {
        let Some(active) = self.session.active() else {
            return Outcome::SignInRequired;
        };
        let Some(index) = comments.iter().position(|c| c.id == comment_id) else {
            return Outcome::NoSuchTarget;
        };
        if comments[index].username != active.account.username {
            return Outcome::NotPermitted;
        }

        let removed = comments.remove(index);
        let key = IntentKey::new(IntentKind::CommentDelete, comment_id);
        let generation = self.bump(&key);
        self.pending.insert(
            key.clone(),
            Pending {
                generation,
                snapshot: Snapshot::CommentRemoved {
                    index,
                    comment: removed,
                },
            },
        );

        let service = self.service_comments();
        let tx = self.tx.clone();
        let video = video_id.to_string();
        let comment = comment_id.to_string();
        thread::spawn(move || {
            let error = service
                .delete_comment(&video, &comment)
                .err()
                .map(|err| err.to_string());
            let _ = tx.send(Response {
                key,
                generation,
                payload: Payload::CommentDeleted {
                    video_id: video,
                    error,
                },
            });
        });
        Outcome::Applied
    }

    /// Rating has no optimistic local state; failure only surfaces a notice.
    pub fn submit_rating(&mut self, video_id: &str, rating: u8) -> Outcome {
        if !self.gate() {
            return Outcome::SignInRequired;
        }
        let key = IntentKey::new(IntentKind::Rate, video_id);
        let generation = self.bump(&key);
        self.pending.insert(
            key.clone(),
            Pending {
                generation,
                snapshot: Snapshot::Nothing,
            },
        );

        let service = self.service.clone();
        let tx = self.tx.clone();
        let video = video_id.to_string();
        thread::spawn(move || {
            let error = service.rate(&video, rating).err().map(|err| err.to_string());
            let _ = tx.send(Response {
                key,
                generation,
                payload: Payload::Rated {
                    video_id: video,
                    rating,
                    error,
                },
            });
        });
        Outcome::Applied
    }

    /// Reconcile one worker response. Responses for superseded generations
    /// and for threads that are no longer active are discarded silently.
    pub fn handle_response(
        &mut self,
        store: &mut FeedStore,
        comments: &mut Vec<Comment>,
        active_video: Option<&str>,
        response: Response,
    ) -> Resolution {
        let current = match self.pending.get(&response.key) {
            Some(pending) if pending.generation == response.generation => {
                self.pending.remove(&response.key).expect("pending present")
            }
            _ => return Resolution::Stale,
        };

        match response.payload {
            Payload::Toggle { desired: _, error } => match error {
                None => Resolution::Confirmed { key: response.key },
                Some(message) => {
                    rollback(store, comments, &response.key, current.snapshot);
                    Resolution::RolledBack {
                        key: response.key,
                        notice: message,
                    }
                }
            },
            Payload::CommentAdded { video_id, result } => {
                if active_video != Some(video_id.as_str()) {
                    return Resolution::Stale;
                }
                let provisional = response.key.target.clone();
                match result {
                    Ok(created) => {
                        if let Some(slot) =
                            comments.iter_mut().find(|c| c.id == provisional)
                        {
                            *slot = created;
                        }
                        Resolution::Confirmed { key: response.key }
                    }
                    Err(message) => {
                        comments.retain(|c| c.id != provisional);
                        Resolution::RolledBack {
                            key: response.key,
                            notice: message,
                        }
                    }
                }
            }
            Payload::CommentDeleted { video_id, error } => {
                if active_video != Some(video_id.as_str()) {
                    return Resolution::Stale;
                }
                match error {
                    None => Resolution::Confirmed { key: response.key },
                    Some(message) => {
                        rollback(store, comments, &response.key, current.snapshot);
                        Resolution::RolledBack {
                            key: response.key,
                            notice: message,
                        }
                    }
                }
            }
            Payload::Rated {
                video_id: _,
                rating: _,
                error,
            } => match error {
                None => Resolution::Confirmed { key: response.key },
                Some(message) => Resolution::RolledBack {
                    key: response.key,
                    notice: message,
                },
            },
        }
    }

    /// Drop pending comment-thread intents when the active video changes;
    /// their eventual responses are then stale by construction.
    pub fn forget_thread_intents(&mut self) {
        self.pending.retain(|key, _| {
            !matches!(
                key.kind,
                IntentKind::CommentLike | IntentKind::CommentAdd | IntentKind::CommentDelete
            )
        });
    }

    fn next_provisional(&mut self) -> u64 {
        let key = IntentKey::new(IntentKind::CommentAdd, "@counter");
        self.bump(&key)
    }

    fn service_comments(&self) -> Arc<dyn CommentService> {
        self.comment_service.clone()
    }
}

/// Apply the inverse patch for a failed intent. This is the single rollback
/// path shared by every optimistic action.
fn rollback(
    store: &mut FeedStore,
    comments: &mut Vec<Comment>,
    key: &IntentKey,
    snapshot: Snapshot,
) {
    match snapshot {
        Snapshot::VideoLike { flag, count } => {
            store.mutate_entry(&key.target, |entry| {
                entry.is_liked = flag;
                entry.likes = count;
            });
        }
        Snapshot::VideoBookmark { flag } => {
            store.mutate_entry(&key.target, |entry| entry.is_bookmarked = flag);
        }
        Snapshot::Follow { prior } => {
            for (entry_id, flag) in prior {
                store.mutate_entry(&entry_id, |entry| entry.is_followed = flag);
            }
        }
        Snapshot::CommentLike { flag, count } => {
            if let Some(comment) = find_comment_mut(comments, &key.target) {
                comment.is_liked = flag;
                comment.likes = count;
            }
        }
        Snapshot::CommentInserted { provisional_id } => {
            comments.retain(|comment| comment.id != provisional_id);
        }
        Snapshot::CommentRemoved { index, comment } => {
            let slot = index.min(comments.len());
            comments.insert(slot, comment);
        }
        Snapshot::Nothing => {}
    }
}

pub fn find_comment<'a>(comments: &'a [Comment], id: &str) -> Option<&'a Comment> {
    for comment in comments {
        if comment.id == id {
            return Some(comment);
        }
        if let Some(found) = find_comment(&comment.replies, id) {
            return Some(found);
        }
    }
    None
}

pub fn find_comment_mut<'a>(comments: &'a mut [Comment], id: &str) -> Option<&'a mut Comment> {
    for comment in comments {
        if comment.id == id {
            return Some(comment);
        }
        if let Some(found) = find_comment_mut(&mut comment.replies, id) {
            return Some(found);
        }
    }
    None
}
