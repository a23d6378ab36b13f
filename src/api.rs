use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.reelview.app/v2/";

/// Supplies the bearer token attached to backend calls. Absence of a token is
/// a client-side gate handled before the request is built, never a server
/// error path.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("api: request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("api: invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api: unauthorized")]
    Unauthorized,
    #[error("api: backend rejected request: {0}")]
    Backend(String),
    #[error("api: unexpected payload: {0}")]
    Decode(String),
    #[error("api: {0}")]
    Config(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Uniform backend envelope. `success=false` and a transport error feed the
/// same failure branch downstream, so both collapse into `ApiError`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

impl<T> Envelope<T> {
    fn into_result(self) -> ApiResult<T> {
        if self.success {
            self.data
                .ok_or_else(|| ApiError::Decode("success envelope without data".into()))
        } else {
            Err(ApiError::Backend(
                self.error.unwrap_or_else(|| "unspecified error".into()),
            ))
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub http_client: Option<HttpClient>,
}

pub struct Client {
    token_provider: Arc<dyn TokenProvider>,
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(token_provider: Arc<dyn TokenProvider>, config: ClientConfig) -> ApiResult<Self> {
        if config.user_agent.trim().is_empty() {
            return Err(ApiError::Config("client user agent required".into()));
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base)?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(Duration::from_secs(20))
                .build()?,
        };

        Ok(Client {
            token_provider,
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn videos_by_category(
        &self,
        category_ids: &[String],
        skip: usize,
        limit: usize,
    ) -> ApiResult<VideoPage> {
        let mut params = vec![
            ("skip".to_string(), skip.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        if !category_ids.is_empty() {
            params.push(("categoryId".into(), category_ids.join(",")));
        }
        let resp = self.request(Method::GET, "videoUsingCategoryId", &params, None)?;
        decode::<VideoPage>(resp)
    }

    pub fn video_details(&self, video_id: &str) -> ApiResult<VideoEntry> {
        let path = format!("watchVideo/{}", video_id);
        let resp = self.request(Method::GET, &path, &[], None)?;
        decode::<VideoEntry>(resp)
    }

    pub fn like(&self, video_id: &str) -> ApiResult<()> {
        self.put_ack(&format!("video/like/{}", video_id))
    }

    pub fn unlike(&self, video_id: &str) -> ApiResult<()> {
        self.put_ack(&format!("video/unlike/{}", video_id))
    }

    pub fn bookmark(&self, video_id: &str) -> ApiResult<()> {
        self.put_ack(&format!("video/bookmark/{}", video_id))
    }

    pub fn unbookmark(&self, video_id: &str) -> ApiResult<()> {
        self.put_ack(&format!("video/unbookmark/{}", video_id))
    }

    pub fn follow(&self, user_id: &str) -> ApiResult<()> {
        self.put_ack(&format!("user/follow/{}", user_id))
    }

    pub fn unfollow(&self, user_id: &str) -> ApiResult<()> {
        self.put_ack(&format!("user/unfollow/{}", user_id))
    }

    pub fn comments(
        &self,
        video_id: &str,
        skip: usize,
        limit: usize,
        last_comment_id: Option<&str>,
    ) -> ApiResult<Vec<Comment>> {
        let params = vec![
            ("skip".to_string(), skip.to_string()),
            ("limit".to_string(), limit.to_string()),
            (
                "lastCommentId".to_string(),
                last_comment_id.unwrap_or("null").to_string(),
            ),
        ];
        let path = format!("video/comment/{}", video_id);
        let resp = self.request(Method::GET, &path, &params, None)?;
        decode::<Vec<Comment>>(resp)
    }

    pub fn add_comment(&self, video_id: &str, body: &str) -> ApiResult<Comment> {
        if body.trim().is_empty() {
            return Err(ApiError::Config("comment body required".into()));
        }
        let path = format!("commentOnVideo/{}", video_id);
        let payload = json!({ "comment": body });
        let resp = self.request(Method::POST, &path, &[], Some(payload))?;
        decode::<Comment>(resp)
    }

    pub fn delete_comment(&self, video_id: &str, comment_id: &str) -> ApiResult<()> {
        let path = format!("comment/{}/{}", video_id, comment_id);
        let resp = self.request(Method::DELETE, &path, &[], None)?;
        ack(resp)
    }

    pub fn like_comment(&self, comment_id: &str) -> ApiResult<()> {
        self.put_ack(&format!("comment/like/{}", comment_id))
    }

    pub fn unlike_comment(&self, comment_id: &str) -> ApiResult<()> {
        self.put_ack(&format!("comment/unlike/{}", comment_id))
    }

    pub fn rate(&self, video_id: &str, rating: u8) -> ApiResult<()> {
        if !(1..=5).contains(&rating) {
            return Err(ApiError::Config("rating must be between 1 and 5".into()));
        }
        let path = format!("video/rating/{}", video_id);
        let payload = json!({ "rating": rating });
        let resp = self.request(Method::PUT, &path, &[], Some(payload))?;
        ack(resp)
    }

    pub fn categories(&self) -> ApiResult<Vec<Category>> {
        let resp = self.request(Method::GET, "categories", &[], None)?;
        decode::<Vec<Category>>(resp)
    }

    fn put_ack(&self, path: &str) -> ApiResult<()> {
        let resp = self.request(Method::PUT, path, &[], None)?;
        ack(resp)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<Value>,
    ) -> ApiResult<Response> {
        let mut url = self.base_url.join(path)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }

        let mut req = self.http.request(method, url);
        req = req.header(USER_AGENT, self.user_agent.clone());
        if let Some(token) = self.token_provider.token() {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(payload) = body {
            req = req.header(CONTENT_TYPE, "application/json");
            req = req.json(&payload);
        }

        let resp = req.send()?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            match status.as_u16() {
                401 => Err(ApiError::Unauthorized),
                _ => Err(ApiError::Backend(format!("{}: {}", status, body))),
            }
        }
    }
}

fn decode<T: DeserializeOwned>(resp: Response) -> ApiResult<T> {
    let envelope: Envelope<T> = resp.json()?;
    envelope.into_result()
}

fn ack(resp: Response) -> ApiResult<()> {
    let envelope: Envelope<Value> = resp.json()?;
    envelope.into_result().map(|_| ())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoPage {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub data: Vec<VideoEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default, rename = "playbackUrl")]
    pub playback_url: String,
    #[serde(default, rename = "thumbnailUrls")]
    pub thumbnail_urls: Vec<String>,
    #[serde(rename = "userDetails")]
    pub uploader: Uploader,
    #[serde(default, rename = "totalViews")]
    pub views: i64,
    #[serde(default, rename = "totalLikes")]
    pub likes: i64,
    #[serde(default, rename = "totalComments")]
    pub comments: i64,
    #[serde(default, rename = "totalShares")]
    pub shares: i64,
    #[serde(default, rename = "isLiked")]
    pub is_liked: bool,
    #[serde(default, rename = "isBookmarked")]
    pub is_bookmarked: bool,
    #[serde(default, rename = "isFollowed")]
    pub is_followed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Uploader {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, rename = "userName")]
    pub username: String,
    #[serde(default, rename = "avatarUrl")]
    pub avatar_url: String,
    #[serde(flatten)]
    pub kind: UploaderKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UploaderKind {
    Individual {
        #[serde(rename = "firstName")]
        first_name: String,
        #[serde(default, rename = "lastName")]
        last_name: String,
    },
    Business {
        #[serde(rename = "brandName")]
        brand_name: String,
    },
}

impl Uploader {
    pub fn display_name(&self) -> String {
        match &self.kind {
            UploaderKind::Individual {
                first_name,
                last_name,
            } => {
                if last_name.trim().is_empty() {
                    first_name.clone()
                } else {
                    format!("{} {}", first_name, last_name)
                }
            }
            UploaderKind::Business { brand_name } => brand_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, rename = "firstName")]
    pub first_name: String,
    #[serde(default, rename = "lastName")]
    pub last_name: String,
    #[serde(default, rename = "userName")]
    pub username: String,
    #[serde(default, rename = "profilePic")]
    pub profile_pic: String,
    #[serde(rename = "comment")]
    pub body: String,
    #[serde(default, rename = "totalLikes")]
    pub likes: i64,
    #[serde(default, rename = "isLiked")]
    pub is_liked: bool,
    #[serde(rename = "commentedDateTime")]
    pub commented_at: DateTime<Utc>,
    #[serde(default)]
    pub replies: Vec<Comment>,
}

impl Comment {
    /// Relative timestamp for display, e.g. "4h ago".
    pub fn age(&self, now: DateTime<Utc>) -> String {
        let delta = now.signed_duration_since(self.commented_at);
        let secs = delta.num_seconds();
        if secs < 60 {
            "just now".to_string()
        } else if secs < 3600 {
            format!("{}m ago", secs / 60)
        } else if secs < 86_400 {
            format!("{}h ago", secs / 3600)
        } else {
            format!("{}d ago", secs / 86_400)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
}
