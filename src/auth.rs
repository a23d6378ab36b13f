use std::time::Duration;

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use serde_json::json;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.reelview.app/v2/";
const DEFAULT_COUNTRY_CODE: &str = "91";

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\+?\d{1,3})?[-.\s]?\d{10}$").expect("phone regex"));
static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]{3,30}$").expect("username regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    Email,
    Phone,
    Username,
}

/// Sign-in accepts an email address, a phone number, or a username in the
/// same field; the flow routes to the matching backend endpoint.
pub fn classify_identity(raw: &str) -> Option<IdentityKind> {
    let trimmed = raw.trim();
    if EMAIL_RE.is_match(trimmed) {
        Some(IdentityKind::Email)
    } else if PHONE_RE.is_match(trimmed) {
        Some(IdentityKind::Phone)
    } else if USERNAME_RE.is_match(trimmed) {
        Some(IdentityKind::Username)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub user_agent: String,
    pub country_code: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            user_agent: "reelview-dev/0.1".into(),
            country_code: DEFAULT_COUNTRY_CODE.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountProfile {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, rename = "userName")]
    pub username: String,
    #[serde(default, rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct SignIn {
    pub token: String,
    pub account: AccountProfile,
}

pub struct Flow {
    cfg: Config,
    base_url: Url,
    client: Client,
}

impl Flow {
    pub fn new(cfg: Config) -> Result<Self> {
        if cfg.user_agent.trim().is_empty() {
            bail!("auth: user agent is required");
        }
        let base_url = Url::parse(&cfg.base_url).context("auth: parse base url")?;
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .context("auth: build http client")?;

        Ok(Self {
            cfg,
            base_url,
            client,
        })
    }

    pub fn sign_in(&self, identity: &str, password: &str) -> Result<SignIn> {
        let identity = identity.trim();
        if password.is_empty() {
            bail!("auth: password is required");
        }
        let kind = match classify_identity(identity) {
            Some(kind) => kind,
            None => bail!("auth: identity doesn't look like an email, phone number, or username"),
        };

        let (path, payload) = match kind {
            IdentityKind::Email => (
                "signin/email",
                json!({ "email": identity, "password": password }),
            ),
            IdentityKind::Phone => (
                "signin/mobile",
                json!({
                    "mobile": identity,
                    "countryCode": self.cfg.country_code,
                    "password": password,
                }),
            ),
            IdentityKind::Username => (
                "signin/username",
                json!({ "userName": identity, "password": password }),
            ),
        };

        let url = self.base_url.join(path)?;
        let resp = self
            .client
            .post(url)
            .header(USER_AGENT, self.cfg.user_agent.clone())
            .header(CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
            .context("auth: sign-in request")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            bail!("auth: sign-in failed: {} {}", status, body);
        }

        let envelope: SignInEnvelope = resp.json().context("auth: decode sign-in response")?;
        if !envelope.success {
            bail!(
                "auth: sign-in rejected: {}",
                envelope.error.unwrap_or_else(|| "unknown reason".into())
            );
        }
        let data = envelope
            .data
            .context("auth: sign-in response missing data")?;
        if data.token.trim().is_empty() {
            bail!("auth: sign-in response missing token");
        }

        Ok(SignIn {
            token: data.token,
            account: data.account,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SignInEnvelope {
    success: bool,
    #[serde(default)]
    data: Option<SignInData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignInData {
    token: String,
    account: AccountProfile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_email() {
        assert_eq!(
            classify_identity("mika@example.com"),
            Some(IdentityKind::Email)
        );
    }

    #[test]
    fn classifies_phone() {
        assert_eq!(classify_identity("9876543210"), Some(IdentityKind::Phone));
        assert_eq!(
            classify_identity("+91 9876543210"),
            Some(IdentityKind::Phone)
        );
    }

    #[test]
    fn classifies_username() {
        assert_eq!(classify_identity("mika_tan"), Some(IdentityKind::Username));
    }

    #[test]
    fn rejects_unclassifiable_identity() {
        assert_eq!(classify_identity("!!"), None);
        assert_eq!(classify_identity(""), None);
    }

    #[test]
    fn phone_wins_over_username_shape() {
        // a bare 10-digit string is also a legal username; phone must win
        assert_eq!(classify_identity("9876543210"), Some(IdentityKind::Phone));
    }
}
