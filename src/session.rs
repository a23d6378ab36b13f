use std::sync::Arc;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use parking_lot::RwLock;

use crate::api::TokenProvider;
use crate::auth;
use crate::storage::{self, Account, Token};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not signed in")]
    NotSignedIn,
}

#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub account: Account,
    pub token: String,
}

/// Process-wide auth state. Every gated interaction reads the active token
/// through here; no component may assume a token is present without asking.
pub struct Manager {
    store: Arc<storage::Store>,
    flow: Arc<auth::Flow>,
    active: RwLock<Option<ActiveSession>>,
}

impl Manager {
    pub fn new(store: Arc<storage::Store>, flow: Arc<auth::Flow>) -> Self {
        Self {
            store,
            flow,
            active: RwLock::new(None),
        }
    }

    /// Resume the most recently used account that still has a stored token.
    pub fn load_existing(&self) -> Result<()> {
        let accounts = self.store.list_accounts()?;
        for account in accounts {
            if let Some(token) = self.store.get_token(account.id)? {
                *self.active.write() = Some(ActiveSession {
                    account,
                    token: token.token,
                });
                break;
            }
        }
        Ok(())
    }

    pub fn active(&self) -> Option<ActiveSession> {
        self.active.read().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.active.read().is_some()
    }

    pub fn sign_in(&self, identity: &str, password: &str) -> Result<ActiveSession> {
        let signed = self.flow.sign_in(identity, password)?;
        let account_id = self.store.upsert_account(Account {
            id: 0,
            remote_id: signed.account.id.clone(),
            username: signed.account.username.clone(),
            display_name: signed.account.display_name.clone(),
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
            updated_at: Utc::now(),
        })?;
        self.store.upsert_token(Token {
            account_id,
            token: signed.token.clone(),
            issued_at: Utc::now(),
        })?;

        let account = self
            .store
            .get_account_by_id(account_id)?
            .expect("account persisted during sign-in");
        let session = ActiveSession {
            account,
            token: signed.token,
        };
        *self.active.write() = Some(session.clone());
        Ok(session)
    }

    pub fn sign_out(&self) -> Result<()> {
        let previous = self.active.write().take();
        if let Some(session) = previous {
            self.store.delete_token(session.account.id)?;
        }
        Ok(())
    }
}

impl TokenProvider for Manager {
    fn token(&self) -> Option<String> {
        self.active.read().as_ref().map(|s| s.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn manager_with_store() -> (tempfile::TempDir, Arc<storage::Store>, Manager) {
        let dir = tempdir().unwrap();
        let store = Arc::new(
            storage::Store::open(storage::Options {
                path: Some(dir.path().join("state.db")),
            })
            .unwrap(),
        );
        let flow = Arc::new(auth::Flow::new(auth::Config::default()).unwrap());
        let manager = Manager::new(store.clone(), flow);
        (dir, store, manager)
    }

    fn seed_account(store: &storage::Store, remote_id: &str, token: &str) -> i64 {
        let id = store
            .upsert_account(Account {
                id: 0,
                remote_id: remote_id.into(),
                username: "mika".into(),
                display_name: "Mika Tan".into(),
                created_at: Utc.timestamp_opt(0, 0).unwrap(),
                updated_at: Utc.timestamp_opt(0, 0).unwrap(),
            })
            .unwrap();
        store
            .upsert_token(Token {
                account_id: id,
                token: token.into(),
                issued_at: Utc::now(),
            })
            .unwrap();
        id
    }

    #[test]
    fn starts_signed_out() {
        let (_dir, _store, manager) = manager_with_store();
        assert!(!manager.is_signed_in());
        assert!(manager.token().is_none());
    }

    #[test]
    fn load_existing_resumes_stored_session() {
        let (_dir, store, manager) = manager_with_store();
        seed_account(&store, "u1", "tok-abc");
        manager.load_existing().unwrap();
        assert!(manager.is_signed_in());
        assert_eq!(manager.token().as_deref(), Some("tok-abc"));
    }

    #[test]
    fn sign_out_clears_token() {
        let (_dir, store, manager) = manager_with_store();
        let id = seed_account(&store, "u1", "tok-abc");
        manager.load_existing().unwrap();
        manager.sign_out().unwrap();
        assert!(!manager.is_signed_in());
        assert!(manager.token().is_none());
        assert!(store.get_token(id).unwrap().is_none());
    }
}
