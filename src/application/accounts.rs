//! Account lifecycle: anonymous bootstrap, signup promotion, logout.
//!
//! Every visitor gets a persistent account keyed by a short generated code;
//! signup later attaches a real email to the same code so nothing the
//! visitor built is lost. Placeholder accounts carry the email as
//! `{email}.{code}.unregistered` until promotion.

use std::sync::Arc;

use rand::Rng;
use tracing::info;

use crate::application::context::UserContext;
use crate::application::repos::{NewUser, RepoError, UsersRepo};
use crate::cache::CacheSyncEngine;
use crate::domain::types::{USER_CODE_ALPHABET, USER_CODE_LEN, UserCode};

/// Collision retries before giving up on code generation. The code space
/// holds 28^4 values, so hitting this means the store is effectively full.
const MAX_CODE_ATTEMPTS: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("could not allocate an unused user code after {MAX_CODE_ATTEMPTS} attempts")]
    CodeSpaceExhausted,
}

pub struct AccountService {
    users: Arc<dyn UsersRepo>,
    item_sets: Arc<dyn crate::application::repos::ItemSetsRepo>,
    engine: Arc<CacheSyncEngine>,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        item_sets: Arc<dyn crate::application::repos::ItemSetsRepo>,
        engine: Arc<CacheSyncEngine>,
    ) -> Self {
        Self {
            users,
            item_sets,
            engine,
        }
    }

    /// Draw random codes until one is free in the store.
    pub async fn generate_code(&self) -> Result<UserCode, AccountError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let candidate = random_code();
            if !self.users.code_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(AccountError::CodeSpaceExhausted)
    }

    /// Create a placeholder account for a first-time visitor. The email is
    /// optional at this point; whatever was given is kept inside the
    /// placeholder so signup can find it again.
    pub async fn bootstrap_anonymous(
        &self,
        email: Option<&str>,
    ) -> Result<crate::domain::entities::UserRecord, AccountError> {
        let code = self.generate_code().await?;
        let placeholder = format!("{}.{code}.unregistered", email.unwrap_or("").trim());
        let record = self
            .users
            .insert(NewUser {
                code,
                email: placeholder,
                allow_promotional: false,
                registered: false,
            })
            .await?;
        info!(user_code = %record.code, "anonymous account created");
        Ok(record)
    }

    /// Promote the acting user's placeholder account to a registered one.
    ///
    /// Stale unregistered accounts that used the same email are purged
    /// first, together with their item sets and cache entries, so the email
    /// uniquely identifies one account afterwards.
    pub async fn signup(
        &self,
        cx: &UserContext,
        email: &str,
        allow_promotional: bool,
    ) -> Result<crate::domain::entities::UserRecord, AccountError> {
        let code = cx.user_code();
        let purged = self
            .users
            .delete_unregistered_by_email(email, code)
            .await?;
        for stale in &purged {
            self.item_sets.delete_for_user(stale).await?;
            self.engine.purge_user(&UserContext::new(stale.clone()));
        }
        if !purged.is_empty() {
            info!(email, count = purged.len(), "purged stale placeholder accounts");
        }

        let record = self.users.register(code, email, allow_promotional).await?;
        info!(user_code = %code, "account registered");
        Ok(record)
    }

    /// Drop every cached entry belonging to the user. Persistent data is
    /// untouched; the next visit rebuilds the cache from the store.
    pub fn logout(&self, cx: &UserContext) {
        self.engine.purge_user(cx);
        info!(user_code = %cx.user_code(), "session cache purged");
    }
}

fn random_code() -> UserCode {
    let mut rng = rand::rng();
    let raw: String = (0..USER_CODE_LEN)
        .map(|_| USER_CODE_ALPHABET[rng.random_range(0..USER_CODE_ALPHABET.len())] as char)
        .collect();
    // The alphabet and length match the domain rules by construction.
    UserCode::new(&raw).unwrap_or_else(|_| unreachable!("generated code fits the code rules"))
}
