//! Explicit per-request user context.
//!
//! Every core operation receives the acting user by reference; nothing in
//! this crate reads identity from ambient state.

use thiserror::Error;

use crate::domain::types::UserCode;

/// Raised when an operation requires an identified user but the request
/// carried none. Surfaced to the caller as a "please start over" condition,
/// never retried.
#[derive(Debug, Error)]
#[error("required session value `user_code` is not available")]
pub struct SessionValueMissing;

#[derive(Debug, Clone)]
pub struct UserContext {
    user_code: UserCode,
}

impl UserContext {
    pub fn new(user_code: UserCode) -> Self {
        Self { user_code }
    }

    /// Build a context from an optional session value, surfacing the
    /// precondition error when it is absent.
    pub fn require(user_code: Option<UserCode>) -> Result<Self, SessionValueMissing> {
        user_code.map(Self::new).ok_or(SessionValueMissing)
    }

    pub fn user_code(&self) -> &UserCode {
        &self.user_code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_rejects_missing_code() {
        assert!(UserContext::require(None).is_err());
        let cx = UserContext::require(Some(UserCode::new("b3x9").unwrap())).unwrap();
        assert_eq!(cx.user_code().as_str(), "b3x9");
    }
}
