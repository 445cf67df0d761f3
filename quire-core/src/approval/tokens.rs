use std::{collections::HashMap, fmt, time::Duration};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use quire_model::{ApprovalAction, ApprovalToken, RequestId};
use rand::{Rng, distr::Alphanumeric};
use thiserror::Error;
use tracing::debug;

const TOKEN_LENGTH: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("approval token is invalid or already used")]
    Unknown,
    #[error("approval token expired at {0}")]
    Expired(DateTime<Utc>),
}

/// In-memory registry of single-use one-click approval tokens.
///
/// Tokens do not survive a restart.
pub struct ApprovalTokens {
    tokens: RwLock<HashMap<String, ApprovalToken>>,
    ttl: chrono::Duration,
}

impl fmt::Debug for ApprovalTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalTokens")
            .field("outstanding", &self.tokens.read().len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl Default for ApprovalTokens {
    fn default() -> Self {
        Self::new(quire_config::constants::DEFAULT_APPROVAL_TOKEN_TTL)
    }
}

impl ApprovalTokens {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(1)),
        }
    }

    pub fn issue(&self, request_id: RequestId, action: ApprovalAction) -> (String, ApprovalToken) {
        self.issue_at(request_id, action, Utc::now())
    }

    pub fn issue_at(
        &self,
        request_id: RequestId,
        action: ApprovalAction,
        now: DateTime<Utc>,
    ) -> (String, ApprovalToken) {
        let token = ApprovalToken {
            request_id,
            action,
            expires_at: now + self.ttl,
        };

        let mut tokens = self.tokens.write();
        let key = loop {
            let candidate = generate_token();
            if !tokens.contains_key(&candidate) {
                break candidate;
            }
        };
        tokens.insert(key.clone(), token.clone());
        debug!(%request_id, %action, "issued approval token");
        (key, token)
    }

    /// Consume `key`. A token is removed on redemption whether or not it
    /// has expired.
    pub fn redeem(&self, key: &str) -> Result<ApprovalToken, TokenError> {
        self.redeem_at(key, Utc::now())
    }

    pub fn redeem_at(&self, key: &str, now: DateTime<Utc>) -> Result<ApprovalToken, TokenError> {
        let token = self
            .tokens
            .write()
            .remove(key.trim())
            .ok_or(TokenError::Unknown)?;
        if token.is_expired_at(now) {
            return Err(TokenError::Expired(token.expires_at));
        }
        Ok(token)
    }

    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut tokens = self.tokens.write();
        let before = tokens.len();
        tokens.retain(|_, token| !token.is_expired_at(now));
        before - tokens.len()
    }

    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }
}

fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}
