//! Token store — the lifecycle of every grant, access, and renewal token.
//!
//! Tokens live only in memory, in an ordered map keyed by their opaque id,
//! behind a reader/writer lock: lookups take the read lock, while creation,
//! deletion, single-use consumption, and the expiry sweep take the write
//! lock. A token found expired during a read is removed under the write lock
//! and reported as absent.
//!
//! # Token ids
//!
//! An id is `base64url(sha256(secret || random))` where `secret` is 32
//! random bytes drawn once per process and `random` is 32 fresh bytes per
//! token: 256 bits of entropy behind a one-way function, 43 URL-safe
//! characters on the wire.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use rand::Rng;
use tracing::debug;

use super::state::Application;
use crate::authn::UserIdentity;
use crate::pkce;

/// Kind of an issued token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Single-use authorization code from `/authorize`
    Grant,
    /// Bearer credential for resource access
    Access,
    /// Refresh credential, single-use, rotated at `/token`
    Renewal,
}

impl TokenKind {
    /// Wire name used in introspection responses.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grant => "grant",
            Self::Access => "access",
            Self::Renewal => "renewal",
        }
    }
}

/// An issued token.
#[derive(Debug, Clone)]
pub struct Token {
    /// Opaque, unguessable identifier
    pub id: String,
    /// Kind of token
    pub kind: TokenKind,
    /// Bound application client id, absent for password-grant tokens
    pub client_id: Option<String>,
    /// Bound application redirect URI
    pub redirect_uri: Option<String>,
    /// Authenticated username
    pub user: String,
    /// Numeric user id at issuance
    pub uid: u32,
    /// Primary group id at issuance
    pub gid: u32,
    /// Space-separated scope string
    pub scopes: String,
    /// PKCE code challenge bound at authorization time
    pub challenge: Option<String>,
    /// Issuance time (Unix seconds)
    pub created_at: u64,
    /// Expiry time (Unix seconds)
    pub expires_at: u64,
}

impl Token {
    /// Whether the token has passed its expiry time.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        now_secs() >= self.expires_at
    }

    /// Whether the scope string contains the given scope.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.split_whitespace().any(|s| s == scope)
    }

    /// The exploded scope set.
    #[must_use]
    pub fn scope_set(&self) -> HashSet<&str> {
        self.scopes.split_whitespace().collect()
    }
}

/// Current wall-clock time as Unix seconds.
#[must_use]
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// Ordered, lock-guarded set of live tokens.
pub struct TokenStore {
    tokens: RwLock<BTreeMap<String, Token>>,
    secret: [u8; 32],
    max_grant_life: Duration,
    max_token_life: Duration,
    num_tokens: AtomicU64,
}

impl TokenStore {
    /// Create an empty store with the configured lifetimes and a fresh
    /// per-process secret.
    #[must_use]
    pub fn new(max_grant_life: Duration, max_token_life: Duration) -> Self {
        Self {
            tokens: RwLock::new(BTreeMap::new()),
            secret: rand::thread_rng().gen(),
            max_grant_life,
            max_token_life,
            num_tokens: AtomicU64::new(0),
        }
    }

    /// Create and store a token, returning a copy of it.
    pub fn create(
        &self,
        kind: TokenKind,
        application: Option<&Application>,
        user: &str,
        identity: UserIdentity,
        scopes: &str,
        challenge: Option<String>,
    ) -> Token {
        let random: [u8; 32] = rand::thread_rng().gen();
        let id = pkce::hashed_id(&[&self.secret, &random]);

        let created_at = now_secs();
        let life = match kind {
            TokenKind::Grant => self.max_grant_life,
            TokenKind::Access | TokenKind::Renewal => self.max_token_life,
        };

        let token = Token {
            id: id.clone(),
            kind,
            client_id: application.map(|a| a.client_id.clone()),
            redirect_uri: application.map(|a| a.redirect_uri.clone()),
            user: user.to_string(),
            uid: identity.uid,
            gid: identity.gid,
            scopes: scopes.to_string(),
            challenge,
            created_at,
            expires_at: created_at + life.as_secs(),
        };

        self.tokens.write().insert(id, token.clone());
        self.num_tokens.fetch_add(1, Ordering::Relaxed);

        token
    }

    /// Look up a live token by id.
    ///
    /// An expired token encountered here is removed under the write lock and
    /// reported as absent.
    pub fn find(&self, id: &str) -> Option<Token> {
        let token = self.tokens.read().get(id).cloned()?;
        if token.is_expired() {
            self.tokens.write().remove(id);
            debug!(kind = token.kind.as_str(), "Evicted expired token on read");
            return None;
        }
        Some(token)
    }

    /// Look up a token without evicting it, expired or not.
    ///
    /// Introspection reports `active: false` for expired-but-unswept tokens,
    /// so it must be able to see them.
    pub fn peek(&self, id: &str) -> Option<Token> {
        self.tokens.read().get(id).cloned()
    }

    /// Atomically remove and return a token of the expected kind.
    ///
    /// This is the single-use consumption primitive behind grant and renewal
    /// redemption: lookup, kind check, expiry check, and removal all happen
    /// inside one write-locked region, so concurrent redemptions of the same
    /// id yield exactly one winner. An expired token is removed but not
    /// returned; a token of the wrong kind is left in place.
    pub fn consume(&self, id: &str, kind: TokenKind) -> Option<Token> {
        let mut tokens = self.tokens.write();
        match tokens.get(id) {
            Some(token) if token.kind != kind => None,
            Some(token) if token.is_expired() => {
                tokens.remove(id);
                None
            }
            Some(_) => tokens.remove(id),
            None => None,
        }
    }

    /// Remove a token by id.
    pub fn delete(&self, id: &str) -> bool {
        self.tokens.write().remove(id).is_some()
    }

    /// Remove all expired tokens; returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = now_secs();
        let mut tokens = self.tokens.write();
        let before = tokens.len();
        tokens.retain(|_, token| token.expires_at > now);
        before - tokens.len()
    }

    /// Number of live (stored) tokens.
    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }

    /// Total number of tokens issued since startup.
    pub fn issued(&self) -> u64 {
        self.num_tokens.load(Ordering::Relaxed)
    }
}
