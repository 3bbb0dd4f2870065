//! Voter identity and the resolver contract.
//!
//! The core only ever compares identities for equality. How an identity is
//! derived from a request is the resolver's business; [`OriginResolver`] is
//! the default used by the node.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Authenticated user id, as issued by the external auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque token standing in for an anonymous caller's network origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnonymousOrigin(String);

impl AnonymousOrigin {
    /// Wrap an already-derived token.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Derive a token from a raw origin (address, forwarded-for hop).
    pub fn from_origin(origin: &str) -> Self {
        let hash = blake3::hash(origin.trim().as_bytes());
        Self(hex::encode(&hash.as_bytes()[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Resolved voter: exactly one of a user id or an anonymous origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Identity {
    User(UserId),
    Anonymous(AnonymousOrigin),
}

impl Identity {
    pub fn user(id: impl Into<String>) -> Self {
        Identity::User(UserId::new(id))
    }

    pub fn anonymous_from_origin(origin: &str) -> Self {
        Identity::Anonymous(AnonymousOrigin::from_origin(origin))
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous(_))
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Identity::User(id) => Some(id),
            Identity::Anonymous(_) => None,
        }
    }

    /// Key used to address this identity's ledger entry within a poll.
    ///
    /// The kind prefix keeps user and anonymous keys disjoint.
    pub fn ledger_key(&self) -> String {
        match self {
            Identity::User(id) => format!("user:{}", id.as_str()),
            Identity::Anonymous(origin) => format!("anon:{}", origin.as_str()),
        }
    }
}

/// Request facts an identity can be derived from.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    /// User id vouched for by the auth gateway
    pub user_id: Option<String>,
    /// Raw `X-Forwarded-For` header value
    pub forwarded_for: Option<String>,
    /// Transport peer address
    pub peer: Option<String>,
}

/// Derives a stable identity from a request.
///
/// Implementations must return the same identity for the same caller across
/// requests within a voting session.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, caller: &CallerContext) -> Identity;
}

/// Default resolver: authenticated user id, else hashed network origin.
#[derive(Debug, Clone)]
pub struct OriginResolver {
    trust_forwarded: bool,
}

impl OriginResolver {
    pub fn new(trust_forwarded: bool) -> Self {
        Self { trust_forwarded }
    }
}

impl Default for OriginResolver {
    fn default() -> Self {
        Self::new(true)
    }
}

impl IdentityResolver for OriginResolver {
    fn resolve(&self, caller: &CallerContext) -> Identity {
        if let Some(user) = caller.user_id.as_deref().map(str::trim) {
            if !user.is_empty() {
                return Identity::user(user);
            }
        }

        let forwarded = if self.trust_forwarded {
            caller
                .forwarded_for
                .as_deref()
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|hop| !hop.is_empty())
        } else {
            None
        };

        let origin = forwarded
            .or(caller.peer.as_deref())
            .unwrap_or("unknown");
        Identity::anonymous_from_origin(origin)
    }
}
