//! Who may open a completion socket.
//!
//! The handler first checks the browser `Origin` against the [`OriginPolicy`],
//! authenticates the caller, then asks the [`Authorizer`] whether that user
//! may `execute` the `mito-ai-completion` resource. All checks run before the
//! websocket upgrade.

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};

pub const COMPLETION_ACTION: &str = "execute";
pub const COMPLETION_RESOURCE: &str = "mito-ai-completion";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
}

impl User {
    pub fn anonymous() -> Self {
        Self {
            name: "anonymous".to_string(),
        }
    }
}

pub trait Authenticator: Send + Sync {
    /// Resolves the caller from the presented token, `None` when unknown.
    fn authenticate(&self, token: Option<&str>) -> Option<User>;
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn is_authorized(&self, user: &User, action: &str, resource: &str) -> bool;
}

/// Shared-secret authentication. Without a configured token every caller is anonymous.
pub struct TokenAuthenticator {
    token: Option<String>,
}

impl TokenAuthenticator {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

impl Authenticator for TokenAuthenticator {
    fn authenticate(&self, token: Option<&str>) -> Option<User> {
        match (&self.token, token) {
            (None, _) => Some(User::anonymous()),
            (Some(expected), Some(given)) if expected == given => Some(User {
                name: "token".to_string(),
            }),
            _ => None,
        }
    }
}

/// Grants or denies every request.
pub struct StaticAuthorizer {
    allow: bool,
}

impl StaticAuthorizer {
    pub fn allow_all() -> Self {
        Self { allow: true }
    }

    pub fn deny_all() -> Self {
        Self { allow: false }
    }
}

#[async_trait]
impl Authorizer for StaticAuthorizer {
    async fn is_authorized(&self, _user: &User, _action: &str, _resource: &str) -> bool {
        self.allow
    }
}

/// Which browser origins may open a completion socket.
///
/// A request without an `Origin` header is not from a browser page and passes;
/// authentication still applies to it. Otherwise the origin must name the
/// host the request was sent to, or be listed (`*` lists every origin).
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl OriginPolicy {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    pub fn allows(&self, origin: Option<&str>, host: Option<&str>) -> bool {
        let Some(origin) = origin.map(str::trim) else {
            return true;
        };
        if self
            .allowed
            .iter()
            .any(|allowed| allowed == "*" || allowed.eq_ignore_ascii_case(origin))
        {
            return true;
        }
        match (origin_host(origin), host) {
            (Some(origin_host), Some(host)) => origin_host.eq_ignore_ascii_case(host.trim()),
            _ => false,
        }
    }
}

/// `host[:port]` of a `scheme://host[:port]` origin; `None` for `null` and the like.
fn origin_host(origin: &str) -> Option<&str> {
    let (_scheme, rest) = origin.split_once("://")?;
    let host = rest.split('/').next()?;
    (!host.is_empty()).then_some(host)
}

/// Token from an `Authorization: token <value>` (or `Bearer <value>`) header.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim().to_string())
    } else {
        None
    }
}
