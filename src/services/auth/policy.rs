/*
 * Responsibility
 * - ルートごとのアクセス要件を宣言的なテーブルとして持つ（起動時に構築、以後 immutable）
 * - authorize(): caller の状態 + authority 集合 → ALLOW / DENY の判定（純関数）
 * - ポリシー未登録のルートは fail closed（絶対に ALLOW しない）
 */
use std::collections::HashSet;

use axum::http::Method;

/// Access requirement for one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Reachable without a token.
    Anonymous,
    /// Any caller with a verified token.
    Authenticated,
    /// A verified token whose authority set contains this string.
    RequireAuthority(String),
}

#[derive(Debug, Clone)]
pub struct RouteRule {
    path: String,
    /// `None` matches every method.
    method: Option<Method>,
    access: Access,
}

/// The caller as seen by the policy, after upstream token verification.
#[derive(Debug, Clone, Copy)]
pub enum Caller<'a> {
    /// No token was presented, or verification failed upstream.
    Anonymous,
    /// Token verified; carries the extracted authority set (possibly empty).
    Authenticated(&'a HashSet<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No verified token. Transport maps this to 401.
    Unauthenticated,
    /// Verified token without the required authority. Transport maps this to 403.
    InsufficientAuthority,
}

/// Immutable route policy table. Built once at startup, evaluated per request.
///
/// Matching is exact on the path; the first rule whose path and method match
/// wins. A path with no rule is denied.
#[derive(Debug, Clone, Default)]
pub struct RoutePolicy {
    rules: Vec<RouteRule>,
}

impl RoutePolicy {
    pub fn builder() -> RoutePolicyBuilder {
        RoutePolicyBuilder { rules: Vec::new() }
    }

    pub fn access_for(&self, path: &str, method: &Method) -> Option<&Access> {
        self.rules
            .iter()
            .find(|rule| {
                rule.path == path && rule.method.as_ref().is_none_or(|m| m == method)
            })
            .map(|rule| &rule.access)
    }

    /// Decide whether `caller` may reach `path`/`method`.
    ///
    /// Precedence:
    /// 1. anonymous-allowed routes ALLOW regardless of the caller
    /// 2. everything else requires a verified token
    /// 3. authenticated-only routes ALLOW any verified caller
    /// 4. otherwise the required authority must be in the caller's set
    ///
    /// A route without a policy entry is denied.
    pub fn authorize(&self, path: &str, method: &Method, caller: &Caller<'_>) -> Decision {
        match (self.access_for(path, method), caller) {
            (Some(Access::Anonymous), _) => Decision::Allow,
            (_, Caller::Anonymous) => Decision::Deny(DenyReason::Unauthenticated),
            (Some(Access::Authenticated), Caller::Authenticated(_)) => Decision::Allow,
            (Some(Access::RequireAuthority(required)), Caller::Authenticated(granted)) => {
                if granted.contains(required) {
                    Decision::Allow
                } else {
                    Decision::Deny(DenyReason::InsufficientAuthority)
                }
            }
            // Unknown route: fail closed.
            (None, Caller::Authenticated(_)) => Decision::Deny(DenyReason::InsufficientAuthority),
        }
    }
}

pub struct RoutePolicyBuilder {
    rules: Vec<RouteRule>,
}

impl RoutePolicyBuilder {
    pub fn allow_anonymous(mut self, path: impl Into<String>) -> Self {
        self.rules.push(RouteRule {
            path: path.into(),
            method: None,
            access: Access::Anonymous,
        });
        self
    }

    pub fn authenticated(mut self, path: impl Into<String>) -> Self {
        self.rules.push(RouteRule {
            path: path.into(),
            method: None,
            access: Access::Authenticated,
        });
        self
    }

    pub fn require_authority(
        mut self,
        path: impl Into<String>,
        authority: impl Into<String>,
    ) -> Self {
        self.rules.push(RouteRule {
            path: path.into(),
            method: None,
            access: Access::RequireAuthority(authority.into()),
        });
        self
    }

    /// Like `require_authority`, but only for one HTTP method.
    pub fn require_authority_for(
        mut self,
        method: Method,
        path: impl Into<String>,
        authority: impl Into<String>,
    ) -> Self {
        self.rules.push(RouteRule {
            path: path.into(),
            method: Some(method),
            access: Access::RequireAuthority(authority.into()),
        });
        self
    }

    pub fn build(self) -> RoutePolicy {
        RoutePolicy { rules: self.rules }
    }
}
