//! access token（JWT）検証 → authority 抽出 → route policy 判定
//!
//! リクエストごとの流れ：
//! 1. policy で anonymous 指定のルートはトークンを見ずに通す
//! 2. `Authorization: Bearer <jwt>` を検証（署名 / exp / iss は verifier 側）
//! 3. 検証済み claims から granted authority 集合を抽出
//! 4. policy.authorize() の判定で 401 / 403 / 通過を決める
//! 5. 通過時は AuthCtx を request extensions に載せ、handler から extractor で取れるようにする

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::{self, Next},
    response::Response,
};

use crate::api::v2::extractors::AuthCtx;
use crate::error::AppError;
use crate::services::auth::{Access, Caller, Decision, DenyReason, extract_authorities};
use crate::state::AppState;

/// Router 全体に認可を掛けるための middleware を適用する。
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    // axum 0.8 の from_fn は State extractor を受け取れないため、`from_fn_with_state` で明示的に state を渡す
    router.layer(middleware::from_fn_with_state(state, access_middleware))
}

async fn access_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let path = req.uri().path().to_owned();
    let method = req.method().clone();

    // Anonymous routes are always reachable: no token handling at all, so a
    // stale token in the header cannot break an open endpoint.
    if matches!(
        state.policy.access_for(&path, &method),
        Some(Access::Anonymous)
    ) {
        return Ok(next.run(req).await);
    }

    // A present-but-invalid token never degrades to anonymous: on any
    // non-anonymous route it is rejected outright, same as no token.
    let verified = match bearer_token(req.headers()) {
        None => None,
        Some(token) => match state.verifier.verify(token).await {
            Ok(claims) => {
                let authorities = extract_authorities(&claims, &state.client_id);
                let subject = claims
                    .get("sub")
                    .and_then(|v| v.as_str())
                    .map(str::to_owned);
                Some(AuthCtx::new(subject, authorities))
            }
            Err(err) => {
                tracing::warn!(error = %err, path = %path, "access token verification failed");
                return Err(AppError::Unauthorized);
            }
        },
    };

    let caller = match &verified {
        None => Caller::Anonymous,
        Some(ctx) => Caller::Authenticated(&ctx.authorities),
    };

    match state.policy.authorize(&path, &method, &caller) {
        Decision::Allow => {}
        Decision::Deny(DenyReason::Unauthenticated) => return Err(AppError::Unauthorized),
        Decision::Deny(DenyReason::InsufficientAuthority) => {
            tracing::debug!(path = %path, "authority missing for route");
            return Err(AppError::Forbidden);
        }
    }

    if let Some(ctx) = verified {
        // middleware → extractor への受け渡し
        req.extensions_mut().insert(ctx);
    }

    Ok(next.run(req).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
